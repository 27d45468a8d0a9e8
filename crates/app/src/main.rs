mod args;
mod logging;
mod op;
mod ops;
mod state;

use args::Args;
use clap::{Parser, Subcommand};
use op::Op;
use ops::{Cat, Check, Delegate, Did, Init, Link, Ls, Receive, Share, Version, Write};
use state::AppState;

command_enum! {
    (Init, Init),
    (Did, Did),
    (Write, Write),
    (Cat, Cat),
    (Ls, Ls),
    (Share, Share),
    (Receive, Receive),
    (Delegate, Delegate),
    (Link, Link),
    (Check, Check),
    (Version, Version),
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // before `init` there is no config yet, so log with the defaults
    let config = AppState::load(args.config_path.clone())
        .map(|state| state.config)
        .unwrap_or_default();
    let guards = logging::init_logging(&config);

    let ctx = op::OpContext::new(args.config_path);
    let code = match args.command.execute(&ctx).await {
        Ok(output) => {
            println!("{}", output);
            0
        }
        Err(e) => {
            tracing::debug!("command failed: {:?}", e);
            eprintln!("Error: {}", e);
            1
        }
    };

    // flush the non-blocking writers before exiting
    drop(guards);
    std::process::exit(code);
}
