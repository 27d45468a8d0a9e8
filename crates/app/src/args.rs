pub use clap::Parser;

use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "veil")]
#[command(about = "A private filesystem with selective sharing and device linking")]
pub struct Args {
    /// Path to the veil config directory (defaults to ~/.veil)
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: crate::Command,
}
