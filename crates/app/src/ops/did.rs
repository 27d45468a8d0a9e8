use clap::Args;

#[derive(Args, Debug, Clone)]
pub struct Did;

#[derive(Debug, thiserror::Error)]
pub enum DidError {
    #[error("did failed: {0}")]
    State(#[from] crate::state::StateError),
}

#[async_trait::async_trait]
impl crate::op::Op for Did {
    type Error = DidError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.state()?;
        Ok(state.load_key()?.did())
    }
}
