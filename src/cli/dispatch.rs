use super::env::CliArgs;
use super::serve::cmd_serve;
use super::status::cmd_status;
use super::submit::cmd_submit;
use super::validate::cmd_validate;
use crate::cli::commands::Commands;
use crate::cli::context::CliContext;
use anyhow::Result;

pub async fn dispatch(cli: &CliArgs, ctx: &CliContext) -> Result<()> {
    match cli.command.clone() {
        Commands::Serve(args) => cmd_serve(args, ctx).await,
        Commands::Submit(args) => cmd_submit(args, ctx).await,
        Commands::Status(args) => cmd_status(args, ctx).await,
        Commands::Validate(args) => cmd_validate(args, ctx).await,
    }
}
