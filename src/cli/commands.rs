use clap::Subcommand;

use super::serve::ServeArgs;
use super::status::StatusArgs;
use super::submit::SubmitArgs;
use super::validate::ValidateArgs;

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Run the job API server
    Serve(ServeArgs),

    /// Submit flows and SKUs to a running server
    Submit(SubmitArgs),

    /// Show the status of a submitted job
    Status(StatusArgs),

    /// Validate a flow or execution request, optionally dry-running it offline
    Validate(ValidateArgs),
}
