pub mod app;
pub mod commands;
pub mod context;
pub mod dispatch;
pub mod env;
pub mod input;
pub mod output;
pub mod runtime;
pub mod serve;
pub mod status;
pub mod submit;
pub mod validate;

pub use app::run;
pub use env::CliArgs;
pub use serve::{cmd_serve, ServeArgs};
pub use status::{cmd_status, StatusArgs};
pub use submit::{cmd_submit, SubmitArgs};
pub use validate::{cmd_validate, ValidateArgs};
