mod context;
mod router;
mod state;

pub use context::{Caller, PLAN_HEADER, TENANT_HEADER};
pub use router::build_router;
pub use state::{AppState, ServeHealth};
