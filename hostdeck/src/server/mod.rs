//! Server lifecycle management.

mod manager;

pub use manager::{CreateServerRequest, RunningServer, ServerLifecycleManager};
