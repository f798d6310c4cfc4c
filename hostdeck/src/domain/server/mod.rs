//! Server domain module.

mod entity;
mod state;

pub use entity::Server;
pub use state::ServerStatus;
