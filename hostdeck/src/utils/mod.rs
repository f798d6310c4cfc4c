//! Small shared helpers.

pub mod locks;
pub mod money;

pub use locks::KeyedLocks;
