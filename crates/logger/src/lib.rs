//! Process-wide `tracing` subscriber setup shared by the workspace binaries.

mod subscriber;

pub use subscriber::{init, init_tracing};
