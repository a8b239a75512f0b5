//! Shared tracing setup for the NMS binaries.

mod subscriber;

pub use subscriber::{init_tracing, init_tracing_with_level};
pub use tracing::level_filters::LevelFilter;
