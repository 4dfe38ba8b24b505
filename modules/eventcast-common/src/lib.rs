pub mod types;
pub mod config;
pub mod error;

pub use types::*;
pub use config::{Config, DEFAULT_FANOUT_CONCURRENCY};
pub use error::EventcastError;
