//! rowlog core - shared types, configuration, clock, and error handling

pub mod clock;
pub mod config;
pub mod constants;
pub mod error;
pub mod types;

pub use clock::{Clock, MockClock, SystemClock};
pub use config::*;
pub use constants::*;
pub use error::{Error, Result};
pub use types::*;
