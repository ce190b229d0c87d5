pub mod bounded;
pub mod clock;
pub mod config;
pub mod error;
pub mod metrics;
pub mod rate_limiter;

pub use bounded::BoundedList;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AppConfig, RateLimitConfig};
pub use error::{AppError, Result};
pub use rate_limiter::{RateLimitDecision, RateLimiter};
