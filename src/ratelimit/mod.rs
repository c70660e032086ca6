//! Rate limiting logic and state management.

mod clock;
mod counter;
mod key;
mod limiter;
mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use counter::KeyCounter;
pub use key::{KeyStrategy, LimitKey};
pub use limiter::{Decision, LimiterConfig, RateLimiter};
pub use store::{ExpiringStore, Sweeper};
