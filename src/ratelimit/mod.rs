//! Rate limiting logic and state management.

mod clock;
mod gate;
mod history;
mod limiter;
mod window;

pub use clock::{Clock, TokioClock};
pub use gate::AdmissionGate;
pub use limiter::{Permit, RateLimiter};
pub use window::{Fairness, LimitConfig, TimeUnit};
