//! Rate limiting policies and the decision engine.

mod fixed_window;
mod leaky_bucket;
mod limiter;
mod policy;
mod registry;
mod sliding_counter;
mod sliding_log;
mod token_bucket;

pub use fixed_window::FixedWindowPolicy;
pub use leaky_bucket::LeakyBucketPolicy;
pub use limiter::RateLimiter;
pub use policy::Policy;
pub use registry::PolicyRegistry;
pub use sliding_counter::SlidingWindowCounterPolicy;
pub use sliding_log::SlidingWindowLogPolicy;
pub use token_bucket::TokenBucketPolicy;
