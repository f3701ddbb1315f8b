//! Rate limiting module
//!
//! Per-identity fixed-window counting held in memory:
//!
//! - [`RateLimitPolicy`]: `max_requests` per window, parsed from `<N>-<S|M|H|D>`
//! - [`WindowStore`]: sharded identity -> window map, built by the bootstrap
//!   code and handed to the limiter
//! - [`RateLimiter`]: the increment-or-reset algorithm
//! - `X-RateLimit-*` response headers
//!
//! # Example
//!
//! ```rust
//! use expense_tracker::clock::SystemClock;
//! use expense_tracker::rate_limit::{RateLimiter, WindowStore};
//! use std::sync::Arc;
//!
//! let store = Arc::new(WindowStore::new());
//! let limiter = RateLimiter::new(store, "10-M".parse().unwrap(), Arc::new(SystemClock));
//!
//! let decision = limiter.admit("user-123").unwrap();
//! assert!(decision.allowed);
//! assert_eq!(decision.remaining, 9);
//! ```

pub mod headers;
pub mod limiter;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use headers::apply_rate_limit_headers;
pub use limiter::{spawn_window_sweeper, RateLimiter};
pub use store::WindowStore;
pub use types::{RateLimitDecision, RateLimitPolicy, Window, WindowUnit};
