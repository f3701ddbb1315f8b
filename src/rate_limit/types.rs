use crate::error::{Result, ServiceError};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Unit of a rate policy window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowUnit {
    Second,
    Minute,
    Hour,
    Day,
}

impl WindowUnit {
    /// Get the duration of one unit
    pub fn duration(&self) -> Duration {
        match self {
            WindowUnit::Second => Duration::from_secs(1),
            WindowUnit::Minute => Duration::from_secs(60),
            WindowUnit::Hour => Duration::from_secs(3600),
            WindowUnit::Day => Duration::from_secs(86400),
        }
    }

    fn from_code(code: &str) -> Option<Self> {
        match code.to_ascii_uppercase().as_str() {
            "S" => Some(WindowUnit::Second),
            "M" => Some(WindowUnit::Minute),
            "H" => Some(WindowUnit::Hour),
            "D" => Some(WindowUnit::Day),
            _ => None,
        }
    }

    fn code(&self) -> char {
        match self {
            WindowUnit::Second => 'S',
            WindowUnit::Minute => 'M',
            WindowUnit::Hour => 'H',
            WindowUnit::Day => 'D',
        }
    }
}

/// Process-wide rate limit policy: `max_requests` per fixed `window`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitPolicy {
    max_requests: u64,
    window: Duration,
    window_delta: ChronoDuration,
}

impl RateLimitPolicy {
    /// Create a policy. Both values must be positive.
    pub fn new(max_requests: u64, window: Duration) -> Result<Self> {
        if max_requests == 0 {
            return Err(ServiceError::Config(
                "Rate limit max requests must be > 0".to_string(),
            ));
        }
        if window.is_zero() {
            return Err(ServiceError::Config(
                "Rate limit window must be > 0".to_string(),
            ));
        }
        let window_delta = ChronoDuration::from_std(window).map_err(|e| {
            ServiceError::Config(format!("Rate limit window out of range: {}", e))
        })?;

        Ok(Self {
            max_requests,
            window,
            window_delta,
        })
    }

    pub fn max_requests(&self) -> u64 {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Instant at which a window opened at `now` expires
    pub fn reset_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + self.window_delta
    }
}

/// Parses the `<N>-<unit>` form, e.g. `10-M` for ten requests per minute
impl FromStr for RateLimitPolicy {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || {
            ServiceError::Config(format!(
                "Invalid rate policy '{}': expected <N>-<S|M|H|D>",
                s
            ))
        };

        let (count, unit) = s.trim().split_once('-').ok_or_else(invalid)?;
        let max_requests: u64 = count.trim().parse().map_err(|_| invalid())?;
        let unit = WindowUnit::from_code(unit.trim()).ok_or_else(invalid)?;

        Self::new(max_requests, unit.duration())
    }
}

impl fmt::Display for RateLimitPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = [
            WindowUnit::Day,
            WindowUnit::Hour,
            WindowUnit::Minute,
            WindowUnit::Second,
        ]
        .into_iter()
        .find(|unit| unit.duration() == self.window);

        match unit {
            Some(unit) => write!(f, "{}-{}", self.max_requests, unit.code()),
            None => write!(f, "{} per {:?}", self.max_requests, self.window),
        }
    }
}

/// Per-identity fixed window state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    /// Requests admitted since the window opened
    pub count: u64,
    /// When this window stops counting
    pub reset_at: DateTime<Utc>,
}

impl Window {
    /// A zero-count window opened at `now`
    pub fn open(policy: &RateLimitPolicy, now: DateTime<Utc>) -> Self {
        Self {
            count: 0,
            reset_at: policy.reset_from(now),
        }
    }

    /// A window whose reset instant has been reached counts as zero
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.reset_at
    }
}

/// Outcome of a single admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Whether the request is allowed
    pub allowed: bool,
    /// Policy limit
    pub limit: u64,
    /// Remaining requests in the current window
    pub remaining: u64,
    /// When the current window resets
    pub reset_at: DateTime<Utc>,
    /// Whole seconds until reset (denied decisions only)
    pub retry_after: Option<u64>,
}

impl RateLimitDecision {
    /// Create an allowed decision
    pub fn allowed(limit: u64, remaining: u64, reset_at: DateTime<Utc>) -> Self {
        Self {
            allowed: true,
            limit,
            remaining,
            reset_at,
            retry_after: None,
        }
    }

    /// Create a denied decision
    pub fn denied(limit: u64, reset_at: DateTime<Utc>, retry_after: u64) -> Self {
        Self {
            allowed: false,
            limit,
            remaining: 0,
            reset_at,
            retry_after: Some(retry_after),
        }
    }
}
