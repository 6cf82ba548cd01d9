//! Rate limiting for WebSocket message handling.
//!
//! Each connection gets two sliding windows: a short one against bursts and
//! a long one against sustained flooding. A message must fit in both.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Sliding window limiter
#[derive(Debug)]
pub struct RateLimiter {
    /// Timestamps of recent requests
    timestamps: VecDeque<Instant>,
    /// Maximum number of requests allowed in the window
    max_requests: usize,
    /// Time window for rate limiting
    window: Duration,
}

impl RateLimiter {
    /// Create a new rate limiter
    ///
    /// # Example
    ///
    /// ```
    /// use bj_server::api::rate_limiter::RateLimiter;
    /// use std::time::Duration;
    ///
    /// // Allow 10 requests per second
    /// let mut limiter = RateLimiter::new(10, Duration::from_secs(1));
    /// assert!(limiter.check());
    /// ```
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            timestamps: VecDeque::with_capacity(max_requests),
            max_requests,
            window,
        }
    }

    fn prune(&mut self, now: Instant) {
        while let Some(ts) = self.timestamps.front() {
            if now.duration_since(*ts) > self.window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Record a request if the window has room.
    ///
    /// Returns `true` if the request is allowed, `false` if the limit is hit.
    /// Refused requests are not recorded.
    pub fn check(&mut self) -> bool {
        let now = Instant::now();
        self.prune(now);

        if self.timestamps.len() >= self.max_requests {
            return false;
        }

        self.timestamps.push_back(now);
        true
    }

    /// Whether a request made now would be allowed, without recording it
    pub fn has_room(&mut self) -> bool {
        self.prune(Instant::now());
        self.timestamps.len() < self.max_requests
    }

    /// Requests still allowed in the current window
    pub fn remaining(&self) -> usize {
        self.max_requests.saturating_sub(self.timestamps.len())
    }

    /// Time until the oldest request leaves the window.
    ///
    /// Returns `None` if there are no requests in the current window.
    pub fn reset_in(&self) -> Option<Duration> {
        self.timestamps.front().map(|oldest| {
            let elapsed = Instant::now().duration_since(*oldest);
            self.window.saturating_sub(elapsed)
        })
    }
}

/// Which window refused a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitExceeded {
    Burst { retry_in: Duration },
    Sustained { retry_in: Duration },
}

impl LimitExceeded {
    /// Label used for metrics
    pub fn limiter(&self) -> &'static str {
        match self {
            Self::Burst { .. } => "burst",
            Self::Sustained { .. } => "sustained",
        }
    }

    /// Message sent back to the client
    pub fn client_message(&self) -> String {
        match self {
            Self::Burst { retry_in } => format!(
                "Rate limit exceeded. Please slow down (retry in {}ms).",
                retry_in.as_millis()
            ),
            Self::Sustained { retry_in } => format!(
                "Too many messages. Please wait {}s before sending more.",
                retry_in.as_secs().max(1)
            ),
        }
    }
}

/// Per-connection limits: 10 messages per second, 100 per minute
#[derive(Debug)]
pub struct ConnectionLimiter {
    burst: RateLimiter,
    sustained: RateLimiter,
}

impl Default for ConnectionLimiter {
    fn default() -> Self {
        Self::new(
            RateLimiter::new(10, Duration::from_secs(1)),
            RateLimiter::new(100, Duration::from_secs(60)),
        )
    }
}

impl ConnectionLimiter {
    pub fn new(burst: RateLimiter, sustained: RateLimiter) -> Self {
        Self { burst, sustained }
    }

    /// Admit one message, counting it against both windows.
    pub fn check(&mut self) -> Result<(), LimitExceeded> {
        // Check both before recording so a refused message costs nothing.
        if !self.burst.has_room() {
            return Err(LimitExceeded::Burst {
                retry_in: self.burst.reset_in().unwrap_or_default(),
            });
        }
        if !self.sustained.has_room() {
            return Err(LimitExceeded::Sustained {
                retry_in: self.sustained.reset_in().unwrap_or_default(),
            });
        }
        self.burst.check();
        self.sustained.check();
        Ok(())
    }
}
