//! Rate-limit detection
//!
//! The guard only reads the source's hint. It never tracks request budgets of
//! its own.

use crate::source::ApiResponse;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;

/// How long the host should wait before CONTINUE
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitSignal {
    pub delay_seconds: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Ok,
    RateLimited(RateLimitSignal),
}

#[derive(Debug, Clone)]
pub struct RateLimitGuard {
    default_delay_secs: u64,
}

impl Default for RateLimitGuard {
    fn default() -> Self {
        Self::new(5)
    }
}

impl RateLimitGuard {
    /// `default_delay_secs` applies when the hint is missing or unusable
    pub fn new(default_delay_secs: u64) -> Self {
        Self {
            default_delay_secs: default_delay_secs.max(1),
        }
    }

    pub fn classify<T>(&self, response: &ApiResponse<T>) -> Classification {
        self.classify_at(response, Utc::now())
    }

    pub fn classify_at<T>(&self, response: &ApiResponse<T>, now: DateTime<Utc>) -> Classification {
        if response.status != StatusCode::TOO_MANY_REQUESTS {
            return Classification::Ok;
        }
        let delay_seconds = response
            .retry_after
            .as_deref()
            .and_then(|hint| parse_retry_after(hint, now))
            .unwrap_or(self.default_delay_secs);
        Classification::RateLimited(RateLimitSignal { delay_seconds })
    }
}

/// Parse a Retry-After value: delta seconds or an HTTP-date
///
/// Returns `None` for anything that does not yield a positive delay.
pub fn parse_retry_after(hint: &str, now: DateTime<Utc>) -> Option<u64> {
    let hint = hint.trim();
    if let Ok(secs) = hint.parse::<u64>() {
        return (secs > 0).then_some(secs);
    }
    if let Ok(secs) = hint.parse::<f64>() {
        return (secs.is_finite() && secs > 0.0).then(|| secs.ceil() as u64);
    }
    let at = DateTime::parse_from_rfc2822(hint).ok()?.with_timezone(&Utc);
    let secs = (at - now).num_seconds();
    (secs > 0).then_some(secs as u64)
}
