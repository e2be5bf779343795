//! Time source used when serializing relative filters
//!
//! Expiration buckets are evaluated against "now" at request time, so the
//! controller takes the clock as a collaborator instead of calling
//! `Utc::now()` directly.

use chrono::{DateTime, Utc};

/// Source of the current instant
pub trait Clock: Send + Sync {
    /// Current instant in UTC
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock frozen at one instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
