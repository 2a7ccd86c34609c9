//! Core types for courier
//!
//! This module defines the fundamental types used throughout the engine,
//! using newtype patterns for semantic validation and type safety.

use crate::config::AddressingConfig;
use crate::errors::{CourierError, CourierResult};
use core::fmt;
use core::ops::{Add, Sub};
use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Recipient
// ----------------------------------------------------------------------------

/// A normalized, addressable message recipient
///
/// Two raw inputs that normalize to the same digits are the same recipient
/// for cooldown and quota purposes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Recipient {
    digits: String,
    address: String,
}

impl Recipient {
    /// Normalized digit string including country prefix
    pub fn digits(&self) -> &str {
        &self.digits
    }

    /// Protocol address (digits plus addressing suffix)
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Masked form for logs: only the last four digits are shown
    pub fn masked(&self) -> String {
        let visible = self.digits.len().saturating_sub(4);
        format!("***{}", &self.digits[visible..])
    }
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.digits)
    }
}

/// Turns raw user input into [`Recipient`]s
#[derive(Debug, Clone)]
pub struct RecipientNormalizer {
    config: AddressingConfig,
}

impl RecipientNormalizer {
    pub fn new(config: AddressingConfig) -> Self {
        Self { config }
    }

    /// Normalize a raw identifier.
    ///
    /// A trailing address suffix (the configured one, or any `@domain`
    /// without digits) is dropped, every other non-digit is stripped, and a
    /// bare domestic number (exactly `domestic_number_length` digits) gets
    /// the default country code prepended.
    pub fn normalize(&self, raw: &str) -> CourierResult<Recipient> {
        let local_part = self.strip_address_suffix(raw.trim());
        let mut digits: String = local_part.chars().filter(char::is_ascii_digit).collect();

        if digits.is_empty() {
            return Err(CourierError::InvalidRecipient {
                raw: raw.to_string(),
            });
        }

        if digits.len() == self.config.domestic_number_length {
            digits.insert_str(0, &self.config.default_country_code);
        }

        let address = format!("{}{}", digits, self.config.address_suffix);
        Ok(Recipient { digits, address })
    }

    pub fn config(&self) -> &AddressingConfig {
        &self.config
    }

    fn strip_address_suffix<'a>(&self, raw: &'a str) -> &'a str {
        let suffix = self.config.address_suffix.as_str();
        if !suffix.is_empty() {
            if let Some(local) = raw.strip_suffix(suffix) {
                return local;
            }
        }
        match raw.rsplit_once('@') {
            Some((local, domain)) if !domain.chars().any(|c| c.is_ascii_digit()) => local,
            _ => raw,
        }
    }
}

impl Default for RecipientNormalizer {
    fn default() -> Self {
        Self::new(AddressingConfig::default())
    }
}

/// Split a free-form recipient list (comma, semicolon or newline separated)
/// into trimmed, non-empty raw entries, preserving order.
pub fn parse_recipient_list(input: &str) -> Vec<String> {
    input
        .split(|c| c == ',' || c == ';' || c == '\n')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

// ----------------------------------------------------------------------------
// Job Identifier
// ----------------------------------------------------------------------------

/// Identifier attached to every accepted dispatch job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(uuid::Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ----------------------------------------------------------------------------
// Timestamp
// ----------------------------------------------------------------------------

/// Millisecond timestamp since Unix epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Add<u64> for Timestamp {
    type Output = Timestamp;

    fn add(self, other: u64) -> Timestamp {
        Timestamp(self.0.saturating_add(other))
    }
}

impl Sub for Timestamp {
    type Output = u64;

    fn sub(self, other: Timestamp) -> u64 {
        self.0.saturating_sub(other.0)
    }
}

impl Timestamp {
    /// Create a new timestamp
    pub fn new(millis: u64) -> Self {
        Self(millis)
    }

    /// Current wall-clock time
    pub fn now() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self(duration.as_millis() as u64)
    }

    /// Get the raw milliseconds
    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Timestamp `millis` earlier, clamped at the epoch
    pub fn saturating_sub_millis(&self, millis: u64) -> Self {
        Self(self.0.saturating_sub(millis))
    }

    /// Get duration since another timestamp
    pub fn duration_since(&self, other: Self) -> core::time::Duration {
        core::time::Duration::from_millis(self.0.saturating_sub(other.0))
    }
}

// ----------------------------------------------------------------------------
// Calendar Day
// ----------------------------------------------------------------------------

/// Caller-local calendar date (`YYYY-MM-DD`) used as the daily quota marker
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CalendarDay(String);

impl CalendarDay {
    pub fn new(day: impl Into<String>) -> Self {
        Self(day.into())
    }

    /// Calendar day of a timestamp, interpreted in UTC
    pub fn from_timestamp_utc(timestamp: Timestamp) -> Self {
        let millis = i64::try_from(timestamp.as_millis()).unwrap_or(i64::MAX);
        let day = chrono::DateTime::from_timestamp_millis(millis)
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .unwrap_or_default();
        Self(day)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CalendarDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ----------------------------------------------------------------------------
// Time Source Trait
// ----------------------------------------------------------------------------

/// Source of wall-clock time and the caller's calendar day
///
/// Injected everywhere a timestamp or day boundary matters so that cooldown
/// and quota behavior can be driven deterministically in tests.
pub trait TimeSource: Send + Sync {
    /// Get the current timestamp
    fn now(&self) -> Timestamp;

    /// Get the caller-local calendar day
    fn today(&self) -> CalendarDay {
        CalendarDay::from_timestamp_utc(self.now())
    }
}

/// Standard library implementation of TimeSource using the local timezone
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl SystemTimeSource {
    pub fn new() -> Self {
        Self
    }
}

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }

    fn today(&self) -> CalendarDay {
        CalendarDay::new(chrono::Local::now().format("%Y-%m-%d").to_string())
    }
}
