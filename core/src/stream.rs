//! Stream identification, versioning, and global ordering types.
//!
//! This module defines the strong types used throughout the event store:
//! `StreamId` names a stream (one aggregate instance), `Version` orders
//! events within a stream, `GlobalPosition` orders events across all
//! streams, and `ExpectedVersion` expresses the optimistic-concurrency
//! precondition for an append.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for `StreamId` parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid stream ID: {0}")]
pub struct ParseStreamIdError(String);

/// Unique identifier for an event stream (aggregate instance).
///
/// A stream ID uniquely identifies a single aggregate instance in the
/// event store, e.g. `"order-12345"` or `"customer-abc"`.
///
/// # Validation
///
/// - `FromStr::from_str()`: validates input (rejects empty strings)
/// - `From::from()` and `new()`: no validation (for application-controlled input)
///
/// # Examples
///
/// ```
/// use strata_core::stream::StreamId;
///
/// let stream_id = StreamId::new("order-12345");
/// assert_eq!(stream_id.as_str(), "order-12345");
///
/// let parsed: StreamId = "customer-abc".parse().unwrap();
/// assert_eq!(parsed, StreamId::new("customer-abc"));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamId(String);

impl StreamId {
    /// Create a new `StreamId` from a string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the stream ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert the `StreamId` into its inner `String`.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for StreamId {
    type Err = ParseStreamIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ParseStreamIdError("Stream ID cannot be empty".to_string()));
        }
        Ok(Self(s.to_string()))
    }
}

impl From<String> for StreamId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for StreamId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for StreamId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Sequence number of an event within its stream.
///
/// Versions start at 0 for the first event and increment by 1 for each
/// subsequent event; a stream's current version is the version of its
/// last event. Versions have no gaps.
///
/// # Examples
///
/// ```
/// use strata_core::stream::Version;
///
/// let v0 = Version::INITIAL;
/// let v1 = v0.next();
/// assert_eq!(v1, Version::new(1));
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version(u64);

impl Version {
    /// The version of the first event in a stream.
    pub const INITIAL: Self = Self(0);

    /// Create a new `Version` with the given value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the version number.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Get the next version (current + 1).
    ///
    /// # Overflow Behavior
    ///
    /// Uses plain arithmetic; reaching `u64::MAX` events in one stream is
    /// not a realistic concern.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Version {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Version> for u64 {
    fn from(version: Version) -> Self {
        version.0
    }
}

impl std::ops::Add<u64> for Version {
    type Output = Self;

    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0 + rhs)
    }
}

/// Monotonic position of an event in the global log.
///
/// Positions are strictly increasing across all streams and start at 1;
/// [`GlobalPosition::START`] (0) sits before the first event and is the
/// natural checkpoint for a projection that has consumed nothing yet.
///
/// # Examples
///
/// ```
/// use strata_core::stream::GlobalPosition;
///
/// let start = GlobalPosition::START;
/// assert!(start < GlobalPosition::new(1));
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GlobalPosition(u64);

impl GlobalPosition {
    /// The position before the first event in the log.
    pub const START: Self = Self(0);

    /// Create a new `GlobalPosition` with the given value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the position number.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Get the next position (current + 1).
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for GlobalPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for GlobalPosition {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<GlobalPosition> for u64 {
    fn from(position: GlobalPosition) -> Self {
        position.0
    }
}

/// Optimistic-concurrency precondition for an append.
///
/// `NoStream` asserts that the stream does not exist yet (the first
/// append); `Exact(v)` asserts that the stream's current version is
/// exactly `v`. An append whose precondition does not hold fails with
/// [`EventStoreError::ConcurrencyConflict`](crate::store::EventStoreError::ConcurrencyConflict)
/// and the caller is expected to reload, reapply, and retry.
///
/// # Examples
///
/// ```
/// use strata_core::stream::{ExpectedVersion, Version};
///
/// let first_append = ExpectedVersion::NoStream;
/// let after_two_events = ExpectedVersion::Exact(Version::new(1));
/// assert_ne!(first_append, after_two_events);
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExpectedVersion {
    /// The stream must not exist yet.
    NoStream,
    /// The stream's current version must be exactly this value.
    Exact(Version),
}

impl ExpectedVersion {
    /// The stream version this precondition asserts, if any.
    #[must_use]
    pub const fn version(self) -> Option<Version> {
        match self {
            Self::NoStream => None,
            Self::Exact(v) => Some(v),
        }
    }
}

impl fmt::Display for ExpectedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoStream => write!(f, "no stream"),
            Self::Exact(v) => write!(f, "{v}"),
        }
    }
}

impl From<Option<Version>> for ExpectedVersion {
    fn from(current: Option<Version>) -> Self {
        current.map_or(Self::NoStream, Self::Exact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod stream_id_tests {
        use super::*;

        #[test]
        fn new_creates_stream_id() {
            let id = StreamId::new("order-123");
            assert_eq!(id.as_str(), "order-123");
        }

        #[test]
        #[allow(clippy::expect_used)] // Panics: Test will fail if parse fails
        fn parse_from_str() {
            let id: StreamId = "order-123".parse().expect("parse should succeed");
            assert_eq!(id, StreamId::new("order-123"));
        }

        #[test]
        fn parse_empty_string_fails() {
            let result = "".parse::<StreamId>();
            assert!(result.is_err());
        }

        #[test]
        fn display() {
            let id = StreamId::new("order-123");
            assert_eq!(format!("{id}"), "order-123");
        }
    }

    mod version_tests {
        use super::*;

        #[test]
        fn initial_version_is_zero() {
            assert_eq!(Version::INITIAL, Version::new(0));
        }

        #[test]
        fn next_version() {
            let v0 = Version::INITIAL;
            assert_eq!(v0.next(), Version::new(1));
            assert_eq!(v0.next().next(), Version::new(2));
        }

        #[test]
        fn version_arithmetic_and_ordering() {
            let v5 = Version::new(5);
            assert_eq!(v5 + 3, Version::new(8));
            assert!(Version::new(1) < Version::new(2));
        }
    }

    mod global_position_tests {
        use super::*;

        #[test]
        fn start_precedes_first_event() {
            assert!(GlobalPosition::START < GlobalPosition::new(1));
            assert_eq!(GlobalPosition::START.next(), GlobalPosition::new(1));
        }

        #[test]
        fn display() {
            assert_eq!(format!("{}", GlobalPosition::new(42)), "42");
        }
    }

    mod expected_version_tests {
        use super::*;

        #[test]
        fn from_option() {
            assert_eq!(ExpectedVersion::from(None), ExpectedVersion::NoStream);
            assert_eq!(
                ExpectedVersion::from(Some(Version::new(3))),
                ExpectedVersion::Exact(Version::new(3))
            );
        }

        #[test]
        fn version_accessor() {
            assert_eq!(ExpectedVersion::NoStream.version(), None);
            assert_eq!(
                ExpectedVersion::Exact(Version::new(7)).version(),
                Some(Version::new(7))
            );
        }

        #[test]
        fn display() {
            assert_eq!(format!("{}", ExpectedVersion::NoStream), "no stream");
            assert_eq!(format!("{}", ExpectedVersion::Exact(Version::new(4))), "4");
        }
    }
}
