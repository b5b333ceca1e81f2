//! Identity and time newtypes shared by every record.

use std::fmt;
use std::ops::Sub;
use std::time::{SystemTime, UNIX_EPOCH};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Globally unique context identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
pub struct ContextId(Uuid);

impl ContextId {
    /// Generate a fresh random id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies the owning application instance.
///
/// The name is chosen by the operator; the instance id is generated once per
/// process so two replicas of the same service stay distinguishable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ApplicationId {
    name: String,
    instance: Uuid,
}

impl ApplicationId {
    /// Create an id for `name` with a freshly generated instance id.
    #[must_use]
    pub fn generate(name: impl Into<String>) -> Self {
        Self { name: name.into(), instance: Uuid::new_v4() }
    }

    /// Create an id from known parts (used when replaying records).
    #[must_use]
    pub fn from_parts(name: impl Into<String>, instance: Uuid) -> Self {
        Self { name: name.into(), instance }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn instance(&self) -> &Uuid {
        &self.instance
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.instance)
    }
}

/// Wall-clock timestamp in milliseconds since the Unix epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Read the system wall clock.
    ///
    /// A clock set before 1970 reads as 0.
    #[must_use]
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX));
        Self(millis)
    }

    #[must_use]
    pub fn as_millis(self) -> i64 {
        self.0
    }
}

/// Difference in milliseconds
impl Sub for Timestamp {
    type Output = i64;

    fn sub(self, rhs: Self) -> i64 {
        self.0 - rhs.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_ids_are_unique() {
        let a = ContextId::generate();
        let b = ContextId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_application_id_display() {
        let instance = Uuid::nil();
        let id = ApplicationId::from_parts("billing", instance);
        assert_eq!(id.to_string(), "billing@00000000-0000-0000-0000-000000000000");
        assert_eq!(id.name(), "billing");
    }

    #[test]
    fn test_timestamp_difference() {
        assert_eq!(Timestamp(1_500) - Timestamp(1_000), 500);
        assert_eq!(Timestamp(1_000) - Timestamp(1_500), -500);
        assert!(Timestamp::now().as_millis() > 0);
    }
}
