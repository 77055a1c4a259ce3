//! Engine configuration.
//!
//! Everything has a default; hosts override pieces through
//! [`CurriculumEngineBuilder`](crate::CurriculumEngineBuilder) or by
//! deserializing an [`EngineConfig`] from JSON.

use crate::model::ComponentKind;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bounded polling used after a write before trusting a refetch.
///
/// The store's read-after-write window is not documented, so the cache
/// re-reads until a predicate confirms the write is visible, giving up after
/// `max_attempts` reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettlePolicy {
    pub max_attempts: u32,
    #[serde(with = "millis")]
    pub interval: Duration,
}

impl Default for SettlePolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            interval: Duration::from_millis(100),
        }
    }
}

impl SettlePolicy {
    /// Single read, no waiting. Suitable for stores with read-your-writes.
    pub fn immediate() -> Self {
        Self {
            max_attempts: 1,
            interval: Duration::ZERO,
        }
    }
}

/// Values filled in when a specification tree leaves them out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterializeDefaults {
    pub pathway_duration_months: u32,
    pub series_workload_hours: u32,
    pub unit_duration_hours: u32,
    pub max_grade: f64,
    pub passing_grade: f64,
    pub minimum_attendance: u8,
    pub component_kind: ComponentKind,
}

impl Default for MaterializeDefaults {
    fn default() -> Self {
        Self {
            pathway_duration_months: 6,
            series_workload_hours: 60,
            unit_duration_hours: 4,
            max_grade: 10.0,
            passing_grade: 7.0,
            minimum_attendance: 75,
            component_kind: ComponentKind::Text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub settle: SettlePolicy,
    pub defaults: MaterializeDefaults,
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            settle: SettlePolicy::default(),
            defaults: MaterializeDefaults::default(),
            event_capacity: Self::DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl EngineConfig {
    pub const DEFAULT_EVENT_CAPACITY: usize = 256;

    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        let mut config: EngineConfig = serde_json::from_str(raw)?;
        if config.event_capacity == 0 {
            config.event_capacity = Self::DEFAULT_EVENT_CAPACITY;
        }
        Ok(config)
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config =
            EngineConfig::from_json_str(r#"{ "settle": { "interval": 25 } }"#).unwrap();
        assert_eq!(config.settle.interval, Duration::from_millis(25));
        assert_eq!(config.settle.max_attempts, 5);
        assert_eq!(config.defaults.series_workload_hours, 60);
        assert_eq!(config.event_capacity, EngineConfig::DEFAULT_EVENT_CAPACITY);
    }
}
