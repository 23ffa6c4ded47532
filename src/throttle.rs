//! Throttle policy derived from a root's location class

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::classify::LocationClass;

/// Batch size for locally attached roots
pub const LOCAL_BATCH_SIZE: usize = 100;

/// Batch size for network roots
pub const NETWORK_BATCH_SIZE: usize = 50;

/// Pause between batches on network roots
pub const NETWORK_INTER_OP_DELAY: Duration = Duration::from_millis(10);

/// How many entries make up a batch and how long to pause between batches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrottlePolicy {
    /// Entries processed between progress reports
    pub batch_size: usize,
    /// Pause inserted after each batch
    #[serde(with = "duration_ms")]
    pub inter_op_delay: Duration,
}

impl ThrottlePolicy {
    /// Look up the policy for a location class
    pub fn for_class(class: LocationClass) -> Self {
        match class {
            LocationClass::Local => Self {
                batch_size: LOCAL_BATCH_SIZE,
                inter_op_delay: Duration::ZERO,
            },
            LocationClass::NetworkUnc | LocationClass::NetworkMounted => Self {
                batch_size: NETWORK_BATCH_SIZE,
                inter_op_delay: NETWORK_INTER_OP_DELAY,
            },
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_policy() {
        let policy = ThrottlePolicy::for_class(LocationClass::Local);
        assert_eq!(policy.batch_size, 100);
        assert_eq!(policy.inter_op_delay, Duration::ZERO);
    }

    #[test]
    fn test_network_policies() {
        for class in [LocationClass::NetworkUnc, LocationClass::NetworkMounted] {
            let policy = ThrottlePolicy::for_class(class);
            assert_eq!(policy.batch_size, 50);
            assert_eq!(policy.inter_op_delay, Duration::from_millis(10));
        }
    }

    #[test]
    fn test_policy_serialization() {
        let policy = ThrottlePolicy::for_class(LocationClass::NetworkUnc);
        let json = serde_json::to_value(policy).unwrap();
        assert_eq!(json["batch_size"], 50);
        assert_eq!(json["inter_op_delay"], 10);
    }
}
