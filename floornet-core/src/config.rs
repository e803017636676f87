//! Node configuration
//!
//! Groups identity, capacity, timing and broker settings. Every field has a
//! default so a JSON file only needs the values it overrides.

use crate::dedup::{DEFAULT_DEDUP_CAPACITY, DEFAULT_DEDUP_TTL_MS};
use crate::election::{ElectionConfig, PEER_TIMEOUT_MS, ROLE_SWITCH_MS};
use crate::error::ConfigError;
use crate::gossip::SITE_LEN;
use crate::session::{BackoffConfig, BACKOFF_INITIAL_MS, BACKOFF_MAX_MS};
use crate::types::{Capacity, CloudNamespace, Millis, MAX_CAPACITY};
use serde::{Deserialize, Serialize};

/// Complete node configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    // Identity
    pub site: String,
    pub namespace: String,
    pub floor_id: u8,

    pub capacity: Capacity,

    pub timing: TimingConfig,

    pub sensors: SensorConfig,

    pub dedup: DedupConfig,

    pub broker: BrokerConfig,
}

/// Periods and timeouts, all in milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Base gossip period; each node adds `rank % gossip_jitter_ms`
    pub gossip_base_ms: Millis,

    /// Jitter modulus (must be non-zero)
    pub gossip_jitter_ms: Millis,

    pub sensor_poll_ms: Millis,

    /// Period between re-broadcasts of one cached room line
    pub room_regossip_ms: Millis,

    /// Leader's cloud summary period
    pub summary_ms: Millis,

    pub status_interval_ms: Millis,

    pub peer_timeout_ms: Millis,

    pub role_switch_ms: Millis,

    /// Initial broker reconnect delay
    pub backoff_initial_ms: Millis,

    /// Broker reconnect delay cap
    pub backoff_max_ms: Millis,
}

/// Room sensor bus settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// Bus address per room slot; 0 marks an unused slot
    pub room_endpoints: Vec<u8>,

    /// Longest accepted sensor line (bytes)
    pub line_max: usize,

    /// Read request length sent to a board
    pub request_len: usize,
}

/// Duplicate suppression settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub capacity: usize,
    pub ttl_ms: Millis,
}

/// Broker endpoint and credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let ns = CloudNamespace::default();
        Self {
            site: ns.site,
            namespace: ns.namespace,
            floor_id: 1,
            capacity: Capacity::default(),
            timing: TimingConfig::default(),
            sensors: SensorConfig::default(),
            dedup: DedupConfig::default(),
            broker: BrokerConfig::default(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            gossip_base_ms: 100,
            gossip_jitter_ms: 50,
            sensor_poll_ms: 50,
            room_regossip_ms: 300,
            summary_ms: 2000,
            status_interval_ms: 5000,
            peer_timeout_ms: PEER_TIMEOUT_MS,
            role_switch_ms: ROLE_SWITCH_MS,
            backoff_initial_ms: BACKOFF_INITIAL_MS,
            backoff_max_ms: BACKOFF_MAX_MS,
        }
    }
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            room_endpoints: vec![0x21, 0x22, 0x23, 0, 0, 0, 0, 0],
            line_max: 128,
            request_len: 64,
        }
    }
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_DEDUP_CAPACITY,
            ttl_ms: DEFAULT_DEDUP_TTL_MS,
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "floornet-node".to_string(),
            username: None,
            password: None,
        }
    }
}

impl NodeConfig {
    /// Parse a JSON document; missing fields keep their defaults
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn namespace(&self) -> CloudNamespace {
        CloudNamespace::new(self.site.clone(), self.namespace.clone())
    }

    pub fn election(&self) -> ElectionConfig {
        ElectionConfig {
            peer_timeout: self.timing.peer_timeout_ms,
            role_switch: self.timing.role_switch_ms,
        }
    }

    pub fn backoff(&self) -> BackoffConfig {
        BackoffConfig {
            initial: self.timing.backoff_initial_ms,
            max: self.timing.backoff_max_ms,
        }
    }

    /// Check limits the rest of the crate relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        let Capacity { floors, rooms, sensors } = self.capacity;
        for (name, value) in [("floors", floors), ("rooms", rooms), ("sensors", sensors)] {
            if value == 0 || value > MAX_CAPACITY {
                return Err(ConfigError::Invalid(format!(
                    "capacity.{} must be in 1..={}, got {}",
                    name, MAX_CAPACITY, value
                )));
            }
        }
        if usize::from(self.floor_id) >= floors {
            return Err(ConfigError::Invalid(format!(
                "floor_id {} outside capacity of {} floors",
                self.floor_id, floors
            )));
        }
        if self.site.is_empty() || self.namespace.is_empty() {
            return Err(ConfigError::Invalid("site and namespace must be non-empty".into()));
        }
        if self.site.len() > SITE_LEN {
            return Err(ConfigError::Invalid(format!(
                "site '{}' longer than {} bytes",
                self.site, SITE_LEN
            )));
        }
        if self.timing.gossip_jitter_ms == 0 {
            return Err(ConfigError::Invalid("timing.gossip_jitter_ms must be non-zero".into()));
        }
        if self.timing.backoff_initial_ms == 0 || self.timing.backoff_initial_ms > self.timing.backoff_max_ms {
            return Err(ConfigError::Invalid(
                "timing.backoff_initial_ms must be in 1..=backoff_max_ms".into(),
            ));
        }
        if self.dedup.capacity == 0 {
            return Err(ConfigError::Invalid("dedup.capacity must be non-zero".into()));
        }
        if self.sensors.line_max == 0 {
            return Err(ConfigError::Invalid("sensors.line_max must be non-zero".into()));
        }
        if self.sensors.request_len == 0 || self.sensors.request_len > self.sensors.line_max {
            return Err(ConfigError::Invalid(
                "sensors.request_len must be in 1..=line_max".into(),
            ));
        }
        Ok(())
    }

    pub fn with_floor(mut self, floor_id: u8) -> Self {
        self.floor_id = floor_id;
        self
    }

    pub fn with_site(mut self, site: impl Into<String>, namespace: impl Into<String>) -> Self {
        self.site = site.into();
        self.namespace = namespace.into();
        self
    }

    pub fn with_capacity(mut self, capacity: Capacity) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_room_endpoints(mut self, endpoints: Vec<u8>) -> Self {
        self.sensors.room_endpoints = endpoints;
        self
    }

    /// Set broker endpoint
    pub fn with_broker(mut self, host: impl Into<String>, port: u16) -> Self {
        self.broker.host = host.into();
        self.broker.port = port;
        self
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.broker.client_id = client_id.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = NodeConfig::default();
        assert_eq!(config.site, "ELEC520");
        assert_eq!(config.namespace, "security");
        assert_eq!(config.floor_id, 1);
        assert_eq!(config.timing.gossip_base_ms, 100);
        assert_eq!(config.timing.peer_timeout_ms, 3000);
        assert_eq!(config.sensors.room_endpoints[..3], [0x21, 0x22, 0x23]);
        assert_eq!(config.dedup.capacity, 32);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = NodeConfig::default()
            .with_floor(3)
            .with_site("LAB", "alarm")
            .with_broker("broker.local", 8883)
            .with_client_id("floor3");

        assert_eq!(config.floor_id, 3);
        assert_eq!(config.namespace().prefix(), "LAB/alarm/");
        assert_eq!(config.broker.host, "broker.local");
        assert_eq!(config.broker.port, 8883);
        assert_eq!(config.broker.client_id, "floor3");
    }

    #[test]
    fn test_partial_json() {
        let config = NodeConfig::from_json(
            r#"{ "floor_id": 2, "timing": { "summary_ms": 500 }, "capacity": { "rooms": 4 } }"#,
        )
        .unwrap();

        assert_eq!(config.floor_id, 2);
        assert_eq!(config.timing.summary_ms, 500);
        assert_eq!(config.timing.gossip_base_ms, 100);
        assert_eq!(config.capacity.rooms, 4);
        assert_eq!(config.capacity.floors, 8);
    }

    #[test]
    fn test_bad_json() {
        assert!(matches!(NodeConfig::from_json("{ floor_id"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_validate_rejects() {
        let zero = NodeConfig::default().with_capacity(Capacity { floors: 0, rooms: 8, sensors: 8 });
        assert!(zero.validate().is_err());

        let huge = NodeConfig::default().with_capacity(Capacity { floors: 8, rooms: 300, sensors: 8 });
        assert!(huge.validate().is_err());

        assert!(NodeConfig::default().with_floor(8).validate().is_err());
        assert!(NodeConfig::default().with_site("", "x").validate().is_err());
        assert!(NodeConfig::default().with_site("TOO-LONG-SITE", "x").validate().is_err());

        let mut no_jitter = NodeConfig::default();
        no_jitter.timing.gossip_jitter_ms = 0;
        assert!(no_jitter.validate().is_err());

        let mut long_request = NodeConfig::default();
        long_request.sensors.request_len = long_request.sensors.line_max + 1;
        assert!(long_request.validate().is_err());
        long_request.sensors.request_len = 0;
        assert!(long_request.validate().is_err());
    }
}
