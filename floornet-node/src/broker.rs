//! Console broker session
//!
//! Prints every publish to stdout as one JSON object per line, for piping
//! into a real broker bridge or a log collector. Connection setup is
//! simulated: the first `fail_first` attempts are refused so the reconnect
//! backoff can be observed.

use chrono::{DateTime, Utc};
use floornet_core::config::BrokerConfig;
use floornet_core::error::SessionError;
use floornet_core::hal::NetworkSession;
use serde::Serialize;
use std::io::Write;
use tracing::{debug, info, warn};

/// One published message
#[derive(Debug, Serialize)]
pub struct Publication<'a> {
    pub at: DateTime<Utc>,
    pub client_id: &'a str,
    pub topic: &'a str,
    pub payload: &'a str,
}

pub struct ConsoleBroker<W: Write> {
    out: W,
    client_id: Option<String>,
    fail_first: u32,
    attempts: u32,
}

impl ConsoleBroker<std::io::Stdout> {
    pub fn stdout(fail_first: u32) -> Self {
        Self::new(std::io::stdout(), fail_first)
    }
}

impl<W: Write> ConsoleBroker<W> {
    pub fn new(out: W, fail_first: u32) -> Self {
        Self {
            out,
            client_id: None,
            fail_first,
            attempts: 0,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> NetworkSession for ConsoleBroker<W> {
    fn connect(&mut self, broker: &BrokerConfig) -> Result<(), SessionError> {
        self.attempts += 1;
        if self.attempts <= self.fail_first {
            return Err(SessionError::Unavailable);
        }
        if broker.client_id.is_empty() {
            return Err(SessionError::Rejected("empty client id".into()));
        }
        info!(
            "Console broker session open as '{}' (for {}:{})",
            broker.client_id, broker.host, broker.port
        );
        self.client_id = Some(broker.client_id.clone());
        Ok(())
    }

    fn disconnect(&mut self) {
        if let Some(id) = self.client_id.take() {
            info!("Console broker session '{}' closed", id);
        }
    }

    fn connected(&self) -> bool {
        self.client_id.is_some()
    }

    fn publish(&mut self, topic: &str, payload: &str) -> bool {
        let Some(client_id) = self.client_id.as_deref() else {
            return false;
        };
        let record = Publication {
            at: Utc::now(),
            client_id,
            topic,
            payload,
        };
        let line = match serde_json::to_string(&record) {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to serialize publication: {}", e);
                return false;
            }
        };
        match writeln!(self.out, "{}", line).and_then(|_| self.out.flush()) {
            Ok(()) => true,
            Err(e) => {
                warn!("Console broker write failed: {}", e);
                false
            }
        }
    }

    fn poll(&mut self) {
        debug!("Console broker poll");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_writes_json_line() {
        let mut broker = ConsoleBroker::new(Vec::new(), 0);
        assert!(!broker.publish("t", "p"));

        broker.connect(&BrokerConfig::default()).unwrap();
        assert!(broker.publish("ELEC520/security/f/1", "ELEC520/security/f/1/cs:1"));

        let out = String::from_utf8(broker.into_inner()).unwrap();
        let value: serde_json::Value = serde_json::from_str(out.trim_end()).unwrap();
        assert_eq!(value["topic"], "ELEC520/security/f/1");
        assert_eq!(value["payload"], "ELEC520/security/f/1/cs:1");
        assert_eq!(value["client_id"], "floornet-node");
    }

    #[test]
    fn test_refuses_first_attempts() {
        let mut broker = ConsoleBroker::new(Vec::new(), 2);
        let config = BrokerConfig::default();
        assert_eq!(broker.connect(&config), Err(SessionError::Unavailable));
        assert_eq!(broker.connect(&config), Err(SessionError::Unavailable));
        assert!(broker.connect(&config).is_ok());
        assert!(broker.connected());

        broker.disconnect();
        assert!(!broker.connected());
    }
}
