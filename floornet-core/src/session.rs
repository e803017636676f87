//! Broker link management
//!
//! Leaders keep a broker session up; followers drop it but keep the
//! broadcast transport alive. Connection attempts are paced by exponential
//! backoff checked each tick, so nothing here ever waits.

use crate::config::BrokerConfig;
use crate::hal::NetworkSession;
use crate::types::{Millis, Role};
use tracing::{debug, error, info};

/// Initial reconnect delay (ms)
pub const BACKOFF_INITIAL_MS: Millis = 500;

/// Reconnect delay cap (ms)
pub const BACKOFF_MAX_MS: Millis = 10_000;

/// Reconnect pacing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffConfig {
    pub initial: Millis,
    pub max: Millis,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: BACKOFF_INITIAL_MS,
            max: BACKOFF_MAX_MS,
        }
    }
}

/// Non-blocking connect/backoff state machine for the broker session
#[derive(Debug, Clone)]
pub struct BrokerLink {
    broker: BrokerConfig,
    backoff: BackoffConfig,
    delay: Millis,
    next_attempt: Millis,
    attempts: u32,
}

impl BrokerLink {
    pub fn new(broker: BrokerConfig, backoff: BackoffConfig) -> Self {
        Self {
            broker,
            backoff,
            delay: backoff.initial,
            next_attempt: 0,
            attempts: 0,
        }
    }

    /// Delay applied after the next failure
    pub fn current_backoff(&self) -> Millis {
        self.delay
    }

    pub fn next_attempt(&self) -> Millis {
        self.next_attempt
    }

    /// Connect attempts made so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Bring the session in line with `role`
    pub fn ensure<S: NetworkSession + ?Sized>(&mut self, role: Role, session: &mut S, now: Millis) {
        if role == Role::Follower {
            if session.connected() {
                info!("Follower: disconnecting broker session (broadcast stays up)");
                session.disconnect();
            }
            return;
        }

        if session.connected() {
            return;
        }
        if now < self.next_attempt {
            return;
        }

        self.attempts += 1;
        debug!(
            "Broker connect cid={} host={}:{}",
            self.broker.client_id, self.broker.host, self.broker.port
        );
        match session.connect(&self.broker) {
            Ok(()) => {
                self.delay = self.backoff.initial;
                self.next_attempt = now;
                info!("Broker connected ({}:{})", self.broker.host, self.broker.port);
            }
            Err(e) => {
                error!("Broker connect failed: {}; retrying in {}ms", e, self.delay);
                self.next_attempt = now + self.delay;
                self.delay = (self.delay * 2).min(self.backoff.max);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::RecordingSession;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let mut link = BrokerLink::new(BrokerConfig::default(), BackoffConfig::default());
        let mut session = RecordingSession::failing(100);

        link.ensure(Role::Leader, &mut session, 0);
        assert_eq!(link.next_attempt(), 500);
        assert_eq!(link.current_backoff(), 1000);

        // too early: no new attempt
        link.ensure(Role::Leader, &mut session, 499);
        assert_eq!(session.connect_attempts, 1);

        let mut now = 500;
        for _ in 0..10 {
            link.ensure(Role::Leader, &mut session, now);
            now = link.next_attempt();
        }
        assert_eq!(link.current_backoff(), BACKOFF_MAX_MS);
    }

    #[test]
    fn test_backoff_resets_on_success() {
        let mut link = BrokerLink::new(BrokerConfig::default(), BackoffConfig::default());
        let mut session = RecordingSession::failing(2);

        link.ensure(Role::Leader, &mut session, 0);
        link.ensure(Role::Leader, &mut session, 500);
        assert_eq!(link.current_backoff(), 2000);

        link.ensure(Role::Leader, &mut session, 1500);
        assert!(session.connected());
        assert_eq!(link.current_backoff(), BACKOFF_INITIAL_MS);
    }

    #[test]
    fn test_follower_disconnects() {
        let mut link = BrokerLink::new(BrokerConfig::default(), BackoffConfig::default());
        let mut session = RecordingSession::default();

        link.ensure(Role::Leader, &mut session, 0);
        assert!(session.connected());

        link.ensure(Role::Follower, &mut session, 10);
        assert!(!session.connected());
        assert_eq!(session.connect_attempts, 1);
    }
}
