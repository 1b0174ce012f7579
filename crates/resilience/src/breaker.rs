//! Circuit breaker registry - per-dependency failure isolation.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub reset_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            reset_timeout: Duration::from_secs(60),
        }
    }
}

struct BreakerEntry {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_state_change: Instant,
    config: BreakerConfig,
}

impl BreakerEntry {
    fn new(config: BreakerConfig) -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_state_change: Instant::now(),
            config,
        }
    }

    fn trip_open(&mut self) {
        self.state = CircuitState::Open;
        self.success_count = 0;
        self.last_state_change = Instant::now();
    }
}

/// Tracks one breaker state machine per guarded dependency key. Entries are
/// created lazily on first use and live for the registry's lifetime.
pub struct CircuitBreakerRegistry {
    breakers: Mutex<HashMap<String, BreakerEntry>>,
    default_config: BreakerConfig,
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}

impl CircuitBreakerRegistry {
    pub fn new(default_config: BreakerConfig) -> Self {
        Self {
            breakers: Mutex::new(HashMap::new()),
            default_config,
        }
    }

    /// Register a key with its own thresholds, replacing any existing state.
    pub fn init_key(&self, key: &str, config: BreakerConfig) {
        self.breakers
            .lock()
            .insert(key.to_string(), BreakerEntry::new(config));
    }

    /// Whether a call to the guarded dependency may proceed. An Open breaker
    /// whose reset timeout has elapsed transitions to HalfOpen here, and the
    /// permitted call acts as the recovery probe.
    pub fn can_perform_operation(&self, key: &str) -> bool {
        let mut breakers = self.breakers.lock();
        let entry = breakers
            .entry(key.to_string())
            .or_insert_with(|| BreakerEntry::new(self.default_config.clone()));

        match entry.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                if entry.last_state_change.elapsed() >= entry.config.reset_timeout {
                    entry.state = CircuitState::HalfOpen;
                    entry.success_count = 0;
                    entry.last_state_change = Instant::now();
                    info!("circuit breaker {} entering half-open probe", key);
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self, key: &str) {
        let mut breakers = self.breakers.lock();
        let Some(entry) = breakers.get_mut(key) else {
            return;
        };

        match entry.state {
            CircuitState::Closed => entry.failure_count = 0,
            CircuitState::HalfOpen => {
                entry.success_count += 1;
                if entry.success_count >= entry.config.success_threshold {
                    entry.state = CircuitState::Closed;
                    entry.failure_count = 0;
                    entry.success_count = 0;
                    entry.last_state_change = Instant::now();
                    info!("circuit breaker {} closed after successful probes", key);
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self, key: &str) {
        let mut breakers = self.breakers.lock();
        let entry = breakers
            .entry(key.to_string())
            .or_insert_with(|| BreakerEntry::new(self.default_config.clone()));

        match entry.state {
            CircuitState::Closed => {
                entry.failure_count += 1;
                if entry.failure_count >= entry.config.failure_threshold {
                    warn!(
                        "circuit breaker {} opened after {} consecutive failures",
                        key, entry.failure_count
                    );
                    entry.trip_open();
                }
            }
            // A half-open probe tolerates no failures.
            CircuitState::HalfOpen => {
                warn!("circuit breaker {} reopened by failed probe", key);
                entry.trip_open();
            }
            CircuitState::Open => {}
        }
    }

    pub fn state_of(&self, key: &str) -> Option<CircuitState> {
        self.breakers.lock().get(key).map(|entry| entry.state)
    }
}
