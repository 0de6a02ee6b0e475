//! Circuit breaker for completion oracle calls
//!
//! After a run of consecutive outages the breaker opens and oracle calls
//! fail fast instead of waiting out another timeout. Once the cool-down
//! elapses a single probe is admitted; its outcome closes or reopens the
//! circuit. A probe that is cancelled before finishing frees the slot for
//! the next caller. The breaker never retries a call itself.

use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Externally visible breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        })
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive outages before the circuit opens
    pub failure_threshold: u32,
    /// How long the circuit stays open before a probe is admitted
    pub open_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Closed { consecutive_failures: u32 },
    Open { since: Instant },
    /// Cool-down elapsed; `probing` is true while the single probe is in flight.
    HalfOpen { probing: bool },
}

#[derive(Debug)]
struct Inner {
    phase: Phase,
    times_opened: u64,
    rejected: u64,
}

/// Why a guarded call did not produce a value.
#[derive(Debug, PartialEq)]
pub enum CircuitBreakerError<E> {
    /// The circuit refused the call without running it
    Rejected,
    /// The call ran and failed
    Inner(E),
}

/// Breaker guarding one external dependency.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: &'static str,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: &'static str, config: CircuitBreakerConfig) -> Self {
        Self {
            name,
            config,
            inner: Mutex::new(Inner {
                phase: Phase::Closed {
                    consecutive_failures: 0,
                },
                times_opened: 0,
                rejected: 0,
            }),
        }
    }

    pub fn state(&self) -> CircuitState {
        let mut inner = self.lock();
        self.cool_down(&mut inner);
        match inner.phase {
            Phase::Closed { .. } => CircuitState::Closed,
            Phase::Open { .. } => CircuitState::Open,
            Phase::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }

    pub fn times_opened(&self) -> u64 {
        self.lock().times_opened
    }

    pub fn rejected(&self) -> u64 {
        self.lock().rejected
    }

    /// Run `call` unless the circuit refuses it.
    ///
    /// Only errors for which `is_outage` returns true count against the
    /// circuit; any other outcome proves the dependency is reachable.
    pub async fn guard<T, E, F>(
        &self,
        call: F,
        is_outage: impl Fn(&E) -> bool,
    ) -> Result<T, CircuitBreakerError<E>>
    where
        F: Future<Output = Result<T, E>>,
    {
        if !self.admit() {
            return Err(CircuitBreakerError::Rejected);
        }

        let in_flight = InFlight {
            breaker: self,
            settled: false,
        };
        let result = call.await;
        in_flight.finish(matches!(&result, Err(e) if is_outage(e)));
        result.map_err(CircuitBreakerError::Inner)
    }

    fn admit(&self) -> bool {
        let mut inner = self.lock();
        self.cool_down(&mut inner);

        let admitted = match &mut inner.phase {
            Phase::Closed { .. } => true,
            Phase::Open { .. } => false,
            Phase::HalfOpen { probing } if !*probing => {
                *probing = true;
                true
            }
            Phase::HalfOpen { .. } => false,
        };
        if !admitted {
            inner.rejected += 1;
        }
        admitted
    }

    fn settle(&self, outage: bool) {
        let mut inner = self.lock();
        let next = match (inner.phase, outage) {
            (Phase::Closed { .. }, false) => Phase::Closed {
                consecutive_failures: 0,
            },
            (Phase::Closed { consecutive_failures }, true)
                if consecutive_failures + 1 < self.config.failure_threshold =>
            {
                Phase::Closed {
                    consecutive_failures: consecutive_failures + 1,
                }
            }
            (Phase::HalfOpen { .. }, false) => {
                tracing::info!(circuit = self.name, "Circuit breaker closed");
                Phase::Closed {
                    consecutive_failures: 0,
                }
            }
            (Phase::Closed { .. } | Phase::HalfOpen { .. }, true) => {
                inner.times_opened += 1;
                tracing::warn!(
                    circuit = self.name,
                    open_for = ?self.config.open_timeout,
                    "Circuit breaker opened"
                );
                Phase::Open {
                    since: Instant::now(),
                }
            }
            // A call admitted before the circuit opened finished late
            (open @ Phase::Open { .. }, _) => open,
        };
        inner.phase = next;
    }

    /// A guarded call was dropped before it produced an outcome.
    fn abandon(&self) {
        let mut inner = self.lock();
        if let Phase::HalfOpen { probing: true } = inner.phase {
            tracing::debug!(circuit = self.name, "Probe cancelled, admitting another");
            inner.phase = Phase::HalfOpen { probing: false };
        }
    }

    fn cool_down(&self, inner: &mut Inner) {
        if let Phase::Open { since } = inner.phase {
            if since.elapsed() >= self.config.open_timeout {
                tracing::info!(circuit = self.name, "Circuit breaker half-open, admitting a probe");
                inner.phase = Phase::HalfOpen { probing: false };
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // State is a plain value; a panic elsewhere cannot leave it torn
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Settles an admitted call, or abandons it if dropped unfinished.
struct InFlight<'a> {
    breaker: &'a CircuitBreaker,
    settled: bool,
}

impl InFlight<'_> {
    fn finish(mut self, outage: bool) {
        self.breaker.settle(outage);
        self.settled = true;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.abandon();
        }
    }
}
