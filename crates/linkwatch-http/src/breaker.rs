//! Per-service circuit breaker over a time-based sliding window.
//!
//! * **Closed** — calls pass; outcomes are recorded. Once the window holds at
//!   least `min_calls` outcomes and the failure rate reaches
//!   `fail_rate_percent`, the breaker opens.
//! * **Open** — calls are rejected until `open_state_duration` has elapsed.
//! * **Half-open** — up to `half_open_calls` probes are admitted. All of them
//!   succeeding closes the breaker; any failure reopens it. A probe whose
//!   [`Permit`] is dropped unsettled frees its slot.

use std::{
  collections::{HashMap, VecDeque},
  sync::{Arc, Mutex, MutexGuard, PoisonError},
  time::{Duration, Instant},
};

use tracing::{debug, info, warn};

/// Breaker thresholds shared by every service.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
  pub sliding_window:      Duration,
  pub min_calls:           usize,
  pub fail_rate_percent:   u8,
  pub half_open_calls:     usize,
  pub open_state_duration: Duration,
}

impl Default for BreakerConfig {
  fn default() -> Self {
    Self {
      sliding_window:      Duration::from_secs(60),
      min_calls:           10,
      fail_rate_percent:   50,
      half_open_calls:     3,
      open_state_duration: Duration::from_secs(30),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
  Closed,
  Open,
  HalfOpen,
}

#[derive(Debug)]
enum State {
  Closed,
  Open { until: Instant },
  /// `trial` numbers each half-open episode so stale permits are ignored.
  HalfOpen { trial: u64, admitted: usize, succeeded: usize },
}

#[derive(Debug)]
struct Inner {
  state:    State,
  /// `(recorded_at, success)` pairs inside the sliding window.
  outcomes: VecDeque<(Instant, bool)>,
  trials:   u64,
}

#[derive(Debug)]
pub struct CircuitBreaker {
  service: String,
  config:  BreakerConfig,
  inner:   Mutex<Inner>,
}

/// Admission for one call.
///
/// Settle it with [`Permit::record`]. A permit dropped unsettled, because the
/// call was cancelled or never sent, gives its half-open slot back.
#[derive(Debug)]
#[must_use = "an unsettled permit records nothing"]
pub struct Permit<'a> {
  breaker: &'a CircuitBreaker,
  trial:   Option<u64>,
  settled: bool,
}

impl Permit<'_> {
  /// Record the outcome of the admitted call.
  pub fn record(self, success: bool) {
    self.record_at(Instant::now(), success)
  }

  fn record_at(mut self, now: Instant, success: bool) {
    self.settled = true;
    self.breaker.settle(now, self.trial, success);
  }
}

impl Drop for Permit<'_> {
  fn drop(&mut self) {
    if !self.settled {
      self.breaker.release(self.trial);
    }
  }
}

impl CircuitBreaker {
  pub fn new(service: impl Into<String>, config: BreakerConfig) -> Self {
    Self {
      service: service.into(),
      config,
      inner: Mutex::new(Inner { state: State::Closed, outcomes: VecDeque::new(), trials: 0 }),
    }
  }

  pub fn service(&self) -> &str { &self.service }

  pub fn state(&self) -> BreakerState {
    self.state_at(Instant::now())
  }

  /// Ask permission for one call. `None` means the breaker is open.
  pub fn try_acquire(&self) -> Option<Permit<'_>> {
    self.try_acquire_at(Instant::now())
  }

  fn lock(&self) -> MutexGuard<'_, Inner> {
    self.inner.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn state_at(&self, now: Instant) -> BreakerState {
    match self.lock().state {
      State::Closed => BreakerState::Closed,
      State::Open { until } if now >= until => BreakerState::HalfOpen,
      State::Open { .. } => BreakerState::Open,
      State::HalfOpen { .. } => BreakerState::HalfOpen,
    }
  }

  fn try_acquire_at(&self, now: Instant) -> Option<Permit<'_>> {
    let mut inner = self.lock();
    let trial = match inner.state {
      State::Closed => None,
      State::Open { until } if now >= until => {
        info!(service = %self.service, "circuit breaker half-open");
        inner.trials += 1;
        let trial = inner.trials;
        inner.state = State::HalfOpen { trial, admitted: 1, succeeded: 0 };
        Some(trial)
      }
      State::Open { .. } => return None,
      State::HalfOpen { trial, admitted, succeeded } => {
        if admitted >= self.config.half_open_calls.max(1) {
          return None;
        }
        inner.state = State::HalfOpen { trial, admitted: admitted + 1, succeeded };
        Some(trial)
      }
    };
    Some(Permit { breaker: self, trial, settled: false })
  }

  fn settle(&self, now: Instant, permit_trial: Option<u64>, success: bool) {
    let mut inner = self.lock();
    match inner.state {
      State::HalfOpen { trial, admitted, succeeded } if permit_trial == Some(trial) => {
        if !success {
          self.open(&mut inner, now);
        } else if succeeded + 1 >= self.config.half_open_calls.max(1) {
          info!(service = %self.service, "circuit breaker closed");
          inner.state = State::Closed;
          inner.outcomes.clear();
        } else {
          inner.state = State::HalfOpen { trial, admitted, succeeded: succeeded + 1 };
        }
      }
      State::Closed if permit_trial.is_none() => {
        inner.outcomes.push_back((now, success));
        while let Some(&(at, _)) = inner.outcomes.front() {
          if now.duration_since(at) > self.config.sliding_window {
            inner.outcomes.pop_front();
          } else {
            break;
          }
        }

        let calls = inner.outcomes.len();
        let failures = inner.outcomes.iter().filter(|(_, ok)| !ok).count();
        if calls >= self.config.min_calls
          && failures * 100 >= usize::from(self.config.fail_rate_percent) * calls
        {
          self.open(&mut inner, now);
        }
      }
      // A late outcome from an earlier state.
      _ => {}
    }
  }

  fn release(&self, permit_trial: Option<u64>) {
    let mut inner = self.lock();
    match inner.state {
      State::HalfOpen { trial, admitted, succeeded } if permit_trial == Some(trial) => {
        debug!(service = %self.service, "half-open call abandoned");
        inner.state =
          State::HalfOpen { trial, admitted: admitted.saturating_sub(1), succeeded };
      }
      _ => {}
    }
  }

  fn open(&self, inner: &mut Inner, now: Instant) {
    warn!(
      service = %self.service,
      open_for = ?self.config.open_state_duration,
      "circuit breaker opened"
    );
    inner.state = State::Open { until: now + self.config.open_state_duration };
    inner.outcomes.clear();
  }
}

// ─── Registry ────────────────────────────────────────────────────────────────

/// Breakers keyed by logical service name, created on first use.
#[derive(Debug, Default)]
pub struct BreakerRegistry {
  config:   BreakerConfig,
  breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
  pub fn new(config: BreakerConfig) -> Self {
    Self { config, breakers: Mutex::default() }
  }

  pub fn get(&self, service: &str) -> Arc<CircuitBreaker> {
    let mut breakers = self.breakers.lock().unwrap_or_else(PoisonError::into_inner);
    breakers
      .entry(service.to_owned())
      .or_insert_with(|| Arc::new(CircuitBreaker::new(service, self.config.clone())))
      .clone()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn config() -> BreakerConfig {
    BreakerConfig {
      sliding_window:      Duration::from_secs(10),
      min_calls:           4,
      fail_rate_percent:   50,
      half_open_calls:     2,
      open_state_duration: Duration::from_secs(5),
    }
  }

  /// One admitted call with the given outcome.
  fn call(cb: &CircuitBreaker, at: Instant, ok: bool) {
    cb.try_acquire_at(at).expect("admitted").record_at(at, ok);
  }

  fn tripped() -> (CircuitBreaker, Instant) {
    let cb = CircuitBreaker::new("svc", config());
    let t0 = Instant::now();
    for _ in 0..4 {
      call(&cb, t0, false);
    }
    (cb, t0)
  }

  #[test]
  fn stays_closed_below_min_calls() {
    let cb = CircuitBreaker::new("svc", config());
    let t0 = Instant::now();
    for _ in 0..3 {
      call(&cb, t0, false);
    }
    assert_eq!(cb.state_at(t0), BreakerState::Closed);
  }

  #[test]
  fn opens_at_failure_rate_and_rejects() {
    let cb = CircuitBreaker::new("svc", config());
    let t0 = Instant::now();
    for ok in [true, false, true, false] {
      call(&cb, t0, ok);
    }
    assert_eq!(cb.state_at(t0), BreakerState::Open);
    assert!(cb.try_acquire_at(t0 + Duration::from_secs(1)).is_none());
  }

  #[test]
  fn old_outcomes_leave_the_window() {
    let cb = CircuitBreaker::new("svc", config());
    let t0 = Instant::now();
    for _ in 0..3 {
      call(&cb, t0, false);
    }
    // The three failures have aged out; one failure among fresh successes.
    let later = t0 + Duration::from_secs(11);
    for ok in [true, true, true, false] {
      call(&cb, later, ok);
    }
    assert_eq!(cb.state_at(later), BreakerState::Closed);
  }

  #[test]
  fn half_open_closes_after_successful_probes() {
    let (cb, t0) = tripped();
    let t1 = t0 + Duration::from_secs(5);
    assert_eq!(cb.state_at(t1), BreakerState::HalfOpen);

    let first = cb.try_acquire_at(t1).expect("first probe");
    let second = cb.try_acquire_at(t1).expect("second probe");
    // Only `half_open_calls` probes are admitted.
    assert!(cb.try_acquire_at(t1).is_none());

    first.record_at(t1, true);
    assert_eq!(cb.state_at(t1), BreakerState::HalfOpen);
    second.record_at(t1, true);
    assert_eq!(cb.state_at(t1), BreakerState::Closed);
  }

  #[test]
  fn half_open_failure_reopens() {
    let (cb, t0) = tripped();
    let t1 = t0 + Duration::from_secs(6);
    cb.try_acquire_at(t1).expect("probe").record_at(t1, false);
    assert_eq!(cb.state_at(t1), BreakerState::Open);
    assert!(cb.try_acquire_at(t1 + Duration::from_secs(1)).is_none());
  }

  #[test]
  fn dropped_probe_frees_its_slot() {
    let (cb, t0) = tripped();
    let t1 = t0 + Duration::from_secs(5);

    let first = cb.try_acquire_at(t1).expect("first probe");
    let second = cb.try_acquire_at(t1).expect("second probe");
    assert!(cb.try_acquire_at(t1).is_none());

    drop(first);
    assert_eq!(cb.state_at(t1), BreakerState::HalfOpen);
    let replacement = cb.try_acquire_at(t1).expect("slot given back");

    second.record_at(t1, true);
    replacement.record_at(t1, true);
    assert_eq!(cb.state_at(t1), BreakerState::Closed);
  }

  #[test]
  fn stale_permits_do_not_touch_a_later_state() {
    let cb = CircuitBreaker::new("svc", config());
    let t0 = Instant::now();
    let closed_era = cb.try_acquire_at(t0).expect("closed");
    for _ in 0..4 {
      call(&cb, t0, false);
    }

    let t1 = t0 + Duration::from_secs(5);
    let probe = cb.try_acquire_at(t1).expect("probe");
    // An outcome admitted while closed neither counts as a probe result nor
    // frees a probe slot.
    closed_era.record_at(t1, true);
    assert_eq!(cb.state_at(t1), BreakerState::HalfOpen);

    drop(probe);
    let again = cb.try_acquire_at(t1).expect("probe slot");
    let last = cb.try_acquire_at(t1).expect("second slot");
    assert!(cb.try_acquire_at(t1).is_none());
    again.record_at(t1, true);
    last.record_at(t1, true);
    assert_eq!(cb.state_at(t1), BreakerState::Closed);
  }

  #[test]
  fn registry_shares_breaker_per_service() {
    let registry = BreakerRegistry::new(config());
    let a = registry.get("github");
    let b = registry.get("github");
    let c = registry.get("stackoverflow");
    assert!(Arc::ptr_eq(&a, &b));
    assert!(!Arc::ptr_eq(&a, &c));
    assert_eq!(c.service(), "stackoverflow");
  }
}
