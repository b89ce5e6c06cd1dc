//! Bounded readiness polling for eventually-consistent directory objects.
//!
//! A just-created application is not immediately visible to the APIs that
//! depend on it (consent, permission grants). The poller re-probes until the
//! object is queryable or the attempt budget runs out. Attempts are
//! sequential and unthrottled; each probe's round trip is the only pacing.

/// Attempt budget used when the caller does not override it.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 40;

/// Result of a polling run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The probe reported the object visible on attempt `attempts`.
    Ready { attempts: u32 },
    /// The budget was exhausted without the object becoming visible.
    Exhausted { attempts: u32 },
}

impl PollOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, PollOutcome::Ready { .. })
    }
}

/// Probe until `probe` reports readiness or `max_attempts` is reached.
///
/// The probe receives the 1-based attempt number and returns whether the
/// object was visible. Probe errors are the caller's concern: map them to
/// `false` before handing the closure in so a transient query failure
/// consumes an attempt instead of aborting the wait.
pub fn wait_until_ready<P>(max_attempts: u32, mut probe: P) -> PollOutcome
where
    P: FnMut(u32) -> bool,
{
    for attempt in 1..=max_attempts {
        if probe(attempt) {
            return PollOutcome::Ready { attempts: attempt };
        }
    }
    PollOutcome::Exhausted {
        attempts: max_attempts,
    }
}
