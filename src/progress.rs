//! Observer trait for conversion-job lifecycle events.
//!
//! Inject an [`Arc<dyn JobObserver>`] via
//! [`crate::config::ServiceConfigBuilder::observer`] to receive every state
//! transition a job makes, from `Received` through `Cleaned`.
//!
//! # Example
//!
//! ```rust
//! use edgequake_docconv::{JobObserver, JobState, ServiceConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//! use uuid::Uuid;
//!
//! struct CountingObserver {
//!     cleaned: AtomicUsize,
//! }
//!
//! impl JobObserver for CountingObserver {
//!     fn on_transition(&self, _job: Uuid, _from: JobState, to: JobState) {
//!         if to == JobState::Cleaned {
//!             self.cleaned.fetch_add(1, Ordering::SeqCst);
//!         }
//!     }
//! }
//!
//! let observer = Arc::new(CountingObserver { cleaned: AtomicUsize::new(0) });
//!
//! let config = ServiceConfig::builder()
//!     .observer(observer as Arc<dyn JobObserver>)
//!     .build()
//!     .unwrap();
//! ```

use crate::job::JobState;
use std::sync::Arc;
use uuid::Uuid;

/// Called by a [`crate::job::ConversionJob`] as it moves through its states.
///
/// Jobs run concurrently, one per request, so implementations must be
/// `Send + Sync` and synchronise their own state. All methods default to
/// no-ops.
pub trait JobObserver: Send + Sync {
    /// Called on every state change, including the final move to `Cleaned`.
    fn on_transition(&self, job: Uuid, from: JobState, to: JobState) {
        let _ = (job, from, to);
    }

    /// Called once per job after cleanup, with the last non-`Cleaned` state
    /// (`Responding` on success, one of the failure states otherwise).
    fn on_job_complete(&self, job: Uuid, outcome: JobState) {
        let _ = (job, outcome);
    }
}

/// Default observer when none is configured.
pub struct NoopObserver;

impl JobObserver for NoopObserver {}

/// Convenience alias matching the type stored in [`crate::config::ServiceConfig`].
pub type JobObserverRef = Arc<dyn JobObserver>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingObserver {
        transitions: Mutex<Vec<(JobState, JobState)>>,
        outcomes: Mutex<Vec<JobState>>,
    }

    impl JobObserver for RecordingObserver {
        fn on_transition(&self, _job: Uuid, from: JobState, to: JobState) {
            self.transitions.lock().unwrap().push((from, to));
        }

        fn on_job_complete(&self, _job: Uuid, outcome: JobState) {
            self.outcomes.lock().unwrap().push(outcome);
        }
    }

    #[test]
    fn noop_observer_does_not_panic() {
        let obs = NoopObserver;
        let id = Uuid::new_v4();
        obs.on_transition(id, JobState::Received, JobState::Validated);
        obs.on_job_complete(id, JobState::FailedConversion);
    }

    #[test]
    fn recording_observer_receives_events() {
        let obs = RecordingObserver::default();
        let id = Uuid::new_v4();
        obs.on_transition(id, JobState::Received, JobState::Validated);
        obs.on_transition(id, JobState::Validated, JobState::Converting);
        obs.on_job_complete(id, JobState::FailedConversion);

        assert_eq!(obs.transitions.lock().unwrap().len(), 2);
        assert_eq!(
            obs.outcomes.lock().unwrap().as_slice(),
            &[JobState::FailedConversion]
        );
    }

    #[test]
    fn arc_dyn_observer_works() {
        let obs: JobObserverRef = Arc::new(NoopObserver);
        obs.on_transition(Uuid::new_v4(), JobState::Verifying, JobState::Responding);
    }
}
