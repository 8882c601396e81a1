// Polling wait for schedule firings

use crate::config::TriggerConfig;
use crate::errors::TriggerError;
use crate::models::{JobHandle, ScheduleHandle};
use crate::schedule::FireWindow;
use crate::scheduler::JobManager;
use crate::telemetry;
use chrono::Utc;
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Shortest pause between two polls
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Options for `wait_for_trigger`
#[derive(Debug, Clone)]
pub struct WaitOptions {
    pub required_firings: u32,
    /// Never below `MIN_POLL_INTERVAL`
    pub poll_interval: Duration,
    /// `Duration::MAX` waits until a firing or cancellation
    pub timeout: Duration,
    /// Jobs that existed before the wait started and must not count
    pub known_jobs: HashSet<JobHandle>,
    pub expected_window: Option<FireWindow>,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self::from(&TriggerConfig::default())
    }
}

impl From<&TriggerConfig> for WaitOptions {
    fn from(config: &TriggerConfig) -> Self {
        Self {
            required_firings: 1,
            poll_interval: Duration::from_secs(config.poll_interval_seconds).max(MIN_POLL_INTERVAL),
            timeout: Duration::from_secs(config.timeout_seconds),
            known_jobs: HashSet::new(),
            expected_window: None,
        }
    }
}

impl WaitOptions {
    pub fn required_firings(mut self, count: u32) -> Self {
        self.required_firings = count.max(1);
        self
    }

    /// Pause between polls, raised to `MIN_POLL_INTERVAL` if shorter
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(MIN_POLL_INTERVAL);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn known_jobs<I: IntoIterator<Item = JobHandle>>(mut self, jobs: I) -> Self {
        self.known_jobs.extend(jobs);
        self
    }

    pub fn expected_window(mut self, window: FireWindow) -> Self {
        self.expected_window = Some(window);
        self
    }
}

/// Where a wait ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitPhase {
    Waiting,
    Satisfied,
    TimedOut,
    Cancelled,
}

/// Progress of one wait on one schedule
#[derive(Debug, Clone)]
pub struct TriggerWaitState {
    pub handle: ScheduleHandle,
    pub expected_window: Option<FireWindow>,
    /// New jobs in the order they were first seen
    pub observed: Vec<JobHandle>,
    pub required: u32,
    pub polls: u32,
    pub phase: WaitPhase,
}

impl TriggerWaitState {
    pub fn new(handle: ScheduleHandle, options: &WaitOptions) -> Self {
        Self {
            handle,
            expected_window: options.expected_window,
            observed: Vec::new(),
            required: options.required_firings.max(1),
            polls: 0,
            phase: WaitPhase::Waiting,
        }
    }

    /// Record a polled job; returns true when it is a new firing
    pub fn observe(&mut self, job: JobHandle, known: &HashSet<JobHandle>) -> bool {
        if known.contains(&job) || self.observed.contains(&job) {
            return false;
        }
        self.observed.push(job);
        true
    }

    /// True once the required number of new jobs has been seen
    pub fn is_satisfied(&self) -> bool {
        self.observed.len() >= self.required as usize
    }

    fn cancelled(&mut self) -> TriggerError {
        self.phase = WaitPhase::Cancelled;
        info!(
            schedule_id = %self.handle.schedule_id,
            observed = self.observed.len(),
            "Trigger wait cancelled"
        );
        TriggerError::Cancelled {
            schedule_id: self.handle.schedule_id.clone(),
        }
    }
}

/// Poll the job manager until the schedule has started `required_firings`
/// new jobs.
///
/// Returns the jobs in firing order. The wait never sleeps past the timeout
/// and stops promptly when `cancel` fires.
#[instrument(skip(manager, options, cancel), fields(schedule_id = %handle.schedule_id))]
pub async fn wait_for_trigger<M>(
    manager: &M,
    handle: &ScheduleHandle,
    options: &WaitOptions,
    cancel: &CancellationToken,
) -> Result<Vec<JobHandle>, TriggerError>
where
    M: JobManager + ?Sized,
{
    let started = Instant::now();
    // None when the timeout reaches past the clock's range
    let deadline = started.checked_add(options.timeout);
    let poll_interval = options.poll_interval.max(MIN_POLL_INTERVAL);
    let mut state = TriggerWaitState::new(handle.clone(), options);

    info!(
        required = state.required,
        poll_interval_secs = options.poll_interval.as_secs_f64(),
        timeout_secs = options.timeout.as_secs(),
        "Waiting for schedule to fire"
    );

    loop {
        let latest = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(state.cancelled()),
            result = manager.latest_job(handle) => result.map_err(TriggerError::JobManager)?,
        };
        state.polls += 1;
        telemetry::record_trigger_poll();

        if let Some(job) = latest {
            if state.observe(job.clone(), &options.known_jobs) {
                info!(job_id = %job, firing = state.observed.len(), "Schedule fired");
                if let Some(window) = state.expected_window {
                    let now = Utc::now();
                    if !window.contains(now) {
                        warn!(
                            job_id = %job,
                            expected = %window.expected,
                            observed_at = %now,
                            "Firing observed outside the expected window"
                        );
                    }
                }
            } else {
                debug!(job_id = %job, "Latest job already seen");
            }
        }

        if state.is_satisfied() {
            state.phase = WaitPhase::Satisfied;
            info!(polls = state.polls, "Required firings observed");
            return Ok(state.observed);
        }

        let elapsed = started.elapsed();
        if elapsed >= options.timeout {
            state.phase = WaitPhase::TimedOut;
            telemetry::record_trigger_timeout(&handle.schedule_id);
            warn!(
                polls = state.polls,
                observed = state.observed.len(),
                "Schedule did not fire in time"
            );
            return Err(TriggerError::TriggerTimeout {
                schedule_id: handle.schedule_id.clone(),
                observed: state.observed.len(),
                required: state.required,
                elapsed_secs: elapsed.as_secs(),
            });
        }

        let pause = match deadline {
            Some(deadline) => {
                poll_interval.min(deadline.saturating_duration_since(Instant::now()))
            }
            None => poll_interval,
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(state.cancelled()),
            _ = sleep(pause) => {}
        }
    }
}
