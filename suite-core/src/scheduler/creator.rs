// Schedule creation with cleanup tracking

use crate::errors::TriggerError;
use crate::models::{Frequency, JobHandle, ScheduleHandle, SchedulePattern};
use crate::scheduler::trigger::{wait_for_trigger, WaitOptions};
use crate::scheduler::JobManager;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Creates schedules through a job manager and remembers them for cleanup
pub struct ScheduleCreator {
    manager: Arc<dyn JobManager>,
    options: WaitOptions,
    created: Mutex<Vec<ScheduleHandle>>,
}

impl ScheduleCreator {
    /// `options` apply to every wait this creator performs
    pub fn new(manager: Arc<dyn JobManager>, options: WaitOptions) -> Self {
        Self {
            manager,
            options,
            created: Mutex::new(Vec::new()),
        }
    }

    pub fn options(&self) -> &WaitOptions {
        &self.options
    }

    /// Register `pattern` with the job manager and track it for cleanup
    #[instrument(skip(self, pattern), fields(freq_type = %pattern.freq_type))]
    pub async fn create_schedule(
        &self,
        pattern: &SchedulePattern,
    ) -> Result<ScheduleHandle, TriggerError> {
        let handle = self
            .manager
            .create_schedule(pattern)
            .await
            .map_err(TriggerError::JobManager)?;

        info!(schedule = %handle, "Schedule created");
        self.created.lock().await.push(handle.clone());
        Ok(handle)
    }

    /// Create a schedule and wait for its first job.
    ///
    /// Continuous schedules first pause for one job interval.
    #[instrument(skip(self, pattern, cancel), fields(freq_type = %pattern.freq_type))]
    pub async fn create_and_wait(
        &self,
        pattern: &SchedulePattern,
        cancel: &CancellationToken,
    ) -> Result<(ScheduleHandle, JobHandle), TriggerError> {
        let handle = self.create_schedule(pattern).await?;

        if pattern.freq_type == Frequency::Continuous {
            let minutes = pattern.job_interval.unwrap_or(0);
            let pause = Duration::from_secs(u64::from(minutes) * 60);
            info!(job_interval_minutes = minutes, "Pausing for first continuous interval");
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(TriggerError::Cancelled {
                        schedule_id: handle.schedule_id.clone(),
                    });
                }
                _ = tokio::time::sleep(pause) => {}
            }
        }

        let options = self.options.clone().required_firings(1);
        let jobs = wait_for_trigger(self.manager.as_ref(), &handle, &options, cancel).await?;
        let job = jobs
            .into_iter()
            .next()
            .ok_or_else(|| TriggerError::TriggerTimeout {
                schedule_id: handle.schedule_id.clone(),
                observed: 0,
                required: 1,
                elapsed_secs: options.timeout.as_secs(),
            })?;
        info!(schedule = %handle, job_id = %job, "First job started");
        Ok((handle, job))
    }

    /// Wait for `count` more jobs of a schedule that has already run `fired`
    /// times.
    ///
    /// Fails without polling when `end_after` leaves fewer runs than requested.
    #[instrument(skip(self, pattern, cancel), fields(schedule_id = %handle.schedule_id))]
    pub async fn wait_for_runs(
        &self,
        handle: &ScheduleHandle,
        pattern: &SchedulePattern,
        fired: usize,
        count: u32,
        cancel: &CancellationToken,
    ) -> Result<Vec<JobHandle>, TriggerError> {
        let count = count.max(1);
        if let (Some(end_after), Some(remaining)) =
            (pattern.end_after, pattern.remaining_occurrences(fired))
        {
            if remaining < count as usize {
                warn!(end_after, fired, requested = count, "Schedule has no runs left");
                return Err(TriggerError::OccurrencesExhausted {
                    schedule_id: handle.schedule_id.clone(),
                    end_after,
                    fired,
                    requested: count,
                });
            }
        }

        let options = self.options.clone().required_firings(count);
        wait_for_trigger(self.manager.as_ref(), handle, &options, cancel).await
    }

    /// Schedules created and not yet cleaned up, oldest first
    pub async fn created(&self) -> Vec<ScheduleHandle> {
        self.created.lock().await.clone()
    }

    /// Delete every schedule created so far.
    ///
    /// A failed delete is logged and skipped. Returns the number deleted.
    #[instrument(skip(self))]
    pub async fn cleanup(&self) -> usize {
        let handles: Vec<ScheduleHandle> = self.created.lock().await.drain(..).collect();
        let mut deleted = 0;

        for handle in handles {
            match self.manager.delete_schedule(&handle).await {
                Ok(()) => {
                    deleted += 1;
                    info!(schedule = %handle, "Schedule deleted");
                }
                Err(e) => {
                    warn!(schedule = %handle, error = %e, "Failed to delete schedule");
                }
            }
        }

        deleted
    }
}
