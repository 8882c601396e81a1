// Scheduler module for schedule creation and firing detection

pub mod creator;
pub mod trigger;

pub use creator::ScheduleCreator;
pub use trigger::{wait_for_trigger, TriggerWaitState, WaitOptions, WaitPhase};

use crate::errors::JobManagerError;
use crate::models::{JobHandle, ScheduleHandle, SchedulePattern};
use async_trait::async_trait;

/// External job manager that owns schedules and the jobs they start
#[async_trait]
pub trait JobManager: Send + Sync {
    /// Register a schedule and return its handle
    async fn create_schedule(
        &self,
        pattern: &SchedulePattern,
    ) -> Result<ScheduleHandle, JobManagerError>;

    /// Most recent job started by the schedule, if any
    async fn latest_job(&self, handle: &ScheduleHandle)
        -> Result<Option<JobHandle>, JobManagerError>;

    async fn delete_schedule(&self, handle: &ScheduleHandle) -> Result<(), JobManagerError>;
}
