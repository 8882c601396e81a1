// Error types for the request wrapper and the schedule helpers

use thiserror::Error;

/// Boxed error returned by external job-manager implementations.
pub type JobManagerError = Box<dyn std::error::Error + Send + Sync>;

/// Token acquisition errors
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Token request failed with status {status}: {body}")]
    TokenRequestFailed { status: u16, body: String },

    #[error("Token response missing access_token field")]
    MissingAccessToken,

    #[error("Delegated token requested for tenant {0} but no username/password is configured")]
    MissingDelegatedCredentials(String),

    #[error("No credentials configured for tenant {0}")]
    MissingCredentials(String),

    #[error("Token endpoint unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid token response: {0}")]
    InvalidResponse(String),
}

/// Authenticated request errors.
///
/// Non-matching status codes are not errors; they come back as an
/// unsuccessful `ExecuteOutcome` so the caller can inspect the body.
#[derive(Error, Debug)]
pub enum RequestError {
    #[error("HTTP transport failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Token acquisition failed: {0}")]
    Token(#[from] AuthError),

    #[error("Failed to serialize request body: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid header {name}: {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("Failed to create HTTP client: {0}")]
    ClientBuild(String),
}

/// Schedule pattern errors
#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("Invalid schedule spec for {frequency}: {reason}")]
    InvalidScheduleSpec { frequency: String, reason: String },

    #[error("Unknown schedule frequency: {0}")]
    UnknownFrequency(String),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Schedule calculation failed: {0}")]
    CalculationFailed(String),
}

impl ScheduleError {
    pub(crate) fn invalid(frequency: impl ToString, reason: impl Into<String>) -> Self {
        ScheduleError::InvalidScheduleSpec {
            frequency: frequency.to_string(),
            reason: reason.into(),
        }
    }
}

/// Errors raised while waiting for scheduled jobs
#[derive(Error, Debug)]
pub enum TriggerError {
    #[error(
        "Schedule {schedule_id} fired {observed} of {required} required times within {elapsed_secs}s"
    )]
    TriggerTimeout {
        schedule_id: String,
        observed: usize,
        required: u32,
        elapsed_secs: u64,
    },

    #[error(
        "Schedule {schedule_id} stops after {end_after} runs and has run {fired}; {requested} more cannot fire"
    )]
    OccurrencesExhausted {
        schedule_id: String,
        end_after: u32,
        fired: usize,
        requested: u32,
    },

    #[error("Wait for schedule {schedule_id} was cancelled")]
    Cancelled { schedule_id: String },

    #[error(transparent)]
    JobManager(JobManagerError),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_schedule_spec_message() {
        let err = ScheduleError::invalid("monthly", "on_day is required");
        assert_eq!(
            err.to_string(),
            "Invalid schedule spec for monthly: on_day is required"
        );
    }

    #[test]
    fn test_job_manager_error_is_transparent() {
        let source: JobManagerError = "query failed: connection reset".into();
        let err = TriggerError::JobManager(source);
        assert_eq!(err.to_string(), "query failed: connection reset");
    }

    #[test]
    fn test_trigger_timeout_message() {
        let err = TriggerError::TriggerTimeout {
            schedule_id: "42".to_string(),
            observed: 1,
            required: 2,
            elapsed_secs: 600,
        };
        assert_eq!(
            err.to_string(),
            "Schedule 42 fired 1 of 2 required times within 600s"
        );
    }

    #[test]
    fn test_occurrences_exhausted_message() {
        let err = TriggerError::OccurrencesExhausted {
            schedule_id: "42".to_string(),
            end_after: 3,
            fired: 3,
            requested: 1,
        };
        assert_eq!(
            err.to_string(),
            "Schedule 42 stops after 3 runs and has run 3; 1 more cannot fire"
        );
    }
}
