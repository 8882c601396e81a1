// Test-automation support library: authenticated Graph-style requests and
// schedule trigger helpers

pub mod auth;
pub mod config;
pub mod errors;
pub mod executor;
pub mod models;
pub mod retry;
pub mod schedule;
pub mod scheduler;
pub mod telemetry;
pub mod token_cache;

pub use auth::{AccessToken, OAuth2TokenProvider, TokenProvider};
pub use config::Settings;
pub use errors::{AuthError, RequestError, ScheduleError, TriggerError};
pub use executor::{AuthenticatedExecutor, ExecuteOutcome, OutcomeKind};
pub use schedule::{build_pattern, PatternFields, ScheduleTrigger};
pub use scheduler::{wait_for_trigger, JobManager, ScheduleCreator, WaitOptions};
pub use token_cache::TokenCache;
