// Authenticated request execution
// Outcome types shared by the executor and its callers

pub mod http;

pub use http::{AuthenticatedExecutor, RequestDescriptor};

use crate::models::ApiResponse;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How an authenticated call terminated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// Response carried the expected status
    Success,
    /// Non-auth failure status; returned without retry
    UnexpectedStatus,
    /// Every attempt was rejected with 400/401
    AuthenticationExhausted,
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OutcomeKind::Success => "success",
            OutcomeKind::UnexpectedStatus => "unexpected_status",
            OutcomeKind::AuthenticationExhausted => "authentication_exhausted",
        };
        f.write_str(s)
    }
}

/// Result of `AuthenticatedExecutor::execute`
#[derive(Debug, Clone)]
pub struct ExecuteOutcome {
    /// True exactly when the response status equals the expected status
    pub success: bool,
    pub kind: OutcomeKind,
    /// Attempts dispatched, the successful one included
    pub attempts: u32,
    pub response: ApiResponse,
}

impl ExecuteOutcome {
    pub(crate) fn new(kind: OutcomeKind, attempts: u32, response: ApiResponse) -> Self {
        Self {
            success: kind == OutcomeKind::Success,
            kind,
            attempts,
            response,
        }
    }

    /// Split into the `(success, response)` pair
    pub fn into_parts(self) -> (bool, ApiResponse) {
        (self.success, self.response)
    }
}
