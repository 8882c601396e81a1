// Bearer-authenticated HTTP execution with token refresh on 400/401

use crate::config::RequestConfig;
use crate::errors::RequestError;
use crate::executor::{ExecuteOutcome, OutcomeKind};
use crate::models::{ApiResponse, HttpMethod, RequestOptions, Token};
use crate::retry::{is_auth_failure, FixedDelay, RetryStrategy};
use crate::telemetry;
use crate::token_cache::TokenCache;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Correlation header sent with every attempt
pub const CLIENT_REQUEST_ID: &str = "client-request-id";

/// One fully built attempt
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
    pub expected_status: u16,
}

impl RequestDescriptor {
    /// Assemble one attempt: bearer header, content type, a fresh
    /// `client-request-id` and the encoded body
    pub fn build(
        method: HttpMethod,
        url: &str,
        token: &Token,
        options: &RequestOptions,
        body: Option<Vec<u8>>,
    ) -> Result<Self, RequestError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            header_value("authorization", &format!("Bearer {}", token.access_token))?,
        );
        headers.insert(
            CONTENT_TYPE,
            header_value("content-type", &options.content_type)?,
        );
        headers.insert(
            HeaderName::from_static(CLIENT_REQUEST_ID),
            header_value(CLIENT_REQUEST_ID, &Uuid::new_v4().to_string())?,
        );

        Ok(Self {
            method,
            url: url.to_string(),
            headers,
            body,
            expected_status: options.expected_status,
        })
    }

    /// The `client-request-id` sent with this attempt
    pub fn request_id(&self) -> Option<&str> {
        self.headers
            .get(CLIENT_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
    }
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue, RequestError> {
    HeaderValue::from_str(value).map_err(|e| RequestError::InvalidHeader {
        name: name.to_string(),
        reason: e.to_string(),
    })
}

/// Executes HTTP calls with cached bearer tokens.
///
/// Every attempt waits the pacing delay first. A 400 or 401 refreshes the
/// token for the request's key and retries until the attempt budget is
/// spent; any other mismatching status is returned immediately.
pub struct AuthenticatedExecutor {
    client: Client,
    tokens: Arc<TokenCache>,
    pacing: FixedDelay,
}

impl AuthenticatedExecutor {
    /// Build an executor with its own HTTP client using the configured timeout
    pub fn new(tokens: Arc<TokenCache>, config: &RequestConfig) -> Result<Self, RequestError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| RequestError::ClientBuild(e.to_string()))?;

        Ok(Self::with_client(client, tokens, config))
    }

    pub fn with_client(client: Client, tokens: Arc<TokenCache>, config: &RequestConfig) -> Self {
        Self {
            client,
            tokens,
            pacing: FixedDelay::with_max_attempts(config.pacing_delay(), config.max_attempts),
        }
    }

    /// Token cache shared with other executors built from the same `Arc`
    pub fn tokens(&self) -> &Arc<TokenCache> {
        &self.tokens
    }

    /// Convert HttpMethod to reqwest Method
    fn convert_method(method: HttpMethod) -> Method {
        match method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Patch => Method::PATCH,
            HttpMethod::Delete => Method::DELETE,
        }
    }

    async fn dispatch(&self, descriptor: RequestDescriptor) -> Result<ApiResponse, RequestError> {
        let mut request = self
            .client
            .request(Self::convert_method(descriptor.method), &descriptor.url)
            .headers(descriptor.headers);

        if let Some(body) = descriptor.body {
            request = request.body(body);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();

        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .map(|(k, v)| (k.as_str().to_string(), v.to_str().unwrap_or("").to_string()))
            .collect();

        let body = response.bytes().await?.to_vec();

        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }

    /// Execute an authenticated call.
    ///
    /// Transport and token failures are errors. Status mismatches are not;
    /// they come back as an unsuccessful outcome carrying the last response.
    #[tracing::instrument(skip(self, options), fields(method = %method, key = %options.token_key()))]
    pub async fn execute(
        &self,
        method: HttpMethod,
        url: &str,
        options: &RequestOptions,
    ) -> Result<ExecuteOutcome, RequestError> {
        let key = options.token_key();
        let credentials = options.cross_tenant_details.as_ref();
        let body = options.data.clone().map(|data| data.into_bytes()).transpose()?;

        let mut token = self.tokens.get_or_generate(&key, credentials).await?;
        let mut attempt: u32 = 0;

        loop {
            if let Some(delay) = self.pacing.next_delay(attempt) {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
            attempt += 1;

            let descriptor = RequestDescriptor::build(method, url, &token, options, body.clone())?;
            tracing::debug!(
                attempt,
                request_id = descriptor.request_id().unwrap_or_default(),
                generation = token.generation,
                "Dispatching request"
            );

            let expected = descriptor.expected_status;
            let response = self.dispatch(descriptor).await?;
            telemetry::record_request_attempt(method.as_str(), response.status);

            if response.status == expected {
                tracing::info!(attempt, status = response.status, "Request succeeded");
                return Ok(ExecuteOutcome::new(OutcomeKind::Success, attempt, response));
            }

            if !is_auth_failure(response.status) {
                tracing::warn!(
                    attempt,
                    status = response.status,
                    expected,
                    "Unexpected response status"
                );
                return Ok(ExecuteOutcome::new(
                    OutcomeKind::UnexpectedStatus,
                    attempt,
                    response,
                ));
            }

            if !self.pacing.should_retry(attempt) {
                tracing::error!(
                    attempts = attempt,
                    status = response.status,
                    "Authentication failed on every attempt"
                );
                return Ok(ExecuteOutcome::new(
                    OutcomeKind::AuthenticationExhausted,
                    attempt,
                    response,
                ));
            }

            tracing::warn!(
                attempt,
                status = response.status,
                "Authentication rejected, refreshing token"
            );
            token = self
                .tokens
                .refresh(&key, credentials, token.generation)
                .await?;
        }
    }

    /// `execute` with GET
    pub async fn get(&self, url: &str, options: &RequestOptions) -> Result<ExecuteOutcome, RequestError> {
        self.execute(HttpMethod::Get, url, options).await
    }

    pub async fn post(&self, url: &str, options: &RequestOptions) -> Result<ExecuteOutcome, RequestError> {
        self.execute(HttpMethod::Post, url, options).await
    }

    pub async fn put(&self, url: &str, options: &RequestOptions) -> Result<ExecuteOutcome, RequestError> {
        self.execute(HttpMethod::Put, url, options).await
    }

    pub async fn patch(&self, url: &str, options: &RequestOptions) -> Result<ExecuteOutcome, RequestError> {
        self.execute(HttpMethod::Patch, url, options).await
    }

    pub async fn delete(&self, url: &str, options: &RequestOptions) -> Result<ExecuteOutcome, RequestError> {
        self.execute(HttpMethod::Delete, url, options).await
    }
}
