// End-to-end tests: configuration, OAuth2 tokens, authenticated requests and
// schedule flows against a mock identity/API server

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use suite_core::auth::OAuth2TokenProvider;
use suite_core::config::Settings;
use suite_core::errors::{AuthError, JobManagerError, RequestError};
use suite_core::executor::AuthenticatedExecutor;
use suite_core::models::{
    Frequency, JobHandle, RequestOptions, ScheduleHandle, SchedulePattern, TenantCredentials,
    TokenKey,
};
use suite_core::schedule::{build_pattern, start_reference, PatternFields};
use suite_core::scheduler::{JobManager, ScheduleCreator, WaitOptions};
use suite_core::token_cache::TokenCache;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Load settings pointing the authority at the mock server
fn settings_for(server: &MockServer) -> Settings {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("default.toml"),
        format!(
            r#"
[graph]
authority_url = "{}"
scope = "https://graph.example.com/.default"
tenant_id = "contoso"
client_id = "suite-app"
client_secret = "suite-secret"
username = "svc-account"
password = "svc-password"

[request]
max_attempts = 3
pacing_delay_ms = 0
timeout_seconds = 5

[trigger]
poll_interval_seconds = 1
timeout_seconds = 10
start_buffer_minutes = 2
"#,
            server.uri()
        ),
    )
    .unwrap();

    let settings = Settings::load_from_path(dir.path()).unwrap();
    settings.validate().unwrap();
    settings
}

fn executor_for(settings: &Settings) -> AuthenticatedExecutor {
    let provider = OAuth2TokenProvider::new(&settings.graph).unwrap();
    let cache = Arc::new(TokenCache::new(Arc::new(provider)));
    AuthenticatedExecutor::new(cache, &settings.request).unwrap()
}

async fn mount_token(server: &MockServer, tenant: &str, grant: &str, token: &str) {
    Mock::given(method("POST"))
        .and(path(format!("/{}/oauth2/v2.0/token", tenant)))
        .and(body_string_contains(format!("grant_type={}", grant)))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "token_type": "Bearer",
            "expires_in": 3599,
            "access_token": token,
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_application_token_acquired_once_and_reused() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/contoso/oauth2/v2.0/token"))
        .and(body_string_contains("grant_type=client_credentials"))
        .and(body_string_contains("client_id=suite-app"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "app-token",
            "expires_in": "3599",
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1.0/users"))
        .and(header("authorization", "Bearer app-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"value": []})))
        .expect(2)
        .mount(&server)
        .await;

    let settings = settings_for(&server);
    let executor = executor_for(&settings);
    let url = format!("{}/v1.0/users", server.uri());

    for _ in 0..2 {
        let (success, response) = executor
            .get(&url, &RequestOptions::new())
            .await
            .unwrap()
            .into_parts();
        assert!(success);
        assert_eq!(response.status, 200);
    }

    let token = executor
        .tokens()
        .peek(&TokenKey::source(false))
        .await
        .unwrap();
    assert!(token.expires_at.is_some());

    server.verify().await;
}

#[tokio::test]
async fn test_delegated_request_uses_password_grant() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/contoso/oauth2/v2.0/token"))
        .and(body_string_contains("grant_type=password"))
        .and(body_string_contains("username=svc-account"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "user-token",
            "expires_in": 3599,
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1.0/me"))
        .and(header("authorization", "Bearer user-token"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let settings = settings_for(&server);
    let executor = executor_for(&settings);

    let outcome = executor
        .get(
            &format!("{}/v1.0/me", server.uri()),
            &RequestOptions::new().delegated(true),
        )
        .await
        .unwrap();

    assert!(outcome.success);
    server.verify().await;
}

#[tokio::test]
async fn test_cross_tenant_request_uses_partner_authority() {
    let server = MockServer::start().await;
    mount_token(&server, "contoso", "client_credentials", "source-token").await;
    mount_token(&server, "fabrikam", "client_credentials", "partner-token").await;
    Mock::given(method("GET"))
        .and(header("authorization", "Bearer partner-token"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let settings = settings_for(&server);
    let executor = executor_for(&settings);
    let partner = TenantCredentials {
        tenant_id: "fabrikam".to_string(),
        client_id: "partner-app".to_string(),
        client_secret: "partner-secret".to_string(),
        username: None,
        password: None,
    };

    let outcome = executor
        .get(
            &format!("{}/v1.0/organization", server.uri()),
            &RequestOptions::new().cross_tenant(partner),
        )
        .await
        .unwrap();

    assert!(outcome.success);
    assert!(executor
        .tokens()
        .peek(&TokenKey::source(false))
        .await
        .is_none());
    server.verify().await;
}

#[tokio::test]
async fn test_token_endpoint_rejection_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/contoso/oauth2/v2.0/token"))
        .respond_with(ResponseTemplate::new(400).set_body_string("AADSTS7000215"))
        .mount(&server)
        .await;

    let settings = settings_for(&server);
    let executor = executor_for(&settings);

    let result = executor
        .get(&format!("{}/v1.0/users", server.uri()), &RequestOptions::new())
        .await;

    match result {
        Err(RequestError::Token(AuthError::TokenRequestFailed { status, body })) => {
            assert_eq!(status, 400);
            assert!(body.contains("AADSTS7000215"));
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

/// Job manager backed by the scheduler's REST API
struct RestJobManager {
    executor: AuthenticatedExecutor,
    base_url: String,
}

#[derive(Deserialize)]
struct CreatedSchedule {
    schedule_id: String,
}

#[derive(Deserialize)]
struct LatestJob {
    job_id: Option<String>,
}

#[async_trait]
impl JobManager for RestJobManager {
    async fn create_schedule(
        &self,
        pattern: &SchedulePattern,
    ) -> Result<ScheduleHandle, JobManagerError> {
        let options = RequestOptions::new()
            .json(serde_json::to_value(pattern)?)
            .expected_status(201);
        let outcome = self
            .executor
            .post(&format!("{}/schedules", self.base_url), &options)
            .await?;
        if !outcome.success {
            return Err(format!("create failed with {}", outcome.response.status).into());
        }
        let created: CreatedSchedule = outcome.response.json()?;
        Ok(ScheduleHandle::new(created.schedule_id))
    }

    async fn latest_job(
        &self,
        handle: &ScheduleHandle,
    ) -> Result<Option<JobHandle>, JobManagerError> {
        let url = format!("{}/schedules/{}/jobs/latest", self.base_url, handle.schedule_id);
        let outcome = self.executor.get(&url, &RequestOptions::new()).await?;
        if !outcome.success {
            return Err(format!("job query failed with {}", outcome.response.status).into());
        }
        let latest: LatestJob = outcome.response.json()?;
        Ok(latest.job_id.map(JobHandle::new))
    }

    async fn delete_schedule(&self, handle: &ScheduleHandle) -> Result<(), JobManagerError> {
        let url = format!("{}/schedules/{}", self.base_url, handle.schedule_id);
        let outcome = self
            .executor
            .delete(&url, &RequestOptions::new().expected_status(204))
            .await?;
        if !outcome.success {
            return Err(format!("delete failed with {}", outcome.response.status).into());
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_schedule_created_fired_and_cleaned_up() {
    let server = MockServer::start().await;
    mount_token(&server, "contoso", "client_credentials", "app-token").await;
    Mock::given(method("POST"))
        .and(path("/api/schedules"))
        .and(body_string_contains("\"freq_type\":\"weekly\""))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(serde_json::json!({"schedule_id": "77"})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/schedules/77/jobs/latest"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"job_id": "1001"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/schedules/77"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let settings = settings_for(&server);
    let manager = Arc::new(RestJobManager {
        executor: executor_for(&settings),
        base_url: format!("{}/api", server.uri()),
    });
    let creator = ScheduleCreator::new(manager, WaitOptions::from(&settings.trigger));

    let reference =
        start_reference(chrono::Utc::now(), settings.trigger.start_buffer_minutes).unwrap();
    let pattern = build_pattern(
        Frequency::Weekly,
        reference,
        PatternFields {
            weekdays: vec![chrono::Weekday::Mon, chrono::Weekday::Thu],
            ..Default::default()
        },
    )
    .unwrap();

    let (handle, job) = creator
        .create_and_wait(&pattern, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(handle.schedule_id, "77");
    assert_eq!(job, JobHandle::new("1001"));
    assert_eq!(creator.cleanup().await, 1);

    server.verify().await;
}

#[tokio::test]
async fn test_schedule_wait_times_out_without_jobs() {
    let server = MockServer::start().await;
    mount_token(&server, "contoso", "client_credentials", "app-token").await;
    Mock::given(method("GET"))
        .and(path("/api/schedules/5/jobs/latest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"job_id": null})))
        .mount(&server)
        .await;

    let settings = settings_for(&server);
    let manager = RestJobManager {
        executor: executor_for(&settings),
        base_url: format!("{}/api", server.uri()),
    };
    let options = WaitOptions::from(&settings.trigger)
        .poll_interval(Duration::from_millis(100))
        .timeout(Duration::from_millis(350));

    let result = suite_core::scheduler::wait_for_trigger(
        &manager,
        &ScheduleHandle::new("5"),
        &options,
        &CancellationToken::new(),
    )
    .await;

    assert!(matches!(
        result,
        Err(suite_core::errors::TriggerError::TriggerTimeout { observed: 0, .. })
    ));
}
