//! HTTP surface tests against a live server bound to an ephemeral port.

use anyhow::{Context, Result};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use eventdesk::access::GlobalRole;
use eventdesk::server::create_app;
use reqwest::StatusCode;
use serde_json::{Value, json};
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};

#[path = "test_utils/mod.rs"]
mod test_utils;
use test_utils::{TestContext, create_event, create_tenant, create_user, setup_context};

struct TestServer {
    url: String,
    client: reqwest::Client,
    shutdown_tx: Option<oneshot::Sender<()>>,
    join_handle: Option<JoinHandle<Result<()>>>,
}

impl TestServer {
    async fn spawn(ctx: &TestContext) -> Result<Self> {
        let app = create_app(ctx.state.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let join_handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .context("axum server error")
        });

        Ok(Self {
            url: format!("http://{addr}"),
            client: reqwest::Client::new(),
            shutdown_tx: Some(shutdown_tx),
            join_handle: Some(join_handle),
        })
    }

    fn api(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.url, path)
    }

    async fn register(&self, email: &str) -> Result<String> {
        let response = self
            .client
            .post(self.api("/users"))
            .json(&json!({"email": email, "password": "correct horse battery"}))
            .send()
            .await?;
        assert_eq!(response.status(), StatusCode::CREATED);
        let body: Value = response.json().await?;
        Ok(body["token"].as_str().unwrap_or_default().to_string())
    }

    async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.join_handle.take() {
            handle.await.context("server task join failed")??;
        }
        Ok(())
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

#[tokio::test]
async fn public_endpoints_need_no_token() -> Result<()> {
    let ctx = setup_context().await?;
    let server = TestServer::spawn(&ctx).await?;

    let response = server.client.get(format!("{}/healthz", server.url)).send().await?;
    assert_eq!(response.status(), StatusCode::OK);

    let response = server
        .client
        .get(format!("{}/openapi.json", server.url))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let doc: Value = response.json().await?;
    assert!(doc["paths"]["/api/v1/events"].is_object());

    server.shutdown().await
}

#[tokio::test]
async fn protected_endpoints_reject_missing_and_bad_tokens() -> Result<()> {
    let ctx = setup_context().await?;
    let server = TestServer::spawn(&ctx).await?;

    let response = server.client.get(server.api("/events")).send().await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json().await?;
    assert_eq!(body["code"], "UNAUTHORIZED");

    let response = server
        .client
        .get(server.api("/users/me"))
        .bearer_auth("not-a-jwt")
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    server.shutdown().await
}

#[tokio::test]
async fn anonymous_registration_is_created_unapproved() -> Result<()> {
    let ctx = setup_context().await?;
    let owner = create_user(&ctx.db, "owner@example.com", vec![GlobalRole::User]).await?;
    let tenant = create_tenant(&ctx.db, &owner, "Acme").await?;
    let event = create_event(&ctx.db, tenant.id, "RustConf").await?;
    let server = TestServer::spawn(&ctx).await?;

    let form = json!({
        "participant_type": "attendee",
        "first_name": "Ana",
        "last_name": "Lima",
        "email": "Ana@Example.com",
        "fields": {"t_shirt": "M"}
    });
    let url = server.api(&format!("/public/events/{}/participants", event.id));

    let response = server.client.post(&url).json(&form).send().await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body: Value = response.json().await?;
    assert_eq!(body["status"], "not-approved");
    assert_eq!(body["tenant_id"], tenant.id.to_string());
    assert_eq!(body["event"], event.id.to_string());
    assert_eq!(body["email"], "ana@example.com");

    let duplicate = server.client.post(&url).json(&form).send().await?;
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);

    let missing = server
        .client
        .post(server.api(&format!("/public/events/{}/participants", uuid::Uuid::new_v4())))
        .json(&form)
        .send()
        .await?;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    server.shutdown().await
}

#[tokio::test]
async fn records_are_invisible_outside_the_tenant() -> Result<()> {
    let ctx = setup_context().await?;
    let server = TestServer::spawn(&ctx).await?;
    let owner_token = server.register("owner@example.com").await?;
    let outsider_token = server.register("outsider@example.com").await?;

    let response = server
        .client
        .post(server.api("/tenants"))
        .bearer_auth(&owner_token)
        .json(&json!({"name": "Acme Events"}))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let tenant: Value = response.json().await?;

    let response = server
        .client
        .post(server.api("/events"))
        .bearer_auth(&owner_token)
        .json(&json!({"tenant": tenant["id"], "name": "RustConf"}))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let event: Value = response.json().await?;
    let event_url = server.api(&format!("/events/{}", event["id"].as_str().unwrap_or_default()));

    let response = server
        .client
        .get(&event_url)
        .bearer_auth(&owner_token)
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let response = server
        .client
        .get(&event_url)
        .bearer_auth(&outsider_token)
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = server
        .client
        .get(server.api("/events"))
        .bearer_auth(&outsider_token)
        .send()
        .await?;
    let listed: Value = response.json().await?;
    assert_eq!(listed["data"], json!([]));

    let response = server
        .client
        .post(server.api("/events"))
        .bearer_auth(&outsider_token)
        .json(&json!({"tenant": tenant["id"], "name": "Hijack"}))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    server.shutdown().await
}

#[tokio::test]
async fn login_issues_a_working_token() -> Result<()> {
    let ctx = setup_context().await?;
    let server = TestServer::spawn(&ctx).await?;
    server.register("ana@example.com").await?;

    let response = server
        .client
        .post(server.api("/auth/login"))
        .json(&json!({"email": "ana@example.com", "password": "wrong password!"}))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = server
        .client
        .post(server.api("/auth/login"))
        .json(&json!({"email": "ana@example.com", "password": "correct horse battery"}))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let session: Value = response.json().await?;
    let token = session["token"].as_str().unwrap_or_default();

    let me: Value = server
        .client
        .get(server.api("/users/me"))
        .bearer_auth(token)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(me["email"], "ana@example.com");
    // First account is promoted and admin tier forces the unlimited plan
    assert_eq!(me["roles"], json!(["super-admin", "user"]));
    assert_eq!(me["plan"], "unlimited");

    server.shutdown().await
}

#[tokio::test]
async fn images_render_from_stored_participants() -> Result<()> {
    let ctx = setup_context().await?;
    let server = TestServer::spawn(&ctx).await?;
    let owner_token = server.register("owner@example.com").await?;
    let outsider_token = server.register("outsider@example.com").await?;

    let mut tenants = Vec::new();
    for (token, name) in [(&owner_token, "Acme Events"), (&outsider_token, "Other Co")] {
        let tenant: Value = server
            .client
            .post(server.api("/tenants"))
            .bearer_auth(token)
            .json(&json!({"name": name}))
            .send()
            .await?
            .json()
            .await?;
        tenants.push(tenant);
    }

    let event: Value = server
        .client
        .post(server.api("/events"))
        .bearer_auth(&owner_token)
        .json(&json!({"tenant": tenants[0]["id"], "name": "RustConf"}))
        .send()
        .await?
        .json()
        .await?;
    let event_id = event["id"].as_str().unwrap_or_default().to_string();

    let participant: Value = server
        .client
        .post(server.api(&format!("/public/events/{event_id}/participants")))
        .json(&json!({
            "participant_type": "speaker",
            "first_name": "Ana",
            "last_name": "Lima",
            "email": "ana@example.com"
        }))
        .send()
        .await?
        .json()
        .await?;

    let mut templates = Vec::new();
    for (token, tenant) in [(&owner_token, &tenants[0]), (&outsider_token, &tenants[1])] {
        let response = server
            .client
            .post(server.api("/image-templates"))
            .bearer_auth(token)
            .json(&json!({
                "tenant_id": tenant["id"],
                "name": "Speaker card",
                "width": 600,
                "height": 300,
                "elements": [
                    {"type": "variable_text", "field": "{{first_name}} {{last_name}}", "x": 10, "y": 40}
                ]
            }))
            .send()
            .await?;
        assert_eq!(response.status(), StatusCode::CREATED);
        let template: Value = response.json().await?;
        templates.push(template["id"].as_str().unwrap_or_default().to_string());
    }

    let response = server
        .client
        .post(server.api(&format!("/image-templates/{}/generate", templates[0])))
        .bearer_auth(&owner_token)
        .json(&json!({"event_id": event_id}))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await?;
    assert_eq!(body["succeeded"], 1);
    assert_eq!(body["results"][0]["record_id"], participant["id"]);
    let encoded = body["results"][0]["data_uri"]
        .as_str()
        .unwrap_or_default()
        .trim_start_matches("data:image/svg+xml;base64,");
    let svg = String::from_utf8(STANDARD.decode(encoded)?)?;
    assert!(svg.contains(">Ana Lima</text>"));

    // Another tenant's participants never reach the renderer
    let response = server
        .client
        .post(server.api(&format!("/image-templates/{}/generate", templates[1])))
        .bearer_auth(&outsider_token)
        .json(&json!({"participant_ids": [participant["id"]]}))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await?;
    assert_eq!(body["results"], json!([]));

    let response = server
        .client
        .post(server.api(&format!("/image-templates/{}/generate", templates[0])))
        .bearer_auth(&owner_token)
        .json(&json!({
            "event_id": event_id,
            "records": [{"record_id": participant["id"], "fields": {}}]
        }))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    server.shutdown().await
}
