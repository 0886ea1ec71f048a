//! HTTP mail transport against a mock provider.

use std::time::Duration;

use eventdesk::mail::{HttpMailer, MailError, Mailer, OutgoingEmail, Sender};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn message(to: &str) -> OutgoingEmail {
    OutgoingEmail {
        from: Sender {
            address: "hello@acme.test".to_string(),
            name: Some("Acme Events".to_string()),
            reply_to: Some("support@acme.test".to_string()),
        },
        to: to.to_string(),
        subject: "Welcome".to_string(),
        body: "See you there".to_string(),
    }
}

fn mailer(server: &MockServer) -> HttpMailer {
    HttpMailer::new(
        format!("{}/v1/send", server.uri()),
        "key-123".to_string(),
        Duration::from_secs(5),
    )
    .unwrap()
}

#[tokio::test]
async fn posts_message_with_bearer_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/send"))
        .and(header("authorization", "Bearer key-123"))
        .and(body_partial_json(json!({
            "from": {"email": "hello@acme.test", "name": "Acme Events"},
            "reply_to": "support@acme.test",
            "to": [{"email": "ana@example.com"}],
            "subject": "Welcome",
            "text": "See you there"
        })))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    mailer(&server)
        .send(&message("ana@example.com"))
        .await
        .unwrap();
}

#[tokio::test]
async fn provider_error_surfaces_status_and_truncated_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/send"))
        .respond_with(ResponseTemplate::new(503).set_body_string("x".repeat(500)))
        .mount(&server)
        .await;

    let err = mailer(&server)
        .send(&message("ana@example.com"))
        .await
        .unwrap_err();
    match err {
        MailError::Rejected { status, body } => {
            assert_eq!(status, 503);
            assert_eq!(body.len(), 200);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn invalid_recipient_never_reaches_provider() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(202))
        .expect(0)
        .mount(&server)
        .await;

    let err = mailer(&server)
        .send(&message("not-an-address"))
        .await
        .unwrap_err();
    assert!(matches!(err, MailError::InvalidRecipient(_)));
}
