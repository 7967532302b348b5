//! Inbound HTTP surface: subscription check, event delivery and the
//! account-linking page.

pub mod signature;

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::platform::WebhookBatch;
use crate::router::EventRouter;
use crate::webhook::signature::{SignatureError, SIGNATURE_HEADER};

const SIGNATURE_256_HEADER: &str = "x-hub-signature-256";

// ── Shared state ───────────────────────────────────────────────────────────────

pub struct AppState {
    pub config: Arc<Config>,
    pub router: Arc<EventRouter>,
}

pub fn routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/webhook", get(verify_subscription).post(receive_events))
        .route("/authorize", get(authorize))
        .route("/health", get(|| async { "ok" }))
        .with_state(state)
}

// ── Request types ──────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct SubscriptionQuery {
    #[serde(rename = "hub.mode")]
    mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    challenge: Option<String>,
}

#[derive(Deserialize)]
struct AuthorizeQuery {
    account_linking_token: Option<String>,
    redirect_uri: Option<String>,
}

// ── Handlers ───────────────────────────────────────────────────────────────────

async fn verify_subscription(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SubscriptionQuery>,
) -> Response {
    let token_matches =
        query.verify_token.as_deref() == Some(state.config.messenger.validation_token.as_str());
    if query.mode.as_deref() == Some("subscribe") && token_matches {
        info!("Validating webhook");
        (StatusCode::OK, query.challenge.unwrap_or_default()).into_response()
    } else {
        error!("Failed validation. Make sure the validation tokens match.");
        StatusCode::FORBIDDEN.into_response()
    }
}

async fn receive_events(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    // A header that is present but not readable text counts as malformed,
    // never as missing.
    let header = match headers
        .get(SIGNATURE_HEADER)
        .or_else(|| headers.get(SIGNATURE_256_HEADER))
    {
        Some(value) => value.to_str().map(Some).map_err(|_| SignatureError::Malformed),
        None => Ok(None),
    };
    let verified = header
        .and_then(|header| signature::verify(&state.config.messenger.app_secret, &body, header));

    match verified {
        Ok(()) => {}
        Err(SignatureError::Missing) if state.config.messenger.allow_unsigned => {
            warn!("Couldn't validate the signature; accepting unsigned delivery");
        }
        Err(e) => {
            warn!("Rejecting webhook delivery: {}", e);
            return StatusCode::FORBIDDEN;
        }
    }

    let batch: WebhookBatch = match serde_json::from_slice(&body) {
        Ok(batch) => batch,
        Err(e) => {
            warn!("Webhook body is not a valid batch: {}", e);
            return StatusCode::BAD_REQUEST;
        }
    };

    if !batch.is_page() {
        debug!("Ignoring webhook for object '{}'", batch.object);
        return StatusCode::OK;
    }

    // Acknowledge right away; outbound work finishes in the background.
    let receipt = state.router.route_batch(batch.events());
    tokio::spawn(receipt.log_summary());
    StatusCode::OK
}

async fn authorize(Query(query): Query<AuthorizeQuery>) -> Response {
    let (Some(token), Some(redirect_uri)) = (query.account_linking_token, query.redirect_uri)
    else {
        return (
            StatusCode::BAD_REQUEST,
            "account_linking_token and redirect_uri are required",
        )
            .into_response();
    };

    let auth_code = uuid::Uuid::new_v4().simple().to_string();
    let success_uri = format!("{}&authorization_code={}", redirect_uri, auth_code);
    info!("Rendering account link page for token {}", token);

    Html(render_authorize_page(&token, &redirect_uri, &success_uri)).into_response()
}

// ── Page rendering ─────────────────────────────────────────────────────────────

fn render_authorize_page(token: &str, redirect_uri: &str, success_uri: &str) -> String {
    let token = escape_html(token);
    let redirect_uri = escape_html(redirect_uri);
    let success_uri = escape_html(success_uri);
    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Link your account</title></head>
<body>
<p>Account linking token: {token}</p>
<p>Redirect URI: {redirect_uri}</p>
<p><a href="{success_uri}">Complete account link</a></p>
<p><a href="{redirect_uri}">Cancel</a></p>
</body>
</html>
"#
    )
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::tests::FakeDirectory;
    use crate::config::test_config;
    use crate::router::tests::{router_with, RecordingSender};
    use crate::webhook::signature::{sign_sha1, sign_sha256};
    use axum::http::HeaderValue;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use serde_json::json;
    use std::time::Duration;
    use tower::ServiceExt;

    fn app_with(sender: Arc<RecordingSender>, allow_unsigned: bool) -> Router {
        let mut config = test_config();
        config.messenger.allow_unsigned = allow_unsigned;
        routes(Arc::new(AppState {
            config: Arc::new(config),
            router: router_with(sender, FakeDirectory::with_agents(2)),
        }))
    }

    fn page_batch(text: &str) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "object": "page",
            "entry": [{
                "id": "page-1",
                "time": 1458692752478i64,
                "messaging": [{
                    "sender": { "id": "user-1" },
                    "recipient": { "id": "page-1" },
                    "timestamp": 1458692752478i64,
                    "message": { "mid": "mid.1", "text": text }
                }]
            }]
        }))
        .unwrap()
    }

    fn post(body: Vec<u8>, signature: Option<String>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/webhook")
            .header("content-type", "application/json");
        if let Some(signature) = signature {
            builder = builder.header(SIGNATURE_HEADER, signature);
        }
        builder.body(Body::from(body)).unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn wait_for_sends(sender: &RecordingSender, count: usize) {
        for _ in 0..100 {
            if sender.sent.lock().unwrap().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {} outbound message(s)", count);
    }

    #[tokio::test]
    async fn test_subscription_challenge_echoed() {
        let app = app_with(Arc::new(RecordingSender::default()), false);
        let response = app
            .oneshot(
                Request::get("/webhook?hub.mode=subscribe&hub.verify_token=verify-me&hub.challenge=12345")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "12345");
    }

    #[tokio::test]
    async fn test_subscription_wrong_token_forbidden() {
        let app = app_with(Arc::new(RecordingSender::default()), false);
        for uri in [
            "/webhook?hub.mode=subscribe&hub.verify_token=nope&hub.challenge=1",
            "/webhook?hub.mode=unsubscribe&hub.verify_token=verify-me&hub.challenge=1",
            "/webhook",
        ] {
            let response = app
                .clone()
                .oneshot(Request::get(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::FORBIDDEN, "uri {}", uri);
        }
    }

    #[tokio::test]
    async fn test_signed_batch_dispatched() {
        let sender = Arc::new(RecordingSender::default());
        let app = app_with(sender.clone(), false);
        let body = page_batch("hello");
        let signature = sign_sha1("app-secret", &body);

        let response = app.oneshot(post(body, Some(signature))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        wait_for_sends(&sender, 1).await;
        let sent = sender.sent.lock().unwrap();
        assert_eq!(sent[0].recipient_id, "user-1");
    }

    #[tokio::test]
    async fn test_bad_signature_rejected_without_dispatch() {
        let sender = Arc::new(RecordingSender::default());
        let app = app_with(sender.clone(), false);
        let body = page_batch("hello");
        let signature = sign_sha1("wrong-secret", &body);

        let response = app.oneshot(post(body, Some(signature))).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(sender.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_signature_fails_closed() {
        let sender = Arc::new(RecordingSender::default());
        let app = app_with(sender.clone(), false);

        let response = app.oneshot(post(page_batch("hello"), None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(sender.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_signature_allowed_when_configured() {
        let sender = Arc::new(RecordingSender::default());
        let app = app_with(sender.clone(), true);

        let response = app.oneshot(post(page_batch("hello"), None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        wait_for_sends(&sender, 1).await;
    }

    #[tokio::test]
    async fn test_wrong_signature_rejected_even_when_unsigned_allowed() {
        let app = app_with(Arc::new(RecordingSender::default()), true);
        let body = page_batch("hello");
        let signature = sign_sha1("wrong-secret", &body);

        let response = app.oneshot(post(body, Some(signature))).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_sha256_header_accepted() {
        let sender = Arc::new(RecordingSender::default());
        let app = app_with(sender.clone(), false);
        let body = page_batch("hello");
        let request = Request::builder()
            .method("POST")
            .uri("/webhook")
            .header("content-type", "application/json")
            .header(SIGNATURE_256_HEADER, sign_sha256("app-secret", &body))
            .body(Body::from(body))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        wait_for_sends(&sender, 1).await;
    }

    #[tokio::test]
    async fn test_unreadable_signature_rejected_even_when_unsigned_allowed() {
        let sender = Arc::new(RecordingSender::default());
        let app = app_with(sender.clone(), true);
        let request = Request::builder()
            .method("POST")
            .uri("/webhook")
            .header("content-type", "application/json")
            .header(
                SIGNATURE_HEADER,
                HeaderValue::from_bytes(b"sha1=\xff\xfe").unwrap(),
            )
            .body(Body::from(page_batch("hello")))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(sender.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_event_does_not_sink_batch() {
        let sender = Arc::new(RecordingSender::default());
        let app = app_with(sender.clone(), false);
        let body = serde_json::to_vec(&json!({
            "object": "page",
            "entry": [{ "id": "page-1", "time": 1, "messaging": [
                { "sender": { "id": "user-1" }, "message": { "text": "hello" } },
                { "sender": { "id": "user-2" }, "postback": { "payload": null } }
            ]}]
        }))
        .unwrap();
        let signature = sign_sha1("app-secret", &body);

        let response = app.oneshot(post(body, Some(signature))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        wait_for_sends(&sender, 1).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        let sent = sender.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipient_id, "user-1");
    }

    #[tokio::test]
    async fn test_non_page_object_acknowledged_without_dispatch() {
        let sender = Arc::new(RecordingSender::default());
        let app = app_with(sender.clone(), false);
        let body = serde_json::to_vec(&json!({
            "object": "user",
            "entry": [{ "id": "1", "time": 1, "messaging": [
                { "sender": { "id": "user-1" }, "message": { "text": "hello" } }
            ]}]
        }))
        .unwrap();
        let signature = sign_sha1("app-secret", &body);

        let response = app.oneshot(post(body, Some(signature))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(sender.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_json_is_bad_request() {
        let app = app_with(Arc::new(RecordingSender::default()), false);
        let body = b"not json".to_vec();
        let signature = sign_sha1("app-secret", &body);

        let response = app.oneshot(post(body, Some(signature))).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_authorize_page() {
        let app = app_with(Arc::new(RecordingSender::default()), false);
        let response = app
            .oneshot(
                Request::get("/authorize?account_linking_token=tok&redirect_uri=https%3A%2F%2Fplatform.example%2Flink%3Fx%3D1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let page = body_text(response).await;
        assert!(page.contains("Account linking token: tok"));
        assert!(page.contains("https://platform.example/link?x=1&amp;authorization_code="));
    }

    #[tokio::test]
    async fn test_authorize_requires_parameters() {
        let app = app_with(Arc::new(RecordingSender::default()), false);
        let response = app
            .oneshot(Request::get("/authorize?account_linking_token=tok").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<a href="x">&'"#),
            "&lt;a href=&quot;x&quot;&gt;&amp;&#39;"
        );
    }
}
