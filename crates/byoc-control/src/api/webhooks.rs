//! Engine completion webhooks.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use sha2::Sha256;
use tracing::{info, warn};
use ulid::Ulid;

use crate::config::{UnsignedPolicy, WebhookConfig};
use crate::deployment::{EngineEvent, EventOutcome};

use super::AppState;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex HMAC-SHA256 of the request body.
pub const SIGNATURE_HEADER: &str = "pulumi-webhook-signature";

/// Checks webhook signatures.
pub struct WebhookVerifier {
    secret: Option<SecretString>,
    unsigned: UnsignedPolicy,
}

impl WebhookVerifier {
    /// Create a verifier. A blank secret counts as no secret.
    #[must_use]
    pub fn new(config: &WebhookConfig) -> Self {
        let secret = config
            .secret
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| SecretString::from(s.to_owned()));
        Self {
            secret,
            unsigned: config.unsigned,
        }
    }

    /// Whether a signing secret is configured.
    #[must_use]
    pub const fn is_configured(&self) -> bool {
        self.secret.is_some()
    }

    /// Verify a body against its signature header.
    ///
    /// The signature may carry a `sha256=` prefix. Without a secret the
    /// configured unsigned policy decides.
    pub fn verify(&self, body: &[u8], signature: Option<&str>) -> Result<(), &'static str> {
        let Some(ref secret) = self.secret else {
            return match self.unsigned {
                UnsignedPolicy::Accept => Ok(()),
                UnsignedPolicy::Reject => Err("webhook secret not configured"),
            };
        };

        let signature = signature
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or("missing signature")?;
        let signature = signature.strip_prefix("sha256=").unwrap_or(signature);
        let expected = hex::decode(signature).map_err(|_| "invalid signature")?;

        let mut mac = HmacSha256::new_from_slice(secret.expose_secret().as_bytes())
            .map_err(|_| "invalid signature")?;
        mac.update(body);
        mac.verify_slice(&expected).map_err(|_| "invalid signature")
    }

    /// Sign a body, as the engine would.
    #[must_use]
    pub fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
            Ok(mac) => mac,
            Err(_) => return String::new(),
        };
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("configured", &self.is_configured())
            .field("unsigned", &self.unsigned)
            .finish()
    }
}

/// Webhook acknowledgement.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    /// Always true: the delivery reached the handler.
    pub received: bool,
    /// What the handler did with it.
    #[serde(flatten)]
    pub outcome: EventOutcome,
}

impl WebhookResponse {
    fn rejected(reason: impl Into<String>) -> Self {
        Self {
            received: true,
            outcome: EventOutcome::skipped(None, reason),
        }
    }
}

/// Handle a deployment completion webhook.
///
/// Every delivery is acknowledged; only a bad signature produces a non-2xx
/// status.
pub async fn deployment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<WebhookResponse>) {
    let delivery = Ulid::new();
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    if let Err(reason) = state.webhook.verify(&body, signature) {
        warn!(delivery = %delivery, reason, "webhook rejected");
        return (StatusCode::UNAUTHORIZED, Json(WebhookResponse::rejected(reason)));
    }

    let event: EngineEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            warn!(delivery = %delivery, error = %e, "malformed webhook payload");
            return (
                StatusCode::OK,
                Json(WebhookResponse::rejected(format!("invalid payload: {e}"))),
            );
        }
    };

    info!(delivery = %delivery, stack = %event.stack, "webhook received");
    let outcome = state.orchestrator.handle_event(&event).await;

    (
        StatusCode::OK,
        Json(WebhookResponse {
            received: true,
            outcome,
        }),
    )
}

/// Webhook health response.
#[derive(Debug, Serialize)]
pub struct WebhookHealth {
    status: &'static str,
    webhook_secret_configured: bool,
}

/// Report whether webhooks can be verified.
pub async fn webhook_health(State(state): State<AppState>) -> Json<WebhookHealth> {
    Json(WebhookHealth {
        status: "healthy",
        webhook_secret_configured: state.webhook.is_configured(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::{app, body_json, router};
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn verifier(secret: Option<&str>, unsigned: UnsignedPolicy) -> WebhookVerifier {
        WebhookVerifier::new(&WebhookConfig {
            secret: secret.map(str::to_owned),
            unsigned,
        })
    }

    #[test]
    fn signatures_with_and_without_prefix() {
        let verifier = verifier(Some("s3cret"), UnsignedPolicy::Reject);
        let body = br#"{"stack":"acme-prod"}"#;
        let signature = WebhookVerifier::sign("s3cret", body);

        assert!(verifier.verify(body, Some(&signature)).is_ok());
        assert!(verifier
            .verify(body, Some(&format!("sha256={signature}")))
            .is_ok());
        assert_eq!(
            verifier.verify(b"tampered", Some(&signature)),
            Err("invalid signature")
        );
        assert_eq!(verifier.verify(body, Some("zz")), Err("invalid signature"));
        assert_eq!(verifier.verify(body, None), Err("missing signature"));
    }

    #[test]
    fn unsigned_policy_applies_without_secret() {
        assert!(verifier(None, UnsignedPolicy::Accept).verify(b"{}", None).is_ok());
        assert_eq!(
            verifier(Some("  "), UnsignedPolicy::Reject).verify(b"{}", None),
            Err("webhook secret not configured")
        );
    }

    fn webhook_request(body: &str, signature: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/v1/webhooks/deployment")
            .header("content-type", "application/json");
        if let Some(signature) = signature {
            builder = builder.header(SIGNATURE_HEADER, signature);
        }
        builder.body(Body::from(body.to_owned())).expect("request")
    }

    #[tokio::test]
    async fn bad_signature_is_unauthorized() {
        let app = app(Some("s3cret"));
        let response = router(&app)
            .oneshot(webhook_request(r#"{"stack":"acme-prod"}"#, Some("sha256=00")))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["received"], true);
        assert_eq!(body["processed"], false);
        assert_eq!(body["reason"], "invalid signature");
    }

    #[tokio::test]
    async fn malformed_payload_is_acknowledged() {
        let app = app(Some("s3cret"));
        let body = "not json";
        let signature = WebhookVerifier::sign("s3cret", body.as_bytes());
        let response = router(&app)
            .oneshot(webhook_request(body, Some(&signature)))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["processed"], false);
        assert!(body["reason"]
            .as_str()
            .is_some_and(|r| r.starts_with("invalid payload")));
    }

    #[tokio::test]
    async fn unknown_stack_is_not_processed() {
        let app = app(Some("s3cret"));
        let body = r#"{"stack":"byoc/byoc-infra/acme-prod","operation":"update","status":"succeeded"}"#;
        let signature = WebhookVerifier::sign("s3cret", body.as_bytes());
        let response = router(&app)
            .oneshot(webhook_request(body, Some(&signature)))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["reason"], "deployment not found");
    }

    #[tokio::test]
    async fn health_reports_secret() {
        let app = app(None);
        let response = router(&app)
            .oneshot(
                Request::builder()
                    .uri("/api/v1/webhooks/health")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        let body = body_json(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["webhook_secret_configured"], false);
    }
}
