use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::Serialize;
use slashbot_core::InterfaceError;
use slashbot_slack::{AckResponse, DispatchPipeline, InboundRequest};
use tracing::debug;
use uuid::Uuid;

#[derive(Clone)]
pub struct WebhookState {
    pipeline: Arc<DispatchPipeline>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub correlation_id: String,
}

/// One POST route per registered path; anything else falls through to a JSON 404.
pub fn router(pipeline: Arc<DispatchPipeline>) -> Router {
    let paths: Vec<String> = pipeline.routes().map(|(path, _)| path.to_owned()).collect();
    let router = paths
        .iter()
        .fold(Router::new(), |router, path| router.route(path, post(receive)));
    router.fallback(receive).with_state(WebhookState { pipeline })
}

pub async fn receive(
    State(state): State<WebhookState>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let correlation_id = Uuid::new_v4().to_string();
    let request = inbound_request(&headers, body);

    match state.pipeline.dispatch_with_id(uri.path(), &request, &correlation_id) {
        Ok(ack) => ack_response(ack),
        Err(error) => error_response(error.into_interface(correlation_id)),
    }
}

fn inbound_request(headers: &HeaderMap, body: Bytes) -> InboundRequest {
    headers.iter().fold(InboundRequest::new(body.to_vec()), |request, (name, value)| {
        match value.to_str() {
            Ok(value) => request.with_header(name.as_str(), value),
            Err(_) => {
                debug!(
                    event_name = "ingress.header.skipped",
                    header = name.as_str(),
                    "ignoring non-ascii header value"
                );
                request
            }
        }
    })
}

fn ack_response(ack: AckResponse) -> Response {
    if ack.is_json() {
        (StatusCode::OK, [(header::CONTENT_TYPE, "application/json")], ack.body()).into_response()
    } else {
        StatusCode::OK.into_response()
    }
}

fn error_response(error: InterfaceError) -> Response {
    let status = match &error {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let body = ErrorBody {
        error: error.user_message(),
        correlation_id: error.correlation_id().to_owned(),
    };
    (status, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
    };
    use secrecy::SecretString;
    use serde_json::{json, Map, Value};
    use slashbot_core::{config::AppConfig, SignatureVerifier};
    use slashbot_slack::{
        CallbackTarget, CallbackTransport, DeliveryError, MessagePayload, RemoteApiError,
        RemoteApiGateway,
    };
    use tokio::sync::Mutex;
    use tower::ServiceExt;

    use super::router;
    use crate::bootstrap::{assemble, Application, ACTION_ENDPOINT_PATH, MATRIX_PATH};

    const SECRET: &str = "s3cret";

    #[derive(Default)]
    struct RecordingTransport {
        posts: Mutex<Vec<(String, Value)>>,
    }

    #[async_trait]
    impl CallbackTransport for RecordingTransport {
        async fn post_json(
            &self,
            target: &CallbackTarget,
            payload: &MessagePayload,
        ) -> Result<(), DeliveryError> {
            let body = serde_json::to_value(payload).expect("serialize");
            self.posts.lock().await.push((target.as_str().to_owned(), body));
            Ok(())
        }
    }

    struct OneMemberGateway;

    #[async_trait]
    impl RemoteApiGateway for OneMemberGateway {
        async fn call(
            &self,
            method: &str,
            _params: &[(&str, &str)],
        ) -> Result<Map<String, Value>, RemoteApiError> {
            let body = match method {
                "conversations.members" => json!({ "ok": true, "members": ["U1"] }),
                "users.info" => json!({ "ok": true, "user": { "real_name": "Ada" } }),
                other => json!({ "ok": false, "error": format!("unexpected {other}") }),
            };
            slashbot_slack::api::check_response(method, body)
        }
    }

    fn app(transport: Arc<RecordingTransport>) -> Application {
        let mut config = AppConfig::default();
        config.slack.signing_secret = SecretString::from(SECRET.to_owned());
        assemble(config, transport, Arc::new(OneMemberGateway))
    }

    fn signed_post(path: &str, body: &str) -> Request<Body> {
        let verifier = SignatureVerifier::new(SecretString::from(SECRET.to_owned()));
        let timestamp = verifier.now_unix().to_string();
        Request::builder()
            .method("POST")
            .uri(path)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header("X-Slack-Request-Timestamp", &timestamp)
            .header("X-Slack-Signature", verifier.sign(&timestamp, body.as_bytes()))
            .body(Body::from(body.to_owned()))
            .expect("request")
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn slash_command_gets_typed_ack_and_deferred_table() {
        let transport = Arc::new(RecordingTransport::default());
        let app = app(transport.clone());
        let body = "channel_id=C1&text=&response_url=https%3A%2F%2Fhooks.example%2Fm";

        let response = router(app.pipeline.clone())
            .oneshot(signed_post(MATRIX_PATH, body))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({ "response_type": "in_channel" }));

        assert!(app.pipeline.delivery().drain(Duration::from_secs(5)).await);
        let posts = transport.posts.lock().await.clone();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].0, "https://hooks.example/m");
        assert_eq!(posts[0].1["response_type"], json!("in_channel"));
        assert!(posts[0].1["text"].as_str().expect("text").contains("Ada"));
    }

    #[tokio::test]
    async fn interactive_callback_gets_empty_ack() {
        let transport = Arc::new(RecordingTransport::default());
        let app = app(transport.clone());
        let payload = json!({
            "response_url": "https://hooks.example/a",
            "actions": [{ "value": "Correct" }]
        })
        .to_string();
        let body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("payload", &payload)
            .finish();

        let response = router(app.pipeline.clone())
            .oneshot(signed_post(ACTION_ENDPOINT_PATH, &body))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        assert!(bytes.is_empty());

        assert!(app.pipeline.delivery().drain(Duration::from_secs(5)).await);
        let posts = transport.posts.lock().await.clone();
        assert_eq!(
            posts,
            vec![(
                "https://hooks.example/a".to_owned(),
                json!({ "response_type": "ephemeral", "text": "Correct", "replace_original": false })
            )]
        );
    }

    #[tokio::test]
    async fn bad_signature_is_a_400_with_no_delivery() {
        let transport = Arc::new(RecordingTransport::default());
        let app = app(transport.clone());
        let request = Request::builder()
            .method("POST")
            .uri(MATRIX_PATH)
            .header("X-Slack-Request-Timestamp", "1")
            .header("X-Slack-Signature", "v0=00")
            .body(Body::from("response_url=https%3A%2F%2Fhooks.example%2Fm"))
            .expect("request");

        let response = router(app.pipeline.clone()).oneshot(request).await.expect("response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert!(body["correlation_id"].as_str().is_some_and(|id| !id.is_empty()));
        assert!(app.pipeline.delivery().drain(Duration::from_secs(1)).await);
        assert!(transport.posts.lock().await.is_empty());
    }

    #[tokio::test]
    async fn missing_response_url_is_a_400() {
        let transport = Arc::new(RecordingTransport::default());
        let app = app(transport.clone());

        let response = router(app.pipeline.clone())
            .oneshot(signed_post(MATRIX_PATH, "channel_id=C1&text=hi"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(app.pipeline.delivery().in_flight(), 0);
        assert!(transport.posts.lock().await.is_empty());
    }

    #[tokio::test]
    async fn unregistered_path_is_a_json_404() {
        let app = app(Arc::new(RecordingTransport::default()));

        let response = router(app.pipeline.clone())
            .oneshot(signed_post("/slack/trivia", "response_url=x"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = json_body(response).await;
        assert_eq!(body["error"], json!("No command is registered at this address."));
    }
}
