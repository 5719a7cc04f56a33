//! Deferred execution of handlers and delivery of their outcome to the response URL.
//!
//! Every accepted request becomes exactly one tracked task. The task runs the handler,
//! converts any failure (error or panic) into the fixed ephemeral error message, and
//! posts the result once. Posting is best-effort: failures are logged, never retried.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::Client;
use slashbot_core::ApplicationError;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::{
    dispatch::RequestState,
    handler::{CommandHandler, HandlerError},
    inbound::{CallbackTarget, CommandContent},
    message::{MessagePayload, ResponseKind},
};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("callback request failed: {0}")]
    Transport(String),
    #[error("callback returned status {status}: {body}")]
    Status { status: u16, body: String },
}

#[async_trait]
pub trait CallbackTransport: Send + Sync {
    async fn post_json(
        &self,
        target: &CallbackTarget,
        payload: &MessagePayload,
    ) -> Result<(), DeliveryError>;
}

#[derive(Clone, Debug)]
pub struct HttpCallbackTransport {
    client: Client,
}

impl HttpCallbackTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, DeliveryError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| DeliveryError::Transport(error.to_string()))?;
        Ok(Self::new(client))
    }
}

#[async_trait]
impl CallbackTransport for HttpCallbackTransport {
    async fn post_json(
        &self,
        target: &CallbackTarget,
        payload: &MessagePayload,
    ) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(target.as_str())
            .json(payload)
            .send()
            .await
            .map_err(|error| DeliveryError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Status { status: status.as_u16(), body });
        }

        Ok(())
    }
}

/// One accepted request, ready to run.
pub struct DeliveryJob {
    pub correlation_id: String,
    pub route: String,
    pub content: CommandContent,
    pub handler: Arc<dyn CommandHandler>,
    pub response_kind: ResponseKind,
    pub target: CallbackTarget,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeferredOutcome {
    Success(MessagePayload),
    Failure,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeliveryReport {
    pub outcome: DeferredOutcome,
    pub posted: Result<(), DeliveryError>,
}

#[derive(Clone)]
pub struct DeferredDelivery {
    transport: Arc<dyn CallbackTransport>,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
}

impl DeferredDelivery {
    pub fn new(transport: Arc<dyn CallbackTransport>, max_in_flight: usize) -> Self {
        Self {
            transport,
            permits: Arc::new(Semaphore::new(max_in_flight.max(1))),
            tracker: TaskTracker::new(),
        }
    }

    /// Schedules the job and returns immediately. Must be called within a tokio runtime.
    pub fn submit(&self, job: DeliveryJob) {
        let this = self.clone();
        self.tracker.spawn(async move {
            let _permit = this.permits.clone().acquire_owned().await.ok();
            this.run(job).await;
        });
    }

    /// Runs the handler and posts its outcome exactly once.
    pub async fn run(&self, job: DeliveryJob) -> DeliveryReport {
        let DeliveryJob { correlation_id, route, content, handler, response_kind, target } = job;
        debug!(
            event_name = "delivery.handler.started",
            correlation_id = %correlation_id,
            route = %route,
            state = RequestState::Delivering.as_str(),
            "running handler"
        );

        let outcome = match invoke(handler, content).await {
            Ok(payload) => DeferredOutcome::Success(payload.tagged(response_kind)),
            Err(failure) => {
                let interface = failure.into_interface(correlation_id.as_str());
                error!(
                    event_name = "delivery.handler.failed",
                    correlation_id = %correlation_id,
                    route = %route,
                    error = %interface,
                    "handler failed; delivering generic error message"
                );
                DeferredOutcome::Failure
            }
        };

        let payload = match &outcome {
            DeferredOutcome::Success(payload) => payload.clone(),
            DeferredOutcome::Failure => MessagePayload::internal_error(),
        };

        let posted = self.transport.post_json(&target, &payload).await;
        match &posted {
            Ok(()) => info!(
                event_name = "delivery.callback.posted",
                correlation_id = %correlation_id,
                route = %route,
                state = RequestState::Delivered.as_str(),
                response_type = payload.response_type.map(ResponseKind::as_str).unwrap_or("none"),
                "deferred response delivered"
            ),
            Err(error) => {
                let interface = ApplicationError::Delivery(error.to_string())
                    .into_interface(correlation_id.as_str());
                warn!(
                    event_name = "delivery.callback.failed",
                    correlation_id = %correlation_id,
                    route = %route,
                    state = RequestState::Delivered.as_str(),
                    error = %interface,
                    "deferred response could not be delivered; not retrying"
                );
            }
        }

        DeliveryReport { outcome, posted }
    }

    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Waits for every submitted job to finish, giving up after `timeout`.
    pub async fn drain(&self, timeout: Duration) -> bool {
        self.tracker.close();
        let drained = tokio::time::timeout(timeout, self.tracker.wait()).await.is_ok();
        self.tracker.reopen();
        if drained {
            debug!(event_name = "delivery.drain.complete", "all deferred deliveries finished");
        } else {
            warn!(
                event_name = "delivery.drain.timeout",
                in_flight = self.tracker.len(),
                "deferred deliveries still running after drain timeout"
            );
        }
        drained
    }
}

/// Runs the handler on its own task so a panic surfaces as a failure instead of
/// tearing down the delivery.
async fn invoke(
    handler: Arc<dyn CommandHandler>,
    content: CommandContent,
) -> Result<MessagePayload, ApplicationError> {
    let joined = tokio::spawn(async move { handler.handle(&content).await }).await;
    match joined {
        Ok(Ok(payload)) => Ok(payload),
        Ok(Err(HandlerError::RemoteApi(error))) => {
            Err(ApplicationError::RemoteApi(error.to_string()))
        }
        Ok(Err(error)) => Err(ApplicationError::Handler(error.to_string())),
        Err(join_error) if join_error.is_panic() => {
            Err(ApplicationError::Handler("handler panicked".to_owned()))
        }
        Err(join_error) => Err(ApplicationError::Handler(join_error.to_string())),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::{json, Value};
    use slashbot_core::{ApplicationError, GENERIC_ERROR_TEXT};
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::{TcpListener, TcpStream},
        sync::Mutex,
        task::JoinHandle,
    };

    use super::{
        invoke, CallbackTransport, DeferredDelivery, DeferredOutcome, DeliveryError, DeliveryJob,
        HttpCallbackTransport,
    };
    use crate::{
        api::RemoteApiError,
        handler::{CommandHandler, FnHandler, HandlerError},
        inbound::{CallbackTarget, CommandContent},
        message::{MessagePayload, ResponseKind},
    };

    #[derive(Default)]
    pub(crate) struct RecordingTransport {
        pub(crate) posts: Mutex<Vec<(String, Value)>>,
        pub(crate) events: Option<Arc<std::sync::Mutex<Vec<&'static str>>>>,
        pub(crate) fail_with: Option<DeliveryError>,
    }

    impl RecordingTransport {
        pub(crate) async fn posts(&self) -> Vec<(String, Value)> {
            self.posts.lock().await.clone()
        }
    }

    #[async_trait]
    impl CallbackTransport for RecordingTransport {
        async fn post_json(
            &self,
            target: &CallbackTarget,
            payload: &MessagePayload,
        ) -> Result<(), DeliveryError> {
            if let Some(events) = &self.events {
                events.lock().expect("events lock").push("post");
            }
            let body = serde_json::to_value(payload).expect("payload serializes");
            self.posts.lock().await.push((target.as_str().to_owned(), body));
            match &self.fail_with {
                Some(error) => Err(error.clone()),
                None => Ok(()),
            }
        }
    }

    /// Answers one HTTP request on loopback with `status` and `body`. The handle
    /// resolves to the raw request text.
    pub(crate) async fn serve_once(
        status: &'static str,
        body: &'static str,
    ) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind loopback");
        let address = listener.local_addr().expect("local addr");
        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.expect("accept");
            let request = read_request(&mut stream).await;
            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\n\
                 content-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).await.expect("write response");
            stream.shutdown().await.ok();
            request
        });
        (format!("http://{address}"), handle)
    }

    async fn read_request(stream: &mut TcpStream) -> String {
        let mut buffer = Vec::new();
        let mut chunk = [0_u8; 1024];
        loop {
            let read = stream.read(&mut chunk).await.expect("read request");
            if read == 0 {
                break;
            }
            buffer.extend_from_slice(&chunk[..read]);
            let text = String::from_utf8_lossy(&buffer);
            if let Some(header_end) = text.find("\r\n\r\n") {
                let content_length = text[..header_end]
                    .lines()
                    .filter_map(|line| line.split_once(':'))
                    .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buffer.len() >= header_end + 4 + content_length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }

    fn job(handler: Arc<dyn CommandHandler>, kind: ResponseKind) -> DeliveryJob {
        DeliveryJob {
            correlation_id: "req-1".to_owned(),
            route: "/slack/test".to_owned(),
            content: CommandContent::default(),
            handler,
            response_kind: kind,
            target: CallbackTarget::new("https://hooks.example/respond"),
        }
    }

    #[tokio::test]
    async fn success_payload_is_tagged_with_route_kind() {
        let transport = Arc::new(RecordingTransport::default());
        let delivery = DeferredDelivery::new(transport.clone(), 4);
        let handler = Arc::new(FnHandler(|_content: CommandContent| async {
            Ok::<_, HandlerError>(MessagePayload::text("42"))
        }));

        let report = delivery.run(job(handler, ResponseKind::InChannel)).await;

        assert!(matches!(report.outcome, DeferredOutcome::Success(_)));
        assert_eq!(report.posted, Ok(()));
        assert_eq!(
            transport.posts().await,
            vec![(
                "https://hooks.example/respond".to_owned(),
                json!({ "response_type": "in_channel", "text": "42" })
            )]
        );
    }

    #[tokio::test]
    async fn handler_error_delivers_generic_ephemeral_message_once() {
        let transport = Arc::new(RecordingTransport::default());
        let delivery = DeferredDelivery::new(transport.clone(), 4);
        let handler = Arc::new(FnHandler(|_content: CommandContent| async {
            Err::<MessagePayload, _>(HandlerError::Failed("db password is hunter2".to_owned()))
        }));

        let report = delivery.run(job(handler, ResponseKind::InChannel)).await;

        assert_eq!(report.outcome, DeferredOutcome::Failure);
        let posts = transport.posts().await;
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].1, json!({ "response_type": "ephemeral", "text": GENERIC_ERROR_TEXT }));
        assert!(!posts[0].1.to_string().contains("hunter2"));
    }

    struct PanickingHandler;

    #[async_trait]
    impl CommandHandler for PanickingHandler {
        async fn handle(&self, _content: &CommandContent) -> Result<MessagePayload, HandlerError> {
            panic!("index out of bounds in handler");
        }
    }

    #[tokio::test]
    async fn handler_panic_is_recovered_as_failure() {
        let transport = Arc::new(RecordingTransport::default());
        let delivery = DeferredDelivery::new(transport.clone(), 4);

        let report = delivery.run(job(Arc::new(PanickingHandler), ResponseKind::InChannel)).await;

        assert_eq!(report.outcome, DeferredOutcome::Failure);
        let posts = transport.posts().await;
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].1["text"], json!(GENERIC_ERROR_TEXT));
        assert_eq!(posts[0].1["response_type"], json!("ephemeral"));
    }

    #[tokio::test]
    async fn transport_failure_is_reported_without_retry() {
        let transport = Arc::new(RecordingTransport {
            fail_with: Some(DeliveryError::Status { status: 500, body: "boom".to_owned() }),
            ..RecordingTransport::default()
        });
        let delivery = DeferredDelivery::new(transport.clone(), 4);
        let handler = Arc::new(FnHandler(|_content: CommandContent| async {
            Ok::<_, HandlerError>(MessagePayload::text("hello"))
        }));

        let report = delivery.run(job(handler, ResponseKind::Ephemeral)).await;

        assert!(matches!(report.posted, Err(DeliveryError::Status { status: 500, .. })));
        assert_eq!(transport.posts().await.len(), 1);
    }

    #[tokio::test]
    async fn submitted_jobs_respect_concurrency_bound() {
        let transport = Arc::new(RecordingTransport::default());
        let delivery = DeferredDelivery::new(transport.clone(), 2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for _ in 0..6 {
            let running = running.clone();
            let peak = peak.clone();
            let handler = Arc::new(FnHandler(move |_content: CommandContent| {
                let running = running.clone();
                let peak = peak.clone();
                async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, HandlerError>(MessagePayload::text("done"))
                }
            }));
            delivery.submit(job(handler, ResponseKind::InChannel));
        }

        assert!(delivery.drain(Duration::from_secs(5)).await, "jobs should drain");
        assert_eq!(delivery.in_flight(), 0);
        assert!(peak.load(Ordering::SeqCst) <= 2, "no more than two handlers at once");
        assert_eq!(transport.posts().await.len(), 6, "every job delivers exactly once");
    }

    #[tokio::test]
    async fn drain_reports_timeout_for_stuck_jobs() {
        let transport = Arc::new(RecordingTransport::default());
        let delivery = DeferredDelivery::new(transport.clone(), 1);
        let handler = Arc::new(FnHandler(|_content: CommandContent| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, HandlerError>(MessagePayload::text("late"))
        }));

        delivery.submit(job(handler, ResponseKind::InChannel));
        assert!(!delivery.drain(Duration::from_millis(20)).await);
        assert_eq!(delivery.in_flight(), 1);
    }

    #[tokio::test]
    async fn remote_api_failure_is_classified_and_delivers_generic_message() {
        let handler: Arc<dyn CommandHandler> =
            Arc::new(FnHandler(|_content: CommandContent| async {
                Err::<MessagePayload, _>(HandlerError::RemoteApi(RemoteApiError::Api {
                    method: "users.info".to_owned(),
                    error: "user_not_found".to_owned(),
                }))
            }));

        let failure = invoke(handler.clone(), CommandContent::default()).await;
        assert!(matches!(
            failure,
            Err(ApplicationError::RemoteApi(ref message)) if message.contains("user_not_found")
        ));

        let transport = Arc::new(RecordingTransport::default());
        let delivery = DeferredDelivery::new(transport.clone(), 1);
        let report = delivery.run(job(handler, ResponseKind::InChannel)).await;
        assert_eq!(report.outcome, DeferredOutcome::Failure);
        assert_eq!(transport.posts().await[0].1["text"], json!(GENERIC_ERROR_TEXT));
    }

    #[tokio::test]
    async fn http_transport_posts_json_to_response_url() {
        let (base, server) = serve_once("200 OK", "").await;
        let transport =
            HttpCallbackTransport::with_timeout(Duration::from_secs(5)).expect("client");
        let target = CallbackTarget::new(format!("{base}/hooks/1"));

        let posted = transport
            .post_json(&target, &MessagePayload::text("42").tagged(ResponseKind::InChannel))
            .await;

        assert_eq!(posted, Ok(()));
        let request = server.await.expect("server task");
        assert!(request.starts_with("POST /hooks/1 HTTP/1.1"));
        assert!(request.to_ascii_lowercase().contains("content-type: application/json"));
        assert!(request.ends_with(r#"{"response_type":"in_channel","text":"42"}"#));
    }

    #[tokio::test]
    async fn http_transport_reports_non_success_status() {
        let (base, server) = serve_once("404 Not Found", "expired_url").await;
        let transport =
            HttpCallbackTransport::with_timeout(Duration::from_secs(5)).expect("client");

        let posted =
            transport.post_json(&CallbackTarget::new(base), &MessagePayload::text("late")).await;

        assert_eq!(
            posted,
            Err(DeliveryError::Status { status: 404, body: "expired_url".to_owned() })
        );
        server.await.expect("server task");
    }

    #[tokio::test]
    async fn http_transport_reports_refused_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind loopback");
        let address = listener.local_addr().expect("local addr");
        drop(listener);
        let transport =
            HttpCallbackTransport::with_timeout(Duration::from_secs(5)).expect("client");

        let target = CallbackTarget::new(format!("http://{address}/"));
        let posted = transport.post_json(&target, &MessagePayload::text("x")).await;

        assert!(matches!(posted, Err(DeliveryError::Transport(_))));
    }
}
