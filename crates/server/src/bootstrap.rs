use std::{sync::Arc, time::Duration};

use slashbot_core::config::{AppConfig, ConfigError};
use slashbot_core::SignatureVerifier;
use slashbot_slack::{
    commands::{ActionEchoHandler, ChannelMatrixHandler},
    CallbackTransport, DeferredDelivery, DispatchPipeline, HttpCallbackTransport,
    RemoteApiGateway, ResponseKind, RouteConfig, SlackApiClient,
};
use thiserror::Error;
use tracing::info;

pub const ACTION_ENDPOINT_PATH: &str = "/slack/action-endpoint";
pub const MATRIX_PATH: &str = "/slack/matrix";

pub struct Application {
    pub config: AppConfig,
    pub pipeline: Arc<DispatchPipeline>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("http client construction failed: {0}")]
    HttpClient(String),
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    let timeout = Duration::from_secs(config.delivery.callback_timeout_secs);
    let transport = HttpCallbackTransport::with_timeout(timeout)
        .map_err(|error| BootstrapError::HttpClient(error.to_string()))?;
    let gateway = SlackApiClient::with_timeout(
        config.slack.api_base_url.clone(),
        config.slack.bot_token.clone(),
        timeout,
    )
    .map_err(|error| BootstrapError::HttpClient(error.to_string()))?;

    Ok(assemble(config, Arc::new(transport), Arc::new(gateway)))
}

/// Wires the pipeline from explicit collaborators.
pub fn assemble(
    config: AppConfig,
    transport: Arc<dyn CallbackTransport>,
    gateway: Arc<dyn RemoteApiGateway>,
) -> Application {
    let verifier = SignatureVerifier::new(config.slack.signing_secret.clone());
    let delivery = DeferredDelivery::new(transport, config.delivery.max_in_flight);
    let mut pipeline = DispatchPipeline::new(verifier, delivery);
    register_default_routes(&mut pipeline, gateway);

    info!(
        event_name = "system.bootstrap.routes_registered",
        correlation_id = "bootstrap",
        route_count = pipeline.route_count(),
        max_in_flight = config.delivery.max_in_flight,
        "webhook routes registered"
    );

    Application { config, pipeline: Arc::new(pipeline) }
}

pub fn register_default_routes(
    pipeline: &mut DispatchPipeline,
    gateway: Arc<dyn RemoteApiGateway>,
) {
    pipeline
        .register(
            ACTION_ENDPOINT_PATH,
            Arc::new(ActionEchoHandler),
            RouteConfig::new(ResponseKind::Ephemeral).empty_ack(),
        )
        .register(
            MATRIX_PATH,
            Arc::new(ChannelMatrixHandler::new(gateway)),
            RouteConfig::new(ResponseKind::InChannel),
        );
}
