//! Per-route verify → extract → acknowledge → defer composition.

use std::{collections::BTreeMap, sync::Arc};

use slashbot_core::{RequestError, SignatureVerifier};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    delivery::{DeferredDelivery, DeliveryJob},
    handler::CommandHandler,
    inbound::{extract, InboundRequest},
    message::{AckResponse, ResponseKind},
};

/// Lifecycle of one inbound request. `Rejected` and `Delivered` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestState {
    Received,
    Verifying,
    Rejected,
    Acknowledged,
    Delivering,
    Delivered,
}

impl RequestState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Verifying => "verifying",
            Self::Rejected => "rejected",
            Self::Acknowledged => "acknowledged",
            Self::Delivering => "delivering",
            Self::Delivered => "delivered",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::Delivered)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RouteConfig {
    pub response_kind: ResponseKind,
    pub require_verification: bool,
    pub empty_ack: bool,
}

impl RouteConfig {
    /// Verified route whose ack declares `response_kind`.
    pub fn new(response_kind: ResponseKind) -> Self {
        Self { response_kind, require_verification: true, empty_ack: false }
    }

    pub fn empty_ack(mut self) -> Self {
        self.empty_ack = true;
        self
    }

    pub fn without_verification(mut self) -> Self {
        self.require_verification = false;
        self
    }

    fn ack(&self) -> AckResponse {
        if self.empty_ack {
            AckResponse::Empty
        } else {
            AckResponse::Declared(self.response_kind)
        }
    }
}

#[derive(Clone)]
struct Route {
    handler: Arc<dyn CommandHandler>,
    config: RouteConfig,
}

#[derive(Clone)]
pub struct DispatchPipeline {
    verifier: SignatureVerifier,
    delivery: DeferredDelivery,
    routes: BTreeMap<String, Route>,
}

impl DispatchPipeline {
    pub fn new(verifier: SignatureVerifier, delivery: DeferredDelivery) -> Self {
        Self { verifier, delivery, routes: BTreeMap::new() }
    }

    /// Registers `handler` at `path`, replacing any previous registration.
    pub fn register(
        &mut self,
        path: impl Into<String>,
        handler: Arc<dyn CommandHandler>,
        config: RouteConfig,
    ) -> &mut Self {
        self.routes.insert(path.into(), Route { handler, config });
        self
    }

    pub fn routes(&self) -> impl Iterator<Item = (&str, RouteConfig)> {
        self.routes.iter().map(|(path, route)| (path.as_str(), route.config))
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    pub fn delivery(&self) -> &DeferredDelivery {
        &self.delivery
    }

    pub fn dispatch(
        &self,
        path: &str,
        request: &InboundRequest,
    ) -> Result<AckResponse, RequestError> {
        self.dispatch_with_id(path, request, &Uuid::new_v4().to_string())
    }

    /// Handles one POST synchronously. The handler is scheduled only after the ack
    /// value exists, and the ack is returned without waiting for it.
    pub fn dispatch_with_id(
        &self,
        path: &str,
        request: &InboundRequest,
        correlation_id: &str,
    ) -> Result<AckResponse, RequestError> {
        info!(
            event_name = "ingress.request.received",
            correlation_id,
            route = path,
            state = RequestState::Received.as_str(),
            "inbound webhook received"
        );

        let result = self.accept(path, request, correlation_id);
        match &result {
            Ok(ack) => info!(
                event_name = "ingress.request.acknowledged",
                correlation_id,
                route = path,
                state = RequestState::Acknowledged.as_str(),
                empty_ack = !ack.is_json(),
                "request acknowledged; deferred delivery scheduled"
            ),
            Err(error) => warn!(
                event_name = "ingress.request.rejected",
                correlation_id,
                route = path,
                state = RequestState::Rejected.as_str(),
                error = %error,
                "request rejected"
            ),
        }
        result
    }

    fn accept(
        &self,
        path: &str,
        request: &InboundRequest,
        correlation_id: &str,
    ) -> Result<AckResponse, RequestError> {
        let route =
            self.routes.get(path).ok_or_else(|| RequestError::UnknownRoute(path.to_owned()))?;

        if route.config.require_verification {
            debug!(
                event_name = "ingress.request.verifying",
                correlation_id,
                route = path,
                state = RequestState::Verifying.as_str(),
                "checking request signature"
            );
            self.verifier
                .verify(request.timestamp(), request.signature(), request.body())
                .into_result()?;
        }

        let (content, target) = extract(request.form_fields())
            .map_err(|error| RequestError::Malformed(error.to_string()))?;

        let ack = route.config.ack();
        self.delivery.submit(DeliveryJob {
            correlation_id: correlation_id.to_owned(),
            route: path.to_owned(),
            content,
            handler: route.handler.clone(),
            response_kind: route.config.response_kind,
            target,
        });
        Ok(ack)
    }
}
