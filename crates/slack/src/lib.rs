//! Slash-command webhook pipeline.
//!
//! This crate turns verified platform callbacks into deferred responses:
//! - **Inbound** (`inbound`) - request model, form decoding, callback-target extraction
//! - **Dispatch** (`dispatch`) - per-route verify → ack → defer composition
//! - **Delivery** (`delivery`) - bounded, tracked execution of handlers and the callback POST
//! - **Web API** (`api`) - call/response gateway used by handlers
//! - **Commands** (`commands`) - the built-in handlers
//!
//! # Architecture
//!
//! ```text
//! POST /slack/* → SignatureVerifier → extract → AckResponse (returned)
//!                                         ↓
//!                          DeferredDelivery → CommandHandler → response_url
//! ```

pub mod api;
pub mod commands;
pub mod delivery;
pub mod dispatch;
pub mod handler;
pub mod inbound;
pub mod message;

pub use api::{RemoteApiError, RemoteApiGateway, SlackApiClient};
pub use delivery::{CallbackTransport, DeferredDelivery, DeliveryError, HttpCallbackTransport};
pub use dispatch::{DispatchPipeline, RouteConfig};
pub use handler::{CommandHandler, FnHandler, HandlerError};
pub use inbound::{CallbackTarget, CommandContent, InboundRequest};
pub use message::{AckResponse, MessagePayload, ResponseKind};
