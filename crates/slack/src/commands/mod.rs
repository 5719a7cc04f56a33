//! Command handlers served by the default route table.

pub mod action;
pub mod matrix;

pub use action::ActionEchoHandler;
pub use matrix::{render_pairs, ChannelMatrixHandler};
