use serde_json::json;
use slashbot_core::config::{AppConfig, LoadOptions};
use slashbot_core::SignatureVerifier;

use super::{CommandResult, EXIT_CONFIG_INVALID};

/// Signs `body` with the configured secret so a webhook can be replayed locally with curl.
pub fn run(body: &str, timestamp: Option<i64>) -> CommandResult {
    run_with(LoadOptions::default(), body, timestamp)
}

pub fn run_with(options: LoadOptions, body: &str, timestamp: Option<i64>) -> CommandResult {
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "sign",
                "config_validation",
                error.to_string(),
                EXIT_CONFIG_INVALID,
            )
        }
    };

    let verifier = SignatureVerifier::new(config.slack.signing_secret);
    let timestamp = timestamp.unwrap_or_else(|| verifier.now_unix()).to_string();
    let signature = verifier.sign(&timestamp, body.as_bytes());

    CommandResult::success_with_details(
        "sign",
        format!("X-Slack-Request-Timestamp: {timestamp}\nX-Slack-Signature: {signature}"),
        Some(json!({ "timestamp": timestamp, "signature": signature })),
    )
}
