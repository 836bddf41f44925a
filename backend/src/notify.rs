use crate::errors::{Error, Result};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::env;
use std::time::Duration;
use tracing::debug;

const DEFAULT_GATEWAY_URL: &str = "https://api.fonnte.com/send";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for the WhatsApp messaging gateway. Delivery is fire-and-forget:
/// callers log failures and move on, there is no retry and no ordering
/// guarantee.
#[derive(Debug, Clone)]
pub struct Notifier {
    http: Client,
    url: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct GatewayResponse {
    #[serde(default)]
    status: bool,
    reason: Option<String>,
}

impl Notifier {
    pub fn new(url: String, token: String) -> Self {
        Self {
            http: Client::new(),
            url,
            token,
        }
    }

    pub fn from_env() -> Self {
        let url = env::var("GATEWAY_URL").unwrap_or_else(|_| DEFAULT_GATEWAY_URL.to_string());
        let token = env::var("GATEWAY_TOKEN").unwrap_or_default();
        Self::new(url, token)
    }

    /// Dispatch is disabled when no gateway token is configured.
    pub fn is_enabled(&self) -> bool {
        !self.token.is_empty()
    }

    /// Deliver one message. The gateway signals rejection in the response
    /// body (`status: false`) even on HTTP 200, so both layers are checked.
    pub async fn send(&self, target: &str, message: &str) -> Result<()> {
        debug!("dispatching notification to {}", target);

        let response = self
            .http
            .post(&self.url)
            .header("Authorization", &self.token)
            .timeout(REQUEST_TIMEOUT)
            .json(&json!({ "target": target, "message": message }))
            .send()
            .await
            .map_err(|e| Error::Dispatch(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::Dispatch(format!(
                "gateway returned HTTP {}",
                response.status()
            )));
        }

        let body: GatewayResponse = response
            .json()
            .await
            .map_err(|e| Error::Dispatch(e.to_string()))?;

        if !body.status {
            return Err(Error::Dispatch(
                body.reason
                    .unwrap_or_else(|| "gateway rejected the message".to_string()),
            ));
        }

        Ok(())
    }
}

/// Normalize an operator-entered phone number to the `62…` form the gateway
/// expects: strip everything but digits, then replace a leading local `0`
/// with the country code.
pub fn format_phone(number: &str) -> String {
    let digits: String = number.chars().filter(char::is_ascii_digit).collect();
    match digits.strip_prefix('0') {
        Some(rest) => format!("62{rest}"),
        None => digits,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_phone_replaces_leading_zero() {
        assert_eq!(format_phone("0812345678"), "62812345678");
    }

    #[test]
    fn format_phone_strips_plus_and_separators() {
        assert_eq!(format_phone("+62 812-345-678"), "62812345678");
    }

    #[test]
    fn format_phone_keeps_country_code_form() {
        assert_eq!(format_phone("62812345678"), "62812345678");
    }

    #[test]
    fn format_phone_empty_input() {
        assert_eq!(format_phone(""), "");
    }

    #[test]
    fn notifier_without_token_is_disabled() {
        let notifier = Notifier::new(DEFAULT_GATEWAY_URL.to_string(), String::new());
        assert!(!notifier.is_enabled());
    }
}
