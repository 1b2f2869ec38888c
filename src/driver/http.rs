//! HTTP utilities for driver REST calls

use std::time::Duration;

use reqwest::{Client, Method};
use serde_json::Value;

use super::DriverError;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Sanitize response body for logging
/// Truncates long responses and strips non-printable characters
pub fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let mut end = MAX_LOG_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... [truncated, {} bytes total]", &body[..end], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// HTTP client wrapper for driver calls
#[derive(Clone)]
pub struct DriverHttpClient {
    client: Client,
}

impl DriverHttpClient {
    /// Create a new HTTP client with a bounded per-request timeout
    pub fn new(timeout: Duration) -> Result<Self, DriverError> {
        let client = Client::builder()
            .user_agent(concat!("mcplane/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| DriverError::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    /// Send one request and decode the JSON response.
    ///
    /// `Content-Type: application/json` is always set; `headers` are added on
    /// top. Statuses outside `[200, 400)` are errors. An empty body decodes to
    /// `Value::Null`.
    pub async fn send(
        &self,
        method: Method,
        url: &str,
        headers: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<Value, DriverError> {
        tracing::debug!("{} {}", method, url);

        let mut request = self
            .client
            .request(method, url)
            .header(reqwest::header::CONTENT_TYPE, "application/json");

        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        if let Some(body) = body {
            request = request.body(body.to_string());
        }

        let response = request.send().await.map_err(|e| DriverError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| DriverError::Transport {
            url: url.to_string(),
            message: format!("failed to read response body: {}", e),
        })?;

        if !(status.is_success() || status.is_redirection()) {
            tracing::error!("driver error: {} - {}", status, sanitize_for_log(&text));
            return Err(DriverError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body: sanitize_for_log(&text),
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&text).map_err(|e| DriverError::Decode {
            context: url.to_string(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_truncates_long_bodies() {
        let body = "x".repeat(500);
        let out = sanitize_for_log(&body);
        assert!(out.starts_with(&"x".repeat(200)));
        assert!(out.contains("[truncated, 500 bytes total]"));
    }

    #[test]
    fn test_sanitize_strips_control_characters() {
        assert_eq!(sanitize_for_log("bad\nrequest\t!"), "badrequest!");
    }

    #[test]
    fn test_sanitize_respects_char_boundaries() {
        let body = format!("{}{}", "a".repeat(199), "é".repeat(10));
        // must not panic slicing through a multi-byte char
        let out = sanitize_for_log(&body);
        assert!(out.contains("truncated"));
    }
}
