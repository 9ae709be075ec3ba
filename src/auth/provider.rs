//! Classification of provider error responses
//!
//! The token endpoint answers failures with an RFC 6749 body
//! (`{"error": "invalid_grant", "error_description": "..."}`), while Google
//! API endpoints use `{"error": {"code": 403, "status": "...", ...}}`. Both
//! shapes are folded into the [`AutoclerkError`] taxonomy here so the rest of
//! the crate only has to branch on variants.

use reqwest::StatusCode;
use serde_json::Value;

use crate::error::AutoclerkError;

/// Markers Google uses when the API is not enabled for the client's project.
const API_DISABLED_MARKERS: &[&str] = &[
    "SERVICE_DISABLED",
    "accessNotConfigured",
    "has not been used in project",
];

/// OAuth error codes that mean the client descriptor itself is bad.
const INVALID_CLIENT_CODES: &[&str] = &["invalid_client", "unauthorized_client"];

/// Maps a non-success provider response to an error variant.
///
/// | condition                                   | variant               |
/// |---------------------------------------------|-----------------------|
/// | API-disabled marker anywhere in the body    | `ApiNotEnabled`       |
/// | `error` is `invalid_client` / `unauthorized_client` | `InvalidClientSecret` |
/// | 5xx or 429                                  | `Network`             |
/// | anything else                               | `TokenExchange`       |
///
/// # Examples
///
/// ```
/// use autoclerk::auth::provider::classify_error_response;
/// use autoclerk::AutoclerkError;
/// use reqwest::StatusCode;
///
/// let err = classify_error_response(
///     StatusCode::UNAUTHORIZED,
///     r#"{"error": "invalid_client", "error_description": "The OAuth client was not found."}"#,
/// );
/// assert!(matches!(err, AutoclerkError::InvalidClientSecret(_)));
/// ```
pub fn classify_error_response(status: StatusCode, body: &str) -> AutoclerkError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let detail = describe(status, parsed.as_ref(), body);

    if API_DISABLED_MARKERS.iter().any(|m| body.contains(m)) {
        return AutoclerkError::ApiNotEnabled(format!(
            "{detail}. Enable the API in the Google Cloud Console \
             (https://console.cloud.google.com/apis/library) and retry after a few minutes"
        ));
    }

    if let Some(code) = oauth_error_code(parsed.as_ref()) {
        if INVALID_CLIENT_CODES.contains(&code) {
            return AutoclerkError::InvalidClientSecret(detail);
        }
    }

    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        return AutoclerkError::Network(detail);
    }

    AutoclerkError::TokenExchange(detail)
}

/// Maps a transport-level `reqwest` failure to [`AutoclerkError::Network`].
///
/// Connection refusals, DNS failures and timeouts all land here, so they are
/// retried like 5xx responses.
///
/// # Arguments
///
/// * `context` - What was being attempted, prefixed to the message
/// * `err` - The underlying transport error
pub fn classify_transport_error(context: &str, err: &reqwest::Error) -> AutoclerkError {
    AutoclerkError::Network(format!("{context}: {err}"))
}

/// Returns the RFC 6749 `error` code when the body is an OAuth error.
pub fn oauth_error_code(body: Option<&Value>) -> Option<&str> {
    body?.get("error")?.as_str()
}

fn describe(status: StatusCode, parsed: Option<&Value>, raw: &str) -> String {
    let Some(value) = parsed else {
        return format!("provider returned {status}: {}", raw.trim());
    };

    if let Some(code) = oauth_error_code(Some(value)) {
        return match value.get("error_description").and_then(Value::as_str) {
            Some(desc) => format!("provider returned {status} {code}: {desc}"),
            None => format!("provider returned {status} {code}"),
        };
    }

    // Google API error object
    if let Some(message) = value
        .get("error")
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
    {
        return format!("provider returned {status}: {message}");
    }

    format!("provider returned {status}: {}", raw.trim())
}
