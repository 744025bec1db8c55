//! HTTP plumbing shared by the vendor adapters

use reqwest::header::RETRY_AFTER;
use reqwest::{Client, NoProxy, Proxy, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::credentials::ProxySettings;
use crate::error::{LlmError, Result};

/// Build an HTTP client routing plain and TLS traffic through their own proxies
pub(crate) fn client_with_proxies(proxy: &ProxySettings) -> Result<Client> {
    let no_proxy = proxy.no_proxy().and_then(NoProxy::from_string);
    let mut builder = Client::builder();

    if let Some(url) = proxy.http_proxy() {
        let http = Proxy::http(url).map_err(|e| invalid_proxy("http_proxy", e))?;
        builder = builder.proxy(http.no_proxy(no_proxy.clone()));
    }
    if let Some(url) = proxy.https_proxy() {
        let https = Proxy::https(url).map_err(|e| invalid_proxy("https_proxy", e))?;
        builder = builder.proxy(https.no_proxy(no_proxy));
    }

    builder
        .build()
        .map_err(|e| LlmError::ConfigError(format!("Failed to build HTTP client: {}", e)))
}

/// Build an HTTP client sending all traffic through one proxy.
///
/// `http_proxy` takes precedence over `https_proxy`.
pub(crate) fn client_with_single_proxy(proxy: &ProxySettings) -> Result<Client> {
    let mut builder = Client::builder();

    if let Some(url) = proxy.http_proxy().or(proxy.https_proxy()) {
        let all = Proxy::all(url).map_err(|e| invalid_proxy("proxy", e))?;
        let no_proxy = proxy.no_proxy().and_then(NoProxy::from_string);
        builder = builder.proxy(all.no_proxy(no_proxy));
    }

    builder
        .build()
        .map_err(|e| LlmError::ConfigError(format!("Failed to build HTTP client: {}", e)))
}

fn invalid_proxy(field: &str, err: reqwest::Error) -> LlmError {
    LlmError::ConfigError(format!("Invalid {}: {}", field, err))
}

/// Pass successful responses through; turn everything else into an error
pub(crate) async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    let body = response.text().await.unwrap_or_default();

    Err(status_error(status, retry_after, &body))
}

fn status_error(status: StatusCode, retry_after: Option<u64>, body: &str) -> LlmError {
    let message = error_message(body).unwrap_or_else(|| {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    });

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LlmError::Authentication {
            message,
            status_code: status.as_u16(),
        },
        StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimited { retry_after },
        _ => LlmError::ApiError {
            message,
            status_code: Some(status.as_u16()),
        },
    }
}

/// Pull the human-readable message out of a vendor error body.
///
/// All four vendors use `{"error": {"message": ...}}`; anything else is
/// returned as-is.
pub(crate) fn error_message(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }

    let from_json = serde_json::from_str::<Value>(body).ok().and_then(|json| {
        json.pointer("/error/message")
            .or_else(|| json.get("error"))
            .or_else(|| json.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
    });

    Some(from_json.unwrap_or_else(|| body.to_string()))
}

/// Vendor error reported inside a stream chunk as `{"error": {...}}`.
///
/// A missing or null `error` field is not an error.
pub(crate) fn stream_error(provider: &'static str, chunk: &Value) -> Option<LlmError> {
    let error = chunk.get("error").filter(|e| !e.is_null())?;

    let message = error
        .get("message")
        .or(Some(error))
        .and_then(Value::as_str)
        .unwrap_or("stream error")
        .to_string();
    let status_code = error
        .get("code")
        .and_then(Value::as_u64)
        .and_then(|code| u16::try_from(code).ok());

    log::warn!("{} stream error: {}", provider, message);
    Some(LlmError::ApiError {
        message,
        status_code,
    })
}

/// Decode a successful response body
pub(crate) async fn read_json<T: DeserializeOwned>(
    provider: &'static str,
    response: Response,
) -> Result<T> {
    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|e| {
        LlmError::MalformedResponse(format!("{} returned an unreadable body: {}", provider, e))
    })
}
