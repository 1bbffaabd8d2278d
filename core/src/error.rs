//! The uniform failure value returned by every API call.
//!
//! # Design
//! Ordinary API failures are values, not panics and not a zoo of error
//! types: server rejections, server faults, and calls that never got a
//! response all normalize into one `ErrorResult`. `ApiResult<T>` is the
//! tagged union callers match on. The only discriminator between "the
//! server answered" and "nothing came back" is `status`: `None` is the
//! "no status" sentinel.

use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;

/// Outcome of an API call: the decoded domain value, or an `ErrorResult`.
pub type ApiResult<T> = Result<T, ErrorResult>;

/// Where a failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// 4xx: the server understood the request and refused it.
    Rejected,
    /// 5xx.
    Server,
    /// A non-2xx status outside the 4xx/5xx ranges.
    Unexpected,
    /// No HTTP response was obtained (timeout, DNS, refused, reset).
    Transport,
    /// A 2xx response whose body does not match the expected shape.
    Decode,
    /// The request could not be built: malformed path, unserializable body,
    /// or an invalid header. Nothing was sent.
    InvalidRequest,
}

impl ErrorKind {
    /// Classify a non-2xx HTTP status.
    pub fn from_status(status: u16) -> Self {
        match status {
            400..=499 => ErrorKind::Rejected,
            500..=599 => ErrorKind::Server,
            _ => ErrorKind::Unexpected,
        }
    }
}

/// Structured failure carried by the error side of [`ApiResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{}", describe(.status, .message))]
#[serde(rename_all = "camelCase")]
pub struct ErrorResult {
    pub kind: ErrorKind,
    /// HTTP status received, or `None` when no response was obtained.
    pub status: Option<u16>,
    pub message: String,
    /// Field-level validation messages keyed by field name.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub validation: BTreeMap<String, String>,
    /// Raw response body, kept for diagnostics when it was not usable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_body: Option<String>,
}

fn describe(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(code) => format!("HTTP {code}: {message}"),
        None => format!("no response: {message}"),
    }
}

impl ErrorResult {
    /// Failure reported by the server with HTTP status `status`.
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::from_status(status),
            status: Some(status),
            message: non_empty(message.into(), "request failed"),
            validation: BTreeMap::new(),
            raw_body: None,
        }
    }

    /// The request never reached the server or its response never came back.
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Transport,
            status: None,
            message: non_empty(message.into(), "transport failure"),
            validation: BTreeMap::new(),
            raw_body: None,
        }
    }

    /// The request was rejected locally before dispatch.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::InvalidRequest,
            status: None,
            message: non_empty(message.into(), "invalid request"),
            validation: BTreeMap::new(),
            raw_body: None,
        }
    }

    /// A successful response whose body could not be decoded.
    pub fn decode(status: u16, message: impl Into<String>, raw_body: String) -> Self {
        Self {
            kind: ErrorKind::Decode,
            status: Some(status),
            message: non_empty(message.into(), "response body could not be decoded"),
            validation: BTreeMap::new(),
            raw_body: Some(raw_body),
        }
    }

    pub fn with_validation(mut self, validation: BTreeMap<String, String>) -> Self {
        self.validation = validation;
        self
    }

    pub fn with_raw_body(mut self, raw_body: impl Into<String>) -> Self {
        self.raw_body = Some(raw_body.into());
        self
    }

    /// `true` when no HTTP status exists for this failure.
    pub fn is_no_status(&self) -> bool {
        self.status.is_none()
    }

    pub fn is_transport(&self) -> bool {
        self.kind == ErrorKind::Transport
    }

    pub fn is_not_found(&self) -> bool {
        self.status == Some(404)
    }

    /// Validation message for `field`, if the server reported one.
    pub fn validation_for(&self, field: &str) -> Option<&str> {
        self.validation.get(field).map(String::as_str)
    }
}

fn non_empty(message: String, fallback: &str) -> String {
    if message.trim().is_empty() {
        fallback.to_string()
    } else {
        message
    }
}
