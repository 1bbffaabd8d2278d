//! Turns a raw transport outcome into an [`ApiResult`].
//!
//! # Design
//! A pure function with no I/O. The HTTP status decides the branch: 2xx is
//! decoded into the caller's type, anything else becomes an `ErrorResult`
//! carrying that status. Error bodies are read leniently because the
//! platform is not consistent about where it puts validation detail; when
//! nothing usable is found the message falls back to the status line.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{ApiResult, ErrorResult};
use crate::http::HttpResponse;
use crate::transport::TransportError;

/// Normalize one transport outcome.
pub fn normalize<T: DeserializeOwned>(outcome: Result<HttpResponse, TransportError>) -> ApiResult<T> {
    match outcome {
        Ok(response) if response.is_success() => decode_success(response),
        Ok(response) => Err(error_from_response(response)),
        Err(err) => Err(ErrorResult::transport(err.to_string())),
    }
}

fn decode_success<T: DeserializeOwned>(response: HttpResponse) -> ApiResult<T> {
    // 204 and friends: an empty body decodes as JSON null.
    let text = if response.body.trim().is_empty() {
        "null"
    } else {
        response.body.as_str()
    };
    serde_json::from_str(text).map_err(|e| {
        ErrorResult::decode(
            response.status,
            format!("failed to decode response body: {e}"),
            response.body.clone(),
        )
    })
}

/// Build an `ErrorResult` from a non-2xx response.
pub fn error_from_response(response: HttpResponse) -> ErrorResult {
    let status = response.status;
    let body = serde_json::from_str::<Value>(&response.body)
        .ok()
        .filter(Value::is_object);

    let Some(body) = body else {
        let err = ErrorResult::http(status, generic_message(status));
        return if response.body.is_empty() {
            err
        } else {
            err.with_raw_body(response.body)
        };
    };

    // The body's own `status` field is ignored; the response status wins.
    // First usable key wins; blank or malformed values fall through.
    let message = MESSAGE_KEYS
        .iter()
        .find_map(|key| {
            body.get(*key)
                .and_then(Value::as_str)
                .filter(|m| !m.trim().is_empty())
        })
        .map(str::to_string)
        .unwrap_or_else(|| generic_message(status));
    let validation = VALIDATION_KEYS
        .iter()
        .find_map(|key| {
            body.get(*key)
                .and_then(|detail| ValidationDetail::deserialize(detail).ok())
        })
        .map(ValidationDetail::into_map)
        .unwrap_or_default();

    ErrorResult::http(status, message).with_validation(validation)
}

const MESSAGE_KEYS: [&str; 3] = ["message", "Message", "error"];
const VALIDATION_KEYS: [&str; 2] = ["errors", "validationErrors"];

/// `"404 Not Found"`, or `"HTTP 599"` when the code has no canonical reason.
pub fn generic_message(status: u16) -> String {
    reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .map(|reason| format!("{status} {reason}"))
        .unwrap_or_else(|| format!("HTTP {status}"))
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ValidationDetail {
    Map(BTreeMap<String, FieldMessages>),
    List(Vec<FieldError>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FieldMessages {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Deserialize)]
struct FieldError {
    #[serde(alias = "property", alias = "name")]
    field: String,
    message: String,
}

impl ValidationDetail {
    fn into_map(self) -> BTreeMap<String, String> {
        match self {
            ValidationDetail::Map(map) => map
                .into_iter()
                .map(|(field, messages)| {
                    let text = match messages {
                        FieldMessages::One(message) => message,
                        FieldMessages::Many(messages) => messages.join("; "),
                    };
                    (field, text)
                })
                .collect(),
            ValidationDetail::List(list) => {
                let mut map: BTreeMap<String, String> = BTreeMap::new();
                for FieldError { field, message } in list {
                    map.entry(field)
                        .and_modify(|existing| {
                            existing.push_str("; ");
                            existing.push_str(&message);
                        })
                        .or_insert(message);
                }
                map
            }
        }
    }
}
