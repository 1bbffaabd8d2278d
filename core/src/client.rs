//! The shared request dispatcher every resource client delegates to.
//!
//! # Design
//! `ApiClient` owns the session: a base URL fixed at construction, the
//! current credential, the default headers, and the transport. Each call
//! goes through the same pipeline:
//!
//! 1. `RequestDescriptor::new` validates the resource-relative path, drops
//!    absent query parameters and serializes the body. Nothing is sent if
//!    any of that fails.
//! 2. The descriptor is resolved against the base URL and the default
//!    headers are attached. The credential is read exactly once here, so a
//!    rotation never touches a request that is already built.
//! 3. The transport performs the round trip and [`normalize`] turns the
//!    outcome into an [`ApiResult`].
//!
//! Calls never panic on API failures: every outcome, network failures
//! included, comes back as `Ok(T)` or `Err(ErrorResult)`.

use std::sync::{Arc, PoisonError, RwLock};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn, Span};
use url::Url;
use uuid::Uuid;

use crate::config::{ClientConfig, ConfigError, Credential};
use crate::error::{ApiResult, ErrorResult};
use crate::http::{HttpMethod, HttpRequest};
use crate::normalize::normalize;
use crate::transport::{ReqwestTransport, Transport};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// A scalar usable as a query parameter value. `None` and empty strings
/// mean "absent" and are never sent.
pub trait IntoParam {
    fn into_param(self) -> Option<String>;
}

impl IntoParam for &str {
    fn into_param(self) -> Option<String> {
        (!self.is_empty()).then(|| self.to_string())
    }
}

impl IntoParam for String {
    fn into_param(self) -> Option<String> {
        (!self.is_empty()).then_some(self)
    }
}

impl IntoParam for &String {
    fn into_param(self) -> Option<String> {
        self.as_str().into_param()
    }
}

macro_rules! display_param {
    ($($ty:ty),*) => {
        $(
            impl IntoParam for $ty {
                fn into_param(self) -> Option<String> {
                    Some(self.to_string())
                }
            }
        )*
    };
}

display_param!(bool, i32, i64, u16, u32, u64, usize, f64);

impl<T: IntoParam> IntoParam for Option<T> {
    fn into_param(self) -> Option<String> {
        self.and_then(IntoParam::into_param)
    }
}

/// Per-call options: query parameters and extra headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    params: Vec<(String, String)>,
    headers: Vec<(String, String)>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set query parameter `name`. Absent values are skipped; setting a name
    /// twice keeps the last value.
    pub fn param(mut self, name: &str, value: impl IntoParam) -> Self {
        self.params.retain(|(k, _)| k != name);
        if let Some(value) = value.into_param() {
            self.params.push((name.to_string(), value));
        }
        self
    }

    /// Add a header for this call only. It replaces any default header with
    /// the same name.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }
}

/// What one call asks for, before base URL resolution and default headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    method: HttpMethod,
    path: String,
    query: Vec<(String, String)>,
    body: Option<String>,
}

impl RequestDescriptor {
    /// Validate `path` and serialize `body`.
    pub fn new<B>(
        method: HttpMethod,
        path: &str,
        options: &RequestOptions,
        body: Option<&B>,
    ) -> ApiResult<Self>
    where
        B: Serialize + ?Sized,
    {
        validate_path(path)?;
        let body = body
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| ErrorResult::invalid_request(format!("failed to serialize request body: {e}")))?;
        Ok(Self {
            method,
            path: path.to_string(),
            query: options.params.clone(),
            body,
        })
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }
}

/// `collection/id`, where `id` must be exactly one non-blank path segment.
pub fn record_path(collection: &str, id: &str) -> ApiResult<String> {
    if id.trim().is_empty() {
        return Err(ErrorResult::invalid_request("record id is empty"));
    }
    if id.contains('/') {
        return Err(ErrorResult::invalid_request(format!(
            "record id {id:?} must be a single path segment"
        )));
    }
    Ok(format!("{collection}/{id}"))
}

fn validate_path(path: &str) -> ApiResult<()> {
    let invalid = |reason: &str| Err(ErrorResult::invalid_request(format!("invalid path {path:?}: {reason}")));

    if path.contains("://") || path.starts_with("//") {
        return invalid("paths are relative to the base URL");
    }
    if path.contains('?') || path.contains('#') {
        return invalid("query parameters belong in RequestOptions");
    }
    if path.chars().any(char::is_control) {
        return invalid("control characters are not allowed");
    }
    let mut segments = path.split('/').filter(|s| !s.is_empty()).peekable();
    if segments.peek().is_none() {
        return invalid("path is empty");
    }
    if segments.any(|s| s == "." || s == "..") {
        return invalid("dot segments are not allowed");
    }
    Ok(())
}

/// The API client facade. Share it behind an `Arc`; every method takes
/// `&self`.
pub struct ApiClient {
    base_url: Url,
    transport: Arc<dyn Transport>,
    credential: RwLock<Option<Credential>>,
    default_headers: Vec<(String, String)>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url.as_str())
            .field("credential", &self.credential_snapshot())
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Build a client over the default `reqwest` transport.
    pub fn new(config: ClientConfig) -> Result<Self, ConfigError> {
        let transport = ReqwestTransport::new(config.timeout)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Build a client over any transport.
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        let mut default_headers = vec![
            ("accept".to_string(), "application/json".to_string()),
            ("user-agent".to_string(), config.user_agent),
        ];
        for (name, value) in config.default_headers {
            set_header(&mut default_headers, name, value);
        }
        Self {
            base_url: config.base_url,
            transport,
            credential: RwLock::new(config.credential),
            default_headers,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Replace the credential for every request built from now on.
    pub fn set_credential(&self, credential: Credential) {
        *self.credential.write().unwrap_or_else(PoisonError::into_inner) = Some(credential);
        debug!("credential rotated");
    }

    pub fn clear_credential(&self) {
        *self.credential.write().unwrap_or_else(PoisonError::into_inner) = None;
        debug!("credential cleared");
    }

    pub fn has_credential(&self) -> bool {
        self.credential_snapshot().is_some()
    }

    fn credential_snapshot(&self) -> Option<Credential> {
        self.credential
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub async fn get<T>(&self, path: &str, options: RequestOptions) -> ApiResult<T>
    where
        T: DeserializeOwned,
    {
        self.request::<T, ()>(HttpMethod::Get, path, options, None).await
    }

    pub async fn post<T, B>(&self, path: &str, options: RequestOptions, body: &B) -> ApiResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(HttpMethod::Post, path, options, Some(body)).await
    }

    pub async fn patch<T, B>(&self, path: &str, options: RequestOptions, body: &B) -> ApiResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(HttpMethod::Patch, path, options, Some(body)).await
    }

    pub async fn delete<T>(&self, path: &str, options: RequestOptions) -> ApiResult<T>
    where
        T: DeserializeOwned,
    {
        self.request::<T, ()>(HttpMethod::Delete, path, options, None).await
    }

    /// Issue one request and normalize its outcome.
    #[tracing::instrument(
        name = "api_request",
        skip_all,
        fields(
            http.method = %method,
            http.path = %path,
            request_id = tracing::field::Empty,
            http.status_code = tracing::field::Empty,
        )
    )]
    pub async fn request<T, B>(
        &self,
        method: HttpMethod,
        path: &str,
        options: RequestOptions,
        body: Option<&B>,
    ) -> ApiResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let result = match RequestDescriptor::new(method, path, &options, body) {
            Ok(descriptor) => self.dispatch(&descriptor, options.headers()).await,
            Err(err) => Err(err),
        };

        match &result {
            Ok(_) => debug!("request succeeded"),
            Err(err) => {
                if let Some(status) = err.status {
                    Span::current().record("http.status_code", status);
                }
                warn!(kind = ?err.kind, status = ?err.status, reason = %err.message, "request failed");
            }
        }
        result
    }

    /// Send an already built descriptor.
    pub async fn dispatch<T>(
        &self,
        descriptor: &RequestDescriptor,
        extra_headers: &[(String, String)],
    ) -> ApiResult<T>
    where
        T: DeserializeOwned,
    {
        let request = self.build_http_request(descriptor, extra_headers)?;
        debug!(url = %request.url, params = request.query.len(), "dispatching request");

        let outcome = self.transport.send(request).await;
        if let Ok(response) = &outcome {
            Span::current().record("http.status_code", response.status);
        }
        normalize(outcome)
    }

    /// Resolve the descriptor into the exact request the transport sees.
    pub fn build_http_request(
        &self,
        descriptor: &RequestDescriptor,
        extra_headers: &[(String, String)],
    ) -> ApiResult<HttpRequest> {
        let url = self.resolve(&descriptor.path)?;
        let request_id = Uuid::new_v4().to_string();
        Span::current().record("request_id", request_id.as_str());

        let mut headers = self.default_headers.clone();
        if descriptor.body.is_some() {
            set_header(&mut headers, "content-type", "application/json");
        }
        if let Some(credential) = self.credential_snapshot() {
            let (name, value) = credential.header();
            set_header(&mut headers, name, value);
        }
        set_header(&mut headers, REQUEST_ID_HEADER, request_id);
        for (name, value) in extra_headers {
            set_header(&mut headers, name.as_str(), value.as_str());
        }
        for (name, value) in &headers {
            validate_header(name, value)?;
        }

        Ok(HttpRequest {
            method: descriptor.method,
            url: url.to_string(),
            query: descriptor.query.clone(),
            headers,
            body: descriptor.body.clone(),
        })
    }

    fn resolve(&self, path: &str) -> ApiResult<Url> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| ErrorResult::invalid_request("base URL cannot carry a path"))?;
            segments.pop_if_empty();
            segments.extend(path.split('/').filter(|s| !s.is_empty()));
        }
        Ok(url)
    }
}

/// Insert or replace a header, matching names case-insensitively.
fn set_header(headers: &mut Vec<(String, String)>, name: impl Into<String>, value: impl Into<String>) {
    let name = name.into();
    headers.retain(|(existing, _)| !existing.eq_ignore_ascii_case(&name));
    headers.push((name, value.into()));
}

fn validate_header(name: &str, value: &str) -> ApiResult<()> {
    let token_char = |c: char| c.is_ascii_alphanumeric() || "!#$%&'*+-.^_`|~".contains(c);
    if name.is_empty() || !name.chars().all(token_char) {
        return Err(ErrorResult::invalid_request(format!("invalid header name {name:?}")));
    }
    if value.chars().any(|c| c == '\r' || c == '\n' || c == '\0') {
        return Err(ErrorResult::invalid_request(format!("invalid value for header {name:?}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::http::HttpResponse;
    use crate::transport::TransportError;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tracing_test::traced_test;

    /// Answers every request with one canned response and keeps a copy of
    /// what it was sent.
    struct Canned {
        response: Result<HttpResponse, TransportError>,
        seen: Mutex<Vec<HttpRequest>>,
    }

    impl Canned {
        fn new(response: Result<HttpResponse, TransportError>) -> Arc<Self> {
            Arc::new(Self {
                response,
                seen: Mutex::new(Vec::new()),
            })
        }

        fn last(&self) -> HttpRequest {
            self.seen.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl Transport for Canned {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
            self.seen.lock().unwrap().push(request);
            self.response.clone()
        }
    }

    fn client(transport: Arc<Canned>) -> ApiClient {
        let config = ClientConfig::new("https://erp.example.com/").unwrap();
        ApiClient::with_transport(config, transport)
    }

    #[test]
    fn options_drop_absent_params() {
        let options = RequestOptions::new()
            .param("filter", Some("x eq 'y'"))
            .param("include", None::<&str>)
            .param("order", "")
            .param("pageSize", 50u32);
        assert_eq!(
            options.params(),
            &[
                ("filter".to_string(), "x eq 'y'".to_string()),
                ("pageSize".to_string(), "50".to_string()),
            ]
        );
    }

    #[test]
    fn options_keep_last_value_for_repeated_param() {
        let options = RequestOptions::new().param("pageNumber", 1u32).param("pageNumber", 2u32);
        assert_eq!(options.params(), &[("pageNumber".to_string(), "2".to_string())]);
    }

    #[test]
    fn descriptor_rejects_malformed_paths() {
        let options = RequestOptions::new();
        for path in [
            "",
            "/",
            "https://other.example.com/api/v1/Emails",
            "//other.example.com/Emails",
            "/api/v1/Emails?filter=x",
            "/api/v1/Emails#top",
            "/api/v1/../admin",
        ] {
            let err = RequestDescriptor::new::<()>(HttpMethod::Get, path, &options, None).unwrap_err();
            assert_eq!(err.kind, ErrorKind::InvalidRequest, "{path}");
            assert!(err.is_no_status());
        }
    }

    #[test]
    fn descriptor_serializes_body() {
        let body = serde_json::json!([{"subject": "Hi"}]);
        let descriptor =
            RequestDescriptor::new(HttpMethod::Post, "/api/v1/Emails", &RequestOptions::new(), Some(&body))
                .unwrap();
        assert_eq!(descriptor.body(), Some(r#"[{"subject":"Hi"}]"#));
    }

    #[test]
    fn builds_resolved_request_with_default_headers() {
        let transport = Canned::new(Ok(HttpResponse::new(200, "{}")));
        let api = client(transport);
        api.set_credential(Credential::bearer("token-1"));

        let descriptor = RequestDescriptor::new::<()>(
            HttpMethod::Get,
            "/api/v1/Emails/abc 123",
            &RequestOptions::new().param("include", "Attachments"),
            None,
        )
        .unwrap();
        let request = api.build_http_request(&descriptor, &[]).unwrap();

        assert_eq!(request.url, "https://erp.example.com/api/v1/Emails/abc%20123");
        assert_eq!(request.query_param("include"), Some("Attachments"));
        assert_eq!(request.header("Authorization"), Some("Bearer token-1"));
        assert_eq!(request.header("accept"), Some("application/json"));
        assert!(request.header("content-type").is_none());
        assert!(Uuid::parse_str(request.header(REQUEST_ID_HEADER).unwrap()).is_ok());
    }

    #[test]
    fn base_path_prefix_is_kept() {
        let config = ClientConfig::new("https://erp.example.com/tenant-7").unwrap();
        let api = ApiClient::with_transport(config, Canned::new(Ok(HttpResponse::new(200, "{}"))));
        let descriptor =
            RequestDescriptor::new::<()>(HttpMethod::Get, "api/v1/Leads", &RequestOptions::new(), None).unwrap();
        let request = api.build_http_request(&descriptor, &[]).unwrap();
        assert_eq!(request.url, "https://erp.example.com/tenant-7/api/v1/Leads");
    }

    #[test]
    fn caller_headers_win_over_defaults() {
        let api = client(Canned::new(Ok(HttpResponse::new(200, "{}"))));
        api.set_credential(Credential::bearer("default"));
        let descriptor =
            RequestDescriptor::new::<()>(HttpMethod::Get, "/api/v1/Leads", &RequestOptions::new(), None).unwrap();
        let extra = vec![
            ("AUTHORIZATION".to_string(), "Bearer override".to_string()),
            ("Accept".to_string(), "text/csv".to_string()),
        ];
        let request = api.build_http_request(&descriptor, &extra).unwrap();

        let auth: Vec<_> = request
            .headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case("authorization"))
            .collect();
        assert_eq!(auth.len(), 1);
        assert_eq!(request.header("authorization"), Some("Bearer override"));
        assert_eq!(request.header("accept"), Some("text/csv"));
    }

    #[test]
    fn config_default_headers_are_sent() {
        let config = ClientConfig::new("https://erp.example.com")
            .unwrap()
            .default_header("X-Company", "acme")
            .user_agent("ledger-sync/2.1");
        let api = ApiClient::with_transport(config, Canned::new(Ok(HttpResponse::new(200, "{}"))));
        let descriptor =
            RequestDescriptor::new::<()>(HttpMethod::Get, "/api/v1/Leads", &RequestOptions::new(), None).unwrap();
        let request = api.build_http_request(&descriptor, &[]).unwrap();
        assert_eq!(request.header("x-company"), Some("acme"));
        assert_eq!(request.header("user-agent"), Some("ledger-sync/2.1"));
    }

    #[test]
    fn invalid_caller_header_is_rejected_before_sending() {
        let api = client(Canned::new(Ok(HttpResponse::new(200, "{}"))));
        let descriptor =
            RequestDescriptor::new::<()>(HttpMethod::Get, "/api/v1/Leads", &RequestOptions::new(), None).unwrap();
        let extra = vec![("X-Bad".to_string(), "a\r\nInjected: 1".to_string())];
        let err = api.build_http_request(&descriptor, &extra).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidRequest);
    }

    #[tokio::test]
    async fn post_sets_content_type_and_body() {
        let transport = Canned::new(Ok(HttpResponse::new(200, "[]")));
        let api = client(transport.clone());
        let body = vec![serde_json::json!({"name": "Acme"})];

        let created: Vec<serde_json::Value> =
            api.post("/api/v1/Companies", RequestOptions::new(), &body).await.unwrap();

        assert!(created.is_empty());
        let sent = transport.last();
        assert_eq!(sent.method, HttpMethod::Post);
        assert_eq!(sent.header("content-type"), Some("application/json"));
        assert_eq!(sent.body.as_deref(), Some(r#"[{"name":"Acme"}]"#));
    }

    #[tokio::test]
    async fn invalid_path_never_reaches_transport() {
        let transport = Canned::new(Ok(HttpResponse::new(200, "{}")));
        let api = client(transport.clone());
        let err = api
            .get::<serde_json::Value>("https://evil.example.com/x", RequestOptions::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidRequest);
        assert!(transport.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn clear_credential_removes_auth_header() {
        let transport = Canned::new(Ok(HttpResponse::new(204, "")));
        let api = client(transport.clone());
        api.set_credential(Credential::bearer("t"));
        api.clear_credential();
        assert!(!api.has_credential());

        api.delete::<()>("/api/v1/Leads/1", RequestOptions::new()).await.unwrap();
        assert!(transport.last().header("authorization").is_none());
    }

    #[tokio::test]
    #[traced_test]
    async fn failures_are_logged_without_credentials() {
        let transport = Canned::new(Ok(HttpResponse::new(
            404,
            r#"{"status":404,"message":"Not Found"}"#,
        )));
        let api = client(transport);
        api.set_credential(Credential::bearer("very-secret-token"));

        let err = api
            .get::<serde_json::Value>("/api/v1/Emails/missing", RequestOptions::new())
            .await
            .unwrap_err();

        assert_eq!(err.status, Some(404));
        assert!(logs_contain("request failed"));
        assert!(!logs_contain("very-secret-token"));
    }

    #[test]
    fn debug_output_redacts_credential() {
        let api = client(Canned::new(Ok(HttpResponse::new(200, "{}"))));
        api.set_credential(Credential::bearer("very-secret-token"));
        let rendered = format!("{api:?}");
        assert!(rendered.contains("erp.example.com"));
        assert!(!rendered.contains("very-secret-token"));
    }
}
