//! Test transports shared by the integration suites.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use erp_core::{ClientConfig, ErpClient, HttpRequest, HttpResponse, Transport, TransportError};
use tokio::sync::Notify;

pub const BASE_URL: &str = "https://erp.example.com";

type Responder = Box<dyn Fn(&HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync>;

/// Answers from a closure and records every request it is handed.
pub struct RecordingTransport {
    responder: Responder,
    requests: Mutex<Vec<HttpRequest>>,
}

impl RecordingTransport {
    pub fn new<F>(responder: F) -> Arc<Self>
    where
        F: Fn(&HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Always answer `status` with `body`.
    pub fn respond(status: u16, body: &str) -> Arc<Self> {
        let body = body.to_string();
        Self::new(move |_| Ok(HttpResponse::new(status, body.clone())))
    }

    /// Always fail without a response.
    pub fn fail(err: TransportError) -> Arc<Self> {
        Self::new(move |_| Err(err.clone()))
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last(&self) -> HttpRequest {
        self.requests().pop().expect("no request was sent")
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let outcome = (self.responder)(&request);
        self.requests.lock().unwrap().push(request);
        outcome
    }
}

/// Holds every request until the test releases it. `arrived` fires once per
/// request that reaches the transport.
pub struct GatedTransport {
    pub arrived: Notify,
    pub release: Notify,
    requests: Mutex<Vec<HttpRequest>>,
}

impl GatedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            arrived: Notify::new(),
            release: Notify::new(),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for GatedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(request);
        self.arrived.notify_one();
        self.release.notified().await;
        Ok(HttpResponse::new(200, "{}"))
    }
}

pub fn client_with(transport: Arc<dyn Transport>) -> ErpClient {
    ErpClient::with_transport(ClientConfig::new(BASE_URL).unwrap(), transport)
}
