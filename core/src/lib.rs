//! Async client for the ERP platform's REST API.
//!
//! # Overview
//! [`ErpClient`] owns one [`ApiClient`] and hands out a small, stateless
//! client per resource (`emails()`, `companies()`, `leads()`, ...). Every
//! resource method builds a path and delegates to the `ApiClient`, which
//! authenticates, dispatches through a [`Transport`], and normalizes the
//! outcome.
//!
//! # Design
//! - Every call returns [`ApiResult<T>`]: the decoded record, page, or list
//!   on success, an [`ErrorResult`] otherwise. HTTP rejections, server
//!   faults, and network failures share that one shape; network failures
//!   have no status.
//! - The transport is a trait object so tests can swap the network for a
//!   scripted fake. [`ReqwestTransport`] is the production engine.
//! - The credential can be rotated at any time through `&self`; requests
//!   already built keep the credential they were built with.
//! - `filter` and `order` strings are the server's query language and are
//!   passed through untouched.

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod models;
pub mod normalize;
pub mod pagination;
pub mod resources;
pub mod transport;

pub use client::{ApiClient, IntoParam, RequestDescriptor, RequestOptions};
pub use config::{ClientConfig, ConfigError, Credential};
pub use error::{ApiResult, ErrorKind, ErrorResult};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use models::{Company, CustomFieldDefinition, Email, Lead, Record};
pub use pagination::{Page, Query, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use resources::ErpClient;
pub use transport::{ReqwestTransport, Transport, TransportError};
