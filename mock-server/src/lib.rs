//! In-memory stand-in for the ERP platform's REST API.
//!
//! Serves `/api/v1/{resource}` for any resource name with the platform's
//! CRUD and `/query` semantics, so client tests can run against real HTTP.
//! Records are untyped JSON objects kept in insertion order per resource.

use std::{
    cmp::Ordering,
    collections::{BTreeMap, HashMap, HashSet},
    sync::Arc,
};

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::{debug, info};
use uuid::Uuid;

pub const DEFAULT_PAGE_SIZE: usize = 200;
pub const MAX_PAGE_SIZE: usize = 10_000;

#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    /// When set, every request must carry `Authorization: Bearer <token>`.
    pub api_token: Option<String>,
}

pub type Db = Arc<RwLock<HashMap<String, Vec<Map<String, Value>>>>>;

#[derive(Clone)]
struct AppState {
    db: Db,
    api_token: Option<Arc<str>>,
}

/// Failure body in the platform's shape: `{status, message, errors?}`.
#[derive(Debug)]
pub struct ApiFailure {
    status: StatusCode,
    message: String,
    errors: BTreeMap<String, String>,
}

impl ApiFailure {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            errors: BTreeMap::new(),
        }
    }

    fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "Not Found")
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        let mut body = json!({
            "status": self.status.as_u16(),
            "message": self.message,
        });
        if !self.errors.is_empty() {
            body["errors"] = json!(self.errors);
        }
        (self.status, Json(body)).into_response()
    }
}

pub fn app() -> Router {
    app_with_config(ServerConfig::default())
}

pub fn app_with_config(config: ServerConfig) -> Router {
    let state = AppState {
        db: Arc::new(RwLock::new(HashMap::new())),
        api_token: config.api_token.map(Arc::from),
    };
    Router::new()
        .route("/api/v1/{resource}", post(create_records))
        .route("/api/v1/{resource}/query", get(query_records))
        .route(
            "/api/v1/{resource}/{id}",
            get(get_record).patch(update_record).delete(delete_record),
        )
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    run_with_config(listener, ServerConfig::default()).await
}

pub async fn run_with_config(listener: TcpListener, config: ServerConfig) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with_config(config)).await
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiFailure> {
    let Some(token) = &state.api_token else {
        return Ok(());
    };
    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    if presented == Some(&**token) {
        Ok(())
    } else {
        Err(ApiFailure::new(StatusCode::UNAUTHORIZED, "Unauthorized"))
    }
}

/// Fields a new record of `resource` must carry.
fn required_fields(resource: &str) -> &'static [&'static str] {
    match resource {
        "Emails" => &["subject"],
        "Companies" | "Leads" | "Contacts" | "Customers" | "Vendors" => &["name"],
        "CustomFieldDefinitions" => &["name", "tableName", "fieldType"],
        _ => &[],
    }
}

fn record_id(record: &Map<String, Value>) -> Option<&str> {
    record.get("id").and_then(Value::as_str)
}

async fn create_records(
    State(state): State<AppState>,
    Path(resource): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Vec<Map<String, Value>>>), ApiFailure> {
    authorize(&state, &headers)?;
    let Value::Array(items) = body else {
        return Err(ApiFailure::bad_request("Request body must be an array of records"));
    };

    let mut records = Vec::with_capacity(items.len());
    let mut errors = BTreeMap::new();
    for (index, item) in items.into_iter().enumerate() {
        let Value::Object(mut record) = item else {
            errors.insert(format!("[{index}]"), "must be an object".to_string());
            continue;
        };
        for field in required_fields(&resource) {
            let present = record
                .get(*field)
                .is_some_and(|v| !v.is_null() && v.as_str() != Some(""));
            if !present {
                errors.insert((*field).to_string(), "is required".to_string());
            }
        }
        if record_id(&record).is_none() {
            record.insert("id".to_string(), Value::String(Uuid::new_v4().to_string()));
        }
        records.push(record);
    }
    if !errors.is_empty() {
        let mut failure = ApiFailure::bad_request("Validation failed");
        failure.errors = errors;
        return Err(failure);
    }

    let mut db = state.db.write().await;
    let table = db.entry(resource.clone()).or_default();
    let mut batch_ids = HashSet::new();
    for record in &records {
        if let Some(id) = record_id(record) {
            if !batch_ids.insert(id) || table.iter().any(|r| record_id(r) == Some(id)) {
                return Err(ApiFailure::new(
                    StatusCode::CONFLICT,
                    format!("Record {id} already exists"),
                ));
            }
        }
    }
    table.extend(records.iter().cloned());
    info!(%resource, count = records.len(), "records created");
    Ok((StatusCode::CREATED, Json(records)))
}

#[derive(Debug, Default, Deserialize)]
pub struct IncludeParams {
    pub include: Option<String>,
}

async fn get_record(
    State(state): State<AppState>,
    Path((resource, id)): Path<(String, String)>,
    headers: HeaderMap,
    Query(params): Query<IncludeParams>,
) -> Result<Json<Map<String, Value>>, ApiFailure> {
    authorize(&state, &headers)?;
    let db = state.db.read().await;
    let record = db
        .get(&resource)
        .and_then(|table| table.iter().find(|r| record_id(r) == Some(id.as_str())))
        .cloned()
        .ok_or_else(ApiFailure::not_found)?;
    Ok(Json(expand_includes(record, params.include.as_deref())))
}

/// Make each included collection present, as an empty list when the record
/// has none.
fn expand_includes(mut record: Map<String, Value>, include: Option<&str>) -> Map<String, Value> {
    for name in include.unwrap_or_default().split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let mut chars = name.chars();
        let key = match chars.next() {
            Some(first) => first.to_lowercase().chain(chars).collect::<String>(),
            None => continue,
        };
        record.entry(key).or_insert_with(|| Value::Array(Vec::new()));
    }
    record
}

async fn update_record(
    State(state): State<AppState>,
    Path((resource, id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(changes): Json<Value>,
) -> Result<Json<Map<String, Value>>, ApiFailure> {
    authorize(&state, &headers)?;
    let Value::Object(changes) = changes else {
        return Err(ApiFailure::bad_request("Request body must be an object"));
    };
    let mut db = state.db.write().await;
    let record = db
        .get_mut(&resource)
        .and_then(|table| table.iter_mut().find(|r| record_id(r) == Some(id.as_str())))
        .ok_or_else(ApiFailure::not_found)?;
    for (key, value) in changes {
        if key != "id" {
            record.insert(key, value);
        }
    }
    Ok(Json(record.clone()))
}

async fn delete_record(
    State(state): State<AppState>,
    Path((resource, id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiFailure> {
    authorize(&state, &headers)?;
    let mut db = state.db.write().await;
    let table = db.get_mut(&resource).ok_or_else(ApiFailure::not_found)?;
    let position = table
        .iter()
        .position(|r| record_id(r) == Some(id.as_str()))
        .ok_or_else(ApiFailure::not_found)?;
    table.remove(position);
    info!(%resource, %id, "record deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryParams {
    pub filter: Option<String>,
    pub include: Option<String>,
    pub order: Option<String>,
    pub page_size: Option<usize>,
    pub page_number: Option<usize>,
}

/// `field eq 'value'`: the only filter form the mock understands.
#[derive(Debug, PartialEq, Eq)]
pub struct Equality {
    pub field: String,
    pub value: String,
}

pub fn parse_filter(filter: &str) -> Option<Equality> {
    let (field, rest) = filter.trim().split_once(" eq ")?;
    let value = rest.trim();
    let value = value
        .strip_prefix('\'')
        .and_then(|v| v.strip_suffix('\''))
        .unwrap_or(value);
    let field = field.trim();
    if field.is_empty() || field.contains(' ') {
        return None;
    }
    Some(Equality {
        field: field.to_string(),
        value: value.to_string(),
    })
}

fn matches_filter(record: &Map<String, Value>, filter: &Equality) -> bool {
    match record.get(&filter.field) {
        Some(Value::String(s)) => *s == filter.value,
        Some(Value::Null) | None => false,
        Some(other) => other.to_string() == filter.value,
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        (None | Some(Value::Null), _) => Ordering::Less,
        (_, None | Some(Value::Null)) => Ordering::Greater,
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}

async fn query_records(
    State(state): State<AppState>,
    Path(resource): Path<String>,
    headers: HeaderMap,
    Query(params): Query<QueryParams>,
) -> Result<Json<Value>, ApiFailure> {
    authorize(&state, &headers)?;
    debug!(%resource, ?params, "query");

    let filter = match params.filter.as_deref().filter(|f| !f.trim().is_empty()) {
        Some(raw) => Some(
            parse_filter(raw).ok_or_else(|| ApiFailure::bad_request(format!("Unsupported filter: {raw}")))?,
        ),
        None => None,
    };

    let db = state.db.read().await;
    let mut records: Vec<Map<String, Value>> = db
        .get(&resource)
        .map(|table| {
            table
                .iter()
                .filter(|r| filter.as_ref().map_or(true, |f| matches_filter(r, f)))
                .cloned()
                .collect()
        })
        .unwrap_or_default();
    drop(db);

    if let Some(order) = params.order.as_deref().filter(|o| !o.trim().is_empty()) {
        let mut parts = order.split_whitespace();
        let field = parts.next().unwrap_or_default().to_string();
        let descending = match parts.next().map(str::to_ascii_lowercase).as_deref() {
            None | Some("asc") => false,
            Some("desc") => true,
            Some(_) => return Err(ApiFailure::bad_request(format!("Unsupported order: {order}"))),
        };
        records.sort_by(|a, b| {
            let ordering = compare_values(a.get(&field), b.get(&field));
            if descending {
                ordering.reverse()
            } else {
                ordering
            }
        });
    }

    let page_size = params.page_size.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE);
    let page_number = params.page_number.unwrap_or(0);
    let total = records.len();
    let page: Vec<Value> = records
        .into_iter()
        .skip(page_number.saturating_mul(page_size))
        .take(page_size)
        .map(|r| Value::Object(expand_includes(r, params.include.as_deref())))
        .collect();

    Ok(Json(json!({
        "records": page,
        "totalRecords": total,
        "pageNumber": page_number,
        "pageSize": page_size,
    })))
}
