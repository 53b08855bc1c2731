//! In-memory stand-in for the parts of the Xibo CMS v4 API the client uses.
//!
//! Entities live in per-resource collections keyed by a numeric id. Every
//! `/api` route except the token endpoint requires a bearer token issued by
//! this server. Paging follows the CMS: `start`/`length` with a default page
//! of 10.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Multipart, Path, Query, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::net::TcpListener;
use uuid::Uuid;

pub const DEFAULT_PAGE_LENGTH: usize = 10;

type Reply = Result<Response, Response>;

/// A call to an action route, kept for assertions.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedAction {
    pub resource: String,
    pub action: String,
    pub id: u64,
    pub body: Map<String, Value>,
}

#[derive(Default)]
struct Collection {
    next_id: u64,
    items: BTreeMap<u64, Value>,
}

struct Inner {
    client_id: String,
    client_secret: String,
    issued: Mutex<HashSet<String>>,
    collections: Mutex<HashMap<String, Collection>>,
    actions: Mutex<Vec<RecordedAction>>,
    token_requests: AtomicUsize,
    api_requests: AtomicUsize,
}

/// Shared handle to the mock's state; clones see the same data.
#[derive(Clone)]
pub struct MockCms {
    inner: Arc<Inner>,
}

impl MockCms {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                client_id: client_id.into(),
                client_secret: client_secret.into(),
                issued: Mutex::new(HashSet::new()),
                collections: Mutex::new(HashMap::new()),
                actions: Mutex::new(Vec::new()),
                token_requests: AtomicUsize::new(0),
                api_requests: AtomicUsize::new(0),
            }),
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/api/authorize/access_token", post(issue_token))
            .route("/api/about", get(about))
            .route("/api/library", get(list_library).post(upload_media))
            .route("/api/{resource}", get(list_entities).post(create_entity))
            .route(
                "/api/{resource}/{a}",
                get(get_entity).put(update_entity).delete(delete_entity),
            )
            .route(
                "/api/{resource}/{a}/{b}",
                get(read_action).put(run_action).post(run_action),
            )
            .route("/api/{resource}/{a}/{b}/{c}", post(run_nested_action))
            .with_state(self.clone())
    }

    /// Insert `entity` into `resource`, assigning the next id. Returns the id.
    pub fn seed(&self, resource: &str, entity: Value) -> u64 {
        let Some(id_field) = id_field(resource) else {
            panic!("unknown mock resource {resource}");
        };
        let mut fields = match entity {
            Value::Object(map) => map,
            other => panic!("seeded entity must be an object, got {other}"),
        };
        let mut collections = self.inner.collections.lock();
        let collection = collections.entry(resource.to_string()).or_default();
        collection.next_id += 1;
        let id = collection.next_id;
        fields.insert(id_field.to_string(), json!(id));
        collection.items.insert(id, Value::Object(fields));
        id
    }

    pub fn entity(&self, resource: &str, id: u64) -> Option<Value> {
        self.inner
            .collections
            .lock()
            .get(resource)
            .and_then(|c| c.items.get(&id).cloned())
    }

    pub fn count(&self, resource: &str) -> usize {
        self.inner
            .collections
            .lock()
            .get(resource)
            .map_or(0, |c| c.items.len())
    }

    pub fn actions(&self) -> Vec<RecordedAction> {
        self.inner.actions.lock().clone()
    }

    /// Calls made to the token endpoint, successful or not.
    pub fn token_requests(&self) -> usize {
        self.inner.token_requests.load(Ordering::SeqCst)
    }

    /// Authenticated `/api` calls, excluding the token endpoint.
    pub fn api_requests(&self) -> usize {
        self.inner.api_requests.load(Ordering::SeqCst)
    }

    fn authorize(&self, headers: &HeaderMap) -> Result<(), Response> {
        let token = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        match token {
            Some(token) if self.inner.issued.lock().contains(token) => {
                self.inner.api_requests.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            _ => Err(error(StatusCode::UNAUTHORIZED, "access_denied")),
        }
    }

    fn create(&self, resource: &str, fields: Map<String, Value>) -> Result<Value, Response> {
        let id_field = id_field(resource).ok_or_else(not_found)?;
        let mut collections = self.inner.collections.lock();
        let collection = collections.entry(resource.to_string()).or_default();
        collection.next_id += 1;
        let id = collection.next_id;
        let mut entity = fields;
        entity.insert(id_field.to_string(), json!(id));
        let entity = Value::Object(entity);
        collection.items.insert(id, entity.clone());
        Ok(entity)
    }

    fn with_entity<R>(
        &self,
        resource: &str,
        id: &str,
        f: impl FnOnce(&mut Value) -> R,
    ) -> Result<R, Response> {
        let id: u64 = id.parse().map_err(|_| not_found())?;
        let mut collections = self.inner.collections.lock();
        let entity = collections
            .get_mut(resource)
            .and_then(|c| c.items.get_mut(&id))
            .ok_or_else(not_found)?;
        Ok(f(entity))
    }

    fn record(&self, resource: &str, action: &str, id: &str, body: Map<String, Value>) -> Reply {
        self.with_entity(resource, id, |_| ())?;
        let id: u64 = id.parse().map_err(|_| not_found())?;
        tracing::debug!(resource, action, id, "action");
        self.inner.actions.lock().push(RecordedAction {
            resource: resource.to_string(),
            action: action.to_string(),
            id,
            body,
        });
        Ok(StatusCode::NO_CONTENT.into_response())
    }
}

pub async fn run(listener: TcpListener, cms: MockCms) -> Result<(), std::io::Error> {
    axum::serve(listener, cms.router()).await
}

/// Field holding the numeric id of each resource's entities.
pub fn id_field(resource: &str) -> Option<&'static str> {
    Some(match resource {
        "display" => "displayId",
        "layout" => "layoutId",
        "library" => "mediaId",
        "schedule" => "eventId",
        "displaygroup" => "displayGroupId",
        "campaign" => "campaignId",
        "playlist" => "playlistId",
        "dataset" => "dataSetId",
        "command" => "commandId",
        "tag" => "tagId",
        "user" => "userId",
        "notification" => "notificationId",
        "folder" => "folderId",
        _ => return None,
    })
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message, "message": message }))).into_response()
}

fn not_found() -> Response {
    error(StatusCode::NOT_FOUND, "Not Found")
}

fn parse_body(body: &Bytes) -> Result<Map<String, Value>, Response> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }
    match serde_json::from_slice(body) {
        Ok(Value::Object(map)) => Ok(map),
        _ => Err(error(StatusCode::BAD_REQUEST, "body must be a JSON object")),
    }
}

// -- token ----------------------------------------------------------------

#[derive(Deserialize)]
struct TokenForm {
    grant_type: String,
    client_id: String,
    client_secret: String,
}

async fn issue_token(State(cms): State<MockCms>, Form(form): Form<TokenForm>) -> Response {
    cms.inner.token_requests.fetch_add(1, Ordering::SeqCst);
    if form.grant_type != "client_credentials" {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "unsupported_grant_type",
                "error_description": "The authorization grant type is not supported.",
            })),
        )
            .into_response();
    }
    if form.client_id != cms.inner.client_id || form.client_secret != cms.inner.client_secret {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "error": "invalid_client",
                "error_description": "Client authentication failed",
            })),
        )
            .into_response();
    }

    let token = format!("mock-{}", Uuid::new_v4().simple());
    cms.inner.issued.lock().insert(token.clone());
    tracing::debug!(client_id = %form.client_id, "issued token");
    Json(json!({
        "access_token": token,
        "token_type": "Bearer",
        "expires_in": 3600,
    }))
    .into_response()
}

async fn about(State(cms): State<MockCms>, headers: HeaderMap) -> Reply {
    cms.authorize(&headers)?;
    Ok(Json(json!({ "version": "4.0.0", "sourceUrl": null })).into_response())
}

// -- collections ------------------------------------------------------------

async fn list_library(
    State(cms): State<MockCms>,
    headers: HeaderMap,
    Query(query): Query<Vec<(String, String)>>,
) -> Reply {
    list(&cms, &headers, "library", query)
}

async fn list_entities(
    State(cms): State<MockCms>,
    headers: HeaderMap,
    Path(resource): Path<String>,
    Query(query): Query<Vec<(String, String)>>,
) -> Reply {
    list(&cms, &headers, &resource, query)
}

fn list(cms: &MockCms, headers: &HeaderMap, resource: &str, query: Vec<(String, String)>) -> Reply {
    cms.authorize(headers)?;
    if id_field(resource).is_none() {
        return Err(not_found());
    }

    let mut start = 0usize;
    let mut length = DEFAULT_PAGE_LENGTH;
    let mut filters = Vec::new();
    for (key, value) in query {
        match key.as_str() {
            "start" => start = value.parse().map_err(|_| error(StatusCode::BAD_REQUEST, "bad start"))?,
            "length" => length = value.parse().map_err(|_| error(StatusCode::BAD_REQUEST, "bad length"))?,
            _ => filters.push((key, value)),
        }
    }

    let collections = cms.inner.collections.lock();
    let page: Vec<Value> = collections
        .get(resource)
        .map(|c| {
            c.items
                .values()
                .filter(|entity| filters.iter().all(|(k, v)| matches_filter(entity.get(k), v)))
                .skip(start)
                .take(length)
                .cloned()
                .collect()
        })
        .unwrap_or_default();
    Ok(Json(page).into_response())
}

/// Strings match by substring, everything else by its text form.
fn matches_filter(field: Option<&Value>, wanted: &str) -> bool {
    match field {
        Some(Value::String(s)) => s.contains(wanted),
        Some(Value::Bool(b)) => matches!((b, wanted), (true, "1" | "true") | (false, "0" | "false")),
        Some(other) => other.to_string() == wanted,
        None => false,
    }
}

async fn create_entity(
    State(cms): State<MockCms>,
    headers: HeaderMap,
    Path(resource): Path<String>,
    body: Bytes,
) -> Reply {
    cms.authorize(&headers)?;
    let fields = parse_body(&body)?;
    let entity = cms.create(&resource, fields)?;
    Ok((StatusCode::CREATED, Json(entity)).into_response())
}

async fn get_entity(
    State(cms): State<MockCms>,
    headers: HeaderMap,
    Path((resource, id)): Path<(String, String)>,
) -> Reply {
    cms.authorize(&headers)?;
    let entity = cms.with_entity(&resource, &id, |e| e.clone())?;
    Ok(Json(entity).into_response())
}

async fn update_entity(
    State(cms): State<MockCms>,
    headers: HeaderMap,
    Path((resource, id)): Path<(String, String)>,
    body: Bytes,
) -> Reply {
    cms.authorize(&headers)?;
    let fields = parse_body(&body)?;
    let id_key = id_field(&resource).ok_or_else(not_found)?;
    let entity = cms.with_entity(&resource, &id, |entity| {
        if let Value::Object(map) = entity {
            for (k, v) in fields {
                if k != id_key {
                    map.insert(k, v);
                }
            }
        }
        entity.clone()
    })?;
    Ok(Json(entity).into_response())
}

async fn delete_entity(
    State(cms): State<MockCms>,
    headers: HeaderMap,
    Path((resource, id)): Path<(String, String)>,
) -> Reply {
    cms.authorize(&headers)?;
    let id: u64 = id.parse().map_err(|_| not_found())?;
    let removed = cms
        .inner
        .collections
        .lock()
        .get_mut(&resource)
        .and_then(|c| c.items.remove(&id));
    match removed {
        Some(_) => Ok(StatusCode::NO_CONTENT.into_response()),
        None => Err(not_found()),
    }
}

// -- actions ----------------------------------------------------------------

async fn read_action(
    State(cms): State<MockCms>,
    headers: HeaderMap,
    Path((resource, action, id)): Path<(String, String, String)>,
) -> Reply {
    cms.authorize(&headers)?;
    match (resource.as_str(), action.as_str()) {
        ("display", "status") => {
            let status = cms.with_entity(&resource, &id, |display| {
                json!({
                    "displayId": display.get("displayId"),
                    "loggedIn": display.get("loggedIn").cloned().unwrap_or(json!(0)),
                    "mediaInventoryStatus": 1,
                })
            })?;
            Ok(Json(status).into_response())
        }
        ("dataset", "data") => {
            let rows = cms.with_entity(&resource, &id, |dataset| {
                dataset.get("rows").cloned().unwrap_or_else(|| json!([]))
            })?;
            Ok(Json(rows).into_response())
        }
        _ => Err(not_found()),
    }
}

async fn run_action(
    State(cms): State<MockCms>,
    method: Method,
    headers: HeaderMap,
    Path((resource, action, id)): Path<(String, String, String)>,
    body: Bytes,
) -> Reply {
    cms.authorize(&headers)?;
    let body = parse_body(&body)?;
    match (method.as_str(), resource.as_str(), action.as_str()) {
        ("PUT", "display", "authorise") => {
            cms.with_entity(&resource, &id, |display| {
                let authorised = display.get("authorised").and_then(Value::as_bool).unwrap_or(false);
                display["authorised"] = json!(!authorised);
            })?;
            cms.record(&resource, &action, &id, body)
        }
        ("PUT", "display", "requestscreenshot")
        | ("POST", "display", "wol")
        | ("PUT", "layout", "checkout") => cms.record(&resource, &action, &id, body),
        ("PUT", "layout", "publish") => {
            cms.with_entity(&resource, &id, |layout| layout["publishedStatus"] = json!("Published"))?;
            cms.record(&resource, &action, &id, body)
        }
        ("POST", "layout", "copy") => {
            let mut copy = cms.with_entity(&resource, &id, |layout| layout.clone())?;
            if let (Value::Object(fields), Some(name)) = (&mut copy, body.get("name")) {
                fields.insert("layout".to_string(), name.clone());
            }
            let fields = match copy {
                Value::Object(map) => map,
                _ => Map::new(),
            };
            let created = cms.create(&resource, fields)?;
            Ok((StatusCode::CREATED, Json(created)).into_response())
        }
        _ => Err(not_found()),
    }
}

async fn run_nested_action(
    State(cms): State<MockCms>,
    headers: HeaderMap,
    Path((resource, a, b, c)): Path<(String, String, String, String)>,
    body: Bytes,
) -> Reply {
    cms.authorize(&headers)?;
    let body = parse_body(&body)?;
    match (resource.as_str(), a.as_str(), b.as_str(), c.as_str()) {
        ("displaygroup", id, "action", action @ ("changeLayout" | "command")) => {
            cms.record(&resource, action, id, body)
        }
        ("campaign", "layout", "assign", id) => cms.record(&resource, "assignLayout", id, body),
        _ => Err(not_found()),
    }
}

// -- upload -----------------------------------------------------------------

async fn upload_media(
    State(cms): State<MockCms>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Reply {
    cms.authorize(&headers)?;

    let mut file: Option<(String, String, usize)> = None;
    let mut extra = Map::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| error(StatusCode::BAD_REQUEST, &e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "files" {
            let file_name = field.file_name().unwrap_or("upload").to_string();
            let content_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let data = field
                .bytes()
                .await
                .map_err(|e| error(StatusCode::BAD_REQUEST, &e.to_string()))?;
            file = Some((file_name, content_type, data.len()));
        } else {
            let text = field
                .text()
                .await
                .map_err(|e| error(StatusCode::BAD_REQUEST, &e.to_string()))?;
            extra.insert(name, Value::String(text));
        }
    }

    let Some((file_name, content_type, size)) = file else {
        return Err(error(StatusCode::BAD_REQUEST, "no file part named files"));
    };
    let media_type = match content_type.split('/').next() {
        Some("image") => "image",
        Some("video") => "video",
        _ => "genericfile",
    };

    let mut fields = Map::new();
    fields.insert("name".into(), json!(file_name));
    fields.insert("fileName".into(), json!(file_name));
    fields.insert("mediaType".into(), json!(media_type));
    fields.insert("fileSize".into(), json!(size));
    fields.extend(extra);
    let entity = cms.create("library", fields)?;
    Ok(Json(json!({ "files": [entity] })).into_response())
}
