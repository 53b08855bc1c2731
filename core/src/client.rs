//! Authenticated request dispatch against one CMS credential.
//!
//! # Design
//! `XiboClient` pairs a [`Credential`] with a [`Transport`] and a shared
//! [`TokenCache`]. Every call is built as plain data by
//! [`build_api_request`], executed by the transport, and interpreted by
//! [`parse_api_response`]. Responses are returned as opaque JSON because
//! their shape belongs to the CMS endpoint that produced them.
//!
//! Calls are sequential: nothing here retries, batches or runs in parallel.

use std::sync::Arc;

use serde_json::{Map, Value};
use url::Url;

use crate::config::ClientConfig;
use crate::credential::{Credential, Fingerprint};
use crate::error::{Result, XiboError};
use crate::http::{
    HttpMethod, HttpRequest, HttpResponse, ACCEPT, APPLICATION_JSON, AUTHORIZATION, CONTENT_TYPE,
};
use crate::multipart::{MultipartForm, OCTET_STREAM};
use crate::token::{fetch_token, TokenCache};
use crate::transport::{Transport, UreqTransport};
use crate::types::MediaUpload;

pub const ABOUT_PATH: &str = "/api/about";
pub const LIBRARY_PATH: &str = "/api/library";

/// Client for one CMS application credential.
#[derive(Debug)]
pub struct XiboClient<T = UreqTransport> {
    credential: Credential,
    fingerprint: Fingerprint,
    config: ClientConfig,
    transport: T,
    tokens: Arc<TokenCache>,
}

impl XiboClient<UreqTransport> {
    /// Client with its own token cache and a ureq transport.
    pub fn new(credential: Credential, config: ClientConfig) -> Result<Self> {
        Self::with_cache(credential, config, Arc::new(TokenCache::new()))
    }

    /// Client that shares `tokens` with other clients in the process.
    pub fn with_cache(
        credential: Credential,
        config: ClientConfig,
        tokens: Arc<TokenCache>,
    ) -> Result<Self> {
        let transport = UreqTransport::new(config.timeout);
        Self::with_transport(credential, config, transport, tokens)
    }
}

impl<T: Transport> XiboClient<T> {
    pub fn with_transport(
        credential: Credential,
        config: ClientConfig,
        transport: T,
        tokens: Arc<TokenCache>,
    ) -> Result<Self> {
        config.validate()?;
        validate_base_url(credential.base_url())?;
        Ok(Self {
            fingerprint: credential.fingerprint(),
            credential,
            config,
            transport,
            tokens,
        })
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn token_cache(&self) -> &Arc<TokenCache> {
        &self.tokens
    }

    /// Bearer token for this credential, fetched on a cache miss or expiry.
    pub fn access_token(&self) -> Result<String> {
        if let Some(token) = self.tokens.get(&self.fingerprint) {
            tracing::debug!(credential = %self.fingerprint, "using cached access token");
            return Ok(token);
        }

        tracing::info!(
            credential = %self.fingerprint,
            base_url = %self.credential.base_url(),
            "requesting access token"
        );
        let token = fetch_token(&self.transport, &self.credential)?;
        self.tokens
            .store(self.fingerprint.clone(), &token, self.config.token_ttl)?;
        Ok(token)
    }

    /// Forget the cached token so the next call performs a fresh exchange.
    pub fn invalidate_token(&self) -> bool {
        self.tokens.invalidate(&self.fingerprint)
    }

    /// One authenticated call. Empty `body`/`query` maps are left off the wire.
    pub fn request(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&Map<String, Value>>,
        query: Option<&Map<String, Value>>,
    ) -> Result<Value> {
        let token = self.access_token()?;
        self.request_with_token(&token, method, path, body, query)
    }

    pub fn request_with_token(
        &self,
        access_token: &str,
        method: HttpMethod,
        path: &str,
        body: Option<&Map<String, Value>>,
        query: Option<&Map<String, Value>>,
    ) -> Result<Value> {
        let request = build_api_request(
            self.credential.base_url(),
            access_token,
            method,
            path,
            body,
            query,
        )?;
        self.send(request)
    }

    /// Walk `endpoint` page by page using `start`/`length`.
    ///
    /// With `limit` the result holds exactly `limit` items (or fewer if the
    /// collection is smaller); without it the walk ends at the first short
    /// page.
    pub fn request_all_items(
        &self,
        endpoint: &str,
        query: &Map<String, Value>,
        limit: Option<usize>,
    ) -> Result<Vec<Value>> {
        if limit == Some(0) {
            return Ok(Vec::new());
        }
        let token = self.access_token()?;
        self.request_all_items_with_token(&token, endpoint, query, limit)
    }

    pub fn request_all_items_with_token(
        &self,
        access_token: &str,
        endpoint: &str,
        query: &Map<String, Value>,
        limit: Option<usize>,
    ) -> Result<Vec<Value>> {
        let page_size = self.config.page_size;
        let mut items = Vec::new();
        if limit == Some(0) {
            return Ok(items);
        }

        let mut start = 0usize;
        loop {
            let mut page_query = query.clone();
            page_query.insert("start".to_string(), Value::from(start));
            page_query.insert("length".to_string(), Value::from(page_size));

            let page = match self.request_with_token(
                access_token,
                HttpMethod::Get,
                endpoint,
                None,
                Some(&page_query),
            )? {
                Value::Array(values) => values,
                _ => {
                    tracing::debug!(endpoint, start, "non-array page treated as empty");
                    Vec::new()
                }
            };

            let received = page.len();
            items.extend(page);

            if let Some(limit) = limit {
                if items.len() >= limit {
                    items.truncate(limit);
                    break;
                }
            }
            // Short page ends the data; a long one means the endpoint ignores paging.
            if received != page_size {
                break;
            }
            start += page_size;
        }

        tracing::debug!(endpoint, count = items.len(), "pagination complete");
        Ok(items)
    }

    /// Upload a file to the media library as `multipart/form-data`.
    pub fn upload_media(&self, upload: &MediaUpload) -> Result<Value> {
        let token = self.access_token()?;
        self.upload_media_with_token(&token, upload)
    }

    pub fn upload_media_with_token(&self, access_token: &str, upload: &MediaUpload) -> Result<Value> {
        let mut form = MultipartForm::new().file(
            "files",
            &upload.file_name,
            upload.mime_type.as_deref().unwrap_or(OCTET_STREAM),
            upload.data.clone(),
        );
        if let Some(tags) = &upload.tags {
            form = form.text("tags", tags.as_str());
        }
        if let Some(folder_id) = &upload.folder_id {
            form = form.text("folderId", folder_id.as_str());
        }

        let request = HttpRequest::new(
            HttpMethod::Post,
            format!("{}{LIBRARY_PATH}", self.credential.base_url()),
        )
        .with_header(AUTHORIZATION, format!("Bearer {access_token}"))
        .with_header(ACCEPT, APPLICATION_JSON)
        .with_header(CONTENT_TYPE, form.content_type())
        .with_body(form.into_body());

        self.send(request)
    }

    /// Check the credential: obtain a token and read `/api/about`.
    pub fn test_credential(&self) -> Result<Value> {
        self.request(HttpMethod::Get, ABOUT_PATH, None, None)
    }

    fn send(&self, request: HttpRequest) -> Result<Value> {
        tracing::debug!(method = %request.method, url = %request.url, "dispatching CMS request");
        let response = self.transport.execute(request)?;
        parse_api_response(response)
    }
}

/// Build an authenticated JSON request for `base_url + path`.
pub fn build_api_request(
    base_url: &str,
    access_token: &str,
    method: HttpMethod,
    path: &str,
    body: Option<&Map<String, Value>>,
    query: Option<&Map<String, Value>>,
) -> Result<HttpRequest> {
    if !path.starts_with('/') {
        return Err(XiboError::InvalidUrl(format!(
            "path must start with '/': {path}"
        )));
    }

    let mut url = format!("{base_url}{path}");
    let pairs = query.map(query_pairs).unwrap_or_default();
    if !pairs.is_empty() {
        let mut parsed = Url::parse(&url).map_err(|e| XiboError::InvalidUrl(format!("{url}: {e}")))?;
        parsed.query_pairs_mut().extend_pairs(pairs);
        url = parsed.into();
    }

    let mut request = HttpRequest::new(method, url)
        .with_header(AUTHORIZATION, format!("Bearer {access_token}"))
        .with_header(CONTENT_TYPE, APPLICATION_JSON)
        .with_header(ACCEPT, APPLICATION_JSON);

    if let Some(body) = body.filter(|b| !b.is_empty()) {
        let encoded =
            serde_json::to_vec(body).map_err(|e| XiboError::Serialization(e.to_string()))?;
        request = request.with_body(encoded);
    }

    Ok(request)
}

/// Map a CMS response to its JSON body or an `Http` error.
///
/// An empty 2xx body is `null`; a 2xx body that is not JSON is returned as a
/// string.
pub fn parse_api_response(response: HttpResponse) -> Result<Value> {
    if !response.is_success() {
        return Err(XiboError::Http {
            status: response.status,
            body: response.body,
        });
    }
    if response.body.trim().is_empty() {
        return Ok(Value::Null);
    }
    match serde_json::from_str(&response.body) {
        Ok(value) => Ok(value),
        Err(_) => Ok(Value::String(response.body)),
    }
}

fn validate_base_url(base_url: &str) -> Result<()> {
    let parsed = Url::parse(base_url).map_err(|e| XiboError::InvalidUrl(format!("{base_url}: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(XiboError::InvalidUrl(format!(
            "{base_url}: unsupported scheme {other}"
        ))),
    }
}

/// Flatten a JSON query object into `key=value` pairs.
///
/// `null` is skipped, arrays repeat the key, objects are sent as JSON text.
fn query_pairs(query: &Map<String, Value>) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for (key, value) in query {
        push_query_value(&mut pairs, key, value);
    }
    pairs
}

fn push_query_value(pairs: &mut Vec<(String, String)>, key: &str, value: &Value) {
    match value {
        Value::Null => {}
        Value::String(s) => pairs.push((key.to_string(), s.clone())),
        Value::Bool(_) | Value::Number(_) | Value::Object(_) => {
            pairs.push((key.to_string(), value.to_string()))
        }
        Value::Array(values) => {
            for v in values {
                push_query_value(pairs, key, v);
            }
        }
    }
}
