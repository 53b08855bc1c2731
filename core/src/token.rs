//! OAuth2 client-credentials exchange and the bearer-token cache.
//!
//! # Design
//! The exchange is split like every other call: [`build_token_request`]
//! produces the form-encoded POST and [`parse_token_response`] turns whatever
//! came back into a token or an `Authentication` error. [`fetch_token`] glues
//! the two around a [`Transport`].
//!
//! [`TokenCache`] holds one entry per credential [`Fingerprint`]. It is owned
//! by whoever builds clients and shared through `Arc`, so clients for
//! different CMS applications in one process never see each other's tokens.
//! The mutex is held only for map reads and writes, never across the
//! exchange itself.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::Value;

use crate::clock::{Clock, SystemClock};
use crate::credential::{Credential, Fingerprint, SecretString};
use crate::error::XiboError;
use crate::http::{
    HttpMethod, HttpRequest, HttpResponse, ACCEPT, APPLICATION_JSON, CONTENT_TYPE,
    FORM_URLENCODED,
};
use crate::transport::Transport;

pub const TOKEN_PATH: &str = "/api/authorize/access_token";

const UNKNOWN_ERROR: &str = "Unknown error";

struct CachedToken {
    token: SecretString,
    expires_at: Instant,
}

/// Bearer tokens keyed by credential fingerprint.
pub struct TokenCache {
    entries: Mutex<HashMap<Fingerprint, CachedToken>>,
    clock: Arc<dyn Clock>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Cached token for `fingerprint`, if one exists and has not expired.
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<String> {
        let now = self.clock.now();
        self.entries
            .lock()
            .get(fingerprint)
            .filter(|entry| now < entry.expires_at)
            .map(|entry| entry.token.expose().to_string())
    }

    /// Store `token` for `ttl`, replacing any previous entry.
    pub fn store(
        &self,
        fingerprint: Fingerprint,
        token: &str,
        ttl: Duration,
    ) -> Result<(), XiboError> {
        let expires_at = self
            .clock
            .now()
            .checked_add(ttl)
            .ok_or_else(|| XiboError::Config(format!("token_ttl {ttl:?} is out of range")))?;
        self.entries.lock().insert(
            fingerprint,
            CachedToken {
                token: SecretString::new(token),
                expires_at,
            },
        );
        Ok(())
    }

    /// Drop the entry for `fingerprint`. Returns whether one existed.
    pub fn invalidate(&self, fingerprint: &Fingerprint) -> bool {
        self.entries.lock().remove(fingerprint).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCache")
            .field("entries", &self.len())
            .finish_non_exhaustive()
    }
}

/// Build the `client_credentials` grant request for `credential`.
pub fn build_token_request(credential: &Credential) -> Result<HttpRequest, XiboError> {
    let form = serde_urlencoded::to_string(&[
        ("grant_type", "client_credentials"),
        ("client_id", credential.client_id()),
        ("client_secret", credential.client_secret().expose()),
    ])
    .map_err(|e| XiboError::Serialization(e.to_string()))?;

    Ok(
        HttpRequest::new(HttpMethod::Post, format!("{}{TOKEN_PATH}", credential.base_url()))
            .with_header(CONTENT_TYPE, FORM_URLENCODED)
            .with_header(ACCEPT, APPLICATION_JSON)
            .with_body(form),
    )
}

/// Extract the access token from the outcome of the token request.
///
/// Failure messages are taken from `error_description`, then `message`, then
/// the transport's own error, then a generic fallback.
pub fn parse_token_response(
    outcome: Result<HttpResponse, XiboError>,
) -> Result<String, XiboError> {
    let response = match outcome {
        Ok(response) => response,
        Err(XiboError::Transport(message)) => {
            return Err(XiboError::Authentication {
                message: failure_message(None, Some(message)),
            })
        }
        Err(other) => {
            return Err(XiboError::Authentication {
                message: failure_message(None, Some(other.to_string())),
            })
        }
    };

    let parsed = parse_token_body(&response.body);

    if response.is_success() {
        let token = parsed
            .as_ref()
            .and_then(|body| body.get("access_token"))
            .and_then(Value::as_str)
            .filter(|token| !token.is_empty());
        if let Some(token) = token {
            return Ok(token.to_string());
        }
        return Err(XiboError::Authentication {
            message: failure_message(parsed.as_ref(), None),
        });
    }

    Err(XiboError::Authentication {
        message: failure_message(
            parsed.as_ref(),
            Some(format!("token endpoint returned HTTP {}", response.status)),
        ),
    })
}

/// One client-credentials exchange over `transport`.
pub fn fetch_token<T: Transport + ?Sized>(
    transport: &T,
    credential: &Credential,
) -> Result<String, XiboError> {
    let request = build_token_request(credential)?;
    parse_token_response(transport.execute(request))
}

/// Parse the token endpoint body. Some proxies hand the JSON back wrapped in
/// a JSON string; that layer is peeled off.
fn parse_token_body(body: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(body).ok()? {
        Value::String(inner) => serde_json::from_str(&inner).ok(),
        other => Some(other),
    }
}

fn failure_message(body: Option<&Value>, transport: Option<String>) -> String {
    let field = |name: &str| {
        body.and_then(|b| b.get(name))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    field("error_description")
        .or_else(|| field("message"))
        .or(transport)
        .unwrap_or_else(|| UNKNOWN_ERROR.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::testing::{json_response, ScriptedTransport};
    use serde_json::json;

    fn credential(url: &str, client_id: &str) -> Credential {
        Credential::new(url, client_id, SecretString::new("s3cret&key=1"))
    }

    fn auth_message(result: Result<String, XiboError>) -> String {
        match result {
            Err(XiboError::Authentication { message }) => message,
            other => panic!("expected Authentication error, got {other:?}"),
        }
    }

    // -- cache ----------------------------------------------------------------

    #[test]
    fn cached_token_served_until_expiry() {
        let clock = Arc::new(ManualClock::new());
        let cache = TokenCache::with_clock(clock.clone());
        let fp = credential("https://cms", "app").fingerprint();

        cache.store(fp.clone(), "tok-a", Duration::from_secs(60)).unwrap();
        assert_eq!(cache.get(&fp).as_deref(), Some("tok-a"));

        clock.advance(Duration::from_secs(59));
        assert_eq!(cache.get(&fp).as_deref(), Some("tok-a"));

        clock.advance(Duration::from_secs(1));
        assert!(cache.get(&fp).is_none(), "token must not be served at expiry");
    }

    #[test]
    fn entries_are_isolated_per_credential() {
        let cache = TokenCache::new();
        let a = credential("https://a.example.com", "app").fingerprint();
        let b = credential("https://b.example.com", "app").fingerprint();

        cache.store(a.clone(), "tok-a", Duration::from_secs(60)).unwrap();
        assert!(cache.get(&b).is_none());

        cache.store(b.clone(), "tok-b", Duration::from_secs(60)).unwrap();
        assert_eq!(cache.get(&a).as_deref(), Some("tok-a"));
        assert_eq!(cache.get(&b).as_deref(), Some("tok-b"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn unrepresentable_expiry_is_a_config_error() {
        let cache = TokenCache::new();
        let fp = credential("https://cms", "app").fingerprint();
        let result = cache.store(fp.clone(), "tok", Duration::MAX);
        assert!(matches!(result, Err(XiboError::Config(_))), "{result:?}");
        assert!(cache.get(&fp).is_none());
    }

    #[test]
    fn store_overwrites_in_place() {
        let cache = TokenCache::new();
        let fp = credential("https://cms", "app").fingerprint();
        cache.store(fp.clone(), "old", Duration::from_secs(60)).unwrap();
        cache.store(fp.clone(), "new", Duration::from_secs(60)).unwrap();
        assert_eq!(cache.get(&fp).as_deref(), Some("new"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn invalidate_removes_entry() {
        let cache = TokenCache::new();
        let fp = credential("https://cms", "app").fingerprint();
        cache.store(fp.clone(), "tok", Duration::from_secs(60)).unwrap();
        assert!(cache.invalidate(&fp));
        assert!(cache.get(&fp).is_none());
        assert!(!cache.invalidate(&fp));
    }

    #[test]
    fn debug_does_not_reveal_tokens() {
        let cache = TokenCache::new();
        let fp = credential("https://cms", "app").fingerprint();
        cache.store(fp, "super-secret-tok", Duration::from_secs(60)).unwrap();
        let dbg = format!("{cache:?}");
        assert!(!dbg.contains("super-secret-tok"), "{dbg}");
    }

    // -- build ----------------------------------------------------------------

    #[test]
    fn build_token_request_is_form_encoded_post() {
        let req = build_token_request(&credential("https://cms.example.com/", "my app")).unwrap();
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.url, "https://cms.example.com/api/authorize/access_token");
        assert_eq!(req.header("content-type"), Some(FORM_URLENCODED));
        assert_eq!(
            req.body_text(),
            Some("grant_type=client_credentials&client_id=my+app&client_secret=s3cret%26key%3D1")
        );
    }

    // -- parse ----------------------------------------------------------------

    #[test]
    fn parses_access_token() {
        let token = parse_token_response(Ok(json_response(
            200,
            json!({"access_token": "tok-1", "token_type": "Bearer", "expires_in": 3600}),
        )))
        .unwrap();
        assert_eq!(token, "tok-1");
    }

    #[test]
    fn parses_body_wrapped_in_json_string() {
        let raw = serde_json::to_string(r#"{"access_token":"tok-raw"}"#).unwrap();
        let token = parse_token_response(Ok(HttpResponse::new(200, raw))).unwrap();
        assert_eq!(token, "tok-raw");
    }

    #[test]
    fn error_description_surfaces_on_rejection() {
        let message = auth_message(parse_token_response(Ok(json_response(
            401,
            json!({"error": "invalid_client", "error_description": "invalid_client"}),
        ))));
        assert!(message.contains("invalid_client"), "{message}");
    }

    #[test]
    fn message_field_used_without_error_description() {
        let message = auth_message(parse_token_response(Ok(json_response(
            400,
            json!({"message": "Client disabled"}),
        ))));
        assert_eq!(message, "Client disabled");
    }

    #[test]
    fn transport_message_used_without_body_fields() {
        let message = auth_message(parse_token_response(Err(XiboError::Transport(
            "connection refused".into(),
        ))));
        assert_eq!(message, "connection refused");

        let message = auth_message(parse_token_response(Ok(HttpResponse::new(
            502,
            "<html>bad gateway</html>",
        ))));
        assert_eq!(message, "token endpoint returned HTTP 502");
    }

    #[test]
    fn missing_access_token_is_unknown_error() {
        let message = auth_message(parse_token_response(Ok(json_response(
            200,
            json!({"token_type": "Bearer"}),
        ))));
        assert_eq!(message, "Unknown error");
    }

    #[test]
    fn empty_access_token_is_rejected() {
        let result = parse_token_response(Ok(json_response(200, json!({"access_token": ""}))));
        assert!(matches!(result, Err(XiboError::Authentication { .. })));
    }

    // -- fetch ----------------------------------------------------------------

    #[test]
    fn fetch_token_performs_single_exchange() {
        let transport = ScriptedTransport::with_tokens(|_| unreachable!("no api calls"));
        let token = fetch_token(&transport, &credential("https://cms", "app")).unwrap();
        assert_eq!(token, "tok-1");
        assert_eq!(transport.token_calls(), 1);
    }
}
