//! In-memory transport for unit tests.

use parking_lot::Mutex;

use crate::error::XiboError;
use crate::http::{HttpRequest, HttpResponse};
use crate::token::TOKEN_PATH;
use crate::transport::Transport;

type Responder = dyn Fn(&HttpRequest) -> Result<HttpResponse, XiboError> + Send + Sync;

/// Answers every request through a closure and records what it saw.
pub struct ScriptedTransport {
    responder: Box<Responder>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new(
        responder: impl Fn(&HttpRequest) -> Result<HttpResponse, XiboError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Issues `tok-1`, `tok-2`, ... from the token endpoint and delegates
    /// every other request to `api`.
    pub fn with_tokens(
        api: impl Fn(&HttpRequest) -> Result<HttpResponse, XiboError> + Send + Sync + 'static,
    ) -> Self {
        let issued = Mutex::new(0usize);
        Self::new(move |req| {
            if req.url.ends_with(TOKEN_PATH) {
                let mut n = issued.lock();
                *n += 1;
                return Ok(token_response(&format!("tok-{n}")));
            }
            api(req)
        })
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    pub fn count(&self, predicate: impl Fn(&HttpRequest) -> bool) -> usize {
        self.requests.lock().iter().filter(|r| predicate(r)).count()
    }

    pub fn token_calls(&self) -> usize {
        self.count(|r| r.url.ends_with(TOKEN_PATH))
    }

    pub fn api_calls(&self) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .iter()
            .filter(|r| !r.url.ends_with(TOKEN_PATH))
            .cloned()
            .collect()
    }
}

impl Transport for ScriptedTransport {
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, XiboError> {
        let result = (self.responder)(&request);
        self.requests.lock().push(request);
        result
    }
}

pub fn token_response(token: &str) -> HttpResponse {
    HttpResponse::new(
        200,
        format!(r#"{{"access_token":"{token}","token_type":"Bearer","expires_in":3600}}"#),
    )
}

pub fn json_response(status: u16, body: serde_json::Value) -> HttpResponse {
    HttpResponse::new(status, body.to_string())
}

/// Value of a query parameter in an absolute URL.
pub fn query_param(url: &str, name: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    parsed
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}
