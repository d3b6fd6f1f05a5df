//! HTTP transport behind the session.
//!
//! A transport moves bytes and nothing else: it never retries and never turns a
//! status code into an error. Classification happens in [`crate::client`].

use http::{Method, StatusCode};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        HttpRequest {
            method: Method::GET,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post(url: impl Into<String>, body: Vec<u8>) -> Self {
        HttpRequest {
            method: Method::POST,
            url: url.into(),
            headers: Vec::new(),
            body: Some(body),
        }
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    /// First value of a header, compared case-insensitively.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport error: {0}")]
    Network(String),
    #[error("unsupported request: {0}")]
    Unsupported(String),
}

pub trait Transport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Blocking transport over a `ureq` agent.
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new(timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .build()
            .into();
        UreqTransport { agent }
    }
}

fn with_headers<B>(mut builder: ureq::RequestBuilder<B>, headers: &[(String, String)]) -> ureq::RequestBuilder<B> {
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}

impl Transport for UreqTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let result = if request.method == Method::GET && request.body.is_none() {
            with_headers(self.agent.get(&request.url), &request.headers).call()
        } else if request.method == Method::POST {
            let body = request.body.as_deref().unwrap_or_default();
            with_headers(self.agent.post(&request.url), &request.headers).send(body)
        } else {
            return Err(TransportError::Unsupported(format!(
                "{} {} (body: {})",
                request.method,
                request.url,
                request.body.is_some()
            )));
        };

        let mut response = result.map_err(|e| TransportError::Network(e.to_string()))?;
        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect();
        let body = response
            .body_mut()
            .read_to_vec()
            .map_err(|e| TransportError::Network(e.to_string()))?;

        Ok(HttpResponse { status, headers, body })
    }
}

/// In-memory transport for unit tests: canned responses matched by method and URL
/// substring, every request recorded.
#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    struct Route {
        method: Method,
        url_part: String,
        responses: VecDeque<HttpResponse>,
    }

    #[derive(Default)]
    struct State {
        routes: Vec<Route>,
        sent: Vec<HttpRequest>,
    }

    #[derive(Clone, Default)]
    pub(crate) struct FakeTransport {
        state: Rc<RefCell<State>>,
    }

    impl FakeTransport {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        /// Queue a response. The last queued response of a route is repeated.
        pub(crate) fn on(self, method: Method, url_part: &str, status: u16, body: &str) -> Self {
            self.respond(method, url_part, status, Vec::new(), body)
        }

        pub(crate) fn respond(
            self,
            method: Method,
            url_part: &str,
            status: u16,
            headers: Vec<(String, String)>,
            body: &str,
        ) -> Self {
            let response = HttpResponse {
                status: StatusCode::from_u16(status).expect("valid status"),
                headers,
                body: body.as_bytes().to_vec(),
            };
            {
                let mut state = self.state.borrow_mut();
                match state
                    .routes
                    .iter_mut()
                    .find(|r| r.method == method && r.url_part == url_part)
                {
                    Some(route) => route.responses.push_back(response),
                    None => state.routes.push(Route {
                        method,
                        url_part: url_part.to_string(),
                        responses: VecDeque::from([response]),
                    }),
                }
            }
            self
        }

        pub(crate) fn sent(&self) -> Vec<HttpRequest> {
            self.state.borrow().sent.clone()
        }

        pub(crate) fn calls_to(&self, url_part: &str) -> usize {
            self.state
                .borrow()
                .sent
                .iter()
                .filter(|r| r.url.contains(url_part))
                .count()
        }
    }

    impl Transport for FakeTransport {
        fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
            let mut state = self.state.borrow_mut();
            state.sent.push(request.clone());
            let route = state
                .routes
                .iter_mut()
                .find(|r| r.method == request.method && request.url.contains(&r.url_part))
                .ok_or_else(|| TransportError::Network(format!("no route for {}", request.url)))?;
            let response = if route.responses.len() > 1 {
                route.responses.pop_front()
            } else {
                route.responses.front().cloned()
            };
            response.ok_or_else(|| TransportError::Network(format!("no response for {}", request.url)))
        }
    }
}
