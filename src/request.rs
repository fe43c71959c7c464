//! Request-backed producer.
//!
//! [`from_request`] wraps exactly one request in a [`Deferred`]. The request
//! itself is carried out by a [`Transport`], which may complete on any thread.
//! Completions are handed back to the scheduler as jobs, so the handle still
//! settles on the loop thread.

use std::fmt;

use futures::executor::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, warn};

use crate::{Deferred, Error, SchedulerHandle};

/// HTTP method of a [`Request`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Method {
    #[default]
    Get,
    Head,
    Post,
    Put,
    Delete,
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Head => reqwest::Method::HEAD,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Describes a single request: a method and a URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub url: String,
}

impl Request {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
        }
    }

    /// A `GET` request for `url`.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }
}

/// What a transport received: a status line and the body as text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub status_text: String,
    pub body: String,
}

impl Response {
    /// Builds a response, deriving the status text from the status code.
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        let status_text = reqwest::StatusCode::from_u16(status)
            .ok()
            .and_then(|status| status.canonical_reason())
            .unwrap_or_default()
            .to_string();
        Self {
            status,
            status_text,
            body: body.into(),
        }
    }

    /// Returns `true` for statuses in `200..=299`.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Called exactly once with the result of a request.
pub type Completion = Box<dyn FnOnce(Result<Response, Error>) + Send>;

/// Carries out requests on behalf of [`from_request`].
///
/// Implementations must call `completion` exactly once, from any thread. A
/// request that could not be completed at all (no connection, broken body)
/// is reported as [`Error::Transport`]. Any response, successful or not, is
/// reported as `Ok`.
pub trait Transport: Send + Sync {
    fn send(&self, request: Request, completion: Completion);
}

/// A [`Transport`] backed by a blocking `reqwest` client.
///
/// Requests run on a small thread pool so the scheduler thread never blocks
/// on I/O. Create it outside of any async runtime, the blocking client
/// manages its own.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
    pool: ThreadPool,
}

impl HttpTransport {
    /// Creates a transport with four worker threads.
    pub fn new() -> Result<Self, Error> {
        Self::with_pool_size(4)
    }

    /// Creates a transport with `size` worker threads.
    pub fn with_pool_size(size: usize) -> Result<Self, Error> {
        let pool = ThreadPoolBuilder::new()
            .pool_size(size.max(1))
            .name_prefix("settle-http-")
            .create()
            .map_err(|e| Error::Transport(format!("thread pool creation failed: {e}")))?;
        let client = reqwest::blocking::Client::builder()
            .build()
            .map_err(|e| Error::Transport(e.to_string()))?;
        Ok(Self { client, pool })
    }
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport").finish_non_exhaustive()
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: Request, completion: Completion) {
        let client = self.client.clone();
        self.pool.spawn_ok(async move {
            debug!(method = ?request.method, url = %request.url, "sending request");
            let result = client
                .request(request.method.into(), request.url.as_str())
                .send()
                .and_then(|response| {
                    let status = response.status();
                    let body = response.text()?;
                    Ok(Response {
                        status: status.as_u16(),
                        status_text: status.canonical_reason().unwrap_or_default().to_string(),
                        body,
                    })
                })
                .map_err(|e| {
                    warn!(url = %request.url, error = %e, "request failed");
                    Error::Transport(e.to_string())
                });
            completion(result);
        });
    }
}

/// Issues `request` through `transport` and returns a handle for its body.
///
/// - fulfilled with the body if a response arrives with a `2xx` status,
/// - rejected with [`Error::Response`] for any other status,
/// - rejected with the transport's error if no response arrives,
/// - rejected with [`Error::Producer`] right away if the URL does not parse,
///   in which case nothing is sent.
///
/// There are no retries and no timeout: a request that never completes leaves
/// the handle pending and keeps the scheduler waiting.
pub fn from_request(
    handle: &SchedulerHandle,
    transport: &dyn Transport,
    request: Request,
) -> Deferred<String, Error> {
    Deferred::new(handle, |settle| {
        reqwest::Url::parse(&request.url)
            .map_err(|e| Error::Producer(format!("invalid url `{}`: {e}", request.url)))?;

        let work = handle.external_work();
        let handle = handle.clone();
        transport.send(
            request,
            Box::new(move |result| {
                handle.spawn(move || {
                    settle.complete(body_or_reason(result));
                    drop(work);
                });
            }),
        );
        Ok(())
    })
}

fn body_or_reason(result: Result<Response, Error>) -> Result<String, Error> {
    match result {
        Ok(response) if response.is_success() => Ok(response.body),
        Ok(response) => {
            debug!(status = response.status, "request rejected by status");
            Err(Error::Response {
                status: response.status,
                status_text: response.status_text,
            })
        }
        Err(reason) => Err(reason),
    }
}
