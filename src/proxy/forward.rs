// src/proxy/forward.rs
use super::backend::Backend;
use async_trait::async_trait;
use hyper::client::HttpConnector;
use hyper::header::HOST;
use hyper::{Body, Client, Request, Response, StatusCode, Uri};
use hyper_tls::HttpsConnector;
use url::Url;

/// One attempt's failure. Both variants drive the dispatcher's retry
/// path; neither is fatal on its own.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("upstream returned {0}")]
    UpstreamStatus(StatusCode),

    #[error("transport error: {0}")]
    Transport(#[from] hyper::Error),

    #[error("invalid upstream uri: {0}")]
    InvalidUri(#[from] hyper::http::uri::InvalidUri),
}

/// Forwards one buffered request to one backend. A trait seam so the
/// dispatcher's control loop can be tested with scripted outcomes
/// instead of sockets.
#[async_trait]
pub trait Forwarder: Send + Sync {
    async fn forward(
        &self,
        backend: &Backend,
        req: Request<Body>,
    ) -> Result<Response<Body>, ForwardError>;
}

/// The real forwarder: a shared pooled hyper client. A 5xx from the
/// upstream is reported as an error so the dispatcher retries it; any
/// other status is passed through verbatim.
pub struct HttpForwarder {
    client: Client<HttpsConnector<HttpConnector>, Body>,
}

impl HttpForwarder {
    pub fn new() -> Self {
        let https = HttpsConnector::new();
        Self {
            client: Client::builder().build(https),
        }
    }
}

impl Default for HttpForwarder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Forwarder for HttpForwarder {
    async fn forward(
        &self,
        backend: &Backend,
        mut req: Request<Body>,
    ) -> Result<Response<Body>, ForwardError> {
        *req.uri_mut() = target_uri(&backend.url, req.uri())?;
        // Let hyper derive the Host header from the rewritten URI.
        req.headers_mut().remove(HOST);

        let response = self.client.request(req).await?;
        if response.status().is_server_error() {
            return Err(ForwardError::UpstreamStatus(response.status()));
        }
        Ok(response)
    }
}

/// Join the backend base URL (scheme, authority, optional path prefix)
/// with the inbound path and query.
fn target_uri(backend_url: &Url, inbound: &Uri) -> Result<Uri, ForwardError> {
    let base = backend_url.as_str().trim_end_matches('/');
    let path_and_query = inbound
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    Ok(format!("{base}{path_and_query}").parse::<Uri>()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn join(base: &str, inbound: &str) -> String {
        let url = Url::parse(base).unwrap();
        let uri: Uri = inbound.parse().unwrap();
        target_uri(&url, &uri).unwrap().to_string()
    }

    #[test]
    fn joins_root_path() {
        assert_eq!(join("http://localhost:5001", "/"), "http://localhost:5001/");
    }

    #[test]
    fn preserves_path_and_query() {
        assert_eq!(
            join("http://localhost:5001", "/users?page=2"),
            "http://localhost:5001/users?page=2"
        );
    }

    #[test]
    fn keeps_backend_path_prefix() {
        assert_eq!(
            join("http://localhost:5001/api", "/users"),
            "http://localhost:5001/api/users"
        );
    }
}
