//! Pooled HTTP transport shared by every authorization flow.
//!
//! Provides:
//! - Connection pooling via reqwest, idle pool sized by the configured pool size
//! - A semaphore bounding in-flight provider calls to the same size
//! - Request and connect timeouts on every call
//! - Fully buffered response bodies

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderValue};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, RequestBuilder};
use tokio::sync::Semaphore;
use url::Url;

use super::middleware::TraceRequests;
use crate::config::{Config, defaults};
use crate::error::{ConfigError, NetworkError};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// A buffered provider response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,

    /// Response body as text.
    pub body: String,
}

impl HttpResponse {
    /// True for HTTP 200, the only status the provider contract treats as success.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.status == 200
    }

    /// Deserialize the body as JSON.
    pub fn json<T>(&self) -> Result<T, serde_json::Error>
    where
        T: serde::de::DeserializeOwned,
    {
        serde_json::from_str(&self.body)
    }
}

/// HTTP client for provider calls.
#[derive(Clone)]
pub struct HttpClient {
    /// HTTP client with middleware.
    client: ClientWithMiddleware,

    /// In-flight call bound.
    permits: Arc<Semaphore>,

    /// Pool size the client was built with.
    pool_size: usize,

    /// Request timeout, reported back in timeout errors.
    request_timeout: Duration,
}

impl HttpClient {
    /// Create a new client from the configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the pool size is zero or the reqwest client cannot be built.
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        if config.pool_size == 0 {
            return Err(ConfigError::ZeroPoolSize);
        }

        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(config.pool_size)
            .pool_idle_timeout(defaults::KEEPALIVE_EXPIRY)
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let client = ClientBuilder::new(client).with(TraceRequests).build();

        Ok(Self {
            client,
            permits: Arc::new(Semaphore::new(config.pool_size)),
            pool_size: config.pool_size,
            request_timeout: config.request_timeout,
        })
    }

    /// Number of connections the client may hold and use concurrently.
    #[must_use]
    pub const fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// POST a form-encoded body.
    ///
    /// # Errors
    ///
    /// Returns error on transport failure or timeout. Non-2xx statuses are not errors.
    pub async fn post_form(
        &self,
        url: &Url,
        form: &[(&str, &str)],
        authorization: Option<&str>,
    ) -> Result<HttpResponse, NetworkError> {
        let body = serde_urlencoded::to_string(form)
            .map_err(|e| NetworkError::Transport(format!("cannot encode form body: {e}")))?;

        let request = self
            .client
            .post(url.clone())
            .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
            .header(ACCEPT, "application/json")
            .body(body);

        self.send(with_authorization(request, authorization)?).await
    }

    /// GET a resource.
    ///
    /// # Errors
    ///
    /// Returns error on transport failure or timeout. Non-2xx statuses are not errors.
    pub async fn get(
        &self,
        url: &Url,
        authorization: Option<&str>,
    ) -> Result<HttpResponse, NetworkError> {
        let request = self.client.get(url.clone()).header(ACCEPT, "application/json");
        self.send(with_authorization(request, authorization)?).await
    }

    /// GET a protected resource with `Authorization: Bearer <access_token>`.
    ///
    /// # Errors
    ///
    /// Returns error on transport failure or timeout.
    pub async fn get_bearer(&self, url: &Url, access_token: &str) -> Result<HttpResponse, NetworkError> {
        self.get(url, Some(&format!("Bearer {access_token}"))).await
    }

    /// Send a request and buffer the response body.
    async fn send(&self, request: RequestBuilder) -> Result<HttpResponse, NetworkError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| NetworkError::Transport("connection pool closed".to_string()))?;

        let response = request
            .send()
            .await
            .map_err(|e| NetworkError::from_middleware(&e, self.request_timeout))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| NetworkError::from_reqwest(&e, self.request_timeout))?;

        Ok(HttpResponse { status, body })
    }
}

fn with_authorization(
    request: RequestBuilder,
    authorization: Option<&str>,
) -> Result<RequestBuilder, NetworkError> {
    match authorization {
        Some(value) => {
            let mut value = HeaderValue::from_str(value)
                .map_err(|_| NetworkError::Transport("invalid authorization header".to_string()))?;
            value.set_sensitive(true);
            Ok(request.header(AUTHORIZATION, value))
        }
        None => Ok(request),
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("pool_size", &self.pool_size)
            .field("available_permits", &self.permits.available_permits())
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}
