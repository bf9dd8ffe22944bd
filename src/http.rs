//! HTTP client wrapper for Overleaf web requests.

use reqwest::header::{HeaderMap, HeaderValue, COOKIE};
use reqwest::multipart::Form;
use reqwest::{Client, RequestBuilder, Url};
use serde_json::Value;

use crate::api::error::status_error;
use crate::config::ClientConfig;
use crate::error::{OverleafError, Result};

/// Body and final URL (after redirects) of a successful response.
#[derive(Debug)]
pub struct HttpResponse {
    pub url: Url,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Body decoded as UTF-8 (lossy).
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Body parsed as JSON.
    pub fn json(&self) -> Result<Value> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// HTTP client carrying the session cookies on every request.
#[derive(Debug)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Create a new HTTP client.
    ///
    /// # Arguments
    /// * `config` - Timeout, proxy and TLS settings
    /// * `cookie_header` - Value of the `Cookie` header (may be empty)
    pub fn new(config: &ClientConfig, cookie_header: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if !cookie_header.is_empty() {
            let value = HeaderValue::from_str(cookie_header)
                .map_err(|e| OverleafError::Custom(format!("Invalid cookie header: {}", e)))?;
            headers.insert(COOKIE, value);
        }

        let mut builder = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .danger_accept_invalid_certs(!config.ssl_verify);

        if let Some(proxy) = &config.proxy {
            let proxy = reqwest::Proxy::all(proxy.as_str())
                .map_err(|e| OverleafError::Custom(format!("Invalid proxy: {}", e)))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| OverleafError::Custom(format!("Failed to build client: {}", e)))?;

        Ok(Self { client })
    }

    /// Make a GET request.
    pub async fn get(&self, url: &str) -> Result<HttpResponse> {
        tracing::debug!(url, "http get");
        Self::finish(self.client.get(url)).await
    }

    /// Make a POST request with a JSON body.
    pub async fn post_json(&self, url: &str, headers: HeaderMap, body: &Value) -> Result<HttpResponse> {
        tracing::debug!(url, "http post json");
        Self::finish(self.client.post(url).headers(headers).json(body)).await
    }

    /// Make a multipart POST request (file uploads).
    pub async fn post_multipart(&self, url: &str, headers: HeaderMap, form: Form) -> Result<HttpResponse> {
        tracing::debug!(url, "http post multipart");
        Self::finish(self.client.post(url).headers(headers).multipart(form)).await
    }

    /// Make a DELETE request with an empty JSON body.
    pub async fn delete(&self, url: &str, headers: HeaderMap) -> Result<HttpResponse> {
        tracing::debug!(url, "http delete");
        Self::finish(
            self.client
                .delete(url)
                .headers(headers)
                .json(&Value::Object(Default::default())),
        )
        .await
    }

    async fn finish(request: RequestBuilder) -> Result<HttpResponse> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                OverleafError::Timeout
            } else {
                OverleafError::RequestError(e)
            }
        })?;

        let status = response.status();
        let url = response.url().clone();
        let body = response.bytes().await?.to_vec();
        tracing::debug!(status = status.as_u16(), bytes = body.len(), "http response");

        if !status.is_success() {
            return Err(status_error(status.as_u16(), &body));
        }

        // Expired sessions are redirected to the login page with a 200.
        if url.path().starts_with("/login") {
            return Err(OverleafError::Unauthorized(
                "redirected to the login page; session cookies are missing or expired".to_string(),
            ));
        }

        Ok(HttpResponse { url, body })
    }
}
