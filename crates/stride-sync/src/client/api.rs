//! JSON API client for the device-sync service
//!
//! Requests carry an optional bearer token. Obtaining that token is handled
//! outside this crate.

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::error::{Result, StrideError};

/// User agent for API requests
const API_USER_AGENT: &str = concat!("stride-sync/", env!("CARGO_PKG_VERSION"));

/// Default API host
pub const DEFAULT_BASE_URL: &str = "https://connectapi.garmin.com";

/// Authenticated JSON client
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    /// Create a client for the given base URL
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(StrideError::Http)?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build the full URL for a given path
    fn build_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn build_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(API_USER_AGENT));
        if let Some(token) = &self.token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| StrideError::config("API token contains invalid characters"))?;
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }

    /// Make a GET request and return the response
    pub async fn get(&self, path: &str) -> Result<Response> {
        let url = self.build_url(path);
        let response = self
            .client
            .get(&url)
            .headers(self.build_headers()?)
            .send()
            .await
            .map_err(StrideError::Http)?;

        self.handle_response_status(response).await
    }

    /// Make a GET request and deserialize the JSON response
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.get(path).await?;
        response.json().await.map_err(|e| {
            StrideError::invalid_response(format!("Failed to parse JSON response: {}", e))
        })
    }

    /// Handle response status codes and convert to errors
    async fn handle_response_status(&self, response: Response) -> Result<Response> {
        let status = response.status();

        match status {
            StatusCode::OK | StatusCode::CREATED | StatusCode::ACCEPTED | StatusCode::NO_CONTENT => {
                Ok(response)
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(StrideError::NotAuthenticated),
            StatusCode::TOO_MANY_REQUESTS => Err(StrideError::RateLimited),
            StatusCode::NOT_FOUND => Err(StrideError::invalid_response("Resource not found")),
            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(StrideError::invalid_response(format!(
                    "API error {}: {}",
                    status, body
                )))
            }
        }
    }
}
