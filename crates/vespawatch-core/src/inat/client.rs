//! Remote naturalist-platform API client.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

use crate::error::{Error, Result};

use super::payload::{ObservationPayload, RemoteObservation};

/// Credentials for authenticated remote calls.
#[derive(Clone, PartialEq, Eq)]
pub struct RemoteCredentials {
    pub access_token: String,
}

impl RemoteCredentials {
    pub fn new(access_token: impl Into<String>) -> Result<Self> {
        let access_token = access_token.into().trim().to_string();
        if access_token.is_empty() {
            return Err(Error::InvalidInput(
                "Access token must not be empty".to_string(),
            ));
        }
        Ok(Self { access_token })
    }
}

impl std::fmt::Debug for RemoteCredentials {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("RemoteCredentials")
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

/// Read/create/update/delete calls against the remote observation platform.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Fetch one remote observation by id
    async fn fetch(&self, observation_id: i64) -> Result<RemoteObservation>;

    /// Fetch all observations belonging to a remote project
    async fn fetch_project_observations(&self, project_id: i64)
        -> Result<Vec<RemoteObservation>>;

    /// Create a remote observation, returning its remote id
    async fn create(
        &self,
        payload: &ObservationPayload,
        credentials: &RemoteCredentials,
    ) -> Result<i64>;

    /// Update an existing remote observation
    async fn update(
        &self,
        remote_id: i64,
        payload: &ObservationPayload,
        credentials: &RemoteCredentials,
    ) -> Result<()>;

    /// Attach a photo to a remote observation
    async fn attach_photo(
        &self,
        remote_id: i64,
        filename: &str,
        bytes: Vec<u8>,
        credentials: &RemoteCredentials,
    ) -> Result<()>;

    /// Delete a remote observation
    async fn delete(&self, remote_id: i64, credentials: &RemoteCredentials) -> Result<()>;
}

/// Fetches photo bytes by URL.
#[async_trait]
pub trait PhotoFetcher: Send + Sync {
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>>;
}

/// reqwest-backed implementation of [`RemoteClient`] and [`PhotoFetcher`].
#[derive(Clone)]
pub struct InatApiClient {
    base_url: String,
    client: reqwest::Client,
}

impl InatApiClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url = normalize_base_url(base_url.into())?;
        Ok(Self {
            base_url,
            client: reqwest::Client::builder().build()?,
        })
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(Error::Remote(parse_api_error(status, &body)))
    }
}

#[derive(Debug, Deserialize)]
struct CreatedObservation {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

fn normalize_base_url(raw: String) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidInput(
            "API base URL must not be empty".to_string(),
        ));
    }
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        Ok(trimmed.trim_end_matches('/').to_string())
    } else {
        Err(Error::InvalidInput(
            "API base URL must include http:// or https://".to_string(),
        ))
    }
}

#[async_trait]
impl RemoteClient for InatApiClient {
    async fn fetch(&self, observation_id: i64) -> Result<RemoteObservation> {
        let response = self
            .client
            .get(format!("{}/observations/{observation_id}.json", self.base_url))
            .header("Accept", "application/json")
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn fetch_project_observations(
        &self,
        project_id: i64,
    ) -> Result<Vec<RemoteObservation>> {
        let response = self
            .client
            .get(format!(
                "{}/observations/project/{project_id}.json",
                self.base_url
            ))
            .header("Accept", "application/json")
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn create(
        &self,
        payload: &ObservationPayload,
        credentials: &RemoteCredentials,
    ) -> Result<i64> {
        let response = self
            .client
            .post(format!("{}/observations.json", self.base_url))
            .bearer_auth(&credentials.access_token)
            .json(&serde_json::json!({ "observation": payload }))
            .send()
            .await?;
        let created: Vec<CreatedObservation> = Self::check(response).await?.json().await?;
        created
            .first()
            .map(|observation| observation.id)
            .ok_or_else(|| Error::Remote("Create response contained no observation".to_string()))
    }

    async fn update(
        &self,
        remote_id: i64,
        payload: &ObservationPayload,
        credentials: &RemoteCredentials,
    ) -> Result<()> {
        let response = self
            .client
            .put(format!("{}/observations/{remote_id}.json", self.base_url))
            .bearer_auth(&credentials.access_token)
            // Photos are pushed separately, exactly once per picture
            .json(&serde_json::json!({ "observation": payload, "ignore_photos": 1 }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn attach_photo(
        &self,
        remote_id: i64,
        filename: &str,
        bytes: Vec<u8>,
        credentials: &RemoteCredentials,
    ) -> Result<()> {
        let part = reqwest::multipart::Part::bytes(bytes).file_name(filename.to_string());
        let form = reqwest::multipart::Form::new()
            .text(
                "observation_photo[observation_id]",
                remote_id.to_string(),
            )
            .part("file", part);

        let response = self
            .client
            .post(format!("{}/observation_photos.json", self.base_url))
            .bearer_auth(&credentials.access_token)
            .multipart(form)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn delete(&self, remote_id: i64, credentials: &RemoteCredentials) -> Result<()> {
        let response = self
            .client
            .delete(format!("{}/observations/{remote_id}.json", self.base_url))
            .bearer_auth(&credentials.access_token)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}

#[async_trait]
impl PhotoFetcher for InatApiClient {
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send().await?;
        Ok(Self::check(response).await?.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_base_url_rejects_invalid_values() {
        assert!(InatApiClient::new("").is_err());
        assert!(InatApiClient::new("www.inaturalist.org").is_err());
        assert!(InatApiClient::new("https://www.inaturalist.org/").is_ok());
    }

    #[test]
    fn test_credentials_debug_redacts_token() {
        let credentials = RemoteCredentials::new("secret-token").unwrap();
        let debug = format!("{credentials:?}");
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_credentials_reject_empty_token() {
        assert!(RemoteCredentials::new("  ").is_err());
    }

    #[test]
    fn test_parse_api_error_prefers_structured_message() {
        let message = parse_api_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"error": "taxon is invalid"}"#,
        );
        assert_eq!(message, "taxon is invalid (422)");

        let fallback = parse_api_error(StatusCode::BAD_GATEWAY, "");
        assert_eq!(fallback, "HTTP 502");
    }
}
