use crate::errors::{classify_storage_error, AppError};
use crate::models::{StorageObject, UploadResponse};
use reqwest::{Client, Method, Response};
use serde_json::json;
use tracing;

/// Client for object storage (`/storage/v1`).
#[derive(Clone)]
pub struct StorageClient {
    client: Client,
    project_url: String,
    api_key: String,
    bearer: String,
}

impl StorageClient {
    pub fn new(client: Client, project_url: &str, api_key: String, bearer: String) -> Self {
        Self {
            client,
            project_url: project_url.trim_end_matches('/').to_string(),
            api_key,
            bearer,
        }
    }

    fn object_url(&self, bucket: &str, path: &str) -> String {
        format!(
            "{}/storage/v1/object/{}/{}",
            self.project_url,
            bucket,
            path.trim_start_matches('/')
        )
    }

    /// Public URL of an object in a public bucket. No request is made.
    pub fn public_url(&self, bucket: &str, path: &str) -> String {
        public_url(&self.project_url, bucket, path)
    }

    /// Objects under `prefix` (one level, like a directory listing).
    pub async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<StorageObject>, AppError> {
        let url = format!("{}/storage/v1/object/list/{}", self.project_url, bucket);
        tracing::info!("Listing {}/{}", bucket, prefix);

        let response = self
            .request(Method::POST, &url)
            .json(&json!({
                "prefix": prefix,
                "limit": 100,
                "offset": 0,
                "sortBy": { "column": "name", "order": "asc" }
            }))
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Storage list failed: {}", e)))?;

        let response = check_response(response).await?;
        response.json().await.map_err(|e| {
            AppError::ExternalApiError(format!("Failed to parse storage listing: {}", e))
        })
    }

    pub async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
        upsert: bool,
    ) -> Result<UploadResponse, AppError> {
        let url = self.object_url(bucket, path);
        tracing::info!("Uploading {} bytes to {}/{}", bytes.len(), bucket, path);

        let response = self
            .request(Method::POST, &url)
            .header("Content-Type", content_type)
            .header("x-upsert", upsert.to_string())
            .body(bytes)
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Storage upload failed: {}", e)))?;

        let response = check_response(response).await?;
        response.json().await.map_err(|e| {
            AppError::ExternalApiError(format!("Failed to parse upload response: {}", e))
        })
    }

    pub async fn download(&self, bucket: &str, path: &str) -> Result<Vec<u8>, AppError> {
        let url = self.object_url(bucket, path);
        tracing::info!("Downloading {}/{}", bucket, path);

        let response = self
            .request(Method::GET, &url)
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Storage download failed: {}", e)))?;

        let response = check_response(response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    /// Removes objects; returns the entries the backend actually deleted.
    pub async fn remove(
        &self,
        bucket: &str,
        paths: &[&str],
    ) -> Result<Vec<StorageObject>, AppError> {
        let url = format!("{}/storage/v1/object/{}", self.project_url, bucket);
        tracing::info!("Removing {} object(s) from {}", paths.len(), bucket);

        let response = self
            .request(Method::DELETE, &url)
            .json(&json!({ "prefixes": paths }))
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Storage remove failed: {}", e)))?;

        let response = check_response(response).await?;
        response.json().await.map_err(|e| {
            AppError::ExternalApiError(format!("Failed to parse remove response: {}", e))
        })
    }

    fn request(&self, method: Method, url: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.bearer))
    }
}

pub fn public_url(project_url: &str, bucket: &str, path: &str) -> String {
    format!(
        "{}/storage/v1/object/public/{}/{}",
        project_url.trim_end_matches('/'),
        bucket,
        path.trim_start_matches('/')
    )
}

async fn check_response(response: Response) -> Result<Response, AppError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    tracing::debug!("Storage API returned {}: {}", status, error_text);
    Err(classify_storage_error(status, &error_text))
}
