use crate::error::AppError;

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error};

pub const RECORDINGS_BUCKET: &str = "call-recordings";
pub const VIDEOS_BUCKET: &str = "call-videos";
pub const VOICE_NOTES_BUCKET: &str = "voice-recordings";

/// Signed URLs hand out one hour of read access.
pub const SIGNED_URL_EXPIRY_SECS: u32 = 3600;

/// Thin client for the Supabase Storage REST API.
#[derive(Clone)]
pub struct StorageClient {
    http: reqwest::Client,
    base_url: String,
    service_key: String,
}

#[derive(Deserialize)]
struct SignedUrlResponse {
    #[serde(rename = "signedURL")]
    signed_url: String,
}

impl StorageClient {
    pub fn new(http: reqwest::Client, base_url: String, service_key: String) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key,
        }
    }

    /// Upload an object, overwriting any previous version under the same key.
    pub async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), AppError> {
        let url = format!("{}/storage/v1/object/{bucket}/{path}", self.base_url);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.service_key)
            .header("x-upsert", "true")
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| {
                error!(error=%e, bucket=%bucket, path=%path, "storage upload request failed");
                AppError::Storage(format!("upload request failed: {e}"))
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            error!(status=%status, bucket=%bucket, path=%path, body=%body, "storage upload rejected");
            return Err(AppError::Storage(format!("upload failed: {status}")));
        }
        debug!(bucket=%bucket, path=%path, "object uploaded");
        Ok(())
    }

    /// Time-limited read access for end-user download and local processing.
    pub async fn signed_url(&self, bucket: &str, path: &str) -> Result<String, AppError> {
        let url = format!("{}/storage/v1/object/sign/{bucket}/{path}", self.base_url);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.service_key)
            .json(&json!({ "expiresIn": SIGNED_URL_EXPIRY_SECS }))
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("sign request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            return Err(AppError::Storage(format!(
                "could not sign {bucket}/{path}: {status}"
            )));
        }

        let parsed: SignedUrlResponse = resp
            .json()
            .await
            .map_err(|e| AppError::Storage(format!("bad sign response: {e}")))?;
        Ok(format!("{}/storage/v1{}", self.base_url, parsed.signed_url))
    }

    /// Long-lived URL for internal reference (stored on the Call row).
    pub fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/storage/v1/object/public/{bucket}/{path}", self.base_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_url_layout() {
        let client = StorageClient::new(
            reqwest::Client::new(),
            "https://project.supabase.co/".to_string(),
            "service-key".to_string(),
        );
        assert_eq!(
            client.public_url(VIDEOS_BUCKET, "abc.mp4"),
            "https://project.supabase.co/storage/v1/object/public/call-videos/abc.mp4"
        );
    }
}
