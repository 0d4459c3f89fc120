use crate::analysis::trait_def::ImageHost;
use crate::error::{AnalysisError, Result};
use crate::types::PublishedImage;
use base64::{Engine, engine::general_purpose};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct UploadResponse {
    data: UploadData,
}

#[derive(Debug, Deserialize)]
struct UploadData {
    url: String,
}

/// ImgBB 圖床
pub struct ImgBbHost {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl ImgBbHost {
    pub fn new(endpoint: String, api_key: String, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }
}

/// 解析上傳回應，取出公開 URL
fn parse_upload_response(body: &str) -> Result<PublishedImage> {
    let parsed: UploadResponse = serde_json::from_str(body)
        .map_err(|e| AnalysisError::Upload(format!("unexpected response ({}): {}", e, body)))?;

    if parsed.data.url.is_empty() {
        return Err(AnalysisError::Upload(format!("empty url in response: {}", body)));
    }

    Ok(PublishedImage {
        url: parsed.data.url,
    })
}

#[async_trait::async_trait]
impl ImageHost for ImgBbHost {
    fn name(&self) -> &str {
        "imgbb"
    }

    async fn upload(&self, bytes: &[u8]) -> Result<PublishedImage> {
        let encoded = general_purpose::STANDARD.encode(bytes);

        let form = reqwest::multipart::Form::new()
            .text("key", self.api_key.clone())
            .text("image", encoded);

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| AnalysisError::Upload(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AnalysisError::Upload(e.to_string()))?;

        if !status.is_success() {
            return Err(AnalysisError::Upload(body));
        }

        parse_upload_response(&body)
    }
}
