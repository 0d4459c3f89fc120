use crate::analysis::comparator::normalize_verdict;
use crate::analysis::trait_def::ImageComparator;
use crate::error::{AnalysisError, Result};
use crate::types::ComparisonOutcome;
use base64::{Engine, engine::general_purpose};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::Deserialize;
use serde_json::{Value, json};
use std::num::NonZeroU32;
use std::path::Path;
use std::time::Duration;

const COMPARISON_PROMPT: &str = "You are checking a social media story for copied content.

Image 1 was posted by someone who claims it is their own photo.
Image 2 was found online through a reverse image search.

Decide whether both are the same picture. Compression, resizing, cropping, \
watermarks, stickers and color filters do not make two pictures different. \
Two different photos of the same place or subject are different.

Be strict: if Image 1 is a copy or a lightly edited copy of Image 2, the answer is YES.

Answer with exactly one word: YES or NO.";

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI 視覺模型比對
pub struct OpenAiComparator {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
    limiter: DefaultDirectRateLimiter,
}

impl OpenAiComparator {
    pub fn new(
        endpoint: String,
        model: String,
        api_key: String,
        timeout_secs: u64,
        per_minute: u32,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        let per_minute = NonZeroU32::new(per_minute).unwrap_or(NonZeroU32::MIN);

        Ok(Self {
            client,
            endpoint,
            model,
            api_key,
            limiter: RateLimiter::direct(Quota::per_minute(per_minute)),
        })
    }

    async fn data_url(path: &Path) -> Result<String> {
        let bytes = tokio::fs::read(path).await?;
        Ok(format!(
            "data:{};base64,{}",
            sniff_mime(&bytes),
            general_purpose::STANDARD.encode(&bytes)
        ))
    }
}

/// 依 magic bytes 判斷 MIME，預設 JPEG
fn sniff_mime(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        "image/png"
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        "image/gif"
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        "image/webp"
    } else {
        "image/jpeg"
    }
}

/// 組出比對請求：一段文字加兩張圖，溫度 0
fn build_request(model: &str, original_url: &str, candidate_url: &str) -> Value {
    json!({
        "model": model,
        "messages": [{
            "role": "user",
            "content": [
                { "type": "text", "text": COMPARISON_PROMPT },
                { "type": "image_url", "image_url": { "url": original_url, "detail": "high" } },
                { "type": "image_url", "image_url": { "url": candidate_url, "detail": "high" } }
            ]
        }],
        "max_tokens": 10,
        "temperature": 0
    })
}

#[async_trait::async_trait]
impl ImageComparator for OpenAiComparator {
    fn name(&self) -> &str {
        "openai-vision"
    }

    async fn compare(&self, original: &Path, candidate: &Path) -> Result<ComparisonOutcome> {
        let original_url = Self::data_url(original).await?;
        let candidate_url = Self::data_url(candidate).await?;
        let request = build_request(&self.model, &original_url, &candidate_url);

        self.limiter.until_ready().await;

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AnalysisError::Comparison(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnalysisError::Comparison(format!("HTTP {}: {}", status, body)));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| AnalysisError::Comparison(e.to_string()))?;

        let answer = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();

        normalize_verdict(&answer)
    }
}
