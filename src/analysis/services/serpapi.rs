use crate::analysis::trait_def::MatchFinder;
use crate::error::{AnalysisError, Result};
use crate::types::{MatchCandidate, SearchResult};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct LensResponse {
    #[serde(default)]
    exact_matches: Option<Vec<MatchCandidate>>,
    #[serde(default)]
    error: Option<String>,
}

/// SerpAPI 的 Lens 完全相符搜尋
pub struct SerpApiLens {
    client: reqwest::Client,
    endpoint: String,
    engine: String,
    api_key: String,
}

impl SerpApiLens {
    pub fn new(endpoint: String, engine: String, api_key: String, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint,
            engine,
            api_key,
        })
    }
}

/// 解析搜尋回應；沒有 exact_matches 欄位視為零筆
fn parse_lens_response(body: &str) -> Result<SearchResult> {
    let parsed: LensResponse = serde_json::from_str(body)
        .map_err(|e| AnalysisError::Search(format!("unexpected response: {}", e)))?;

    let matches = parsed.exact_matches.unwrap_or_default();

    // 沒有結果時 SerpAPI 也會回 error 字串
    if let Some(error) = parsed.error {
        if matches.is_empty() && !error.to_lowercase().contains("results") {
            return Err(AnalysisError::Search(error));
        }
    }

    Ok(SearchResult { matches })
}

#[async_trait::async_trait]
impl MatchFinder for SerpApiLens {
    fn name(&self) -> &str {
        "serpapi-lens"
    }

    async fn find_exact_matches(&self, image_url: &str) -> Result<SearchResult> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("engine", self.engine.as_str()),
                ("type", "exact_matches"),
                ("url", image_url),
                ("api_key", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AnalysisError::Search(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AnalysisError::Search(e.to_string()))?;

        if !status.is_success() {
            return Err(AnalysisError::Search(format!("HTTP {}: {}", status, body)));
        }

        parse_lens_response(&body)
    }
}
