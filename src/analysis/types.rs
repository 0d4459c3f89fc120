use crate::error::{AnalysisError, Result};
use std::path::PathBuf;

/// 分析器配置
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    /// 候選圖片下載目錄
    pub download_dir: PathBuf,
    /// 最多比對幾張候選圖片 (K)
    pub max_candidates: usize,
    /// 下載串流的區塊大小（bytes）
    pub chunk_size: usize,
    /// URL 輸入的 HEAD 檢查超時（秒）
    pub probe_timeout_secs: u64,
    /// 上傳 / 搜尋請求超時（秒）
    pub request_timeout_secs: u64,
    /// 視覺模型比對超時（秒）
    pub comparison_timeout_secs: u64,
    /// 同時下載幾張候選圖片
    pub download_concurrency: usize,
    /// 下載重試次數
    pub download_retries: u32,
    /// 每分鐘最多比對次數
    pub comparisons_per_minute: u32,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from("reverse_search_images"),
            max_candidates: 3,
            chunk_size: 8192,
            probe_timeout_secs: 10,
            request_timeout_secs: 30,
            comparison_timeout_secs: 60,
            download_concurrency: 3,
            download_retries: 1,
            comparisons_per_minute: 30,
        }
    }
}

impl AnalyzerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = dir.into();
        self
    }

    pub fn with_max_candidates(mut self, max_candidates: usize) -> Self {
        self.max_candidates = max_candidates;
        self
    }

    pub fn with_download_concurrency(mut self, concurrency: usize) -> Self {
        self.download_concurrency = concurrency;
        self
    }

    pub fn with_download_retries(mut self, retries: u32) -> Self {
        self.download_retries = retries;
        self
    }

    pub fn with_comparisons_per_minute(mut self, per_minute: u32) -> Self {
        self.comparisons_per_minute = per_minute;
        self
    }

    /// 實際使用的下載並發數（1..=K）
    pub fn effective_concurrency(&self) -> usize {
        self.download_concurrency.clamp(1, self.max_candidates.max(1))
    }
}

/// 外部服務的 API key
#[derive(Clone)]
pub struct ApiKeys {
    pub imgbb: String,
    pub serpapi: String,
    pub openai: String,
}

impl ApiKeys {
    /// 從環境變數讀取，缺少的 key 一次全部列出
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut missing = Vec::new();
        let mut read = |name: &'static str| {
            match lookup(name).filter(|v| !v.trim().is_empty()) {
                Some(value) => value,
                None => {
                    missing.push(name);
                    String::new()
                }
            }
        };

        let imgbb = read("IMGBB_API_KEY");
        let serpapi = read("SERPAPI_KEY");
        let openai = read("OPENAI_API_KEY");

        if !missing.is_empty() {
            return Err(AnalysisError::Config(format!(
                "missing required environment variables: {}",
                missing.join(", ")
            )));
        }

        Ok(Self {
            imgbb,
            serpapi,
            openai,
        })
    }
}

impl std::fmt::Debug for ApiKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeys")
            .field("imgbb", &"***")
            .field("serpapi", &"***")
            .field("openai", &"***")
            .finish()
    }
}

/// 外部服務端點
#[derive(Debug, Clone)]
pub struct ServiceEndpoints {
    pub upload_url: String,
    pub search_url: String,
    /// SerpAPI 的 engine 參數
    pub search_engine: String,
    pub comparison_url: String,
    pub comparison_model: String,
}

impl Default for ServiceEndpoints {
    fn default() -> Self {
        Self {
            upload_url: "https://api.imgbb.com/1/upload".to_string(),
            search_url: "https://serpapi.com/search.json".to_string(),
            search_engine: "google_lens".to_string(),
            comparison_url: "https://api.openai.com/v1/chat/completions".to_string(),
            comparison_model: "gpt-4o".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_missing_keys_listed_together() {
        let env: HashMap<&str, &str> = [("SERPAPI_KEY", "s")].into_iter().collect();
        let err = ApiKeys::from_lookup(|name| env.get(name).map(|v| v.to_string())).unwrap_err();

        let message = err.to_string();
        assert!(message.contains("IMGBB_API_KEY"));
        assert!(message.contains("OPENAI_API_KEY"));
        assert!(!message.contains("SERPAPI_KEY"));
    }

    #[test]
    fn test_keys_debug_is_redacted() {
        let keys = ApiKeys::from_lookup(|_| Some("secret-value".into())).unwrap();
        assert!(!format!("{:?}", keys).contains("secret-value"));
    }

    #[test]
    fn test_effective_concurrency_bounded_by_k() {
        let config = AnalyzerConfig::default().with_download_concurrency(10);
        assert_eq!(config.effective_concurrency(), 3);

        let config = AnalyzerConfig::default().with_download_concurrency(0);
        assert_eq!(config.effective_concurrency(), 1);
    }
}
