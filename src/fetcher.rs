use crate::analysis::trait_def::ImageFetcher;
use crate::error::{AnalysisError, Result};
use crate::events::{EventEmitter, Stage, Status};
use reqwest::Client;
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufWriter};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// HTTP 實作：HEAD 檢查與分塊串流下載
pub struct HttpFetcher {
    client: Client,
    probe_timeout: Duration,
    chunk_size: usize,
    max_retries: u32,
}

impl HttpFetcher {
    /// 建立新的 HTTP Fetcher
    ///
    /// 下載本身不設整體超時（檔案大小不定），只限制連線時間；
    /// 進度會以事件持續回報。
    pub fn new(probe_timeout_secs: u64, chunk_size: usize, max_retries: u32) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(probe_timeout_secs.max(1)))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            probe_timeout: Duration::from_secs(probe_timeout_secs),
            chunk_size: chunk_size.max(1),
            max_retries,
        })
    }

    /// 帶重試的下載
    async fn download_with_retry(
        &self,
        url: &str,
        dest: &Path,
        events: &EventEmitter,
    ) -> Result<u64> {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // 重試前等待（指數退避）
                let wait_time = Duration::from_secs(2u64.pow(attempt - 1));
                tokio::time::sleep(wait_time).await;
                tracing::debug!(url, attempt, "重試下載");
            }

            match self.stream_to_file(url, dest, events).await {
                Ok(written) => return Ok(written),
                Err(e) => {
                    // 不留下寫到一半的檔案
                    let _ = tokio::fs::remove_file(dest).await;
                    last_error = Some(e);
                }
            }
        }

        Err(into_download_error(url, last_error))
    }

    async fn stream_to_file(&self, url: &str, dest: &Path, events: &EventEmitter) -> Result<u64> {
        let mut response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AnalysisError::Download {
                url: url.to_string(),
                reason: format!("HTTP {}", status),
            });
        }

        let total = response.content_length().filter(|len| *len > 0);
        let file = tokio::fs::File::create(dest).await?;
        let mut writer = BufWriter::with_capacity(self.chunk_size, file);
        let mut downloaded: u64 = 0;

        while let Some(bytes) = response.chunk().await? {
            for piece in bytes.chunks(self.chunk_size) {
                writer.write_all(piece).await?;
                downloaded += piece.len() as u64;

                if let Some(total) = total {
                    events.emit(
                        Stage::Fetch,
                        Status::Progress,
                        json!({ "url": url, "downloaded": downloaded, "total": total }),
                    );
                }
            }
        }

        writer.flush().await?;
        Ok(downloaded)
    }
}

/// 統一成 `Download`；本來就是 `Download` 的直接沿用
fn into_download_error(url: &str, error: Option<AnalysisError>) -> AnalysisError {
    match error {
        Some(e @ AnalysisError::Download { .. }) => e,
        Some(e) => AnalysisError::Download {
            url: url.to_string(),
            reason: e.to_string(),
        },
        None => AnalysisError::Download {
            url: url.to_string(),
            reason: "unknown error".to_string(),
        },
    }
}

#[async_trait::async_trait]
impl ImageFetcher for HttpFetcher {
    async fn probe(&self, url: &str) -> Result<()> {
        let unreachable = |reason: String| AnalysisError::UnreachableInput {
            url: url.to_string(),
            reason,
        };

        let response = self
            .client
            .head(url)
            .timeout(self.probe_timeout)
            .send()
            .await
            .map_err(|e| unreachable(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(unreachable(format!("HTTP {}", response.status())))
        }
    }

    async fn download(&self, url: &str, dest: &Path, events: &EventEmitter) -> Result<u64> {
        self.download_with_retry(url, dest, events).await
    }
}
