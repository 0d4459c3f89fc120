use super::{
    candidates::CandidateFetcher,
    comparator::CandidateComparator,
    publisher::Publisher,
    services::{imgbb::ImgBbHost, openai::OpenAiComparator, serpapi::SerpApiLens},
    trait_def::{ImageComparator, ImageFetcher, ImageHost, MatchFinder},
    types::{AnalyzerConfig, ApiKeys, ServiceEndpoints},
    validator::validate_input,
};
use crate::error::Result;
use crate::events::{EventEmitter, EventSink, Stage, Status};
use crate::fetcher::HttpFetcher;
use crate::file_manager::{FileManager, TempFileGuard};
use crate::types::{AnalysisReport, ImageInput};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// 圖片真偽分析引擎
pub struct AnalysisEngine {
    file_manager: FileManager,
    fetcher: Arc<dyn ImageFetcher>,
    publisher: Publisher,
    finder: Arc<dyn MatchFinder>,
    candidates: CandidateFetcher,
    comparator: CandidateComparator,
    sink: Arc<dyn EventSink>,
}

impl AnalysisEngine {
    /// 用正式服務（ImgBB / SerpAPI / OpenAI）建立引擎
    pub fn new(
        config: AnalyzerConfig,
        keys: ApiKeys,
        endpoints: ServiceEndpoints,
        sink: Arc<dyn EventSink>,
    ) -> anyhow::Result<Self> {
        let fetcher = Arc::new(HttpFetcher::new(
            config.probe_timeout_secs,
            config.chunk_size,
            config.download_retries,
        )?);
        let host = Arc::new(ImgBbHost::new(
            endpoints.upload_url,
            keys.imgbb,
            config.request_timeout_secs,
        )?);
        let finder = Arc::new(SerpApiLens::new(
            endpoints.search_url,
            endpoints.search_engine,
            keys.serpapi,
            config.request_timeout_secs,
        )?);
        let comparator = Arc::new(OpenAiComparator::new(
            endpoints.comparison_url,
            endpoints.comparison_model,
            keys.openai,
            config.comparison_timeout_secs,
            config.comparisons_per_minute,
        )?);

        Self::with_services(config, fetcher, host, finder, comparator, sink)
    }

    /// 自訂各階段的服務實作
    pub fn with_services(
        config: AnalyzerConfig,
        fetcher: Arc<dyn ImageFetcher>,
        host: Arc<dyn ImageHost>,
        finder: Arc<dyn MatchFinder>,
        comparator: Arc<dyn ImageComparator>,
        sink: Arc<dyn EventSink>,
    ) -> anyhow::Result<Self> {
        let file_manager = FileManager::new(&config.download_dir)?;
        let candidates = CandidateFetcher::new(
            Arc::clone(&fetcher),
            config.max_candidates,
            config.effective_concurrency(),
        );

        Ok(Self {
            file_manager,
            publisher: Publisher::new(host, Arc::clone(&fetcher)),
            fetcher,
            finder,
            candidates,
            comparator: CandidateComparator::new(comparator),
            sink,
        })
    }

    /// 分析一張圖片（本機路徑或 URL）
    ///
    /// 驗證失敗直接回傳原錯誤；之後任何階段失敗都會包成 `Pipeline`。
    /// URL 輸入的暫存原圖在每一種結束方式下都會被刪除。
    pub async fn analyze(&self, image_path_or_url: &str) -> Result<AnalysisReport> {
        let run_id = Uuid::new_v4().simple().to_string();
        let events = EventEmitter::new(run_id.clone(), Arc::clone(&self.sink));

        tracing::info!(run_id = %run_id, input = image_path_or_url, "🔍 開始分析");

        let input = validate_input(image_path_or_url, self.fetcher.as_ref(), &events).await?;

        let temp = if input.is_url() {
            TempFileGuard::new(self.file_manager.temp_original_path(&run_id))
        } else {
            TempFileGuard::empty()
        };

        let mut run_dir = None;
        let outcome = self
            .run_stages(&input, temp.path(), &run_id, &mut run_dir, &events)
            .await;
        let cleaned_temp = temp.release();
        let run_dir = run_dir.map(|dir| dir.display().to_string());

        match outcome {
            Ok(report) => {
                events.emit(
                    Stage::Report,
                    Status::Succeeded,
                    json!({ "report": report, "cleaned_temp": cleaned_temp, "run_dir": run_dir }),
                );
                Ok(report)
            }
            Err(e) => {
                events.emit(
                    Stage::Report,
                    Status::Failed,
                    json!({ "error": e.to_string(), "cleaned_temp": cleaned_temp, "run_dir": run_dir }),
                );
                Err(e.into_pipeline())
            }
        }
    }

    /// 建立了候選目錄就記到 `run_dir`，失敗時也留著給最後的事件
    async fn run_stages(
        &self,
        input: &ImageInput,
        temp_copy: Option<&Path>,
        run_id: &str,
        run_dir: &mut Option<PathBuf>,
        events: &EventEmitter,
    ) -> Result<AnalysisReport> {
        // 1. 上傳
        let publication = self.publisher.publish(input, temp_copy, events).await?;

        // 2. 反向搜尋
        events.emit(
            Stage::Search,
            Status::Started,
            json!({ "engine": self.finder.name(), "url": publication.published.url }),
        );
        let result = self
            .finder
            .find_exact_matches(&publication.published.url)
            .await?;
        let total = result.len();
        events.emit(Stage::Search, Status::Succeeded, json!({ "matches": total }));

        if result.is_empty() {
            return Ok(AnalysisReport::no_matches());
        }

        if self.candidates.select(&result).is_empty() {
            return Ok(AnalysisReport::no_thumbnails(total));
        }

        // 3. 下載候選圖片
        let dir: &Path = run_dir.insert(self.file_manager.create_run_dir(run_id)?);
        let outcome = self.candidates.fetch(&result, dir, events).await;

        if outcome.fetched.is_empty() {
            return Ok(AnalysisReport::none_downloaded(total));
        }

        tracing::info!(
            run_id,
            attempted = outcome.attempted,
            succeeded = outcome.fetched.len(),
            dir = %dir.display(),
            "✅ 候選圖片下載完成"
        );

        // 4. 逐一比對
        let summary = self
            .comparator
            .find_first_match(&publication.local_original, &outcome.fetched, events)
            .await;

        let report = match summary.first_match {
            Some(index) => {
                let matched = &outcome.fetched[index - 1];
                tracing::warn!(
                    run_id,
                    index,
                    source = matched.candidate.source_or_default(),
                    "🚨 偵測到盜圖"
                );
                AnalysisReport::deception(index, &matched.candidate, total)
            }
            None => AnalysisReport::exhausted(total, summary.analyzed),
        };

        Ok(report)
    }
}
