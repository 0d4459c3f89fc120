use super::trait_def::ImageComparator;
use crate::error::{AnalysisError, Result};
use crate::events::{EventEmitter, Stage, Status};
use crate::types::{ComparisonOutcome, FetchedCandidate};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;

/// 把模型回答正規化成 YES / NO
///
/// 先去空白轉大寫；不是剛好 YES 或 NO 時，含 "YES" 算相符、含 "NO" 算不相符，
/// 兩者都沒有才是錯誤。
pub fn normalize_verdict(raw: &str) -> Result<ComparisonOutcome> {
    let answer = raw.trim().to_uppercase();

    match answer.as_str() {
        "YES" => Ok(ComparisonOutcome::Match),
        "NO" => Ok(ComparisonOutcome::NoMatch),
        other if other.contains("YES") => Ok(ComparisonOutcome::Match),
        other if other.contains("NO") => Ok(ComparisonOutcome::NoMatch),
        other => Err(AnalysisError::Comparison(format!(
            "unexpected model response: {:?}",
            other
        ))),
    }
}

/// 依序比對的結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComparisonSummary {
    /// 第一個相符候選在已下載清單中的位置（從 1 開始）
    pub first_match: Option<usize>,
    /// 實際比對過的數量
    pub analyzed: usize,
}

/// 依排名逐一比對，遇到第一個相符就停
pub struct CandidateComparator {
    comparator: Arc<dyn ImageComparator>,
}

impl CandidateComparator {
    pub fn new(comparator: Arc<dyn ImageComparator>) -> Self {
        Self { comparator }
    }

    pub async fn find_first_match(
        &self,
        original: &Path,
        fetched: &[FetchedCandidate],
        events: &EventEmitter,
    ) -> ComparisonSummary {
        let total = fetched.len();

        for (i, candidate) in fetched.iter().enumerate() {
            let index = i + 1;
            events.emit(
                Stage::Compare,
                Status::Started,
                json!({
                    "index": index,
                    "of": total,
                    "model": self.comparator.name(),
                    "candidate": candidate.path.display().to_string(),
                }),
            );

            match self.comparator.compare(original, &candidate.path).await {
                Ok(ComparisonOutcome::Match) => {
                    events.emit(
                        Stage::Compare,
                        Status::Succeeded,
                        json!({
                            "index": index,
                            "outcome": ComparisonOutcome::Match,
                            "source": candidate.candidate.source_or_default(),
                        }),
                    );
                    return ComparisonSummary {
                        first_match: Some(index),
                        analyzed: index,
                    };
                }
                Ok(ComparisonOutcome::NoMatch) => {
                    events.emit(
                        Stage::Compare,
                        Status::Succeeded,
                        json!({ "index": index, "outcome": ComparisonOutcome::NoMatch }),
                    );
                }
                Err(e) => {
                    // 單張比對失敗當作不相符，繼續下一張
                    tracing::debug!(run_id = events.run_id(), index, error = %e, "比對失敗，略過");
                    events.emit(
                        Stage::Compare,
                        Status::Skipped,
                        json!({ "index": index, "error": e.to_string() }),
                    );
                }
            }
        }

        ComparisonSummary {
            first_match: None,
            analyzed: total,
        }
    }
}
