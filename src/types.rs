use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 輸入來源種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputOrigin {
    LocalPath,
    RemoteUrl,
}

/// 待分析的圖片（建立後不可變）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInput {
    origin: InputOrigin,
    raw: String,
}

impl ImageInput {
    /// 依照 scheme 判斷是 URL 還是本機路徑
    pub fn classify(raw: &str) -> Self {
        let raw = raw.trim();
        let origin = if raw.starts_with("http://") || raw.starts_with("https://") {
            InputOrigin::RemoteUrl
        } else {
            InputOrigin::LocalPath
        };

        Self {
            origin,
            raw: raw.to_string(),
        }
    }

    pub fn origin(&self) -> InputOrigin {
        self.origin
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn is_url(&self) -> bool {
        self.origin == InputOrigin::RemoteUrl
    }
}

/// 已上傳到圖床的公開 URL（每次分析只有一個）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedImage {
    pub url: String,
}

/// 反向搜尋找到的單一完全相符結果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchCandidate {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
}

impl MatchCandidate {
    pub fn source_or_default(&self) -> &str {
        self.source.as_deref().unwrap_or("Unknown")
    }

    pub fn title_or_default(&self) -> &str {
        self.title.as_deref().unwrap_or("N/A")
    }

    /// 有可用的縮圖 URL 才回傳
    pub fn thumbnail_url(&self) -> Option<&str> {
        self.thumbnail
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}

/// 搜尋結果，順序即搜尋引擎給的相關度順序，下游不可重排
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchResult {
    pub matches: Vec<MatchCandidate>,
}

impl SearchResult {
    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }
}

/// 成功下載到本機的候選圖片
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedCandidate {
    /// 在搜尋結果中的位置（從 0 開始）
    pub rank: usize,
    pub candidate: MatchCandidate,
    pub path: PathBuf,
    /// 內容雜湊 (SHA256)
    pub content_hash: String,
    pub bytes: u64,
}

/// 單次比對結果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonOutcome {
    Match,
    NoMatch,
}

pub const REASON_NO_MATCHES: &str = "no exact matches found in reverse search";
pub const REASON_NO_THUMBNAILS: &str = "no thumbnail urls found for comparison";
pub const REASON_NONE_DOWNLOADED: &str = "no images were successfully downloaded";
pub const REASON_EXHAUSTED: &str = "no matching images found in analysis";

/// 最終分析報告
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub deception_detected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_matches_found: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidates_analyzed: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matching_image_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matching_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matching_title: Option<String>,
}

impl AnalysisReport {
    fn clean(reason: &str, total: usize) -> Self {
        Self {
            deception_detected: false,
            reason: Some(reason.to_string()),
            total_matches_found: Some(total),
            candidates_analyzed: None,
            matching_image_index: None,
            matching_source: None,
            matching_title: None,
        }
    }

    pub fn no_matches() -> Self {
        Self::clean(REASON_NO_MATCHES, 0)
    }

    pub fn no_thumbnails(total: usize) -> Self {
        Self::clean(REASON_NO_THUMBNAILS, total)
    }

    pub fn none_downloaded(total: usize) -> Self {
        Self::clean(REASON_NONE_DOWNLOADED, total)
    }

    pub fn exhausted(total: usize, analyzed: usize) -> Self {
        Self {
            candidates_analyzed: Some(analyzed),
            ..Self::clean(REASON_EXHAUSTED, total)
        }
    }

    /// `index` 是在已下載清單中的位置（從 1 開始）
    pub fn deception(index: usize, candidate: &MatchCandidate, total: usize) -> Self {
        Self {
            deception_detected: true,
            reason: None,
            total_matches_found: Some(total),
            candidates_analyzed: Some(index),
            matching_image_index: Some(index),
            matching_source: Some(candidate.source_or_default().to_string()),
            matching_title: Some(candidate.title_or_default().to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_input() {
        assert!(ImageInput::classify("https://cdn.example.com/a.jpg").is_url());
        assert!(ImageInput::classify("http://example.com/a.jpg").is_url());
        assert_eq!(
            ImageInput::classify("./stories/a.jpg").origin(),
            InputOrigin::LocalPath
        );
        // ftp 不算 URL
        assert!(!ImageInput::classify("ftp://example.com/a.jpg").is_url());
    }

    #[test]
    fn test_report_schema_omits_absent_fields() {
        let json = serde_json::to_value(AnalysisReport::no_matches()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "deceptionDetected": false,
                "reason": "no exact matches found in reverse search",
                "totalMatchesFound": 0
            })
        );
    }

    #[test]
    fn test_deception_report_defaults() {
        let candidate = MatchCandidate::default();
        let report = AnalysisReport::deception(2, &candidate, 7);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["matchingImageIndex"], 2);
        assert_eq!(json["candidatesAnalyzed"], 2);
        assert_eq!(json["totalMatchesFound"], 7);
        assert_eq!(json["matchingSource"], "Unknown");
        assert_eq!(json["matchingTitle"], "N/A");
        assert!(json.get("reason").is_none());
    }

    #[test]
    fn test_blank_thumbnail_is_ignored() {
        let candidate = MatchCandidate {
            thumbnail: Some("  ".into()),
            ..Default::default()
        };
        assert!(candidate.thumbnail_url().is_none());
    }
}
