use thiserror::Error;

/// 分析流程的錯誤
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// 缺少設定（例如 API key）
    #[error("configuration error: {0}")]
    Config(String),

    #[error("image file not found at {0}")]
    InputNotFound(String),

    #[error("cannot access image URL {url}: {reason}")]
    UnreachableInput { url: String, reason: String },

    /// 上傳失敗，帶有伺服器回應內容
    #[error("upload failed: {0}")]
    Upload(String),

    #[error("reverse search failed: {0}")]
    Search(String),

    /// 單一候選圖片下載失敗（非致命）
    #[error("download failed for {url}: {reason}")]
    Download { url: String, reason: String },

    /// 單一候選圖片比對失敗（非致命）
    #[error("image comparison failed: {0}")]
    Comparison(String),

    /// 流程中未預期的錯誤，清理完成後才往外拋
    #[error("pipeline error: {0}")]
    Pipeline(#[source] Box<AnalysisError>),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl AnalysisError {
    /// 是否會中止整個分析
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Download { .. } | Self::Comparison(_))
    }

    /// 錯誤種類的標籤（給 JSON 輸出用）
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::InputNotFound(_) => "input_not_found",
            Self::UnreachableInput { .. } => "unreachable_input",
            Self::Upload(_) => "upload",
            Self::Search(_) => "search",
            Self::Download { .. } => "download",
            Self::Comparison(_) => "comparison",
            Self::Pipeline(_) => "pipeline",
            Self::Io(_) => "io",
            Self::Http(_) => "http",
            Self::Json(_) => "json",
        }
    }

    /// 包成 PipelineError（已經包過的不再重複包）
    pub fn into_pipeline(self) -> Self {
        match self {
            Self::Pipeline(_) => self,
            other => Self::Pipeline(Box::new(other)),
        }
    }

    /// 取得被 Pipeline 包住的原始錯誤
    pub fn root(&self) -> &AnalysisError {
        match self {
            Self::Pipeline(inner) => inner.root(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
