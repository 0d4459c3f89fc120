use super::trait_def::ImageFetcher;
use crate::error::{AnalysisError, Result};
use crate::events::{EventEmitter, Stage, Status};
use crate::types::ImageInput;
use serde_json::json;

/// 檢查輸入：URL 先做 HEAD 檢查，本機路徑確認檔案存在
///
/// 這一步不會產生任何副作用，失敗時後面的階段都不會執行。
pub async fn validate_input(
    raw: &str,
    fetcher: &dyn ImageFetcher,
    events: &EventEmitter,
) -> Result<ImageInput> {
    let input = ImageInput::classify(raw);
    events.emit(
        Stage::Validate,
        Status::Started,
        json!({ "input": input.raw(), "origin": input.origin() }),
    );

    let checked = if input.is_url() {
        fetcher.probe(input.raw()).await
    } else {
        match tokio::fs::metadata(input.raw()).await {
            Ok(meta) if meta.is_file() => Ok(()),
            _ => Err(AnalysisError::InputNotFound(input.raw().to_string())),
        }
    };

    match checked {
        Ok(()) => {
            events.emit(Stage::Validate, Status::Succeeded, json!({ "input": input.raw() }));
            Ok(input)
        }
        Err(e) => {
            events.emit(
                Stage::Validate,
                Status::Failed,
                json!({ "input": input.raw(), "error": e.to_string() }),
            );
            Err(e)
        }
    }
}
