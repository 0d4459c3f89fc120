use super::trait_def::{ImageFetcher, ImageHost};
use crate::error::{AnalysisError, Result};
use crate::events::{EventEmitter, Stage, Status};
use crate::file_manager::content_hash;
use crate::types::{ImageInput, PublishedImage};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// 上傳結果：公開 URL 加上可供比對的本機原圖路徑
#[derive(Debug, Clone)]
pub struct Publication {
    pub published: PublishedImage,
    pub local_original: PathBuf,
}

/// 把原圖放到圖床上，讓搜尋引擎抓得到
pub struct Publisher {
    host: Arc<dyn ImageHost>,
    fetcher: Arc<dyn ImageFetcher>,
}

impl Publisher {
    pub fn new(host: Arc<dyn ImageHost>, fetcher: Arc<dyn ImageFetcher>) -> Self {
        Self { host, fetcher }
    }

    /// URL 輸入會先串流到 `temp_copy`（之後比對要用），再從暫存檔上傳。
    /// `temp_copy` 的清理由呼叫端負責。
    pub async fn publish(
        &self,
        input: &ImageInput,
        temp_copy: Option<&Path>,
        events: &EventEmitter,
    ) -> Result<Publication> {
        events.emit(
            Stage::Publish,
            Status::Started,
            json!({ "host": self.host.name(), "input": input.raw() }),
        );

        let local_original = if input.is_url() {
            let dest = temp_copy.ok_or_else(|| {
                AnalysisError::Upload("no temporary path reserved for URL input".into())
            })?;
            let bytes = self
                .fetcher
                .download(input.raw(), dest, events)
                .await
                .map_err(|e| AnalysisError::Upload(format!("cannot fetch original image: {}", e)))?;
            events.emit(
                Stage::Fetch,
                Status::Succeeded,
                json!({ "url": input.raw(), "bytes": bytes, "dest": dest.display().to_string() }),
            );
            dest.to_path_buf()
        } else {
            PathBuf::from(input.raw())
        };

        let bytes = tokio::fs::read(&local_original).await?;
        let published = self.host.upload(&bytes).await?;

        events.emit(
            Stage::Publish,
            Status::Succeeded,
            json!({
                "url": published.url,
                "local_original": local_original.display().to_string(),
                "content_hash": content_hash(&bytes),
            }),
        );

        Ok(Publication {
            published,
            local_original,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::TracingSink;
    use std::sync::Mutex;

    struct RecordingHost {
        uploads: Mutex<Vec<Vec<u8>>>,
    }

    #[async_trait::async_trait]
    impl ImageHost for RecordingHost {
        fn name(&self) -> &str {
            "recording"
        }

        async fn upload(&self, bytes: &[u8]) -> Result<PublishedImage> {
            self.uploads.lock().unwrap().push(bytes.to_vec());
            Ok(PublishedImage {
                url: "https://i.ibb.co/run/original.jpg".into(),
            })
        }
    }

    struct CopyFetcher {
        body: &'static [u8],
    }

    #[async_trait::async_trait]
    impl ImageFetcher for CopyFetcher {
        async fn probe(&self, _url: &str) -> Result<()> {
            Ok(())
        }

        async fn download(&self, _url: &str, dest: &Path, _events: &EventEmitter) -> Result<u64> {
            tokio::fs::write(dest, self.body).await?;
            Ok(self.body.len() as u64)
        }
    }

    fn events() -> EventEmitter {
        EventEmitter::new("publish-test", Arc::new(TracingSink))
    }

    #[tokio::test]
    async fn test_url_input_materializes_temp_copy() {
        let dir = tempfile::tempdir().unwrap();
        let temp = dir.path().join("temp_original_run.jpg");
        let host = Arc::new(RecordingHost { uploads: Mutex::new(vec![]) });
        let publisher = Publisher::new(host.clone(), Arc::new(CopyFetcher { body: b"remote-bytes" }));

        let input = ImageInput::classify("https://cdn.example.com/story.jpg");
        let publication = publisher.publish(&input, Some(&temp), &events()).await.unwrap();

        assert_eq!(publication.local_original, temp);
        assert_eq!(std::fs::read(&temp).unwrap(), b"remote-bytes");
        assert_eq!(host.uploads.lock().unwrap()[0], b"remote-bytes");
    }

    #[tokio::test]
    async fn test_local_input_uploads_file_as_is() {
        let dir = tempfile::tempdir().unwrap();
        let story = dir.path().join("story.jpg");
        std::fs::write(&story, b"local-bytes").unwrap();
        let host = Arc::new(RecordingHost { uploads: Mutex::new(vec![]) });
        let publisher = Publisher::new(host.clone(), Arc::new(CopyFetcher { body: b"unused" }));

        let input = ImageInput::classify(story.to_str().unwrap());
        let publication = publisher.publish(&input, None, &events()).await.unwrap();

        assert_eq!(publication.local_original, story);
        assert_eq!(publication.published.url, "https://i.ibb.co/run/original.jpg");
        assert_eq!(host.uploads.lock().unwrap()[0], b"local-bytes");
    }
}
