use crate::error::Result;
use crate::events::EventEmitter;
use crate::types::{ComparisonOutcome, PublishedImage, SearchResult};
use std::path::Path;

/// 圖床服務 Trait
#[async_trait::async_trait]
pub trait ImageHost: Send + Sync {
    /// 服務名稱
    fn name(&self) -> &str;

    /// 上傳圖片內容，回傳公開 URL
    async fn upload(&self, bytes: &[u8]) -> Result<PublishedImage>;
}

/// 反向搜尋服務 Trait
#[async_trait::async_trait]
pub trait MatchFinder: Send + Sync {
    fn name(&self) -> &str;

    /// 用公開 URL 搜尋完全相符的圖片，順序照搜尋引擎回傳
    async fn find_exact_matches(&self, image_url: &str) -> Result<SearchResult>;
}

/// 遠端圖片存取 Trait
#[async_trait::async_trait]
pub trait ImageFetcher: Send + Sync {
    /// 輕量檢查 URL 是否可存取
    async fn probe(&self, url: &str) -> Result<()>;

    /// 串流下載到 `dest`，回傳寫入的 bytes 數
    async fn download(&self, url: &str, dest: &Path, events: &EventEmitter) -> Result<u64>;
}

/// 視覺比對服務 Trait
#[async_trait::async_trait]
pub trait ImageComparator: Send + Sync {
    fn name(&self) -> &str;

    /// 判斷兩張圖是否為同一張
    async fn compare(&self, original: &Path, candidate: &Path) -> Result<ComparisonOutcome>;
}
