use anyhow::Context;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// 下載目錄管理器
///
/// 每次分析都有自己的子目錄 `run_<id>/`，原圖暫存檔也帶 run id，
/// 所以多個分析同時跑不會互相覆蓋。
pub struct FileManager {
    /// 下載根目錄
    root_dir: PathBuf,
}

impl FileManager {
    /// 建立新的檔案管理器（目錄不存在就建立）
    pub fn new(root_dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let root_dir = root_dir.as_ref().to_path_buf();
        fs::create_dir_all(&root_dir)
            .with_context(|| format!("無法建立下載目錄 {}", root_dir.display()))?;

        Ok(Self { root_dir })
    }

    /// 建立本次分析的候選圖片目錄
    pub fn create_run_dir(&self, run_id: &str) -> std::io::Result<PathBuf> {
        let dir = self.root_dir.join(format!("run_{}", run_id));
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// URL 輸入的原圖暫存路徑
    pub fn temp_original_path(&self, run_id: &str) -> PathBuf {
        self.root_dir.join(format!("temp_original_{}.jpg", run_id))
    }
}

/// 從 URL 推出本機檔名
///
/// 取最後一段路徑並去掉 query；沒有可用名稱（空的、沒有副檔名、或這次已經用過）
/// 就改用 `file_{index}`。
pub fn candidate_filename(url: &str, index: usize, used: &mut HashSet<String>) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or("");
    let last_segment = without_query.rsplit('/').next().unwrap_or("");
    let decoded = urlencoding::decode(last_segment)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| last_segment.to_string());
    let name = sanitize_filename(&decoded);

    let usable = !name.is_empty()
        && name.contains('.')
        && !name.starts_with('.')
        && !used.contains(&name);

    let name = if usable { name } else { format!("file_{}", index) };
    used.insert(name.clone());
    name
}

/// 清理檔名
fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .filter(|c| !c.is_control())
        .take(100)
        .collect()
}

/// 計算內容雜湊 (SHA256, hex)
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// 計算檔案雜湊
pub async fn hash_file(path: &Path) -> std::io::Result<String> {
    let bytes = tokio::fs::read(path).await?;
    Ok(content_hash(&bytes))
}

/// 暫存檔守衛：離開作用域時一定刪除，且只刪一次
#[derive(Debug)]
pub struct TempFileGuard {
    path: Option<PathBuf>,
}

impl TempFileGuard {
    pub fn new(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    /// 本機輸入不需要暫存檔
    pub fn empty() -> Self {
        Self { path: None }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// 立即清理；回傳是否真的刪了檔案
    pub fn release(mut self) -> bool {
        self.cleanup()
    }

    fn cleanup(&mut self) -> bool {
        let Some(path) = self.path.take() else {
            return false;
        };

        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::info!(path = %path.display(), "🧹 已清理暫存檔");
                true
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "⚠️  暫存檔刪除失敗");
                false
            }
        }
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        self.cleanup();
    }
}
