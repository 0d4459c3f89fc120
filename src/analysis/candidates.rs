use super::trait_def::ImageFetcher;
use crate::error::AnalysisError;
use crate::events::{EventEmitter, Stage, Status};
use crate::file_manager::{candidate_filename, hash_file};
use crate::types::{FetchedCandidate, MatchCandidate, SearchResult};
use serde_json::json;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// 候選下載結果
#[derive(Debug, Default)]
pub struct FetchOutcome {
    /// 嘗試下載的數量（有縮圖的前 K 筆）
    pub attempted: usize,
    /// 成功下載的候選，依搜尋排名排序
    pub fetched: Vec<FetchedCandidate>,
}

/// 候選圖片下載器
pub struct CandidateFetcher {
    fetcher: Arc<dyn ImageFetcher>,
    max_candidates: usize,
    concurrency: usize,
}

impl CandidateFetcher {
    pub fn new(fetcher: Arc<dyn ImageFetcher>, max_candidates: usize, concurrency: usize) -> Self {
        Self {
            fetcher,
            max_candidates,
            concurrency: concurrency.clamp(1, max_candidates.max(1)),
        }
    }

    /// 前 K 筆有縮圖 URL 的搜尋結果（保留原本順序）
    pub fn select<'a>(&self, result: &'a SearchResult) -> Vec<(usize, &'a MatchCandidate)> {
        result
            .matches
            .iter()
            .enumerate()
            .filter(|(_, m)| m.thumbnail_url().is_some())
            .take(self.max_candidates)
            .collect()
    }

    /// 下載候選圖片到 `run_dir`
    ///
    /// 下載可以並行，但回傳的清單一定照搜尋排名排列；失敗的候選直接略過。
    pub async fn fetch(
        &self,
        result: &SearchResult,
        run_dir: &Path,
        events: &EventEmitter,
    ) -> FetchOutcome {
        let selected = self.select(result);
        let attempted = selected.len();

        let mut used_names = HashSet::new();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = Vec::with_capacity(attempted);

        for (slot, (rank, candidate)) in selected.into_iter().enumerate() {
            let Some(url) = candidate.thumbnail_url().map(str::to_string) else {
                continue;
            };
            let filename = candidate_filename(&url, slot + 1, &mut used_names);
            let dest: PathBuf = run_dir.join(filename);

            let semaphore = Arc::clone(&semaphore);
            let fetcher = Arc::clone(&self.fetcher);
            let events = events.clone();
            let candidate = candidate.clone();

            let task = tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return None;
                };

                events.emit(
                    Stage::Fetch,
                    Status::Started,
                    json!({ "url": url, "rank": rank + 1, "dest": dest.display().to_string() }),
                );

                let fetched = async {
                    let bytes = fetcher.download(&url, &dest, &events).await?;
                    let content_hash = hash_file(&dest).await?;
                    Ok::<_, AnalysisError>(FetchedCandidate {
                        rank,
                        candidate,
                        path: dest.clone(),
                        content_hash,
                        bytes,
                    })
                }
                .await;

                match fetched {
                    Ok(fetched) => {
                        events.emit(
                            Stage::Fetch,
                            Status::Succeeded,
                            json!({
                                "url": url,
                                "rank": rank + 1,
                                "bytes": fetched.bytes,
                                "content_hash": fetched.content_hash,
                            }),
                        );
                        Some(fetched)
                    }
                    Err(e) => {
                        events.emit(
                            Stage::Fetch,
                            Status::Failed,
                            json!({ "url": url, "rank": rank + 1, "error": e.to_string() }),
                        );
                        None
                    }
                }
            });

            tasks.push(task);
        }

        // 依序 await，結果自然維持排名順序
        let mut fetched = Vec::new();
        for task in tasks {
            match task.await {
                Ok(Some(candidate)) => fetched.push(candidate),
                Ok(None) => {}
                Err(e) => tracing::error!(error = %e, "下載任務異常結束"),
            }
        }

        events.emit(
            Stage::Fetch,
            Status::Progress,
            json!({ "attempted": attempted, "succeeded": fetched.len() }),
        );

        FetchOutcome { attempted, fetched }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::events::TracingSink;
    use std::sync::Mutex;
    use std::time::Duration;

    /// 依 URL 決定成功或失敗，並可讓前面的下載故意變慢
    struct ScriptedFetcher {
        fail: Vec<&'static str>,
        slow: Vec<&'static str>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl ImageFetcher for ScriptedFetcher {
        async fn probe(&self, _url: &str) -> Result<()> {
            Ok(())
        }

        async fn download(&self, url: &str, dest: &Path, _events: &EventEmitter) -> Result<u64> {
            self.calls.lock().unwrap().push(url.to_string());
            if self.slow.iter().any(|s| url.contains(s)) {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            if self.fail.iter().any(|f| url.contains(f)) {
                return Err(AnalysisError::Download {
                    url: url.to_string(),
                    reason: "HTTP 404 Not Found".into(),
                });
            }
            tokio::fs::write(dest, url.as_bytes()).await?;
            Ok(url.len() as u64)
        }
    }

    fn candidate(name: &str, thumbnail: Option<&str>) -> MatchCandidate {
        MatchCandidate {
            title: Some(format!("{name} title")),
            source: Some(format!("{name}.com")),
            thumbnail: thumbnail.map(str::to_string),
            link: None,
        }
    }

    fn events() -> EventEmitter {
        EventEmitter::new("fetch-test", Arc::new(TracingSink))
    }

    #[tokio::test]
    async fn test_failed_downloads_are_dropped_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(ScriptedFetcher {
            fail: vec!["one", "three"],
            slow: vec![],
            calls: Mutex::new(vec![]),
        });
        let result = SearchResult {
            matches: vec![
                candidate("a", Some("https://t/one.jpg")),
                candidate("b", Some("https://t/two.jpg")),
                candidate("c", Some("https://t/three.jpg")),
            ],
        };

        let outcome = CandidateFetcher::new(fetcher, 3, 3)
            .fetch(&result, dir.path(), &events())
            .await;

        assert_eq!(outcome.attempted, 3);
        assert_eq!(outcome.fetched.len(), 1);
        assert_eq!(outcome.fetched[0].rank, 1);
        assert_eq!(outcome.fetched[0].candidate.source_or_default(), "b.com");
        assert!(outcome.fetched[0].path.ends_with("two.jpg"));
        assert_eq!(outcome.fetched[0].content_hash.len(), 64);
    }

    #[tokio::test]
    async fn test_concurrent_downloads_keep_rank_order() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(ScriptedFetcher {
            fail: vec![],
            slow: vec!["first"],
            calls: Mutex::new(vec![]),
        });
        let result = SearchResult {
            matches: vec![
                candidate("a", Some("https://t/first.jpg")),
                candidate("b", Some("https://t/second.jpg")),
                candidate("c", Some("https://t/third.jpg")),
            ],
        };

        let outcome = CandidateFetcher::new(fetcher, 3, 3)
            .fetch(&result, dir.path(), &events())
            .await;

        let ranks: Vec<_> = outcome.fetched.iter().map(|f| f.rank).collect();
        assert_eq!(ranks, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_takes_first_k_with_thumbnails() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(ScriptedFetcher {
            fail: vec![],
            slow: vec![],
            calls: Mutex::new(vec![]),
        });
        let result = SearchResult {
            matches: vec![
                candidate("a", None),
                candidate("b", Some("https://t/b.jpg")),
                candidate("c", Some("https://t/c.jpg")),
                candidate("d", Some("https://t/d.jpg")),
            ],
        };

        let outcome = CandidateFetcher::new(fetcher.clone(), 2, 1)
            .fetch(&result, dir.path(), &events())
            .await;

        assert_eq!(outcome.attempted, 2);
        let ranks: Vec<_> = outcome.fetched.iter().map(|f| f.rank).collect();
        assert_eq!(ranks, vec![1, 2]);
        assert_eq!(fetcher.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_colliding_basenames_get_index_names() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(ScriptedFetcher {
            fail: vec![],
            slow: vec![],
            calls: Mutex::new(vec![]),
        });
        let result = SearchResult {
            matches: vec![
                candidate("a", Some("https://x.com/img.jpg")),
                candidate("b", Some("https://y.com/img.jpg")),
                candidate("c", Some("https://encrypted-tbn0.gstatic.com/images?q=tbn:abc")),
            ],
        };

        let outcome = CandidateFetcher::new(fetcher, 3, 2)
            .fetch(&result, dir.path(), &events())
            .await;

        let names: Vec<_> = outcome
            .fetched
            .iter()
            .map(|f| f.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["img.jpg", "file_2", "file_3"]);
    }
}
