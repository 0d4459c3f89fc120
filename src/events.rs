use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::UnboundedSender;

/// 流程階段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Validate,
    Publish,
    Search,
    Fetch,
    Compare,
    Report,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Validate => "validate",
            Stage::Publish => "publish",
            Stage::Search => "search",
            Stage::Fetch => "fetch",
            Stage::Compare => "compare",
            Stage::Report => "report",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Started,
    Progress,
    Succeeded,
    Skipped,
    Failed,
}

/// 結構化的流程事件
#[derive(Debug, Clone, Serialize)]
pub struct PipelineEvent {
    pub run_id: String,
    pub stage: Stage,
    pub status: Status,
    pub payload: Value,
    pub at: DateTime<Utc>,
}

/// 事件接收端
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &PipelineEvent);
}

/// 綁定 run id 的事件發送器
#[derive(Clone)]
pub struct EventEmitter {
    run_id: String,
    sink: Arc<dyn EventSink>,
}

impl EventEmitter {
    pub fn new(run_id: impl Into<String>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            run_id: run_id.into(),
            sink,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn emit(&self, stage: Stage, status: Status, payload: Value) {
        let event = PipelineEvent {
            run_id: self.run_id.clone(),
            stage,
            status,
            payload,
            at: Utc::now(),
        };
        self.sink.emit(&event);
    }
}

/// 把事件寫進 tracing
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &PipelineEvent) {
        let run_id = event.run_id.as_str();
        let stage = &event.stage;
        let payload = &event.payload;

        match event.status {
            Status::Progress => {
                tracing::debug!(run_id, %stage, %payload, "progress")
            }
            Status::Failed => {
                tracing::warn!(run_id, %stage, %payload, "stage failed")
            }
            Status::Skipped => {
                tracing::warn!(run_id, %stage, %payload, "skipped")
            }
            Status::Started => {
                tracing::info!(run_id, %stage, %payload, "started")
            }
            Status::Succeeded => {
                tracing::info!(run_id, %stage, %payload, "succeeded")
            }
        }
    }
}

/// 把事件丟進 channel（給測試或外部觀察者）
pub struct ChannelSink {
    tx: UnboundedSender<PipelineEvent>,
}

impl ChannelSink {
    pub fn new(tx: UnboundedSender<PipelineEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: &PipelineEvent) {
        // 接收端已關閉就直接丟掉
        let _ = self.tx.send(event.clone());
    }
}

/// 同時送給多個 sink
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }
}

impl EventSink for FanoutSink {
    fn emit(&self, event: &PipelineEvent) {
        for sink in &self.sinks {
            sink.emit(event);
        }
    }
}

/// CLI 用：下載進度顯示成進度條，其他事件交給 tracing
pub struct ProgressSink {
    bars: Mutex<HashMap<String, ProgressBar>>,
    fallback: TracingSink,
}

impl ProgressSink {
    pub fn new() -> Self {
        Self {
            bars: Mutex::new(HashMap::new()),
            fallback: TracingSink,
        }
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("{msg}\n[{elapsed_precise}] {bar:40.cyan/blue} {bytes}/{total_bytes} ({percent}%)")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-")
    }
}

impl Default for ProgressSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for ProgressSink {
    fn emit(&self, event: &PipelineEvent) {
        if event.stage != Stage::Fetch {
            self.fallback.emit(event);
            return;
        }

        let Some(url) = event.payload["url"].as_str() else {
            self.fallback.emit(event);
            return;
        };

        let Ok(mut bars) = self.bars.lock() else {
            return;
        };

        match event.status {
            Status::Progress => {
                let total = event.payload["total"].as_u64().unwrap_or(0);
                let downloaded = event.payload["downloaded"].as_u64().unwrap_or(0);
                let bar = bars.entry(url.to_string()).or_insert_with(|| {
                    let bar = ProgressBar::new(total);
                    bar.set_style(Self::bar_style());
                    bar.set_message(format!("📥 {}", url));
                    bar
                });
                bar.set_position(downloaded);
            }
            Status::Succeeded | Status::Failed | Status::Skipped => {
                if let Some(bar) = bars.remove(url) {
                    bar.finish_and_clear();
                }
                self.fallback.emit(event);
            }
            Status::Started => self.fallback.emit(event),
        }
    }
}
