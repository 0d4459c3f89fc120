mod types;
mod error;
mod events;
mod file_manager;
mod fetcher;
mod analysis;
mod report;
mod tools;

use analysis::{AnalysisEngine, AnalyzerConfig, ApiKeys, ServiceEndpoints};
use anyhow::{Context, Result, bail};
use events::{ChannelSink, EventSink, FanoutSink, PipelineEvent, ProgressSink};
use std::env;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tools::ToolRegistry;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let args: Vec<String> = env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        Some("analyze") => {
            let Some(input) = args.get(2) else {
                println!("❌ 請提供圖片路徑或 URL");
                print_help();
                return Ok(());
            };
            let options = AnalyzeOptions::parse(&args[3..])?;
            run_analyze(input, options).await?
        }
        Some("summary") => run_summary(args.get(2).map(|s| s.as_str())).await?,
        Some("tools") => run_list_tools().await?,
        Some("--help") | Some("-h") | None => print_help(),
        Some(other) => {
            println!("未知命令: {}", other);
            print_help();
        }
    }

    Ok(())
}

/// `analyze` 的選項
#[derive(Debug, Default)]
struct AnalyzeOptions {
    /// 輸出 JSON 報告
    json: bool,
    /// 把流程事件逐行輸出成 JSON（stderr）
    events: bool,
    max_candidates: Option<usize>,
    concurrency: Option<usize>,
    retries: Option<u32>,
    per_minute: Option<u32>,
    download_dir: Option<String>,
}

impl AnalyzeOptions {
    fn parse(args: &[String]) -> Result<Self> {
        let mut options = Self::default();
        let mut iter = args.iter();

        while let Some(arg) = iter.next() {
            let mut value = |flag: &str| {
                iter.next()
                    .map(|v| v.as_str())
                    .with_context(|| format!("{} 需要一個值", flag))
            };

            match arg.as_str() {
                "--json" => options.json = true,
                "--events" => options.events = true,
                "--max-candidates" => options.max_candidates = Some(parse_number(arg, value(arg)?)?),
                "--concurrency" => options.concurrency = Some(parse_number(arg, value(arg)?)?),
                "--retries" => options.retries = Some(parse_number(arg, value(arg)?)?),
                "--per-minute" => options.per_minute = Some(parse_number(arg, value(arg)?)?),
                "--download-dir" => options.download_dir = Some(value(arg)?.to_string()),
                other => bail!("未知選項: {}", other),
            }
        }

        Ok(options)
    }

    fn config(&self) -> AnalyzerConfig {
        let mut config = AnalyzerConfig::new();
        if let Some(dir) = &self.download_dir {
            config = config.with_download_dir(dir);
        }
        if let Some(k) = self.max_candidates {
            config = config.with_max_candidates(k);
        }
        if let Some(concurrency) = self.concurrency {
            config = config.with_download_concurrency(concurrency);
        }
        if let Some(retries) = self.retries {
            config = config.with_download_retries(retries);
        }
        if let Some(per_minute) = self.per_minute {
            config = config.with_comparisons_per_minute(per_minute);
        }
        config
    }
}

fn parse_number<T: std::str::FromStr>(flag: &str, raw: &str) -> Result<T> {
    raw.parse()
        .map_err(|_| anyhow::anyhow!("{} 的值必須是數字: {}", flag, raw))
}

/// 進度條一定有；`--events` 時再把事件送進 channel，由背景任務輸出
fn event_sink(stream: bool) -> (Arc<dyn EventSink>, Option<JoinHandle<()>>) {
    let progress: Arc<dyn EventSink> = Arc::new(ProgressSink::new());
    if !stream {
        return (progress, None);
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<PipelineEvent>();
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(line) => eprintln!("{}", line),
                Err(e) => tracing::warn!(error = %e, "事件無法序列化"),
            }
        }
    });

    let sink = FanoutSink::new(vec![progress, Arc::new(ChannelSink::new(tx))]);
    (Arc::new(sink), Some(printer))
}

fn build_registry(config: AnalyzerConfig, sink: Arc<dyn EventSink>) -> Result<ToolRegistry> {
    let keys = ApiKeys::from_env().context("請在環境變數設定 API key")?;
    let engine = AnalysisEngine::new(config, keys, ServiceEndpoints::default(), sink)?;

    Ok(ToolRegistry::new(Arc::new(engine)))
}

async fn run_analyze(input: &str, options: AnalyzeOptions) -> Result<()> {
    println!("=== InstaFacade 圖片真偽分析 ===\n");

    let (sink, printer) = event_sink(options.events);
    let registry = build_registry(options.config(), sink)?;
    let value = registry
        .call("analyze_image_authenticity", &serde_json::json!({ "image_path_or_url": input }))
        .await?;

    // 關掉最後一個 sender，讓事件輸出跑完
    drop(registry);
    if let Some(printer) = printer {
        printer.await?;
    }

    if options.json {
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    match serde_json::from_value::<types::AnalysisReport>(value.clone()) {
        Ok(report) => report::print_final_verdict(&report),
        Err(_) => println!("{}", report::summarize_results(&value)),
    }

    Ok(())
}

async fn run_summary(path: Option<&str>) -> Result<()> {
    let Some(path) = path else {
        println!("❌ 請提供報告檔案路徑");
        return Ok(());
    };

    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("無法讀取 {}", path))?;
    let value: serde_json::Value =
        serde_json::from_str(&content).with_context(|| format!("無法解析 {}", path))?;

    println!("{}", report::summarize_results(&value));
    Ok(())
}

async fn run_list_tools() -> Result<()> {
    println!("可用操作:");
    for tool in tools::Tool::ALL {
        println!("  {:<28} {}", tool.name(), tool.description());
    }
    Ok(())
}

fn print_help() {
    println!("InstaFacade - 社群圖片盜圖偵測\n");
    println!("用法:");
    println!("  cargo run analyze <path|url>          # 分析圖片");
    println!("  cargo run analyze <path|url> --json   # 輸出 JSON 報告");
    println!("  cargo run analyze <path|url> --events # 流程事件逐行輸出 JSON (stderr)");
    println!("  cargo run summary <report.json>       # 顯示報告摘要");
    println!("  cargo run tools                       # 列出可用操作");
    println!("  cargo run --help                      # 顯示此幫助\n");
    println!("analyze 選項:");
    println!("  --max-candidates <K>   # 最多比對幾張候選圖片 (預設 3)");
    println!("  --concurrency <N>      # 同時下載數 (預設 3，上限 K)");
    println!("  --retries <N>          # 下載重試次數 (預設 1)");
    println!("  --per-minute <N>       # 每分鐘最多比對次數 (預設 30)");
    println!("  --download-dir <DIR>   # 下載目錄 (預設 ./reverse_search_images)\n");
    println!("環境變數:");
    println!("  IMGBB_API_KEY    # ImgBB 圖床");
    println!("  SERPAPI_KEY      # SerpAPI 反向搜尋");
    println!("  OPENAI_API_KEY   # OpenAI 視覺比對");
    println!("  RUST_LOG         # 日誌等級 (預設 info)\n");
    println!("資料檔案:");
    println!("  ./reverse_search_images/run_<id>/          # 候選圖片（分析後保留）");
    println!("  ./reverse_search_images/temp_original_*.jpg # URL 原圖暫存（分析後刪除）");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_analyze_options_feed_config() {
        let options = AnalyzeOptions::parse(&args(&[
            "--json",
            "--max-candidates",
            "5",
            "--concurrency",
            "2",
            "--retries",
            "0",
            "--per-minute",
            "10",
            "--download-dir",
            "/tmp/insta",
        ]))
        .unwrap();
        assert!(options.json);
        assert!(!options.events);

        let config = options.config();
        assert_eq!(config.max_candidates, 5);
        assert_eq!(config.effective_concurrency(), 2);
        assert_eq!(config.download_retries, 0);
        assert_eq!(config.comparisons_per_minute, 10);
        assert_eq!(config.download_dir, std::path::PathBuf::from("/tmp/insta"));
    }

    #[test]
    fn test_analyze_options_defaults_and_errors() {
        let config = AnalyzeOptions::parse(&[]).unwrap().config();
        assert_eq!(config.max_candidates, AnalyzerConfig::default().max_candidates);

        assert!(AnalyzeOptions::parse(&args(&["--max-candidates"])).is_err());
        assert!(AnalyzeOptions::parse(&args(&["--max-candidates", "three"])).is_err());
        assert!(AnalyzeOptions::parse(&args(&["--verbose"])).is_err());
    }

    #[tokio::test]
    async fn test_event_stream_drains_after_senders_drop() {
        let (sink, printer) = event_sink(true);
        let emitter = events::EventEmitter::new("cli-run", sink);
        emitter.emit(events::Stage::Validate, events::Status::Started, serde_json::Value::Null);
        drop(emitter);

        printer.unwrap().await.unwrap();
        assert!(event_sink(false).1.is_none());
    }
}
