use crate::analysis::AnalysisEngine;
use crate::report::summarize_results;
use anyhow::{Context, Result, bail};
use serde_json::{Value, json};
use std::sync::Arc;

/// 對外提供的操作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    AnalyzeImageAuthenticity,
    GetVerdictSummary,
    ListAvailableTools,
}

impl Tool {
    /// 註冊順序
    pub const ALL: [Tool; 3] = [
        Tool::AnalyzeImageAuthenticity,
        Tool::GetVerdictSummary,
        Tool::ListAvailableTools,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Tool::AnalyzeImageAuthenticity => "analyze_image_authenticity",
            Tool::GetVerdictSummary => "get_verdict_summary",
            Tool::ListAvailableTools => "list_available_tools",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Tool::AnalyzeImageAuthenticity => {
                "Analyze an image file or URL and report whether it was copied from the web"
            }
            Tool::GetVerdictSummary => "Summarize the result of analyze_image_authenticity",
            Tool::ListAvailableTools => "List the available operations",
        }
    }

    pub fn from_name(name: &str) -> Option<Tool> {
        Self::ALL.into_iter().find(|tool| tool.name() == name)
    }
}

/// 固定的操作表：名稱 -> 處理函式
pub struct ToolRegistry {
    engine: Arc<AnalysisEngine>,
}

impl ToolRegistry {
    pub fn new(engine: Arc<AnalysisEngine>) -> Self {
        Self { engine }
    }

    pub fn names(&self) -> Vec<&'static str> {
        Tool::ALL.iter().map(|tool| tool.name()).collect()
    }

    /// 執行一個操作
    ///
    /// 分析失敗不會變成 `Err`，而是回傳 `{"error": ...}` 給呼叫端；
    /// 只有未知操作或參數錯誤才回 `Err`。
    pub async fn call(&self, name: &str, args: &Value) -> Result<Value> {
        let Some(tool) = Tool::from_name(name) else {
            bail!("未知操作: {} (可用: {})", name, self.names().join(", "));
        };

        match tool {
            Tool::AnalyzeImageAuthenticity => {
                let input = args["image_path_or_url"]
                    .as_str()
                    .context("缺少參數 image_path_or_url")?;

                match self.engine.analyze(input).await {
                    Ok(report) => Ok(serde_json::to_value(report)?),
                    Err(e) => {
                        let root = e.root();
                        tracing::error!(error = %e, kind = root.kind(), "❌ 圖片分析失敗");
                        Ok(json!({
                            "error": format!("Analysis failed: {}", e),
                            "kind": root.kind(),
                            "fatal": root.is_fatal(),
                        }))
                    }
                }
            }
            Tool::GetVerdictSummary => {
                let results = args
                    .get("analysis_results")
                    .context("缺少參數 analysis_results")?;
                Ok(Value::String(summarize_results(results)))
            }
            Tool::ListAvailableTools => Ok(json!(
                Tool::ALL
                    .iter()
                    .map(|tool| json!({ "name": tool.name(), "description": tool.description() }))
                    .collect::<Vec<_>>()
            )),
        }
    }
}
