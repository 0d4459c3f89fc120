use crate::types::AnalysisReport;
use serde_json::Value;

/// 產生給人看的結論摘要
pub fn verdict_summary(report: &AnalysisReport) -> String {
    if report.deception_detected {
        format!(
            "🚨 DECEPTION DETECTED! The image appears to be copied from an online source.\n\
             📍 Source: {}\n\
             📄 Title: {}",
            report.matching_source.as_deref().unwrap_or("Unknown source"),
            report.matching_title.as_deref().unwrap_or("N/A"),
        )
    } else {
        format!(
            "✅ No clear deception detected. The image appears to be original or different from the matches found.\n\
             📝 Reason: {}",
            report.reason.as_deref().unwrap_or("analysis completed"),
        )
    }
}

/// 摘要工具的輸入可能是錯誤物件，也可能是報告
pub fn summarize_results(results: &Value) -> String {
    if let Some(error) = results.get("error") {
        let message = error.as_str().map(str::to_string).unwrap_or_else(|| error.to_string());
        return format!("Analysis Error: {}", message);
    }

    match serde_json::from_value::<AnalysisReport>(results.clone()) {
        Ok(report) => verdict_summary(&report),
        Err(e) => format!("Error generating summary: {}", e),
    }
}

/// 最終結論的文字版
///
/// 欄位含中文與 emoji，終端機顯示寬度不固定，所以只畫上下分隔線，不畫右框。
pub fn format_final_verdict(report: &AnalysisReport) -> String {
    let rule = "═".repeat(36);
    let mut lines = vec![rule.clone(), "  🎯 分析結論".to_string(), rule.clone()];

    if report.deception_detected {
        lines.push("  結果:     🚨 盜圖".to_string());
        lines.push(format!("  相符位置: {}", report.matching_image_index.unwrap_or(0)));
    } else {
        lines.push("  結果:     ✅ 未發現".to_string());
    }
    lines.push(format!("  搜尋結果: {}", report.total_matches_found.unwrap_or(0)));
    if let Some(analyzed) = report.candidates_analyzed {
        lines.push(format!("  已比對:   {}", analyzed));
    }
    lines.push(rule);
    lines.push(String::new());
    lines.push(verdict_summary(report));

    lines.join("\n")
}

/// 顯示最終結論
pub fn print_final_verdict(report: &AnalysisReport) {
    println!("\n{}\n", format_final_verdict(report));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MatchCandidate;
    use serde_json::json;

    #[test]
    fn test_summary_for_deception() {
        let candidate = MatchCandidate {
            source: Some("pinterest.com".into()),
            title: Some("Bali sunset".into()),
            ..Default::default()
        };
        let summary = verdict_summary(&AnalysisReport::deception(1, &candidate, 4));
        assert!(summary.contains("DECEPTION DETECTED"));
        assert!(summary.contains("pinterest.com"));
        assert!(summary.contains("Bali sunset"));
    }

    #[test]
    fn test_summary_for_clean_result() {
        let summary = verdict_summary(&AnalysisReport::exhausted(5, 3));
        assert!(summary.contains("No clear deception"));
        assert!(summary.contains("no matching images found in analysis"));
    }

    #[test]
    fn test_summarize_error_and_report_values() {
        assert_eq!(
            summarize_results(&json!({"error": "Analysis failed: boom"})),
            "Analysis Error: Analysis failed: boom"
        );

        let value = serde_json::to_value(AnalysisReport::no_matches()).unwrap();
        assert!(summarize_results(&value).contains("no exact matches"));

        let summary = summarize_results(&json!({"deceptionDetected": true}));
        assert!(summary.contains("Unknown source"));

        assert!(summarize_results(&json!([1, 2])).starts_with("Error generating summary"));
    }

    #[test]
    fn test_final_verdict_layout() {
        let candidate = MatchCandidate {
            source: Some("pinterest.com".into()),
            ..Default::default()
        };
        let text = format_final_verdict(&AnalysisReport::deception(2, &candidate, 7));

        assert!(text.contains("🚨 盜圖"));
        assert!(text.contains("相符位置: 2"));
        assert!(text.contains("搜尋結果: 7"));
        assert!(text.contains("pinterest.com"));
        // 沒有右框，不會因為字寬不同而歪掉
        assert!(text.lines().all(|line| !line.ends_with('║')));

        let text = format_final_verdict(&AnalysisReport::no_matches());
        assert!(text.contains("✅ 未發現"));
        assert!(!text.contains("已比對"));
    }
}
