// 子模組
pub mod types;
pub mod trait_def;
pub mod validator;
pub mod publisher;
pub mod candidates;
pub mod comparator;
pub mod engine;
pub mod services;

// 重新導出常用項目
pub use types::{AnalyzerConfig, ApiKeys, ServiceEndpoints};
pub use engine::AnalysisEngine;
