// 图片分析模块 - 调用后端识别接口并对结果分类

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::capture::UploadPayload;

pub mod client;

pub use client::AnalysisClient;

/// 单个食物的热量拆分
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BreakdownItem {
    pub name: String,
    pub calories: f64,
}

/// 识别结果
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub total_calories: f64,
    pub total_protein: f64,
    pub total_carbs: f64,
    pub total_fats: f64,
    pub labels: Vec<String>,
    pub breakdown: Vec<BreakdownItem>,
}

/// 一次分析调用的分类结果
#[derive(Clone, Debug, PartialEq)]
pub enum AnalysisOutcome {
    /// 成功识别
    Recognized(AnalysisResult),
    /// 服务端明确表示图片不是食物，不自动重试
    NotFood { message: Option<String> },
    /// 网络、服务端或解析问题，可以自动重试
    TransientFailure { reason: String },
}

impl AnalysisOutcome {
    pub fn transient(reason: impl Into<String>) -> Self {
        Self::TransientFailure {
            reason: reason.into(),
        }
    }
}

/// 食物图片分析器
#[async_trait]
pub trait FoodAnalyzer: Send + Sync {
    /// 发起一次分析请求（不在内部重试）
    async fn analyze(&self, payload: &UploadPayload) -> AnalysisOutcome;
}

fn number_field(value: &Value, key: &str) -> f64 {
    value.get(key).and_then(|v| v.as_f64()).unwrap_or(0.0)
}

/// 从成功响应中解析识别结果，缺少数值型 total_calories 时返回 None
pub fn parse_analysis_result(value: &Value) -> Option<AnalysisResult> {
    let total_calories = value.get("total_calories")?.as_f64()?;

    let labels = value
        .get("labels")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();

    let breakdown = value
        .get("breakdown")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    Some(BreakdownItem {
                        name: item.get("name")?.as_str()?.to_string(),
                        calories: item.get("calories")?.as_f64()?,
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    Some(AnalysisResult {
        total_calories,
        total_protein: number_field(value, "total_protein"),
        total_carbs: number_field(value, "total_carbs"),
        total_fats: number_field(value, "total_fats"),
        labels,
        breakdown,
    })
}

/// 按状态码和响应体对分析响应分类
pub fn classify_response(status: StatusCode, body: &[u8]) -> AnalysisOutcome {
    let parsed: Option<Value> = serde_json::from_slice(body).ok();

    if status.is_success() {
        return match parsed.as_ref().and_then(parse_analysis_result) {
            Some(result) => AnalysisOutcome::Recognized(result),
            None => AnalysisOutcome::transient("服务端返回的结果缺少有效的 total_calories"),
        };
    }

    if status == StatusCode::BAD_REQUEST {
        if let Some(value) = parsed.as_ref() {
            if value.get("is_food").and_then(|v| v.as_bool()) == Some(false) {
                let message = value
                    .get("message")
                    .or_else(|| value.get("error"))
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string());
                return AnalysisOutcome::NotFood { message };
            }
        }
    }

    let detail = parsed
        .as_ref()
        .and_then(|v| v.get("error"))
        .and_then(|v| v.as_str())
        .map(|s| format!(": {}", s))
        .unwrap_or_default();
    AnalysisOutcome::transient(format!("HTTP {}{}", status.as_u16(), detail))
}
