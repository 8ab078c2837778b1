// 饮食记录接口 - 提交扫描结果和查询当天记录

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use tracing::{error, info};

use super::{ApiClient, FOOD_LOGS_PATH, FOOD_LOG_PATH};
use crate::error::ScanError;

/// 餐次
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MealType {
    Breakfast,
    Lunch,
    Dinner,
    #[default]
    Snack,
}

impl MealType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Breakfast => "breakfast",
            Self::Lunch => "lunch",
            Self::Dinner => "dinner",
            Self::Snack => "snack",
        }
    }
}

impl std::str::FromStr for MealType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "breakfast" => Ok(Self::Breakfast),
            "lunch" => Ok(Self::Lunch),
            "dinner" => Ok(Self::Dinner),
            "snack" => Ok(Self::Snack),
            other => Err(format!("未知的餐次: {}", other)),
        }
    }
}

fn serialize_iso<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// 待提交的饮食记录
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FoodLogEntry {
    pub food_name: String,
    /// 单份重量（克）
    pub serving_size: f64,
    pub servings_consumed: f64,
    pub calories: f64,
    pub proteins: f64,
    pub carbs: f64,
    pub fats: f64,
    pub meal_type: MealType,
    #[serde(serialize_with = "serialize_iso")]
    pub consumed_at: DateTime<Utc>,
}

/// 后端返回的饮食记录
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct LoggedFood {
    #[serde(default)]
    pub id: Option<i64>,
    pub food_name: String,
    #[serde(default)]
    pub calories: f64,
    #[serde(default)]
    pub meal_type: Option<String>,
    #[serde(default)]
    pub consumed_at: Option<String>,
}

impl LoggedFood {
    fn from_entry(entry: &FoodLogEntry) -> Self {
        Self {
            id: None,
            food_name: entry.food_name.clone(),
            calories: entry.calories,
            meal_type: Some(entry.meal_type.as_str().to_string()),
            consumed_at: Some(entry.consumed_at.to_rfc3339_opts(SecondsFormat::Millis, true)),
        }
    }
}

/// 饮食记录提交接口（会话通过它提交，测试中替换为假实现）
#[async_trait]
pub trait FoodLogSink: Send + Sync {
    /// 提交一条记录，只调用一次，不自动重试
    async fn submit(&self, entry: &FoodLogEntry) -> Result<LoggedFood, ScanError>;
}

/// 从错误响应中提取错误信息
fn error_message(status: StatusCode, body: &[u8]) -> String {
    let parsed: Option<Value> = serde_json::from_slice(body).ok();
    let error = parsed
        .as_ref()
        .and_then(|v| v.get("error"))
        .and_then(|v| v.as_str());
    let details = parsed
        .as_ref()
        .and_then(|v| v.get("details"))
        .and_then(|v| v.as_str());

    match (error, details) {
        (Some(error), Some(details)) => format!("{} ({})", error, details),
        (Some(error), None) => error.to_string(),
        _ => format!("HTTP {}", status.as_u16()),
    }
}

/// 解析提交结果
pub fn parse_commit_response(
    status: StatusCode,
    body: &[u8],
    entry: &FoodLogEntry,
) -> Result<LoggedFood, ScanError> {
    if !status.is_success() {
        return Err(ScanError::CommitFailed(error_message(status, body)));
    }

    let logged = serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|v| v.get("food_log").cloned())
        .and_then(|v| serde_json::from_value::<LoggedFood>(v).ok())
        .unwrap_or_else(|| LoggedFood::from_entry(entry));

    Ok(logged)
}

/// 饮食记录客户端
#[derive(Clone)]
pub struct FoodLogClient {
    api: ApiClient,
}

impl FoodLogClient {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// 查询饮食记录（按日期过滤，最新的在前）
    pub async fn list_logs(
        &self,
        date: Option<NaiveDate>,
        limit: u32,
    ) -> anyhow::Result<Vec<LoggedFood>> {
        let mut query = vec![("limit", limit.to_string())];
        if let Some(date) = date {
            query.push(("date", date.format("%Y-%m-%d").to_string()));
        }

        let response = self.api.get(FOOD_LOGS_PATH).query(&query).send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            return Err(anyhow::anyhow!(
                "获取饮食记录失败: {}",
                error_message(status, &body)
            ));
        }

        let value: Value = serde_json::from_slice(&body)?;
        let logs = match value.get("food_logs") {
            Some(logs) => serde_json::from_value(logs.clone())?,
            None => Vec::new(),
        };
        Ok(logs)
    }
}

#[async_trait]
impl FoodLogSink for FoodLogClient {
    async fn submit(&self, entry: &FoodLogEntry) -> Result<LoggedFood, ScanError> {
        info!("提交饮食记录: {} ({} kcal)", entry.food_name, entry.calories);

        let response = self
            .api
            .post(FOOD_LOG_PATH)
            .json(entry)
            .send()
            .await
            .map_err(|e| {
                error!("提交饮食记录网络错误: {}", e);
                ScanError::CommitFailed(e.to_string())
            })?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| ScanError::CommitFailed(e.to_string()))?;

        let result = parse_commit_response(status, &body, entry);
        match &result {
            Ok(logged) => info!("饮食记录已保存: id={:?}", logged.id),
            Err(e) => error!("{}", e),
        }
        result
    }
}
