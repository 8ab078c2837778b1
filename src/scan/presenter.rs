// 结果展示 - 把识别结果转换成待确认的饮食记录和界面提示

use chrono::{DateTime, Utc};

use super::machine::ScanStateKind;
use crate::analysis::AnalysisResult;
use crate::api::{FoodLogEntry, MealType};

/// 没有识别出标签时使用的食物名称
pub const PLACEHOLDER_FOOD_NAME: &str = "Scanned Food";
/// 默认单份重量（克）
pub const DEFAULT_SERVING_SIZE: f64 = 100.0;
pub const DEFAULT_SERVINGS_CONSUMED: f64 = 1.0;

/// 由识别结果生成饮食记录
pub fn build_entry(result: &AnalysisResult, meal_type: MealType, now: DateTime<Utc>) -> FoodLogEntry {
    let food_name = if result.labels.is_empty() {
        PLACEHOLDER_FOOD_NAME.to_string()
    } else {
        result.labels.join(", ")
    };

    FoodLogEntry {
        food_name,
        serving_size: DEFAULT_SERVING_SIZE,
        servings_consumed: DEFAULT_SERVINGS_CONSUMED,
        calories: result.total_calories,
        proteins: result.total_protein,
        carbs: result.total_carbs,
        fats: result.total_fats,
        meal_type,
        consumed_at: now,
    }
}

/// 界面上显示的状态文字
pub fn status_line(
    state: ScanStateKind,
    attempt: u8,
    max_retries: u8,
    result: Option<&AnalysisResult>,
) -> String {
    match state {
        ScanStateKind::Idle => "Take a photo to analyze calories".to_string(),
        ScanStateKind::Uploading if attempt == 0 => "Analyzing food...".to_string(),
        ScanStateKind::Uploading | ScanStateKind::Retrying => {
            format!("Retrying... ({}/{})", attempt, max_retries)
        }
        ScanStateKind::NotFood => {
            "Sorry, this picture is not food related. Please take a photo of your meal.".to_string()
        }
        ScanStateKind::Failed => {
            "Unable to analyze the image. Please try with a clearer photo.".to_string()
        }
        ScanStateKind::Succeeded => match result {
            Some(result) => format!("{:.0} kcal", result.total_calories),
            None => "Analysis complete".to_string(),
        },
    }
}

/// 命令行下的结果摘要
pub fn render_result(result: &AnalysisResult) -> String {
    let mut lines = vec![
        format!(
            "{}: {:.0} kcal",
            if result.labels.is_empty() {
                PLACEHOLDER_FOOD_NAME.to_string()
            } else {
                result.labels.join(", ")
            },
            result.total_calories
        ),
        format!(
            "protein {:.1} g / carbs {:.1} g / fats {:.1} g",
            result.total_protein, result.total_carbs, result.total_fats
        ),
    ];
    for item in &result.breakdown {
        lines.push(format!("  - {}: {:.0} kcal", item.name, item.calories));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::BreakdownItem;
    use chrono::TimeZone;

    fn pizza() -> AnalysisResult {
        AnalysisResult {
            total_calories: 450.0,
            total_protein: 0.0,
            total_carbs: 0.0,
            total_fats: 0.0,
            labels: vec!["pizza".to_string()],
            breakdown: vec![],
        }
    }

    #[test]
    fn test_build_entry_defaults() {
        let now = Utc.with_ymd_and_hms(2026, 10, 15, 8, 0, 0).unwrap();
        let entry = build_entry(&pizza(), MealType::default(), now);

        assert_eq!(entry.food_name, "pizza");
        assert_eq!(entry.calories, 450.0);
        assert_eq!(entry.serving_size, 100.0);
        assert_eq!(entry.servings_consumed, 1.0);
        assert_eq!(entry.meal_type, MealType::Snack);
        assert_eq!(entry.consumed_at, now);
    }

    #[test]
    fn test_food_name_joins_labels_or_uses_placeholder() {
        let now = Utc::now();
        let mut result = pizza();
        result.labels = vec!["rice".to_string(), "chicken".to_string()];
        assert_eq!(build_entry(&result, MealType::Lunch, now).food_name, "rice, chicken");

        result.labels.clear();
        assert_eq!(
            build_entry(&result, MealType::Lunch, now).food_name,
            PLACEHOLDER_FOOD_NAME
        );
    }

    #[test]
    fn test_status_line() {
        assert_eq!(
            status_line(ScanStateKind::Uploading, 0, 2, None),
            "Analyzing food..."
        );
        assert_eq!(
            status_line(ScanStateKind::Retrying, 1, 2, None),
            "Retrying... (1/2)"
        );
        assert_eq!(
            status_line(ScanStateKind::Succeeded, 0, 2, Some(&pizza())),
            "450 kcal"
        );
    }

    #[test]
    fn test_render_result_lists_breakdown() {
        let mut result = pizza();
        result.breakdown.push(BreakdownItem {
            name: "crust".to_string(),
            calories: 250.0,
        });
        let text = render_result(&result);
        assert!(text.starts_with("pizza: 450 kcal"));
        assert!(text.contains("  - crust: 250 kcal"));
    }
}
