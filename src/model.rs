use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// `recipe_table.type` of the recipes the machine ships with. Only these are
/// listed; user recipes carry other values.
pub const DEFAULT_RECIPE_KIND: &str = "DEFAULT";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RecipeSummary {
    #[ts(type = "number")]
    pub id: i64,
    pub name: String,
}

/// One task of a recipe joined with its operative quantity and allowed range.
///
/// `range` is always the stored wire form and never empty or `"0"`; tasks
/// without a usable range are not part of the view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ResolvedTask {
    #[ts(type = "number")]
    pub recipe_id: i64,
    #[ts(type = "number")]
    pub task_id: i64,
    pub name: String,
    pub unit: String,
    #[ts(type = "number")]
    pub quantity: i64,
    pub range: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub description: Option<String>,
}

/// A drink the machine prepared, as logged in `make_drink_table`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct DrinkEvent {
    pub user_id: String,
    pub recipe_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub timestamp: Option<String>,
}
