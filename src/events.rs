use serde::Serialize;
use serde_json::Value;
use ts_rs::TS;

use crate::model::{DrinkEvent, RecipeSummary};

/// Notifications pushed to listeners without a matching request.
#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[serde(
    tag = "event",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
#[ts(export)]
pub enum ServiceEvent {
    RecipeList {
        recipes: Vec<RecipeSummary>,
    },
    DatabaseImported {
        import_id: String,
        path: String,
    },
    MakeDrinkData {
        events: Vec<DrinkEvent>,
    },
    SetQuantityData {
        #[ts(type = "Array<Record<string, unknown>>")]
        rows: Vec<Value>,
    },
}

impl ServiceEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ServiceEvent::RecipeList { .. } => "recipe-list",
            ServiceEvent::DatabaseImported { .. } => "database-imported",
            ServiceEvent::MakeDrinkData { .. } => "make-drink-data",
            ServiceEvent::SetQuantityData { .. } => "set-quantity-data",
        }
    }
}
