//! Typed request and response messages exchanged with the UI process.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::model::{RecipeSummary, ResolvedTask};
use crate::service::ImportReport;
use crate::stats::DrinkStats;
use crate::AppError;

pub mod channel;
pub mod server;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(
    tag = "type",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
#[ts(export)]
pub enum Request {
    SelectRecipe {
        #[ts(type = "number")]
        recipe_id: i64,
    },
    UpdateQuantity {
        #[ts(type = "number")]
        recipe_id: i64,
        #[ts(type = "number")]
        task_id: i64,
        #[ts(type = "number")]
        quantity: i64,
    },
    UpdateRange {
        #[ts(type = "number")]
        recipe_id: i64,
        #[ts(type = "number")]
        task_id: i64,
        range: String,
    },
    ImportDatabase {
        #[ts(type = "string")]
        path: PathBuf,
    },
    ListRecipes,
    DrinkStats,
}

impl Request {
    pub fn name(&self) -> &'static str {
        match self {
            Request::SelectRecipe { .. } => "select-recipe",
            Request::UpdateQuantity { .. } => "update-quantity",
            Request::UpdateRange { .. } => "update-range",
            Request::ImportDatabase { .. } => "import-database",
            Request::ListRecipes => "list-recipes",
            Request::DrinkStats => "drink-stats",
        }
    }
}

/// One request line: a correlation id plus the request body.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Envelope {
    pub id: u64,
    #[serde(flatten)]
    pub request: Request,
}

/// One response line, carrying the id of the request it answers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reply {
    pub id: u64,
    #[serde(flatten)]
    pub response: Response,
}

#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[serde(
    tag = "type",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
#[ts(export)]
pub enum Response {
    RecipeData {
        #[ts(type = "number")]
        recipe_id: i64,
        tasks: Vec<ResolvedTask>,
    },
    Superseded {
        #[ts(type = "number")]
        recipe_id: i64,
    },
    UpdateStatus(UpdateStatus),
    Imported {
        report: ImportReport,
    },
    ImportIgnored,
    Recipes {
        recipes: Vec<RecipeSummary>,
    },
    DrinkStats(DrinkStats),
    Failure(Failure),
}

impl Response {
    pub fn is_failure(&self) -> bool {
        match self {
            Response::Failure(_) => true,
            Response::UpdateStatus(status) => !status.success,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UpdateStatus {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub advisory: Option<String>,
}

impl UpdateStatus {
    pub fn saved(advisory: Option<String>) -> Self {
        Self {
            success: true,
            advisory,
            ..Self::default()
        }
    }

    pub fn rejected(err: &AppError) -> Self {
        Self {
            success: false,
            reason: Some(err.code().to_string()),
            message: Some(err.message().to_string()),
            advisory: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Failure {
    pub success: bool,
    pub reason: String,
    pub message: String,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, String>,
}

impl From<AppError> for Failure {
    fn from(err: AppError) -> Self {
        Self {
            success: false,
            reason: err.code().to_string(),
            message: err.message().to_string(),
            context: err.context().clone(),
        }
    }
}

impl From<AppError> for Response {
    fn from(err: AppError) -> Self {
        Response::Failure(err.into())
    }
}
