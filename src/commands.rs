use std::time::Instant;

use crate::{
    ipc::{Request, Response, UpdateStatus},
    service::{ImportOutcome, RecipeService, SelectOutcome},
    AppError,
};

fn log_command_start(cmd: &'static str, recipe_id: Option<i64>) {
    tracing::debug!(target: "auramatic", cmd, recipe_id, "ipc_enter");
}

fn log_command_success(cmd: &'static str, start: Instant, recipe_id: Option<i64>) {
    tracing::info!(
        target: "auramatic",
        cmd,
        recipe_id,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "ipc_success"
    );
}

fn log_command_error(cmd: &'static str, start: Instant, recipe_id: Option<i64>, err: &AppError) {
    let elapsed_ms = start.elapsed().as_millis() as u64;
    if is_validation_error(err.code()) {
        tracing::warn!(
            target: "auramatic",
            cmd,
            recipe_id,
            code = err.code(),
            message = err.message(),
            elapsed_ms,
            "ipc_failure"
        );
    } else {
        tracing::error!(
            target: "auramatic",
            cmd,
            recipe_id,
            code = err.code(),
            message = err.message(),
            elapsed_ms,
            "ipc_failure"
        );
    }
}

fn is_validation_error(code: &str) -> bool {
    matches!(
        code,
        "CACHE_MISS" | "INVALID_QUANTITY" | "INVALID_RANGE" | "NOT_FOUND" | "INVALID_REQUEST"
    )
}

fn recipe_of(request: &Request) -> Option<i64> {
    match request {
        Request::SelectRecipe { recipe_id }
        | Request::UpdateQuantity { recipe_id, .. }
        | Request::UpdateRange { recipe_id, .. } => Some(*recipe_id),
        _ => None,
    }
}

/// Execute one request against the service and shape its outcome for the wire.
pub async fn handle(service: &RecipeService, request: Request) -> Response {
    let cmd = request.name();
    let recipe_id = recipe_of(&request);
    let start = Instant::now();
    log_command_start(cmd, recipe_id);

    let result: Result<Response, AppError> = match request {
        Request::SelectRecipe { recipe_id } => service
            .select_recipe(recipe_id)
            .await
            .map(|outcome| match outcome {
                SelectOutcome::Loaded { recipe_id, tasks } => {
                    Response::RecipeData { recipe_id, tasks }
                }
                SelectOutcome::Superseded { recipe_id } => Response::Superseded { recipe_id },
            })
            .map_err(AppError::from),
        Request::UpdateQuantity {
            recipe_id,
            task_id,
            quantity,
        } => service
            .update_quantity(recipe_id, task_id, quantity)
            .await
            .map(|outcome| Response::UpdateStatus(UpdateStatus::saved(outcome.advisory)))
            .map_err(AppError::from),
        Request::UpdateRange {
            recipe_id,
            task_id,
            range,
        } => service
            .update_range(recipe_id, task_id, &range)
            .await
            .map(|outcome| Response::UpdateStatus(UpdateStatus::saved(outcome.advisory)))
            .map_err(AppError::from),
        Request::ImportDatabase { path } => service
            .import_database(&path)
            .await
            .map(|outcome| match outcome {
                ImportOutcome::Imported(report) => Response::Imported { report },
                ImportOutcome::Ignored => Response::ImportIgnored,
            })
            .map_err(AppError::from),
        Request::ListRecipes => service
            .list_recipes()
            .await
            .map(|recipes| Response::Recipes { recipes })
            .map_err(AppError::from),
        Request::DrinkStats => service
            .drink_stats()
            .await
            .map(Response::DrinkStats)
            .map_err(AppError::from),
    };

    match result {
        Ok(response) => {
            log_command_success(cmd, start, recipe_id);
            response
        }
        Err(err) => {
            log_command_error(cmd, start, recipe_id, &err);
            if matches!(cmd, "update-quantity" | "update-range") {
                Response::UpdateStatus(UpdateStatus::rejected(&err))
            } else {
                Response::from(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    #[tokio::test]
    async fn edits_without_selection_report_cache_miss_status() {
        let service = RecipeService::new(Store::new());
        let response = handle(
            &service,
            Request::UpdateQuantity {
                recipe_id: 1,
                task_id: 2,
                quantity: 3,
            },
        )
        .await;
        assert_eq!(
            response,
            Response::UpdateStatus(UpdateStatus {
                success: false,
                reason: Some("CACHE_MISS".into()),
                message: Some(
                    "recipe 1 task 2 is not loaded; select the recipe first".into()
                ),
                advisory: None,
            })
        );
    }

    #[tokio::test]
    async fn reads_without_database_fail_with_connection() {
        let service = RecipeService::new(Store::new());
        let response = handle(&service, Request::ListRecipes).await;
        match response {
            Response::Failure(failure) => assert_eq!(failure.reason, "CONNECTION"),
            other => panic!("unexpected response {other:?}"),
        }
    }
}
