#![allow(clippy::unwrap_used, clippy::expect_used)]

use auramatic_lib::service::MANDATORY_MESSAGE;
use auramatic_lib::state::SelectionState;
use auramatic_lib::{
    ImportOutcome, RecipeError, RecipeService, SelectOutcome, ServiceEvent, Store,
};
use tempfile::tempdir;

mod util;

async fn service_over(path: &std::path::Path) -> RecipeService {
    RecipeService::new(Store::open(path).await.expect("open seeded db"))
}

#[tokio::test]
async fn selecting_a_recipe_fills_the_cache() {
    let dir = tempdir().unwrap();
    let service = service_over(&util::seeded_db(&dir).await).await;

    let outcome = service.select_recipe(1).await.unwrap();
    let SelectOutcome::Loaded { recipe_id, tasks } = outcome else {
        panic!("selection was not loaded");
    };
    assert_eq!(recipe_id, 1);
    assert_eq!(tasks.len(), 2);
    assert_eq!(service.cached_tasks(1), Some(tasks));
    assert_eq!(service.selection_state(), SelectionState::Ready { recipe_id: 1 });
}

#[tokio::test]
async fn selecting_an_unknown_recipe_is_not_found_and_recoverable() {
    let dir = tempdir().unwrap();
    let service = service_over(&util::seeded_db(&dir).await).await;

    let err = service.select_recipe(42).await.unwrap_err();
    assert_eq!(err, RecipeError::NotFound(42));
    assert!(matches!(
        service.selection_state(),
        SelectionState::Error { recipe_id: 42, .. }
    ));

    service.select_recipe(2).await.unwrap();
    assert_eq!(service.selection_state(), SelectionState::Ready { recipe_id: 2 });
}

#[tokio::test]
async fn quantity_inside_range_is_written_through() {
    let dir = tempdir().unwrap();
    let path = util::seeded_db(&dir).await;
    let service = service_over(&path).await;
    service.select_recipe(1).await.unwrap();

    let outcome = service.update_quantity(1, 10, 5).await.unwrap();
    assert_eq!(outcome.advisory, None);

    assert_eq!(util::stored_quantity(&path, 1, 10).await, 5);
    let cached = service.cached_tasks(1).unwrap();
    assert_eq!(cached.iter().find(|t| t.task_id == 10).unwrap().quantity, 5);
    assert_eq!(cached, service.store().get_resolved_tasks(1).await.unwrap());
}

#[tokio::test]
async fn quantity_outside_range_changes_nothing() {
    let dir = tempdir().unwrap();
    let path = util::seeded_db(&dir).await;
    let service = service_over(&path).await;
    service.select_recipe(1).await.unwrap();

    for quantity in [4, 0, -1, 6] {
        let err = service.update_quantity(1, 10, quantity).await.unwrap_err();
        assert_eq!(err.reason(), "INVALID_QUANTITY");
    }

    assert_eq!(util::stored_quantity(&path, 1, 10).await, 3);
    assert_eq!(service.cached_tasks(1).unwrap()[0].quantity, 3);
}

#[tokio::test]
async fn editing_an_unselected_recipe_is_a_cache_miss() {
    let dir = tempdir().unwrap();
    let path = util::seeded_db(&dir).await;
    let service = service_over(&path).await;

    let err = service.update_quantity(1, 10, 5).await.unwrap_err();
    assert_eq!(
        err,
        RecipeError::CacheMiss {
            recipe_id: 1,
            task_id: 10
        }
    );

    service.select_recipe(1).await.unwrap();
    // Task 12 has the "0" sentinel and is therefore not part of the view.
    let err = service.update_quantity(1, 12, 5).await.unwrap_err();
    assert_eq!(err.reason(), "CACHE_MISS");
    assert_eq!(util::stored_quantity(&path, 1, 10).await, 3);
}

#[tokio::test]
async fn range_is_normalized_before_it_is_stored() {
    let dir = tempdir().unwrap();
    let path = util::seeded_db(&dir).await;
    let service = service_over(&path).await;
    service.select_recipe(1).await.unwrap();

    let outcome = service.update_range(1, 11, "60, 40,x45,40 ").await.unwrap();
    assert_eq!(outcome.advisory, None);

    assert_eq!(util::stored_range(&path, 1, 11).await.as_deref(), Some("40,45,60"));
    let cached = service.cached_tasks(1).unwrap();
    assert_eq!(cached[1].range, "40,45,60");
    assert_eq!(cached, service.store().get_resolved_tasks(1).await.unwrap());
}

#[tokio::test]
async fn giving_an_unconstrained_task_a_range_adds_it_to_the_cached_view() {
    let dir = tempdir().unwrap();
    let path = util::seeded_db(&dir).await;
    let service = service_over(&path).await;
    service.select_recipe(1).await.unwrap();

    // Task 12 is stored with the "0" sentinel and its quantity is 0.
    let outcome = service.update_range(1, 12, "2,4").await.unwrap();
    assert_eq!(
        outcome.advisory.as_deref(),
        Some("Please insert another number in quantity! 0 is not in 2,4")
    );

    let cached = service.cached_tasks(1).unwrap();
    let ids: Vec<i64> = cached.iter().map(|t| t.task_id).collect();
    assert_eq!(ids, vec![10, 11, 12]);
    assert_eq!(cached, service.store().get_resolved_tasks(1).await.unwrap());

    service.update_quantity(1, 12, 2).await.unwrap();
    assert_eq!(util::stored_quantity(&path, 1, 12).await, 2);
    assert_eq!(
        service.cached_tasks(1).unwrap(),
        service.store().get_resolved_tasks(1).await.unwrap()
    );
}

#[tokio::test]
async fn empty_range_is_rejected_without_writing() {
    let dir = tempdir().unwrap();
    let path = util::seeded_db(&dir).await;
    let service = service_over(&path).await;
    service.select_recipe(1).await.unwrap();

    for raw in ["", "   ", "abc", ",,,"] {
        let err = service.update_range(1, 10, raw).await.unwrap_err();
        assert_eq!(err, RecipeError::InvalidRange(MANDATORY_MESSAGE.into()));
    }
    let err = service.update_range(1, 10, "0").await.unwrap_err();
    assert_eq!(err.reason(), "INVALID_RANGE");

    assert_eq!(util::stored_range(&path, 1, 10).await.as_deref(), Some("1,3,5"));
    assert_eq!(service.cached_tasks(1).unwrap()[0].range, "1,3,5");
}

#[tokio::test]
async fn narrowing_a_range_warns_but_keeps_the_quantity() {
    let dir = tempdir().unwrap();
    let path = util::seeded_db(&dir).await;
    let service = service_over(&path).await;
    service.select_recipe(1).await.unwrap();

    let outcome = service.update_range(1, 10, "4,2").await.unwrap();
    assert_eq!(
        outcome.advisory.as_deref(),
        Some("Please insert another number in quantity! 3 is not in 2,4")
    );
    assert_eq!(util::stored_range(&path, 1, 10).await.as_deref(), Some("2,4"));
    assert_eq!(util::stored_quantity(&path, 1, 10).await, 3);

    // The stored quantity is now outside the range and cannot be re-submitted.
    let err = service.update_quantity(1, 10, 3).await.unwrap_err();
    assert_eq!(err.reason(), "INVALID_QUANTITY");
    service.update_quantity(1, 10, 4).await.unwrap();
    assert_eq!(util::stored_quantity(&path, 1, 10).await, 4);
}

#[tokio::test]
async fn advisory_falls_back_to_stored_quantity_when_uncached() {
    let dir = tempdir().unwrap();
    let path = util::seeded_db(&dir).await;
    let service = service_over(&path).await;

    let outcome = service.update_range(2, 10, "4,6").await.unwrap();
    assert_eq!(
        outcome.advisory.as_deref(),
        Some("Please insert another number in quantity! 2 is not in 4,6")
    );
}

#[tokio::test]
async fn range_for_missing_row_is_a_persistence_error() {
    let dir = tempdir().unwrap();
    let service = service_over(&util::seeded_db(&dir).await).await;

    let err = service.update_range(1, 99, "1,2").await.unwrap_err();
    assert_eq!(err.reason(), "PERSISTENCE");
}

#[tokio::test]
async fn import_switches_database_and_clears_cache() {
    let dir = tempdir().unwrap();
    let service = service_over(&util::seeded_db(&dir).await).await;
    let mut events = service.subscribe();
    service.select_recipe(1).await.unwrap();

    let other = util::alternate_db(&dir).await;
    let ImportOutcome::Imported(report) = service.import_database(&other).await.unwrap() else {
        panic!("import was ignored");
    };
    assert_eq!(report.recipes.len(), 1);
    assert_eq!(report.recipes[0].name, "Cappuccino");
    assert_eq!(report.drink_events, 1);
    assert_eq!(report.quantity_events, 0);
    assert_eq!(report.path, other.display().to_string());

    assert!(service.cached_tasks(1).is_none());
    assert_eq!(service.selection_state(), SelectionState::Idle);
    assert_eq!(service.store().path(), Some(other));

    let mut names = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let ServiceEvent::DatabaseImported { import_id, .. } = &event {
            assert_eq!(import_id, &report.import_id);
        }
        names.push(event.name());
    }
    assert_eq!(
        names,
        vec![
            "database-imported",
            "recipe-list",
            "make-drink-data",
            "set-quantity-data"
        ]
    );

    let SelectOutcome::Loaded { tasks, .. } = service.select_recipe(7).await.unwrap() else {
        panic!("selection was not loaded");
    };
    assert_eq!(tasks[0].range, "4,6,8");
}

#[tokio::test]
async fn failed_import_keeps_previous_state() {
    let dir = tempdir().unwrap();
    let path = util::seeded_db(&dir).await;
    let service = service_over(&path).await;
    service.select_recipe(1).await.unwrap();

    let incomplete = util::incomplete_db(&dir).await;
    let err = service.import_database(&incomplete).await.unwrap_err();
    assert_eq!(err.reason(), "IMPORT");

    let garbage = util::garbage_file(&dir);
    let err = service.import_database(&garbage).await.unwrap_err();
    assert_eq!(err.reason(), "IMPORT");

    assert_eq!(service.store().path(), Some(path.clone()));
    assert_eq!(service.cached_tasks(1).unwrap().len(), 2);
    service.update_quantity(1, 10, 1).await.unwrap();
    assert_eq!(util::stored_quantity(&path, 1, 10).await, 1);
}

#[tokio::test]
async fn overlapping_imports_run_once() {
    let dir = tempdir().unwrap();
    let service = service_over(&util::seeded_db(&dir).await).await;
    let other = util::alternate_db(&dir).await;

    let (first, second) = tokio::join!(
        service.import_database(&other),
        service.import_database(&other)
    );
    let outcomes = [first.unwrap(), second.unwrap()];
    let imported = outcomes
        .iter()
        .filter(|o| matches!(o, ImportOutcome::Imported(_)))
        .count();
    let ignored = outcomes
        .iter()
        .filter(|o| matches!(o, ImportOutcome::Ignored))
        .count();
    assert_eq!((imported, ignored), (1, 1));

    // The guard is released once the import finishes.
    let again = service.import_database(&other).await.unwrap();
    assert!(matches!(again, ImportOutcome::Imported(_)));
}

#[tokio::test]
async fn failed_import_releases_the_guard() {
    let dir = tempdir().unwrap();
    let service = service_over(&util::seeded_db(&dir).await).await;

    let missing = dir.path().join("missing.db");
    assert!(service.import_database(&missing).await.is_err());

    let other = util::alternate_db(&dir).await;
    assert!(matches!(
        service.import_database(&other).await.unwrap(),
        ImportOutcome::Imported(_)
    ));
}

#[tokio::test]
async fn later_selection_wins_when_both_run_concurrently() {
    let dir = tempdir().unwrap();
    let service = service_over(&util::seeded_db(&dir).await).await;

    let (first, second) = tokio::join!(service.select_recipe(1), service.select_recipe(2));
    let second = second.unwrap();
    assert!(matches!(second, SelectOutcome::Loaded { recipe_id: 2, .. }));
    assert_eq!(service.selection_state(), SelectionState::Ready { recipe_id: 2 });

    // Whether or not the first load finished before the second began, it
    // never reports an error and never leaves a stale state behind.
    assert!(first.is_ok());
    assert!(service.cached_tasks(2).is_some());
}

#[tokio::test]
async fn drink_stats_count_per_recipe_and_user() {
    let dir = tempdir().unwrap();
    let service = service_over(&util::seeded_db(&dir).await).await;

    let stats = service.drink_stats().await.unwrap();
    assert_eq!(stats.labels, vec!["Espresso", "Latte"]);
    assert_eq!(stats.totals, vec![2, 1]);
    assert_eq!(stats.per_user["User1"], vec![2, 0]);
    assert_eq!(stats.per_user["User2"], vec![0, 1]);
}

#[tokio::test]
async fn announcing_recipes_publishes_the_list() {
    let dir = tempdir().unwrap();
    let service = service_over(&util::seeded_db(&dir).await).await;
    let mut events = service.subscribe();

    let recipes = service.announce_recipes().await.unwrap();
    assert_eq!(recipes.len(), 3);
    match events.recv().await.unwrap() {
        ServiceEvent::RecipeList { recipes: published } => assert_eq!(published, recipes),
        other => panic!("unexpected event {other:?}"),
    }
}
