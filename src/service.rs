//! Recipe selection, validated edits and database import.
//!
//! Every operation here returns a typed outcome or a [`RecipeError`]; storage
//! failures are translated at this boundary and never leak as `sqlx` errors.

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{info, warn};
use ts_rs::TS;
use uuid::Uuid;

use crate::cache::RecipeCache;
use crate::events::ServiceEvent;
use crate::model::{RecipeSummary, ResolvedTask};
use crate::range::{self, RangeSet};
use crate::state::{ImportGuard, SelectionState, SelectionTicket, SelectionTracker};
use crate::stats::{self, DrinkStats};
use crate::store::{Store, StoreError, StoreResult};
use crate::time::now_ms;
use crate::AppError;

const EVENT_BUFFER: usize = 64;

pub const MANDATORY_MESSAGE: &str = "This field is mandatory";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecipeError {
    #[error("database unavailable: {0}")]
    Connection(String),
    #[error("recipe {0} not found")]
    NotFound(i64),
    #[error("recipe {recipe_id} task {task_id} is not loaded; select the recipe first")]
    CacheMiss { recipe_id: i64, task_id: i64 },
    #[error("{quantity} is not an allowed quantity (allowed: {allowed})")]
    InvalidQuantity { quantity: i64, allowed: String },
    #[error("{0}")]
    InvalidRange(String),
    #[error("could not save change: {0}")]
    Persistence(String),
    #[error("import failed: {0}")]
    Import(String),
}

impl RecipeError {
    /// Reason code carried on the wire.
    pub fn reason(&self) -> &'static str {
        match self {
            RecipeError::Connection(_) => "CONNECTION",
            RecipeError::NotFound(_) => "NOT_FOUND",
            RecipeError::CacheMiss { .. } => "CACHE_MISS",
            RecipeError::InvalidQuantity { .. } => "INVALID_QUANTITY",
            RecipeError::InvalidRange(_) => "INVALID_RANGE",
            RecipeError::Persistence(_) => "PERSISTENCE",
            RecipeError::Import(_) => "IMPORT",
        }
    }

    /// Rejections caused by the request itself rather than by storage.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            RecipeError::CacheMiss { .. }
                | RecipeError::InvalidQuantity { .. }
                | RecipeError::InvalidRange(_)
                | RecipeError::NotFound(_)
        )
    }

    fn from_read(err: StoreError) -> Self {
        match err {
            StoreError::RecipeNotFound(id) => RecipeError::NotFound(id),
            other => RecipeError::Connection(other.to_string()),
        }
    }

    fn from_write(err: StoreError) -> Self {
        match err {
            StoreError::NotOpen => RecipeError::Connection(err.to_string()),
            other => RecipeError::Persistence(other.to_string()),
        }
    }
}

impl From<RecipeError> for AppError {
    fn from(err: RecipeError) -> Self {
        let app = AppError::new(err.reason(), err.to_string());
        match &err {
            RecipeError::NotFound(recipe_id) => app.with_context("recipe_id", recipe_id.to_string()),
            RecipeError::CacheMiss { recipe_id, task_id } => app
                .with_context("recipe_id", recipe_id.to_string())
                .with_context("task_id", task_id.to_string()),
            RecipeError::InvalidQuantity { quantity, allowed } => app
                .with_context("quantity", quantity.to_string())
                .with_context("allowed", allowed.clone()),
            _ => app,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectOutcome {
    Loaded {
        recipe_id: i64,
        tasks: Vec<ResolvedTask>,
    },
    /// A newer selection started before this one finished; its result was
    /// dropped.
    Superseded { recipe_id: i64 },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateOutcome {
    /// Set when a saved range no longer admits the task's current quantity.
    pub advisory: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ImportReport {
    pub import_id: String,
    pub path: String,
    #[ts(type = "number")]
    pub imported_at: i64,
    pub recipes: Vec<RecipeSummary>,
    #[ts(type = "number")]
    pub drink_events: u64,
    #[ts(type = "number")]
    pub quantity_events: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    Imported(ImportReport),
    /// Another import was already running.
    Ignored,
}

struct Inner {
    store: Store,
    cache: Mutex<RecipeCache>,
    selection: SelectionTracker,
    importing: Arc<AtomicBool>,
    events: broadcast::Sender<ServiceEvent>,
}

#[derive(Clone)]
pub struct RecipeService {
    inner: Arc<Inner>,
}

impl RecipeService {
    pub fn new(store: Store) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            inner: Arc::new(Inner {
                store,
                cache: Mutex::new(RecipeCache::new()),
                selection: SelectionTracker::new(),
                importing: Arc::new(AtomicBool::new(false)),
                events,
            }),
        }
    }

    pub fn store(&self) -> &Store {
        &self.inner.store
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServiceEvent> {
        self.inner.events.subscribe()
    }

    pub fn selection_state(&self) -> SelectionState {
        self.inner.selection.state()
    }

    pub fn cached_tasks(&self, recipe_id: i64) -> Option<Vec<ResolvedTask>> {
        self.cache().get(recipe_id).map(<[ResolvedTask]>::to_vec)
    }

    fn cache(&self) -> MutexGuard<'_, RecipeCache> {
        self.inner.cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn publish(&self, event: ServiceEvent) {
        let name = event.name();
        // No receivers is fine; nobody is listening yet.
        let _ = self.inner.events.send(event);
        tracing::debug!(target: "auramatic", event = "service_event", name = name);
    }

    pub async fn select_recipe(&self, recipe_id: i64) -> Result<SelectOutcome, RecipeError> {
        let ticket = self.begin_selection(recipe_id);
        let loaded = self.inner.store.get_resolved_tasks(recipe_id).await;
        self.finish_selection(ticket, loaded)
    }

    pub(crate) fn begin_selection(&self, recipe_id: i64) -> SelectionTicket {
        self.inner.selection.begin(recipe_id)
    }

    pub(crate) fn finish_selection(
        &self,
        ticket: SelectionTicket,
        loaded: StoreResult<Vec<ResolvedTask>>,
    ) -> Result<SelectOutcome, RecipeError> {
        let recipe_id = ticket.recipe_id;
        match loaded {
            Ok(tasks) => {
                let published = self.inner.selection.complete(&ticket, None, || {
                    self.cache().put(recipe_id, tasks.clone());
                });
                if published.is_none() {
                    info!(
                        target: "auramatic",
                        event = "selection_superseded",
                        recipe_id,
                        generation = ticket.generation
                    );
                    return Ok(SelectOutcome::Superseded { recipe_id });
                }
                info!(
                    target: "auramatic",
                    event = "recipe_selected",
                    recipe_id,
                    tasks = tasks.len()
                );
                Ok(SelectOutcome::Loaded { recipe_id, tasks })
            }
            Err(err) => {
                let err = RecipeError::from_read(err);
                let reason = err.reason().to_string();
                if self.inner.selection.complete(&ticket, Some(reason), || ()).is_none() {
                    return Ok(SelectOutcome::Superseded { recipe_id });
                }
                Err(err)
            }
        }
    }

    /// Persist a new operative quantity. The value must be a member of the
    /// task's cached allowed range.
    pub async fn update_quantity(
        &self,
        recipe_id: i64,
        task_id: i64,
        quantity: i64,
    ) -> Result<UpdateOutcome, RecipeError> {
        let allowed = {
            let cache = self.cache();
            let task = cache
                .task(recipe_id, task_id)
                .ok_or(RecipeError::CacheMiss { recipe_id, task_id })?;
            range::normalize(&task.range)
        };

        if allowed.is_empty() || !allowed.contains(quantity) {
            return Err(RecipeError::InvalidQuantity {
                quantity,
                allowed: allowed.serialize(),
            });
        }

        self.inner
            .store
            .set_quantity(recipe_id, task_id, quantity)
            .await
            .map_err(RecipeError::from_write)?;

        self.cache().update_quantity(recipe_id, task_id, quantity);
        info!(
            target: "auramatic",
            event = "quantity_updated",
            recipe_id,
            task_id,
            quantity
        );
        Ok(UpdateOutcome::default())
    }

    /// Normalize and persist an allowed range.
    ///
    /// The quantity is left as stored even when the new range excludes it;
    /// the outcome then carries an advisory instead.
    pub async fn update_range(
        &self,
        recipe_id: i64,
        task_id: i64,
        raw: &str,
    ) -> Result<UpdateOutcome, RecipeError> {
        let set = range::normalize(raw);
        if set.is_empty() {
            return Err(RecipeError::InvalidRange(MANDATORY_MESSAGE.to_string()));
        }
        if set.is_no_constraint() {
            return Err(RecipeError::InvalidRange(format!(
                "\"{}\" is reserved for tasks without a range",
                range::NO_CONSTRAINT
            )));
        }

        let serialized = set.serialize();
        self.inner
            .store
            .set_range(recipe_id, task_id, &serialized)
            .await
            .map_err(RecipeError::from_write)?;

        let stale = {
            let mut cache = self.cache();
            !cache.update_range(recipe_id, task_id, &serialized) && cache.contains_recipe(recipe_id)
        };
        if stale {
            // The task had no usable range when the recipe was loaded, so it
            // only now joins the resolved view.
            self.reload_cached(recipe_id).await;
        }
        let cached_quantity = self.cache().task(recipe_id, task_id).map(|task| task.quantity);
        info!(
            target: "auramatic",
            event = "range_updated",
            recipe_id,
            task_id,
            range = %serialized
        );

        let current = match cached_quantity {
            Some(quantity) => Some(quantity),
            None => match self.inner.store.current_quantity(recipe_id, task_id).await {
                Ok(quantity) => quantity,
                Err(err) => {
                    warn!(
                        target: "auramatic",
                        event = "range_advisory_skipped",
                        recipe_id,
                        task_id,
                        error = %err
                    );
                    None
                }
            },
        };

        Ok(UpdateOutcome {
            advisory: current.and_then(|quantity| advisory_for(quantity, &set)),
        })
    }

    /// Refresh a cached recipe from the store. A recipe that was evicted in
    /// the meantime stays evicted; a failed read evicts it.
    async fn reload_cached(&self, recipe_id: i64) {
        match self.inner.store.get_resolved_tasks(recipe_id).await {
            Ok(tasks) => {
                let mut cache = self.cache();
                if cache.contains_recipe(recipe_id) {
                    cache.put(recipe_id, tasks);
                }
            }
            Err(err) => {
                warn!(
                    target: "auramatic",
                    event = "cache_reload_failed",
                    recipe_id,
                    error = %err
                );
                self.cache().remove(recipe_id);
            }
        }
    }

    /// Switch to the database at `path`.
    ///
    /// Only one import runs at a time; a call made while one is running
    /// returns [`ImportOutcome::Ignored`] and leaves the running import alone.
    pub async fn import_database(&self, path: &Path) -> Result<ImportOutcome, RecipeError> {
        let Some(_guard) = ImportGuard::try_begin(self.inner.importing.clone()) else {
            info!(
                target: "auramatic",
                event = "import_ignored",
                path = %path.display()
            );
            return Ok(ImportOutcome::Ignored);
        };

        let started = Instant::now();
        info!(target: "auramatic", event = "import_started", path = %path.display());

        match self.stage_and_switch(path).await {
            Ok(report) => {
                info!(
                    target: "auramatic",
                    event = "import_completed",
                    import_id = %report.import_id,
                    path = %report.path,
                    recipes = report.recipes.len(),
                    drink_events = report.drink_events,
                    elapsed_ms = started.elapsed().as_millis() as u64
                );
                Ok(ImportOutcome::Imported(report))
            }
            Err(err) => {
                warn!(
                    target: "auramatic",
                    event = "import_failed",
                    path = %path.display(),
                    error = %err
                );
                Err(RecipeError::Import(err.to_string()))
            }
        }
    }

    async fn stage_and_switch(&self, path: &Path) -> StoreResult<ImportReport> {
        let staged = Store::stage(path).await?;
        let loaded = async {
            let recipes = staged.list_default_recipes().await?;
            let drinks = staged.list_drink_events().await?;
            let quantities = staged.list_quantity_events().await?;
            StoreResult::Ok((recipes, drinks, quantities))
        }
        .await;
        let (recipes, drinks, quantities) = match loaded {
            Ok(loaded) => loaded,
            Err(err) => {
                staged.close().await;
                return Err(err);
            }
        };

        let path: PathBuf = staged.path().to_path_buf();
        self.inner.store.promote(staged).await;
        self.inner.selection.reset(|| self.cache().clear());

        let report = ImportReport {
            import_id: Uuid::now_v7().to_string(),
            path: path.display().to_string(),
            imported_at: now_ms(),
            recipes: recipes.clone(),
            drink_events: drinks.len() as u64,
            quantity_events: quantities.len() as u64,
        };

        self.publish(ServiceEvent::DatabaseImported {
            import_id: report.import_id.clone(),
            path: report.path.clone(),
        });
        self.publish(ServiceEvent::RecipeList { recipes });
        self.publish(ServiceEvent::MakeDrinkData { events: drinks });
        self.publish(ServiceEvent::SetQuantityData { rows: quantities });
        Ok(report)
    }

    pub async fn list_recipes(&self) -> Result<Vec<RecipeSummary>, RecipeError> {
        self.inner
            .store
            .list_default_recipes()
            .await
            .map_err(RecipeError::from_read)
    }

    /// Publish the current recipe list to subscribers and return it.
    pub async fn announce_recipes(&self) -> Result<Vec<RecipeSummary>, RecipeError> {
        let recipes = self.list_recipes().await?;
        self.publish(ServiceEvent::RecipeList {
            recipes: recipes.clone(),
        });
        Ok(recipes)
    }

    pub async fn drink_stats(&self) -> Result<DrinkStats, RecipeError> {
        let events = self
            .inner
            .store
            .list_drink_events()
            .await
            .map_err(RecipeError::from_read)?;
        Ok(stats::aggregate(&events))
    }
}

fn advisory_for(quantity: i64, allowed: &RangeSet) -> Option<String> {
    if allowed.contains(quantity) {
        return None;
    }
    let message = format!(
        "Please insert another number in quantity! {quantity} is not in {}",
        allowed.serialize()
    );
    warn!(target: "auramatic", event = "range_advisory", quantity, allowed = %allowed);
    Some(message)
}
