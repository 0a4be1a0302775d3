use std::collections::HashMap;

use crate::model::ResolvedTask;

/// Per-recipe copy of the resolved task view.
///
/// The cache is never the source of truth. Edits are written to the store
/// first and only then mirrored here, so a crash in between leaves the cache
/// stale rather than the store wrong. The only read that trusts the cache is
/// the range membership check of a quantity edit.
#[derive(Debug, Default)]
pub struct RecipeCache {
    entries: HashMap<i64, Vec<ResolvedTask>>,
}

impl RecipeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace whatever was cached for `recipe_id`.
    pub fn put(&mut self, recipe_id: i64, tasks: Vec<ResolvedTask>) {
        self.entries.insert(recipe_id, tasks);
    }

    pub fn get(&self, recipe_id: i64) -> Option<&[ResolvedTask]> {
        self.entries.get(&recipe_id).map(Vec::as_slice)
    }

    pub fn task(&self, recipe_id: i64, task_id: i64) -> Option<&ResolvedTask> {
        self.entries
            .get(&recipe_id)
            .and_then(|tasks| tasks.iter().find(|task| task.task_id == task_id))
    }

    fn task_mut(&mut self, recipe_id: i64, task_id: i64) -> Option<&mut ResolvedTask> {
        self.entries
            .get_mut(&recipe_id)
            .and_then(|tasks| tasks.iter_mut().find(|task| task.task_id == task_id))
    }

    /// Mirror a stored quantity. Uncached recipes or tasks are ignored.
    pub fn update_quantity(&mut self, recipe_id: i64, task_id: i64, quantity: i64) {
        if let Some(task) = self.task_mut(recipe_id, task_id) {
            task.quantity = quantity;
        }
    }

    /// Mirror a stored range. Returns `false` when the task is not cached,
    /// in which case nothing changes.
    pub fn update_range(&mut self, recipe_id: i64, task_id: i64, range: &str) -> bool {
        match self.task_mut(recipe_id, task_id) {
            Some(task) => {
                task.range = range.to_string();
                true
            }
            None => false,
        }
    }

    pub fn contains_recipe(&self, recipe_id: i64) -> bool {
        self.entries.contains_key(&recipe_id)
    }

    pub fn remove(&mut self, recipe_id: i64) -> Option<Vec<ResolvedTask>> {
        self.entries.remove(&recipe_id)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
