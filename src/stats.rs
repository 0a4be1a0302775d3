//! Drink counts per recipe, overall and per user.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use ts_rs::TS;

use crate::model::DrinkEvent;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct DrinkStats {
    /// Recipe names in the order they first appear in the log.
    pub labels: Vec<String>,
    /// Drinks per label.
    #[ts(type = "number[]")]
    pub totals: Vec<u64>,
    /// `User<id>` keys in the order they first appear.
    pub users: Vec<String>,
    /// Drinks per label for each user, aligned with `labels`.
    #[ts(type = "Record<string, number[]>")]
    pub per_user: BTreeMap<String, Vec<u64>>,
    #[ts(type = "number")]
    pub total_events: u64,
}

pub fn user_key(user_id: &str) -> String {
    format!("User{user_id}")
}

pub fn aggregate(events: &[DrinkEvent]) -> DrinkStats {
    let mut stats = DrinkStats::default();
    let mut label_index: HashMap<&str, usize> = HashMap::new();

    for event in events {
        let idx = *label_index
            .entry(event.recipe_name.as_str())
            .or_insert_with(|| {
                stats.labels.push(event.recipe_name.clone());
                stats.totals.push(0);
                stats.labels.len() - 1
            });
        stats.totals[idx] += 1;

        let user = user_key(&event.user_id);
        if !stats.per_user.contains_key(&user) {
            stats.users.push(user.clone());
        }
        let counts = stats.per_user.entry(user).or_default();
        if counts.len() <= idx {
            counts.resize(idx + 1, 0);
        }
        counts[idx] += 1;
        stats.total_events += 1;
    }

    let width = stats.labels.len();
    for counts in stats.per_user.values_mut() {
        counts.resize(width, 0);
    }
    stats
}
