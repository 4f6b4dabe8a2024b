//! In-memory implementation of the click counter store.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;

use crate::domain::event::LinkId;
use crate::domain::repositories::ClickRepository;
use crate::error::AppError;

/// Click counters kept in process memory.
///
/// Counts are bucketed per link per UTC calendar day, one counter per bucket
/// incremented in place.
#[derive(Default)]
pub struct MemoryClickRepository {
    daily: Mutex<HashMap<(LinkId, NaiveDate), u64>>,
}

impl MemoryClickRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total clicks recorded for `link_id` across all days.
    pub fn total_clicks(&self, link_id: LinkId) -> u64 {
        self.daily
            .lock()
            .iter()
            .filter(|((id, _), _)| *id == link_id)
            .map(|(_, count)| count)
            .sum()
    }

    /// Clicks recorded for `link_id` on `date`.
    pub fn clicks_on(&self, link_id: LinkId, date: NaiveDate) -> u64 {
        self.daily
            .lock()
            .get(&(link_id, date))
            .copied()
            .unwrap_or(0)
    }

    /// Total clicks per link.
    pub fn totals(&self) -> HashMap<LinkId, u64> {
        let mut totals = HashMap::new();
        for ((link_id, _), count) in self.daily.lock().iter() {
            *totals.entry(*link_id).or_insert(0) += count;
        }
        totals
    }
}

#[async_trait]
impl ClickRepository for MemoryClickRepository {
    async fn increment_click_count(&self, link_id: LinkId) -> Result<(), AppError> {
        let today = Utc::now().date_naive();
        *self.daily.lock().entry((link_id, today)).or_insert(0) += 1;
        Ok(())
    }
}
