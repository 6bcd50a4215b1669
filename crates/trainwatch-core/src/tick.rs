//! The reconciliation engine: buffered ingest, fixed-period apply, and the
//! staleness sweep.
//!
//! Inbound batches are only *buffered* when they arrive. Each call to
//! [`ReconciliationEngine::tick`] drains the buffer (one update per entity,
//! the most recently received one), applies it through the
//! [`EntityStore`], then sweeps every known entity for staleness whether
//! or not anything arrived. Interpolation frames are stepped separately by
//! [`ReconciliationEngine::step_frames`].

use std::collections::BTreeMap;

use tracing::{debug, info};
use trainwatch_types::{EntityDetails, EntityId, PositionUpdate, RenderEvent};

use crate::config::EngineSettings;
use crate::store::EntityStore;

/// Maximum number of ids returned by [`ReconciliationEngine::search`].
pub const SEARCH_LIMIT: usize = 10;

/// Case-insensitive substring match of `query` against `ids`, keeping at
/// most [`SEARCH_LIMIT`] hits in iteration order. A blank query matches
/// everything.
pub fn search_ids<'a, I>(ids: I, query: &str) -> Vec<EntityId>
where
    I: IntoIterator<Item = &'a EntityId>,
{
    let needle = query.trim().to_lowercase();
    ids.into_iter()
        .filter(|id| needle.is_empty() || id.as_str().to_lowercase().contains(&needle))
        .take(SEARCH_LIMIT)
        .cloned()
        .collect()
}

/// Summary of a single reconciliation tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickSummary {
    /// The tick number that was executed (first tick is 1).
    pub tick: u64,
    /// Updates applied this tick (one per entity at most).
    pub applied: u32,
    /// Entities created this tick.
    pub created: u32,
    /// Entities evicted by the staleness sweep.
    pub evicted: Vec<EntityId>,
    /// Render events in the order they were produced.
    pub events: Vec<RenderEvent>,
    /// Live entities at the end of the tick.
    pub live: u32,
}

/// Owner of the entity store and everything that mutates it.
#[derive(Debug, Clone)]
pub struct ReconciliationEngine {
    settings: EngineSettings,
    store: EntityStore,
    inbox: BTreeMap<EntityId, PositionUpdate>,
    tick: u64,
    selected: Option<EntityId>,
}

impl ReconciliationEngine {
    /// Create an engine with an empty store.
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            settings,
            store: EntityStore::new(),
            inbox: BTreeMap::new(),
            tick: 0,
            selected: None,
        }
    }

    /// Buffer a batch for the next tick.
    ///
    /// A later update for the same entity replaces an earlier one still
    /// waiting in the buffer.
    pub fn buffer<I>(&mut self, batch: I)
    where
        I: IntoIterator<Item = PositionUpdate>,
    {
        for update in batch {
            self.inbox.insert(update.entity_id.clone(), update);
        }
    }

    /// Number of entities with an update waiting for the next tick.
    pub fn pending(&self) -> usize {
        self.inbox.len()
    }

    /// Run one reconciliation tick at wall-clock `now_ms`.
    pub fn tick(&mut self, now_ms: i64) -> TickSummary {
        self.tick = self.tick.saturating_add(1);
        let mut summary = TickSummary {
            tick: self.tick,
            ..TickSummary::default()
        };

        for (_, update) in std::mem::take(&mut self.inbox) {
            let event = self.store.apply(update, now_ms, &self.settings);
            if matches!(event, RenderEvent::Created { .. }) {
                summary.created = summary.created.saturating_add(1);
            }
            summary.applied = summary.applied.saturating_add(1);
            summary.events.push(event);
        }

        let evicted = self.store.sweep_stale(now_ms, self.settings.stale_after_ms);
        for id in &evicted {
            info!(entity = %id, "Evicted stale entity");
            if self.selected.as_ref() == Some(id) {
                self.selected = None;
            }
            summary.events.push(RenderEvent::Removed { id: id.clone() });
        }
        summary.evicted = evicted;
        summary.live = u32::try_from(self.store.len()).unwrap_or(u32::MAX);

        if summary.applied > 0 || !summary.evicted.is_empty() {
            debug!(
                tick = summary.tick,
                applied = summary.applied,
                created = summary.created,
                evicted = summary.evicted.len(),
                live = summary.live,
                "Reconciliation tick"
            );
        }
        summary
    }

    /// Step every running interpolation to `now_ms`.
    pub fn step_frames(&mut self, now_ms: i64) -> Vec<RenderEvent> {
        self.store.step_interpolations(now_ms)
    }

    /// Cancel every running interpolation, optionally snapping markers to
    /// their targets. Used when the viewport changes under the markers.
    pub fn cancel_all_interpolations(&mut self, snap_to_target: bool) -> Vec<RenderEvent> {
        self.store.cancel_all(snap_to_target)
    }

    /// Select a live entity. Returns its details, or `None` if unknown
    /// (the previous selection is kept in that case).
    pub fn select(&mut self, id: &EntityId) -> Option<EntityDetails> {
        let details = self.store.get(id)?.details();
        self.selected = Some(id.clone());
        Some(details)
    }

    /// Clear the selection.
    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    /// Details of the selected entity, if one is selected and still live.
    pub fn selection(&self) -> Option<EntityDetails> {
        self.selected
            .as_ref()
            .and_then(|id| self.store.get(id))
            .map(crate::store::EntityState::details)
    }

    /// Details of any live entity.
    pub fn details(&self, id: &EntityId) -> Option<EntityDetails> {
        self.store.get(id).map(crate::store::EntityState::details)
    }

    /// Live entity ids, sorted.
    pub fn entity_ids(&self) -> Vec<EntityId> {
        self.store.ids().cloned().collect()
    }

    /// Case-insensitive substring search over live ids, at most
    /// [`SEARCH_LIMIT`] results in sorted order.
    pub fn search(&self, query: &str) -> Vec<EntityId> {
        search_ids(self.store.ids(), query)
    }

    /// The entity store, read-only.
    pub const fn store(&self) -> &EntityStore {
        &self.store
    }

    /// Number of ticks executed so far.
    pub const fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Active settings.
    pub const fn settings(&self) -> &EngineSettings {
        &self.settings
    }
}
