//! The entity store: one owned [`EntityState`] per live entity.
//!
//! The store is the only place entities are created, updated, and
//! destroyed. Position, speed, trail, and the active interpolation live
//! together in one record so they cannot drift apart.

use std::collections::BTreeMap;

use trainwatch_geo::speed_between_kmh;
use trainwatch_types::{Coordinate, EntityDetails, EntityId, PositionUpdate, RenderEvent};

use crate::config::EngineSettings;
use crate::interpolate::{Interpolation, duration_for};
use crate::trail::Trail;

/// Everything known about one live entity.
#[derive(Debug, Clone)]
pub struct EntityState {
    id: EntityId,
    current_position: Coordinate,
    target_position: Coordinate,
    speed_kmh: Option<f64>,
    last_sample_ms: i64,
    last_seen_ms: i64,
    start_location: Coordinate,
    trail: Trail,
    label: Option<String>,
    interpolation: Option<Interpolation>,
}

impl EntityState {
    fn new(update: PositionUpdate, now_ms: i64, settings: &EngineSettings) -> Self {
        let position = update.position();
        Self {
            current_position: position,
            target_position: position,
            start_location: position,
            speed_kmh: update.speed_kmh,
            last_sample_ms: update.timestamp_ms.unwrap_or(now_ms),
            last_seen_ms: now_ms,
            trail: Trail::new(position, &settings.trail),
            label: update.label,
            interpolation: None,
            id: update.entity_id,
        }
    }

    /// Entity identifier.
    pub const fn id(&self) -> &EntityId {
        &self.id
    }

    /// Last rendered position.
    pub const fn current_position(&self) -> Coordinate {
        self.current_position
    }

    /// Last received position.
    pub const fn target_position(&self) -> Coordinate {
        self.target_position
    }

    /// Reported or derived speed.
    pub const fn speed_kmh(&self) -> Option<f64> {
        self.speed_kmh
    }

    /// First position ever observed.
    pub const fn start_location(&self) -> Coordinate {
        self.start_location
    }

    /// Wall-clock time of the last applied update.
    pub const fn last_seen_ms(&self) -> i64 {
        self.last_seen_ms
    }

    /// Label supplied by the feed.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Path history.
    pub const fn trail(&self) -> &Trail {
        &self.trail
    }

    /// Whether an interpolation is still producing frames.
    pub fn is_animating(&self) -> bool {
        self.interpolation.as_ref().is_some_and(Interpolation::is_active)
    }

    /// Whether the entity has been silent for longer than `stale_after_ms`.
    pub fn is_stale(&self, now_ms: i64, stale_after_ms: u64) -> bool {
        let window = i64::try_from(stale_after_ms).unwrap_or(i64::MAX);
        now_ms.saturating_sub(self.last_seen_ms) > window
    }

    /// Read-only projection for the selection panel.
    pub fn details(&self) -> EntityDetails {
        EntityDetails {
            id: self.id.clone(),
            current_position: self.current_position,
            target_position: self.target_position,
            speed_kmh: self.speed_kmh,
            start_location: self.start_location,
            label: self.label.clone(),
            trail_len: u32::try_from(self.trail.len()).unwrap_or(u32::MAX),
            last_seen_ms: self.last_seen_ms,
        }
    }

    /// Cancel and drop the active interpolation, if any.
    fn cancel_interpolation(&mut self) {
        if let Some(tween) = self.interpolation.take() {
            tween.cancel();
        }
    }

    fn apply(&mut self, update: PositionUpdate, now_ms: i64, settings: &EngineSettings) {
        self.cancel_interpolation();

        let incoming = update.position();
        let sample_ms = update.timestamp_ms.unwrap_or(now_ms);
        self.speed_kmh = update.speed_kmh.or_else(|| {
            Some(speed_between_kmh(
                self.target_position,
                incoming,
                sample_ms.saturating_sub(self.last_sample_ms),
            ))
        });
        self.target_position = incoming;

        let eps = settings.snap_epsilon_deg;
        let near = (incoming.lat - self.current_position.lat).abs() < eps
            && (incoming.lng - self.current_position.lng).abs() < eps;
        if near {
            self.current_position = incoming;
        } else {
            let duration = duration_for(self.current_position, incoming, &settings.motion);
            self.interpolation = Some(Interpolation::start(
                self.current_position,
                incoming,
                now_ms,
                duration,
            ));
        }

        let _ = self.trail.push(incoming);
        if update.label.is_some() {
            self.label = update.label;
        }
        self.last_sample_ms = sample_ms;
        self.last_seen_ms = now_ms;
    }

    /// Advance the interpolation. Returns the new rendered position if it moved.
    fn step(&mut self, now_ms: i64) -> Option<Coordinate> {
        let tween = self.interpolation.as_mut()?;
        let sampled = tween.sample(now_ms);
        if !tween.is_active() {
            self.interpolation = None;
        }
        let position = sampled?;
        self.current_position = position;
        Some(position)
    }
}

/// Authoritative map of live entities, ordered by id.
#[derive(Debug, Clone, Default)]
pub struct EntityStore {
    entities: BTreeMap<EntityId, EntityState>,
}

impl EntityStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one update, creating the entity on first sight.
    ///
    /// Returns the render event describing the change.
    pub fn apply(&mut self, update: PositionUpdate, now_ms: i64, settings: &EngineSettings) -> RenderEvent {
        if let Some(state) = self.entities.get_mut(&update.entity_id) {
            state.apply(update, now_ms, settings);
            return RenderEvent::Updated {
                id: state.id.clone(),
                position: state.current_position,
                target: state.target_position,
                speed_kmh: state.speed_kmh,
                trail: state.trail.to_vec(),
                label: state.label.clone(),
            };
        }

        let state = EntityState::new(update, now_ms, settings);
        let event = RenderEvent::Created {
            id: state.id.clone(),
            position: state.current_position,
            trail: state.trail.to_vec(),
            label: state.label.clone(),
            speed_kmh: state.speed_kmh,
        };
        self.entities.insert(state.id.clone(), state);
        event
    }

    /// Remove an entity and release its resources.
    pub fn evict(&mut self, id: &EntityId) -> Option<EntityState> {
        let mut state = self.entities.remove(id)?;
        state.cancel_interpolation();
        state.trail.clear();
        Some(state)
    }

    /// Evict every entity silent for longer than `stale_after_ms`.
    ///
    /// Returns the evicted ids in order.
    pub fn sweep_stale(&mut self, now_ms: i64, stale_after_ms: u64) -> Vec<EntityId> {
        let stale: Vec<EntityId> = self
            .entities
            .values()
            .filter(|state| state.is_stale(now_ms, stale_after_ms))
            .map(|state| state.id.clone())
            .collect();
        for id in &stale {
            let _ = self.evict(id);
        }
        stale
    }

    /// Step every running interpolation to `now_ms`.
    ///
    /// Returns a `Moved` event for each entity whose rendered position changed.
    pub fn step_interpolations(&mut self, now_ms: i64) -> Vec<RenderEvent> {
        self.entities
            .values_mut()
            .filter_map(|state| {
                state.step(now_ms).map(|position| RenderEvent::Moved {
                    id: state.id.clone(),
                    position,
                })
            })
            .collect()
    }

    /// Cancel every running interpolation.
    ///
    /// With `snap_to_target`, interrupted markers jump to their target and a
    /// `Moved` event is produced for each.
    pub fn cancel_all(&mut self, snap_to_target: bool) -> Vec<RenderEvent> {
        let mut events = Vec::new();
        for state in self.entities.values_mut() {
            let Some(tween) = state.interpolation.take() else {
                continue;
            };
            tween.cancel();
            if snap_to_target {
                state.current_position = state.target_position;
                events.push(RenderEvent::Moved {
                    id: state.id.clone(),
                    position: state.current_position,
                });
            }
        }
        events
    }

    /// Look up an entity.
    pub fn get(&self, id: &EntityId) -> Option<&EntityState> {
        self.entities.get(id)
    }

    /// Whether `id` is live.
    pub fn contains(&self, id: &EntityId) -> bool {
        self.entities.contains_key(id)
    }

    /// Live entity ids in sorted order.
    pub fn ids(&self) -> impl Iterator<Item = &EntityId> {
        self.entities.keys()
    }

    /// Live entities in id order.
    pub fn iter(&self) -> impl Iterator<Item = &EntityState> {
        self.entities.values()
    }

    /// Number of live entities.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether no entity is live.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const T0: i64 = 1_700_000_000_000;

    fn settings() -> EngineSettings {
        EngineSettings::default()
    }

    #[test]
    fn first_update_creates_entity() {
        let mut store = EntityStore::new();
        let event = store.apply(
            PositionUpdate::new("12951", 10.0, 77.0).with_speed(40.0),
            T0,
            &settings(),
        );
        assert!(matches!(event, RenderEvent::Created { ref trail, .. } if trail.len() == 1));

        let state = store.get(&EntityId::from("12951")).unwrap();
        assert_eq!(state.current_position(), Coordinate::new(10.0, 77.0));
        assert_eq!(state.target_position(), state.current_position());
        assert_eq!(state.start_location(), state.current_position());
        assert_eq!(state.speed_kmh(), Some(40.0));
        assert!(!state.is_animating());
    }

    #[test]
    fn far_update_starts_interpolation_toward_target() {
        let mut store = EntityStore::new();
        let _ = store.apply(PositionUpdate::new("a", 10.0, 77.0), T0, &settings());
        let event = store.apply(PositionUpdate::new("a", 10.01, 77.0), T0 + 1_000, &settings());

        match event {
            RenderEvent::Updated { position, target, trail, .. } => {
                assert_eq!(position, Coordinate::new(10.0, 77.0));
                assert_eq!(target, Coordinate::new(10.01, 77.0));
                assert_eq!(trail.len(), 2);
            }
            other => panic!("unexpected event {other:?}"),
        }
        let state = store.get(&EntityId::from("a")).unwrap();
        assert!(state.is_animating());
        assert_eq!(state.start_location(), Coordinate::new(10.0, 77.0));
    }

    #[test]
    fn near_update_snaps_without_interpolation() {
        let mut store = EntityStore::new();
        let _ = store.apply(PositionUpdate::new("a", 10.0, 77.0), T0, &settings());
        let _ = store.apply(PositionUpdate::new("a", 10.000_01, 77.000_01), T0 + 1_000, &settings());

        let state = store.get(&EntityId::from("a")).unwrap();
        assert!(!state.is_animating());
        assert_eq!(state.current_position(), Coordinate::new(10.000_01, 77.000_01));
        // ~1.5 m: below the minimum segment, trail does not grow.
        assert_eq!(state.trail().len(), 1);
    }

    #[test]
    fn speed_is_derived_when_absent() {
        let mut store = EntityStore::new();
        let _ = store.apply(
            PositionUpdate::new("a", 0.0, 0.0).with_timestamp(T0),
            T0,
            &settings(),
        );
        // One degree of longitude at the equator in one hour.
        let _ = store.apply(
            PositionUpdate::new("a", 0.0, 1.0).with_timestamp(T0 + 3_600_000),
            T0 + 1_000,
            &settings(),
        );
        let speed = store.get(&EntityId::from("a")).unwrap().speed_kmh().unwrap();
        assert!((speed - 111.195).abs() < 0.05, "got {speed}");
    }

    #[test]
    fn payload_speed_wins_over_derivation() {
        let mut store = EntityStore::new();
        let _ = store.apply(PositionUpdate::new("a", 0.0, 0.0), T0, &settings());
        let _ = store.apply(
            PositionUpdate::new("a", 0.0, 1.0).with_speed(0.0),
            T0 + 1,
            &settings(),
        );
        assert_eq!(store.get(&EntityId::from("a")).unwrap().speed_kmh(), Some(0.0));
    }

    #[test]
    fn newer_update_supersedes_running_interpolation() {
        let mut store = EntityStore::new();
        let _ = store.apply(PositionUpdate::new("a", 10.0, 77.0), T0, &settings());
        let _ = store.apply(PositionUpdate::new("a", 10.1, 77.0), T0 + 1_000, &settings());
        let _ = store.step_interpolations(T0 + 1_100);
        let _ = store.apply(PositionUpdate::new("a", 10.2, 77.0), T0 + 1_150, &settings());

        // Run far past any duration: the marker must rest on the latest target.
        let _ = store.step_interpolations(T0 + 10_000);
        let state = store.get(&EntityId::from("a")).unwrap();
        assert_eq!(state.current_position(), Coordinate::new(10.2, 77.0));
        assert!(!state.is_animating());
    }

    #[test]
    fn label_is_kept_until_replaced() {
        let mut store = EntityStore::new();
        let _ = store.apply(PositionUpdate::new("a", 0.0, 0.0).with_label("Express"), T0, &settings());
        let _ = store.apply(PositionUpdate::new("a", 0.0, 0.1), T0 + 1, &settings());
        assert_eq!(store.get(&EntityId::from("a")).unwrap().label(), Some("Express"));
        let _ = store.apply(PositionUpdate::new("a", 0.0, 0.2).with_label("Late"), T0 + 2, &settings());
        assert_eq!(store.get(&EntityId::from("a")).unwrap().label(), Some("Late"));
    }

    #[test]
    fn stale_boundary_is_exclusive() {
        let mut store = EntityStore::new();
        let _ = store.apply(PositionUpdate::new("old", 0.0, 0.0), T0, &settings());
        let _ = store.apply(PositionUpdate::new("fresh", 1.0, 1.0), T0 + 1, &settings());

        // `old` is exactly one millisecond past the window, `fresh` is on it.
        let evicted = store.sweep_stale(T0 + 600_001, 600_000);
        assert_eq!(evicted, vec![EntityId::from("old")]);
        assert!(store.contains(&EntityId::from("fresh")));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn evict_cancels_and_clears() {
        let mut store = EntityStore::new();
        let _ = store.apply(PositionUpdate::new("a", 10.0, 77.0), T0, &settings());
        let _ = store.apply(PositionUpdate::new("a", 10.1, 77.0), T0 + 1, &settings());
        let state = store.evict(&EntityId::from("a")).unwrap();
        assert!(!state.is_animating());
        assert!(state.trail().is_empty());
        assert!(store.is_empty());
        assert!(store.evict(&EntityId::from("a")).is_none());
    }

    #[test]
    fn cancel_all_with_snap_moves_markers_to_target() {
        let mut store = EntityStore::new();
        let _ = store.apply(PositionUpdate::new("a", 10.0, 77.0), T0, &settings());
        let _ = store.apply(PositionUpdate::new("a", 10.1, 77.0), T0 + 1, &settings());
        let _ = store.apply(PositionUpdate::new("b", 20.0, 70.0), T0, &settings());

        let events = store.cancel_all(true);
        assert_eq!(events.len(), 1);
        let state = store.get(&EntityId::from("a")).unwrap();
        assert_eq!(state.current_position(), Coordinate::new(10.1, 77.0));
        assert!(!state.is_animating());
    }

    #[test]
    fn cancel_all_without_snap_leaves_position() {
        let mut store = EntityStore::new();
        let _ = store.apply(PositionUpdate::new("a", 10.0, 77.0), T0, &settings());
        let _ = store.apply(PositionUpdate::new("a", 10.1, 77.0), T0 + 1, &settings());
        let _ = store.step_interpolations(T0 + 50);
        let before = store.get(&EntityId::from("a")).unwrap().current_position();

        assert!(store.cancel_all(false).is_empty());
        let _ = store.step_interpolations(T0 + 5_000);
        assert_eq!(store.get(&EntityId::from("a")).unwrap().current_position(), before);
    }
}
