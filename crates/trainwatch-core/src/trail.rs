//! Bounded, distance-downsampled trail of recent positions.

use std::collections::VecDeque;

use trainwatch_geo::distance_m;
use trainwatch_types::Coordinate;

use crate::config::TrailConfig;

/// Ordered path history for one entity, oldest first.
///
/// A point closer than `min_segment_m` to the last stored point is
/// dropped, so consecutive stored points are always at least that far
/// apart. Past `max_points` the oldest point falls off the front.
#[derive(Debug, Clone, PartialEq)]
pub struct Trail {
    points: VecDeque<Coordinate>,
    min_segment_m: f64,
    max_points: usize,
}

impl Trail {
    /// Start a trail at `first`.
    pub fn new(first: Coordinate, config: &TrailConfig) -> Self {
        let max_points = config.max_points.max(1);
        let mut points = VecDeque::with_capacity(max_points.min(64));
        points.push_back(first);
        Self {
            points,
            min_segment_m: config.min_segment_m,
            max_points,
        }
    }

    /// Offer a point. Returns `true` if it was stored.
    pub fn push(&mut self, point: Coordinate) -> bool {
        let too_close = self
            .points
            .back()
            .is_some_and(|last| distance_m(*last, point) < self.min_segment_m);
        if too_close {
            return false;
        }
        self.points.push_back(point);
        while self.points.len() > self.max_points {
            self.points.pop_front();
        }
        true
    }

    /// Most recently stored point.
    pub fn last(&self) -> Option<Coordinate> {
        self.points.back().copied()
    }

    /// Number of stored points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the trail holds no points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Drop every point.
    pub fn clear(&mut self) {
        self.points.clear();
    }

    /// Iterate oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Coordinate> {
        self.points.iter()
    }

    /// Copy out the points, oldest first.
    pub fn to_vec(&self) -> Vec<Coordinate> {
        self.points.iter().copied().collect()
    }
}
