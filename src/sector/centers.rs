//! Sector center resolution and nearest-sector assignment

use super::stats::SectorStatistics;
use crate::types::Coordinates;
use std::collections::HashMap;
use tracing::{debug, info};

/// Resolved center of one sector
#[derive(Debug, Clone, PartialEq)]
pub struct SectorCenter {
    pub name: String,
    pub center: Coordinates,
    /// Systems counted when the center was resolved
    pub system_count: u64,
}

/// Read-only table of sector centers
///
/// Built once between the two build passes (or loaded from the sector index)
/// and never mutated while it is being queried.
#[derive(Debug, Clone, Default)]
pub struct SectorCenters {
    centers: Vec<SectorCenter>,
    by_name: HashMap<String, usize>,
}

/// Outcome of resolving accumulated statistics
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub centers: SectorCenters,
    /// Sectors that fell below the population threshold
    pub pruned: Vec<String>,
    /// Records held by pruned sectors
    pub pruned_systems: u64,
}

impl SectorCenters {
    pub fn new(mut centers: Vec<SectorCenter>) -> Self {
        // deterministic scan order keeps tie-breaking stable between runs
        centers.sort_by(|a, b| a.name.cmp(&b.name));
        let by_name = centers
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name.clone(), i))
            .collect();
        Self { centers, by_name }
    }

    /// Resolve the centroid of every sector with at least `min_systems` records
    pub fn resolve(stats: &SectorStatistics, min_systems: u64) -> Resolution {
        let mut kept = Vec::new();
        let mut pruned = Vec::new();
        let mut pruned_systems = 0;

        for (name, sector) in stats.iter() {
            match sector.centroid() {
                Some(center) if sector.count >= min_systems => kept.push(SectorCenter {
                    name: name.to_string(),
                    center,
                    system_count: sector.count,
                }),
                _ => {
                    debug!("Pruning sector '{}' ({} systems)", name, sector.count);
                    pruned_systems += sector.count;
                    pruned.push(name.to_string());
                }
            }
        }
        pruned.sort();

        info!(
            "Resolved {} sector centers ({} below threshold of {})",
            kept.len(),
            pruned.len(),
            min_systems
        );

        Resolution {
            centers: SectorCenters::new(kept),
            pruned,
            pruned_systems,
        }
    }

    /// Sector whose center is closest to `point` (linear scan).
    ///
    /// Returns `None` for an empty table or a non-finite point.
    pub fn nearest(&self, point: &Coordinates) -> Option<&SectorCenter> {
        if !point.is_finite() {
            return None;
        }

        let mut best: Option<&SectorCenter> = None;
        let mut best_distance = f64::INFINITY;
        for center in &self.centers {
            let distance = center.center.distance_squared(point);
            if distance < best_distance {
                best_distance = distance;
                best = Some(center);
            }
        }
        best
    }

    pub fn get(&self, name: &str) -> Option<&SectorCenter> {
        self.by_name.get(name).map(|&i| &self.centers[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SectorCenter> {
        self.centers.iter()
    }

    pub fn len(&self) -> usize {
        self.centers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.centers.is_empty()
    }
}
