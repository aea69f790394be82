//! Running per-sector statistics
//!
//! Only a count and coordinate sums are kept per sector, so centroids can be
//! computed after streaming any number of records. Partial statistics from
//! different workers merge by plain summation.

use crate::types::Coordinates;
use std::collections::HashMap;

/// Count and coordinate sums for one sector
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SectorStats {
    pub count: u64,
    pub sum_x: f64,
    pub sum_y: f64,
    pub sum_z: f64,
}

impl SectorStats {
    pub fn add(&mut self, coords: &Coordinates) {
        self.count += 1;
        self.sum_x += coords.x;
        self.sum_y += coords.y;
        self.sum_z += coords.z;
    }

    pub fn merge(&mut self, other: &SectorStats) {
        self.count += other.count;
        self.sum_x += other.sum_x;
        self.sum_y += other.sum_y;
        self.sum_z += other.sum_z;
    }

    /// Arithmetic mean of all added coordinates
    pub fn centroid(&self) -> Option<Coordinates> {
        if self.count == 0 {
            return None;
        }
        let n = self.count as f64;
        Some(Coordinates::new(self.sum_x / n, self.sum_y / n, self.sum_z / n))
    }
}

/// Statistics for every sector seen so far
#[derive(Debug, Clone, Default)]
pub struct SectorStatistics {
    sectors: HashMap<String, SectorStats>,
}

impl SectorStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account one standard record
    pub fn record(&mut self, sector: &str, coords: &Coordinates) {
        // avoid allocating the key for the common (existing sector) case
        if let Some(stats) = self.sectors.get_mut(sector) {
            stats.add(coords);
            return;
        }
        let mut stats = SectorStats::default();
        stats.add(coords);
        self.sectors.insert(sector.to_string(), stats);
    }

    /// Fold another worker's partial statistics into this one
    pub fn merge(&mut self, other: SectorStatistics) {
        for (name, stats) in other.sectors {
            self.sectors.entry(name).or_default().merge(&stats);
        }
    }

    pub fn get(&self, sector: &str) -> Option<&SectorStats> {
        self.sectors.get(sector)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SectorStats)> {
        self.sectors.iter().map(|(name, stats)| (name.as_str(), stats))
    }

    pub fn len(&self) -> usize {
        self.sectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sectors.is_empty()
    }

    /// Total records across all sectors
    pub fn total(&self) -> u64 {
        self.sectors.values().map(|s| s.count).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_centroid_is_mean() {
        let mut stats = SectorStats::default();
        assert_eq!(stats.centroid(), None);

        stats.add(&Coordinates::new(0.0, 0.0, 0.0));
        stats.add(&Coordinates::new(10.0, -20.0, 30.0));
        stats.add(&Coordinates::new(-4.0, 2.0, 60.0));

        let c = stats.centroid().unwrap();
        assert!(approx(c.x, 2.0));
        assert!(approx(c.y, -6.0));
        assert!(approx(c.z, 30.0));
    }

    #[test]
    fn test_order_and_partition_independent() {
        let points: Vec<Coordinates> = (0..50)
            .map(|i| Coordinates::new(i as f64 * 1.5, -(i as f64), 65000.0 - i as f64))
            .collect();

        let mut forward = SectorStatistics::new();
        for p in &points {
            forward.record("A", p);
        }

        let mut left = SectorStatistics::new();
        let mut right = SectorStatistics::new();
        for (i, p) in points.iter().rev().enumerate() {
            if i % 3 == 0 {
                left.record("A", p);
            } else {
                right.record("A", p);
            }
        }
        right.merge(left);

        let a = forward.get("A").unwrap().centroid().unwrap();
        let b = right.get("A").unwrap().centroid().unwrap();
        assert_eq!(forward.get("A").unwrap().count, 50);
        assert_eq!(right.get("A").unwrap().count, 50);
        assert!(approx(a.x, b.x) && approx(a.y, b.y) && approx(a.z, b.z));
    }

    #[test]
    fn test_merge_disjoint_sectors() {
        let mut a = SectorStatistics::new();
        a.record("A", &Coordinates::new(1.0, 1.0, 1.0));
        let mut b = SectorStatistics::new();
        b.record("B", &Coordinates::new(2.0, 2.0, 2.0));
        b.record("A", &Coordinates::new(3.0, 3.0, 3.0));

        a.merge(b);
        assert_eq!(a.len(), 2);
        assert_eq!(a.total(), 3);
        assert_eq!(a.get("A").unwrap().count, 2);
    }
}
