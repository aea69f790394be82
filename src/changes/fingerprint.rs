//! Structural fingerprints over the trackable fields of a record
//!
//! Most systems are unchanged between two snapshots, so the detector first
//! compares a 64-bit xxh3 digest of a canonical projection and only diffs
//! field by field when the digests disagree. The projection sorts every
//! collection so that reordering upstream lists does not count as a change.

use crate::types::{Faction, Station, SystemRecord};
use std::hash::{Hash, Hasher};
use xxhash_rust::xxh3::Xxh3;

/// Influence is hashed at four decimal places
const INFLUENCE_SCALE: f64 = 10_000.0;

#[derive(Hash)]
struct FactionProjection<'a> {
    name: &'a str,
    influence: i64,
    state: Option<&'a str>,
    government: Option<&'a str>,
    allegiance: Option<&'a str>,
}

impl<'a> FactionProjection<'a> {
    fn of(faction: &'a Faction) -> Self {
        Self {
            name: &faction.name,
            influence: (faction.influence * INFLUENCE_SCALE).round() as i64,
            state: faction.state.as_deref(),
            government: faction.government.as_deref(),
            allegiance: faction.allegiance.as_deref(),
        }
    }
}

#[derive(Hash)]
struct StationSummary<'a> {
    id: Option<u64>,
    name: &'a str,
    station_type: Option<&'a str>,
    controlling_faction: Option<&'a str>,
    services: Vec<&'a str>,
}

#[derive(Hash)]
struct SystemProjection<'a> {
    allegiance: Option<&'a str>,
    government: Option<&'a str>,
    primary_economy: Option<&'a str>,
    secondary_economy: Option<&'a str>,
    security: Option<&'a str>,
    population: u64,
    controlling_faction: Option<&'a str>,
    power_state: Option<&'a str>,
    powers: Vec<&'a str>,
    factions: Vec<FactionProjection<'a>>,
    stations: Vec<StationSummary<'a>>,
}

#[derive(Hash)]
struct StationProjection<'a> {
    name: &'a str,
    station_type: Option<&'a str>,
    controlling_faction: Option<&'a str>,
    controlling_faction_state: Option<&'a str>,
    allegiance: Option<&'a str>,
    government: Option<&'a str>,
    primary_economy: Option<&'a str>,
    services: Vec<&'a str>,
    commodity_count: Option<usize>,
    market_categories: Vec<&'a str>,
    ship_names: Option<Vec<&'a str>>,
    module_count: Option<usize>,
}

fn sorted<'a>(items: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    let mut items: Vec<&str> = items.collect();
    items.sort_unstable();
    items
}

fn digest<T: Hash>(projection: &T) -> u64 {
    let mut hasher = Xxh3::new();
    projection.hash(&mut hasher);
    hasher.finish()
}

/// Sorted, de-duplicated ship names of a station's shipyard
pub fn ship_names(station: &Station) -> Option<Vec<&str>> {
    station.ships().map(|ships| {
        let mut names = sorted(ships.iter().filter_map(|s| s.name.as_deref()));
        names.dedup();
        names
    })
}

/// Fingerprint of a system's trackable fields
pub fn system_fingerprint(system: &SystemRecord) -> u64 {
    let mut factions: Vec<FactionProjection<'_>> =
        system.factions().iter().map(FactionProjection::of).collect();
    factions.sort_by(|a, b| a.name.cmp(b.name));

    let mut stations: Vec<StationSummary<'_>> = system
        .stations()
        .iter()
        .map(|station| StationSummary {
            id: station.id,
            name: &station.name,
            station_type: station.station_type.as_deref(),
            controlling_faction: station.controlling_faction_name(),
            services: sorted(station.services().iter().map(String::as_str)),
        })
        .collect();
    stations.sort_by(|a, b| a.id.cmp(&b.id).then_with(|| a.name.cmp(b.name)));

    digest(&SystemProjection {
        allegiance: system.allegiance.as_deref(),
        government: system.government.as_deref(),
        primary_economy: system.primary_economy.as_deref(),
        secondary_economy: system.secondary_economy.as_deref(),
        security: system.security.as_deref(),
        population: system.population(),
        controlling_faction: system.controlling_faction_name(),
        power_state: system.power_state.as_deref(),
        powers: sorted(system.powers().iter().map(String::as_str)),
        factions,
        stations,
    })
}

/// Fingerprint of a station's trackable fields
pub fn station_fingerprint(station: &Station) -> u64 {
    let commodities = station.commodities();
    let mut market_categories = sorted(
        commodities
            .unwrap_or(&[])
            .iter()
            .filter_map(|c| c.category.as_deref()),
    );
    market_categories.dedup();

    digest(&StationProjection {
        name: &station.name,
        station_type: station.station_type.as_deref(),
        controlling_faction: station.controlling_faction_name(),
        controlling_faction_state: station.controlling_faction_state.as_deref(),
        allegiance: station.allegiance.as_deref(),
        government: station.government.as_deref(),
        primary_economy: station.primary_economy.as_deref(),
        services: sorted(station.services().iter().map(String::as_str)),
        commodity_count: commodities.map(<[_]>::len),
        market_categories,
        ship_names: ship_names(station),
        module_count: station.modules().map(<[_]>::len),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Coordinates;

    fn faction(name: &str, influence: f64) -> Faction {
        serde_json::from_value(serde_json::json!({ "name": name, "influence": influence })).unwrap()
    }

    fn system() -> SystemRecord {
        SystemRecord::new(1, "Eol Prou RS-T d3-94", Coordinates::new(1.0, 2.0, 3.0))
            .with_population(5_000)
            .with_factions(vec![faction("Alpha", 0.6), faction("Beta", 0.4)])
    }

    #[test]
    fn test_fingerprint_is_stable() {
        assert_eq!(system_fingerprint(&system()), system_fingerprint(&system()));
    }

    #[test]
    fn test_faction_order_does_not_matter() {
        let reordered = system().with_factions(vec![faction("Beta", 0.4), faction("Alpha", 0.6)]);
        assert_eq!(system_fingerprint(&system()), system_fingerprint(&reordered));
    }

    #[test]
    fn test_tracked_field_changes_fingerprint() {
        let moved = system().with_population(5_001);
        assert_ne!(system_fingerprint(&system()), system_fingerprint(&moved));
    }

    #[test]
    fn test_untracked_field_is_ignored() {
        let mut other = system();
        other.bodies = Some(vec![serde_json::json!({ "name": "A 1" })]);
        other.coords = Coordinates::new(9.0, 9.0, 9.0);
        assert_eq!(system_fingerprint(&system()), system_fingerprint(&other));
    }

    #[test]
    fn test_station_services_order_does_not_matter() {
        let a: Station = serde_json::from_value(serde_json::json!({
            "id": 7, "name": "Hub", "services": ["Market", "Refuel"]
        }))
        .unwrap();
        let b: Station = serde_json::from_value(serde_json::json!({
            "id": 7, "name": "Hub", "services": ["Refuel", "Market"]
        }))
        .unwrap();
        assert_eq!(station_fingerprint(&a), station_fingerprint(&b));
    }
}
