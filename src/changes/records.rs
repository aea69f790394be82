//! Time-series change records
//!
//! A change record keeps a compact snapshot of the trackable fields before
//! and after the change plus a small numeric delta, so history queries never
//! need the full sector record.

use super::detector::{ChangeDetector, ChangeResult, StationChanges, SystemChanges};
use crate::types::{Coordinates, Faction, FactionRef, Station, StationId, SystemId, SystemRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// `change_type` of a record for a system seen for the first time
pub const SYSTEM_DISCOVERED: &str = "system_discovered";

/// `change_type` of a record for a station seen for the first time
pub const STATION_DISCOVERED: &str = "station_discovered";

// ============================================================================
// Systems
// ============================================================================

/// Trackable fields of a system at one point in time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allegiance: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub government: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_economy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_economy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub population: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controlling_faction: Option<FactionRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub powers: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factions: Option<Vec<Faction>>,
    #[serde(rename = "station_count", default, skip_serializing_if = "Option::is_none")]
    pub station_count: Option<usize>,
    #[serde(rename = "station_names", default, skip_serializing_if = "Option::is_none")]
    pub station_names: Option<Vec<String>>,
}

impl SystemSnapshot {
    pub fn of(system: &SystemRecord) -> Self {
        Self {
            allegiance: system.allegiance.clone(),
            government: system.government.clone(),
            primary_economy: system.primary_economy.clone(),
            secondary_economy: system.secondary_economy.clone(),
            security: system.security.clone(),
            population: system.population,
            controlling_faction: system.controlling_faction.clone(),
            power_state: system.power_state.clone(),
            powers: system.powers.clone(),
            factions: system.factions.clone(),
            station_count: system.stations.as_ref().map(Vec::len),
            station_names: system
                .stations
                .as_ref()
                .map(|stations| stations.iter().map(|s| s.name.clone()).collect()),
        }
    }
}

/// Influence movement recorded in a system delta
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InfluenceDelta {
    pub influence_change: f64,
    pub old_influence: f64,
    pub new_influence: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub population_change: Option<i64>,
    /// Includes factions that appeared or left (missing side counts as 0)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub faction_influence_changes: BTreeMap<String, InfluenceDelta>,
}

impl SystemDelta {
    fn between(old: &SystemRecord, new: &SystemRecord, detector: &ChangeDetector) -> Option<Self> {
        let mut delta = SystemDelta::default();
        if old.population() != new.population() {
            delta.population_change = Some(new.population() as i64 - old.population() as i64);
        }

        let old_influence: HashMap<&str, f64> =
            old.factions().iter().map(|f| (f.name.as_str(), f.influence)).collect();
        let new_influence: HashMap<&str, f64> =
            new.factions().iter().map(|f| (f.name.as_str(), f.influence)).collect();
        let names: BTreeSet<&str> = old_influence.keys().chain(new_influence.keys()).copied().collect();

        for name in names {
            let before = old_influence.get(name).copied().unwrap_or(0.0);
            let after = new_influence.get(name).copied().unwrap_or(0.0);
            if detector.influence_moved(before, after) {
                delta.faction_influence_changes.insert(
                    name.to_string(),
                    InfluenceDelta {
                        influence_change: after - before,
                        old_influence: before,
                        new_influence: after,
                    },
                );
            }
        }

        (delta != SystemDelta::default()).then_some(delta)
    }
}

/// One system-level entry of the change log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemChangeRecord {
    pub id64: SystemId,
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub change_type: String,
    pub coords: Coordinates,
    #[serde(default)]
    pub previous_state: Option<SystemSnapshot>,
    pub current_state: SystemSnapshot,
    #[serde(default)]
    pub delta: Option<SystemDelta>,
}

impl SystemChangeRecord {
    /// Build a record from a detection result
    pub fn from_diff(
        old: Option<&SystemRecord>,
        new: &SystemRecord,
        result: &ChangeResult<SystemChanges>,
        detector: &ChangeDetector,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let change_type = match old {
            None => SYSTEM_DISCOVERED.to_string(),
            Some(_) => result.describe(),
        };
        Self {
            id64: new.id64,
            name: new.name.clone(),
            timestamp,
            change_type,
            coords: new.coords,
            previous_state: old.map(SystemSnapshot::of),
            current_state: SystemSnapshot::of(new),
            delta: old.and_then(|old| SystemDelta::between(old, new, detector)),
        }
    }

    pub fn is_discovery(&self) -> bool {
        self.change_type == SYSTEM_DISCOVERED
    }
}

// ============================================================================
// Stations
// ============================================================================

/// Trackable fields of a station at one point in time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationSnapshot {
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub station_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controlling_faction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controlling_faction_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allegiance: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub government: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_economy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub economies: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub services: Option<Vec<String>>,
    #[serde(rename = "commodity_count", default, skip_serializing_if = "Option::is_none")]
    pub commodity_count: Option<usize>,
    #[serde(rename = "ship_count", default, skip_serializing_if = "Option::is_none")]
    pub ship_count: Option<usize>,
    #[serde(rename = "module_count", default, skip_serializing_if = "Option::is_none")]
    pub module_count: Option<usize>,
}

impl StationSnapshot {
    pub fn of(station: &Station) -> Self {
        Self {
            name: station.name.clone(),
            station_type: station.station_type.clone(),
            controlling_faction: station.controlling_faction_name().map(str::to_string),
            controlling_faction_state: station.controlling_faction_state.clone(),
            allegiance: station.allegiance.clone(),
            government: station.government.clone(),
            primary_economy: station.primary_economy.clone(),
            economies: station.extra.get("economies").cloned(),
            services: station.services.clone(),
            commodity_count: station.commodities().map(<[_]>::len),
            ship_count: station.ships().map(<[_]>::len),
            module_count: station.modules().map(<[_]>::len),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationDelta {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services_added: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services_removed: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_size_change: Option<i64>,
}

impl StationDelta {
    fn from_changes(changes: &StationChanges) -> Option<Self> {
        let (services_added, services_removed) = changes
            .services
            .as_ref()
            .map(|s| (s.added.clone(), s.removed.clone()))
            .unwrap_or_default();
        let delta = StationDelta {
            services_added,
            services_removed,
            market_size_change: changes.commodity_count_change,
        };
        (delta != StationDelta::default()).then_some(delta)
    }
}

/// One station-level entry of the change log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationChangeRecord {
    #[serde(default)]
    pub station_id: Option<StationId>,
    pub system_id64: SystemId,
    pub station_name: String,
    pub system_name: String,
    pub timestamp: DateTime<Utc>,
    pub change_type: String,
    #[serde(default)]
    pub previous_state: Option<StationSnapshot>,
    pub current_state: StationSnapshot,
    #[serde(default)]
    pub delta: Option<StationDelta>,
}

impl StationChangeRecord {
    pub fn from_diff(
        system: &SystemRecord,
        old: Option<&Station>,
        new: &Station,
        result: &ChangeResult<StationChanges>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let change_type = match old {
            None => STATION_DISCOVERED.to_string(),
            Some(_) => result.describe(),
        };
        Self {
            station_id: new.id,
            system_id64: system.id64,
            station_name: new.name.clone(),
            system_name: system.name.clone(),
            timestamp,
            change_type,
            previous_state: old.map(StationSnapshot::of),
            current_state: StationSnapshot::of(new),
            delta: old.and_then(|_| StationDelta::from_changes(&result.significant_changes)),
        }
    }

    pub fn is_discovery(&self) -> bool {
        self.change_type == STATION_DISCOVERED
    }
}

/// Find the previous version of a station: by id when it has one, else by name
pub fn match_station<'a>(previous: &'a [Station], station: &Station) -> Option<&'a Station> {
    match station.id {
        Some(id) => previous.iter().find(|s| s.id == Some(id)),
        None => previous.iter().find(|s| s.id.is_none() && s.name == station.name),
    }
}
