//! Change detection between two versions of a system or station

use super::fingerprint::{ship_names, station_fingerprint, system_fingerprint};
use crate::types::{Faction, Station, StationId, SystemRecord};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

/// Default influence threshold (0.1 percentage points)
pub const DEFAULT_INFLUENCE_THRESHOLD: f64 = 0.001;

/// Category of a detected change
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// No previous version existed
    Discovered,
    // system level
    FactionInfluence,
    Powerplay,
    Economy,
    Stations,
    Population,
    /// Allegiance, government, security or controlling faction
    Political,
    // station level
    Market,
    Shipyard,
    Outfitting,
    FactionControl,
    Services,
    /// Name, type, allegiance, government or economy of a station
    Profile,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Discovered => "discovered",
            ChangeKind::FactionInfluence => "faction_influence",
            ChangeKind::Powerplay => "powerplay",
            ChangeKind::Economy => "economy",
            ChangeKind::Stations => "stations",
            ChangeKind::Population => "population",
            ChangeKind::Political => "political",
            ChangeKind::Market => "market",
            ChangeKind::Shipyard => "shipyard",
            ChangeKind::Outfitting => "outfitting",
            ChangeKind::FactionControl => "faction_control",
            ChangeKind::Services => "services",
            ChangeKind::Profile => "profile",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Old and new value of a field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueChange<T> {
    pub old: T,
    pub new: T,
}

/// Influence movement of one faction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InfluenceChange {
    pub old: f64,
    pub new: f64,
    pub change: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopulationChange {
    pub old: u64,
    pub new: u64,
    pub change: i64,
}

/// Members added to and removed from a set-valued field
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetChange {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl SetChange {
    fn between<'a>(
        old: impl IntoIterator<Item = &'a str>,
        new: impl IntoIterator<Item = &'a str>,
    ) -> Option<Self> {
        let old: BTreeSet<&str> = old.into_iter().collect();
        let new: BTreeSet<&str> = new.into_iter().collect();
        if old == new {
            return None;
        }
        Some(Self {
            added: new.difference(&old).map(|s| s.to_string()).collect(),
            removed: old.difference(&new).map(|s| s.to_string()).collect(),
        })
    }
}

/// Station identity as reported in system-level station changes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationRef {
    pub id: Option<StationId>,
    pub name: String,
}

type FieldChanges = BTreeMap<String, ValueChange<Option<String>>>;

/// Details of a system-level change
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemChanges {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub new_factions: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub removed_factions: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub influence_changes: BTreeMap<String, InfluenceChange>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub state_changes: FieldChanges,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power_state: Option<ValueChange<Option<String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub powers: Option<SetChange>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub economy: FieldChanges,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub new_stations: Vec<StationRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub removed_stations: Vec<StationRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub population: Option<PopulationChange>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub political: FieldChanges,
}

/// Details of a station-level change
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StationChanges {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub faction_control: FieldChanges,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub services: Option<SetChange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commodity_count_change: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ship_availability: Option<SetChange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_count_change: Option<i64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub profile: FieldChanges,
}

/// Outcome of comparing two versions of an entity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeResult<C> {
    pub has_changes: bool,
    pub change_types: BTreeSet<ChangeKind>,
    pub significant_changes: C,
}

impl<C: Default> ChangeResult<C> {
    fn unchanged() -> Self {
        Self {
            has_changes: false,
            change_types: BTreeSet::new(),
            significant_changes: C::default(),
        }
    }

    fn discovered() -> Self {
        Self {
            has_changes: true,
            change_types: BTreeSet::from([ChangeKind::Discovered]),
            significant_changes: C::default(),
        }
    }

    fn from_parts(change_types: BTreeSet<ChangeKind>, significant_changes: C) -> Self {
        Self {
            has_changes: !change_types.is_empty(),
            change_types,
            significant_changes,
        }
    }

    pub fn is_discovery(&self) -> bool {
        self.change_types.contains(&ChangeKind::Discovered)
    }

    /// Categories joined with `|`, in category order
    pub fn describe(&self) -> String {
        self.change_types
            .iter()
            .map(ChangeKind::as_str)
            .collect::<Vec<_>>()
            .join("|")
    }
}

/// Record `old -> new` under `field` when the two differ
fn diff_field(changes: &mut FieldChanges, field: &str, old: Option<&str>, new: Option<&str>) {
    if old != new {
        changes.insert(
            field.to_string(),
            ValueChange {
                old: old.map(str::to_string),
                new: new.map(str::to_string),
            },
        );
    }
}

/// Compares record versions.
///
/// Unchanged records are recognised by fingerprint alone. Category checks are
/// independent; every category that fires is reported.
#[derive(Debug, Clone, Copy)]
pub struct ChangeDetector {
    influence_threshold: f64,
}

impl Default for ChangeDetector {
    fn default() -> Self {
        Self::new(DEFAULT_INFLUENCE_THRESHOLD)
    }
}

impl ChangeDetector {
    pub fn new(influence_threshold: f64) -> Self {
        Self { influence_threshold }
    }

    pub fn influence_threshold(&self) -> f64 {
        self.influence_threshold
    }

    /// Whether an influence movement is large enough to report
    pub fn influence_moved(&self, old: f64, new: f64) -> bool {
        (new - old).abs() > self.influence_threshold
    }

    /// Compare two versions of a system
    pub fn detect_system(
        &self,
        old: Option<&SystemRecord>,
        new: &SystemRecord,
    ) -> ChangeResult<SystemChanges> {
        let Some(old) = old else {
            return ChangeResult::discovered();
        };
        if system_fingerprint(old) == system_fingerprint(new) {
            return ChangeResult::unchanged();
        }

        let mut kinds = BTreeSet::new();
        let mut changes = SystemChanges::default();

        if self.diff_factions(old.factions(), new.factions(), &mut changes) {
            kinds.insert(ChangeKind::FactionInfluence);
        }

        if old.power_state != new.power_state {
            changes.power_state = Some(ValueChange {
                old: old.power_state.clone(),
                new: new.power_state.clone(),
            });
        }
        changes.powers = SetChange::between(
            old.powers().iter().map(String::as_str),
            new.powers().iter().map(String::as_str),
        );
        if changes.power_state.is_some() || changes.powers.is_some() {
            kinds.insert(ChangeKind::Powerplay);
        }

        diff_field(
            &mut changes.economy,
            "primaryEconomy",
            old.primary_economy.as_deref(),
            new.primary_economy.as_deref(),
        );
        diff_field(
            &mut changes.economy,
            "secondaryEconomy",
            old.secondary_economy.as_deref(),
            new.secondary_economy.as_deref(),
        );
        if !changes.economy.is_empty() {
            kinds.insert(ChangeKind::Economy);
        }

        if diff_stations(old.stations(), new.stations(), &mut changes) {
            kinds.insert(ChangeKind::Stations);
        }

        if old.population() != new.population() {
            changes.population = Some(PopulationChange {
                old: old.population(),
                new: new.population(),
                change: new.population() as i64 - old.population() as i64,
            });
            kinds.insert(ChangeKind::Population);
        }

        diff_field(
            &mut changes.political,
            "allegiance",
            old.allegiance.as_deref(),
            new.allegiance.as_deref(),
        );
        diff_field(
            &mut changes.political,
            "government",
            old.government.as_deref(),
            new.government.as_deref(),
        );
        diff_field(
            &mut changes.political,
            "security",
            old.security.as_deref(),
            new.security.as_deref(),
        );
        diff_field(
            &mut changes.political,
            "controllingFaction",
            old.controlling_faction_name(),
            new.controlling_faction_name(),
        );
        if !changes.political.is_empty() {
            kinds.insert(ChangeKind::Political);
        }

        ChangeResult::from_parts(kinds, changes)
    }

    /// Returns whether any faction-level change was found
    fn diff_factions(&self, old: &[Faction], new: &[Faction], changes: &mut SystemChanges) -> bool {
        let old_by_name: HashMap<&str, &Faction> = old.iter().map(|f| (f.name.as_str(), f)).collect();
        let new_by_name: HashMap<&str, &Faction> = new.iter().map(|f| (f.name.as_str(), f)).collect();

        let mut changed = false;
        for faction in new {
            let Some(previous) = old_by_name.get(faction.name.as_str()) else {
                changes.new_factions.push(faction.name.clone());
                changed = true;
                continue;
            };
            if self.influence_moved(previous.influence, faction.influence) {
                changes.influence_changes.insert(
                    faction.name.clone(),
                    InfluenceChange {
                        old: previous.influence,
                        new: faction.influence,
                        change: faction.influence - previous.influence,
                    },
                );
                changed = true;
            }
            if previous.state != faction.state {
                changes.state_changes.insert(
                    faction.name.clone(),
                    ValueChange {
                        old: previous.state.clone(),
                        new: faction.state.clone(),
                    },
                );
                changed = true;
            }
        }
        for faction in old {
            if !new_by_name.contains_key(faction.name.as_str()) {
                changes.removed_factions.push(faction.name.clone());
                changed = true;
            }
        }
        changes.new_factions.sort();
        changes.removed_factions.sort();
        changed
    }

    /// Compare two versions of a station
    pub fn detect_station(&self, old: Option<&Station>, new: &Station) -> ChangeResult<StationChanges> {
        let Some(old) = old else {
            return ChangeResult::discovered();
        };
        if station_fingerprint(old) == station_fingerprint(new) {
            return ChangeResult::unchanged();
        }

        let mut kinds = BTreeSet::new();
        let mut changes = StationChanges::default();

        diff_field(
            &mut changes.faction_control,
            "controllingFaction",
            old.controlling_faction_name(),
            new.controlling_faction_name(),
        );
        diff_field(
            &mut changes.faction_control,
            "controllingFactionState",
            old.controlling_faction_state.as_deref(),
            new.controlling_faction_state.as_deref(),
        );
        if !changes.faction_control.is_empty() {
            kinds.insert(ChangeKind::FactionControl);
        }

        changes.services = SetChange::between(
            old.services().iter().map(String::as_str),
            new.services().iter().map(String::as_str),
        );
        if changes.services.is_some() {
            kinds.insert(ChangeKind::Services);
        }

        if old.commodity_count() != new.commodity_count() {
            changes.commodity_count_change =
                Some(new.commodity_count() as i64 - old.commodity_count() as i64);
            kinds.insert(ChangeKind::Market);
        }

        changes.ship_availability = SetChange::between(
            ship_names(old).unwrap_or_default(),
            ship_names(new).unwrap_or_default(),
        );
        if changes.ship_availability.is_some() {
            kinds.insert(ChangeKind::Shipyard);
        }

        if old.module_count() != new.module_count() {
            changes.module_count_change = Some(new.module_count() as i64 - old.module_count() as i64);
            kinds.insert(ChangeKind::Outfitting);
        }

        diff_field(&mut changes.profile, "name", Some(old.name.as_str()), Some(new.name.as_str()));
        diff_field(
            &mut changes.profile,
            "type",
            old.station_type.as_deref(),
            new.station_type.as_deref(),
        );
        diff_field(
            &mut changes.profile,
            "allegiance",
            old.allegiance.as_deref(),
            new.allegiance.as_deref(),
        );
        diff_field(
            &mut changes.profile,
            "government",
            old.government.as_deref(),
            new.government.as_deref(),
        );
        diff_field(
            &mut changes.profile,
            "primaryEconomy",
            old.primary_economy.as_deref(),
            new.primary_economy.as_deref(),
        );
        if !changes.profile.is_empty() {
            kinds.insert(ChangeKind::Profile);
        }

        ChangeResult::from_parts(kinds, changes)
    }
}

/// Compare station-name sets; returns whether they differ
fn diff_stations(old: &[Station], new: &[Station], changes: &mut SystemChanges) -> bool {
    let old_names: BTreeSet<&str> = old.iter().map(|s| s.name.as_str()).collect();
    let new_names: BTreeSet<&str> = new.iter().map(|s| s.name.as_str()).collect();
    if old_names == new_names {
        return false;
    }
    let as_ref = |s: &Station| StationRef {
        id: s.id,
        name: s.name.clone(),
    };
    changes.new_stations = new
        .iter()
        .filter(|s| !old_names.contains(s.name.as_str()))
        .map(as_ref)
        .collect();
    changes.removed_stations = old
        .iter()
        .filter(|s| !new_names.contains(s.name.as_str()))
        .map(as_ref)
        .collect();
    true
}
