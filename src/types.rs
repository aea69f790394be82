//! Core record types for the galaxy sector store
//!
//! System records arrive as loosely structured JSON. They are decoded once into
//! the structs below; every field the store does not interpret is kept in the
//! `extra` map so a record written back to a sector file carries everything it
//! arrived with.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// 64-bit system identifier
pub type SystemId = u64;

/// Station identifier
pub type StationId = u64;

// ============================================================================
// Coordinates
// ============================================================================

/// Position in light years
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    #[serde(deserialize_with = "lenient_f64")]
    pub x: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub y: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub z: f64,
}

impl Coordinates {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Squared Euclidean distance (cheaper when only ordering matters)
    pub fn distance_squared(&self, other: &Coordinates) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dx * dx + dy * dy + dz * dz
    }

    /// Euclidean distance
    pub fn distance(&self, other: &Coordinates) -> f64 {
        self.distance_squared(other).sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.2}, {:.2}, {:.2})", self.x, self.y, self.z)
    }
}

/// Accept a coordinate as a JSON number or as a decimal string.
///
/// Upstream dumps occasionally carry coordinates as high-precision decimals;
/// everything downstream works on plain `f64`.
fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrText {
        Number(f64),
        Text(String),
    }

    match NumberOrText::deserialize(deserializer)? {
        NumberOrText::Number(n) => Ok(n),
        NumberOrText::Text(s) => match s.trim().parse::<f64>() {
            Ok(n) if n.is_finite() => Ok(n),
            Ok(_) => Err(serde::de::Error::custom(format!("non-finite coordinate '{}'", s))),
            Err(e) => Err(serde::de::Error::custom(format!("invalid coordinate '{}': {}", s, e))),
        },
    }
}

// ============================================================================
// Factions
// ============================================================================

/// Reference to a controlling faction.
///
/// System-level dumps describe the controlling faction as an object, while
/// station entries usually carry only its name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FactionRef {
    Name(String),
    Detailed(ControllingFaction),
}

impl FactionRef {
    pub fn name(&self) -> &str {
        match self {
            FactionRef::Name(name) => name,
            FactionRef::Detailed(faction) => &faction.name,
        }
    }
}

/// Detailed controlling faction entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllingFaction {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub government: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allegiance: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A minor faction present in a system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Faction {
    pub name: String,
    /// Influence as a fraction (0.0 - 1.0)
    #[serde(default)]
    pub influence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub government: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allegiance: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ============================================================================
// Stations
// ============================================================================

/// A commodity listed on a station market
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commodity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Market {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commodities: Option<Vec<Commodity>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ship {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shipyard {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ships: Option<Vec<Ship>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outfitting {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modules: Option<Vec<Value>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A station (or settlement / carrier) nested under a system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Station {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<StationId>,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub station_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controlling_faction: Option<FactionRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controlling_faction_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allegiance: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub government: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_economy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub services: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market: Option<Market>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipyard: Option<Shipyard>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outfitting: Option<Outfitting>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Station {
    pub fn services(&self) -> &[String] {
        self.services.as_deref().unwrap_or(&[])
    }

    pub fn controlling_faction_name(&self) -> Option<&str> {
        self.controlling_faction.as_ref().map(FactionRef::name)
    }

    /// Commodities on the market, if a market listing is present
    pub fn commodities(&self) -> Option<&[Commodity]> {
        self.market.as_ref()?.commodities.as_deref()
    }

    /// Ships for sale, if a shipyard listing is present
    pub fn ships(&self) -> Option<&[Ship]> {
        self.shipyard.as_ref()?.ships.as_deref()
    }

    /// Outfitting modules, if an outfitting listing is present
    pub fn modules(&self) -> Option<&[Value]> {
        self.outfitting.as_ref()?.modules.as_deref()
    }

    /// Market commodity count (0 when no listing)
    pub fn commodity_count(&self) -> usize {
        self.commodities().map_or(0, <[Commodity]>::len)
    }

    /// Outfitting module count (0 when no listing)
    pub fn module_count(&self) -> usize {
        self.modules().map_or(0, <[Value]>::len)
    }
}

// ============================================================================
// Systems
// ============================================================================

/// A star system record.
///
/// `id64`, `name` and `coords` are required; a line without them is treated
/// as malformed. All other fields are optional with the defaults documented on
/// their accessors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemRecord {
    pub id64: SystemId,
    pub name: String,
    pub coords: Coordinates,
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
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stations: Option<Vec<Station>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bodies: Option<Vec<Value>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SystemRecord {
    /// Create a bare record with only the required fields
    pub fn new(id64: SystemId, name: impl Into<String>, coords: Coordinates) -> Self {
        Self {
            id64,
            name: name.into(),
            coords,
            allegiance: None,
            government: None,
            primary_economy: None,
            secondary_economy: None,
            security: None,
            population: None,
            controlling_faction: None,
            power_state: None,
            powers: None,
            factions: None,
            stations: None,
            bodies: None,
            extra: Map::new(),
        }
    }

    /// Decode one JSON object
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Encode as a single compact JSON Lines entry (newline terminated)
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    /// Population (0 when absent)
    pub fn population(&self) -> u64 {
        self.population.unwrap_or(0)
    }

    pub fn powers(&self) -> &[String] {
        self.powers.as_deref().unwrap_or(&[])
    }

    pub fn factions(&self) -> &[Faction] {
        self.factions.as_deref().unwrap_or(&[])
    }

    pub fn stations(&self) -> &[Station] {
        self.stations.as_deref().unwrap_or(&[])
    }

    pub fn station_count(&self) -> usize {
        self.stations().len()
    }

    pub fn controlling_faction_name(&self) -> Option<&str> {
        self.controlling_faction.as_ref().map(FactionRef::name)
    }

    /// Builder-style helpers, mostly for tests and tooling
    pub fn with_population(mut self, population: u64) -> Self {
        self.population = Some(population);
        self
    }

    pub fn with_factions(mut self, factions: Vec<Faction>) -> Self {
        self.factions = Some(factions);
        self
    }

    pub fn with_stations(mut self, stations: Vec<Station>) -> Self {
        self.stations = Some(stations);
        self
    }
}

// ============================================================================
// Run reporting
// ============================================================================

/// A work unit (input file, record batch, sector) that failed as a whole.
///
/// Failed units contribute nothing to a run's statistics; siblings carry on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerError {
    pub unit: String,
    pub message: String,
}

impl WorkerError {
    pub fn new(unit: impl Into<String>, message: impl ToString) -> Self {
        Self {
            unit: unit.into(),
            message: message.to_string(),
        }
    }
}

impl fmt::Display for WorkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.unit, self.message)
    }
}
