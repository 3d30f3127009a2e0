use geojson::{Geometry, JsonObject};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

/// Which aggregate of a registered record is compared against living population.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateField {
    /// Korean nationals only. The living-population feed counts citizens.
    #[default]
    Citizens,
    Total,
}

impl AggregateField {
    pub fn key(self) -> &'static str {
        match self {
            AggregateField::Citizens => "citizens",
            AggregateField::Total => "total",
        }
    }
}

/// One row of the resident-registration table, keyed by normalized district name.
///
/// Only the compared aggregate is guaranteed to be present; everything else is
/// whatever the row happened to carry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegisteredPopulationRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub citizens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_m: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_f: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub citizens_m: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub citizens_f: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub foreigners: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub foreigners_m: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub foreigners_f: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub households: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_household: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seniors: Option<u64>,
}

impl RegisteredPopulationRecord {
    pub fn aggregate(&self, field: AggregateField) -> Option<u64> {
        match field {
            AggregateField::Citizens => self.citizens,
            AggregateField::Total => self.total,
        }
    }
}

/// A living-population count keyed by 10-digit administrative code.
///
/// Serializes as `{"<field>": count}` so it lines up with the registered record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RealPopulationRecord {
    pub field: AggregateField,
    pub count: u64,
}

impl Serialize for RealPopulationRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(self.field.key(), &self.count)?;
        map.end()
    }
}

/// The living-population side of a join.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RealPopulation {
    Observed(RealPopulationRecord),
    /// Code missing from the feed; the registered record stands in.
    Backfilled(RegisteredPopulationRecord),
}

impl RealPopulation {
    pub fn count(&self, field: AggregateField) -> Option<u64> {
        match self {
            RealPopulation::Observed(record) => Some(record.count),
            RealPopulation::Backfilled(record) => record.aggregate(field),
        }
    }

    pub fn is_backfilled(&self) -> bool {
        matches!(self, RealPopulation::Backfilled(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffDirection {
    /// More people present than registered (business/commercial districts).
    RealExceeds,
    /// Registered residents at least match the present population. Ties land here.
    RegisteredExceeds,
}

impl DiffDirection {
    pub fn label(self) -> &'static str {
        match self {
            DiffDirection::RealExceeds => "real population exceeds registered (+",
            DiffDirection::RegisteredExceeds => "registered population exceeds real (-",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Difference {
    pub diff_val: u64,
    pub direction: DiffDirection,
}

impl Difference {
    /// True for residential districts (registered >= real).
    pub fn diff_bool(&self) -> bool {
        self.direction == DiffDirection::RegisteredExceeds
    }
}

/// A district feature after province filtering and both joins.
#[derive(Debug, Clone)]
pub struct EnrichedDistrict {
    pub adm_nm: String,
    pub adm_cd2: String,
    pub geometry: Option<Geometry>,
    /// Source properties, untouched.
    pub properties: JsonObject,
    pub population: RegisteredPopulationRecord,
    pub real_population: RealPopulation,
    pub difference: Difference,
}
