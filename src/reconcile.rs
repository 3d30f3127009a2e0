//! Joins district geometry with both population sources.
//!
//! The pipeline is `filter province → derive keys → join → difference`, and it
//! returns a fresh collection; source features are never mutated.
//!
//! Miss policy:
//! - registered lookup by district name: fatal ([`ReconcileError::MissingRegistered`]),
//! - living lookup by 10-digit code: backfilled with the registered record.

use crate::config::ReconcileConfig;
use crate::error::ReconcileError;
use crate::keys::district_key;
use crate::types::{
    AggregateField, DiffDirection, Difference, EnrichedDistrict, RealPopulation,
    RealPopulationRecord, RegisteredPopulationRecord,
};
use geojson::{Feature, FeatureCollection};
use std::collections::HashMap;
use tracing::{info, warn};

pub const PROP_NAME: &str = "adm_nm";
pub const PROP_CODE: &str = "adm_cd2";
pub const PROP_PROVINCE: &str = "sidonm";

#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub districts: Vec<EnrichedDistrict>,
    /// `adm_cd2` values that had no living-population record.
    pub backfilled: Vec<String>,
}

impl Reconciliation {
    /// (real exceeds, registered exceeds)
    pub fn direction_split(&self) -> (usize, usize) {
        let real = self
            .districts
            .iter()
            .filter(|d| d.difference.direction == DiffDirection::RealExceeds)
            .count();
        (real, self.districts.len() - real)
    }
}

/// Sign convention: `real - registered`. Equal counts count as registered-exceeds.
pub fn difference(registered: u64, real: u64) -> Difference {
    if registered < real {
        Difference {
            diff_val: real - registered,
            direction: DiffDirection::RealExceeds,
        }
    } else {
        Difference {
            diff_val: registered - real,
            direction: DiffDirection::RegisteredExceeds,
        }
    }
}

pub fn string_property<'a>(feature: &'a Feature, property: &str) -> Result<&'a str, ReconcileError> {
    feature
        .property(property)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ReconcileError::MissingProperty {
            property: property.to_string(),
        })
}

/// Features whose province equals `target` exactly. Features with no province are dropped.
pub fn filter_province<'a>(
    features: &'a [Feature],
    target: &'a str,
) -> impl Iterator<Item = &'a Feature> + 'a {
    features
        .iter()
        .filter(move |f| string_property(f, PROP_PROVINCE).map_or(false, |p| p == target))
}

pub struct Reconciler<'a> {
    registered: &'a HashMap<String, RegisteredPopulationRecord>,
    real: &'a HashMap<String, RealPopulationRecord>,
    config: &'a ReconcileConfig,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        registered: &'a HashMap<String, RegisteredPopulationRecord>,
        real: &'a HashMap<String, RealPopulationRecord>,
        config: &'a ReconcileConfig,
    ) -> Self {
        Self {
            registered,
            real,
            config,
        }
    }

    fn field(&self) -> AggregateField {
        self.config.aggregate
    }

    pub fn run(&self, collection: &FeatureCollection) -> Result<Reconciliation, ReconcileError> {
        let districts = filter_province(&collection.features, &self.config.target_province)
            .map(|feature| self.enrich(feature))
            .collect::<Result<Vec<_>, _>>()?;

        let backfilled: Vec<String> = districts
            .iter()
            .filter(|d| d.real_population.is_backfilled())
            .map(|d| d.adm_cd2.clone())
            .collect();

        let result = Reconciliation {
            districts,
            backfilled,
        };
        let (real_exceeds, registered_exceeds) = result.direction_split();
        info!(
            retained = result.districts.len(),
            backfilled = result.backfilled.len(),
            real_exceeds,
            registered_exceeds,
            "reconciliation complete"
        );
        Ok(result)
    }

    pub fn enrich(&self, feature: &Feature) -> Result<EnrichedDistrict, ReconcileError> {
        let adm_nm = string_property(feature, PROP_NAME)?;
        let adm_cd2 = string_property(feature, PROP_CODE)?;

        let key = district_key(adm_nm)?;
        // A record without the compared aggregate counts as missing.
        let (population, registered_count) = match self.registered.get(&key) {
            Some(record) => match record.aggregate(self.field()) {
                Some(count) => (record.clone(), count),
                None => return Err(ReconcileError::MissingRegistered { key }),
            },
            None => return Err(ReconcileError::MissingRegistered { key }),
        };

        let (real_population, real_count) = match self.real.get(adm_cd2) {
            Some(record) => (RealPopulation::Observed(*record), record.count),
            None => {
                if self.config.log_missing_real {
                    warn!(adm_cd2, "no living population record, backfilling with registered");
                }
                (RealPopulation::Backfilled(population.clone()), registered_count)
            }
        };

        let difference = difference(registered_count, real_count);

        Ok(EnrichedDistrict {
            adm_nm: adm_nm.to_string(),
            adm_cd2: adm_cd2.to_string(),
            geometry: feature.geometry.clone(),
            properties: feature.properties.clone().unwrap_or_default(),
            population,
            real_population,
            difference,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn feature(name: &str, code: &str, province: &str) -> Feature {
        serde_json::from_value(json!({
            "type": "Feature",
            "geometry": {"type": "Point", "coordinates": [126.98, 37.57]},
            "properties": {"adm_nm": name, "adm_cd2": code, "sidonm": province}
        }))
        .unwrap()
    }

    fn registered(citizens: u64, total: u64) -> RegisteredPopulationRecord {
        RegisteredPopulationRecord {
            total: Some(total),
            citizens: Some(citizens),
            total_m: None,
            total_f: None,
            citizens_m: None,
            citizens_f: None,
            foreigners: None,
            foreigners_m: None,
            foreigners_f: None,
            households: None,
            per_household: None,
            seniors: None,
        }
    }

    fn seoul() -> ReconcileConfig {
        ReconcileConfig {
            target_province: "Seoul".into(),
            ..ReconcileConfig::default()
        }
    }

    #[test]
    fn difference_sign_and_tie_break() {
        assert_eq!(
            difference(10_000, 9_500),
            Difference {
                diff_val: 500,
                direction: DiffDirection::RegisteredExceeds
            }
        );
        assert_eq!(
            difference(9_500, 10_000),
            Difference {
                diff_val: 500,
                direction: DiffDirection::RealExceeds
            }
        );
        let tie = difference(42, 42);
        assert_eq!(tie.diff_val, 0);
        assert_eq!(tie.direction, DiffDirection::RegisteredExceeds);
        assert!(tie.diff_bool());
    }

    #[test]
    fn jongno_scenario() {
        let registered_index = HashMap::from([("Jongno-dong".to_string(), registered(10_000, 10_400))]);
        let real_index = HashMap::from([(
            "1111051500".to_string(),
            RealPopulationRecord {
                field: AggregateField::Citizens,
                count: 9_500,
            },
        )]);
        let config = seoul();
        let collection = FeatureCollection {
            bbox: None,
            features: vec![feature("Seoul Jongno-gu Jongno-dong", "1111051500", "Seoul")],
            foreign_members: None,
        };

        let result = Reconciler::new(&registered_index, &real_index, &config)
            .run(&collection)
            .unwrap();

        assert_eq!(result.districts.len(), 1);
        let d = &result.districts[0];
        assert_eq!(d.difference.diff_val, 500);
        assert_eq!(d.difference.direction, DiffDirection::RegisteredExceeds);
        assert!(d.difference.diff_bool());
        assert!(result.backfilled.is_empty());
    }

    #[test]
    fn out_of_province_features_are_dropped_before_join() {
        let registered_index = HashMap::from([("a".to_string(), registered(1, 1))]);
        let real_index = HashMap::new();
        let config = seoul();
        // The Busan feature has a malformed name; filtering must happen first.
        let collection = FeatureCollection {
            bbox: None,
            features: vec![
                feature("Seoul Gu a", "1100000000", "Seoul"),
                feature("Busan", "2600000000", "Busan"),
            ],
            foreign_members: None,
        };

        let result = Reconciler::new(&registered_index, &real_index, &config)
            .run(&collection)
            .unwrap();
        assert_eq!(result.districts.len(), 1);
        assert!(result
            .districts
            .iter()
            .all(|d| d.properties["sidonm"] == json!("Seoul")));
    }

    #[test]
    fn missing_real_record_is_backfilled() {
        let registered_index = HashMap::from([("b".to_string(), registered(700, 800))]);
        let real_index = HashMap::new();
        let config = seoul();

        let d = Reconciler::new(&registered_index, &real_index, &config)
            .enrich(&feature("Seoul Gu b", "1122233300", "Seoul"))
            .unwrap();

        assert_eq!(d.real_population, RealPopulation::Backfilled(d.population.clone()));
        assert_eq!(d.difference.diff_val, 0);
        assert!(d.difference.diff_bool());
    }

    #[test]
    fn aggregate_choice_changes_compared_field() {
        let registered_index = HashMap::from([("c".to_string(), registered(900, 1_200))]);
        let real_index = HashMap::from([(
            "1100000100".to_string(),
            RealPopulationRecord {
                field: AggregateField::Total,
                count: 1_000,
            },
        )]);
        let config = ReconcileConfig {
            aggregate: AggregateField::Total,
            ..seoul()
        };

        let d = Reconciler::new(&registered_index, &real_index, &config)
            .enrich(&feature("Seoul Gu c", "1100000100", "Seoul"))
            .unwrap();
        assert_eq!(d.difference.diff_val, 200);
        assert_eq!(d.difference.direction, DiffDirection::RegisteredExceeds);
    }

    #[test]
    fn citizens_only_row_joins() {
        let rows: Vec<Vec<String>> = vec![["x", "y", "Jongno-dong", "", "", "", "", "10,000"]
            .iter()
            .map(|c| c.to_string())
            .collect()];
        let (registered_index, _) =
            crate::data::build_registered_index(&rows, AggregateField::Citizens);
        let real_index = HashMap::from([(
            "1111051500".to_string(),
            RealPopulationRecord {
                field: AggregateField::Citizens,
                count: 9_500,
            },
        )]);
        let config = seoul();

        let d = Reconciler::new(&registered_index, &real_index, &config)
            .enrich(&feature("Seoul Jongno-gu Jongno-dong", "1111051500", "Seoul"))
            .unwrap();
        assert_eq!(d.difference.diff_val, 500);
        assert_eq!(d.difference.direction, DiffDirection::RegisteredExceeds);
        assert!(d.difference.diff_bool());
    }

    #[test]
    fn record_without_compared_aggregate_is_missing() {
        let mut record = registered(10, 10);
        record.total = None;
        let registered_index = HashMap::from([("d".to_string(), record)]);
        let real_index = HashMap::new();
        let config = ReconcileConfig {
            aggregate: AggregateField::Total,
            ..seoul()
        };

        let err = Reconciler::new(&registered_index, &real_index, &config)
            .enrich(&feature("Seoul Gu d", "1100000200", "Seoul"))
            .unwrap_err();
        assert_eq!(err, ReconcileError::MissingRegistered { key: "d".into() });
    }

    #[test]
    fn malformed_name_aborts() {
        let registered_index = HashMap::new();
        let real_index = HashMap::new();
        let config = seoul();
        let collection = FeatureCollection {
            bbox: None,
            features: vec![feature("Seoul Jongno-gu", "1111051500", "Seoul")],
            foreign_members: None,
        };

        let err = Reconciler::new(&registered_index, &real_index, &config)
            .run(&collection)
            .unwrap_err();
        assert_eq!(
            err,
            ReconcileError::MalformedDistrictName {
                name: "Seoul Jongno-gu".into()
            }
        );
    }

    #[test]
    fn missing_registered_record_aborts() {
        let registered_index = HashMap::new();
        let real_index = HashMap::new();
        let config = seoul();

        let err = Reconciler::new(&registered_index, &real_index, &config)
            .enrich(&feature("Seoul Gu nowhere", "1100000000", "Seoul"))
            .unwrap_err();
        assert_eq!(err, ReconcileError::MissingRegistered { key: "nowhere".into() });
    }

    #[test]
    fn missing_code_property_is_reported() {
        let registered_index = HashMap::new();
        let real_index = HashMap::new();
        let config = seoul();
        let f: Feature = serde_json::from_value(json!({
            "type": "Feature",
            "geometry": null,
            "properties": {"adm_nm": "Seoul Gu x", "sidonm": "Seoul"}
        }))
        .unwrap();

        let err = Reconciler::new(&registered_index, &real_index, &config)
            .enrich(&f)
            .unwrap_err();
        assert_eq!(err, ReconcileError::MissingProperty { property: "adm_cd2".into() });
    }
}
