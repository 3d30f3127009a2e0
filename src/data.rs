use crate::config::{AppConfig, InputConfig};
use crate::error::ReconcileError;
use crate::keys::{is_short_admin_code, normalize_name, pad_admin_code};
use crate::reconcile::{Reconciler, Reconciliation};
use crate::table::{parse_count, parse_rows, parse_whole_count};
use crate::types::{AggregateField, RealPopulationRecord, RegisteredPopulationRecord};
use anyhow::{anyhow, Context, Result};
use geo::Point;
use geojson::{FeatureCollection, GeoJson};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

// Fixed column offsets of the resident-registration table.
const COL_NAME: usize = 2;
const COL_HOUSEHOLDS: usize = 3;
const COL_TOTAL: usize = 4;
const COL_TOTAL_M: usize = 5;
const COL_TOTAL_F: usize = 6;
const COL_CITIZENS: usize = 7;
const COL_CITIZENS_M: usize = 8;
const COL_CITIZENS_F: usize = 9;
const COL_FOREIGNERS: usize = 10;
const COL_FOREIGNERS_M: usize = 11;
const COL_FOREIGNERS_F: usize = 12;
const COL_PER_HOUSEHOLD: usize = 13;
const COL_SENIORS: usize = 14;

/// The three inputs, all present. There is no partially loaded state.
#[derive(Debug)]
pub struct RawInputs {
    pub registered_rows: Vec<Vec<String>>,
    pub districts: FeatureCollection,
    pub real_population: RealPopulationDocument,
}

#[derive(Debug, Deserialize)]
pub struct RealPopulationDocument {
    #[serde(rename = "DATA")]
    pub data: Vec<RealPopulationEntry>,
}

#[derive(Debug, Deserialize)]
pub struct RealPopulationEntry {
    /// 8-digit administrative code.
    pub adstrd_code_se: String,
    /// Total living population; a number or a numeric string, often fractional.
    pub tot_lvpop_co: Value,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub rows: usize,
    pub records: usize,
    /// Header, subtotal and short rows that carried no usable counts.
    pub skipped: usize,
    pub duplicates: usize,
}

/// Reads all three inputs concurrently and fails as a whole if any of them fails.
pub async fn fetch_inputs(input: &InputConfig) -> Result<RawInputs> {
    let delimiter = input.delimiter_byte()?;

    let registered = async {
        let text = tokio::fs::read_to_string(&input.registered_table)
            .await
            .with_context(|| format!("Failed to read registered table: {:?}", input.registered_table))?;
        parse_rows(&text, delimiter).context("Failed to parse registered table")
    };

    let districts = async {
        let text = tokio::fs::read_to_string(&input.districts)
            .await
            .with_context(|| format!("Failed to read district GeoJSON: {:?}", input.districts))?;
        parse_districts(&text)
    };

    let real = async {
        let text = tokio::fs::read_to_string(&input.real_population)
            .await
            .with_context(|| format!("Failed to read living population: {:?}", input.real_population))?;
        serde_json::from_str::<RealPopulationDocument>(&text)
            .context("Failed to parse living population JSON")
    };

    let (registered_rows, districts, real_population) =
        tokio::try_join!(registered, districts, real)?;

    info!(
        rows = registered_rows.len(),
        features = districts.features.len(),
        real_records = real_population.data.len(),
        "inputs loaded"
    );

    Ok(RawInputs {
        registered_rows,
        districts,
        real_population,
    })
}

/// Load phase plus reconciliation. Dictionaries are rebuilt on every call.
pub async fn load_reconciliation(config: &AppConfig) -> Result<Reconciliation> {
    let inputs = fetch_inputs(&config.input).await?;

    let (registered, report) =
        build_registered_index(&inputs.registered_rows, config.reconcile.aggregate);
    info!(
        records = report.records,
        skipped = report.skipped,
        duplicates = report.duplicates,
        "registered population indexed"
    );
    let real = build_real_index(&inputs.real_population, config.reconcile.aggregate)?;

    let result = Reconciler::new(&registered, &real, &config.reconcile).run(&inputs.districts)?;
    Ok(result)
}

pub fn parse_districts(text: &str) -> Result<FeatureCollection> {
    let geojson: GeoJson = text.parse().context("Failed to parse district GeoJSON")?;
    match geojson {
        GeoJson::FeatureCollection(fc) => Ok(fc),
        _ => Err(ReconcileError::NotAFeatureCollection.into()),
    }
}

/// Builds the registered-population dictionary keyed by normalized district name.
///
/// Rows without a name or without a parseable `field` column are skipped; this
/// is how header and summary rows fall out. A repeated name replaces the earlier row.
pub fn build_registered_index(
    rows: &[Vec<String>],
    field: AggregateField,
) -> (HashMap<String, RegisteredPopulationRecord>, LoadReport) {
    let mut index = HashMap::new();
    let mut report = LoadReport {
        rows: rows.len(),
        ..LoadReport::default()
    };

    for row in rows {
        let Some(name) = row.get(COL_NAME) else {
            report.skipped += 1;
            continue;
        };
        let record = match registered_record(row, field) {
            Ok(record) => record,
            Err(e) => {
                debug!(name = %name, error = %e, "skipping registered row");
                report.skipped += 1;
                continue;
            }
        };

        let key = normalize_name(name);
        if index.insert(key.clone(), record).is_some() {
            warn!(key = %key, "duplicate registered district name, keeping the later row");
            report.duplicates += 1;
        }
    }

    report.records = index.len();
    (index, report)
}

fn registered_record(
    row: &[String],
    field: AggregateField,
) -> Result<RegisteredPopulationRecord, ReconcileError> {
    let compared = match field {
        AggregateField::Citizens => COL_CITIZENS,
        AggregateField::Total => COL_TOTAL,
    };
    let cell = row.get(compared).ok_or_else(|| ReconcileError::InvalidCount {
        value: String::new(),
    })?;
    parse_whole_count(cell)?;

    let optional = |idx: usize| row.get(idx).and_then(|c| parse_whole_count(c).ok());

    Ok(RegisteredPopulationRecord {
        total: optional(COL_TOTAL),
        citizens: optional(COL_CITIZENS),
        total_m: optional(COL_TOTAL_M),
        total_f: optional(COL_TOTAL_F),
        citizens_m: optional(COL_CITIZENS_M),
        citizens_f: optional(COL_CITIZENS_F),
        foreigners: optional(COL_FOREIGNERS),
        foreigners_m: optional(COL_FOREIGNERS_M),
        foreigners_f: optional(COL_FOREIGNERS_F),
        households: optional(COL_HOUSEHOLDS),
        per_household: row.get(COL_PER_HOUSEHOLD).and_then(|c| parse_count(c).ok()),
        seniors: optional(COL_SENIORS),
    })
}

/// Builds the living-population dictionary keyed by 10-digit administrative code.
pub fn build_real_index(
    doc: &RealPopulationDocument,
    field: AggregateField,
) -> Result<HashMap<String, RealPopulationRecord>, ReconcileError> {
    let mut index = HashMap::with_capacity(doc.data.len());
    for entry in &doc.data {
        if !is_short_admin_code(&entry.adstrd_code_se) {
            return Err(ReconcileError::InvalidAdminCode {
                code: entry.adstrd_code_se.clone(),
            });
        }
        let count = truncate_count(&entry.tot_lvpop_co)?;
        index.insert(
            pad_admin_code(&entry.adstrd_code_se),
            RealPopulationRecord { field, count },
        );
    }
    Ok(index)
}

/// Drops the fractional part: 12345.9 becomes 12345.
pub fn truncate_count(value: &Value) -> Result<u64, ReconcileError> {
    match value {
        Value::String(s) => parse_whole_count(s),
        Value::Number(n) => match n.as_f64() {
            Some(f) if f.is_finite() && f >= 0.0 => Ok(f.trunc() as u64),
            _ => Err(ReconcileError::InvalidCount {
                value: n.to_string(),
            }),
        },
        other => Err(ReconcileError::InvalidCount {
            value: other.to_string(),
        }),
    }
}

#[derive(Debug, Deserialize)]
struct FireTargetDocument {
    #[serde(rename = "DATA")]
    data: Vec<FireTargetEntry>,
}

#[derive(Debug, Deserialize)]
struct FireTargetEntry {
    #[serde(default)]
    lng: Value,
    #[serde(default)]
    lat: Value,
}

/// Loads fire-safety-target locations, dropping unusable coordinates.
pub fn load_fire_targets(path: &Path) -> Result<Vec<Point<f64>>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read fire targets: {:?}", path))?;
    parse_fire_targets(&text)
}

pub fn parse_fire_targets(text: &str) -> Result<Vec<Point<f64>>> {
    let doc: FireTargetDocument =
        serde_json::from_str(text).map_err(|e| anyhow!("Failed to parse fire target JSON: {e}"))?;
    let total = doc.data.len();

    let points: Vec<Point<f64>> = doc
        .data
        .iter()
        .filter_map(|entry| {
            let lng = coordinate(&entry.lng)?;
            let lat = coordinate(&entry.lat)?;
            is_coordinate_valid(lng, lat).then(|| Point::new(lng, lat))
        })
        .collect();

    info!(total, kept = points.len(), "fire targets loaded");
    Ok(points)
}

fn coordinate(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn is_coordinate_valid(lng: f64, lat: f64) -> bool {
    lng.is_finite() && lat.is_finite() && (-90.0..=90.0).contains(&lat)
}
