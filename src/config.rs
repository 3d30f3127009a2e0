use crate::types::AggregateField;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub input: InputConfig,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub hexbin: HexbinConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    pub registered_table: PathBuf,
    pub districts: PathBuf,
    pub real_population: PathBuf,
    pub fire_targets: Option<PathBuf>,
    /// Sniffed from the table when unset.
    pub delimiter: Option<char>,
}

impl InputConfig {
    pub fn delimiter_byte(&self) -> Result<Option<u8>> {
        match self.delimiter {
            None => Ok(None),
            Some(c) if c.is_ascii() => Ok(Some(c as u8)),
            Some(c) => anyhow::bail!("delimiter must be a single ASCII character, got {c:?}"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ReconcileConfig {
    pub target_province: String,
    pub aggregate: AggregateField,
    pub log_missing_real: bool,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            target_province: "서울특별시".to_string(),
            aggregate: AggregateField::Citizens,
            log_missing_real: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RenderConfig {
    /// `diff_val` is divided by this before it hits the color ramp.
    pub value_scale: f64,
    pub color_domain: [f64; 2],
    pub elevation_scale: f64,
    /// Use `commercial_ramp` for districts where living population wins.
    pub bidirectional: bool,
    pub residential_ramp: Vec<String>,
    pub commercial_ramp: Vec<String>,
    pub view: ViewState,
    pub lights: LightRig,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            value_scale: 1000.0,
            color_domain: [0.0, 40.0],
            elevation_scale: 0.1,
            bidirectional: false,
            residential_ramp: to_strings(&[
                "#f7fbff", "#deebf7", "#c6dbef", "#9ecae1", "#6baed6", "#4292c6", "#2171b5",
                "#08519c", "#08306b",
            ]),
            commercial_ramp: to_strings(&[
                "#fff5eb", "#fee6ce", "#fdd0a2", "#fdae6b", "#fd8d3c", "#f16913", "#d94801",
                "#a63603", "#7f2704",
            ]),
            view: ViewState::default(),
            lights: LightRig::default(),
        }
    }
}

/// Initial camera for the front end. Seoul City Hall by default.
///
/// Read from snake_case TOML, written as the camelCase `initialViewState` the map expects.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default, rename_all(serialize = "camelCase"))]
pub struct ViewState {
    pub latitude: f64,
    pub longitude: f64,
    pub zoom: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_zoom: Option<f64>,
    pub max_zoom: f64,
    pub pitch: f64,
    pub bearing: f64,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            latitude: 37.5663,
            longitude: 126.9779,
            zoom: 11.0,
            min_zoom: None,
            max_zoom: 16.0,
            pitch: 45.0,
            bearing: 0.0,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default, rename_all(serialize = "camelCase"))]
pub struct LightRig {
    pub ambient: Light,
    pub sun: Light,
    /// Milliseconds since the epoch; positions the directional light.
    pub sun_timestamp_ms: i64,
    pub shadows: bool,
}

impl Default for LightRig {
    fn default() -> Self {
        Self {
            ambient: Light::default(),
            sun: Light::default(),
            // 2019-08-01T22:00:00Z
            sun_timestamp_ms: 1_564_696_800_000,
            shadows: false,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct Light {
    pub color: [u8; 3],
    pub intensity: f64,
}

impl Default for Light {
    fn default() -> Self {
        Self {
            color: [255, 255, 255],
            intensity: 1.0,
        }
    }
}

/// A positioned light; `position` is `[lng, lat, altitude_m]`.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PointLight {
    pub color: [u8; 3],
    pub intensity: f64,
    pub position: [f64; 3],
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default, rename_all(serialize = "camelCase"))]
pub struct PointLightRig {
    pub ambient: Light,
    pub points: Vec<PointLight>,
}

impl Default for PointLightRig {
    fn default() -> Self {
        Self {
            ambient: Light::default(),
            points: vec![
                PointLight {
                    color: [255, 255, 255],
                    intensity: 0.8,
                    position: [-0.144528, 49.739968, 80000.0],
                },
                PointLight {
                    color: [255, 255, 255],
                    intensity: 0.8,
                    position: [-3.807751, 54.104682, 8000.0],
                },
            ],
        }
    }
}

/// Surface response of the extruded columns.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default, rename_all(serialize = "camelCase"))]
pub struct Material {
    pub ambient: f64,
    pub diffuse: f64,
    pub shininess: f64,
    pub specular_color: [u8; 3],
}

impl Default for Material {
    fn default() -> Self {
        Self {
            ambient: 0.64,
            diffuse: 0.6,
            shininess: 32.0,
            specular_color: [51, 51, 51],
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HexbinConfig {
    pub radius_m: f64,
    pub coverage: f64,
    pub lower_percentile: f64,
    pub upper_percentile: f64,
    pub elevation_range: [f64; 2],
    pub elevation_scale: f64,
    pub color_range: Vec<String>,
    pub view: ViewState,
    pub lights: PointLightRig,
    pub material: Material,
}

impl Default for HexbinConfig {
    fn default() -> Self {
        Self {
            radius_m: 600.0,
            coverage: 1.0,
            lower_percentile: 0.0,
            upper_percentile: 100.0,
            elevation_range: [0.0, 100.0],
            elevation_scale: 50.0,
            color_range: to_strings(&[
                "#fee5d9", "#fcbba1", "#fc9272", "#fb6a4a", "#de2d26", "#a50f15",
            ]),
            view: ViewState {
                zoom: 10.0,
                min_zoom: Some(1.0),
                max_zoom: 15.0,
                pitch: 40.5,
                bearing: -27.0,
                ..ViewState::default()
            },
            lights: PointLightRig::default(),
            material: Material::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    pub dir: PathBuf,
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "Failed to parse TOML configuration")?;
        Ok(config)
    }
}
