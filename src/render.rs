use crate::config::{HexbinConfig, LightRig, Material, PointLightRig, RenderConfig, ViewState};
use crate::types::{AggregateField, EnrichedDistrict};
use anyhow::{anyhow, Context, Result};
use geojson::{Feature, FeatureCollection, JsonObject};
use serde::Serialize;
use serde_json::json;
use std::fs;
use std::path::Path;

pub type Rgb = [u8; 3];

/// A sequential color scale over a numeric domain, interpolated linearly between stops.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorRamp {
    stops: Vec<Rgb>,
    domain: [f64; 2],
}

impl ColorRamp {
    pub fn new(stops: Vec<Rgb>, domain: [f64; 2]) -> Result<Self> {
        if stops.is_empty() {
            return Err(anyhow!("color ramp needs at least one stop"));
        }
        if !(domain[0] < domain[1]) {
            return Err(anyhow!("color ramp domain {:?} is empty", domain));
        }
        Ok(Self { stops, domain })
    }

    pub fn from_hex(stops: &[String], domain: [f64; 2]) -> Result<Self> {
        let stops = stops
            .iter()
            .map(|s| hex_to_rgb(s))
            .collect::<Result<Vec<_>>>()?;
        Self::new(stops, domain)
    }

    /// Values outside the domain clamp to the end stops.
    pub fn sample(&self, value: f64) -> Rgb {
        if self.stops.len() == 1 || value.is_nan() {
            return self.stops[0];
        }
        let t = ((value - self.domain[0]) / (self.domain[1] - self.domain[0])).clamp(0.0, 1.0);
        let scaled = t * (self.stops.len() - 1) as f64;
        let i = (scaled.floor() as usize).min(self.stops.len() - 2);
        let frac = scaled - i as f64;

        let (a, b) = (self.stops[i], self.stops[i + 1]);
        let mut out = [0u8; 3];
        for c in 0..3 {
            out[c] = (a[c] as f64 + (b[c] as f64 - a[c] as f64) * frac).round() as u8;
        }
        out
    }
}

pub fn hex_to_rgb(hex: &str) -> Result<Rgb> {
    let digits = hex.trim_start_matches('#');
    if digits.len() != 6 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(anyhow!("invalid hex color '{}'", hex));
    }
    let channel = |range: std::ops::Range<usize>| {
        u8::from_str_radix(&digits[range], 16).with_context(|| format!("invalid hex color '{}'", hex))
    };
    Ok([channel(0..2)?, channel(2..4)?, channel(4..6)?])
}

/// Turns enriched districts into fill colors and extrusion heights.
pub struct DistrictStyle {
    residential: ColorRamp,
    commercial: Option<ColorRamp>,
    value_scale: f64,
    elevation_scale: f64,
}

impl DistrictStyle {
    pub fn from_config(config: &RenderConfig) -> Result<Self> {
        let residential = ColorRamp::from_hex(&config.residential_ramp, config.color_domain)
            .context("residential_ramp")?;
        let commercial = if config.bidirectional {
            Some(
                ColorRamp::from_hex(&config.commercial_ramp, config.color_domain)
                    .context("commercial_ramp")?,
            )
        } else {
            None
        };
        Ok(Self {
            residential,
            commercial,
            value_scale: config.value_scale,
            elevation_scale: config.elevation_scale,
        })
    }

    pub fn fill_color(&self, district: &EnrichedDistrict) -> Rgb {
        let value = district.difference.diff_val as f64 / self.value_scale;
        match &self.commercial {
            Some(commercial) if !district.difference.diff_bool() => commercial.sample(value),
            _ => self.residential.sample(value),
        }
    }

    pub fn elevation(&self, district: &EnrichedDistrict) -> f64 {
        district.difference.diff_val as f64 * self.elevation_scale
    }
}

/// The output layer: source geometry untouched, properties extended.
pub fn district_collection(
    districts: &[EnrichedDistrict],
    style: &DistrictStyle,
) -> Result<FeatureCollection> {
    let features = districts
        .iter()
        .map(|district| {
            let mut properties: JsonObject = district.properties.clone();
            properties.insert("population".into(), serde_json::to_value(&district.population)?);
            properties.insert(
                "real_population".into(),
                serde_json::to_value(&district.real_population)?,
            );
            properties.insert("diff_val".into(), json!(district.difference.diff_val));
            properties.insert("diff_str".into(), json!(district.difference.direction.label()));
            properties.insert("diff_bool".into(), json!(district.difference.diff_bool()));
            properties.insert("elevation".into(), json!(style.elevation(district)));
            properties.insert("fill_color".into(), json!(style.fill_color(district)));

            Ok(Feature {
                bbox: None,
                geometry: district.geometry.clone(),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            })
        })
        .collect::<Result<Vec<_>, serde_json::Error>>()?;

    Ok(FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    })
}

/// Everything the map front end needs besides the layer data.
#[derive(Debug, Serialize)]
pub struct Scene {
    pub layer_id: String,
    pub initial_view_state: ViewState,
    pub lights: LightRig,
    pub opacity: f64,
    pub extruded: bool,
    pub wireframe: bool,
    pub line_color: Rgb,
}

impl Scene {
    pub fn population(config: &RenderConfig) -> Self {
        Self {
            layer_id: "population".to_string(),
            initial_view_state: config.view.clone(),
            lights: config.lights.clone(),
            opacity: 0.9,
            extruded: true,
            wireframe: true,
            line_color: [255, 255, 255],
        }
    }
}

/// Scene for the fire-target hexagon map.
#[derive(Debug, Serialize)]
pub struct HexagonScene {
    pub layer_id: String,
    pub initial_view_state: ViewState,
    pub lights: PointLightRig,
    pub material: Material,
    pub extruded: bool,
    pub coverage: f64,
}

impl HexagonScene {
    pub fn fire_targets(config: &HexbinConfig) -> Self {
        Self {
            layer_id: "fire_target".to_string(),
            initial_view_state: config.view.clone(),
            lights: config.lights.clone(),
            material: config.material.clone(),
            extruded: true,
            coverage: config.coverage,
        }
    }
}

/// Hover text for one district.
pub fn tooltip(district: &EnrichedDistrict, field: AggregateField) -> String {
    let show = |n: Option<u64>| n.map_or_else(|| "-".to_string(), |n| n.to_string());
    format!(
        "{}\n{} {})\nreal population ({}): {}\nregistered population ({}): {}",
        district.adm_nm,
        district.difference.direction.label(),
        district.difference.diff_val,
        field.key(),
        show(district.real_population.count(field)),
        field.key(),
        show(district.population.aggregate(field)),
    )
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory: {:?}", parent))?;
    }
    let text = serde_json::to_string(value)?;
    fs::write(path, text).with_context(|| format!("Failed to write {:?}", path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::difference;
    use crate::types::{RealPopulation, RealPopulationRecord, RegisteredPopulationRecord};

    fn district(registered: u64, real: u64) -> EnrichedDistrict {
        let population = RegisteredPopulationRecord {
            total: Some(registered),
            citizens: Some(registered),
            total_m: None,
            total_f: None,
            citizens_m: None,
            citizens_f: None,
            foreigners: None,
            foreigners_m: None,
            foreigners_f: None,
            households: Some(10),
            per_household: None,
            seniors: None,
        };
        EnrichedDistrict {
            adm_nm: "Seoul Jongno-gu Jongno-dong".into(),
            adm_cd2: "1111051500".into(),
            geometry: None,
            properties: JsonObject::new(),
            population,
            real_population: RealPopulation::Observed(RealPopulationRecord {
                field: AggregateField::Citizens,
                count: real,
            }),
            difference: difference(registered, real),
        }
    }

    #[test]
    fn parses_hex_colors() {
        assert_eq!(hex_to_rgb("#08306b").unwrap(), [8, 48, 107]);
        assert_eq!(hex_to_rgb("ffffff").unwrap(), [255, 255, 255]);
        assert!(hex_to_rgb("#fff").is_err());
        assert!(hex_to_rgb("#gggggg").is_err());
        assert!(hex_to_rgb("#+f+f+f").is_err());
        assert!(hex_to_rgb("#-1ffff").is_err());
    }

    #[test]
    fn ramp_interpolates_and_clamps() {
        let ramp = ColorRamp::new(vec![[0, 0, 0], [200, 100, 50]], [0.0, 40.0]).unwrap();
        assert_eq!(ramp.sample(-5.0), [0, 0, 0]);
        assert_eq!(ramp.sample(20.0), [100, 50, 25]);
        assert_eq!(ramp.sample(40.0), [200, 100, 50]);
        assert_eq!(ramp.sample(1e9), [200, 100, 50]);
        assert!(ColorRamp::new(vec![], [0.0, 1.0]).is_err());
        assert!(ColorRamp::new(vec![[0, 0, 0]], [1.0, 1.0]).is_err());
    }

    #[test]
    fn bidirectional_style_picks_ramp_by_direction() {
        let config = RenderConfig {
            bidirectional: true,
            ..RenderConfig::default()
        };
        let style = DistrictStyle::from_config(&config).unwrap();

        let residential = district(50_000, 10_000);
        let commercial = district(10_000, 50_000);
        assert_eq!(style.fill_color(&residential), [8, 48, 107]);
        assert_eq!(style.fill_color(&commercial), [127, 39, 4]);
        assert_eq!(style.elevation(&residential), 4_000.0);
    }

    #[test]
    fn collection_carries_annotations() {
        let style = DistrictStyle::from_config(&RenderConfig::default()).unwrap();
        let fc = district_collection(&[district(10_000, 9_500)], &style).unwrap();
        let props = fc.features[0].properties.as_ref().unwrap();

        assert_eq!(props["diff_val"], json!(500));
        assert_eq!(props["diff_bool"], json!(true));
        assert_eq!(props["diff_str"], json!("registered population exceeds real (-"));
        assert_eq!(props["population"]["citizens"], json!(10_000));
        assert_eq!(props["population"]["households"], json!(10));
        assert!(props["population"].get("seniors").is_none());
        assert_eq!(props["real_population"], json!({"citizens": 9_500}));
        assert_eq!(props["elevation"], json!(50.0));
    }

    #[test]
    fn hexagon_scene_carries_fire_target_setup() {
        let scene = HexagonScene::fire_targets(&HexbinConfig::default());
        let value = serde_json::to_value(&scene).unwrap();

        assert_eq!(value["layer_id"], json!("fire_target"));
        assert_eq!(value["initial_view_state"]["zoom"], json!(10.0));
        assert_eq!(value["initial_view_state"]["minZoom"], json!(1.0));
        assert_eq!(value["lights"]["points"].as_array().unwrap().len(), 2);
        assert_eq!(value["lights"]["points"][0]["intensity"], json!(0.8));
        assert_eq!(value["material"]["shininess"], json!(32.0));
        assert_eq!(value["material"]["specularColor"], json!([51, 51, 51]));
    }

    #[test]
    fn district_scene_uses_camel_case_view() {
        let value = serde_json::to_value(Scene::population(&RenderConfig::default())).unwrap();
        assert_eq!(value["initial_view_state"]["maxZoom"], json!(16.0));
        assert_eq!(value["lights"]["sunTimestampMs"], json!(1_564_696_800_000i64));
    }

    #[test]
    fn tooltip_mentions_both_counts() {
        let text = tooltip(&district(10_000, 9_500), AggregateField::Citizens);
        assert!(text.starts_with("Seoul Jongno-gu Jongno-dong"));
        assert!(text.contains("registered population exceeds real (- 500)"));
        assert!(text.contains("real population (citizens): 9500"));
    }
}
