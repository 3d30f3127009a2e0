//! Point-density aggregation of fire-safety targets into hexagon bins.
//!
//! Points are projected onto a local equirectangular plane (meters) around their
//! mean latitude and binned on a pointy-top hexagon grid.

use crate::config::HexbinConfig;
use crate::render::{hex_to_rgb, Rgb};
use anyhow::{anyhow, Result};
use geo::{Coord, LineString, Point, Polygon};
use geojson::{Feature, FeatureCollection, Geometry, JsonObject};
use rayon::prelude::*;
use serde_json::json;
use std::collections::HashMap;
use std::f64::consts::PI;

const EARTH_RADIUS_M: f64 = 6_378_137.0;
const SQRT_3: f64 = 1.732_050_807_568_877_2;

/// Degrees → local meters, anchored at a reference latitude.
#[derive(Debug, Clone, Copy)]
pub struct LocalProjection {
    m_per_deg_lng: f64,
    m_per_deg_lat: f64,
}

impl LocalProjection {
    pub fn new(reference_lat: f64) -> Self {
        let m_per_deg_lat = EARTH_RADIUS_M * PI / 180.0;
        Self {
            m_per_deg_lng: m_per_deg_lat * reference_lat.to_radians().cos(),
            m_per_deg_lat,
        }
    }

    pub fn project(&self, p: Point<f64>) -> (f64, f64) {
        (p.x() * self.m_per_deg_lng, p.y() * self.m_per_deg_lat)
    }

    pub fn unproject(&self, x: f64, y: f64) -> Point<f64> {
        Point::new(x / self.m_per_deg_lng, y / self.m_per_deg_lat)
    }
}

/// Axial coordinates of a hexagon.
pub type HexId = (i64, i64);

pub fn hex_of(x: f64, y: f64, radius: f64) -> HexId {
    let q = (SQRT_3 / 3.0 * x - y / 3.0) / radius;
    let r = (2.0 / 3.0 * y) / radius;
    cube_round(q, r)
}

fn cube_round(q: f64, r: f64) -> HexId {
    let s = -q - r;
    let (mut rq, mut rr, rs) = (q.round(), r.round(), s.round());
    let (dq, dr, ds) = ((rq - q).abs(), (rr - r).abs(), (rs - s).abs());
    if dq > dr && dq > ds {
        rq = -rr - rs;
    } else if dr > ds {
        rr = -rq - rs;
    }
    (rq as i64, rr as i64)
}

pub fn hex_center(id: HexId, radius: f64) -> (f64, f64) {
    let (q, r) = (id.0 as f64, id.1 as f64);
    (radius * (SQRT_3 * q + SQRT_3 / 2.0 * r), radius * 1.5 * r)
}

#[derive(Debug, Clone, PartialEq)]
pub struct HexBin {
    pub id: HexId,
    pub count: usize,
    pub center: Point<f64>,
    pub polygon: Polygon<f64>,
}

pub fn aggregate(points: &[Point<f64>], config: &HexbinConfig) -> Result<Vec<HexBin>> {
    if !(config.radius_m > 0.0) {
        return Err(anyhow!("hexbin radius must be positive, got {}", config.radius_m));
    }
    if points.is_empty() {
        return Ok(Vec::new());
    }

    let mean_lat = points.iter().map(|p| p.y()).sum::<f64>() / points.len() as f64;
    let projection = LocalProjection::new(mean_lat);
    let radius = config.radius_m;

    let counts: HashMap<HexId, usize> = points
        .par_iter()
        .fold(HashMap::new, |mut acc, p| {
            let (x, y) = projection.project(*p);
            *acc.entry(hex_of(x, y, radius)).or_insert(0) += 1;
            acc
        })
        .reduce(HashMap::new, |mut a, b| {
            for (id, n) in b {
                *a.entry(id).or_insert(0) += n;
            }
            a
        });

    let mut bins: Vec<HexBin> = counts
        .into_iter()
        .map(|(id, count)| {
            let (cx, cy) = hex_center(id, radius);
            HexBin {
                id,
                count,
                center: projection.unproject(cx, cy),
                polygon: hexagon(&projection, cx, cy, radius * config.coverage),
            }
        })
        .collect();
    bins.sort_by_key(|b| b.id);
    Ok(bins)
}

fn hexagon(projection: &LocalProjection, cx: f64, cy: f64, size: f64) -> Polygon<f64> {
    let mut ring: Vec<Coord<f64>> = (0..6)
        .map(|i| {
            let angle = (60.0 * i as f64 - 30.0).to_radians();
            projection
                .unproject(cx + size * angle.cos(), cy + size * angle.sin())
                .into()
        })
        .collect();
    ring.push(ring[0]);
    Polygon::new(LineString::new(ring), vec![])
}

/// Linear-interpolated percentile of an ascending slice.
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = (p.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64))
}

/// Colors and heights for the bins that fall inside the percentile window.
pub struct BinStyle {
    colors: Vec<Rgb>,
    domain: [f64; 2],
    elevation_range: [f64; 2],
    elevation_scale: f64,
}

impl BinStyle {
    pub fn new(bins: &[HexBin], config: &HexbinConfig) -> Result<Self> {
        let colors = config
            .color_range
            .iter()
            .map(|c| hex_to_rgb(c))
            .collect::<Result<Vec<_>>>()?;
        if colors.is_empty() {
            return Err(anyhow!("hexbin color_range is empty"));
        }

        let mut counts: Vec<f64> = bins.iter().map(|b| b.count as f64).collect();
        counts.sort_by(f64::total_cmp);
        let lower = percentile(&counts, config.lower_percentile).unwrap_or(0.0);
        let upper = percentile(&counts, config.upper_percentile).unwrap_or(0.0);

        Ok(Self {
            colors,
            domain: [lower, upper],
            elevation_range: config.elevation_range,
            elevation_scale: config.elevation_scale,
        })
    }

    pub fn contains(&self, count: usize) -> bool {
        let v = count as f64;
        v >= self.domain[0] && v <= self.domain[1]
    }

    /// Quantized onto the color range; a collapsed domain maps to the last color.
    pub fn color(&self, count: usize) -> Rgb {
        let n = self.colors.len();
        let [lo, hi] = self.domain;
        if hi <= lo {
            return self.colors[n - 1];
        }
        let t = (count as f64 - lo) / (hi - lo);
        let idx = ((t * n as f64).floor() as usize).min(n - 1);
        self.colors[idx]
    }

    pub fn elevation(&self, count: usize) -> f64 {
        let [lo, hi] = self.domain;
        let t = if hi > lo {
            (count as f64 - lo) / (hi - lo)
        } else {
            0.5
        };
        let [e0, e1] = self.elevation_range;
        (e0 + (e1 - e0) * t) * self.elevation_scale
    }
}

/// Hover text for one bin: target count and center to 6 decimals.
pub fn bin_tooltip(bin: &HexBin) -> String {
    let (lat, lng) = (bin.center.y(), bin.center.x());
    let fmt = |v: f64| if v.is_finite() { format!("{v:.6}") } else { String::new() };
    format!(
        "fire safety targets = {}\nlat, lng = ({}, {})",
        bin.count,
        fmt(lat),
        fmt(lng)
    )
}

pub fn hexbin_collection(bins: &[HexBin], style: &BinStyle) -> FeatureCollection {
    let features = bins
        .iter()
        .filter(|b| style.contains(b.count))
        .map(|bin| {
            let mut properties = JsonObject::new();
            properties.insert("count".into(), json!(bin.count));
            properties.insert("position".into(), json!([bin.center.x(), bin.center.y()]));
            properties.insert("fill_color".into(), json!(style.color(bin.count)));
            properties.insert("elevation".into(), json!(style.elevation(bin.count)));
            properties.insert("tooltip".into(), json!(bin_tooltip(bin)));
            Feature {
                bbox: None,
                geometry: Some(Geometry::new(geojson::Value::from(&bin.polygon))),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}
