use serde::{Deserialize, Serialize};

use crate::error::{GenerateError, Result};
use crate::jobs::Progress;

// Request limits enforced before any work starts.
const MIN_MODEL_WIDTH_MM: f64 = 50.0;
const MAX_MODEL_WIDTH_MM: f64 = 500.0;
const MIN_Z_EXAGGERATION: f64 = 0.5;
const MAX_Z_EXAGGERATION: f64 = 5.0;
const MIN_BASE_HEIGHT_MM: f64 = 0.5;
const MAX_BASE_HEIGHT_MM: f64 = 20.0;
const MAX_GRID_SPLIT: u32 = 4;
const MAX_AREA_KM2: f64 = 100.0;

// Service coverage: Switzerland.
const LON_RANGE: (f64, f64) = (5.9, 10.5);
const LAT_RANGE: (f64, f64) = (45.8, 47.9);

/// Elevation sampling distance offered by the terrain source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Resolution {
    #[serde(rename = "0.5")]
    HalfMeter,
    #[default]
    #[serde(rename = "2")]
    TwoMeter,
    #[serde(rename = "10")]
    TenMeter,
}

impl Resolution {
    pub fn meters(self) -> f64 {
        match self {
            Resolution::HalfMeter => 0.5,
            Resolution::TwoMeter => 2.0,
            Resolution::TenMeter => 10.0,
        }
    }
}

/// Rectangular footprint in the projected metric plane (eastings/northings).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProjectedBbox {
    pub min_e: f64,
    pub min_n: f64,
    pub max_e: f64,
    pub max_n: f64,
}

impl ProjectedBbox {
    pub fn new(min_e: f64, min_n: f64, max_e: f64, max_n: f64) -> Self {
        Self {
            min_e,
            min_n,
            max_e,
            max_n,
        }
    }

    pub fn width(&self) -> f64 {
        self.max_e - self.min_e
    }

    pub fn height(&self) -> f64 {
        self.max_n - self.min_n
    }
}

/// Geographic request bbox in WGS84 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoBbox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl GeoBbox {
    /// Rough metric area, good enough for the 100 km2 request cap.
    pub fn approx_area_km2(&self) -> f64 {
        const M_PER_DEG: f64 = 111_320.0;
        let mid_lat = 0.5 * (self.min_lat + self.max_lat);
        let width_m = (self.max_lon - self.min_lon) * M_PER_DEG * mid_lat.to_radians().cos();
        let height_m = (self.max_lat - self.min_lat) * M_PER_DEG;
        width_m * height_m / 1e6
    }

    /// Sub-bbox at fractional positions along each axis. `fy` runs from the
    /// north edge southward, matching grid row order.
    pub fn section(&self, fx0: f64, fx1: f64, fy0: f64, fy1: f64) -> GeoBbox {
        let lon_span = self.max_lon - self.min_lon;
        let lat_span = self.max_lat - self.min_lat;
        GeoBbox {
            min_lon: self.min_lon + lon_span * fx0,
            max_lon: self.min_lon + lon_span * fx1,
            max_lat: self.max_lat - lat_span * fy0,
            min_lat: self.max_lat - lat_span * fy1,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_lon >= self.max_lon || self.min_lat >= self.max_lat {
            return Err(GenerateError::input(
                "invalid bounding box: min must be less than max",
            ));
        }
        let in_coverage = self.min_lon >= LON_RANGE.0
            && self.max_lon <= LON_RANGE.1
            && self.min_lat >= LAT_RANGE.0
            && self.max_lat <= LAT_RANGE.1;
        if !in_coverage {
            return Err(GenerateError::input(format!(
                "bounding box must be within Switzerland (lon: {}-{}, lat: {}-{})",
                LON_RANGE.0, LON_RANGE.1, LAT_RANGE.0, LAT_RANGE.1
            )));
        }
        let area = self.approx_area_km2();
        if area > MAX_AREA_KM2 {
            return Err(GenerateError::input(format!(
                "selected area is {:.1} km2, maximum is {} km2",
                area, MAX_AREA_KM2
            )));
        }
        Ok(())
    }
}

/// Building geometry handed over by the building source: vertices in
/// projected metres plus metres elevation, faces as vertex index triples.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildingMesh {
    pub vertices: Vec<[f64; 3]>,
    pub faces: Vec<[u32; 3]>,
}

impl BuildingMesh {
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.faces.is_empty()
    }

    pub fn validate(&self) -> Result<()> {
        let vertex_count = self.vertices.len() as u32;
        for face in &self.faces {
            if face.iter().any(|&i| i >= vertex_count) {
                return Err(GenerateError::input(format!(
                    "building face references vertex {} of {}",
                    face.iter().max().copied().unwrap_or(0),
                    vertex_count
                )));
            }
        }
        Ok(())
    }
}

/// One buffered road outline in projected metres with its class code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoadPolygon {
    pub ring: Vec<[f64; 2]>,
    pub class_code: i32,
}

/// Everything the STL generator needs beyond the elevation grid itself.
/// Replaces a long optional-argument cascade with one explicit record.
#[derive(Clone, Default)]
pub struct GenerateOptions {
    pub model_width_mm: f64,
    pub z_exaggeration: f64,
    pub base_height_mm: f64,
    pub building_mesh: Option<BuildingMesh>,
    pub projected_bbox: Option<ProjectedBbox>,
    pub road_polygons: Option<Vec<RoadPolygon>>,
    pub progress: Progress,
    pub global_min_elev: Option<f64>,
    pub clip_polygon: Option<Vec<[f64; 2]>>,
}

impl GenerateOptions {
    pub fn new() -> Self {
        Self {
            model_width_mm: 150.0,
            z_exaggeration: 1.0,
            base_height_mm: 3.0,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        check_range(
            "model_width_mm",
            self.model_width_mm,
            MIN_MODEL_WIDTH_MM,
            MAX_MODEL_WIDTH_MM,
        )?;
        check_range(
            "z_exaggeration",
            self.z_exaggeration,
            MIN_Z_EXAGGERATION,
            MAX_Z_EXAGGERATION,
        )?;
        check_range(
            "base_height_mm",
            self.base_height_mm,
            MIN_BASE_HEIGHT_MM,
            MAX_BASE_HEIGHT_MM,
        )?;
        if let Some(bbox) = &self.projected_bbox {
            if bbox.width() <= 0.0 || bbox.height() <= 0.0 {
                return Err(GenerateError::input("projected bbox has no extent"));
            }
        }
        if let Some(mesh) = &self.building_mesh {
            mesh.validate()?;
        }
        Ok(())
    }
}

/// Full job request as accepted by the front-end surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    pub bbox: GeoBbox,
    #[serde(default)]
    pub resolution: Resolution,
    #[serde(default = "default_z_exaggeration")]
    pub z_exaggeration: f64,
    #[serde(default = "default_base_height")]
    pub base_height: f64,
    #[serde(default = "default_true")]
    pub include_buildings: bool,
    #[serde(default = "default_true")]
    pub include_roads: bool,
    #[serde(default = "default_model_width")]
    pub model_width_mm: f64,
    /// Split the zone into NxN separately printable tiles.
    #[serde(default = "default_grid_split")]
    pub grid_split: u32,
    /// Outline in projected metres to clip the model footprint.
    #[serde(default)]
    pub clip_polygon: Option<Vec<[f64; 2]>>,
}

fn default_z_exaggeration() -> f64 {
    1.0
}
fn default_base_height() -> f64 {
    2.0
}
fn default_true() -> bool {
    true
}
fn default_model_width() -> f64 {
    150.0
}
fn default_grid_split() -> u32 {
    1
}

impl JobRequest {
    pub fn validate(&self) -> Result<()> {
        self.bbox.validate()?;
        check_range(
            "model_width_mm",
            self.model_width_mm,
            MIN_MODEL_WIDTH_MM,
            MAX_MODEL_WIDTH_MM,
        )?;
        check_range(
            "z_exaggeration",
            self.z_exaggeration,
            MIN_Z_EXAGGERATION,
            MAX_Z_EXAGGERATION,
        )?;
        check_range(
            "base_height",
            self.base_height,
            MIN_BASE_HEIGHT_MM,
            MAX_BASE_HEIGHT_MM,
        )?;
        if self.grid_split < 1 || self.grid_split > MAX_GRID_SPLIT {
            return Err(GenerateError::input(format!(
                "grid_split must be 1-{}",
                MAX_GRID_SPLIT
            )));
        }
        if let Some(outline) = &self.clip_polygon {
            if outline.len() < 3 {
                return Err(GenerateError::input("clip polygon needs at least 3 points"));
            }
        }
        Ok(())
    }
}

fn check_range(name: &str, value: f64, lo: f64, hi: f64) -> Result<()> {
    if !value.is_finite() || value < lo || value > hi {
        return Err(GenerateError::input(format!(
            "{} must be within [{}, {}], got {}",
            name, lo, hi, value
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_serde_roundtrip() {
        let json = serde_json::to_string(&Resolution::HalfMeter).unwrap();
        assert_eq!(json, "\"0.5\"");
        let back: Resolution = serde_json::from_str("\"10\"").unwrap();
        assert_eq!(back, Resolution::TenMeter);
    }

    #[test]
    fn test_geo_bbox_outside_switzerland_rejected() {
        let bbox = GeoBbox {
            min_lon: 2.0,
            min_lat: 48.0,
            max_lon: 2.1,
            max_lat: 48.1,
        };
        assert!(bbox.validate().is_err());
    }

    #[test]
    fn test_geo_bbox_inverted_rejected() {
        let bbox = GeoBbox {
            min_lon: 8.0,
            min_lat: 47.0,
            max_lon: 7.0,
            max_lat: 47.1,
        };
        assert!(bbox.validate().is_err());
    }

    #[test]
    fn test_geo_bbox_area_cap() {
        // Roughly 45 x 45 km, well over the cap.
        let bbox = GeoBbox {
            min_lon: 7.0,
            min_lat: 46.6,
            max_lon: 7.6,
            max_lat: 47.0,
        };
        assert!(bbox.approx_area_km2() > 100.0);
        assert!(bbox.validate().is_err());
    }

    #[test]
    fn test_options_range_checks() {
        let mut opts = GenerateOptions::new();
        assert!(opts.validate().is_ok());
        opts.model_width_mm = 20.0;
        assert!(opts.validate().is_err());
        opts.model_width_mm = 150.0;
        opts.z_exaggeration = 9.0;
        assert!(opts.validate().is_err());
        opts.z_exaggeration = 1.0;
        opts.base_height_mm = 0.0;
        assert!(opts.validate().is_err());
    }

    #[test]
    fn test_building_mesh_dangling_index_rejected() {
        let mesh = BuildingMesh {
            vertices: vec![[0.0; 3]; 3],
            faces: vec![[0, 1, 3]],
        };
        assert!(mesh.validate().is_err());
    }

    #[test]
    fn test_job_request_short_clip_polygon_rejected() {
        let request = JobRequest {
            bbox: GeoBbox {
                min_lon: 7.4,
                min_lat: 46.9,
                max_lon: 7.45,
                max_lat: 46.95,
            },
            resolution: Resolution::TwoMeter,
            z_exaggeration: 1.0,
            base_height: 2.0,
            include_buildings: true,
            include_roads: true,
            model_width_mm: 150.0,
            grid_split: 1,
            clip_polygon: Some(vec![[0.0, 0.0], [1.0, 1.0]]),
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_geo_bbox_section_row_order() {
        let bbox = GeoBbox {
            min_lon: 7.0,
            min_lat: 46.0,
            max_lon: 8.0,
            max_lat: 47.0,
        };
        let north_west = bbox.section(0.0, 0.5, 0.0, 0.5);
        assert_eq!(north_west.max_lat, 47.0);
        assert_eq!(north_west.min_lat, 46.5);
        assert_eq!(north_west.min_lon, 7.0);
        assert_eq!(north_west.max_lon, 7.5);
    }
}
