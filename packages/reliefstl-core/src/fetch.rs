use std::sync::Arc;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::jobs::Progress;
use crate::models::{BuildingMesh, GeoBbox, ProjectedBbox, Resolution, RoadPolygon};

/// Metadata returned alongside a merged elevation grid.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TerrainMeta {
    pub projected_bbox: ProjectedBbox,
    pub resolution_m: f64,
    pub min_elevation: f64,
    pub max_elevation: f64,
}

/// Produces a merged elevation grid for a WGS84 bbox. Implementations own
/// their tile downloads, caching and retry policy; retries never happen in
/// the core.
pub trait TerrainSource: Send + Sync {
    fn get_terrain(
        &self,
        bbox: &GeoBbox,
        resolution: Resolution,
        progress: &Progress,
    ) -> Result<(Array2<f32>, TerrainMeta)>;
}

/// Produces building geometry in projected metres for a WGS84 bbox. An empty
/// mesh is a valid answer for areas without buildings.
pub trait BuildingSource: Send + Sync {
    fn get_buildings(&self, bbox: &GeoBbox, progress: &Progress) -> Result<BuildingMesh>;
}

/// Produces buffered road outlines in projected metres for a WGS84 bbox.
pub trait RoadSource: Send + Sync {
    fn get_roads(&self, bbox: &GeoBbox, progress: &Progress) -> Result<Vec<RoadPolygon>>;
}

/// The three collaborators a job needs, shareable across worker threads.
#[derive(Clone)]
pub struct Sources {
    pub terrain: Arc<dyn TerrainSource>,
    pub buildings: Arc<dyn BuildingSource>,
    pub roads: Arc<dyn RoadSource>,
}

impl Sources {
    pub fn new(
        terrain: Arc<dyn TerrainSource>,
        buildings: Arc<dyn BuildingSource>,
        roads: Arc<dyn RoadSource>,
    ) -> Self {
        Self {
            terrain,
            buildings,
            roads,
        }
    }
}
