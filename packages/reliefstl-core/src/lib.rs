//! STL assembly core for printable terrain models.
//!
//! Takes a projected-metre elevation grid plus optional building meshes and
//! road outlines and produces one millimetre-space triangle solid per model
//! (or per tile), with a mesh-integrity self check. Terrain, building and
//! road data arrive through the source traits in [`fetch`]; HTTP serving and
//! the actual swisstopo clients live outside this crate.

// Coordinate frame shared by every conversion
pub mod coords;
// Elevation grid invariants and normalisation
pub mod elevation;
// Clip outline rasterisation
pub mod clip_mask;
// Terrain solid triangulation
pub mod terrain_mesh_gen;
// Road embossing on the height field
pub mod road_emboss;
// Clip outline skirt and base
pub mod polygon_base;
// Building mesh integration
pub mod buildings;
// Vertex merge, normal orientation, dedupe
pub mod mesh_repair;
// Final mesh health metrics and thresholds
pub mod integrity;
// Binary STL serialisation
pub mod export_stl;
// The generate pipeline
pub mod generator;
// Data records and validation
pub mod models;
// Error types
pub mod error;
// Source traits implemented by the data fetchers
pub mod fetch;
// Progress sink, job registry and worker spawn
pub mod jobs;
// Multi-tile orchestration and ZIP packaging
pub mod tiling;
// Cache key helpers for fetcher-side tile caches
pub mod cache_keys;

pub use error::{GenerateError, Result};
pub use fetch::{BuildingSource, RoadSource, Sources, TerrainMeta, TerrainSource};
pub use generator::generate_stl;
pub use jobs::{job_status, submit_job, JobHandle, JobRecord, JobStatus, Progress};
pub use models::{
    BuildingMesh, GenerateOptions, GeoBbox, JobRequest, ProjectedBbox, Resolution, RoadPolygon,
};
pub use tiling::run_job;
