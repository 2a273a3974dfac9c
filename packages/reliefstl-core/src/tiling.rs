use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::coords::linspace;
use crate::elevation::{nan_min, slice_tile};
use crate::error::{GenerateError, Result};
use crate::fetch::{Sources, TerrainMeta};
use crate::generator;
use crate::jobs::{update_job, JobStatus, Progress};
use crate::models::{BuildingMesh, GenerateOptions, JobRequest, ProjectedBbox, RoadPolygon};

/// Run one job end to end: fetch terrain, then either a single STL or an
/// NxN tile set packaged as a ZIP. Progress and status land in the job
/// registry; the returned path is the final artefact.
pub fn run_job(
    sources: &Sources,
    request: &JobRequest,
    job_id: &str,
    output_dir: &Path,
) -> Result<PathBuf> {
    request.validate()?;
    let progress = registry_progress(job_id);

    set_phase(
        job_id,
        JobStatus::DownloadingTerrain,
        5.0,
        "terrain: downloading and merging tiles",
    );
    let (elevation, meta) = sources.terrain.get_terrain(
        &request.bbox,
        request.resolution,
        &progress.section(5.0, 40.0),
    )?;
    info!(
        rows = elevation.nrows(),
        cols = elevation.ncols(),
        min_elev = meta.min_elevation,
        max_elev = meta.max_elevation,
        "terrain grid ready"
    );

    if request.grid_split <= 1 {
        generate_single(sources, request, job_id, output_dir, elevation, &meta, &progress)
    } else {
        generate_tiled(sources, request, job_id, output_dir, elevation, &meta, &progress)
    }
}

fn generate_single(
    sources: &Sources,
    request: &JobRequest,
    job_id: &str,
    output_dir: &Path,
    elevation: ndarray::Array2<f32>,
    meta: &TerrainMeta,
    progress: &Progress,
) -> Result<PathBuf> {
    if request.include_buildings {
        set_phase(
            job_id,
            JobStatus::DownloadingBuildings,
            40.0,
            "buildings: downloading and parsing",
        );
    }
    let building_mesh =
        fetch_buildings(sources, request, &request.bbox, &progress.section(40.0, 55.0))?;
    if request.include_roads {
        set_phase(
            job_id,
            JobStatus::DownloadingRoads,
            55.0,
            "roads: extracting and buffering",
        );
    }
    let road_polygons =
        fetch_roads(sources, request, &request.bbox, &progress.section(55.0, 60.0))?;

    set_phase(
        job_id,
        JobStatus::GeneratingStl,
        60.0,
        &format!(
            "generating 3D mesh ({}x{} samples)",
            elevation.nrows(),
            elevation.ncols()
        ),
    );
    let options = GenerateOptions {
        model_width_mm: request.model_width_mm,
        z_exaggeration: request.z_exaggeration,
        base_height_mm: request.base_height,
        building_mesh,
        projected_bbox: Some(meta.projected_bbox),
        road_polygons,
        progress: progress.clone(),
        global_min_elev: None,
        clip_polygon: request.clip_polygon.clone(),
    };
    generator::generate_stl(elevation, job_id, &options, output_dir)
}

fn generate_tiled(
    sources: &Sources,
    request: &JobRequest,
    job_id: &str,
    output_dir: &Path,
    elevation: ndarray::Array2<f32>,
    meta: &TerrainMeta,
    progress: &Progress,
) -> Result<PathBuf> {
    let (rows, cols) = elevation.dim();
    let split = request.grid_split as usize;
    if rows <= split || cols <= split {
        return Err(GenerateError::input(format!(
            "grid {}x{} too small for a {}x{} split",
            rows, cols, split, split
        )));
    }

    // One z reference and one horizontal scale for every tile, so shared
    // edges line up when the printed tiles are assembled.
    let global_min_elev = nan_min(&elevation).ok_or(GenerateError::NoData)? as f64;
    let bbox = meta.projected_bbox;
    let eastings = linspace(bbox.min_e, bbox.max_e, cols);
    let northings = linspace(bbox.max_n, bbox.min_n, rows);
    let global_scale = request.model_width_mm / bbox.width();

    let row_spans = tile_spans(rows, split);
    let col_spans = tile_spans(cols, split);
    let tile_total = split * split;
    let mut tile_paths: Vec<(usize, usize, PathBuf)> = Vec::with_capacity(tile_total);

    for (tile_row, &(r0, r1)) in row_spans.iter().enumerate() {
        for (tile_col, &(c0, c1)) in col_spans.iter().enumerate() {
            let tile_index = tile_row * split + tile_col;
            set_phase(
                job_id,
                JobStatus::GeneratingStl,
                40.0 + 55.0 * tile_index as f32 / tile_total as f32,
                &format!("tile {}/{}", tile_index + 1, tile_total),
            );

            let tile_grid = slice_tile(&elevation, (r0, r1), (c0, c1));
            let tile_bbox =
                ProjectedBbox::new(eastings[c0], northings[r1], eastings[c1], northings[r0]);
            let tile_geo = request.bbox.section(
                c0 as f64 / (cols - 1) as f64,
                c1 as f64 / (cols - 1) as f64,
                r0 as f64 / (rows - 1) as f64,
                r1 as f64 / (rows - 1) as f64,
            );

            let building_mesh = fetch_buildings(sources, request, &tile_geo, &Progress::none())?;
            let road_polygons = fetch_roads(sources, request, &tile_geo, &Progress::none())?;

            let window_lo = 40.0 + 55.0 * tile_index as f32 / tile_total as f32;
            let window_hi = 40.0 + 55.0 * (tile_index + 1) as f32 / tile_total as f32;
            let options = GenerateOptions {
                model_width_mm: tile_bbox.width() * global_scale,
                z_exaggeration: request.z_exaggeration,
                base_height_mm: request.base_height,
                building_mesh,
                projected_bbox: Some(tile_bbox),
                road_polygons,
                progress: progress.section(window_lo, window_hi),
                global_min_elev: Some(global_min_elev),
                clip_polygon: request.clip_polygon.clone(),
            };
            let tile_id = format!("{}_tile_R{}_C{}", job_id, tile_row, tile_col);
            let path = generator::generate_tile(tile_grid, &tile_id, &options, output_dir)?;
            info!(tile = tile_index + 1, total = tile_total, "tile generated");
            tile_paths.push((tile_row, tile_col, path));
        }
    }

    set_phase(job_id, JobStatus::GeneratingStl, 95.0, "packaging tiles");
    let zip_path = output_dir.join(format!("{}.zip", job_id));
    let mut writer = ZipWriter::new(fs::File::create(&zip_path)?);
    let entry_options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for (tile_row, tile_col, path) in &tile_paths {
        writer.start_file(format!("tile_R{}_C{}.stl", tile_row, tile_col), entry_options)?;
        writer.write_all(&fs::read(path)?)?;
    }
    writer.finish()?;

    for (_, _, path) in &tile_paths {
        if let Err(err) = fs::remove_file(path) {
            warn!(path = %path.display(), error = %err, "could not remove intermediate tile");
        }
    }
    info!(tiles = tile_total, path = %zip_path.display(), "tile archive written");
    Ok(zip_path)
}

fn fetch_buildings(
    sources: &Sources,
    request: &JobRequest,
    bbox: &crate::models::GeoBbox,
    progress: &Progress,
) -> Result<Option<BuildingMesh>> {
    if !request.include_buildings {
        return Ok(None);
    }
    let mesh = sources.buildings.get_buildings(bbox, progress)?;
    if mesh.is_empty() {
        info!("no buildings found in this area");
        Ok(None)
    } else {
        info!(
            verts = mesh.vertices.len(),
            faces = mesh.faces.len(),
            "buildings fetched"
        );
        Ok(Some(mesh))
    }
}

fn fetch_roads(
    sources: &Sources,
    request: &JobRequest,
    bbox: &crate::models::GeoBbox,
    progress: &Progress,
) -> Result<Option<Vec<RoadPolygon>>> {
    if !request.include_roads {
        return Ok(None);
    }
    let roads = sources.roads.get_roads(bbox, progress)?;
    info!(polygons = roads.len(), "roads fetched");
    Ok(Some(roads))
}

/// Inclusive sample spans of one axis split into `n` tiles. Adjacent spans
/// share their boundary sample; the last span absorbs the remainder.
pub(crate) fn tile_spans(len: usize, n: usize) -> Vec<(usize, usize)> {
    let span = len / n;
    (0..n)
        .map(|k| {
            let start = k * span;
            let end = if k == n - 1 { len - 1 } else { (k + 1) * span };
            (start, end)
        })
        .collect()
}

fn registry_progress(job_id: &str) -> Progress {
    let id = job_id.to_string();
    Progress::new(move |pct, msg| {
        update_job(&id, |job| {
            job.progress = pct;
            job.message = msg.to_string();
        });
    })
}

fn set_phase(job_id: &str, status: JobStatus, pct: f32, message: &str) {
    update_job(job_id, |job| {
        job.status = status;
        job.progress = pct;
        job.message = message.to_string();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_spans_share_boundary_samples() {
        let spans = tile_spans(10, 2);
        assert_eq!(spans, vec![(0, 5), (5, 9)]);
        let spans = tile_spans(11, 2);
        assert_eq!(spans, vec![(0, 5), (5, 10)]);
    }

    #[test]
    fn test_tile_spans_last_absorbs_remainder() {
        let spans = tile_spans(10, 3);
        assert_eq!(spans, vec![(0, 3), (3, 6), (6, 9)]);
        let spans = tile_spans(5, 4);
        assert_eq!(spans, vec![(0, 1), (1, 2), (2, 3), (3, 4)]);
    }

    #[test]
    fn test_tile_spans_cover_axis_without_gap() {
        for len in [5usize, 9, 10, 100, 1201] {
            for n in 1..=4usize {
                if len <= n {
                    continue;
                }
                let spans = tile_spans(len, n);
                assert_eq!(spans.first().unwrap().0, 0);
                assert_eq!(spans.last().unwrap().1, len - 1);
                for pair in spans.windows(2) {
                    assert_eq!(pair[0].1, pair[1].0, "adjacent tiles must share a sample");
                }
            }
        }
    }
}
