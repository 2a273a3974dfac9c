use std::fs;
use std::path::{Path, PathBuf};

use ndarray::Array2;
use tracing::info;

use crate::buildings::integrate_buildings;
use crate::clip_mask::{build_clip_mask, outline_polygon};
use crate::coords::ModelFrame;
use crate::elevation::{decimate_to_cap, fill_nan_with_mean, nan_min, validate_grid};
use crate::error::{GenerateError, Result};
use crate::export_stl::write_binary_stl;
use crate::integrity;
use crate::mesh_repair::repair_global;
use crate::models::{GenerateOptions, ProjectedBbox};
use crate::polygon_base::{build_polygon_base, build_polygon_skirt};
use crate::road_emboss::{apply_road_emboss, ROAD_RAISE_MM};
use crate::terrain_mesh_gen::build_terrain_solid;

/// Nominal grid pitch in metres when no projected bbox is supplied.
const SYNTHETIC_PITCH_M: f64 = 2.0;

/// Convert terrain plus optional buildings and roads into a single STL file
/// under `output_dir`, named `{job_id}.stl`.
///
/// Buildings are expected in the same projected CRS as the terrain grid; the
/// conversion to model mm uses the shared frame formulas for both. For
/// multi-tile grids, pass `global_min_elev` so the z reference is consistent
/// and edges align when tiles are assembled.
pub fn generate_stl(
    elevation: Array2<f32>,
    job_id: &str,
    options: &GenerateOptions,
    output_dir: &Path,
) -> Result<PathBuf> {
    options.validate()?;
    generate_impl(elevation, job_id, options, output_dir)
}

/// Tile-internal entry: a tile inherits the global horizontal scale, so its
/// own width may legitimately fall below the public `model_width_mm` floor.
pub(crate) fn generate_tile(
    elevation: Array2<f32>,
    job_id: &str,
    options: &GenerateOptions,
    output_dir: &Path,
) -> Result<PathBuf> {
    if !options.model_width_mm.is_finite() || options.model_width_mm <= 0.0 {
        return Err(GenerateError::input("tile width must be positive"));
    }
    if let Some(mesh) = &options.building_mesh {
        mesh.validate()?;
    }
    generate_impl(elevation, job_id, options, output_dir)
}

fn generate_impl(
    elevation: Array2<f32>,
    job_id: &str,
    options: &GenerateOptions,
    output_dir: &Path,
) -> Result<PathBuf> {
    validate_grid(&elevation)?;
    let progress = &options.progress;

    let (rows, cols) = elevation.dim();
    info!(
        rows,
        cols,
        width_mm = options.model_width_mm,
        "generating STL"
    );

    let (mut elevation, step) = decimate_to_cap(elevation);
    if step > 1 {
        info!(
            rows = elevation.nrows(),
            cols = elevation.ncols(),
            step,
            "downsampled grid"
        );
    }
    let (rows, cols) = elevation.dim();

    let bbox = options.projected_bbox.unwrap_or_else(|| {
        ProjectedBbox::new(
            0.0,
            0.0,
            cols as f64 * SYNTHETIC_PITCH_M,
            rows as f64 * SYNTHETIC_PITCH_M,
        )
    });

    fill_nan_with_mean(&mut elevation)?;
    let min_elev = match options.global_min_elev {
        Some(value) => value,
        None => nan_min(&elevation).ok_or(GenerateError::NoData)? as f64,
    };

    let frame = ModelFrame::new(
        bbox,
        options.model_width_mm,
        options.z_exaggeration,
        options.base_height_mm,
        min_elev,
    );

    let mut z = elevation.mapv(|v| {
        let scaled = (v as f64 - min_elev) * frame.z_scale;
        if scaled.is_finite() {
            scaled as f32
        } else {
            0.0
        }
    });

    if options.projected_bbox.is_some() {
        if let Some(roads) = options.road_polygons.as_deref() {
            if !roads.is_empty() {
                apply_road_emboss(&mut z, roads, &bbox, ROAD_RAISE_MM);
            }
        }
    }

    let relief = z.iter().fold(0.0f32, |m, &v| m.max(v));
    info!(
        width_mm = frame.model_width_mm,
        height_mm = frame.height_mm,
        z_scale = frame.z_scale,
        relief_mm = relief,
        "model frame ready"
    );
    progress.report(60.0, "triangulating terrain");

    // An unusable outline disables clipping entirely: full rectangular solid.
    let clip_outline: Option<&[[f64; 2]]> = options
        .clip_polygon
        .as_deref()
        .filter(|outline| outline_polygon(outline).is_some());

    let x_axis = frame.x_axis(cols);
    let y_axis = frame.y_axis(rows);
    let mask = clip_outline.map(|outline| build_clip_mask(outline, &bbox, rows, cols));

    let mut all = build_terrain_solid(&x_axis, &y_axis, &z, frame.base_z as f32, mask.as_ref());
    if let Some(outline) = clip_outline {
        all.append(build_polygon_skirt(outline, &frame, &z));
        all.append(build_polygon_base(outline, &frame));
    }
    info!(terrain_faces = all.len(), "terrain solid built");
    progress.report(75.0, "integrating buildings");

    if let (Some(mesh), Some(_)) = (&options.building_mesh, &options.projected_bbox) {
        if !mesh.is_empty() {
            let building_faces = integrate_buildings(mesh, &frame, clip_outline);
            all.append(building_faces);
        }
    }
    progress.report(85.0, "repairing mesh");

    let repaired = repair_global(&all);
    let report = integrity::measure(&repaired);
    info!(
        watertight = report.watertight,
        boundary_edges = report.boundary_edges,
        degenerate_faces = report.degenerate_faces,
        components = report.components,
        "mesh integrity"
    );
    integrity::enforce(&report, clip_outline.is_some())?;

    progress.report(95.0, "saving STL");
    fs::create_dir_all(output_dir)?;
    let output_path = output_dir.join(format!("{}.stl", job_id));
    write_binary_stl(&output_path, &repaired.to_soup())?;
    Ok(output_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GenerateOptions;

    fn flat_elevation(rows: usize, cols: usize, value: f32) -> Array2<f32> {
        Array2::from_elem((rows, cols), value)
    }

    #[test]
    fn test_rejects_invalid_scalars_before_work() {
        let dir = tempfile::tempdir().unwrap();
        let mut options = GenerateOptions::new();
        options.model_width_mm = 1000.0;
        let err = generate_stl(flat_elevation(4, 4, 1.0), "bad", &options, dir.path());
        assert!(matches!(err, Err(GenerateError::InputInvalid(_))));
    }

    #[test]
    fn test_rejects_all_nan_grid() {
        let dir = tempfile::tempdir().unwrap();
        let options = GenerateOptions::new();
        let grid = Array2::from_elem((4, 4), f32::NAN);
        let err = generate_stl(grid, "nodata", &options, dir.path());
        assert!(matches!(err, Err(GenerateError::NoData)));
    }

    #[test]
    fn test_flat_plate_writes_expected_face_count() {
        let dir = tempfile::tempdir().unwrap();
        let mut options = GenerateOptions::new();
        options.model_width_mm = 100.0;
        options.base_height_mm = 2.0;
        let path = generate_stl(flat_elevation(10, 10, 500.0), "flat", &options, dir.path())
            .unwrap();
        let bytes = std::fs::read(&path).unwrap();
        let count = u32::from_le_bytes([bytes[80], bytes[81], bytes[82], bytes[83]]);
        assert_eq!(count, 236);
    }

    #[test]
    fn test_unusable_clip_polygon_falls_back_to_rectangle() {
        let dir = tempfile::tempdir().unwrap();
        let mut options = GenerateOptions::new();
        options.model_width_mm = 100.0;
        // Bowtie outline: clipping disabled, rectangular solid emitted.
        options.clip_polygon = Some(vec![
            [0.0, 0.0],
            [20.0, 20.0],
            [20.0, 0.0],
            [0.0, 20.0],
        ]);
        let path = generate_stl(flat_elevation(10, 10, 500.0), "bowtie", &options, dir.path())
            .unwrap();
        let bytes = std::fs::read(&path).unwrap();
        let count = u32::from_le_bytes([bytes[80], bytes[81], bytes[82], bytes[83]]);
        assert_eq!(count, 236);
    }
}
