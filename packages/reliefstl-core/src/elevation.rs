use ndarray::{s, Array2};

use crate::error::{GenerateError, Result};

/// Largest grid dimension fed into mesh construction. Bigger inputs are
/// stride-decimated first so the output mesh never exceeds ~1200x1200 cells.
pub const MAX_GRID_DIM: usize = 1200;

/// Grid must be at least 2x2 and carry at least one finite sample.
pub fn validate_grid(elevation: &Array2<f32>) -> Result<()> {
    let (rows, cols) = elevation.dim();
    if rows < 2 || cols < 2 {
        return Err(GenerateError::input(format!(
            "elevation grid must be at least 2x2, got {}x{}",
            rows, cols
        )));
    }
    if !elevation.iter().any(|v| v.is_finite()) {
        return Err(GenerateError::NoData);
    }
    Ok(())
}

pub fn nan_min(elevation: &Array2<f32>) -> Option<f32> {
    elevation
        .iter()
        .filter(|v| v.is_finite())
        .copied()
        .fold(None, |acc, v| Some(acc.map_or(v, |m: f32| m.min(v))))
}

pub fn nan_max(elevation: &Array2<f32>) -> Option<f32> {
    elevation
        .iter()
        .filter(|v| v.is_finite())
        .copied()
        .fold(None, |acc, v| Some(acc.map_or(v, |m: f32| m.max(v))))
}

pub fn nan_mean(elevation: &Array2<f32>) -> Option<f32> {
    let mut sum = 0.0f64;
    let mut count = 0usize;
    for &v in elevation.iter() {
        if v.is_finite() {
            sum += v as f64;
            count += 1;
        }
    }
    if count == 0 {
        None
    } else {
        Some((sum / count as f64) as f32)
    }
}

/// Replace NaN holes with the mean of the finite samples, the same
/// normalisation the terrain merger applies to nodata cells.
pub fn fill_nan_with_mean(elevation: &mut Array2<f32>) -> Result<()> {
    if elevation.iter().all(|v| !v.is_finite()) {
        return Err(GenerateError::NoData);
    }
    if elevation.iter().any(|v| !v.is_finite()) {
        let mean = nan_mean(elevation).ok_or(GenerateError::NoData)?;
        elevation.mapv_inplace(|v| if v.is_finite() { v } else { mean });
    }
    Ok(())
}

/// Stride-decimate so that `max(rows, cols) <= MAX_GRID_DIM`.
pub fn decimate_to_cap(elevation: Array2<f32>) -> (Array2<f32>, usize) {
    let (rows, cols) = elevation.dim();
    let largest = rows.max(cols);
    if largest <= MAX_GRID_DIM {
        return (elevation, 1);
    }
    let step = largest.div_ceil(MAX_GRID_DIM);
    let stride = step as isize;
    let decimated = elevation.slice(s![..;stride, ..;stride]).to_owned();
    (decimated, step)
}

/// Inclusive sample window of one tile. Adjacent tiles share their boundary
/// row/column so the assembled tiles leave no gap.
pub fn slice_tile(
    elevation: &Array2<f32>,
    row_span: (usize, usize),
    col_span: (usize, usize),
) -> Array2<f32> {
    elevation
        .slice(s![row_span.0..=row_span.1, col_span.0..=col_span.1])
        .to_owned()
}
