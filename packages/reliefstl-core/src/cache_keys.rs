// Stable cache keys for fetcher-side tile caches. Reads of an existing entry
// are lock-free; first-writer-wins on the same key is tolerated.

use crate::models::{GeoBbox, Resolution};

/// Key for a downloaded artefact addressed by its stable URL: the final path
/// segment, which upstream tile services keep unique per tile version.
pub fn tile_key_from_href(href: &str) -> String {
    href.rsplit('/').next().unwrap_or(href).to_string()
}

/// Key for a merged terrain grid: bbox rounded to ~1 m with the resolution.
pub fn terrain_grid_key(bbox: &GeoBbox, resolution: Resolution) -> String {
    format!(
        "terrain_{:.5}_{:.5}_{:.5}_{:.5}_{}",
        bbox.min_lon,
        bbox.min_lat,
        bbox.max_lon,
        bbox.max_lat,
        resolution.meters()
    )
}

/// Key for one page of a paged feature query.
pub fn feature_page_key(layer: &str, bbox: &GeoBbox, offset: usize) -> String {
    format!(
        "{}_{:.5}_{:.5}_{:.5}_{:.5}_{}",
        layer, bbox.min_lon, bbox.min_lat, bbox.max_lon, bbox.max_lat, offset
    )
}
