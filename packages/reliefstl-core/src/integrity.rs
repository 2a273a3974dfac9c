use std::collections::VecDeque;

use serde::Serialize;
use tracing::{info, warn};

use crate::error::{GenerateError, Result};
use crate::mesh_repair::{face_is_degenerate, undirected_edge_map, IndexedMesh};

/// Above this face count the connected-component walk is skipped and
/// `components` is reported as -1 to bound cost.
pub const SPLIT_FACE_LIMIT: usize = 500_000;

const BOUNDARY_EDGE_WARN: usize = 100_000;
const BOUNDARY_EDGE_FAIL: usize = 400_000;

/// Final mesh health metrics, computed after global repair.
#[derive(Debug, Clone, Serialize)]
pub struct IntegrityReport {
    pub faces: usize,
    pub verts: usize,
    pub watertight: bool,
    pub boundary_edges: usize,
    pub degenerate_faces: usize,
    pub components: i64,
}

/// Measure boundary edges, degeneracy and connectivity of the merged mesh.
pub fn measure(mesh: &IndexedMesh) -> IntegrityReport {
    let edge_map = undirected_edge_map(&mesh.faces);

    let mut boundary_edges = 0usize;
    let mut watertight = true;
    for users in edge_map.values() {
        match users.len() {
            1 => {
                boundary_edges += 1;
                watertight = false;
            }
            2 => {}
            _ => watertight = false,
        }
    }
    if mesh.faces.is_empty() {
        watertight = false;
    }

    let degenerate_faces = mesh
        .faces
        .iter()
        .filter(|face| face_is_degenerate(&mesh.vertices, face))
        .count();

    let components = if mesh.faces.len() <= SPLIT_FACE_LIMIT {
        count_components(mesh) as i64
    } else {
        info!(
            faces = mesh.faces.len(),
            limit = SPLIT_FACE_LIMIT,
            "skipping component count"
        );
        -1
    };

    IntegrityReport {
        faces: mesh.faces.len(),
        verts: mesh.vertices.len(),
        watertight,
        boundary_edges,
        degenerate_faces,
        components,
    }
}

/// Apply the boundary-edge policy: warn above the soft threshold, fail above
/// the hard one. The hard threshold is disabled while a clip polygon is
/// active because polygon walls legitimately raise the count in edge cases.
pub fn enforce(report: &IntegrityReport, clip_active: bool) -> Result<()> {
    if report.boundary_edges > BOUNDARY_EDGE_WARN {
        warn!(
            boundary_edges = report.boundary_edges,
            "high boundary edge count; slicer may report repairable issues"
        );
    }
    if report.boundary_edges > BOUNDARY_EDGE_FAIL && !clip_active {
        return Err(GenerateError::IntegrityTooLow {
            boundary_edges: report.boundary_edges,
        });
    }
    Ok(())
}

/// Connected components over edge-shared faces.
fn count_components(mesh: &IndexedMesh) -> usize {
    let edge_map = undirected_edge_map(&mesh.faces);
    let face_count = mesh.faces.len();
    let mut visited = vec![false; face_count];
    let mut components = 0usize;

    for seed in 0..face_count {
        if visited[seed] {
            continue;
        }
        components += 1;
        visited[seed] = true;
        let mut queue = VecDeque::from(vec![seed]);
        while let Some(current) = queue.pop_front() {
            let face = mesh.faces[current];
            for k in 0..3 {
                let a = face[k];
                let b = face[(k + 1) % 3];
                if a == b {
                    continue;
                }
                if let Some(users) = edge_map.get(&crate::mesh_repair::edge_key(a, b)) {
                    for &neighbor in users {
                        if !visited[neighbor] {
                            visited[neighbor] = true;
                            queue.push_back(neighbor);
                        }
                    }
                }
            }
        }
    }
    components
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tetrahedron() -> IndexedMesh {
        IndexedMesh {
            vertices: vec![
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [0.0, 1.0, 0.0],
                [0.0, 0.0, 1.0],
            ],
            faces: vec![[0, 2, 1], [0, 1, 3], [1, 2, 3], [0, 3, 2]],
        }
    }

    #[test]
    fn test_closed_mesh_is_watertight() {
        let report = measure(&tetrahedron());
        assert_eq!(report.faces, 4);
        assert_eq!(report.boundary_edges, 0);
        assert!(report.watertight);
        assert_eq!(report.components, 1);
        assert_eq!(report.degenerate_faces, 0);
    }

    #[test]
    fn test_open_mesh_counts_boundary_edges() {
        let mut mesh = tetrahedron();
        mesh.faces.pop();
        let report = measure(&mesh);
        assert_eq!(report.boundary_edges, 3);
        assert!(!report.watertight);
    }

    #[test]
    fn test_two_bodies_two_components() {
        let mut mesh = tetrahedron();
        let offset = mesh.vertices.len() as u32;
        let second = tetrahedron();
        mesh.vertices
            .extend(second.vertices.iter().map(|v| [v[0] + 5.0, v[1], v[2]]));
        mesh.faces
            .extend(second.faces.iter().map(|f| f.map(|i| i + offset)));
        let report = measure(&mesh);
        assert_eq!(report.components, 2);
        assert!(report.watertight);
    }

    #[test]
    fn test_enforce_thresholds() {
        let mut report = measure(&tetrahedron());
        report.boundary_edges = 100_001;
        assert!(enforce(&report, false).is_ok());
        report.boundary_edges = 400_001;
        assert!(matches!(
            enforce(&report, false),
            Err(GenerateError::IntegrityTooLow { boundary_edges }) if boundary_edges == 400_001
        ));
        // Same count passes with an active clip polygon.
        assert!(enforce(&report, true).is_ok());
    }
}
