use std::collections::{HashMap, HashSet, VecDeque};

use nalgebra::Vector3;

/// Coincident-vertex merge tolerance in model millimetres.
pub const MERGE_TOLERANCE_MM: f64 = 1e-5;

const DEGENERATE_AREA: f64 = 1e-12;

/// Triangle soup in mm model space: faces stored independently, no shared
/// vertex topology. Topology is recovered by vertex merging during repair.
#[derive(Debug, Clone, Default)]
pub struct FaceSoup {
    pub faces: Vec<[[f32; 3]; 3]>,
}

impl FaceSoup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    pub fn push(&mut self, triangle: [[f32; 3]; 3]) {
        self.faces.push(triangle);
    }

    pub fn append(&mut self, other: FaceSoup) {
        self.faces.extend(other.faces);
    }
}

/// Shared-vertex mesh used by the repair kernel and the integrity checker.
#[derive(Debug, Clone, Default)]
pub struct IndexedMesh {
    pub vertices: Vec<[f64; 3]>,
    pub faces: Vec<[u32; 3]>,
}

impl IndexedMesh {
    /// Recover shared-vertex topology from a soup by snapping coordinates to
    /// the merge tolerance. First occurrence wins as the representative.
    pub fn from_soup(soup: &FaceSoup, tolerance: f64) -> Self {
        let mut lookup: HashMap<(i64, i64, i64), u32> = HashMap::new();
        let mut vertices: Vec<[f64; 3]> = Vec::new();
        let mut faces = Vec::with_capacity(soup.len());

        for triangle in &soup.faces {
            let mut indices = [0u32; 3];
            for (slot, corner) in triangle.iter().enumerate() {
                let position = [corner[0] as f64, corner[1] as f64, corner[2] as f64];
                let key = quantize(&position, tolerance);
                let index = *lookup.entry(key).or_insert_with(|| {
                    vertices.push(position);
                    (vertices.len() - 1) as u32
                });
                indices[slot] = index;
            }
            faces.push(indices);
        }

        Self { vertices, faces }
    }

    /// Merge coincident vertices in place, remapping all face indices.
    pub fn merge_vertices(&mut self, tolerance: f64) {
        let mut lookup: HashMap<(i64, i64, i64), u32> = HashMap::new();
        let mut kept: Vec<[f64; 3]> = Vec::new();
        let mut remap = vec![0u32; self.vertices.len()];

        for (old, position) in self.vertices.iter().enumerate() {
            let key = quantize(position, tolerance);
            let index = *lookup.entry(key).or_insert_with(|| {
                kept.push(*position);
                (kept.len() - 1) as u32
            });
            remap[old] = index;
        }

        for face in &mut self.faces {
            for slot in face.iter_mut() {
                *slot = remap[*slot as usize];
            }
        }
        self.vertices = kept;
    }

    pub fn to_soup(&self) -> FaceSoup {
        let faces = self
            .faces
            .iter()
            .map(|face| {
                let mut triangle = [[0.0f32; 3]; 3];
                for (slot, &index) in face.iter().enumerate() {
                    let v = self.vertices[index as usize];
                    triangle[slot] = [v[0] as f32, v[1] as f32, v[2] as f32];
                }
                triangle
            })
            .collect();
        FaceSoup { faces }
    }

    fn vertex(&self, index: u32) -> Vector3<f64> {
        let v = self.vertices[index as usize];
        Vector3::new(v[0], v[1], v[2])
    }

    /// Drop zero-area, NaN and index-collapsed faces. Returns removed count.
    pub fn drop_degenerate_faces(&mut self) -> usize {
        let before = self.faces.len();
        let vertices = &self.vertices;
        self.faces
            .retain(|face| !face_is_degenerate(vertices, face));
        before - self.faces.len()
    }

    /// Drop faces using the same unordered vertex triple, keeping the first.
    pub fn drop_duplicate_faces(&mut self) -> usize {
        let before = self.faces.len();
        let mut seen: HashSet<[u32; 3]> = HashSet::with_capacity(self.faces.len());
        self.faces.retain(|face| {
            let mut key = *face;
            key.sort_unstable();
            seen.insert(key)
        });
        before - self.faces.len()
    }

    /// Make windings coherent per connected body and orient each body so its
    /// normals face outward (positive enclosed volume).
    pub fn orient_normals_multibody(&mut self) {
        let edge_map = undirected_edge_map(&self.faces);
        let face_count = self.faces.len();
        let mut visited = vec![false; face_count];
        let mut flip = vec![false; face_count];

        for seed in 0..face_count {
            if visited[seed] {
                continue;
            }
            visited[seed] = true;
            let mut component = vec![seed];
            let mut queue = VecDeque::from(vec![seed]);

            while let Some(current) = queue.pop_front() {
                let face = self.faces[current];
                for k in 0..3 {
                    let a = face[k];
                    let b = face[(k + 1) % 3];
                    if a == b {
                        continue;
                    }
                    let Some(users) = edge_map.get(&edge_key(a, b)) else {
                        continue;
                    };
                    for &neighbor in users {
                        if visited[neighbor] {
                            continue;
                        }
                        // `current` traverses a->b in stored winding; the
                        // neighbor is coherent when its effective traversal
                        // runs the other way.
                        let current_forward = !flip[current];
                        let neighbor_forward = has_directed_edge(&self.faces[neighbor], a, b);
                        flip[neighbor] = neighbor_forward == current_forward;
                        visited[neighbor] = true;
                        component.push(neighbor);
                        queue.push_back(neighbor);
                    }
                }
            }

            // Signed volume of the body under the effective winding; negative
            // means the body is inside out.
            let mut volume = 0.0f64;
            for &index in &component {
                let [i0, i1, i2] = self.faces[index];
                let (j1, j2) = if flip[index] { (i2, i1) } else { (i1, i2) };
                volume += self
                    .vertex(i0)
                    .dot(&self.vertex(j1).cross(&self.vertex(j2)));
            }
            if volume < 0.0 {
                for &index in &component {
                    flip[index] = !flip[index];
                }
            }
        }

        for (face, &flipped) in self.faces.iter_mut().zip(flip.iter()) {
            if flipped {
                face.swap(1, 2);
            }
        }
    }
}

/// Full repair used per subsystem (buildings): merge, orient, then strip
/// degenerate and duplicate faces.
pub fn repair_full(mesh: &mut IndexedMesh) {
    mesh.merge_vertices(MERGE_TOLERANCE_MM);
    mesh.orient_normals_multibody();
    mesh.drop_degenerate_faces();
    mesh.drop_duplicate_faces();
    mesh.drop_degenerate_faces();
}

/// Global repair after concatenating all parts. No duplicate removal here:
/// terrain top and walls share edges intentionally.
pub fn repair_global(soup: &FaceSoup) -> IndexedMesh {
    let mut mesh = IndexedMesh::from_soup(soup, MERGE_TOLERANCE_MM);
    mesh.orient_normals_multibody();
    mesh.drop_degenerate_faces();
    mesh
}

pub(crate) fn edge_key(a: u32, b: u32) -> (u32, u32) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Undirected edge -> indices of faces using it. Collapsed edges (a == a)
/// are skipped.
pub(crate) fn undirected_edge_map(faces: &[[u32; 3]]) -> HashMap<(u32, u32), Vec<usize>> {
    let mut map: HashMap<(u32, u32), Vec<usize>> = HashMap::with_capacity(faces.len() * 3 / 2);
    for (index, face) in faces.iter().enumerate() {
        for k in 0..3 {
            let a = face[k];
            let b = face[(k + 1) % 3];
            if a == b {
                continue;
            }
            map.entry(edge_key(a, b)).or_default().push(index);
        }
    }
    map
}

pub(crate) fn face_is_degenerate(vertices: &[[f64; 3]], face: &[u32; 3]) -> bool {
    if face[0] == face[1] || face[1] == face[2] || face[0] == face[2] {
        return true;
    }
    if face
        .iter()
        .any(|&i| vertices[i as usize].iter().any(|c| !c.is_finite()))
    {
        return true;
    }
    let a = Vector3::from(vertices[face[0] as usize]);
    let b = Vector3::from(vertices[face[1] as usize]);
    let c = Vector3::from(vertices[face[2] as usize]);
    (b - a).cross(&(c - a)).norm() * 0.5 <= DEGENERATE_AREA
}

fn has_directed_edge(face: &[u32; 3], a: u32, b: u32) -> bool {
    (face[0] == a && face[1] == b)
        || (face[1] == a && face[2] == b)
        || (face[2] == a && face[0] == b)
}

fn quantize(position: &[f64; 3], tolerance: f64) -> (i64, i64, i64) {
    (
        quantize_coord(position[0], tolerance),
        quantize_coord(position[1], tolerance),
        quantize_coord(position[2], tolerance),
    )
}

// Non-finite coordinates get a sentinel bucket instead of the saturating
// float cast, which would alias NaN with the origin. Faces touching the
// sentinel vertex are removed by the degeneracy pass.
fn quantize_coord(value: f64, tolerance: f64) -> i64 {
    if !value.is_finite() {
        return i64::MAX;
    }
    (value / tolerance).round() as i64
}
