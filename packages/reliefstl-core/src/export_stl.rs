use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use tracing::info;

use crate::error::Result;
use crate::mesh_repair::FaceSoup;

/// Write the face soup as binary STL. Facet normals are recomputed from the
/// vertex winding; degenerate facets get an up normal, which slicers ignore.
pub fn write_binary_stl(path: &Path, soup: &FaceSoup) -> Result<()> {
    let triangles: Vec<stl_io::Triangle> = soup
        .faces
        .iter()
        .map(|&[a, b, c]| stl_io::Triangle {
            normal: stl_io::Normal::new(facet_normal(&a, &b, &c)),
            vertices: [
                stl_io::Vertex::new(a),
                stl_io::Vertex::new(b),
                stl_io::Vertex::new(c),
            ],
        })
        .collect();

    let mut writer = BufWriter::new(File::create(path)?);
    stl_io::write_stl(&mut writer, triangles.iter())?;
    info!(
        path = %path.display(),
        faces = soup.len(),
        "binary STL written"
    );
    Ok(())
}

fn facet_normal(a: &[f32; 3], b: &[f32; 3], c: &[f32; 3]) -> [f32; 3] {
    let u = [b[0] - a[0], b[1] - a[1], b[2] - a[2]];
    let v = [c[0] - a[0], c[1] - a[1], c[2] - a[2]];
    let normal = [
        u[1] * v[2] - u[2] * v[1],
        u[2] * v[0] - u[0] * v[2],
        u[0] * v[1] - u[1] * v[0],
    ];
    let length = (normal[0] * normal[0] + normal[1] * normal[1] + normal[2] * normal[2]).sqrt();
    if length <= f32::EPSILON {
        return [0.0, 0.0, 1.0];
    }
    [normal[0] / length, normal[1] / length, normal[2] / length]
}
