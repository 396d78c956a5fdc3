//! Wavefront OBJ import and export.
//!
//! Only geometry is read: `v` and `f` records. Polygons are fan-triangulated,
//! indices may be 1-based or negative (relative to the current vertex count),
//! and `v/vt/vn` style references keep only the vertex index.

use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::error::{MeshError, Result};
use crate::mesh::TriangleMesh;
use crate::types::Point3;

fn parse_coordinate(token: Option<&str>, line: usize, axis: &str) -> Result<f32> {
    let token = token.ok_or_else(|| MeshError::Parse {
        line,
        message: format!("missing vertex {axis}"),
    })?;
    token.parse().map_err(|_| MeshError::Parse {
        line,
        message: format!("invalid vertex {axis}: {token:?}"),
    })
}

fn parse_index(token: &str, vertex_count: usize, line: usize) -> Result<usize> {
    let raw = token.split('/').next().unwrap_or(token);
    let idx: i64 = raw.parse().map_err(|_| MeshError::Parse {
        line,
        message: format!("invalid face index: {raw:?}"),
    })?;

    let resolved = match idx {
        0 => None,
        i if i > 0 => Some(i - 1),
        i => Some(vertex_count as i64 + i),
    };
    match resolved {
        Some(i) if i >= 0 && (i as usize) < vertex_count => Ok(i as usize),
        _ => Err(MeshError::Parse {
            line,
            message: format!("face index {idx} out of range ({vertex_count} vertices so far)"),
        }),
    }
}

/// Parse an OBJ stream into a triangle mesh.
pub fn parse_obj<R: Read>(reader: R) -> Result<TriangleMesh> {
    let mut vertices = Vec::new();
    let mut faces = Vec::new();

    for (n, line) in BufReader::new(reader).lines().enumerate() {
        let line = line?;
        let line_no = n + 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("v") => {
                let x = parse_coordinate(parts.next(), line_no, "x")?;
                let y = parse_coordinate(parts.next(), line_no, "y")?;
                let z = parse_coordinate(parts.next(), line_no, "z")?;
                vertices.push(Point3::new(x, y, z));
            }
            Some("f") => {
                let polygon = parts
                    .map(|t| parse_index(t, vertices.len(), line_no))
                    .collect::<Result<Vec<usize>>>()?;
                if polygon.len() < 3 {
                    return Err(MeshError::Parse {
                        line: line_no,
                        message: format!("face has {} vertices, need at least 3", polygon.len()),
                    });
                }
                for i in 1..polygon.len() - 1 {
                    faces.push([polygon[0], polygon[i], polygon[i + 1]]);
                }
            }
            // vn, vt, g, o, s, usemtl, ...
            _ => {}
        }
    }

    TriangleMesh::new(vertices, faces)
}

/// Parse an OBJ file from a path, welding coincident vertices.
///
/// Exporters often write one vertex per face corner; welding restores the
/// shared edges so a closed solid validates as one.
pub fn read_obj_file<P: AsRef<Path>>(path: P) -> Result<TriangleMesh> {
    let mut mesh = parse_obj(std::fs::File::open(path)?)?;
    let welded = mesh.weld_coincident();
    if welded > 0 {
        log::debug!("welded {welded} duplicate vertices");
    }
    Ok(mesh)
}

/// Write a mesh as OBJ.
pub fn write_obj<W: Write>(mesh: &TriangleMesh, writer: &mut W) -> Result<()> {
    writeln!(writer, "# {} vertices, {} faces", mesh.num_vertices(), mesh.num_faces())?;
    for v in &mesh.vertices {
        writeln!(writer, "v {} {} {}", v.x, v.y, v.z)?;
    }
    for [a, b, c] in &mesh.faces {
        writeln!(writer, "f {} {} {}", a + 1, b + 1, c + 1)?;
    }
    Ok(())
}

/// Write a mesh to an OBJ file.
pub fn write_obj_file<P: AsRef<Path>>(mesh: &TriangleMesh, path: P) -> Result<()> {
    let mut writer = BufWriter::new(std::fs::File::create(path)?);
    write_obj(mesh, &mut writer)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quad_and_slashes() {
        let src = "# quad\nv 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nvn 0 0 1\nf 1/1/1 2/2/1 3//1 4\n";
        let mesh = parse_obj(src.as_bytes()).unwrap();
        assert_eq!(mesh.num_vertices(), 4);
        assert_eq!(mesh.faces, vec![[0, 1, 2], [0, 2, 3]]);
    }

    #[test]
    fn test_negative_indices() {
        let src = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf -3 -2 -1\n";
        let mesh = parse_obj(src.as_bytes()).unwrap();
        assert_eq!(mesh.faces, vec![[0, 1, 2]]);
    }

    #[test]
    fn test_malformed_input() {
        assert!(matches!(parse_obj("v 0 0\n".as_bytes()), Err(MeshError::Parse { line: 1, .. })));
        assert!(matches!(
            parse_obj("v 0 0 0\nf 1 2 3\n".as_bytes()),
            Err(MeshError::Parse { line: 2, .. })
        ));
        assert!(parse_obj("v a b c\n".as_bytes()).is_err());
    }

    #[test]
    fn test_write_then_parse() {
        let mesh = TriangleMesh::axis_aligned_box(Point3::new(0.0, 0.5, 0.0), Point3::new(1.0, 1.5, 2.25));
        let mut buf = Vec::new();
        write_obj(&mesh, &mut buf).unwrap();
        assert_eq!(parse_obj(buf.as_slice()).unwrap(), mesh);
    }

    #[test]
    fn test_read_welds_per_face_vertices() {
        let mut src = String::new();
        let solid = TriangleMesh::axis_aligned_box(Point3::splat(-1.0), Point3::splat(1.0));
        for f in 0..solid.num_faces() {
            for v in solid.triangle(f) {
                src.push_str(&format!("v {} {} {}\n", v.x, v.y, v.z));
            }
            src.push_str("f -3 -2 -1\n");
        }
        assert_eq!(parse_obj(src.as_bytes()).unwrap().num_vertices(), 36);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("split_box.obj");
        std::fs::write(&path, src).unwrap();
        let mesh = read_obj_file(&path).unwrap();
        assert_eq!(mesh.num_vertices(), 8);
        mesh.validate_solid().unwrap();
    }
}
