//! Triangle mesh input: flat vertex/index buffers, OBJ loading and bounds

use crate::{Error, Result, Vec3};

#[cfg(feature = "std")]
use std::fs::File;
#[cfg(feature = "std")]
use std::io::{BufRead, BufReader, Write};
#[cfg(feature = "std")]
use std::path::Path;

/// A triangle mesh stored as flat buffers
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct TriMesh {
    /// Vertex positions as a flat array of [x, y, z] triples
    pub vertices: Vec<f32>,
    /// Vertex indices, 3 per triangle
    pub indices: Vec<i32>,
    /// Number of vertices in the mesh
    pub vert_count: usize,
    /// Number of triangles in the mesh
    pub tri_count: usize,
}

impl TriMesh {
    /// Creates a new empty triangle mesh
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps existing buffers, checking that every index is in range
    pub fn from_buffers(vertices: Vec<f32>, indices: Vec<i32>) -> Result<Self> {
        if vertices.len() % 3 != 0 {
            return Err(Error::InvalidMesh(format!(
                "vertex buffer length {} is not a multiple of 3",
                vertices.len()
            )));
        }
        if indices.len() % 3 != 0 {
            return Err(Error::InvalidMesh(format!(
                "index buffer length {} is not a multiple of 3",
                indices.len()
            )));
        }

        let vert_count = vertices.len() / 3;
        if let Some(bad) = indices
            .iter()
            .find(|&&i| i < 0 || i as usize >= vert_count)
        {
            return Err(Error::InvalidMesh(format!(
                "triangle index {} out of range (0..{})",
                bad, vert_count
            )));
        }

        Ok(Self {
            tri_count: indices.len() / 3,
            vertices,
            indices,
            vert_count,
        })
    }

    /// Loads a mesh from an OBJ file
    #[cfg(feature = "std")]
    pub fn from_obj<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let mut mesh = Self::new();
        for line in reader.lines() {
            mesh.parse_obj_line(&line?)?;
        }
        Ok(mesh)
    }

    /// Parses OBJ content held in memory
    ///
    /// ```
    /// use tilenav_common::TriMesh;
    ///
    /// let mesh = TriMesh::from_obj_str("v 0 0 0\nv 1 0 0\nv 0 0 1\nf 1 3 2\n").unwrap();
    /// assert_eq!(mesh.vert_count, 3);
    /// assert_eq!(mesh.tri_count, 1);
    /// ```
    pub fn from_obj_str(content: &str) -> Result<Self> {
        let mut mesh = Self::new();
        for line in content.lines() {
            mesh.parse_obj_line(line)?;
        }
        Ok(mesh)
    }

    fn parse_obj_line(&mut self, line: &str) -> Result<()> {
        let mut tokens = line.split_whitespace();

        match tokens.next() {
            Some("v") => {
                for axis in ["x", "y", "z"] {
                    let value = tokens
                        .next()
                        .ok_or_else(|| {
                            Error::InvalidMesh(format!("vertex is missing its {} coordinate", axis))
                        })?
                        .parse::<f32>()
                        .map_err(|_| {
                            Error::InvalidMesh(format!(
                                "vertex {} coordinate is not a number",
                                axis
                            ))
                        })?;
                    self.vertices.push(value);
                }
                self.vert_count += 1;
            }
            Some("f") => {
                let mut face = Vec::new();
                for token in tokens {
                    // v, v/vt, v//vn and v/vt/vn all start with the position index
                    let raw = token.split('/').next().unwrap_or_default();
                    let index = raw.parse::<i32>().map_err(|_| {
                        Error::InvalidMesh(format!("face index '{}' is not a number", raw))
                    })?;
                    // Negative indices are relative to the end of the vertex list
                    let resolved = if index < 0 {
                        self.vert_count as i32 + index
                    } else {
                        index - 1
                    };
                    face.push(resolved);
                }

                if face.len() < 3 {
                    return Err(Error::InvalidMesh(
                        "face has fewer than 3 vertices".to_string(),
                    ));
                }

                for i in 1..face.len() - 1 {
                    self.indices
                        .extend_from_slice(&[face[0], face[i], face[i + 1]]);
                    self.tri_count += 1;
                }
            }
            _ => {}
        }

        Ok(())
    }

    /// Writes the mesh as OBJ text
    #[cfg(feature = "std")]
    pub fn write_obj<W: Write>(&self, mut out: W) -> Result<()> {
        for v in self.vertices.chunks_exact(3) {
            writeln!(out, "v {} {} {}", v[0], v[1], v[2])?;
        }
        for t in self.indices.chunks_exact(3) {
            writeln!(out, "f {} {} {}", t[0] + 1, t[1] + 1, t[2] + 1)?;
        }
        Ok(())
    }

    /// Returns vertex `i` as a vector
    #[inline]
    pub fn vertex(&self, i: usize) -> Vec3 {
        Vec3::new(
            self.vertices[i * 3],
            self.vertices[i * 3 + 1],
            self.vertices[i * 3 + 2],
        )
    }

    /// Returns true when the mesh has no triangles to rasterize
    pub fn is_empty(&self) -> bool {
        self.tri_count == 0 || self.vert_count == 0
    }

    /// Calculates the axis-aligned bounding box of the mesh
    pub fn calculate_bounds(&self) -> (Vec3, Vec3) {
        if self.vert_count == 0 {
            return (Vec3::ZERO, Vec3::ZERO);
        }

        let mut bmin = Vec3::splat(f32::MAX);
        let mut bmax = Vec3::splat(f32::MIN);
        for i in 0..self.vert_count {
            let v = self.vertex(i);
            bmin = bmin.min(v);
            bmax = bmax.max(v);
        }

        (bmin, bmax)
    }
}
