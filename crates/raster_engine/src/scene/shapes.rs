//! Scene shapes: points, triangles, wireframes and convex bodies
//!
//! Shapes produce model-space vertices grouped by primitive. How a shape is
//! expressed depends on the pipeline topology; a shape with nothing to say
//! for a topology simply contributes no vertices.

use crate::config::Topology;
use crate::foundation::math::Point3;
use std::collections::BTreeSet;
use thiserror::Error;

/// Errors raised while constructing shapes
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SceneError {
    /// A face or edge refers to a vertex that does not exist
    #[error("Vertex index {index} out of range for {len} vertices")]
    IndexOutOfRange {
        /// Offending index
        index: usize,
        /// Number of vertices available
        len: usize,
    },

    /// A face has fewer than three corners
    #[error("Face {face} has {corners} corners, at least 3 are required")]
    DegenerateFace {
        /// Face position in the face list
        face: usize,
        /// Corner count found
        corners: usize,
    },
}

/// Result type for shape construction
pub type SceneResult<T> = Result<T, SceneError>;

/// A colored vertex in model space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelVertex {
    /// Model-space position
    pub position: Point3,
    /// Linear RGB color
    pub color: [f32; 3],
}

impl ModelVertex {
    const fn new(position: Point3, color: [f32; 3]) -> Self {
        Self { position, color }
    }
}

/// Anything that can be flattened into primitives of a given topology
///
/// Implementations must append whole primitives only:
/// `out.len()` stays a multiple of `topology.vertices_per_primitive()`.
pub trait Drawable {
    /// Append this shape's primitives for `topology` to `out`
    fn append_vertices(&self, topology: Topology, out: &mut Vec<ModelVertex>);
}

/// A single point
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    /// Location
    pub position: Point3,
    /// Linear RGB color
    pub color: [f32; 3],
}

impl Point {
    /// Create a point
    pub const fn new(position: Point3, color: [f32; 3]) -> Self {
        Self { position, color }
    }
}

impl Drawable for Point {
    fn append_vertices(&self, topology: Topology, out: &mut Vec<ModelVertex>) {
        if topology == Topology::Points {
            out.push(ModelVertex::new(self.position, self.color));
        }
    }
}

/// A flat triangle
#[derive(Debug, Clone, PartialEq)]
pub struct Triangle {
    /// Corners in winding order
    pub corners: [Point3; 3],
    /// Linear RGB color
    pub color: [f32; 3],
}

impl Triangle {
    /// Create a triangle
    pub const fn new(corners: [Point3; 3], color: [f32; 3]) -> Self {
        Self { corners, color }
    }
}

impl Drawable for Triangle {
    fn append_vertices(&self, topology: Topology, out: &mut Vec<ModelVertex>) {
        let [a, b, c] = self.corners;
        match topology {
            Topology::Triangles | Topology::Points => {
                out.extend([a, b, c].map(|p| ModelVertex::new(p, self.color)));
            }
            Topology::Lines => {
                for (start, end) in [(a, b), (b, c), (c, a)] {
                    out.push(ModelVertex::new(start, self.color));
                    out.push(ModelVertex::new(end, self.color));
                }
            }
        }
    }
}

/// A set of vertices joined by explicit edges
#[derive(Debug, Clone, PartialEq)]
pub struct Wireframe {
    vertices: Vec<Point3>,
    edges: Vec<(usize, usize)>,
    color: [f32; 3],
}

impl Wireframe {
    /// Create a wireframe, validating every edge endpoint
    pub fn new(vertices: Vec<Point3>, edges: Vec<(usize, usize)>, color: [f32; 3]) -> SceneResult<Self> {
        let len = vertices.len();
        if let Some(&index) = edges
            .iter()
            .flat_map(|(a, b)| [a, b])
            .find(|&&index| index >= len)
        {
            return Err(SceneError::IndexOutOfRange { index, len });
        }

        Ok(Self { vertices, edges, color })
    }

    /// Edge list
    pub fn edges(&self) -> &[(usize, usize)] {
        &self.edges
    }
}

impl Drawable for Wireframe {
    fn append_vertices(&self, topology: Topology, out: &mut Vec<ModelVertex>) {
        match topology {
            Topology::Lines => {
                for &(a, b) in &self.edges {
                    out.push(ModelVertex::new(self.vertices[a], self.color));
                    out.push(ModelVertex::new(self.vertices[b], self.color));
                }
            }
            Topology::Points => {
                out.extend(self.vertices.iter().map(|&p| ModelVertex::new(p, self.color)));
            }
            Topology::Triangles => {}
        }
    }
}

/// A convex polyhedron described by its vertices and polygonal faces
///
/// Faces list vertex indices in winding order. Convexity makes a triangle fan
/// from the first corner a valid triangulation of every face.
#[derive(Debug, Clone, PartialEq)]
pub struct Body {
    vertices: Vec<Point3>,
    faces: Vec<Vec<usize>>,
    color: [f32; 3],
}

impl Body {
    /// Create a body, validating face sizes and indices
    pub fn new(vertices: Vec<Point3>, faces: Vec<Vec<usize>>, color: [f32; 3]) -> SceneResult<Self> {
        let len = vertices.len();
        for (face_index, face) in faces.iter().enumerate() {
            if face.len() < 3 {
                return Err(SceneError::DegenerateFace { face: face_index, corners: face.len() });
            }
            if let Some(&index) = face.iter().find(|&&index| index >= len) {
                return Err(SceneError::IndexOutOfRange { index, len });
            }
        }

        Ok(Self { vertices, faces, color })
    }

    /// Axis-aligned cube centred on the origin
    pub fn cube(size: f32, color: [f32; 3]) -> Self {
        let h = size * 0.5;
        let vertices = vec![
            Point3::new(-h, -h, -h),
            Point3::new(h, -h, -h),
            Point3::new(h, h, -h),
            Point3::new(-h, h, -h),
            Point3::new(-h, -h, h),
            Point3::new(h, -h, h),
            Point3::new(h, h, h),
            Point3::new(-h, h, h),
        ];
        let faces = vec![
            vec![0, 3, 2, 1],
            vec![4, 5, 6, 7],
            vec![0, 1, 5, 4],
            vec![2, 3, 7, 6],
            vec![1, 2, 6, 5],
            vec![0, 4, 7, 3],
        ];

        Self { vertices, faces, color }
    }

    /// Regular tetrahedron inscribed in a cube of edge `size`
    pub fn tetrahedron(size: f32, color: [f32; 3]) -> Self {
        let h = size * 0.5;
        let vertices = vec![
            Point3::new(h, h, h),
            Point3::new(-h, -h, h),
            Point3::new(-h, h, -h),
            Point3::new(h, -h, -h),
        ];
        let faces = vec![vec![0, 1, 2], vec![0, 3, 1], vec![0, 2, 3], vec![1, 3, 2]];

        Self { vertices, faces, color }
    }

    /// Number of triangles a fan triangulation produces
    pub fn triangle_count(&self) -> usize {
        self.faces.iter().map(|face| face.len() - 2).sum()
    }

    /// Unique undirected edges, ordered
    pub fn edges(&self) -> Vec<(usize, usize)> {
        let mut edges = BTreeSet::new();
        for face in &self.faces {
            for (i, &a) in face.iter().enumerate() {
                let b = face[(i + 1) % face.len()];
                edges.insert((a.min(b), a.max(b)));
            }
        }
        edges.into_iter().collect()
    }
}

impl Drawable for Body {
    fn append_vertices(&self, topology: Topology, out: &mut Vec<ModelVertex>) {
        match topology {
            Topology::Triangles => {
                for face in &self.faces {
                    let anchor = self.vertices[face[0]];
                    for pair in face[1..].windows(2) {
                        out.push(ModelVertex::new(anchor, self.color));
                        out.push(ModelVertex::new(self.vertices[pair[0]], self.color));
                        out.push(ModelVertex::new(self.vertices[pair[1]], self.color));
                    }
                }
            }
            Topology::Lines => {
                for (a, b) in self.edges() {
                    out.push(ModelVertex::new(self.vertices[a], self.color));
                    out.push(ModelVertex::new(self.vertices[b], self.color));
                }
            }
            Topology::Points => {
                out.extend(self.vertices.iter().map(|&p| ModelVertex::new(p, self.color)));
            }
        }
    }
}
