//! Scene geometry and camera
//!
//! The scene is an external collaborator of the frame engine: it only ever
//! hands the renderer a flat list of NDC vertices through
//! `FrameOrchestrator::update_vertices`.

pub mod camera;
pub mod shapes;
pub mod vertex;

pub use camera::Camera;
pub use shapes::{Body, Drawable, ModelVertex, Point, SceneError, SceneResult, Triangle, Wireframe};
pub use vertex::Vertex;

use crate::config::Topology;
use crate::foundation::math::Transform;

/// Handle of an object inside a [`Scene`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId(usize);

struct SceneObject {
    shape: Box<dyn Drawable>,
    transform: Transform,
}

/// A flat collection of shapes with per-object model transforms
#[derive(Default)]
pub struct Scene {
    objects: Vec<SceneObject>,
}

impl Scene {
    /// Create an empty scene
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a shape placed by `transform`
    pub fn add(&mut self, shape: impl Drawable + 'static, transform: Transform) -> ObjectId {
        self.objects.push(SceneObject {
            shape: Box::new(shape),
            transform,
        });
        ObjectId(self.objects.len() - 1)
    }

    /// Mutable access to an object's transform
    pub fn transform_mut(&mut self, id: ObjectId) -> Option<&mut Transform> {
        self.objects.get_mut(id.0).map(|object| &mut object.transform)
    }

    /// Number of objects
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the scene has no objects
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Flatten every object into NDC vertices as seen by `camera`
    ///
    /// A primitive with any vertex on or behind the camera plane is dropped as
    /// a whole, so the output always holds complete primitives.
    pub fn flatten(&self, camera: &Camera, topology: Topology) -> Vec<Vertex> {
        let per_primitive = topology.vertices_per_primitive();
        let view_projection = camera.view_projection_matrix();

        let mut model_vertices = Vec::new();
        let mut out = Vec::new();

        for object in &self.objects {
            model_vertices.clear();
            object.shape.append_vertices(topology, &mut model_vertices);

            let model_view_projection = view_projection * object.transform.to_matrix();
            for primitive in model_vertices.chunks_exact(per_primitive) {
                let clipped: Option<Vec<Vertex>> = primitive
                    .iter()
                    .map(|vertex| {
                        let clip = model_view_projection * vertex.position.to_homogeneous();
                        (clip.w > f32::EPSILON).then(|| {
                            Vertex::new([clip.x / clip.w, clip.y / clip.w, clip.z / clip.w], vertex.color)
                        })
                    })
                    .collect();

                if let Some(vertices) = clipped {
                    out.extend(vertices);
                }
            }
        }

        out
    }

    /// Like [`Scene::flatten`] but truncated to whole primitives within `max_vertices`
    pub fn flatten_bounded(&self, camera: &Camera, topology: Topology, max_vertices: usize) -> Vec<Vertex> {
        let mut vertices = self.flatten(camera, topology);
        let per_primitive = topology.vertices_per_primitive();
        let limit = max_vertices - max_vertices % per_primitive;

        if vertices.len() > limit {
            log::warn!(
                "Scene produced {} vertices, truncating to capacity {}",
                vertices.len(),
                limit
            );
            vertices.truncate(limit);
        }
        vertices
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{Point3, Vec3};

    const RED: [f32; 3] = [1.0, 0.0, 0.0];

    #[test]
    fn test_flatten_cube_in_view() {
        let mut scene = Scene::new();
        scene.add(Body::cube(1.0, RED), Transform::identity());

        let vertices = scene.flatten(&Camera::default(), Topology::Triangles);
        assert_eq!(vertices.len(), 36);
        for vertex in &vertices {
            assert!(vertex.position[0].abs() <= 1.0);
            assert!(vertex.position[1].abs() <= 1.0);
            assert!((0.0..=1.0).contains(&vertex.position[2]));
            assert_eq!(vertex.color, RED);
        }
    }

    #[test]
    fn test_primitives_behind_camera_dropped_whole() {
        let mut scene = Scene::new();
        scene.add(
            Triangle::new(
                [Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0), Point3::new(0.0, 0.0, 20.0)],
                RED,
            ),
            Transform::identity(),
        );
        scene.add(Point::new(Point3::origin(), RED), Transform::identity());

        assert!(scene.flatten(&Camera::default(), Topology::Triangles).is_empty());
        // The triangle loses one corner, the point survives
        assert_eq!(scene.flatten(&Camera::default(), Topology::Points).len(), 3);
    }

    #[test]
    fn test_transform_moves_object() {
        let mut scene = Scene::new();
        let id = scene.add(Point::new(Point3::origin(), RED), Transform::identity());

        let centered = scene.flatten(&Camera::default(), Topology::Points);
        scene.transform_mut(id).unwrap().position = Vec3::new(1.0, 0.0, 0.0);
        let moved = scene.flatten(&Camera::default(), Topology::Points);

        assert!(moved[0].position[0] > centered[0].position[0]);
    }

    #[test]
    fn test_flatten_bounded_keeps_whole_primitives() {
        let mut scene = Scene::new();
        scene.add(Body::cube(1.0, RED), Transform::identity());

        let vertices = scene.flatten_bounded(&Camera::default(), Topology::Triangles, 10);
        assert_eq!(vertices.len(), 9);
    }
}
