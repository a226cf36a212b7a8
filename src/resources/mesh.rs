//! Mesh data structures and generation

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::scene::BoundingSphere;
use glam::{Vec2, Vec3};

/// A mesh with vertex and 16-bit index data
#[derive(Debug, Clone)]
pub struct Mesh {
    pub vertices: Vec<VertexPositionNormalTexture>,
    pub indices: Vec<u16>,
    pub name: String,
}

impl Mesh {
    pub fn new(name: &str) -> Self {
        Self {
            vertices: Vec::new(),
            indices: Vec::new(),
            name: name.to_string(),
        }
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    /// Get vertex data as bytes
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    /// Bounding sphere in model space
    pub fn bounding_sphere(&self) -> BoundingSphere {
        BoundingSphere::from_points(self.vertices.iter().map(|v| v.position))
    }

    /// Create a unit cube centered at origin
    pub fn cube() -> Self {
        let mut mesh = Mesh::new("cube");
        let faces = [
            (Vec3::Z, Vec3::X),
            (-Vec3::Z, -Vec3::X),
            (Vec3::X, -Vec3::Z),
            (-Vec3::X, Vec3::Z),
            (Vec3::Y, Vec3::X),
            (-Vec3::Y, Vec3::X),
        ];

        for (normal, right) in faces {
            let up = normal.cross(right);
            let base = mesh.vertices.len() as u16;
            let corners = [
                (-right - up, Vec2::new(0.0, 1.0)),
                (right - up, Vec2::new(1.0, 1.0)),
                (right + up, Vec2::new(1.0, 0.0)),
                (-right + up, Vec2::new(0.0, 0.0)),
            ];
            for (offset, uv) in corners {
                mesh.vertices.push(VertexPositionNormalTexture::new(
                    (normal + offset) * 0.5,
                    normal,
                    uv,
                ));
            }
            mesh.indices
                .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }

        mesh
    }

    /// Create a UV sphere of radius 0.5
    pub fn sphere(segments: u16, rings: u16) -> Self {
        let mut mesh = Mesh::new("sphere");

        let segment_angle = 2.0 * std::f32::consts::PI / segments as f32;
        let ring_angle = std::f32::consts::PI / rings as f32;

        for ring in 0..=rings {
            let phi = ring as f32 * ring_angle;
            let y = phi.cos();
            let ring_radius = phi.sin();

            for segment in 0..=segments {
                let theta = segment as f32 * segment_angle;
                let normal = Vec3::new(ring_radius * theta.cos(), y, ring_radius * theta.sin());
                let uv = Vec2::new(
                    segment as f32 / segments as f32,
                    ring as f32 / rings as f32,
                );
                mesh.vertices
                    .push(VertexPositionNormalTexture::new(normal * 0.5, normal, uv));
            }
        }

        for ring in 0..rings {
            for segment in 0..segments {
                let current = ring * (segments + 1) + segment;
                let next = current + segments + 1;

                mesh.indices.extend_from_slice(&[
                    current,
                    current + 1,
                    next,
                    current + 1,
                    next + 1,
                    next,
                ]);
            }
        }

        mesh
    }

    /// Create a plane on the XZ axis facing +Y
    pub fn plane(width: f32, depth: f32, subdivisions: u16) -> Self {
        let mut mesh = Mesh::new("plane");

        let half_width = width / 2.0;
        let half_depth = depth / 2.0;
        let step_x = width / subdivisions as f32;
        let step_z = depth / subdivisions as f32;

        for z in 0..=subdivisions {
            for x in 0..=subdivisions {
                let px = -half_width + x as f32 * step_x;
                let pz = -half_depth + z as f32 * step_z;

                mesh.vertices.push(VertexPositionNormalTexture::new(
                    Vec3::new(px, 0.0, pz),
                    Vec3::Y,
                    Vec2::new(x as f32 / subdivisions as f32, z as f32 / subdivisions as f32),
                ));
            }
        }

        for z in 0..subdivisions {
            for x in 0..subdivisions {
                let current = z * (subdivisions + 1) + x;
                let next = current + subdivisions + 1;

                mesh.indices.extend_from_slice(&[
                    current,
                    next,
                    current + 1,
                    current + 1,
                    next,
                    next + 1,
                ]);
            }
        }

        mesh
    }
}

/// Vertex and index buffers of an uploaded mesh
#[derive(Debug, Clone, Copy)]
pub struct GpuMesh {
    pub vertex_buffer: BufferHandle,
    pub index_buffer: BufferHandle,
    pub index_count: u32,
}

impl GpuMesh {
    pub fn create(factory: &mut dyn ResourceFactory, mesh: &Mesh) -> BackendResult<Self> {
        let vertex_buffer = factory.create_vertex_buffer(mesh.vertex_bytes(), &mesh.name)?;
        let index_buffer = factory.create_index_buffer(&mesh.indices, &mesh.name)?;
        Ok(Self {
            vertex_buffer,
            index_buffer,
            index_count: mesh.index_count(),
        })
    }

    /// Bind both buffers, vertex data in slot 0
    pub fn bind(&self, rc: &mut dyn RenderContext) -> BackendResult<()> {
        rc.set_vertex_buffer(0, self.vertex_buffer)?;
        rc.set_index_buffer(self.index_buffer, IndexFormat::Uint16)
    }

    pub fn destroy(&self, factory: &mut dyn ResourceFactory) {
        factory.destroy(self.vertex_buffer.into());
        factory.destroy(self.index_buffer.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cube_geometry() {
        let cube = Mesh::cube();
        assert_eq!(cube.vertices.len(), 24);
        assert_eq!(cube.index_count(), 36);
        for v in &cube.vertices {
            assert_eq!(v.position.abs().max_element(), 0.5);
            assert!(v.position.dot(v.normal) > 0.0);
        }
    }

    #[test]
    fn test_sphere_bounds() {
        let sphere = Mesh::sphere(16, 8);
        let bounds = sphere.bounding_sphere();
        assert!(bounds.center.length() < 1e-3);
        assert!((bounds.radius - 0.5).abs() < 1e-3);
        assert!(sphere.indices.iter().all(|&i| (i as usize) < sphere.vertices.len()));
    }

    #[test]
    fn test_plane_counts() {
        let plane = Mesh::plane(10.0, 10.0, 4);
        assert_eq!(plane.vertices.len(), 25);
        assert_eq!(plane.index_count(), 4 * 4 * 6);
    }
}
