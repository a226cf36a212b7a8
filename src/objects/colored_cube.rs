//! Spinning vertex-colored cube

use std::rc::Rc;

use glam::{Mat4, Vec3, Vec4};

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::error::{RenderError, RenderResult};
use crate::pipeline::{CommonStages, RenderItem, SharedNames, StageContext, SwappableRenderItem};
use crate::queue::RenderOrderKey;
use crate::resources::{ContextObjects, DeviceObjectCache, DeviceObjects, Material, MaterialDescriptor};
use crate::scene::{BoundingFrustum, BoundingSphere, ContainmentType};

const STAGES: [&str; 1] = [CommonStages::STANDARD];

const RED: Vec4 = Vec4::new(1.0, 0.0, 0.0, 1.0);
const GREY: Vec4 = Vec4::new(0.25, 0.25, 0.25, 1.0);
const BLUE: Vec4 = Vec4::new(0.0, 0.0, 1.0, 1.0);
const WHITE: Vec4 = Vec4::ONE;
const YELLOW: Vec4 = Vec4::new(1.0, 1.0, 0.0, 1.0);
const GREEN: Vec4 = Vec4::new(0.0, 1.0, 0.0, 1.0);

fn cube_vertices() -> Vec<VertexPositionColor> {
    let v = |x: f32, y: f32, z: f32, c: Vec4| VertexPositionColor::new(Vec3::new(x, y, z), c);
    vec![
        // Top
        v(-0.5, 0.5, -0.5, RED),
        v(0.5, 0.5, -0.5, RED),
        v(0.5, 0.5, 0.5, RED),
        v(-0.5, 0.5, 0.5, RED),
        // Bottom
        v(-0.5, -0.5, 0.5, GREY),
        v(0.5, -0.5, 0.5, GREY),
        v(0.5, -0.5, -0.5, GREY),
        v(-0.5, -0.5, -0.5, GREY),
        // Left
        v(-0.5, 0.5, -0.5, BLUE),
        v(-0.5, 0.5, 0.5, BLUE),
        v(-0.5, -0.5, 0.5, BLUE),
        v(-0.5, -0.5, -0.5, BLUE),
        // Right
        v(0.5, 0.5, 0.5, WHITE),
        v(0.5, 0.5, -0.5, WHITE),
        v(0.5, -0.5, -0.5, WHITE),
        v(0.5, -0.5, 0.5, WHITE),
        // Back
        v(0.5, 0.5, -0.5, YELLOW),
        v(-0.5, 0.5, -0.5, YELLOW),
        v(-0.5, -0.5, -0.5, YELLOW),
        v(0.5, -0.5, -0.5, YELLOW),
        // Front
        v(-0.5, 0.5, 0.5, GREEN),
        v(0.5, 0.5, 0.5, GREEN),
        v(0.5, -0.5, 0.5, GREEN),
        v(-0.5, -0.5, 0.5, GREEN),
    ]
}

fn cube_indices() -> Vec<u16> {
    (0..6u16)
        .flat_map(|face| {
            let b = face * 4;
            [b, b + 1, b + 2, b, b + 2, b + 3]
        })
        .collect()
}

/// Geometry and material shared by every cube on a context
#[derive(Debug)]
pub struct ColoredCubeObjects {
    vertex_buffer: BufferHandle,
    index_buffer: BufferHandle,
    index_count: u32,
    material: Material,
}

impl ColoredCubeObjects {
    fn create(factory: &mut dyn ResourceFactory) -> BackendResult<Self> {
        let indices = cube_indices();
        Ok(Self {
            vertex_buffer: factory
                .create_vertex_buffer(bytemuck::cast_slice(&cube_vertices()), "colored cube")?,
            index_buffer: factory.create_index_buffer(&indices, "colored cube")?,
            index_count: indices.len() as u32,
            material: Material::create(
                factory,
                &MaterialDescriptor {
                    shader_set_name: "simple",
                    vertex_inputs: vec![VertexPositionColor::layout()],
                    resources: vec![
                        ShaderResourceDescription::constant(
                            "ProjectionMatrixBuffer",
                            ShaderConstantType::Matrix4x4,
                        ),
                        ShaderResourceDescription::constant(
                            "ModelViewMatrixBuffer",
                            ShaderConstantType::Matrix4x4,
                        ),
                    ],
                },
            )?,
        })
    }
}

impl DeviceObjects for ColoredCubeObjects {
    fn destroy(&self, factory: &mut dyn ResourceFactory) {
        factory.destroy(self.vertex_buffer.into());
        factory.destroy(self.index_buffer.into());
        self.material.destroy(factory);
    }
}

/// Model-view matrix of a cube `seconds` into its animation
pub fn cube_model_view(position: Vec3, scale: Vec3, seconds: f32, view: Mat4) -> Mat4 {
    let r = seconds;
    view * Mat4::from_translation(r.sin() * Vec3::Y)
        * Mat4::from_translation(position)
        * Mat4::from_rotation_z(r * 0.33 * position.z)
        * Mat4::from_rotation_y(r)
        * Mat4::from_rotation_x(r * 0.5 * position.y)
        * Mat4::from_scale(scale)
}

/// Animated cube; its geometry lives in the [`DeviceObjectCache`]
#[derive(Debug)]
pub struct ColoredCubeRenderer {
    pub position: Vec3,
    pub scale: Vec3,
    shared: Option<Rc<ColoredCubeObjects>>,
    model_view_buffer: ContextObjects<BufferHandle>,
}

impl ColoredCubeRenderer {
    pub fn new(position: Vec3) -> Self {
        Self {
            position,
            scale: Vec3::splat(0.75),
            shared: None,
            model_view_buffer: ContextObjects::new(),
        }
    }

    pub fn cull_radius(&self) -> f32 {
        3.0 * self.scale.x * self.scale.x / 2.0
    }
}

impl RenderItem for ColoredCubeRenderer {
    fn stages_participated(&self) -> &[&'static str] {
        &STAGES
    }

    fn cull(&self, frustum: &BoundingFrustum) -> bool {
        let sphere = BoundingSphere::new(self.position, self.cull_radius());
        frustum.contains_sphere(&sphere) == ContainmentType::Disjoint
    }

    fn render_order_key(&self, _viewpoint: Vec3) -> RenderOrderKey {
        RenderOrderKey::default()
    }

    fn render(&mut self, ctx: &mut StageContext<'_>, _stage: &str) -> RenderResult<()> {
        let model_view_buffer = self.model_view_buffer.get().copied();
        let (Some(shared), Some(model_view_buffer)) = (&self.shared, model_view_buffer) else {
            return Err(RenderError::ItemNotInitialized {
                item: "colored cube".to_string(),
            });
        };

        let model_view =
            cube_model_view(self.position, self.scale, ctx.frame.elapsed_seconds, ctx.frame.view);
        ctx.rc
            .resource_factory()
            .write_buffer(model_view_buffer, 0, bytemuck::bytes_of(&model_view))?;

        ctx.rc.set_vertex_buffer(0, shared.vertex_buffer)?;
        ctx.rc.set_index_buffer(shared.index_buffer, IndexFormat::Uint16)?;
        shared.material.apply(ctx.rc)?;
        ctx.rc
            .set_constant_buffer(0, ctx.shared.buffer(SharedNames::PROJECTION_MATRIX)?)?;
        ctx.rc.set_constant_buffer(1, model_view_buffer)?;
        ctx.rc.draw_indexed_primitives(shared.index_count, 0)?;
        Ok(())
    }
}

impl SwappableRenderItem for ColoredCubeRenderer {
    fn change_render_context(
        &mut self,
        rc: &mut dyn RenderContext,
        cache: &mut DeviceObjectCache,
    ) -> RenderResult<()> {
        self.shared = Some(cache.get_or_create(rc, ColoredCubeObjects::create)?);
        self.model_view_buffer.rebuild(rc, |factory| {
            factory.create_constant_buffer(ShaderConstantType::Matrix4x4, "cube model view")
        })?;
        Ok(())
    }

    /// The shared geometry stays in the cache
    fn dispose(&mut self, factory: &mut dyn ResourceFactory) {
        self.model_view_buffer.dispose(factory);
        self.shared = None;
    }
}
