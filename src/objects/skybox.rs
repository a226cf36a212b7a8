//! Cubemapped box drawn behind everything else

use glam::{Mat3, Mat4, Vec3};

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::error::{RenderError, RenderResult};
use crate::pipeline::{CommonStages, RenderItem, SharedNames, StageContext, SwappableRenderItem};
use crate::queue::RenderOrderKey;
use crate::resources::{
    ContextObjects, CubemapData, DeviceObjectCache, DeviceObjects, GpuTexture, Material, MaterialDescriptor,
};
use crate::scene::BoundingFrustum;

const STAGES: [&str; 1] = [CommonStages::STANDARD];

/// Half size of the box
pub const SKYBOX_EXTENT: f32 = 20.0;

fn skybox_material() -> MaterialDescriptor {
    MaterialDescriptor {
        shader_set_name: "skybox",
        vertex_inputs: vec![VertexPosition::layout()],
        resources: vec![
            ShaderResourceDescription::constant("ProjectionMatrixBuffer", ShaderConstantType::Matrix4x4),
            ShaderResourceDescription::constant("ViewMatrixBuffer", ShaderConstantType::Matrix4x4),
            ShaderResourceDescription::texture("Skybox"),
        ],
    }
}

/// Faces wound to be seen from inside
fn skybox_geometry() -> (Vec<VertexPosition>, Vec<u16>) {
    let e = SKYBOX_EXTENT;
    let vertices = vec![
        // Top
        VertexPosition::new(-e, e, -e),
        VertexPosition::new(e, e, -e),
        VertexPosition::new(e, e, e),
        VertexPosition::new(-e, e, e),
        // Bottom
        VertexPosition::new(-e, -e, e),
        VertexPosition::new(e, -e, e),
        VertexPosition::new(e, -e, -e),
        VertexPosition::new(-e, -e, -e),
        // Left
        VertexPosition::new(-e, e, -e),
        VertexPosition::new(-e, e, e),
        VertexPosition::new(-e, -e, e),
        VertexPosition::new(-e, -e, -e),
        // Right
        VertexPosition::new(e, e, e),
        VertexPosition::new(e, e, -e),
        VertexPosition::new(e, -e, -e),
        VertexPosition::new(e, -e, e),
        // Back
        VertexPosition::new(e, e, -e),
        VertexPosition::new(-e, e, -e),
        VertexPosition::new(-e, -e, -e),
        VertexPosition::new(e, -e, -e),
        // Front
        VertexPosition::new(-e, e, e),
        VertexPosition::new(e, e, e),
        VertexPosition::new(e, -e, e),
        VertexPosition::new(-e, -e, e),
    ];
    let indices = (0..6u16)
        .flat_map(|face| {
            let b = face * 4;
            [b, b + 1, b + 2, b, b + 2, b + 3]
        })
        .collect();
    (vertices, indices)
}

/// Camera view with the translation removed, so the box follows the camera
pub fn rotation_only(view: Mat4) -> Mat4 {
    Mat4::from_mat3(Mat3::from_mat4(view))
}

#[derive(Debug)]
struct SkyboxObjects {
    vertex_buffer: BufferHandle,
    index_buffer: BufferHandle,
    index_count: u32,
    material: Material,
    view_buffer: BufferHandle,
    cubemap: GpuTexture,
    rasterizer_state: RasterizerStateHandle,
}

impl SkyboxObjects {
    fn create(factory: &mut dyn ResourceFactory, faces: &CubemapData) -> BackendResult<Self> {
        let (vertices, indices) = skybox_geometry();
        let cubemap = faces.create(factory)?;
        Ok(Self {
            vertex_buffer: factory.create_vertex_buffer(bytemuck::cast_slice(&vertices), "skybox")?,
            index_buffer: factory.create_index_buffer(&indices, "skybox")?,
            index_count: indices.len() as u32,
            material: Material::create(factory, &skybox_material())?,
            view_buffer: factory.create_constant_buffer(ShaderConstantType::Matrix4x4, "skybox view")?,
            cubemap: GpuTexture::bind(factory, cubemap)?,
            rasterizer_state: factory.create_rasterizer_state(&RasterizerDescriptor {
                cull_mode: CullMode::None,
                fill_mode: FillMode::Solid,
                depth_clip: false,
                scissor_test: false,
            })?,
        })
    }
}

impl DeviceObjects for SkyboxObjects {
    fn destroy(&self, factory: &mut dyn ResourceFactory) {
        factory.destroy(self.vertex_buffer.into());
        factory.destroy(self.index_buffer.into());
        self.material.destroy(factory);
        factory.destroy(self.view_buffer.into());
        self.cubemap.destroy(factory);
        factory.destroy(self.rasterizer_state.into());
    }
}

/// Sky cubemap; always drawn last in the standard pass
#[derive(Debug)]
pub struct Skybox {
    faces: CubemapData,
    objects: ContextObjects<SkyboxObjects>,
}

impl Skybox {
    pub fn new(faces: CubemapData) -> Self {
        Self {
            faces,
            objects: ContextObjects::new(),
        }
    }
}

impl RenderItem for Skybox {
    fn stages_participated(&self) -> &[&'static str] {
        &STAGES
    }

    fn cull(&self, _frustum: &BoundingFrustum) -> bool {
        false
    }

    fn render_order_key(&self, _viewpoint: Vec3) -> RenderOrderKey {
        RenderOrderKey::LAST
    }

    fn render(&mut self, ctx: &mut StageContext<'_>, _stage: &str) -> RenderResult<()> {
        let objects = self.objects.get().ok_or_else(|| RenderError::ItemNotInitialized {
            item: "skybox".to_string(),
        })?;

        ctx.rc.set_vertex_buffer(0, objects.vertex_buffer)?;
        ctx.rc.set_index_buffer(objects.index_buffer, IndexFormat::Uint16)?;
        objects.material.apply(ctx.rc)?;

        ctx.rc
            .set_constant_buffer(0, ctx.shared.buffer(SharedNames::PROJECTION_MATRIX)?)?;
        let view = rotation_only(ctx.frame.view);
        ctx.rc
            .resource_factory()
            .write_buffer(objects.view_buffer, 0, bytemuck::bytes_of(&view))?;
        ctx.rc.set_constant_buffer(1, objects.view_buffer)?;

        let previous = ctx.rc.rasterizer_state();
        ctx.rc.set_rasterizer_state(objects.rasterizer_state)?;
        ctx.rc.set_texture(0, objects.cubemap.binding)?;
        ctx.rc.draw_indexed_primitives(objects.index_count, 0)?;
        ctx.rc.set_rasterizer_state(previous)?;
        Ok(())
    }
}

impl SwappableRenderItem for Skybox {
    fn change_render_context(
        &mut self,
        rc: &mut dyn RenderContext,
        _cache: &mut DeviceObjectCache,
    ) -> RenderResult<()> {
        let faces = &self.faces;
        self.objects
            .rebuild(rc, |factory| SkyboxObjects::create(factory, faces))?;
        Ok(())
    }

    fn dispose(&mut self, factory: &mut dyn ResourceFactory) {
        self.objects.dispose(factory);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeadlessContext;
    use crate::pipeline::{FrameInfo, SharedResources};
    use crate::BackendType;

    #[test]
    fn test_sorts_last_and_never_culled() {
        let skybox = Skybox::new(CubemapData::solid(2, [0, 0, 255, 255]));
        assert_eq!(skybox.render_order_key(Vec3::ZERO), RenderOrderKey::LAST);
        assert!(!skybox.cull(&BoundingFrustum::from_matrix(Mat4::IDENTITY)));
    }

    #[test]
    fn test_rotation_only_drops_translation() {
        let view = Mat4::look_at_rh(Vec3::new(5.0, 3.0, 1.0), Vec3::ZERO, Vec3::Y);
        let stripped = rotation_only(view);
        assert_eq!(stripped.w_axis, glam::Vec4::W);
        assert_eq!(stripped.transform_vector3(Vec3::X), view.transform_vector3(Vec3::X));
    }

    #[test]
    fn test_restores_rasterizer_state() {
        let mut rc = HeadlessContext::new(BackendType::OpenGLES, 8, 8).unwrap();
        let mut shared = SharedResources::new();
        let mut cache = DeviceObjectCache::new();
        let projection = rc
            .resource_factory()
            .create_constant_buffer(ShaderConstantType::Matrix4x4, "projection")
            .unwrap();
        shared.set_buffer(SharedNames::PROJECTION_MATRIX, projection);

        let mut skybox = Skybox::new(CubemapData::solid(2, [0, 0, 255, 255]));
        skybox.change_render_context(&mut rc, &mut cache).unwrap();
        let before = rc.rasterizer_state();

        let mut ctx = StageContext {
            rc: &mut rc,
            shared: &mut shared,
            cache: &mut cache,
            frame: FrameInfo::default(),
        };
        skybox.render(&mut ctx, CommonStages::STANDARD).unwrap();

        let draw = rc.draw_calls().next().unwrap().clone();
        assert_ne!(draw.rasterizer_state, before);
        let desc = rc.factory().rasterizer_descriptor(draw.rasterizer_state).unwrap();
        assert_eq!(desc.cull_mode, CullMode::None);
        assert_eq!(draw.index_count, 36);
        assert_eq!(rc.rasterizer_state(), before);
    }

    #[test]
    fn test_rebuild_on_same_context_keeps_object_count() {
        let mut rc = HeadlessContext::new(BackendType::Vulkan, 8, 8).unwrap();
        let mut cache = DeviceObjectCache::new();
        let mut skybox = Skybox::new(CubemapData::solid(2, [0, 0, 255, 255]));
        skybox.change_render_context(&mut rc, &mut cache).unwrap();
        let live = rc.factory().live_objects();

        skybox.change_render_context(&mut rc, &mut cache).unwrap();
        assert_eq!(rc.factory().live_objects(), live);
        skybox.dispose(rc.resource_factory());
        assert!(rc.factory().live_objects() < live);
    }
}
