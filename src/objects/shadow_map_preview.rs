//! Screen-space view of the first shadow cascade

use glam::{Mat4, Vec2, Vec3};

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::error::{RenderError, RenderResult};
use crate::pipeline::{CommonStages, RenderItem, SharedNames, StageContext, SwappableRenderItem};
use crate::queue::RenderOrderKey;
use crate::resources::{ContextObjects, DeviceObjectCache, DeviceObjects, Material, MaterialDescriptor};
use crate::scene::BoundingFrustum;

const STAGES: [&str; 1] = [CommonStages::OVERLAY];

/// Width of the preview in pixels
pub const PREVIEW_WIDTH: f32 = 200.0;
/// Distance of the preview from the top-right corner
pub const PREVIEW_MARGIN: f32 = 20.0;

#[derive(Debug)]
struct PreviewObjects {
    vertex_buffer: BufferHandle,
    index_buffer: BufferHandle,
    material: Material,
    world_buffer: BufferHandle,
    projection_buffer: BufferHandle,
    depth_disabled: DepthStencilStateHandle,
}

impl PreviewObjects {
    fn create(factory: &mut dyn ResourceFactory) -> BackendResult<Self> {
        let quad = [
            VertexPositionTexture::new(Vec3::new(0.0, 0.0, 0.0), Vec2::new(0.0, 0.0)),
            VertexPositionTexture::new(Vec3::new(1.0, 0.0, 0.0), Vec2::new(1.0, 0.0)),
            VertexPositionTexture::new(Vec3::new(1.0, 1.0, 0.0), Vec2::new(1.0, 1.0)),
            VertexPositionTexture::new(Vec3::new(0.0, 1.0, 0.0), Vec2::new(0.0, 1.0)),
        ];
        Ok(Self {
            vertex_buffer: factory.create_vertex_buffer(bytemuck::cast_slice(&quad), "preview quad")?,
            index_buffer: factory.create_index_buffer(&[0, 1, 2, 0, 2, 3], "preview quad")?,
            material: Material::create(
                factory,
                &MaterialDescriptor {
                    shader_set_name: "simple-2d",
                    vertex_inputs: vec![VertexPositionTexture::layout()],
                    resources: vec![
                        ShaderResourceDescription::constant("WorldMatrixBuffer", ShaderConstantType::Matrix4x4),
                        ShaderResourceDescription::constant(
                            "ProjectionMatrixBuffer",
                            ShaderConstantType::Matrix4x4,
                        ),
                        ShaderResourceDescription::texture("SurfaceTexture"),
                    ],
                },
            )?,
            world_buffer: factory.create_constant_buffer(ShaderConstantType::Matrix4x4, "preview world")?,
            projection_buffer: factory
                .create_constant_buffer(ShaderConstantType::Matrix4x4, "preview projection")?,
            depth_disabled: factory.create_depth_stencil_state(&DepthStencilDescriptor {
                depth_enabled: false,
                depth_compare: CompareFunction::Always,
                depth_write: false,
            })?,
        })
    }
}

impl DeviceObjects for PreviewObjects {
    fn destroy(&self, factory: &mut dyn ResourceFactory) {
        factory.destroy(self.vertex_buffer.into());
        factory.destroy(self.index_buffer.into());
        self.material.destroy(factory);
        factory.destroy(self.world_buffer.into());
        factory.destroy(self.projection_buffer.into());
        factory.destroy(self.depth_disabled.into());
    }
}

/// Pixel-space projection and quad placement for a viewport
pub fn preview_matrices(viewport: Viewport) -> (Mat4, Mat4) {
    let width = viewport.width as f32;
    let height = viewport.height as f32;
    let projection = Mat4::orthographic_rh(0.0, width, height, 0.0, -1.0, 1.0);
    let world = Mat4::from_translation(Vec3::new(width - PREVIEW_WIDTH - PREVIEW_MARGIN, PREVIEW_MARGIN, 0.0))
        * Mat4::from_scale(Vec3::splat(PREVIEW_WIDTH));
    (projection, world)
}

/// Overlay quad sampling the published shadow map
#[derive(Debug)]
pub struct ShadowMapPreview {
    texture_name: String,
    objects: ContextObjects<PreviewObjects>,
}

impl ShadowMapPreview {
    pub fn new() -> Self {
        Self {
            texture_name: SharedNames::SHADOW_MAP.to_string(),
            objects: ContextObjects::new(),
        }
    }

    /// Preview another shared texture
    pub fn with_texture_name(mut self, name: &str) -> Self {
        self.texture_name = name.to_string();
        self
    }
}

impl Default for ShadowMapPreview {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderItem for ShadowMapPreview {
    fn stages_participated(&self) -> &[&'static str] {
        &STAGES
    }

    fn cull(&self, _frustum: &BoundingFrustum) -> bool {
        false
    }

    fn render_order_key(&self, _viewpoint: Vec3) -> RenderOrderKey {
        RenderOrderKey::default()
    }

    fn render(&mut self, ctx: &mut StageContext<'_>, _stage: &str) -> RenderResult<()> {
        let objects = self.objects.get().ok_or_else(|| RenderError::ItemNotInitialized {
            item: "shadow map preview".to_string(),
        })?;
        let texture = ctx.shared.texture(&self.texture_name)?;

        let (projection, world) = preview_matrices(ctx.rc.viewport());
        let factory = ctx.rc.resource_factory();
        factory.write_buffer(objects.projection_buffer, 0, bytemuck::bytes_of(&projection))?;
        factory.write_buffer(objects.world_buffer, 0, bytemuck::bytes_of(&world))?;

        ctx.rc.set_vertex_buffer(0, objects.vertex_buffer)?;
        ctx.rc.set_index_buffer(objects.index_buffer, IndexFormat::Uint16)?;
        objects.material.apply(ctx.rc)?;
        ctx.rc.set_constant_buffer(0, objects.world_buffer)?;
        ctx.rc.set_constant_buffer(1, objects.projection_buffer)?;
        ctx.rc.set_texture(0, texture)?;
        ctx.rc.set_depth_stencil_state(objects.depth_disabled)?;
        ctx.rc.draw_indexed_primitives(6, 0)?;
        let default = ctx.rc.default_depth_stencil_state();
        ctx.rc.set_depth_stencil_state(default)?;
        Ok(())
    }
}

impl SwappableRenderItem for ShadowMapPreview {
    fn change_render_context(
        &mut self,
        rc: &mut dyn RenderContext,
        _cache: &mut DeviceObjectCache,
    ) -> RenderResult<()> {
        self.objects.rebuild(rc, PreviewObjects::create)?;
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
    use crate::resources::{GpuTexture, TextureData};
    use crate::BackendType;

    #[test]
    fn test_quad_sits_in_top_right_corner() {
        let (projection, world) = preview_matrices(Viewport::new(0, 0, 960, 540));
        let top_left = world.transform_point3(Vec3::ZERO);
        let bottom_right = world.transform_point3(Vec3::new(1.0, 1.0, 0.0));
        assert_eq!(top_left, Vec3::new(740.0, 20.0, 0.0));
        assert_eq!(bottom_right, Vec3::new(940.0, 220.0, 0.0));

        // Pixel (0, 0) is the top-left of clip space
        let corner = projection.project_point3(Vec3::ZERO);
        assert!((corner.x + 1.0).abs() < 1e-6 && (corner.y - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_draws_without_depth_then_restores() {
        let mut rc = HeadlessContext::new(BackendType::Direct3D11, 960, 540).unwrap();
        let mut shared = SharedResources::new();
        let mut cache = DeviceObjectCache::new();
        let texture = GpuTexture::create(rc.resource_factory(), &TextureData::white()).unwrap();
        shared.set_texture(SharedNames::SHADOW_MAP, texture.binding);

        let mut preview = ShadowMapPreview::new();
        preview.change_render_context(&mut rc, &mut cache).unwrap();
        let mut ctx = StageContext {
            rc: &mut rc,
            shared: &mut shared,
            cache: &mut cache,
            frame: FrameInfo::default(),
        };
        preview.render(&mut ctx, CommonStages::OVERLAY).unwrap();

        let draw = rc.draw_calls().next().unwrap().clone();
        assert!(draw.samples(texture.binding));
        let desc = rc.factory().depth_stencil_descriptor(draw.depth_stencil_state).unwrap();
        assert!(!desc.depth_enabled);
        assert_eq!(desc.depth_compare, CompareFunction::Always);
        assert_eq!(rc.depth_stencil_state(), rc.default_depth_stencil_state());
    }

    #[test]
    fn test_missing_shadow_map_is_an_error() {
        let mut rc = HeadlessContext::new(BackendType::OpenGL, 8, 8).unwrap();
        let mut shared = SharedResources::new();
        let mut cache = DeviceObjectCache::new();
        let mut preview = ShadowMapPreview::new();
        preview.change_render_context(&mut rc, &mut cache).unwrap();
        let mut ctx = StageContext {
            rc: &mut rc,
            shared: &mut shared,
            cache: &mut cache,
            frame: FrameInfo::default(),
        };
        assert!(matches!(
            preview.render(&mut ctx, CommonStages::OVERLAY),
            Err(RenderError::MissingSharedTexture(_))
        ));
    }

    #[test]
    fn test_rebuild_on_same_context_keeps_object_count() {
        let mut rc = HeadlessContext::new(BackendType::OpenGLES, 8, 8).unwrap();
        let mut cache = DeviceObjectCache::new();
        let mut preview = ShadowMapPreview::new();
        preview.change_render_context(&mut rc, &mut cache).unwrap();
        let live = rc.factory().live_objects();

        preview.change_render_context(&mut rc, &mut cache).unwrap();
        assert_eq!(rc.factory().live_objects(), live);
    }
}
