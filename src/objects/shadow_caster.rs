//! Textured mesh that casts and receives shadows

use glam::Vec3;

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::error::{RenderError, RenderResult};
use crate::pipeline::{CommonStages, RenderItem, SharedNames, StageContext, SwappableRenderItem};
use crate::queue::RenderOrderKey;
use crate::resources::{
    ContextObjects, DeviceObjectCache, DeviceObjects, GpuMesh, GpuTexture, Material, MaterialDescriptor, Mesh,
    TextureData,
};
use crate::scene::{BoundingFrustum, BoundingSphere, ContainmentType, Transform};

const STAGES: [&str; 2] = [CommonStages::SHADOW_MAP, CommonStages::STANDARD];

/// Sampler slots of the standard material: surface, then one per cascade
const STANDARD_SAMPLER_SLOTS: u32 = 4;

pub fn shadow_pass_material() -> MaterialDescriptor {
    MaterialDescriptor {
        shader_set_name: "shadowmap",
        vertex_inputs: vec![VertexPositionNormalTexture::layout()],
        resources: vec![
            ShaderResourceDescription::constant("ProjectionMatrixBuffer", ShaderConstantType::Matrix4x4),
            ShaderResourceDescription::constant("ViewMatrixBuffer", ShaderConstantType::Matrix4x4),
            ShaderResourceDescription::constant("WorldMatrixBuffer", ShaderConstantType::Matrix4x4),
        ],
    }
}

pub fn regular_pass_material() -> MaterialDescriptor {
    use ShaderConstantType::*;
    MaterialDescriptor {
        shader_set_name: "shadow",
        vertex_inputs: vec![VertexPositionNormalTexture::layout()],
        resources: vec![
            ShaderResourceDescription::constant("ProjectionMatrixBuffer", Matrix4x4),
            ShaderResourceDescription::constant("ViewMatrixBuffer", Matrix4x4),
            ShaderResourceDescription::constant("LightViewProjectionNearBuffer", Matrix4x4),
            ShaderResourceDescription::constant("LightViewProjectionMidBuffer", Matrix4x4),
            ShaderResourceDescription::constant("LightViewProjectionFarBuffer", Matrix4x4),
            ShaderResourceDescription::constant("DepthLimitsBuffer", Float4),
            ShaderResourceDescription::constant("LightInfoBuffer", Custom(32)),
            ShaderResourceDescription::constant("ShadowParametersBuffer", Float4),
            ShaderResourceDescription::constant("WorldMatrixBuffer", Matrix4x4),
            ShaderResourceDescription::constant("InverseTransposeWorldMatrixBuffer", Matrix4x4),
            ShaderResourceDescription::texture("SurfaceTexture"),
            ShaderResourceDescription::texture("ShadowMapNear"),
            ShaderResourceDescription::texture("ShadowMapMid"),
            ShaderResourceDescription::texture("ShadowMapFar"),
        ],
    }
}

#[derive(Debug)]
struct ShadowCasterObjects {
    mesh: GpuMesh,
    shadow_material: Material,
    regular_material: Material,
    world_buffer: BufferHandle,
    inverse_transpose_world_buffer: BufferHandle,
    surface: GpuTexture,
    shadow_sampler: SamplerHandle,
}

impl ShadowCasterObjects {
    fn create(factory: &mut dyn ResourceFactory, mesh: &Mesh, texture: &TextureData) -> BackendResult<Self> {
        Ok(Self {
            mesh: GpuMesh::create(factory, mesh)?,
            shadow_material: Material::create(factory, &shadow_pass_material())?,
            regular_material: Material::create(factory, &regular_pass_material())?,
            world_buffer: factory.create_constant_buffer(ShaderConstantType::Matrix4x4, "world")?,
            inverse_transpose_world_buffer: factory
                .create_constant_buffer(ShaderConstantType::Matrix4x4, "inverse transpose world")?,
            surface: GpuTexture::create(factory, texture)?,
            shadow_sampler: factory.create_sampler_state(&SamplerDescriptor::shadow_map())?,
        })
    }
}

impl DeviceObjects for ShadowCasterObjects {
    fn destroy(&self, factory: &mut dyn ResourceFactory) {
        self.mesh.destroy(factory);
        self.shadow_material.destroy(factory);
        self.regular_material.destroy(factory);
        factory.destroy(self.world_buffer.into());
        factory.destroy(self.inverse_transpose_world_buffer.into());
        self.surface.destroy(factory);
        factory.destroy(self.shadow_sampler.into());
    }
}

/// A mesh drawn into the shadow maps and, shadowed, into the standard pass
#[derive(Debug)]
pub struct ShadowCaster {
    pub name: String,
    pub transform: Transform,
    mesh: Mesh,
    texture: TextureData,
    centered_bounds: BoundingSphere,
    shadow_map_name: String,
    objects: ContextObjects<ShadowCasterObjects>,
}

impl ShadowCaster {
    pub fn new(mesh: Mesh, texture: TextureData) -> Self {
        let centered_bounds = mesh.bounding_sphere();
        Self {
            name: mesh.name.clone(),
            transform: Transform::new(),
            mesh,
            texture,
            centered_bounds,
            shadow_map_name: SharedNames::SHADOW_MAP.to_string(),
            objects: ContextObjects::new(),
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    /// Shared name of the first cascade when the shadow stage publishes under another name
    pub fn with_shadow_map_name(mut self, name: &str) -> Self {
        self.shadow_map_name = name.to_string();
        self
    }

    /// Bounds in world space, scaled uniformly by `scale.x`
    pub fn world_bounds(&self) -> BoundingSphere {
        self.centered_bounds
            .placed(self.transform.position, self.transform.scale.x)
    }

    pub fn is_initialized(&self) -> bool {
        self.objects.is_some()
    }

    fn objects(&self) -> RenderResult<&ShadowCasterObjects> {
        self.objects.get().ok_or_else(|| RenderError::ItemNotInitialized {
            item: self.name.clone(),
        })
    }

    fn render_shadow_pass(
        objects: &ShadowCasterObjects,
        ctx: &mut StageContext<'_>,
    ) -> RenderResult<()> {
        objects.shadow_material.apply(ctx.rc)?;
        ctx.rc
            .set_constant_buffer(0, ctx.shared.buffer(SharedNames::LIGHT_PROJECTION_MATRIX)?)?;
        ctx.rc
            .set_constant_buffer(1, ctx.shared.buffer(SharedNames::LIGHT_VIEW_MATRIX)?)?;
        ctx.rc.set_constant_buffer(2, objects.world_buffer)?;
        ctx.rc.draw_indexed_primitives(objects.mesh.index_count, 0)?;
        Ok(())
    }

    fn render_standard_pass(
        &self,
        objects: &ShadowCasterObjects,
        ctx: &mut StageContext<'_>,
    ) -> RenderResult<()> {
        objects.regular_material.apply(ctx.rc)?;

        let shared = [
            SharedNames::PROJECTION_MATRIX,
            SharedNames::VIEW_MATRIX,
            SharedNames::LIGHT_VIEW_PROJECTION_NEAR,
            SharedNames::LIGHT_VIEW_PROJECTION_MID,
            SharedNames::LIGHT_VIEW_PROJECTION_FAR,
            SharedNames::DEPTH_LIMITS,
            SharedNames::LIGHT_INFO,
            SharedNames::SHADOW_PARAMETERS,
        ];
        for (slot, name) in shared.into_iter().enumerate() {
            ctx.rc.set_constant_buffer(slot as u32, ctx.shared.buffer(name)?)?;
        }
        let slot = shared.len() as u32;
        ctx.rc.set_constant_buffer(slot, objects.world_buffer)?;
        ctx.rc
            .set_constant_buffer(slot + 1, objects.inverse_transpose_world_buffer)?;

        let base = &self.shadow_map_name;
        let cascades = [base.clone(), format!("{base}Mid"), format!("{base}Far")];
        ctx.rc.set_texture(0, objects.surface.binding)?;
        for (i, name) in cascades.iter().enumerate() {
            ctx.rc.set_texture(i as u32 + 1, ctx.shared.texture(name)?)?;
        }

        let aniso = ctx.rc.anisox4_sampler();
        ctx.rc.set_sampler_state(0, aniso)?;
        for slot in 1..STANDARD_SAMPLER_SLOTS {
            ctx.rc.set_sampler_state(slot, objects.shadow_sampler)?;
        }

        ctx.rc.draw_indexed_primitives(objects.mesh.index_count, 0)?;

        let point = ctx.rc.point_sampler();
        for slot in 0..STANDARD_SAMPLER_SLOTS {
            ctx.rc.set_sampler_state(slot, point)?;
        }
        Ok(())
    }
}

impl RenderItem for ShadowCaster {
    fn stages_participated(&self) -> &[&'static str] {
        &STAGES
    }

    fn cull(&self, frustum: &BoundingFrustum) -> bool {
        frustum.contains_sphere(&self.world_bounds()) == ContainmentType::Disjoint
    }

    fn render_order_key(&self, viewpoint: Vec3) -> RenderOrderKey {
        let material = self
            .objects
            .get()
            .map(|o| o.regular_material.id())
            .unwrap_or_default();
        RenderOrderKey::create(self.transform.position.distance(viewpoint), material)
    }

    fn render(&mut self, ctx: &mut StageContext<'_>, stage: &str) -> RenderResult<()> {
        let objects = self.objects()?;
        objects.mesh.bind(ctx.rc)?;

        let factory = ctx.rc.resource_factory();
        factory.write_buffer(objects.world_buffer, 0, bytemuck::bytes_of(&self.transform.matrix()))?;
        factory.write_buffer(
            objects.inverse_transpose_world_buffer,
            0,
            bytemuck::bytes_of(&self.transform.inverse_transpose()),
        )?;

        match stage {
            CommonStages::SHADOW_MAP => Self::render_shadow_pass(objects, ctx),
            CommonStages::STANDARD => self.render_standard_pass(objects, ctx),
            other => {
                log::warn!("{}: asked to render in unknown stage {other}", self.name);
                Ok(())
            }
        }
    }
}

impl SwappableRenderItem for ShadowCaster {
    fn change_render_context(
        &mut self,
        rc: &mut dyn RenderContext,
        _cache: &mut DeviceObjectCache,
    ) -> RenderResult<()> {
        let (mesh, texture) = (&self.mesh, &self.texture);
        self.objects
            .rebuild(rc, |factory| ShadowCasterObjects::create(factory, mesh, texture))?;
        Ok(())
    }

    fn dispose(&mut self, factory: &mut dyn ResourceFactory) {
        self.objects.dispose(factory);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{HeadlessContext, RecordedCommand};
    use crate::pipeline::{FrameInfo, SharedResources};
    use crate::BackendType;

    fn caster() -> ShadowCaster {
        ShadowCaster::new(Mesh::cube(), TextureData::white())
            .with_transform(Transform::from_position(Vec3::new(0.0, 0.0, -10.0)))
    }

    fn publish_all(rc: &mut HeadlessContext, shared: &mut SharedResources) {
        let factory = rc.resource_factory();
        for name in [
            SharedNames::PROJECTION_MATRIX,
            SharedNames::VIEW_MATRIX,
            SharedNames::LIGHT_PROJECTION_MATRIX,
            SharedNames::LIGHT_VIEW_MATRIX,
            SharedNames::LIGHT_VIEW_PROJECTION_NEAR,
            SharedNames::LIGHT_VIEW_PROJECTION_MID,
            SharedNames::LIGHT_VIEW_PROJECTION_FAR,
            SharedNames::DEPTH_LIMITS,
            SharedNames::LIGHT_INFO,
            SharedNames::SHADOW_PARAMETERS,
        ] {
            let buffer = factory
                .create_constant_buffer(ShaderConstantType::Matrix4x4, name)
                .unwrap();
            shared.set_buffer(name, buffer);
        }
        let texture = GpuTexture::create(factory, &TextureData::white()).unwrap();
        for name in ["ShadowMap", "ShadowMapMid", "ShadowMapFar"] {
            shared.set_texture(name, texture.binding);
        }
    }

    #[test]
    fn test_cull_uses_scaled_bounds() {
        let mut caster = caster();
        let camera = crate::scene::Camera::default();
        caster.transform.position = Vec3::new(0.0, 3.0, 10.0);
        assert!(caster.cull(&camera.frustum()));

        caster.transform.scale = Vec3::splat(40.0);
        assert!(!caster.cull(&camera.frustum()));
    }

    #[test]
    fn test_key_orders_by_distance() {
        let caster = caster();
        let near = caster.render_order_key(Vec3::new(0.0, 0.0, -9.0));
        let far = caster.render_order_key(Vec3::new(0.0, 0.0, 20.0));
        assert!(near < far);
    }

    #[test]
    fn test_render_before_context_fails() {
        let mut rc = HeadlessContext::new(BackendType::OpenGL, 8, 8).unwrap();
        let mut shared = SharedResources::new();
        let mut cache = DeviceObjectCache::new();
        let mut ctx = StageContext {
            rc: &mut rc,
            shared: &mut shared,
            cache: &mut cache,
            frame: FrameInfo::default(),
        };
        let result = caster().render(&mut ctx, CommonStages::STANDARD);
        assert!(matches!(result, Err(RenderError::ItemNotInitialized { .. })));
    }

    #[test]
    fn test_both_passes_draw_and_restore_samplers() {
        let mut rc = HeadlessContext::new(BackendType::Vulkan, 8, 8).unwrap();
        let mut shared = SharedResources::new();
        let mut cache = DeviceObjectCache::new();
        publish_all(&mut rc, &mut shared);

        let mut caster = caster();
        caster.change_render_context(&mut rc, &mut cache).unwrap();
        let mut ctx = StageContext {
            rc: &mut rc,
            shared: &mut shared,
            cache: &mut cache,
            frame: FrameInfo::default(),
        };
        caster.render(&mut ctx, CommonStages::SHADOW_MAP).unwrap();
        caster.render(&mut ctx, CommonStages::STANDARD).unwrap();

        let draws: Vec<_> = rc.draw_calls().cloned().collect();
        assert_eq!(draws.len(), 2);
        assert_eq!(draws[0].constant_buffers.len(), 3);
        assert_eq!(draws[1].constant_buffers.len(), 10);
        assert_eq!(draws[1].textures.len(), 4);
        assert_eq!(draws[1].index_count, 36);

        let point = rc.point_sampler();
        let restored = rc
            .commands()
            .iter()
            .rev()
            .take(STANDARD_SAMPLER_SLOTS as usize)
            .all(|c| matches!(c, RecordedCommand::SetSampler { sampler, .. } if *sampler == point));
        assert!(restored);
    }

    #[test]
    fn test_dispose_releases_everything() {
        let mut rc = HeadlessContext::new(BackendType::Direct3D11, 8, 8).unwrap();
        let mut cache = DeviceObjectCache::new();
        let live = rc.factory().live_objects();

        let mut caster = caster();
        caster.change_render_context(&mut rc, &mut cache).unwrap();
        assert!(rc.factory().live_objects() > live);
        caster.dispose(rc.resource_factory());
        assert_eq!(rc.factory().live_objects(), live);
        assert!(!caster.is_initialized());
    }

    #[test]
    fn test_rebuild_on_same_context_keeps_object_count() {
        let mut rc = HeadlessContext::new(BackendType::OpenGL, 8, 8).unwrap();
        let mut cache = DeviceObjectCache::new();
        let mut caster = caster();
        caster.change_render_context(&mut rc, &mut cache).unwrap();
        let live = rc.factory().live_objects();

        caster.change_render_context(&mut rc, &mut cache).unwrap();
        assert_eq!(rc.factory().live_objects(), live);
    }
}
