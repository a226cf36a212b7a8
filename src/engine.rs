//! Main engine orchestrator

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::error::RenderResult;
use crate::pipeline::{
    CommonStages, FrameInfo, PipelineStage, SharedNames, SharedResources, ShadowMapStage,
    StageContext, StandardPipelineStage, SwappableRenderItem,
};
use crate::resources::DeviceObjectCache;
use crate::scene::{Camera, DirectionalLight};
use crate::visibility::{ItemId, SceneVisibilityManager};
use crate::{EngineConfig, LightingConstants};

/// Scene-wide constant buffers read by the standard pass
#[derive(Debug, Clone, Copy)]
struct SceneBuffers {
    projection: BufferHandle,
    view: BufferHandle,
    light_info: BufferHandle,
    shadow_parameters: BufferHandle,
}

impl SceneBuffers {
    fn create(factory: &mut dyn ResourceFactory) -> BackendResult<Self> {
        Ok(Self {
            projection: factory
                .create_constant_buffer(ShaderConstantType::Matrix4x4, SharedNames::PROJECTION_MATRIX)?,
            view: factory.create_constant_buffer(ShaderConstantType::Matrix4x4, SharedNames::VIEW_MATRIX)?,
            light_info: factory.create_constant_buffer(ShaderConstantType::Custom(32), SharedNames::LIGHT_INFO)?,
            shadow_parameters: factory
                .create_constant_buffer(ShaderConstantType::Float4, SharedNames::SHADOW_PARAMETERS)?,
        })
    }

    fn publish(&self, shared: &mut SharedResources) {
        shared.set_buffer(SharedNames::PROJECTION_MATRIX, self.projection);
        shared.set_buffer(SharedNames::VIEW_MATRIX, self.view);
        shared.set_buffer(SharedNames::LIGHT_INFO, self.light_info);
        shared.set_buffer(SharedNames::SHADOW_PARAMETERS, self.shadow_parameters);
    }

    fn destroy(&self, factory: &mut dyn ResourceFactory) {
        factory.destroy(self.projection.into());
        factory.destroy(self.view.into());
        factory.destroy(self.light_info.into());
        factory.destroy(self.shadow_parameters.into());
    }
}

/// Packed `[bias, ambient, 0, 0]` as read by the shadow shader
fn shadow_parameters(lighting: &LightingConstants) -> [f32; 4] {
    [lighting.shadow_bias, lighting.ambient, 0.0, 0.0]
}

/// Drives frames over a render context: ShadowMap, then Standard, then Overlay.
///
/// The engine owns the context, the scene items and everything created for
/// them, so swapping the context rebuilds the whole device-side state in one
/// call.
pub struct Engine {
    rc: Box<dyn RenderContext>,
    config: EngineConfig,
    camera: Camera,
    light: DirectionalLight,
    stages: Vec<Box<dyn PipelineStage>>,
    visibility: SceneVisibilityManager,
    cache: DeviceObjectCache,
    shared: SharedResources,
    buffers: SceneBuffers,
    frame_index: u64,
    elapsed: f32,
}

impl Engine {
    /// Create the engine and build every stage's device objects on `rc`
    pub fn new(mut rc: Box<dyn RenderContext>, config: EngineConfig) -> RenderResult<Self> {
        let (width, height) = rc.window_size();
        let mut stages: Vec<Box<dyn PipelineStage>> = vec![
            Box::new(ShadowMapStage::new(&config.shadow, config.screenshot_dir.clone())),
            Box::new(StandardPipelineStage::new(CommonStages::STANDARD)),
            Box::new(StandardPipelineStage::new(CommonStages::OVERLAY)),
        ];
        let mut visibility = SceneVisibilityManager::new();
        let mut cache = DeviceObjectCache::new();
        let mut shared = SharedResources::new();
        let buffers = Self::build_device_state(
            rc.as_mut(),
            &mut stages,
            &mut visibility,
            &mut cache,
            &mut shared,
        )?;

        log::info!(
            "Engine '{}' running on {} ({}x{})",
            config.title,
            rc.backend_type(),
            width,
            height
        );

        Ok(Self {
            rc,
            config,
            camera: Camera::new(width, height),
            light: DirectionalLight::default(),
            stages,
            visibility,
            cache,
            shared,
            buffers,
            frame_index: 0,
            elapsed: 0.0,
        })
    }

    /// Build the item's device objects and register it with the scene
    pub fn add_item(&mut self, mut item: Box<dyn SwappableRenderItem>) -> RenderResult<ItemId> {
        item.change_render_context(self.rc.as_mut(), &mut self.cache)?;
        Ok(self.visibility.add(item))
    }

    /// Unregister an item and destroy its device objects
    pub fn remove_item(&mut self, id: ItemId) -> Option<Box<dyn SwappableRenderItem>> {
        let mut item = self.visibility.remove(id)?;
        item.dispose(self.rc.resource_factory());
        Some(item)
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    pub fn light(&self) -> &DirectionalLight {
        &self.light
    }

    pub fn light_mut(&mut self) -> &mut DirectionalLight {
        &mut self.light
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Change bias and ambient; written to the GPU on the next frame
    pub fn set_lighting(&mut self, lighting: LightingConstants) {
        self.config.lighting = lighting;
    }

    /// Find a stage by name
    pub fn stage_mut(&mut self, name: &str) -> Option<&mut (dyn PipelineStage + 'static)> {
        self.stages
            .iter_mut()
            .find(|stage| stage.name() == name)
            .map(|stage| stage.as_mut())
    }

    pub fn shadow_map_stage(&self) -> Option<&ShadowMapStage> {
        self.stages
            .iter()
            .find_map(|stage| stage.as_any().downcast_ref::<ShadowMapStage>())
    }

    pub fn shadow_map_stage_mut(&mut self) -> Option<&mut ShadowMapStage> {
        self.stages
            .iter_mut()
            .find_map(|stage| stage.as_any_mut().downcast_mut::<ShadowMapStage>())
    }

    /// Names of the stages in execution order
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    pub fn render_context(&self) -> &dyn RenderContext {
        self.rc.as_ref()
    }

    pub fn render_context_mut(&mut self) -> &mut dyn RenderContext {
        self.rc.as_mut()
    }

    pub fn visibility(&self) -> &SceneVisibilityManager {
        &self.visibility
    }

    pub fn shared(&self) -> &SharedResources {
        &self.shared
    }

    /// Number of frames rendered so far
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    fn write_scene_buffers(&mut self) -> BackendResult<()> {
        let projection = self.camera.projection_matrix();
        let view = self.camera.view_matrix();
        let info = self.light.info();
        let parameters = shadow_parameters(&self.config.lighting);

        let factory = self.rc.resource_factory();
        factory.write_buffer(self.buffers.projection, 0, bytemuck::bytes_of(&projection))?;
        factory.write_buffer(self.buffers.view, 0, bytemuck::bytes_of(&view))?;
        factory.write_buffer(self.buffers.light_info, 0, bytemuck::bytes_of(&info))?;
        factory.write_buffer(self.buffers.shadow_parameters, 0, bytemuck::bytes_of(&parameters))
    }

    /// Render one frame and present it
    pub fn render_frame(&mut self, delta_seconds: f32) -> RenderResult<()> {
        self.elapsed += delta_seconds;

        let (width, height) = self.rc.window_size();
        self.camera.window_resized(width, height);
        self.write_scene_buffers()?;
        self.visibility
            .set_stage_frustum(CommonStages::STANDARD, self.camera.frustum());

        self.rc.set_default_framebuffer();
        self.rc.set_clear_color(self.config.clear_color);
        self.rc.clear_buffer()?;

        let frame = FrameInfo {
            frame_index: self.frame_index,
            elapsed_seconds: self.elapsed,
            delta_seconds,
            camera_position: self.camera.position,
            view: self.camera.view_matrix(),
            projection: self.camera.projection_matrix(),
        };

        for stage in self.stages.iter_mut() {
            if !stage.enabled() {
                continue;
            }
            stage.update(&self.camera, &self.light);
            let mut ctx = StageContext {
                rc: self.rc.as_mut(),
                shared: &mut self.shared,
                cache: &mut self.cache,
                frame,
            };
            stage.execute_stage(&mut ctx, &mut self.visibility, self.camera.position)?;
        }

        self.rc.swap_buffers()?;
        self.frame_index += 1;
        log::trace!("Frame {} presented", frame.frame_index);
        Ok(())
    }

    /// Create the scene buffers, then every stage's and item's device objects, on `rc`
    fn build_device_state(
        rc: &mut dyn RenderContext,
        stages: &mut [Box<dyn PipelineStage>],
        visibility: &mut SceneVisibilityManager,
        cache: &mut DeviceObjectCache,
        shared: &mut SharedResources,
    ) -> RenderResult<SceneBuffers> {
        shared.clear();
        let buffers = SceneBuffers::create(rc.resource_factory())?;
        buffers.publish(shared);

        let built = stages
            .iter_mut()
            .try_for_each(|stage| stage.change_render_context(rc, shared))
            .and_then(|()| visibility.change_render_context(rc, cache));
        match built {
            Ok(()) => Ok(buffers),
            Err(err) => {
                buffers.destroy(rc.resource_factory());
                Err(err)
            }
        }
    }

    /// Destroy every stage's and item's device objects on `rc`; items stay registered
    fn release_device_state(
        rc: &mut dyn RenderContext,
        stages: &mut [Box<dyn PipelineStage>],
        visibility: &mut SceneVisibilityManager,
        cache: &mut DeviceObjectCache,
    ) {
        visibility.release_all(rc.resource_factory());
        cache.release_all(rc.resource_factory());
        for stage in stages.iter_mut() {
            stage.release(rc);
        }
    }

    /// Move everything onto `rc` and hand back the previous context.
    ///
    /// Device objects of the current context are destroyed first. If building
    /// on `rc` fails, everything is rebuilt on the current context, which
    /// stays active, and the error is returned.
    pub fn change_render_context(
        &mut self,
        mut rc: Box<dyn RenderContext>,
    ) -> RenderResult<Box<dyn RenderContext>> {
        Self::release_device_state(
            self.rc.as_mut(),
            &mut self.stages,
            &mut self.visibility,
            &mut self.cache,
        );
        self.buffers.destroy(self.rc.resource_factory());

        let built = Self::build_device_state(
            rc.as_mut(),
            &mut self.stages,
            &mut self.visibility,
            &mut self.cache,
            &mut self.shared,
        );
        match built {
            Ok(buffers) => {
                self.buffers = buffers;
                let previous = std::mem::replace(&mut self.rc, rc);
                log::info!(
                    "Switched render context from {} to {}",
                    previous.backend_type(),
                    self.rc.backend_type()
                );
                Ok(previous)
            }
            Err(err) => {
                log::error!(
                    "Switching to {} failed, staying on {}: {}",
                    rc.backend_type(),
                    self.rc.backend_type(),
                    err
                );
                Self::release_device_state(
                    rc.as_mut(),
                    &mut self.stages,
                    &mut self.visibility,
                    &mut self.cache,
                );
                self.buffers = Self::build_device_state(
                    self.rc.as_mut(),
                    &mut self.stages,
                    &mut self.visibility,
                    &mut self.cache,
                    &mut self.shared,
                )?;
                Err(err)
            }
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        Self::release_device_state(
            self.rc.as_mut(),
            &mut self.stages,
            &mut self.visibility,
            &mut self.cache,
        );
        self.buffers.destroy(self.rc.resource_factory());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{HeadlessContext, RecordedCommand};
    use crate::objects::{ColoredCubeRenderer, ShadowCaster};
    use crate::resources::{Mesh, TextureData};
    use crate::test_support::{render_log, rendered_tags, ProbeItem};
    use crate::{BackendType, ShadowConfig};

    fn test_config() -> EngineConfig {
        EngineConfig {
            shadow: ShadowConfig {
                map_width: 16,
                map_height: 16,
                ..ShadowConfig::default()
            },
            ..EngineConfig::default()
        }
    }

    fn headless_engine(backend: BackendType) -> Engine {
        let rc = HeadlessContext::new(backend, 64, 32).unwrap();
        Engine::new(Box::new(rc), test_config()).unwrap()
    }

    fn headless(engine: &Engine) -> &HeadlessContext {
        engine
            .render_context()
            .as_any()
            .downcast_ref::<HeadlessContext>()
            .unwrap()
    }

    #[test]
    fn test_stage_order() {
        let engine = headless_engine(BackendType::OpenGL);
        assert_eq!(engine.stage_names(), vec!["ShadowMap", "Standard", "Overlay"]);
        assert!(engine.shared().contains_buffer(SharedNames::PROJECTION_MATRIX));
        assert!(engine.shared().contains_texture(SharedNames::SHADOW_MAP));
    }

    #[test]
    fn test_frame_runs_stages_in_order_and_presents() {
        let mut engine = headless_engine(BackendType::Vulkan);
        let log = render_log();
        engine
            .add_item(Box::new(ProbeItem::new(
                1,
                &[CommonStages::OVERLAY, CommonStages::STANDARD, CommonStages::SHADOW_MAP],
                &log,
            )))
            .unwrap();

        engine.render_frame(0.016).unwrap();

        let stages: Vec<String> = log.borrow().iter().map(|(stage, _)| stage.clone()).collect();
        assert_eq!(stages, vec!["ShadowMap", "Standard", "Overlay"]);
        assert_eq!(headless(&engine).frames_presented(), 1);
        assert_eq!(engine.frame_index(), 1);
    }

    #[test]
    fn test_disabled_stage_is_skipped() {
        let mut engine = headless_engine(BackendType::OpenGL);
        let log = render_log();
        engine
            .add_item(Box::new(ProbeItem::new(7, &[CommonStages::OVERLAY], &log)))
            .unwrap();
        engine.stage_mut(CommonStages::OVERLAY).unwrap().set_enabled(false);

        engine.render_frame(0.016).unwrap();
        assert!(rendered_tags(&log).is_empty());
    }

    #[test]
    fn test_frame_clears_default_framebuffer_first() {
        let mut engine = headless_engine(BackendType::Direct3D11);
        engine.render_frame(0.0).unwrap();

        let commands = headless(&engine).commands();
        let first_clear = commands
            .iter()
            .position(|c| matches!(c, RecordedCommand::Clear { framebuffer: None, .. }))
            .unwrap();
        let first_shadow_clear = commands
            .iter()
            .position(|c| matches!(c, RecordedCommand::Clear { framebuffer: Some(_), .. }))
            .unwrap();
        assert!(first_clear < first_shadow_clear);
    }

    #[test]
    fn test_shadow_parameters_follow_lighting() {
        let mut engine = headless_engine(BackendType::OpenGLES);
        engine.set_lighting(LightingConstants {
            shadow_bias: 0.01,
            ambient: 0.5,
        });
        engine.render_frame(0.0).unwrap();

        let buffer = engine.shared().buffer(SharedNames::SHADOW_PARAMETERS).unwrap();
        let data = headless(&engine).factory().buffer_data(buffer).unwrap();
        let values: &[f32] = bytemuck::cast_slice(data);
        assert_eq!(values, &[0.01, 0.5, 0.0, 0.0]);
    }

    #[test]
    fn test_change_render_context_rebuilds_everything() {
        let mut engine = headless_engine(BackendType::OpenGL);
        let log = render_log();
        let id = engine
            .add_item(Box::new(ProbeItem::new(3, &[CommonStages::STANDARD], &log)))
            .unwrap();
        let old_projection = engine.shared().buffer(SharedNames::PROJECTION_MATRIX).unwrap();

        let vulkan = HeadlessContext::new(BackendType::Vulkan, 64, 32).unwrap();
        let previous = engine.change_render_context(Box::new(vulkan)).unwrap();
        assert_eq!(previous.backend_type(), BackendType::OpenGL);
        assert_eq!(engine.render_context().backend_type(), BackendType::Vulkan);
        assert_ne!(
            engine.shared().buffer(SharedNames::PROJECTION_MATRIX).unwrap(),
            old_projection
        );

        let probe = engine.visibility().iter().find(|(item, _)| *item == id);
        assert!(probe.is_some());
        engine.render_frame(0.016).unwrap();
        assert_eq!(rendered_tags(&log), vec![3]);
    }

    #[test]
    fn test_remove_item_stops_drawing_it() {
        let mut engine = headless_engine(BackendType::OpenGL);
        let log = render_log();
        let id = engine
            .add_item(Box::new(ProbeItem::new(4, &[CommonStages::STANDARD], &log)))
            .unwrap();
        assert!(engine.remove_item(id).is_some());
        assert!(engine.remove_item(id).is_none());

        engine.render_frame(0.016).unwrap();
        assert!(rendered_tags(&log).is_empty());
    }

    #[test]
    fn test_failed_change_keeps_current_context() {
        let mut engine = headless_engine(BackendType::OpenGL);
        let log = render_log();
        engine
            .add_item(Box::new(ShadowCaster::new(Mesh::cube(), TextureData::white())))
            .unwrap();
        engine
            .add_item(Box::new(ColoredCubeRenderer::new(glam::Vec3::new(0.0, 0.0, -3.0))))
            .unwrap();
        engine
            .add_item(Box::new(
                ProbeItem::new(5, &[CommonStages::STANDARD], &log).failing_on(BackendType::Direct3D11),
            ))
            .unwrap();
        engine.render_frame(0.016).unwrap();
        let live = headless(&engine).factory().live_objects();

        let d3d = HeadlessContext::new(BackendType::Direct3D11, 64, 32).unwrap();
        assert!(engine.change_render_context(Box::new(d3d)).is_err());
        assert_eq!(engine.render_context().backend_type(), BackendType::OpenGL);
        assert_eq!(headless(&engine).factory().live_objects(), live);

        engine.render_frame(0.016).unwrap();
        assert_eq!(headless(&engine).frames_presented(), 2);
        assert_eq!(rendered_tags(&log), vec![5, 5]);
    }

    #[test]
    fn test_change_releases_previous_context_objects() {
        let baseline = HeadlessContext::new(BackendType::OpenGL, 64, 32)
            .unwrap()
            .factory()
            .live_objects();
        let mut engine = headless_engine(BackendType::OpenGL);
        engine
            .add_item(Box::new(ColoredCubeRenderer::new(glam::Vec3::ZERO)))
            .unwrap();

        let vulkan = HeadlessContext::new(BackendType::Vulkan, 64, 32).unwrap();
        let previous = engine.change_render_context(Box::new(vulkan)).unwrap();
        let previous = previous.as_any().downcast_ref::<HeadlessContext>().unwrap();
        assert_eq!(previous.factory().live_objects(), baseline);
    }
}
