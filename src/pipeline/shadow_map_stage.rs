//! Shadow map stage: depth of shadow casters from the light

use std::any::Any;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use glam::{Mat4, Vec3};

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::error::{RenderError, RenderResult};
use crate::pipeline::cascade::{
    build_cascade_view_projection, compute_cascade_splits, depth_limit_for_distance,
    frustum_corners_world, CascadeLevel, CascadeView, DepthCascadeLimits, MAX_CASCADES,
};
use crate::pipeline::{draw_queue, CommonStages, PipelineStage, SharedNames, SharedResources, StageContext};
use crate::queue::RenderQueue;
use crate::scene::{Camera, DirectionalLight};
use crate::visibility::VisibilityManager;
use crate::ShadowConfig;

/// Device objects of one cascade
#[derive(Debug, Clone, Copy)]
struct CascadeTargets {
    depth: TextureHandle,
    binding: TextureBindingHandle,
    framebuffer: FramebufferHandle,
    light_projection: BufferHandle,
    light_view: BufferHandle,
    light_view_projection: BufferHandle,
}

impl CascadeTargets {
    fn create(factory: &mut dyn ResourceFactory, config: &ShadowConfig, index: usize) -> BackendResult<Self> {
        let depth = factory.create_texture(&TextureDescriptor {
            label: Some(format!("shadow cascade {index}")),
            width: config.map_width,
            height: config.map_height,
            mip_levels: 1,
            format: TextureFormat::R16Uint,
            options: TextureCreateOptions::DepthStencil,
        })?;
        let binding = factory.create_texture_binding(depth)?;
        let framebuffer = factory.create_framebuffer(&FramebufferDescriptor {
            color: None,
            depth: Some(depth),
        })?;
        Ok(Self {
            depth,
            binding,
            framebuffer,
            light_projection: factory
                .create_constant_buffer(ShaderConstantType::Matrix4x4, SharedNames::LIGHT_PROJECTION_MATRIX)?,
            light_view: factory
                .create_constant_buffer(ShaderConstantType::Matrix4x4, SharedNames::LIGHT_VIEW_MATRIX)?,
            light_view_projection: factory.create_constant_buffer(
                ShaderConstantType::Matrix4x4,
                SharedNames::LIGHT_VIEW_PROJECTIONS[index],
            )?,
        })
    }

    fn destroy(&self, factory: &mut dyn ResourceFactory) {
        factory.destroy(self.framebuffer.into());
        factory.destroy(self.binding.into());
        factory.destroy(self.depth.into());
        factory.destroy(self.light_projection.into());
        factory.destroy(self.light_view.into());
        factory.destroy(self.light_view_projection.into());
    }
}

/// Renders shadow casters into one to three depth cascades.
///
/// Cascade textures are published as `binding_name`, `{binding_name}Mid` and
/// `{binding_name}Far`. With fewer cascades the unused names alias the first
/// cascade and get a depth limit of zero, so the standard pass never selects
/// them.
///
/// Each cascade collects and sorts from its own light position; the viewpoint
/// passed to [`PipelineStage::execute_stage`] is not used.
pub struct ShadowMapStage {
    enabled: bool,
    config: ShadowConfig,
    queue: RenderQueue,
    light_position: Vec3,
    pinned_position: bool,
    views: [CascadeView; MAX_CASCADES],
    limits: DepthCascadeLimits,
    owner: Option<ContextId>,
    targets: Vec<CascadeTargets>,
    depth_limits: Option<BufferHandle>,
    take_screenshot: bool,
    screenshot_dir: PathBuf,
    last_saved_path: Option<PathBuf>,
}

impl ShadowMapStage {
    pub fn new(config: &ShadowConfig, screenshot_dir: impl Into<PathBuf>) -> Self {
        let mut config = config.clone();
        config.cascade_count = config.cascade_count.clamp(1, MAX_CASCADES as u32);
        let light_position = -DirectionalLight::default().direction() * config.light_distance;

        Self {
            enabled: true,
            config,
            queue: RenderQueue::new(),
            light_position,
            pinned_position: false,
            views: [CascadeView::default(); MAX_CASCADES],
            limits: DepthCascadeLimits::default(),
            owner: None,
            targets: Vec::new(),
            depth_limits: None,
            take_screenshot: false,
            screenshot_dir: screenshot_dir.into(),
            last_saved_path: None,
        }
    }

    pub fn cascade_count(&self) -> usize {
        self.config.cascade_count as usize
    }

    pub fn map_size(&self) -> (u32, u32) {
        (self.config.map_width, self.config.map_height)
    }

    /// Fix the light position used in single-map mode
    pub fn set_light_position(&mut self, position: Vec3) {
        self.light_position = position;
        self.pinned_position = true;
    }

    pub fn light_position(&self) -> Vec3 {
        self.light_position
    }

    /// Light matrices of a cascade as of the last update
    pub fn cascade_view(&self, level: CascadeLevel) -> &CascadeView {
        &self.views[level.index()]
    }

    pub fn depth_limits(&self) -> DepthCascadeLimits {
        self.limits
    }

    /// Save the first cascade to a PNG after the next execution
    pub fn save_next_frame(&mut self) {
        self.take_screenshot = true;
    }

    pub fn screenshot_pending(&self) -> bool {
        self.take_screenshot
    }

    pub fn set_screenshot_dir(&mut self, dir: impl Into<PathBuf>) {
        self.screenshot_dir = dir.into();
    }

    pub fn last_saved_path(&self) -> Option<&Path> {
        self.last_saved_path.as_deref()
    }

    /// Depth texture of a cascade; unused levels share the first cascade's
    pub fn depth_texture(&self, level: CascadeLevel) -> Option<TextureHandle> {
        self.targets_for(level).map(|t| t.depth)
    }

    fn targets_for(&self, level: CascadeLevel) -> Option<&CascadeTargets> {
        self.targets
            .get(level.index())
            .or_else(|| self.targets.first())
    }

    /// Read back a cascade and write it as a grayscale PNG named after the
    /// current time in milliseconds
    pub fn save_depth_texture(
        &mut self,
        factory: &mut dyn ResourceFactory,
        level: CascadeLevel,
    ) -> RenderResult<PathBuf> {
        let depth = self
            .depth_texture(level)
            .ok_or_else(|| RenderError::MissingFramebuffer {
                stage: CommonStages::SHADOW_MAP.to_string(),
            })?;
        let readback = factory.read_texture_data(depth)?;
        let rgba = depth_to_rgba(&readback.to_u16());

        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let path = self.screenshot_dir.join(format!("{millis}.png"));

        log::info!(
            "Saving file: {} x {}, ratio:{}",
            readback.width,
            readback.height,
            readback.width as f64 / readback.height as f64
        );
        image::save_buffer(
            &path,
            &rgba,
            readback.width,
            readback.height,
            image::ColorType::Rgba8,
        )?;

        self.last_saved_path = Some(path.clone());
        Ok(path)
    }

    fn update_single(&mut self, camera: &Camera, direction: Vec3) {
        if !self.pinned_position {
            self.light_position = -direction * self.config.light_distance;
        }
        let view = CascadeView::orthographic(
            self.light_position,
            direction,
            self.config.single_extent,
            self.config.light_distance * 2.0,
        );
        self.views = [view; MAX_CASCADES];
        let limit = depth_limit_for_distance(camera.projection_matrix(), camera.far);
        self.limits = DepthCascadeLimits::new(limit, 0.0, 0.0);
    }

    fn update_cascaded(&mut self, camera: &Camera, direction: Vec3) {
        let count = self.cascade_count();
        let view = camera.view_matrix();
        let projection = camera.projection_matrix();
        let splits =
            compute_cascade_splits(count, camera.near, camera.far, self.config.split_lambda);

        let mut limits = [0.0f32; MAX_CASCADES];
        let mut slice_near = camera.near;
        for i in 0..count {
            let corners = frustum_corners_world(view, projection, slice_near, splits[i]);
            self.views[i] = build_cascade_view_projection(
                direction,
                &corners,
                self.config.map_width,
                self.config.light_distance,
            );
            limits[i] = depth_limit_for_distance(projection, splits[i]);
            slice_near = splits[i];
        }
        for i in count..MAX_CASCADES {
            self.views[i] = self.views[0];
        }

        self.light_position = self.views[0].eye;
        self.limits = DepthCascadeLimits::new(limits[0], limits[1], limits[2]);
    }

    fn release_targets(&mut self, factory: &mut dyn ResourceFactory) {
        for targets in self.targets.drain(..) {
            targets.destroy(factory);
        }
        if let Some(buffer) = self.depth_limits.take() {
            factory.destroy(buffer.into());
        }
    }

    fn publish(&self, shared: &mut SharedResources) {
        let Some(first) = self.targets.first() else {
            return;
        };
        let base = &self.config.binding_name;
        let names = [base.clone(), format!("{base}Mid"), format!("{base}Far")];
        for (i, name) in names.into_iter().enumerate() {
            let targets = self.targets.get(i).unwrap_or(first);
            shared.set_texture(name, targets.binding);
            shared.set_buffer(SharedNames::LIGHT_VIEW_PROJECTIONS[i], targets.light_view_projection);
        }
        shared.set_buffer(SharedNames::LIGHT_PROJECTION_MATRIX, first.light_projection);
        shared.set_buffer(SharedNames::LIGHT_VIEW_MATRIX, first.light_view);
        if let Some(limits) = self.depth_limits {
            shared.set_buffer(SharedNames::DEPTH_LIMITS, limits);
        }
    }

    fn write_matrices(
        factory: &mut dyn ResourceFactory,
        targets: &CascadeTargets,
        view: &CascadeView,
    ) -> BackendResult<()> {
        factory.write_buffer(targets.light_projection, 0, bytemuck::bytes_of(&view.projection))?;
        factory.write_buffer(targets.light_view, 0, bytemuck::bytes_of(&view.view))?;
        let view_projection: Mat4 = view.view_projection();
        factory.write_buffer(targets.light_view_projection, 0, bytemuck::bytes_of(&view_projection))
    }
}

/// Map 16-bit depth to opaque gray, the far plane white
pub fn depth_to_rgba(depth: &[u16]) -> Vec<u8> {
    depth
        .iter()
        .flat_map(|&d| {
            let v = (d as f32 / u16::MAX as f32 * 255.0).round() as u8;
            [v, v, v, 255]
        })
        .collect()
}

impl PipelineStage for ShadowMapStage {
    fn name(&self) -> &str {
        CommonStages::SHADOW_MAP
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn update(&mut self, camera: &Camera, light: &DirectionalLight) {
        let direction = light.direction();
        if self.cascade_count() == 1 {
            self.update_single(camera, direction);
        } else {
            self.update_cascaded(camera, direction);
        }
    }

    fn change_render_context(
        &mut self,
        rc: &mut dyn RenderContext,
        shared: &mut SharedResources,
    ) -> RenderResult<()> {
        self.release(rc);

        self.owner = Some(rc.context_id());
        let factory = rc.resource_factory();
        for i in 0..self.cascade_count() {
            let targets = CascadeTargets::create(factory, &self.config, i)?;
            self.targets.push(targets);
        }
        self.depth_limits =
            Some(factory.create_constant_buffer(ShaderConstantType::Float4, SharedNames::DEPTH_LIMITS)?);

        self.publish(shared);
        log::debug!(
            "ShadowMap: created {} cascade(s) of {}x{} on {}",
            self.targets.len(),
            self.config.map_width,
            self.config.map_height,
            rc.backend_type()
        );
        Ok(())
    }

    fn release(&mut self, rc: &mut dyn RenderContext) {
        if self.owner == Some(rc.context_id()) {
            self.release_targets(rc.resource_factory());
        } else {
            // Objects of another context die with it
            self.targets.clear();
            self.depth_limits = None;
        }
        self.owner = None;
    }

    fn execute_stage(
        &mut self,
        ctx: &mut StageContext<'_>,
        visibility: &mut dyn VisibilityManager,
        _viewpoint: Vec3,
    ) -> RenderResult<()> {
        let depth_limits = match self.depth_limits {
            Some(buffer) if !self.targets.is_empty() => buffer,
            _ => {
                return Err(RenderError::MissingFramebuffer {
                    stage: CommonStages::SHADOW_MAP.to_string(),
                })
            }
        };
        ctx.rc
            .resource_factory()
            .write_buffer(depth_limits, 0, bytemuck::bytes_of(&self.limits))?;

        for (i, targets) in self.targets.iter().enumerate() {
            let view = &self.views[i];
            Self::write_matrices(ctx.rc.resource_factory(), targets, view)?;
            ctx.shared
                .set_buffer(SharedNames::LIGHT_PROJECTION_MATRIX, targets.light_projection);
            ctx.shared.set_buffer(SharedNames::LIGHT_VIEW_MATRIX, targets.light_view);

            ctx.rc.clear_scissor_rectangle();
            ctx.rc.set_framebuffer(targets.framebuffer)?;
            ctx.rc.clear_buffer()?;
            ctx.rc
                .set_viewport(Viewport::new(0, 0, self.config.map_width, self.config.map_height));

            self.queue.clear();
            let collected = visibility.collect_visible_objects_in(
                &mut self.queue,
                CommonStages::SHADOW_MAP,
                view.eye,
                &view.frustum(),
            );
            self.queue.sort();
            let drawn = draw_queue(&self.queue, ctx, visibility, CommonStages::SHADOW_MAP)?;
            log::debug!("ShadowMap cascade {i}: collected {collected}, drew {drawn}");
        }
        // Unused cascades alias the first, which is also the standard default
        if let Some(first) = self.targets.first() {
            ctx.shared
                .set_buffer(SharedNames::LIGHT_PROJECTION_MATRIX, first.light_projection);
            ctx.shared.set_buffer(SharedNames::LIGHT_VIEW_MATRIX, first.light_view);
        }

        if self.take_screenshot {
            self.take_screenshot = false;
            match self.save_depth_texture(ctx.rc.resource_factory(), CascadeLevel::Near) {
                Ok(path) => log::info!("Saved shadow map to {}", path.display()),
                Err(err) => log::error!("Failed to save shadow map: {err}"),
            }
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
