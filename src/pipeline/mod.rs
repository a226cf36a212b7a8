//! Pipeline stages
//!
//! A frame runs a fixed sequence of stages, each owning its targets and
//! render queue:
//! 1. ShadowMap - depth of shadow casters from the light, one pass per cascade
//! 2. Standard - the main forward pass, reading the published shadow maps
//! 3. Overlay - screen-space debug views

pub mod cascade;
pub mod render_item;
pub mod shadow_map_stage;
pub mod shared;
pub mod standard_stage;

pub use cascade::{CascadeLevel, CascadeView, DepthCascadeLimits, ShadowLighting};
pub use render_item::{RenderItem, SwappableRenderItem};
pub use shadow_map_stage::ShadowMapStage;
pub use shared::{SharedNames, SharedResources};
pub use standard_stage::StandardPipelineStage;

use std::any::Any;

use glam::{Mat4, Vec3};

use crate::backend::traits::RenderContext;
use crate::error::RenderResult;
use crate::queue::RenderQueue;
use crate::resources::DeviceObjectCache;
use crate::scene::{Camera, DirectionalLight};
use crate::visibility::{ItemId, VisibilityManager};

/// Stage names used by the scene objects
pub struct CommonStages;

impl CommonStages {
    pub const STANDARD: &'static str = "Standard";
    pub const SHADOW_MAP: &'static str = "ShadowMap";
    pub const OVERLAY: &'static str = "Overlay";
}

/// Per-frame values visible to every stage and item
#[derive(Debug, Clone, Copy)]
pub struct FrameInfo {
    pub frame_index: u64,
    /// Seconds since the engine started
    pub elapsed_seconds: f32,
    pub delta_seconds: f32,
    pub camera_position: Vec3,
    pub view: Mat4,
    pub projection: Mat4,
}

impl Default for FrameInfo {
    fn default() -> Self {
        Self {
            frame_index: 0,
            elapsed_seconds: 0.0,
            delta_seconds: 0.0,
            camera_position: Vec3::ZERO,
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
        }
    }
}

/// Everything a stage and its items draw with
pub struct StageContext<'a> {
    pub rc: &'a mut dyn RenderContext,
    pub shared: &'a mut SharedResources,
    pub cache: &'a mut DeviceObjectCache,
    pub frame: FrameInfo,
}

/// Render every queued item in queue order; returns how many were drawn
pub(crate) fn draw_queue(
    queue: &RenderQueue<ItemId>,
    ctx: &mut StageContext<'_>,
    visibility: &mut dyn VisibilityManager,
    stage: &str,
) -> RenderResult<usize> {
    let mut drawn = 0;
    for id in queue {
        let Some(item) = visibility.item_mut(*id) else {
            log::warn!("{stage}: item {} vanished after collection", id.index());
            continue;
        };
        item.render(ctx, stage)?;
        drawn += 1;
    }
    Ok(drawn)
}

/// One pass of the frame
pub trait PipelineStage {
    /// Matched against [`RenderItem::stages_participated`]
    fn name(&self) -> &str;

    fn enabled(&self) -> bool;

    fn set_enabled(&mut self, enabled: bool);

    /// Recompute view-dependent state before execution
    fn update(&mut self, _camera: &Camera, _light: &DirectionalLight) {}

    /// Create this stage's device objects on `rc` and publish them to `shared`
    fn change_render_context(
        &mut self,
        rc: &mut dyn RenderContext,
        shared: &mut SharedResources,
    ) -> RenderResult<()>;

    /// Destroy the device objects this stage created on `rc`
    fn release(&mut self, _rc: &mut dyn RenderContext) {}

    /// Collect, sort and draw the stage's items
    fn execute_stage(
        &mut self,
        ctx: &mut StageContext<'_>,
        visibility: &mut dyn VisibilityManager,
        viewpoint: Vec3,
    ) -> RenderResult<()>;

    /// Allow downcasting
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
