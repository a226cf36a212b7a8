//! Contract between stages and the objects they draw

use glam::Vec3;

use crate::backend::traits::{RenderContext, ResourceFactory};
use crate::error::RenderResult;
use crate::pipeline::StageContext;
use crate::queue::RenderOrderKey;
use crate::resources::DeviceObjectCache;
use crate::scene::BoundingFrustum;

/// Something a stage can queue and draw
pub trait RenderItem {
    /// Names of the stages this item draws in
    fn stages_participated(&self) -> &[&'static str];

    /// `true` if the item is outside `frustum` and must be skipped
    fn cull(&self, frustum: &BoundingFrustum) -> bool;

    /// Key for the stage queue; lower keys draw first
    fn render_order_key(&self, viewpoint: Vec3) -> RenderOrderKey;

    /// Issue the draw calls for `stage`
    fn render(&mut self, ctx: &mut StageContext<'_>, stage: &str) -> RenderResult<()>;
}

/// A render item whose device objects can be moved to another context.
///
/// `change_render_context` recreates everything the item owns on `rc`,
/// destroying objects it already holds on `rc` first. The engine calls it
/// once per backend swap and never during a frame.
pub trait SwappableRenderItem: RenderItem {
    fn change_render_context(
        &mut self,
        rc: &mut dyn RenderContext,
        cache: &mut DeviceObjectCache,
    ) -> RenderResult<()>;

    /// Destroy owned device objects on the live context
    fn dispose(&mut self, factory: &mut dyn ResourceFactory);
}
