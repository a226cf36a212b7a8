//! Stage drawing into the default framebuffer

use std::any::Any;

use glam::Vec3;

use crate::backend::traits::RenderContext;
use crate::backend::types::Viewport;
use crate::error::RenderResult;
use crate::pipeline::{draw_queue, PipelineStage, SharedResources, StageContext};
use crate::queue::RenderQueue;
use crate::visibility::VisibilityManager;

/// Forward stage over the whole window, used for "Standard" and "Overlay".
///
/// The default framebuffer is cleared once per frame by the engine, so the
/// stage itself never clears.
pub struct StandardPipelineStage {
    name: String,
    enabled: bool,
    queue: RenderQueue,
}

impl StandardPipelineStage {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            enabled: true,
            queue: RenderQueue::new(),
        }
    }

    /// Items drawn by the last execution, in draw order
    pub fn queue(&self) -> &RenderQueue {
        &self.queue
    }
}

impl PipelineStage for StandardPipelineStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn change_render_context(
        &mut self,
        _rc: &mut dyn RenderContext,
        _shared: &mut SharedResources,
    ) -> RenderResult<()> {
        Ok(())
    }

    fn execute_stage(
        &mut self,
        ctx: &mut StageContext<'_>,
        visibility: &mut dyn VisibilityManager,
        viewpoint: Vec3,
    ) -> RenderResult<()> {
        let (width, height) = ctx.rc.window_size();
        ctx.rc.set_default_framebuffer();
        ctx.rc.set_viewport(Viewport::new(0, 0, width, height));
        ctx.rc.clear_scissor_rectangle();

        self.queue.clear();
        let collected = visibility.collect_visible_objects(&mut self.queue, &self.name, viewpoint);
        self.queue.sort();

        let drawn = draw_queue(&self.queue, ctx, visibility, &self.name)?;
        log::debug!("{}: collected {}, drew {}", self.name, collected, drawn);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{HeadlessContext, RecordedCommand};
    use crate::pipeline::{CommonStages, FrameInfo};
    use crate::resources::DeviceObjectCache;
    use crate::test_support::{render_log, rendered_tags, ProbeItem};
    use crate::visibility::SceneVisibilityManager;
    use crate::BackendType;

    fn run(stage: &mut StandardPipelineStage, rc: &mut HeadlessContext, scene: &mut SceneVisibilityManager) {
        let mut shared = SharedResources::new();
        let mut cache = DeviceObjectCache::new();
        let mut ctx = StageContext {
            rc,
            shared: &mut shared,
            cache: &mut cache,
            frame: FrameInfo::default(),
        };
        stage.execute_stage(&mut ctx, scene, Vec3::ZERO).unwrap();
    }

    #[test]
    fn test_draws_sorted_participants() {
        let log = render_log();
        let mut scene = SceneVisibilityManager::new();
        scene.add(Box::new(ProbeItem::new(1, &[CommonStages::STANDARD], &log).with_key(5)));
        scene.add(Box::new(ProbeItem::new(2, &[CommonStages::STANDARD], &log).with_key(2)));
        scene.add(Box::new(ProbeItem::new(3, &[CommonStages::OVERLAY], &log).with_key(1)));
        scene.add(Box::new(
            ProbeItem::new(4, &[CommonStages::STANDARD], &log).with_key(0).culled(),
        ));

        let mut rc = HeadlessContext::new(BackendType::OpenGL, 64, 32).unwrap();
        let mut stage = StandardPipelineStage::new(CommonStages::STANDARD);
        run(&mut stage, &mut rc, &mut scene);

        assert_eq!(rendered_tags(&log), vec![2, 1]);
        assert_eq!(stage.queue().len(), 2);
    }

    #[test]
    fn test_prepares_default_framebuffer() {
        let mut scene = SceneVisibilityManager::new();
        let mut rc = HeadlessContext::new(BackendType::Vulkan, 64, 32).unwrap();
        let mut stage = StandardPipelineStage::new(CommonStages::OVERLAY);
        run(&mut stage, &mut rc, &mut scene);

        assert_eq!(rc.current_framebuffer(), None);
        assert_eq!(rc.viewport(), Viewport::new(0, 0, 64, 32));
        assert!(rc
            .commands()
            .iter()
            .any(|c| matches!(c, RecordedCommand::SetScissor(None))));
        assert!(!rc
            .commands()
            .iter()
            .any(|c| matches!(c, RecordedCommand::Clear { .. })));
    }
}
