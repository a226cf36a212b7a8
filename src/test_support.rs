//! Render items for unit tests

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use glam::Vec3;

use crate::backend::traits::{BackendError, RenderContext, ResourceFactory};
use crate::error::RenderResult;
use crate::pipeline::{RenderItem, StageContext, SwappableRenderItem};
use crate::queue::RenderOrderKey;
use crate::resources::DeviceObjectCache;
use crate::scene::BoundingFrustum;
use crate::BackendType;

/// `(stage, tag)` of every render call, in call order
pub type RenderLog = Rc<RefCell<Vec<(String, u32)>>>;

/// Item that draws nothing and logs when it is rendered
pub struct ProbeItem {
    pub tag: u32,
    pub stages: Vec<&'static str>,
    pub culled: bool,
    pub key: RenderOrderKey,
    pub log: RenderLog,
    /// Number of `change_render_context` calls, shared with clones of the counter
    pub swaps: Rc<Cell<u32>>,
    /// Backend whose contexts this item fails to build on
    pub fail_on: Option<BackendType>,
}

impl ProbeItem {
    pub fn new(tag: u32, stages: &[&'static str], log: &RenderLog) -> Self {
        Self {
            tag,
            stages: stages.to_vec(),
            culled: false,
            key: RenderOrderKey::default(),
            log: Rc::clone(log),
            swaps: Rc::new(Cell::new(0)),
            fail_on: None,
        }
    }

    pub fn with_key(mut self, key: u64) -> Self {
        self.key = RenderOrderKey::from(key);
        self
    }

    pub fn culled(mut self) -> Self {
        self.culled = true;
        self
    }

    pub fn failing_on(mut self, backend: BackendType) -> Self {
        self.fail_on = Some(backend);
        self
    }
}

impl RenderItem for ProbeItem {
    fn stages_participated(&self) -> &[&'static str] {
        &self.stages
    }

    fn cull(&self, _frustum: &BoundingFrustum) -> bool {
        self.culled
    }

    fn render_order_key(&self, _viewpoint: Vec3) -> RenderOrderKey {
        self.key
    }

    fn render(&mut self, _ctx: &mut StageContext<'_>, stage: &str) -> RenderResult<()> {
        self.log.borrow_mut().push((stage.to_string(), self.tag));
        Ok(())
    }
}

impl SwappableRenderItem for ProbeItem {
    fn change_render_context(
        &mut self,
        rc: &mut dyn RenderContext,
        _cache: &mut DeviceObjectCache,
    ) -> RenderResult<()> {
        self.swaps.set(self.swaps.get() + 1);
        if self.fail_on == Some(rc.backend_type()) {
            return Err(BackendError::ResourceCreationFailed(format!("item {}", self.tag)).into());
        }
        Ok(())
    }

    fn dispose(&mut self, _factory: &mut dyn ResourceFactory) {}
}

pub fn render_log() -> RenderLog {
    Rc::new(RefCell::new(Vec::new()))
}

pub fn rendered_tags(log: &RenderLog) -> Vec<u32> {
    log.borrow().iter().map(|(_, tag)| *tag).collect()
}
