//! Common utilities for the integration tests.
//!
//! Builds headless contexts and engines for every emulated backend and
//! provides a render item that records which stages drew it.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use glam::Vec3;
use render_demo::backend::{HeadlessContext, RenderContext, ResourceFactory};
use render_demo::pipeline::{RenderItem, StageContext, SwappableRenderItem};
use render_demo::resources::DeviceObjectCache;
use render_demo::scene::{BoundingFrustum, BoundingSphere, ContainmentType};
use render_demo::{BackendType, Engine, EngineConfig, RenderOrderKey, RenderResult, ShadowConfig};

/// Shadow map size used by the tests; small so readbacks stay cheap
pub const TEST_MAP_SIZE: u32 = 32;

pub const ALL_BACKENDS: [BackendType; 4] = [
    BackendType::Direct3D11,
    BackendType::Vulkan,
    BackendType::OpenGL,
    BackendType::OpenGLES,
];

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn headless(backend: BackendType) -> HeadlessContext {
    HeadlessContext::new(backend, 320, 180).expect("headless context")
}

pub fn test_config(cascades: u32) -> EngineConfig {
    EngineConfig {
        width: 320,
        height: 180,
        shadow: ShadowConfig {
            map_width: TEST_MAP_SIZE,
            map_height: TEST_MAP_SIZE,
            cascade_count: cascades,
            ..ShadowConfig::default()
        },
        ..EngineConfig::default()
    }
}

pub fn test_engine(backend: BackendType, cascades: u32) -> Engine {
    init_logging();
    let config = test_config(cascades);
    let rc = HeadlessContext::new(backend, config.width, config.height).expect("headless context");
    Engine::new(Box::new(rc), config).expect("engine")
}

/// The engine's context as the headless implementation
pub fn headless_of(engine: &Engine) -> &HeadlessContext {
    engine
        .render_context()
        .as_any()
        .downcast_ref::<HeadlessContext>()
        .expect("engine runs on a headless context")
}

/// `(stage, name)` of every render call
pub type DrawLog = Rc<RefCell<Vec<(String, String)>>>;

pub fn draw_log() -> DrawLog {
    Rc::new(RefCell::new(Vec::new()))
}

/// Names drawn in `stage`, in draw order
pub fn drawn_in(log: &DrawLog, stage: &str) -> Vec<String> {
    log.borrow()
        .iter()
        .filter(|(s, _)| s == stage)
        .map(|(_, name)| name.clone())
        .collect()
}

/// Item placed at a point that logs its render calls
pub struct RecordingItem {
    pub name: String,
    pub position: Vec3,
    pub radius: f32,
    pub stages: Vec<&'static str>,
    pub log: DrawLog,
    pub swaps: Rc<RefCell<u32>>,
}

impl RecordingItem {
    pub fn new(name: &str, position: Vec3, stages: &[&'static str], log: &DrawLog) -> Self {
        Self {
            name: name.to_string(),
            position,
            radius: 0.5,
            stages: stages.to_vec(),
            log: Rc::clone(log),
            swaps: Rc::new(RefCell::new(0)),
        }
    }
}

impl RenderItem for RecordingItem {
    fn stages_participated(&self) -> &[&'static str] {
        &self.stages
    }

    fn cull(&self, frustum: &BoundingFrustum) -> bool {
        frustum.contains_sphere(&BoundingSphere::new(self.position, self.radius))
            == ContainmentType::Disjoint
    }

    fn render_order_key(&self, viewpoint: Vec3) -> RenderOrderKey {
        RenderOrderKey::create(self.position.distance(viewpoint), 0)
    }

    fn render(&mut self, _ctx: &mut StageContext<'_>, stage: &str) -> RenderResult<()> {
        self.log
            .borrow_mut()
            .push((stage.to_string(), self.name.clone()));
        Ok(())
    }
}

impl SwappableRenderItem for RecordingItem {
    fn change_render_context(
        &mut self,
        _rc: &mut dyn RenderContext,
        _cache: &mut DeviceObjectCache,
    ) -> RenderResult<()> {
        *self.swaps.borrow_mut() += 1;
        Ok(())
    }

    fn dispose(&mut self, _factory: &mut dyn ResourceFactory) {}
}
