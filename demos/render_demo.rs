//! # Render Demo
//!
//! Headless run of the shadow-mapping scene: two shadow casters, a skybox,
//! a ring of colored cubes and the shadow map preview. Frames are recorded
//! by the headless backend, which can be swapped mid-run to exercise
//! render context changes.
//!
//! ```bash
//! # 300 frames on Vulkan with three cascades, swapping backend every 100 frames
//! cargo run --example render_demo -- --backend vulkan --cascades 3 --frames 300 --swap-every 100
//!
//! # Save the first cascade as a PNG in ./shots
//! cargo run --example render_demo -- --save-shadow-map --shadow-dir shots
//! ```

use std::path::PathBuf;

use clap::Parser;
use glam::{Vec3, Vec4};
use render_demo::backend::HeadlessContext;
use render_demo::objects::{ColoredCubeRenderer, ShadowCaster, ShadowMapPreview, Skybox};
use render_demo::resources::{CubemapData, Mesh, TextureData};
use render_demo::scene::Transform;
use render_demo::{BackendType, Engine, EngineConfig, Preferences, RenderResult, ShadowConfig};

/// Render demo arguments.
#[derive(Parser, Debug)]
#[command(name = "render_demo", about = "Shadow-mapped scene on the headless backend")]
struct Args {
    /// Backend to start with (d3d11, vulkan, opengl, opengles); overrides the preferences file
    #[arg(long)]
    backend: Option<BackendType>,

    /// Number of frames to render before exiting
    #[arg(long, default_value_t = 120)]
    frames: u64,

    /// Switch to the next offered backend every N frames
    #[arg(long)]
    swap_every: Option<u64>,

    /// Save the first shadow cascade as a PNG after the first frame
    #[arg(long)]
    save_shadow_map: bool,

    /// Directory for shadow map screenshots
    #[arg(long, default_value = ".")]
    shadow_dir: PathBuf,

    /// Preferences file
    #[arg(long, default_value = "preferences.json")]
    preferences: PathBuf,

    /// Number of shadow cascades
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..=3))]
    cascades: u32,

    /// Window width
    #[arg(long, default_value_t = 960)]
    width: u32,

    /// Window height
    #[arg(long, default_value_t = 540)]
    height: u32,
}

const FRAME_SECONDS: f32 = 1.0 / 60.0;

fn setup_scene(engine: &mut Engine) -> RenderResult<()> {
    log::info!("Setting up scene...");

    let ground = ShadowCaster::new(
        Mesh::plane(40.0, 40.0, 4),
        TextureData::checkerboard(64, [200, 200, 200, 255], [90, 90, 90, 255]),
    );
    engine.add_item(Box::new(ground))?;

    let sphere = ShadowCaster::new(Mesh::sphere(24, 16), TextureData::white())
        .with_transform(Transform::from_position(Vec3::new(0.0, 2.0, -8.0)));
    engine.add_item(Box::new(sphere))?;

    engine.add_item(Box::new(Skybox::new(CubemapData::solid(16, [100, 149, 237, 255]))))?;

    for i in 0..8 {
        let angle = i as f32 / 8.0 * std::f32::consts::TAU;
        let position = Vec3::new(angle.cos() * 6.0, 1.5, angle.sin() * 6.0 - 8.0);
        engine.add_item(Box::new(ColoredCubeRenderer::new(position)))?;
    }

    engine.add_item(Box::new(ShadowMapPreview::new()))?;
    log::info!("Scene ready: {} items", engine.visibility().len());
    Ok(())
}

fn main() -> RenderResult<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let on_windows = cfg!(target_os = "windows");
    let preferences = Preferences::load_or_default(&args.preferences);
    let backend = args
        .backend
        .unwrap_or_else(|| BackendType::initial(preferences.preferred_backend, on_windows));

    let config = EngineConfig {
        width: args.width,
        height: args.height,
        backend,
        shadow: ShadowConfig {
            cascade_count: args.cascades,
            ..ShadowConfig::default()
        },
        screenshot_dir: args.shadow_dir.clone(),
        ..EngineConfig::default()
    };

    let rc = HeadlessContext::new(backend, config.width, config.height)?
        .with_debug(preferences.debug_device(backend));
    let mut engine = Engine::new(Box::new(rc), config)?;
    engine.light_mut().color = Vec4::new(1.0, 0.95, 0.85, 1.0);
    setup_scene(&mut engine)?;

    if args.save_shadow_map {
        if let Some(stage) = engine.shadow_map_stage_mut() {
            stage.save_next_frame();
        }
    }

    for frame in 0..args.frames {
        if let Some(every) = args.swap_every.filter(|n| *n > 0) {
            if frame > 0 && frame % every == 0 {
                let current = engine.render_context().backend_type();
                let options = BackendType::switch_options(current, on_windows);
                let next = options.get(1).copied().unwrap_or(current);
                let (width, height) = engine.render_context().window_size();
                let rc = HeadlessContext::new(next, width, height)?
                    .with_debug(preferences.debug_device(next));
                engine.change_render_context(Box::new(rc))?;
            }
        }

        engine.camera_mut().rotate(1.0, 0.0);
        engine.render_frame(FRAME_SECONDS)?;

        // Keep the command log to a single frame
        if let Some(rc) = engine
            .render_context_mut()
            .as_any_mut()
            .downcast_mut::<HeadlessContext>()
        {
            let commands = rc.take_commands();
            log::trace!("Frame {}: {} commands", frame, commands.len());
        }
    }

    if let Some(path) = engine.shadow_map_stage().and_then(|stage| stage.last_saved_path()) {
        log::info!("Shadow map written to {}", path.display());
    }
    log::info!(
        "Rendered {} frames on {}",
        engine.frame_index(),
        engine.render_context().backend_type()
    );
    Ok(())
}
