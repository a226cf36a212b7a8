//! Render Demo - render queue and pipeline-stage scheduling with shadow mapping
//!
//! The engine drives a fixed sequence of pipeline stages over a backend-neutral
//! capability set (`ResourceFactory` + `RenderContext`):
//! - **ShadowMap**: renders shadow casters into one to three depth cascades
//! - **Standard**: the main forward pass, sampling the published shadow maps
//! - **Overlay**: screen-space debug views drawn last
//!
//! # Features
//! - Deterministic render queues sorted by packed distance/material keys
//! - Per-stage visibility collection with frustum culling
//! - Backend swaps that rebuild every stage and render item in one step
//! - A headless backend that emulates Direct3D11, Vulkan, OpenGL and OpenGL ES

pub mod backend;
pub mod engine;
pub mod error;
pub mod objects;
pub mod pipeline;
pub mod preferences;
pub mod queue;
pub mod resources;
pub mod scene;
pub mod visibility;

#[cfg(test)]
mod test_support;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use engine::Engine;
pub use error::{RenderError, RenderResult};
pub use preferences::Preferences;
pub use queue::{RenderOrderKey, RenderQueue};
pub use visibility::{ItemId, SceneVisibilityManager, VisibilityManager};

/// Device backend a render context talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BackendType {
    Direct3D11,
    Vulkan,
    /// Desktop OpenGL, available everywhere
    #[default]
    OpenGL,
    OpenGLES,
}

impl BackendType {
    /// Backend to start with given the user's preference.
    ///
    /// Vulkan is always honoured; Direct3D11 and OpenGL ES only on Windows.
    pub fn initial(preferred: BackendType, on_windows: bool) -> BackendType {
        match preferred {
            BackendType::Vulkan => BackendType::Vulkan,
            BackendType::Direct3D11 if on_windows => BackendType::Direct3D11,
            BackendType::OpenGLES if on_windows => BackendType::OpenGLES,
            _ => BackendType::OpenGL,
        }
    }

    /// Backends offered for switching, the current one first
    pub fn switch_options(current: BackendType, on_windows: bool) -> Vec<BackendType> {
        use BackendType::*;
        if on_windows {
            match current {
                OpenGL => vec![OpenGL, Direct3D11, OpenGLES, Vulkan],
                OpenGLES => vec![OpenGLES, OpenGL, Direct3D11, Vulkan],
                Vulkan => vec![Vulkan, Direct3D11, OpenGL, OpenGLES],
                Direct3D11 => vec![Direct3D11, Vulkan, OpenGL, OpenGLES],
            }
        } else {
            match current {
                Vulkan => vec![Vulkan, OpenGL],
                _ => vec![OpenGL, Vulkan],
            }
        }
    }
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendType::Direct3D11 => "Direct3D",
            BackendType::Vulkan => "Vulkan",
            BackendType::OpenGL => "OpenGL",
            BackendType::OpenGLES => "OpenGL ES",
        };
        f.write_str(name)
    }
}

impl FromStr for BackendType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "d3d11" | "direct3d" | "direct3d11" => Ok(BackendType::Direct3D11),
            "vulkan" | "vk" => Ok(BackendType::Vulkan),
            "opengl" | "gl" => Ok(BackendType::OpenGL),
            "opengles" | "gles" => Ok(BackendType::OpenGLES),
            other => Err(format!("unknown backend: {other}")),
        }
    }
}

/// Shadow map layout and light placement
#[derive(Debug, Clone)]
pub struct ShadowConfig {
    /// Width of each cascade's depth texture
    pub map_width: u32,
    /// Height of each cascade's depth texture
    pub map_height: u32,
    /// Number of cascades, 1 to 3
    pub cascade_count: u32,
    /// Blend between uniform (0) and logarithmic (1) cascade splits
    pub split_lambda: f32,
    /// Half size of the light box in single-map mode
    pub single_extent: f32,
    /// How far the light sits from the origin, against its direction
    pub light_distance: f32,
    /// Shared name of the first cascade's texture
    pub binding_name: String,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            map_width: 2048,
            map_height: 2048,
            cascade_count: 1,
            split_lambda: 0.5,
            single_extent: 40.0,
            light_distance: 30.0,
            binding_name: "ShadowMap".to_string(),
        }
    }
}

/// Lighting constants shared with the standard pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightingConstants {
    /// Subtracted from the fragment's light depth before the shadow comparison
    pub shadow_bias: f32,
    /// Fraction of the surface color kept in shadow
    pub ambient: f32,
}

impl Default for LightingConstants {
    fn default() -> Self {
        Self {
            shadow_bias: 0.0005,
            ambient: 0.3,
        }
    }
}

/// Configuration for initializing the engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Window title
    pub title: String,
    /// Initial window width
    pub width: u32,
    /// Initial window height
    pub height: u32,
    /// Which backend to start with
    pub backend: BackendType,
    /// Clear color of the default framebuffer
    pub clear_color: [f32; 4],
    pub shadow: ShadowConfig,
    pub lighting: LightingConstants,
    /// Where shadow map screenshots are written
    pub screenshot_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            title: "Render Demo".to_string(),
            width: 960,
            height: 540,
            backend: BackendType::OpenGL,
            clear_color: [0.392, 0.584, 0.929, 1.0],
            shadow: ShadowConfig::default(),
            lighting: LightingConstants::default(),
            screenshot_dir: PathBuf::from("."),
        }
    }
}
