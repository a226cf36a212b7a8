//! Named registry of device objects shared between stages and render items

use std::collections::HashMap;

use crate::backend::traits::{BufferHandle, TextureBindingHandle};
use crate::error::{RenderError, RenderResult};

/// Well-known names in [`SharedResources`]
pub struct SharedNames;

impl SharedNames {
    pub const PROJECTION_MATRIX: &'static str = "ProjectionMatrix";
    pub const VIEW_MATRIX: &'static str = "ViewMatrix";
    /// Projection of the cascade currently being rendered
    pub const LIGHT_PROJECTION_MATRIX: &'static str = "LightProjectionMatrix";
    /// View of the cascade currently being rendered
    pub const LIGHT_VIEW_MATRIX: &'static str = "LightViewMatrix";
    pub const LIGHT_VIEW_PROJECTION_NEAR: &'static str = "LightViewProjectionNear";
    pub const LIGHT_VIEW_PROJECTION_MID: &'static str = "LightViewProjectionMid";
    pub const LIGHT_VIEW_PROJECTION_FAR: &'static str = "LightViewProjectionFar";
    pub const DEPTH_LIMITS: &'static str = "DepthLimits";
    pub const LIGHT_INFO: &'static str = "LightInfo";
    pub const SHADOW_PARAMETERS: &'static str = "ShadowParameters";
    pub const SHADOW_MAP: &'static str = "ShadowMap";

    pub const LIGHT_VIEW_PROJECTIONS: [&'static str; 3] = [
        Self::LIGHT_VIEW_PROJECTION_NEAR,
        Self::LIGHT_VIEW_PROJECTION_MID,
        Self::LIGHT_VIEW_PROJECTION_FAR,
    ];
}

/// Texture bindings and constant buffers published by name.
///
/// Producers keep ownership of what they publish; entries are plain handles
/// and become stale when the producer is rebuilt for a new context.
#[derive(Debug, Default)]
pub struct SharedResources {
    textures: HashMap<String, TextureBindingHandle>,
    buffers: HashMap<String, BufferHandle>,
}

impl SharedResources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a texture, replacing any previous entry of that name
    pub fn set_texture(&mut self, name: impl Into<String>, binding: TextureBindingHandle) {
        self.textures.insert(name.into(), binding);
    }

    pub fn texture(&self, name: &str) -> RenderResult<TextureBindingHandle> {
        self.textures
            .get(name)
            .copied()
            .ok_or_else(|| RenderError::MissingSharedTexture(name.to_string()))
    }

    pub fn set_buffer(&mut self, name: impl Into<String>, buffer: BufferHandle) {
        self.buffers.insert(name.into(), buffer);
    }

    pub fn buffer(&self, name: &str) -> RenderResult<BufferHandle> {
        self.buffers
            .get(name)
            .copied()
            .ok_or_else(|| RenderError::MissingSharedBuffer(name.to_string()))
    }

    pub fn contains_texture(&self, name: &str) -> bool {
        self.textures.contains_key(name)
    }

    pub fn contains_buffer(&self, name: &str) -> bool {
        self.buffers.contains_key(name)
    }

    /// Forget every entry
    pub fn clear(&mut self) {
        self.textures.clear();
        self.buffers.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty() && self.buffers.is_empty()
    }
}
