//! Render error types.

use crate::backend::BackendError;
use thiserror::Error;

/// Errors surfaced by stages, render items and the engine.
#[derive(Error, Debug)]
pub enum RenderError {
    /// A backend call was rejected.
    #[error(transparent)]
    Backend(#[from] BackendError),
    /// A stage ran before its device objects were created.
    #[error("stage {stage} has no framebuffer; change_render_context was never called")]
    MissingFramebuffer { stage: String },
    /// A render item was drawn before its device objects were created.
    #[error("render item {item} has no device objects")]
    ItemNotInitialized { item: String },
    /// A render item looked up a texture nobody published.
    #[error("no shared texture named {0}")]
    MissingSharedTexture(String),
    /// A render item looked up a buffer nobody published.
    #[error("no shared buffer named {0}")]
    MissingSharedBuffer(String),
    /// Encoding a shadow map screenshot failed.
    #[error("failed to save image: {0}")]
    ImageSave(#[from] image::ImageError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// The preferences file is not valid JSON.
    #[error("invalid preferences: {0}")]
    Preferences(#[from] serde_json::Error),
}

pub type RenderResult<T> = Result<T, RenderError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{SlotKind, TextureFormat};

    #[test]
    fn test_error_display() {
        let err = RenderError::MissingSharedTexture("ShadowMapMid".to_string());
        assert_eq!(err.to_string(), "no shared texture named ShadowMapMid");

        let err: RenderError = BackendError::InvalidSlot {
            kind: SlotKind::Texture,
            slot: 4,
            count: 4,
        }
        .into();
        assert_eq!(err.to_string(), "Invalid slot:4. Valid range:0-3.");

        let err: RenderError = BackendError::UnsupportedDepthFormat(TextureFormat::R8Uint).into();
        assert!(err
            .to_string()
            .starts_with("R16_UInt is the only supported depth texture format."));
    }
}
