//! User preferences persisted as JSON

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::RenderResult;
use crate::BackendType;

/// Startup preferences of the demo.
///
/// Missing fields take their default so older files keep loading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub preferred_backend: BackendType,
    pub allow_opengl_debug_contexts: bool,
    pub allow_direct3d_debug_device: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            preferred_backend: BackendType::OpenGL,
            allow_opengl_debug_contexts: false,
            allow_direct3d_debug_device: false,
        }
    }
}

impl Preferences {
    /// Read preferences from a JSON file
    pub fn load(path: impl AsRef<Path>) -> RenderResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Read preferences, falling back to defaults when the file is missing or invalid
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(preferences) => preferences,
            Err(e) => {
                log::warn!("Using default preferences, could not load {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Whether contexts of `backend` should be created in debug mode
    pub fn debug_device(&self, backend: BackendType) -> bool {
        match backend {
            BackendType::OpenGL | BackendType::OpenGLES => self.allow_opengl_debug_contexts,
            BackendType::Direct3D11 => self.allow_direct3d_debug_device,
            BackendType::Vulkan => false,
        }
    }

    /// Write preferences as pretty-printed JSON
    pub fn save(&self, path: impl AsRef<Path>) -> RenderResult<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        std::fs::write(&path, r#"{ "preferred_backend": "Vulkan" }"#).unwrap();

        let prefs = Preferences::load(&path).unwrap();
        assert_eq!(prefs.preferred_backend, BackendType::Vulkan);
        assert!(!prefs.allow_opengl_debug_contexts);
    }

    #[test]
    fn test_missing_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let prefs = Preferences::load_or_default(dir.path().join("absent.json"));
        assert_eq!(prefs, Preferences::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        let prefs = Preferences {
            preferred_backend: BackendType::Direct3D11,
            allow_direct3d_debug_device: true,
            ..Default::default()
        };
        prefs.save(&path).unwrap();
        assert_eq!(Preferences::load(&path).unwrap(), prefs);
    }

    #[test]
    fn test_debug_device_follows_backend() {
        let prefs = Preferences {
            allow_opengl_debug_contexts: true,
            ..Default::default()
        };
        assert!(prefs.debug_device(BackendType::OpenGL));
        assert!(prefs.debug_device(BackendType::OpenGLES));
        assert!(!prefs.debug_device(BackendType::Direct3D11));
        assert!(!prefs.debug_device(BackendType::Vulkan));
    }
}
