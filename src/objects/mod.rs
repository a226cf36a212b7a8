//! Scene objects drawn by the pipeline stages

pub mod colored_cube;
pub mod shadow_caster;
pub mod shadow_map_preview;
pub mod skybox;

pub use colored_cube::ColoredCubeRenderer;
pub use shadow_caster::ShadowCaster;
pub use shadow_map_preview::ShadowMapPreview;
pub use skybox::Skybox;
