//! Resource management: meshes, textures, materials and shared device objects

mod cache;
mod material;
mod mesh;
mod texture;

pub use cache::*;
pub use material::*;
pub use mesh::*;
pub use texture::*;
