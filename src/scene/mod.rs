//! Scene support: camera, light, transforms and bounding volumes

mod bounds;
mod camera;
mod light;
mod transform;

pub use bounds::*;
pub use camera::*;
pub use light::*;
pub use transform::*;
