//! Directional light

use bytemuck::{Pod, Zeroable};
use glam::{Quat, Vec3, Vec4};

use crate::scene::Transform;

/// Light info as laid out in the `LightInfo` constant buffer
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct DirectionalLightInfo {
    pub direction: Vec3,
    pub _padding: f32,
    pub color: Vec4,
}

/// The scene's sun.
///
/// Direction is the forward vector of its transform. Consumers read
/// [`DirectionalLight::info`] each frame, so changes take effect on the next frame.
#[derive(Debug, Clone)]
pub struct DirectionalLight {
    pub transform: Transform,
    pub color: Vec4,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self::new(Vec3::new(-0.3, -1.0, -0.3), Vec4::ONE)
    }
}

impl DirectionalLight {
    pub fn new(direction: Vec3, color: Vec4) -> Self {
        let mut light = Self {
            transform: Transform::new(),
            color,
        };
        light.set_direction(direction);
        light
    }

    pub fn direction(&self) -> Vec3 {
        self.transform.forward()
    }

    pub fn set_direction(&mut self, direction: Vec3) {
        self.transform.rotation = Quat::from_rotation_arc(-Vec3::Z, direction.normalize());
    }

    pub fn info(&self) -> DirectionalLightInfo {
        DirectionalLightInfo {
            direction: self.direction(),
            _padding: 0.0,
            color: self.color,
        }
    }
}
