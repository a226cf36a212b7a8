//! First-person perspective camera

use glam::{EulerRot, Mat4, Quat, Vec3};

use crate::scene::BoundingFrustum;

/// Perspective camera driven by yaw/pitch.
///
/// View and projection are derived on demand from the current fields.
#[derive(Debug, Clone)]
pub struct Camera {
    pub fov: f32,
    pub near: f32,
    pub far: f32,
    pub position: Vec3,
    look_direction: Vec3,
    pub move_speed: f32,
    yaw: f32,
    pitch: f32,
    window_width: f32,
    window_height: f32,
}

/// Pitch is kept just short of straight up or down
pub const MAX_PITCH: f32 = 1.55;

impl Camera {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            fov: 1.0,
            near: 1.0,
            far: 250.0,
            position: Vec3::new(0.0, 3.0, 0.0),
            look_direction: Vec3::new(0.0, -0.3, -1.0),
            move_speed: 0.666,
            yaw: 0.0,
            pitch: 0.0,
            window_width: width as f32,
            window_height: height as f32,
        }
    }

    pub fn look_direction(&self) -> Vec3 {
        self.look_direction
    }

    pub fn set_look_direction(&mut self, direction: Vec3) {
        self.look_direction = direction.normalize();
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.window_width / self.window_height
    }

    pub fn window_resized(&mut self, width: u32, height: u32) {
        self.window_width = width as f32;
        self.window_height = height as f32;
    }

    fn look_rotation(&self) -> Quat {
        Quat::from_euler(EulerRot::YXZ, self.yaw, self.pitch, 0.0)
    }

    /// Move along a camera-local direction, scaled by speed and `sprint`
    pub fn move_local(&mut self, direction: Vec3, delta_seconds: f32, sprint: f32) {
        if direction == Vec3::ZERO {
            return;
        }
        let world = self.look_rotation() * direction;
        self.position += world * self.move_speed * sprint * delta_seconds;
    }

    /// Turn by a mouse delta in pixels
    pub fn rotate(&mut self, mouse_dx: f32, mouse_dy: f32) {
        self.yaw += -mouse_dx * 0.01;
        self.pitch = (self.pitch - mouse_dy * 0.01).clamp(-MAX_PITCH, MAX_PITCH);
        self.look_direction = self.look_rotation() * -Vec3::Z;
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.look_direction, Vec3::Y)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov, self.aspect_ratio(), self.near, self.far)
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    pub fn frustum(&self) -> BoundingFrustum {
        BoundingFrustum::from_matrix(self.view_projection())
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(960, 540)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{BoundingSphere, ContainmentType};

    #[test]
    fn test_pitch_is_clamped() {
        let mut camera = Camera::default();
        camera.rotate(0.0, -10_000.0);
        assert_eq!(camera.pitch(), MAX_PITCH);
        camera.rotate(0.0, 10_000.0);
        assert_eq!(camera.pitch(), -MAX_PITCH);
    }

    #[test]
    fn test_move_uses_speed() {
        let mut camera = Camera::default();
        let start = camera.position;
        camera.move_local(-Vec3::Z, 1.0, 1.0);
        assert!((camera.position.distance(start) - camera.move_speed).abs() < 1e-5);
    }

    #[test]
    fn test_frustum_sees_ahead_not_behind() {
        let camera = Camera::default();
        let frustum = camera.frustum();
        let ahead = BoundingSphere::new(camera.position + camera.look_direction() * 20.0, 1.0);
        let behind = BoundingSphere::new(camera.position - camera.look_direction() * 20.0, 1.0);

        assert_eq!(frustum.contains_sphere(&ahead), ContainmentType::Contains);
        assert_eq!(frustum.contains_sphere(&behind), ContainmentType::Disjoint);
    }
}
