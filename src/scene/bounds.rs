//! Bounding volumes for culling

use glam::{Mat4, Vec3, Vec4};

/// Result of a containment test
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainmentType {
    Disjoint,
    Intersects,
    Contains,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingSphere {
    pub center: Vec3,
    pub radius: f32,
}

impl BoundingSphere {
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Sphere around the box bounding `points` that encloses all of them
    pub fn from_points(points: impl IntoIterator<Item = Vec3> + Clone) -> Self {
        let Some((min, max)) = points
            .clone()
            .into_iter()
            .fold(None, |bounds: Option<(Vec3, Vec3)>, p| match bounds {
                Some((min, max)) => Some((min.min(p), max.max(p))),
                None => Some((p, p)),
            })
        else {
            return Self::new(Vec3::ZERO, 0.0);
        };
        let center = (min + max) * 0.5;
        let radius = points
            .into_iter()
            .map(|p| p.distance(center))
            .fold(0.0, f32::max);
        Self { center, radius }
    }

    /// Sphere placed in the world by a uniform scale and a translation
    pub fn placed(&self, position: Vec3, scale: f32) -> Self {
        Self {
            center: self.center * scale + position,
            radius: self.radius * scale,
        }
    }
}

/// Six normalized planes (left, right, bottom, top, near, far) pointing inwards
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingFrustum {
    planes: [Vec4; 6],
}

/// Plane every point lies in front of
const OPEN_PLANE: Vec4 = Vec4::new(0.0, 0.0, 0.0, f32::MAX);

impl BoundingFrustum {
    /// Extract the planes of a view-projection matrix with [0, 1] clip depth
    pub fn from_matrix(m: Mat4) -> Self {
        let rows = [m.row(0), m.row(1), m.row(2), m.row(3)];
        let mut planes = [
            rows[3] + rows[0],
            rows[3] - rows[0],
            rows[3] + rows[1],
            rows[3] - rows[1],
            rows[2],
            rows[3] - rows[2],
        ];
        for plane in &mut planes {
            let length = plane.truncate().length();
            if length > 0.0 {
                *plane /= length;
            }
        }
        Self { planes }
    }

    /// Like [`BoundingFrustum::from_matrix`] but unbounded towards the eye,
    /// so casters between the light and the light box are kept.
    pub fn from_matrix_without_near(m: Mat4) -> Self {
        let mut frustum = Self::from_matrix(m);
        frustum.planes[4] = OPEN_PLANE;
        frustum
    }

    /// Frustum that contains everything
    pub fn everything() -> Self {
        Self {
            planes: [OPEN_PLANE; 6],
        }
    }

    pub fn planes(&self) -> &[Vec4; 6] {
        &self.planes
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.truncate().dot(point) + plane.w >= 0.0)
    }

    pub fn contains_sphere(&self, sphere: &BoundingSphere) -> ContainmentType {
        let mut intersects = false;
        for plane in &self.planes {
            let distance = plane.truncate().dot(sphere.center) + plane.w;
            if distance < -sphere.radius {
                return ContainmentType::Disjoint;
            }
            if distance < sphere.radius {
                intersects = true;
            }
        }
        if intersects {
            ContainmentType::Intersects
        } else {
            ContainmentType::Contains
        }
    }
}

impl Default for BoundingFrustum {
    fn default() -> Self {
        Self::everything()
    }
}
