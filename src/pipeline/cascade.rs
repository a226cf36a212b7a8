//! Shadow cascade math
//!
//! Pure functions shared by the shadow map stage, which builds the cascades,
//! and the standard pass, whose fragment logic picks one cascade per fragment.
//!
//! # Provided Functions
//!
//! - Cascade split computation (practical split scheme)
//! - Frustum corner extraction in world space
//! - Orthographic light matrices fitted to a frustum slice
//! - Cascade selection and the lit/shadowed decision

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3, Vec4};

use crate::scene::BoundingFrustum;

/// Maximum cascade count
pub const MAX_CASCADES: usize = 3;

/// One of the three cascades, nearest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CascadeLevel {
    Near,
    Mid,
    Far,
}

impl CascadeLevel {
    pub const ALL: [CascadeLevel; MAX_CASCADES] =
        [CascadeLevel::Near, CascadeLevel::Mid, CascadeLevel::Far];

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

/// Camera clip-space depth below which each cascade applies.
///
/// Laid out as the `DepthLimits` constant buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct DepthCascadeLimits {
    pub near: f32,
    pub mid: f32,
    pub far: f32,
    pub _padding: f32,
}

impl DepthCascadeLimits {
    pub fn new(near: f32, mid: f32, far: f32) -> Self {
        Self {
            near,
            mid,
            far,
            _padding: 0.0,
        }
    }

    pub fn limit(&self, level: CascadeLevel) -> f32 {
        match level {
            CascadeLevel::Near => self.near,
            CascadeLevel::Mid => self.mid,
            CascadeLevel::Far => self.far,
        }
    }
}

fn in_unit_range(v: f32) -> bool {
    (0.0..=1.0).contains(&v)
}

/// Pick the cascade covering a fragment.
///
/// Cascades are tried near, mid, far. One matches when `depth` is below its
/// limit and the fragment's texture coordinates in that cascade lie within
/// [0, 1] on both axes. `None` means no shadow coverage.
pub fn select_cascade(
    depth: f32,
    limits: &DepthCascadeLimits,
    coords: [Vec2; MAX_CASCADES],
) -> Option<CascadeLevel> {
    CascadeLevel::ALL.into_iter().find(|level| {
        let uv = coords[level.index()];
        depth < limits.limit(*level) && in_unit_range(uv.x) && in_unit_range(uv.y)
    })
}

/// Light clip-space position to shadow map texture coordinates
pub fn clip_to_texture_coordinates(clip: Vec4) -> Vec2 {
    Vec2::new(clip.x / clip.w / 2.0 + 0.5, -clip.y / clip.w / 2.0 + 0.5)
}

/// Normalized depth of a light clip-space position
pub fn light_depth(clip: Vec4) -> f32 {
    clip.z / clip.w
}

/// Whether a fragment at `light_depth` is in front of the stored occluder
pub fn is_lit(light_depth: f32, stored_depth: f32, bias: f32) -> bool {
    light_depth - bias < stored_depth
}

/// Camera clip-space depth of a point `distance` in front of the camera
pub fn depth_limit_for_distance(projection: Mat4, distance: f32) -> f32 {
    (projection * Vec4::new(0.0, 0.0, -distance, 1.0)).z
}

/// Inputs of the standard pass fragment logic
#[derive(Debug, Clone, Copy)]
pub struct ShadowFragment {
    /// Camera clip-space z, before the perspective divide
    pub depth: f32,
    /// Fragment position in each cascade's light clip space
    pub light_clip: [Vec4; MAX_CASCADES],
    /// World-space unit normal
    pub normal: Vec3,
    pub surface: Vec4,
}

/// Directional lighting with cascaded shadows, as the standard pass computes it
#[derive(Debug, Clone, Copy)]
pub struct ShadowLighting {
    pub bias: f32,
    pub ambient: f32,
    pub light_direction: Vec3,
    pub light_color: Vec4,
    pub limits: DepthCascadeLimits,
}

impl ShadowLighting {
    /// Color of a fragment; `sample_depth` reads a cascade's shadow map
    pub fn shade<F>(&self, fragment: &ShadowFragment, mut sample_depth: F) -> Vec4
    where
        F: FnMut(CascadeLevel, Vec2) -> f32,
    {
        let ambient = Vec4::new(self.ambient, self.ambient, self.ambient, 1.0) * fragment.surface;
        let coords = fragment.light_clip.map(clip_to_texture_coordinates);
        let intensity = fragment.normal.dot(-self.light_direction).clamp(0.0, 1.0);
        let lit = fragment.surface * intensity * self.light_color;

        match select_cascade(fragment.depth, &self.limits, coords) {
            Some(level) => {
                let index = level.index();
                let stored = sample_depth(level, coords[index]);
                let depth = light_depth(fragment.light_clip[index]);
                if is_lit(depth, stored, self.bias) && intensity > 0.0 {
                    lit
                } else {
                    ambient
                }
            }
            None if intensity > 0.0 => lit,
            None => ambient,
        }
    }
}

/// Split distances of the practical split scheme.
///
/// `lambda` blends between uniform (`0.0`) and logarithmic (`1.0`)
/// distribution. Returns the far distance of each cascade; entries past
/// `cascade_count` are zero and the last used one is `far`.
pub fn compute_cascade_splits(
    cascade_count: usize,
    near: f32,
    far: f32,
    lambda: f32,
) -> [f32; MAX_CASCADES] {
    let mut splits = [0.0f32; MAX_CASCADES];
    let n = cascade_count.min(MAX_CASCADES);

    for (i, split) in splits.iter_mut().enumerate().take(n) {
        let p = (i + 1) as f32 / n as f32;
        let log_split = near * (far / near).powf(p);
        let uni_split = near + (far - near) * p;
        *split = lambda * log_split + (1.0 - lambda) * uni_split;
    }

    if n > 0 {
        splits[n - 1] = far;
    }
    splits
}

/// World-space corners of a perspective frustum slice, near face first
pub fn frustum_corners_world(
    view: Mat4,
    projection: Mat4,
    slice_near: f32,
    slice_far: f32,
) -> [Vec3; 8] {
    let tan_half_fov = 1.0 / projection.y_axis.y;
    let aspect = projection.y_axis.y / projection.x_axis.x;

    let h_near = tan_half_fov * slice_near;
    let w_near = h_near * aspect;
    let h_far = tan_half_fov * slice_far;
    let w_far = h_far * aspect;

    let corners_view = [
        Vec3::new(-w_near, -h_near, -slice_near),
        Vec3::new(w_near, -h_near, -slice_near),
        Vec3::new(w_near, h_near, -slice_near),
        Vec3::new(-w_near, h_near, -slice_near),
        Vec3::new(-w_far, -h_far, -slice_far),
        Vec3::new(w_far, -h_far, -slice_far),
        Vec3::new(w_far, h_far, -slice_far),
        Vec3::new(-w_far, h_far, -slice_far),
    ];

    let inv_view = view.inverse();
    corners_view.map(|c| inv_view.transform_point3(c))
}

/// Light matrices of one cascade
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CascadeView {
    pub view: Mat4,
    pub projection: Mat4,
    /// Light position used as the viewpoint of the cascade's render queue
    pub eye: Vec3,
}

impl CascadeView {
    /// Orthographic box of half size `extent` looking along `direction` from `eye`
    pub fn orthographic(eye: Vec3, direction: Vec3, extent: f32, depth: f32) -> Self {
        let direction = safe_direction(direction);
        let view = Mat4::look_at_rh(eye, eye + direction, up_for(direction));
        let projection = Mat4::orthographic_rh(-extent, extent, -extent, extent, 0.0, depth);
        Self {
            view,
            projection,
            eye,
        }
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }

    /// Culling volume of the cascade, open towards the light
    pub fn frustum(&self) -> BoundingFrustum {
        BoundingFrustum::from_matrix_without_near(self.view_projection())
    }
}

impl Default for CascadeView {
    fn default() -> Self {
        Self {
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            eye: Vec3::ZERO,
        }
    }
}

fn safe_direction(direction: Vec3) -> Vec3 {
    if direction.length_squared() > 1e-6 {
        direction.normalize()
    } else {
        -Vec3::Z
    }
}

fn up_for(direction: Vec3) -> Vec3 {
    if direction.y.abs() > 0.99 {
        Vec3::X
    } else {
        Vec3::Y
    }
}

/// Fit an orthographic light box around a frustum slice.
///
/// The box is extended towards the light by `caster_extension` so casters
/// outside the slice still occlude it, and its bounds are snapped to the
/// texel grid to prevent shimmer when the camera moves.
pub fn build_cascade_view_projection(
    light_direction: Vec3,
    frustum_corners: &[Vec3; 8],
    shadow_map_size: u32,
    caster_extension: f32,
) -> CascadeView {
    let direction = safe_direction(light_direction);
    let center = frustum_corners.iter().copied().sum::<Vec3>() / 8.0;
    let view = Mat4::look_at_rh(center - direction, center, up_for(direction));

    let mut ls_min = Vec3::splat(f32::MAX);
    let mut ls_max = Vec3::splat(f32::MIN);
    for c in frustum_corners {
        let ls = view.transform_point3(*c);
        ls_min = ls_min.min(ls);
        ls_max = ls_max.max(ls);
    }

    // In the RH light view, ls_max.z faces the light
    let z_range = (ls_max.z - ls_min.z).max(1.0);
    ls_max.z += caster_extension.max(z_range);
    ls_min.z -= z_range;

    let texel_x = (ls_max.x - ls_min.x) / shadow_map_size as f32;
    let texel_y = (ls_max.y - ls_min.y) / shadow_map_size as f32;
    if texel_x > 0.0 {
        ls_min.x = (ls_min.x / texel_x).floor() * texel_x;
        ls_max.x = (ls_max.x / texel_x).ceil() * texel_x;
    }
    if texel_y > 0.0 {
        ls_min.y = (ls_min.y / texel_y).floor() * texel_y;
        ls_max.y = (ls_max.y / texel_y).ceil() * texel_y;
    }

    let projection =
        Mat4::orthographic_rh(ls_min.x, ls_max.x, ls_min.y, ls_max.y, -ls_max.z, -ls_min.z);
    let eye = view.inverse().transform_point3(Vec3::new(
        (ls_min.x + ls_max.x) / 2.0,
        (ls_min.y + ls_max.y) / 2.0,
        ls_max.z,
    ));

    CascadeView {
        view,
        projection,
        eye,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IN_RANGE: [Vec2; 3] = [Vec2::new(0.5, 0.5); 3];

    fn limits() -> DepthCascadeLimits {
        DepthCascadeLimits::new(0.3, 0.6, 0.9)
    }

    #[test]
    fn test_select_cascade_branches() {
        let limits = limits();
        assert_eq!(select_cascade(0.1, &limits, IN_RANGE), Some(CascadeLevel::Near));
        assert_eq!(select_cascade(0.5, &limits, IN_RANGE), Some(CascadeLevel::Mid));
        assert_eq!(select_cascade(0.8, &limits, IN_RANGE), Some(CascadeLevel::Far));
        assert_eq!(select_cascade(0.95, &limits, IN_RANGE), None);
    }

    #[test]
    fn test_select_cascade_falls_through_out_of_range_coords() {
        let coords = [Vec2::new(1.2, 0.5), Vec2::new(0.5, -0.1), Vec2::new(1.0, 0.0)];
        assert_eq!(select_cascade(0.1, &limits(), coords), Some(CascadeLevel::Far));
    }

    #[test]
    fn test_limit_is_exclusive() {
        assert_eq!(select_cascade(0.3, &limits(), IN_RANGE), Some(CascadeLevel::Mid));
        assert_eq!(select_cascade(0.9, &limits(), IN_RANGE), None);
    }

    #[test]
    fn test_zero_limits_select_nothing() {
        let limits = DepthCascadeLimits::new(0.3, 0.0, 0.0);
        assert_eq!(select_cascade(0.5, &limits, IN_RANGE), None);
    }

    #[test]
    fn test_clip_to_texture_coordinates() {
        assert_eq!(
            clip_to_texture_coordinates(Vec4::new(0.0, 0.0, 0.5, 1.0)),
            Vec2::new(0.5, 0.5)
        );
        assert_eq!(
            clip_to_texture_coordinates(Vec4::new(-2.0, 2.0, 0.0, 2.0)),
            Vec2::new(0.0, 0.0)
        );
        assert_eq!(light_depth(Vec4::new(0.0, 0.0, 1.0, 4.0)), 0.25);
    }

    #[test]
    fn test_bias_decides_lit() {
        assert!(is_lit(0.5004, 0.5, 0.0005));
        assert!(!is_lit(0.5006, 0.5, 0.0005));
    }

    fn fragment(depth: f32) -> ShadowFragment {
        ShadowFragment {
            depth,
            light_clip: [Vec4::new(0.0, 0.0, 0.5, 1.0); 3],
            normal: Vec3::Y,
            surface: Vec4::ONE,
        }
    }

    fn lighting() -> ShadowLighting {
        ShadowLighting {
            bias: 0.0005,
            ambient: 0.3,
            light_direction: -Vec3::Y,
            light_color: Vec4::ONE,
            limits: limits(),
        }
    }

    #[test]
    fn test_shade_shadowed_and_lit() {
        let lighting = lighting();
        let shadowed = lighting.shade(&fragment(0.1), |_, _| 0.2);
        assert_eq!(shadowed, Vec4::new(0.3, 0.3, 0.3, 1.0));

        let lit = lighting.shade(&fragment(0.1), |_, _| 1.0);
        assert_eq!(lit, Vec4::ONE);
    }

    #[test]
    fn test_shade_outside_cascades_never_samples() {
        let color = lighting().shade(&fragment(0.99), |_, _| panic!("sampled a shadow map"));
        assert_eq!(color, Vec4::ONE);
    }

    #[test]
    fn test_shade_samples_selected_cascade() {
        let mut sampled = Vec::new();
        lighting().shade(&fragment(0.5), |level, _| {
            sampled.push(level);
            1.0
        });
        assert_eq!(sampled, vec![CascadeLevel::Mid]);
    }

    #[test]
    fn test_cascade_splits() {
        let splits = compute_cascade_splits(3, 1.0, 100.0, 0.5);
        assert!(splits[0] < splits[1] && splits[1] < splits[2]);
        assert_eq!(splits[2], 100.0);

        let single = compute_cascade_splits(1, 1.0, 100.0, 0.5);
        assert_eq!(single, [100.0, 0.0, 0.0]);
    }

    #[test]
    fn test_depth_limits_increase_with_distance() {
        let projection = Mat4::perspective_rh(1.0, 16.0 / 9.0, 1.0, 250.0);
        let near = depth_limit_for_distance(projection, 10.0);
        let far = depth_limit_for_distance(projection, 100.0);
        assert!(near < far);
        assert!((depth_limit_for_distance(projection, 1.0)).abs() < 1e-5);
    }

    #[test]
    fn test_cascade_covers_slice() {
        let view = Mat4::look_at_rh(Vec3::new(0.0, 3.0, 0.0), Vec3::new(0.0, 2.7, -1.0), Vec3::Y);
        let projection = Mat4::perspective_rh(1.0, 16.0 / 9.0, 1.0, 250.0);
        let corners = frustum_corners_world(view, projection, 1.0, 20.0);
        let cascade = build_cascade_view_projection(
            Vec3::new(-0.3, -1.0, -0.3),
            &corners,
            2048,
            30.0,
        );

        let vp = cascade.view_projection();
        for corner in corners {
            let clip = vp * corner.extend(1.0);
            let uv = clip_to_texture_coordinates(clip);
            assert!((-1e-3..=1.0 + 1e-3).contains(&uv.x), "uv {uv:?}");
            assert!((-1e-3..=1.0 + 1e-3).contains(&uv.y), "uv {uv:?}");
            let depth = light_depth(clip);
            assert!((-1e-3..=1.0 + 1e-3).contains(&depth), "depth {depth}");
        }
    }
}
