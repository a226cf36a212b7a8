//! Packed draw-order keys

/// Totally ordered 64-bit draw-order key. Lower keys render first.
///
/// The high 32 bits hold the IEEE-754 bits of a non-negative distance, which
/// compare like the distances themselves; the low 32 bits hold a tie-break,
/// usually a material id so equal-distance draws group by material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct RenderOrderKey(u64);

impl RenderOrderKey {
    /// Renders after every key produced by [`RenderOrderKey::create`]
    pub const LAST: RenderOrderKey = RenderOrderKey(u64::MAX);

    /// Pack a view distance and a tie-break.
    ///
    /// Negative, negative-zero and NaN distances count as zero. The largest
    /// distance, `+inf`, packs to `0x7F80_0000` so the result is always below
    /// [`RenderOrderKey::LAST`].
    pub fn create(distance: f32, tiebreak: u32) -> Self {
        let distance = if distance > 0.0 { distance } else { 0.0 };
        Self(((distance.to_bits() as u64) << 32) | tiebreak as u64)
    }

    /// Key at distance zero, ordered only by `tiebreak`
    pub fn from_tiebreak(tiebreak: u32) -> Self {
        Self(tiebreak as u64)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    /// Distance packed into the high bits
    pub fn distance(&self) -> f32 {
        f32::from_bits((self.0 >> 32) as u32)
    }

    pub fn tiebreak(&self) -> u32 {
        self.0 as u32
    }
}

impl From<u64> for RenderOrderKey {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_dominates_tiebreak() {
        let near = RenderOrderKey::create(1.0, u32::MAX);
        let far = RenderOrderKey::create(1.5, 0);
        assert!(near < far);
    }

    #[test]
    fn test_tiebreak_orders_equal_distance() {
        let a = RenderOrderKey::create(10.0, 3);
        let b = RenderOrderKey::create(10.0, 7);
        assert!(a < b);
        assert_eq!(a.distance(), 10.0);
        assert_eq!(b.tiebreak(), 7);
    }

    #[test]
    fn test_degenerate_distances_clamp_to_zero() {
        for distance in [-4.0, -0.0, f32::NAN, f32::NEG_INFINITY] {
            assert_eq!(
                RenderOrderKey::create(distance, 9),
                RenderOrderKey::from_tiebreak(9)
            );
        }
    }

    #[test]
    fn test_last_sorts_after_everything() {
        let largest = RenderOrderKey::create(f32::INFINITY, u32::MAX);
        assert!(largest < RenderOrderKey::LAST);
        assert!(RenderOrderKey::default() < RenderOrderKey::LAST);
    }
}
