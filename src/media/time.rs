//! Wrapping 32-bit media time arithmetic
//!
//! Media timestamps are milliseconds on a 32-bit clock that rolls over.
//! Compare them only through [`distance`]: raw `<` is wrong near the wrap.

/// Signed distance from `a` to `b` on the 32-bit circle, i.e. `b - a`
/// taking the shortest path. Positive means `b` is later than `a`.
pub fn distance(a: u32, b: u32) -> i32 {
    b.wrapping_sub(a) as i32
}

/// Whether `b` is strictly later than `a`.
pub fn is_later(a: u32, b: u32) -> bool {
    distance(a, b) > 0
}

/// The later of two timestamps.
pub fn latest(a: u32, b: u32) -> u32 {
    if is_later(a, b) {
        b
    } else {
        a
    }
}

/// Distance from `a` to `b` clamped to the unsigned 16-bit span used by
/// segment durations. Negative distances clamp to zero.
pub fn span16(a: u32, b: u32) -> u16 {
    distance(a, b).clamp(0, u16::MAX as i32) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_zero() {
        for t in [0u32, 1, 0x7FFF_FFFF, 0x8000_0000, u32::MAX] {
            assert_eq!(distance(t, t), 0);
        }
    }

    #[test]
    fn test_distance_antisymmetric() {
        let samples = [0u32, 1, 20, 1000, 0x7FFF_FFFE, 0x8000_0001, 0xFFFF_FFFE, u32::MAX];
        for &a in &samples {
            for &b in &samples {
                // -i32::MIN overflows; that single pair is exactly half the circle
                if distance(a, b) == i32::MIN {
                    continue;
                }
                assert_eq!(distance(a, b), -distance(b, a), "a={a:#x} b={b:#x}");
            }
        }
    }

    #[test]
    fn test_distance_across_wrap() {
        assert_eq!(distance(0xFFFF_FFFE, 2), 4);
        assert_eq!(distance(2, 0xFFFF_FFFE), -4);
        assert!(is_later(0xFFFF_FFFE, 2));
        assert!(!is_later(2, 0xFFFF_FFFE));
    }

    #[test]
    fn test_latest() {
        assert_eq!(latest(10, 20), 20);
        assert_eq!(latest(20, 10), 20);
        assert_eq!(latest(u32::MAX, 5), 5);
    }

    #[test]
    fn test_span16() {
        assert_eq!(span16(0, 6000), 6000);
        assert_eq!(span16(100, 50), 0);
        assert_eq!(span16(0, 0x1_0000), u16::MAX);
        assert_eq!(span16(0xFFFF_FF00, 0x100), 0x200);
    }
}
