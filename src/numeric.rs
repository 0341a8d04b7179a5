use crate::fixed::{FastFixed, Fixed};
use std::fmt::{Debug, Display};
use std::ops::{Add, Div, Mul, Neg, Sub};

/// Shared contract of the pressure, velocity, and velocity-flow slots:
/// a totally ordered value scalar closed under arithmetic, convertible
/// to and from a real, and printable in a form its `parse` reads back.
pub trait Num:
    Copy
    + Default
    + Debug
    + Display
    + PartialEq
    + PartialOrd
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
{
    fn from_f64(value: f64) -> Self;
    fn to_f64(self) -> f64;
    fn abs(self) -> Self;

    fn zero() -> Self {
        Self::default()
    }

    /// Mixed operation with a real, converting through f64.
    fn scale(self, factor: f64) -> Self {
        Self::from_f64(self.to_f64() * factor)
    }

    fn parse(text: &str) -> Option<Self> {
        text.parse::<f64>().ok().map(Self::from_f64)
    }
}

/// Explicit conversion between numeric slots. Every cross-slot
/// assignment in the engine goes through here.
pub fn cast<Src: Num, Dst: Num>(value: Src) -> Dst {
    Dst::from_f64(value.to_f64())
}

impl Num for f32 {
    fn from_f64(value: f64) -> Self {
        value as f32
    }

    fn to_f64(self) -> f64 {
        self as f64
    }

    fn abs(self) -> Self {
        f32::abs(self)
    }
}

impl Num for f64 {
    fn from_f64(value: f64) -> Self {
        value
    }

    fn to_f64(self) -> f64 {
        self
    }

    fn abs(self) -> Self {
        f64::abs(self)
    }
}

impl<const N: u32, const K: u32> Num for Fixed<N, K> {
    fn from_f64(value: f64) -> Self {
        Self::from_real(value)
    }

    fn to_f64(self) -> f64 {
        self.to_real()
    }

    fn abs(self) -> Self {
        Fixed::abs(self)
    }
}

impl<const N: u32, const K: u32> Num for FastFixed<N, K> {
    fn from_f64(value: f64) -> Self {
        Self::from_real(value)
    }

    fn to_f64(self) -> f64 {
        self.to_real()
    }

    fn abs(self) -> Self {
        FastFixed::abs(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cast_converts_through_f64() {
        let p: f64 = 1.25;
        let v: Fixed<32, 16> = cast(p);
        assert_eq!(v.to_real(), 1.25);
        let back: f32 = cast(v);
        assert_eq!(back, 1.25);
    }

    #[test]
    fn scale_matches_real_product() {
        assert_eq!(2.0f64.scale(0.8), 1.6);
        let fixed = Fixed::<32, 16>::from_real(2.0).scale(0.8);
        assert_eq!(fixed.raw(), (1.6 * 65536.0) as i64);
    }

    #[test]
    fn parse_inverts_display_for_floats() {
        let values = [0.0f64, 0.1, -3.75, 1e-9];
        for v in values {
            let text = v.to_string();
            assert_eq!(f64::parse(&text), Some(v));
        }
        let single = 0.1f32;
        assert_eq!(f32::parse(&single.to_string()), Some(single));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert_eq!(f64::parse("not-a-number"), None);
        assert_eq!(Fixed::<32, 16>::parse(""), None);
    }

    #[test]
    fn zero_is_default() {
        assert_eq!(f32::zero(), 0.0);
        assert_eq!(Fixed::<32, 16>::zero().raw(), 0);
    }
}
