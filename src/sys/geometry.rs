//! Small extensions over the CoreGraphics geometry types.

use objc2_core_foundation as ic;
use serde::{Deserialize, Deserializer, Serialize};
use serde_with::{DeserializeAs, SerializeAs};

pub trait IsWithin {
    fn is_within(&self, how_much: f64, other: Self) -> bool;
}

impl IsWithin for ic::CGRect {
    fn is_within(&self, how_much: f64, other: Self) -> bool {
        self.origin.is_within(how_much, other.origin) && self.size.is_within(how_much, other.size)
    }
}

impl IsWithin for ic::CGPoint {
    fn is_within(&self, how_much: f64, other: Self) -> bool {
        self.x.is_within(how_much, other.x) && self.y.is_within(how_much, other.y)
    }
}

impl IsWithin for ic::CGSize {
    fn is_within(&self, how_much: f64, other: Self) -> bool {
        self.width.is_within(how_much, other.width) && self.height.is_within(how_much, other.height)
    }
}

impl IsWithin for f64 {
    fn is_within(&self, how_much: f64, other: Self) -> bool { (self - other).abs() < how_much }
}

pub trait SameAs: IsWithin + Sized {
    fn same_as(&self, other: Self) -> bool { self.is_within(0.1, other) }
}

impl SameAs for ic::CGRect {}
impl SameAs for ic::CGPoint {}
impl SameAs for ic::CGSize {}
impl SameAs for f64 {}

pub trait CGRectExt {
    fn union(&self, other: &Self) -> Self;
    fn mid_x(&self) -> f64;
    fn center(&self) -> ic::CGPoint;
    /// Midpoint of the left edge.
    fn left_edge_mid(&self) -> ic::CGPoint;
    /// Midpoint of the right edge.
    fn right_edge_mid(&self) -> ic::CGPoint;
    fn left(&self) -> f64;
    fn right(&self) -> f64;
}

impl CGRectExt for ic::CGRect {
    fn union(&self, other: &Self) -> Self {
        let min_x = f64::min(self.min().x, other.min().x);
        let min_y = f64::min(self.min().y, other.min().y);
        let max_x = f64::max(self.max().x, other.max().x);
        let max_y = f64::max(self.max().y, other.max().y);
        ic::CGRect {
            origin: ic::CGPoint::new(min_x, min_y),
            size: ic::CGSize::new(max_x - min_x, max_y - min_y),
        }
    }

    fn mid_x(&self) -> f64 { self.origin.x + self.size.width * 0.5 }

    fn center(&self) -> ic::CGPoint {
        ic::CGPoint::new(self.mid_x(), self.origin.y + self.size.height * 0.5)
    }

    fn left_edge_mid(&self) -> ic::CGPoint {
        ic::CGPoint::new(self.left(), self.origin.y + self.size.height * 0.5)
    }

    fn right_edge_mid(&self) -> ic::CGPoint {
        ic::CGPoint::new(self.right(), self.origin.y + self.size.height * 0.5)
    }

    fn left(&self) -> f64 { self.origin.x }

    fn right(&self) -> f64 { self.origin.x + self.size.width }
}

#[derive(Serialize, Deserialize)]
#[serde(remote = "ic::CGRect")]
pub struct CGRectDef {
    #[serde(with = "CGPointDef")]
    pub origin: ic::CGPoint,
    #[serde(with = "CGSizeDef")]
    pub size: ic::CGSize,
}

#[derive(Serialize, Deserialize)]
#[serde(remote = "ic::CGPoint")]
pub struct CGPointDef {
    pub x: f64,
    pub y: f64,
}

#[derive(Serialize, Deserialize)]
#[serde(remote = "ic::CGSize")]
pub struct CGSizeDef {
    pub width: f64,
    pub height: f64,
}

impl SerializeAs<ic::CGRect> for CGRectDef {
    fn serialize_as<S>(value: &ic::CGRect, serializer: S) -> Result<S::Ok, S::Error>
    where S: serde::Serializer {
        CGRectDef::serialize(value, serializer)
    }
}

impl<'de> DeserializeAs<'de, ic::CGRect> for CGRectDef {
    fn deserialize_as<D>(deserializer: D) -> Result<ic::CGRect, D::Error>
    where D: Deserializer<'de> {
        CGRectDef::deserialize(deserializer)
    }
}
