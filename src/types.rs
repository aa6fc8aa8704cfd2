// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Wirenet Simulation Core - Type Definitions

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

// ─── Identifiers ────────────────────────────────────────────────────────────

/// Stable packet identity. Packets compare equal by id only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PacketId(pub u64);

impl fmt::Display for PacketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// Arena index of a system inside the live network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SystemId(pub u32);

impl SystemId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Arena index of a wire inside the live network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WireId(pub u32);

impl WireId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for WireId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "w{}", self.0)
    }
}

// ─── Port Direction / Handle ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortDirection {
    Input,
    Output,
}

/// Non-owning handle to a port: owning system, side, and position in the
/// system's ordered port list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PortRef {
    pub system: SystemId,
    pub direction: PortDirection,
    pub index: usize,
}

impl PortRef {
    pub fn input(system: SystemId, index: usize) -> Self {
        Self { system, direction: PortDirection::Input, index }
    }

    pub fn output(system: SystemId, index: usize) -> Self {
        Self { system, direction: PortDirection::Output, index }
    }

    pub fn is_input(&self) -> bool {
        self.direction == PortDirection::Input
    }
}

impl fmt::Display for PortRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let side = match self.direction {
            PortDirection::Input => "in",
            PortDirection::Output => "out",
        };
        write!(f, "{}/{}{}", self.system, side, self.index)
    }
}

// ─── Geometry Primitives ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point2D) -> f64 {
        self.distance_sq(other).sqrt()
    }

    pub fn distance_sq(&self, other: &Point2D) -> f64 {
        (self.x - other.x).powi(2) + (self.y - other.y).powi(2)
    }

    /// Linear interpolation towards `other`; `t` is not clamped.
    pub fn lerp(&self, other: &Point2D, t: f64) -> Point2D {
        Point2D::new(self.x + (other.x - self.x) * t, self.y + (other.y - self.y) * t)
    }

    pub fn offset(&self, v: Vec2D) -> Point2D {
        Point2D::new(self.x + v.x, self.y + v.y)
    }
}

impl Sub for Point2D {
    type Output = Vec2D;
    fn sub(self, rhs: Self) -> Vec2D {
        Vec2D::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Add<Vec2D> for Point2D {
    type Output = Point2D;
    fn add(self, rhs: Vec2D) -> Point2D {
        self.offset(rhs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2D {
    pub x: f64,
    pub y: f64,
}

impl Vec2D {
    pub const ZERO: Vec2D = Vec2D { x: 0.0, y: 0.0 };

    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    /// Unit vector in the same direction, or zero for a zero vector.
    pub fn normalized(&self) -> Vec2D {
        let m = self.magnitude();
        if m <= f64::EPSILON {
            Vec2D::ZERO
        } else {
            Vec2D::new(self.x / m, self.y / m)
        }
    }

    pub fn scale(&self, k: f64) -> Vec2D {
        Vec2D::new(self.x * k, self.y * k)
    }

    /// Counter-clockwise perpendicular.
    pub fn perpendicular(&self) -> Vec2D {
        Vec2D::new(-self.y, self.x)
    }

    pub fn dot(&self, other: &Vec2D) -> f64 {
        self.x * other.x + self.y * other.y
    }
}

// ─── Port Shape ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PortShape {
    Square = 0,
    Triangle = 1,
    Hexagon = 2,
}

impl PortShape {
    pub const ALL: [PortShape; 3] = [PortShape::Square, PortShape::Triangle, PortShape::Hexagon];
}

// ─── Packet Type ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PacketType {
    SquareMessenger,
    TriangleMessenger,
    SmallMessenger,
    Confidential,
    ConfidentialProtected,
    BulkSmall,
    BulkLarge,
    BitPacket,
    Protected,
    Trojan,
}

// ─── System Kind ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemKind {
    Normal,
    Reference,
    Spy,
    Saboteur,
    Vpn,
    AntiTrojan,
    Distributor,
    Merger,
}

impl Default for SystemKind {
    fn default() -> Self { SystemKind::Normal }
}

// ─── Loss Cause ─────────────────────────────────────────────────────────────

/// Why a packet was lost. Every loss is a terminal state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossCause {
    OffPath,
    TravelTimeExceeded,
    NoiseOverflow,
    StorageOverflow,
    BulkCollateral,
    SpyInterception,
    BitAtReference,
    SpeedDamage,
    /// The system a returning packet was heading back to has failed.
    Stranded,
    UnknownSystem,
}

// ─── Packet Location ────────────────────────────────────────────────────────

/// The single container currently owning a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PacketLocation {
    /// Returning list: packets travelling back to a source system.
    Returning,
    Wire { wire: WireId },
    Port { port: PortRef },
    Storage { system: SystemId },
    MergeBuffer { system: SystemId },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_helpers() {
        let v = Vec2D::new(3.0, 4.0);
        assert!((v.magnitude() - 5.0).abs() < 1e-12);
        let n = v.normalized();
        assert!((n.magnitude() - 1.0).abs() < 1e-12);
        assert_eq!(Vec2D::ZERO.normalized(), Vec2D::ZERO);
        assert_eq!(v.perpendicular(), Vec2D::new(-4.0, 3.0));
    }

    #[test]
    fn test_point_ops() {
        let a = Point2D::new(0.0, 0.0);
        let b = Point2D::new(10.0, 0.0);
        assert_eq!(a.lerp(&b, 0.25), Point2D::new(2.5, 0.0));
        assert_eq!(b - a, Vec2D::new(10.0, 0.0));
        assert_eq!(a + Vec2D::new(1.0, 2.0), Point2D::new(1.0, 2.0));
    }

    #[test]
    fn test_packet_type_serde_names() {
        let json = serde_json::to_string(&PacketType::BulkSmall).unwrap();
        assert_eq!(json, "\"BULK_SMALL\"");
        let kind: SystemKind = serde_json::from_str("\"anti_trojan\"").unwrap();
        assert_eq!(kind, SystemKind::AntiTrojan);
    }
}
