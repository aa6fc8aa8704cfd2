// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Wirenet Simulation Core - Packets

//! Packet entity and the per-type capability table.
//!
//! Packet variants form a closed set; everything that differs between them
//! (size, coin value, speed, shape compatibility, speed profile) is looked up
//! from [`PacketType`] rather than dispatched through separate types.

use serde::{Deserialize, Serialize};

use crate::types::{PacketId, PacketType, Point2D, PortShape, SystemId, Vec2D, WireId};

// ─── Constants ───────────────────────────────────────────────────────────────

/// Acceleration magnitude applied by accelerating/decelerating profiles (px/s²).
pub const PROFILE_ACCELERATION: f64 = 40.0;

/// Speed bounds while a profile changes speed (px/s).
pub const MIN_SPEED: f64 = 20.0;
pub const MAX_SPEED: f64 = 220.0;

/// Number of distinct bit-group color tags.
pub const BIT_COLOR_COUNT: u8 = 6;

// ─── Capability table ────────────────────────────────────────────────────────

impl PacketType {
    /// Size of a freshly created packet of this type.
    /// Protected packets take twice their wrapped type's size instead.
    pub fn default_size(&self) -> u32 {
        match self {
            Self::SmallMessenger | Self::BitPacket => 1,
            Self::SquareMessenger | Self::Trojan | Self::Protected => 2,
            Self::TriangleMessenger => 3,
            Self::Confidential => 4,
            Self::ConfidentialProtected => 6,
            Self::BulkSmall => 8,
            Self::BulkLarge => 10,
        }
    }

    pub fn coin_value(&self) -> u32 {
        match self {
            Self::SmallMessenger => 1,
            Self::SquareMessenger => 2,
            Self::TriangleMessenger | Self::Confidential => 3,
            Self::ConfidentialProtected => 4,
            Self::Protected => 5,
            Self::BulkSmall => 8,
            Self::BulkLarge => 10,
            Self::BitPacket | Self::Trojan => 0,
        }
    }

    pub fn base_speed(&self) -> f64 {
        match self {
            Self::Confidential | Self::ConfidentialProtected | Self::BulkSmall => 60.0,
            Self::BulkLarge => 50.0,
            _ => 70.0,
        }
    }

    /// Port shape this type expects; `None` means any shape fits.
    pub fn shape(&self) -> Option<PortShape> {
        match self {
            Self::SquareMessenger => Some(PortShape::Square),
            Self::TriangleMessenger => Some(PortShape::Triangle),
            Self::SmallMessenger => Some(PortShape::Hexagon),
            _ => None,
        }
    }

    pub fn is_messenger(&self) -> bool {
        matches!(self, Self::SquareMessenger | Self::TriangleMessenger | Self::SmallMessenger)
    }

    pub fn is_bulk(&self) -> bool {
        matches!(self, Self::BulkSmall | Self::BulkLarge)
    }

    pub fn is_confidential(&self) -> bool {
        matches!(self, Self::Confidential | Self::ConfidentialProtected)
    }

    /// Whether leaving through a mismatched port doubles the exit speed.
    pub fn doubles_on_mismatch(&self) -> bool {
        self.is_messenger() || *self == Self::Protected
    }

    /// Wire acceleration after leaving through a compatible or
    /// incompatible port.
    pub fn acceleration(&self, compatible: bool) -> f64 {
        match (self, compatible) {
            (Self::TriangleMessenger, false) => PROFILE_ACCELERATION,
            (Self::SmallMessenger, true) => PROFILE_ACCELERATION,
            (Self::SmallMessenger, false) => -PROFILE_ACCELERATION,
            _ => 0.0,
        }
    }

    /// Messenger a merged bit group turns into, keyed by the group's color.
    pub fn messenger_for_color(color_index: u8) -> PacketType {
        match color_index % 3 {
            0 => Self::SmallMessenger,
            1 => Self::SquareMessenger,
            _ => Self::TriangleMessenger,
        }
    }

    /// Messenger built from `bits` leftover bits of an incomplete group.
    pub fn messenger_for_size(bits: usize) -> PacketType {
        match bits {
            0 | 1 => Self::SmallMessenger,
            2 => Self::SquareMessenger,
            _ => Self::TriangleMessenger,
        }
    }
}

// ─── Packet ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Packet {
    pub id: PacketId,
    pub packet_type: PacketType,
    /// Wrapped type, set only while the packet is Protected.
    pub original_type: Option<PacketType>,
    pub size: u32,
    pub noise: f64,
    pub position: Point2D,
    pub velocity: Vec2D,
    pub travel_time: f64,
    pub max_travel_time: f64,
    path_progress: f64,
    pub base_speed: f64,
    /// Exit-speed modifier picked up while passing through a system.
    pub speed_multiplier: f64,
    /// Signed speed change on the wire (px/s²).
    pub acceleration: f64,
    pub current_wire: Option<WireId>,
    pub source_system: Option<SystemId>,
    pub destination_system: Option<SystemId>,
    pub group_id: Option<u64>,
    pub color_index: Option<u8>,
    pub active: bool,
    pub lost: bool,
    pub reversing: bool,
    pub retry_destination: bool,
    pub coin_award_pending: bool,
    pub processed_by_reference_system: bool,
}

impl PartialEq for Packet {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Packet {}

impl Packet {
    pub fn new(id: PacketId, packet_type: PacketType, position: Point2D, max_travel_time: f64) -> Self {
        Self {
            id,
            packet_type,
            original_type: None,
            size: packet_type.default_size(),
            noise: 0.0,
            position,
            velocity: Vec2D::ZERO,
            travel_time: 0.0,
            max_travel_time,
            path_progress: 0.0,
            base_speed: packet_type.base_speed(),
            speed_multiplier: 1.0,
            acceleration: 0.0,
            current_wire: None,
            source_system: None,
            destination_system: None,
            group_id: None,
            color_index: None,
            active: true,
            lost: false,
            reversing: false,
            retry_destination: false,
            coin_award_pending: false,
            processed_by_reference_system: false,
        }
    }

    pub fn path_progress(&self) -> f64 {
        self.path_progress
    }

    pub fn set_path_progress(&mut self, progress: f64) {
        self.path_progress = progress.clamp(0.0, 1.0);
    }

    pub fn speed(&self) -> f64 {
        self.velocity.magnitude()
    }

    pub fn coin_value(&self) -> u32 {
        self.packet_type.coin_value()
    }

    /// Weight of this packet in loss/injection accounting. Protected packets
    /// count at their unwrapped size.
    pub fn units(&self) -> u32 {
        match (self.packet_type, self.original_type) {
            (PacketType::Protected, Some(_)) => (self.size / 2).max(1),
            _ => self.size,
        }
    }

    pub fn is_on_wire(&self) -> bool {
        self.current_wire.is_some()
    }

    pub fn mark_lost(&mut self) {
        self.lost = true;
        self.deactivate();
    }

    /// Terminal: the packet will not move or be processed again.
    pub fn deactivate(&mut self) {
        self.active = false;
        self.velocity = Vec2D::ZERO;
        self.current_wire = None;
    }

    /// Wrap a messenger into Protected form; size doubles and the messenger
    /// type is remembered. Other types are left unchanged.
    pub fn protect(&mut self) -> bool {
        if !self.packet_type.is_messenger() {
            return false;
        }
        self.original_type = Some(self.packet_type);
        self.packet_type = PacketType::Protected;
        self.size *= 2;
        true
    }

    /// Revert a Protected packet to the type it wrapped.
    pub fn unwrap_protection(&mut self) -> bool {
        match (self.packet_type, self.original_type.take()) {
            (PacketType::Protected, Some(original)) => {
                self.packet_type = original;
                self.size = (self.size / 2).max(1);
                self.base_speed = original.base_speed();
                true
            }
            (_, original) => {
                self.original_type = original;
                false
            }
        }
    }

    /// Change type in place, resetting size and speed to the new type's
    /// defaults. Used by trojan infection and anti-trojan repair.
    pub fn convert_to(&mut self, packet_type: PacketType) {
        self.packet_type = packet_type;
        self.original_type = None;
        self.size = packet_type.default_size();
        self.base_speed = packet_type.base_speed();
    }

    /// Turn around on the current wire: swap the recorded endpoints and
    /// flip the direction of travel.
    pub fn reverse(&mut self) {
        self.reversing = !self.reversing;
        std::mem::swap(&mut self.source_system, &mut self.destination_system);
        self.velocity = self.velocity.scale(-1.0);
    }

    /// Noise has outgrown the packet.
    pub fn is_noise_overflowed(&self) -> bool {
        self.noise > self.size as f64
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(t: PacketType) -> Packet {
        Packet::new(PacketId(1), t, Point2D::default(), 30.0)
    }

    #[test]
    fn test_equality_is_by_id() {
        let mut a = packet(PacketType::SquareMessenger);
        let b = packet(PacketType::BulkLarge);
        a.noise = 3.0;
        assert_eq!(a, b);
        let c = Packet::new(PacketId(2), PacketType::SquareMessenger, Point2D::default(), 30.0);
        assert_ne!(a, c);
    }

    #[test]
    fn test_progress_is_clamped() {
        let mut p = packet(PacketType::SmallMessenger);
        p.set_path_progress(1.4);
        assert_eq!(p.path_progress(), 1.0);
        p.set_path_progress(-0.2);
        assert_eq!(p.path_progress(), 0.0);
    }

    #[test]
    fn test_protect_and_unwrap() {
        let mut p = packet(PacketType::SquareMessenger);
        assert!(p.protect());
        assert_eq!(p.packet_type, PacketType::Protected);
        assert_eq!(p.size, 4);
        assert_eq!(p.original_type, Some(PacketType::SquareMessenger));
        assert_eq!(p.units(), 2);

        assert!(p.unwrap_protection());
        assert_eq!(p.packet_type, PacketType::SquareMessenger);
        assert_eq!(p.size, 2);
        assert_eq!(p.original_type, None);
    }

    #[test]
    fn test_protect_ignores_non_messengers() {
        let mut p = packet(PacketType::Confidential);
        assert!(!p.protect());
        assert_eq!(p.packet_type, PacketType::Confidential);
        assert!(!p.unwrap_protection());
    }

    #[test]
    fn test_mark_lost_is_terminal() {
        let mut p = packet(PacketType::TriangleMessenger);
        p.current_wire = Some(WireId(0));
        p.velocity = Vec2D::new(10.0, 0.0);
        p.mark_lost();
        assert!(p.lost);
        assert!(!p.active);
        assert!(p.current_wire.is_none());
        assert_eq!(p.speed(), 0.0);
    }

    #[test]
    fn test_reverse_swaps_endpoints() {
        let mut p = packet(PacketType::SquareMessenger);
        p.source_system = Some(SystemId(1));
        p.destination_system = Some(SystemId(2));
        p.velocity = Vec2D::new(5.0, 0.0);
        p.reverse();
        assert!(p.reversing);
        assert_eq!(p.source_system, Some(SystemId(2)));
        assert_eq!(p.destination_system, Some(SystemId(1)));
        assert_eq!(p.velocity, Vec2D::new(-5.0, 0.0));
    }

    #[test]
    fn test_speed_profiles() {
        assert_eq!(PacketType::SquareMessenger.acceleration(false), 0.0);
        assert!(PacketType::TriangleMessenger.acceleration(false) > 0.0);
        assert!(PacketType::SmallMessenger.acceleration(true) > 0.0);
        assert!(PacketType::SmallMessenger.acceleration(false) < 0.0);
        assert!(PacketType::Protected.doubles_on_mismatch());
        assert!(!PacketType::BulkSmall.doubles_on_mismatch());
    }

    #[test]
    fn test_messenger_for_color() {
        assert_eq!(PacketType::messenger_for_color(0), PacketType::SmallMessenger);
        assert_eq!(PacketType::messenger_for_color(4), PacketType::SquareMessenger);
        assert_eq!(PacketType::messenger_for_color(5), PacketType::TriangleMessenger);
    }
}
