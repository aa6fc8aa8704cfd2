// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Wirenet Simulation Core - Wire Connections

//! Directed wire between an output port and an input port.
//!
//! A wire is the network's backpressure primitive: its transit slot holds at
//! most one active packet. The wire owns its bend list and the cached path
//! geometry; it does not own the ports at either end, so the pump that moves
//! packets between ports and the wire lives in the simulation.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::geometry::WirePath;
use crate::packet::{Packet, MAX_SPEED, MIN_SPEED};
use crate::types::{LossCause, Point2D, PortDirection, PortRef, WireId};

// ─── Constants ───────────────────────────────────────────────────────────────

pub const MAX_BENDS: usize = 3;

/// Bulk passages a wire survives; the exit of the last one destroys it.
pub const BULK_WEAR_LIMIT: u8 = 3;

/// Distance from an endpoint at which a packet counts as arrived (px).
pub const ARRIVAL_RADIUS: f64 = 5.0;

const LENGTH_EPSILON: f64 = 1e-9;

// ─── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
pub enum WireError {
    #[error("wire already carries the maximum of {max} bends")]
    TooManyBends { max: usize },

    #[error("bend {0} does not exist")]
    NoSuchBend(usize),

    #[error("both endpoints are {0:?} ports")]
    SameDirection(PortDirection),

    #[error("wire endpoints belong to the same system")]
    SelfLoop,

    #[error("port {0} does not exist")]
    UnknownPort(PortRef),

    #[error("port {0} is already wired")]
    PortInUse(PortRef),

    #[error("wire {0} does not exist")]
    UnknownWire(WireId),

    #[error("wire is destroyed")]
    Destroyed,

    #[error("insufficient wire length: need {required:.1}, have {available:.1}")]
    InsufficientLength { required: f64, available: f64 },
}

// ─── WireConnection ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WireBend {
    pub position: Point2D,
}

/// One end of a wire as seen at construction time.
#[derive(Debug, Clone, Copy)]
pub struct WireEndpoint {
    pub port: PortRef,
    pub position: Point2D,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireConnection {
    pub id: WireId,
    /// Always the output side.
    pub source: PortRef,
    /// Always the input side.
    pub destination: PortRef,
    source_position: Point2D,
    destination_position: Point2D,
    bends: Vec<WireBend>,
    smooth: bool,
    path: WirePath,
    consumed_length: f64,
    pub(crate) active: bool,
    pub(crate) destroyed: bool,
    pub(crate) bulk_passages: u8,
    pub(crate) transit: Option<Packet>,
}

impl WireConnection {
    /// Build a wire between two ports given in either order; the output side
    /// becomes the source.
    pub fn connect(
        id: WireId,
        a: WireEndpoint,
        b: WireEndpoint,
        bends: &[Point2D],
        smooth: bool,
    ) -> Result<Self, WireError> {
        let (src, dst) = match (a.port.direction, b.port.direction) {
            (PortDirection::Output, PortDirection::Input) => (a, b),
            (PortDirection::Input, PortDirection::Output) => (b, a),
            (dir, _) => return Err(WireError::SameDirection(dir)),
        };
        if src.port.system == dst.port.system {
            return Err(WireError::SelfLoop);
        }
        if bends.len() > MAX_BENDS {
            return Err(WireError::TooManyBends { max: MAX_BENDS });
        }
        let mut wire = Self {
            id,
            source: src.port,
            destination: dst.port,
            source_position: src.position,
            destination_position: dst.position,
            bends: bends.iter().map(|&position| WireBend { position }).collect(),
            smooth,
            path: WirePath::default(),
            consumed_length: 0.0,
            active: true,
            destroyed: false,
            bulk_passages: 0,
            transit: None,
        };
        wire.rebuild_path();
        wire.consumed_length = wire.path.length();
        Ok(wire)
    }

    // ─── Geometry ──────────────────────────────────────────────────────────

    pub fn anchors(&self) -> Vec<Point2D> {
        let mut anchors = Vec::with_capacity(self.bends.len() + 2);
        anchors.push(self.source_position);
        anchors.extend(self.bends.iter().map(|b| b.position));
        anchors.push(self.destination_position);
        anchors
    }

    pub fn bends(&self) -> &[WireBend] {
        &self.bends
    }

    pub fn path(&self) -> &WirePath {
        &self.path
    }

    pub fn is_smooth(&self) -> bool {
        self.smooth
    }

    pub fn source_position(&self) -> Point2D {
        self.source_position
    }

    pub fn destination_position(&self) -> Point2D {
        self.destination_position
    }

    /// Current geometric length of the path.
    pub fn wire_length(&self) -> f64 {
        self.path.length()
    }

    /// Length charged against the level budget.
    pub fn consumed_length(&self) -> f64 {
        self.consumed_length
    }

    pub fn set_smooth(&mut self, smooth: bool) {
        if self.smooth != smooth {
            self.smooth = smooth;
            self.rebuild_path();
        }
    }

    fn rebuild_path(&mut self) {
        self.path = WirePath::build(&self.anchors(), self.smooth);
        if let Some(packet) = self.transit.as_mut() {
            if let Some(pos) = self.path.position_at(packet.path_progress()) {
                packet.position = pos;
            }
        }
    }

    // ─── Bend editing ──────────────────────────────────────────────────────

    /// Insert a bend into the anchor segment nearest to `position`.
    /// Returns the length charged (negative when the wire got shorter).
    pub fn add_bend(&mut self, position: Point2D, available: f64) -> Result<f64, WireError> {
        if self.bends.len() >= MAX_BENDS {
            return Err(WireError::TooManyBends { max: MAX_BENDS });
        }
        let anchors = self.anchors();
        let slot = anchors
            .windows(2)
            .enumerate()
            .map(|(i, w)| (i, segment_distance(position, w[0], w[1])))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i)
            .unwrap_or(0);
        let mut bends = self.bends.clone();
        bends.insert(slot.min(bends.len()), WireBend { position });
        self.apply_bends(bends, available)
    }

    pub fn move_bend(&mut self, index: usize, position: Point2D, available: f64) -> Result<f64, WireError> {
        if index >= self.bends.len() {
            return Err(WireError::NoSuchBend(index));
        }
        let mut bends = self.bends.clone();
        bends[index].position = position;
        self.apply_bends(bends, available)
    }

    pub fn remove_bend(&mut self, index: usize) -> Result<f64, WireError> {
        if index >= self.bends.len() {
            return Err(WireError::NoSuchBend(index));
        }
        let mut bends = self.bends.clone();
        bends.remove(index);
        self.apply_bends(bends, f64::INFINITY)
    }

    fn apply_bends(&mut self, bends: Vec<WireBend>, available: f64) -> Result<f64, WireError> {
        if self.destroyed {
            return Err(WireError::Destroyed);
        }
        let mut anchors = Vec::with_capacity(bends.len() + 2);
        anchors.push(self.source_position);
        anchors.extend(bends.iter().map(|b| b.position));
        anchors.push(self.destination_position);
        let candidate = WirePath::build(&anchors, self.smooth);
        let delta = candidate.length() - self.consumed_length;
        if delta > available + LENGTH_EPSILON {
            return Err(WireError::InsufficientLength { required: delta, available });
        }
        self.bends = bends;
        self.rebuild_path();
        self.consumed_length += delta;
        Ok(delta)
    }

    // ─── Transit slot ──────────────────────────────────────────────────────

    pub fn is_active(&self) -> bool {
        self.active && !self.destroyed
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub fn bulk_passages(&self) -> u8 {
        self.bulk_passages
    }

    pub fn can_accept_packet(&self) -> bool {
        self.transit.is_none() && self.is_active()
    }

    pub fn occupant(&self) -> Option<&Packet> {
        self.transit.as_ref()
    }

    pub fn occupant_mut(&mut self) -> Option<&mut Packet> {
        self.transit.as_mut()
    }

    /// Count of active packets in transit; the invariant is that this is
    /// never more than one.
    pub fn active_packet_count(&self) -> usize {
        self.transit.iter().filter(|p| p.active).count()
    }

    /// Attach a packet at the source end, oriented along the path.
    pub fn accept_packet(&mut self, mut packet: Packet) -> Result<(), Packet> {
        if !self.can_accept_packet() || !packet.active {
            return Err(packet);
        }
        let speed = packet.base_speed * packet.speed_multiplier;
        packet.current_wire = Some(self.id);
        packet.set_path_progress(0.0);
        packet.position = self.path.start().unwrap_or(self.source_position);
        packet.velocity = self.path.tangent_at(0.0).scale(speed);
        packet.travel_time = 0.0;
        packet.reversing = false;
        packet.source_system = Some(self.source.system);
        packet.destination_system = Some(self.destination.system);
        if packet.packet_type.is_bulk() {
            self.bulk_passages = (self.bulk_passages + 1).min(BULK_WEAR_LIMIT);
            debug!(wire = %self.id, passages = self.bulk_passages, "Bulk packet entered wire");
        }
        self.transit = Some(packet);
        Ok(())
    }

    /// Attach a packet at the destination end travelling back to the source.
    pub fn accept_returning(&mut self, mut packet: Packet) -> Result<(), Packet> {
        if !self.can_accept_packet() || !packet.active {
            return Err(packet);
        }
        let speed = (packet.base_speed * packet.speed_multiplier).max(MIN_SPEED);
        packet.current_wire = Some(self.id);
        packet.set_path_progress(1.0);
        packet.position = self.path.end().unwrap_or(self.destination_position);
        packet.velocity = self.path.tangent_at(1.0).scale(-speed);
        packet.reversing = true;
        packet.source_system = Some(self.destination.system);
        packet.destination_system = Some(self.source.system);
        self.transit = Some(packet);
        Ok(())
    }

    /// Advance the occupant by `dt`. A packet that has drifted further than
    /// `off_path_threshold` from the path, outlived its travel time, or
    /// overflowed with noise is lost and leaves the slot.
    pub fn update_movement(
        &mut self,
        dt: f64,
        smooth: bool,
        off_path_threshold: f64,
    ) -> Option<(Packet, LossCause)> {
        self.set_smooth(smooth);
        let packet = self.transit.as_mut()?;
        if !packet.active {
            self.transit = None;
            return None;
        }

        let deviation = self
            .path
            .closest_point(packet.position)
            .map(|proj| proj.distance)
            .unwrap_or(0.0);
        packet.travel_time += dt;
        let cause = if deviation > off_path_threshold {
            Some(LossCause::OffPath)
        } else if packet.is_noise_overflowed() {
            Some(LossCause::NoiseOverflow)
        } else if packet.travel_time > packet.max_travel_time {
            Some(LossCause::TravelTimeExceeded)
        } else {
            None
        };
        if let Some(cause) = cause {
            let mut lost = self.transit.take()?;
            lost.mark_lost();
            debug!(packet_id = %lost.id, wire = %self.id, ?cause, deviation, "Packet lost on wire");
            return Some((lost, cause));
        }

        let mut speed = packet.speed();
        if packet.acceleration != 0.0 {
            speed = (speed + packet.acceleration * dt).clamp(MIN_SPEED, MAX_SPEED);
        }
        let length = self.path.length();
        let step = if length > LENGTH_EPSILON { speed * dt / length } else { 1.0 };
        let direction = if packet.reversing { -1.0 } else { 1.0 };
        let progress = packet.path_progress() + direction * step;
        packet.set_path_progress(progress);
        if let Some(pos) = self.path.position_at(packet.path_progress()) {
            packet.position = pos;
        }
        packet.velocity = self.path.tangent_at(packet.path_progress()).scale(direction * speed);
        None
    }

    pub fn has_reached_destination(&self, packet: &Packet) -> bool {
        packet.position.distance(&self.destination_position) <= ARRIVAL_RADIUS
    }

    pub fn has_returned_to_source(&self, packet: &Packet) -> bool {
        packet.position.distance(&self.source_position) <= ARRIVAL_RADIUS
    }

    /// Whether the occupant is a forward-travelling packet at the
    /// destination end.
    pub fn occupant_arrived(&self) -> bool {
        self.transit
            .as_ref()
            .is_some_and(|p| !p.reversing && self.has_reached_destination(p))
    }

    pub fn occupant_returned(&self) -> bool {
        self.transit
            .as_ref()
            .is_some_and(|p| p.reversing && self.has_returned_to_source(p))
    }

    /// Release the occupant through an end of the wire. The exit of a bulk
    /// packet at the wear limit destroys the wire.
    pub fn release_occupant(&mut self) -> Option<Packet> {
        let mut packet = self.transit.take()?;
        packet.current_wire = None;
        if packet.packet_type.is_bulk() && self.bulk_passages >= BULK_WEAR_LIMIT {
            self.destroy();
        }
        Some(packet)
    }

    /// Turn a forward-travelling occupant around. Returns whether anything
    /// was reversed.
    pub fn reverse_occupant(&mut self) -> bool {
        match self.transit.as_mut() {
            Some(packet) if !packet.reversing => {
                packet.reverse();
                true
            }
            _ => false,
        }
    }

    /// Permanently disable the wire.
    pub fn destroy(&mut self) {
        if !self.destroyed {
            info!(wire = %self.id, "Wire destroyed by bulk wear");
        }
        self.active = false;
        self.destroyed = true;
    }

    /// Remove the occupant without any exit bookkeeping (rewind, failure).
    pub(crate) fn clear_transit(&mut self) -> Option<Packet> {
        self.transit.take()
    }

    // ─── Snapshots ─────────────────────────────────────────────────────────

    pub fn snapshot(&self) -> WireSnapshot {
        WireSnapshot {
            bends: self.bends.iter().map(|b| b.position).collect(),
            consumed_length: self.consumed_length,
            smooth: self.smooth,
            active: self.active,
            destroyed: self.destroyed,
            bulk_passages: self.bulk_passages,
        }
    }

    /// Restore structural state. The transit slot is left to the caller.
    pub(crate) fn restore(&mut self, snapshot: &WireSnapshot) {
        self.bends = snapshot.bends.iter().map(|&position| WireBend { position }).collect();
        self.consumed_length = snapshot.consumed_length;
        self.smooth = snapshot.smooth;
        self.active = snapshot.active;
        self.destroyed = snapshot.destroyed;
        self.bulk_passages = snapshot.bulk_passages;
        self.rebuild_path();
    }
}

/// Structural wire state captured by a temporal snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireSnapshot {
    pub bends: Vec<Point2D>,
    pub consumed_length: f64,
    pub smooth: bool,
    pub active: bool,
    pub destroyed: bool,
    pub bulk_passages: u8,
}

fn segment_distance(p: Point2D, a: Point2D, b: Point2D) -> f64 {
    crate::geometry::closest_point_on_path(p, &[a, b])
        .map(|proj| proj.distance)
        .unwrap_or(f64::INFINITY)
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PacketId, PacketType, SystemId};

    fn endpoint(port: PortRef, x: f64, y: f64) -> WireEndpoint {
        WireEndpoint { port, position: Point2D::new(x, y) }
    }

    fn straight_wire() -> WireConnection {
        WireConnection::connect(
            WireId(0),
            endpoint(PortRef::output(SystemId(0), 0), 0.0, 0.0),
            endpoint(PortRef::input(SystemId(1), 0), 100.0, 0.0),
            &[],
            false,
        )
        .unwrap()
    }

    fn packet(id: u64, t: PacketType) -> Packet {
        Packet::new(PacketId(id), t, Point2D::default(), 30.0)
    }

    fn run_to_destination(wire: &mut WireConnection) {
        for _ in 0..1000 {
            if wire.occupant_arrived() {
                return;
            }
            assert!(wire.update_movement(0.05, false, 20.0).is_none());
        }
        panic!("packet never arrived");
    }

    #[test]
    fn test_connect_normalizes_direction() {
        let wire = WireConnection::connect(
            WireId(3),
            endpoint(PortRef::input(SystemId(1), 0), 100.0, 0.0),
            endpoint(PortRef::output(SystemId(0), 0), 0.0, 0.0),
            &[],
            false,
        )
        .unwrap();
        assert_eq!(wire.source, PortRef::output(SystemId(0), 0));
        assert_eq!(wire.destination, PortRef::input(SystemId(1), 0));
        assert_eq!(wire.source_position(), Point2D::new(0.0, 0.0));
        assert!((wire.consumed_length() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_connect_rejects_bad_endpoints() {
        let same = WireConnection::connect(
            WireId(0),
            endpoint(PortRef::output(SystemId(0), 0), 0.0, 0.0),
            endpoint(PortRef::output(SystemId(1), 0), 10.0, 0.0),
            &[],
            false,
        );
        assert_eq!(same.unwrap_err(), WireError::SameDirection(PortDirection::Output));

        let self_loop = WireConnection::connect(
            WireId(0),
            endpoint(PortRef::output(SystemId(0), 0), 0.0, 0.0),
            endpoint(PortRef::input(SystemId(0), 0), 10.0, 0.0),
            &[],
            false,
        );
        assert_eq!(self_loop.unwrap_err(), WireError::SelfLoop);

        let bends = [Point2D::new(1.0, 1.0); 4];
        let crowded = WireConnection::connect(
            WireId(0),
            endpoint(PortRef::output(SystemId(0), 0), 0.0, 0.0),
            endpoint(PortRef::input(SystemId(1), 0), 10.0, 0.0),
            &bends,
            false,
        );
        assert_eq!(crowded.unwrap_err(), WireError::TooManyBends { max: 3 });
    }

    #[test]
    fn test_capacity_is_one() {
        let mut wire = straight_wire();
        assert!(wire.can_accept_packet());
        wire.accept_packet(packet(1, PacketType::SquareMessenger)).unwrap();
        assert!(!wire.can_accept_packet());
        assert!(wire.accept_packet(packet(2, PacketType::SquareMessenger)).is_err());
        assert_eq!(wire.active_packet_count(), 1);
    }

    #[test]
    fn test_accept_orients_packet() {
        let mut wire = straight_wire();
        let mut p = packet(1, PacketType::SquareMessenger);
        p.speed_multiplier = 2.0;
        p.travel_time = 12.0;
        wire.accept_packet(p).unwrap();
        let p = wire.occupant().unwrap();
        assert_eq!(p.path_progress(), 0.0);
        assert_eq!(p.position, Point2D::new(0.0, 0.0));
        assert_eq!(p.velocity.x, 140.0);
        assert_eq!(p.travel_time, 0.0);
        assert_eq!(p.current_wire, Some(WireId(0)));
    }

    #[test]
    fn test_movement_reaches_destination() {
        let mut wire = straight_wire();
        wire.accept_packet(packet(1, PacketType::SquareMessenger)).unwrap();
        run_to_destination(&mut wire);
        let p = wire.release_occupant().unwrap();
        assert!(p.current_wire.is_none());
        assert!(wire.can_accept_packet());
    }

    #[test]
    fn test_off_path_packet_is_lost() {
        let mut wire = straight_wire();
        wire.accept_packet(packet(1, PacketType::SquareMessenger)).unwrap();
        wire.update_movement(0.1, false, 20.0);
        wire.occupant_mut().unwrap().position.y += 25.0;
        let (lost, cause) = wire.update_movement(0.1, false, 20.0).unwrap();
        assert_eq!(cause, LossCause::OffPath);
        assert!(lost.lost);
        assert!(!lost.active);
        assert_eq!(wire.active_packet_count(), 0);
    }

    #[test]
    fn test_small_deviation_is_resnapped() {
        let mut wire = straight_wire();
        wire.accept_packet(packet(1, PacketType::SquareMessenger)).unwrap();
        wire.occupant_mut().unwrap().position.y += 10.0;
        assert!(wire.update_movement(0.1, false, 20.0).is_none());
        assert_eq!(wire.occupant().unwrap().position.y, 0.0);
    }

    #[test]
    fn test_travel_time_limit() {
        let mut wire = straight_wire();
        let mut p = packet(1, PacketType::SquareMessenger);
        p.max_travel_time = 0.15;
        wire.accept_packet(p).unwrap();
        assert!(wire.update_movement(0.1, false, 20.0).is_none());
        let (_, cause) = wire.update_movement(0.1, false, 20.0).unwrap();
        assert_eq!(cause, LossCause::TravelTimeExceeded);
    }

    #[test]
    fn test_bulk_wear_destroys_on_third_exit() {
        let mut wire = straight_wire();
        for i in 0..3 {
            wire.accept_packet(packet(i, PacketType::BulkSmall)).unwrap();
            assert_eq!(wire.bulk_passages(), i as u8 + 1);
            assert!(!wire.is_destroyed(), "destroyed on entry {}", i);
            run_to_destination(&mut wire);
            wire.release_occupant().unwrap();
        }
        assert!(wire.is_destroyed());
        assert!(!wire.is_active());
        assert!(!wire.can_accept_packet());
        assert!(wire.accept_packet(packet(9, PacketType::SmallMessenger)).is_err());
    }

    #[test]
    fn test_returning_packet_travels_back() {
        let mut wire = straight_wire();
        wire.accept_returning(packet(1, PacketType::SquareMessenger)).unwrap();
        for _ in 0..1000 {
            if wire.occupant_returned() {
                break;
            }
            wire.update_movement(0.05, false, 20.0);
        }
        assert!(wire.occupant_returned());
        let p = wire.release_occupant().unwrap();
        assert!(p.reversing);
        assert_eq!(p.destination_system, Some(SystemId(0)));
    }

    #[test]
    fn test_bend_editing_respects_budget() {
        let mut wire = straight_wire();
        assert!(matches!(
            wire.add_bend(Point2D::new(50.0, 80.0), 10.0),
            Err(WireError::InsufficientLength { .. })
        ));
        assert!(wire.bends().is_empty());

        let charged = wire.add_bend(Point2D::new(50.0, 50.0), 100.0).unwrap();
        assert!(charged > 0.0);
        assert_eq!(wire.bends().len(), 1);
        assert!(wire.path().passes_through(&Point2D::new(50.0, 50.0)));

        let refunded = wire.remove_bend(0).unwrap();
        assert!((charged + refunded).abs() < 1e-9);
        assert_eq!(wire.move_bend(0, Point2D::default(), 100.0), Err(WireError::NoSuchBend(0)));
    }

    #[test]
    fn test_bend_limit() {
        let mut wire = straight_wire();
        for x in [20.0, 50.0, 80.0] {
            wire.add_bend(Point2D::new(x, 1.0), 100.0).unwrap();
        }
        assert_eq!(
            wire.add_bend(Point2D::new(90.0, 1.0), 100.0),
            Err(WireError::TooManyBends { max: 3 })
        );
        let xs: Vec<f64> = wire.bends().iter().map(|b| b.position.x).collect();
        assert_eq!(xs, vec![20.0, 50.0, 80.0]);
    }
}
