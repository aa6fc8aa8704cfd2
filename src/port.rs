// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Wirenet Simulation Core - Ports

use serde::{Deserialize, Serialize};

use crate::packet::Packet;
use crate::types::{PacketType, Point2D, PortDirection, PortRef, PortShape, SystemId, WireId};

/// Typed single-slot socket on a system.
///
/// Equality is structural on (system, position, direction) because ports are
/// rebuilt when levels are reloaded or snapshots restored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Port {
    pub system: SystemId,
    pub direction: PortDirection,
    pub index: usize,
    pub shape: PortShape,
    pub position: Point2D,
    pub connected: bool,
    pub wire: Option<WireId>,
    pub(crate) packet: Option<Packet>,
}

impl PartialEq for Port {
    fn eq(&self, other: &Self) -> bool {
        self.system == other.system
            && self.position == other.position
            && self.direction == other.direction
    }
}

impl Port {
    pub fn new(system: SystemId, direction: PortDirection, index: usize, shape: PortShape, position: Point2D) -> Self {
        Self {
            system,
            direction,
            index,
            shape,
            position,
            connected: false,
            wire: None,
            packet: None,
        }
    }

    pub fn port_ref(&self) -> PortRef {
        PortRef { system: self.system, direction: self.direction, index: self.index }
    }

    pub fn is_input(&self) -> bool {
        self.direction == PortDirection::Input
    }

    /// Shape/type compatibility. Types without an expected shape fit any port.
    pub fn is_compatible_with(&self, packet_type: PacketType) -> bool {
        match packet_type.shape() {
            Some(shape) => shape == self.shape,
            None => true,
        }
    }

    pub fn is_compatible_with_packet(&self, packet: &Packet) -> bool {
        self.is_compatible_with(packet.packet_type)
    }

    pub fn can_accept_packet(&self) -> bool {
        self.packet.is_none()
    }

    /// Place a packet into the slot. An occupied slot or an inactive packet
    /// hands the packet back.
    pub fn accept_packet(&mut self, mut packet: Packet) -> Result<(), Packet> {
        if !self.can_accept_packet() || !packet.active {
            return Err(packet);
        }
        packet.position = self.position;
        packet.current_wire = None;
        self.packet = Some(packet);
        Ok(())
    }

    pub fn release_packet(&mut self) -> Option<Packet> {
        self.packet.take()
    }

    pub fn packet(&self) -> Option<&Packet> {
        self.packet.as_ref()
    }

    pub fn packet_mut(&mut self) -> Option<&mut Packet> {
        self.packet.as_mut()
    }
}
