// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Wirenet Simulation Core - Network Graph Container

//! Arena storage for the live level: systems and wires addressed by
//! [`SystemId`] / [`WireId`] instead of back-references.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::packet::Packet;
use crate::port::Port;
use crate::system::System;
use crate::types::{PacketLocation, Point2D, PortRef, SystemId, SystemKind, WireId};
use crate::wire::{WireConnection, WireEndpoint, WireError};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Network {
    pub(crate) systems: Vec<System>,
    pub(crate) wires: Vec<WireConnection>,
}

impl Network {
    pub fn new() -> Self {
        Self::default()
    }

    // ─── Systems ───────────────────────────────────────────────────────────

    pub fn add_system(&mut self, name: impl Into<String>, kind: SystemKind, position: Point2D) -> SystemId {
        let id = SystemId(self.systems.len() as u32);
        self.systems.push(System::new(id, name, kind, position));
        id
    }

    pub fn systems(&self) -> &[System] {
        &self.systems
    }

    pub fn system(&self, id: SystemId) -> Option<&System> {
        self.systems.get(id.index())
    }

    pub fn system_mut(&mut self, id: SystemId) -> Option<&mut System> {
        self.systems.get_mut(id.index())
    }

    pub fn system_by_name(&self, name: &str) -> Option<SystemId> {
        self.systems.iter().find(|s| s.name == name).map(|s| s.id)
    }

    pub fn systems_of_kind(&self, kind: SystemKind) -> impl Iterator<Item = &System> {
        self.systems.iter().filter(move |s| s.kind == kind)
    }

    pub fn failed_system_count(&self) -> usize {
        self.systems.iter().filter(|s| s.is_failed()).count()
    }

    // ─── Ports ─────────────────────────────────────────────────────────────

    pub fn port(&self, port: PortRef) -> Option<&Port> {
        self.system(port.system)?.port(port)
    }

    pub fn port_mut(&mut self, port: PortRef) -> Option<&mut Port> {
        self.system_mut(port.system)?.port_mut(port)
    }

    // ─── Wires ─────────────────────────────────────────────────────────────

    pub fn wires(&self) -> &[WireConnection] {
        &self.wires
    }

    pub fn wire(&self, id: WireId) -> Option<&WireConnection> {
        self.wires.get(id.index())
    }

    pub fn wire_mut(&mut self, id: WireId) -> Option<&mut WireConnection> {
        self.wires.get_mut(id.index())
    }

    /// Wire attached to a port, if the port is connected.
    pub fn wire_at(&self, port: PortRef) -> Option<&WireConnection> {
        let id = self.port(port)?.wire?;
        self.wire(id)
    }

    /// Wires whose destination port belongs to `system`.
    pub fn incoming_wires(&self, system: SystemId) -> impl Iterator<Item = &WireConnection> {
        self.wires.iter().filter(move |w| w.destination.system == system)
    }

    /// Connect two ports with a new wire. Either port may be given first.
    pub fn connect(&mut self, a: PortRef, b: PortRef, bends: &[Point2D], smooth: bool) -> Result<WireId, WireError> {
        let endpoint = |net: &Self, port: PortRef| -> Result<WireEndpoint, WireError> {
            let p = net.port(port).ok_or(WireError::UnknownPort(port))?;
            if p.connected {
                return Err(WireError::PortInUse(port));
            }
            Ok(WireEndpoint { port, position: p.position })
        };
        let ea = endpoint(self, a)?;
        let eb = endpoint(self, b)?;
        let id = WireId(self.wires.len() as u32);
        let wire = WireConnection::connect(id, ea, eb, bends, smooth)?;
        for end in [wire.source, wire.destination] {
            if let Some(port) = self.port_mut(end) {
                port.connected = true;
                port.wire = Some(id);
            }
        }
        debug!(wire = %id, source = %wire.source, destination = %wire.destination, length = wire.wire_length(), "Wire connected");
        self.wires.push(wire);
        Ok(id)
    }

    /// Detach both end ports from a wire. The wire stays in the arena so
    /// its id remains valid.
    pub fn disconnect(&mut self, id: WireId) {
        let Some(wire) = self.wire(id) else { return };
        let ends = [wire.source, wire.destination];
        for end in ends {
            if let Some(port) = self.port_mut(end) {
                if port.wire == Some(id) {
                    port.connected = false;
                    port.wire = None;
                }
            }
        }
    }

    /// Whether a wire can carry packets: usable wire, non-failed endpoints.
    pub fn is_wire_usable(&self, wire: &WireConnection) -> bool {
        wire.is_active()
            && [wire.source.system, wire.destination.system]
                .iter()
                .all(|&s| self.system(s).is_some_and(|s| !s.is_failed()))
    }

    // ─── Packet census ─────────────────────────────────────────────────────

    /// Every packet held by the network with its location. Packets in the
    /// simulation's returning list are not included.
    pub fn packets(&self) -> Vec<(PacketLocation, &Packet)> {
        let mut out = Vec::new();
        for system in &self.systems {
            for port in system.ports() {
                if let Some(p) = port.packet() {
                    out.push((PacketLocation::Port { port: port.port_ref() }, p));
                }
            }
            for p in system.storage() {
                out.push((PacketLocation::Storage { system: system.id }, p));
            }
            for p in system.merge_buffer().values().flatten() {
                out.push((PacketLocation::MergeBuffer { system: system.id }, p));
            }
        }
        for wire in &self.wires {
            if let Some(p) = wire.occupant() {
                out.push((PacketLocation::Wire { wire: wire.id }, p));
            }
        }
        out
    }

    /// Mutable visit over every held packet; used by sweeps and collisions.
    pub(crate) fn for_each_packet_mut(&mut self, mut f: impl FnMut(&mut Packet)) {
        for system in &mut self.systems {
            for p in system.storage.iter_mut() {
                f(p);
            }
            for p in system.merge_buffer.values_mut().flatten() {
                f(p);
            }
            for port in system.ports_mut() {
                if let Some(p) = port.packet_mut() {
                    f(p);
                }
            }
        }
        for wire in &mut self.wires {
            if let Some(p) = wire.occupant_mut() {
                f(p);
            }
        }
    }

    /// Remove every packet from every location.
    pub(crate) fn clear_packets(&mut self) {
        for system in &mut self.systems {
            system.storage.clear();
            system.merge_buffer.clear();
            for port in system.ports_mut() {
                port.release_packet();
            }
        }
        for wire in &mut self.wires {
            wire.clear_transit();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PortDirection, PortShape};

    fn pair() -> (Network, PortRef, PortRef) {
        let mut net = Network::new();
        let a = net.add_system("a", SystemKind::Normal, Point2D::new(0.0, 0.0));
        let b = net.add_system("b", SystemKind::Reference, Point2D::new(200.0, 0.0));
        let out = net
            .system_mut(a)
            .unwrap()
            .add_port(PortDirection::Output, PortShape::Square, Point2D::new(30.0, 0.0));
        let inp = net
            .system_mut(b)
            .unwrap()
            .add_port(PortDirection::Input, PortShape::Square, Point2D::new(170.0, 0.0));
        (net, out, inp)
    }

    #[test]
    fn test_connect_marks_ports() {
        let (mut net, out, inp) = pair();
        let id = net.connect(inp, out, &[], true).unwrap();
        assert!(net.port(out).unwrap().connected);
        assert_eq!(net.port(inp).unwrap().wire, Some(id));
        assert_eq!(net.wire(id).unwrap().source, out);
        assert_eq!(net.connect(out, inp, &[], true), Err(WireError::PortInUse(out)));
    }

    #[test]
    fn test_disconnect_clears_ports() {
        let (mut net, out, inp) = pair();
        let id = net.connect(out, inp, &[], false).unwrap();
        net.disconnect(id);
        assert!(!net.port(out).unwrap().connected);
        assert!(net.port(inp).unwrap().wire.is_none());
        assert!(net.wire(id).is_some());
    }

    #[test]
    fn test_unknown_port() {
        let (mut net, out, _) = pair();
        let bogus = PortRef::input(SystemId(9), 0);
        assert_eq!(net.connect(out, bogus, &[], false), Err(WireError::UnknownPort(bogus)));
    }

    #[test]
    fn test_failed_endpoint_makes_wire_unusable() {
        let (mut net, out, inp) = pair();
        let id = net.connect(out, inp, &[], false).unwrap();
        assert!(net.is_wire_usable(net.wire(id).unwrap()));
        net.system_mut(inp.system).unwrap().fail();
        assert!(!net.is_wire_usable(net.wire(id).unwrap()));
    }
}
