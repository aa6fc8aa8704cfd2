// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Wirenet Simulation Core - Systems

//! System nodes: ordered input and output ports, a bounded storage queue,
//! and the Active / Deactivated / Failed lifecycle.
//!
//! Per-variant routing behaviour lives in `routing`; this module only holds
//! the state a system owns.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::packet::Packet;
use crate::port::Port;
use crate::types::{PacketId, Point2D, PortDirection, PortRef, PortShape, SystemId, SystemKind, WireId};

// ─── Constants ───────────────────────────────────────────────────────────────

pub const STORAGE_CAPACITY: usize = 5;

/// Deactivation applied when a packet arrives too fast (s).
pub const SPEED_DAMAGE_COOLDOWN: f64 = 3.0;

/// Deactivation applied after an anti-trojan sweep converts anything (s).
pub const ANTI_TROJAN_COOLDOWN: f64 = 2.0;

// ─── Lifecycle ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SystemState {
    Active,
    Deactivated { remaining: f64 },
    Failed,
}

// ─── System ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct System {
    pub id: SystemId,
    /// External identifier from the level definition.
    pub name: String,
    pub kind: SystemKind,
    pub position: Point2D,
    pub inputs: Vec<Port>,
    pub outputs: Vec<Port>,
    pub(crate) storage: VecDeque<Packet>,
    /// Merger only: bit packets grouped by group id.
    pub(crate) merge_buffer: BTreeMap<u64, Vec<Packet>>,
    pub(crate) active: bool,
    pub(crate) failed: bool,
    pub(crate) deactivation_timer: f64,
}

impl System {
    pub fn new(id: SystemId, name: impl Into<String>, kind: SystemKind, position: Point2D) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            position,
            inputs: Vec::new(),
            outputs: Vec::new(),
            storage: VecDeque::new(),
            merge_buffer: BTreeMap::new(),
            active: true,
            failed: false,
            deactivation_timer: 0.0,
        }
    }

    // ─── Ports ─────────────────────────────────────────────────────────────

    pub fn add_port(&mut self, direction: PortDirection, shape: PortShape, position: Point2D) -> PortRef {
        let list = match direction {
            PortDirection::Input => &mut self.inputs,
            PortDirection::Output => &mut self.outputs,
        };
        let index = list.len();
        list.push(Port::new(self.id, direction, index, shape, position));
        PortRef { system: self.id, direction, index }
    }

    pub fn port(&self, port: PortRef) -> Option<&Port> {
        match port.direction {
            PortDirection::Input => self.inputs.get(port.index),
            PortDirection::Output => self.outputs.get(port.index),
        }
    }

    pub fn port_mut(&mut self, port: PortRef) -> Option<&mut Port> {
        match port.direction {
            PortDirection::Input => self.inputs.get_mut(port.index),
            PortDirection::Output => self.outputs.get_mut(port.index),
        }
    }

    pub fn ports(&self) -> impl Iterator<Item = &Port> {
        self.inputs.iter().chain(self.outputs.iter())
    }

    pub fn ports_mut(&mut self) -> impl Iterator<Item = &mut Port> {
        self.inputs.iter_mut().chain(self.outputs.iter_mut())
    }

    pub fn has_input_ports(&self) -> bool {
        !self.inputs.is_empty()
    }

    // ─── Lifecycle ─────────────────────────────────────────────────────────

    pub fn state(&self) -> SystemState {
        if self.failed {
            SystemState::Failed
        } else if !self.active {
            SystemState::Deactivated { remaining: self.deactivation_timer }
        } else {
            SystemState::Active
        }
    }

    pub fn is_active(&self) -> bool {
        self.active && !self.failed
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    /// Take the system offline for `duration` seconds. A longer pending
    /// deactivation is kept.
    pub fn deactivate(&mut self, duration: f64) {
        if self.failed {
            return;
        }
        self.active = false;
        self.deactivation_timer = self.deactivation_timer.max(duration);
        debug!(system = %self.id, duration, "System deactivated");
    }

    /// Count down a pending deactivation. Returns true when the system came
    /// back online on this call.
    pub fn update(&mut self, dt: f64) -> bool {
        if self.failed || self.active {
            return false;
        }
        self.deactivation_timer -= dt;
        if self.deactivation_timer <= 0.0 {
            self.deactivation_timer = 0.0;
            self.active = true;
            debug!(system = %self.id, "System reactivated");
            return true;
        }
        false
    }

    /// Permanent failure. Packet bookkeeping for the failure is done by the
    /// simulation, which owns the wires.
    pub fn fail(&mut self) {
        if !self.failed {
            info!(system = %self.id, name = %self.name, "System failed");
        }
        self.failed = true;
        self.active = false;
        self.deactivation_timer = 0.0;
    }

    // ─── Storage ───────────────────────────────────────────────────────────

    pub fn storage(&self) -> &VecDeque<Packet> {
        &self.storage
    }

    pub fn can_store(&self) -> bool {
        self.storage.len() < STORAGE_CAPACITY
    }

    pub fn store(&mut self, packet: Packet) -> Result<(), Packet> {
        if !self.can_store() || !packet.active {
            return Err(packet);
        }
        self.storage.push_back(packet);
        Ok(())
    }

    /// Distributor bit placement skips the capacity bound.
    pub(crate) fn store_unbounded(&mut self, packet: Packet) {
        self.storage.push_back(packet);
    }

    pub(crate) fn take_stored(&mut self) -> Option<Packet> {
        self.storage.pop_front()
    }

    pub fn merge_buffer(&self) -> &BTreeMap<u64, Vec<Packet>> {
        &self.merge_buffer
    }

    // ─── Held packets ──────────────────────────────────────────────────────

    pub fn held_packets(&self) -> impl Iterator<Item = &Packet> {
        self.storage
            .iter()
            .chain(self.ports().filter_map(|p| p.packet()))
            .chain(self.merge_buffer.values().flatten())
    }

    pub fn held_packet_count(&self) -> usize {
        self.held_packets().count()
    }

    /// Whether anything other than `except` is held in storage or a port.
    pub fn holds_other_packets(&self, except: PacketId) -> bool {
        self.held_packets().any(|p| p.id != except)
    }

    /// Remove every packet from storage and both port sides.
    pub(crate) fn drain_held_packets(&mut self) -> Vec<Packet> {
        let mut drained: Vec<Packet> = self.storage.drain(..).collect();
        for port in self.ports_mut() {
            drained.extend(port.release_packet());
        }
        drained
    }

    /// Coin value of everything the system currently holds.
    pub fn coin_value(&self) -> u32 {
        self.held_packets().map(Packet::coin_value).sum()
    }

    // ─── Snapshots ─────────────────────────────────────────────────────────

    pub fn snapshot(&self) -> SystemSnapshot {
        let port = |p: &Port| PortSnapshot { shape: p.shape, connected: p.connected, wire: p.wire };
        SystemSnapshot {
            active: self.active,
            failed: self.failed,
            deactivation_timer: self.deactivation_timer,
            inputs: self.inputs.iter().map(port).collect(),
            outputs: self.outputs.iter().map(port).collect(),
        }
    }

    /// Restore lifecycle and port state. Held packets are left to the caller.
    pub(crate) fn restore(&mut self, snapshot: &SystemSnapshot) {
        self.active = snapshot.active;
        self.failed = snapshot.failed;
        self.deactivation_timer = snapshot.deactivation_timer;
        for (port, snap) in self
            .inputs
            .iter_mut()
            .zip(&snapshot.inputs)
            .chain(self.outputs.iter_mut().zip(&snapshot.outputs))
        {
            port.shape = snap.shape;
            port.connected = snap.connected;
            port.wire = snap.wire;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PortSnapshot {
    pub shape: PortShape,
    pub connected: bool,
    pub wire: Option<WireId>,
}

/// Lifecycle and port state captured by a temporal snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemSnapshot {
    pub active: bool,
    pub failed: bool,
    pub deactivation_timer: f64,
    pub inputs: Vec<PortSnapshot>,
    pub outputs: Vec<PortSnapshot>,
}
