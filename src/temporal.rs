// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Wirenet Simulation Core - Temporal Snapshots and Rewind

//! Value snapshots of the whole simulation and the bounded timeline used to
//! rewind it.
//!
//! A snapshot owns copies of every packet together with the location it was
//! found in, so restoring never touches the snapshot itself and the same
//! snapshot can be restored any number of times. Structural state that
//! gameplay mutates (system lifecycle, port shapes, wire wear and bends) and
//! the random source are captured alongside, which makes a replay after a
//! rewind take the same decisions as the original run.

use std::collections::{BTreeSet, VecDeque};

use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

use crate::packet::Packet;
use crate::simulation::{LevelStatus, Simulation};
use crate::stats::LevelStats;
use crate::system::SystemSnapshot;
use crate::types::{PacketId, PacketLocation};
use crate::wire::WireSnapshot;

// ─── Constants ───────────────────────────────────────────────────────────────

/// Snapshots kept before the oldest is dropped.
pub const TIMELINE_CAPACITY: usize = 2400;

const TIME_EPSILON: f64 = 1e-9;

// ─── TemporalState ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct TemporalState {
    pub time: f64,
    pub packets: Vec<(PacketLocation, Packet)>,
    pub stats: LevelStats,
    pub injections_executed: Vec<bool>,
    pub systems: Vec<SystemSnapshot>,
    pub wires: Vec<WireSnapshot>,
    pub status: LevelStatus,
    pub next_packet_id: u64,
    pub next_group_id: u64,
    pub(crate) contacts: BTreeSet<(PacketId, PacketId)>,
    pub(crate) rng: ChaCha8Rng,
}

impl TemporalState {
    pub fn packet_count(&self) -> usize {
        self.packets.len()
    }
}

// ─── Timeline ────────────────────────────────────────────────────────────────

/// Snapshots in time order, recorded at a fixed simulated-time interval.
#[derive(Debug, Clone)]
pub struct Timeline {
    snapshots: VecDeque<TemporalState>,
    interval: f64,
    capacity: usize,
}

impl Timeline {
    pub fn new(interval: f64) -> Self {
        Self::with_capacity(interval, TIMELINE_CAPACITY)
    }

    pub fn with_capacity(interval: f64, capacity: usize) -> Self {
        Self { snapshots: VecDeque::new(), interval, capacity: capacity.max(1) }
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn earliest_time(&self) -> Option<f64> {
        self.snapshots.front().map(|s| s.time)
    }

    pub fn latest_time(&self) -> Option<f64> {
        self.snapshots.back().map(|s| s.time)
    }

    pub fn is_due(&self, time: f64) -> bool {
        match self.snapshots.back() {
            Some(last) => time - last.time + TIME_EPSILON >= self.interval,
            None => true,
        }
    }

    pub fn record(&mut self, state: TemporalState) {
        if self.snapshots.len() >= self.capacity {
            self.snapshots.pop_front();
        }
        self.snapshots.push_back(state);
    }

    pub fn latest_at_or_before(&self, time: f64) -> Option<&TemporalState> {
        self.snapshots.iter().rev().find(|s| s.time <= time + TIME_EPSILON)
    }

    /// Drop every snapshot later than `time`.
    pub fn truncate_after(&mut self, time: f64) {
        while self.snapshots.back().is_some_and(|s| s.time > time + TIME_EPSILON) {
            self.snapshots.pop_back();
        }
    }
}

// ─── Capture / restore ───────────────────────────────────────────────────────

impl Simulation {
    pub fn capture(&self) -> TemporalState {
        TemporalState {
            time: self.time,
            packets: self
                .packet_locations()
                .into_iter()
                .map(|(location, packet)| (location, packet.clone()))
                .collect(),
            stats: self.stats.clone(),
            injections_executed: self.injections.iter().map(|i| i.executed).collect(),
            systems: self.network.systems().iter().map(|s| s.snapshot()).collect(),
            wires: self.network.wires().iter().map(|w| w.snapshot()).collect(),
            status: self.status,
            next_packet_id: self.next_packet_id,
            next_group_id: self.next_group_id,
            contacts: self.contacts.clone(),
            rng: self.rng.clone(),
        }
    }

    /// Reset every placement and re-create packets from `state`.
    pub fn restore(&mut self, state: &TemporalState) {
        self.network.clear_packets();
        self.returning.clear();

        for (system, snapshot) in self.network.systems.iter_mut().zip(&state.systems) {
            system.restore(snapshot);
        }
        for (wire, snapshot) in self.network.wires.iter_mut().zip(&state.wires) {
            wire.restore(snapshot);
        }
        for (location, packet) in &state.packets {
            self.place(*location, packet.clone());
        }
        for (injection, &executed) in self.injections.iter_mut().zip(&state.injections_executed) {
            injection.executed = executed;
        }

        self.time = state.time;
        self.stats = state.stats.clone();
        self.status = state.status;
        self.next_packet_id = state.next_packet_id;
        self.next_group_id = state.next_group_id;
        self.contacts = state.contacts.clone();
        self.rng = state.rng.clone();
        debug!(time = state.time, packets = state.packets.len(), "Snapshot restored");
    }

    fn place(&mut self, location: PacketLocation, packet: Packet) {
        match location {
            PacketLocation::Returning => self.returning.push(packet),
            PacketLocation::Wire { wire } => {
                if let Some(w) = self.network.wire_mut(wire) {
                    w.transit = Some(packet);
                }
            }
            PacketLocation::Port { port } => {
                if let Some(p) = self.network.port_mut(port) {
                    p.packet = Some(packet);
                }
            }
            PacketLocation::Storage { system } => {
                if let Some(s) = self.network.system_mut(system) {
                    s.storage.push_back(packet);
                }
            }
            PacketLocation::MergeBuffer { system } => {
                if let Some(s) = self.network.system_mut(system) {
                    s.merge_buffer.entry(packet.group_id.unwrap_or(0)).or_default().push(packet);
                }
            }
        }
    }

    /// Return to simulated time `target`.
    ///
    /// Restores the latest snapshot at or before `target`, discards every
    /// later snapshot, then replays in fixed steps up to `target`. Works
    /// while paused. Returns false when no snapshot covers `target` or the
    /// target lies in the future.
    pub fn rewind_to(&mut self, target: f64) -> bool {
        let target = target.max(0.0);
        if target > self.time + TIME_EPSILON {
            return false;
        }
        let Some(snapshot) = self.timeline.latest_at_or_before(target).cloned() else {
            return false;
        };
        self.timeline.truncate_after(snapshot.time);
        self.restore(&snapshot);

        let step = self.settings.replay_step;
        let mut replayed = 0u32;
        while step > 0.0 && !self.status.is_finished() && self.time + step <= target + TIME_EPSILON {
            self.step(step);
            replayed += 1;
        }
        info!(target, restored = snapshot.time, replayed, "Rewound");
        true
    }
}
