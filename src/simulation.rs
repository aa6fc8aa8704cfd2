// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Wirenet Simulation Core - Simulation Driver

use std::collections::BTreeSet;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use wasm_bindgen::prelude::*;

use crate::connectivity::{ConnectivityAnalyzer, ConnectivityReport};
use crate::level::{LevelDefinition, ScheduledInjection, ValidationIssue};
use crate::network::Network;
use crate::packet::Packet;
use crate::settings::{LevelPolicy, SimulationSettings};
use crate::stats::LevelStats;
use crate::temporal::Timeline;
use crate::types::*;
use crate::wire::WireError;

// ─── Constants ──────────────────────────────────────────────────────────────

/// Packets on different wires closer than this collide (px).
pub const COLLISION_RADIUS: f64 = 10.0;

/// Reach of the impact wave a collision sends out (px).
pub const IMPACT_RADIUS: f64 = 50.0;

/// Displacement at the centre of an impact wave (px).
pub const IMPACT_FORCE: f64 = 8.0;

/// Noise each packet picks up from a collision.
pub const COLLISION_NOISE: f64 = 0.5;

const TIME_EPSILON: f64 = 1e-9;

// ─── Status ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameOverReason {
    ExcessiveFailure,
    ExcessiveLoss,
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LevelStatus {
    Running,
    Completed,
    GameOver { reason: GameOverReason },
}

impl LevelStatus {
    pub fn is_finished(&self) -> bool {
        !matches!(self, LevelStatus::Running)
    }
}

// ─── Outbound views ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct TickReport {
    pub time: f64,
    pub status: LevelStatus,
    pub injected: u32,
    pub delivered: u32,
    pub lost: u32,
    pub in_flight: usize,
    pub coins: u32,
    pub remaining_wire_length: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PortSummary {
    pub direction: PortDirection,
    pub shape: PortShape,
    pub position: Point2D,
    pub connected: bool,
    pub occupied: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemSummary {
    pub id: SystemId,
    pub name: String,
    pub kind: SystemKind,
    pub position: Point2D,
    pub active: bool,
    pub failed: bool,
    /// Coin value of the packets the system currently holds.
    pub coin_value: u32,
    pub storage: Vec<PacketType>,
    pub ports: Vec<PortSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WireSummary {
    pub id: WireId,
    pub source: PortRef,
    pub destination: PortRef,
    pub active: bool,
    pub destroyed: bool,
    pub bulk_passages: u8,
    pub length: f64,
    pub bends: Vec<Point2D>,
    pub path: Vec<Point2D>,
    pub occupant: Option<PacketView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PacketView {
    pub id: PacketId,
    pub packet_type: PacketType,
    pub position: Point2D,
    pub noise: f64,
    pub reversing: bool,
}

impl From<&Packet> for PacketView {
    fn from(p: &Packet) -> Self {
        Self { id: p.id, packet_type: p.packet_type, position: p.position, noise: p.noise, reversing: p.reversing }
    }
}

// ─── Simulation ─────────────────────────────────────────────────────────────

#[wasm_bindgen]
pub struct Simulation {
    pub(crate) name: String,
    pub(crate) network: Network,
    /// Packets travelling back to the system they came from.
    pub(crate) returning: Vec<Packet>,
    pub(crate) injections: Vec<ScheduledInjection>,
    pub(crate) stats: LevelStats,
    pub(crate) settings: SimulationSettings,
    pub(crate) policy: LevelPolicy,
    pub(crate) duration: f64,
    pub(crate) time: f64,
    pub(crate) rng: ChaCha8Rng,
    pub(crate) next_packet_id: u64,
    pub(crate) next_group_id: u64,
    pub(crate) status: LevelStatus,
    /// Packet pairs currently in contact; only new contacts collide.
    pub(crate) contacts: BTreeSet<(PacketId, PacketId)>,
    pub(crate) timeline: Timeline,
    pub(crate) paused: bool,
    pub(crate) issues: Vec<ValidationIssue>,
}

// ─── Internal Logic (Testable, pure Rust) ────────────────────────────────────

impl Simulation {
    pub fn from_level(level: &LevelDefinition, seed: u64) -> Self {
        let built = level.build();
        let mut sim = Self {
            name: level.name.clone(),
            network: built.network,
            returning: Vec::new(),
            injections: built.injections,
            stats: LevelStats::with_wire_budget(built.remaining_wire_length),
            settings: level.settings.clone(),
            policy: level.policy.clone(),
            duration: level.duration,
            time: 0.0,
            rng: ChaCha8Rng::seed_from_u64(seed),
            next_packet_id: 0,
            next_group_id: 0,
            status: LevelStatus::Running,
            contacts: BTreeSet::new(),
            timeline: Timeline::new(level.settings.timeline_interval),
            paused: false,
            issues: built.issues,
        };
        let origin = sim.capture();
        sim.timeline.record(origin);
        info!(level = %sim.name, seed, "Simulation created");
        sim
    }

    // ─── Accessors ─────────────────────────────────────────────────────────

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn stats(&self) -> &LevelStats {
        &self.stats
    }

    pub fn settings(&self) -> &SimulationSettings {
        &self.settings
    }

    pub fn policy(&self) -> &LevelPolicy {
        &self.policy
    }

    pub fn current_time(&self) -> f64 {
        self.time
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn status(&self) -> LevelStatus {
        self.status
    }

    pub fn validation_issues(&self) -> &[ValidationIssue] {
        &self.issues
    }

    pub fn injections(&self) -> &[ScheduledInjection] {
        &self.injections
    }

    pub fn returning(&self) -> &[Packet] {
        &self.returning
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub(crate) fn alloc_packet_id(&mut self) -> PacketId {
        let id = PacketId(self.next_packet_id);
        self.next_packet_id += 1;
        id
    }

    /// Every live packet with its location, returning list included.
    pub fn packet_locations(&self) -> Vec<(PacketLocation, &Packet)> {
        let mut out = self.network.packets();
        out.extend(self.returning.iter().map(|p| (PacketLocation::Returning, p)));
        out
    }

    pub fn in_flight_count(&self) -> usize {
        self.network.packets().len() + self.returning.len()
    }

    // ─── Tick ──────────────────────────────────────────────────────────────

    /// Advance by `dt` seconds unless paused: system update, port drain and
    /// storage retry, wire movement and transfer, collisions, then status.
    pub fn tick(&mut self, dt: f64) -> TickReport {
        if !self.paused && dt > 0.0 {
            self.step(dt);
        }
        self.report()
    }

    pub(crate) fn step(&mut self, dt: f64) {
        if self.status.is_finished() {
            return;
        }
        self.time += dt;
        self.execute_due_injections();
        self.update_systems(dt);
        self.drain_ports();
        self.update_wires(dt);
        self.transfer_packets();
        self.resolve_collisions();
        self.evaluate_status();
        if self.timeline.is_due(self.time) {
            let snapshot = self.capture();
            self.timeline.record(snapshot);
        }
    }

    pub fn report(&self) -> TickReport {
        TickReport {
            time: self.time,
            status: self.status,
            injected: self.stats.injected_packets,
            delivered: self.stats.delivered_packets,
            lost: self.stats.lost_packets,
            in_flight: self.in_flight_count(),
            coins: self.stats.coins,
            remaining_wire_length: self.stats.remaining_wire_length,
        }
    }

    // ─── Injection ─────────────────────────────────────────────────────────

    pub fn execute_due_injections(&mut self) {
        let due: Vec<usize> = self
            .injections
            .iter()
            .enumerate()
            .filter(|(_, inj)| !inj.executed && inj.time <= self.time + TIME_EPSILON)
            .map(|(i, _)| i)
            .collect();
        for i in due {
            self.injections[i].executed = true;
            let (source, packet_type) = (self.injections[i].source, self.injections[i].packet_type);
            self.inject_packet(source, packet_type);
        }
    }

    /// Create a packet at `source` and route it out of the source's output
    /// ports. Injection never runs the source's own variant behaviour, so a
    /// Reference source forwards instead of swallowing the packet.
    pub fn inject_packet(&mut self, source: SystemId, packet_type: PacketType) -> Option<PacketId> {
        let position = self.network.system(source)?.position;
        let packet = Packet::new(self.alloc_packet_id(), packet_type, position, self.settings.max_travel_time);
        let id = packet.id;
        self.stats.record_injection(&packet);
        debug!(packet_id = %id, system = %source, ?packet_type, "Packet injected");
        self.route_out(source, packet, false);
        Some(id)
    }

    // ─── Systems ───────────────────────────────────────────────────────────

    /// Deactivation countdowns, anti-trojan sweeps, returning-list dispatch
    /// and flushing of merge groups that can no longer complete.
    pub fn update_systems(&mut self, dt: f64) {
        for system in &mut self.network.systems {
            system.update(dt);
        }
        let sweepers: Vec<SystemId> = self
            .network
            .systems_of_kind(SystemKind::AntiTrojan)
            .filter(|s| s.is_active())
            .map(|s| s.id)
            .collect();
        for id in sweepers {
            self.anti_trojan_sweep(id);
        }
        self.dispatch_returning();
        self.flush_stale_merges();
    }

    fn dispatch_returning(&mut self) {
        for mut packet in std::mem::take(&mut self.returning) {
            let home = packet.destination_system.or(packet.source_system);
            let state = home.and_then(|h| self.network.system(h).map(|s| (h, s.is_failed(), s.is_active())));
            match state {
                None | Some((_, true, _)) => {
                    self.lose(packet, LossCause::Stranded);
                }
                Some((_, false, false)) => self.returning.push(packet),
                Some((home, false, true)) => {
                    packet.reversing = false;
                    packet.position = self.network.system(home).map(|s| s.position).unwrap_or(packet.position);
                    let placed = self.place_on_output(home, packet, false);
                    if let Err(mut packet) = placed {
                        let Some(system) = self.network.system_mut(home) else { continue };
                        packet.retry_destination = false;
                        if let Err(packet) = system.store(packet) {
                            self.returning.push(packet);
                        }
                    }
                }
            }
        }
    }

    /// Feed input-port packets through their systems and retry storage.
    pub fn drain_ports(&mut self) {
        for index in 0..self.network.systems.len() {
            let id = SystemId(index as u32);
            let Some(inputs) = self.network.system(id).filter(|s| s.is_active()).map(|s| s.inputs.len()) else {
                continue;
            };
            for i in 0..inputs {
                if !self.network.system(id).is_some_and(|s| s.is_active()) {
                    break;
                }
                let port = PortRef::input(id, i);
                if let Some(packet) = self.network.port_mut(port).and_then(|p| p.release_packet()) {
                    self.process_packet(id, packet, Some(port));
                }
            }
            self.retry_storage(id);
        }
    }

    fn retry_storage(&mut self, id: SystemId) {
        let Some((count, kind)) = self
            .network
            .system(id)
            .filter(|s| s.is_active())
            .map(|s| (s.storage().len(), s.kind))
        else {
            return;
        };
        let prefer_incompatible = kind == SystemKind::Saboteur;
        for _ in 0..count {
            let Some(packet) = self.network.system_mut(id).and_then(|s| s.take_stored()) else { break };
            if let Err(packet) = self.place_on_output(id, packet, prefer_incompatible) {
                if let Some(s) = self.network.system_mut(id) {
                    s.store_unbounded(packet);
                }
            }
        }
    }

    /// Permanently fail a system. Packets on its incoming wires turn around,
    /// packets in its input ports go back onto their wire or, when the wire
    /// is busy, into the returning list. A failing VPN reverts the
    /// protected packets it holds.
    pub fn fail_system(&mut self, id: SystemId) -> bool {
        let Some(system) = self.network.system_mut(id) else {
            return false;
        };
        if system.is_failed() {
            return false;
        }
        system.fail();
        if system.kind == SystemKind::Vpn {
            for packet in system.storage.iter_mut() {
                packet.unwrap_protection();
            }
            for port in system.ports_mut() {
                if let Some(packet) = port.packet_mut() {
                    packet.unwrap_protection();
                }
            }
        }

        let incoming: Vec<WireId> = self.network.incoming_wires(id).map(|w| w.id).collect();
        for wire in &incoming {
            if let Some(w) = self.network.wire_mut(*wire) {
                w.reverse_occupant();
            }
        }

        let inputs = self.network.system(id).map(|s| s.inputs.len()).unwrap_or(0);
        for i in 0..inputs {
            let port = PortRef::input(id, i);
            let Some((packet, wire)) = self
                .network
                .port_mut(port)
                .and_then(|p| p.release_packet().map(|packet| (packet, p.wire)))
            else {
                continue;
            };
            let origin = wire.and_then(|w| self.network.wire(w)).map(|w| w.source.system);
            let rejected = match wire.and_then(|w| self.network.wire_mut(w)) {
                Some(w) => w.accept_returning(packet).err(),
                None => Some(packet),
            };
            if let Some(mut packet) = rejected {
                packet.reversing = true;
                packet.retry_destination = true;
                packet.destination_system = origin.or(packet.source_system);
                self.returning.push(packet);
            }
        }
        true
    }

    // ─── Wires ─────────────────────────────────────────────────────────────

    pub fn update_wires(&mut self, dt: f64) {
        let smooth = self.settings.smooth_curves;
        let threshold = self.settings.off_wire_loss_threshold;
        let losses: Vec<(Packet, LossCause)> = self
            .network
            .wires
            .iter_mut()
            .filter_map(|w| w.update_movement(dt, smooth, threshold))
            .collect();
        for (packet, cause) in losses {
            self.lose(packet, cause);
        }
    }

    /// Move packets between ports and wires.
    ///
    /// Per wire, in order:
    /// 1. Pull the source port's packet onto an empty usable wire
    /// 2. A reversing packet back at the source goes to the returning list
    /// 3. An occupant heading into a failed system turns around
    /// 4. An arrived occupant enters the destination port with a pending
    ///    coin award; a Reference destination takes it directly
    pub fn transfer_packets(&mut self) {
        for index in 0..self.network.wires.len() {
            let id = WireId(index as u32);
            self.pull_from_source(id);
            self.deliver_arrival(id);
        }
    }

    fn pull_from_source(&mut self, id: WireId) {
        let Some(wire) = self.network.wire(id) else { return };
        if !wire.can_accept_packet() || !self.network.is_wire_usable(wire) {
            return;
        }
        let source = wire.source;
        if !self.network.port(source).and_then(|p| p.packet()).is_some_and(|p| p.active) {
            return;
        }
        let Some(packet) = self.network.port_mut(source).and_then(|p| p.release_packet()) else { return };
        let rejected = match self.network.wire_mut(id) {
            Some(wire) => wire.accept_packet(packet).err(),
            None => Some(packet),
        };
        if let Some(packet) = rejected {
            self.lose(packet, LossCause::UnknownSystem);
        }
    }

    fn deliver_arrival(&mut self, id: WireId) {
        let Some(wire) = self.network.wire(id) else { return };
        let destination = wire.destination;

        if wire.occupant_returned() {
            if let Some(mut packet) = self.network.wire_mut(id).and_then(|w| w.release_occupant()) {
                packet.retry_destination = true;
                debug!(packet_id = %packet.id, wire = %id, "Packet returned to source");
                self.returning.push(packet);
            }
            return;
        }

        let Some(occupant) = wire.occupant() else { return };
        let target = self.network.system(destination.system).map(|s| (s.kind, s.is_failed()));
        let Some((kind, failed)) = target else { return };
        if failed {
            if !occupant.reversing {
                if let Some(w) = self.network.wire_mut(id) {
                    w.reverse_occupant();
                }
            }
            return;
        }
        if !wire.occupant_arrived() {
            return;
        }

        let port_free = self.network.port(destination).is_some_and(|p| p.can_accept_packet());
        if kind != SystemKind::Reference && !port_free {
            return;
        }
        let Some(mut packet) = self.network.wire_mut(id).and_then(|w| w.release_occupant()) else { return };
        packet.coin_award_pending = true;
        if kind == SystemKind::Reference {
            self.process_packet(destination.system, packet, Some(destination));
            return;
        }
        let rejected = match self.network.port_mut(destination) {
            Some(port) => port.accept_packet(packet).err(),
            None => Some(packet),
        };
        if let Some(packet) = rejected {
            self.lose(packet, LossCause::UnknownSystem);
        }
    }

    // ─── Collisions ────────────────────────────────────────────────────────

    /// Packets on different wires that come into contact pick up noise and
    /// send out an impact wave that pushes nearby wire packets away.
    pub fn resolve_collisions(&mut self) {
        if !self.settings.collisions {
            self.contacts.clear();
            return;
        }
        let moving: Vec<(PacketId, Point2D)> = self
            .network
            .wires()
            .iter()
            .filter_map(|w| w.occupant())
            .filter(|p| p.active)
            .map(|p| (p.id, p.position))
            .collect();

        let mut contacts = BTreeSet::new();
        let mut impacts = Vec::new();
        let mut struck = BTreeSet::new();
        for (i, &(a, pa)) in moving.iter().enumerate() {
            for &(b, pb) in &moving[i + 1..] {
                if pa.distance(&pb) > COLLISION_RADIUS {
                    continue;
                }
                let key = (a.min(b), a.max(b));
                contacts.insert(key);
                if !self.contacts.contains(&key) {
                    impacts.push(pa.lerp(&pb, 0.5));
                    struck.insert(a);
                    struck.insert(b);
                }
            }
        }
        self.contacts = contacts;
        if impacts.is_empty() {
            return;
        }
        debug!(impacts = impacts.len(), "Packet collision");

        for wire in &mut self.network.wires {
            let Some(packet) = wire.occupant_mut() else { continue };
            if struck.contains(&packet.id) {
                packet.noise += COLLISION_NOISE;
            }
            for impact in &impacts {
                let d = packet.position.distance(impact);
                if d > f64::EPSILON && d < IMPACT_RADIUS {
                    let push = (packet.position - *impact).normalized().scale(IMPACT_FORCE * (1.0 - d / IMPACT_RADIUS));
                    packet.position = packet.position + push;
                }
            }
        }
    }

    // ─── Status ────────────────────────────────────────────────────────────

    pub fn connectivity(&self) -> ConnectivityReport {
        let sources: Vec<SystemId> = self.injections.iter().map(|i| i.source).collect();
        ConnectivityAnalyzer::new(&self.network).analyze(&sources, self.policy.lenient_connectivity)
    }

    pub fn is_connected(&self) -> bool {
        self.connectivity().connected
    }

    pub fn is_excessive_failure(&self) -> bool {
        let total = self.network.systems().len();
        total > 0 && self.network.failed_system_count() as f64 / total as f64 >= self.settings.failed_systems_ratio
    }

    /// Re-derive the level status from live topology and counters. Once the
    /// level has finished the status is final.
    pub fn evaluate_status(&mut self) -> LevelStatus {
        if self.status.is_finished() {
            return self.status;
        }
        let status = self.compute_status();
        if status.is_finished() {
            info!(level = %self.name, time = self.time, ?status, "Level finished");
        }
        self.status = status;
        status
    }

    fn compute_status(&self) -> LevelStatus {
        if self.is_excessive_failure() {
            return LevelStatus::GameOver { reason: GameOverReason::ExcessiveFailure };
        }
        if self.stats.injected_units > 0 && self.stats.loss_ratio() > self.settings.packet_loss_ratio {
            return LevelStatus::GameOver { reason: GameOverReason::ExcessiveLoss };
        }
        let pending = self.injections.iter().any(|i| !i.executed);
        let in_flight = self.in_flight_count();
        if (pending || in_flight > 0) && !self.is_connected() {
            return LevelStatus::GameOver { reason: GameOverReason::Disconnected };
        }
        let past_duration = self.time + TIME_EPSILON >= self.duration;
        let past_grace = self.time + TIME_EPSILON >= self.duration + self.policy.completion_grace;
        if past_duration && !pending && (in_flight == 0 || past_grace) {
            return LevelStatus::Completed;
        }
        LevelStatus::Running
    }

    // ─── Wire editing ──────────────────────────────────────────────────────

    pub fn add_bend(&mut self, wire: WireId, position: Point2D) -> Result<f64, WireError> {
        let available = self.stats.remaining_wire_length;
        let w = self.network.wire_mut(wire).ok_or(WireError::UnknownWire(wire))?;
        let delta = w.add_bend(position, available)?;
        self.stats.remaining_wire_length -= delta;
        Ok(delta)
    }

    pub fn move_bend(&mut self, wire: WireId, index: usize, position: Point2D) -> Result<f64, WireError> {
        let available = self.stats.remaining_wire_length;
        let w = self.network.wire_mut(wire).ok_or(WireError::UnknownWire(wire))?;
        let delta = w.move_bend(index, position, available)?;
        self.stats.remaining_wire_length -= delta;
        Ok(delta)
    }

    pub fn remove_bend(&mut self, wire: WireId, index: usize) -> Result<f64, WireError> {
        let w = self.network.wire_mut(wire).ok_or(WireError::UnknownWire(wire))?;
        let delta = w.remove_bend(index)?;
        self.stats.remaining_wire_length -= delta;
        Ok(delta)
    }

    pub fn set_smooth_curves(&mut self, smooth: bool) {
        self.settings.smooth_curves = smooth;
        for wire in &mut self.network.wires {
            wire.set_smooth(smooth);
        }
    }

    // ─── Views ─────────────────────────────────────────────────────────────

    pub fn system_summaries(&self) -> Vec<SystemSummary> {
        self.network
            .systems()
            .iter()
            .map(|s| SystemSummary {
                id: s.id,
                name: s.name.clone(),
                kind: s.kind,
                position: s.position,
                active: s.is_active(),
                failed: s.is_failed(),
                coin_value: s.coin_value(),
                storage: s.storage().iter().map(|p| p.packet_type).collect(),
                ports: s
                    .ports()
                    .map(|p| PortSummary {
                        direction: p.direction,
                        shape: p.shape,
                        position: p.position,
                        connected: p.connected,
                        occupied: p.packet().is_some(),
                    })
                    .collect(),
            })
            .collect()
    }

    pub fn wire_summaries(&self) -> Vec<WireSummary> {
        self.network
            .wires()
            .iter()
            .map(|w| WireSummary {
                id: w.id,
                source: w.source,
                destination: w.destination,
                active: w.is_active(),
                destroyed: w.is_destroyed(),
                bulk_passages: w.bulk_passages(),
                length: w.wire_length(),
                bends: w.bends().iter().map(|b| b.position).collect(),
                path: w.path().points().to_vec(),
                occupant: w.occupant().map(PacketView::from),
            })
            .collect()
    }
}
