// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Wirenet Simulation Core - System Routing State Machine

use std::collections::BTreeSet;

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;

use crate::packet::{Packet, BIT_COLOR_COUNT};
use crate::simulation::Simulation;
use crate::system::{ANTI_TROJAN_COOLDOWN, SPEED_DAMAGE_COOLDOWN};
use crate::types::{LossCause, PacketLocation, PacketType, PortDirection, PortRef, PortShape, SystemId, SystemKind};

/// Radius of an anti-trojan sweep (px).
pub const ANTI_TROJAN_RADIUS: f64 = 100.0;

/// Chance that a saboteur turns a packet into a trojan.
pub const TROJAN_PROBABILITY: f64 = 0.3;

/// Noise floor a saboteur forces onto the packets it handles.
const SABOTEUR_NOISE: f64 = 1.0;

/// Where a packet ended up after a system handled it.
#[derive(Debug, Clone)]
pub enum Disposition {
    Forwarded { port: PortRef },
    Stored { system: SystemId },
    Delivered(Packet),
    Lost { packet: Packet, cause: LossCause },
    /// Moved to another spy and routed there.
    Teleported { to: SystemId, outcome: Box<Disposition> },
    /// A bulk packet was absorbed and replaced by bits in storage.
    Split { group_id: u64, bits: u32 },
    /// A bit is waiting in the merge buffer for the rest of its group.
    Buffered { group_id: u64 },
    /// A group of bits was reassembled; `outcome` is the new messenger's.
    Merged { group_id: u64, outcome: Box<Disposition> },
    /// The packet was already inactive and was not touched.
    Ignored(Packet),
}

impl Disposition {
    /// The innermost outcome, looking through teleports and merges.
    pub fn settled(&self) -> &Disposition {
        match self {
            Self::Teleported { outcome, .. } | Self::Merged { outcome, .. } => outcome.settled(),
            other => other,
        }
    }

    pub fn loss_cause(&self) -> Option<LossCause> {
        match self.settled() {
            Self::Lost { cause, .. } => Some(*cause),
            _ => None,
        }
    }

    pub fn is_lost(&self) -> bool {
        self.loss_cause().is_some()
    }
}

impl Simulation {
    /// Run a packet through a system.
    ///
    /// Order of checks:
    /// 1. Pending coin award is credited to the system
    /// 2. Reference systems deliver (bits are lost there)
    /// 3. Arrival above the speed-damage threshold deactivates the system
    ///    and loses the packet
    /// 4. Bulk packets destroy everything else the system holds and
    ///    scramble the entry port's shape
    /// 5. Confidential packets slow down when the system is not empty
    /// 6. Variant behaviour, then output routing
    pub fn process_packet(&mut self, system: SystemId, mut packet: Packet, entry: Option<PortRef>) -> Disposition {
        let Some(kind) = self.network.system(system).map(|s| s.kind) else {
            return self.lose(packet, LossCause::UnknownSystem);
        };
        if kind == SystemKind::Reference && packet.processed_by_reference_system {
            return Disposition::Delivered(packet);
        }
        if !packet.active {
            return Disposition::Ignored(packet);
        }

        self.award_pending_coin(system, &mut packet);
        if kind == SystemKind::Reference {
            return self.deliver(system, packet);
        }

        if self.policy.speed_damage && packet.speed() > self.settings.speed_damage_threshold {
            if let Some(s) = self.network.system_mut(system) {
                s.deactivate(SPEED_DAMAGE_COOLDOWN);
            }
            return self.lose(packet, LossCause::SpeedDamage);
        }

        packet.speed_multiplier = 1.0;
        if packet.packet_type.is_bulk() {
            // distributors reshape their own ports when splitting
            let scrambled = entry.filter(|_| kind != SystemKind::Distributor);
            self.bulk_collateral(system, scrambled);
        }
        if packet.packet_type.is_confidential()
            && self.network.system(system).is_some_and(|s| s.holds_other_packets(packet.id))
        {
            packet.velocity = packet.velocity.scale(0.5);
            packet.speed_multiplier *= 0.5;
        }

        let outcome = match kind {
            SystemKind::Spy => self.spy_intercept(system, packet),
            SystemKind::Saboteur => self.sabotage(system, packet),
            SystemKind::Vpn => {
                packet.protect();
                self.route_out(system, packet, false)
            }
            SystemKind::Distributor if packet.packet_type.is_bulk() => self.split_bulk(system, packet),
            SystemKind::Merger if packet.packet_type == PacketType::BitPacket => self.merge_bit(system, packet),
            _ => self.route_out(system, packet, false),
        };

        if kind == SystemKind::AntiTrojan {
            self.anti_trojan_sweep(system);
        }
        outcome
    }

    // ─── Terminal transitions ──────────────────────────────────────────────

    pub(crate) fn lose(&mut self, mut packet: Packet, cause: LossCause) -> Disposition {
        packet.mark_lost();
        self.stats.record_loss(&packet, cause);
        debug!(packet_id = %packet.id, packet_type = ?packet.packet_type, ?cause, "Packet lost");
        Disposition::Lost { packet, cause }
    }

    fn deliver(&mut self, system: SystemId, mut packet: Packet) -> Disposition {
        if packet.packet_type == PacketType::BitPacket {
            return self.lose(packet, LossCause::BitAtReference);
        }
        packet.processed_by_reference_system = true;
        packet.deactivate();
        self.stats.record_delivery(&packet);
        debug!(packet_id = %packet.id, system = %system, units = packet.units(), "Packet delivered");
        Disposition::Delivered(packet)
    }

    fn award_pending_coin(&mut self, system: SystemId, packet: &mut Packet) {
        if !packet.coin_award_pending {
            return;
        }
        packet.coin_award_pending = false;
        let coins = packet.coin_value();
        debug!(packet_id = %packet.id, system = %system, coins, "Coins awarded");
        self.stats.record_coins(coins);
    }

    // ─── Output routing ────────────────────────────────────────────────────

    /// Place on an output port, else store, else lose.
    pub(crate) fn route_out(&mut self, system: SystemId, packet: Packet, prefer_incompatible: bool) -> Disposition {
        match self.place_on_output(system, packet, prefer_incompatible) {
            Ok(port) => Disposition::Forwarded { port },
            Err(packet) => self.store_or_lose(system, packet),
        }
    }

    fn store_or_lose(&mut self, system: SystemId, packet: Packet) -> Disposition {
        let Some(s) = self.network.system_mut(system) else {
            return self.lose(packet, LossCause::UnknownSystem);
        };
        match s.store(packet) {
            Ok(()) => Disposition::Stored { system },
            Err(packet) => self.lose(packet, LossCause::StorageOverflow),
        }
    }

    /// Choose an output port and put the packet into it.
    ///
    /// Candidates are empty, connected output ports whose wire is usable and
    /// whose downstream system is active. The preferred tier is the
    /// compatible ports (incompatible ones for a saboteur); when it is empty
    /// any candidate will do. The pick within a tier is uniform.
    pub(crate) fn place_on_output(
        &mut self,
        system: SystemId,
        mut packet: Packet,
        prefer_incompatible: bool,
    ) -> Result<PortRef, Packet> {
        let Some(sys) = self.network.system(system) else {
            return Err(packet);
        };
        let mut preferred = Vec::new();
        let mut any = Vec::new();
        for port in &sys.outputs {
            if !port.can_accept_packet() || !port.connected {
                continue;
            }
            let Some(wire) = port.wire.and_then(|w| self.network.wire(w)) else {
                continue;
            };
            if !self.network.is_wire_usable(wire) {
                continue;
            }
            if !self.network.system(wire.destination.system).is_some_and(|d| d.is_active()) {
                continue;
            }
            let compatible = port.is_compatible_with(packet.packet_type);
            any.push((port.port_ref(), compatible));
            if compatible != prefer_incompatible {
                preferred.push((port.port_ref(), compatible));
            }
        }

        let pool = if preferred.is_empty() { &any } else { &preferred };
        let Some(&(port, compatible)) = pool.choose(&mut self.rng) else {
            return Err(packet);
        };

        if !compatible && packet.packet_type.doubles_on_mismatch() {
            packet.speed_multiplier *= 2.0;
        }
        packet.acceleration = packet.packet_type.acceleration(compatible);
        packet.retry_destination = false;
        debug!(packet_id = %packet.id, %port, compatible, "Packet placed on output port");
        match self.network.port_mut(port) {
            Some(slot) => slot.accept_packet(packet).map(|()| port),
            None => Err(packet),
        }
    }

    // ─── Variant behaviour ─────────────────────────────────────────────────

    fn bulk_collateral(&mut self, system: SystemId, entry: Option<PortRef>) {
        let drained = match self.network.system_mut(system) {
            Some(s) => s.drain_held_packets(),
            None => return,
        };
        for packet in drained {
            self.lose(packet, LossCause::BulkCollateral);
        }
        if let Some(entry) = entry {
            self.reshape_port(entry);
        }
    }

    fn spy_intercept(&mut self, system: SystemId, mut packet: Packet) -> Disposition {
        match packet.packet_type {
            PacketType::Confidential | PacketType::ConfidentialProtected => {
                self.lose(packet, LossCause::SpyInterception)
            }
            PacketType::Protected => {
                packet.unwrap_protection();
                self.route_out(system, packet, false)
            }
            _ => {
                let spies: Vec<SystemId> = self
                    .network
                    .systems_of_kind(SystemKind::Spy)
                    .filter(|s| !s.is_failed())
                    .map(|s| s.id)
                    .collect();
                let to = spies.choose(&mut self.rng).copied().unwrap_or(system);
                if let Some(position) = self.network.system(to).map(|s| s.position) {
                    packet.position = position;
                }
                debug!(packet_id = %packet.id, from = %system, %to, "Packet teleported between spies");
                let outcome = self.route_out(to, packet, false);
                Disposition::Teleported { to, outcome: Box::new(outcome) }
            }
        }
    }

    fn sabotage(&mut self, system: SystemId, mut packet: Packet) -> Disposition {
        if packet.packet_type == PacketType::Protected {
            return self.route_out(system, packet, false);
        }
        packet.noise = packet.noise.max(SABOTEUR_NOISE);
        if packet.packet_type != PacketType::Trojan && self.rng.gen_bool(TROJAN_PROBABILITY) {
            debug!(packet_id = %packet.id, from = ?packet.packet_type, "Packet infected");
            packet.convert_to(PacketType::Trojan);
        }
        self.route_out(system, packet, true)
    }

    fn split_bulk(&mut self, system: SystemId, mut packet: Packet) -> Disposition {
        let Some(position) = self.network.system(system).map(|s| s.position) else {
            return self.lose(packet, LossCause::UnknownSystem);
        };
        let group_id = self.next_group_id;
        self.next_group_id += 1;
        let color = self.rng.gen_range(0..BIT_COLOR_COUNT);
        let count = packet.size;

        let bits: Vec<Packet> = (0..count)
            .map(|_| {
                let mut bit = Packet::new(self.alloc_packet_id(), PacketType::BitPacket, position, self.settings.max_travel_time);
                bit.group_id = Some(group_id);
                bit.color_index = Some(color);
                bit
            })
            .collect();
        if let Some(s) = self.network.system_mut(system) {
            for bit in bits {
                s.store_unbounded(bit);
            }
        }
        packet.deactivate();
        self.reshape_random_port(system, PortDirection::Input);
        self.reshape_random_port(system, PortDirection::Output);
        debug!(packet_id = %packet.id, system = %system, group_id, bits = count, "Bulk packet split into bits");
        Disposition::Split { group_id, bits: count }
    }

    fn merge_bit(&mut self, system: SystemId, packet: Packet) -> Disposition {
        let group_id = packet.group_id.unwrap_or(0);
        let color = packet.color_index.unwrap_or(0);
        let target = PacketType::messenger_for_color(color);
        let needed = target.default_size() as usize;

        let Some(s) = self.network.system_mut(system) else {
            return self.lose(packet, LossCause::UnknownSystem);
        };
        let position = s.position;
        let buffer = s.merge_buffer.entry(group_id).or_default();
        buffer.push(packet);
        if buffer.len() < needed {
            return Disposition::Buffered { group_id };
        }
        buffer.drain(..needed).for_each(drop);
        if buffer.is_empty() {
            s.merge_buffer.remove(&group_id);
        }

        let mut merged = Packet::new(self.alloc_packet_id(), target, position, self.settings.max_travel_time);
        merged.group_id = Some(group_id);
        merged.color_index = Some(color);
        debug!(packet_id = %merged.id, system = %system, group_id, packet_type = ?target, "Bits merged");
        let outcome = self.route_out(system, merged, false);
        Disposition::Merged { group_id, outcome: Box::new(outcome) }
    }

    /// Merge the leftovers of every buffered group that has no bits left in
    /// transit. Such a group can never complete, so its bits become a
    /// messenger of matching size.
    pub(crate) fn flush_stale_merges(&mut self) -> usize {
        let in_transit: BTreeSet<u64> = self
            .network
            .packets()
            .into_iter()
            .filter(|(location, _)| !matches!(location, PacketLocation::MergeBuffer { .. }))
            .map(|(_, p)| p)
            .chain(self.returning.iter())
            .filter(|p| p.active && p.packet_type == PacketType::BitPacket)
            .filter_map(|p| p.group_id)
            .collect();
        let stale: Vec<(SystemId, u64)> = self
            .network
            .systems_of_kind(SystemKind::Merger)
            .filter(|s| s.is_active())
            .flat_map(|s| s.merge_buffer().keys().map(move |&g| (s.id, g)))
            .filter(|(_, g)| !in_transit.contains(g))
            .collect();

        let mut flushed = 0;
        for (system, group_id) in stale {
            let Some(s) = self.network.system_mut(system) else { continue };
            let position = s.position;
            let Some(bits) = s.merge_buffer.remove(&group_id) else { continue };
            let Some(color) = bits.first().and_then(|b| b.color_index) else { continue };
            let target = PacketType::messenger_for_size(bits.len());
            let mut merged = Packet::new(self.alloc_packet_id(), target, position, self.settings.max_travel_time);
            merged.group_id = Some(group_id);
            merged.color_index = Some(color);
            debug!(packet_id = %merged.id, system = %system, group_id, bits = bits.len(), packet_type = ?target, "Incomplete group merged");
            self.route_out(system, merged, false);
            flushed += 1;
        }
        flushed
    }

    /// Convert every trojan within range of an active anti-trojan system.
    /// Any conversion puts the system on cooldown.
    pub(crate) fn anti_trojan_sweep(&mut self, system: SystemId) -> usize {
        let Some(center) = self
            .network
            .system(system)
            .filter(|s| s.is_active())
            .map(|s| s.position)
        else {
            return 0;
        };
        let mut converted = 0;
        let mut convert = |p: &mut Packet| {
            if p.active && p.packet_type == PacketType::Trojan && p.position.distance(&center) <= ANTI_TROJAN_RADIUS {
                p.convert_to(PacketType::SquareMessenger);
                converted += 1;
            }
        };
        self.network.for_each_packet_mut(&mut convert);
        for p in self.returning.iter_mut() {
            convert(p);
        }
        if converted > 0 {
            if let Some(s) = self.network.system_mut(system) {
                s.deactivate(ANTI_TROJAN_COOLDOWN);
            }
            debug!(system = %system, converted, "Trojans repaired");
        }
        converted
    }

    // ─── Port reshaping ────────────────────────────────────────────────────

    fn reshape_port(&mut self, port: PortRef) {
        let Some(current) = self.network.port(port).map(|p| p.shape) else {
            return;
        };
        let others: Vec<PortShape> = PortShape::ALL.into_iter().filter(|&s| s != current).collect();
        let shape = others.choose(&mut self.rng).copied().unwrap_or(current);
        if let Some(p) = self.network.port_mut(port) {
            p.shape = shape;
        }
    }

    fn reshape_random_port(&mut self, system: SystemId, direction: PortDirection) {
        let count = match (self.network.system(system), direction) {
            (Some(s), PortDirection::Input) => s.inputs.len(),
            (Some(s), PortDirection::Output) => s.outputs.len(),
            (None, _) => 0,
        };
        if count == 0 {
            return;
        }
        let index = self.rng.gen_range(0..count);
        self.reshape_port(PortRef { system, direction, index });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::LevelDefinition;
    use crate::settings::LevelPolicy;
    use crate::types::{PacketId, Point2D, Vec2D};

    fn sim(level: LevelDefinition) -> Simulation {
        Simulation::from_level(&level, 7)
    }

    fn packet(id: u64, t: PacketType) -> Packet {
        Packet::new(PacketId(1000 + id), t, Point2D::default(), 30.0)
    }

    /// `a` (kind under test) with two outputs feeding two references.
    fn fan_out(kind: SystemKind, shapes: [PortShape; 2]) -> LevelDefinition {
        LevelDefinition::new("fan", 10.0)
            .system("a", kind, (0.0, 0.0), &[PortShape::Square], &shapes)
            .system("r0", SystemKind::Reference, (200.0, -50.0), &[shapes[0]], &[])
            .system("r1", SystemKind::Reference, (200.0, 50.0), &[shapes[1]], &[])
            .wire("a", 0, "r0", 0)
            .wire("a", 1, "r1", 0)
    }

    fn output_packet_type(sim: &Simulation, port: PortRef) -> Option<PacketType> {
        sim.network.port(port).and_then(|p| p.packet()).map(|p| p.packet_type)
    }

    #[test]
    fn test_prefers_compatible_port() {
        for seed in 0..20 {
            let mut s = Simulation::from_level(&fan_out(SystemKind::Normal, [PortShape::Triangle, PortShape::Square]), seed);
            let out = s.process_packet(SystemId(0), packet(1, PacketType::SquareMessenger), None);
            assert!(matches!(out, Disposition::Forwarded { port } if port.index == 1));
        }
    }

    #[test]
    fn test_incompatible_port_doubles_exit_speed() {
        let mut s = sim(fan_out(SystemKind::Normal, [PortShape::Triangle, PortShape::Triangle]));
        let out = s.process_packet(SystemId(0), packet(1, PacketType::SquareMessenger), None);
        let Disposition::Forwarded { port } = out else { panic!("expected forward, got {:?}", out) };
        let placed = s.network.port(port).and_then(|p| p.packet()).unwrap();
        assert_eq!(placed.speed_multiplier, 2.0);
    }

    #[test]
    fn test_storage_then_overflow() {
        let level = LevelDefinition::new("store", 10.0).system("a", SystemKind::Normal, (0.0, 0.0), &[], &[]);
        let mut s = sim(level);
        for i in 0..5 {
            let out = s.process_packet(SystemId(0), packet(i, PacketType::SquareMessenger), None);
            assert!(matches!(out, Disposition::Stored { .. }));
        }
        let out = s.process_packet(SystemId(0), packet(9, PacketType::SquareMessenger), None);
        assert_eq!(out.loss_cause(), Some(LossCause::StorageOverflow));
        assert_eq!(s.stats.losses(LossCause::StorageOverflow), 1);
    }

    #[test]
    fn test_reference_delivery_is_idempotent() {
        let mut s = sim(fan_out(SystemKind::Normal, [PortShape::Square, PortShape::Square]));
        let mut p = packet(1, PacketType::SquareMessenger);
        p.coin_award_pending = true;
        let Disposition::Delivered(p) = s.process_packet(SystemId(1), p, None) else { panic!() };
        assert!(p.processed_by_reference_system);
        let again = s.process_packet(SystemId(1), p, None);
        assert!(matches!(again, Disposition::Delivered(_)));
        assert_eq!(s.stats.delivered_packets, 1);
        assert_eq!(s.stats.coins, 2);
    }

    #[test]
    fn test_bit_lost_at_reference() {
        let mut s = sim(fan_out(SystemKind::Normal, [PortShape::Square, PortShape::Square]));
        let out = s.process_packet(SystemId(1), packet(1, PacketType::BitPacket), None);
        assert_eq!(out.loss_cause(), Some(LossCause::BitAtReference));
    }

    #[test]
    fn test_speed_damage() {
        let mut s = sim(fan_out(SystemKind::Normal, [PortShape::Square, PortShape::Square]));
        let mut p = packet(1, PacketType::SquareMessenger);
        p.velocity = Vec2D::new(160.0, 0.0);
        let out = s.process_packet(SystemId(0), p, None);
        assert_eq!(out.loss_cause(), Some(LossCause::SpeedDamage));
        assert!(!s.network.system(SystemId(0)).unwrap().is_active());
    }

    #[test]
    fn test_speed_damage_disabled_by_policy() {
        let policy = LevelPolicy { speed_damage: false, ..LevelPolicy::default() };
        let mut s = sim(fan_out(SystemKind::Normal, [PortShape::Square, PortShape::Square]).with_policy(policy));
        let mut p = packet(1, PacketType::SquareMessenger);
        p.velocity = Vec2D::new(500.0, 0.0);
        assert!(!s.process_packet(SystemId(0), p, None).is_lost());
    }

    #[test]
    fn test_bulk_collateral_and_port_scramble() {
        let mut s = sim(fan_out(SystemKind::Normal, [PortShape::Square, PortShape::Square]));
        let a = SystemId(0);
        s.network.system_mut(a).unwrap().store(packet(1, PacketType::SquareMessenger)).unwrap();
        s.network.system_mut(a).unwrap().outputs[0].accept_packet(packet(2, PacketType::SquareMessenger)).unwrap();
        let entry = PortRef::input(a, 0);
        s.process_packet(a, packet(3, PacketType::BulkSmall), Some(entry));
        assert_eq!(s.stats.losses(LossCause::BulkCollateral), 2);
        assert_ne!(s.network.port(entry).unwrap().shape, PortShape::Square);
    }

    #[test]
    fn test_confidential_slows_in_busy_system() {
        let level = LevelDefinition::new("busy", 10.0).system("a", SystemKind::Normal, (0.0, 0.0), &[], &[]);
        let mut s = sim(level);
        s.network.system_mut(SystemId(0)).unwrap().store(packet(1, PacketType::SquareMessenger)).unwrap();
        let mut p = packet(2, PacketType::Confidential);
        p.velocity = Vec2D::new(60.0, 0.0);
        s.process_packet(SystemId(0), p, None);
        let stored = s.network.system(SystemId(0)).unwrap().storage().back().unwrap();
        assert_eq!(stored.speed_multiplier, 0.5);
        assert_eq!(stored.velocity, Vec2D::new(30.0, 0.0));
    }

    #[test]
    fn test_spy_destroys_confidential_without_teleport() {
        let level = LevelDefinition::new("spy", 10.0)
            .system("s1", SystemKind::Spy, (0.0, 0.0), &[], &[])
            .system("s2", SystemKind::Spy, (300.0, 0.0), &[], &[]);
        let mut s = sim(level);
        let out = s.process_packet(SystemId(0), packet(1, PacketType::Confidential), None);
        assert!(matches!(out, Disposition::Lost { cause: LossCause::SpyInterception, .. }));
        assert_eq!(s.network.system(SystemId(1)).unwrap().held_packet_count(), 0);
        assert_eq!(s.network.system(SystemId(0)).unwrap().held_packet_count(), 0);
    }

    #[test]
    fn test_spy_teleports_to_live_spy() {
        let level = LevelDefinition::new("spy", 10.0)
            .system("s1", SystemKind::Spy, (0.0, 0.0), &[], &[])
            .system("s2", SystemKind::Spy, (300.0, 0.0), &[], &[])
            .system("s3", SystemKind::Spy, (600.0, 0.0), &[], &[]);
        let mut s = sim(level);
        s.fail_system(SystemId(2));
        for i in 0..10 {
            let out = s.process_packet(SystemId(0), packet(i, PacketType::SmallMessenger), None);
            let Disposition::Teleported { to, .. } = out else { panic!("{:?}", out) };
            assert_ne!(to, SystemId(2));
        }
    }

    #[test]
    fn test_vpn_then_spy_unwraps() {
        let level = LevelDefinition::new("vpn", 10.0)
            .system("v", SystemKind::Vpn, (0.0, 0.0), &[], &[])
            .system("s", SystemKind::Spy, (300.0, 0.0), &[], &[]);
        let mut s = sim(level);
        let out = s.process_packet(SystemId(0), packet(1, PacketType::SquareMessenger), None);
        assert!(matches!(out, Disposition::Stored { .. }));
        let protected = s.network.system_mut(SystemId(0)).unwrap().take_stored().unwrap();
        assert_eq!(protected.packet_type, PacketType::Protected);
        assert_eq!(protected.size, 4);

        let out = s.process_packet(SystemId(1), protected, None);
        assert!(matches!(out, Disposition::Stored { system } if system == SystemId(1)));
        let restored = s.network.system(SystemId(1)).unwrap().storage().front().unwrap();
        assert_eq!(restored.packet_type, PacketType::SquareMessenger);
        assert_eq!(restored.size, 2);
    }

    #[test]
    fn test_saboteur_prefers_incompatible_port() {
        for seed in 0..20 {
            let mut s = Simulation::from_level(&fan_out(SystemKind::Saboteur, [PortShape::Square, PortShape::Triangle]), seed);
            let out = s.process_packet(SystemId(0), packet(1, PacketType::SquareMessenger), None);
            let Disposition::Forwarded { port } = out else { panic!("{:?}", out) };
            let placed = s.network.port(port).and_then(|p| p.packet()).unwrap();
            assert!(placed.noise >= 1.0);
            if placed.packet_type == PacketType::SquareMessenger {
                assert_eq!(port.index, 1, "seed {}", seed);
            }
        }
    }

    #[test]
    fn test_saboteur_noise_is_a_floor() {
        let mut s = sim(fan_out(SystemKind::Saboteur, [PortShape::Square, PortShape::Triangle]));
        let mut noisy = packet(1, PacketType::Confidential);
        noisy.noise = 2.0;
        let Disposition::Forwarded { port } = s.process_packet(SystemId(0), noisy, None) else { panic!() };
        assert_eq!(s.network.port(port).and_then(|p| p.packet()).unwrap().noise, 2.0);

        let mut quiet = packet(2, PacketType::Confidential);
        quiet.noise = 0.25;
        let Disposition::Forwarded { port } = s.process_packet(SystemId(0), quiet, None) else { panic!() };
        assert_eq!(s.network.port(port).and_then(|p| p.packet()).unwrap().noise, 1.0);
    }

    #[test]
    fn test_saboteur_spares_protected() {
        let mut s = sim(fan_out(SystemKind::Saboteur, [PortShape::Square, PortShape::Triangle]));
        let mut p = packet(1, PacketType::SquareMessenger);
        p.protect();
        let Disposition::Forwarded { port } = s.process_packet(SystemId(0), p, None) else { panic!() };
        let placed = s.network.port(port).and_then(|p| p.packet()).unwrap();
        assert_eq!(placed.noise, 0.0);
        assert_eq!(placed.packet_type, PacketType::Protected);
    }

    #[test]
    fn test_distributor_splits_bulk_into_group() {
        let level = LevelDefinition::new("dist", 10.0)
            .system("d", SystemKind::Distributor, (0.0, 0.0), &[PortShape::Square], &[PortShape::Square]);
        let mut s = sim(level);
        let out = s.process_packet(SystemId(0), packet(1, PacketType::BulkSmall), Some(PortRef::input(SystemId(0), 0)));
        let Disposition::Split { group_id, bits } = out else { panic!("{:?}", out) };
        assert_eq!(bits, 8);
        let storage = s.network.system(SystemId(0)).unwrap().storage();
        assert_eq!(storage.len(), 8);
        let color = storage[0].color_index;
        assert!(storage.iter().all(|b| b.packet_type == PacketType::BitPacket
            && b.group_id == Some(group_id)
            && b.color_index == color));
        assert_eq!(s.stats.lost_packets, 0);
    }

    #[test]
    fn test_distributor_reshapes_one_input_and_one_output() {
        for seed in 0..20 {
            let level = LevelDefinition::new("dist", 10.0).system(
                "d",
                SystemKind::Distributor,
                (0.0, 0.0),
                &[PortShape::Square, PortShape::Square],
                &[PortShape::Square],
            );
            let mut s = Simulation::from_level(&level, seed);
            let d = SystemId(0);
            s.process_packet(d, packet(1, PacketType::BulkSmall), Some(PortRef::input(d, 0)));
            let system = s.network.system(d).unwrap();
            let changed_inputs = system.inputs.iter().filter(|p| p.shape != PortShape::Square).count();
            assert_eq!(changed_inputs, 1, "seed {}", seed);
            assert_ne!(system.outputs[0].shape, PortShape::Square);
        }
    }

    #[test]
    fn test_merger_reassembles_group() {
        let level = LevelDefinition::new("merge", 10.0).system("m", SystemKind::Merger, (0.0, 0.0), &[], &[]);
        let mut s = sim(level);
        // color 2 -> triangle messenger, three bits
        let bit = |id| {
            let mut b = packet(id, PacketType::BitPacket);
            b.group_id = Some(4);
            b.color_index = Some(2);
            b
        };
        assert!(matches!(s.process_packet(SystemId(0), bit(1), None), Disposition::Buffered { group_id: 4 }));
        assert!(matches!(s.process_packet(SystemId(0), bit(2), None), Disposition::Buffered { .. }));
        let out = s.process_packet(SystemId(0), bit(3), None);
        assert!(matches!(out, Disposition::Merged { group_id: 4, .. }));
        let system = s.network.system(SystemId(0)).unwrap();
        assert!(system.merge_buffer().is_empty());
        assert_eq!(system.storage().front().map(|p| p.packet_type), Some(PacketType::TriangleMessenger));
    }

    fn group_bit(id: u64, group: u64, color: u8) -> Packet {
        let mut b = packet(id, PacketType::BitPacket);
        b.group_id = Some(group);
        b.color_index = Some(color);
        b
    }

    #[test]
    fn test_merger_flushes_incomplete_group() {
        let level = LevelDefinition::new("merge", 10.0).system("m", SystemKind::Merger, (0.0, 0.0), &[], &[]);
        let mut s = sim(level);
        // eight bits of a triangle group: two full messengers, two bits left
        let merged = (0..8)
            .map(|i| s.process_packet(SystemId(0), group_bit(i, 6, 2), None))
            .filter(|out| matches!(out, Disposition::Merged { .. }))
            .count();
        assert_eq!(merged, 2);
        assert_eq!(s.network.system(SystemId(0)).unwrap().merge_buffer()[&6].len(), 2);

        assert_eq!(s.flush_stale_merges(), 1);
        let system = s.network.system(SystemId(0)).unwrap();
        assert!(system.merge_buffer().is_empty());
        let stored: Vec<PacketType> = system.storage().iter().map(|p| p.packet_type).collect();
        assert_eq!(
            stored,
            vec![PacketType::TriangleMessenger, PacketType::TriangleMessenger, PacketType::SquareMessenger]
        );
        assert_eq!(s.stats.lost_packets, 0);
    }

    #[test]
    fn test_merger_waits_while_bits_in_transit() {
        let level = LevelDefinition::new("merge", 10.0)
            .system("m", SystemKind::Merger, (0.0, 0.0), &[], &[])
            .system("n", SystemKind::Normal, (300.0, 0.0), &[], &[]);
        let mut s = sim(level);
        s.process_packet(SystemId(0), group_bit(1, 3, 2), None);
        s.network.system_mut(SystemId(1)).unwrap().store(group_bit(2, 3, 2)).unwrap();
        s.update_systems(0.0);
        assert_eq!(s.network.system(SystemId(0)).unwrap().merge_buffer()[&3].len(), 1);

        s.network.system_mut(SystemId(1)).unwrap().take_stored();
        s.update_systems(0.0);
        let system = s.network.system(SystemId(0)).unwrap();
        assert!(system.merge_buffer().is_empty());
        assert_eq!(system.storage().front().map(|p| p.packet_type), Some(PacketType::SmallMessenger));
    }

    #[test]
    fn test_anti_trojan_converts_and_cools_down() {
        let level = LevelDefinition::new("at", 10.0)
            .system("a", SystemKind::AntiTrojan, (0.0, 0.0), &[], &[])
            .system("n", SystemKind::Normal, (50.0, 0.0), &[], &[])
            .system("far", SystemKind::Normal, (500.0, 0.0), &[], &[]);
        let mut s = sim(level);
        let mut near = packet(1, PacketType::Trojan);
        near.position = Point2D::new(50.0, 0.0);
        s.network.system_mut(SystemId(1)).unwrap().store(near).unwrap();
        let mut far = packet(2, PacketType::Trojan);
        far.position = Point2D::new(500.0, 0.0);
        s.network.system_mut(SystemId(2)).unwrap().store(far).unwrap();

        assert_eq!(s.anti_trojan_sweep(SystemId(0)), 1);
        assert_eq!(output_packet_type_in_storage(&s, SystemId(1)), Some(PacketType::SquareMessenger));
        assert_eq!(output_packet_type_in_storage(&s, SystemId(2)), Some(PacketType::Trojan));
        assert!(!s.network.system(SystemId(0)).unwrap().is_active());
        // on cooldown: no further sweeps
        assert_eq!(s.anti_trojan_sweep(SystemId(0)), 0);
    }

    fn output_packet_type_in_storage(sim: &Simulation, system: SystemId) -> Option<PacketType> {
        sim.network.system(system).and_then(|s| s.storage().front()).map(|p| p.packet_type)
    }

    #[test]
    fn test_downstream_inactive_port_is_skipped() {
        let mut s = sim(fan_out(SystemKind::Normal, [PortShape::Square, PortShape::Square]));
        s.network.system_mut(SystemId(1)).unwrap().deactivate(5.0);
        for i in 0..4 {
            let out = s.process_packet(SystemId(0), packet(i, PacketType::SquareMessenger), None);
            if let Disposition::Forwarded { port } = out {
                assert_eq!(port.index, 1);
            }
        }
        assert!(output_packet_type(&s, PortRef::output(SystemId(0), 0)).is_none());
    }
}
