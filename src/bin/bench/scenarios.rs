// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Wirenet Bench - Scenario Definitions
//
// Every scenario is a static level layout plus a traffic profile. Packets are
// scheduled by the bench's Poisson generator, never by the layout itself.

use wirenet_engine::{GameOverReason, LevelDefinition, LevelStatus, PacketType, PortShape, SystemKind};

const SQ: &[PortShape] = &[PortShape::Square];
const TRI: &[PortShape] = &[PortShape::Triangle];
const SQ2: &[PortShape] = &[PortShape::Square, PortShape::Square];
const MIXED: &[PortShape] = &[PortShape::Square, PortShape::Triangle];

// ─── Scenario Configuration ─────────────────────────────────────────────────

pub struct Scenario {
    pub name: &'static str,
    pub label: &'static str,
    pub category: &'static str,
    pub level: fn() -> LevelDefinition,
    /// System ids that receive generated traffic.
    pub sources: &'static [&'static str],
    /// Expected packets per simulated second across all sources.
    pub lambda: f64,
    /// Relative weights of each packet type in the generated traffic.
    pub mix: &'static [(PacketType, f64)],
    /// Traffic is generated in `[0, injection_window)`.
    pub injection_window: f64,
    /// Systems failed at a simulated time.
    pub failures: &'static [(f64, &'static str)],
    pub criteria: PassCriteria,
}

pub struct PassCriteria {
    pub max_loss_ratio: Option<f64>,
    pub min_delivery_rate: Option<f64>,
    pub expected_status: Option<LevelStatus>,
    pub require_single_occupancy: bool,
}

impl Default for PassCriteria {
    fn default() -> Self {
        Self {
            max_loss_ratio: None,
            min_delivery_rate: None,
            expected_status: Some(LevelStatus::Completed),
            require_single_occupancy: true,
        }
    }
}

// ─── Layouts ────────────────────────────────────────────────────────────────

fn chain_level() -> LevelDefinition {
    LevelDefinition::new("chain", 20.0)
        .system("src", SystemKind::Normal, (0.0, 200.0), &[], SQ)
        .system("relay", SystemKind::Normal, (250.0, 200.0), SQ, SQ)
        .system("dst", SystemKind::Reference, (500.0, 200.0), SQ, &[])
        .wire("src", 0, "relay", 0)
        .wire("relay", 0, "dst", 0)
}

fn redundant_level() -> LevelDefinition {
    LevelDefinition::new("redundant", 25.0)
        .system("src", SystemKind::Normal, (0.0, 200.0), &[], SQ2)
        .system("upper", SystemKind::Normal, (250.0, 80.0), SQ, SQ)
        .system("lower", SystemKind::Normal, (250.0, 320.0), SQ, SQ)
        .system("dst", SystemKind::Reference, (500.0, 200.0), SQ2, &[])
        .wire("src", 0, "upper", 0)
        .wire("src", 1, "lower", 0)
        .wire("upper", 0, "dst", 0)
        .wire("lower", 0, "dst", 1)
}

fn curved_level() -> LevelDefinition {
    LevelDefinition::new("curved", 20.0)
        .system("src", SystemKind::Normal, (0.0, 200.0), &[], MIXED)
        .system("dst", SystemKind::Reference, (600.0, 200.0), MIXED, &[])
        .wire_with_bends("src", 0, "dst", 0, &[(150.0, 60.0), (300.0, 340.0), (450.0, 60.0)])
        .wire_with_bends("src", 1, "dst", 1, &[(300.0, 420.0)])
}

fn hostile_level() -> LevelDefinition {
    LevelDefinition::new("hostile", 30.0)
        .system("src", SystemKind::Normal, (0.0, 200.0), &[], MIXED)
        .system("vpn", SystemKind::Vpn, (200.0, 120.0), SQ, SQ)
        .system("saboteur", SystemKind::Saboteur, (200.0, 300.0), TRI, MIXED)
        .system("spy_a", SystemKind::Spy, (400.0, 120.0), SQ, SQ)
        .system("spy_b", SystemKind::Spy, (400.0, 300.0), SQ, SQ)
        .system("guard", SystemKind::AntiTrojan, (400.0, 420.0), &[], &[])
        .system("dst", SystemKind::Reference, (650.0, 200.0), SQ2, &[])
        .wire("src", 0, "vpn", 0)
        .wire("src", 1, "saboteur", 0)
        .wire("vpn", 0, "spy_a", 0)
        .wire("saboteur", 0, "spy_b", 0)
        .wire("spy_a", 0, "dst", 0)
        .wire("spy_b", 0, "dst", 1)
}

fn bulk_level() -> LevelDefinition {
    LevelDefinition::new("bulk", 30.0)
        .system("src", SystemKind::Normal, (0.0, 200.0), &[], SQ)
        .system("split", SystemKind::Distributor, (200.0, 200.0), SQ, SQ2)
        .system("merge", SystemKind::Merger, (450.0, 200.0), SQ2, SQ)
        .system("dst", SystemKind::Reference, (700.0, 200.0), SQ, &[])
        .wire("src", 0, "split", 0)
        .wire("split", 0, "merge", 0)
        .wire("split", 1, "merge", 1)
        .wire("merge", 0, "dst", 0)
}

// ─── Traffic Mixes ──────────────────────────────────────────────────────────

const MESSENGERS: &[(PacketType, f64)] = &[
    (PacketType::SquareMessenger, 0.5),
    (PacketType::TriangleMessenger, 0.3),
    (PacketType::SmallMessenger, 0.2),
];

const SQUARES: &[(PacketType, f64)] = &[(PacketType::SquareMessenger, 1.0)];

const HOSTILE_MIX: &[(PacketType, f64)] = &[
    (PacketType::SquareMessenger, 0.4),
    (PacketType::TriangleMessenger, 0.3),
    (PacketType::Confidential, 0.2),
    (PacketType::SmallMessenger, 0.1),
];

const BULK_MIX: &[(PacketType, f64)] = &[(PacketType::BulkSmall, 0.7), (PacketType::BulkLarge, 0.3)];

// ─── Scenario Definitions ───────────────────────────────────────────────────

pub fn scenarios() -> Vec<Scenario> {
    vec![
        Scenario {
            name: "CHAIN_LIGHT",
            label: "Chain, light load",
            category: "baseline",
            level: chain_level,
            sources: &["src"],
            lambda: 0.5,
            mix: SQUARES,
            injection_window: 15.0,
            failures: &[],
            criteria: PassCriteria { max_loss_ratio: Some(0.05), min_delivery_rate: Some(90.0), ..PassCriteria::default() },
        },
        Scenario {
            name: "CHAIN_SATURATED",
            label: "Chain, saturated",
            category: "baseline",
            level: chain_level,
            sources: &["src"],
            lambda: 4.0,
            mix: MESSENGERS,
            injection_window: 15.0,
            failures: &[],
            criteria: PassCriteria { expected_status: None, ..PassCriteria::default() },
        },
        Scenario {
            name: "CURVED_PATHS",
            label: "Smooth multi-bend wires",
            category: "geometry",
            level: curved_level,
            sources: &["src"],
            lambda: 1.0,
            mix: MESSENGERS,
            injection_window: 15.0,
            failures: &[],
            criteria: PassCriteria { max_loss_ratio: Some(0.2), ..PassCriteria::default() },
        },
        Scenario {
            name: "FAILOVER",
            label: "Relay failure, redundant path",
            category: "failure",
            level: redundant_level,
            sources: &["src"],
            lambda: 1.0,
            mix: SQUARES,
            injection_window: 20.0,
            failures: &[(6.0, "upper")],
            criteria: PassCriteria { max_loss_ratio: Some(0.3), ..PassCriteria::default() },
        },
        Scenario {
            name: "SEVERED",
            label: "Only relay fails",
            category: "failure",
            level: chain_level,
            sources: &["src"],
            lambda: 1.0,
            mix: SQUARES,
            injection_window: 15.0,
            failures: &[(4.0, "relay")],
            criteria: PassCriteria {
                expected_status: Some(LevelStatus::GameOver { reason: GameOverReason::Disconnected }),
                ..PassCriteria::default()
            },
        },
        Scenario {
            name: "HOSTILE_ROUTE",
            label: "Spies, saboteur and VPN",
            category: "routing",
            level: hostile_level,
            sources: &["src"],
            lambda: 1.0,
            mix: HOSTILE_MIX,
            injection_window: 20.0,
            failures: &[],
            criteria: PassCriteria { expected_status: None, ..PassCriteria::default() },
        },
        Scenario {
            name: "BULK_SPLIT_MERGE",
            label: "Bulk split and merge",
            category: "routing",
            level: bulk_level,
            sources: &["src"],
            lambda: 0.3,
            mix: BULK_MIX,
            injection_window: 20.0,
            failures: &[],
            criteria: PassCriteria { expected_status: None, ..PassCriteria::default() },
        },
    ]
}
