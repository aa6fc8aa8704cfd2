// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Wirenet Simulation Core - Connectivity Analysis

use std::collections::VecDeque;

use serde::Serialize;

use crate::network::Network;
use crate::types::{SystemId, SystemKind};

/// Adjacency over the usable wires of a network: wires that are active,
/// not destroyed, and whose endpoint systems have not failed.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkGraph {
    successors: Vec<Vec<SystemId>>,
}

impl NetworkGraph {
    pub fn from_network(network: &Network) -> Self {
        let mut successors = vec![Vec::new(); network.systems().len()];
        for wire in network.wires() {
            if !network.is_wire_usable(wire) {
                continue;
            }
            if let Some(list) = successors.get_mut(wire.source.system.index()) {
                if !list.contains(&wire.destination.system) {
                    list.push(wire.destination.system);
                }
            }
        }
        Self { successors }
    }

    /// Same edges with direction ignored.
    pub fn undirected(&self) -> Self {
        let mut successors = self.successors.clone();
        for (from, targets) in self.successors.iter().enumerate() {
            for to in targets {
                let back = &mut successors[to.index()];
                let from = SystemId(from as u32);
                if !back.contains(&from) {
                    back.push(from);
                }
            }
        }
        Self { successors }
    }

    pub fn successors(&self, system: SystemId) -> &[SystemId] {
        self.successors.get(system.index()).map(Vec::as_slice).unwrap_or(&[])
    }

    /// BFS hop counts from `start`; `None` for unreachable systems.
    pub fn distances_from(&self, start: SystemId) -> Vec<Option<u32>> {
        let mut dist = vec![None; self.successors.len()];
        let Some(slot) = dist.get_mut(start.index()) else {
            return dist;
        };
        *slot = Some(0);
        let mut queue = VecDeque::from([start]);
        while let Some(current) = queue.pop_front() {
            let d = dist[current.index()].unwrap_or(0);
            for &next in self.successors(current) {
                if dist[next.index()].is_none() {
                    dist[next.index()] = Some(d + 1);
                    queue.push_back(next);
                }
            }
        }
        dist
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectivityReport {
    pub connected: bool,
    pub sources: Vec<SystemId>,
    /// Destinations reached from at least one source through at least one wire.
    pub reached_destinations: Vec<SystemId>,
    /// Only the undirected fallback found the connection.
    pub lenient: bool,
}

/// Decides whether packets injected at the sources can still reach a
/// destination. The network is connected when any live source reaches some
/// Reference system with an input port over at least one wire.
pub struct ConnectivityAnalyzer<'a> {
    network: &'a Network,
}

impl<'a> ConnectivityAnalyzer<'a> {
    pub fn new(network: &'a Network) -> Self {
        Self { network }
    }

    pub fn analyze(&self, sources: &[SystemId], lenient: bool) -> ConnectivityReport {
        let mut live: Vec<SystemId> = sources
            .iter()
            .copied()
            .filter(|&s| self.network.system(s).is_some_and(|s| !s.is_failed()))
            .collect();
        live.sort();
        live.dedup();

        let graph = NetworkGraph::from_network(self.network);
        let (connected, reached) = self.check(&graph, &live);
        if connected || !lenient {
            return ConnectivityReport { connected, sources: live, reached_destinations: reached, lenient: false };
        }
        let (connected, reached) = self.check(&graph.undirected(), &live);
        ConnectivityReport { connected, sources: live, reached_destinations: reached, lenient: connected }
    }

    pub fn is_connected(&self, sources: &[SystemId], lenient: bool) -> bool {
        self.analyze(sources, lenient).connected
    }

    fn is_destination(&self, id: SystemId) -> bool {
        self.network
            .system(id)
            .is_some_and(|s| s.kind == SystemKind::Reference && s.has_input_ports() && !s.is_failed())
    }

    fn check(&self, graph: &NetworkGraph, sources: &[SystemId]) -> (bool, Vec<SystemId>) {
        let mut reached = Vec::new();
        for &source in sources {
            let dist = graph.distances_from(source);
            for (index, d) in dist.iter().enumerate() {
                let id = SystemId(index as u32);
                if matches!(d, Some(hops) if *hops > 0) && self.is_destination(id) && !reached.contains(&id) {
                    reached.push(id);
                }
            }
        }
        reached.sort();
        (!reached.is_empty(), reached)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::LevelDefinition;
    use crate::types::PortShape;

    const SQ: &[PortShape] = &[PortShape::Square];

    fn chain() -> LevelDefinition {
        LevelDefinition::new("chain", 10.0)
            .system("src", SystemKind::Normal, (0.0, 0.0), &[], SQ)
            .system("mid", SystemKind::Normal, (200.0, 0.0), SQ, SQ)
            .system("dst", SystemKind::Reference, (400.0, 0.0), SQ, &[])
    }

    #[test]
    fn test_connected_chain() {
        let built = chain().wire("src", 0, "mid", 0).wire("mid", 0, "dst", 0).build();
        let report = ConnectivityAnalyzer::new(&built.network).analyze(&[SystemId(0)], false);
        assert!(report.connected);
        assert_eq!(report.reached_destinations, vec![SystemId(2)]);
    }

    #[test]
    fn test_missing_wire_disconnects() {
        let built = chain().wire("src", 0, "mid", 0).build();
        assert!(!ConnectivityAnalyzer::new(&built.network).is_connected(&[SystemId(0)], false));
    }

    #[test]
    fn test_failed_middle_disconnects() {
        let mut built = chain().wire("src", 0, "mid", 0).wire("mid", 0, "dst", 0).build();
        built.network.system_mut(SystemId(1)).unwrap().fail();
        assert!(!ConnectivityAnalyzer::new(&built.network).is_connected(&[SystemId(0)], false));
    }

    #[test]
    fn test_destroyed_wire_disconnects() {
        let mut built = chain().wire("src", 0, "mid", 0).wire("mid", 0, "dst", 0).build();
        built.network.wire_mut(crate::types::WireId(1)).unwrap().destroy();
        assert!(!ConnectivityAnalyzer::new(&built.network).is_connected(&[SystemId(0)], false));
    }

    #[test]
    fn test_reference_source_needs_a_wire() {
        // A reference that is its own source does not count without a hop.
        let built = LevelDefinition::new("solo", 10.0)
            .system("r", SystemKind::Reference, (0.0, 0.0), SQ, SQ)
            .build();
        assert!(!ConnectivityAnalyzer::new(&built.network).is_connected(&[SystemId(0)], false));
    }

    #[test]
    fn test_lenient_mode_uses_undirected_graph() {
        // dst feeds back into src's input; directed BFS from src finds nothing.
        let built = LevelDefinition::new("reverse", 10.0)
            .system("src", SystemKind::Normal, (0.0, 0.0), SQ, &[])
            .system("dst", SystemKind::Reference, (300.0, 0.0), SQ, SQ)
            .wire("dst", 0, "src", 0)
            .build();
        let analyzer = ConnectivityAnalyzer::new(&built.network);
        assert!(!analyzer.is_connected(&[SystemId(0)], false));
        let report = analyzer.analyze(&[SystemId(0)], true);
        assert!(report.connected);
        assert!(report.lenient);
    }

    #[test]
    fn test_one_wired_source_is_enough() {
        let built = LevelDefinition::new("pair", 10.0)
            .system("a", SystemKind::Normal, (0.0, 0.0), &[], SQ)
            .system("b", SystemKind::Normal, (0.0, 200.0), &[], SQ)
            .system("dst", SystemKind::Reference, (400.0, 0.0), SQ, &[])
            .wire("a", 0, "dst", 0)
            .build();
        let report = ConnectivityAnalyzer::new(&built.network).analyze(&[SystemId(0), SystemId(1)], false);
        assert!(report.connected);
        assert_eq!(report.sources, vec![SystemId(0), SystemId(1)]);
        assert_eq!(report.reached_destinations, vec![SystemId(2)]);
    }

    #[test]
    fn test_no_live_sources() {
        let built = chain().wire("src", 0, "mid", 0).wire("mid", 0, "dst", 0).build();
        assert!(!ConnectivityAnalyzer::new(&built.network).is_connected(&[], false));
    }
}
