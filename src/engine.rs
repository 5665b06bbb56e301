//! Drives the tick loop: maintenance, in-flight handling, scheduled
//! injection, telemetry, termination check — in that strict order, every
//! tick.

use std::collections::BTreeMap;

use log::{debug, warn};

use crate::config::Constants;
use crate::node::NodeEvent;
use crate::packet::{Envelope, Message};
use crate::scheduler::{ScheduleEntry, Scheduler};
use crate::telemetry::{
    EnergyRecord, ErrorKind, ErrorRecord, FullTickRecord, PacketDeliveredRecord, PacketSentRecord,
    PerformanceRecord, RouteBurst, TelemetrySink,
};
use crate::topology::Topology;
use crate::Tick;

/// Appends `hop` at `tick` to `open`, rolling it into a new burst whenever
/// the hop changes or a tick is skipped. Run-length-encodes a send/receive
/// history into contiguous same-hop runs.
fn extend_burst(closed: &mut Vec<RouteBurst>, open: &mut Option<RouteBurst>, tick: Tick, hop: &str) {
    match open {
        Some(burst) if burst.hop == hop && burst.end_tick + 1 == tick => {
            burst.end_tick = tick;
            burst.count += 1;
        }
        _ => {
            if let Some(burst) = open.take() {
                closed.push(burst);
            }
            *open = Some(RouteBurst { start_tick: tick, end_tick: tick, hop: hop.to_string(), count: 1 });
        }
    }
}

#[derive(Debug)]
struct FlowStats {
    originally_scheduled_tick: Tick,
    originally_scheduled_count: i64,
    total_sent: u64,
    total_received: u64,
    sent_bursts: Vec<RouteBurst>,
    received_bursts: Vec<RouteBurst>,
    open_sent: Option<RouteBurst>,
    open_received: Option<RouteBurst>,
}

impl FlowStats {
    fn new(tick: Tick, remaining: i64) -> FlowStats {
        FlowStats {
            originally_scheduled_tick: tick,
            originally_scheduled_count: remaining,
            total_sent: 0,
            total_received: 0,
            sent_bursts: Vec::new(),
            received_bursts: Vec::new(),
            open_sent: None,
            open_received: None,
        }
    }

    fn into_record(mut self, src: String, dst: String) -> PerformanceRecord {
        if let Some(burst) = self.open_sent.take() {
            self.sent_bursts.push(burst);
        }
        if let Some(burst) = self.open_received.take() {
            self.received_bursts.push(burst);
        }
        PerformanceRecord {
            src,
            dst,
            originally_scheduled_tick: self.originally_scheduled_tick,
            originally_scheduled_count: self.originally_scheduled_count,
            total_sent: self.total_sent,
            total_received: self.total_received,
            sent_bursts: self.sent_bursts,
            received_bursts: self.received_bursts,
        }
    }
}

/// Owns every piece of mutable simulation state: the topology, the
/// pending-send queue, the packets currently between hops, and the
/// tunables they all read.
pub struct Engine {
    topology: Topology,
    scheduler: Scheduler,
    constants: Constants,
    in_flight: Vec<Envelope>,
    tick: Tick,
    performance: BTreeMap<(String, String), FlowStats>,
}

impl Engine {
    pub fn new(topology: Topology, constants: Constants) -> Engine {
        Engine { topology, scheduler: Scheduler::new(), constants, in_flight: Vec::new(), tick: 0, performance: BTreeMap::new() }
    }

    pub fn tick(&self) -> Tick {
        self.tick
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Mutable access to the topology, for fault injection in tests (e.g.
    /// killing a node mid-run to exercise RE recovery).
    pub fn topology_mut(&mut self) -> &mut Topology {
        &mut self.topology
    }

    /// Registers a pending send. The flow's `(src, dst)` is tracked for the
    /// `performance` stream from the tick it was first scheduled, even if
    /// its first attempt doesn't happen until later ticks.
    pub fn schedule(&mut self, entry: ScheduleEntry) {
        self.performance
            .entry((entry.src.clone(), entry.dst.clone()))
            .or_insert_with(|| FlowStats::new(entry.tick, entry.remaining));
        self.scheduler.push(entry);
    }

    fn record_sent(&mut self, src: &str, dst: &str, tick: Tick, hop: &str) {
        let stats = self
            .performance
            .entry((src.to_string(), dst.to_string()))
            .or_insert_with(|| FlowStats::new(tick, -1));
        stats.total_sent += 1;
        extend_burst(&mut stats.sent_bursts, &mut stats.open_sent, tick, hop);
    }

    fn record_received(&mut self, src: &str, dst: &str, tick: Tick, hop: &str) {
        let stats = self
            .performance
            .entry((src.to_string(), dst.to_string()))
            .or_insert_with(|| FlowStats::new(tick, -1));
        stats.total_received += 1;
        extend_burst(&mut stats.received_bursts, &mut stats.open_received, tick, hop);
    }

    /// Maintenance phase: every node ages one tick; on even ticks, links to
    /// alive neighbors refresh RMT direct entries and links to dead
    /// neighbors are pruned.
    fn maintain(&mut self, tick: Tick, sink: &mut dyn TelemetrySink) {
        let names: Vec<String> = self.topology.names().map(String::from).collect();
        for name in &names {
            self.topology.get_mut(name).expect("name came from topology.names()").progress(tick, true, &self.constants);
        }

        if tick % 2 == 0 {
            let snapshot: BTreeMap<String, (f64, bool)> =
                self.topology.iter().map(|(name, node)| (name.clone(), (node.lat, node.is_alive()))).collect();
            for name in &names {
                let neighbors = self.topology.neighbors(name);
                for neighbor in &neighbors {
                    let &(neighbor_lat, neighbor_alive) = snapshot.get(neighbor).expect("neighbor must be in topology");
                    let node = self.topology.get_mut(name).expect("name came from topology.names()");
                    if neighbor_alive {
                        node.update_or_create_rmt_entry(neighbor, neighbor, neighbor_lat, 0, tick, &self.constants);
                    } else {
                        debug!("tick {tick}: {name} drops dead neighbor {neighbor}");
                        node.cleanup_dead_neighbor(neighbor);
                    }
                }
            }
        }

        let mean_battery = self.topology.mean_battery();
        let per_node = self.topology.iter().map(|(name, node)| (name.clone(), node.battery)).collect();
        sink.on_energy(EnergyRecord { tick, mean_battery, per_node });
    }

    /// Runs one full tick. Returns `false` once the simulation has nothing
    /// left to do.
    pub fn step(&mut self, sink: &mut dyn TelemetrySink) -> bool {
        let tick = self.tick;
        let in_flight_at_start = self.in_flight.len();

        self.maintain(tick, sink);

        let mut produced: Vec<Envelope> = Vec::new();

        let (deliverable, still_pending): (Vec<Envelope>, Vec<Envelope>) =
            std::mem::take(&mut self.in_flight).into_iter().partition(|e| e.sent_ts < tick);
        self.in_flight = still_pending;

        for envelope in deliverable {
            let target = envelope.next_hop.clone();
            if let Some(node) = self.topology.get_mut(&target) {
                let (new_envelopes, events) = node.handle_packet(envelope, tick, &self.constants);
                for event in events {
                    match event {
                        NodeEvent::Delivered { src, dst, via, payload } => {
                            self.record_received(&src, &dst, tick, &via);
                            sink.on_packet_delivered(PacketDeliveredRecord { tick, src, dst, via, payload });
                        }
                        NodeEvent::RouteLoss { node, dst } => {
                            sink.on_error(ErrorRecord { tick, kind: ErrorKind::RouteError, node, dst: Some(dst) });
                        }
                    }
                }
                produced.extend(new_envelopes);
            }
        }

        let due = self.scheduler.pop_due(tick);
        let scheduled_due = due.len();
        for entry in due {
            let ScheduleEntry { src, dst, mut remaining, .. } = entry;
            let alive_before = self.topology.get(&src).is_some_and(|n| n.is_alive());
            let Some(node) = self.topology.get_mut(&src) else { continue };
            let (new_envelopes, sent, error) = node.attempt_to_send_packet(&dst, tick, &self.constants, None);

            if !alive_before {
                warn!("tick {tick}: {src} cannot send to {dst}, source is dead");
                sink.on_error(ErrorRecord { tick, kind: ErrorKind::DeadSourceSend, node: src.clone(), dst: Some(dst.clone()) });
            } else if error {
                warn!("tick {tick}: discovery for {src} -> {dst} timed out");
                sink.on_error(ErrorRecord { tick, kind: ErrorKind::DiscoveryTimeout, node: src.clone(), dst: Some(dst.clone()) });
            }

            // An error stops this flow from ever being retried; otherwise
            // the count only moves on an actual send, so route discovery
            // in progress (sent == false, error == false) gets retried
            // next tick without spending down the budget. A negative
            // count decrements forever without ever reaching zero, so
            // "-1" means unlimited as a side effect rather than a special
            // case.
            if error {
                remaining = 0;
            } else if sent {
                remaining -= 1;
            }
            if remaining != 0 {
                self.scheduler.push(ScheduleEntry { tick: tick + 1, src: src.clone(), dst: dst.clone(), remaining });
            }

            produced.extend(new_envelopes);
        }

        for envelope in &produced {
            if let Message::RP(rp) = &envelope.message {
                if rp.src == envelope.current_node {
                    self.record_sent(&rp.src, &rp.dst, tick, &envelope.next_hop);
                    sink.on_packet_sent(PacketSentRecord {
                        tick,
                        src: rp.src.clone(),
                        dst: rp.dst.clone(),
                        next_hop: envelope.next_hop.clone(),
                        payload: rp.payload,
                    });
                }
            }
        }

        self.in_flight.extend(produced);

        sink.on_full(FullTickRecord { tick, in_flight_at_start, scheduled_due, in_flight_at_end: self.in_flight.len() });

        self.tick += 1;

        let queues_drained = self.scheduler.is_empty() && self.in_flight.is_empty();
        let keep_going = !queues_drained && self.topology.any_alive();
        if !keep_going {
            debug!("tick {tick}: terminating (queues_drained={queues_drained}, any_alive={})", self.topology.any_alive());
        }
        keep_going
    }

    /// Runs ticks until termination or `max_ticks`, then flushes the
    /// `performance` stream. Returns the tick the run stopped at.
    pub fn run(&mut self, sink: &mut dyn TelemetrySink, max_ticks: Tick) -> Tick {
        while self.tick < max_ticks {
            if !self.step(sink) {
                break;
            }
        }
        self.finalize(sink);
        self.tick
    }

    /// Closes every open burst and emits the accumulated
    /// [`PerformanceRecord`] for each scheduled flow, in `(src, dst)`
    /// order.
    pub fn finalize(&mut self, sink: &mut dyn TelemetrySink) {
        let flows = std::mem::take(&mut self.performance);
        for ((src, dst), stats) in flows {
            sink.on_performance(stats.into_record(src, dst));
        }
    }
}
