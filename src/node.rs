//! Per-router state and the five packet handlers.

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, warn};

use crate::config::Constants;
use crate::error::Error;
use crate::keys::{route_key, validate_name};
use crate::packet::{Envelope, Message, RouteDiscovery, RouteError, RouteResponse, RouteUpdate};
use crate::Tick;

/// One alternative next hop for a destination, with its estimated
/// bottleneck LAT and discount distance.
#[derive(Clone, Debug, PartialEq)]
pub struct RmtEntry {
    pub next_hop: String,
    /// Estimated last-alive-tick of the bottleneck node along this route.
    pub lat_r: f64,
    /// Number of forwarding hops whose discount compounding has already
    /// been applied to `lat_r`.
    pub d_f: u32,
}

/// A delivery or forwarding-loss event a handler produces, for the engine
/// to forward to the [`crate::telemetry::TelemetrySink`]. Kept separate from
/// `Envelope` production so `Node` never depends on a telemetry trait.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeEvent {
    /// An RP reached its destination.
    Delivered { src: String, dst: String, via: String, payload: u64 },
    /// A forwarder had no RMT route for `dst` and synthesized an RE instead
    /// of forwarding; recoverable, but worth surfacing on the error stream.
    RouteLoss { node: String, dst: String },
}

/// Per-router state.
#[derive(Clone, Debug)]
pub struct Node {
    pub name: String,
    pub location: (i32, i32),
    pub battery: f64,
    pub links: BTreeSet<String>,
    /// Last-alive-tick: projected tick at which battery reaches zero.
    pub lat: f64,
    /// EMA-smoothed forecast of packets forwarded per tick.
    pub p_hat: f64,
    /// Packets forwarded since the last tick boundary.
    pub p_sample: u64,
    /// destination -> alternative routes.
    pub rmt: BTreeMap<String, Vec<RmtEntry>>,
    /// destination -> tick outbound discovery was last broadcast.
    pub rd_in_flight: BTreeMap<String, Tick>,
    /// route key -> last route-update emission tick.
    pub ru_in_flight: BTreeMap<String, Tick>,
    /// source -> route key -> last-forwarded-tick.
    pub rd_responded: BTreeMap<String, BTreeMap<String, Tick>>,
    /// destination -> count of RPs sent to it.
    pub num_rp_sent: BTreeMap<String, u64>,
    /// source -> count of RPs received from it.
    pub num_rp_received: BTreeMap<String, u64>,
    /// route key -> audit trail of (tick, next hop used).
    pub rp_sent: BTreeMap<String, Vec<(Tick, String)>>,
    /// route key -> audit trail of (tick, previous hop).
    pub rp_received: BTreeMap<String, Vec<(Tick, String)>>,
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}
impl Eq for Node {}

impl Node {
    pub fn new(name: impl Into<String>, location: (i32, i32), battery: f64) -> Result<Node, Error> {
        let name = name.into();
        validate_name(&name)?;
        if !(0.0..=1.0).contains(&battery) {
            return Err(Error::BatteryOutOfRange(name, battery));
        }
        Ok(Node {
            name,
            location,
            battery,
            links: BTreeSet::new(),
            lat: 0.0,
            p_hat: 0.0,
            p_sample: 0,
            rmt: BTreeMap::new(),
            rd_in_flight: BTreeMap::new(),
            ru_in_flight: BTreeMap::new(),
            rd_responded: BTreeMap::new(),
            num_rp_sent: BTreeMap::new(),
            num_rp_received: BTreeMap::new(),
            rp_sent: BTreeMap::new(),
            rp_received: BTreeMap::new(),
        })
    }

    pub fn is_alive(&self) -> bool {
        self.battery > 0.0
    }

    /// Advance one tick: drain battery, refresh estimates, rewrite any
    /// route entry that now outlives this node's own projected lifetime.
    pub fn progress(&mut self, tick: Tick, update_estimates: bool, constants: &Constants) {
        if !self.is_alive() {
            self.battery = 0.0;
            return;
        }
        let drained = self.battery - (constants.d_c + self.p_sample as f64 * constants.d_p);
        self.battery = drained.max(0.0);

        if update_estimates {
            self.p_hat = constants.alpha * self.p_hat + (1.0 - constants.alpha) * self.p_sample as f64;
            let denom = constants.d_c + self.p_hat * constants.d_p;
            self.lat = if denom > 0.0 { tick as f64 + self.battery / denom } else { tick as f64 };
        }

        for entries in self.rmt.values_mut() {
            for entry in entries.iter_mut() {
                if self.lat < entry.lat_r {
                    entry.lat_r = self.lat;
                    entry.d_f = 0;
                }
            }
        }

        self.p_sample = 0;
    }

    /// Reorder each destination's entries by `(lat_r DESC, tie-break: max
    /// lat_r of entries stored under next_hop DESC, next_hop ASC)`. The
    /// tie-break prefers next hops that themselves have at least one
    /// far-future route; the final `next_hop` compare keeps the ordering
    /// stable when two routes tie exactly.
    pub fn sort_rmt(&mut self) {
        let snapshot = self.rmt.clone();
        for entries in self.rmt.values_mut() {
            entries.sort_by(|a, b| {
                let a_tie = snapshot.get(&a.next_hop).map_or(0.0, |v| v.iter().map(|e| e.lat_r).fold(0.0, f64::max));
                let b_tie = snapshot.get(&b.next_hop).map_or(0.0, |v| v.iter().map(|e| e.lat_r).fold(0.0, f64::max));
                b.lat_r
                    .partial_cmp(&a.lat_r)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| b_tie.partial_cmp(&a_tie).unwrap_or(std::cmp::Ordering::Equal))
                    .then_with(|| a.next_hop.cmp(&b.next_hop))
            });
        }
    }

    /// Upsert an RMT entry, applying the discount/clamp rule. Returns the
    /// stored `(lat_r, d_f)`.
    pub fn update_or_create_rmt_entry(&mut self, dst: &str, next_hop: &str, lat_r_in: f64, df_in: u32, tick: Tick, constants: &Constants) -> (f64, u32) {
        let lat_r = self.lat.min(tick as f64 + (constants.gamma * (lat_r_in - tick as f64)).max(0.0));
        let d_f = if lat_r == self.lat { 0 } else { df_in + 1 };
        let entries = self.rmt.entry(dst.to_string()).or_default();
        match entries.iter_mut().find(|e| e.next_hop == next_hop) {
            Some(e) => {
                e.lat_r = lat_r;
                e.d_f = d_f;
            }
            None => entries.push(RmtEntry { next_hop: next_hop.to_string(), lat_r, d_f }),
        }
        (lat_r, d_f)
    }

    /// Sort then return the best known route, or `None`.
    pub fn get_best_route(&mut self, dst: &str) -> Option<RmtEntry> {
        self.sort_rmt();
        self.rmt.get(dst).and_then(|v| v.first().cloned())
    }

    /// Drop every RMT entry whose next hop is the given (now dead)
    /// neighbor.
    pub fn cleanup_dead_neighbor(&mut self, name: &str) {
        for entries in self.rmt.values_mut() {
            entries.retain(|e| e.next_hop != name);
        }
    }

    /// Emit RD packets toward every distinct next hop known in the RMT,
    /// optionally restricted to `filter`.
    /// Returns `(packets, timeout_flag)`.
    pub fn generate_route_discover_packets(&mut self, dst: &str, tick: Tick, filter: Option<&BTreeSet<String>>, constants: &Constants) -> (Vec<Envelope>, bool) {
        if filter.is_none() {
            if let Some(&sent_at) = self.rd_in_flight.get(dst) {
                let timed_out = sent_at + constants.rd_timeout <= tick;
                if timed_out {
                    warn!("{}: discovery for {dst} outstanding since tick {sent_at} timed out at tick {tick}", self.name);
                }
                return (Vec::new(), timed_out);
            }
        }
        let mut sent_to = BTreeSet::new();
        let mut packets = Vec::new();
        for entries in self.rmt.values() {
            for entry in entries {
                let nh = &entry.next_hop;
                if sent_to.contains(nh) {
                    continue;
                }
                if let Some(f) = filter {
                    if !f.contains(nh) {
                        continue;
                    }
                }
                sent_to.insert(nh.clone());
                let msg = Message::RD(RouteDiscovery { src: self.name.clone(), dst: dst.to_string(), rt: vec![self.name.clone()] });
                packets.push(Envelope::new(self.name.clone(), nh.clone(), tick, msg));
            }
        }
        if filter.is_none() {
            self.rd_in_flight.insert(dst.to_string(), tick);
        }
        (packets, false)
    }

    /// Application entry point: send towards `dst`, discovering a route
    /// first if none is known.
    /// Returns `(new_packets, sent, error)`.
    pub fn attempt_to_send_packet(&mut self, dst: &str, tick: Tick, constants: &Constants, msg_num: Option<u64>) -> (Vec<Envelope>, bool, bool) {
        if !self.is_alive() {
            return (Vec::new(), false, true);
        }
        match self.get_best_route(dst) {
            Some(entry) => {
                let payload = match msg_num {
                    Some(n) => n,
                    None => {
                        let counter = self.num_rp_sent.entry(dst.to_string()).or_insert(0);
                        *counter += 1;
                        *counter
                    }
                };
                let msg = Message::RP(crate::packet::RoutePacket { src: self.name.clone(), dst: dst.to_string(), lat: entry.lat_r, discount: entry.d_f, payload });
                let mut packets = vec![Envelope::new(self.name.clone(), entry.next_hop.clone(), tick, msg)];
                self.rp_sent.entry(route_key(&self.name, dst)).or_default().push((tick, entry.next_hop.clone()));

                if payload % constants.rd_resend == 0 {
                    let filter: BTreeSet<String> = self.rmt.get(dst).map(|v| v.iter().filter(|e| e.next_hop != entry.next_hop).map(|e| e.next_hop.clone()).collect()).unwrap_or_default();
                    if !filter.is_empty() {
                        let (extra, _timeout) = self.generate_route_discover_packets(dst, tick, Some(&filter), constants);
                        packets.extend(extra);
                    }
                }
                (packets, true, false)
            }
            None => {
                let (packets, timeout) = self.generate_route_discover_packets(dst, tick, None, constants);
                if timeout {
                    (Vec::new(), false, true)
                } else {
                    (packets, false, false)
                }
            }
        }
    }

    /// Dispatch by tag.
    pub fn handle_packet(&mut self, envelope: Envelope, tick: Tick, constants: &Constants) -> (Vec<Envelope>, Vec<NodeEvent>) {
        assert_eq!(envelope.next_hop, self.name, "envelope delivered to the wrong node");
        assert!(envelope.sent_ts < tick, "envelope handled in the same or earlier tick it was sent");
        if !self.is_alive() {
            return (Vec::new(), Vec::new());
        }

        let mut packets = Vec::new();
        let mut events = Vec::new();
        let sent_ts = envelope.sent_ts;
        let current_node = envelope.current_node.clone();

        match envelope.message {
            Message::RD(msg) => self.handle_rd(msg, &current_node, tick, constants, &mut packets),
            Message::RR(msg) => self.handle_rr(msg, sent_ts, &current_node, tick, constants, &mut packets),
            Message::RP(msg) => self.handle_rp(msg, sent_ts, &current_node, tick, constants, &mut packets, &mut events),
            Message::RU(msg) => self.handle_ru(msg, &current_node, tick, constants, &mut packets),
            Message::RE(msg) => self.handle_re(msg, sent_ts, &current_node, tick, constants, &mut packets),
        }

        self.p_sample += packets.len() as u64;
        (packets, events)
    }

    fn handle_rd(&mut self, msg: RouteDiscovery, current_node: &str, tick: Tick, constants: &Constants, out: &mut Vec<Envelope>) {
        let route = route_key(&msg.src, &msg.dst);
        if self.name == msg.dst {
            let last = msg.rt.last().expect("RD route must be non-empty").clone();
            let response = Message::RR(RouteResponse { src: msg.src.clone(), dst: self.name.clone(), lat: self.lat, discount: 0, rt: msg.rt.clone() });
            out.push(Envelope::new(self.name.clone(), last, tick, response));

            let filter: BTreeSet<String> = [current_node.to_string()].into_iter().collect();
            let (extra, _timeout) = self.generate_route_discover_packets(&msg.src, tick, Some(&filter), constants);
            out.extend(extra);
        } else if !msg.rt.contains(&self.name) {
            let recent = self.rd_responded.get(&msg.src).and_then(|m| m.get(&route)).is_some_and(|&t| t + constants.rd_timeout >= tick);
            if !recent {
                self.rd_responded.entry(msg.src.clone()).or_default().insert(route, tick);
                let mut rt = msg.rt.clone();
                rt.push(self.name.clone());
                let mut sent_to: BTreeSet<String> = [current_node.to_string()].into_iter().collect();
                for entries in self.rmt.values() {
                    for entry in entries {
                        if sent_to.insert(entry.next_hop.clone()) {
                            let fwd = Message::RD(RouteDiscovery { src: msg.src.clone(), dst: msg.dst.clone(), rt: rt.clone() });
                            out.push(Envelope::new(self.name.clone(), entry.next_hop.clone(), tick, fwd));
                        }
                    }
                }
            }
        }
    }

    fn handle_rr(&mut self, mut msg: RouteResponse, sent_ts: Tick, current_node: &str, tick: Tick, constants: &Constants, out: &mut Vec<Envelope>) {
        assert_eq!(msg.rt.last(), Some(&self.name), "RR arrived with the wrong route tail");
        let (lat_r, df) = self.update_or_create_rmt_entry(&msg.dst, current_node, msg.lat, msg.discount, tick, constants);
        msg.lat = lat_r;
        msg.discount = df;
        msg.rt.pop();
        if let Some(tail) = msg.rt.last().cloned() {
            out.push(Envelope::new(self.name.clone(), tail, sent_ts, Message::RR(msg)));
        }
    }

    fn handle_rp(&mut self, mut msg: crate::packet::RoutePacket, sent_ts: Tick, current_node: &str, tick: Tick, constants: &Constants, out: &mut Vec<Envelope>, events: &mut Vec<NodeEvent>) {
        if self.name == msg.dst {
            *self.num_rp_received.entry(msg.src.clone()).or_insert(0) += 1;
            self.rp_received.entry(route_key(&msg.src, &msg.dst)).or_default().push((tick, current_node.to_string()));
            events.push(NodeEvent::Delivered { src: msg.src.clone(), dst: msg.dst.clone(), via: current_node.to_string(), payload: msg.payload });
            return;
        }

        match self.get_best_route(&msg.dst) {
            None => {
                debug!("{}: no route to {}, sending RE back to {current_node}", self.name, msg.dst);
                let re = Message::RE(RouteError { src: msg.src.clone(), dst: msg.dst.clone(), code: msg.payload, rt: vec![self.name.clone()] });
                out.push(Envelope::new(self.name.clone(), current_node.to_string(), tick, re));
                events.push(NodeEvent::RouteLoss { node: self.name.clone(), dst: msg.dst.clone() });
            }
            Some(entry) => {
                let lat_r_updated = if entry.d_f > 0 { tick as f64 + (entry.lat_r - tick as f64) / constants.gamma } else { entry.lat_r };
                // Saturating: df never goes negative, it just bottoms out at full confidence.
                let df_updated = entry.d_f.saturating_sub(1);

                if df_updated != msg.discount || lat_r_updated < msg.lat {
                    let route = route_key(&msg.src, &msg.dst);
                    let has_path_back = self.rmt.get(&msg.src).is_some_and(|v| !v.is_empty());
                    let prev = self.ru_in_flight.get(&route).copied().unwrap_or(0);
                    let may_emit = has_path_back && prev as i64 + constants.ru_min_interval as i64 <= tick as i64;
                    if may_emit {
                        self.ru_in_flight.insert(route, tick);
                        let back_hops = self.rmt.get(&msg.src).cloned().unwrap_or_default();
                        for back in back_hops {
                            let ru = Message::RU(RouteUpdate { src: self.name.clone(), src_route: msg.src.clone(), dst_route: msg.dst.clone(), lat: entry.lat_r, discount: entry.d_f });
                            out.push(Envelope::new(self.name.clone(), back.next_hop, tick, ru));
                        }
                    }
                }

                msg.lat = lat_r_updated;
                msg.discount = df_updated;
                out.push(Envelope::new(self.name.clone(), entry.next_hop, sent_ts, Message::RP(msg)));
            }
        }
    }

    fn handle_ru(&mut self, mut msg: RouteUpdate, current_node: &str, tick: Tick, constants: &Constants, out: &mut Vec<Envelope>) {
        let (lat_r, df) = self.update_or_create_rmt_entry(&msg.dst_route, current_node, msg.lat, msg.discount, tick, constants);
        if self.name != msg.src_route {
            msg.lat = lat_r;
            msg.discount = df;
            let back_hops = self.rmt.get(&msg.src_route).cloned().unwrap_or_default();
            for back in back_hops {
                out.push(Envelope::new(self.name.clone(), back.next_hop, tick, Message::RU(msg.clone())));
            }
        }
    }

    fn handle_re(&mut self, mut msg: RouteError, sent_ts: Tick, current_node: &str, tick: Tick, constants: &Constants, out: &mut Vec<Envelope>) {
        if self.name == msg.src {
            if let Some(entries) = self.rmt.get_mut(&msg.dst) {
                entries.retain(|e| e.next_hop != current_node);
            }
            let (retry_packets, _sent, _error) = self.attempt_to_send_packet(&msg.dst, tick, constants, Some(msg.code));
            out.extend(retry_packets);
        } else {
            msg.rt.push(self.name.clone());
            if let Some(entry) = self.get_best_route(&msg.src) {
                out.push(Envelope::new(self.name.clone(), entry.next_hop, sent_ts, Message::RE(msg)));
            }
        }
    }
}
