//! The five telemetry streams, and the trivial append-only buffer backend
//! the core ships.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::Tick;

/// Structured per-tick summary (`full` stream).
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct FullTickRecord {
    pub tick: Tick,
    pub in_flight_at_start: usize,
    pub scheduled_due: usize,
    pub in_flight_at_end: usize,
}

/// One record per RP emission (`packet` stream).
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct PacketSentRecord {
    pub tick: Tick,
    pub src: String,
    pub dst: String,
    pub next_hop: String,
    pub payload: u64,
}

/// One record per RP delivery (`packet` stream).
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct PacketDeliveredRecord {
    pub tick: Tick,
    pub src: String,
    pub dst: String,
    pub via: String,
    pub payload: u64,
}

/// The taxonomy of non-recoverable/recoverable events the engine reports.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub enum ErrorKind {
    DeadSourceSend,
    DiscoveryTimeout,
    RouteError,
}

/// One record per error event (`error` stream).
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct ErrorRecord {
    pub tick: Tick,
    pub kind: ErrorKind,
    pub node: String,
    pub dst: Option<String>,
}

/// `(tick, mean_battery)` plus the per-node battery series (`energy` stream).
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct EnergyRecord {
    pub tick: Tick,
    pub mean_battery: f64,
    pub per_node: BTreeMap<String, f64>,
}

/// A contiguous run of RPs through the same hop, reconstructed at the end
/// of a run for the `performance` stream.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct RouteBurst {
    pub start_tick: Tick,
    pub end_tick: Tick,
    pub hop: String,
    pub count: u64,
}

/// End-of-run aggregated statistics for one scheduled `(src, dst)` flow
/// (`performance` stream).
#[derive(Clone, Debug, Serialize)]
pub struct PerformanceRecord {
    pub src: String,
    pub dst: String,
    pub originally_scheduled_tick: Tick,
    pub originally_scheduled_count: i64,
    pub total_sent: u64,
    pub total_received: u64,
    pub sent_bursts: Vec<RouteBurst>,
    pub received_bursts: Vec<RouteBurst>,
}

/// Abstract interface the engine and node handlers call to emit structured
/// events. Every method defaults to a no-op so a test can implement only
/// the stream it cares about. Concrete backends (files, buffers) are
/// external collaborators, not part of the simulation core itself.
pub trait TelemetrySink {
    fn on_full(&mut self, _record: FullTickRecord) {}
    fn on_packet_sent(&mut self, _record: PacketSentRecord) {}
    fn on_packet_delivered(&mut self, _record: PacketDeliveredRecord) {}
    fn on_error(&mut self, _record: ErrorRecord) {}
    fn on_energy(&mut self, _record: EnergyRecord) {}
    fn on_performance(&mut self, _record: PerformanceRecord) {}
}

/// The trivial append-only buffer backend the core ships. Tests assert
/// against its fields directly.
#[derive(Debug, Default)]
pub struct BufferTelemetry {
    pub full: Vec<FullTickRecord>,
    pub packets_sent: Vec<PacketSentRecord>,
    pub packets_delivered: Vec<PacketDeliveredRecord>,
    pub errors: Vec<ErrorRecord>,
    pub energy: Vec<EnergyRecord>,
    pub performance: Vec<PerformanceRecord>,
}

impl BufferTelemetry {
    pub fn new() -> BufferTelemetry {
        BufferTelemetry::default()
    }
}

impl TelemetrySink for BufferTelemetry {
    fn on_full(&mut self, record: FullTickRecord) {
        self.full.push(record);
    }
    fn on_packet_sent(&mut self, record: PacketSentRecord) {
        self.packets_sent.push(record);
    }
    fn on_packet_delivered(&mut self, record: PacketDeliveredRecord) {
        self.packets_delivered.push(record);
    }
    fn on_error(&mut self, record: ErrorRecord) {
        self.errors.push(record);
    }
    fn on_energy(&mut self, record: EnergyRecord) {
        self.energy.push(record);
    }
    fn on_performance(&mut self, record: PerformanceRecord) {
        self.performance.push(record);
    }
}

/// Writes each stream to its own newline-delimited JSON file under a
/// directory, for the `ecr-sim` binary's `--out-dir`. Each line is one
/// record serialized independently, so a reader can stream the file
/// without buffering the whole run.
pub struct JsonlTelemetry {
    full: std::fs::File,
    packets: std::fs::File,
    errors: std::fs::File,
    energy: std::fs::File,
    performance: std::fs::File,
    errors_handled: u64,
    last_mean_battery: f64,
}

impl JsonlTelemetry {
    pub fn create(dir: &std::path::Path) -> std::io::Result<JsonlTelemetry> {
        std::fs::create_dir_all(dir)?;
        Ok(JsonlTelemetry {
            full: std::fs::File::create(dir.join("log_full.jsonl"))?,
            packets: std::fs::File::create(dir.join("log_packets.jsonl"))?,
            errors: std::fs::File::create(dir.join("log_errors.jsonl"))?,
            energy: std::fs::File::create(dir.join("log_energy.jsonl"))?,
            performance: std::fs::File::create(dir.join("log_performance.jsonl"))?,
            errors_handled: 0,
            last_mean_battery: 0.0,
        })
    }

    /// Number of `ErrorRecord`s handled across the run so far.
    pub fn errors_handled(&self) -> u64 {
        self.errors_handled
    }

    /// Mean battery recorded at the most recent tick, for the binary's
    /// end-of-run summary line.
    pub fn last_mean_battery(&self) -> f64 {
        self.last_mean_battery
    }

    fn write_line(file: &mut std::fs::File, value: &impl Serialize) {
        use std::io::Write;
        if let Ok(json) = serde_json::to_string(value) {
            let _ = writeln!(file, "{json}");
        }
    }
}

impl TelemetrySink for JsonlTelemetry {
    fn on_full(&mut self, record: FullTickRecord) {
        Self::write_line(&mut self.full, &record);
    }
    fn on_packet_sent(&mut self, record: PacketSentRecord) {
        Self::write_line(&mut self.packets, &record);
    }
    fn on_packet_delivered(&mut self, record: PacketDeliveredRecord) {
        Self::write_line(&mut self.packets, &record);
    }
    fn on_error(&mut self, record: ErrorRecord) {
        self.errors_handled += 1;
        Self::write_line(&mut self.errors, &record);
    }
    fn on_energy(&mut self, record: EnergyRecord) {
        self.last_mean_battery = record.mean_battery;
        Self::write_line(&mut self.energy, &record);
    }
    fn on_performance(&mut self, record: PerformanceRecord) {
        Self::write_line(&mut self.performance, &record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_sink_records_events_in_order() {
        let mut sink = BufferTelemetry::new();
        sink.on_full(FullTickRecord { tick: 0, in_flight_at_start: 0, scheduled_due: 1, in_flight_at_end: 1 });
        sink.on_full(FullTickRecord { tick: 1, in_flight_at_start: 1, scheduled_due: 0, in_flight_at_end: 0 });
        assert_eq!(sink.full.len(), 2);
        assert_eq!(sink.full[0].tick, 0);
        assert_eq!(sink.full[1].tick, 1);
    }

    #[test]
    fn jsonl_sink_tracks_error_count_and_last_mean_battery() {
        let dir = std::env::temp_dir().join(format!("ecr-core-telemetry-test-{}", std::process::id()));
        let mut sink = JsonlTelemetry::create(&dir).unwrap();
        sink.on_error(ErrorRecord { tick: 0, kind: ErrorKind::DeadSourceSend, node: "A".into(), dst: Some("B".into()) });
        sink.on_error(ErrorRecord { tick: 1, kind: ErrorKind::DiscoveryTimeout, node: "A".into(), dst: Some("C".into()) });
        sink.on_energy(EnergyRecord { tick: 0, mean_battery: 0.9, per_node: BTreeMap::new() });
        sink.on_energy(EnergyRecord { tick: 1, mean_battery: 0.7, per_node: BTreeMap::new() });
        assert_eq!(sink.errors_handled(), 2);
        assert_eq!(sink.last_mean_battery(), 0.7);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
