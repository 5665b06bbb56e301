mod common;

use ecr_core::prelude::*;
use ecr_core::telemetry::ErrorKind;

#[test]
fn unreachable_destination_times_out_instead_of_retrying_forever() {
    let mut topology = Topology::new();
    topology.insert_node(Node::new("A", (0, 0), 1.0).unwrap()).unwrap();
    topology.insert_node(Node::new("Z", (9, 9), 1.0).unwrap()).unwrap();
    // A and Z share no link and no common neighbor: Z is unreachable.

    let mut constants = Constants::default();
    constants.rd_timeout = 5;

    let mut engine = Engine::new(topology, constants);
    engine.schedule(ScheduleEntry { tick: 0, src: "A".into(), dst: "Z".into(), remaining: -1 });

    let mut sink = BufferTelemetry::new();
    engine.run(&mut sink, 50);

    assert!(sink.errors.iter().any(|e| e.kind == ErrorKind::DiscoveryTimeout && e.node == "A"));
    assert!(sink.packets_delivered.is_empty());
}
