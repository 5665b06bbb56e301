mod common;

use ecr_core::prelude::*;
use ecr_core::telemetry::ErrorKind;

#[test]
fn sending_from_a_dead_node_is_reported_and_never_sent() {
    let mut topology = Topology::new();
    topology.insert_node(Node::new("A", (0, 0), 0.0).unwrap()).unwrap();
    topology.insert_node(Node::new("B", (1, 0), 1.0).unwrap()).unwrap();
    topology.add_link("A", "B").unwrap();

    let mut engine = Engine::new(topology, Constants::default());
    engine.schedule(ScheduleEntry { tick: 0, src: "A".into(), dst: "B".into(), remaining: -1 });

    let mut sink = BufferTelemetry::new();
    engine.run(&mut sink, 20);

    assert!(sink.errors.iter().any(|e| e.kind == ErrorKind::DeadSourceSend && e.node == "A"));
    assert!(sink.packets_delivered.is_empty());
    assert!(sink.packets_sent.is_empty());
}
