mod common;

use common::chain;
use ecr_core::prelude::*;

#[test]
fn delivers_end_to_end_across_a_four_node_line() {
    let topology = chain(&["A", "B", "C", "D"], 1.0);
    let mut engine = Engine::new(topology, Constants::default());
    engine.schedule(ScheduleEntry { tick: 0, src: "A".into(), dst: "D".into(), remaining: 1 });

    let mut sink = BufferTelemetry::new();
    engine.run(&mut sink, 500);

    let delivered = sink.packets_delivered.iter().find(|d| d.src == "A" && d.dst == "D");
    assert!(delivered.is_some(), "expected a route discovery + delivery to complete within 500 ticks");
    assert_eq!(delivered.unwrap().payload, 1);

    assert!(!sink.energy.is_empty());
    assert_eq!(sink.energy[0].per_node.len(), 4);
}
