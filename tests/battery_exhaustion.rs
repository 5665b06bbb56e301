mod common;

use ecr_core::prelude::*;

/// With no packets to forward, a node's battery drains by exactly `d_c`
/// every tick, so the tick it reaches zero is exactly predictable.
#[test]
fn battery_reaches_zero_at_the_exact_predicted_tick() {
    let mut topology = Topology::new();
    topology.insert_node(Node::new("A", (0, 0), 0.003).unwrap()).unwrap();

    let constants = Constants::default(); // d_c = 0.001
    let mut engine = Engine::new(topology, constants);

    // Drive ticks directly rather than through `run`, which would stop as
    // soon as the (empty) schedule and in-flight queues drain.
    let mut sink = BufferTelemetry::new();
    for _ in 0..3 {
        engine.step(&mut sink);
    }

    assert_eq!(engine.tick(), 3);
    assert_eq!(engine.topology().get("A").unwrap().battery, 0.0);
    assert!(!engine.topology().any_alive());
    assert_eq!(sink.energy.len(), 3);
    assert_eq!(sink.energy[2].mean_battery, 0.0);
}
