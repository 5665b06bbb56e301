mod common;

use common::diamond;
use ecr_core::prelude::*;

/// Once a route through one side of a diamond collapses (the relay dies),
/// delivery resumes through the other side via RouteError-triggered retry.
#[test]
fn delivery_survives_the_death_of_one_relay() {
    let topology = diamond("A", "B", "C", "D", 1.0);
    let mut engine = Engine::new(topology, Constants::default());
    engine.schedule(ScheduleEntry { tick: 0, src: "A".into(), dst: "D".into(), remaining: -1 });

    let mut sink = BufferTelemetry::new();
    for _ in 0..60 {
        if !engine.step(&mut sink) {
            break;
        }
    }
    let delivered_before = sink.packets_delivered.iter().filter(|d| d.src == "A" && d.dst == "D").count();
    assert!(delivered_before > 0, "expected delivery to have started before the relay dies");

    // B dies; C is the only surviving relay between A and D.
    engine.topology_mut().get_mut("B").unwrap().battery = 0.0;

    for _ in 0..200 {
        if !engine.step(&mut sink) {
            break;
        }
    }

    let delivered_after = sink.packets_delivered.iter().filter(|d| d.src == "A" && d.dst == "D").count();
    assert!(delivered_after > delivered_before, "expected delivery to resume through the surviving relay");
}
