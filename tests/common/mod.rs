use ecr_core::prelude::*;

/// Builds a topology out of a simple chain `names[0] - names[1] - ...`, all
/// nodes starting at the same battery.
pub fn chain(names: &[&str], battery: f64) -> Topology {
    let mut topology = Topology::new();
    for (i, name) in names.iter().enumerate() {
        topology.insert_node(Node::new(*name, (i as i32, 0), battery).unwrap()).unwrap();
    }
    for pair in names.windows(2) {
        topology.add_link(pair[0], pair[1]).unwrap();
    }
    topology
}

/// A diamond: `src` connects to both `left` and `right`, which both connect
/// to `dst` — two disjoint two-hop routes between `src` and `dst`.
pub fn diamond(src: &str, left: &str, right: &str, dst: &str, battery: f64) -> Topology {
    let mut topology = Topology::new();
    for (i, name) in [src, left, right, dst].iter().enumerate() {
        topology.insert_node(Node::new(*name, (i as i32, 0), battery).unwrap()).unwrap();
    }
    topology.add_link(src, left).unwrap();
    topology.add_link(src, right).unwrap();
    topology.add_link(left, dst).unwrap();
    topology.add_link(right, dst).unwrap();
    topology
}
