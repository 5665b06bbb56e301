//! Text manifest parsers: one format describing nodes and links, one
//! describing the send schedule. Blank lines and `#` comments are
//! skipped in both.

use crate::error::Error;
use crate::node::Node;
use crate::scheduler::ScheduleEntry;
use crate::topology::Topology;
use crate::Tick;

fn significant_lines(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
}

/// Parses the node manifest: either
/// `name x y battery` (declares a node) or `a b` (declares a link between
/// two already-declared nodes). A line is a link iff it has exactly two
/// fields; anything else is a node declaration, which must have exactly
/// four.
pub fn parse_node_manifest(text: &str) -> Result<Topology, Error> {
    let mut topology = Topology::new();
    let mut links = Vec::new();

    for (line_no, line) in significant_lines(text) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let malformed = || Error::Malformed { line_no, line: line.to_string() };

        match fields.len() {
            2 => links.push((line_no, fields[0].to_string(), fields[1].to_string())),
            4 => {
                let name = fields[0];
                let x: i32 = fields[1].parse().map_err(|_| malformed())?;
                let y: i32 = fields[2].parse().map_err(|_| malformed())?;
                let battery: f64 = fields[3].parse().map_err(|_| malformed())?;
                let node = Node::new(name, (x, y), battery)?;
                topology.insert_node(node)?;
            }
            _ => return Err(malformed()),
        }
    }

    for (line_no, a, b) in links {
        topology.add_link(&a, &b).map_err(|_| Error::Malformed { line_no, line: format!("{a} {b}") })?;
    }

    Ok(topology)
}

/// Parses the packet manifest: `src dst tick` (send as many as possible,
/// equivalent to `count = -1`) or `src dst tick count` (send `count` times
/// starting at `tick`, one per tick; `count = -1` means unlimited, per
/// [`ScheduleEntry::remaining`]).
pub fn parse_packet_manifest(text: &str) -> Result<Vec<ScheduleEntry>, Error> {
    let mut entries = Vec::new();

    for (line_no, line) in significant_lines(text) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let malformed = || Error::Malformed { line_no, line: line.to_string() };

        let (src, dst, tick_field, remaining) = match fields.as_slice() {
            [src, dst, tick] => (*src, *dst, *tick, -1),
            [src, dst, tick, count] => {
                let count: i64 = count.parse().map_err(|_| malformed())?;
                (*src, *dst, *tick, count)
            }
            _ => return Err(malformed()),
        };

        let tick: Tick = tick_field.parse().map_err(|_| malformed())?;
        entries.push(ScheduleEntry { tick, src: src.to_string(), dst: dst.to_string(), remaining });
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nodes_and_links() {
        let topology = parse_node_manifest(
            "# a line\n\
             A 0 0 1.0\n\
             B 1 0 1.0\n\
             \n\
             A B\n",
        )
        .unwrap();
        assert_eq!(topology.len(), 2);
        assert!(topology.neighbors("A").contains("B"));
    }

    #[test]
    fn rejects_link_to_unknown_node() {
        let err = parse_node_manifest("A 0 0 1.0\nA Z\n");
        assert!(matches!(err, Err(Error::Malformed { line_no: 2, .. })));
    }

    #[test]
    fn rejects_malformed_node_line() {
        let err = parse_node_manifest("A 0 0\n");
        assert!(matches!(err, Err(Error::Malformed { line_no: 1, .. })));
    }

    #[test]
    fn parses_schedule_with_and_without_count() {
        let entries = parse_packet_manifest("A B 0\nA C 5 -1\nB C 2 3\n").unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].remaining, -1, "bare `src dst tick` means unlimited, same as an explicit -1 count");
        assert_eq!(entries[1].remaining, -1);
        assert_eq!(entries[2].remaining, 3);
    }
}
