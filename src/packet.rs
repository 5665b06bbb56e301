//! The PacketRegistry: a closed tagged union of the five ECR protocol
//! messages, plus the envelope that carries one across a single hop.

use crate::Tick;

/// Discriminator exposed by [`Envelope::kind`]; all handler dispatch in
/// [`crate::node::Node::handle_packet`] switches on this tag, never on the
/// payload type directly.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Kind {
    RouteDiscovery,
    RouteResponse,
    RoutePacket,
    RouteUpdate,
    RouteError,
}

/// Route Discovery. Flood-forwarded outward by neighbors that have not
/// already answered for this `(src, dst)` within `RD_Timeout` ticks.
#[derive(Clone, Debug, PartialEq)]
pub struct RouteDiscovery {
    pub src: String,
    pub dst: String,
    /// Node names traversed so far, starting with `src`.
    pub rt: Vec<String>,
}

/// Route Response. Consumed in reverse (popped) on the way back to `src`.
#[derive(Clone, Debug, PartialEq)]
pub struct RouteResponse {
    pub src: String,
    pub dst: String,
    pub lat: f64,
    pub discount: u32,
    pub rt: Vec<String>,
}

/// Route Packet: the application payload. `payload` is an opaque
/// per-destination sequence number.
#[derive(Clone, Debug, PartialEq)]
pub struct RoutePacket {
    pub src: String,
    pub dst: String,
    pub lat: f64,
    pub discount: u32,
    pub payload: u64,
}

/// Route Update: improved LAT information propagated backwards from a
/// forwarder to the originator.
#[derive(Clone, Debug, PartialEq)]
pub struct RouteUpdate {
    pub src: String,
    pub src_route: String,
    pub dst_route: String,
    pub lat: f64,
    pub discount: u32,
}

/// Route Error: an intermediate node has no RMT route for `dst`.
#[derive(Clone, Debug, PartialEq)]
pub struct RouteError {
    pub src: String,
    pub dst: String,
    pub code: u64,
    /// Hops accumulated on the way back toward `src`.
    pub rt: Vec<String>,
}

/// The five-variant message payload.
#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    RD(RouteDiscovery),
    RR(RouteResponse),
    RP(RoutePacket),
    RU(RouteUpdate),
    RE(RouteError),
}

impl Message {
    pub fn kind(&self) -> Kind {
        match self {
            Message::RD(_) => Kind::RouteDiscovery,
            Message::RR(_) => Kind::RouteResponse,
            Message::RP(_) => Kind::RoutePacket,
            Message::RU(_) => Kind::RouteUpdate,
            Message::RE(_) => Kind::RouteError,
        }
    }
}

/// The envelope a [`Message`] travels in for a single hop.
#[derive(Clone, Debug, PartialEq)]
pub struct Envelope {
    /// Sender on the wire.
    pub current_node: String,
    /// Addressee; the only node allowed to handle this envelope.
    pub next_hop: String,
    /// Tick the envelope was injected — handled no earlier than `sent_ts + 1`.
    pub sent_ts: Tick,
    pub message: Message,
}

impl Envelope {
    pub fn kind(&self) -> Kind {
        self.message.kind()
    }

    pub fn new(current_node: impl Into<String>, next_hop: impl Into<String>, sent_ts: Tick, message: Message) -> Self {
        Envelope { current_node: current_node.into(), next_hop: next_hop.into(), sent_ts, message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        let msg = Message::RD(RouteDiscovery { src: "A".into(), dst: "B".into(), rt: vec!["A".into()] });
        let env = Envelope::new("A", "B", 0, msg);
        assert_eq!(env.kind(), Kind::RouteDiscovery);
    }
}
