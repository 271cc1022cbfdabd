use crate::v6::packet::Dhcpv6MessageType;
use dhcp6relay_core::types::Trust;

/// Why an inbound datagram was not relayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Zero-length datagram, no message type to inspect.
    Empty,
    /// REPLY or RELAY-REPL arriving from the client side.
    ReplyOnClientLink(Dhcpv6MessageType),
    /// RELAY-FORW from a peer that is not trusted to relay.
    RelayOnUntrustedLink,
    /// RELAY-FORW too short to carry a hop count.
    TruncatedRelay,
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DropReason::Empty => write!(f, "empty datagram"),
            DropReason::ReplyOnClientLink(t) => {
                write!(f, "{t} message received on client-facing link")
            }
            DropReason::RelayOnUntrustedLink => write!(f, "relay message on untrusted link"),
            DropReason::TruncatedRelay => write!(f, "relay-forw without hop-count"),
        }
    }
}

impl DropReason {
    /// Policy violations point at a misbehaving peer; the rest are noise.
    pub fn is_policy_violation(self) -> bool {
        matches!(
            self,
            DropReason::ReplyOnClientLink(_) | DropReason::RelayOnUntrustedLink
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Forward,
    Drop(DropReason),
}

/// Decide whether a datagram from the link may be relayed upstream.
///
/// Only reply injection and relay messages from untrusted peers are
/// rejected; every other type, including unknown ones, is forwarded opaquely.
pub fn classify(message: &[u8], trust: Trust) -> Verdict {
    let Some(&msg_type) = message.first() else {
        return Verdict::Drop(DropReason::Empty);
    };

    match Dhcpv6MessageType::from_u8(msg_type) {
        Some(t @ (Dhcpv6MessageType::Reply | Dhcpv6MessageType::RelayRepl)) => {
            Verdict::Drop(DropReason::ReplyOnClientLink(t))
        }
        Some(Dhcpv6MessageType::RelayForw) => {
            if !trust.is_trusted() {
                Verdict::Drop(DropReason::RelayOnUntrustedLink)
            } else if message.len() < 2 {
                Verdict::Drop(DropReason::TruncatedRelay)
            } else {
                Verdict::Forward
            }
        }
        _ => Verdict::Forward,
    }
}
