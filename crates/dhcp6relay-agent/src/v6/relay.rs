use super::packet::*;
use dhcp6relay_core::error::{Error, Result};
use dhcp6relay_core::types::PeerIdentity;
use std::io::IoSlice;
use std::net::{Ipv6Addr, SocketAddr};

/// Capacity of the scratch buffer holding the relay header and options.
/// The encapsulated message is not copied into it.
pub const RELAY_BUFFER_CAPACITY: usize = 256;

/// Fixed-capacity, append-only byte buffer.
///
/// Every write is checked against the remaining capacity first and either
/// lands completely or fails with [`Error::CapacityExceeded`], leaving the
/// buffer unchanged.
#[derive(Clone)]
pub struct OptionBuffer<const N: usize> {
    buf: [u8; N],
    len: usize,
}

impl<const N: usize> OptionBuffer<N> {
    pub fn new() -> Self {
        Self { buf: [0; N], len: 0 }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        N
    }

    pub fn remaining(&self) -> usize {
        N - self.len
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    fn reserve(&mut self, n: usize) -> Result<&mut [u8]> {
        let available = self.remaining();
        if n > available {
            return Err(Error::CapacityExceeded {
                needed: n,
                available,
            });
        }
        let start = self.len;
        self.len += n;
        Ok(&mut self.buf[start..self.len])
    }

    pub fn push(&mut self, bytes: &[u8]) -> Result<()> {
        self.reserve(bytes.len())?.copy_from_slice(bytes);
        Ok(())
    }

    pub fn push_u8(&mut self, v: u8) -> Result<()> {
        self.push(&[v])
    }

    pub fn push_u16(&mut self, v: u16) -> Result<()> {
        self.push(&v.to_be_bytes())
    }

    /// Append a complete code/length/value option.
    pub fn push_option(&mut self, code: u16, value: &[u8]) -> Result<()> {
        let len = option_len(code, value.len())?;
        let dst = self.reserve(4 + value.len())?;
        dst[..2].copy_from_slice(&code.to_be_bytes());
        dst[2..4].copy_from_slice(&len.to_be_bytes());
        dst[4..].copy_from_slice(value);
        Ok(())
    }

    /// Append the code and length of an option whose value is sent as a
    /// separate trailing segment.
    pub fn push_option_header(&mut self, code: u16, value_len: usize) -> Result<()> {
        let len = option_len(code, value_len)?;
        let dst = self.reserve(4)?;
        dst[..2].copy_from_slice(&code.to_be_bytes());
        dst[2..4].copy_from_slice(&len.to_be_bytes());
        Ok(())
    }
}

impl<const N: usize> Default for OptionBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

fn option_len(code: u16, len: usize) -> Result<u16> {
    u16::try_from(len).map_err(|_| Error::OptionTooLong { code, len })
}

/// A RELAY-FORW message ready for transmission as two segments:
/// the relay header plus options, then the original datagram untouched.
///
/// The Relay Message option is always the last option in the header
/// segment; its length covers exactly the second segment.
pub struct RelayForward<'a> {
    head: OptionBuffer<RELAY_BUFFER_CAPACITY>,
    message: &'a [u8],
}

impl<'a> RelayForward<'a> {
    /// Encapsulate `message`, received from `peer`, for the upstream.
    ///
    /// `relay_port` is the local port of the upstream socket, advertised in
    /// the Relay Source Port option. Nothing is produced unless every option
    /// fits the scratch buffer.
    pub fn build(
        message: &'a [u8],
        peer: SocketAddr,
        relay_port: u16,
        identity: &PeerIdentity,
    ) -> Result<Self> {
        let peer_address = match peer {
            SocketAddr::V6(v6) => *v6.ip(),
            SocketAddr::V4(_) => return Err(Error::UnsupportedPeer(peer)),
        };

        let hop_count = match message.first() {
            Some(&t) if t == Dhcpv6MessageType::RelayForw as u8 => {
                let inner = *message
                    .get(1)
                    .ok_or(Error::Malformed("relay-forw without hop-count"))?;
                inner.checked_add(1).ok_or(Error::HopCountOverflow(inner))?
            }
            _ => 0,
        };

        let mut head = OptionBuffer::new();
        head.push_u8(Dhcpv6MessageType::RelayForw as u8)?;
        head.push_u8(hop_count)?;
        // link-address is left unspecified on a point-to-point link
        head.push(&Ipv6Addr::UNSPECIFIED.octets())?;
        head.push(&peer_address.octets())?;
        debug_assert_eq!(head.len(), RELAY_HEADER_LEN);

        head.push_option(OPT_RELAY_PORT, &relay_port.to_be_bytes())?;
        if let Some(remote_id) = &identity.remote_id {
            head.push_option(OPT_REMOTE_ID, remote_id.as_bytes())?;
        }
        if let Some(subscriber_id) = &identity.subscriber_id {
            head.push_option(OPT_SUBSCRIBER_ID, subscriber_id.as_bytes())?;
        }

        // Must stay last: the value is the second segment.
        head.push_option_header(OPT_RELAY_MSG, message.len())?;

        Ok(Self { head, message })
    }

    pub fn hop_count(&self) -> u8 {
        self.head.as_slice()[1]
    }

    pub fn header(&self) -> &[u8] {
        self.head.as_slice()
    }

    pub fn message(&self) -> &'a [u8] {
        self.message
    }

    /// Total on-wire length of the RELAY-FORW payload.
    pub fn len(&self) -> usize {
        self.head.len() + self.message.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Segments for a single scatter-gather send.
    pub fn io_slices(&self) -> [IoSlice<'_>; 2] {
        [IoSlice::new(self.header()), IoSlice::new(self.message)]
    }

    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len());
        out.extend_from_slice(self.header());
        out.extend_from_slice(self.message);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, SocketAddrV6};

    fn peer() -> SocketAddr {
        SocketAddr::V6(SocketAddrV6::new(
            "fe80::1234".parse().unwrap(),
            546,
            0,
            3,
        ))
    }

    fn identity(remote: Option<&str>, subscriber: Option<&str>) -> PeerIdentity {
        PeerIdentity::new(remote.map(String::from), subscriber.map(String::from))
    }

    #[test]
    fn test_buffer_rejects_overflow_without_partial_write() {
        let mut buf = OptionBuffer::<8>::new();
        buf.push(&[1, 2, 3, 4, 5]).unwrap();

        let err = buf.push_option(37, b"ab").unwrap_err();
        assert!(matches!(
            err,
            Error::CapacityExceeded {
                needed: 6,
                available: 3
            }
        ));
        assert_eq!(buf.as_slice(), &[1, 2, 3, 4, 5]);

        buf.push(&[6, 7, 8]).unwrap();
        assert_eq!(buf.remaining(), 0);
        assert!(buf.push_u8(9).is_err());
        assert_eq!(buf.capacity(), 8);
    }

    #[test]
    fn test_buffer_big_endian() {
        let mut buf = OptionBuffer::<16>::new();
        buf.push_u16(0x0187).unwrap();
        buf.push_option(OPT_RELAY_PORT, &547u16.to_be_bytes()).unwrap();
        assert_eq!(buf.as_slice(), &[0x01, 0x87, 0, 135, 0, 2, 0x02, 0x23]);
    }

    #[test]
    fn test_option_too_long() {
        let mut buf = OptionBuffer::<8>::new();
        let err = buf.push_option_header(OPT_RELAY_MSG, 70_000).unwrap_err();
        assert!(matches!(err, Error::OptionTooLong { code: 9, len: 70_000 }));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_solicit_minimal_envelope() {
        let solicit = [1u8];
        let fwd = RelayForward::build(&solicit, peer(), 40000, &PeerIdentity::default()).unwrap();

        assert_eq!(fwd.len(), 45);
        assert_eq!(fwd.header().len(), 44);
        assert_eq!(fwd.hop_count(), 0);

        let mut expected = vec![12, 0];
        expected.extend_from_slice(&[0u8; 16]);
        expected.extend_from_slice(&"fe80::1234".parse::<Ipv6Addr>().unwrap().octets());
        expected.extend_from_slice(&[0, 135, 0, 2]);
        expected.extend_from_slice(&40000u16.to_be_bytes());
        expected.extend_from_slice(&[0, 9, 0, 1]);
        expected.push(1);
        assert_eq!(fwd.to_vec(), expected);
    }

    #[test]
    fn test_relay_msg_is_last_and_verbatim() {
        let request = [3u8, 0xde, 0xad, 0xbe, 0, 1, 0, 2, 0xaa, 0xbb];
        let fwd = RelayForward::build(
            &request,
            peer(),
            547,
            &identity(Some("abc"), Some("xyz")),
        )
        .unwrap();

        let msg = RelayMessage::parse(&fwd.to_vec()).unwrap();
        let last = msg.options.last().unwrap();
        assert_eq!(last.code, OPT_RELAY_MSG);
        assert_eq!(last.data, request);
        assert_eq!(msg.peer_address, "fe80::1234".parse::<Ipv6Addr>().unwrap());
        assert_eq!(msg.link_address, Ipv6Addr::UNSPECIFIED);
        assert_eq!(fwd.message(), &request);
    }

    #[test]
    fn test_option_order_with_identity() {
        let fwd = RelayForward::build(&[1], peer(), 547, &identity(Some("abc"), Some("xyz")))
            .unwrap();
        let msg = RelayMessage::parse(&fwd.to_vec()).unwrap();

        let codes: Vec<u16> = msg.options.iter().map(|o| o.code).collect();
        assert_eq!(
            codes,
            vec![OPT_RELAY_PORT, OPT_REMOTE_ID, OPT_SUBSCRIBER_ID, OPT_RELAY_MSG]
        );
        assert_eq!(msg.options[0].data, 547u16.to_be_bytes());
        assert_eq!(msg.options[1].data, b"abc");
        assert_eq!(msg.options[2].data, b"xyz");
        assert_eq!(msg.options[3].data, [1]);

        // header 34, port 6, remote 7, subscriber 7, relay-msg 4 + 1
        assert_eq!(fwd.len(), 59);
    }

    #[test]
    fn test_only_subscriber_id() {
        let fwd = RelayForward::build(&[1], peer(), 547, &identity(None, Some("bob"))).unwrap();
        let msg = RelayMessage::parse(&fwd.to_vec()).unwrap();
        assert!(msg.get_option(OPT_REMOTE_ID).is_none());
        assert_eq!(msg.get_option(OPT_SUBSCRIBER_ID).unwrap().data, b"bob");
    }

    #[test]
    fn test_hop_count_increment() {
        let mut inner = vec![12u8, 3];
        inner.extend_from_slice(&[0u8; 32]);
        let fwd = RelayForward::build(&inner, peer(), 547, &PeerIdentity::default()).unwrap();
        assert_eq!(fwd.hop_count(), 4);

        let msg = RelayMessage::parse(&fwd.to_vec()).unwrap();
        assert_eq!(msg.relay_msg(), Some(inner.as_slice()));
    }

    #[test]
    fn test_hop_count_overflow() {
        let inner = [12u8, 255];
        let err = RelayForward::build(&inner, peer(), 547, &PeerIdentity::default())
            .err()
            .unwrap();
        assert!(matches!(err, Error::HopCountOverflow(255)));
    }

    #[test]
    fn test_relay_forw_without_hop_count() {
        let err = RelayForward::build(&[12], peer(), 547, &PeerIdentity::default())
            .err()
            .unwrap();
        assert!(matches!(err, Error::Malformed(_)));
    }

    #[test]
    fn test_capacity_boundary() {
        // 34 header + 6 relay-port + 4 relay-msg leaves 212 bytes: one
        // option of 4 + 208 fills the buffer exactly.
        let fits = "r".repeat(208);
        let fwd = RelayForward::build(&[1], peer(), 547, &identity(Some(&fits), None)).unwrap();
        assert_eq!(fwd.header().len(), RELAY_BUFFER_CAPACITY);

        let too_long = "r".repeat(209);
        let err = RelayForward::build(&[1], peer(), 547, &identity(Some(&too_long), None))
            .err()
            .unwrap();
        assert!(matches!(err, Error::CapacityExceeded { .. }));
    }

    #[test]
    fn test_capacity_exceeded_by_combined_ids() {
        let remote = "r".repeat(100);
        let subscriber = "s".repeat(110);
        let err = RelayForward::build(
            &[1],
            peer(),
            547,
            &identity(Some(&remote), Some(&subscriber)),
        )
        .err()
        .unwrap();
        assert!(matches!(err, Error::CapacityExceeded { .. }));
    }

    #[test]
    fn test_large_message_does_not_count_against_capacity() {
        let message = vec![1u8; 1024];
        let fwd = RelayForward::build(&message, peer(), 547, &PeerIdentity::default()).unwrap();
        assert_eq!(fwd.len(), 44 + 1024);
        let slices = fwd.io_slices();
        assert_eq!(slices[0].len(), 44);
        assert_eq!(slices[1].len(), 1024);
    }

    #[test]
    fn test_ipv4_peer_rejected() {
        let v4 = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 546);
        let err = RelayForward::build(&[1], v4, 547, &PeerIdentity::default())
            .err()
            .unwrap();
        assert!(matches!(err, Error::UnsupportedPeer(_)));
    }
}
