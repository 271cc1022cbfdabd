use std::net::Ipv6Addr;

/// DHCPv6 message types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Dhcpv6MessageType {
    Solicit = 1,
    Advertise = 2,
    Request = 3,
    Confirm = 4,
    Renew = 5,
    Rebind = 6,
    Reply = 7,
    Release = 8,
    Decline = 9,
    Reconfigure = 10,
    InformationRequest = 11,
    RelayForw = 12,
    RelayRepl = 13,
}

impl Dhcpv6MessageType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(Self::Solicit),
            2 => Some(Self::Advertise),
            3 => Some(Self::Request),
            4 => Some(Self::Confirm),
            5 => Some(Self::Renew),
            6 => Some(Self::Rebind),
            7 => Some(Self::Reply),
            8 => Some(Self::Release),
            9 => Some(Self::Decline),
            10 => Some(Self::Reconfigure),
            11 => Some(Self::InformationRequest),
            12 => Some(Self::RelayForw),
            13 => Some(Self::RelayRepl),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Solicit => "solicit",
            Self::Advertise => "advertise",
            Self::Request => "request",
            Self::Confirm => "confirm",
            Self::Renew => "renew",
            Self::Rebind => "rebind",
            Self::Reply => "reply",
            Self::Release => "release",
            Self::Decline => "decline",
            Self::Reconfigure => "reconfigure",
            Self::InformationRequest => "information-request",
            Self::RelayForw => "relay-forw",
            Self::RelayRepl => "relay-repl",
        }
    }
}

impl std::fmt::Display for Dhcpv6MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Human readable name of a raw message-type octet, for logging.
pub fn type_name(v: u8) -> &'static str {
    Dhcpv6MessageType::from_u8(v).map_or("unknown", Dhcpv6MessageType::name)
}

/// DHCPv6 option codes used by the relay agent
pub const OPT_RELAY_MSG: u16 = 9;
pub const OPT_REMOTE_ID: u16 = 37;
pub const OPT_SUBSCRIBER_ID: u16 = 38;
pub const OPT_RELAY_PORT: u16 = 135;

/// All_DHCP_Relay_Agents_and_Servers (ff02::1:2)
pub const ALL_DHCP_RELAY_AGENTS_AND_SERVERS: Ipv6Addr =
    Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 1, 2);

/// Largest datagram accepted from the link. Longer ones are dropped whole.
pub const MAX_MESSAGE_SIZE: usize = 1024;

/// msg-type, hop-count, link-address, peer-address
pub const RELAY_HEADER_LEN: usize = 34;

// Decoding is only needed to inspect what the relay sends; the agent never
// parses a relay envelope on the wire.

#[cfg(test)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dhcpv6Option {
    pub code: u16,
    pub data: Vec<u8>,
}

/// Decoded RELAY-FORW / RELAY-REPL envelope.
#[cfg(test)]
#[derive(Debug, Clone)]
pub struct RelayMessage {
    pub msg_type: u8,
    pub hop_count: u8,
    pub link_address: Ipv6Addr,
    pub peer_address: Ipv6Addr,
    pub options: Vec<Dhcpv6Option>,
}

#[cfg(test)]
impl RelayMessage {
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < RELAY_HEADER_LEN {
            return None;
        }

        let msg_type = match Dhcpv6MessageType::from_u8(data[0])? {
            Dhcpv6MessageType::RelayForw | Dhcpv6MessageType::RelayRepl => data[0],
            _ => return None,
        };

        let link: [u8; 16] = data[2..18].try_into().ok()?;
        let peer: [u8; 16] = data[18..34].try_into().ok()?;
        let options = parse_v6_options(&data[RELAY_HEADER_LEN..])?;

        Some(Self {
            msg_type,
            hop_count: data[1],
            link_address: Ipv6Addr::from(link),
            peer_address: Ipv6Addr::from(peer),
            options,
        })
    }

    pub fn get_option(&self, code: u16) -> Option<&Dhcpv6Option> {
        self.options.iter().find(|o| o.code == code)
    }

    /// The encapsulated message carried in the Relay Message option.
    pub fn relay_msg(&self) -> Option<&[u8]> {
        self.get_option(OPT_RELAY_MSG).map(|o| o.data.as_slice())
    }
}

/// Split an options region into TLVs. Trailing bytes that cannot hold a
/// complete option make the whole region invalid.
#[cfg(test)]
pub fn parse_v6_options(data: &[u8]) -> Option<Vec<Dhcpv6Option>> {
    let mut options = Vec::new();
    let mut i = 0;

    while i < data.len() {
        if i + 4 > data.len() {
            return None;
        }
        let code = u16::from_be_bytes([data[i], data[i + 1]]);
        let len = u16::from_be_bytes([data[i + 2], data[i + 3]]) as usize;
        i += 4;

        if i + len > data.len() {
            return None;
        }

        options.push(Dhcpv6Option {
            code,
            data: data[i..i + len].to_vec(),
        });
        i += len;
    }

    Some(options)
}
