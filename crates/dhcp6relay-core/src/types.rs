use serde::{Deserialize, Serialize};

/// Whether the peer on the link may send already-relayed messages.
///
/// An untrusted link only accepts raw client messages; RELAY-FORW arriving
/// from the peer is discarded. Fixed once the link is up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trust {
    Trusted,
    #[default]
    Untrusted,
}

impl Trust {
    pub fn is_trusted(self) -> bool {
        self == Trust::Trusted
    }
}

impl std::fmt::Display for Trust {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trust::Trusted => write!(f, "trusted"),
            Trust::Untrusted => write!(f, "untrusted"),
        }
    }
}

impl std::str::FromStr for Trust {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trusted" => Ok(Trust::Trusted),
            "untrusted" => Ok(Trust::Untrusted),
            _ => Err(crate::error::Error::Config(format!(
                "unknown trust mode: {s}"
            ))),
        }
    }
}

/// Identity of the authenticated peer on the point-to-point link.
/// Both values are opaque and copied into the relay options verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerIdentity {
    /// Carried in the REMOTE_ID option (e.g. the calling number).
    #[serde(default)]
    pub remote_id: Option<String>,
    /// Carried in the SUBSCRIBER_ID option (e.g. the authenticated user name).
    #[serde(default)]
    pub subscriber_id: Option<String>,
}

impl PeerIdentity {
    pub fn new(remote_id: Option<String>, subscriber_id: Option<String>) -> Self {
        Self {
            remote_id: remote_id.filter(|s| !s.is_empty()),
            subscriber_id: subscriber_id.filter(|s| !s.is_empty()),
        }
    }
}
