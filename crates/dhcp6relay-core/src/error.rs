use std::net::SocketAddr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("unable to resolve {host}: {reason}")]
    Resolve { host: String, reason: String },

    #[error("no link-local address available on {0}")]
    LinkLocalNotFound(String),

    #[error("socket setup failed ({context}): {source}")]
    Setup {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("relay buffer capacity exceeded: writing {needed} bytes, {available} available")]
    CapacityExceeded { needed: usize, available: usize },

    #[error("option {code} value of {len} bytes does not fit a 16-bit length")]
    OptionTooLong { code: u16, len: usize },

    #[error("malformed message: {0}")]
    Malformed(&'static str),

    #[error("hop count {0} cannot be incremented")]
    HopCountOverflow(u8),

    #[error("peer address {0} is not IPv6")]
    UnsupportedPeer(SocketAddr),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wrap a socket setup failure with the step that produced it.
    pub fn setup(context: &'static str) -> impl FnOnce(std::io::Error) -> Self {
        move |source| Error::Setup { context, source }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
