//! Error types for client-side want/have negotiation.

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while negotiating a fetch with a remote.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The underlying byte pipe failed, either while framing a packet or while
    /// writing/reading its payload.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A pkt-line could not be decoded.
    #[error("packet-line decode error: {0}")]
    PacketlineDecode(#[from] gix_packetline_blocking::decode::Error),

    /// The remote sent something other than a recognized ACK/NAK form.
    #[error("unexpected response from remote: {0}")]
    ProtocolViolation(String),

    /// Stateless RPC mode requires `multi_ack_detailed`, which the remote did not advertise.
    #[error("stateless RPC negotiation requires the 'multi_ack_detailed' capability")]
    StatelessRPCRequiresDetailedAck,

    /// The remote reported a fatal error on side-band channel 3.
    #[error("remote error: {0}")]
    RemoteError(String),

    /// The progress sink asked the negotiator to stop.
    #[error("negotiation cancelled")]
    Cancelled,

    /// A requested capability was never advertised by the remote.
    #[error("capability '{0}' was not advertised by the remote")]
    UnadvertisedCapability(String),
}
