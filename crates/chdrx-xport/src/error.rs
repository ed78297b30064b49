use chdrx_link::LinkError;

/// Errors that can occur in endpoint-transport operations.
///
/// Timeouts are not errors: acquire operations signal "nothing available
/// within the wait" through an absent return value.
#[derive(Debug, thiserror::Error)]
pub enum XportError {
    /// Construction could not obtain the requested frame reservations.
    #[error("transport registration failed: {0}")]
    Registration(#[source] LinkError),

    /// A received packet belongs to neither the control nor the
    /// management stream.
    #[error("unclassifiable packet on receive link (packet type {packet_type:#x})")]
    Unclassified { packet_type: u8 },

    /// The released buffer is not currently held from this transport
    /// (foreign buffer, or a slot already returned).
    #[error("buffer slot {slot} is not held from this transport")]
    ForeignBuffer { slot: u64 },

    /// The underlying link refused a buffer hand-off.
    #[error(transparent)]
    Link(#[from] LinkError),
}

pub type Result<T> = std::result::Result<T, XportError>;
