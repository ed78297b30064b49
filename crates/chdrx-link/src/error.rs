/// Errors that can occur in link and I/O-service operations.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// A frame reservation must be at least one frame.
    #[error("invalid reservation: at least one frame required")]
    ZeroReservation,

    /// The link cannot satisfy the requested frame reservation.
    #[error("insufficient link capacity (requested {requested} frames, {available} available)")]
    InsufficientCapacity { requested: usize, available: usize },

    /// A packet does not fit in the link's frame size.
    #[error("packet too large ({size} bytes, frame capacity {capacity})")]
    PacketTooLarge { size: usize, capacity: usize },

    /// The link's frame pool has no free buffers.
    #[error("link frame pool exhausted")]
    Exhausted,

    /// The link refused a buffer handed to it.
    #[error("link rejected buffer: {reason}")]
    Rejected { reason: String },
}

pub type Result<T> = std::result::Result<T, LinkError>;
