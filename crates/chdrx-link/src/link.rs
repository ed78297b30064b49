use crate::buff::FrameBuff;
use crate::class::PacketClass;
use crate::error::Result;

/// A received frame together with its classification tag.
#[derive(Debug)]
pub struct RecvFrame {
    /// The buffer holding the packet bytes.
    pub buff: FrameBuff,
    /// Classification derived from the packet header by the link/codec.
    pub class: PacketClass,
}

/// Transmit side of a physical medium.
///
/// Implementations are externally synchronized: all methods take `&self`
/// and must be safe to call from multiple threads. Buffers popped from the
/// pool are exclusively owned by the caller until handed back via
/// [`push_packet`].
///
/// [`push_packet`]: Self::push_packet
pub trait SendLink: Send + Sync {
    /// Number of frames in this link's send pool.
    fn num_send_frames(&self) -> usize;

    /// Capacity of each frame in bytes (the link MTU).
    fn frame_size(&self) -> usize;

    /// Pop a free buffer from the pool, or `None` if all are in flight.
    /// Never blocks.
    fn try_pop_buff(&self) -> Option<FrameBuff>;

    /// Hand a filled buffer to the link for transmission; the driver
    /// reclaims it into the pool afterwards. Rejection is an error, never
    /// a silent drop.
    fn push_packet(&self, buff: FrameBuff) -> Result<()>;
}

/// Receive side of a physical medium.
///
/// Same synchronization contract as [`SendLink`]. Frames are delivered in
/// arrival order; each carries a [`PacketClass`] tag so consumers can route
/// without inspecting the payload.
pub trait RecvLink: Send + Sync {
    /// Number of frames in this link's receive pool.
    fn num_recv_frames(&self) -> usize;

    /// Capacity of each frame in bytes.
    fn frame_size(&self) -> usize;

    /// Pop the next received packet, or `None` if nothing has arrived.
    /// Never blocks.
    fn try_pop_packet(&self) -> Option<RecvFrame>;

    /// Return a drained buffer to the pool for reuse by the driver.
    fn push_buff(&self, buff: FrameBuff) -> Result<()>;
}
