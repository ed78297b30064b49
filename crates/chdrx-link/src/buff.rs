use std::sync::atomic::{AtomicU64, Ordering};

use bytes::BytesMut;

use crate::error::{LinkError, Result};

static NEXT_SLOT: AtomicU64 = AtomicU64::new(0);

/// One packet's backing storage plus its valid length.
///
/// A `FrameBuff` is exclusively owned: at any instant it is held by exactly
/// one of the link driver, a transport, or the caller, and it changes hands
/// only by move. There is no `Clone`. The `slot` id is unique for the life
/// of the process and lets pools recognize their own buffers.
#[derive(Debug)]
pub struct FrameBuff {
    slot: u64,
    data: BytesMut,
    packet_size: usize,
}

impl FrameBuff {
    /// Allocate a buffer with the given frame capacity and a fresh slot id.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slot: NEXT_SLOT.fetch_add(1, Ordering::Relaxed),
            data: BytesMut::zeroed(capacity),
            packet_size: 0,
        }
    }

    /// Process-unique identifier for this buffer.
    pub fn slot(&self) -> u64 {
        self.slot
    }

    /// Total writable capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Length of the valid packet bytes currently held.
    pub fn packet_size(&self) -> usize {
        self.packet_size
    }

    /// Set the valid packet length after writing into [`frame_mut`].
    ///
    /// [`frame_mut`]: Self::frame_mut
    pub fn set_packet_size(&mut self, size: usize) -> Result<()> {
        if size > self.capacity() {
            return Err(LinkError::PacketTooLarge {
                size,
                capacity: self.capacity(),
            });
        }
        self.packet_size = size;
        Ok(())
    }

    /// The valid packet bytes.
    pub fn packet(&self) -> &[u8] {
        &self.data[..self.packet_size]
    }

    /// The full writable frame region.
    pub fn frame_mut(&mut self) -> &mut [u8] {
        &mut self.data[..]
    }

    /// Copy a packet into the frame and set the valid length.
    pub fn fill(&mut self, packet: &[u8]) -> Result<()> {
        if packet.len() > self.capacity() {
            return Err(LinkError::PacketTooLarge {
                size: packet.len(),
                capacity: self.capacity(),
            });
        }
        self.data[..packet.len()].copy_from_slice(packet);
        self.packet_size = packet.len();
        Ok(())
    }

    /// Discard the packet contents, keeping the allocation.
    pub fn clear(&mut self) {
        self.packet_size = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_are_unique() {
        let a = FrameBuff::with_capacity(64);
        let b = FrameBuff::with_capacity(64);
        assert_ne!(a.slot(), b.slot());
    }

    #[test]
    fn fill_and_read_back() {
        let mut buff = FrameBuff::with_capacity(64);
        buff.fill(b"chdr packet").unwrap();
        assert_eq!(buff.packet(), b"chdr packet");
        assert_eq!(buff.packet_size(), 11);
        assert_eq!(buff.capacity(), 64);
    }

    #[test]
    fn write_via_frame_mut() {
        let mut buff = FrameBuff::with_capacity(16);
        buff.frame_mut()[..4].copy_from_slice(b"abcd");
        buff.set_packet_size(4).unwrap();
        assert_eq!(buff.packet(), b"abcd");
    }

    #[test]
    fn oversized_packet_rejected() {
        let mut buff = FrameBuff::with_capacity(8);
        let err = buff.fill(&[0u8; 9]).unwrap_err();
        assert!(matches!(err, LinkError::PacketTooLarge { size: 9, capacity: 8 }));

        let err = buff.set_packet_size(9).unwrap_err();
        assert!(matches!(err, LinkError::PacketTooLarge { .. }));
    }

    #[test]
    fn clear_keeps_capacity() {
        let mut buff = FrameBuff::with_capacity(32);
        buff.fill(b"xyz").unwrap();
        buff.clear();
        assert_eq!(buff.packet_size(), 0);
        assert_eq!(buff.capacity(), 32);
    }
}
