//! In-process link pair backed by bounded buffer pools.
//!
//! Stands in for a local DMA channel: no wire, no syscalls, just frame
//! exchange through queues. Useful on its own for loopback setups and as
//! the link driver in tests.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use bytes::Bytes;

use crate::buff::FrameBuff;
use crate::class::PacketClass;
use crate::error::{LinkError, Result};
use crate::link::{RecvFrame, RecvLink, SendLink};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory send link with a bounded frame pool.
///
/// Transmitted packets are captured and can be drained with
/// [`take_sent`]; their buffers return to the pool immediately.
///
/// [`take_sent`]: Self::take_sent
#[derive(Debug)]
pub struct MemSendLink {
    num_frames: usize,
    frame_size: usize,
    pool: Mutex<VecDeque<FrameBuff>>,
    sent: Mutex<Vec<Bytes>>,
}

impl MemSendLink {
    pub fn new(num_frames: usize, frame_size: usize) -> Self {
        let pool = (0..num_frames)
            .map(|_| FrameBuff::with_capacity(frame_size))
            .collect();
        Self {
            num_frames,
            frame_size,
            pool: Mutex::new(pool),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Drain the packets transmitted so far, in transmission order.
    pub fn take_sent(&self) -> Vec<Bytes> {
        let mut sent = lock(&self.sent);
        std::mem::take(&mut *sent)
    }

    /// Number of free buffers currently in the pool.
    pub fn free_frames(&self) -> usize {
        lock(&self.pool).len()
    }
}

impl SendLink for MemSendLink {
    fn num_send_frames(&self) -> usize {
        self.num_frames
    }

    fn frame_size(&self) -> usize {
        self.frame_size
    }

    fn try_pop_buff(&self) -> Option<FrameBuff> {
        lock(&self.pool).pop_front()
    }

    fn push_packet(&self, mut buff: FrameBuff) -> Result<()> {
        if buff.capacity() != self.frame_size {
            return Err(LinkError::Rejected {
                reason: format!(
                    "foreign buffer (capacity {}, link frame size {})",
                    buff.capacity(),
                    self.frame_size
                ),
            });
        }
        lock(&self.sent).push(Bytes::copy_from_slice(buff.packet()));
        buff.clear();
        lock(&self.pool).push_back(buff);
        Ok(())
    }
}

/// In-memory receive link with a bounded frame pool.
///
/// A producer (the peer side of the loopback, or a test) delivers packets
/// with [`inject`]; consumers drain them in arrival order through the
/// [`RecvLink`] interface.
///
/// [`inject`]: Self::inject
#[derive(Debug)]
pub struct MemRecvLink {
    num_frames: usize,
    frame_size: usize,
    pool: Mutex<VecDeque<FrameBuff>>,
    ready: Mutex<VecDeque<RecvFrame>>,
}

impl MemRecvLink {
    pub fn new(num_frames: usize, frame_size: usize) -> Self {
        let pool = (0..num_frames)
            .map(|_| FrameBuff::with_capacity(frame_size))
            .collect();
        Self {
            num_frames,
            frame_size,
            pool: Mutex::new(pool),
            ready: Mutex::new(VecDeque::new()),
        }
    }

    /// Deliver a packet as if it had arrived on the wire.
    ///
    /// Consumes one pool buffer; fails with [`LinkError::Exhausted`] when
    /// every frame is already in flight.
    pub fn inject(&self, class: PacketClass, packet: &[u8]) -> Result<()> {
        let mut buff = lock(&self.pool).pop_front().ok_or(LinkError::Exhausted)?;
        if let Err(err) = buff.fill(packet) {
            lock(&self.pool).push_front(buff);
            return Err(err);
        }
        lock(&self.ready).push_back(RecvFrame { buff, class });
        Ok(())
    }

    /// Number of free buffers currently in the pool.
    pub fn free_frames(&self) -> usize {
        lock(&self.pool).len()
    }
}

impl RecvLink for MemRecvLink {
    fn num_recv_frames(&self) -> usize {
        self.num_frames
    }

    fn frame_size(&self) -> usize {
        self.frame_size
    }

    fn try_pop_packet(&self) -> Option<RecvFrame> {
        lock(&self.ready).pop_front()
    }

    fn push_buff(&self, mut buff: FrameBuff) -> Result<()> {
        if buff.capacity() != self.frame_size {
            return Err(LinkError::Rejected {
                reason: format!(
                    "foreign buffer (capacity {}, link frame size {})",
                    buff.capacity(),
                    self.frame_size
                ),
            });
        }
        buff.clear();
        lock(&self.pool).push_back(buff);
        Ok(())
    }
}
