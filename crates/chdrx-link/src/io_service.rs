use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::buff::FrameBuff;
use crate::error::{LinkError, Result};
use crate::link::{RecvFrame, RecvLink, SendLink};

/// Portions each link's finite frame pool between the transports sharing
/// it.
///
/// Registration returns a [`SendQueue`] or [`RecvQueue`] capability sized
/// to the requested reservation, or fails if the link cannot cover it.
/// Dropping a queue returns its reservation to the shared pool. The
/// service itself performs no I/O; buffer movement goes through the queue
/// handles.
#[derive(Clone, Default)]
pub struct IoService {
    reservations: Arc<Mutex<Reservations>>,
}

#[derive(Default)]
struct Reservations {
    // keyed by link identity (thin pointer of the Arc'd trait object)
    send: HashMap<usize, usize>,
    recv: HashMap<usize, usize>,
}

fn lock(reservations: &Mutex<Reservations>) -> MutexGuard<'_, Reservations> {
    reservations.lock().unwrap_or_else(PoisonError::into_inner)
}

impl IoService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `num_frames` send frames on `link`.
    pub fn make_send_client(
        &self,
        link: Arc<dyn SendLink>,
        num_frames: usize,
    ) -> Result<SendQueue> {
        let key = Arc::as_ptr(&link) as *const () as usize;
        if num_frames == 0 {
            return Err(LinkError::ZeroReservation);
        }
        let mut resv = lock(&self.reservations);
        let reserved = resv.send.get(&key).copied().unwrap_or(0);
        let available = link.num_send_frames().saturating_sub(reserved);
        if num_frames > available {
            return Err(LinkError::InsufficientCapacity {
                requested: num_frames,
                available,
            });
        }
        *resv.send.entry(key).or_insert(0) += num_frames;
        debug!(num_frames, reserved = reserved + num_frames, "registered send client");
        Ok(SendQueue {
            link,
            num_frames,
            reservations: Arc::clone(&self.reservations),
            key,
        })
    }

    /// Reserve `num_frames` receive frames on `link`.
    pub fn make_recv_client(
        &self,
        link: Arc<dyn RecvLink>,
        num_frames: usize,
    ) -> Result<RecvQueue> {
        let key = Arc::as_ptr(&link) as *const () as usize;
        if num_frames == 0 {
            return Err(LinkError::ZeroReservation);
        }
        let mut resv = lock(&self.reservations);
        let reserved = resv.recv.get(&key).copied().unwrap_or(0);
        let available = link.num_recv_frames().saturating_sub(reserved);
        if num_frames > available {
            return Err(LinkError::InsufficientCapacity {
                requested: num_frames,
                available,
            });
        }
        *resv.recv.entry(key).or_insert(0) += num_frames;
        debug!(num_frames, reserved = reserved + num_frames, "registered recv client");
        Ok(RecvQueue {
            link,
            num_frames,
            reservations: Arc::clone(&self.reservations),
            key,
        })
    }
}

impl std::fmt::Debug for IoService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let resv = lock(&self.reservations);
        f.debug_struct("IoService")
            .field("send_links", &resv.send.len())
            .field("recv_links", &resv.recv.len())
            .finish()
    }
}

/// A transport's reserved share of send frames on a link.
pub struct SendQueue {
    link: Arc<dyn SendLink>,
    num_frames: usize,
    reservations: Arc<Mutex<Reservations>>,
    key: usize,
}

impl SendQueue {
    /// Size of this reservation in frames.
    pub fn num_frames(&self) -> usize {
        self.num_frames
    }

    /// Frame capacity of the underlying link.
    pub fn frame_size(&self) -> usize {
        self.link.frame_size()
    }

    /// Pop a free buffer from the link pool. Never blocks.
    pub fn try_pop_buff(&self) -> Option<FrameBuff> {
        self.link.try_pop_buff()
    }

    /// Hand a filled buffer to the link for transmission.
    pub fn push_packet(&self, buff: FrameBuff) -> Result<()> {
        self.link.push_packet(buff)
    }
}

impl Drop for SendQueue {
    fn drop(&mut self) {
        let mut resv = lock(&self.reservations);
        if let Some(reserved) = resv.send.get_mut(&self.key) {
            *reserved = reserved.saturating_sub(self.num_frames);
        }
        debug!(num_frames = self.num_frames, "released send reservation");
    }
}

impl std::fmt::Debug for SendQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SendQueue")
            .field("num_frames", &self.num_frames)
            .finish()
    }
}

/// A transport's reserved share of receive frames on a link.
pub struct RecvQueue {
    link: Arc<dyn RecvLink>,
    num_frames: usize,
    reservations: Arc<Mutex<Reservations>>,
    key: usize,
}

impl RecvQueue {
    /// Size of this reservation in frames.
    pub fn num_frames(&self) -> usize {
        self.num_frames
    }

    /// Pop the next received packet from the link. Never blocks.
    pub fn try_pop_packet(&self) -> Option<RecvFrame> {
        self.link.try_pop_packet()
    }

    /// Return a drained buffer to the link pool.
    pub fn push_buff(&self, buff: FrameBuff) -> Result<()> {
        self.link.push_buff(buff)
    }
}

impl Drop for RecvQueue {
    fn drop(&mut self) {
        let mut resv = lock(&self.reservations);
        if let Some(reserved) = resv.recv.get_mut(&self.key) {
            *reserved = reserved.saturating_sub(self.num_frames);
        }
        debug!(num_frames = self.num_frames, "released recv reservation");
    }
}

impl std::fmt::Debug for RecvQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecvQueue")
            .field("num_frames", &self.num_frames)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::mem::{MemRecvLink, MemSendLink};

    #[test]
    fn send_reservation_within_capacity() {
        let io = IoService::new();
        let link: Arc<dyn SendLink> = Arc::new(MemSendLink::new(8, 256));

        let queue = io.make_send_client(Arc::clone(&link), 4).unwrap();
        assert_eq!(queue.num_frames(), 4);
        assert_eq!(queue.frame_size(), 256);
    }

    #[test]
    fn send_reservation_over_capacity_fails() {
        let io = IoService::new();
        let link: Arc<dyn SendLink> = Arc::new(MemSendLink::new(4, 256));

        let err = io.make_send_client(Arc::clone(&link), 5).unwrap_err();
        assert!(matches!(
            err,
            LinkError::InsufficientCapacity {
                requested: 5,
                available: 4
            }
        ));
    }

    #[test]
    fn zero_reservation_rejected() {
        let io = IoService::new();
        let send: Arc<dyn SendLink> = Arc::new(MemSendLink::new(4, 256));
        let recv: Arc<dyn RecvLink> = Arc::new(MemRecvLink::new(4, 256));

        assert!(matches!(
            io.make_send_client(send, 0),
            Err(LinkError::ZeroReservation)
        ));
        assert!(matches!(
            io.make_recv_client(recv, 0),
            Err(LinkError::ZeroReservation)
        ));
    }

    #[test]
    fn shared_link_accounting() {
        let io = IoService::new();
        let link: Arc<dyn RecvLink> = Arc::new(MemRecvLink::new(8, 256));

        let _a = io.make_recv_client(Arc::clone(&link), 5).unwrap();
        let _b = io.make_recv_client(Arc::clone(&link), 3).unwrap();
        let err = io.make_recv_client(Arc::clone(&link), 1).unwrap_err();
        assert!(matches!(
            err,
            LinkError::InsufficientCapacity { available: 0, .. }
        ));
    }

    #[test]
    fn dropping_queue_returns_capacity() {
        let io = IoService::new();
        let link: Arc<dyn SendLink> = Arc::new(MemSendLink::new(4, 256));

        let queue = io.make_send_client(Arc::clone(&link), 4).unwrap();
        assert!(io.make_send_client(Arc::clone(&link), 1).is_err());

        drop(queue);
        assert!(io.make_send_client(Arc::clone(&link), 4).is_ok());
    }

    #[test]
    fn independent_links_do_not_share_accounting() {
        let io = IoService::new();
        let a: Arc<dyn SendLink> = Arc::new(MemSendLink::new(2, 64));
        let b: Arc<dyn SendLink> = Arc::new(MemSendLink::new(2, 64));

        let _qa = io.make_send_client(Arc::clone(&a), 2).unwrap();
        assert!(io.make_send_client(Arc::clone(&b), 2).is_ok());
    }
}
