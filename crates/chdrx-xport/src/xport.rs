use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use chdrx_link::io_service::{IoService, RecvQueue, SendQueue};
use chdrx_link::link::{RecvFrame, RecvLink, SendLink};
use chdrx_link::{FrameBuff, PacketClass};

use crate::error::{Result, XportError};
use crate::types::{EpId, Timeout};

/// Frames reserved for the management channel. Management traffic is
/// sparse; a single frame reservation covers it.
const MGMT_RESERVATION: usize = 1;

/// Wait slice for bounded waits. Link arrivals carry no wake-up, so
/// blocked acquires re-poll at this interval; releases through this
/// transport wake waiters immediately.
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Logical sub-channels multiplexed on the shared receive link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Channel {
    Ctrl,
    Mgmt,
}

/// Transport for CHDR control and management streams.
///
/// Owns one send reservation and two receive reservations (control,
/// management) on a shared link pair, bound to one local [`EpId`].
/// Arriving packets are routed to the control or management channel by
/// the classification tag the link carries; payloads are never inspected.
///
/// All operations take `&self` and are safe to call from arbitrary
/// threads. A single internal lock serializes acquisition bookkeeping and
/// the classify-and-enqueue step; it is never held across a caller's
/// wait.
pub struct ChdrCtrlXport {
    epid: EpId,
    send_if: SendQueue,
    ctrl_recv_if: RecvQueue,
    mgmt_recv_if: RecvQueue,
    state: Mutex<State>,
    buff_released: Condvar,
}

#[derive(Default)]
struct State {
    /// Send buffers currently in caller hands, bounded by the send
    /// reservation.
    send_in_flight: usize,
    outstanding_send: HashSet<u64>,
    /// Caller-held receive buffers, keyed by slot, with the channel each
    /// was acquired from.
    outstanding_recv: HashMap<u64, Channel>,
    ctrl_ready: VecDeque<FrameBuff>,
    mgmt_ready: VecDeque<FrameBuff>,
}

impl State {
    fn ready_queue(&mut self, channel: Channel) -> &mut VecDeque<FrameBuff> {
        match channel {
            Channel::Ctrl => &mut self.ctrl_ready,
            Channel::Mgmt => &mut self.mgmt_ready,
        }
    }
}

impl ChdrCtrlXport {
    /// Construct a transport bound to `epid`, registering its frame
    /// reservations with `io_srv`.
    ///
    /// The receive link must cover `num_recv_frames` control frames plus
    /// one management frame. Any rejected registration aborts
    /// construction with [`XportError::Registration`]; reservations
    /// already obtained are returned to the shared pool. No I/O happens
    /// here beyond bookkeeping.
    pub fn make(
        io_srv: &IoService,
        send_link: Arc<dyn SendLink>,
        recv_link: Arc<dyn RecvLink>,
        epid: EpId,
        num_send_frames: usize,
        num_recv_frames: usize,
    ) -> Result<Self> {
        let send_if = io_srv
            .make_send_client(send_link, num_send_frames)
            .map_err(XportError::Registration)?;
        let ctrl_recv_if = io_srv
            .make_recv_client(Arc::clone(&recv_link), num_recv_frames)
            .map_err(XportError::Registration)?;
        let mgmt_recv_if = io_srv
            .make_recv_client(recv_link, MGMT_RESERVATION)
            .map_err(XportError::Registration)?;

        debug!(%epid, num_send_frames, num_recv_frames, "chdr control transport up");

        Ok(Self {
            epid,
            send_if,
            ctrl_recv_if,
            mgmt_recv_if,
            state: Mutex::new(State::default()),
            buff_released: Condvar::new(),
        })
    }

    /// Acquire an empty buffer to fill with an outbound control packet.
    ///
    /// Returns `None` if no buffer became available within `timeout`,
    /// either because the send reservation is fully in flight or the
    /// link pool is empty.
    pub fn get_send_buff(&self, timeout: Timeout) -> Option<FrameBuff> {
        let deadline = timeout.deadline();
        let mut state = self.lock();
        loop {
            if state.send_in_flight < self.send_if.num_frames() {
                if let Some(buff) = self.send_if.try_pop_buff() {
                    state.send_in_flight += 1;
                    state.outstanding_send.insert(buff.slot());
                    trace!(slot = buff.slot(), "send buffer acquired");
                    return Some(buff);
                }
            }
            state = self.wait_for_change(state, timeout, deadline)?;
        }
    }

    /// Hand a filled buffer to the link for transmission.
    ///
    /// Packets reach the link in release order. After this call the
    /// buffer belongs to the link driver. Buffers that were not acquired
    /// from this transport are refused with
    /// [`XportError::ForeignBuffer`]; a link rejection is surfaced, never
    /// swallowed.
    pub fn release_send_buff(&self, buff: FrameBuff) -> Result<()> {
        let mut state = self.lock();
        if !state.outstanding_send.remove(&buff.slot()) {
            return Err(XportError::ForeignBuffer { slot: buff.slot() });
        }
        state.send_in_flight -= 1;
        // Hand off under the lock so concurrent releases keep FIFO order
        // toward the link; push_packet is non-blocking bookkeeping.
        let pushed = self.send_if.push_packet(buff);
        drop(state);
        self.buff_released.notify_all();
        Ok(pushed?)
    }

    /// Receive the next control-stream packet.
    ///
    /// Returns `Ok(None)` if nothing arrived within `timeout`. An
    /// unclassifiable arrival is a protocol fault and escalates as
    /// [`XportError::Unclassified`].
    pub fn get_recv_buff(&self, timeout: Timeout) -> Result<Option<FrameBuff>> {
        self.recv_channel(Channel::Ctrl, timeout)
    }

    /// Receive the next management-stream packet.
    ///
    /// Same contract as [`get_recv_buff`](Self::get_recv_buff).
    pub fn get_mgmt_buff(&self, timeout: Timeout) -> Result<Option<FrameBuff>> {
        self.recv_channel(Channel::Mgmt, timeout)
    }

    /// Return a previously received buffer to the link pool.
    ///
    /// Works for buffers from either sub-channel; provenance was recorded
    /// at acquisition. Foreign or already-returned buffers are refused
    /// with [`XportError::ForeignBuffer`].
    pub fn release_recv_buff(&self, buff: FrameBuff) -> Result<()> {
        let mut state = self.lock();
        match state.outstanding_recv.remove(&buff.slot()) {
            Some(channel) => {
                trace!(slot = buff.slot(), ?channel, "recv buffer returned");
                drop(state);
                self.ctrl_recv_if.push_buff(buff)?;
                Ok(())
            }
            None => Err(XportError::ForeignBuffer { slot: buff.slot() }),
        }
    }

    /// The local endpoint id this transport is bound to. Never changes.
    pub fn get_epid(&self) -> EpId {
        self.epid
    }

    fn recv_channel(&self, channel: Channel, timeout: Timeout) -> Result<Option<FrameBuff>> {
        let deadline = timeout.deadline();
        let mut state = self.lock();
        loop {
            self.route_arrivals(&mut state)?;
            if let Some(buff) = state.ready_queue(channel).pop_front() {
                state.outstanding_recv.insert(buff.slot(), channel);
                trace!(slot = buff.slot(), ?channel, "recv buffer acquired");
                return Ok(Some(buff));
            }
            state = match self.wait_for_change(state, timeout, deadline) {
                Some(state) => state,
                None => return Ok(None),
            };
        }
    }

    /// Drain the shared receive link and route each arrival to its
    /// channel queue. Runs under the transport lock.
    ///
    /// Both receive handles sit on the same link, so draining through the
    /// control handle observes the full arrival stream.
    fn route_arrivals(&self, state: &mut State) -> Result<()> {
        let mut routed = false;
        while let Some(RecvFrame { buff, class }) = self.ctrl_recv_if.try_pop_packet() {
            match class {
                PacketClass::Control => {
                    state.ctrl_ready.push_back(buff);
                    routed = true;
                }
                PacketClass::Management => {
                    state.mgmt_ready.push_back(buff);
                    routed = true;
                }
                PacketClass::Other(packet_type) => {
                    warn!(packet_type, "unclassifiable packet on receive link");
                    // The frame still goes back to the pool; only the
                    // fault escalates.
                    self.mgmt_recv_if.push_buff(buff)?;
                    return Err(XportError::Unclassified { packet_type });
                }
            }
        }
        if routed {
            // A caller waiting on the other channel may now have a packet.
            self.buff_released.notify_all();
        }
        Ok(())
    }

    /// Give up the lock and wait for a release or the next poll slice.
    /// Returns `None` once `timeout` is spent.
    fn wait_for_change<'a>(
        &self,
        guard: MutexGuard<'a, State>,
        timeout: Timeout,
        deadline: Option<Instant>,
    ) -> Option<MutexGuard<'a, State>> {
        let slice = match timeout {
            Timeout::NoWait => return None,
            Timeout::Forever => POLL_INTERVAL,
            Timeout::After(_) => {
                let remaining = deadline?.checked_duration_since(Instant::now())?;
                if remaining.is_zero() {
                    return None;
                }
                remaining.min(POLL_INTERVAL)
            }
        };
        let (guard, _) = self
            .buff_released
            .wait_timeout(guard, slice)
            .unwrap_or_else(PoisonError::into_inner);
        Some(guard)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ChdrCtrlXport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChdrCtrlXport")
            .field("epid", &self.epid)
            .field("send_frames", &self.send_if.num_frames())
            .field("ctrl_recv_frames", &self.ctrl_recv_if.num_frames())
            .field("mgmt_recv_frames", &self.mgmt_recv_if.num_frames())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chdrx_link::{IoService, LinkError, MemRecvLink, MemSendLink, RecvLink, SendLink};

    use super::*;

    fn links(send_frames: usize, recv_frames: usize) -> (Arc<MemSendLink>, Arc<MemRecvLink>) {
        (
            Arc::new(MemSendLink::new(send_frames, 256)),
            Arc::new(MemRecvLink::new(recv_frames, 256)),
        )
    }

    fn xport(
        send: &Arc<MemSendLink>,
        recv: &Arc<MemRecvLink>,
        num_send: usize,
        num_recv: usize,
    ) -> Result<ChdrCtrlXport> {
        ChdrCtrlXport::make(
            &IoService::new(),
            Arc::clone(send) as Arc<dyn SendLink>,
            Arc::clone(recv) as Arc<dyn RecvLink>,
            EpId::new(2),
            num_send,
            num_recv,
        )
    }

    #[test]
    fn epid_is_stable() {
        let (send, recv) = links(4, 4);
        let xport = xport(&send, &recv, 2, 2).unwrap();

        assert_eq!(xport.get_epid(), EpId::new(2));
        let buff = xport.get_send_buff(Timeout::NoWait).unwrap();
        xport.release_send_buff(buff).unwrap();
        assert_eq!(xport.get_epid(), EpId::new(2));
    }

    #[test]
    fn construction_fails_on_send_over_reservation() {
        let (send, recv) = links(2, 4);
        let err = xport(&send, &recv, 3, 2).unwrap_err();
        assert!(matches!(
            err,
            XportError::Registration(LinkError::InsufficientCapacity { .. })
        ));
    }

    #[test]
    fn construction_fails_without_mgmt_headroom() {
        let (send, recv) = links(2, 4);
        // Control takes the whole receive pool; nothing left for the
        // management reservation.
        let err = xport(&send, &recv, 2, 4).unwrap_err();
        assert!(matches!(
            err,
            XportError::Registration(LinkError::InsufficientCapacity { .. })
        ));
    }

    #[test]
    fn failed_construction_returns_reservations() {
        let (send, recv) = links(2, 4);
        let io = IoService::new();

        let attempt = ChdrCtrlXport::make(
            &io,
            Arc::clone(&send) as Arc<dyn SendLink>,
            Arc::clone(&recv) as Arc<dyn RecvLink>,
            EpId::new(2),
            2,
            4,
        );
        assert!(attempt.is_err());

        // The aborted attempt must not leak capacity on the same service.
        let retry = ChdrCtrlXport::make(
            &io,
            Arc::clone(&send) as Arc<dyn SendLink>,
            Arc::clone(&recv) as Arc<dyn RecvLink>,
            EpId::new(2),
            2,
            3,
        );
        assert!(retry.is_ok());
    }

    #[test]
    fn send_release_transmits() {
        let (send, recv) = links(4, 4);
        let xport = xport(&send, &recv, 2, 2).unwrap();

        let mut buff = xport.get_send_buff(Timeout::NoWait).unwrap();
        buff.fill(b"ctrl request").unwrap();
        xport.release_send_buff(buff).unwrap();

        let sent = send.take_sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].as_ref(), b"ctrl request");
    }

    #[test]
    fn foreign_send_buffer_refused() {
        let (send, recv) = links(4, 4);
        let xport = xport(&send, &recv, 2, 2).unwrap();

        let foreign = FrameBuff::with_capacity(256);
        let slot = foreign.slot();
        let err = xport.release_send_buff(foreign).unwrap_err();
        assert!(matches!(err, XportError::ForeignBuffer { slot: s } if s == slot));
        // Bookkeeping untouched: the reservation is still fully usable.
        let a = xport.get_send_buff(Timeout::NoWait).unwrap();
        let b = xport.get_send_buff(Timeout::NoWait).unwrap();
        xport.release_send_buff(a).unwrap();
        xport.release_send_buff(b).unwrap();
    }

    #[test]
    fn recv_release_refuses_send_buffer_slot() {
        let (send, recv) = links(4, 4);
        let xport = xport(&send, &recv, 2, 2).unwrap();

        let buff = xport.get_send_buff(Timeout::NoWait).unwrap();
        let err = xport.release_recv_buff(buff).unwrap_err();
        assert!(matches!(err, XportError::ForeignBuffer { .. }));
    }

    #[test]
    fn unclassified_packet_escalates_and_returns_frame() {
        let (send, recv) = links(2, 4);
        let xport = xport(&send, &recv, 2, 2).unwrap();

        recv.inject(PacketClass::Other(0x6), b"data packet").unwrap();
        let err = xport.get_recv_buff(Timeout::NoWait).unwrap_err();
        assert!(matches!(err, XportError::Unclassified { packet_type: 0x6 }));
        // The frame went back to the link pool, not into either channel.
        assert_eq!(recv.free_frames(), 4);
        assert!(xport.get_recv_buff(Timeout::NoWait).unwrap().is_none());
        assert!(xport.get_mgmt_buff(Timeout::NoWait).unwrap().is_none());
    }

    #[test]
    fn classified_arrivals_route_to_their_channel() {
        let (send, recv) = links(2, 4);
        let xport = xport(&send, &recv, 2, 2).unwrap();

        recv.inject(PacketClass::Management, b"topology").unwrap();
        recv.inject(PacketClass::Control, b"response").unwrap();

        let ctrl = xport.get_recv_buff(Timeout::NoWait).unwrap().unwrap();
        assert_eq!(ctrl.packet(), b"response");
        let mgmt = xport.get_mgmt_buff(Timeout::NoWait).unwrap().unwrap();
        assert_eq!(mgmt.packet(), b"topology");

        xport.release_recv_buff(ctrl).unwrap();
        xport.release_recv_buff(mgmt).unwrap();
        assert_eq!(recv.free_frames(), 4);
    }

    #[test]
    fn double_release_recv_detected() {
        let (send, recv) = links(2, 4);
        let xport = xport(&send, &recv, 2, 2).unwrap();

        recv.inject(PacketClass::Control, b"once").unwrap();
        let buff = xport.get_recv_buff(Timeout::NoWait).unwrap().unwrap();
        xport.release_recv_buff(buff).unwrap();

        // Reacquiring the same slot through the link is fine; releasing a
        // slot the caller does not hold is not.
        let stale = FrameBuff::with_capacity(256);
        assert!(matches!(
            xport.release_recv_buff(stale),
            Err(XportError::ForeignBuffer { .. })
        ));
    }
}
