//! Frame buffers, link interfaces, and the shared I/O service for CHDR
//! transports.
//!
//! This is the lowest layer of chdrx. A [`FrameBuff`] is a fixed-capacity,
//! exclusively-owned region holding one packet's wire bytes. [`SendLink`]
//! and [`RecvLink`] abstract the physical medium (socket, bus, DMA channel)
//! that hands out and reclaims those buffers. The [`IoService`] portions a
//! link's finite frame pool between the transports sharing it and issues
//! [`SendQueue`]/[`RecvQueue`] capabilities for each reservation.
//!
//! Everything above (endpoint transports, streamers) builds on these types.

pub mod buff;
pub mod class;
pub mod error;
pub mod io_service;
pub mod link;
pub mod mem;

pub use buff::FrameBuff;
pub use class::PacketClass;
pub use error::{LinkError, Result};
pub use io_service::{IoService, RecvQueue, SendQueue};
pub use link::{RecvFrame, RecvLink, SendLink};
pub use mem::{MemRecvLink, MemSendLink};
