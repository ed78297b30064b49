//! CHDR endpoint transport.
//!
//! [`ChdrCtrlXport`] turns a raw send/receive link pair into two
//! independent, timeout-bounded logical channels sharing one physical
//! path: a *control* channel (command/response packets) and a
//! *management* channel (topology/administrative packets). It is bound to
//! one local endpoint id for its lifetime and is the buffer-exchange
//! primitive the control plane builds on.
//!
//! The transport is passive: it runs no thread of its own. Callers
//! acquire a [`FrameBuff`](chdrx_link::FrameBuff), fill or drain it, and
//! hand it back; all waiting is bounded by an explicit [`Timeout`].

pub mod error;
pub mod types;
pub mod xport;

pub use error::{Result, XportError};
pub use types::{EpId, Timeout};
pub use xport::ChdrCtrlXport;
