//! CHDR packet-type values and receive-side classification.
//!
//! The header codec that parses CHDR packets lives outside this crate; a
//! link driver (or the codec running on its behalf) tags every received
//! frame with a [`PacketClass`] derived from the packet-type field so that
//! transports can route frames without touching the payload.

/// Management packet (topology/administrative stream).
pub const PKT_TYPE_MGMT: u8 = 0x0;

/// Stream status packet.
pub const PKT_TYPE_STRS: u8 = 0x1;

/// Stream command packet.
pub const PKT_TYPE_STRC: u8 = 0x2;

/// Control packet (command/response stream).
pub const PKT_TYPE_CTRL: u8 = 0x4;

/// Data packet without timestamp.
pub const PKT_TYPE_DATA_NO_TS: u8 = 0x6;

/// Data packet with timestamp.
pub const PKT_TYPE_DATA_TS: u8 = 0x7;

/// Classification of a received frame, as routed by an endpoint transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketClass {
    /// Control stream (command/response).
    Control,
    /// Management stream (topology/administrative).
    Management,
    /// Any other packet type; carries the raw type value for reporting.
    Other(u8),
}

impl PacketClass {
    /// Classify from the raw CHDR packet-type field.
    pub fn from_packet_type(pkt_type: u8) -> Self {
        match pkt_type {
            PKT_TYPE_CTRL => PacketClass::Control,
            PKT_TYPE_MGMT => PacketClass::Management,
            other => PacketClass::Other(other),
        }
    }

    /// Human-readable name for log output.
    pub fn name(self) -> &'static str {
        match self {
            PacketClass::Control => "CTRL",
            PacketClass::Management => "MGMT",
            PacketClass::Other(PKT_TYPE_STRS) => "STRS",
            PacketClass::Other(PKT_TYPE_STRC) => "STRC",
            PacketClass::Other(PKT_TYPE_DATA_NO_TS) | PacketClass::Other(PKT_TYPE_DATA_TS) => {
                "DATA"
            }
            PacketClass::Other(_) => "UNKNOWN",
        }
    }
}
