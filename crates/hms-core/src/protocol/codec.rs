//! Packet ⇄ frame payload codec.
//!
//! ```text
//! Packet ──to_json──▶ JSON text ──base64──▶ frame payload
//! frame payload ──base64⁻¹──▶ JSON text ──registry──▶ Packet
//! ```
//!
//! Base64 keeps the payload free of control bytes so it survives any
//! transport that might otherwise mangle them.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::Value;

use crate::protocol::packet::{Packet, PacketError};
use crate::protocol::registry::PacketRegistry;

/// Encodes a packet into a frame payload.
///
/// # Errors
///
/// Returns [`PacketError::Serialize`] if the packet cannot be serialized.
///
/// # Examples
///
/// ```rust
/// use hms_core::protocol::{decode_packet, encode_packet, LogoutPacket, Packet, PacketRegistry};
///
/// let packet = Packet::from(LogoutPacket::new());
/// let payload = encode_packet(&packet).unwrap();
/// let decoded = decode_packet(&payload, &PacketRegistry::standard()).unwrap();
/// assert_eq!(decoded, packet);
/// ```
pub fn encode_packet(packet: &Packet) -> Result<Vec<u8>, PacketError> {
    let json = packet.to_json()?;
    Ok(STANDARD.encode(json.to_string()).into_bytes())
}

/// Decodes a frame payload into a concrete packet.
///
/// An unregistered `type` tag is not an error: the result is
/// [`Packet::Unknown`].
///
/// # Errors
///
/// - [`PacketError::Base64`] if the payload is not Base64 text.
/// - [`PacketError::Json`] if the decoded bytes are not a JSON document.
/// - Any error from [`PacketRegistry::from_json`].
pub fn decode_packet(payload: &[u8], registry: &PacketRegistry) -> Result<Packet, PacketError> {
    let raw = STANDARD.decode(payload)?;
    let json: Value = serde_json::from_slice(&raw).map_err(PacketError::Json)?;
    registry.from_json(&json)
}
