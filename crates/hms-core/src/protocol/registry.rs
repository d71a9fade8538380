//! Packet registry: wire tag → constructor.
//!
//! The registry is the only place that turns a decoded JSON document into a
//! concrete [`Packet`].  It is total over tags: a tag with no entry yields
//! [`Packet::Unknown`] instead of an error, so every caller can apply the
//! same bad-packet handling to unknown and malformed input alike.

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;

use crate::protocol::packet::{
    AddDataPacket, DeleteDataPacket, EditDataPacket, GetDataPacket, LoginPacket, LogoutPacket,
    Packet, PacketBody, PacketError, PacketKind, RegisterPacket, ResponsePacket, UnknownPacket,
};

/// Builds a packet with default fields and a fresh request id.
pub type BlankConstructor = fn() -> Packet;

/// Builds a packet from a decoded JSON envelope.
pub type JsonConstructor = fn(&Value) -> Result<Packet, PacketError>;

#[derive(Clone, Copy)]
struct Constructors {
    blank: BlankConstructor,
    from_json: JsonConstructor,
}

fn blank<T: PacketBody>() -> Packet {
    T::default().into()
}

fn parse<T: PacketBody>(json: &Value) -> Result<Packet, PacketError> {
    T::from_json(json).map(Into::into)
}

/// Maps wire tags to packet constructors.
#[derive(Clone, Default)]
pub struct PacketRegistry {
    constructors: HashMap<u8, Constructors>,
}

impl PacketRegistry {
    /// Creates a registry with no entries: every tag decodes as Unknown.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates a registry with every built-in packet kind.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register_body::<LoginPacket>();
        registry.register_body::<RegisterPacket>();
        registry.register_body::<ResponsePacket>();
        registry.register_body::<GetDataPacket>();
        registry.register_body::<LogoutPacket>();
        registry.register_body::<DeleteDataPacket>();
        registry.register_body::<EditDataPacket>();
        registry.register_body::<AddDataPacket>();
        registry
    }

    /// Registers (or replaces) the constructors for `tag`.
    pub fn register(&mut self, tag: u8, blank: BlankConstructor, from_json: JsonConstructor) {
        self.constructors
            .insert(tag, Constructors { blank, from_json });
    }

    /// Registers a [`PacketBody`] under its own tag.
    pub fn register_body<T: PacketBody>(&mut self) {
        self.register(T::KIND.tag(), blank::<T>, parse::<T>);
    }

    pub fn is_registered(&self, tag: u8) -> bool {
        self.constructors.contains_key(&tag)
    }

    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }

    /// Builds a blank packet for `tag`; unregistered tags yield Unknown.
    pub fn create(&self, tag: u64) -> Packet {
        match self.lookup(tag) {
            Some(ctors) => (ctors.blank)(),
            None => Packet::Unknown(UnknownPacket::new()),
        }
    }

    /// Builds the concrete packet described by `json`.
    ///
    /// # Errors
    ///
    /// - [`PacketError::MissingType`] when `type` is absent or not a
    ///   non-negative integer.
    /// - [`PacketError::InvalidField`] when a registered variant's required
    ///   fields are missing or mistyped.
    pub fn from_json(&self, json: &Value) -> Result<Packet, PacketError> {
        let tag = json
            .get("type")
            .and_then(Value::as_u64)
            .ok_or(PacketError::MissingType)?;

        match self.lookup(tag) {
            Some(ctors) => (ctors.from_json)(json),
            None => Ok(Packet::Unknown(UnknownPacket::from_unrecognised(json))),
        }
    }

    fn lookup(&self, tag: u64) -> Option<Constructors> {
        let tag = u8::try_from(tag).ok()?;
        if tag == PacketKind::Unknown.tag() {
            return None;
        }
        self.constructors.get(&tag).copied()
    }
}

impl fmt::Debug for PacketRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<u8> = self.constructors.keys().copied().collect();
        tags.sort_unstable();
        f.debug_struct("PacketRegistry").field("tags", &tags).finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
