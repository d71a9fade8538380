//! Packet model: the tagged message family carried inside every frame.
//!
//! Every packet is a JSON object with two envelope fields shared by all
//! variants:
//!
//! ```text
//! { "type": <u8 tag>, "request_id": <u64>, ...variant fields }
//! ```
//!
//! Nested structured payloads (`data`, `new_data`, `additional_data`) are
//! themselves JSON documents, double-encoded as a *string* inside the outer
//! object.  Parsing those fields is deliberately lenient: a missing key, a
//! non-string value or unparsable text all decode to an empty object.  Every
//! other field is strict and a missing or mistyped value is a
//! [`PacketError::InvalidField`].

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::protocol::request_id::next_request_id;

/// Errors produced while building, serializing or parsing packets.
#[derive(Debug, Error)]
pub enum PacketError {
    /// The JSON document has no integer `type` field.
    #[error("packet has no integer `type` field")]
    MissingType,

    /// A required field of a known variant is absent or has the wrong type.
    #[error("invalid {kind}: {source}")]
    InvalidField {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// The frame payload is not valid Base64 text.
    #[error("payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    /// The decoded payload is not a JSON document.
    #[error("payload is not valid JSON: {0}")]
    Json(#[source] serde_json::Error),

    /// A packet could not be turned into JSON.
    #[error("failed to serialize {kind}: {source}")]
    Serialize {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Returned when a wire discriminant does not name any enum variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{value} is not a valid {what}")]
pub struct InvalidDiscriminant {
    pub what: &'static str,
    pub value: u8,
}

// ── Packet kinds ──────────────────────────────────────────────────────────────

/// Wire-level type tag of a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum PacketKind {
    Login = 0,
    Register = 1,
    Response = 2,
    GetData = 3,
    Logout = 4,
    DeleteData = 5,
    EditData = 6,
    AddData = 7,
    /// Sentinel for tags no registry entry recognises.
    Unknown = 0xFF,
}

impl PacketKind {
    /// Every kind with a concrete payload, in tag order.
    pub const KNOWN: [PacketKind; 8] = [
        PacketKind::Login,
        PacketKind::Register,
        PacketKind::Response,
        PacketKind::GetData,
        PacketKind::Logout,
        PacketKind::DeleteData,
        PacketKind::EditData,
        PacketKind::AddData,
    ];

    /// Returns the numeric tag written into the `type` field.
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Returns the diagnostic name of the variant.
    pub fn name(self) -> &'static str {
        match self {
            PacketKind::Login => "LoginPacket",
            PacketKind::Register => "RegisterPacket",
            PacketKind::Response => "ResponsePacket",
            PacketKind::GetData => "GetDataPacket",
            PacketKind::Logout => "LogoutPacket",
            PacketKind::DeleteData => "DeleteDataPacket",
            PacketKind::EditData => "EditDataPacket",
            PacketKind::AddData => "AddDataPacket",
            PacketKind::Unknown => "UnknownPacket",
        }
    }
}

impl TryFrom<u8> for PacketKind {
    type Error = InvalidDiscriminant;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(PacketKind::Login),
            1 => Ok(PacketKind::Register),
            2 => Ok(PacketKind::Response),
            3 => Ok(PacketKind::GetData),
            4 => Ok(PacketKind::Logout),
            5 => Ok(PacketKind::DeleteData),
            6 => Ok(PacketKind::EditData),
            7 => Ok(PacketKind::AddData),
            0xFF => Ok(PacketKind::Unknown),
            _ => Err(InvalidDiscriminant {
                what: "packet kind",
                value,
            }),
        }
    }
}

// ── Response codes and table ids ──────────────────────────────────────────────

/// Outcome code carried by every [`ResponsePacket`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum ResponseCode {
    Success = 0,
    UnknownError = 1,
    RegErrUserExists = 2,
    LogErrInvalidData = 3,
    InternalError = 4,
    AccessDenied = 5,
    InvalidTable = 6,
    DeletionError = 7,
    EditionError = 8,
    RegErrInvalidData = 9,
}

impl ResponseCode {
    pub fn is_success(self) -> bool {
        self == ResponseCode::Success
    }
}

impl From<ResponseCode> for u8 {
    fn from(code: ResponseCode) -> u8 {
        code as u8
    }
}

impl TryFrom<u8> for ResponseCode {
    type Error = InvalidDiscriminant;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ResponseCode::Success),
            1 => Ok(ResponseCode::UnknownError),
            2 => Ok(ResponseCode::RegErrUserExists),
            3 => Ok(ResponseCode::LogErrInvalidData),
            4 => Ok(ResponseCode::InternalError),
            5 => Ok(ResponseCode::AccessDenied),
            6 => Ok(ResponseCode::InvalidTable),
            7 => Ok(ResponseCode::DeletionError),
            8 => Ok(ResponseCode::EditionError),
            9 => Ok(ResponseCode::RegErrInvalidData),
            _ => Err(InvalidDiscriminant {
                what: "response code",
                value,
            }),
        }
    }
}

/// Logical table addressed by data packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum TableId {
    Users = 0,
    Rooms = 1,
    Bookings = 2,
}

impl TableId {
    pub const ALL: [TableId; 3] = [TableId::Users, TableId::Rooms, TableId::Bookings];

    /// Returns the storage-level table name.
    pub fn name(self) -> &'static str {
        match self {
            TableId::Users => "Users",
            TableId::Rooms => "Rooms",
            TableId::Bookings => "Bookings",
        }
    }

    /// Looks a table up by its storage-level name (case-insensitive).
    pub fn from_name(name: &str) -> Option<TableId> {
        TableId::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(name))
    }
}

impl From<TableId> for u8 {
    fn from(table: TableId) -> u8 {
        table as u8
    }
}

impl TryFrom<u8> for TableId {
    type Error = InvalidDiscriminant;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(TableId::Users),
            1 => Ok(TableId::Rooms),
            2 => Ok(TableId::Bookings),
            _ => Err(InvalidDiscriminant {
                what: "table id",
                value,
            }),
        }
    }
}

// ── Embedded JSON fields ──────────────────────────────────────────────────────

/// Returns a fresh empty JSON object.
pub fn empty_object() -> Value {
    Value::Object(Map::new())
}

/// Serde adapter for JSON documents carried as strings inside the envelope.
mod embedded_json {
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    use super::empty_object;

    pub fn serialize<S: Serializer>(value: &Value, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Value, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        Ok(match raw {
            Value::String(text) => serde_json::from_str(&text).unwrap_or_else(|_| empty_object()),
            _ => empty_object(),
        })
    }
}

// ── Packet bodies ─────────────────────────────────────────────────────────────

/// Common behaviour of every concrete packet body.
///
/// The provided methods implement the envelope: `to_json` adds the `type`
/// tag and `from_json` ignores it.
pub trait PacketBody: Serialize + DeserializeOwned + Default + Into<Packet> {
    /// Tag of this body on the wire.
    const KIND: PacketKind;

    /// Parses the body from a decoded JSON envelope.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError::InvalidField`] if a required field is absent
    /// or mistyped.
    fn from_json(json: &Value) -> Result<Self, PacketError> {
        Self::deserialize(json).map_err(|source| PacketError::InvalidField {
            kind: Self::KIND.name(),
            source,
        })
    }

    /// Serializes the body including the `type` envelope field.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError::Serialize`] if serialization fails.
    fn to_json(&self) -> Result<Value, PacketError> {
        let mut value = serde_json::to_value(self).map_err(|source| PacketError::Serialize {
            kind: Self::KIND.name(),
            source,
        })?;
        if let Value::Object(map) = &mut value {
            map.insert("type".to_string(), Value::from(Self::KIND.tag()));
        }
        Ok(value)
    }
}

/// Credentials sent by a client that wants to log in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginPacket {
    pub request_id: u64,
    pub login: String,
    pub password: String,
}

impl LoginPacket {
    pub fn new(login: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            request_id: next_request_id(),
            login: login.into(),
            password: password.into(),
        }
    }
}

/// Account creation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterPacket {
    pub request_id: u64,
    pub login: String,
    pub password: String,
    pub name: String,
    pub surname: String,
    pub phone_number: String,
}

impl RegisterPacket {
    pub fn new(
        login: impl Into<String>,
        password: impl Into<String>,
        name: impl Into<String>,
        surname: impl Into<String>,
        phone_number: impl Into<String>,
    ) -> Self {
        Self {
            request_id: next_request_id(),
            login: login.into(),
            password: password.into(),
            name: name.into(),
            surname: surname.into(),
            phone_number: phone_number.into(),
        }
    }
}

/// The single reply shape for every request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponsePacket {
    pub request_id: u64,
    pub error_code: ResponseCode,
    pub error_message: String,
    #[serde(default = "empty_object", with = "embedded_json")]
    pub additional_data: Value,
}

impl ResponsePacket {
    /// Builds a reply to the request identified by `request_id`.
    pub fn new(request_id: u64, error_code: ResponseCode, error_message: impl Into<String>) -> Self {
        Self {
            request_id,
            error_code,
            error_message: error_message.into(),
            additional_data: empty_object(),
        }
    }

    /// Builds a `Success` reply with no message and no data.
    pub fn success(request_id: u64) -> Self {
        Self::new(request_id, ResponseCode::Success, "")
    }

    pub fn with_data(mut self, additional_data: Value) -> Self {
        self.additional_data = additional_data;
        self
    }

    pub fn is_success(&self) -> bool {
        self.error_code.is_success()
    }
}

/// Fetch every row of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetDataPacket {
    pub request_id: u64,
    pub table: TableId,
}

impl GetDataPacket {
    pub fn new(table: TableId) -> Self {
        Self {
            request_id: next_request_id(),
            table,
        }
    }
}

/// Ends the authenticated part of a session.  Never answered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogoutPacket {
    pub request_id: u64,
}

impl LogoutPacket {
    pub fn new() -> Self {
        Self {
            request_id: next_request_id(),
        }
    }
}

/// Delete one record by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteDataPacket {
    pub request_id: u64,
    pub table_id: TableId,
    pub record_id: i64,
}

impl DeleteDataPacket {
    pub fn new(table_id: TableId, record_id: i64) -> Self {
        Self {
            request_id: next_request_id(),
            table_id,
            record_id,
        }
    }
}

/// Update some fields of one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditDataPacket {
    pub request_id: u64,
    pub table_id: TableId,
    pub record_id: i64,
    #[serde(default = "empty_object", with = "embedded_json")]
    pub new_data: Value,
}

impl EditDataPacket {
    pub fn new(table_id: TableId, record_id: i64, new_data: Value) -> Self {
        Self {
            request_id: next_request_id(),
            table_id,
            record_id,
            new_data,
        }
    }
}

/// Insert one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddDataPacket {
    pub request_id: u64,
    pub table: TableId,
    #[serde(default = "empty_object", with = "embedded_json")]
    pub data: Value,
}

impl AddDataPacket {
    pub fn new(table: TableId, data: Value) -> Self {
        Self {
            request_id: next_request_id(),
            table,
            data,
        }
    }
}

/// Sentinel produced for unrecognised tags and sent back on bad input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnknownPacket {
    pub request_id: u64,
}

impl UnknownPacket {
    pub fn new() -> Self {
        Self {
            request_id: next_request_id(),
        }
    }

    /// Builds the sentinel for an unrecognised document, keeping its
    /// `request_id` when one is present.
    pub fn from_unrecognised(json: &Value) -> Self {
        let request_id = json
            .get("request_id")
            .and_then(Value::as_u64)
            .unwrap_or_else(next_request_id);
        Self { request_id }
    }
}

impl Default for LoginPacket {
    fn default() -> Self {
        Self::new("", "")
    }
}

impl Default for RegisterPacket {
    fn default() -> Self {
        Self::new("", "", "", "", "")
    }
}

impl Default for ResponsePacket {
    fn default() -> Self {
        Self::success(next_request_id())
    }
}

impl Default for GetDataPacket {
    fn default() -> Self {
        Self::new(TableId::Users)
    }
}

impl Default for LogoutPacket {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for DeleteDataPacket {
    fn default() -> Self {
        Self::new(TableId::Users, 0)
    }
}

impl Default for EditDataPacket {
    fn default() -> Self {
        Self::new(TableId::Users, 0, empty_object())
    }
}

impl Default for AddDataPacket {
    fn default() -> Self {
        Self::new(TableId::Users, empty_object())
    }
}

impl Default for UnknownPacket {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketBody for LoginPacket {
    const KIND: PacketKind = PacketKind::Login;
}
impl PacketBody for RegisterPacket {
    const KIND: PacketKind = PacketKind::Register;
}
impl PacketBody for ResponsePacket {
    const KIND: PacketKind = PacketKind::Response;
}
impl PacketBody for GetDataPacket {
    const KIND: PacketKind = PacketKind::GetData;
}
impl PacketBody for LogoutPacket {
    const KIND: PacketKind = PacketKind::Logout;
}
impl PacketBody for DeleteDataPacket {
    const KIND: PacketKind = PacketKind::DeleteData;
}
impl PacketBody for EditDataPacket {
    const KIND: PacketKind = PacketKind::EditData;
}
impl PacketBody for AddDataPacket {
    const KIND: PacketKind = PacketKind::AddData;
}
impl PacketBody for UnknownPacket {
    const KIND: PacketKind = PacketKind::Unknown;
}

// ── The packet sum type ───────────────────────────────────────────────────────

/// Any packet that can travel inside a frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Login(LoginPacket),
    Register(RegisterPacket),
    Response(ResponsePacket),
    GetData(GetDataPacket),
    Logout(LogoutPacket),
    DeleteData(DeleteDataPacket),
    EditData(EditDataPacket),
    AddData(AddDataPacket),
    Unknown(UnknownPacket),
}

impl Packet {
    /// Returns the wire tag of this packet.
    pub fn kind(&self) -> PacketKind {
        match self {
            Packet::Login(_) => PacketKind::Login,
            Packet::Register(_) => PacketKind::Register,
            Packet::Response(_) => PacketKind::Response,
            Packet::GetData(_) => PacketKind::GetData,
            Packet::Logout(_) => PacketKind::Logout,
            Packet::DeleteData(_) => PacketKind::DeleteData,
            Packet::EditData(_) => PacketKind::EditData,
            Packet::AddData(_) => PacketKind::AddData,
            Packet::Unknown(_) => PacketKind::Unknown,
        }
    }

    /// Diagnostic name, e.g. `"LoginPacket"`.
    pub fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// Correlation id of this packet.
    pub fn request_id(&self) -> u64 {
        match self {
            Packet::Login(p) => p.request_id,
            Packet::Register(p) => p.request_id,
            Packet::Response(p) => p.request_id,
            Packet::GetData(p) => p.request_id,
            Packet::Logout(p) => p.request_id,
            Packet::DeleteData(p) => p.request_id,
            Packet::EditData(p) => p.request_id,
            Packet::AddData(p) => p.request_id,
            Packet::Unknown(p) => p.request_id,
        }
    }

    /// Replaces the correlation id, e.g. to pin it in a test scenario.
    pub fn with_request_id(mut self, request_id: u64) -> Self {
        match &mut self {
            Packet::Login(p) => p.request_id = request_id,
            Packet::Register(p) => p.request_id = request_id,
            Packet::Response(p) => p.request_id = request_id,
            Packet::GetData(p) => p.request_id = request_id,
            Packet::Logout(p) => p.request_id = request_id,
            Packet::DeleteData(p) => p.request_id = request_id,
            Packet::EditData(p) => p.request_id = request_id,
            Packet::AddData(p) => p.request_id = request_id,
            Packet::Unknown(p) => p.request_id = request_id,
        }
        self
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Packet::Unknown(_))
    }

    /// Serializes the packet into its JSON envelope.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError::Serialize`] if serialization fails.
    pub fn to_json(&self) -> Result<Value, PacketError> {
        match self {
            Packet::Login(p) => p.to_json(),
            Packet::Register(p) => p.to_json(),
            Packet::Response(p) => p.to_json(),
            Packet::GetData(p) => p.to_json(),
            Packet::Logout(p) => p.to_json(),
            Packet::DeleteData(p) => p.to_json(),
            Packet::EditData(p) => p.to_json(),
            Packet::AddData(p) => p.to_json(),
            Packet::Unknown(p) => p.to_json(),
        }
    }

    /// Consumes the packet, returning the response body if it is one.
    pub fn into_response(self) -> Option<ResponsePacket> {
        match self {
            Packet::Response(p) => Some(p),
            _ => None,
        }
    }
}

impl From<LoginPacket> for Packet {
    fn from(p: LoginPacket) -> Self {
        Packet::Login(p)
    }
}
impl From<RegisterPacket> for Packet {
    fn from(p: RegisterPacket) -> Self {
        Packet::Register(p)
    }
}
impl From<ResponsePacket> for Packet {
    fn from(p: ResponsePacket) -> Self {
        Packet::Response(p)
    }
}
impl From<GetDataPacket> for Packet {
    fn from(p: GetDataPacket) -> Self {
        Packet::GetData(p)
    }
}
impl From<LogoutPacket> for Packet {
    fn from(p: LogoutPacket) -> Self {
        Packet::Logout(p)
    }
}
impl From<DeleteDataPacket> for Packet {
    fn from(p: DeleteDataPacket) -> Self {
        Packet::DeleteData(p)
    }
}
impl From<EditDataPacket> for Packet {
    fn from(p: EditDataPacket) -> Self {
        Packet::EditData(p)
    }
}
impl From<AddDataPacket> for Packet {
    fn from(p: AddDataPacket) -> Self {
        Packet::AddData(p)
    }
}
impl From<UnknownPacket> for Packet {
    fn from(p: UnknownPacket) -> Self {
        Packet::Unknown(p)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_login_to_json_carries_type_and_request_id() {
        // Arrange
        let packet = Packet::from(LoginPacket::new("a@b.com", "secret123")).with_request_id(42);

        // Act
        let json = packet.to_json().expect("serialize");

        // Assert
        assert_eq!(json["type"], json!(0));
        assert_eq!(json["request_id"], json!(42));
        assert_eq!(json["login"], json!("a@b.com"));
        assert_eq!(json["password"], json!("secret123"));
    }

    #[test]
    fn test_embedded_data_is_serialized_as_string() {
        // Arrange
        let packet = AddDataPacket::new(TableId::Rooms, json!({"capacity": "2"}));

        // Act
        let json = packet.to_json().expect("serialize");

        // Assert
        let text = json["data"].as_str().expect("data must be a string");
        let inner: Value = serde_json::from_str(text).expect("inner JSON");
        assert_eq!(inner, json!({"capacity": "2"}));
        assert_eq!(json["table"], json!(1));
    }

    #[test]
    fn test_response_additional_data_parses_nested_document() {
        // Arrange
        let json = json!({
            "type": 2,
            "request_id": 7,
            "error_code": 0,
            "error_message": "",
            "additional_data": "{\"id\":1,\"role\":\"admin\"}"
        });

        // Act
        let response = ResponsePacket::from_json(&json).expect("parse");

        // Assert
        assert_eq!(response.request_id, 7);
        assert_eq!(response.error_code, ResponseCode::Success);
        assert_eq!(response.additional_data, json!({"id": 1, "role": "admin"}));
    }

    #[test]
    fn test_missing_embedded_field_falls_back_to_empty_object() {
        let json = json!({"type": 7, "request_id": 1, "table": 0});

        let packet = AddDataPacket::from_json(&json).expect("parse");

        assert_eq!(packet.data, empty_object());
    }

    #[test]
    fn test_unparsable_embedded_field_falls_back_to_empty_object() {
        let json = json!({
            "type": 6, "request_id": 1, "table_id": 2, "record_id": 5,
            "new_data": "{not json"
        });

        let packet = EditDataPacket::from_json(&json).expect("parse");

        assert_eq!(packet.new_data, empty_object());
        assert_eq!(packet.record_id, 5);
        assert_eq!(packet.table_id, TableId::Bookings);
    }

    #[test]
    fn test_non_string_embedded_field_falls_back_to_empty_object() {
        let json = json!({
            "type": 2, "request_id": 3, "error_code": 5,
            "error_message": "Access Denied", "additional_data": 17
        });

        let response = ResponsePacket::from_json(&json).expect("parse");

        assert_eq!(response.additional_data, empty_object());
        assert_eq!(response.error_code, ResponseCode::AccessDenied);
    }

    #[test]
    fn test_missing_required_field_is_an_error() {
        // Arrange – no password
        let json = json!({"type": 0, "request_id": 1, "login": "a@b.com"});

        // Act
        let result = LoginPacket::from_json(&json);

        // Assert
        match result {
            Err(PacketError::InvalidField { kind, .. }) => assert_eq!(kind, "LoginPacket"),
            other => panic!("expected InvalidField, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_request_id_is_an_error() {
        let json = json!({"type": 3, "table": 0});

        assert!(GetDataPacket::from_json(&json).is_err());
    }

    #[test]
    fn test_mistyped_field_is_an_error() {
        let json = json!({"type": 5, "request_id": 1, "table_id": 0, "record_id": "five"});

        assert!(DeleteDataPacket::from_json(&json).is_err());
    }

    #[test]
    fn test_out_of_range_table_id_is_an_error() {
        let json = json!({"type": 3, "request_id": 1, "table": 9});

        assert!(GetDataPacket::from_json(&json).is_err());
    }

    #[test]
    fn test_out_of_range_response_code_is_an_error() {
        let json = json!({"type": 2, "request_id": 1, "error_code": 42, "error_message": ""});

        assert!(ResponsePacket::from_json(&json).is_err());
    }

    #[test]
    fn test_packet_kind_try_from_covers_all_tags() {
        for kind in PacketKind::KNOWN {
            assert_eq!(PacketKind::try_from(kind.tag()), Ok(kind));
        }
        assert_eq!(PacketKind::try_from(0xFF), Ok(PacketKind::Unknown));
        assert!(PacketKind::try_from(8).is_err());
    }

    #[test]
    fn test_packet_names_match_variants() {
        assert_eq!(Packet::from(LogoutPacket::new()).name(), "LogoutPacket");
        assert_eq!(Packet::from(UnknownPacket::new()).name(), "UnknownPacket");
        assert_eq!(PacketKind::DeleteData.name(), "DeleteDataPacket");
    }

    #[test]
    fn test_table_names_and_lookup() {
        assert_eq!(TableId::Users.name(), "Users");
        assert_eq!(TableId::Rooms.name(), "Rooms");
        assert_eq!(TableId::Bookings.name(), "Bookings");
        assert_eq!(TableId::from_name("rooms"), Some(TableId::Rooms));
        assert_eq!(TableId::from_name("Invoices"), None);
    }

    #[test]
    fn test_constructors_assign_distinct_request_ids() {
        let a = LoginPacket::new("x", "y");
        let b = LoginPacket::new("x", "y");

        assert_ne!(a.request_id, b.request_id);
    }

    #[test]
    fn test_unknown_from_unrecognised_keeps_request_id() {
        let json = json!({"type": 200, "request_id": 99});

        let packet = UnknownPacket::from_unrecognised(&json);

        assert_eq!(packet.request_id, 99);
    }

    #[test]
    fn test_into_response_only_for_response_variant() {
        let response = Packet::from(ResponsePacket::success(5));
        let login = Packet::from(LoginPacket::new("a", "b"));

        assert_eq!(response.into_response().map(|r| r.request_id), Some(5));
        assert!(login.into_response().is_none());
    }
}
