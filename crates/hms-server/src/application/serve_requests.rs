//! ServeRequestsUseCase: the business rules behind every request packet.
//!
//! The server session manager decodes a packet, locks the sender's
//! [`ClientState`] and calls [`PacketHandler::handle`].  Whatever packet the
//! handler returns is sent back on the same session.
//!
//! # Reply contract
//!
//! Every request gets exactly one [`ResponsePacket`] carrying the request's
//! own `request_id`, except `Logout`, which has no reply.  Business failures
//! are reported through the response's `error_code` and `error_message`;
//! they never close the connection.  A storage failure becomes
//! `InternalError "Internal server error"`.
//!
//! # Access rules
//!
//! Only an administrator may log in.  Table reads and writes require an
//! administrator session.  An administrator may not delete their own account
//! and may only change their own name, phone number and password.

use std::sync::Arc;

use async_trait::async_trait;
use hms_core::protocol::{
    AddDataPacket, DeleteDataPacket, EditDataPacket, GetDataPacket, LoginPacket, Packet,
    RegisterPacket, ResponseCode, ResponsePacket, TableId,
};
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::application::storage::{NewUser, Row, Storage, StorageError};
use crate::domain::client_state::{ClientState, UserRole};

/// Columns an administrator may change on their own account.
const SELF_EDITABLE_COLUMNS: &[&str] = &["first_name", "last_name", "phone_number", "password_hash"];

/// Business-logic seam between the network layer and the use case.
#[async_trait]
pub trait PacketHandler: Send + Sync {
    /// Handles one decoded packet for a client.  Returns the reply, if any.
    async fn handle(&self, packet: Packet, client: &mut ClientState) -> Option<Packet>;
}

/// Implements every request type against a [`Storage`] backend.
pub struct ServeRequestsUseCase<S> {
    storage: Arc<S>,
}

impl<S: Storage> ServeRequestsUseCase<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    fn login(&self, p: LoginPacket, client: &mut ClientState) -> Result<ResponsePacket, StorageError> {
        let id = p.request_id;
        let Some(user) = self.storage.find_user(&p.login)? else {
            info!(login = %p.login, "login failed: unknown user");
            return Ok(ResponsePacket::new(id, ResponseCode::LogErrInvalidData, "Invalid credentials"));
        };
        if !self.storage.verify_password(&user, &p.password) {
            info!(login = %p.login, "login failed: wrong password");
            return Ok(ResponsePacket::new(id, ResponseCode::LogErrInvalidData, "Invalid credentials"));
        }

        let role = UserRole::from_column(&user.role);
        if role != UserRole::Admin {
            info!(login = %p.login, role = %role, "login refused for non-admin");
            return Ok(ResponsePacket::new(id, ResponseCode::AccessDenied, "Access denied"));
        }

        client.log_in(user.email.clone(), user.id, role);
        info!(login = %user.email, "client logged in");
        Ok(ResponsePacket::success(id).with_data(json!({
            "id": user.id,
            "name": user.first_name,
            "surname": user.last_name,
            "role": user.role,
        })))
    }

    fn register(&self, p: RegisterPacket) -> Result<ResponsePacket, StorageError> {
        let id = p.request_id;
        if self.storage.find_user(&p.login)?.is_some() {
            info!(login = %p.login, "registration refused: user exists");
            return Ok(ResponsePacket::new(id, ResponseCode::RegErrUserExists, "User already exists"));
        }
        let user_id = self.storage.insert_user(NewUser {
            email: p.login,
            password: p.password,
            first_name: p.name,
            last_name: p.surname,
            phone_number: p.phone_number,
        })?;
        info!(user_id, "user registered");
        Ok(ResponsePacket::success(id))
    }

    fn get_data(&self, p: GetDataPacket, client: &ClientState) -> Result<ResponsePacket, StorageError> {
        let id = p.request_id;
        if !client.is_admin() {
            return Ok(access_denied(id));
        }
        let rows = self.storage.fetch_rows(p.table)?;
        if rows.is_empty() {
            debug!(table = p.table.name(), "no rows to return");
            return Ok(ResponsePacket::new(id, ResponseCode::InvalidTable, "Invalid table or no data"));
        }
        let rows = Value::Array(rows.into_iter().map(Value::Object).collect());
        Ok(ResponsePacket::success(id).with_data(rows))
    }

    fn delete_data(&self, p: DeleteDataPacket, client: &ClientState) -> Result<ResponsePacket, StorageError> {
        let id = p.request_id;
        if !client.is_admin() {
            return Ok(access_denied(id));
        }
        let missing = || {
            ResponsePacket::new(
                id,
                ResponseCode::DeletionError,
                format!("Can't find data id = {} from {}.", p.record_id, u8::from(p.table_id)),
            )
        };

        let Some(row) = self.storage.find_row(p.table_id, p.record_id)? else {
            return Ok(missing());
        };
        if p.table_id == TableId::Users && is_own_account(&row, client) {
            return Ok(ResponsePacket::new(id, ResponseCode::AccessDenied, "Cannot delete yourself"));
        }
        if !self.storage.delete_row(p.table_id, p.record_id)? {
            return Ok(missing());
        }
        info!(table = p.table_id.name(), record_id = p.record_id, "row deleted");
        Ok(ResponsePacket::success(id))
    }

    fn edit_data(&self, p: EditDataPacket, client: &ClientState) -> Result<ResponsePacket, StorageError> {
        let id = p.request_id;
        if !client.is_admin() {
            return Ok(access_denied(id));
        }
        let missing = || {
            ResponsePacket::new(
                id,
                ResponseCode::EditionError,
                format!("Can't find record id = {} in table {}.", p.record_id, p.table_id.name()),
            )
        };

        let Some(row) = self.storage.find_row(p.table_id, p.record_id)? else {
            return Ok(missing());
        };
        let changes = as_fields(&p.new_data);

        if p.table_id == TableId::Users && is_own_account(&row, client) {
            if let Some(column) = changes
                .keys()
                .find(|k| !SELF_EDITABLE_COLUMNS.contains(&k.as_str()))
            {
                return Ok(ResponsePacket::new(
                    id,
                    ResponseCode::AccessDenied,
                    format!("Admins cannot change their own {column}"),
                ));
            }
        }
        if changes.is_empty() {
            return Ok(ResponsePacket::new(id, ResponseCode::EditionError, "No fields to update"));
        }
        if !changes.values().all(is_scalar) {
            return Ok(ResponsePacket::new(id, ResponseCode::EditionError, "Unsupported data type"));
        }

        if !self.storage.update_row(p.table_id, p.record_id, changes)? {
            return Ok(missing());
        }
        info!(table = p.table_id.name(), record_id = p.record_id, "row updated");
        Ok(ResponsePacket::success(id))
    }

    fn add_data(&self, p: AddDataPacket, client: &ClientState) -> Result<ResponsePacket, StorageError> {
        let id = p.request_id;
        if !client.is_admin() {
            return Ok(access_denied(id));
        }
        let values = as_fields(&p.data);
        if values.is_empty() {
            return Ok(ResponsePacket::new(id, ResponseCode::EditionError, "No fields to insert"));
        }
        if !values.values().all(is_scalar) {
            return Ok(ResponsePacket::new(id, ResponseCode::RegErrInvalidData, "Unsupported data type"));
        }
        let record_id = self.storage.insert_row(p.table, values)?;
        info!(table = p.table.name(), record_id, "row inserted");
        Ok(ResponsePacket::success(id))
    }
}

#[async_trait]
impl<S: Storage + 'static> PacketHandler for ServeRequestsUseCase<S> {
    async fn handle(&self, packet: Packet, client: &mut ClientState) -> Option<Packet> {
        let request_id = packet.request_id();
        let result = match packet {
            Packet::Login(p) => self.login(p, client),
            Packet::Register(p) => self.register(p),
            Packet::GetData(p) => self.get_data(p, client),
            Packet::DeleteData(p) => self.delete_data(p, client),
            Packet::EditData(p) => self.edit_data(p, client),
            Packet::AddData(p) => self.add_data(p, client),
            Packet::Logout(_) => {
                info!(login = %client.login, "client logged out");
                client.reset();
                return None;
            }
            Packet::Response(_) | Packet::Unknown(_) => {
                debug!(request_id, "ignoring packet that is not a request");
                return None;
            }
        };

        let response = result.unwrap_or_else(|e| {
            error!(request_id, "storage failure: {e}");
            ResponsePacket::new(request_id, ResponseCode::InternalError, "Internal server error")
        });
        if !response.is_success() {
            warn!(
                request_id,
                code = ?response.error_code,
                "request rejected: {}",
                response.error_message
            );
        }
        Some(response.into())
    }
}

fn access_denied(request_id: u64) -> ResponsePacket {
    ResponsePacket::new(request_id, ResponseCode::AccessDenied, "Access Denied")
}

fn is_own_account(row: &Row, client: &ClientState) -> bool {
    row.get("email").and_then(Value::as_str) == Some(client.login.as_str())
}

/// Embedded data is lenient on the wire: anything but an object counts as no fields.
fn as_fields(value: &Value) -> Row {
    value.as_object().cloned().unwrap_or_default()
}

fn is_scalar(value: &Value) -> bool {
    matches!(value, Value::Null | Value::Number(_) | Value::String(_))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
