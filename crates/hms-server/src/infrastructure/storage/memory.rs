//! In-memory implementation of the [`Storage`] port.
//!
//! Three tables (`Users`, `Rooms`, `Bookings`) are kept as ordered maps from
//! id to row behind one mutex.  Ids are assigned from a per-table counter and
//! never reused.  Every row carries the full column set of its table; columns
//! not supplied on insert are stored as `null`.
//!
//! Passwords are compared as plain text.  Hashing belongs to whatever real
//! backend replaces this adapter.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use hms_core::TableId;
use serde_json::{json, Value};
use tracing::debug;

use crate::application::storage::{NewUser, Row, Storage, StorageError, UserRecord};
use crate::infrastructure::storage::config::AdminAccount;

/// Role stored for accounts created through registration.
const DEFAULT_ROLE: &str = "user";

fn columns(table: TableId) -> &'static [&'static str] {
    match table {
        TableId::Users => &[
            "email",
            "password_hash",
            "first_name",
            "last_name",
            "phone_number",
            "role",
        ],
        TableId::Rooms => &[
            "room_number",
            "room_type",
            "price_per_night",
            "capacity",
            "availability",
        ],
        TableId::Bookings => &[
            "user_id",
            "room_id",
            "check_in_date",
            "check_out_date",
            "status",
        ],
    }
}

#[derive(Default)]
struct Table {
    next_id: i64,
    rows: BTreeMap<i64, Row>,
}

impl Table {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Mutex-guarded tables with auto-increment ids.
pub struct InMemoryStore {
    tables: Mutex<BTreeMap<TableId, Table>>,
}

impl InMemoryStore {
    /// Creates a store with all tables empty.
    pub fn new() -> Self {
        let tables = TableId::ALL.into_iter().map(|t| (t, Table::default())).collect();
        Self {
            tables: Mutex::new(tables),
        }
    }

    /// Creates a store holding one administrator account.
    ///
    /// # Errors
    ///
    /// Propagates any error from inserting the account.
    pub fn with_admin(admin: &AdminAccount) -> Result<Self, StorageError> {
        let store = Self::new();
        let values = json!({
            "email": admin.email,
            "password_hash": admin.password,
            "first_name": admin.first_name,
            "last_name": admin.last_name,
            "phone_number": admin.phone_number,
            "role": "admin",
        });
        if let Value::Object(values) = values {
            store.insert_row(TableId::Users, values)?;
        }
        Ok(store)
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<TableId, Table>> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_columns(table: TableId, values: &Row) -> Result<(), StorageError> {
        let known = columns(table);
        match values.keys().find(|k| !known.contains(&k.as_str())) {
            Some(column) => Err(StorageError::UnknownColumn {
                table: table.name(),
                column: column.clone(),
            }),
            None => Ok(()),
        }
    }

    fn email_taken(table: &Table, email: &str, except: Option<i64>) -> bool {
        table.rows.iter().any(|(id, row)| {
            Some(*id) != except && row.get("email").and_then(Value::as_str) == Some(email)
        })
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn text(row: &Row, column: &str) -> String {
    match row.get(column) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn user_from_row(id: i64, row: &Row) -> UserRecord {
    UserRecord {
        id,
        email: text(row, "email"),
        password_hash: text(row, "password_hash"),
        first_name: text(row, "first_name"),
        last_name: text(row, "last_name"),
        phone_number: text(row, "phone_number"),
        role: text(row, "role"),
    }
}

impl Storage for InMemoryStore {
    fn find_user(&self, email: &str) -> Result<Option<UserRecord>, StorageError> {
        let tables = self.lock();
        let users = tables
            .get(&TableId::Users)
            .ok_or_else(|| StorageError::Backend("Users table missing".into()))?;
        Ok(users
            .rows
            .iter()
            .find(|(_, row)| row.get("email").and_then(Value::as_str) == Some(email))
            .map(|(id, row)| user_from_row(*id, row)))
    }

    fn verify_password(&self, user: &UserRecord, password: &str) -> bool {
        !password.is_empty() && user.password_hash == password
    }

    fn insert_user(&self, user: NewUser) -> Result<i64, StorageError> {
        let values = json!({
            "email": user.email,
            "password_hash": user.password,
            "first_name": user.first_name,
            "last_name": user.last_name,
            "phone_number": user.phone_number,
            "role": DEFAULT_ROLE,
        });
        match values {
            Value::Object(values) => self.insert_row(TableId::Users, values),
            _ => Err(StorageError::Backend("user record is not an object".into())),
        }
    }

    fn fetch_rows(&self, table: TableId) -> Result<Vec<Row>, StorageError> {
        let tables = self.lock();
        Ok(tables
            .get(&table)
            .map(|t| t.rows.values().cloned().collect())
            .unwrap_or_default())
    }

    fn find_row(&self, table: TableId, id: i64) -> Result<Option<Row>, StorageError> {
        let tables = self.lock();
        Ok(tables.get(&table).and_then(|t| t.rows.get(&id).cloned()))
    }

    fn insert_row(&self, table: TableId, values: Row) -> Result<i64, StorageError> {
        Self::check_columns(table, &values)?;
        let mut tables = self.lock();
        let target = tables.entry(table).or_default();

        if table == TableId::Users {
            let email = values.get("email").and_then(Value::as_str).unwrap_or_default();
            if Self::email_taken(target, email, None) {
                return Err(StorageError::Conflict {
                    column: "email".into(),
                });
            }
        }

        let id = target.allocate_id();
        let mut row = Row::new();
        row.insert("id".into(), json!(id));
        for column in columns(table) {
            let value = values.get(*column).cloned().unwrap_or(Value::Null);
            row.insert((*column).to_string(), value);
        }
        if table == TableId::Users && row.get("role") == Some(&Value::Null) {
            row.insert("role".into(), json!(DEFAULT_ROLE));
        }
        target.rows.insert(id, row);
        debug!(table = table.name(), id, "row inserted");
        Ok(id)
    }

    fn update_row(&self, table: TableId, id: i64, values: Row) -> Result<bool, StorageError> {
        Self::check_columns(table, &values)?;
        let mut tables = self.lock();
        let target = tables.entry(table).or_default();

        if table == TableId::Users {
            if let Some(email) = values.get("email").and_then(Value::as_str) {
                if Self::email_taken(target, email, Some(id)) {
                    return Err(StorageError::Conflict {
                        column: "email".into(),
                    });
                }
            }
        }

        let Some(row) = target.rows.get_mut(&id) else {
            return Ok(false);
        };
        for (column, value) in values {
            row.insert(column, value);
        }
        Ok(true)
    }

    fn delete_row(&self, table: TableId, id: i64) -> Result<bool, StorageError> {
        let mut tables = self.lock();
        Ok(tables
            .get_mut(&table)
            .map(|t| t.rows.remove(&id).is_some())
            .unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admin() -> AdminAccount {
        AdminAccount {
            email: "admin@hotel.local".into(),
            password: "changeme".into(),
            first_name: "Hotel".into(),
            last_name: "Admin".into(),
            phone_number: String::new(),
        }
    }

    fn fields(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_with_admin_seeds_one_admin_user() {
        // Arrange
        let store = InMemoryStore::with_admin(&admin()).unwrap();

        // Act
        let user = store.find_user("admin@hotel.local").unwrap().expect("seeded");

        // Assert
        assert_eq!(user.id, 1);
        assert_eq!(user.role, "admin");
        assert!(store.verify_password(&user, "changeme"));
        assert!(!store.verify_password(&user, "wrong"));
    }

    #[test]
    fn test_insert_user_gets_default_role_and_next_id() {
        let store = InMemoryStore::with_admin(&admin()).unwrap();

        let id = store
            .insert_user(NewUser {
                email: "guest@hotel.local".into(),
                password: "password1".into(),
                first_name: "G".into(),
                last_name: "Uest".into(),
                phone_number: "+15550000000".into(),
            })
            .unwrap();

        assert_eq!(id, 2);
        assert_eq!(store.find_user("guest@hotel.local").unwrap().unwrap().role, "user");
    }

    #[test]
    fn test_duplicate_email_is_a_conflict() {
        let store = InMemoryStore::with_admin(&admin()).unwrap();

        let result = store.insert_row(TableId::Users, fields(json!({"email": "admin@hotel.local"})));

        assert!(matches!(result, Err(StorageError::Conflict { .. })));
    }

    #[test]
    fn test_rows_carry_every_column() {
        let store = InMemoryStore::new();

        let id = store
            .insert_row(TableId::Rooms, fields(json!({"room_number": "101"})))
            .unwrap();
        let row = store.find_row(TableId::Rooms, id).unwrap().unwrap();

        assert_eq!(row["id"], json!(1));
        assert_eq!(row["room_number"], json!("101"));
        assert_eq!(row["capacity"], Value::Null);
    }

    #[test]
    fn test_unknown_column_is_rejected() {
        let store = InMemoryStore::new();

        let result = store.insert_row(TableId::Rooms, fields(json!({"colour": "blue"})));

        assert!(matches!(result, Err(StorageError::UnknownColumn { .. })));
    }

    #[test]
    fn test_update_and_delete_report_missing_rows() {
        let store = InMemoryStore::new();
        let id = store
            .insert_row(TableId::Bookings, fields(json!({"user_id": 1, "room_id": 1})))
            .unwrap();

        assert!(store
            .update_row(TableId::Bookings, id, fields(json!({"status": "confirmed"})))
            .unwrap());
        assert!(!store
            .update_row(TableId::Bookings, 99, fields(json!({"status": "x"})))
            .unwrap());
        assert!(store.delete_row(TableId::Bookings, id).unwrap());
        assert!(!store.delete_row(TableId::Bookings, id).unwrap());
        assert!(store.fetch_rows(TableId::Bookings).unwrap().is_empty());
    }

    #[test]
    fn test_ids_are_not_reused_after_delete() {
        let store = InMemoryStore::new();
        let first = store.insert_row(TableId::Rooms, fields(json!({"room_number": "1"}))).unwrap();
        store.delete_row(TableId::Rooms, first).unwrap();

        let second = store.insert_row(TableId::Rooms, fields(json!({"room_number": "2"}))).unwrap();

        assert_eq!(second, first + 1);
    }
}
