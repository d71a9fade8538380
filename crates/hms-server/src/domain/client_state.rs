//! Per-connection login state.

use std::fmt;

/// Login name shown for a client that has not logged in.
pub const ANONYMOUS_LOGIN: &str = "Anonymous";

/// Role granted to a logged-in account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UserRole {
    #[default]
    Guest,
    Admin,
}

impl UserRole {
    /// Parses the role column of a user record.  Anything but `"admin"` is a guest.
    pub fn from_column(value: &str) -> Self {
        if value.eq_ignore_ascii_case("admin") {
            UserRole::Admin
        } else {
            UserRole::Guest
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            UserRole::Guest => "guest",
            UserRole::Admin => "admin",
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Application state attached to one client session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientState {
    pub is_logged_in: bool,
    pub login: String,
    pub user_id: Option<i64>,
    pub role: UserRole,
}

impl ClientState {
    /// Marks the client as logged in.
    pub fn log_in(&mut self, login: impl Into<String>, user_id: i64, role: UserRole) {
        self.is_logged_in = true;
        self.login = login.into();
        self.user_id = Some(user_id);
        self.role = role;
    }

    /// Returns to the anonymous guest state.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_admin(&self) -> bool {
        self.is_logged_in && self.role == UserRole::Admin
    }
}

impl Default for ClientState {
    fn default() -> Self {
        Self {
            is_logged_in: false,
            login: ANONYMOUS_LOGIN.to_string(),
            user_id: None,
            role: UserRole::Guest,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_is_anonymous_guest() {
        let state = ClientState::default();

        assert!(!state.is_logged_in);
        assert_eq!(state.login, "Anonymous");
        assert_eq!(state.role, UserRole::Guest);
        assert!(!state.is_admin());
    }

    #[test]
    fn test_log_in_then_reset() {
        // Arrange
        let mut state = ClientState::default();

        // Act
        state.log_in("admin@hotel.local", 1, UserRole::Admin);
        let admin = state.is_admin();
        state.reset();

        // Assert
        assert!(admin);
        assert_eq!(state, ClientState::default());
    }

    #[test]
    fn test_role_from_column_is_case_insensitive() {
        assert_eq!(UserRole::from_column("ADMIN"), UserRole::Admin);
        assert_eq!(UserRole::from_column("guest"), UserRole::Guest);
        assert_eq!(UserRole::from_column(""), UserRole::Guest);
    }
}
