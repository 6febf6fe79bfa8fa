//! Shared-secret admission gate.
//!
//! The server carries one password for its whole lifetime. The first
//! connection to arrive while none is set has its first line adopted as that
//! password; every later connection must match it or is rejected before it
//! ever joins the broadcast roster. This is a shared secret over plaintext,
//! not per-user identity.

/// Per-connection lifecycle, tracked by the connection handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    AwaitingPassword,
    Authenticated,
    Rejected,
}

/// Outcome of presenting a password line to the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// No password existed; this line is now the server-wide secret.
    Adopted,
    Accepted,
    Rejected,
}

/// Prompt for the connection that will set the password.
pub const PROMPT_SET: &str = "What would you like the password to be?";
/// Prompt for every later connection.
pub const PROMPT_ENTER: &str = "Please enter the password to connect to this server.";
/// Notice sent before closing a rejected connection.
pub const REJECT_NOTICE: &str = "Password invalid.";

/// The server-wide password slot. Lives behind the server's shared lock, so
/// concurrent first connections race cleanly: exactly one adopts.
#[derive(Debug, Default)]
pub struct SessionGate {
    password: Option<String>,
}

impl SessionGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_password(&self) -> bool {
        self.password.is_some()
    }

    /// Check a candidate password line, adopting it if none is set yet.
    pub fn admit(&mut self, line: &str) -> Admission {
        match &self.password {
            None => {
                self.password = Some(line.to_string());
                log::info!("password adopted from first client");
                Admission::Adopted
            }
            Some(password) if password == line => Admission::Accepted,
            Some(_) => Admission::Rejected,
        }
    }
}
