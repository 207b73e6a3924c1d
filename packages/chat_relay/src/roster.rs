//! Registry of connected sessions.
//!
//! Membership starts at connect time with no login; a login is attached
//! once the session authenticates. Uniqueness is enforced only among
//! attached logins.

use tokio::sync::mpsc;

use crate::error::{RelayError, Result};
use crate::protocol::Outbound;

/// Per-connection identifier, assigned by the accept loop.
pub type SessionId = u64;

/// Handle to a connected session's outbound queue.
#[derive(Debug)]
pub struct Member {
    pub id: SessionId,
    pub login: Option<String>,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl Member {
    /// Queue a line for this member. Returns false if its writer is gone.
    pub fn send_line(&self, line: impl Into<String>) -> bool {
        self.outbound.send(Outbound::Line(line.into())).is_ok()
    }

    /// Ask this member's writer to flush and close the connection.
    pub fn close(&self) -> bool {
        self.outbound.send(Outbound::Close).is_ok()
    }

    pub fn is_authenticated(&self) -> bool {
        self.login.is_some()
    }
}

/// Connected sessions in connect order.
#[derive(Debug, Default)]
pub struct Roster {
    members: Vec<Member>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly connected, unauthenticated session.
    pub fn register(&mut self, id: SessionId, outbound: mpsc::UnboundedSender<Outbound>) {
        self.members.push(Member {
            id,
            login: None,
            outbound,
        });
    }

    /// Attach `candidate` as the login of session `id`.
    ///
    /// Check and insert happen under the same `&mut self` borrow, so two
    /// sessions racing for one name cannot both succeed.
    pub fn claim_login(&mut self, id: SessionId, candidate: &str) -> Result<()> {
        if self
            .members
            .iter()
            .any(|m| m.id != id && m.login.as_deref() == Some(candidate))
        {
            return Err(RelayError::LoginConflict {
                login: candidate.to_string(),
            });
        }

        let member = self
            .members
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or(RelayError::TransportDisconnected)?;
        member.login = Some(candidate.to_string());
        Ok(())
    }

    /// Remove a session. A second call for the same id is a no-op returning `None`.
    pub fn remove(&mut self, id: SessionId) -> Option<Member> {
        let idx = self.members.iter().position(|m| m.id == id)?;
        Some(self.members.remove(idx))
    }

    pub fn get(&self, id: SessionId) -> Option<&Member> {
        self.members.iter().find(|m| m.id == id)
    }

    /// Authenticated members other than `sender`, in connect order.
    pub fn recipients_except(&self, sender: SessionId) -> impl Iterator<Item = &Member> + '_ {
        self.members
            .iter()
            .filter(move |m| m.id != sender && m.is_authenticated())
    }

    /// Logins currently attached, in connect order.
    pub fn logins(&self) -> Vec<String> {
        self.members.iter().filter_map(|m| m.login.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
