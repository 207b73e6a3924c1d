//! Server-owned chat state shared by every session.
//!
//! The roster and the history buffer sit behind one lock. Claiming a login
//! and snapshotting history happen in the same critical section, as do
//! appending a record and fanning it out, so a joining session sees each
//! record exactly once: either in its replay or as a live delivery.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::Result;
use crate::history::HistoryBuffer;
use crate::protocol::{ChatRecord, HISTORY_HEADER, greeting};
use crate::roster::{Roster, SessionId};

pub type SharedState = Arc<Mutex<ChatState>>;

#[derive(Debug, Default)]
pub struct ChatState {
    pub roster: Roster,
    pub history: HistoryBuffer,
}

impl ChatState {
    pub fn new(history_capacity: usize) -> Self {
        Self {
            roster: Roster::new(),
            history: HistoryBuffer::new(history_capacity),
        }
    }

    pub fn shared(history_capacity: usize) -> SharedState {
        Arc::new(Mutex::new(Self::new(history_capacity)))
    }

    /// Claim `candidate` for session `id`, then queue the greeting and the
    /// history replay to that session only.
    ///
    /// Returns the number of replayed records.
    pub fn authenticate(&mut self, id: SessionId, candidate: &str) -> Result<usize> {
        self.roster.claim_login(id, candidate)?;

        let Some(member) = self.roster.get(id) else {
            return Ok(0);
        };
        member.send_line(greeting(candidate));

        if self.history.is_empty() {
            return Ok(0);
        }
        member.send_line(HISTORY_HEADER);
        let records = self.history.snapshot();
        let replayed = records.len();
        for record in records {
            member.send_line(record);
        }
        Ok(replayed)
    }

    /// Record `body` from session `sender` in history, then deliver it to
    /// every other authenticated member.
    ///
    /// Returns the number of deliveries queued, or `None` if the sender is
    /// not an authenticated member.
    pub fn broadcast(&mut self, sender: SessionId, body: &str) -> Option<usize> {
        let login = self.roster.get(sender)?.login.clone()?;
        let record = ChatRecord::now(login, body).to_string();

        self.history.push(record.clone());

        let mut delivered = 0;
        for member in self.roster.recipients_except(sender) {
            // A closed queue means that session is mid-teardown; its own
            // cleanup will drop it from the roster.
            if member.send_line(record.clone()) {
                delivered += 1;
            }
        }
        Some(delivered)
    }
}
