//! In-memory session store.
//!
//! Each session id maps to a transcript that starts with a fixed two-turn
//! preamble telling the model to act like a terminal. Transcripts only grow;
//! sessions disappear when the eviction policy drops them or the process exits.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

pub const PREAMBLE_INSTRUCTION: &str = "You are a command-line interface (CLI) assistant. \
Respond concisely, as if you are a terminal. Do not include conversational filler. \
Only provide the output of the command or a brief, direct response. \
If a command is not recognized, state 'Command not found: [command]'.";

pub const PREAMBLE_ACK: &str = "CLI Ready.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One role-tagged utterance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

pub type Transcript = Vec<Turn>;

/// The two turns every transcript starts with.
pub fn preamble() -> Transcript {
    vec![Turn::user(PREAMBLE_INSTRUCTION), Turn::assistant(PREAMBLE_ACK)]
}

/// Bounds on how many sessions are kept and for how long.
#[derive(Debug, Clone, Default)]
pub struct EvictionPolicy {
    /// Evict the least recently active session beyond this many.
    pub max_sessions: Option<usize>,
    /// Evict sessions idle for longer than this.
    pub idle_ttl: Option<Duration>,
}

struct SessionSlot {
    transcript: Transcript,
    last_active: Instant,
    generation: u64,
}

impl SessionSlot {
    fn new(generation: u64) -> Self {
        Self {
            transcript: preamble(),
            last_active: Instant::now(),
            generation,
        }
    }
}

/// Handle on a session incarnation, returned when a user turn is recorded.
///
/// A reply is only attached to the same incarnation; once the session has
/// been evicted (and possibly re-created) the ticket no longer matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExchangeTicket {
    generation: u64,
}

pub struct SessionStore {
    policy: EvictionPolicy,
    sessions: Mutex<HashMap<String, SessionSlot>>,
    next_generation: AtomicU64,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(EvictionPolicy::default())
    }
}

impl SessionStore {
    pub fn new(policy: EvictionPolicy) -> Self {
        Self {
            policy,
            sessions: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(0),
        }
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<String, SessionSlot>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the transcript for `session_id`, creating it with the preamble
    /// if it does not exist yet.
    pub fn get_or_create(&self, session_id: &str) -> Transcript {
        let mut sessions = self.slots();
        let slot = self.touch(&mut sessions, session_id);
        slot.transcript.clone()
    }

    /// Append a turn to a session, creating it first if needed, and return the
    /// updated transcript.
    pub fn append(&self, session_id: &str, turn: Turn) -> Transcript {
        self.begin_exchange(session_id, turn).0
    }

    /// Record a user turn and return the transcript to send to the model.
    pub fn begin_exchange(&self, session_id: &str, turn: Turn) -> (Transcript, ExchangeTicket) {
        let mut sessions = self.slots();
        let slot = self.touch(&mut sessions, session_id);
        slot.transcript.push(turn);
        let ticket = ExchangeTicket {
            generation: slot.generation,
        };
        (slot.transcript.clone(), ticket)
    }

    /// Attach the reply to the session the ticket came from. Returns false,
    /// leaving the store untouched, if that session is gone.
    pub fn complete_exchange(&self, session_id: &str, ticket: ExchangeTicket, turn: Turn) -> bool {
        let mut sessions = self.slots();
        self.evict_idle(&mut sessions);
        match sessions.get_mut(session_id) {
            Some(slot) if slot.generation == ticket.generation => {
                slot.transcript.push(turn);
                slot.last_active = Instant::now();
                true
            }
            _ => false,
        }
    }

    /// Snapshot of an existing session's transcript.
    pub fn transcript(&self, session_id: &str) -> Option<Transcript> {
        let mut sessions = self.slots();
        self.evict_idle(&mut sessions);
        sessions.get(session_id).map(|s| s.transcript.clone())
    }

    pub fn remove(&self, session_id: &str) -> bool {
        self.slots().remove(session_id).is_some()
    }

    pub fn len(&self) -> usize {
        let mut sessions = self.slots();
        self.evict_idle(&mut sessions);
        sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn touch<'a>(
        &self,
        sessions: &'a mut HashMap<String, SessionSlot>,
        session_id: &str,
    ) -> &'a mut SessionSlot {
        self.evict_idle(sessions);

        if !sessions.contains_key(session_id) {
            if let Some(max) = self.policy.max_sessions {
                while !sessions.is_empty() && sessions.len() >= max {
                    let oldest = sessions
                        .iter()
                        .min_by_key(|(_, slot)| slot.last_active)
                        .map(|(id, _)| id.clone());
                    match oldest {
                        Some(id) => {
                            debug!(session_id = %id, "evicting least recently used session");
                            sessions.remove(&id);
                        }
                        None => break,
                    }
                }
            }
            debug!(session_id = %session_id, "creating session");
        }

        let slot = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionSlot::new(self.next_generation.fetch_add(1, Ordering::Relaxed)));
        slot.last_active = Instant::now();
        slot
    }

    fn evict_idle(&self, sessions: &mut HashMap<String, SessionSlot>) {
        let Some(ttl) = self.policy.idle_ttl else {
            return;
        };
        sessions.retain(|id, slot| {
            let keep = slot.last_active.elapsed() <= ttl;
            if !keep {
                debug!(session_id = %id, "evicting idle session");
            }
            keep
        });
    }
}
