//! Per-session result channels between a calibrator surface and its session.
//!
//! Each session gets a fresh random id. The surface sends any number of
//! incremental `rois` messages and then one terminal `ok` or `cancel`;
//! once the terminal message is taken, or the session is gone, the id is
//! unknown and further messages are rejected.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::error::CalibrationError;
use crate::regions::RegionSet;

/// A message from the calibrator surface.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireMessage", into = "WireMessage")]
pub enum CalibrationMessage {
    /// A drag finished; persist this set.
    Rois(RegionSet),
    /// The user is done.
    Ok,
    Cancel,
}

impl CalibrationMessage {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CalibrationMessage::Rois(_))
    }
}

/// `{rois: {...}}`, `{ok: true}` or `{cancel: true}`.
#[derive(Default, Serialize, Deserialize)]
struct WireMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    rois: Option<RegionSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ok: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cancel: Option<bool>,
}

impl TryFrom<WireMessage> for CalibrationMessage {
    type Error = String;

    fn try_from(wire: WireMessage) -> Result<Self, Self::Error> {
        match wire {
            WireMessage { rois: Some(rois), ok: None, cancel: None } => Ok(Self::Rois(rois)),
            WireMessage { rois: None, ok: Some(true), cancel: None } => Ok(Self::Ok),
            WireMessage { rois: None, ok: None, cancel: Some(true) } => Ok(Self::Cancel),
            _ => Err("expected exactly one of rois, ok: true or cancel: true".to_string()),
        }
    }
}

impl From<CalibrationMessage> for WireMessage {
    fn from(message: CalibrationMessage) -> Self {
        match message {
            CalibrationMessage::Rois(rois) => WireMessage {
                rois: Some(rois),
                ..WireMessage::default()
            },
            CalibrationMessage::Ok => WireMessage {
                ok: Some(true),
                ..WireMessage::default()
            },
            CalibrationMessage::Cancel => WireMessage {
                cancel: Some(true),
                ..WireMessage::default()
            },
        }
    }
}

/// A message plus the slot its sender waits on.
pub struct Envelope {
    pub message: CalibrationMessage,
    reply: oneshot::Sender<Result<(), CalibrationError>>,
}

impl Envelope {
    /// Answers the sender. A sender that stopped waiting is ignored.
    pub fn respond(self, result: Result<(), CalibrationError>) {
        let _ = self.reply.send(result);
    }
}

type Senders = HashMap<String, mpsc::Sender<Envelope>>;

/// Routes surface messages to open sessions.
#[derive(Default)]
pub struct CalibrationHub {
    sessions: Arc<Mutex<Senders>>,
}

impl CalibrationHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Senders> {
        lock_senders(&self.sessions)
    }

    /// Registers a new session and returns its receiving end.
    pub fn open(&self) -> SessionChannel {
        let id = Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::channel(8);
        self.lock().insert(id.clone(), tx);
        SessionChannel {
            id,
            rx,
            sessions: Arc::clone(&self.sessions),
        }
    }

    pub fn is_open(&self, session_id: &str) -> bool {
        self.lock().contains_key(session_id)
    }

    /// Delivers `message` and waits for the session's answer.
    ///
    /// A terminal message retires the id before it is delivered, so a
    /// duplicate `ok`/`cancel` is rejected even if the first has not been
    /// handled yet.
    pub async fn send(
        &self,
        session_id: &str,
        message: CalibrationMessage,
    ) -> Result<(), CalibrationError> {
        let unknown = || CalibrationError::UnknownSession(session_id.to_string());
        let tx = {
            let mut sessions = self.lock();
            if message.is_terminal() {
                sessions.remove(session_id)
            } else {
                sessions.get(session_id).cloned()
            }
        }
        .ok_or_else(unknown)?;

        let (reply, answer) = oneshot::channel();
        tx.send(Envelope { message, reply })
            .await
            .map_err(|_| unknown())?;
        answer.await.map_err(|_| unknown())?
    }
}

fn lock_senders(sessions: &Mutex<Senders>) -> MutexGuard<'_, Senders> {
    sessions.lock().unwrap_or_else(|e| e.into_inner())
}

/// The session's end of its channel. Dropping it retires the id.
pub struct SessionChannel {
    id: String,
    rx: mpsc::Receiver<Envelope>,
    sessions: Arc<Mutex<Senders>>,
}

impl SessionChannel {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Next message, or `None` once the id is retired and drained.
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.rx.recv().await
    }

    /// Retires the id and rejects anything still queued.
    pub fn close(&mut self) {
        lock_senders(&self.sessions).remove(&self.id);
        self.rx.close();
        while let Ok(envelope) = self.rx.try_recv() {
            envelope.respond(Err(CalibrationError::UnknownSession(self.id.clone())));
        }
    }
}

impl Drop for SessionChannel {
    fn drop(&mut self) {
        self.close();
    }
}
