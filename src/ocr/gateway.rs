//! Shared, reference-counted access to the recognition worker.
//!
//! Every overlay role acquires the gateway while it samples and releases it
//! when it stops. The first acquire starts the worker and the last release
//! stops it. Recognize calls are serialized through one lock, so concurrent
//! callers queue instead of starting a second process.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use super::protocol::{OcrRequest, Recognition, RecognitionHint};
use super::worker::{WorkerConnection, WorkerSpawner};
use crate::error::RecognitionError;

struct GatewayState {
    refs: usize,
    conn: Option<Box<dyn WorkerConnection>>,
}

/// Owner of the single recognition worker process.
pub struct OcrGateway {
    spawner: Arc<dyn WorkerSpawner>,
    timeout: Duration,
    next_id: AtomicU64,
    state: Mutex<GatewayState>,
}

impl OcrGateway {
    pub fn new(spawner: Arc<dyn WorkerSpawner>, timeout: Duration) -> Self {
        Self {
            spawner,
            timeout,
            next_id: AtomicU64::new(1),
            state: Mutex::new(GatewayState {
                refs: 0,
                conn: None,
            }),
        }
    }

    /// Takes a reference, starting the worker if nobody held one.
    ///
    /// A failed start is logged; the next `recognize` tries again.
    pub async fn acquire(&self) {
        let mut state = self.state.lock().await;
        state.refs += 1;
        if state.conn.is_none() {
            match self.spawner.spawn().await {
                Ok(conn) => state.conn = Some(conn),
                Err(e) => log::warn!("[ocr] worker start failed: {}", e),
            }
        }
        log::debug!("[ocr] acquired (refs={})", state.refs);
    }

    /// Drops a reference, stopping the worker when the last one goes.
    pub async fn release(&self) {
        let mut state = self.state.lock().await;
        state.refs = state.refs.saturating_sub(1);
        log::debug!("[ocr] released (refs={})", state.refs);
        if state.refs == 0 {
            if let Some(mut conn) = state.conn.take() {
                conn.shutdown().await;
                log::info!("[ocr] worker stopped");
            }
        }
    }

    pub async fn ref_count(&self) -> usize {
        self.state.lock().await.refs
    }

    pub async fn is_running(&self) -> bool {
        self.state.lock().await.conn.is_some()
    }

    /// Recognizes one PNG crop.
    ///
    /// A transport failure (timeout, exit, broken pipe, garbage output)
    /// respawns the worker and retries once. An error reported by the worker
    /// itself is returned as is.
    pub async fn recognize(
        &self,
        png: &[u8],
        hint: RecognitionHint,
    ) -> Result<Recognition, RecognitionError> {
        let mut state = self.state.lock().await;
        if state.refs == 0 {
            return Err(RecognitionError::NotAcquired);
        }

        match self.attempt(&mut state, png, hint).await {
            Err(e) if e.is_transport_failure() => {
                log::warn!("[ocr] worker failed ({}), respawning", e);
                if let Some(mut conn) = state.conn.take() {
                    conn.shutdown().await;
                }
                self.attempt(&mut state, png, hint).await
            }
            result => result,
        }
    }

    async fn attempt(
        &self,
        state: &mut GatewayState,
        png: &[u8],
        hint: RecognitionHint,
    ) -> Result<Recognition, RecognitionError> {
        let mut conn = match state.conn.take() {
            Some(conn) => conn,
            None => self.spawner.spawn().await?,
        };
        let request = OcrRequest::new(self.next_id.fetch_add(1, Ordering::Relaxed), png, hint);
        let result = conn.request(&request, self.timeout).await;
        state.conn = Some(conn);
        result?.into_recognition()
    }
}
