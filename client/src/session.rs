//! Session orchestrator
//!
//! Runs one invocation end to end:
//! `Idle → Encoded → Sent → Interpreted → (ShutdownSent) → Done`.
//! Any failure up to `Interpreted` ends the session with that error. A
//! failed shutdown signal is kept as a warning next to the primary result.

use pfurl_shared::response::{interpret, Interpreted};
use pfurl_shared::{Error, Result};
use tokio::task;
use tracing::{debug, warn};

use crate::archive;
use crate::config::Settings;
use crate::encoder::{Encoded, Encoder, TransferPlan};
use crate::exchange::HttpExchange;
use crate::shutdown::send_shutdown;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Encoded,
    Sent,
    Interpreted,
    ShutdownSent,
    Done,
}

/// Result of a completed session
#[derive(Debug)]
pub struct Outcome {
    pub result: Interpreted,
    /// Set when the one-shot shutdown signal could not be delivered
    pub shutdown_warning: Option<Error>,
}

pub struct Session {
    settings: Settings,
    state: SessionState,
}

impl Session {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            state: SessionState::Idle,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn advance(&mut self, next: SessionState) {
        debug!("Session {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    pub async fn run(&mut self) -> Result<Outcome> {
        let outcome = self.run_inner().await;
        self.advance(SessionState::Done);
        outcome
    }

    async fn run_inner(&mut self) -> Result<Outcome> {
        let exchange = HttpExchange::new(self.settings.exchange.clone())?;
        let encoder = Encoder::new(self.settings.json_wrapper.clone());

        let Encoded { body, plan } = encoder.encode(&self.settings.message).await?;
        self.advance(SessionState::Encoded);

        // `plan` owns any archive artifact until the end of this scope
        let reply = exchange.send(body).await?;
        self.advance(SessionState::Sent);

        let result = match plan {
            TransferPlan::Passthrough => interpret(self.settings.mode, &reply)?,
            TransferPlan::PushArchive(artifact) => {
                let result = interpret(self.settings.mode, &reply)?;
                artifact.finish()?;
                result
            }
            TransferPlan::PullArchive { local, compress } => {
                let summary =
                    task::spawn_blocking(move || archive::receive(&reply, &local, compress))
                        .await
                        .map_err(|e| Error::ArchiveFailed(format!("archive task failed: {}", e)))??;
                Interpreted::Json(summary)
            }
        };
        self.advance(SessionState::Interpreted);

        let mut shutdown_warning = None;
        if self.settings.one_shot {
            match send_shutdown(&exchange, self.settings.json_wrapper.as_deref()).await {
                Ok(()) => self.advance(SessionState::ShutdownSent),
                Err(e) => {
                    warn!("{}", e);
                    shutdown_warning = Some(e);
                }
            }
        }

        Ok(Outcome {
            result,
            shutdown_warning,
        })
    }
}
