//! Transport encoder: turns the user's message into a request body plus
//! whatever local work the action needs around the exchange.

use std::path::PathBuf;

use pfurl_shared::protocol::{Action, CompressSpec, Message, PathTransfer, TransportSpec};
use pfurl_shared::{Error, Result};
use tokio::task;
use tracing::{debug, info};

use crate::archive::{self, ArchiveArtifact};
use crate::copy::{self, CopyOutcome};
use crate::exchange::RequestBody;

/// What to do with the reply once the request is out
#[derive(Debug)]
pub enum TransferPlan {
    /// Interpret the reply per response mode
    Passthrough,
    /// Interpret the reply; the artifact is released afterwards
    PushArchive(ArchiveArtifact),
    /// The reply is an archive to store at `local`
    PullArchive { local: PathBuf, compress: CompressSpec },
}

#[derive(Debug)]
pub struct Encoded {
    pub body: RequestBody,
    pub plan: TransferPlan,
}

pub struct Encoder {
    wrapper: Option<String>,
}

impl Encoder {
    pub fn new(wrapper: Option<String>) -> Self {
        Self { wrapper }
    }

    pub async fn encode(&self, message: &Message) -> Result<Encoded> {
        let wrapper = self.wrapper.as_deref();
        let body = message.to_body(wrapper)?;

        let action = match message.action() {
            Some(request) => request.classify()?,
            None => Action::Other,
        };

        match action {
            Action::Other => {
                let body = if body.is_empty() {
                    RequestBody::Empty
                } else {
                    RequestBody::Message(body)
                };
                Ok(Encoded { body, plan: TransferPlan::Passthrough })
            }
            Action::PushPath(transfer) => self.encode_push(transfer, body).await,
            Action::PullPath(transfer) => {
                let plan = match transfer.transport {
                    TransportSpec::Compress(compress) => {
                        debug!("pullPath will store archive at {}", transfer.local.display());
                        TransferPlan::PullArchive { local: transfer.local, compress }
                    }
                    // The remote side copies or links on its own filesystem
                    TransportSpec::Copy(_) => TransferPlan::Passthrough,
                };
                Ok(Encoded { body: RequestBody::Message(body), plan })
            }
        }
    }

    async fn encode_push(&self, transfer: PathTransfer, message: Vec<u8>) -> Result<Encoded> {
        if !transfer.local.exists() {
            return Err(Error::InvalidLocalPath(format!(
                "{}: no such file or directory",
                transfer.local.display()
            )));
        }

        match transfer.transport {
            TransportSpec::Compress(compress) => {
                let source = transfer.local.clone();
                let artifact = task::spawn_blocking(move || {
                    archive::pack(&source, &std::env::temp_dir(), compress.cleanup)
                })
                .await
                .map_err(|e| Error::ArchiveFailed(format!("archive task failed: {}", e)))??;

                let body = RequestBody::Archive {
                    message,
                    path: artifact.path().to_path_buf(),
                    file_name: artifact.file_name(),
                };
                Ok(Encoded { body, plan: TransferPlan::PushArchive(artifact) })
            }
            TransportSpec::Copy(options) => {
                let PathTransfer { local, remote, .. } = transfer;
                let outcome = task::spawn_blocking(move || copy::push_copy(&local, &remote, options.symlink))
                    .await
                    .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))??;
                match outcome {
                    CopyOutcome::Linked => info!("pushPath: remote path linked to local source"),
                    CopyOutcome::Copied { files } => info!("pushPath: {} file(s) copied", files),
                }
                Ok(Encoded {
                    body: RequestBody::Message(message),
                    plan: TransferPlan::Passthrough,
                })
            }
        }
    }
}
