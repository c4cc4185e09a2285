//! Serialized uploads for editor saves
//!
//! Saves are pushed onto a FIFO and processed one at a time by a worker
//! task. When a document is saved again before its earlier save was
//! processed, only the newest save is uploaded.
//!
//! Upload failures never escape the worker. The document is marked unsaved,
//! the user is told, and the failure is reported by the next `all()`.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::BoxFuture;
use futures::FutureExt;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::host::{EditorHost, SavedDocument};
use crate::provider::{FileSystemProvider, WriteOptions};

/// Upload step of a save request
pub type UploadFn = Box<
    dyn FnOnce(SavedDocument, Arc<dyn FileSystemProvider>) -> BoxFuture<'static, anyhow::Result<()>>
        + Send,
>;

/// One pending save
pub struct SaveRequest {
    pub document: SavedDocument,
    pub provider: Arc<dyn FileSystemProvider>,
    pub upload: UploadFn,
}

impl SaveRequest {
    pub fn new<F, Fut>(document: SavedDocument, provider: Arc<dyn FileSystemProvider>, upload: F) -> Self
    where
        F: FnOnce(SavedDocument, Arc<dyn FileSystemProvider>) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            document,
            provider,
            upload: Box::new(move |document: SavedDocument, provider: Arc<dyn FileSystemProvider>| {
                upload(document, provider).boxed()
            }),
        }
    }

    /// Save that writes `contents` to the document's URI
    pub fn write(document: SavedDocument, provider: Arc<dyn FileSystemProvider>, contents: Vec<u8>) -> Self {
        Self::new(document, provider, move |document, provider| async move {
            provider
                .write_file(&document.uri, &contents, WriteOptions::update())
                .await?;
            Ok(())
        })
    }
}

#[derive(Debug, Error)]
pub enum SaveError {
    #[error("failed to upload changes for {document}: {message}")]
    Upload { document: String, message: String },

    #[error("save queue worker stopped")]
    Stopped,
}

enum Message {
    Process,
    /// Reply once everything queued before it was processed
    Flush(oneshot::Sender<Vec<SaveError>>),
}

type Pending = Arc<Mutex<VecDeque<SaveRequest>>>;

/// Single-consumer save queue
///
/// Must be created inside a tokio runtime; the worker runs until the queue
/// is dropped.
pub struct SaveQueue {
    pending: Pending,
    tx: mpsc::UnboundedSender<Message>,
}

impl SaveQueue {
    pub fn new(host: Arc<dyn EditorHost>) -> Self {
        let pending: Pending = Arc::default();
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(pending.clone(), host, rx));
        Self { pending, tx }
    }

    /// Queue a save; processing starts once earlier saves are done
    pub fn push(&self, request: SaveRequest) {
        tracing::debug!(document = %request.document.file_name, "Queued save");
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(request);
        if self.tx.send(Message::Process).is_err() {
            tracing::error!("Save queue worker is gone, save dropped");
        }
    }

    /// Wait until every save pushed so far was processed
    ///
    /// Returns the first upload failure since the previous call.
    pub async fn all(&self) -> Result<(), SaveError> {
        let (reply, done) = oneshot::channel();
        self.tx
            .send(Message::Flush(reply))
            .map_err(|_| SaveError::Stopped)?;
        let failures = done.await.map_err(|_| SaveError::Stopped)?;
        match failures.into_iter().next() {
            Some(failure) => Err(failure),
            None => Ok(()),
        }
    }
}

async fn run(pending: Pending, host: Arc<dyn EditorHost>, mut rx: mpsc::UnboundedReceiver<Message>) {
    let mut failures = Vec::new();
    while let Some(message) = rx.recv().await {
        match message {
            Message::Process => {
                if let Some(failure) = process_next(&pending, host.as_ref()).await {
                    failures.push(failure);
                }
            }
            Message::Flush(reply) => {
                let _ = reply.send(std::mem::take(&mut failures));
            }
        }
    }
    tracing::debug!("Save queue worker stopped");
}

/// Take the head request; skip it when a newer save for the same document
/// is still queued
fn next_request(pending: &Mutex<VecDeque<SaveRequest>>) -> Option<SaveRequest> {
    let mut queue = pending.lock().unwrap_or_else(PoisonError::into_inner);
    let request = queue.pop_front()?;
    if queue
        .iter()
        .any(|other| other.document.file_name == request.document.file_name)
    {
        tracing::debug!(document = %request.document.file_name, "Save superseded");
        return None;
    }
    Some(request)
}

async fn process_next(pending: &Mutex<VecDeque<SaveRequest>>, host: &dyn EditorHost) -> Option<SaveError> {
    let SaveRequest {
        document,
        provider,
        upload,
    } = next_request(pending)?;

    let Err(e) = upload(document.clone(), provider).await else {
        return None;
    };

    tracing::error!(document = %document.file_name, error = %e, "Failed to upload changes");
    host.mark_document_unsaved(&document).await;
    let name = document.uri.basename();
    host.show_error_message(
        &format!("Failed to upload changes for [{name}]({}): {e}", document.uri),
        &[],
    )
    .await;

    Some(SaveError::Upload {
        document: document.file_name,
        message: e.to_string(),
    })
}
