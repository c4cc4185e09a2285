//! Editor host port
//!
//! The core drives editor UI (opening, reverting, closing, diffing, status
//! and toast messages) only through `EditorHost`. A real editor integration
//! implements it; `HeadlessHost` records everything for tests and the CLI.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::uri::VfsUri;

/// Commands the core asks the editor to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorCommand {
    /// Show `uri` in an editor
    Open(VfsUri),
    /// Reload the active editor from its file provider
    Revert,
    CloseActiveEditor,
    /// Side-by-side view of two versions of a resource
    Diff {
        left: VfsUri,
        right: VfsUri,
        title: String,
    },
}

impl EditorCommand {
    /// Command identifier understood by the editor
    pub const fn id(&self) -> &'static str {
        match self {
            Self::Open(_) => "vscode.open",
            Self::Revert => "workbench.action.files.revert",
            Self::CloseActiveEditor => "workbench.action.closeActiveEditor",
            Self::Diff { .. } => "vscode.diff",
        }
    }
}

/// Handle to a document the editor just saved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedDocument {
    /// Identity used for save coalescing
    pub file_name: String,
    pub uri: VfsUri,
}

impl SavedDocument {
    /// Document keyed by its full URI so equal names under different
    /// profiles stay distinct
    pub fn new(uri: VfsUri) -> Self {
        Self {
            file_name: uri.without_query().to_string(),
            uri,
        }
    }

    pub fn with_file_name(file_name: impl Into<String>, uri: VfsUri) -> Self {
        Self {
            file_name: file_name.into(),
            uri,
        }
    }
}

#[async_trait]
pub trait EditorHost: Send + Sync {
    async fn execute_command(&self, command: EditorCommand);

    /// Transient message that disappears after `timeout`
    fn set_status_bar_message(&self, message: &str, timeout: Duration);

    /// Error toast; resolves to the item the user picked, if any
    async fn show_error_message(&self, message: &str, items: &[&str]) -> Option<String>;

    async fn show_warning_message(&self, message: &str, items: &[&str]) -> Option<String>;

    /// Flag a document as dirty again after a failed save
    async fn mark_document_unsaved(&self, document: &SavedDocument);
}

/// A message shown through the host, with the items offered alongside it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShownMessage {
    pub message: String,
    pub items: Vec<String>,
}

#[derive(Default)]
struct Recorded {
    commands: Vec<EditorCommand>,
    status_messages: Vec<String>,
    errors: Vec<ShownMessage>,
    warnings: Vec<ShownMessage>,
    unsaved: Vec<SavedDocument>,
    answers: VecDeque<Option<String>>,
}

/// Host without a UI
///
/// Every call is logged and recorded. Prompts are answered from a queue of
/// scripted answers; an empty queue means the user dismissed the prompt.
#[derive(Default)]
pub struct HeadlessHost {
    recorded: Mutex<Recorded>,
}

impl HeadlessHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn recorded(&self) -> std::sync::MutexGuard<'_, Recorded> {
        self.recorded.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue the answer for the next prompt (`None` dismisses it)
    pub fn answer_next(&self, answer: Option<&str>) {
        self.recorded().answers.push_back(answer.map(str::to_string));
    }

    pub fn commands(&self) -> Vec<EditorCommand> {
        self.recorded().commands.clone()
    }

    pub fn status_messages(&self) -> Vec<String> {
        self.recorded().status_messages.clone()
    }

    pub fn errors(&self) -> Vec<ShownMessage> {
        self.recorded().errors.clone()
    }

    pub fn warnings(&self) -> Vec<ShownMessage> {
        self.recorded().warnings.clone()
    }

    pub fn unsaved(&self) -> Vec<SavedDocument> {
        self.recorded().unsaved.clone()
    }

    fn prompt(&self, message: &str, items: &[&str]) -> (ShownMessage, Option<String>) {
        let answer = self.recorded().answers.pop_front().flatten();
        let shown = ShownMessage {
            message: message.to_string(),
            items: items.iter().map(|s| (*s).to_string()).collect(),
        };
        (shown, answer)
    }
}

#[async_trait]
impl EditorHost for HeadlessHost {
    async fn execute_command(&self, command: EditorCommand) {
        tracing::debug!(command = command.id(), "Editor command");
        self.recorded().commands.push(command);
    }

    fn set_status_bar_message(&self, message: &str, timeout: Duration) {
        tracing::info!(timeout = ?timeout, "{message}");
        self.recorded().status_messages.push(message.to_string());
    }

    async fn show_error_message(&self, message: &str, items: &[&str]) -> Option<String> {
        tracing::error!("{message}");
        let (shown, answer) = self.prompt(message, items);
        self.recorded().errors.push(shown);
        answer
    }

    async fn show_warning_message(&self, message: &str, items: &[&str]) -> Option<String> {
        tracing::warn!("{message}");
        let (shown, answer) = self.prompt(message, items);
        self.recorded().warnings.push(shown);
        answer
    }

    async fn mark_document_unsaved(&self, document: &SavedDocument) {
        tracing::debug!(document = %document.file_name, "Marked unsaved");
        self.recorded().unsaved.push(document.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_answers_are_consumed_in_order() {
        let host = HeadlessHost::new();
        host.answer_next(Some("Compare"));

        let first = host.show_error_message("conflict", &["Compare", "Overwrite"]).await;
        let second = host.show_error_message("conflict", &["Compare", "Overwrite"]).await;

        assert_eq!(first.as_deref(), Some("Compare"));
        assert_eq!(second, None);
        assert_eq!(host.errors().len(), 2);
        assert_eq!(host.errors()[0].items, vec!["Compare", "Overwrite"]);
    }

    #[test]
    fn saved_document_name_includes_profile() {
        let a = SavedDocument::new(VfsUri::new("zowe-uss", "/lpar1/u/a.txt"));
        let b = SavedDocument::new(VfsUri::new("zowe-uss", "/lpar2/u/a.txt"));
        assert_ne!(a.file_name, b.file_name);
    }
}
