//! Save conflict resolution
//!
//! A save whose etag no longer matches the remote leaves the user's bytes in
//! `data` and the remote bytes in `conflict_data`. The user then compares
//! the two in a diff view, or resolves right away by keeping either side.

use crate::entry::{Entry, FileEntry};
use crate::error::VfsResult;
use crate::host::EditorCommand;
use crate::lookup;
use crate::provider::{FileSystemProvider, VfsProvider, WriteOptions};
use crate::uri::VfsUri;

const COMPARE: &str = "Compare";
const OVERWRITE: &str = "Overwrite";

const CONFLICT_PROMPT: &str =
    "There is a newer version of this file on the mainframe. Compare with remote contents or overwrite?";

/// What the user picked when told about a conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictViewSelection {
    Compare,
    Overwrite,
    UserDismissed,
}

impl VfsProvider {
    /// Ask the user how to resolve the conflict on `uri`
    pub async fn handle_conflict(&self, uri: &VfsUri) -> VfsResult<ConflictViewSelection> {
        let uri = uri.without_query();
        let answer = self
            .host
            .show_error_message(CONFLICT_PROMPT, &[COMPARE, OVERWRITE])
            .await;

        match answer.as_deref() {
            Some(COMPARE) => {
                let name = self.with_file_mut(&uri, |file| {
                    file.in_diff_view = true;
                    file.name.clone()
                })?;
                self.host
                    .execute_command(EditorCommand::Diff {
                        left: uri.with_query("conflict=true"),
                        right: uri.with_query("inDiff=true"),
                        title: format!("{name} (Remote) ↔ {name}"),
                    })
                    .await;
                Ok(ConflictViewSelection::Compare)
            }
            Some(OVERWRITE) => {
                self.diff_overwrite(&uri).await?;
                Ok(ConflictViewSelection::Overwrite)
            }
            _ => {
                tracing::debug!(uri = %uri, "Conflict dismissed");
                self.with_file_mut(&uri, |file| file.conflict_data = None)?;
                Ok(ConflictViewSelection::UserDismissed)
            }
        }
    }

    /// Keep the local bytes: force them over the remote copy
    pub async fn diff_overwrite(&self, uri: &VfsUri) -> VfsResult<()> {
        let uri = uri.without_query();
        let Some((name, data)) = self.leave_diff_view(&uri, |file| (file.name.clone(), file.data.clone())) else {
            return Ok(());
        };

        self.write_file(&uri.with_query("forceUpload=true"), &data, WriteOptions::update())
            .await?;
        self.host
            .set_status_bar_message(&format!("Overwrite applied for {name}"), self.status_timeout);
        self.clear_conflict(&uri);
        Ok(())
    }

    /// Keep the remote bytes
    ///
    /// Uploads only when the local bytes differ. The active editor (the
    /// diff view) is closed either way.
    pub async fn diff_use_remote(&self, uri: &VfsUri) -> VfsResult<()> {
        let uri = uri.without_query();
        let Some((name, local, remote)) = self.leave_diff_view(&uri, |file| {
            (
                file.name.clone(),
                file.data.clone(),
                file.conflict_data.as_ref().map(|conflict| conflict.contents.clone()),
            )
        }) else {
            return Ok(());
        };

        if let Some(remote) = remote.filter(|remote| *remote != local) {
            self.write_file(&uri.with_query("forceUpload=true"), &remote, WriteOptions::update())
                .await?;
        }
        self.host
            .set_status_bar_message(&format!("Used remote content for {name}"), self.status_timeout);
        self.clear_conflict(&uri);
        self.host.execute_command(EditorCommand::CloseActiveEditor).await;
        Ok(())
    }

    /// The editor closed the remote side of a diff without picking a side
    pub(crate) fn close_conflict_view(&self, uri: &VfsUri) {
        if !uri.has_query_param("conflict") {
            return;
        }
        let uri = uri.without_query();
        if self.leave_diff_view(&uri, |_| ()).is_some() {
            self.clear_conflict(&uri);
            tracing::debug!(uri = %uri, "Diff view closed without resolution");
        }
    }

    /// Mark the file as no longer shown in a diff and read from it
    fn leave_diff_view<T>(&self, uri: &VfsUri, read: impl FnOnce(&FileEntry) -> T) -> Option<T> {
        let mut tree = self.tree_mut();
        let file = lookup::lookup_silent_mut(&mut tree, uri).and_then(Entry::as_file_mut)?;
        file.in_diff_view = false;
        Some(read(file))
    }

    fn clear_conflict(&self, uri: &VfsUri) {
        let mut tree = self.tree_mut();
        if let Some(file) = lookup::lookup_silent_mut(&mut tree, uri).and_then(Entry::as_file_mut) {
            file.conflict_data = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::backend::BackendRegistry;
    use crate::entry::ConflictData;
    use crate::host::HeadlessHost;
    use crate::memory::MemoryBackend;
    use crate::profile::{Profile, ProfileRegistry};
    use crate::uri::Scheme;

    async fn provider_with(
        local: &[u8],
        remote: &[u8],
    ) -> (VfsProvider, Arc<MemoryBackend>, Arc<HeadlessHost>, VfsUri) {
        let profiles = Arc::new(ProfileRegistry::with_profiles([Profile::new("lpar1", "zosmf")]));
        let backends = Arc::new(BackendRegistry::new());
        let backend = Arc::new(MemoryBackend::with_files([("/USER.DATA/MEM", remote)]));
        backends.register("zosmf", backend.clone()).await;
        let host = Arc::new(HeadlessHost::new());
        let provider = VfsProvider::new(Scheme::DataSet, profiles, backends, host.clone());

        let uri = provider.uri("/lpar1/USER.DATA/MEM");
        provider.read_file(&uri).await.unwrap();
        provider
            .with_file_mut(&uri, |file| {
                file.set_data(local.to_vec());
                file.in_diff_view = true;
                file.conflict_data = Some(ConflictData {
                    contents: remote.to_vec(),
                    etag: None,
                    size: remote.len() as u64,
                });
            })
            .unwrap();
        (provider, backend, host, uri)
    }

    fn conflict_of(provider: &VfsProvider, uri: &VfsUri) -> Option<ConflictData> {
        provider
            .snapshot(uri)
            .and_then(|entry| entry.as_file().and_then(|file| file.conflict_data.clone()))
    }

    #[tokio::test]
    async fn overwrite_uploads_local_data_with_force() {
        let (provider, backend, host, uri) = provider_with(b"local", b"remote").await;

        provider.diff_overwrite(&uri).await.unwrap();

        let uploads = backend.uploads();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].data, b"local");
        assert!(uploads[0].force_upload);
        assert!(conflict_of(&provider, &uri).is_none());
        assert_eq!(host.status_messages(), vec!["Overwrite applied for MEM"]);
    }

    #[tokio::test]
    async fn use_remote_with_differing_content_uploads_remote() {
        let (provider, backend, host, uri) = provider_with(b"local", b"remote").await;

        provider.diff_use_remote(&uri).await.unwrap();

        let uploads = backend.uploads();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].data, b"remote");
        assert!(uploads[0].force_upload);
        assert_eq!(host.commands().last(), Some(&EditorCommand::CloseActiveEditor));
        assert!(conflict_of(&provider, &uri).is_none());

        let entry = provider.snapshot(&uri).unwrap();
        assert_eq!(entry.as_file().unwrap().data, b"remote");
        assert!(!entry.as_file().unwrap().in_diff_view);
    }

    #[tokio::test]
    async fn use_remote_with_identical_content_skips_upload() {
        let (provider, backend, host, uri) = provider_with(b"same", b"same").await;

        provider.diff_use_remote(&uri).await.unwrap();

        assert!(backend.uploads().is_empty());
        assert_eq!(host.commands(), vec![EditorCommand::CloseActiveEditor]);
        assert!(conflict_of(&provider, &uri).is_none());
        assert_eq!(host.status_messages(), vec!["Used remote content for MEM"]);
    }

    #[tokio::test]
    async fn resolution_on_missing_entry_is_a_no_op() {
        let (provider, backend, host, _) = provider_with(b"a", b"b").await;
        let missing = provider.uri("/lpar1/USER.DATA/NOPE");

        provider.diff_overwrite(&missing).await.unwrap();
        provider.diff_use_remote(&missing).await.unwrap();

        assert!(backend.uploads().is_empty());
        assert!(host.commands().is_empty());
    }

    #[tokio::test]
    async fn closing_the_diff_lets_later_saves_upload() {
        let (provider, backend, _host, uri) = provider_with(b"local", b"remote").await;

        // closing the editable side keeps the diff open
        provider.on_document_closed(&uri.with_query("inDiff=true"));
        provider.write_file(&uri, b"held", WriteOptions::update()).await.unwrap();
        assert!(backend.uploads().is_empty());

        provider.on_document_closed(&uri.with_query("conflict=true"));
        let entry = provider.snapshot(&uri).unwrap();
        assert!(!entry.as_file().unwrap().in_diff_view);
        assert!(conflict_of(&provider, &uri).is_none());

        provider.write_file(&uri, b"edited", WriteOptions::update()).await.unwrap();
        let uploads = backend.uploads();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].data, b"edited");
    }

    #[tokio::test]
    async fn dismissing_the_prompt_clears_conflict() {
        let (provider, backend, _host, uri) = provider_with(b"local", b"remote").await;

        let selection = provider.handle_conflict(&uri).await.unwrap();

        assert_eq!(selection, ConflictViewSelection::UserDismissed);
        assert!(conflict_of(&provider, &uri).is_none());
        assert!(backend.uploads().is_empty());
    }
}
