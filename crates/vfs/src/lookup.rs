//! Path resolution over the entry tree
//!
//! All functions here are synchronous and never touch the remote side.
//! The `_silent` variants swallow every failure into `None`.

use crate::entry::{DirEntry, Entry, EntryMetadata, FileEntry};
use crate::error::{VfsError, VfsResult};
use crate::uri::VfsUri;

/// Resolve `uri` to an entry, failing with `NotFound` or `FileNotADirectory`
pub fn lookup<'a>(root: &'a Entry, uri: &VfsUri) -> VfsResult<&'a Entry> {
    let mut entry = root;
    for segment in uri.segments() {
        let dir = entry
            .as_dir()
            .ok_or_else(|| VfsError::not_a_directory(uri))?;
        entry = dir
            .entries
            .get(segment)
            .ok_or_else(|| VfsError::not_found(uri))?;
    }
    Ok(entry)
}

pub fn lookup_mut<'a>(root: &'a mut Entry, uri: &VfsUri) -> VfsResult<&'a mut Entry> {
    let mut entry = root;
    for segment in uri.segments() {
        let dir = entry
            .as_dir_mut()
            .ok_or_else(|| VfsError::not_a_directory(uri))?;
        entry = dir
            .entries
            .get_mut(segment)
            .ok_or_else(|| VfsError::not_found(uri))?;
    }
    Ok(entry)
}

pub fn lookup_silent<'a>(root: &'a Entry, uri: &VfsUri) -> Option<&'a Entry> {
    lookup(root, uri).ok()
}

pub fn lookup_silent_mut<'a>(root: &'a mut Entry, uri: &VfsUri) -> Option<&'a mut Entry> {
    lookup_mut(root, uri).ok()
}

pub fn lookup_as_directory<'a>(root: &'a Entry, uri: &VfsUri) -> VfsResult<&'a DirEntry> {
    lookup(root, uri)?
        .as_dir()
        .ok_or_else(|| VfsError::not_a_directory(uri))
}

pub fn lookup_as_directory_mut<'a>(root: &'a mut Entry, uri: &VfsUri) -> VfsResult<&'a mut DirEntry> {
    lookup_mut(root, uri)?
        .as_dir_mut()
        .ok_or_else(|| VfsError::not_a_directory(uri))
}

pub fn lookup_as_file<'a>(root: &'a Entry, uri: &VfsUri) -> VfsResult<&'a FileEntry> {
    lookup(root, uri)?
        .as_file()
        .ok_or_else(|| VfsError::is_a_directory(uri))
}

pub fn lookup_as_file_mut<'a>(root: &'a mut Entry, uri: &VfsUri) -> VfsResult<&'a mut FileEntry> {
    lookup_mut(root, uri)?
        .as_file_mut()
        .ok_or_else(|| VfsError::is_a_directory(uri))
}

pub fn lookup_parent_directory<'a>(root: &'a Entry, uri: &VfsUri) -> VfsResult<&'a DirEntry> {
    lookup_as_directory(root, &uri.parent())
}

pub fn lookup_parent_directory_mut<'a>(
    root: &'a mut Entry,
    uri: &VfsUri,
) -> VfsResult<&'a mut DirEntry> {
    lookup_as_directory_mut(root, &uri.parent())
}

/// Walk to `uri`, creating missing directories and a placeholder file
///
/// `metadata_for` is asked for the metadata of every entry that has to be
/// created. Existing entries are left as they are.
pub fn materialize_file<'a, F>(
    root: &'a mut Entry,
    uri: &VfsUri,
    mut metadata_for: F,
) -> VfsResult<&'a mut FileEntry>
where
    F: FnMut(&VfsUri) -> EntryMetadata,
{
    let segments: Vec<&str> = uri.segments().collect();
    let Some((file_name, dirs)) = segments.split_last() else {
        return Err(VfsError::is_a_directory(uri));
    };

    let mut current = root;
    let mut path = String::new();
    for segment in dirs {
        path.push('/');
        path.push_str(segment);
        let dir = current
            .as_dir_mut()
            .ok_or_else(|| VfsError::not_a_directory(uri))?;
        current = dir.entries.entry((*segment).to_string()).or_insert_with(|| {
            DirEntry::new(*segment)
                .with_metadata(metadata_for(&uri.with_path(&path)))
                .into()
        });
    }

    let dir = current
        .as_dir_mut()
        .ok_or_else(|| VfsError::not_a_directory(uri))?;
    dir.entries
        .entry((*file_name).to_string())
        .or_insert_with(|| {
            FileEntry::new(*file_name)
                .with_metadata(metadata_for(&uri.without_query()))
                .into()
        })
        .as_file_mut()
        .ok_or_else(|| VfsError::is_a_directory(uri))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uri(path: &str) -> VfsUri {
        VfsUri::new("zowe-uss", path)
    }

    fn tree() -> Entry {
        let mut sub = DirEntry::new("sub");
        sub.insert(FileEntry::new("file.txt").into());
        let mut profile = DirEntry::new("lpar1");
        profile.insert(sub.into());
        let mut root = DirEntry::new("");
        root.insert(profile.into());
        root.into()
    }

    #[test]
    fn finds_created_entries() {
        let root = tree();
        assert_eq!(lookup(&root, &uri("/lpar1/sub/file.txt")).unwrap().name(), "file.txt");
        assert_eq!(lookup(&root, &uri("/lpar1/sub")).unwrap().name(), "sub");
        assert_eq!(lookup(&root, &uri("/")).unwrap().name(), "");
    }

    #[test]
    fn missing_path_is_not_found_or_none() {
        let root = tree();
        assert!(lookup_silent(&root, &uri("/lpar1/missing")).is_none());
        assert!(lookup(&root, &uri("/lpar1/missing")).unwrap_err().is_not_found());
    }

    #[test]
    fn descending_into_file_is_not_a_directory() {
        let root = tree();
        let err = lookup(&root, &uri("/lpar1/sub/file.txt/deeper")).unwrap_err();
        assert!(matches!(err, VfsError::FileNotADirectory(_)));
        assert!(lookup_silent(&root, &uri("/lpar1/sub/file.txt/deeper")).is_none());
    }

    #[test]
    fn typed_lookups_check_terminal_kind() {
        let root = tree();
        assert!(matches!(
            lookup_as_directory(&root, &uri("/lpar1/sub/file.txt")),
            Err(VfsError::FileNotADirectory(_))
        ));
        assert!(matches!(
            lookup_as_file(&root, &uri("/lpar1/sub")),
            Err(VfsError::FileIsADirectory(_))
        ));
        assert_eq!(
            lookup_parent_directory(&root, &uri("/lpar1/sub/file.txt")).unwrap().name,
            "sub"
        );
    }

    #[test]
    fn materialize_creates_intermediate_directories() {
        let mut root = tree();
        let target = uri("/lpar1/a/b/new.txt");
        let file = materialize_file(&mut root, &target, |u| EntryMetadata::new(None, u.path())).unwrap();
        assert_eq!(file.name, "new.txt");
        assert!(!file.was_accessed);

        let a = lookup_as_directory(&root, &uri("/lpar1/a")).unwrap();
        assert_eq!(a.metadata.path, "/lpar1/a");
        assert!(lookup_as_file(&root, &target).is_ok());
        // existing entries are reused
        assert!(materialize_file(&mut root, &uri("/lpar1/sub/file.txt"), |_| EntryMetadata::default()).is_ok());
    }
}
