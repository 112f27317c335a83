use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::TransferItem;
use super::helpers::{display_path, join_remote, normalize_path, remote_basename, remote_parent};
use super::transport::{RemoteEntry, Scope, Transport};
use crate::TransferError;
use crate::cancel::CancelToken;

/// Enumerate a local file or directory tree for upload.
///
/// A directory is walked recursively (regular files only, sorted by name) and
/// each file lands at `remote_root/<path relative to local_root>`. A single
/// file goes to `remote_root` itself, or inside it when `remote_root` ends in '/'.
pub(super) fn enumerate_local(
    local_root: &Path,
    remote_root: &str,
) -> Result<(Vec<TransferItem>, u64), TransferError> {
    let md = std::fs::metadata(local_root).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            TransferError::FileSystem(format!(
                "source path does not exist: {}",
                display_path(local_root)
            ))
        } else {
            TransferError::fs(
                format!("failed to access source path {}", display_path(local_root)),
                e,
            )
        }
    })?;

    if !md.is_dir() {
        let remote_path = if remote_root.ends_with('/') {
            let name = local_root.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
            join_remote(remote_root, &name)
        } else {
            normalize_path(remote_root, false)
        };
        let item = TransferItem {
            local_path: local_root.to_path_buf(),
            remote_path,
            size_bytes: md.len(),
        };
        return Ok((vec![item], md.len()));
    }

    let mut items = Vec::new();
    let mut total_size = 0u64;
    for entry in WalkDir::new(local_root).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            TransferError::fs(format!("failed to walk directory {}", display_path(local_root)), e)
        })?;
        let path = entry.path();
        let size = if entry.path_is_symlink() {
            // links are not followed into directories, but a linked file is uploaded
            match std::fs::metadata(path) {
                Ok(md) if md.is_file() => md.len(),
                Ok(_) => {
                    tracing::debug!("skipping linked directory {}", display_path(path));
                    continue;
                }
                Err(e) => {
                    return Err(TransferError::fs(
                        format!("failed to resolve link {}", display_path(path)),
                        e,
                    ));
                }
            }
        } else if entry.file_type().is_file() {
            let md = entry.metadata().map_err(|e| {
                TransferError::fs(format!("failed to stat {}", display_path(path)), e)
            })?;
            md.len()
        } else {
            continue;
        };
        let rel = path.strip_prefix(local_root).unwrap_or(path).to_string_lossy().to_string();
        total_size += size;
        items.push(TransferItem {
            local_path: path.to_path_buf(),
            remote_path: join_remote(remote_root, &rel),
            size_bytes: size,
        });
    }
    Ok((items, total_size))
}

// Look the target up in its parent's listing. Listing failures only mean
// "unknown here"; cancellation still propagates.
fn find_in_parent(
    transport: &dyn Transport,
    cancel: &CancelToken,
    scope: &Scope,
    remote_path: &str,
) -> Result<Option<RemoteEntry>, TransferError> {
    let name = remote_basename(remote_path);
    if name.is_empty() || name == "/" {
        return Ok(None);
    }
    let parent = remote_parent(remote_path);
    match transport.list_directory(cancel, scope, &parent) {
        Ok(entries) => Ok(entries.into_iter().find(|e| e.base_name() == name)),
        Err(TransferError::UserCancelled) => Err(TransferError::UserCancelled),
        Err(e) => {
            tracing::debug!("listing parent {} failed: {}", parent, e);
            Ok(None)
        }
    }
}

fn single_file_destination(local_root: &Path, remote_path: &str) -> PathBuf {
    let raw = local_root.as_os_str().to_string_lossy();
    let ends_with_sep = raw.chars().last().is_some_and(std::path::is_separator);
    if ends_with_sep || local_root.is_dir() {
        local_root.join(remote_basename(remote_path))
    } else {
        local_root.to_path_buf()
    }
}

/// Resolve a remote path into download items.
///
/// File vs directory is decided by the parent listing when the target shows up
/// there, otherwise by a trailing '/' (directory, must list non-empty) or a
/// download-URL probe (file of unknown size).
pub(super) fn resolve_remote(
    transport: &dyn Transport,
    cancel: &CancelToken,
    scope: &Scope,
    remote_root: &str,
    local_root: &Path,
) -> Result<(Vec<TransferItem>, u64), TransferError> {
    let explicit_dir = remote_root.ends_with('/');
    let remote_norm = normalize_path(remote_root, false);

    match find_in_parent(transport, cancel, scope, &remote_norm)? {
        Some(entry) if entry.is_folder => {}
        Some(entry) => {
            let item = TransferItem {
                local_path: single_file_destination(local_root, &remote_norm),
                remote_path: remote_norm,
                size_bytes: entry.size_bytes,
            };
            let size = item.size_bytes;
            return Ok((vec![item], size));
        }
        None if explicit_dir || remote_norm == "/" => {
            let listed = transport.list_directory(cancel, scope, &remote_norm);
            match listed {
                Ok(entries) if !entries.is_empty() => {}
                Ok(_) => {
                    return Err(TransferError::api(format!("directory is empty: {}", remote_root)));
                }
                Err(TransferError::UserCancelled) => return Err(TransferError::UserCancelled),
                Err(_) => {
                    return Err(TransferError::api(format!("directory not found: {}", remote_root)));
                }
            }
        }
        None => {
            if let Err(e) = transport.get_download_url(cancel, scope, &remote_norm) {
                if e.is_user_cancelled() {
                    return Err(e);
                }
                return Err(TransferError::api(format!("file not found: {}", remote_root)));
            }
            let item = TransferItem {
                local_path: single_file_destination(local_root, &remote_norm),
                remote_path: remote_norm,
                size_bytes: 0,
            };
            return Ok((vec![item], 0));
        }
    }

    let (items, total) = collect_remote_tree(transport, cancel, scope, &remote_norm, local_root)
        .map_err(|e| e.context("failed to collect files"))?;
    if items.is_empty() {
        return Err(TransferError::api(format!("no files found in directory: {}", remote_root)));
    }
    Ok((items, total))
}

// Breadth-first walk of a remote directory, mirroring it under `local_root`.
fn collect_remote_tree(
    transport: &dyn Transport,
    cancel: &CancelToken,
    scope: &Scope,
    remote_root: &str,
    local_root: &Path,
) -> Result<(Vec<TransferItem>, u64), TransferError> {
    let mut items = Vec::new();
    let mut total = 0u64;
    let mut queue: VecDeque<(String, PathBuf)> = VecDeque::new();
    queue.push_back((remote_root.to_string(), local_root.to_path_buf()));
    while let Some((dir, local_dir)) = queue.pop_front() {
        for entry in transport.list_directory(cancel, scope, &dir)? {
            let name = entry.base_name();
            if name.is_empty() || name == "." || name == ".." {
                continue;
            }
            let remote_path = join_remote(&dir, name);
            let local_path = local_dir.join(name);
            if entry.is_folder {
                queue.push_back((remote_path, local_path));
            } else {
                if let Some(ts) = entry.modified() {
                    tracing::debug!(
                        "remote {} ({} bytes, modified {})",
                        remote_path,
                        entry.size_bytes,
                        ts
                    );
                }
                total += entry.size_bytes;
                items.push(TransferItem { local_path, remote_path, size_bytes: entry.size_bytes });
            }
        }
    }
    Ok((items, total))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_keeps_relative_structure() {
        let tmp = tempfile::tempdir().expect("tmp");
        let root = tmp.path().join("root");
        std::fs::create_dir_all(root.join("a")).expect("mkdir");
        std::fs::write(root.join("a").join("b.txt"), b"hello").expect("write");
        std::fs::write(root.join("top.txt"), b"x").expect("write");

        let (items, total) = enumerate_local(&root, "/dest/").expect("enumerate");
        let remotes: Vec<&str> = items.iter().map(|i| i.remote_path.as_str()).collect();
        assert_eq!(remotes, vec!["/dest/a/b.txt", "/dest/top.txt"]);
        assert_eq!(total, 6);
    }

    #[test]
    fn single_file_into_remote_directory() {
        let tmp = tempfile::tempdir().expect("tmp");
        let f = tmp.path().join("model.bin");
        std::fs::write(&f, vec![0u8; 10]).expect("write");
        let (items, _) = enumerate_local(&f, "/weights/").expect("enumerate");
        assert_eq!(items[0].remote_path, "/weights/model.bin");
        let (items, _) = enumerate_local(&f, "/weights/renamed.bin").expect("enumerate");
        assert_eq!(items[0].remote_path, "/weights/renamed.bin");
    }

    #[test]
    fn missing_root_is_file_system_error() {
        let tmp = tempfile::tempdir().expect("tmp");
        let err = enumerate_local(&tmp.path().join("nope"), "/d").expect_err("missing");
        assert!(matches!(err, TransferError::FileSystem(ref m) if m.contains("does not exist")));
    }

    #[test]
    fn empty_directory_yields_no_items() {
        let tmp = tempfile::tempdir().expect("tmp");
        std::fs::create_dir(tmp.path().join("sub")).expect("mkdir");
        let (items, total) = enumerate_local(tmp.path(), "/d").expect("enumerate");
        assert!(items.is_empty());
        assert_eq!(total, 0);
    }

    #[cfg(unix)]
    #[test]
    fn linked_files_are_included() {
        let tmp = tempfile::tempdir().expect("tmp");
        let root = tmp.path().join("root");
        std::fs::create_dir_all(&root).expect("mkdir");
        std::fs::write(root.join("real.txt"), b"abc").expect("write");
        let outside = tmp.path().join("outside.bin");
        std::fs::write(&outside, vec![1u8; 10]).expect("write");
        std::os::unix::fs::symlink(&outside, root.join("link.bin")).expect("symlink");
        let elsewhere = tmp.path().join("elsewhere");
        std::fs::create_dir_all(&elsewhere).expect("mkdir");
        std::fs::write(elsewhere.join("deep.txt"), b"no").expect("write");
        std::os::unix::fs::symlink(&elsewhere, root.join("linked_dir")).expect("symlink");

        let (items, total) = enumerate_local(&root, "/d").expect("enumerate");
        let remotes: Vec<&str> = items.iter().map(|i| i.remote_path.as_str()).collect();
        assert_eq!(remotes, vec!["/d/link.bin", "/d/real.txt"]);
        assert_eq!(items[0].size_bytes, 10);
        assert_eq!(total, 13);
    }

    #[cfg(unix)]
    #[test]
    fn dangling_link_is_a_file_system_error() {
        let tmp = tempfile::tempdir().expect("tmp");
        std::os::unix::fs::symlink(tmp.path().join("gone"), tmp.path().join("broken"))
            .expect("symlink");
        let err = enumerate_local(tmp.path(), "/d").expect_err("dangling");
        assert!(matches!(err, TransferError::FileSystem(ref m) if m.contains("resolve link")));
    }

    #[test]
    fn single_download_into_existing_dir() {
        let tmp = tempfile::tempdir().expect("tmp");
        assert_eq!(single_file_destination(tmp.path(), "/x/a.bin"), tmp.path().join("a.bin"));
        let file_target = tmp.path().join("b.bin");
        assert_eq!(single_file_destination(&file_target, "/x/a.bin"), file_target);
    }
}
