// Copyright (c) Contributors to the venvfile project.
// SPDX-License-Identifier: Apache-2.0

//! Path normalization used to compare `.pth` entries.

use std::io;
use std::path::{Component, Path, PathBuf};

#[cfg(test)]
#[path = "./path_util_test.rs"]
mod path_util_test;

/// Normalize a path without touching the filesystem.
///
/// Drops `.` components, folds `..` into the preceding component and
/// collapses repeated separators. A `..` directly below the root is dropped.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    let mut depth = 0usize;
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => {
                out.push(component.as_os_str());
                depth = 0;
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if depth > 0 {
                    out.pop();
                    depth -= 1;
                } else if !out.has_root() {
                    out.push("..");
                }
            }
            Component::Normal(name) => {
                out.push(name);
                depth += 1;
            }
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// Resolve `path` relative to `base` and normalize the result.
pub fn resolve_rel_path(base: &Path, path: &Path) -> PathBuf {
    normalize_lexically(&base.join(path))
}

/// Compute the relative path leading from `base` to `path`.
///
/// Both paths are normalized lexically first. If they do not share a common
/// root (e.g. different drives on Windows), `path` is returned unchanged.
pub fn relative_to(path: &Path, base: &Path) -> PathBuf {
    let path = normalize_lexically(path);
    let base = normalize_lexically(base);

    let path_parts: Vec<Component<'_>> = path.components().collect();
    let base_parts: Vec<Component<'_>> = base.components().collect();

    let common = path_parts
        .iter()
        .zip(base_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();
    if common == 0 && (path.has_root() || base.has_root()) {
        return path;
    }

    let mut out = PathBuf::new();
    for _ in common..base_parts.len() {
        out.push("..");
    }
    for part in &path_parts[common..] {
        out.push(part.as_os_str());
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// Resolve symlinks like a non-strict `realpath`: the longest existing
/// prefix is canonicalized and any missing tail is appended verbatim.
///
/// The prefix may contain `..`; the OS resolves it after following links.
fn realpath(path: &Path) -> io::Result<PathBuf> {
    let components: Vec<Component<'_>> = path.components().collect();
    let mut last_err = None;
    for split in (1..=components.len()).rev() {
        let prefix: PathBuf = components[..split].iter().collect();
        match dunce::canonicalize(&prefix) {
            Ok(mut resolved) => {
                resolved.extend(components[split..].iter().copied().map(Component::as_os_str));
                return Ok(resolved);
            }
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
                ) =>
            {
                last_err = Some(err);
            }
            Err(err) => return Err(err),
        }
    }
    Err(last_err.unwrap_or_else(|| io::Error::from(io::ErrorKind::NotFound)))
}

#[cfg(windows)]
fn normcase(path: PathBuf) -> PathBuf {
    let lowered = path.to_string_lossy().to_lowercase().replace('/', "\\");
    PathBuf::from(lowered)
}

#[cfg(not(windows))]
fn normcase(path: PathBuf) -> PathBuf {
    path
}

/// Fully normalize an absolute path for comparison purposes.
///
/// Symlinks are resolved, the path is normalized and finally its case is
/// normalized on case-insensitive platforms. The result is only meant for
/// duplicate detection and should not be written anywhere.
pub fn norm_fully(path: &Path) -> io::Result<PathBuf> {
    if !path.is_absolute() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("The provided path {path:?} was not absolute."),
        ));
    }
    let resolved = realpath(path)?;
    Ok(normcase(normalize_lexically(&resolved)))
}
