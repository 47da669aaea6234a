// Copyright (c) Contributors to the venvfile project.
// SPDX-License-Identifier: Apache-2.0

//! Registration of extra import paths through `.pth` files.
//!
//! A `.pth` file in a site-packages directory may be shared with other
//! tools and can hold arbitrary content besides path entries (comments,
//! `import` lines, ...). New entries are therefore only ever appended,
//! existing content is never rewritten, and entries already present are not
//! written a second time.

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::path_util;

#[cfg(test)]
#[path = "./pth_test.rs"]
mod pth_test;

/// The default separator written after each entry.
pub const DEFAULT_NEWLINE: &str = "\n";

/// Remove the items of `source` whose converted key appears in `target`.
///
/// `target` is iterated at most once, and iteration stops as soon as no
/// source items remain.
pub fn filter_existing<S, T, I, F>(source: Vec<S>, target: I, conv: F) -> Vec<S>
where
    I: IntoIterator<Item = T>,
    T: PartialEq,
    F: Fn(&S) -> &T,
{
    let mut remaining = source;
    if remaining.is_empty() {
        return remaining;
    }
    for existing in target {
        remaining.retain(|item| *conv(item) != existing);
        if remaining.is_empty() {
            break;
        }
    }
    remaining
}

/// Interpret a raw `.pth` line as a path, relative to `site_dir`.
///
/// Returns `None` for lines that are not path entries. These still stay in
/// the file; they just never count as duplicates.
fn existing_entry(site_dir: &Path, raw: &[u8]) -> Option<PathBuf> {
    let end = raw
        .iter()
        .rposition(|b| *b != b'\n' && *b != b'\r')
        .map_or(0, |i| i + 1);
    let line = match std::str::from_utf8(&raw[..end]) {
        Ok(line) => line,
        Err(err) => {
            tracing::debug!("Skipping non UTF-8 .pth line: {err}");
            return None;
        }
    };
    if line.trim().is_empty()
        || line.starts_with('#')
        || line.starts_with("import ")
        || line.starts_with("import\t")
    {
        return None;
    }
    match path_util::norm_fully(&site_dir.join(line)) {
        Ok(path) => Some(path),
        Err(err) => {
            // Code or something else that is not a path.
            tracing::debug!(line, "Not a .pth path entry: {err}");
            None
        }
    }
}

/// Remove the candidates that are already registered in the `.pth` file.
///
/// The file is read from its start in a single pass over its raw bytes;
/// `\n`, `\r\n` and a lone `\r` all end a line. Candidates may be absolute
/// or relative to `site_dir`.
pub fn remove_existing_pth_paths<F: Read + Seek>(
    site_dir: &Path,
    file: &mut F,
    candidates: Vec<String>,
) -> io::Result<Vec<String>> {
    let keyed = candidates
        .into_iter()
        .map(|candidate| {
            let canonical = path_util::norm_fully(&site_dir.join(&candidate))?;
            Ok((candidate, canonical))
        })
        .collect::<io::Result<Vec<(String, PathBuf)>>>()?;

    file.seek(SeekFrom::Start(0))?;
    let mut reader = BufReader::new(file);
    let mut read_error = None;
    let existing = std::iter::from_fn(|| {
        let mut raw = Vec::new();
        match reader.read_until(b'\n', &mut raw) {
            Ok(0) => None,
            Ok(_) => Some(raw),
            Err(err) => {
                read_error = Some(err);
                None
            }
        }
    })
    // Universal newlines: a lone `\r` also ends a line when reading.
    .flat_map(|raw| {
        raw.split(|b| *b == b'\r')
            .map(<[u8]>::to_vec)
            .collect::<Vec<_>>()
    })
    .filter_map(|line| existing_entry(site_dir, &line));

    let remaining = filter_existing(keyed, existing, |(_, canonical)| canonical);
    if let Some(err) = read_error {
        return Err(err);
    }
    Ok(remaining.into_iter().map(|(candidate, _)| candidate).collect())
}

/// Check whether the content ends with `\n`, `\r\n` or `\n\r`.
///
/// A lone trailing `\r` does not count as a line ending.
fn ends_with_newline(last: &[u8]) -> bool {
    last.last() == Some(&b'\n') || last == b"\n\r"
}

/// Append `lines` to the file, each followed by `linesep`, making sure the
/// first appended line starts on a new line.
///
/// A separator is only prepended if the file is non-empty and does not
/// already end with a line ending. `linesep` is written byte for byte with
/// no newline translation. The handle is flushed but not closed, and its
/// position afterwards is unspecified.
pub fn append_lines_on_new_line<F, I, L>(file: &mut F, lines: I, linesep: &str) -> io::Result<()>
where
    F: Read + Write + Seek,
    I: IntoIterator<Item = L>,
    L: AsRef<str>,
{
    let len = file.seek(SeekFrom::End(0))?;
    let mut prepend_linesep = false;
    if len > 0 {
        let tail = len.min(2);
        file.seek(SeekFrom::End(-(tail as i64)))?;
        let mut last = vec![0u8; tail as usize];
        file.read_exact(&mut last)?;
        prepend_linesep = !ends_with_newline(&last);
    }

    file.seek(SeekFrom::End(0))?;
    if prepend_linesep {
        file.write_all(linesep.as_bytes())?;
    }
    for line in lines {
        file.write_all(line.as_ref().as_bytes())?;
        file.write_all(linesep.as_bytes())?;
    }
    file.flush()
}

/// Open a `.pth` file for merging.
///
/// With `exclusive` set the file must not exist yet, so a second session
/// racing for the same file fails to open it instead of interleaving
/// writes. Otherwise the file is opened for appending and created if
/// missing; concurrent writers may then corrupt each other's entries.
pub fn open_pth_file(path: &Path, exclusive: bool) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.read(true);
    if exclusive {
        options.write(true).create_new(true);
    } else {
        options.append(true).create(true);
    }
    options.open(path)
}

/// Compute the text written to the `.pth` file for a configured entry.
///
/// Absolute entries are kept as they are. Relative entries are interpreted
/// relative to `conf_dir` and rewritten relative to `site_dir`, so the
/// import machinery resolves them to the same location.
pub fn sanitize_pth_path(entry: &str, conf_dir: &Path, site_dir: &Path) -> String {
    let path = Path::new(entry);
    if path.is_absolute() {
        return entry.to_string();
    }
    let resolved = path_util::resolve_rel_path(conf_dir, path);
    let relative = path_util::relative_to(&resolved, site_dir);
    let sanitized = relative.to_string_lossy().into_owned();
    tracing::debug!("Resolved pth path {sanitized:?}");
    sanitized
}

/// Merges candidate entries into a `.pth` file.
#[derive(Debug, Clone)]
pub struct PthMerger<'a> {
    /// The site-packages directory relative entries are resolved against.
    pub site_dir: &'a Path,
    /// Separator written after each new entry.
    pub linesep: &'a str,
    /// Write all candidates even if they are already registered.
    pub ignore_existing_duplicates: bool,
}

impl<'a> PthMerger<'a> {
    pub fn new(site_dir: &'a Path) -> Self {
        Self {
            site_dir,
            linesep: DEFAULT_NEWLINE,
            ignore_existing_duplicates: false,
        }
    }

    /// Merge `candidates` into `file` and return how many entries were
    /// appended.
    pub fn merge<F: Read + Write + Seek>(
        &self,
        file: &mut F,
        candidates: Vec<String>,
    ) -> io::Result<usize> {
        let remaining = if self.ignore_existing_duplicates {
            candidates
        } else {
            let remaining = remove_existing_pth_paths(self.site_dir, file, candidates)?;
            let count = remaining.len();
            tracing::info!(
                "After removing duplicates, {} .pth path{} remain{} to be installed.",
                if count == 0 {
                    "no".to_string()
                } else {
                    count.to_string()
                },
                if count == 1 { "" } else { "s" },
                if count == 1 { "s" } else { "" },
            );
            remaining
        };

        if remaining.is_empty() {
            return Ok(0);
        }

        append_lines_on_new_line(file, &remaining, self.linesep)?;
        Ok(remaining.len())
    }
}
