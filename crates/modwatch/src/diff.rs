//! Line-level diff engine.
//!
//! Compares two files (or two line sequences) and produces an edit script
//! of retained, removed, and added lines. Also provides the byte-equality
//! check the notifier uses to filter change notifications that did not
//! alter content.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

/// One line of a diff: retained, present only in the old version, or
/// present only in the new version.
///
/// The rendered form is the two-character prefix followed by the line:
/// `"= line"`, `"< line"`, or `"> line"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "line")]
pub enum DiffLine {
    Unchanged(String),
    Removed(String),
    Added(String),
}

impl std::fmt::Display for DiffLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unchanged(line) => write!(f, "= {}", line),
            Self::Removed(line) => write!(f, "< {}", line),
            Self::Added(line) => write!(f, "> {}", line),
        }
    }
}

/// Returns whether `a` and `b` both exist as regular files with byte-equal
/// contents.
///
/// Equal paths short-circuit. A missing side is never an error; it simply
/// compares unequal. An existing file that cannot be read surfaces the
/// underlying I/O error.
pub fn identical(a: &Path, b: &Path) -> io::Result<bool> {
    if a == b {
        return Ok(a.is_file());
    }
    let Some(meta_a) = metadata_if_present(a)? else {
        return Ok(false);
    };
    let Some(meta_b) = metadata_if_present(b)? else {
        return Ok(false);
    };
    if !meta_a.is_file() || !meta_b.is_file() || meta_a.len() != meta_b.len() {
        return Ok(false);
    }
    Ok(fs::read(a)? == fs::read(b)?)
}

fn metadata_if_present(path: &Path) -> io::Result<Option<fs::Metadata>> {
    match fs::metadata(path) {
        Ok(meta) => Ok(Some(meta)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Produces the line diff from `old` to `new` file contents.
///
/// A missing `old` yields every line of `new` as an addition, a missing
/// `new` yields every line of `old` as a removal, and two missing files
/// yield an empty diff.
pub fn diff_files(old: &Path, new: &Path) -> io::Result<Vec<DiffLine>> {
    let old_lines = read_lines(old)?;
    let new_lines = read_lines(new)?;
    Ok(match (old_lines, new_lines) {
        (Some(old_lines), Some(new_lines)) => diff_lines(&old_lines, &new_lines),
        (None, Some(new_lines)) => new_lines.into_iter().map(DiffLine::Added).collect(),
        (Some(old_lines), None) => old_lines.into_iter().map(DiffLine::Removed).collect(),
        (None, None) => Vec::new(),
    })
}

fn read_lines(path: &Path) -> io::Result<Option<Vec<String>>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    // str::lines splits on \n and strips a trailing \r, so CRLF files
    // diff by line content rather than by stray carriage returns.
    let text = String::from_utf8_lossy(&bytes);
    Ok(Some(text.lines().map(str::to_string).collect()))
}

/// Diffs two line sequences via longest-common-subsequence reconstruction.
///
/// When both branches of the reconstruction preserve the LCS length, the
/// addition from `new` is taken before the removal from `old`; the output
/// is deterministic across platforms.
pub fn diff_lines(old: &[String], new: &[String]) -> Vec<DiffLine> {
    // lengths[i][j] is the LCS length of old[..i] and new[..j].
    let mut lengths = vec![vec![0usize; new.len() + 1]; old.len() + 1];
    for i in 1..=old.len() {
        for j in 1..=new.len() {
            lengths[i][j] = if old[i - 1] == new[j - 1] {
                lengths[i - 1][j - 1] + 1
            } else {
                lengths[i - 1][j].max(lengths[i][j - 1])
            };
        }
    }

    let mut script = Vec::new();
    let (mut i, mut j) = (old.len(), new.len());
    while i > 0 || j > 0 {
        if i > 0 && j > 0 && old[i - 1] == new[j - 1] {
            script.push(DiffLine::Unchanged(old[i - 1].clone()));
            i -= 1;
            j -= 1;
        } else if j > 0 && (i == 0 || lengths[i][j - 1] >= lengths[i - 1][j]) {
            script.push(DiffLine::Added(new[j - 1].clone()));
            j -= 1;
        } else {
            script.push(DiffLine::Removed(old[i - 1].clone()));
            i -= 1;
        }
    }
    script.reverse();
    script
}
