use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{KernelError, Result};

/// Where a script's instruction lines come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptSource {
    /// A script file, re-read from disk on every page fault
    File(PathBuf),
    /// Lines captured in memory, used for the shell's own pending input
    Inline { name: String, lines: Vec<String> },
}

impl ScriptSource {
    pub fn file<P: AsRef<Path>>(path: P) -> Self {
        ScriptSource::File(path.as_ref().to_path_buf())
    }

    pub fn inline(name: impl Into<String>, lines: Vec<String>) -> Self {
        ScriptSource::Inline {
            name: name.into(),
            lines,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            ScriptSource::File(path) => Some(path),
            ScriptSource::Inline { .. } => None,
        }
    }

    /// Read the lines of `page`; the last page of a script may be short
    pub fn read_page(&self, page: usize, page_size: usize) -> Result<Vec<String>> {
        match self {
            ScriptSource::File(path) => {
                let lines = read_script(path)?;
                Ok(page_of(&lines, page, page_size))
            }
            ScriptSource::Inline { lines, .. } => Ok(page_of(lines, page, page_size)),
        }
    }
}

impl fmt::Display for ScriptSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptSource::File(path) => write!(f, "{}", path.display()),
            ScriptSource::Inline { name, .. } => write!(f, "{}", name),
        }
    }
}

/// Slice out the lines of one page
pub fn page_of(lines: &[String], page: usize, page_size: usize) -> Vec<String> {
    lines
        .iter()
        .skip(page * page_size)
        .take(page_size)
        .cloned()
        .collect()
}

/// Read every line of a script file
///
/// A missing or unopenable file is `ScriptNotFound`; anything that fails
/// after opening (bad UTF-8, read errors) is `ScriptRead`.
pub fn read_script<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| match source.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied | io::ErrorKind::IsADirectory => {
            KernelError::ScriptNotFound {
                path: path.to_path_buf(),
                source,
            }
        }
        _ => KernelError::ScriptRead {
            path: path.to_path_buf(),
            source,
        },
    })?;
    Ok(split_lines(&content))
}

/// Split text into instruction lines, dropping line terminators
pub fn split_lines(content: &str) -> Vec<String> {
    content
        .lines()
        .map(|line| line.trim_end_matches('\r').to_string())
        .collect()
}
