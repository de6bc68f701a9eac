// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Clock design files on the local filesystem
//!
//! Clock designs are exported from vendor tooling as a handful of files per
//! design.  A board ships a set of them in a vendor default directory (one
//! subdirectory per chip), and users may drop additional designs into a
//! writable custom directory.  This crate:
//!
//! - resolves a design name to the files backing it ([`store`]);
//! - parses those files into bytes or register scripts ([`format`]);
//! - keeps a per-clock record of the design last applied ([`marker`]).

use std::fmt;
use std::io;
use std::path::PathBuf;

pub mod format;
pub mod marker;
pub mod store;

pub use format::{FormatError, ImageFormat, ImageId, ScriptLine};
pub use marker::MarkerStore;
pub use store::{
    BootFiles, Candidate, CandidateFile, CandidateStore, FileKind, Source,
};

#[derive(Debug)]
pub enum FileError {
    /// None of the directories hold the required file(s) for a design.
    /// `missing` names every required file that could not be found.
    NotFound { design: String, missing: Vec<String> },
    /// A file was found but its contents could not be used.
    Malformed { path: PathBuf, error: FormatError },
    /// The filesystem refused us.
    Io { path: PathBuf, error: io::Error },
}

impl FileError {
    pub(crate) fn io(path: impl Into<PathBuf>, error: io::Error) -> Self {
        FileError::Io {
            path: path.into(),
            error,
        }
    }
}

impl fmt::Display for FileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileError::NotFound { design, missing } => {
                write!(f, "cannot find design '{design}'")?;
                if !missing.is_empty() {
                    write!(f, " (missing {})", missing.join(", "))?;
                }
                Ok(())
            }
            FileError::Malformed { path, error } => {
                write!(f, "{}: {error}", path.display())
            }
            FileError::Io { path, error } => {
                write!(f, "{}: {error}", path.display())
            }
        }
    }
}

impl std::error::Error for FileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FileError::Io { error, .. } => Some(error),
            _ => None,
        }
    }
}
