// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Records of the design last applied to each clock
//!
//! Each clock gets one file in the marker directory, named after the clock,
//! holding the design name on its first line.  A missing file is a normal
//! state: nothing has been applied by us since the directory was created.

use std::fs;
use std::io;
use std::path::PathBuf;

use log::{debug, warn};

use crate::FileError;

#[derive(Clone, Debug)]
pub struct MarkerStore {
    dir: PathBuf,
}

impl MarkerStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self, clock: &str) -> PathBuf {
        self.dir.join(clock)
    }

    /// Returns the design last recorded for `clock`, if any.
    pub fn read(&self, clock: &str) -> Result<Option<String>, FileError> {
        let path = self.path(clock);

        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(FileError::io(path, e)),
        };

        let design = contents.lines().next().unwrap_or("").trim();
        if design.is_empty() {
            warn!("{}: empty marker, ignoring", path.display());
            return Ok(None);
        }

        Ok(Some(design.to_string()))
    }

    ///
    /// Records `design` as the one applied to `clock`, creating the marker
    /// directory if needed.  The record is written to a temporary file and
    /// renamed into place, so a reader never sees a partial name.
    ///
    pub fn record(&self, clock: &str, design: &str) -> Result<(), FileError> {
        fs::create_dir_all(&self.dir).map_err(|e| FileError::io(&self.dir, e))?;

        let path = self.path(clock);
        let tmp = self.dir.join(format!(".{clock}.tmp"));

        fs::write(&tmp, format!("{design}\n"))
            .map_err(|e| FileError::io(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| FileError::io(&path, e))?;

        debug!("{clock}: recorded design {design}");
        Ok(())
    }

    /// Forgets any design recorded for `clock`.
    pub fn clear(&self, clock: &str) -> Result<(), FileError> {
        let path = self.path(clock);

        match fs::remove_file(&path) {
            Ok(()) => debug!("{clock}: cleared marker"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => (),
            Err(e) => return Err(FileError::io(path, e)),
        }

        Ok(())
    }
}
