// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Resolving design names to files
//!
//! A design for chip `CHIP` named `NAME` is looked for first in the vendor
//! default directory, as `<default>/<CHIP>/<NAME><suffix>`, and only if that
//! does not exist in the custom directory, as `<custom>/<NAME><suffix>`.
//! The suffix depends on the kind of file wanted (see [`FileKind`]).

use std::fs;
use std::io;
use std::path::PathBuf;

use log::{debug, trace};

use crate::format::{self, ImageFormat, ScriptLine};
use crate::FileError;

/// The kinds of file a design may be made of.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FileKind {
    /// Streaming device firmware boot image
    FirmwareHex,
    /// Streaming device user configuration boot image
    UserConfigHex,
    /// Streaming device ROM patch boot image; not every design has one
    PatchRomHex,
    /// Image-store device runtime register script
    RuntimeScript,
    /// Image-store device EEPROM image, as hex text
    EepromText,
    /// Image-store device EEPROM image, as raw bytes with an identifier head
    EepromBinary,
}

impl FileKind {
    pub fn suffix(&self) -> &'static str {
        match self {
            FileKind::FirmwareHex => "-prod_fw.boot.hex.txt",
            FileKind::UserConfigHex => "-user_config.boot.hex.txt",
            FileKind::PatchRomHex => "-patch_rom.boot.hex.txt",
            FileKind::RuntimeScript => ".csv",
            FileKind::EepromText => ".eeprom.py",
            FileKind::EepromBinary => ".eeprom.bin",
        }
    }

    pub fn file_name(&self, design: &str) -> String {
        format!("{design}{}", self.suffix())
    }
}

/// Which directory a file was found in.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Source {
    Default,
    Custom,
}

/// A design file that exists on disk, not yet read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CandidateFile {
    pub design: String,
    pub kind: FileKind,
    pub source: Source,
    pub path: PathBuf,
}

/// The contents of a design image, ready to compare against or write to a
/// device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Candidate {
    pub design: String,
    pub source: Source,
    pub path: PathBuf,
    pub bytes: Vec<u8>,
}

impl CandidateFile {
    fn read(&self) -> Result<Vec<u8>, FileError> {
        trace!("reading {}", self.path.display());
        fs::read(&self.path).map_err(|e| FileError::io(&self.path, e))
    }

    fn read_text(&self) -> Result<String, FileError> {
        trace!("reading {}", self.path.display());
        fs::read_to_string(&self.path).map_err(|e| FileError::io(&self.path, e))
    }

    fn malformed(&self, error: format::FormatError) -> FileError {
        FileError::Malformed {
            path: self.path.clone(),
            error,
        }
    }

    /// Reads a hex text file (a streaming device boot image).
    pub fn load_hex(&self) -> Result<Vec<u8>, FileError> {
        let text = self.read_text()?;
        format::parse_hex_bytes(&text).map_err(|e| self.malformed(e))
    }

    /// Reads a register script.
    pub fn load_script(&self) -> Result<Vec<ScriptLine>, FileError> {
        let text = self.read_text()?;
        format::parse_script(&text).map_err(|e| self.malformed(e))
    }

    /// Reads an EEPROM image, validating it against `format`.
    pub fn load_image(
        &self,
        format: &ImageFormat,
    ) -> Result<Candidate, FileError> {
        let contents = self.read()?;
        let bytes = format.parse(&contents).map_err(|e| self.malformed(e))?;

        Ok(Candidate {
            design: self.design.clone(),
            source: self.source,
            path: self.path.clone(),
            bytes,
        })
    }
}

/// The boot image files backing one streaming device design.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BootFiles {
    pub firmware: CandidateFile,
    pub user_config: CandidateFile,
    pub patch_rom: Option<CandidateFile>,
}

impl BootFiles {
    /// The files in the order they must be streamed to the device.
    pub fn files(&self) -> impl Iterator<Item = &CandidateFile> {
        [Some(&self.firmware), Some(&self.user_config), self.patch_rom.as_ref()]
            .into_iter()
            .flatten()
    }

    /// Reads every file, concatenated in streaming order.
    pub fn load(&self) -> Result<Vec<u8>, FileError> {
        let mut payload = vec![];
        for file in self.files() {
            payload.extend(file.load_hex()?);
        }
        Ok(payload)
    }
}

#[derive(Clone, Debug)]
pub struct CandidateStore {
    default_dir: PathBuf,
    custom_dir: PathBuf,
}

impl CandidateStore {
    pub fn new(
        default_dir: impl Into<PathBuf>,
        custom_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            default_dir: default_dir.into(),
            custom_dir: custom_dir.into(),
        }
    }

    pub fn default_dir(&self, chip: &str) -> PathBuf {
        self.default_dir.join(chip)
    }

    fn lookup(
        &self,
        chip: &str,
        design: &str,
        kind: FileKind,
    ) -> Option<CandidateFile> {
        let name = kind.file_name(design);

        [
            (Source::Default, self.default_dir(chip).join(&name)),
            (Source::Custom, self.custom_dir.join(&name)),
        ]
        .into_iter()
        .find(|(_, path)| {
            trace!("looking for {}", path.display());
            path.exists()
        })
        .map(|(source, path)| CandidateFile {
            design: design.to_string(),
            kind,
            source,
            path,
        })
    }

    ///
    /// Finds the file of the given kind for `design`: the vendor default
    /// directory wins, and the custom directory is only consulted when the
    /// default directory does not have it.
    ///
    pub fn resolve(
        &self,
        chip: &str,
        design: &str,
        kind: FileKind,
    ) -> Result<CandidateFile, FileError> {
        let file = self.lookup(chip, design, kind).ok_or_else(|| {
            FileError::NotFound {
                design: design.to_string(),
                missing: vec![kind.file_name(design)],
            }
        })?;

        debug!("{design}: using {}", file.path.display());
        Ok(file)
    }

    ///
    /// Finds the boot image files for a streaming device design.  The
    /// firmware and user configuration images are required; the ROM patch
    /// is optional.  If either required file is missing, the error names
    /// every missing required file.
    ///
    pub fn resolve_boot_files(
        &self,
        chip: &str,
        design: &str,
    ) -> Result<BootFiles, FileError> {
        let firmware = self.lookup(chip, design, FileKind::FirmwareHex);
        let user_config = self.lookup(chip, design, FileKind::UserConfigHex);
        let patch_rom = self.lookup(chip, design, FileKind::PatchRomHex);

        match (firmware, user_config) {
            (Some(firmware), Some(user_config)) => {
                if patch_rom.is_none() {
                    debug!("{design}: no ROM patch image");
                }
                Ok(BootFiles {
                    firmware,
                    user_config,
                    patch_rom,
                })
            }
            (firmware, user_config) => {
                let missing = [
                    (firmware.is_none(), FileKind::FirmwareHex),
                    (user_config.is_none(), FileKind::UserConfigHex),
                ]
                .into_iter()
                .filter(|(missing, _)| *missing)
                .map(|(_, kind)| kind.file_name(design))
                .collect();

                Err(FileError::NotFound {
                    design: design.to_string(),
                    missing,
                })
            }
        }
    }

    ///
    /// Lists every file of the given kind: the vendor default directory for
    /// `chip` first, then the custom directory.  Within a directory, files
    /// are ordered by name.  A directory that does not exist contributes
    /// nothing.
    ///
    pub fn enumerate(
        &self,
        chip: &str,
        kind: FileKind,
    ) -> Result<Vec<CandidateFile>, FileError> {
        let mut out = vec![];

        for (source, dir) in [
            (Source::Default, self.default_dir(chip)),
            (Source::Custom, self.custom_dir.clone()),
        ] {
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!("{} does not exist", dir.display());
                    continue;
                }
                Err(e) => return Err(FileError::io(&dir, e)),
            };

            let mut found = vec![];
            for entry in entries {
                let entry = entry.map_err(|e| FileError::io(&dir, e))?;
                let name = entry.file_name();
                let Some(name) = name.to_str() else {
                    continue;
                };
                let Some(design) = name.strip_suffix(kind.suffix()) else {
                    continue;
                };
                if design.is_empty() {
                    continue;
                }

                found.push(CandidateFile {
                    design: design.to_string(),
                    kind,
                    source,
                    path: entry.path(),
                });
            }

            found.sort_by(|a, b| a.path.cmp(&b.path));
            out.extend(found);
        }

        Ok(out)
    }

    ///
    /// Lists the names of designs that have a file of the given kind, in
    /// the order [`enumerate`](Self::enumerate) finds them, without
    /// duplicates.
    ///
    pub fn designs(
        &self,
        chip: &str,
        kind: FileKind,
    ) -> Result<Vec<String>, FileError> {
        let mut out: Vec<String> = vec![];
        for file in self.enumerate(chip, kind)? {
            if !out.contains(&file.design) {
                out.push(file.design);
            }
        }
        Ok(out)
    }
}
