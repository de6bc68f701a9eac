// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Clock design file formats
//!
//! Three formats are in use:
//!
//! - *Hex text*: one value per line in ASCII hex, with an optional `0x`
//!   prefix.  A line usually carries a single byte; longer lines carry an
//!   even number of digits and contribute one byte per digit pair.  Boot
//!   images for streaming devices and text EEPROM images use this format.
//! - *Register scripts*: one `offset,value` pair of hex bytes per line.  A
//!   line starting with `sleep` is a delay marker.
//! - *Binary EEPROM images*: raw bytes, headed by a 4-byte [`ImageId`] that
//!   names the part the image was built for.

use std::fmt;

use serde::Deserialize;
use zerocopy::FromBytes as _;
use zerocopy_derive::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::store::FileKind;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FormatError {
    /// The file is not ASCII text
    NotText,
    /// A line of a hex text file is not valid hex
    BadHex { line: usize },
    /// A line of a register script is not an `offset,value` pair
    BadScriptLine { line: usize },
    /// The file holds no data at all
    Empty,
    /// A binary image is too short to carry its identifier
    Truncated { len: usize },
    /// A binary image was built for a different part
    IdMismatch { expected: ImageId, found: ImageId },
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatError::NotText => write!(f, "not a text file"),
            FormatError::BadHex { line } => {
                write!(f, "invalid hex value on line {line}")
            }
            FormatError::BadScriptLine { line } => {
                write!(f, "invalid offset,value pair on line {line}")
            }
            FormatError::Empty => write!(f, "file is empty"),
            FormatError::Truncated { len } => {
                write!(f, "image of {len} bytes is too short for its header")
            }
            FormatError::IdMismatch { expected, found } => write!(
                f,
                "image is for {found}, but this device expects {expected}"
            ),
        }
    }
}

/// The identifier at the head of a binary EEPROM image.
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    PartialEq,
    Eq,
    FromBytes,
    IntoBytes,
    Immutable,
    KnownLayout,
    Unaligned,
    Deserialize,
)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
#[repr(C)]
pub struct ImageId {
    pub size: u8,
    pub device_id: u8,
    pub config_word: u8,
    pub page_id: u8,
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "size {:#04x} device {:#04x} config {:#04x} page {:#04x}",
            self.size, self.device_id, self.config_word, self.page_id
        )
    }
}

/// How an image-store device's EEPROM images are stored on disk.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ImageFormat {
    HexText,
    Binary { id: ImageId },
}

impl ImageFormat {
    pub fn kind(&self) -> FileKind {
        match self {
            ImageFormat::HexText => FileKind::EepromText,
            ImageFormat::Binary { .. } => FileKind::EepromBinary,
        }
    }

    pub fn parse(&self, contents: &[u8]) -> Result<Vec<u8>, FormatError> {
        match self {
            ImageFormat::HexText => {
                let text = std::str::from_utf8(contents)
                    .map_err(|_| FormatError::NotText)?;
                parse_hex_bytes(text)
            }
            ImageFormat::Binary { id } => parse_binary_image(contents, id),
        }
    }
}

/// One line of a register script.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ScriptLine {
    Write { offset: u8, value: u8 },
    Delay,
}

const DELAY_TOKEN: &str = "sleep";

fn strip_hex_prefix(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

fn parse_hex_u8(s: &str) -> Option<u8> {
    let digits = strip_hex_prefix(s.trim());
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u8::from_str_radix(digits, 16).ok()
}

pub fn parse_hex_bytes(text: &str) -> Result<Vec<u8>, FormatError> {
    let mut out = vec![];

    for (n, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let bad = FormatError::BadHex { line: n + 1 };
        let digits = strip_hex_prefix(line);

        if digits.len() <= 2 {
            out.push(parse_hex_u8(digits).ok_or(bad)?);
            continue;
        }

        if digits.len() % 2 != 0
            || !digits.bytes().all(|b| b.is_ascii_hexdigit())
        {
            return Err(bad);
        }

        // All ASCII by now, so slicing on byte boundaries is safe.
        for i in (0..digits.len()).step_by(2) {
            out.push(parse_hex_u8(&digits[i..i + 2]).ok_or(bad)?);
        }
    }

    if out.is_empty() {
        return Err(FormatError::Empty);
    }

    Ok(out)
}

pub fn parse_script(text: &str) -> Result<Vec<ScriptLine>, FormatError> {
    let mut out = vec![];

    for (n, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if line.starts_with(DELAY_TOKEN) {
            out.push(ScriptLine::Delay);
            continue;
        }

        let bad = FormatError::BadScriptLine { line: n + 1 };
        let (offset, value) = line.split_once(',').ok_or(bad)?;
        if value.contains(',') {
            return Err(bad);
        }

        out.push(ScriptLine::Write {
            offset: parse_hex_u8(offset).ok_or(bad)?,
            value: parse_hex_u8(value).ok_or(bad)?,
        });
    }

    if out.is_empty() {
        return Err(FormatError::Empty);
    }

    Ok(out)
}

///
/// Checks the identifier at the head of a binary EEPROM image against the
/// one the target device expects.  On success, returns the whole image
/// (identifier included; it is part of what lands in the EEPROM).
///
pub fn parse_binary_image(
    contents: &[u8],
    expected: &ImageId,
) -> Result<Vec<u8>, FormatError> {
    if contents.is_empty() {
        return Err(FormatError::Empty);
    }

    let (found, _) = ImageId::read_from_prefix(contents).map_err(|_| {
        FormatError::Truncated {
            len: contents.len(),
        }
    })?;

    if found != *expected {
        return Err(FormatError::IdMismatch {
            expected: *expected,
            found,
        });
    }

    Ok(contents.to_vec())
}
