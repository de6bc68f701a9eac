// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Working out which design an image-store clock generator is running
//!
//! These parts cannot report their design, so we check, in order:
//!
//! 1. the marker left by the last runtime change (no bus access at all);
//! 2. whether the EEPROM is blank, in which case the part runs its factory
//!    default;
//! 3. each known EEPROM image, vendor defaults first, taking the first one
//!    that matches the EEPROM contents.
//!
//! A candidate image that cannot be parsed, or that is larger than the
//! EEPROM, is logged and skipped rather than failing the whole search.
//! Images built for other revisions of a part may share a directory, and
//! one bad file must not hide a later match.

use std::fmt;
use std::path::PathBuf;

use clock_files::{CandidateStore, FileError, ImageFormat, MarkerStore, Source};
use drv_i2c_api::I2cBus;
use log::{debug, info, warn};

use crate::eeprom::{Coverage, Eeprom, CAPACITY};
use crate::ClockError;

/// How a design was identified.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Evidence {
    Marker,
    Blank,
    Image { source: Source, path: PathBuf },
}

impl fmt::Display for Evidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Evidence::Marker => write!(f, "marker"),
            Evidence::Blank => write!(f, "blank EEPROM"),
            Evidence::Image { path, .. } => {
                write!(f, "EEPROM matches {}", path.display())
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identified {
    pub design: String,
    pub evidence: Evidence,
}

/// What we know about the clock being identified.
pub struct Discovery<'a> {
    pub clock: &'a str,
    pub chip: &'a str,
    pub default_design: &'a str,
    pub format: &'a ImageFormat,
    pub coverage: Coverage,
}

impl Discovery<'_> {
    pub fn run<B: I2cBus + ?Sized>(
        &self,
        markers: &MarkerStore,
        store: &CandidateStore,
        eeprom: &mut Eeprom<'_, B>,
    ) -> Result<Identified, ClockError> {
        if let Some(design) = markers.read(self.clock)? {
            debug!("{}: marker says {design}", self.clock);
            return Ok(Identified {
                design,
                evidence: Evidence::Marker,
            });
        }

        if eeprom.is_blank(self.coverage)? {
            info!("{}: EEPROM is blank", self.clock);
            return Ok(Identified {
                design: self.default_design.to_string(),
                evidence: Evidence::Blank,
            });
        }

        for file in store.enumerate(self.chip, self.format.kind())? {
            let candidate = match file.load_image(self.format) {
                Ok(candidate) => candidate,
                Err(FileError::Malformed { path, error }) => {
                    warn!("skipping {}: {error}", path.display());
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            if candidate.bytes.len() > CAPACITY {
                warn!(
                    "skipping {}: {} bytes will not fit the EEPROM",
                    candidate.path.display(),
                    candidate.bytes.len()
                );
                continue;
            }

            debug!("{}: comparing against {}", self.clock, file.design);
            if eeprom.matches(&candidate.bytes, self.coverage)? {
                return Ok(Identified {
                    design: candidate.design,
                    evidence: Evidence::Image {
                        source: candidate.source,
                        path: candidate.path,
                    },
                });
            }
        }

        Err(ClockError::UnidentifiedConfiguration {
            clock: self.clock.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimBus, SimDevice, SimEeprom};
    use crate::Timing;
    use drv_i2c_api::I2cDevice;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    const EEPROM: u8 = 0x57;
    const CHIP: &str = "SIT95211";

    struct Fixture {
        _root: TempDir,
        store: CandidateStore,
        markers: MarkerStore,
        default: PathBuf,
        custom: PathBuf,
    }

    fn fixture() -> Fixture {
        let root = tempfile::tempdir().unwrap();
        let default = root.path().join("clock_files").join(CHIP);
        let custom = root.path().join("custom");
        fs::create_dir_all(&default).unwrap();
        fs::create_dir_all(&custom).unwrap();

        Fixture {
            store: CandidateStore::new(
                root.path().join("clock_files"),
                &custom,
            ),
            markers: MarkerStore::new(root.path().join("markers")),
            default,
            custom,
            _root: root,
        }
    }

    fn image(seed: u8, len: usize) -> Vec<u8> {
        (0..len).map(|i| seed.wrapping_add(i as u8)).collect()
    }

    fn write_image(dir: &Path, design: &str, bytes: &[u8]) {
        let text: String =
            bytes.iter().map(|b| format!("0x{b:02x}\n")).collect();
        fs::write(dir.join(format!("{design}.eeprom.py")), text).unwrap();
    }

    fn discovery() -> Discovery<'static> {
        Discovery {
            clock: "8A34001",
            chip: CHIP,
            default_design: "FACTORY",
            format: &ImageFormat::HexText,
            coverage: Coverage::Legacy,
        }
    }

    fn run(f: &Fixture, bus: &mut SimBus) -> Result<Identified, ClockError> {
        let timing = Timing::default();
        let mut eeprom = Eeprom::new(I2cDevice::new(bus, EEPROM), &timing);
        discovery().run(&f.markers, &f.store, &mut eeprom)
    }

    #[test]
    fn marker_wins_without_touching_the_bus() {
        let f = fixture();
        f.markers.record("8A34001", "CUSTOM7").unwrap();

        let mut bus = SimBus::new();
        bus.dead = true;

        let found = run(&f, &mut bus).unwrap();
        assert_eq!(found.design, "CUSTOM7");
        assert_eq!(found.evidence, Evidence::Marker);
        assert!(bus.ops.is_empty());
    }

    #[test]
    fn blank_eeprom_is_the_default_design() {
        let f = fixture();
        write_image(&f.default, "A", &[0xff; 300]);
        write_image(&f.custom, "B", &image(1, 300));

        let mut bus =
            SimBus::new().with(EEPROM, SimDevice::Eeprom(SimEeprom::blank()));
        let found = run(&f, &mut bus).unwrap();
        assert_eq!(found.design, "FACTORY");
        assert_eq!(found.evidence, Evidence::Blank);
    }

    #[test]
    fn first_matching_candidate_wins_default_dir_first() {
        let f = fixture();
        let img = image(9, 200);
        write_image(&f.default, "B", &image(3, 200));
        write_image(&f.default, "C", &img);
        write_image(&f.custom, "A", &img);

        let mut bus = SimBus::new()
            .with(EEPROM, SimDevice::Eeprom(SimEeprom::with_contents(&img)));
        let found = run(&f, &mut bus).unwrap();
        assert_eq!(found.design, "C");
        assert_eq!(
            found.evidence,
            Evidence::Image {
                source: Source::Default,
                path: f.default.join("C.eeprom.py"),
            }
        );
    }

    #[test]
    fn custom_candidates_are_searched_too() {
        let f = fixture();
        let img = image(42, 128);
        write_image(&f.default, "A", &image(1, 128));
        write_image(&f.custom, "MINE", &img);

        let mut bus = SimBus::new()
            .with(EEPROM, SimDevice::Eeprom(SimEeprom::with_contents(&img)));
        let found = run(&f, &mut bus).unwrap();
        assert_eq!(found.design, "MINE");
    }

    #[test]
    fn malformed_candidates_are_skipped() {
        let f = fixture();
        let img = image(42, 128);
        fs::write(f.default.join("A.eeprom.py"), "not hex\n").unwrap();
        write_image(&f.default, "B", &img);

        let mut bus = SimBus::new()
            .with(EEPROM, SimDevice::Eeprom(SimEeprom::with_contents(&img)));
        assert_eq!(run(&f, &mut bus).unwrap().design, "B");
    }

    #[test]
    fn oversized_candidates_are_skipped() {
        let f = fixture();
        let img = image(42, 128);
        write_image(&f.default, "A", &image(42, CAPACITY + 32));
        write_image(&f.default, "B", &img);

        let mut bus = SimBus::new()
            .with(EEPROM, SimDevice::Eeprom(SimEeprom::with_contents(&img)));
        assert_eq!(run(&f, &mut bus).unwrap().design, "B");
    }

    #[test]
    fn nothing_matches() {
        let f = fixture();
        write_image(&f.default, "A", &image(1, 128));

        let mut bus = SimBus::new().with(
            EEPROM,
            SimDevice::Eeprom(SimEeprom::with_contents(&image(2, 128))),
        );
        match run(&f, &mut bus) {
            Err(ClockError::UnidentifiedConfiguration { clock }) => {
                assert_eq!(clock, "8A34001")
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
