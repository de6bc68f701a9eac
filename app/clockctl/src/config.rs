// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Board description: where the design files live and which clocks exist

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clock_files::{CandidateStore, ImageFormat, ImageId, MarkerStore};
use drv_clockgen::eeprom::Coverage;
use drv_clockgen::ops::{self, Clock, ImageStoreClock, StreamingClock};
use drv_clockgen::si5518::Commands;
use drv_clockgen::Timing;
use indexmap::IndexMap;
use serde::Deserialize;

const MARKER_DIR: &str = "/usr/share/system-controller-app/.sc_app/vendor_clock";
const DEFAULT_DIR: &str = "/usr/share/system-controller-app/BIT/clock_files";
const CUSTOM_DIR: &str = "/data/clock_files";

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct BoardConfig {
    /// Board name; streaming clocks running a design whose identifier
    /// contains it report their default design
    pub board: String,
    #[serde(default = "BoardConfig::default_marker_dir")]
    pub marker_dir: PathBuf,
    /// Vendor designs, one subdirectory per chip
    #[serde(default = "BoardConfig::default_default_dir")]
    pub default_dir: PathBuf,
    /// User designs, all chips together
    #[serde(default = "BoardConfig::default_custom_dir")]
    pub custom_dir: PathBuf,
    #[serde(default)]
    pub timing: TimingConfig,
    /// Clocks by name, in the order they are listed
    pub clocks: IndexMap<String, ClockConfig>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct TimingConfig {
    pub poll_attempts: Option<u32>,
    pub poll_interval_ms: Option<u64>,
    pub settle_ms: Option<u64>,
    /// Delay for `sleep` lines in runtime scripts; they are skipped if unset
    pub script_delay_ms: Option<u64>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Protocol {
    Streaming,
    ImageStore,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EepromFormat {
    #[default]
    Text,
    Binary,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompareCoverage {
    #[default]
    Legacy,
    Full,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ClockConfig {
    /// Part name; also names the vendor design subdirectory
    pub chip: String,
    pub protocol: Protocol,
    /// Linux I2C bus number
    pub bus: u8,
    /// Command register (streaming) or runtime register (image-store)
    /// address
    pub address: u8,
    pub default_design: String,

    /// Boot EEPROM address; image-store only
    pub eeprom_address: Option<u8>,
    #[serde(default)]
    pub eeprom_format: EepromFormat,
    /// Expected head of binary EEPROM images
    pub eeprom_id: Option<ImageId>,
    #[serde(default)]
    pub coverage: CompareCoverage,
}

impl BoardConfig {
    fn default_marker_dir() -> PathBuf {
        MARKER_DIR.into()
    }

    fn default_default_dir() -> PathBuf {
        DEFAULT_DIR.into()
    }

    fn default_custom_dir() -> PathBuf {
        CUSTOM_DIR.into()
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("could not read {}", path.display()))?;
        Self::parse(&text)
            .with_context(|| format!("invalid board file {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        let config: BoardConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        // (bus, address) -> clock claiming it
        let mut claimed: BTreeMap<(u8, u8), &str> = BTreeMap::new();

        for (name, clock) in &self.clocks {
            let mut addresses = vec![clock.address];

            match (clock.protocol, clock.eeprom_address) {
                (Protocol::ImageStore, Some(eeprom)) => addresses.push(eeprom),
                (Protocol::ImageStore, None) => bail!(
                    "clock {name}: image-store clocks need eeprom-address"
                ),
                (Protocol::Streaming, Some(_)) => {
                    bail!("clock {name}: streaming clocks have no EEPROM")
                }
                (Protocol::Streaming, None) => (),
            }

            if clock.protocol == Protocol::ImageStore
                && clock.eeprom_format == EepromFormat::Binary
                && clock.eeprom_id.is_none()
            {
                bail!("clock {name}: binary EEPROM images need eeprom-id");
            }

            for address in addresses {
                drv_i2c_api::validate_address(address).with_context(|| {
                    format!("clock {name}: bad address {address:#x}")
                })?;

                let key = (clock.bus, address);
                if let Some(other) = claimed.insert(key, name.as_str()) {
                    bail!(
                        "clocks {other} and {name} both use address \
                        {address:#x} on bus {}",
                        clock.bus
                    );
                }
            }
        }

        Ok(())
    }

    pub fn timing(&self) -> Timing {
        let t = &self.timing;
        let default = Timing::default();

        Timing {
            poll_attempts: t.poll_attempts.unwrap_or(default.poll_attempts),
            poll_interval: t
                .poll_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(default.poll_interval),
            settle: t
                .settle_ms
                .map(Duration::from_millis)
                .unwrap_or(default.settle),
            script_delay: t.script_delay_ms.map(Duration::from_millis),
        }
    }

    pub fn context(&self) -> ops::Context {
        ops::Context {
            board: self.board.clone(),
            store: CandidateStore::new(&self.default_dir, &self.custom_dir),
            markers: MarkerStore::new(&self.marker_dir),
            timing: self.timing(),
        }
    }

    /// Looks up a clock by name, returning its bus and its driver.
    pub fn clock(&self, name: &str) -> Result<(u8, Clock)> {
        let Some(config) = self.clocks.get(name) else {
            let known: Vec<&str> =
                self.clocks.keys().map(String::as_str).collect();
            bail!(
                "no clock named '{name}' on this board (known: {})",
                known.join(", ")
            );
        };

        Ok((config.bus, config.build(name)))
    }
}

impl ClockConfig {
    /// Builds the driver for an already-validated clock.
    fn build(&self, name: &str) -> Clock {
        match self.protocol {
            Protocol::Streaming => Clock::Streaming(StreamingClock {
                name: name.to_string(),
                chip: self.chip.clone(),
                address: self.address,
                default_design: self.default_design.clone(),
                commands: Commands::SI5518,
            }),
            Protocol::ImageStore => {
                let format = match (self.eeprom_format, self.eeprom_id) {
                    (EepromFormat::Binary, Some(id)) => {
                        ImageFormat::Binary { id }
                    }
                    _ => ImageFormat::HexText,
                };
                let coverage = match self.coverage {
                    CompareCoverage::Legacy => Coverage::Legacy,
                    CompareCoverage::Full => Coverage::Full,
                };

                Clock::ImageStore(ImageStoreClock {
                    name: name.to_string(),
                    chip: self.chip.clone(),
                    address: self.address,
                    eeprom_address: self.eeprom_address.unwrap_or_default(),
                    default_design: self.default_design.clone(),
                    format,
                    coverage,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    const BOARD: &str = indoc! {r#"
        board = "VEK385"

        [timing]
        poll-interval-ms = 5
        script-delay-ms = 20

        [clocks.Si5518]
        chip = "SI5518"
        protocol = "streaming"
        bus = 11
        address = 0x6c
        default-design = "VEK385_DEFAULT"

        [clocks.8A34001]
        chip = "SIT95211"
        protocol = "image-store"
        bus = 11
        address = 0x68
        eeprom-address = 0x57
        default-design = "SIT95211_DEFAULT"
        coverage = "full"
    "#};

    #[test]
    fn parses_a_board() {
        let config = BoardConfig::parse(BOARD).unwrap();
        assert_eq!(config.board, "VEK385");
        assert_eq!(config.marker_dir, PathBuf::from(MARKER_DIR));
        assert_eq!(config.custom_dir, PathBuf::from(CUSTOM_DIR));
        assert_eq!(
            config.clocks.keys().collect::<Vec<_>>(),
            vec!["Si5518", "8A34001"]
        );

        let timing = config.timing();
        assert_eq!(timing.poll_attempts, 50);
        assert_eq!(timing.poll_interval, Duration::from_millis(5));
        assert_eq!(timing.settle, Duration::from_millis(10));
        assert_eq!(timing.script_delay, Some(Duration::from_millis(20)));
    }

    #[test]
    fn example_board_is_valid() {
        let config =
            BoardConfig::parse(include_str!("../board.toml")).unwrap();
        assert_eq!(config.clocks.len(), 2);
        assert_eq!(config.timing(), Timing::default());
    }

    #[test]
    fn builds_drivers() {
        let config = BoardConfig::parse(BOARD).unwrap();

        let (bus, clock) = config.clock("Si5518").unwrap();
        assert_eq!(bus, 11);
        assert!(matches!(clock, Clock::Streaming(ref c) if c.address == 0x6c));

        let (_, clock) = config.clock("8A34001").unwrap();
        match clock {
            Clock::ImageStore(c) => {
                assert_eq!(c.eeprom_address, 0x57);
                assert_eq!(c.format, ImageFormat::HexText);
                assert_eq!(c.coverage, Coverage::Full);
            }
            other => panic!("unexpected {other:?}"),
        }

        let err = config.clock("nope").unwrap_err().to_string();
        assert!(err.contains("Si5518, 8A34001"), "{err}");
    }

    #[test]
    fn binary_images_carry_their_id() {
        let config = BoardConfig::parse(indoc! {r#"
            board = "X"
            [clocks.c]
            chip = "SIT95211"
            protocol = "image-store"
            bus = 1
            address = 0x68
            eeprom-address = 0x50
            default-design = "D"
            eeprom-format = "binary"
            [clocks.c.eeprom-id]
            size = 0x10
            device-id = 0x95
            config-word = 0
            page-id = 1
        "#})
        .unwrap();

        let (_, clock) = config.clock("c").unwrap();
        let Clock::ImageStore(c) = clock else {
            panic!("wrong kind of clock");
        };
        assert_eq!(
            c.format,
            ImageFormat::Binary {
                id: ImageId {
                    size: 0x10,
                    device_id: 0x95,
                    config_word: 0,
                    page_id: 1,
                }
            }
        );
    }

    fn rejects(text: &str, why: &str) {
        let err = format!("{:#}", BoardConfig::parse(text).unwrap_err());
        assert!(err.contains(why), "{err}");
    }

    #[test]
    fn rejects_bad_boards() {
        let clock = |extra: &str| {
            format!(
                "board = \"X\"\n[clocks.c]\nchip = \"SIT95211\"\n\
                protocol = \"image-store\"\nbus = 1\ndefault-design = \"D\"\n\
                {extra}"
            )
        };

        rejects(&clock("address = 0x68\n"), "need eeprom-address");
        rejects(
            &clock(
                "address = 0x68\neeprom-address = 0x57\n\
                eeprom-format = \"binary\"\n",
            ),
            "need eeprom-id",
        );
        rejects(&clock("address = 0x80\neeprom-address = 0x57\n"), "0x80");
        rejects(&clock("address = 0x00\neeprom-address = 0x57\n"), "0x0");
        rejects(&clock("address = 0x57\neeprom-address = 0x57\n"), "both use");
        rejects(&clock("address = 0x68\nbogus = 1\n"), "bogus");
    }

    #[test]
    fn rejects_shared_addresses_across_clocks() {
        rejects(
            indoc! {r#"
                board = "X"
                [clocks.a]
                chip = "SI5518"
                protocol = "streaming"
                bus = 3
                address = 0x6c
                default-design = "A"
                [clocks.b]
                chip = "SI5518"
                protocol = "streaming"
                bus = 3
                address = 0x6c
                default-design = "B"
            "#},
            "clocks a and b both use address 0x6c on bus 3",
        );
    }

    #[test]
    fn same_address_on_different_buses_is_fine() {
        BoardConfig::parse(indoc! {r#"
            board = "X"
            [clocks.a]
            chip = "SI5518"
            protocol = "streaming"
            bus = 3
            address = 0x6c
            default-design = "A"
            [clocks.b]
            chip = "SI5518"
            protocol = "streaming"
            bus = 4
            address = 0x6c
            default-design = "B"
        "#})
        .unwrap();
    }

    #[test]
    fn from_file_names_the_bad_file() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("board.toml");
        std::fs::write(&good, BOARD).unwrap();
        let config = BoardConfig::from_file(&good).unwrap();
        assert_eq!(config.board, "VEK385");

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "board = \"X\"\nwidgets = 3\n").unwrap();
        let err = BoardConfig::from_file(&bad).unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("invalid board file {}", bad.display())
        );

        let missing = dir.path().join("missing.toml");
        let err = BoardConfig::from_file(&missing).unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("could not read {}", missing.display())
        );
    }
}
