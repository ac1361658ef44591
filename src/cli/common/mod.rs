// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Common arguments for command-line interfaces. e.g. the `convert` and
//! `discover` subcommands both look for subband files, so the same search and
//! configuration arguments are shared between them.

mod printers;
#[cfg(test)]
mod tests;

pub(super) use printers::InfoPrinter;
pub(crate) use printers::{display_warnings, Warn};

use std::{path::PathBuf, str::FromStr};

use clap::Parser;
use itertools::Itertools;
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};

use super::SubbandConvertError;
use crate::{
    config::{default_subband_codes, ArrayPosition, ConversionConfig, FreqOrder},
    constants::{OVRO_HEIGHT_M, OVRO_LAT_DEG, OVRO_LONG_DEG},
    discovery::TimeWindow,
    phase_centre::PhaseCentreMode,
};

lazy_static::lazy_static! {
    pub(super) static ref ARG_FILE_TYPES_COMMA_SEPARATED: String = ArgFileTypes::iter().join(", ");

    pub(super) static ref ARG_FILE_HELP: String =
        format!("All arguments may be specified in a file. Any CLI arguments override arguments set in the file. Supported formats: {}", *ARG_FILE_TYPES_COMMA_SEPARATED);

    pub(super) static ref ARRAY_POSITION_HELP: String =
        format!("The Earth longitude, latitude, and height of the instrumental array [degrees, degrees, meters]. Default (OVRO): ({:.4}°, {:.4}°, {OVRO_HEIGHT_M}m)", *OVRO_LONG_DEG, *OVRO_LAT_DEG);

    static ref FREQ_ORDER_HELP: String =
        format!("How subband numbers relate to frequency. Valid values: {}. Default: {}", FreqOrder::iter().join(", "), FreqOrder::Descending);

    static ref PHASE_CENTRE_MODE_HELP: String =
        format!("How many phase centres each group gets. Valid values: {}. Default: {}", PhaseCentreMode::iter().join(", "), PhaseCentreMode::Shared);
}

#[derive(Debug, Display, EnumIter, EnumString)]
pub(super) enum ArgFileTypes {
    #[strum(serialize = "toml")]
    Toml,
    #[strum(serialize = "json")]
    Json,
}

macro_rules! unpack_arg_file {
    ($arg_file:expr) => ({
        use std::{fs::File, io::Read, str::FromStr};

        use crate::cli::common::{ArgFileTypes, ARG_FILE_TYPES_COMMA_SEPARATED};

        debug!("Attempting to parse argument file {}", $arg_file.display());

        let mut contents = String::new();
        let arg_file_type = $arg_file
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .and_then(|e| ArgFileTypes::from_str(&e).ok());

        match arg_file_type {
            Some(ArgFileTypes::Toml) => {
                debug!("Parsing toml file...");
                let mut fh = File::open(&$arg_file)?;
                fh.read_to_string(&mut contents)?;
                match toml::from_str(&contents) {
                    Ok(p) => p,
                    Err(err) => {
                        return Err(SubbandConvertError::ArgFile(format!(
                            "Couldn't decode toml structure from {:?}:\n{err}",
                            $arg_file
                        )))
                    }
                }
            }
            Some(ArgFileTypes::Json) => {
                debug!("Parsing json file...");
                let mut fh = File::open(&$arg_file)?;
                fh.read_to_string(&mut contents)?;
                match serde_json::from_str(&contents) {
                    Ok(p) => p,
                    Err(err) => {
                        return Err(SubbandConvertError::ArgFile(format!(
                            "Couldn't decode json structure from {:?}:\n{err}",
                            $arg_file
                        )))
                    }
                }
            }

            _ => {
                return Err(SubbandConvertError::ArgFile(format!(
                    "Argument file '{:?}' doesn't have a recognised file extension! Valid extensions are: {}", $arg_file, *ARG_FILE_TYPES_COMMA_SEPARATED)
                ))
            }
        }
    });
}

/// Where to look for subband files, and when.
#[derive(Parser, Debug, Clone, Default, Serialize, Deserialize)]
pub(super) struct SearchArgs {
    /// The directory containing raw subband files. It is not searched
    /// recursively.
    #[clap(short = 'i', long, parse(from_os_str), help_heading = "INPUT DATA")]
    pub(super) input_dir: Option<PathBuf>,

    /// Only consider files stamped at or after this UTC time
    /// (YYYY-MM-DDTHH:MM:SS[.fff]).
    #[clap(long, help_heading = "INPUT DATA")]
    pub(super) start: Option<String>,

    /// Only consider files stamped at or before this UTC time
    /// (YYYY-MM-DDTHH:MM:SS[.fff]).
    #[clap(long, help_heading = "INPUT DATA")]
    pub(super) end: Option<String>,
}

impl SearchArgs {
    pub(super) fn merge(self, other: Self) -> Self {
        SearchArgs {
            input_dir: self.input_dir.or(other.input_dir),
            start: self.start.or(other.start),
            end: self.end.or(other.end),
        }
    }

    pub(super) fn parse(self) -> Result<(PathBuf, TimeWindow), SubbandConvertError> {
        let input_dir = self.input_dir.ok_or_else(|| {
            SubbandConvertError::Discovery("No input directory was specified".to_string())
        })?;
        let window = TimeWindow::parse(self.start.as_deref(), self.end.as_deref())?;
        Ok((input_dir, window))
    }
}

/// Overrides of the conversion configuration. Anything not given keeps its
/// default.
#[derive(Parser, Debug, Clone, Default, Serialize, Deserialize)]
pub(super) struct ConversionArgs {
    /// The subband codes that make a complete group, e.g. sb00 sb01. The
    /// default is sb00 to sb15.
    #[clap(long, multiple_values(true), help_heading = "GROUPING")]
    pub(super) subband_codes: Option<Vec<String>>,

    /// Use the canonical codes sb00 onwards for this many subbands.
    #[clap(long, conflicts_with("subband-codes"), help_heading = "GROUPING")]
    pub(super) num_subbands: Option<usize>,

    /// Files within this many seconds of the earliest file of a cluster belong
    /// to the cluster [seconds].
    #[clap(long, help_heading = "GROUPING")]
    pub(super) tolerance: Option<f64>,

    /// The extension of raw subband files.
    #[clap(long, help_heading = "GROUPING")]
    pub(super) extension: Option<String>,

    /// Don't check that subband files look like FITS files.
    #[clap(long, help_heading = "GROUPING")]
    #[serde(default)]
    pub(super) no_structural_checks: bool,

    #[clap(long, help = FREQ_ORDER_HELP.as_str(), help_heading = "GROUPING")]
    pub(super) freq_order: Option<String>,

    /// The maximum number of subbands of a group written at the same time.
    #[clap(short = 'j', long, help_heading = "RESOURCES")]
    pub(super) max_workers: Option<usize>,

    /// The maximum number of groups converted at the same time.
    #[clap(long, help_heading = "RESOURCES")]
    pub(super) max_concurrent_groups: Option<usize>,

    /// The ephemeral (RAM-backed) filesystem to stage outputs on.
    #[clap(long, parse(from_os_str), help_heading = "RESOURCES")]
    pub(super) staging_dir: Option<PathBuf>,

    /// Never stage; always write next to the final output.
    #[clap(long, help_heading = "RESOURCES")]
    #[serde(default)]
    pub(super) no_staging: bool,

    /// Only stage when the free space is at least this multiple of a group's
    /// size.
    #[clap(long, help_heading = "RESOURCES")]
    pub(super) staging_safety_factor: Option<f64>,

    /// The number of concatenation attempts for each group.
    #[clap(long, help_heading = "RESOURCES")]
    pub(super) concat_retries: Option<usize>,

    /// The delay before the first concatenation retry [milliseconds].
    #[clap(long, help_heading = "RESOURCES")]
    pub(super) concat_retry_delay_ms: Option<u64>,

    #[clap(long, help = PHASE_CENTRE_MODE_HELP.as_str(), help_heading = "GEOMETRY")]
    pub(super) phase_centre_mode: Option<String>,

    /// Don't precess to J2000 when computing UVWs.
    #[clap(long, help_heading = "GEOMETRY")]
    #[serde(default)]
    pub(super) no_precession: bool,

    /// Don't rotate visibility phases to the new phase centre.
    #[clap(long, help_heading = "GEOMETRY")]
    #[serde(default)]
    pub(super) no_rephase: bool,

    /// Use this value as the DUT1 [seconds].
    #[clap(long, allow_hyphen_values = true, help_heading = "GEOMETRY")]
    pub(super) dut1: Option<f64>,

    #[clap(
        long, help = ARRAY_POSITION_HELP.as_str(), help_heading = "GEOMETRY",
        number_of_values = 3,
        allow_hyphen_values = true,
        value_names = &["LONG_DEG", "LAT_DEG", "HEIGHT_M"]
    )]
    pub(super) array_position: Option<Vec<f64>>,

    /// A CSV file of antenna names and positions. The default is to use the
    /// antennas of each group's first subband file.
    #[clap(long, parse(from_os_str), help_heading = "GEOMETRY")]
    pub(super) antenna_file: Option<PathBuf>,

    /// Containers smaller than this are invalid [bytes].
    #[clap(long, help_heading = "VALIDATION")]
    pub(super) min_output_bytes: Option<u64>,

    /// Containers with a smaller fraction of unflagged samples are invalid.
    #[clap(long, help_heading = "VALIDATION")]
    pub(super) min_unflagged_fraction: Option<f64>,

    /// Containers may have at most this many fewer subbands than expected.
    #[clap(long, help_heading = "VALIDATION")]
    pub(super) max_missing_subbands: Option<usize>,

    /// Fail groups whose container already exists, rather than skipping them.
    #[clap(long, help_heading = "OUTPUT FILES")]
    #[serde(default)]
    pub(super) no_skip_existing: bool,
}

impl ConversionArgs {
    pub(super) fn merge(self, other: Self) -> Self {
        ConversionArgs {
            subband_codes: self.subband_codes.or(other.subband_codes),
            num_subbands: self.num_subbands.or(other.num_subbands),
            tolerance: self.tolerance.or(other.tolerance),
            extension: self.extension.or(other.extension),
            no_structural_checks: self.no_structural_checks || other.no_structural_checks,
            freq_order: self.freq_order.or(other.freq_order),
            max_workers: self.max_workers.or(other.max_workers),
            max_concurrent_groups: self.max_concurrent_groups.or(other.max_concurrent_groups),
            staging_dir: self.staging_dir.or(other.staging_dir),
            no_staging: self.no_staging || other.no_staging,
            staging_safety_factor: self.staging_safety_factor.or(other.staging_safety_factor),
            concat_retries: self.concat_retries.or(other.concat_retries),
            concat_retry_delay_ms: self.concat_retry_delay_ms.or(other.concat_retry_delay_ms),
            phase_centre_mode: self.phase_centre_mode.or(other.phase_centre_mode),
            no_precession: self.no_precession || other.no_precession,
            no_rephase: self.no_rephase || other.no_rephase,
            dut1: self.dut1.or(other.dut1),
            array_position: self.array_position.or(other.array_position),
            antenna_file: self.antenna_file.or(other.antenna_file),
            min_output_bytes: self.min_output_bytes.or(other.min_output_bytes),
            min_unflagged_fraction: self.min_unflagged_fraction.or(other.min_unflagged_fraction),
            max_missing_subbands: self.max_missing_subbands.or(other.max_missing_subbands),
            no_skip_existing: self.no_skip_existing || other.no_skip_existing,
        }
    }

    /// Apply the overrides to the default configuration and validate the
    /// result.
    pub(super) fn parse(self) -> Result<ConversionConfig, SubbandConvertError> {
        trace!("{:#?}", self);
        let ConversionArgs {
            subband_codes,
            num_subbands,
            tolerance,
            extension,
            no_structural_checks,
            freq_order,
            max_workers,
            max_concurrent_groups,
            staging_dir,
            no_staging,
            staging_safety_factor,
            concat_retries,
            concat_retry_delay_ms,
            phase_centre_mode,
            no_precession,
            no_rephase,
            dut1,
            array_position,
            antenna_file,
            min_output_bytes,
            min_unflagged_fraction,
            max_missing_subbands,
            no_skip_existing,
        } = self;

        let mut config = ConversionConfig::default();
        match (subband_codes, num_subbands) {
            (Some(codes), _) => config.subband_codes = codes,
            (None, Some(n)) => config.subband_codes = default_subband_codes(n),
            (None, None) => (),
        }
        if let Some(t) = tolerance {
            config.tolerance_s = t;
        }
        if let Some(e) = extension {
            config.extension = e;
        }
        config.structural_checks = !no_structural_checks;
        if let Some(s) = freq_order {
            config.freq_order = FreqOrder::from_str(&s.to_lowercase()).map_err(|_| {
                SubbandConvertError::Config(format!(
                    "Unrecognised frequency order '{s}'; valid values: {}",
                    FreqOrder::iter().join(", ")
                ))
            })?;
        }
        if let Some(n) = max_workers {
            config.max_workers = n;
        }
        if let Some(n) = max_concurrent_groups {
            config.max_concurrent_groups = n;
        }
        if let Some(d) = staging_dir {
            config.staging.path = d;
        }
        config.staging.enabled = !no_staging;
        if let Some(f) = staging_safety_factor {
            config.staging.safety_factor = f;
        }
        if let Some(n) = concat_retries {
            config.concat_retries = n;
        }
        if let Some(ms) = concat_retry_delay_ms {
            config.concat_retry_delay_ms = ms;
        }
        if let Some(s) = phase_centre_mode {
            config.phase_centre_mode =
                PhaseCentreMode::from_str(&s.to_lowercase()).map_err(|_| {
                    SubbandConvertError::Config(format!(
                        "Unrecognised phase-centre mode '{s}'; valid values: {}",
                        PhaseCentreMode::iter().join(", ")
                    ))
                })?;
        }
        config.precess = !no_precession;
        config.rephase = !no_rephase;
        if let Some(d) = dut1 {
            config.dut1_s = d;
        }
        if let Some(pos) = parse_array_position(array_position)? {
            config.array_position = pos;
        }
        config.antenna_file = antenna_file;
        if let Some(n) = min_output_bytes {
            config.min_output_bytes = n;
        }
        if let Some(f) = min_unflagged_fraction {
            config.min_unflagged_fraction = f;
        }
        if let Some(n) = max_missing_subbands {
            config.max_missing_subbands = n;
        }
        config.skip_existing = !no_skip_existing;

        let config = config.validate()?;
        debug!("{config:#?}");
        Ok(config)
    }
}

/// Unpack a user-supplied (longitude, latitude, height) triple.
pub(super) fn parse_array_position(
    array_position: Option<Vec<f64>>,
) -> Result<Option<ArrayPosition>, SubbandConvertError> {
    match array_position {
        None => Ok(None),
        Some(v) => match v[..] {
            [longitude_deg, latitude_deg, height_m] => Ok(Some(ArrayPosition {
                longitude_deg,
                latitude_deg,
                height_m,
            })),
            _ => Err(SubbandConvertError::Config(format!(
                "Array position specified as {v:?}, not [<Longitude>, <Latitude>, <Height>]"
            ))),
        },
    }
}
