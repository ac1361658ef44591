// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

#[cfg(test)]
mod tests;

use std::{path::PathBuf, str::FromStr};

use clap::Parser;
use log::{debug, info, trace};
use serde::{Deserialize, Serialize};

use super::common::{parse_array_position, InfoPrinter, ARG_FILE_HELP, ARRAY_POSITION_HELP};
use crate::{
    antennas::AntennaLayout,
    config::{default_subband_codes, ArrayPosition, FreqOrder},
    discovery::parse_timestamp,
    simulate::{simulate, simulated_layout, SimulationParams},
    SubbandConvertError,
};

const DEFAULT_NUM_ANTENNAS: usize = 8;

#[derive(Parser, Debug, Clone, Default, Serialize, Deserialize)]
pub(super) struct SimulateArgs {
    #[clap(name = "ARGUMENTS_FILE", help = ARG_FILE_HELP.as_str(), parse(from_os_str))]
    pub(super) args_file: Option<PathBuf>,

    /// The directory to write subband files into.
    #[clap(short = 'o', long, parse(from_os_str))]
    pub(super) output_dir: Option<PathBuf>,

    /// The UTC start of the first group (YYYY-MM-DDTHH:MM:SS[.fff]).
    /// Default: 2024-01-01T00:00:00
    #[clap(long, help_heading = "TIMES")]
    pub(super) start_time: Option<String>,

    /// The number of groups (observations) to simulate. Default: 1
    #[clap(long, help_heading = "TIMES")]
    pub(super) num_groups: Option<usize>,

    /// The time between the starts of consecutive groups [seconds].
    /// Default: 300
    #[clap(long, help_heading = "TIMES")]
    pub(super) group_spacing: Option<f64>,

    /// The number of integrations in each subband file. Default: 3
    #[clap(long, help_heading = "TIMES")]
    pub(super) num_timesteps: Option<usize>,

    /// The integration time [seconds]. Default: 10
    #[clap(long, help_heading = "TIMES")]
    pub(super) int_time: Option<f64>,

    /// File-name timestamps of a group's subbands are up to this many whole
    /// seconds later than the group start. Default: 2
    #[clap(long, help_heading = "TIMES")]
    pub(super) max_jitter: Option<u32>,

    /// The number of subbands, with canonical codes sb00 onwards. Default: 16
    #[clap(long, help_heading = "FREQUENCIES")]
    pub(super) num_subbands: Option<usize>,

    /// How subband numbers relate to frequency (ascending or descending).
    /// Default: descending
    #[clap(long, help_heading = "FREQUENCIES")]
    pub(super) freq_order: Option<String>,

    /// The centre of the lowest channel [Hz]. Default: 1.3114e9
    #[clap(long, help_heading = "FREQUENCIES")]
    pub(super) lowest_freq: Option<f64>,

    /// The number of channels in each subband. Default: 4
    #[clap(long, help_heading = "FREQUENCIES")]
    pub(super) chans_per_subband: Option<usize>,

    /// The channel width [Hz]. Default: 244140.625
    #[clap(long, help_heading = "FREQUENCIES")]
    pub(super) chan_width: Option<f64>,

    /// The number of antennas on a synthetic spiral layout. Ignored if an
    /// antenna file is given.
    #[clap(long, help_heading = "ARRAY")]
    pub(super) num_antennas: Option<usize>,

    /// A CSV file of antenna names and positions.
    #[clap(long, parse(from_os_str), help_heading = "ARRAY")]
    pub(super) antenna_file: Option<PathBuf>,

    #[clap(
        long, help = ARRAY_POSITION_HELP.as_str(), help_heading = "ARRAY",
        number_of_values = 3,
        allow_hyphen_values = true,
        value_names = &["LONG_DEG", "LAT_DEG", "HEIGHT_M"]
    )]
    pub(super) array_position: Option<Vec<f64>>,

    /// The pointing declination [degrees]. The default is the zenith.
    #[clap(long, allow_hyphen_values = true, help_heading = "SKY")]
    pub(super) pointing_dec: Option<f64>,

    /// The flux density of the simulated point source [Jy]. Default: 1
    #[clap(long, help_heading = "SKY")]
    pub(super) flux_density: Option<f32>,

    /// Use this value as the DUT1 [seconds].
    #[clap(long, allow_hyphen_values = true, help_heading = "SKY")]
    pub(super) dut1: Option<f64>,
}

impl SimulateArgs {
    pub(super) fn merge(self) -> Result<SimulateArgs, SubbandConvertError> {
        debug!("Merging command-line arguments with the argument file");

        let cli_args = self;

        if let Some(arg_file) = cli_args.args_file {
            let SimulateArgs {
                args_file: _,
                output_dir,
                start_time,
                num_groups,
                group_spacing,
                num_timesteps,
                int_time,
                max_jitter,
                num_subbands,
                freq_order,
                lowest_freq,
                chans_per_subband,
                chan_width,
                num_antennas,
                antenna_file,
                array_position,
                pointing_dec,
                flux_density,
                dut1,
            } = unpack_arg_file!(arg_file);

            Ok(SimulateArgs {
                args_file: None,
                output_dir: cli_args.output_dir.or(output_dir),
                start_time: cli_args.start_time.or(start_time),
                num_groups: cli_args.num_groups.or(num_groups),
                group_spacing: cli_args.group_spacing.or(group_spacing),
                num_timesteps: cli_args.num_timesteps.or(num_timesteps),
                int_time: cli_args.int_time.or(int_time),
                max_jitter: cli_args.max_jitter.or(max_jitter),
                num_subbands: cli_args.num_subbands.or(num_subbands),
                freq_order: cli_args.freq_order.or(freq_order),
                lowest_freq: cli_args.lowest_freq.or(lowest_freq),
                chans_per_subband: cli_args.chans_per_subband.or(chans_per_subband),
                chan_width: cli_args.chan_width.or(chan_width),
                num_antennas: cli_args.num_antennas.or(num_antennas),
                antenna_file: cli_args.antenna_file.or(antenna_file),
                array_position: cli_args.array_position.or(array_position),
                pointing_dec: cli_args.pointing_dec.or(pointing_dec),
                flux_density: cli_args.flux_density.or(flux_density),
                dut1: cli_args.dut1.or(dut1),
            })
        } else {
            Ok(cli_args)
        }
    }

    pub(super) fn parse(self) -> Result<SimulationParams, SubbandConvertError> {
        debug!("{:#?}", self);

        let Self {
            args_file: _,
            output_dir,
            start_time,
            num_groups,
            group_spacing,
            num_timesteps,
            int_time,
            max_jitter,
            num_subbands,
            freq_order,
            lowest_freq,
            chans_per_subband,
            chan_width,
            num_antennas,
            antenna_file,
            array_position,
            pointing_dec,
            flux_density,
            dut1,
        } = self;

        let output_dir = output_dir.ok_or_else(|| {
            SubbandConvertError::Simulate("No output directory was specified".to_string())
        })?;
        let array_position = parse_array_position(array_position)?
            .unwrap_or_else(ArrayPosition::ovro)
            .to_lat_lng_height();
        let antennas = match antenna_file {
            Some(file) => AntennaLayout::read_csv(&file, array_position)?,
            None => simulated_layout(
                num_antennas.unwrap_or(DEFAULT_NUM_ANTENNAS),
                array_position,
            )?,
        };

        let mut params = SimulationParams::new(output_dir, antennas);
        if let Some(s) = start_time {
            params.start_time = parse_timestamp(&s).ok_or_else(|| {
                SubbandConvertError::Simulate(format!(
                    "Couldn't parse start time '{s}'; expected YYYY-MM-DDTHH:MM:SS[.fff]"
                ))
            })?;
        }
        if let Some(n) = num_groups {
            params.num_groups = n;
        }
        if let Some(s) = group_spacing {
            params.group_spacing_s = s;
        }
        if let Some(n) = num_timesteps {
            params.num_timesteps = n;
        }
        if let Some(t) = int_time {
            params.int_time_s = t;
        }
        if let Some(j) = max_jitter {
            params.max_jitter_s = j;
        }
        if let Some(n) = num_subbands {
            params.subband_codes = default_subband_codes(n);
        }
        if let Some(s) = freq_order {
            params.freq_order = FreqOrder::from_str(&s.to_lowercase()).map_err(|_| {
                SubbandConvertError::Simulate(format!("Unrecognised frequency order '{s}'"))
            })?;
        }
        if let Some(f) = lowest_freq {
            params.lowest_freq_hz = f;
        }
        if let Some(n) = chans_per_subband {
            params.chans_per_subband = n;
        }
        if let Some(w) = chan_width {
            params.chan_width_hz = w;
        }
        if let Some(d) = pointing_dec {
            params.pointing_dec_rad = d.to_radians();
        }
        if let Some(f) = flux_density {
            params.flux_density_jy = f;
        }
        if let Some(d) = dut1 {
            params.dut1_s = d;
        }

        let mut printer = InfoPrinter::new("Simulation set up".into());
        printer.push_line(format!("Output: {}", params.output_dir.display()).into());
        printer.push_block(vec![
            format!(
                "{} group(s) of {} subbands, starting {}",
                params.num_groups,
                params.subband_codes.len(),
                params.start_time
            )
            .into(),
            format!(
                "{} timesteps of {}s, {} channels of {} Hz per subband",
                params.num_timesteps,
                params.int_time_s,
                params.chans_per_subband,
                params.chan_width_hz
            )
            .into(),
            format!("{} antennas", params.antennas.len()).into(),
        ]);
        printer.display();

        Ok(params)
    }

    pub(super) fn run(self, dry_run: bool) -> Result<(), SubbandConvertError> {
        trace!("{:#?}", self);
        let params = self.parse()?;

        if dry_run {
            info!("Dry run -- exiting now.");
            return Ok(());
        }

        let groups = simulate(&params)?;
        for group in &groups {
            info!("Simulated group {} ({} files)", group.key, group.files.len());
        }
        Ok(())
    }
}
