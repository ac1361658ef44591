// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Generate raw subband files of a synthetic observation.
//!
//! Every group is a complete set of subband uvfits files whose file-name
//! timestamps jitter by a few whole seconds, like the files of a real
//! correlator. The sky is a single unpolarised point source at the meridian
//! direction of the group's mean time; each subband is phased to the meridian
//! at its own (jittered) file time, so a correct conversion rephases all of
//! them to the source and leaves the visibilities real and constant.

mod error;

pub use error::SimulateError;

use std::path::{Path, PathBuf};

use hifitime::{Duration, Epoch};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::{debug, info};
use marlu::{Jones, LatLngHeight, RADec, ENH};
use ndarray::prelude::*;
use vec1::vec1;

use crate::{
    antennas::{AntennaError, AntennaLayout},
    config::{default_subband_codes, sort_codes_by_freq, FreqOrder},
    constants::*,
    dataset::{baselines_with_autos, VisibilityDataset},
    geometry::{recompute_uvws, rephase},
    io::write::{export_dataset, VisOutputType},
    phase_centre::{meridian_direction, ObservingSite, PhaseCentre},
    PROGRESS_BARS,
};

/// Everything needed to make a synthetic observation.
#[derive(Debug, Clone)]
pub struct SimulationParams {
    pub output_dir: PathBuf,

    /// The start of the first integration of the first group.
    pub start_time: Epoch,

    pub num_groups: usize,

    /// The time between the starts of consecutive groups \[seconds\].
    pub group_spacing_s: f64,

    pub subband_codes: Vec<String>,

    pub freq_order: FreqOrder,

    /// The centre of the lowest channel of the lowest subband \[Hz\].
    pub lowest_freq_hz: f64,

    pub chans_per_subband: usize,

    pub chan_width_hz: f64,

    pub num_timesteps: usize,

    pub int_time_s: f64,

    pub pointing_dec_rad: f64,

    pub antennas: AntennaLayout,

    /// File-name timestamps are up to this many seconds later than the start
    /// of the group.
    pub max_jitter_s: u32,

    pub flux_density_jy: f32,

    pub dut1_s: f64,
}

impl SimulationParams {
    /// Default parameters for antennas at `array_position`, pointing at the
    /// zenith.
    pub fn new(output_dir: PathBuf, antennas: AntennaLayout) -> SimulationParams {
        let pointing_dec_rad = antennas.array_position.latitude_rad;
        SimulationParams {
            output_dir,
            start_time: Epoch::from_gregorian_utc_at_midnight(2024, 1, 1),
            num_groups: 1,
            group_spacing_s: 300.0,
            subband_codes: default_subband_codes(DEFAULT_NUM_SUBBANDS),
            freq_order: FreqOrder::Descending,
            lowest_freq_hz: 1.3114e9,
            chans_per_subband: 4,
            chan_width_hz: 244140.625,
            num_timesteps: 3,
            int_time_s: 10.0,
            pointing_dec_rad,
            antennas,
            max_jitter_s: 2,
            flux_density_jy: 1.0,
            dut1_s: 0.0,
        }
    }

    fn check(&self) -> Result<(), SimulateError> {
        if self.num_groups == 0 {
            return Err(SimulateError::NothingToSimulate("zero groups"));
        }
        if self.subband_codes.is_empty() {
            return Err(SimulateError::NothingToSimulate("zero subbands"));
        }
        if self.chans_per_subband == 0 {
            return Err(SimulateError::NothingToSimulate("zero channels"));
        }
        if self.num_timesteps == 0 {
            return Err(SimulateError::NothingToSimulate("zero timesteps"));
        }
        if !(self.chan_width_hz > 0.0) {
            return Err(SimulateError::BadChannelWidth(self.chan_width_hz));
        }
        if !(self.int_time_s > 0.0) {
            return Err(SimulateError::BadIntTime(self.int_time_s));
        }
        Ok(())
    }

    /// Simulated files store J2000 UVWs.
    fn site(&self) -> ObservingSite {
        ObservingSite {
            array_position: self.antennas.array_position,
            dut1_s: self.dut1_s,
            precess: true,
        }
    }

    /// The channel centres of the subband at `position` in ascending
    /// frequency order \[Hz\].
    pub fn subband_freqs(&self, position: usize) -> Vec<f64> {
        (0..self.chans_per_subband)
            .map(|i_chan| {
                let i = position * self.chans_per_subband + i_chan;
                self.lowest_freq_hz + i as f64 * self.chan_width_hz
            })
            .collect()
    }
}

/// The files of one simulated group.
#[derive(Debug, Clone)]
pub struct SimulatedGroup {
    /// The timestamp text of the earliest file.
    pub key: String,

    /// In the same order as the subband codes.
    pub files: Vec<PathBuf>,

    /// The direction of the point source.
    pub source: RADec,
}

/// A deterministic layout of `num_antennas` antennas on a spiral up to about
/// 100 metres from the array centre.
pub fn simulated_layout(
    num_antennas: usize,
    array_position: LatLngHeight,
) -> Result<AntennaLayout, AntennaError> {
    let golden_angle = PI * (3.0 - 5.0_f64.sqrt());
    let positions = (0..num_antennas)
        .map(|i| {
            let r = 100.0 * ((i as f64 + 0.5) / num_antennas as f64).sqrt();
            let theta = i as f64 * golden_angle;
            ENH {
                e: r * theta.cos(),
                n: r * theta.sin(),
                h: 0.0,
            }
            .to_xyz(array_position.latitude_rad)
        })
        .collect();
    let names = (0..num_antennas).map(|i| format!("ant{i:03}")).collect();
    AntennaLayout::new(names, positions, array_position, None)
}

/// Format an epoch the way file names carry timestamps. Milliseconds are only
/// included when they aren't zero.
pub fn format_timestamp(e: Epoch) -> String {
    let (y, mo, d, h, mi, s, ns) = e.to_gregorian_utc();
    let ms = ns / 1_000_000;
    if ms == 0 {
        format!("{y:04}-{mo:02}-{d:02}T{h:02}:{mi:02}:{s:02}")
    } else {
        format!("{y:04}-{mo:02}-{d:02}T{h:02}:{mi:02}:{s:02}.{ms:03}")
    }
}

/// How much later than the group start the file of the `i`th subband is
/// stamped \[whole seconds\].
fn jitter_offset_s(i_subband: usize, max_jitter_s: u32) -> u32 {
    ((i_subband * 7 + 3) % (max_jitter_s as usize + 1)) as u32
}

/// Make the visibilities of one subband: a point source at `source`,
/// phased to `phase_centre`.
pub(crate) fn simulate_subband(
    params: &SimulationParams,
    timestamps: &[Epoch],
    freqs_hz: Vec<f64>,
    source: &PhaseCentre,
    phase_centre: PhaseCentre,
) -> Result<VisibilityDataset, SimulateError> {
    let site = params.site();
    let baselines = baselines_with_autos(params.antennas.len());
    let dims = (timestamps.len(), freqs_hz.len(), baselines.len());
    let field_ids = Array2::zeros((timestamps.len(), baselines.len()));

    let uvws_source = recompute_uvws(
        &params.antennas.positions,
        &baselines,
        timestamps,
        field_ids.view(),
        std::slice::from_ref(source),
        &site,
    )?;
    let uvws = recompute_uvws(
        &params.antennas.positions,
        &baselines,
        timestamps,
        field_ids.view(),
        std::slice::from_ref(&phase_centre),
        &site,
    )?;

    // The source is at the centre of its own frame, so its visibilities are
    // constant there; move them to the subband's phase centre.
    let mut vis = Array3::from_elem(dims, Jones::identity() * params.flux_density_jy);
    let lambdas_m: Vec<f64> = freqs_hz
        .iter()
        .map(|&f| marlu::constants::VEL_C / f)
        .collect();
    rephase(vis.view_mut(), uvws_source.view(), uvws.view(), &lambdas_m)?;

    Ok(VisibilityDataset {
        antennas: params.antennas.clone(),
        timestamps: timestamps.to_vec(),
        int_time: Duration::from_seconds(params.int_time_s),
        freqs_hz,
        freq_res_hz: params.chan_width_hz,
        baselines,
        uvws: Some(uvws),
        field_ids,
        phase_centres: vec![phase_centre],
        vis,
        weights: Array3::ones(dims),
        pointing_dec_rad: Some(params.pointing_dec_rad),
        num_subbands: 1,
        obs_name: Some("simulated".to_string()),
    })
}

/// Write every subband file of every group into the output directory.
pub fn simulate(params: &SimulationParams) -> Result<Vec<SimulatedGroup>, SimulateError> {
    params.check()?;
    std::fs::create_dir_all(&params.output_dir).map_err(|err| SimulateError::OutputDir {
        dir: params.output_dir.clone(),
        err,
    })?;
    let site = params.site();
    let mut codes_in_freq_order = params.subband_codes.clone();
    sort_codes_by_freq(&mut codes_in_freq_order, params.freq_order);

    let num_files = params.num_groups * params.subband_codes.len();
    let progress = ProgressBar::with_draw_target(
        Some(num_files as _),
        if PROGRESS_BARS.load() {
            ProgressDrawTarget::stdout()
        } else {
            ProgressDrawTarget::hidden()
        },
    )
    .with_style(
        ProgressStyle::default_bar()
            .template("{msg:18}: [{wide_bar:.blue}] {pos:3}/{len:3} files ({elapsed_precise}<{eta_precise})")
            .expect("template is valid")
            .progress_chars("=> "),
    )
    .with_message("Simulating");

    let mut groups = Vec::with_capacity(params.num_groups);
    for i_group in 0..params.num_groups {
        let group_start =
            params.start_time + Duration::from_seconds(i_group as f64 * params.group_spacing_s);
        let timestamps: Vec<Epoch> = (0..params.num_timesteps)
            .map(|i| {
                group_start + Duration::from_seconds((i as f64 + 0.5) * params.int_time_s)
            })
            .collect();
        let mid_time = group_start
            + Duration::from_seconds(params.num_timesteps as f64 * params.int_time_s / 2.0);
        let source = PhaseCentre {
            name: "source".to_string(),
            radec: meridian_direction(params.pointing_dec_rad, mid_time, &site),
            epoch: "J2000".to_string(),
            frame: "icrs".to_string(),
            time_gps_s: mid_time.to_gpst_seconds(),
        };

        let earliest_offset = (0..params.subband_codes.len())
            .map(|i| jitter_offset_s(i, params.max_jitter_s))
            .min()
            .unwrap_or(0);
        let key = format_timestamp(group_start + Duration::from_seconds(f64::from(earliest_offset)));
        debug!("Simulating group {key}");

        let mut files = Vec::with_capacity(params.subband_codes.len());
        for (i_subband, code) in params.subband_codes.iter().enumerate() {
            let file_time = group_start
                + Duration::from_seconds(f64::from(jitter_offset_s(
                    i_subband,
                    params.max_jitter_s,
                )));
            let position = codes_in_freq_order
                .iter()
                .position(|c| c == code)
                .expect("every code is in the sorted codes");
            let phase_centre = PhaseCentre {
                name: format!("{code}_meridian"),
                radec: RADec {
                    ra: meridian_direction(params.pointing_dec_rad, file_time, &site).ra,
                    dec: params.pointing_dec_rad,
                },
                epoch: "J2000".to_string(),
                frame: "icrs".to_string(),
                time_gps_s: file_time.to_gpst_seconds(),
            };
            let dataset = simulate_subband(
                params,
                &timestamps,
                params.subband_freqs(position),
                &source,
                phase_centre,
            )?;

            let path = subband_path(&params.output_dir, &format_timestamp(file_time), code);
            export_dataset(
                &dataset,
                &vec1![(path.clone(), VisOutputType::Uvfits)],
                Duration::from_seconds(params.dut1_s),
                site.precess,
            )?;
            files.push(path);
            progress.inc(1);
        }

        groups.push(SimulatedGroup {
            key,
            files,
            source: source.radec,
        });
    }
    progress.abandon_with_message("Finished simulating");
    info!(
        "Wrote {num_files} subband files to {}",
        params.output_dir.display()
    );

    Ok(groups)
}

fn subband_path(dir: &Path, timestamp: &str, code: &str) -> PathBuf {
    dir.join(format!("{timestamp}_{code}.{DEFAULT_SUBBAND_EXTENSION}"))
}
