// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The native output container.
//!
//! A container is a directory `<key>.vis` of subtables:
//!
//! - `ANTENNA.json`: antenna names and positions relative to the array
//!   position;
//! - `SPECTRAL_WINDOW.json`: channel frequencies (ascending);
//! - `FIELD.json`: phase centres, indexed by field ID;
//! - `POLARIZATION.json`: correlation layout;
//! - `OBSERVATION.json`: observation-level metadata;
//! - `MAIN.json`: a description of the main row table;
//! - `MAIN.bin`: the rows, little endian. Each is ant1 (u32), ant2 (u32), GPS
//!   time (f64), field ID (u32), u, v, w (f64), then for each channel 8 f32s
//!   (XX, XY, YX, YY as re/im pairs) and one f32 weight.
//!
//! Rows are time-major: all baselines of the first timestep come first.

mod error;

pub use error::ContainerError;

use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::{Path, PathBuf},
};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use hifitime::{Duration, Epoch};
use log::{debug, trace};
use marlu::{Jones, UVW};
use ndarray::prelude::*;
use num_complex::Complex;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{
    antennas::AntennaLayout,
    constants::{CONTAINER_EXTENSION, TIME_MATCH_TOLERANCE_S},
    dataset::VisibilityDataset,
    phase_centre::PhaseCentre,
};

/// The version of the layout written by this crate.
pub const FORMAT_VERSION: u32 = 1;

const ANTENNA_TABLE: &str = "ANTENNA.json";
const SPECTRAL_WINDOW_TABLE: &str = "SPECTRAL_WINDOW.json";
const FIELD_TABLE: &str = "FIELD.json";
const POLARIZATION_TABLE: &str = "POLARIZATION.json";
const OBSERVATION_TABLE: &str = "OBSERVATION.json";
const MAIN_TABLE: &str = "MAIN.json";
const MAIN_DATA: &str = "MAIN.bin";

/// Bytes per row before the channel data.
const ROW_PREFIX_BYTES: u64 = 4 + 4 + 8 + 4 + 3 * 8;
/// Bytes per channel in a row.
const CHANNEL_BYTES: u64 = 9 * 4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectralWindowTable {
    /// Channel centres, ascending \[Hz\].
    pub freqs_hz: Vec<f64>,
    pub freq_res_hz: f64,
    /// The number of subbands concatenated into this window.
    pub num_subbands: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolarizationTable {
    pub corr_types: Vec<String>,
}

impl Default for PolarizationTable {
    fn default() -> Self {
        PolarizationTable {
            corr_types: ["XX", "XY", "YX", "YY"].map(String::from).to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationTable {
    pub obs_name: Option<String>,
    /// \[radians\]
    pub pointing_dec_rad: Option<f64>,
    /// \[seconds\]
    pub int_time_s: f64,
    pub software: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MainTable {
    pub format_version: u32,
    pub num_rows: usize,
    pub num_channels: usize,
    /// Integration centroids \[GPS seconds\].
    pub timestamps_gps: Vec<f64>,
    pub baselines: Vec<(usize, usize)>,
    pub has_uvws: bool,
}

impl MainTable {
    /// The size of one row of `MAIN.bin` \[bytes\].
    pub fn row_size(&self) -> u64 {
        ROW_PREFIX_BYTES + CHANNEL_BYTES * self.num_channels as u64
    }

    /// The expected size of `MAIN.bin` \[bytes\].
    pub fn data_size(&self) -> u64 {
        self.row_size() * self.num_rows as u64
    }
}

/// Everything in a container except the rows.
#[derive(Debug, Clone)]
pub struct ContainerHeader {
    pub antennas: AntennaLayout,
    pub spectral_window: SpectralWindowTable,
    pub fields: Vec<PhaseCentre>,
    pub polarization: PolarizationTable,
    pub observation: ObservationTable,
    pub main: MainTable,
}

/// Where the container for a group goes.
pub fn container_path(output_dir: &Path, key: &str) -> PathBuf {
    output_dir.join(format!("{key}.{CONTAINER_EXTENSION}"))
}

fn io_error(file: &Path) -> impl FnOnce(std::io::Error) -> ContainerError + '_ {
    move |err| ContainerError::IO {
        file: file.to_path_buf(),
        err,
    }
}

fn write_table<T: Serialize>(dir: &Path, name: &str, table: &T) -> Result<(), ContainerError> {
    let file = dir.join(name);
    let f = File::create(&file).map_err(io_error(&file))?;
    let mut w = BufWriter::new(f);
    serde_json::to_writer_pretty(&mut w, table).map_err(|err| ContainerError::Json {
        file: file.clone(),
        err,
    })?;
    w.flush().map_err(io_error(&file))
}

fn read_table<T: DeserializeOwned>(dir: &Path, name: &'static str) -> Result<T, ContainerError> {
    let file = dir.join(name);
    if !file.is_file() {
        return Err(ContainerError::MissingTable {
            dir: dir.to_path_buf(),
            table: name,
        });
    }
    let f = File::open(&file).map_err(io_error(&file))?;
    serde_json::from_reader(BufReader::new(f)).map_err(|err| ContainerError::Json { file, err })
}

/// Write a dataset as a new container at `dir`. `dir` must not already exist.
pub fn write_container(dir: &Path, dataset: &VisibilityDataset) -> Result<(), ContainerError> {
    dataset.check()?;
    if dir.exists() {
        return Err(ContainerError::Exists(dir.to_path_buf()));
    }
    debug!(
        "Writing {} rows x {} channels to {}",
        dataset.num_rows(),
        dataset.num_channels(),
        dir.display()
    );
    std::fs::create_dir_all(dir).map_err(io_error(dir))?;

    write_table(dir, ANTENNA_TABLE, &dataset.antennas)?;
    write_table(
        dir,
        SPECTRAL_WINDOW_TABLE,
        &SpectralWindowTable {
            freqs_hz: dataset.freqs_hz.clone(),
            freq_res_hz: dataset.freq_res_hz,
            num_subbands: dataset.num_subbands,
        },
    )?;
    write_table(dir, FIELD_TABLE, &dataset.phase_centres)?;
    write_table(dir, POLARIZATION_TABLE, &PolarizationTable::default())?;
    write_table(
        dir,
        OBSERVATION_TABLE,
        &ObservationTable {
            obs_name: dataset.obs_name.clone(),
            pointing_dec_rad: dataset.pointing_dec_rad,
            int_time_s: dataset.int_time.to_seconds(),
            software: format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
        },
    )?;

    let file = dir.join(MAIN_DATA);
    let f = File::create(&file).map_err(io_error(&file))?;
    let mut w = BufWriter::new(f);
    write_rows(&mut w, dataset).map_err(io_error(&file))?;
    w.flush().map_err(io_error(&file))?;

    // The description goes last; a container without it is incomplete.
    write_table(
        dir,
        MAIN_TABLE,
        &MainTable {
            format_version: FORMAT_VERSION,
            num_rows: dataset.num_rows(),
            num_channels: dataset.num_channels(),
            timestamps_gps: dataset
                .timestamps
                .iter()
                .map(|t| t.to_gpst_seconds())
                .collect(),
            baselines: dataset.baselines.clone(),
            has_uvws: dataset.uvws.is_some(),
        },
    )
}

fn write_rows<W: Write>(w: &mut W, dataset: &VisibilityDataset) -> std::io::Result<()> {
    let zero = UVW {
        u: 0.0,
        v: 0.0,
        w: 0.0,
    };
    for (i_time, t) in dataset.timestamps.iter().enumerate() {
        let gps = t.to_gpst_seconds();
        for (i_bl, &(ant1, ant2)) in dataset.baselines.iter().enumerate() {
            let uvw = dataset
                .uvws
                .as_ref()
                .map(|uvws| uvws[(i_time, i_bl)])
                .unwrap_or(zero);
            w.write_u32::<LittleEndian>(ant1 as u32)?;
            w.write_u32::<LittleEndian>(ant2 as u32)?;
            w.write_f64::<LittleEndian>(gps)?;
            w.write_u32::<LittleEndian>(dataset.field_ids[(i_time, i_bl)])?;
            for x in [uvw.u, uvw.v, uvw.w] {
                w.write_f64::<LittleEndian>(x)?;
            }
            for (jones, &weight) in dataset
                .vis
                .slice(s![i_time, .., i_bl])
                .iter()
                .zip(dataset.weights.slice(s![i_time, .., i_bl]))
            {
                for c in jones.iter() {
                    w.write_f32::<LittleEndian>(c.re)?;
                    w.write_f32::<LittleEndian>(c.im)?;
                }
                w.write_f32::<LittleEndian>(weight)?;
            }
        }
    }
    Ok(())
}

/// Read all of a container's subtables, but not its rows.
pub fn read_container_header(dir: &Path) -> Result<ContainerHeader, ContainerError> {
    if !dir.is_dir() {
        return Err(ContainerError::NotAContainer(dir.to_path_buf()));
    }
    trace!("Reading container header {}", dir.display());
    let main: MainTable = read_table(dir, MAIN_TABLE)?;
    if main.format_version != FORMAT_VERSION {
        return Err(ContainerError::Version {
            file: dir.join(MAIN_TABLE),
            version: main.format_version,
            supported: FORMAT_VERSION,
        });
    }
    Ok(ContainerHeader {
        antennas: read_table(dir, ANTENNA_TABLE)?,
        spectral_window: read_table(dir, SPECTRAL_WINDOW_TABLE)?,
        fields: read_table(dir, FIELD_TABLE)?,
        polarization: read_table(dir, POLARIZATION_TABLE)?,
        observation: read_table(dir, OBSERVATION_TABLE)?,
        main,
    })
}

/// The size of a container's row data on disk \[bytes\].
pub fn main_data_size(dir: &Path) -> Result<u64, ContainerError> {
    let file = dir.join(MAIN_DATA);
    Ok(std::fs::metadata(&file).map_err(io_error(&file))?.len())
}

/// Read a whole container back into memory.
pub fn read_container(dir: &Path) -> Result<VisibilityDataset, ContainerError> {
    let header = read_container_header(dir)?;
    let main = &header.main;
    let file = dir.join(MAIN_DATA);
    let expected = main.data_size();
    let got = main_data_size(dir)?;
    if got != expected {
        return Err(ContainerError::BadMainSize {
            file,
            expected,
            got,
        });
    }

    let num_times = main.timestamps_gps.len();
    let num_bls = main.baselines.len();
    let num_chans = main.num_channels;
    if num_times * num_bls != main.num_rows {
        return Err(ContainerError::BadRow {
            file: dir.join(MAIN_TABLE),
            row: 0,
            reason: format!(
                "{} rows are described, but there are {num_times} timesteps and {num_bls} baselines",
                main.num_rows
            ),
        });
    }

    let mut bytes = Vec::with_capacity(expected as usize);
    File::open(&file)
        .and_then(|mut f| f.read_to_end(&mut bytes))
        .map_err(io_error(&file))?;
    let mut r = bytes.as_slice();

    let mut uvws = Array2::from_elem(
        (num_times, num_bls),
        UVW {
            u: 0.0,
            v: 0.0,
            w: 0.0,
        },
    );
    let mut field_ids = Array2::zeros((num_times, num_bls));
    let mut vis = Array3::from_elem((num_times, num_chans, num_bls), Jones::default());
    let mut weights = Array3::zeros((num_times, num_chans, num_bls));
    let bad_row = |row: usize, reason: String| ContainerError::BadRow {
        file: file.clone(),
        row,
        reason,
    };
    for (i_time, &gps) in main.timestamps_gps.iter().enumerate() {
        for (i_bl, &(ant1, ant2)) in main.baselines.iter().enumerate() {
            let row = i_time * num_bls + i_bl;
            let (row_ant1, row_ant2, row_gps, field) = (|| {
                Ok::<_, std::io::Error>((
                    r.read_u32::<LittleEndian>()? as usize,
                    r.read_u32::<LittleEndian>()? as usize,
                    r.read_f64::<LittleEndian>()?,
                    r.read_u32::<LittleEndian>()?,
                ))
            })()
            .map_err(io_error(&file))?;
            if (row_ant1, row_ant2) != (ant1, ant2) {
                return Err(bad_row(
                    row,
                    format!("baseline ({row_ant1}, {row_ant2}) should be ({ant1}, {ant2})"),
                ));
            }
            if (row_gps - gps).abs() > TIME_MATCH_TOLERANCE_S {
                return Err(bad_row(
                    row,
                    format!("time {row_gps} should be {gps}"),
                ));
            }
            field_ids[(i_time, i_bl)] = field;

            let mut uvw = [0.0; 3];
            r.read_f64_into::<LittleEndian>(&mut uvw)
                .map_err(io_error(&file))?;
            uvws[(i_time, i_bl)] = UVW {
                u: uvw[0],
                v: uvw[1],
                w: uvw[2],
            };

            let mut chan = [0.0_f32; 9];
            for i_chan in 0..num_chans {
                r.read_f32_into::<LittleEndian>(&mut chan)
                    .map_err(io_error(&file))?;
                vis[(i_time, i_chan, i_bl)] = Jones::from([
                    Complex::new(chan[0], chan[1]),
                    Complex::new(chan[2], chan[3]),
                    Complex::new(chan[4], chan[5]),
                    Complex::new(chan[6], chan[7]),
                ]);
                weights[(i_time, i_chan, i_bl)] = chan[8];
            }
        }
    }

    let dataset = VisibilityDataset {
        antennas: header.antennas,
        timestamps: main
            .timestamps_gps
            .iter()
            .map(|&g| Epoch::from_gpst_seconds(g))
            .collect(),
        int_time: Duration::from_seconds(header.observation.int_time_s),
        freqs_hz: header.spectral_window.freqs_hz,
        freq_res_hz: header.spectral_window.freq_res_hz,
        baselines: main.baselines.clone(),
        uvws: main.has_uvws.then_some(uvws),
        field_ids,
        phase_centres: header.fields,
        vis,
        weights,
        pointing_dec_rad: header.observation.pointing_dec_rad,
        num_subbands: header.spectral_window.num_subbands,
        obs_name: header.observation.obs_name,
    };
    dataset.check()?;
    Ok(dataset)
}
