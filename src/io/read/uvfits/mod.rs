// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Reading raw subband files, which are uvfits files with a single spectral
//! window.
//!
//! The uvfits standard can be found here:
//! <https://library.nrao.edu/public/memos/aips/memos/AIPSM_117.pdf>

mod error;

pub use error::SubbandReadError;

use std::{
    collections::{BTreeSet, HashMap},
    path::{Path, PathBuf},
};

use fitsio::{hdu::FitsHdu, FitsFile};
use hifitime::{Duration, Epoch, TimeUnits};
use log::{debug, trace};
use marlu::{
    constants::VEL_C, io::uvfits::decode_uvfits_baseline, Jones, LatLngHeight, RADec,
    XyzGeocentric, XyzGeodetic, UVW,
};
use ndarray::prelude::*;
use num_complex::Complex;

use super::fits::*;
use crate::{
    antennas::AntennaLayout,
    cli::Warn,
    constants::TIME_MATCH_TOLERANCE_S,
    dataset::VisibilityDataset,
    misc::{mean_epoch, round_hundredths_of_a_second},
    phase_centre::PhaseCentre,
};

/// Where a row's antennas are described.
#[derive(Debug, Clone, Copy)]
enum BaselineParams {
    Baseline(usize),
    Antennas(usize, usize),
}

/// 0-indexed positions of the group parameters we use.
#[derive(Debug, Clone)]
struct ParamIndices {
    u: usize,
    v: usize,
    w: usize,
    baseline: BaselineParams,
    date1: usize,
    date2: Option<usize>,
    inttim: Option<usize>,
}

/// Cheap-to-read metadata of a subband file.
#[derive(Debug, Clone)]
pub struct SubbandHeader {
    pub num_rows: usize,

    /// Channel centres in the order they're stored \[Hz\].
    pub freqs_hz: Vec<f64>,

    /// The (signed) channel width \[Hz\].
    pub freq_delta_hz: f64,

    /// The phase centre of the stored visibilities.
    pub phase_centre: RADec,

    /// OBSDEC \[radians\].
    pub pointing_dec_rad: Option<f64>,

    /// OBJECT, unless it's "Undefined".
    pub obs_name: Option<String>,
}

pub struct UvfitsReader {
    path: PathBuf,

    pub header: SubbandHeader,

    params: ParamIndices,

    /// PCOUNT
    num_params: usize,

    /// 2 or 3.
    num_floats_per_pol: usize,

    /// For each polarisation in the file, the index of the Jones element it
    /// goes into.
    jones_indices: Vec<usize>,

    /// The reference point of the DATE parameters.
    jd_zero: Epoch,
}

impl UvfitsReader {
    /// Read the primary header of a subband file. No visibilities are read.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<UvfitsReader, SubbandReadError> {
        let path = path.as_ref().to_path_buf();
        trace!("Inspecting {}", path.display());
        let mut fptr = fits_open(&path)?;
        let hdu = fits_open_hdu(&mut fptr, 0)?;

        let num_params: usize = fits_get_required_key(&mut fptr, &hdu, "PCOUNT")?;
        let (params, axes) = read_indices(&mut fptr, &hdu, &path, num_params)?;
        if axes.complex != 2 || axes.stokes != 3 || axes.freq != 4 {
            return Err(SubbandReadError::WrongDataOrder {
                file: path,
                complex: axes.complex,
                stokes: axes.stokes,
                freq: axes.freq,
            });
        }

        let num_rows: usize = fits_get_required_key(&mut fptr, &hdu, "GCOUNT")?;
        if num_rows == 0 {
            return Err(SubbandReadError::Empty(path));
        }

        let num_floats_per_pol: usize = fits_get_required_key(&mut fptr, &hdu, "NAXIS2")?;
        if !matches!(num_floats_per_pol, 2 | 3) {
            return Err(SubbandReadError::FloatsPerPol {
                file: path,
                num: num_floats_per_pol,
            });
        }

        // uvfits orders linear polarisations XX, YY, XY, YX; Jones matrices
        // are XX, XY, YX, YY.
        let num_pols: usize = fits_get_required_key(&mut fptr, &hdu, "NAXIS3")?;
        let stokes_crval: f64 = fits_get_required_key(&mut fptr, &hdu, "CRVAL3")?;
        let jones_indices = match (stokes_crval.round() as i32, num_pols) {
            (-5, 1) => vec![0],
            (-5, 2) => vec![0, 3],
            (-5, 4) => vec![0, 3, 1, 2],
            _ => {
                return Err(SubbandReadError::UnsupportedPols {
                    file: path,
                    crval: stokes_crval,
                    num_pols,
                })
            }
        };

        let num_chans: usize = fits_get_required_key(&mut fptr, &hdu, "NAXIS4")?;
        let freq_crval: f64 = fits_get_required_key(&mut fptr, &hdu, "CRVAL4")?;
        let freq_crpix: f64 = fits_get_required_key(&mut fptr, &hdu, "CRPIX4")?;
        let freq_delta_hz: f64 = fits_get_required_key(&mut fptr, &hdu, "CDELT4")?;
        let freqs_hz = (0..num_chans)
            .map(|i| freq_crval + (i as f64 + 1.0 - freq_crpix) * freq_delta_hz)
            .collect();

        let ra: f64 = fits_get_required_key(&mut fptr, &hdu, &format!("CRVAL{}", axes.ra))?;
        let dec: f64 = fits_get_required_key(&mut fptr, &hdu, &format!("CRVAL{}", axes.dec))?;
        let phase_centre = RADec::from_degrees(ra, dec);
        let pointing_dec_rad =
            fits_get_optional_key::<f64>(&mut fptr, &hdu, "OBSDEC")?.map(f64::to_radians);
        let obs_name = fits_get_optional_key::<String>(&mut fptr, &hdu, "OBJECT")?
            .map(|s| s.trim_matches('\'').trim().to_string())
            .filter(|s| !s.is_empty() && s != "Undefined");

        let uses_utc = match fits_get_optional_key::<String>(&mut fptr, &hdu, "TIMSYS")? {
            None => true,
            Some(t) if t.contains("UTC") => true,
            Some(t) if t.contains("IAT") || t.contains("TAI") => false,
            Some(timsys) => return Err(SubbandReadError::UnknownTimsys { file: path, timsys }),
        };
        let jd_zero: f64 =
            fits_get_required_key(&mut fptr, &hdu, &format!("PZERO{}", params.date1 + 1))?;
        let jd_zero = if uses_utc {
            Epoch::from_jde_utc(jd_zero)
        } else {
            Epoch::from_jde_tai(jd_zero)
        };
        // JD zero is a day boundary, so rounding to the hour only removes
        // float noise.
        let jd_zero = jd_zero.round(1.hours());

        debug!(
            "{}: {num_rows} rows, {num_chans} channels, {num_pols} pols",
            path.display()
        );
        Ok(UvfitsReader {
            path,
            header: SubbandHeader {
                num_rows,
                freqs_hz,
                freq_delta_hz,
                phase_centre,
                pointing_dec_rad,
                obs_name,
            },
            params,
            num_params,
            num_floats_per_pol,
            jones_indices,
            jd_zero,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the antenna table. Positions in STABXYZ are relative to
    /// ARRAY{X,Y,Z}, which is used as the array position unless one is
    /// supplied.
    pub fn read_antennas(
        &self,
        array_position: Option<LatLngHeight>,
    ) -> Result<AntennaLayout, SubbandReadError> {
        let mut fptr = fits_open(&self.path)?;
        let hdu = fits_open_hdu(&mut fptr, "AIPS AN")?;
        let (names, _) = self.read_antenna_names(&mut fptr, &hdu)?;

        let file_array_position = XyzGeocentric {
            x: fits_get_required_key(&mut fptr, &hdu, "ARRAYX")?,
            y: fits_get_required_key(&mut fptr, &hdu, "ARRAYY")?,
            z: fits_get_required_key(&mut fptr, &hdu, "ARRAYZ")?,
        }
        .to_earth_wgs84();
        let frame: Option<String> = fits_get_optional_key(&mut fptr, &hdu, "FRAME")?;
        if !matches!(frame.as_deref().map(str::trim), Some("ITRF")) {
            format!(
                "{}: assuming antenna positions are ITRF",
                self.path.display()
            )
            .warn();
        }

        let mut positions = Vec::with_capacity(names.len());
        for i in 0..names.len() {
            let [x, y, z] = fits_read_cell_f64s::<3>(&mut fptr, &hdu, "STABXYZ", i)?;
            positions.push(XyzGeodetic { x, y, z });
        }

        Ok(AntennaLayout::new(
            names,
            positions,
            array_position.unwrap_or(file_array_position),
            None,
        )?)
    }

    /// The antenna names and the station numbers used in baselines.
    fn read_antenna_names(
        &self,
        fptr: &mut FitsFile,
        hdu: &FitsHdu,
    ) -> Result<(Vec<String>, Vec<usize>), SubbandReadError> {
        let names: Vec<String> = fits_get_col(fptr, hdu, "ANNAME")?;
        if names.is_empty() {
            return Err(SubbandReadError::NoAntennas {
                file: self.path.clone(),
            });
        }
        let numbers: Vec<i64> = fits_get_col(fptr, hdu, "NOSTA")?;
        let names = names.into_iter().map(|n| n.trim().to_string()).collect();
        Ok((names, numbers.into_iter().map(|n| n as usize).collect()))
    }

    fn row_epoch(&self, params: &[f32]) -> Epoch {
        let mut frac = Duration::from_days(f64::from(params[self.params.date1]));
        if let Some(d2) = self.params.date2 {
            frac += Duration::from_days(f64::from(params[d2]));
        }
        round_hundredths_of_a_second(self.jd_zero + frac)
    }

    fn row_antennas(&self, params: &[f32]) -> (usize, usize) {
        match self.params.baseline {
            BaselineParams::Baseline(i) => decode_uvfits_baseline(params[i] as usize),
            BaselineParams::Antennas(i1, i2) => (params[i1] as usize, params[i2] as usize),
        }
    }

    /// Read every row's group parameters.
    fn read_all_params(&self, fptr: &mut FitsFile) -> Result<Array2<f32>, SubbandReadError> {
        fits_open_hdu(fptr, 0)?;
        let mut params = Array2::zeros((self.header.num_rows, self.num_params));
        for (i_row, mut row) in params.outer_iter_mut().enumerate() {
            let buffer = row.as_slice_mut().expect("rows of a standard array are contiguous");
            fits_read_group_params(fptr, i_row, buffer)?;
        }
        Ok(params)
    }

    /// The unique integration centroids, ascending.
    pub fn read_timestamps(&self) -> Result<Vec<Epoch>, SubbandReadError> {
        let mut fptr = fits_open(&self.path)?;
        let params = self.read_all_params(&mut fptr)?;
        Ok(unique_times(
            params
                .outer_iter()
                .map(|p| self.row_epoch(p.as_slice().expect("contiguous"))),
        ))
    }

    /// Read all of the visibilities. Antennas are matched to `antennas` by
    /// name. The frequency axis of the result is always ascending.
    pub fn read(&self, antennas: &AntennaLayout) -> Result<VisibilityDataset, SubbandReadError> {
        let mut fptr = fits_open(&self.path)?;
        let an_hdu = fits_open_hdu(&mut fptr, "AIPS AN")?;
        let (names, numbers) = self.read_antenna_names(&mut fptr, &an_hdu)?;
        let mut number_to_index = HashMap::with_capacity(names.len());
        for (name, number) in names.iter().zip(numbers) {
            let index = antennas.index_of(name).ok_or_else(|| {
                SubbandReadError::AntennaNotInLayout {
                    file: self.path.clone(),
                    name: name.clone(),
                }
            })?;
            number_to_index.insert(number, index);
        }

        let params = self.read_all_params(&mut fptr)?;
        let row_times: Vec<Epoch> = params
            .outer_iter()
            .map(|p| self.row_epoch(p.as_slice().expect("contiguous")))
            .collect();
        let timestamps = unique_times(row_times.iter().copied());

        let mut row_baselines = Vec::with_capacity(params.nrows());
        for (i_row, p) in params.outer_iter().enumerate() {
            let (num1, num2) = self.row_antennas(p.as_slice().expect("contiguous"));
            let lookup = |number: usize| {
                number_to_index.get(&number).copied().ok_or_else(|| {
                    SubbandReadError::UnknownAntennaNumber {
                        file: self.path.clone(),
                        row: i_row + 1,
                        number,
                    }
                })
            };
            row_baselines.push((lookup(num1)?, lookup(num2)?));
        }
        let baselines: Vec<(usize, usize)> = row_baselines
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let baseline_map: HashMap<(usize, usize), usize> = baselines
            .iter()
            .enumerate()
            .map(|(i, &bl)| (bl, i))
            .collect();

        let int_time = match (self.params.inttim, timestamps.as_slice()) {
            (Some(i), _) if params[(0, i)] > 0.0 => Duration::from_seconds(f64::from(params[(0, i)])),
            (_, [t0, t1, ..]) => *t1 - *t0,
            _ => {
                return Err(SubbandReadError::UnknownIntTime {
                    file: self.path.clone(),
                })
            }
        };

        let num_chans = self.header.freqs_hz.len();
        let num_pols = self.jones_indices.len();
        let dims = (timestamps.len(), num_chans, baselines.len());
        let mut vis = Array3::from_elem(dims, Jones::default());
        // Rows that aren't in the file stay flagged.
        let mut weights = Array3::zeros(dims);
        let mut uvws = Array2::from_elem(
            (timestamps.len(), baselines.len()),
            UVW {
                u: 0.0,
                v: 0.0,
                w: 0.0,
            },
        );

        let mut data = vec![0.0; num_chans * num_pols * self.num_floats_per_pol];
        for (i_row, (p, (&t, bl))) in params
            .outer_iter()
            .zip(row_times.iter().zip(row_baselines.iter()))
            .enumerate()
        {
            let i_time = time_index(&timestamps, t);
            let i_bl = baseline_map[bl];
            uvws[(i_time, i_bl)] = UVW {
                u: f64::from(p[self.params.u]) * VEL_C,
                v: f64::from(p[self.params.v]) * VEL_C,
                w: f64::from(p[self.params.w]) * VEL_C,
            };

            fits_read_group_data(&mut fptr, i_row, &mut data)?;
            for (i_chan, chan_data) in data
                .chunks_exact(num_pols * self.num_floats_per_pol)
                .enumerate()
            {
                let mut jones = Jones::default();
                let mut weight = f32::MAX;
                for (pol_data, &j) in chan_data
                    .chunks_exact(self.num_floats_per_pol)
                    .zip(self.jones_indices.iter())
                {
                    jones[j] = Complex::new(pol_data[0], pol_data[1]);
                    weight = weight.min(pol_data.get(2).copied().unwrap_or(1.0));
                }
                vis[(i_time, i_chan, i_bl)] = jones;
                weights[(i_time, i_chan, i_bl)] = weight;
            }
        }

        let num_times = timestamps.len();
        let mid_time = mean_epoch(timestamps.iter().copied()).unwrap_or(self.jd_zero);
        let mut dataset = VisibilityDataset {
            antennas: antennas.clone(),
            timestamps,
            int_time,
            freqs_hz: self.header.freqs_hz.clone(),
            freq_res_hz: self.header.freq_delta_hz.abs(),
            baselines,
            uvws: Some(uvws),
            field_ids: Array2::zeros((num_times, dims.2)),
            phase_centres: vec![PhaseCentre {
                name: self
                    .header
                    .obs_name
                    .clone()
                    .unwrap_or_else(|| "subband".to_string()),
                radec: self.header.phase_centre,
                epoch: "J2000".to_string(),
                frame: "icrs".to_string(),
                time_gps_s: mid_time.to_gpst_seconds(),
            }],
            vis,
            weights,
            pointing_dec_rad: self.header.pointing_dec_rad,
            num_subbands: 1,
            obs_name: self.header.obs_name.clone(),
        };
        if self.header.freq_delta_hz < 0.0 {
            trace!("{}: reversing descending channels", self.path.display());
            dataset.reverse_channels();
        }
        Ok(dataset)
    }
}

/// Positions (1-indexed in the header) of the axes we use.
struct AxisIndices {
    complex: usize,
    stokes: usize,
    freq: usize,
    ra: usize,
    dec: usize,
}

/// Find the group parameters (PTYPEn) and axes (CTYPEn) we need.
fn read_indices(
    fptr: &mut FitsFile,
    hdu: &FitsHdu,
    path: &Path,
    num_params: usize,
) -> Result<(ParamIndices, AxisIndices), SubbandReadError> {
    let read_all = |fptr: &mut FitsFile, prefix: &str, first: usize| {
        let mut values = vec![];
        for i in first.. {
            match fits_get_optional_key::<String>(fptr, hdu, &format!("{prefix}{i}"))? {
                Some(v) => values.push(v.trim_matches('\'').trim().to_string()),
                None => break,
            }
        }
        Ok::<_, SubbandReadError>(values)
    };
    let missing = |key| SubbandReadError::MissingAxis {
        file: path.to_path_buf(),
        key,
    };

    // Every parameter index must be below PCOUNT.
    let ptypes = read_all(fptr, "PTYPE", 1)?;
    if ptypes.len() > num_params {
        return Err(SubbandReadError::TooManyParams {
            file: path.to_path_buf(),
            num_ptypes: ptypes.len(),
            num_params,
        });
    }
    let find = |key: &'static str| ptypes.iter().position(|p| p == key);
    let mut dates = ptypes
        .iter()
        .enumerate()
        .filter(|(_, p)| *p == "DATE" || *p == "_DATE")
        .map(|(i, _)| i);
    let baseline = match (find("BASELINE"), find("ANTENNA1"), find("ANTENNA2")) {
        (Some(i), _, _) => BaselineParams::Baseline(i),
        (None, Some(i1), Some(i2)) => BaselineParams::Antennas(i1, i2),
        _ => {
            return Err(SubbandReadError::NoBaselineInfo {
                file: path.to_path_buf(),
            })
        }
    };
    let params = ParamIndices {
        u: find("UU").ok_or_else(|| missing("UU"))?,
        v: find("VV").ok_or_else(|| missing("VV"))?,
        w: find("WW").ok_or_else(|| missing("WW"))?,
        baseline,
        date1: dates.next().ok_or_else(|| missing("DATE"))?,
        date2: dates.next(),
        inttim: find("INTTIM"),
    };

    // CTYPE1 is unused for random groups.
    let ctypes = read_all(fptr, "CTYPE", 2)?;
    let find = |key: &'static str| {
        ctypes
            .iter()
            .position(|c| c == key)
            .map(|i| i + 2)
            .ok_or_else(|| missing(key))
    };
    let axes = AxisIndices {
        complex: find("COMPLEX")?,
        stokes: find("STOKES")?,
        freq: find("FREQ")?,
        ra: find("RA")?,
        dec: find("DEC")?,
    };
    Ok((params, axes))
}

/// Sort and de-duplicate epochs, treating epochs closer than the time match
/// tolerance as equal.
fn unique_times<I: IntoIterator<Item = Epoch>>(times: I) -> Vec<Epoch> {
    let mut times: Vec<Epoch> = times.into_iter().collect();
    times.sort();
    times.dedup_by(|a, b| (*a - *b).abs().to_seconds() <= TIME_MATCH_TOLERANCE_S);
    times
}

/// The index of the unique time that `t` matches.
fn time_index(unique: &[Epoch], t: Epoch) -> usize {
    let i = unique.partition_point(|u| (t - *u).to_seconds() > TIME_MATCH_TOLERANCE_S);
    i.min(unique.len() - 1)
}
