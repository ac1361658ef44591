// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! In-memory visibilities of one subband, or of a whole group after
//! concatenation.

mod error;

pub use error::DatasetError;

use hifitime::{Duration, Epoch};
use marlu::{constants::VEL_C, Jones, UVW};
use ndarray::prelude::*;

use crate::{antennas::AntennaLayout, phase_centre::PhaseCentre};

/// Visibilities with everything needed to place them in a container.
///
/// A "row" is one baseline at one timestep. Visibilities are ordered time ×
/// frequency × baseline and hold (XX, XY, YX, YY). A non-positive weight
/// means the sample is flagged.
#[derive(Debug, Clone)]
pub struct VisibilityDataset {
    pub antennas: AntennaLayout,

    /// Integration centroids, ascending.
    pub timestamps: Vec<Epoch>,

    pub int_time: Duration,

    /// Channel centres \[Hz\].
    pub freqs_hz: Vec<f64>,

    /// The width of a channel \[Hz\]. Always positive.
    pub freq_res_hz: f64,

    /// Antenna indices of each baseline. Autocorrelations have equal indices.
    pub baselines: Vec<(usize, usize)>,

    /// \[metres\], time × baseline. `None` if the source had none.
    pub uvws: Option<Array2<UVW>>,

    /// The phase centre of each row, time × baseline.
    pub field_ids: Array2<u32>,

    pub phase_centres: Vec<PhaseCentre>,

    pub vis: Array3<Jones<f32>>,

    pub weights: Array3<f32>,

    /// The declination the array was pointed at \[radians\].
    pub pointing_dec_rad: Option<f64>,

    /// How many subbands were merged to make this dataset.
    pub num_subbands: usize,

    pub obs_name: Option<String>,
}

impl VisibilityDataset {
    pub fn num_timesteps(&self) -> usize {
        self.timestamps.len()
    }

    pub fn num_channels(&self) -> usize {
        self.freqs_hz.len()
    }

    pub fn num_baselines(&self) -> usize {
        self.baselines.len()
    }

    pub fn num_rows(&self) -> usize {
        self.num_timesteps() * self.num_baselines()
    }

    /// Check that all of the arrays agree with each other.
    pub fn check(&self) -> Result<(), DatasetError> {
        let num_times = self.num_timesteps();
        let num_chans = self.num_channels();
        let num_bls = self.num_baselines();
        if num_times == 0 {
            return Err(DatasetError::NoTimesteps);
        }
        if num_chans == 0 {
            return Err(DatasetError::NoChannels);
        }

        let check_shape = |what, got: &[usize], expected: &[usize]| {
            if got == expected {
                Ok(())
            } else {
                Err(DatasetError::BadShape {
                    what,
                    expected: expected.to_vec(),
                    got: got.to_vec(),
                })
            }
        };
        check_shape("visibility", self.vis.shape(), &[num_times, num_chans, num_bls])?;
        check_shape("weight", self.weights.shape(), &[num_times, num_chans, num_bls])?;
        check_shape("field ID", self.field_ids.shape(), &[num_times, num_bls])?;
        if let Some(uvws) = self.uvws.as_ref() {
            check_shape("UVW", uvws.shape(), &[num_times, num_bls])?;
        }

        let num_ants = self.antennas.len();
        for (i_bl, &(ant1, ant2)) in self.baselines.iter().enumerate() {
            for ant in [ant1, ant2] {
                if ant >= num_ants {
                    return Err(DatasetError::BadAntennaIndex {
                        baseline: i_bl,
                        ant,
                        num_ants,
                    });
                }
            }
        }

        let num_fields = self.phase_centres.len();
        if let Some(&field) = self
            .field_ids
            .iter()
            .find(|&&f| f as usize >= num_fields)
        {
            return Err(DatasetError::BadFieldId { field, num_fields });
        }

        Ok(())
    }

    /// The wavelength of each channel \[metres\].
    pub fn lambdas_m(&self) -> Vec<f64> {
        self.freqs_hz.iter().map(|&f| VEL_C / f).collect()
    }

    /// Are the channel frequencies strictly increasing?
    pub fn freqs_ascending(&self) -> bool {
        self.freqs_hz.windows(2).all(|w| w[1] > w[0])
    }

    /// Reverse the frequency axis (and everything indexed by it).
    pub fn reverse_channels(&mut self) {
        self.freqs_hz.reverse();
        self.vis = self.vis.slice(s![.., ..;-1, ..]).to_owned();
        self.weights = self.weights.slice(s![.., ..;-1, ..]).to_owned();
    }

    /// The fraction of samples that aren't flagged. An empty dataset has
    /// nothing unflagged.
    pub fn unflagged_fraction(&self) -> f64 {
        if self.weights.is_empty() {
            return 0.0;
        }
        let num_unflagged = self.weights.iter().filter(|&&w| w > 0.0).count();
        num_unflagged as f64 / self.weights.len() as f64
    }

    /// The first and last timestamps.
    pub fn time_range(&self) -> Option<(Epoch, Epoch)> {
        Some((*self.timestamps.first()?, *self.timestamps.last()?))
    }

    /// Use these phase centres for all rows. Each timestep gets the field
    /// that `field_for_time` picks for it.
    pub fn assign_fields<F>(&mut self, phase_centres: Vec<PhaseCentre>, field_for_time: F)
    where
        F: Fn(Epoch) -> u32,
    {
        for (&t, mut fields) in self
            .timestamps
            .iter()
            .zip(self.field_ids.outer_iter_mut())
        {
            fields.fill(field_for_time(t));
        }
        self.phase_centres = phase_centres;
    }
}

/// All cross-correlation and autocorrelation baselines of `num_ants`
/// antennas, in the order (0,0), (0,1), ... (1,1), (1,2), ...
pub fn baselines_with_autos(num_ants: usize) -> Vec<(usize, usize)> {
    (0..num_ants)
        .flat_map(|ant1| (ant1..num_ants).map(move |ant2| (ant1, ant2)))
        .collect()
}
