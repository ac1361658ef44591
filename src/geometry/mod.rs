// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Baseline geometry.
//!
//! UVWs are recomputed from antenna positions for the phase centre assigned
//! to each row, and visibilities are optionally rotated to match.

mod error;

pub use error::GeometryError;

use std::collections::HashMap;

use hifitime::Epoch;
use log::{debug, trace};
use marlu::{
    precession::{get_lmst, precess_time},
    Jones, XyzGeodetic, UVW,
};
use ndarray::{parallel::prelude::*, prelude::*};
use num_complex::Complex;

use crate::{
    constants::TAU,
    dataset::VisibilityDataset,
    phase_centre::{ObservingSite, PhaseCentre},
};

/// The UVW of each antenna at time `t` for `phase_centre`. A baseline's UVW
/// is the difference of its antennas' UVWs.
fn antenna_uvws(
    positions: &[XyzGeodetic],
    phase_centre: &PhaseCentre,
    t: Epoch,
    site: &ObservingSite,
) -> Vec<UVW> {
    let pos = site.array_position;
    // The J2000 hour angle is not the J2000 LMST minus the RA, so take the
    // one that exported files are written with.
    let (hadec, xyzs) = if site.precess {
        let precession_info = precess_time(
            pos.longitude_rad,
            pos.latitude_rad,
            phase_centre.radec,
            t,
            site.dut1(),
        );
        (
            precession_info.hadec_j2000,
            precession_info.precess_xyz(positions),
        )
    } else {
        let lmst = get_lmst(pos.longitude_rad, t, site.dut1());
        (phase_centre.radec.to_hadec(lmst), positions.to_vec())
    };
    trace!(
        "GPS {:.3}: HA {:.6} rad, dec {:.6} rad",
        t.to_gpst_seconds(),
        hadec.ha,
        hadec.dec
    );

    let (s_ha, c_ha) = hadec.ha.sin_cos();
    let (s_dec, c_dec) = hadec.dec.sin_cos();
    xyzs.into_iter()
        .map(|xyz| UVW::from_xyz_inner(xyz, s_ha, c_ha, s_dec, c_dec))
        .collect()
}

/// Compute the UVWs (time × baseline) of every row for the phase centre the
/// row is assigned to. The sidereal time and precessed antenna positions are
/// computed once per timestep and phase centre, not per row.
pub fn recompute_uvws(
    positions: &[XyzGeodetic],
    baselines: &[(usize, usize)],
    timestamps: &[Epoch],
    field_ids: ArrayView2<u32>,
    phase_centres: &[PhaseCentre],
    site: &ObservingSite,
) -> Result<Array2<UVW>, GeometryError> {
    if phase_centres.is_empty() {
        return Err(GeometryError::NoPhaseCentres);
    }

    let mut uvws = Array2::from_elem(
        (timestamps.len(), baselines.len()),
        UVW {
            u: 0.0,
            v: 0.0,
            w: 0.0,
        },
    );
    uvws.outer_iter_mut()
        .into_par_iter()
        .zip(field_ids.outer_iter())
        .zip(timestamps.par_iter())
        .for_each(|((mut uvws, fields), &t)| {
            let mut cache: HashMap<u32, Vec<UVW>> = HashMap::new();
            for ((uvw, &field), &(ant1, ant2)) in
                uvws.iter_mut().zip(fields.iter()).zip(baselines.iter())
            {
                let ant_uvws = cache.entry(field).or_insert_with(|| {
                    antenna_uvws(positions, &phase_centres[field as usize], t, site)
                });
                let (uvw1, uvw2) = (ant_uvws[ant1], ant_uvws[ant2]);
                *uvw = UVW {
                    u: uvw1.u - uvw2.u,
                    v: uvw1.v - uvw2.v,
                    w: uvw1.w - uvw2.w,
                };
            }
        });
    Ok(uvws)
}

/// Rotate visibilities (time × frequency × baseline) referenced to
/// `uvws_from` so that they're referenced to `uvws_to`.
pub fn rephase(
    mut vis: ArrayViewMut3<Jones<f32>>,
    uvws_from: ArrayView2<UVW>,
    uvws_to: ArrayView2<UVW>,
    lambdas_m: &[f64],
) -> Result<(), GeometryError> {
    if uvws_from.dim() != uvws_to.dim()
        || uvws_from.dim() != (vis.len_of(Axis(0)), vis.len_of(Axis(2)))
    {
        return Err(GeometryError::RephaseShape {
            old: uvws_from.shape().to_vec(),
            new: uvws_to.shape().to_vec(),
        });
    }

    vis.outer_iter_mut()
        .into_par_iter()
        .zip(uvws_from.outer_iter())
        .zip(uvws_to.outer_iter())
        .for_each(|((mut vis_fb, from_b), to_b)| {
            for ((mut vis_f, from), to) in vis_fb
                .axis_iter_mut(Axis(1))
                .zip(from_b.iter())
                .zip(to_b.iter())
            {
                let arg = -TAU * (to.w - from.w);
                for (jones, &lambda_m) in vis_f.iter_mut().zip(lambdas_m) {
                    let rotation = Complex::cis(arg / lambda_m);
                    *jones = Jones::<f32>::from(Jones::<f64>::from(*jones) * rotation);
                }
            }
        });
    Ok(())
}

/// Replace a dataset's UVWs with ones computed for its assigned phase
/// centres. If `rephase_vis` is set and the dataset had UVWs, the
/// visibilities are rotated to match.
pub fn update_geometry(
    dataset: &mut VisibilityDataset,
    site: &ObservingSite,
    rephase_vis: bool,
) -> Result<(), GeometryError> {
    dataset.check()?;
    let new_uvws = recompute_uvws(
        &dataset.antennas.positions,
        &dataset.baselines,
        &dataset.timestamps,
        dataset.field_ids.view(),
        &dataset.phase_centres,
        site,
    )?;

    match (rephase_vis, dataset.uvws.as_ref()) {
        (true, Some(old_uvws)) => {
            debug!("Rephasing {} rows", dataset.num_rows());
            let lambdas = dataset.lambdas_m();
            rephase(
                dataset.vis.view_mut(),
                old_uvws.view(),
                new_uvws.view(),
                &lambdas,
            )?;
        }
        (true, None) => debug!("No UVWs were stored; visibilities are not rephased"),
        (false, _) => (),
    }
    dataset.uvws = Some(new_uvws);
    Ok(())
}
