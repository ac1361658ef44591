// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Antenna names and positions.
//!
//! An [`AntennaLayout`] is read once per run and then passed around by value
//! (including to worker processes, as JSON).

mod error;

pub use error::AntennaError;

use std::{collections::HashSet, path::Path};

use log::debug;
use marlu::{LatLngHeight, XyzGeocentric, XyzGeodetic};
use serde::{Deserialize, Serialize};

/// The antennas of an array.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AntennaLayout {
    pub names: Vec<String>,

    /// Positions relative to the array reference point \[metres\].
    #[serde(with = "xyzs_serde")]
    pub positions: Vec<XyzGeodetic>,

    /// The reference point the positions are relative to.
    #[serde(with = "lat_lng_height_serde")]
    pub array_position: LatLngHeight,

    /// Dish diameters \[metres\], if known.
    pub diameters_m: Option<Vec<f64>>,
}

impl AntennaLayout {
    pub fn new(
        names: Vec<String>,
        positions: Vec<XyzGeodetic>,
        array_position: LatLngHeight,
        diameters_m: Option<Vec<f64>>,
    ) -> Result<AntennaLayout, AntennaError> {
        if names.is_empty() {
            return Err(AntennaError::Empty);
        }
        if names.len() != positions.len() {
            return Err(AntennaError::LengthMismatch {
                names: names.len(),
                positions: positions.len(),
            });
        }
        if let Some(d) = diameters_m.as_ref() {
            if d.len() != names.len() {
                return Err(AntennaError::DiameterMismatch {
                    antennas: names.len(),
                    diameters: d.len(),
                });
            }
        }
        let mut seen = HashSet::with_capacity(names.len());
        for name in &names {
            if !seen.insert(name.as_str()) {
                return Err(AntennaError::DuplicateName(name.clone()));
            }
        }

        Ok(AntennaLayout {
            names,
            positions,
            array_position,
            diameters_m,
        })
    }

    /// Read antennas from a CSV file with columns `name, latitude [deg],
    /// longitude [deg], height [m]` and an optional `diameter [m]`. Lines
    /// starting with `#` and a non-numeric header line are ignored. The
    /// geodetic positions are converted to positions relative to
    /// `array_position`.
    pub fn read_csv(
        file: &Path,
        array_position: LatLngHeight,
    ) -> Result<AntennaLayout, AntennaError> {
        debug!("Reading antenna positions from {}", file.display());
        let contents = std::fs::read_to_string(file).map_err(|err| AntennaError::IO {
            file: file.to_path_buf(),
            err,
        })?;

        let geocentric_vector = XyzGeocentric::get_geocentric_vector(array_position);
        let (s_long, c_long) = array_position.longitude_rad.sin_cos();

        let mut names = vec![];
        let mut positions = vec![];
        let mut diameters = vec![];
        for (i_line, line) in contents.lines().enumerate() {
            let line_num = i_line + 1;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            if fields.len() != 4 && fields.len() != 5 {
                return Err(AntennaError::BadLine {
                    file: file.to_path_buf(),
                    line: line_num,
                    content: line.to_string(),
                });
            }
            // A header line is one whose latitude isn't a number, but only
            // before any antennas have been read.
            if names.is_empty() && fields[1].parse::<f64>().is_err() {
                continue;
            }

            let parse = |value: &str| {
                value.parse::<f64>().map_err(|_| AntennaError::BadNumber {
                    file: file.to_path_buf(),
                    line: line_num,
                    value: value.to_string(),
                })
            };
            let geodetic = LatLngHeight {
                latitude_rad: parse(fields[1])?.to_radians(),
                longitude_rad: parse(fields[2])?.to_radians(),
                height_metres: parse(fields[3])?,
            };
            let position = geodetic
                .to_geocentric_wgs84()
                .to_geodetic_inner(geocentric_vector, s_long, c_long);
            names.push(fields[0].to_string());
            positions.push(position);
            if let Some(d) = fields.get(4) {
                diameters.push(parse(d)?);
            }
        }

        let diameters_m = match diameters.len() {
            0 => None,
            n if n == names.len() => Some(diameters),
            _ => {
                return Err(AntennaError::PartialDiameters {
                    file: file.to_path_buf(),
                })
            }
        };
        debug!("Read {} antennas", names.len());
        AntennaLayout::new(names, positions, array_position, diameters_m)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// The index of an antenna by name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }
}

/// Positions as `[x, y, z]` triples.
mod xyzs_serde {
    use marlu::XyzGeodetic;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub(super) fn serialize<S: Serializer>(
        xyzs: &[XyzGeodetic],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        xyzs.iter()
            .map(|xyz| [xyz.x, xyz.y, xyz.z])
            .collect::<Vec<_>>()
            .serialize(serializer)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<XyzGeodetic>, D::Error> {
        let triples = Vec::<[f64; 3]>::deserialize(deserializer)?;
        Ok(triples
            .into_iter()
            .map(|[x, y, z]| XyzGeodetic { x, y, z })
            .collect())
    }
}

/// An Earth position as `[longitude_rad, latitude_rad, height_m]`.
pub(crate) mod lat_lng_height_serde {
    use marlu::LatLngHeight;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub(crate) fn serialize<S: Serializer>(
        llh: &LatLngHeight,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        [llh.longitude_rad, llh.latitude_rad, llh.height_metres].serialize(serializer)
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<LatLngHeight, D::Error> {
        let [longitude_rad, latitude_rad, height_metres] = <[f64; 3]>::deserialize(deserializer)?;
        Ok(LatLngHeight {
            longitude_rad,
            latitude_rad,
            height_metres,
        })
    }
}
