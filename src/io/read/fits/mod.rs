// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Helper functions for reading FITS files.
//!
//! All of these are `#[track_caller]`, so an error says which line of this
//! crate asked for the failing read.

mod error;

pub(crate) use error::FitsError;

use std::{ffi::CString, fmt::Display, panic::Location, path::Path};

use fitsio::{errors::check_status, hdu::*, FitsFile};

/// Describe an HDU the way cfitsio users count them (from 1).
fn hdu_num(hdu: &FitsHdu) -> String {
    (hdu.number + 1).to_string()
}

fn fitsio_error(
    fptr: &FitsFile,
    hdu: String,
    what: impl Into<String>,
    err: fitsio::errors::Error,
    at: &'static Location<'static>,
) -> FitsError {
    FitsError::Fitsio {
        file: fptr.file_path().to_path_buf(),
        hdu,
        what: what.into(),
        err: Box::new(err),
        at,
    }
}

#[track_caller]
pub(crate) fn fits_open<P: AsRef<Path>>(file: P) -> Result<FitsFile, FitsError> {
    let at = Location::caller();
    FitsFile::open(file.as_ref()).map_err(|err| FitsError::Open {
        file: file.as_ref().to_path_buf(),
        err: Box::new(err),
        at,
    })
}

/// Open an HDU; it becomes the current HDU of the file.
#[track_caller]
pub(crate) fn fits_open_hdu<T: DescribesHdu + Display + Copy>(
    fptr: &mut FitsFile,
    hdu_description: T,
) -> Result<FitsHdu, FitsError> {
    let at = Location::caller();
    fptr.hdu(hdu_description)
        .map_err(|err| fitsio_error(fptr, hdu_description.to_string(), "the HDU", err, at))
}

/// Read a header key that may not exist, and parse it. Strings are returned
/// without quotes.
#[track_caller]
pub(crate) fn fits_get_optional_key<T: std::str::FromStr>(
    fptr: &mut FitsFile,
    hdu: &FitsHdu,
    keyword: &str,
) -> Result<Option<T>, FitsError> {
    let at = Location::caller();
    let value: String = match hdu.read_key(fptr, keyword) {
        Ok(v) => v,
        // KEY_NO_EXIST and VALUE_UNDEFINED.
        Err(fitsio::errors::Error::Fits(e)) if matches!(e.status, 202 | 204) => return Ok(None),
        Err(err) => return Err(fitsio_error(fptr, hdu_num(hdu), keyword, err, at)),
    };
    match value.trim().parse() {
        Ok(v) => Ok(Some(v)),
        Err(_) => Err(FitsError::Parse {
            file: fptr.file_path().to_path_buf(),
            hdu: hdu_num(hdu),
            key: keyword.to_string(),
            value,
            at,
        }),
    }
}

#[track_caller]
pub(crate) fn fits_get_required_key<T: std::str::FromStr>(
    fptr: &mut FitsFile,
    hdu: &FitsHdu,
    keyword: &str,
) -> Result<T, FitsError> {
    let at = Location::caller();
    fits_get_optional_key(fptr, hdu, keyword)?.ok_or_else(|| FitsError::MissingKey {
        file: fptr.file_path().to_path_buf(),
        hdu: hdu_num(hdu),
        key: keyword.to_string(),
        at,
    })
}

#[track_caller]
pub(crate) fn fits_get_col<T: fitsio::tables::ReadsCol>(
    fptr: &mut FitsFile,
    hdu: &FitsHdu,
    column: &str,
) -> Result<Vec<T>, FitsError> {
    let at = Location::caller();
    hdu.read_col(fptr, column)
        .map_err(|err| fitsio_error(fptr, hdu_num(hdu), format!("column {column}"), err, at))
}

/// Read a vector cell of doubles (e.g. a 3D position) from a binary table.
/// `row` counts from 0.
#[track_caller]
pub(crate) fn fits_read_cell_f64s<const N: usize>(
    fptr: &mut FitsFile,
    hdu: &FitsHdu,
    column: &str,
    row: usize,
) -> Result<[f64; N], FitsError> {
    let at = Location::caller();
    let what = || format!("column {column} row {}", row + 1);
    // Raw reads act on the current HDU.
    fptr.hdu(hdu.number)
        .map_err(|err| fitsio_error(fptr, hdu_num(hdu), what(), err, at))?;
    let c_column = CString::new(column).expect("column names don't contain NUL");

    let mut out = [0.0; N];
    let mut status = 0;
    let mut col_num = 0;
    unsafe {
        // ffgcno = fits_get_colnum
        fitsio_sys::ffgcno(
            fptr.as_raw(),
            0,
            c_column.as_ptr() as *mut _,
            &mut col_num,
            &mut status,
        );
    }
    check_status(status).map_err(|err| fitsio_error(fptr, hdu_num(hdu), what(), err, at))?;
    unsafe {
        // ffgcvd = fits_read_col_dbl
        fitsio_sys::ffgcvd(
            fptr.as_raw(),
            col_num,
            (row + 1) as i64,
            1,
            N as i64,
            0.0,
            out.as_mut_ptr(),
            &mut 0,
            &mut status,
        );
    }
    check_status(status).map_err(|err| fitsio_error(fptr, hdu_num(hdu), what(), err, at))?;
    Ok(out)
}

/// Read the parameters of a random group (from 0) of the primary HDU into
/// `buffer`.
#[track_caller]
pub(crate) fn fits_read_group_params(
    fptr: &mut FitsFile,
    group: usize,
    buffer: &mut [f32],
) -> Result<(), FitsError> {
    let at = Location::caller();
    let mut status = 0;
    unsafe {
        // ffggpe = fits_read_grppar_flt
        fitsio_sys::ffggpe(
            fptr.as_raw(),
            (group + 1) as _,
            1,
            buffer.len() as _,
            buffer.as_mut_ptr(),
            &mut status,
        );
    }
    check_status(status).map_err(|err| {
        fitsio_error(fptr, "1".into(), format!("group {} parameters", group + 1), err, at)
    })
}

/// Read the data of a random group (from 0) of the primary HDU into `buffer`.
#[track_caller]
pub(crate) fn fits_read_group_data(
    fptr: &mut FitsFile,
    group: usize,
    buffer: &mut [f32],
) -> Result<(), FitsError> {
    let at = Location::caller();
    let mut status = 0;
    unsafe {
        // ffgpve = fits_read_img_flt
        fitsio_sys::ffgpve(
            fptr.as_raw(),
            (group + 1) as _,
            1,
            buffer.len() as _,
            0.0,
            buffer.as_mut_ptr(),
            &mut 0,
            &mut status,
        );
    }
    check_status(status)
        .map_err(|err| fitsio_error(fptr, "1".into(), format!("group {} data", group + 1), err, at))
}
