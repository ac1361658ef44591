// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Miscellaneous things.

use std::{path::Path, thread};

use console::Term;
use crossbeam_channel::bounded;
use hifitime::Epoch;
use is_terminal::IsTerminal;

/// Timestamps built from single-precision DATE parameters carry float noise.
/// An [Epoch] within a thousandth of a second of a whole hundredth (in GPS
/// seconds) is snapped to it; anything else is returned unchanged.
pub(crate) fn round_hundredths_of_a_second(e: Epoch) -> Epoch {
    let e_gps = e.to_gpst_seconds() * 100.0;
    if (e_gps.round() - e_gps).abs() < 0.1 {
        Epoch::from_gpst_seconds(e_gps.round() / 100.0)
    } else {
        e
    }
}

/// Get the mean of some epochs. Returns `None` if there aren't any.
pub(crate) fn mean_epoch<I: IntoIterator<Item = Epoch>>(epochs: I) -> Option<Epoch> {
    let (sum, count) = epochs
        .into_iter()
        .fold((0.0, 0_usize), |(sum, count), e| {
            (sum + e.to_gpst_seconds(), count + 1)
        });
    (count > 0).then(|| Epoch::from_gpst_seconds(sum / count as f64))
}

/// The total size of a file or directory tree \[bytes\]. Entries that can't be
/// inspected count as zero.
pub(crate) fn disk_usage(path: &Path) -> u64 {
    let metadata = match std::fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(_) => return 0,
    };
    if metadata.is_dir() {
        std::fs::read_dir(path)
            .map(|entries| {
                entries
                    .filter_map(Result::ok)
                    .map(|entry| disk_usage(&entry.path()))
                    .sum()
            })
            .unwrap_or(0)
    } else {
        metadata.len()
    }
}

fn is_a_tty() -> bool {
    std::io::stdout().is_terminal() || std::io::stderr().is_terminal()
}

/// Run `func`, and if it is still running after a couple of seconds, keep a
/// line on a terminal's stderr saying how long it has been waiting.
pub(crate) fn expensive_op<F, R>(func: F, wait_message: &str) -> R
where
    F: FnOnce() -> R + Send,
    R: Send,
{
    use std::time::Duration;

    const INITIAL_WAIT_TIME: Duration = Duration::from_secs(2);
    const INC_WAIT_TIME: Duration = Duration::from_millis(250);

    let (tx, rx) = bounded(1);

    thread::scope(|s| {
        s.spawn(|| {
            let r = func();
            tx.send(r).expect("receiver is not disconnected");
        });

        let term = is_a_tty().then(Term::stderr);

        let mut total_wait_time = Duration::from_secs(0);
        let mut printed_wait_line = false;
        loop {
            match rx.try_recv() {
                Ok(r) => {
                    if let Some(term) = term.as_ref() {
                        if printed_wait_line {
                            let _ = term.move_cursor_up(1);
                            let _ = term.clear_line();
                        }
                    }

                    return r;
                }
                Err(_) => {
                    thread::sleep(INC_WAIT_TIME);
                    total_wait_time += INC_WAIT_TIME;
                    if let Some(term) = term.as_ref() {
                        if total_wait_time >= INITIAL_WAIT_TIME {
                            if printed_wait_line {
                                let _ = term.move_cursor_up(1);
                                let _ = term.clear_line();
                            }
                            let _ = term.write_line(&format!(
                                "{wait_message}: {:.2}s",
                                total_wait_time.as_secs_f64()
                            ));
                            printed_wait_line = true;
                        }
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_round_seconds() {
        let snapped = |gps: f64| round_hundredths_of_a_second(Epoch::from_gpst_seconds(gps));

        assert_abs_diff_eq!(
            snapped(1_400_000_000.0000_2).to_gpst_seconds(),
            1_400_000_000.0,
            epsilon = 1e-6
        );
        assert_abs_diff_eq!(
            snapped(1_400_000_012.4999_7).to_gpst_seconds(),
            1_400_000_012.5,
            epsilon = 1e-6
        );
        // Too far from a hundredth.
        assert_abs_diff_eq!(
            snapped(1_400_000_012.504).to_gpst_seconds(),
            1_400_000_012.504,
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_mean_epoch() {
        assert!(mean_epoch(std::iter::empty()).is_none());

        let mean = mean_epoch([
            Epoch::from_gpst_seconds(1000.0),
            Epoch::from_gpst_seconds(1010.0),
            Epoch::from_gpst_seconds(1050.0),
        ])
        .unwrap();
        assert_abs_diff_eq!(mean.to_gpst_seconds(), 1020.0, epsilon = 1e-6);
    }

    #[test]
    fn test_disk_usage() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a"), [0u8; 100]).unwrap();
        std::fs::create_dir(tmp.path().join("sub")).unwrap();
        std::fs::write(tmp.path().join("sub").join("b"), [0u8; 28]).unwrap();
        assert_eq!(disk_usage(tmp.path()), 128);
        assert_eq!(disk_usage(&tmp.path().join("missing")), 0);
    }
}
