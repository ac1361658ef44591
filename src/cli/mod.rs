// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The `subband-convert` command line. Each subcommand has its own module.
//!
//! Arguments double as the contents of argument files, so booleans carry
//! `#[serde(default)]` and everything else is an `Option`.
//!
//! Outside of this module, only `SubbandConvert` (and its `run`) and
//! `SubbandConvertError` are visible.

#[macro_use]
mod common;
mod convert;
mod discover;
mod error;
mod export;
mod simulate;
mod validate;
mod write_subband;
#[cfg(test)]
mod tests;

pub(crate) use common::Warn;
pub use error::SubbandConvertError;

use std::path::PathBuf;

use clap::{AppSettings, Args, Parser, Subcommand};
use log::info;

use crate::PROGRESS_BARS;

// Git and compiler details, written by build.rs.
include!(concat!(env!("OUT_DIR"), "/built.rs"));

#[derive(Debug, Parser)]
#[clap(
    version,
    author,
    about = r#"Group raw interferometer subband files into complete observations and
convert each into a single phase-coherent visibility container"#
)]
#[clap(global_setting(AppSettings::DeriveDisplayOrder))]
#[clap(disable_help_subcommand = true)]
#[clap(infer_subcommands = true)]
#[clap(propagate_version = true)]
#[clap(infer_long_args = true)]
pub struct SubbandConvert {
    #[clap(flatten)]
    global_opts: GlobalArgs,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct GlobalArgs {
    /// Don't draw progress bars.
    #[clap(long)]
    #[clap(global = true)]
    no_progress_bars: bool,

    /// Print more. -v shows state transitions of every group, -vv per-file
    /// detail and -vvv adds timestamps and source lines.
    #[clap(short, long, parse(from_occurrences))]
    #[clap(global = true)]
    verbosity: u8,

    /// Check the arguments and report what would be done, without writing
    /// anything.
    #[clap(long)]
    #[clap(global = true)]
    dry_run: bool,

    /// Write the merged arguments to this TOML file, so the run can be
    /// repeated with it as an argument file.
    #[clap(long)]
    #[clap(global = true)]
    save_toml: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
#[clap(arg_required_else_help = true)]
enum Command {
    #[clap(about = "Discover complete groups of subband files and convert each into a container.")]
    Convert(convert::ConvertArgs),

    #[clap(about = "Report the complete groups and incomplete clusters of subband files.")]
    Discover(discover::DiscoverArgs),

    #[clap(about = "Check containers for completeness and plausibility.")]
    Validate(validate::ValidateArgs),

    #[clap(about = "Write a container out as uvfits or a measurement set.")]
    Export(export::ExportArgs),

    #[clap(about = "Write synthetic raw subband files.")]
    Simulate(simulate::SimulateArgs),

    #[clap(hide = true)]
    WriteSubband(write_subband::WriteSubbandArgs),
}

impl SubbandConvert {
    pub fn run(self) -> Result<(), SubbandConvertError> {
        let GlobalArgs {
            verbosity,
            dry_run,
            no_progress_bars,
            save_toml,
        } = self.global_opts;

        // A worker's stdout is discarded and its stderr is only looked at when
        // it fails, so keep it quiet.
        let is_worker = matches!(self.command, Command::WriteSubband(_));
        if is_worker {
            setup_worker_logging().expect("Failed to initialise logging.");
        } else {
            setup_logging(verbosity).expect("Failed to initialise logging.");
            if !no_progress_bars {
                PROGRESS_BARS.store(true);
            }
        }

        let sub_command = match &self.command {
            Command::Convert(_) => "convert",
            Command::Discover(_) => "discover",
            Command::Validate(_) => "validate",
            Command::Export(_) => "export",
            Command::Simulate(_) => "simulate",
            Command::WriteSubband(_) => "write-subband",
        };
        if !is_worker {
            info!(
                "subband-convert {} {}",
                sub_command,
                env!("CARGO_PKG_VERSION")
            );
            display_build_info();
        }

        macro_rules! merge_save_run {
            ($args:expr) => {{
                let args = $args.merge()?;
                if let Some(toml) = save_toml {
                    use std::{
                        fs::File,
                        io::{BufWriter, Write},
                    };

                    let mut f = BufWriter::new(File::create(toml)?);
                    let toml_str = toml::to_string(&args).map_err(|e| {
                        SubbandConvertError::ArgFile(format!("Couldn't write arguments as toml: {e}"))
                    })?;
                    f.write_all(toml_str.as_bytes())?;
                }
                args.run(dry_run)?;
            }};
        }

        match self.command {
            Command::Convert(args) => {
                merge_save_run!(args)
            }

            Command::Discover(args) => {
                merge_save_run!(args)
            }

            Command::Simulate(args) => {
                merge_save_run!(args)
            }

            Command::Validate(args) => args.run()?,
            Command::Export(args) => args.run(dry_run)?,

            Command::WriteSubband(args) => return args.run(),
        }

        info!("subband-convert {} complete.", sub_command);
        Ok(())
    }
}

/// Log to `stdout`. Colours are only used on a terminal. From -vvv, every line
/// carries a timestamp and its source location.
fn setup_logging(verbosity: u8) -> Result<(), log::SetLoggerError> {
    let mut builder = env_logger::Builder::from_default_env();
    builder.target(env_logger::Target::Stdout);
    builder.format_target(false);
    match verbosity {
        0 => builder.filter_level(log::LevelFilter::Info),
        1 => builder.filter_level(log::LevelFilter::Debug),
        2 => builder.filter_level(log::LevelFilter::Trace),
        _ => {
            builder.filter_level(log::LevelFilter::Trace);
            builder.format(|buf, record| {
                use std::io::Write;

                let timestamp = buf.timestamp();
                let level = record.level();
                let target = record.target();
                let line = record.line().unwrap_or(0);
                let message = record.args();

                writeln!(buf, "[{timestamp} {level} {target}:{line}] {message}")
            })
        }
    };
    builder.try_init()
}

/// Warnings and errors only, on `stderr`.
fn setup_worker_logging() -> Result<(), log::SetLoggerError> {
    let mut builder = env_logger::Builder::new();
    builder.target(env_logger::Target::Stderr);
    builder.format_target(false);
    builder.filter_level(log::LevelFilter::Warn);
    builder.try_init()
}

/// Log where and how this executable was built.
fn display_build_info() {
    let dirty = match GIT_DIRTY {
        Some(true) => " (dirty)",
        _ => "",
    };
    match GIT_COMMIT_HASH_SHORT {
        Some(hash) => {
            info!("Compiled on git commit hash: {hash}{dirty}");
        }
        None => info!("Compiled on git commit hash: <no git info>"),
    }
    if let Some(hr) = GIT_HEAD_REF {
        info!("            git head ref: {}", hr);
    }
    info!("            {}", BUILT_TIME_UTC);
    info!("         with compiler {}", RUSTC_VERSION);
    info!("");
}
