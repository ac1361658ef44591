// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::{borrow::Cow, path::PathBuf};

use clap::Parser;
use log::{debug, info, trace};
use serde::{Deserialize, Serialize};

use super::common::{
    display_warnings, ConversionArgs, InfoPrinter, SearchArgs, Warn, ARG_FILE_HELP,
};
use crate::{
    discovery::{discover, Discovery},
    SubbandConvertError,
};

#[derive(Parser, Debug, Clone, Default, Serialize, Deserialize)]
pub(super) struct DiscoverArgs {
    #[clap(name = "ARGUMENTS_FILE", help = ARG_FILE_HELP.as_str(), parse(from_os_str))]
    pub(super) args_file: Option<PathBuf>,

    #[clap(flatten)]
    #[serde(rename = "input")]
    #[serde(default)]
    pub(super) search_args: SearchArgs,

    #[clap(flatten)]
    #[serde(rename = "conversion")]
    #[serde(default)]
    pub(super) conversion_args: ConversionArgs,

    /// Print what was found as JSON on stdout, rather than logging it.
    #[clap(long)]
    #[serde(default)]
    pub(super) json: bool,
}

impl DiscoverArgs {
    pub(super) fn merge(self) -> Result<DiscoverArgs, SubbandConvertError> {
        debug!("Merging command-line arguments with the argument file");

        let cli_args = self;

        if let Some(arg_file) = cli_args.args_file {
            let DiscoverArgs {
                args_file: _,
                search_args,
                conversion_args,
                json,
            } = unpack_arg_file!(arg_file);

            Ok(DiscoverArgs {
                args_file: None,
                search_args: cli_args.search_args.merge(search_args),
                conversion_args: cli_args.conversion_args.merge(conversion_args),
                json: cli_args.json || json,
            })
        } else {
            Ok(cli_args)
        }
    }

    pub(super) fn run(self, dry_run: bool) -> Result<(), SubbandConvertError> {
        trace!("{:#?}", self);
        let (input_dir, window) = self.search_args.parse()?;
        let config = self.conversion_args.parse()?;

        if dry_run {
            info!("Dry run -- exiting now.");
            return Ok(());
        }

        let discovery = discover(&input_dir, window, &config)?;
        if self.json {
            println!("{}", discovery_json(&discovery));
        } else {
            print_discovery(&discovery);
        }
        Ok(())
    }
}

/// Everything discovery found, for machines.
pub(super) fn discovery_json(discovery: &Discovery) -> serde_json::Value {
    serde_json::json!({
        "groups": discovery.groups,
        "incomplete": discovery.incomplete,
        "skipped": discovery.skipped.iter().map(|e| e.to_string()).collect::<Vec<_>>(),
    })
}

/// Log everything discovery found. Skipped files are collected as warnings.
pub(super) fn print_discovery(discovery: &Discovery) {
    let mut printer = InfoPrinter::new(
        format!(
            "Found {} complete group(s) and {} incomplete cluster(s)",
            discovery.groups.len(),
            discovery.incomplete.len()
        )
        .into(),
    );
    for group in &discovery.groups {
        let mut block = vec![format!("{} ({} subbands)", group.key, group.files.len()).into()];
        block.extend(
            group
                .files
                .iter()
                .map(|f| format!("{}: {}", f.code, f.path.display()).into()),
        );
        printer.push_block(block);
    }
    for cluster in &discovery.incomplete {
        let mut line = format!("{} is incomplete", cluster.key);
        if !cluster.missing.is_empty() {
            line.push_str(&format!("; missing {}", cluster.missing.join(", ")));
        }
        if !cluster.duplicated.is_empty() {
            line.push_str(&format!("; duplicated {}", cluster.duplicated.join(", ")));
        }
        printer.push_line(line.into());
    }
    printer.display();

    if !discovery.skipped.is_empty() {
        discovery
            .skipped
            .iter()
            .map(|e| Cow::from(e.to_string()))
            .collect::<Vec<_>>()
            .warn();
    }
    display_warnings();
}
