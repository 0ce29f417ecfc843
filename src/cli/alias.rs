//-
// Copyright (c) 2023, Jason Lingle
//
// This file is part of Aliasmap.
//
// Aliasmap is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free
// Software Foundation, either version 3 of the License, or (at your option)
// any later version.
//
// Aliasmap is distributed in the hope that it will be useful, but WITHOUT ANY
// WARRANTY; without  even the implied  warranty of MERCHANTABILITY  or FITNESS
// FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License for  more
// details.
//
// You should have received a copy of the GNU General Public License along with
// Aliasmap. If not, see <http://www.gnu.org/licenses/>.

use std::fs;
use std::io::{self, Read};
use std::path::Path;

use super::main::{AliasChangeSubcommand, AliasCommonOptions};
use crate::support::error::Error;
use crate::support::sysexits::*;
use crate::support::system_config::{Domain, SystemConfig};
use crate::table::engine::RewriteEngine;
use crate::table::model::{ChangeBatch, ChangeRequest};
use crate::table::rewrite::format_line;

pub(super) fn list(cmd: AliasCommonOptions, config: &SystemConfig) {
    let domain = authenticate(&cmd, config);
    let engine = RewriteEngine::from_config(&config.commands);

    match engine.list(domain) {
        Ok(records) => {
            for record in records {
                println!(
                    "{}",
                    format_line(&record.address, &record.destination)
                );
            }
        }
        Err(e) => fail(e),
    }
}

pub(super) fn change(cmd: AliasChangeSubcommand, config: &SystemConfig) {
    let domain = authenticate(&cmd.common, config);

    let mut changes = Vec::new();
    if let Some(ref batch) = cmd.batch {
        changes.extend(read_batch(batch).change);
    }
    if let (Some(user), Some(dest)) = (cmd.user, cmd.dest) {
        changes.push(ChangeRequest::add(
            format!("{}@{}", user.trim(), domain.name),
            dest.trim(),
        ));
    }
    changes.extend(cmd.remove.into_iter().map(ChangeRequest::remove));

    if changes.is_empty() {
        die!(
            EX_USAGE,
            "Nothing to change; use --batch, --user and --dest, or --remove"
        );
    }

    let engine = RewriteEngine::from_config(&config.commands);
    match engine.change(domain, &changes) {
        Ok(warnings) => {
            for warning in &warnings {
                eprintln!("Warning: {}", warning);
            }
            println!(
                "Applied {} change(s) to {}",
                changes.len(),
                domain.name
            );
        }
        Err(e) => fail(e),
    }
}

fn authenticate<'a>(
    cmd: &AliasCommonOptions,
    config: &'a SystemConfig,
) -> &'a Domain {
    let password = super::main::password(cmd.password.clone(), false);
    match config.authenticate(&cmd.domain, password.as_bytes()) {
        Ok(domain) => domain,
        Err(e) => die!(EX_NOPERM, "{}: {}", cmd.domain, e),
    }
}

fn read_batch(path: &Path) -> ChangeBatch {
    let mut text = String::new();
    let result = if Path::new("-") == path {
        io::stdin().read_to_string(&mut text)
    } else {
        fs::File::open(path).and_then(|mut f| f.read_to_string(&mut text))
    };

    if let Err(e) = result {
        die!(EX_NOINPUT, "Error reading '{}': {}", path.display(), e);
    }

    match ChangeBatch::parse(&text) {
        Ok(batch) => batch,
        Err(e) => die!(EX_DATAERR, "Error in '{}': {}", path.display(), e),
    }
}

fn fail(e: Error) -> ! {
    eprintln!("{}", e);
    Sysexit::for_error(&e).exit()
}
