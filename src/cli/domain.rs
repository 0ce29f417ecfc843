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

use std::env;
use std::path::Path;

use super::main::{DomainAddSubcommand, CONFIG_FILE};
use crate::support::system_config::{is_valid_domain_name, SystemConfig};

pub(super) fn add(cmd: DomainAddSubcommand, root: &Path) {
    if !is_valid_domain_name(&cmd.name) {
        die!(EX_USAGE, "Invalid domain name: {}", cmd.name);
    }

    let config_path = root.join(CONFIG_FILE);
    let mut config = match SystemConfig::load_or_default(&config_path) {
        Ok(config) => config,
        Err(e) => die!(
            EX_CONFIG,
            "Error in config file at '{}': {}",
            config_path.display(),
            e
        ),
    };

    let table_file = match (cmd.table, config.domain(&cmd.name)) {
        (Some(table), _) if table.is_relative() => match env::current_dir() {
            Ok(cwd) => cwd.join(table),
            Err(e) => {
                die!(EX_OSERR, "Unable to determine current directory: {}", e)
            }
        },
        (Some(table), _) => table,
        (None, Some(existing)) => existing.table_file.clone(),
        (None, None) => {
            die!(EX_USAGE, "--table is required to add a new domain")
        }
    };

    if !table_file.is_file() {
        eprintln!(
            "Note: '{}' does not exist yet; aliases of {} cannot be \
             changed until it does",
            table_file.display(),
            cmd.name
        );
    }

    let password = super::main::password(cmd.password, true);
    if let Err(e) =
        config.upsert_domain(&cmd.name, table_file, password.as_bytes())
    {
        die!(EX_SOFTWARE, "Failed to hash password: {}", e);
    }

    match config.save(&config_path) {
        Ok(Some(backup)) => println!(
            "Updated '{}'; the previous version is '{}'",
            config_path.display(),
            backup.display()
        ),
        Ok(None) => println!("Created '{}'", config_path.display()),
        Err(e) => die!(
            EX_CANTCREAT,
            "Failed to write '{}': {}",
            config_path.display(),
            e
        ),
    }
}
