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
use std::path::{Path, PathBuf};

use chrono::prelude::*;
use lazy_static::lazy_static;
use log::warn;
use rand::{rngs::OsRng, Rng};
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::error::Error;
use super::file_ops::{self, IgnoreKinds};

/// The system-wide configuration for Aliasmap.
///
/// This is stored in a file named `aliasmap.toml` under the Aliasmap root,
/// which is typically `/usr/local/etc/aliasmap` or `/etc/aliasmap`.
///
/// It is loaded once at startup and then only read; the only thing that
/// modifies it is `domain add`, which rewrites the whole file.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct SystemConfig {
    /// The external commands run after a table changes.
    #[serde(default)]
    pub commands: CommandsConfig,

    /// The mail domains whose tables may be edited.
    #[serde(default, rename = "domain")]
    pub domains: Vec<Domain>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct CommandsConfig {
    /// The program which builds the lookup index of a table. It is run with
    /// the path of the table as its only argument.
    pub compile: String,

    /// The command line which makes the mail service pick up new indices.
    pub reload: Vec<String>,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        CommandsConfig {
            compile: "postmap".to_owned(),
            reload: vec!["postfix".to_owned(), "reload".to_owned()],
        }
    }
}

/// One mail domain served by a table.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Domain {
    /// The domain name, e.g. `example.com`.
    pub name: String,
    /// The plaintext table holding this domain's aliases. Several domains
    /// may share one table.
    pub table_file: PathBuf,
    /// Argon2 encoded hash of the domain's password.
    pub credential_hash: String,
    /// If set, run with the domain name as its only argument after every
    /// successful change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_hook: Option<PathBuf>,
}

lazy_static! {
    static ref RX_DOMAIN_NAME: Regex = Regex::new(
        "^[A-Za-z0-9]([A-Za-z0-9-]*[A-Za-z0-9])?\
         (\\.[A-Za-z0-9]([A-Za-z0-9-]*[A-Za-z0-9])?)*$"
    )
    .unwrap();
}

pub fn is_valid_domain_name(name: &str) -> bool {
    name.len() <= 253 && RX_DOMAIN_NAME.is_match(name)
}

impl SystemConfig {
    pub fn load(path: &Path) -> Result<Self, Error> {
        let data = fs::read(path)?;
        Ok(toml::from_slice(&data)?)
    }

    /// Like `load`, but a missing file is an empty configuration.
    pub fn load_or_default(path: &Path) -> Result<Self, Error> {
        let data = fs::read(path).ignore_not_found()?;
        Ok(toml::from_slice(&data)?)
    }

    /// Atomically replace the configuration at `path` with `self`.
    ///
    /// If a configuration already existed, it is kept under a timestamped
    /// backup name, which is returned.
    pub fn save(&self, path: &Path) -> Result<Option<PathBuf>, Error> {
        let data = toml::to_vec(self)?;
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };

        let backup = if path.is_file() {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let backup = dir.join(format!(
                "{}.backup-{}",
                name,
                Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            ));
            file_ops::link_backup(path, &backup)?;
            Some(backup)
        } else {
            None
        };

        file_ops::spit(dir, path, 0o600, &data)?;
        Ok(backup)
    }

    pub fn domain(&self, name: &str) -> Option<&Domain> {
        self.domains.iter().find(|d| d.name == name)
    }

    /// Return the named domain if `password` is its credential.
    ///
    /// Unknown domains and wrong passwords are indistinguishable to the
    /// caller.
    pub fn authenticate(
        &self,
        name: &str,
        password: &[u8],
    ) -> Result<&Domain, Error> {
        let domain = self.domain(name).ok_or(Error::AuthenticationFailed)?;
        match argon2::verify_encoded(&domain.credential_hash, password) {
            Ok(true) => Ok(domain),
            Ok(false) => Err(Error::AuthenticationFailed),
            Err(e) => {
                warn!("{} Unusable credential hash: {}", domain.name, e);
                Err(Error::AuthenticationFailed)
            }
        }
    }

    /// Add the named domain, or update the table and credential of the
    /// existing domain with that name.
    pub fn upsert_domain(
        &mut self,
        name: &str,
        table_file: PathBuf,
        password: &[u8],
    ) -> Result<(), Error> {
        let credential_hash = hash_credential(password)?;
        if let Some(existing) =
            self.domains.iter_mut().find(|d| d.name == name)
        {
            existing.table_file = table_file;
            existing.credential_hash = credential_hash;
        } else {
            self.domains.push(Domain {
                name: name.to_owned(),
                table_file,
                credential_hash,
                post_hook: None,
            });
        }

        Ok(())
    }
}

fn hash_credential(password: &[u8]) -> Result<String, argon2::Error> {
    let salt: [u8; 16] = OsRng.gen();
    argon2::hash_encoded(
        password,
        &salt,
        &argon2::Config {
            hash_length: 32,
            lanes: 1,
            mem_cost: 4096,
            thread_mode: argon2::ThreadMode::Sequential,
            time_cost: 10,
            variant: argon2::Variant::Argon2i,
            version: argon2::Version::Version13,
            ..argon2::Config::default()
        },
    )
}
