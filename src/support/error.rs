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

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Table file '{}' is unreadable: {}", .0.display(), .1)]
    MissingTable(PathBuf, #[source] io::Error),
    #[error("invalid alias: {0}")]
    InvalidAlias(String),
    #[error("invalid email address list for {alias}: {target}")]
    InvalidTarget { alias: String, target: String },
    #[error("Failed to swap in '{}': {}", .0.display(), .1)]
    Swap(PathBuf, #[source] io::Error),
    #[error("Failed to compile '{}': {}", .path.display(), .source)]
    Compile {
        path: PathBuf,
        #[source]
        source: Box<Error>,
    },
    #[error("`{command}` failed: {status}")]
    CommandFailed { command: String, status: String },
    #[error("Authentication failed")]
    AuthenticationFailed,
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Argon2(#[from] argon2::Error),
    #[error(transparent)]
    TomlDe(#[from] toml::de::Error),
    #[error(transparent)]
    TomlSer(#[from] toml::ser::Error),
}

/// A failure which did not prevent the main table from being committed.
#[derive(Error, Debug)]
pub enum Warning {
    #[error("Could not back up spam table '{}': {}", .0.display(), .1)]
    SpamBackup(PathBuf, #[source] io::Error),
    #[error("Could not swap in spam table '{}': {}", .0.display(), .1)]
    SpamSwap(PathBuf, #[source] io::Error),
    #[error("Spam table not compiled: {0}")]
    SpamCompile(#[source] Error),
    #[error("Service reload failed: {0}")]
    Reload(#[source] Error),
    #[error("Post-change hook failed: {0}")]
    Hook(#[source] Error),
}
