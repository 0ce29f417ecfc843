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

//! Miscellaneous functions for working with files.

use std::fs;
use std::io::{self, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

/// Write `data` into the file at `path`, atomically.
///
/// The file will first be staged within `tmp`, which must be on the same file
/// system as `path`.
pub fn spit(
    tmp: impl AsRef<Path>,
    path: impl AsRef<Path>,
    mode: u32,
    data: &[u8],
) -> io::Result<()> {
    let mut tf = tempfile::NamedTempFile::new_in(tmp)?;
    tf.as_file_mut().write_all(data)?;
    chmod(tf.path(), mode)?;
    tf.as_file_mut().sync_all()?;
    tf.persist(path)?;
    Ok(())
}

/// Make `backup` another name for the file currently at `current`.
///
/// Anything already at `backup` is replaced. `current` itself is never
/// unlinked, so readers of `current` never find it missing.
pub fn link_backup(
    current: impl AsRef<Path>,
    backup: impl AsRef<Path>,
) -> io::Result<()> {
    let backup = backup.as_ref();
    fs::remove_file(backup).ignore_not_found()?;
    fs::hard_link(current, backup)
}

/// Return the permission bits of `path`, or `default` if it does not exist.
pub fn mode_of(path: impl AsRef<Path>, default: u32) -> io::Result<u32> {
    match fs::metadata(path) {
        Ok(md) => Ok(md.permissions().mode() & 0o7777),
        Err(e) if io::ErrorKind::NotFound == e.kind() => Ok(default),
        Err(e) => Err(e),
    }
}

pub fn chmod(path: impl AsRef<Path>, mode: u32) -> io::Result<()> {
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

pub trait IgnoreKinds {
    fn ignore_not_found(self) -> Self;
}

impl<R: Default> IgnoreKinds for Result<R, io::Error> {
    fn ignore_not_found(self) -> Self {
        match self {
            Ok(r) => Ok(r),
            Err(e) if io::ErrorKind::NotFound == e.kind() => Ok(R::default()),
            Err(e) => Err(e),
        }
    }
}
