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

//! Constants from `sysexits.h`, and the mapping from crate errors onto them.

use super::error::Error;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Sysexit(pub i32);

pub const EX_USAGE: Sysexit = Sysexit(64);
pub const EX_DATAERR: Sysexit = Sysexit(65);
pub const EX_NOINPUT: Sysexit = Sysexit(66);
pub const EX_UNAVAILABLE: Sysexit = Sysexit(69);
pub const EX_SOFTWARE: Sysexit = Sysexit(70);
pub const EX_OSERR: Sysexit = Sysexit(71);
pub const EX_CANTCREAT: Sysexit = Sysexit(73);
pub const EX_IOERR: Sysexit = Sysexit(74);
pub const EX_NOPERM: Sysexit = Sysexit(77);
pub const EX_CONFIG: Sysexit = Sysexit(78);

impl Sysexit {
    pub fn exit(self) -> ! {
        std::process::exit(self.0)
    }

    pub fn for_error(error: &Error) -> Self {
        match *error {
            Error::InvalidAlias(..) | Error::InvalidTarget { .. } => {
                EX_DATAERR
            }
            Error::TomlDe(..) => EX_DATAERR,
            Error::AuthenticationFailed => EX_NOPERM,
            Error::MissingTable(..) => EX_CONFIG,
            Error::Compile { .. } | Error::CommandFailed { .. } => {
                EX_UNAVAILABLE
            }
            Error::Swap(..) | Error::Io(..) => EX_IOERR,
            Error::Argon2(..) | Error::TomlSer(..) => EX_SOFTWARE,
        }
    }
}
