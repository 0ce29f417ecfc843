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

//! The external programs run after a table changes.
//!
//! The engine only sees the traits here, so tests can substitute fakes for the
//! real commands.

use std::path::Path;
use std::process::{Command, Stdio};

use crate::support::error::Error;
use crate::support::system_config::Domain;

/// Builds the fast-lookup index of a plaintext table.
pub trait TableCompiler: Send + Sync {
    fn compile(&self, table: &Path) -> Result<(), Error>;
}

/// Makes the mail service adopt freshly compiled tables.
pub trait ServiceNotifier: Send + Sync {
    fn reload(&self) -> Result<(), Error>;
}

/// Runs a domain's post-change hook.
pub trait DomainHook: Send + Sync {
    fn run_hook(&self, domain: &Domain) -> Result<(), Error>;
}

fn run(command: &mut Command) -> Result<(), Error> {
    let description = format!("{:?}", command);
    let status = command.stdin(Stdio::null()).status().map_err(|e| {
        Error::CommandFailed {
            command: description.clone(),
            status: e.to_string(),
        }
    })?;

    if status.success() {
        Ok(())
    } else {
        Err(Error::CommandFailed {
            command: description,
            status: status.to_string(),
        })
    }
}

/// Runs `<program> <table>`, e.g. `postmap /etc/postfix/virtual`.
#[derive(Clone, Debug)]
pub struct CommandCompiler {
    program: String,
}

impl CommandCompiler {
    pub fn new(program: impl Into<String>) -> Self {
        CommandCompiler {
            program: program.into(),
        }
    }
}

impl TableCompiler for CommandCompiler {
    fn compile(&self, table: &Path) -> Result<(), Error> {
        run(Command::new(&self.program).arg(table))
    }
}

/// Runs a fixed command line, e.g. `postfix reload`. An empty command line
/// does nothing.
#[derive(Clone, Debug)]
pub struct CommandNotifier {
    argv: Vec<String>,
}

impl CommandNotifier {
    pub fn new(argv: Vec<String>) -> Self {
        CommandNotifier { argv }
    }
}

impl ServiceNotifier for CommandNotifier {
    fn reload(&self) -> Result<(), Error> {
        match self.argv.split_first() {
            Some((program, args)) => run(Command::new(program).args(args)),
            None => Ok(()),
        }
    }
}

/// Runs `<post_hook> <domain name>` for domains which configure a hook.
#[derive(Clone, Copy, Debug, Default)]
pub struct ScriptHook;

impl DomainHook for ScriptHook {
    fn run_hook(&self, domain: &Domain) -> Result<(), Error> {
        match domain.post_hook {
            Some(ref hook) => run(Command::new(hook).arg(&domain.name)),
            None => Ok(()),
        }
    }
}
