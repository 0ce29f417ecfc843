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

use std::mem;
use std::path::{Path, PathBuf};

use structopt::StructOpt;

use crate::support::sysexits::*;
use crate::support::system_config::SystemConfig;

pub(super) const CONFIG_FILE: &str = "aliasmap.toml";

#[derive(StructOpt)]
#[structopt(max_term_width = 80)]
enum Command {
    /// Manage the domains whose alias tables may be edited.
    Domain(DomainSubcommand),
    /// Inspect or edit the aliases of a domain.
    Alias(AliasSubcommand),
}

#[derive(StructOpt, Default)]
pub(super) struct CommonOptions {
    /// The directory containing `aliasmap.toml` etc
    /// [default: /etc/aliasmap or /usr/local/etc/aliasmap]
    #[structopt(long, parse(from_os_str))]
    root: Option<PathBuf>,
}

#[derive(StructOpt)]
enum DomainSubcommand {
    /// Add a domain, or replace the table and password of an existing one.
    ///
    /// The configuration file is replaced atomically. The previous version is
    /// kept beside it with the time of the change appended to its name.
    Add(DomainAddSubcommand),
}

#[derive(StructOpt)]
pub(super) struct DomainAddSubcommand {
    #[structopt(flatten)]
    pub(super) common: CommonOptions,

    /// The plaintext alias table holding the domain's aliases.
    /// Required when adding a new domain.
    #[structopt(long, parse(from_os_str))]
    pub(super) table: Option<PathBuf>,

    /// The password for the domain. If not given, it is prompted for.
    #[structopt(long)]
    pub(super) password: Option<String>,

    /// The domain name, e.g. example.com
    pub(super) name: String,
}

#[derive(StructOpt, Default)]
pub(super) struct AliasCommonOptions {
    #[structopt(flatten)]
    pub(super) common: CommonOptions,

    /// The password of the domain. If not given, it is prompted for.
    #[structopt(long)]
    pub(super) password: Option<String>,

    /// The domain whose aliases to operate on.
    pub(super) domain: String,
}

#[derive(StructOpt)]
enum AliasSubcommand {
    /// Print every alias of the domain, including those in the spam table.
    List(AliasCommonOptions),
    /// Add, replace or remove aliases of a domain.
    ///
    /// Changes can come from a batch file, from --user/--dest, and from any
    /// number of --remove options, all at once. They are applied together:
    /// if any of them is invalid, nothing is changed.
    ///
    /// The batch file is TOML with one [[change]] table per change, each
    /// having `op` ("add" or "remove"), `alias`, and for "add", `target`.
    ///
    /// A target is a comma-separated list of email addresses and local
    /// destinations already used in the domain. A target of "spam" or
    /// "SPAM", or one starting with "550 ", rejects mail to the alias; such
    /// aliases are kept in the separate spam table.
    ///
    /// After the tables are rewritten, they are compiled and the mail service
    /// is reloaded. If compilation fails, the previous tables are restored
    /// and the rejected ones are kept with a ".bad" suffix.
    Change(AliasChangeSubcommand),
}

#[derive(StructOpt)]
pub(super) struct AliasChangeSubcommand {
    #[structopt(flatten)]
    pub(super) common: AliasCommonOptions,

    /// Read changes from this TOML file. "-" will read from stdin.
    #[structopt(long, parse(from_os_str))]
    pub(super) batch: Option<PathBuf>,

    /// Set the alias with this local part. Requires --dest.
    #[structopt(long, requires = "dest")]
    pub(super) user: Option<String>,

    /// The target for the alias given by --user.
    #[structopt(long, requires = "user")]
    pub(super) dest: Option<String>,

    /// Remove this alias. Can be passed multiple times.
    #[structopt(long, number_of_values(1))]
    pub(super) remove: Vec<String>,
}

impl Command {
    fn common_options(&mut self) -> CommonOptions {
        match *self {
            Command::Domain(DomainSubcommand::Add(ref mut c)) => {
                mem::take(&mut c.common)
            }
            Command::Alias(AliasSubcommand::List(ref mut c)) => {
                mem::take(&mut c.common)
            }
            Command::Alias(AliasSubcommand::Change(ref mut c)) => {
                mem::take(&mut c.common.common)
            }
        }
    }
}

pub fn main() {
    // Clap exits with status 1 instead of EX_USAGE if we use the more concise
    // API
    let matches = match Command::clap().get_matches_safe() {
        Ok(matches) => matches,
        Err(
            e @ clap::Error {
                kind: clap::ErrorKind::HelpDisplayed,
                ..
            },
        )
        | Err(
            e @ clap::Error {
                kind: clap::ErrorKind::VersionDisplayed,
                ..
            },
        ) => {
            println!("{}", e.message);
            return;
        }
        Err(e) => {
            eprintln!("{}", e.message);
            EX_USAGE.exit()
        }
    };

    let mut cmd = Command::from_clap(&matches);
    let common = cmd.common_options();
    let root = common.root.unwrap_or_else(|| {
        if Path::new("/etc/aliasmap/aliasmap.toml").is_file() {
            "/etc/aliasmap".to_owned().into()
        } else if Path::new("/usr/local/etc/aliasmap/aliasmap.toml").is_file()
        {
            "/usr/local/etc/aliasmap".to_owned().into()
        } else {
            eprintln!(
                "Neither /etc/aliasmap nor /usr/local/etc/aliasmap contains\n\
                 aliasmap.toml; use --root=/path/to/aliasmap if your\n\
                 installation is elsewhere."
            );
            EX_CONFIG.exit()
        }
    });

    init_logging(&root);

    match cmd {
        Command::Domain(DomainSubcommand::Add(cmd)) => {
            super::domain::add(cmd, &root)
        }
        Command::Alias(AliasSubcommand::List(cmd)) => {
            super::alias::list(cmd, &load_config(&root))
        }
        Command::Alias(AliasSubcommand::Change(cmd)) => {
            super::alias::change(cmd, &load_config(&root))
        }
    }
}

fn load_config(root: &Path) -> SystemConfig {
    let system_config_path = root.join(CONFIG_FILE);
    match SystemConfig::load(&system_config_path) {
        Ok(config) => config,
        Err(e) => die!(
            EX_CONFIG,
            "Error in config file at '{}': {}",
            system_config_path.display(),
            e
        ),
    }
}

fn init_logging(root: &Path) {
    if Ok(true) == nix::unistd::isatty(2) {
        // Running interactively; ignore logging configuration and just write
        // to stderr.
        crate::init_simple_log();
        return;
    }

    let log_config_file = root.join("logging.toml");
    if log_config_file.is_file() {
        if let Err(e) = log4rs::init_file(
            &log_config_file,
            log4rs::file::Deserializers::new(),
        ) {
            die!(
                EX_CONFIG,
                "Error in logging config at '{}': {}",
                log_config_file.display(),
                e
            );
        }
    } else {
        let formatter = syslog::Formatter3164 {
            facility: syslog::Facility::LOG_MAIL,
            hostname: None,
            process: env!("CARGO_PKG_NAME").to_owned(),
            pid: nix::unistd::getpid().as_raw(),
        };

        match syslog::unix(formatter) {
            Ok(logger) => {
                let _ = log::set_boxed_logger(Box::new(
                    syslog::BasicLogger::new(logger),
                ))
                .map(|_| log::set_max_level(log::LevelFilter::Info));
            }
            // Not fatal; the outcome of every command is also reported on
            // stdout/stderr.
            Err(e) => eprintln!("Failed to connect to syslog: {}", e),
        }
    }
}

/// Obtain a password, either the one given on the command line or by
/// prompting on the terminal.
pub(super) fn password(given: Option<String>, confirm: bool) -> String {
    let result = match given {
        Some(given) => Ok((given.clone(), given)),
        None => rpassword::prompt_password("Password: ").and_then(|a| {
            if confirm {
                rpassword::prompt_password("Confirm: ").map(|b| (a, b))
            } else {
                Ok((a.clone(), a))
            }
        }),
    };

    match result {
        Err(e) => die!(EX_NOINPUT, "Failed to read password: {}", e),
        Ok((a, b)) if a != b => die!(EX_DATAERR, "Passwords don't match"),
        Ok((a, _)) if a.is_empty() => die!(EX_NOINPUT, "No password given"),
        Ok((a, _)) => a,
    }
}
