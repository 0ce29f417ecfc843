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

//! Reading table files into structured lines.

use std::ffi::OsString;
use std::fs;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};

use super::model::*;
use crate::support::error::Error;
use crate::support::file_ops::IgnoreKinds;

/// The files which make up one table on disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TablePaths {
    pub main: PathBuf,
    pub main_old: PathBuf,
    pub main_bad: PathBuf,
    pub spam: PathBuf,
    pub spam_old: PathBuf,
    pub spam_bad: PathBuf,
    pub lock: PathBuf,
}

impl TablePaths {
    pub fn new(main: impl Into<PathBuf>) -> Self {
        let main = main.into();
        let spam = with_suffix(&main, ".spam");
        TablePaths {
            main_old: with_suffix(&main, ".old"),
            main_bad: with_suffix(&main, ".bad"),
            spam_old: with_suffix(&spam, ".old"),
            spam_bad: with_suffix(&spam, ".bad"),
            lock: with_suffix(&main, ".lock"),
            main,
            spam,
        }
    }

    /// The directory in which the table files live.
    pub fn dir(&self) -> &Path {
        match self.main.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        }
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s = OsString::from(path.as_os_str());
    s.push(suffix);
    s.into()
}

/// Classify a single line of a table.
///
/// A line is an entry if, once trimmed, it does not start with `#`, it has at
/// least two white-space-separated fields, and the first field contains `@`.
/// Everything else is kept as an opaque line so that a damaged table does not
/// lose content when rewritten.
pub fn parse_line(line: &str) -> TableLine {
    let trimmed = line.trim();
    if trimmed.starts_with('#') {
        return TableLine::Other(line.to_owned());
    }

    let mut fields = trimmed.split_whitespace();
    match (fields.next(), fields.next()) {
        (Some(address), Some(first_dest)) if address.contains('@') => {
            let mut destination = first_dest.to_owned();
            for field in fields {
                destination.push(' ');
                destination.push_str(field);
            }

            TableLine::Alias(AliasRecord {
                address: address.to_owned(),
                destination,
                raw_line: line.to_owned(),
            })
        }
        _ => TableLine::Other(line.to_owned()),
    }
}

/// Read and parse the table file at `path`.
pub fn read_table(path: &Path) -> io::Result<Vec<TableLine>> {
    let reader = io::BufReader::new(fs::File::open(path)?);
    let mut lines = Vec::new();
    for line in reader.lines() {
        lines.push(parse_line(&line?));
    }
    Ok(lines)
}

/// Read the main and spam tables.
///
/// The main table must exist. A missing spam table simply has no lines.
pub fn read_snapshot(paths: &TablePaths) -> Result<TableSnapshot, Error> {
    let main = read_table(&paths.main)
        .map_err(|e| Error::MissingTable(paths.main.clone(), e))?;
    let spam = read_table(&paths.spam).ignore_not_found()?;
    Ok(TableSnapshot { main, spam })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_lines() {
        assert_eq!(
            TableLine::Other("# domain aliases".to_owned()),
            parse_line("# domain aliases")
        );
        assert_eq!(
            TableLine::Other("   # indented".to_owned()),
            parse_line("   # indented")
        );
        assert_eq!(TableLine::Other(String::new()), parse_line(""));
        assert_eq!(
            TableLine::Other("example.com anything".to_owned()),
            parse_line("example.com anything")
        );
        assert_eq!(
            TableLine::Other("lonely@example.com".to_owned()),
            parse_line("lonely@example.com")
        );

        assert_eq!(
            TableLine::Alias(AliasRecord {
                address: "alice@example.com".to_owned(),
                destination: "bob".to_owned(),
                raw_line: "alice@example.com    bob".to_owned(),
            }),
            parse_line("alice@example.com    bob")
        );
        assert_eq!(
            TableLine::Alias(AliasRecord {
                address: "junk@example.com".to_owned(),
                destination: "550 Stop spamming me".to_owned(),
                raw_line: "  junk@example.com \t550  Stop spamming me "
                    .to_owned(),
            }),
            parse_line("  junk@example.com \t550  Stop spamming me ")
        );
    }

    #[test]
    fn paths() {
        let paths = TablePaths::new("/etc/postfix/virtual");
        assert_eq!(Path::new("/etc/postfix/virtual.spam"), paths.spam);
        assert_eq!(Path::new("/etc/postfix/virtual.old"), paths.main_old);
        assert_eq!(Path::new("/etc/postfix/virtual.bad"), paths.main_bad);
        assert_eq!(Path::new("/etc/postfix/virtual.spam.old"), paths.spam_old);
        assert_eq!(Path::new("/etc/postfix/virtual.spam.bad"), paths.spam_bad);
        assert_eq!(Path::new("/etc/postfix/virtual.lock"), paths.lock);
        assert_eq!(Path::new("/etc/postfix"), paths.dir());
        assert_eq!(Path::new("."), TablePaths::new("virtual").dir());
    }

    #[test]
    fn read_main_and_spam() {
        let root = tempfile::TempDir::new().unwrap();
        let paths = TablePaths::new(root.path().join("virtual"));

        assert_matches!(
            Err(Error::MissingTable(..)),
            read_snapshot(&paths)
        );

        fs::write(
            &paths.main,
            "# domain aliases\r\nalice@example.com    bob\n\ngarbage\n",
        )
        .unwrap();
        let snapshot = read_snapshot(&paths).unwrap();
        assert_eq!(4, snapshot.main.len());
        assert!(snapshot.spam.is_empty());
        assert_eq!(
            TableLine::Other("# domain aliases".to_owned()),
            snapshot.main[0]
        );
        assert!(snapshot.contains("alice@example.com"));

        fs::write(&paths.spam, "junk@example.com 550 Go away\n").unwrap();
        let snapshot = read_snapshot(&paths).unwrap();
        assert_eq!(1, snapshot.spam.len());
        assert_eq!(
            vec!["alice@example.com", "junk@example.com"],
            snapshot
                .records()
                .map(|r| r.address.as_str())
                .collect::<Vec<_>>()
        );
    }
}
