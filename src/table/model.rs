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

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::support::error::Error;

/// One routing entry of a table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AliasRecord {
    /// The routed address. Always contains an `@`.
    pub address: String,
    /// Everything after the address, with runs of white space collapsed.
    pub destination: String,
    /// The line exactly as it was read, without its line terminator.
    pub raw_line: String,
}

/// A single line of a table file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TableLine {
    Alias(AliasRecord),
    /// A comment, blank line, or anything not recognised as an entry. Kept
    /// verbatim.
    Other(String),
}

/// The content of a main table and its spam side table at one point in time.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TableSnapshot {
    pub main: Vec<TableLine>,
    pub spam: Vec<TableLine>,
}

impl TableSnapshot {
    /// Iterate the records of both tables, main table first.
    pub fn records(&self) -> impl Iterator<Item = &AliasRecord> + '_ {
        self.main.iter().chain(self.spam.iter()).filter_map(|l| match *l {
            TableLine::Alias(ref r) => Some(r),
            TableLine::Other(..) => None,
        })
    }

    /// Iterate the records belonging to the given domain.
    pub fn domain_records<'a>(
        &'a self,
        domain: &'a str,
    ) -> impl Iterator<Item = &'a AliasRecord> + 'a {
        self.records()
            .filter(move |r| belongs_to_domain(&r.address, domain))
    }

    /// Return the set of local destinations for `domain`.
    ///
    /// These are the individual destinations of the domain's records, except
    /// for records which forward somewhere else (contain `@`) or deliver to a
    /// command (contain `|`).
    pub fn local_destinations(&self, domain: &str) -> BTreeSet<String> {
        self.domain_records(domain)
            .filter(|r| {
                !r.destination.contains(|c: char| '@' == c || '|' == c)
            })
            .flat_map(|r| r.destination.split(','))
            .map(|d| d.trim().to_owned())
            .filter(|d| !d.is_empty())
            .collect()
    }

    /// Whether either table has an entry for `address`.
    pub fn contains(&self, address: &str) -> bool {
        self.records().any(|r| r.address == address)
    }
}

pub fn belongs_to_domain(address: &str, domain: &str) -> bool {
    address
        .strip_suffix(domain)
        .map_or(false, |head| head.ends_with('@'))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOp {
    Add,
    Remove,
}

/// A single requested change to a domain's table.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChangeRequest {
    pub op: ChangeOp,
    pub alias: String,
    /// Comma-separated destinations for `Add`; ignored for `Remove`.
    #[serde(default)]
    pub target: String,
}

impl ChangeRequest {
    pub fn add(alias: impl Into<String>, target: impl Into<String>) -> Self {
        ChangeRequest {
            op: ChangeOp::Add,
            alias: alias.into(),
            target: target.into(),
        }
    }

    pub fn remove(alias: impl Into<String>) -> Self {
        ChangeRequest {
            op: ChangeOp::Remove,
            alias: alias.into(),
            target: String::new(),
        }
    }
}

/// A file of change requests, as accepted by `alias change --batch`.
///
/// ```toml
/// [[change]]
/// op = "add"
/// alias = "eve@example.com"
/// target = "bob"
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChangeBatch {
    #[serde(default)]
    pub change: Vec<ChangeRequest>,
}

impl ChangeBatch {
    pub fn parse(text: &str) -> Result<Self, Error> {
        Ok(toml::from_str(text)?)
    }
}
