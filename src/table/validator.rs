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

//! Acceptance checks applied to a change before anything is written.

use std::collections::BTreeSet;

use log::warn;

use super::address::{is_mailbox, parse_mailbox};
use super::rewrite::is_reject;
use crate::support::error::Error;

/// Determine whether `target` is an acceptable destination list.
///
/// A reject destination (see `is_reject`) is always acceptable. Otherwise,
/// every comma-separated entry must be either a valid RFC 5322 mailbox or
/// one of the domain's existing local destinations.
pub fn validate(target: &str, local: &BTreeSet<String>) -> bool {
    // A line break would end the table line early and let the remainder
    // through as a separate entry.
    if target.contains(|c: char| '\r' == c || '\n' == c) {
        warn!("Rejected multi-line alias target {:?}", target);
        return false;
    }

    if is_reject(target) {
        return true;
    }

    for entry in target.split(',').map(str::trim) {
        if is_mailbox(entry) || local.contains(entry) {
            continue;
        }

        warn!(
            "Attempted alias target {:?} is neither a valid email address nor \
             one of the recognised local destinations: {}",
            entry,
            local.iter().map(String::as_str).collect::<Vec<_>>().join(", "),
        );
        return false;
    }

    true
}

/// Resolve `alias` to the bare address it names in `domain`.
///
/// The alias may be in any RFC 5322 mailbox form, but must name an address
/// in exactly the given domain. The catch-all address `@domain` is also
/// permitted.
pub fn resolve_alias(domain: &str, alias: &str) -> Result<String, Error> {
    let catch_all = format!("@{}", domain);
    if alias == catch_all {
        return Ok(catch_all);
    }

    match parse_mailbox(alias).map(|a| a.to_address()) {
        // A leading `#` would turn the table line into a comment.
        Some(address)
            if address.ends_with(&catch_all)
                && !address.starts_with('#')
                && !address.contains(char::is_whitespace) =>
        {
            Ok(address)
        }
        _ => {
            warn!("{} Invalid alias: {:?}", domain, alias);
            Err(Error::InvalidAlias(alias.to_owned()))
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn local() -> BTreeSet<String> {
        ["bob", "dave"].iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn reject_targets_always_pass() {
        let none = BTreeSet::new();
        assert!(validate("spam", &none));
        assert!(validate("SPAM", &none));
        assert!(validate("550 No such user", &none));
        assert!(!validate("Spam", &none));
        assert!(!validate("550", &none));
    }

    #[test]
    fn entries_must_be_addresses_or_local() {
        assert!(validate("bob", &local()));
        assert!(validate(" bob , dave ", &local()));
        assert!(validate("unknown@otherdomain.org", &local()));
        assert!(validate("bob, Someone <someone@elsewhere.org>", &local()));
        assert!(!validate("notanaddress", &local()));
        assert!(!validate("bob,notanaddress", &local()));
        assert!(!validate("bob,", &local()));
        assert!(!validate("", &local()));
        assert!(!validate("Bob", &local()));
    }

    #[test]
    fn line_breaks_never_pass() {
        assert!(!validate("bob\nevil@example.com bob", &local()));
        assert!(!validate("550 go away\r\nevil@example.com bob", &local()));
    }

    #[test]
    fn aliases_resolve_within_domain() {
        assert_eq!(
            "eve@example.com",
            resolve_alias("example.com", "eve@example.com").unwrap()
        );
        assert_eq!(
            "eve@example.com",
            resolve_alias("example.com", "Eve <eve@example.com>").unwrap()
        );
        assert_eq!(
            "@example.com",
            resolve_alias("example.com", "@example.com").unwrap()
        );

        assert_matches!(
            Err(Error::InvalidAlias(..)),
            resolve_alias("example.com", "eve@example.org")
        );
        assert_matches!(
            Err(Error::InvalidAlias(..)),
            resolve_alias("example.com", "eve@notexample.com")
        );
        assert_matches!(
            Err(Error::InvalidAlias(..)),
            resolve_alias("example.com", "eve")
        );
        assert_matches!(
            Err(Error::InvalidAlias(..)),
            resolve_alias("example.com", "@example.org")
        );
        assert_matches!(
            Err(Error::InvalidAlias(..)),
            resolve_alias("example.com", "\"eve adams\"@example.com")
        );
        assert_matches!(
            Err(Error::InvalidAlias(..)),
            resolve_alias("example.com", "#x@example.com")
        );
        assert_matches!(
            Err(Error::InvalidAlias(..)),
            resolve_alias("example.com", "Eve <#eve@example.com>")
        );
        assert_eq!(
            "x#y@example.com",
            resolve_alias("example.com", "x#y@example.com").unwrap()
        );
    }
}
