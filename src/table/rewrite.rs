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

//! Computing the new content of a table from its old content and a batch of
//! changes.
//!
//! Everything here is pure; reading and writing the files is the job of the
//! engine.

use std::collections::{BTreeMap, BTreeSet};

use log::debug;

use super::model::*;
use super::validator::{resolve_alias, validate};
use crate::support::error::Error;

/// Destinations start at this column when an entry is (re)formatted, unless
/// the address is too long, in which case a single space separates them.
pub const DESTINATION_COLUMN: usize = 40;

/// The reject message used when a destination is just a spam marker.
pub const DEFAULT_REJECT: &str = "550 Stop spamming me";

const SPAM_MARKERS: &[&str] = &["spam", "SPAM"];
const REJECT_PREFIX: &str = "550 ";

/// Whether `destination` means the mail should be refused rather than
/// delivered. Such entries live in the spam table.
pub fn is_reject(destination: &str) -> bool {
    SPAM_MARKERS.contains(&destination)
        || destination.starts_with(REJECT_PREFIX)
}

/// Which table an entry belongs in, and the destination it gets there.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Route {
    Main(String),
    Spam(String),
}

pub fn route(destination: &str) -> Route {
    if SPAM_MARKERS.contains(&destination) {
        Route::Spam(DEFAULT_REJECT.to_owned())
    } else if destination.starts_with(REJECT_PREFIX) {
        Route::Spam(destination.to_owned())
    } else {
        Route::Main(destination.to_owned())
    }
}

/// Format an entry the way the mail service expects it.
pub fn format_line(address: &str, destination: &str) -> String {
    let pad = DESTINATION_COLUMN.saturating_sub(address.len()).max(1);
    format!("{}{:pad$}{}", address, "", destination, pad = pad)
}

/// The pending changes of one request, keyed by address.
///
/// A value of `None` means the address is to be deleted. Once a change has
/// been written out, its value is taken, so the address is neither written
/// again nor kept if the table has further lines for it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RewriteBatch {
    changes: BTreeMap<String, Option<String>>,
}

impl RewriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and normalise `changes` against the current content of the
    /// domain's tables.
    ///
    /// Nothing is returned unless every change is acceptable. Later changes
    /// to the same address replace earlier ones.
    pub fn from_requests(
        domain: &str,
        snapshot: &TableSnapshot,
        changes: &[ChangeRequest],
    ) -> Result<Self, Error> {
        let local = snapshot.local_destinations(domain);
        let mut batch = Self::new();

        for change in changes {
            let address = resolve_alias(domain, &change.alias)?;
            match change.op {
                ChangeOp::Remove => {
                    if !snapshot.contains(&address) {
                        debug!("{} Removing absent alias {}", domain, address);
                    }
                    batch.remove(address)
                }
                ChangeOp::Add => {
                    let target = change.target.trim();
                    if !validate(target, &local) {
                        return Err(Error::InvalidTarget {
                            alias: address,
                            target: change.target.clone(),
                        });
                    }

                    batch.set(address, target.to_owned());
                }
            }
        }

        Ok(batch)
    }

    pub fn set(&mut self, address: String, destination: String) {
        self.changes.insert(address, Some(destination));
    }

    pub fn remove(&mut self, address: String) {
        self.changes.insert(address, None);
    }

    /// The pending change for `address`, if any. `Some(None)` means the
    /// address is to be removed.
    pub fn get(&self, address: &str) -> Option<Option<&str>> {
        self.changes.get(address).map(Option::as_deref)
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// The new lines of the main and spam tables, without line terminators.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RewrittenTables {
    pub main: Vec<String>,
    pub spam: Vec<String>,
}

impl RewrittenTables {
    fn emit(&mut self, address: &str, destination: &str) {
        match route(destination) {
            Route::Main(d) => self.main.push(format_line(address, &d)),
            Route::Spam(d) => self.spam.push(format_line(address, &d)),
        }
    }
}

/// Apply `batch` to `snapshot`.
///
/// The main table is streamed first, then the spam table. Comment and other
/// unrecognised lines stay in the table they came from. Entries with a
/// pending change are rewritten in place (or dropped); other entries keep
/// their exact text but move to whichever table their destination belongs
/// in. Only the first entry for an address is kept, so no address ends up
/// in both tables. Addresses not yet in either table are appended in address
/// order.
pub fn rewrite(
    snapshot: &TableSnapshot,
    mut batch: RewriteBatch,
) -> RewrittenTables {
    let mut out = RewrittenTables::default();
    let mut kept = BTreeSet::new();

    for &(lines, from_spam) in
        &[(&snapshot.main, false), (&snapshot.spam, true)]
    {
        for line in lines {
            let record = match *line {
                TableLine::Other(ref text) => {
                    if from_spam {
                        out.spam.push(text.clone());
                    } else {
                        out.main.push(text.clone());
                    }
                    continue;
                }
                TableLine::Alias(ref record) => record,
            };

            if let Some(pending) = batch.changes.get_mut(&record.address) {
                if let Some(destination) = pending.take() {
                    out.emit(&record.address, &destination);
                }
            } else if !kept.insert(record.address.as_str()) {
                continue;
            } else if SPAM_MARKERS.contains(&&*record.destination) {
                out.emit(&record.address, &record.destination);
            } else if is_reject(&record.destination) {
                out.spam.push(record.raw_line.clone());
            } else {
                out.main.push(record.raw_line.clone());
            }
        }
    }

    for (address, pending) in batch.changes {
        if let Some(destination) = pending {
            out.emit(&address, &destination);
        }
    }

    out
}

#[cfg(test)]
mod test {
    use std::collections::BTreeSet;

    use proptest::prelude::*;

    use super::super::record_store::parse_line;
    use super::*;

    const SAMPLE: &str = "# domain aliases\n\
                          alice@example.com    bob\n\
                          carol@example.com    bob,dave\n";

    fn snapshot(main: &str, spam: &str) -> TableSnapshot {
        TableSnapshot {
            main: main.lines().map(parse_line).collect(),
            spam: spam.lines().map(parse_line).collect(),
        }
    }

    fn reparse(tables: &RewrittenTables) -> TableSnapshot {
        TableSnapshot {
            main: tables.main.iter().map(|l| parse_line(l)).collect(),
            spam: tables.spam.iter().map(|l| parse_line(l)).collect(),
        }
    }

    fn batch(changes: &[ChangeRequest]) -> RewriteBatch {
        RewriteBatch::from_requests(
            "example.com",
            &snapshot(SAMPLE, ""),
            changes,
        )
        .unwrap()
    }

    #[test]
    fn format_pads_to_column() {
        assert_eq!(
            format!("eve@example.com{}bob", " ".repeat(25)),
            format_line("eve@example.com", "bob")
        );
        let long = "a".repeat(39) + "@x";
        assert_eq!(format!("{} bob", long), format_line(&long, "bob"));
        let exact = "a".repeat(38) + "@x";
        assert_eq!(format!("{} bob", exact), format_line(&exact, "bob"));
    }

    #[test]
    fn routing() {
        assert_eq!(Route::Spam(DEFAULT_REJECT.to_owned()), route("spam"));
        assert_eq!(Route::Spam(DEFAULT_REJECT.to_owned()), route("SPAM"));
        assert_eq!(
            Route::Spam("550 No thanks".to_owned()),
            route("550 No thanks")
        );
        assert_eq!(Route::Main("bob".to_owned()), route("bob"));
        assert_eq!(Route::Main("5500 bob".to_owned()), route("5500 bob"));
    }

    #[test]
    fn add_with_local_destination() {
        let out = rewrite(
            &snapshot(SAMPLE, ""),
            batch(&[ChangeRequest::add("eve@example.com", "bob")]),
        );
        assert_eq!(
            vec![
                "# domain aliases".to_owned(),
                "alice@example.com    bob".to_owned(),
                "carol@example.com    bob,dave".to_owned(),
                format_line("eve@example.com", "bob"),
            ],
            out.main
        );
        assert!(out.spam.is_empty());
    }

    #[test]
    fn add_spam() {
        let out = rewrite(
            &snapshot(SAMPLE, ""),
            batch(&[ChangeRequest::add("mallory@example.com", "spam")]),
        );
        assert_eq!(3, out.main.len());
        assert_eq!(
            vec![format_line("mallory@example.com", "550 Stop spamming me")],
            out.spam
        );
    }

    #[test]
    fn remove_existing_and_missing() {
        let out = rewrite(
            &snapshot(SAMPLE, ""),
            batch(&[
                ChangeRequest::remove("alice@example.com"),
                ChangeRequest::remove("nobody@example.com"),
            ]),
        );
        assert_eq!(
            vec![
                "# domain aliases".to_owned(),
                "carol@example.com    bob,dave".to_owned(),
            ],
            out.main
        );
        assert!(out.spam.is_empty());
    }

    #[test]
    fn external_target_accepted() {
        let b = batch(&[ChangeRequest::add(
            "oscar@example.com",
            "unknown@otherdomain.org",
        )]);
        assert_eq!(
            Some(Some("unknown@otherdomain.org")),
            b.get("oscar@example.com")
        );
    }

    #[test]
    fn invalid_target_rejects_whole_batch() {
        let result = RewriteBatch::from_requests(
            "example.com",
            &snapshot(SAMPLE, ""),
            &[
                ChangeRequest::add("eve@example.com", "bob"),
                ChangeRequest::add("trent@example.com", "notanaddress"),
            ],
        );
        match result {
            Err(Error::InvalidTarget { alias, target }) => {
                assert_eq!("trent@example.com", alias);
                assert_eq!("notanaddress", target);
            }
            r => panic!("Unexpected result: {:?}", r),
        }
    }

    #[test]
    fn later_add_wins() {
        let b = batch(&[
            ChangeRequest::add("eve@example.com", "bob"),
            ChangeRequest::remove("eve@example.com"),
            ChangeRequest::add("eve@example.com", "dave"),
        ]);
        assert_eq!(1, b.len());
        assert_eq!(Some(Some("dave")), b.get("eve@example.com"));
    }

    #[test]
    fn change_moves_entry_between_tables() {
        let spam = "# rejected\njunk@example.com 550 Go away\n";
        let mut b = RewriteBatch::new();
        b.set("junk@example.com".to_owned(), "bob".to_owned());
        b.set("alice@example.com".to_owned(), "SPAM".to_owned());

        let out = rewrite(&snapshot(SAMPLE, spam), b);
        assert_eq!(
            vec![
                "# domain aliases".to_owned(),
                "carol@example.com    bob,dave".to_owned(),
                format_line("junk@example.com", "bob"),
            ],
            out.main
        );
        assert_eq!(
            vec![
                format_line("alice@example.com", DEFAULT_REJECT),
                "# rejected".to_owned(),
            ],
            out.spam
        );
    }

    #[test]
    fn misfiled_entries_migrate() {
        let main = "alice@example.com bob\n\
                    junk@example.com   550 Go away\n\
                    bad@example.com spam\n";
        let spam = "good@example.com dave\n";
        let out = rewrite(&snapshot(main, spam), RewriteBatch::new());
        assert_eq!(
            vec![
                "alice@example.com bob".to_owned(),
                "good@example.com dave".to_owned(),
            ],
            out.main
        );
        assert_eq!(
            vec![
                "junk@example.com   550 Go away".to_owned(),
                format_line("bad@example.com", DEFAULT_REJECT),
            ],
            out.spam
        );
    }

    #[test]
    fn pending_change_beats_rederived_route() {
        // The existing entry would migrate to the spam table on its own, but
        // the batch sends it to a real mailbox.
        let main = "junk@example.com   550 Go away\n";
        let mut b = RewriteBatch::new();
        b.set("junk@example.com".to_owned(), "bob".to_owned());

        let out = rewrite(&snapshot(main, ""), b);
        assert_eq!(vec![format_line("junk@example.com", "bob")], out.main);
        assert!(out.spam.is_empty());
    }

    #[test]
    fn duplicate_entries_collapse_after_change() {
        let main = "dup@example.com bob\n\
                    other@example.com dave\n\
                    dup@example.com dave\n";
        let mut b = RewriteBatch::new();
        b.set("dup@example.com".to_owned(), "carol@elsewhere.org".to_owned());

        let out = rewrite(&snapshot(main, ""), b);
        assert_eq!(
            vec![
                format_line("dup@example.com", "carol@elsewhere.org"),
                "other@example.com dave".to_owned(),
            ],
            out.main
        );
    }

    #[test]
    fn duplicate_entries_keep_first() {
        let main = "alice@example.com bob\n\
                    dup@example.com dave\n\
                    dup@example.com bob\n";
        let spam = "alice@example.com 550 Go away\n\
                    dup@example.com spam\n\
                    junk@example.com 550 Go away\n";

        let mut b = RewriteBatch::new();
        b.set("eve@example.com".to_owned(), "bob".to_owned());
        let out = rewrite(&snapshot(main, spam), b);
        assert_eq!(
            vec![
                "alice@example.com bob".to_owned(),
                "dup@example.com dave".to_owned(),
                format_line("eve@example.com", "bob"),
            ],
            out.main
        );
        assert_eq!(vec!["junk@example.com 550 Go away".to_owned()], out.spam);
    }

    #[test]
    fn new_entries_appended_in_order() {
        let mut b = RewriteBatch::new();
        b.set("zed@example.com".to_owned(), "bob".to_owned());
        b.set("amy@example.com".to_owned(), "550 Nope".to_owned());
        b.set("bea@example.com".to_owned(), "dave".to_owned());

        let out = rewrite(&snapshot("", ""), b);
        assert_eq!(
            vec![
                format_line("bea@example.com", "dave"),
                format_line("zed@example.com", "bob"),
            ],
            out.main
        );
        assert_eq!(vec![format_line("amy@example.com", "550 Nope")], out.spam);
    }

    #[test]
    fn duplicate_spam_markers_are_harmless() {
        let b = batch(&[ChangeRequest::add("m@example.com", "spam")]);
        let b2 = batch(&[
            ChangeRequest::add("m@example.com", "spam"),
            ChangeRequest::add("m@example.com", "spam"),
        ]);
        assert_eq!(b, b2);
    }

    const ADDRESSES: &[&str] = &[
        "a@example.com",
        "b@example.com",
        "c@example.com",
        "d@example.com",
        "e@example.com",
        "@example.com",
        "a-very-long-local-part-indeed@example.com",
        "f@example.com",
    ];
    const DESTINATIONS: &[&str] = &[
        "bob",
        "bob,dave",
        "spam",
        "550 Go away",
        "x@elsewhere.org",
    ];

    // Entries may repeat addresses and may sit in the wrong table, as a
    // hand-edited table might.
    fn initial_snapshot(initial: &[(usize, usize, bool)]) -> TableSnapshot {
        let mut main = "# main table\n".to_owned();
        let mut spam = "# spam table\n".to_owned();
        for &(a, d, in_spam) in initial {
            let table = if in_spam { &mut spam } else { &mut main };
            table.push_str(&format_line(ADDRESSES[a], DESTINATIONS[d]));
            table.push('\n');
        }
        snapshot(&main, &spam)
    }

    fn addresses(lines: &[TableLine]) -> BTreeSet<String> {
        lines
            .iter()
            .filter_map(|l| match *l {
                TableLine::Alias(ref r) => Some(r.address.clone()),
                TableLine::Other(..) => None,
            })
            .collect()
    }

    proptest! {
        #[test]
        fn rewrite_properties(
            initial in prop::collection::vec(
                (0..ADDRESSES.len(), 0..DESTINATIONS.len(), any::<bool>()),
                0..12),
            changes in prop::collection::vec(
                (0..ADDRESSES.len(),
                 prop::option::of(0..DESTINATIONS.len())), 0..10),
        ) {
            let before = initial_snapshot(&initial);
            let mut b = RewriteBatch::new();
            for &(a, d) in &changes {
                match d {
                    Some(d) => b.set(
                        ADDRESSES[a].to_owned(), DESTINATIONS[d].to_owned()),
                    None => b.remove(ADDRESSES[a].to_owned()),
                }
            }

            let first = rewrite(&before, b.clone());
            let after = reparse(&first);

            // No address in both tables
            let main_addrs = addresses(&after.main);
            let spam_addrs = addresses(&after.spam);
            prop_assert!(main_addrs.is_disjoint(&spam_addrs));

            // Each address has exactly one entry
            prop_assert_eq!(
                main_addrs.len() + spam_addrs.len(),
                after.records().count()
            );

            // Every change is reflected exactly
            for (address, pending) in &b.changes {
                let found = after
                    .records()
                    .filter(|r| &r.address == address)
                    .map(|r| r.destination.clone())
                    .collect::<Vec<_>>();
                match *pending {
                    None => prop_assert!(found.is_empty()),
                    Some(ref d) => {
                        let expected = match route(d) {
                            Route::Main(d) | Route::Spam(d) => d,
                        };
                        prop_assert_eq!(vec![expected], found);
                    }
                }
            }

            // Untouched entries survive
            for r in before.records() {
                if b.get(&r.address).is_none() {
                    prop_assert!(after.contains(&r.address));
                }
            }

            // Applying the same batch again changes nothing
            let second = rewrite(&after, b);
            prop_assert_eq!(first, second);
        }
    }
}
