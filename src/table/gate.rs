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

//! Serialisation of table rewrites.
//!
//! Rewrites of the same table never overlap, whether they come from threads
//! of this process or from other processes. Rewrites of different tables do
//! not wait for each other.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use fs2::FileExt;

use super::record_store::TablePaths;
use crate::support::error::Error;

/// Hands out exclusive access to tables, keyed by main table path.
#[derive(Debug, Default)]
pub struct TableGate {
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl TableGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` with exclusive access to the table described by `paths`.
    ///
    /// Within the process, this waits on a mutex for the table. Across
    /// processes, it waits on an advisory lock of the table's lock file,
    /// which is created if needed and left in place afterwards.
    pub fn hold<R>(
        &self,
        paths: &TablePaths,
        f: impl FnOnce() -> Result<R, Error>,
    ) -> Result<R, Error> {
        let table_lock = Arc::clone(
            self.locks
                .lock()
                .unwrap()
                .entry(paths.main.clone())
                .or_default(),
        );
        let _guard = table_lock.lock().unwrap();

        let lock_file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&paths.lock)?;
        lock_file.lock_exclusive()?;

        let result = f();
        // Closing the file releases the lock regardless
        let _ = lock_file.unlock();
        result
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn same_table_is_serialised() {
        let root = tempfile::TempDir::new().unwrap();
        let paths = TablePaths::new(root.path().join("virtual"));
        let gate = TableGate::new();
        let inside = AtomicBool::new(false);
        let entered = AtomicUsize::new(0);

        thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    gate.hold(&paths, || {
                        assert!(!inside.swap(true, Ordering::SeqCst));
                        thread::sleep(Duration::from_millis(5));
                        entered.fetch_add(1, Ordering::SeqCst);
                        inside.store(false, Ordering::SeqCst);
                        Ok(())
                    })
                    .unwrap();
                });
            }
        });

        assert_eq!(8, entered.load(Ordering::SeqCst));
        assert!(paths.lock.is_file());
    }

    #[test]
    fn different_tables_do_not_wait() {
        let root = tempfile::TempDir::new().unwrap();
        let a = TablePaths::new(root.path().join("a"));
        let b = TablePaths::new(root.path().join("b"));
        let gate = &TableGate::new();
        let b = &b;
        let (tx, rx) = mpsc::channel();

        thread::scope(|s| {
            gate.hold(&a, || {
                s.spawn(move || {
                    gate.hold(b, || Ok(())).unwrap();
                    tx.send(()).unwrap();
                });
                rx.recv_timeout(Duration::from_secs(10))
                    .expect("table b blocked behind table a");
                Ok(())
            })
            .unwrap();
        });
    }

    #[test]
    fn error_is_propagated_and_lock_released() {
        let root = tempfile::TempDir::new().unwrap();
        let paths = TablePaths::new(root.path().join("virtual"));
        let gate = TableGate::new();

        assert_matches!(
            Err(Error::AuthenticationFailed),
            gate.hold(&paths, || -> Result<(), Error> {
                Err(Error::AuthenticationFailed)
            })
        );
        assert_eq!(42, gate.hold(&paths, || Ok(42)).unwrap());
    }
}
