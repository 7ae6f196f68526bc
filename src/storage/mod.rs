//! Storage layer for Ledgerwise
//!
//! Every user owns one [`Book`] behind its own `RwLock`, so users never
//! contend with each other. Readers take the read lock and see a complete
//! book. Writers stage a [`UnitOfWork`] from a snapshot and hand it to
//! [`Storage::commit`], which checks every staged version under the write
//! lock, applies the changes to a copy, persists the copy atomically and only
//! then swaps it in. A failure at any step leaves the previous book in place.

pub mod book;
pub mod file_io;
pub mod init;
pub mod retry;
pub mod unit_of_work;

pub use book::Book;
pub use file_io::{list_json_files, read_json_opt, write_json_atomic};
pub use init::default_category_seed;
pub use unit_of_work::{Entity, EntityKey, UnitOfWork};

use std::cell::Cell;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::audit::{AuditEntry, AuditLogger};
use crate::config::{LedgerPaths, Settings};
use crate::error::{LedgerError, LedgerResult};
use crate::models::UserId;

use book::BookData;

/// A query result paired with the book version it was read at
#[derive(Debug, Clone, Serialize)]
pub struct Versioned<T> {
    pub version: u64,
    pub data: T,
}

/// Book version written by the latest commit a service made
///
/// Lets a command report the version its own commit produced rather than
/// whatever the book holds by the time the caller looks.
#[derive(Debug, Default)]
pub struct LastCommit(Cell<Option<u64>>);

impl LastCommit {
    /// Commit `uow` for `user_id` and remember the resulting version
    pub fn commit(&self, storage: &Storage, user_id: UserId, uow: UnitOfWork) -> LedgerResult<u64> {
        let version = storage.commit(user_id, uow)?;
        self.0.set(Some(version));
        Ok(version)
    }

    /// `None` until a commit has succeeded
    pub fn version(&self) -> Option<u64> {
        self.0.get()
    }
}

type BookHandle = Arc<RwLock<Book>>;

fn lock_error<E: std::fmt::Display>(e: E) -> LedgerError {
    LedgerError::Storage(format!("Failed to acquire lock: {}", e))
}

/// Main storage coordinator
pub struct Storage {
    paths: Option<LedgerPaths>,
    settings: Settings,
    books: RwLock<HashMap<UserId, BookHandle>>,
    audit: Option<AuditLogger>,
}

impl Storage {
    /// Open disk-backed storage under `paths`
    pub fn open(paths: LedgerPaths, settings: Settings) -> LedgerResult<Self> {
        settings.validate()?;
        paths.ensure_directories()?;

        Ok(Self {
            audit: Some(AuditLogger::new(paths.audit_log())),
            paths: Some(paths),
            settings,
            books: RwLock::new(HashMap::new()),
        })
    }

    /// Storage that lives only in memory, with default settings
    pub fn in_memory() -> Self {
        Self::in_memory_with(Settings::default())
    }

    /// Storage that lives only in memory
    pub fn in_memory_with(settings: Settings) -> Self {
        Self {
            paths: None,
            settings,
            books: RwLock::new(HashMap::new()),
            audit: None,
        }
    }

    /// Get the paths configuration, `None` in memory
    pub fn paths(&self) -> Option<&LedgerPaths> {
        self.paths.as_ref()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The audit log, `None` in memory
    pub fn audit(&self) -> Option<&AuditLogger> {
        self.audit.as_ref()
    }

    /// Load every book file from disk, returning how many were loaded
    pub fn load_all(&self) -> LedgerResult<usize> {
        let Some(paths) = &self.paths else {
            return Ok(0);
        };

        let mut loaded = HashMap::new();
        for file in list_json_files(paths.books_dir())? {
            if let Some(data) = read_json_opt::<BookData, _>(&file)? {
                let book = Book::from_data(data);
                loaded.insert(book.user_id(), Arc::new(RwLock::new(book)));
            }
        }

        let count = loaded.len();
        let mut books = self.books.write().map_err(lock_error)?;
        *books = loaded;
        debug!(count, "loaded books");
        Ok(count)
    }

    /// Create an empty book for `user_id`; no-op if one exists
    ///
    /// Returns true when a new book was created.
    pub fn create_user(&self, user_id: UserId) -> LedgerResult<bool> {
        if self.handle(user_id).is_ok() {
            return Ok(false);
        }

        let mut books = self.books.write().map_err(lock_error)?;
        if books.contains_key(&user_id) {
            return Ok(false);
        }
        let book = Book::new(user_id);
        if let Some(paths) = &self.paths {
            write_json_atomic(paths.book_file(user_id), &book.to_data())?;
        }
        books.insert(user_id, Arc::new(RwLock::new(book)));
        info!(user = %user_id, "created book");
        Ok(true)
    }

    /// Users with a book
    pub fn users(&self) -> LedgerResult<Vec<UserId>> {
        let books = self.books.read().map_err(lock_error)?;
        Ok(books.keys().copied().collect())
    }

    pub fn has_user(&self, user_id: UserId) -> bool {
        self.handle(user_id).is_ok()
    }

    /// Shared handle to a user's book, loading it from disk on first use
    fn handle(&self, user_id: UserId) -> LedgerResult<BookHandle> {
        {
            let books = self.books.read().map_err(lock_error)?;
            if let Some(handle) = books.get(&user_id) {
                return Ok(Arc::clone(handle));
            }
        }

        let Some(paths) = &self.paths else {
            return Err(LedgerError::user_not_found(user_id.to_string()));
        };
        let data: BookData = read_json_opt(paths.book_file(user_id))?
            .ok_or_else(|| LedgerError::user_not_found(user_id.to_string()))?;

        let mut books = self.books.write().map_err(lock_error)?;
        let handle = books
            .entry(user_id)
            .or_insert_with(|| Arc::new(RwLock::new(Book::from_data(data))));
        Ok(Arc::clone(handle))
    }

    /// Run `f` against a consistent view of the user's book
    pub fn read<T>(
        &self,
        user_id: UserId,
        f: impl FnOnce(&Book) -> LedgerResult<T>,
    ) -> LedgerResult<T> {
        let handle = self.handle(user_id)?;
        let guard: RwLockReadGuard<'_, Book> = handle.read().map_err(lock_error)?;
        f(&guard)
    }

    /// Like [`Storage::read`], tagging the result with the book version
    pub fn snapshot<T>(
        &self,
        user_id: UserId,
        f: impl FnOnce(&Book) -> LedgerResult<T>,
    ) -> LedgerResult<Versioned<T>> {
        self.read(user_id, |book| {
            Ok(Versioned {
                version: book.version(),
                data: f(book)?,
            })
        })
    }

    /// Atomically apply a unit of work to the user's book
    ///
    /// Returns the new book version. Fails with `Conflict` without touching
    /// anything if any staged version is stale.
    pub fn commit(&self, user_id: UserId, uow: UnitOfWork) -> LedgerResult<u64> {
        let handle = self.handle(user_id)?;
        let mut guard: RwLockWriteGuard<'_, Book> = handle.write().map_err(lock_error)?;

        if uow.is_empty() {
            return Ok(guard.version());
        }

        uow.check(&guard)?;

        let keys = uow.keys();
        let mut next = guard.clone();
        uow.apply(&mut next);
        let version = next.bump_version();

        if let Some(paths) = &self.paths {
            write_json_atomic(paths.book_file(user_id), &next.to_data())?;
        }

        let entries: Vec<AuditEntry> = match &self.audit {
            Some(_) => keys
                .iter()
                .filter_map(|key| {
                    let before = key.image(&guard);
                    let after = key.image(&next);
                    if before.is_none() && after.is_none() {
                        return None;
                    }
                    let name = after
                        .as_ref()
                        .and_then(|(_, n)| n.clone())
                        .or_else(|| before.as_ref().and_then(|(_, n)| n.clone()));
                    Some(AuditEntry::from_images(
                        user_id,
                        version,
                        key.entity_type(),
                        key.id_string(),
                        name,
                        before.map(|(v, _)| v),
                        after.map(|(v, _)| v),
                    ))
                })
                .collect(),
            None => Vec::new(),
        };

        *guard = next;

        // the commit stands even if the audit append fails
        if let Some(logger) = &self.audit {
            if let Err(e) = logger.log_batch(&entries) {
                warn!(user = %user_id, version, error = %e, "failed to write audit log");
            }
        }
        drop(guard);

        debug!(user = %user_id, version, changes = keys.len(), "committed");
        Ok(version)
    }

    /// Re-run `op` on `Conflict` with bounded exponential backoff
    pub fn with_retry<T>(&self, op: impl FnMut() -> LedgerResult<T>) -> LedgerResult<T> {
        retry::retry_on_conflict(&self.settings.retry, op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Account, AccountType, Money};
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
    }

    #[test]
    fn test_storage_creation() {
        let temp_dir = TempDir::new().unwrap();
        let paths = LedgerPaths::with_base_dir(temp_dir.path().to_path_buf());
        let storage = Storage::open(paths, Settings::default()).unwrap();

        assert!(temp_dir.path().join("data").join("books").exists());
        assert!(storage.users().unwrap().is_empty());
    }

    #[test]
    fn test_unknown_user_is_not_found() {
        let storage = Storage::in_memory();
        let err = storage.read(UserId::new(), |_| Ok(())).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_commit_persists_and_reloads() {
        let temp_dir = TempDir::new().unwrap();
        let paths = LedgerPaths::with_base_dir(temp_dir.path().to_path_buf());
        let storage = Storage::open(paths.clone(), Settings::default()).unwrap();
        let user = UserId::new();
        assert!(storage.create_user(user).unwrap());
        assert!(!storage.create_user(user).unwrap());

        let account = Account::new(user, "Checking", AccountType::Checking, day());
        let mut uow = UnitOfWork::new();
        uow.put(account.clone());
        let version = storage.commit(user, uow).unwrap();
        assert_eq!(version, 1);

        let reopened = Storage::open(paths, Settings::default()).unwrap();
        assert_eq!(reopened.load_all().unwrap(), 1);
        let snapshot = reopened
            .snapshot(user, |book| Ok(book.account(account.id).map(|a| a.name.clone())))
            .unwrap();
        assert_eq!(snapshot.version, 1);
        assert_eq!(snapshot.data.as_deref(), Some("Checking"));

        let audit = reopened.audit().unwrap().read_recent(user, 10).unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].entity_name.as_deref(), Some("Checking"));
    }

    #[test]
    fn test_conflicting_commit_leaves_book_untouched() {
        let storage = Storage::in_memory();
        let user = UserId::new();
        storage.create_user(user).unwrap();

        let account = Account::new(user, "Checking", AccountType::Checking, day());
        let mut uow = UnitOfWork::new();
        uow.put(account.clone());
        storage.commit(user, uow).unwrap();

        let read = storage
            .read(user, |book| Ok(book.account(account.id).cloned()))
            .unwrap()
            .unwrap();

        let mut winner = read.clone();
        winner.balance = Money::from_cents(100);
        let mut uow = UnitOfWork::new();
        uow.put(winner);
        storage.commit(user, uow).unwrap();

        let mut loser = read;
        loser.balance = Money::from_cents(999);
        let mut uow = UnitOfWork::new();
        uow.put(loser);
        let err = storage.commit(user, uow).unwrap_err();
        assert!(err.is_conflict());

        let (version, balance) = storage
            .read(user, |book| {
                Ok((book.version(), book.account(account.id).map(|a| a.balance)))
            })
            .unwrap();
        assert_eq!(version, 2);
        assert_eq!(balance, Some(Money::from_cents(100)));
    }

    #[test]
    fn test_last_commit_keeps_its_own_version() {
        let storage = Storage::in_memory();
        let user = UserId::new();
        storage.create_user(user).unwrap();
        let first = LastCommit::default();
        let second = LastCommit::default();
        assert_eq!(first.version(), None);

        for (tracker, name) in [(&first, "Checking"), (&second, "Savings")] {
            let mut uow = UnitOfWork::new();
            uow.put(Account::new(user, name, AccountType::Checking, day()));
            tracker.commit(&storage, user, uow).unwrap();
        }

        assert_eq!(first.version(), Some(1));
        assert_eq!(second.version(), Some(2));

        let mut uow = UnitOfWork::new();
        uow.put(Account::new(user, "Cash", AccountType::Cash, day()));
        let err_uow = {
            let mut stale = UnitOfWork::new();
            let mut account = Account::new(user, "Ghost", AccountType::Cash, day());
            account.version = 7;
            stale.put(account);
            stale
        };
        assert!(first.commit(&storage, user, err_uow).is_err());
        assert_eq!(first.version(), Some(1));
        assert_eq!(first.commit(&storage, user, uow).unwrap(), 3);
    }

    #[test]
    fn test_empty_commit_does_not_bump_version() {
        let storage = Storage::in_memory();
        let user = UserId::new();
        storage.create_user(user).unwrap();
        assert_eq!(storage.commit(user, UnitOfWork::new()).unwrap(), 0);
    }
}
