//! Staged changes with optimistic version checks
//!
//! Services read a snapshot of the book, validate, and stage every change of
//! one command in a `UnitOfWork`. A staged put carries the version its entity
//! was read at (0 for a new entity) and a staged removal carries the expected
//! version. Entities a decision depends on without changing can be added as
//! plain version requirements. `Storage::commit` checks all of them before
//! applying anything.

use serde_json::Value;

use crate::audit::EntityType;
use crate::error::{LedgerError, LedgerResult};
use crate::models::{
    Account, AccountId, Allocation, AllocationId, Budget, BudgetId, Category, CategoryId, Goal,
    GoalId, RecurrenceDefinition, RecurrenceId, Transaction, TransactionId,
};

use super::book::Book;

/// Key of any stored entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKey {
    Account(AccountId),
    Category(CategoryId),
    Transaction(TransactionId),
    Recurrence(RecurrenceId),
    Budget(BudgetId),
    Goal(GoalId),
    Allocation(AllocationId),
}

impl EntityKey {
    pub fn entity_type(&self) -> EntityType {
        match self {
            Self::Account(_) => EntityType::Account,
            Self::Category(_) => EntityType::Category,
            Self::Transaction(_) => EntityType::Transaction,
            Self::Recurrence(_) => EntityType::Recurrence,
            Self::Budget(_) => EntityType::Budget,
            Self::Goal(_) => EntityType::Goal,
            Self::Allocation(_) => EntityType::Allocation,
        }
    }

    pub fn id_string(&self) -> String {
        match self {
            Self::Account(id) => id.to_string(),
            Self::Category(id) => id.to_string(),
            Self::Transaction(id) => id.to_string(),
            Self::Recurrence(id) => id.to_string(),
            Self::Budget(id) => id.to_string(),
            Self::Goal(id) => id.to_string(),
            Self::Allocation(id) => id.to_string(),
        }
    }

    fn conflict(&self) -> LedgerError {
        LedgerError::conflict(self.entity_type().name(), self.id_string())
    }

    /// Version currently stored in the book, `None` if absent
    pub(crate) fn stored_version(&self, book: &Book) -> Option<u64> {
        match self {
            Self::Account(id) => book.accounts.get(id).map(|e| e.version),
            Self::Category(id) => book.categories.get(id).map(|e| e.version),
            Self::Transaction(id) => book.transactions.get(id).map(|e| e.version),
            Self::Recurrence(id) => book.recurrences.get(id).map(|e| e.version),
            Self::Budget(id) => book.budgets.get(id).map(|e| e.version),
            Self::Goal(id) => book.goals.get(id).map(|e| e.version),
            Self::Allocation(id) => book.allocations.get(id).map(|e| e.version),
        }
    }

    /// JSON image and display name of the stored entity, for the audit log
    pub(crate) fn image(&self, book: &Book) -> Option<(Value, Option<String>)> {
        fn to_image<T: serde::Serialize>(entity: &T, name: Option<String>) -> Option<(Value, Option<String>)> {
            serde_json::to_value(entity).ok().map(|v| (v, name))
        }
        match self {
            Self::Account(id) => book.accounts.get(id).and_then(|e| to_image(e, Some(e.name.clone()))),
            Self::Category(id) => book
                .categories
                .get(id)
                .and_then(|e| to_image(e, Some(e.display_name.clone()))),
            Self::Transaction(id) => book
                .transactions
                .get(id)
                .and_then(|e| to_image(e, Some(e.description.clone()).filter(|d| !d.is_empty()))),
            Self::Recurrence(id) => book
                .recurrences
                .get(id)
                .and_then(|e| to_image(e, Some(e.template.description.clone()))),
            Self::Budget(id) => book.budgets.get(id).and_then(|e| to_image(e, Some(e.name.clone()))),
            Self::Goal(id) => book.goals.get(id).and_then(|e| to_image(e, Some(e.name.clone()))),
            Self::Allocation(id) => book.allocations.get(id).and_then(|e| to_image(e, None)),
        }
    }
}

/// Any stored entity
#[derive(Debug, Clone)]
pub enum Entity {
    Account(Account),
    Category(Category),
    Transaction(Transaction),
    Recurrence(RecurrenceDefinition),
    Budget(Budget),
    Goal(Goal),
    Allocation(Allocation),
}

impl Entity {
    pub fn key(&self) -> EntityKey {
        match self {
            Self::Account(e) => EntityKey::Account(e.id),
            Self::Category(e) => EntityKey::Category(e.id),
            Self::Transaction(e) => EntityKey::Transaction(e.id),
            Self::Recurrence(e) => EntityKey::Recurrence(e.id),
            Self::Budget(e) => EntityKey::Budget(e.id),
            Self::Goal(e) => EntityKey::Goal(e.id),
            Self::Allocation(e) => EntityKey::Allocation(e.id),
        }
    }

    fn version(&self) -> u64 {
        match self {
            Self::Account(e) => e.version,
            Self::Category(e) => e.version,
            Self::Transaction(e) => e.version,
            Self::Recurrence(e) => e.version,
            Self::Budget(e) => e.version,
            Self::Goal(e) => e.version,
            Self::Allocation(e) => e.version,
        }
    }

    /// Store the entity with its version bumped past `expected`
    fn store(self, book: &mut Book, expected: u64) {
        let version = expected + 1;
        match self {
            Self::Account(mut e) => {
                e.version = version;
                book.accounts.insert(e.id, e);
            }
            Self::Category(mut e) => {
                e.version = version;
                book.categories.insert(e.id, e);
            }
            Self::Transaction(mut e) => {
                e.version = version;
                let old = book.transactions.get(&e.id).cloned();
                book.index_transaction(&e, old.as_ref());
                book.transactions.insert(e.id, e);
            }
            Self::Recurrence(mut e) => {
                e.version = version;
                book.recurrences.insert(e.id, e);
            }
            Self::Budget(mut e) => {
                e.version = version;
                book.budgets.insert(e.id, e);
            }
            Self::Goal(mut e) => {
                e.version = version;
                book.goals.insert(e.id, e);
            }
            Self::Allocation(mut e) => {
                e.version = version;
                let is_new = !book.allocations.contains_key(&e.id);
                book.index_allocation(&e, is_new);
                book.allocations.insert(e.id, e);
            }
        }
    }
}

macro_rules! entity_from {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Entity {
                fn from(entity: $ty) -> Self {
                    Self::$variant(entity)
                }
            }
        )*
    };
}

entity_from!(
    Account => Account,
    Category => Category,
    Transaction => Transaction,
    Recurrence => RecurrenceDefinition,
    Budget => Budget,
    Goal => Goal,
    Allocation => Allocation,
);

#[derive(Debug, Clone)]
enum Change {
    Put { entity: Entity, expected: u64 },
    Remove { key: EntityKey, expected: u64 },
}

impl Change {
    fn key(&self) -> EntityKey {
        match self {
            Self::Put { entity, .. } => entity.key(),
            Self::Remove { key, .. } => *key,
        }
    }
}

/// Changes of one command, applied all together or not at all
#[derive(Debug, Clone, Default)]
pub struct UnitOfWork {
    changes: Vec<Change>,
    usage: Vec<CategoryId>,
    reads: Vec<(EntityKey, u64)>,
}

impl UnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty() && self.usage.is_empty()
    }

    /// Stage an insert or update
    ///
    /// The entity's current `version` field is the version it was read at.
    /// Staging the same entity twice keeps the first expected version.
    pub fn put(&mut self, entity: impl Into<Entity>) -> &mut Self {
        let entity = entity.into();
        let key = entity.key();
        let expected = entity.version();
        match self.changes.iter_mut().find(|c| c.key() == key) {
            Some(existing) => {
                let expected = match existing {
                    Change::Put { expected, .. } | Change::Remove { expected, .. } => *expected,
                };
                *existing = Change::Put { entity, expected };
            }
            None => self.changes.push(Change::Put { entity, expected }),
        }
        self
    }

    /// Stage a removal of an entity read at `version`
    pub fn remove(&mut self, key: EntityKey, version: u64) -> &mut Self {
        match self.changes.iter_mut().find(|c| c.key() == key) {
            Some(existing) => {
                let expected = match existing {
                    Change::Put { expected, .. } | Change::Remove { expected, .. } => *expected,
                };
                *existing = Change::Remove { key, expected };
            }
            None => self.changes.push(Change::Remove { key, expected: version }),
        }
        self
    }

    /// Stage one usage increment of a category
    ///
    /// Counters are commutative, so increments are not version-checked and do
    /// not bump the category version.
    pub fn increment_usage(&mut self, category_id: CategoryId) -> &mut Self {
        self.usage.push(category_id);
        self
    }

    /// Require `key` to still be at `version` when the unit commits
    ///
    /// Nothing is written for it. The first requirement staged for a key wins.
    pub fn require(&mut self, key: EntityKey, version: u64) -> &mut Self {
        if !self.reads.iter().any(|(k, _)| *k == key) {
            self.reads.push((key, version));
        }
        self
    }

    /// Keys written by this unit, in staging order
    pub fn keys(&self) -> Vec<EntityKey> {
        self.changes.iter().map(Change::key).collect()
    }

    /// Compare every staged version with the book, `Conflict` on the first mismatch
    pub(crate) fn check(&self, book: &Book) -> LedgerResult<()> {
        for change in &self.changes {
            match change {
                Change::Put { entity, expected } => {
                    let key = entity.key();
                    match key.stored_version(book) {
                        Some(stored) if stored == *expected => {}
                        None if *expected == 0 => {}
                        _ => return Err(key.conflict()),
                    }
                }
                Change::Remove { key, expected } => match key.stored_version(book) {
                    Some(stored) if stored == *expected => {}
                    _ => return Err(key.conflict()),
                },
            }
        }
        for (key, expected) in &self.reads {
            if key.stored_version(book) != Some(*expected) {
                return Err(key.conflict());
            }
        }
        Ok(())
    }

    /// Apply to a book that already passed `check`
    pub(crate) fn apply(self, book: &mut Book) {
        for change in self.changes {
            match change {
                Change::Put { entity, expected } => entity.store(book, expected),
                Change::Remove { key, .. } => remove_entity(book, key),
            }
        }
        for category_id in self.usage {
            let seq = book.next_usage_seq();
            if let Some(category) = book.categories.get_mut(&category_id) {
                category.increment_usage(seq);
            }
        }
    }
}

fn remove_entity(book: &mut Book, key: EntityKey) {
    match key {
        EntityKey::Account(id) => {
            book.accounts.remove(&id);
        }
        EntityKey::Category(id) => {
            book.categories.remove(&id);
        }
        EntityKey::Transaction(id) => {
            if let Some(txn) = book.transactions.remove(&id) {
                book.unindex_transaction(&txn);
            }
        }
        EntityKey::Recurrence(id) => {
            book.recurrences.remove(&id);
        }
        EntityKey::Budget(id) => {
            book.budgets.remove(&id);
        }
        EntityKey::Goal(id) => {
            book.goals.remove(&id);
        }
        EntityKey::Allocation(id) => {
            if let Some(allocation) = book.allocations.remove(&id) {
                book.unindex_allocation(&allocation);
            }
        }
    }
}
