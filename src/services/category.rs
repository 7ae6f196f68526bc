//! Category service
//!
//! The category registry of one user: the category forest, path resolution,
//! usage counters and suggestions. Categories are never hard-deleted; they
//! are disabled together with their subtree.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::info;

use crate::error::{LedgerError, LedgerResult};
use crate::models::category::normalize_name;
use crate::models::{Category, CategoryId, CategoryKind, UserId};
use crate::storage::{default_category_seed, Book, EntityKey, LastCommit, Storage, UnitOfWork};

use super::suggest::{self, CategoryAdvisor, SuggestionSource, Suggestions};

/// Service for category management
pub struct CategoryService<'a> {
    storage: &'a Storage,
    user_id: UserId,
    last_commit: LastCommit,
    advisor: Option<Arc<dyn CategoryAdvisor>>,
}

/// A category with its children, for tree views
#[derive(Debug, Clone, Serialize)]
pub struct CategoryNode {
    pub category: Category,
    pub children: Vec<CategoryNode>,
}

/// Look up a category that can take new postings
pub(crate) fn active_category(book: &Book, id: CategoryId) -> LedgerResult<&Category> {
    book.category(id)
        .filter(|c| c.enabled)
        .ok_or_else(|| LedgerError::category_not_found(id.to_string()))
}

fn depth_of(book: &Book, id: CategoryId) -> usize {
    book.category_path(id).len()
}

/// Levels below and including `id`: 1 for a leaf
fn height_of(book: &Book, id: CategoryId) -> usize {
    let base = depth_of(book, id);
    book.category_subtree(id)
        .into_iter()
        .map(|d| depth_of(book, d) + 1 - base)
        .max()
        .unwrap_or(1)
}

/// Stage what a child placed under `parent_id` relies on
///
/// The parent is re-staged unchanged so that a concurrent disable or move of
/// it conflicts with this unit. Its ancestors must keep their versions, which
/// keeps the depth and cycle checks valid at commit.
fn stage_parent(book: &Book, parent_id: CategoryId, uow: &mut UnitOfWork) {
    let path = book.category_path(parent_id);
    if let Some((parent, ancestors)) = path.split_last() {
        uow.put((*parent).clone());
        for ancestor in ancestors {
            uow.require(EntityKey::Category(ancestor.id), ancestor.version);
        }
    }
}

fn sibling_name_taken(
    book: &Book,
    parent_id: Option<CategoryId>,
    name: &str,
    except: Option<CategoryId>,
) -> bool {
    book.categories()
        .any(|c| c.parent_id == parent_id && c.name == name && Some(c.id) != except)
}

impl<'a> CategoryService<'a> {
    /// Create a new category service
    pub fn new(storage: &'a Storage, user_id: UserId) -> Self {
        Self {
            storage,
            user_id,
            advisor: None,
            last_commit: LastCommit::default(),
        }
    }

    /// Book version written by this service's latest commit
    pub fn committed_version(&self) -> Option<u64> {
        self.last_commit.version()
    }

    /// Consult `advisor` before the local heuristic in [`CategoryService::suggest`]
    pub fn with_advisor(mut self, advisor: Arc<dyn CategoryAdvisor>) -> Self {
        self.advisor = Some(advisor);
        self
    }

    /// Seed the builtin and default categories, returning how many were added
    pub fn seed_defaults(&self) -> LedgerResult<usize> {
        let added = self.storage.with_retry(|| {
            let uow = self
                .storage
                .read(self.user_id, |book| Ok(default_category_seed(book)))?;
            let added = uow.keys().len();
            self.last_commit.commit(self.storage, self.user_id, uow)?;
            Ok(added)
        })?;
        if added > 0 {
            info!(user = %self.user_id, added, "seeded default categories");
        }
        Ok(added)
    }

    /// Create a category under `parent_id`, or a new root
    pub fn create(
        &self,
        name: &str,
        parent_id: Option<CategoryId>,
        kind: CategoryKind,
    ) -> LedgerResult<Category> {
        let max_depth = self.storage.settings().max_category_depth;

        self.storage.with_retry(|| {
            let (uow, category) = self.storage.read(self.user_id, |book| {
                let name = name.trim();
                if let Some(parent_id) = parent_id {
                    let parent = active_category(book, parent_id)?;
                    if parent.kind != kind {
                        return Err(LedgerError::InvalidHierarchy(format!(
                            "'{}' is an {} category, a child cannot be {}",
                            parent.display_name, parent.kind, kind
                        )));
                    }
                    if depth_of(book, parent_id) + 1 > max_depth {
                        return Err(LedgerError::InvalidHierarchy(format!(
                            "Categories can be nested at most {} levels deep",
                            max_depth
                        )));
                    }
                }

                let category = Category::new(self.user_id, name, parent_id, kind);
                category
                    .validate()
                    .map_err(|e| LedgerError::Validation(e.to_string()))?;

                if sibling_name_taken(book, parent_id, &category.name, None) {
                    return Err(LedgerError::Validation(format!(
                        "A category named '{}' already exists here",
                        category.display_name
                    )));
                }

                let mut uow = UnitOfWork::new();
                uow.put(category.clone());
                if let Some(parent_id) = parent_id {
                    stage_parent(book, parent_id, &mut uow);
                }
                Ok((uow, category))
            })?;

            self.last_commit.commit(self.storage, self.user_id, uow)?;
            Ok(Category {
                version: category.version + 1,
                ..category
            })
        })
    }

    /// Get a category by ID, enabled or not
    pub fn get(&self, id: CategoryId) -> LedgerResult<Category> {
        self.storage.read(self.user_id, |book| {
            book.category(id)
                .cloned()
                .ok_or_else(|| LedgerError::category_not_found(id.to_string()))
        })
    }

    /// Find a category by ID, slash-separated path (`home/groceries`) or
    /// unique name
    pub fn find(&self, identifier: &str) -> LedgerResult<Option<Category>> {
        if let Ok(id) = identifier.parse::<CategoryId>() {
            if let Some(category) = self.storage.read(self.user_id, |book| Ok(book.category(id).cloned()))? {
                return Ok(Some(category));
            }
        }

        if identifier.contains('/') {
            return self.storage.read(self.user_id, |book| {
                let mut parent = None;
                let mut found = None;
                for segment in identifier.split('/').filter(|s| !s.trim().is_empty()) {
                    let name = normalize_name(segment);
                    found = book
                        .categories()
                        .find(|c| c.parent_id == parent && c.name == name)
                        .cloned();
                    match &found {
                        Some(c) => parent = Some(c.id),
                        None => return Ok(None),
                    }
                }
                Ok(found)
            });
        }

        let matches = self.find_by_name(identifier)?;
        match matches.len() {
            0 => Ok(None),
            1 => Ok(matches.into_iter().next()),
            n => Err(LedgerError::Validation(format!(
                "'{}' matches {} categories, use a path like parent/child",
                identifier, n
            ))),
        }
    }

    /// All categories with this (normalized) name
    pub fn find_by_name(&self, name: &str) -> LedgerResult<Vec<Category>> {
        let name = normalize_name(name);
        self.storage.read(self.user_id, |book| {
            let mut found: Vec<Category> =
                book.categories().filter(|c| c.name == name).cloned().collect();
            found.sort_by_key(|c| c.id.full());
            Ok(found)
        })
    }

    /// Ancestors of a category, root first and the category itself last
    ///
    /// `NotFound` if the category is unknown or disabled.
    pub fn resolve_path(&self, id: CategoryId) -> LedgerResult<Vec<Category>> {
        self.storage.read(self.user_id, |book| {
            active_category(book, id)?;
            Ok(book.category_path(id).into_iter().cloned().collect())
        })
    }

    /// Record one usage of a category; unknown ids are ignored
    pub fn increment_usage(&self, id: CategoryId) -> LedgerResult<()> {
        let mut uow = UnitOfWork::new();
        uow.increment_usage(id);
        self.last_commit.commit(self.storage, self.user_id, uow)?;
        Ok(())
    }

    /// Disable a category and its whole subtree
    ///
    /// Returns the ids that were disabled. `InUse` if the subtree holds a
    /// builtin category.
    pub fn disable(&self, id: CategoryId) -> LedgerResult<Vec<CategoryId>> {
        self.set_enabled(id, false)
    }

    /// Re-enable a category and its subtree
    ///
    /// The parent must be enabled.
    pub fn enable(&self, id: CategoryId) -> LedgerResult<Vec<CategoryId>> {
        self.set_enabled(id, true)
    }

    fn set_enabled(&self, id: CategoryId, enabled: bool) -> LedgerResult<Vec<CategoryId>> {
        let changed = self.storage.with_retry(|| {
            let uow_and_ids = self.storage.read(self.user_id, |book| {
                let category = book
                    .category(id)
                    .ok_or_else(|| LedgerError::category_not_found(id.to_string()))?;

                if enabled {
                    if let Some(parent_id) = category.parent_id {
                        if book.category(parent_id).is_some_and(|p| !p.enabled) {
                            return Err(LedgerError::InvalidHierarchy(format!(
                                "Enable the parent of '{}' first",
                                category.display_name
                            )));
                        }
                    }
                }

                let subtree = book.category_subtree(id);
                if !enabled {
                    if let Some(builtin) = subtree
                        .iter()
                        .filter_map(|d| book.category(*d))
                        .find(|c| c.builtin.is_some())
                    {
                        return Err(LedgerError::InUse(format!(
                            "'{}' is required by the system and cannot be disabled",
                            builtin.display_name
                        )));
                    }
                }

                let mut uow = UnitOfWork::new();
                let mut ids = Vec::new();
                for category in subtree.iter().filter_map(|d| book.category(*d)) {
                    if category.enabled != enabled {
                        let mut category = category.clone();
                        category.enabled = enabled;
                        category.updated_at = Utc::now();
                        ids.push(category.id);
                        uow.put(category);
                    }
                }
                Ok((uow, ids))
            })?;

            let (uow, ids) = uow_and_ids;
            self.last_commit.commit(self.storage, self.user_id, uow)?;
            Ok(ids)
        })?;

        info!(user = %self.user_id, category = %id, enabled, count = changed.len(), "changed category state");
        Ok(changed)
    }

    /// Move a category (with its subtree) under a new parent, or to the root
    pub fn move_category(
        &self,
        id: CategoryId,
        new_parent: Option<CategoryId>,
    ) -> LedgerResult<Category> {
        let max_depth = self.storage.settings().max_category_depth;

        self.storage.with_retry(|| {
            let (uow, category) = self.storage.read(self.user_id, |book| {
                let category = book
                    .category(id)
                    .ok_or_else(|| LedgerError::category_not_found(id.to_string()))?;
                if category.builtin.is_some() {
                    return Err(LedgerError::InUse(format!(
                        "'{}' is required by the system and cannot be moved",
                        category.display_name
                    )));
                }

                let new_depth = match new_parent {
                    Some(parent_id) => {
                        let parent = active_category(book, parent_id)?;
                        if book.category_subtree(id).contains(&parent_id) {
                            return Err(LedgerError::InvalidHierarchy(format!(
                                "Cannot move '{}' under its own descendant '{}'",
                                category.display_name, parent.display_name
                            )));
                        }
                        if parent.kind != category.kind {
                            return Err(LedgerError::InvalidHierarchy(format!(
                                "Cannot move {} category '{}' under {} category '{}'",
                                category.kind, category.display_name, parent.kind, parent.display_name
                            )));
                        }
                        depth_of(book, parent_id) + 1
                    }
                    None => 1,
                };

                if new_depth + height_of(book, id) - 1 > max_depth {
                    return Err(LedgerError::InvalidHierarchy(format!(
                        "Categories can be nested at most {} levels deep",
                        max_depth
                    )));
                }
                if sibling_name_taken(book, new_parent, &category.name, Some(id)) {
                    return Err(LedgerError::Validation(format!(
                        "A category named '{}' already exists there",
                        category.display_name
                    )));
                }

                let mut moved = category.clone();
                moved.parent_id = new_parent;
                moved.updated_at = Utc::now();

                let mut uow = UnitOfWork::new();
                uow.put(moved.clone());
                if let Some(parent_id) = new_parent {
                    stage_parent(book, parent_id, &mut uow);
                }
                // The subtree's shape decides the depth check
                for descendant in book.category_subtree(id).into_iter().filter(|d| *d != id) {
                    if let Some(d) = book.category(descendant) {
                        uow.require(EntityKey::Category(d.id), d.version);
                    }
                }
                Ok((uow, moved))
            })?;

            self.last_commit.commit(self.storage, self.user_id, uow)?;
            Ok(Category {
                version: category.version + 1,
                ..category
            })
        })
    }

    /// List categories sorted by path
    pub fn list(&self, include_disabled: bool) -> LedgerResult<Vec<Category>> {
        self.storage.read(self.user_id, |book| {
            let mut categories: Vec<(String, Category)> = book
                .categories()
                .filter(|c| include_disabled || c.enabled)
                .map(|c| {
                    let path: Vec<&str> =
                        book.category_path(c.id).iter().map(|p| p.name.as_str()).collect();
                    (path.join("/"), c.clone())
                })
                .collect();
            categories.sort_by(|a, b| a.0.cmp(&b.0));
            Ok(categories.into_iter().map(|(_, c)| c).collect())
        })
    }

    /// Direct children of a category
    pub fn children(&self, id: CategoryId) -> LedgerResult<Vec<Category>> {
        self.storage.read(self.user_id, |book| {
            if book.category(id).is_none() {
                return Err(LedgerError::category_not_found(id.to_string()));
            }
            let mut children: Vec<Category> = book
                .categories()
                .filter(|c| c.parent_id == Some(id))
                .cloned()
                .collect();
            children.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(children)
        })
    }

    /// Every category below `id`, excluding `id` itself
    pub fn descendants(&self, id: CategoryId) -> LedgerResult<Vec<Category>> {
        self.storage.read(self.user_id, |book| {
            if book.category(id).is_none() {
                return Err(LedgerError::category_not_found(id.to_string()));
            }
            Ok(book
                .category_subtree(id)
                .into_iter()
                .filter(|d| *d != id)
                .filter_map(|d| book.category(d).cloned())
                .collect())
        })
    }

    /// The category forest, roots and children sorted by name
    pub fn tree(&self, include_disabled: bool) -> LedgerResult<Vec<CategoryNode>> {
        fn build(
            book: &Book,
            parent: Option<CategoryId>,
            include_disabled: bool,
            seen: &mut HashSet<CategoryId>,
        ) -> Vec<CategoryNode> {
            let mut level: Vec<&Category> = book
                .categories()
                .filter(|c| c.parent_id == parent && (include_disabled || c.enabled))
                .collect();
            level.sort_by(|a, b| a.name.cmp(&b.name));

            let mut nodes = Vec::with_capacity(level.len());
            for category in level {
                if seen.insert(category.id) {
                    nodes.push(CategoryNode {
                        category: category.clone(),
                        children: build(book, Some(category.id), include_disabled, seen),
                    });
                }
            }
            nodes
        }

        self.storage.read(self.user_id, |book| {
            Ok(build(book, None, include_disabled, &mut HashSet::new()))
        })
    }

    /// Ranked categories for a transaction description
    ///
    /// The advisor, if any, is consulted after the book lock is released.
    pub fn suggest(
        &self,
        description: &str,
        kind: Option<CategoryKind>,
    ) -> LedgerResult<Suggestions> {
        let settings = self.storage.settings();
        let limit = settings.suggestion_limit;
        let (pool, fallback) = self.storage.read(self.user_id, |book| {
            let pool = match self.advisor {
                Some(_) => suggest::candidate_pool(book, kind),
                None => Vec::new(),
            };
            Ok((pool, suggest::heuristic(book, description, kind, limit)))
        })?;

        if let Some(advisor) = &self.advisor {
            let timeout = Duration::from_millis(settings.advisor_timeout_ms);
            if let Some(ids) = suggest::consult(Arc::clone(advisor), description, pool, limit, timeout) {
                return Ok(Suggestions {
                    category_ids: ids,
                    source: SuggestionSource::Advisor,
                });
            }
        }
        Ok(Suggestions {
            category_ids: fallback,
            source: SuggestionSource::Heuristic,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{mpsc, Mutex};
    use std::thread;

    use crate::config::Settings;
    use crate::models::BuiltinCategory;
    use crate::services::AdvisorError;

    fn setup() -> (Storage, UserId) {
        setup_with(Settings::default())
    }

    fn setup_with(settings: Settings) -> (Storage, UserId) {
        let storage = Storage::in_memory_with(settings);
        let user = UserId::new();
        storage.create_user(user).unwrap();
        CategoryService::new(&storage, user).seed_defaults().unwrap();
        (storage, user)
    }

    fn contended() -> (Storage, UserId) {
        let mut settings = Settings::default();
        settings.retry.max_attempts = 200;
        setup_with(settings)
    }

    fn assert_no_enabled_child_of_disabled(service: &CategoryService) {
        for category in service.list(true).unwrap() {
            if let Some(parent_id) = category.parent_id {
                let parent = service.get(parent_id).unwrap();
                assert!(
                    parent.enabled || !category.enabled,
                    "'{}' is enabled under disabled '{}'",
                    category.name,
                    parent.name
                );
            }
        }
    }

    fn by_path(service: &CategoryService, path: &str) -> Category {
        service.find(path).unwrap().unwrap()
    }

    #[test]
    fn test_seed_defaults_is_idempotent() {
        let (storage, user) = setup();
        let service = CategoryService::new(&storage, user);
        let before = service.list(true).unwrap().len();
        assert_eq!(service.seed_defaults().unwrap(), 0);
        assert_eq!(service.list(true).unwrap().len(), before);
    }

    #[test]
    fn test_resolve_path() {
        let (storage, user) = setup();
        let service = CategoryService::new(&storage, user);
        let produce = by_path(&service, "home/groceries/fresh_produce");

        let path: Vec<String> = service
            .resolve_path(produce.id)
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(path, vec!["home", "groceries", "fresh_produce"]);

        assert!(service.resolve_path(CategoryId::new()).unwrap_err().is_not_found());
    }

    #[test]
    fn test_create_rejects_flag_mismatch() {
        let (storage, user) = setup();
        let service = CategoryService::new(&storage, user);
        let income = by_path(&service, "income");

        let err = service
            .create("Lottery", Some(income.id), CategoryKind::Expense)
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidHierarchy(_)));

        let lottery = service
            .create("Lottery", Some(income.id), CategoryKind::Income)
            .unwrap();
        assert_eq!(lottery.name, "lottery");
    }

    #[test]
    fn test_create_rejects_excess_depth() {
        let (storage, user) = setup();
        let service = CategoryService::new(&storage, user);
        let produce = by_path(&service, "home/groceries/fresh_produce");

        let apples = service
            .create("Apples", Some(produce.id), CategoryKind::Expense)
            .unwrap();
        let err = service
            .create("Green Apples", Some(apples.id), CategoryKind::Expense)
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidHierarchy(_)));
    }

    #[test]
    fn test_create_rejects_duplicate_sibling() {
        let (storage, user) = setup();
        let service = CategoryService::new(&storage, user);
        let home = by_path(&service, "home");
        let err = service
            .create("Groceries", Some(home.id), CategoryKind::Expense)
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_disable_subtree_and_enable() {
        let (storage, user) = setup();
        let service = CategoryService::new(&storage, user);
        let groceries = by_path(&service, "home/groceries");
        let produce = by_path(&service, "home/groceries/fresh_produce");

        let disabled = service.disable(groceries.id).unwrap();
        assert_eq!(disabled.len(), 5);
        assert!(service.resolve_path(produce.id).unwrap_err().is_not_found());

        // child of a disabled parent stays disabled
        assert!(matches!(
            service.enable(produce.id),
            Err(LedgerError::InvalidHierarchy(_))
        ));

        service.enable(groceries.id).unwrap();
        assert_eq!(service.resolve_path(produce.id).unwrap().len(), 3);
    }

    #[test]
    fn test_builtin_cannot_be_disabled() {
        let (storage, user) = setup();
        let service = CategoryService::new(&storage, user);
        let correction = storage
            .read(user, |book| {
                Ok(book.builtin_category(BuiltinCategory::BalanceCorrection).cloned())
            })
            .unwrap()
            .unwrap();

        let err = service.disable(correction.id).unwrap_err();
        assert!(matches!(err, LedgerError::InUse(_)));
    }

    #[test]
    fn test_move_rejects_cycle_and_flag_mismatch() {
        let (storage, user) = setup();
        let service = CategoryService::new(&storage, user);
        let home = by_path(&service, "home");
        let groceries = by_path(&service, "home/groceries");
        let salary = by_path(&service, "income/salary");

        assert!(matches!(
            service.move_category(home.id, Some(groceries.id)),
            Err(LedgerError::InvalidHierarchy(_))
        ));
        assert!(matches!(
            service.move_category(salary.id, Some(home.id)),
            Err(LedgerError::InvalidHierarchy(_))
        ));

        let food = by_path(&service, "food");
        let moved = service.move_category(groceries.id, Some(food.id)).unwrap();
        assert_eq!(moved.parent_id, Some(food.id));
        assert!(service.find("food/groceries/beverages").unwrap().is_some());
    }

    #[test]
    fn test_tree_and_descendants() {
        let (storage, user) = setup();
        let service = CategoryService::new(&storage, user);
        let tree = service.tree(false).unwrap();
        let home = tree.iter().find(|n| n.category.name == "home").unwrap();
        assert_eq!(home.children.len(), 4);

        let descendants = service.descendants(home.category.id).unwrap();
        assert_eq!(descendants.len(), 13);
        assert_eq!(service.children(home.category.id).unwrap().len(), 4);
    }

    #[test]
    fn test_increment_usage() {
        let (storage, user) = setup();
        let service = CategoryService::new(&storage, user);
        let coffee = by_path(&service, "food/coffee_shops");
        service.increment_usage(coffee.id).unwrap();
        service.increment_usage(coffee.id).unwrap();
        service.increment_usage(CategoryId::new()).unwrap();

        let coffee = service.get(coffee.id).unwrap();
        assert_eq!(coffee.usage_count, 2);
    }

    #[test]
    fn test_opposite_concurrent_moves_never_form_a_cycle() {
        for _ in 0..20 {
            let (storage, user) = contended();
            let service = CategoryService::new(&storage, user);
            let food = by_path(&service, "food");
            let alpha = service.create("Alpha", Some(food.id), CategoryKind::Expense).unwrap().id;
            let beta = service.create("Beta", Some(food.id), CategoryKind::Expense).unwrap().id;

            let moved = thread::scope(|scope| {
                let first = scope.spawn(|| {
                    CategoryService::new(&storage, user).move_category(alpha, Some(beta))
                });
                let second = scope.spawn(|| {
                    CategoryService::new(&storage, user).move_category(beta, Some(alpha))
                });
                [first.join().unwrap(), second.join().unwrap()]
            });

            assert_eq!(moved.iter().filter(|r| r.is_ok()).count(), 1);
            for result in &moved {
                if let Err(err) = result {
                    assert!(matches!(err, LedgerError::InvalidHierarchy(_)), "{:?}", err);
                }
            }
            let alpha = service.get(alpha).unwrap();
            let beta = service.get(beta).unwrap();
            assert!(!(alpha.parent_id == Some(beta.id) && beta.parent_id == Some(alpha.id)));
            let reachable: usize = service.tree(true).unwrap().iter().map(count_nodes).sum();
            assert_eq!(reachable, service.list(true).unwrap().len());
        }
    }

    fn count_nodes(node: &CategoryNode) -> usize {
        1 + node.children.iter().map(count_nodes).sum::<usize>()
    }

    #[test]
    fn test_create_racing_disable_of_parent() {
        for _ in 0..20 {
            let (storage, user) = contended();
            let service = CategoryService::new(&storage, user);
            let food = by_path(&service, "food").id;

            thread::scope(|scope| {
                scope.spawn(|| {
                    // Loses with NotFound when the disable lands first
                    let _ = CategoryService::new(&storage, user).create(
                        "Snacks",
                        Some(food),
                        CategoryKind::Expense,
                    );
                });
                scope.spawn(|| {
                    CategoryService::new(&storage, user).disable(food).unwrap();
                });
            });

            assert_no_enabled_child_of_disabled(&service);
        }
    }

    #[test]
    fn test_move_racing_disable_of_new_parent() {
        for _ in 0..20 {
            let (storage, user) = contended();
            let service = CategoryService::new(&storage, user);
            let food = by_path(&service, "food").id;
            let groceries = by_path(&service, "home/groceries").id;

            thread::scope(|scope| {
                scope.spawn(|| {
                    let _ = CategoryService::new(&storage, user).move_category(groceries, Some(food));
                });
                scope.spawn(|| {
                    CategoryService::new(&storage, user).disable(food).unwrap();
                });
            });

            assert_no_enabled_child_of_disabled(&service);
        }
    }

    struct Gate {
        started: Mutex<mpsc::Sender<()>>,
        release: Mutex<mpsc::Receiver<()>>,
        pick: CategoryId,
    }

    impl CategoryAdvisor for Gate {
        fn suggest(&self, _: &str, _: &[Category]) -> Result<Vec<CategoryId>, AdvisorError> {
            self.started.lock().unwrap().send(()).unwrap();
            self.release
                .lock()
                .unwrap()
                .recv_timeout(Duration::from_secs(5))
                .map_err(|_| AdvisorError::Unavailable("never released".into()))?;
            Ok(vec![self.pick])
        }
    }

    #[test]
    fn test_writers_proceed_while_advisor_works() {
        let mut settings = Settings::default();
        settings.advisor_timeout_ms = 10_000;
        let (storage, user) = setup_with(settings);
        let service = CategoryService::new(&storage, user);
        let food = by_path(&service, "food").id;
        let coffee = by_path(&service, "food/coffee_shops").id;

        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let advisor = Arc::new(Gate {
            started: Mutex::new(started_tx),
            release: Mutex::new(release_rx),
            pick: coffee,
        });

        thread::scope(|scope| {
            let suggestion = scope.spawn(|| {
                CategoryService::new(&storage, user)
                    .with_advisor(advisor.clone())
                    .suggest("oat latte", None)
                    .unwrap()
            });
            started_rx.recv_timeout(Duration::from_secs(5)).unwrap();
            service.create("Snacks", Some(food), CategoryKind::Expense).unwrap();
            release_tx.send(()).unwrap();

            let suggestions = suggestion.join().unwrap();
            assert_eq!(suggestions.source, SuggestionSource::Advisor);
            assert_eq!(suggestions.category_ids, vec![coffee]);
        });
    }

    struct Stalled;

    impl CategoryAdvisor for Stalled {
        fn suggest(&self, _: &str, _: &[Category]) -> Result<Vec<CategoryId>, AdvisorError> {
            thread::sleep(Duration::from_secs(2));
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_late_advisor_falls_back_to_heuristic() {
        let mut settings = Settings::default();
        settings.advisor_timeout_ms = 20;
        let (storage, user) = setup_with(settings);
        let suggestions = CategoryService::new(&storage, user)
            .with_advisor(Arc::new(Stalled))
            .suggest("STARBUCKS #1234", None)
            .unwrap();
        assert_eq!(suggestions.source, SuggestionSource::Heuristic);
        let first = CategoryService::new(&storage, user)
            .get(suggestions.category_ids[0])
            .unwrap();
        assert_eq!(first.name, "coffee_shops");
    }

    #[test]
    fn test_tree_covers_every_category_once() {
        let (storage, user) = setup();
        let service = CategoryService::new(&storage, user);
        let tree = service.tree(true).unwrap();
        let total: usize = tree.iter().map(count_nodes).sum();
        assert_eq!(total, service.list(true).unwrap().len());
        let names: Vec<&str> = tree.iter().map(|n| n.category.name.as_str()).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }

    #[test]
    fn test_find_ambiguous_name() {
        let (storage, user) = setup();
        let service = CategoryService::new(&storage, user);
        let food = by_path(&service, "food");
        service
            .create("Gas", Some(food.id), CategoryKind::Expense)
            .unwrap();
        assert!(service.find("gas").unwrap_err().is_validation());
        assert!(service.find("food/gas").unwrap().is_some());
    }
}
