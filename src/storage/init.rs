//! Default data for a new book

use std::collections::HashMap;

use crate::models::{BuiltinCategory, Category, CategoryId, DEFAULT_CATEGORIES};

use super::book::Book;
use super::unit_of_work::UnitOfWork;

/// Stage the builtin categories and the default hierarchy
///
/// Entries already present (same name under the same parent) are reused, so
/// seeding twice stages nothing the second time.
pub fn default_category_seed(book: &Book) -> UnitOfWork {
    let user_id = book.user_id();
    let mut uow = UnitOfWork::new();

    for &builtin in BuiltinCategory::all() {
        if book.builtin_category(builtin).is_none() {
            uow.put(Category::builtin(user_id, builtin));
        }
    }

    let find = |name: &str, parent: Option<CategoryId>| {
        book.categories()
            .find(|c| c.name == name && c.parent_id == parent && c.builtin.is_none())
            .map(|c| c.id)
    };

    let mut ids: HashMap<&str, CategoryId> = HashMap::new();
    for entry in DEFAULT_CATEGORIES {
        let parent_id = match entry.parent {
            Some(parent) => match ids.get(parent) {
                Some(&id) => Some(id),
                None => continue,
            },
            None => None,
        };

        let id = match find(entry.name, parent_id) {
            Some(id) => id,
            None => {
                let mut category = Category::new(
                    user_id,
                    crate::models::category::display_from_name(entry.name),
                    parent_id,
                    entry.kind,
                );
                category.keywords = entry.keywords.iter().map(|k| k.to_string()).collect();
                category.is_default = true;
                let id = category.id;
                uow.put(category);
                id
            }
        };
        ids.insert(entry.name, id);
    }

    uow
}
