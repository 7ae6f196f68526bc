//! Category suggestions for a transaction description
//!
//! An external advisor (for example the assistant's classifier) may be plugged
//! in through [`CategoryAdvisor`]. It runs on its own thread against a copy of
//! the candidate pool, so no book lock is held while it works, and it gets a
//! fixed time budget. When it is missing, fails, is late or returns nothing
//! usable, a deterministic local heuristic ranks the categories instead.

use std::cmp::Reverse;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::models::{Category, CategoryId, CategoryKind};
use crate::storage::Book;

/// Failure of an external advisor
#[derive(Error, Debug)]
pub enum AdvisorError {
    #[error("advisor unavailable: {0}")]
    Unavailable(String),

    #[error("advisor returned an invalid response: {0}")]
    InvalidResponse(String),
}

/// Outbound hook for ranking categories
pub trait CategoryAdvisor: Send + Sync {
    /// Rank `candidates` for `description`, best first
    fn suggest(
        &self,
        description: &str,
        candidates: &[Category],
    ) -> Result<Vec<CategoryId>, AdvisorError>;
}

/// Where a suggestion list came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionSource {
    Advisor,
    Heuristic,
}

/// Ranked category ids
#[derive(Debug, Clone, serde::Serialize)]
pub struct Suggestions {
    pub category_ids: Vec<CategoryId>,
    pub source: SuggestionSource,
}

fn tokens(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Keyword hits weigh more than name hits
fn match_score(category: &Category, description: &str, desc_tokens: &[String]) -> u32 {
    let mut score = 0;
    for keyword in &category.keywords {
        let keyword = keyword.to_lowercase();
        let hit = if keyword.contains(' ') {
            description.contains(&keyword)
        } else {
            desc_tokens.iter().any(|t| *t == keyword || t.starts_with(&keyword))
        };
        if hit {
            score += 3;
        }
    }
    for part in category.name.split('_') {
        if part.len() > 2 && desc_tokens.iter().any(|t| t == part) {
            score += 2;
        }
    }
    score
}

/// Rank categories with the local heuristic
///
/// Categories matching the description come first, by match score then usage
/// then recency then depth. With no match at all, the most used categories
/// are returned.
pub fn heuristic(
    book: &Book,
    description: &str,
    kind: Option<CategoryKind>,
    limit: usize,
) -> Vec<CategoryId> {
    let description = description.to_lowercase();
    let desc_tokens = tokens(&description);

    let mut ranked: Vec<(u32, &Category, usize)> = candidates(book, kind)
        .map(|c| {
            let depth = book.category_path(c.id).len();
            (match_score(c, &description, &desc_tokens), c, depth)
        })
        .collect();

    let any_match = ranked.iter().any(|(score, _, _)| *score > 0);
    if any_match {
        ranked.retain(|(score, _, _)| *score > 0);
    } else {
        ranked.retain(|(_, c, _)| c.usage_count > 0);
    }

    ranked.sort_by_key(|(score, c, depth)| {
        (
            Reverse(*score),
            Reverse(c.usage_count),
            Reverse(c.last_used_seq),
            Reverse(*depth),
            c.name.clone(),
        )
    });
    ranked.into_iter().take(limit).map(|(_, c, _)| c.id).collect()
}

fn candidates(book: &Book, kind: Option<CategoryKind>) -> impl Iterator<Item = &Category> {
    book.categories().filter(move |c| {
        c.enabled && !c.is_balance_correction() && kind.map_or(true, |k| c.kind == k)
    })
}

/// Categories an advisor may choose from, sorted by name
pub fn candidate_pool(book: &Book, kind: Option<CategoryKind>) -> Vec<Category> {
    let mut pool: Vec<Category> = candidates(book, kind).cloned().collect();
    pool.sort_by(|a, b| a.name.cmp(&b.name));
    pool
}

/// Advisor ids that name a pool member, deduplicated and capped at `limit`
fn accept(ids: Vec<CategoryId>, pool: &[Category], limit: usize) -> Vec<CategoryId> {
    let mut accepted: Vec<CategoryId> = Vec::new();
    for id in ids {
        if pool.iter().any(|c| c.id == id) && !accepted.contains(&id) {
            accepted.push(id);
        }
    }
    accepted.truncate(limit);
    accepted
}

/// Ask `advisor` to rank `pool`, waiting at most `timeout`
///
/// `None` means the heuristic should answer. An answer that arrives after
/// the budget is dropped.
pub fn consult(
    advisor: Arc<dyn CategoryAdvisor>,
    description: &str,
    pool: Vec<Category>,
    limit: usize,
    timeout: Duration,
) -> Option<Vec<CategoryId>> {
    let (tx, rx) = mpsc::channel();
    let description = description.to_string();
    let spawned = thread::Builder::new()
        .name("category-advisor".into())
        .spawn(move || {
            let result = advisor
                .suggest(&description, &pool)
                .map(|ids| accept(ids, &pool, limit));
            // The caller may have given up already
            let _ = tx.send(result);
        });
    if let Err(e) = spawned {
        warn!(error = %e, "could not start category advisor, using heuristic");
        return None;
    }

    match rx.recv_timeout(timeout) {
        Ok(Ok(ids)) if !ids.is_empty() => Some(ids),
        Ok(Ok(_)) => {
            debug!("advisor returned no usable categories, using heuristic");
            None
        }
        Ok(Err(e)) => {
            warn!(error = %e, "category advisor failed, using heuristic");
            None
        }
        Err(RecvTimeoutError::Timeout) => {
            warn!(?timeout, "category advisor timed out, using heuristic");
            None
        }
        Err(RecvTimeoutError::Disconnected) => {
            warn!("category advisor stopped without answering, using heuristic");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    use crate::models::UserId;
    use crate::storage::default_category_seed;

    fn seeded_book() -> Book {
        let mut book = Book::new(UserId::new());
        let uow = default_category_seed(&book);
        uow.check(&book).unwrap();
        uow.apply(&mut book);
        book
    }

    fn name_of(book: &Book, id: CategoryId) -> String {
        book.category(id).unwrap().name.clone()
    }

    struct Failing;

    impl CategoryAdvisor for Failing {
        fn suggest(&self, _: &str, _: &[Category]) -> Result<Vec<CategoryId>, AdvisorError> {
            Err(AdvisorError::Unavailable("timeout".into()))
        }
    }

    struct Fixed(Vec<CategoryId>);

    impl CategoryAdvisor for Fixed {
        fn suggest(&self, _: &str, _: &[Category]) -> Result<Vec<CategoryId>, AdvisorError> {
            Ok(self.0.clone())
        }
    }

    struct Slow(Duration);

    impl CategoryAdvisor for Slow {
        fn suggest(&self, _: &str, candidates: &[Category]) -> Result<Vec<CategoryId>, AdvisorError> {
            thread::sleep(self.0);
            Ok(candidates.iter().map(|c| c.id).collect())
        }
    }

    fn budget() -> Duration {
        Duration::from_secs(5)
    }

    #[test]
    fn test_keyword_match_ranks_first() {
        let book = seeded_book();
        let ids = heuristic(&book, "STARBUCKS #1234 Seattle", None, 5);
        assert_eq!(name_of(&book, ids[0]), "coffee_shops");
    }

    #[test]
    fn test_multiword_keyword() {
        let book = seeded_book();
        let ids = heuristic(&book, "Whole Foods Market", None, 3);
        assert_eq!(name_of(&book, ids[0]), "groceries");
    }

    #[test]
    fn test_kind_filter() {
        let book = seeded_book();
        let ids = heuristic(&book, "monthly payroll deposit", Some(CategoryKind::Income), 5);
        assert_eq!(name_of(&book, ids[0]), "salary");
        assert!(ids
            .iter()
            .all(|id| book.category(*id).unwrap().kind == CategoryKind::Income));
    }

    #[test]
    fn test_balance_correction_never_suggested() {
        let book = seeded_book();
        let ids = heuristic(&book, "balance correction", None, 10);
        assert!(ids
            .iter()
            .all(|id| !book.category(*id).unwrap().is_balance_correction()));
    }

    #[test]
    fn test_no_match_falls_back_to_most_used() {
        let mut book = seeded_book();
        let dental = book.categories().find(|c| c.name == "dental").unwrap().id;
        let mut uow = crate::storage::UnitOfWork::new();
        uow.increment_usage(dental);
        uow.apply(&mut book);

        assert_eq!(heuristic(&book, "zzqx", None, 5), vec![dental]);
    }

    #[test]
    fn test_failing_advisor_gives_nothing() {
        let book = seeded_book();
        let pool = candidate_pool(&book, None);
        assert!(consult(Arc::new(Failing), "uber ride home", pool, 3, budget()).is_none());
    }

    #[test]
    fn test_advisor_result_is_filtered() {
        let book = seeded_book();
        let books = book.categories().find(|c| c.name == "books").unwrap().id;
        let correction = book
            .categories()
            .find(|c| c.is_balance_correction())
            .unwrap()
            .id;
        let advisor = Arc::new(Fixed(vec![CategoryId::new(), correction, books, books]));

        let pool = candidate_pool(&book, None);
        let ids = consult(advisor, "anything", pool, 5, budget()).unwrap();
        assert_eq!(ids, vec![books]);
    }

    #[test]
    fn test_advisor_without_usable_ids_gives_nothing() {
        let book = seeded_book();
        let advisor = Arc::new(Fixed(vec![CategoryId::new()]));
        assert!(consult(advisor, "anything", candidate_pool(&book, None), 5, budget()).is_none());
    }

    #[test]
    fn test_slow_advisor_is_cut_off() {
        let book = seeded_book();
        let advisor = Arc::new(Slow(Duration::from_secs(2)));
        let started = Instant::now();
        let result = consult(
            advisor,
            "anything",
            candidate_pool(&book, None),
            5,
            Duration::from_millis(20),
        );
        assert!(result.is_none());
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_pool_respects_kind() {
        let book = seeded_book();
        let pool = candidate_pool(&book, Some(CategoryKind::Income));
        assert!(!pool.is_empty());
        assert!(pool.iter().all(|c| c.kind == CategoryKind::Income && c.enabled));
        assert!(pool.windows(2).all(|w| w[0].name <= w[1].name));
    }
}
