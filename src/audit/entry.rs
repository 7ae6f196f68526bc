//! Audit entry data structures
//!
//! Defines the structure of audit log entries including operation types,
//! entity types, and the entry format itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::UserId;

/// Types of operations that can be audited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Entity was created
    Create,
    /// Entity was updated
    Update,
    /// Entity was deleted
    Delete,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Create => write!(f, "CREATE"),
            Operation::Update => write!(f, "UPDATE"),
            Operation::Delete => write!(f, "DELETE"),
        }
    }
}

/// Types of entities that can be audited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Account,
    Category,
    Transaction,
    Recurrence,
    Budget,
    Goal,
    Allocation,
}

impl EntityType {
    pub fn name(&self) -> &'static str {
        match self {
            EntityType::Account => "Account",
            EntityType::Category => "Category",
            EntityType::Transaction => "Transaction",
            EntityType::Recurrence => "Recurrence",
            EntityType::Budget => "Budget",
            EntityType::Goal => "Goal",
            EntityType::Allocation => "Allocation",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A single audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// When the operation occurred (UTC)
    pub timestamp: DateTime<Utc>,

    /// Type of operation performed
    pub operation: Operation,

    /// Type of entity affected
    pub entity_type: EntityType,

    /// ID of the affected entity
    pub entity_id: String,

    /// Human-readable description of the entity (e.g., account name)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_name: Option<String>,

    /// Owner of the book the change was committed to
    pub user_id: UserId,

    /// Book version produced by the commit
    #[serde(default)]
    pub book_version: u64,

    /// Entity before the operation (for updates/deletes)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<Value>,

    /// Entity after the operation (for creates/updates)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<Value>,

    /// Human-readable diff summary
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff_summary: Option<String>,
}

impl AuditEntry {
    /// Build an entry from the before and after images of one entity
    ///
    /// The operation follows from which images are present.
    pub fn from_images(
        user_id: UserId,
        book_version: u64,
        entity_type: EntityType,
        entity_id: impl Into<String>,
        entity_name: Option<String>,
        before: Option<Value>,
        after: Option<Value>,
    ) -> Self {
        let operation = match (&before, &after) {
            (None, _) => Operation::Create,
            (Some(_), Some(_)) => Operation::Update,
            (Some(_), None) => Operation::Delete,
        };
        let diff_summary = match (&before, &after) {
            (Some(b), Some(a)) => generate_diff(b, a),
            _ => None,
        };
        Self {
            timestamp: Utc::now(),
            operation,
            entity_type,
            entity_id: entity_id.into(),
            entity_name,
            user_id,
            book_version,
            before,
            after,
            diff_summary,
        }
    }

    /// Format the entry for human-readable output
    pub fn format_human_readable(&self) -> String {
        let mut output = format!(
            "[{}] {} {} {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            self.operation,
            self.entity_type,
            self.entity_id
        );

        if let Some(name) = &self.entity_name {
            output.push_str(&format!(" ({})", name));
        }

        if let Some(diff) = &self.diff_summary {
            output.push_str(&format!("\n  Changes: {}", diff));
        }

        output
    }
}

/// Fields every commit touches; left out of diff summaries
const BOOKKEEPING_FIELDS: &[&str] = &["version", "updated_at"];

/// Describe the top-level field changes between two entity images
pub fn generate_diff(before: &Value, after: &Value) -> Option<String> {
    let (Value::Object(before_obj), Value::Object(after_obj)) = (before, after) else {
        return (before != after)
            .then(|| format!("{} -> {}", format_value(before), format_value(after)));
    };

    let mut changes = Vec::new();
    for (key, before_val) in before_obj {
        if BOOKKEEPING_FIELDS.contains(&key.as_str()) {
            continue;
        }
        match after_obj.get(key) {
            Some(after_val) if after_val != before_val => changes.push(format!(
                "{}: {} -> {}",
                key,
                format_value(before_val),
                format_value(after_val)
            )),
            Some(_) => {}
            None => changes.push(format!("{}: {} -> (removed)", key, format_value(before_val))),
        }
    }
    for (key, after_val) in after_obj {
        if !before_obj.contains_key(key) && !BOOKKEEPING_FIELDS.contains(&key.as_str()) {
            changes.push(format!("{}: (added) -> {}", key, format_value(after_val)));
        }
    }

    (!changes.is_empty()).then(|| changes.join(", "))
}

fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => {
            if s.chars().count() > 50 {
                let head: String = s.chars().take(47).collect();
                format!("\"{}...\"", head)
            } else {
                format!("\"{}\"", s)
            }
        }
        Value::Array(arr) => format!("[{} items]", arr.len()),
        Value::Object(obj) => format!("{{{} fields}}", obj.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_operation_display() {
        assert_eq!(Operation::Create.to_string(), "CREATE");
        assert_eq!(Operation::Update.to_string(), "UPDATE");
        assert_eq!(Operation::Delete.to_string(), "DELETE");
    }

    #[test]
    fn test_operation_from_images() {
        let user = UserId::new();
        let data = json!({"name": "Checking", "balance": 1000});

        let entry = AuditEntry::from_images(
            user,
            1,
            EntityType::Account,
            "acc-12345678",
            Some("Checking".into()),
            None,
            Some(data.clone()),
        );
        assert_eq!(entry.operation, Operation::Create);
        assert!(entry.diff_summary.is_none());

        let entry = AuditEntry::from_images(
            user,
            2,
            EntityType::Account,
            "acc-12345678",
            None,
            Some(data.clone()),
            None,
        );
        assert_eq!(entry.operation, Operation::Delete);
        assert!(entry.after.is_none());
    }

    #[test]
    fn test_update_diff_skips_bookkeeping() {
        let before = json!({"name": "Checking", "balance": 1000, "version": 3});
        let after = json!({"name": "Checking", "balance": 1500, "version": 4});
        let entry = AuditEntry::from_images(
            UserId::new(),
            9,
            EntityType::Account,
            "acc-1",
            None,
            Some(before),
            Some(after),
        );
        assert_eq!(entry.operation, Operation::Update);
        assert_eq!(entry.diff_summary.as_deref(), Some("balance: 1000 -> 1500"));
    }

    #[test]
    fn test_diff_added_and_removed_fields() {
        let before = json!({"a": 1, "b": "x"});
        let after = json!({"a": 1, "c": true});
        let diff = generate_diff(&before, &after).unwrap();
        assert!(diff.contains("b: \"x\" -> (removed)"));
        assert!(diff.contains("c: (added) -> true"));
        assert_eq!(generate_diff(&before, &before), None);
    }

    #[test]
    fn test_human_readable_format() {
        let entry = AuditEntry::from_images(
            UserId::new(),
            1,
            EntityType::Goal,
            "goal-12345678",
            Some("Vacation".to_string()),
            None,
            Some(json!({"name": "Vacation"})),
        );

        let formatted = entry.format_human_readable();
        assert!(formatted.contains("CREATE"));
        assert!(formatted.contains("Goal"));
        assert!(formatted.contains("goal-12345678"));
        assert!(formatted.contains("Vacation"));
    }
}
