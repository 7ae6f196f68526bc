//! Audit logging system for Ledgerwise
//!
//! Records every committed create, update and delete with before/after images
//! in an append-only audit log.
//!
//! - `AuditEntry`: one audit record with timestamp, operation, entity and
//!   owning user, plus the before/after images and a diff summary.
//! - `AuditLogger`: appends entries to the log file as JSON lines.
//!
//! Entries are produced by `Storage::commit` from the unit of work it just
//! applied; services never write to the audit log directly.

mod entry;
mod logger;

pub use entry::{generate_diff, AuditEntry, EntityType, Operation};
pub use logger::AuditLogger;
