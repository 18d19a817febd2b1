//! SQLite change-history triggers.
//!
//! SQLite triggers can not assign to `NEW`, so the revision numbering used
//! for MySQL does not carry over. The dialect is registered so history
//! tables are still created and altered, but no triggers are synthesized.

use crate::schema::TableDescriptor;

// TODO: number revisions with an AFTER INSERT trigger that updates the
// inserted history row instead of assigning NEW.
pub(super) fn build_triggers(
    _original: &TableDescriptor,
    _history: &TableDescriptor,
    _change_author_column: &str,
    _updated_at_column: &str,
) -> Vec<String> {
    Vec::new()
}
