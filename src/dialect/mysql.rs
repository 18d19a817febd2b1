//! MySQL/MariaDB change-history triggers.
//!
//! The insert, update and delete triggers copy the affected row of the
//! original table into the history table with `INSERT ... SELECT`, leaving
//! the revision NULL. A `BEFORE INSERT` trigger on the history table then
//! fills in the next revision for the row's primary key.
//!
//! Every trigger selects the affected row by primary key, so a table
//! without one gets no triggers.

use super::{trigger_names, Dialect};
use crate::schema::{TableDescriptor, COLUMN_ACTION, COLUMN_ACTION_AT, COLUMN_REVISION};

const NEW_RECORD: &str = "NEW";
const OLD_RECORD: &str = "OLD";

pub(super) fn build_triggers(
    original: &TableDescriptor,
    history: &TableDescriptor,
    change_author_column: &str,
    updated_at_column: &str,
) -> Vec<String> {
    if !original.has_primary_key() {
        return Vec::new();
    }

    let [insert_trigger, update_trigger, delete_trigger, revision_trigger] =
        trigger_names(original, history);

    vec![
        format!(
            "CREATE TRIGGER {} AFTER INSERT ON {} FOR EACH ROW {}{}",
            insert_trigger,
            original.quoted_table_name,
            insert_history_entry(original, history, "insert", &[]),
            where_clause(&[primary_keys_match(original, NEW_RECORD)]),
        ),
        format!(
            "CREATE TRIGGER {} AFTER UPDATE ON {} FOR EACH ROW {}{}",
            update_trigger,
            original.quoted_table_name,
            insert_history_entry(original, history, "update", &[]),
            where_clause(&[
                primary_keys_match(original, NEW_RECORD),
                format!(
                    "({})",
                    row_updated(original, &[change_author_column, updated_at_column])
                ),
            ]),
        ),
        format!(
            "CREATE TRIGGER {} BEFORE DELETE ON {} FOR EACH ROW {}{}",
            delete_trigger,
            original.quoted_table_name,
            insert_history_entry(original, history, "delete", &[change_author_column]),
            where_clause(&[primary_keys_match(original, OLD_RECORD)]),
        ),
        format!(
            "CREATE TRIGGER {} BEFORE INSERT ON {} FOR EACH ROW {}",
            revision_trigger,
            history.quoted_table_name,
            increment_revision(original, history),
        ),
    ]
}

/// `INSERT ... SELECT` copying one original row into the history table.
fn insert_history_entry(
    original: &TableDescriptor,
    history: &TableDescriptor,
    action: &str,
    excluded: &[&str],
) -> String {
    let columns = original.quoted_column_names(excluded);
    let values: Vec<String> = columns.iter().map(|c| format!("d.{}", c)).collect();

    format!(
        "INSERT INTO {} ({},{},{},{}) SELECT '{}', NULL, NOW(), {} FROM {} AS d",
        history.quoted_table_name,
        quote(COLUMN_ACTION),
        quote(COLUMN_REVISION),
        quote(COLUMN_ACTION_AT),
        columns.join(","),
        action,
        values.join(", "),
        original.quoted_table_name,
    )
}

/// `d.<pk> = <record>.<pk>` for every primary-key column.
fn primary_keys_match(original: &TableDescriptor, record: &str) -> String {
    original
        .quoted_primary_key_names()
        .iter()
        .map(|pk| format!("d.{} = {}.{}", pk, record, pk))
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// True when any audited column differs between OLD and NEW. `<=>` treats
/// two NULLs as equal.
fn row_updated(original: &TableDescriptor, excluded: &[&str]) -> String {
    let conditions: Vec<String> = original
        .quoted_column_names(excluded)
        .iter()
        .map(|c| format!("NOT (OLD.{} <=> NEW.{})", c, c))
        .collect();

    if conditions.is_empty() {
        return "FALSE".to_string();
    }

    conditions.join(" OR ")
}

fn increment_revision(original: &TableDescriptor, history: &TableDescriptor) -> String {
    let revision = quote(COLUMN_REVISION);

    format!(
        "BEGIN SET NEW.{} = (SELECT IFNULL(MAX(d.{}), 0) + 1 FROM {} AS d{}); END",
        revision,
        revision,
        history.quoted_table_name,
        where_clause(&[primary_keys_match(original, NEW_RECORD)]),
    )
}

/// ` WHERE a AND b`
fn where_clause(conditions: &[String]) -> String {
    format!(" WHERE {}", conditions.join(" AND "))
}

fn quote(name: &str) -> String {
    Dialect::Mysql.quote_ident(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Entity, FieldSpec};
    use pretty_assertions::assert_eq;

    fn tables(entity: &Entity) -> (TableDescriptor, TableDescriptor) {
        let q = |n: &str| quote(n);
        let original = TableDescriptor::new(&entity.table, &entity.fields, &[], &q);
        let history = TableDescriptor::new(
            &entity.history_table("history"),
            &entity.history_fields("author_email"),
            &[],
            &q,
        );
        (original, history)
    }

    fn order() -> Entity {
        Entity::new(
            "Order",
            "orders",
            vec![
                FieldSpec::new("id", "INT", true),
                FieldSpec::new("value", "INT", false),
                FieldSpec::new("updated_at", "DATETIME", false),
                FieldSpec::new("author_email", "VARCHAR(255)", false),
            ],
        )
    }

    fn triggers(entity: &Entity) -> Vec<String> {
        let (original, history) = tables(entity);
        build_triggers(&original, &history, "author_email", "updated_at")
    }

    #[test]
    fn test_four_triggers() {
        assert_eq!(triggers(&order()).len(), 4);
    }

    #[test]
    fn test_insert_trigger() {
        assert_eq!(
            triggers(&order())[0],
            "CREATE TRIGGER orders_ai AFTER INSERT ON `orders` FOR EACH ROW \
             INSERT INTO `orders_history` (`change_history_action`,`change_history_revision`,`change_history_action_at`,`id`,`value`,`updated_at`,`author_email`) \
             SELECT 'insert', NULL, NOW(), d.`id`, d.`value`, d.`updated_at`, d.`author_email` \
             FROM `orders` AS d WHERE d.`id` = NEW.`id`"
        );
    }

    #[test]
    fn test_update_trigger_detects_changes_null_safe() {
        assert_eq!(
            triggers(&order())[1],
            "CREATE TRIGGER orders_au AFTER UPDATE ON `orders` FOR EACH ROW \
             INSERT INTO `orders_history` (`change_history_action`,`change_history_revision`,`change_history_action_at`,`id`,`value`,`updated_at`,`author_email`) \
             SELECT 'update', NULL, NOW(), d.`id`, d.`value`, d.`updated_at`, d.`author_email` \
             FROM `orders` AS d WHERE d.`id` = NEW.`id` \
             AND (NOT (OLD.`id` <=> NEW.`id`) OR NOT (OLD.`value` <=> NEW.`value`))"
        );
    }

    #[test]
    fn test_delete_trigger_skips_author() {
        assert_eq!(
            triggers(&order())[2],
            "CREATE TRIGGER orders_bd BEFORE DELETE ON `orders` FOR EACH ROW \
             INSERT INTO `orders_history` (`change_history_action`,`change_history_revision`,`change_history_action_at`,`id`,`value`,`updated_at`) \
             SELECT 'delete', NULL, NOW(), d.`id`, d.`value`, d.`updated_at` \
             FROM `orders` AS d WHERE d.`id` = OLD.`id`"
        );
    }

    #[test]
    fn test_revision_trigger() {
        assert_eq!(
            triggers(&order())[3],
            "CREATE TRIGGER orders_history_revai BEFORE INSERT ON `orders_history` FOR EACH ROW \
             BEGIN SET NEW.`change_history_revision` = \
             (SELECT IFNULL(MAX(d.`change_history_revision`), 0) + 1 FROM `orders_history` AS d \
             WHERE d.`id` = NEW.`id`); END"
        );
    }

    #[test]
    fn test_composite_primary_key() {
        let entity = Entity::new(
            "Membership",
            "memberships",
            vec![
                FieldSpec::new("user_id", "INT", true),
                FieldSpec::new("group_id", "INT", true),
                FieldSpec::new("role", "VARCHAR(16)", false),
            ],
        );
        let statements = triggers(&entity);
        assert!(statements[0].ends_with(
            "WHERE d.`user_id` = NEW.`user_id` AND d.`group_id` = NEW.`group_id`"
        ));
        assert!(statements[3].contains(
            "WHERE d.`user_id` = NEW.`user_id` AND d.`group_id` = NEW.`group_id`); END"
        ));
    }

    #[test]
    fn test_only_excluded_columns_never_counts_as_change() {
        let (original, history) = tables(&order());
        let statements = build_triggers(&original, &history, "author_email", "updated_at");
        assert!(!statements[1].contains("OLD.`author_email`"));
        assert!(!statements[1].contains("OLD.`updated_at`"));

        let audited_nothing = Entity::new(
            "Touch",
            "touches",
            vec![FieldSpec::new("updated_at", "DATETIME", true)],
        );
        let (original, history) = tables(&audited_nothing);
        let statements = build_triggers(&original, &history, "author_email", "updated_at");
        assert!(statements[1].ends_with("(FALSE)"));
    }

    #[test]
    fn test_without_primary_key() {
        let entity = Entity::new(
            "Log",
            "logs",
            vec![FieldSpec::new("line", "TEXT", false)],
        );
        assert!(triggers(&entity).is_empty());
    }
}
