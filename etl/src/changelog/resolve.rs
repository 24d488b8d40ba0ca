use std::collections::HashMap;

use crate::changelog::{ChangeFlag, ChangeLogRow};

/// Net effect of a batch of change-log rows on one primary key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedChange {
    /// Insert the row, or update every column of the existing row.
    Upsert {
        key: Vec<Option<String>>,
        values: Vec<Option<String>>,
    },
    /// Delete the row if it exists.
    Delete { key: Vec<Option<String>> },
}

impl ResolvedChange {
    pub fn key(&self) -> &[Option<String>] {
        match self {
            ResolvedChange::Upsert { key, .. } | ResolvedChange::Delete { key } => key,
        }
    }
}

/// Collapses a batch to the latest change per primary key.
///
/// `key_indices` are the positions of the primary-key columns in [`ChangeLogRow::values`]. The
/// row with the highest commit timestamp wins. Within one commit the flag decides, an update
/// beating an insert beating a delete, matching `ORDER BY etl_commit_ts DESC, etl_flag DESC` in
/// the generated merge. Rows equal on both have no defined winner. Results are ordered by the
/// first appearance of their key in the batch.
pub fn resolve_batch(rows: &[ChangeLogRow], key_indices: &[usize]) -> Vec<ResolvedChange> {
    let mut order: Vec<Vec<Option<String>>> = Vec::new();
    let mut latest: HashMap<Vec<Option<String>>, &ChangeLogRow> = HashMap::new();

    for row in rows {
        let key: Vec<_> = key_indices
            .iter()
            .map(|index| row.values.get(*index).cloned().flatten())
            .collect();

        match latest.get(&key).map(|current| ordering_key(current)) {
            Some(current) if current >= ordering_key(row) => {}
            Some(_) => {
                latest.insert(key, row);
            }
            None => {
                order.push(key.clone());
                latest.insert(key, row);
            }
        }
    }

    order
        .into_iter()
        .filter_map(|key| {
            let row = latest.remove(&key)?;
            let change = match row.flag {
                ChangeFlag::Delete => ResolvedChange::Delete { key },
                ChangeFlag::Insert | ChangeFlag::Update => ResolvedChange::Upsert {
                    key,
                    values: row.values.clone(),
                },
            };
            Some(change)
        })
        .collect()
}

/// Sort key of a row inside its partition, compared the way the merge window orders it.
fn ordering_key(row: &ChangeLogRow) -> (u64, &'static str) {
    (row.commit_ts, row.flag.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(key: &str, commit_ts: u64, flag: ChangeFlag, value: &str) -> ChangeLogRow {
        ChangeLogRow {
            flag,
            table: "orders".to_owned(),
            schema: "sales".to_owned(),
            commit_ts,
            values: vec![Some(key.to_owned()), Some(value.to_owned())],
        }
    }

    fn key(value: &str) -> Vec<Option<String>> {
        vec![Some(value.to_owned())]
    }

    #[test]
    fn keeps_the_latest_change_per_key() {
        let rows = vec![
            row("1", 5, ChangeFlag::Update, "a"),
            row("1", 7, ChangeFlag::Delete, "a"),
            row("2", 3, ChangeFlag::Insert, "b"),
        ];

        assert_eq!(
            resolve_batch(&rows, &[0]),
            vec![
                ResolvedChange::Delete { key: key("1") },
                ResolvedChange::Upsert {
                    key: key("2"),
                    values: vec![Some("2".to_owned()), Some("b".to_owned())],
                },
            ]
        );
    }

    #[test]
    fn ordering_key_wins_over_file_order() {
        let rows = vec![
            row("1", 9, ChangeFlag::Update, "new"),
            row("1", 4, ChangeFlag::Delete, "old"),
        ];

        assert_eq!(
            resolve_batch(&rows, &[0]),
            vec![ResolvedChange::Upsert {
                key: key("1"),
                values: vec![Some("1".to_owned()), Some("new".to_owned())],
            }]
        );
    }

    #[test]
    fn flag_breaks_ties_within_one_commit() {
        // A unique-key update split into a delete and an insert of the same key.
        let rows = vec![
            row("1", 4, ChangeFlag::Insert, "new"),
            row("1", 4, ChangeFlag::Delete, "old"),
        ];

        assert_eq!(
            resolve_batch(&rows, &[0]),
            vec![ResolvedChange::Upsert {
                key: key("1"),
                values: vec![Some("1".to_owned()), Some("new".to_owned())],
            }]
        );

        let rows = vec![
            row("2", 4, ChangeFlag::Update, "updated"),
            row("2", 4, ChangeFlag::Insert, "inserted"),
        ];

        assert!(matches!(
            &resolve_batch(&rows, &[0])[..],
            [ResolvedChange::Upsert { values, .. }] if values[1].as_deref() == Some("updated")
        ));
    }
}
