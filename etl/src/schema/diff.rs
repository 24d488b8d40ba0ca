use std::fmt;
use tidb::types::{ChangeType, TableColumn, TableDefinition, TableName};

use crate::bail;
use crate::error::{ErrorKind, EtlResult};

/// Operation on a single column between two captured schema versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnAction {
    Add,
    Drop,
    Modify,
    Rename,
    Unchanged,
}

impl fmt::Display for ColumnAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnAction::Add => "add",
            ColumnAction::Drop => "drop",
            ColumnAction::Modify => "modify",
            ColumnAction::Rename => "rename",
            ColumnAction::Unchanged => "unchanged",
        };
        f.write_str(name)
    }
}

/// One entry of a column diff.
///
/// `before` is absent for [`ColumnAction::Add`] and `after` is absent for [`ColumnAction::Drop`].
/// For [`ColumnAction::Modify`] both sides carry the current column name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDiffItem {
    pub action: ColumnAction,
    pub before: Option<TableColumn>,
    pub after: Option<TableColumn>,
}

impl ColumnDiffItem {
    fn new(action: ColumnAction, before: Option<&TableColumn>, after: Option<&TableColumn>) -> Self {
        Self {
            action,
            before: before.cloned(),
            after: after.cloned(),
        }
    }
}

/// Result of comparing two captured schema versions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffResult {
    Truncate { table: TableName },
    DropTable { table: TableName },
    DropSchema { schema: String },
    Columns {
        table: TableName,
        items: Vec<ColumnDiffItem>,
    },
}

impl DiffResult {
    /// Returns `true` when the change removes the table from the destination.
    pub fn drops_table(&self) -> bool {
        matches!(
            self,
            DiffResult::DropTable { .. } | DiffResult::DropSchema { .. }
        )
    }
}

/// Compares the columns of the previously applied version with the current definition.
///
/// Truncate, drop-table and drop-schema changes bypass column matching. Columns are matched by
/// their stable id when both sides carry one and by name otherwise, so a rename is only reported
/// when the capture service supplied ids.
pub fn diff_columns(prev: &[TableColumn], cur: &TableDefinition) -> EtlResult<DiffResult> {
    let table = cur.table_name();

    match cur.change_type() {
        ChangeType::Truncate => return Ok(DiffResult::Truncate { table }),
        ChangeType::DropTable => return Ok(DiffResult::DropTable { table }),
        ChangeType::DropSchema => {
            return Ok(DiffResult::DropSchema {
                schema: table.schema,
            });
        }
        ChangeType::CreateTable => bail!(
            ErrorKind::UnsupportedDdl,
            "Received create table ddl, which should not happen",
            cur.query
        ),
        ChangeType::CreateSchema => bail!(
            ErrorKind::UnsupportedDdl,
            "Received create schema ddl, which should not happen",
            cur.query
        ),
        ChangeType::RenameTable => bail!(
            ErrorKind::UnsupportedDdl,
            "Received rename table ddl, new change data can not be captured any more",
            "to rename the table, start a new replication task for the new table"
        ),
        ChangeType::None => {}
    }

    let mut matched = vec![false; prev.len()];
    let mut pairs = Vec::with_capacity(cur.columns.len());
    for column in &cur.columns {
        let position = prev
            .iter()
            .enumerate()
            .position(|(index, candidate)| !matched[index] && same_column(candidate, column));
        if let Some(index) = position {
            matched[index] = true;
        }
        pairs.push((position.map(|index| &prev[index]), column));
    }

    let mut items: Vec<ColumnDiffItem> = prev
        .iter()
        .zip(&matched)
        .filter(|(_, matched)| !**matched)
        .map(|(column, _)| ColumnDiffItem::new(ColumnAction::Drop, Some(column), None))
        .collect();

    if let Some(dropped) = items
        .iter()
        .filter_map(|item| item.before.as_ref())
        .find(|column| column.is_primary_key)
    {
        bail!(
            ErrorKind::UnsupportedSchemaChange,
            "Primary key changes are not supported",
            format!("primary key column `{}` was dropped", dropped.name)
        );
    }

    for (before, after) in pairs {
        let Some(before) = before else {
            if after.is_primary_key {
                bail!(
                    ErrorKind::UnsupportedSchemaChange,
                    "Primary key changes are not supported",
                    format!("primary key column `{}` was added", after.name)
                );
            }

            items.push(ColumnDiffItem::new(ColumnAction::Add, None, Some(after)));
            continue;
        };

        if before.is_primary_key != after.is_primary_key {
            bail!(
                ErrorKind::UnsupportedSchemaChange,
                "Primary key changes are not supported",
                format!("primary key membership of column `{}` changed", after.name)
            );
        }

        let renamed = before.name != after.name;
        if renamed {
            items.push(ColumnDiffItem::new(
                ColumnAction::Rename,
                Some(before),
                Some(after),
            ));
        }

        if !before.same_shape(after) {
            let mut before = before.clone();
            before.name = after.name.clone();
            items.push(ColumnDiffItem::new(
                ColumnAction::Modify,
                Some(&before),
                Some(after),
            ));
        } else if !renamed {
            items.push(ColumnDiffItem::new(
                ColumnAction::Unchanged,
                Some(before),
                Some(after),
            ));
        }
    }

    Ok(DiffResult::Columns { table, items })
}

fn same_column(prev: &TableColumn, cur: &TableColumn) -> bool {
    match (&prev.id, &cur.id) {
        (Some(prev_id), Some(cur_id)) => prev_id == cur_id,
        _ => prev.name == cur.name,
    }
}
