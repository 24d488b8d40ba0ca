use std::fmt;
use std::str::FromStr;

use crate::bail;
use crate::changelog::META_COLUMNS;
use crate::error::{ErrorKind, EtlError, EtlResult};
use crate::etl_error;

/// Marker written by the capture service for SQL `NULL`.
const NULL_MARKER: &str = "\\N";

/// Operation recorded in a change-log row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeFlag {
    Insert,
    Update,
    Delete,
}

impl ChangeFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeFlag::Insert => "I",
            ChangeFlag::Update => "U",
            ChangeFlag::Delete => "D",
        }
    }
}

impl fmt::Display for ChangeFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeFlag {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "I" => Ok(ChangeFlag::Insert),
            "U" => Ok(ChangeFlag::Update),
            "D" => Ok(ChangeFlag::Delete),
            other => Err(etl_error!(
                ErrorKind::InvalidData,
                "Unknown change-log operation flag",
                other
            )),
        }
    }
}

/// One row of a change-log data file.
///
/// The metadata columns precede the table columns: flag, table name, schema name and commit
/// timestamp. The commit timestamp orders changes of the same key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeLogRow {
    pub flag: ChangeFlag,
    pub table: String,
    pub schema: String,
    pub commit_ts: u64,
    pub values: Vec<Option<String>>,
}

impl ChangeLogRow {
    /// Builds a row from split CSV fields, checking the number of table columns.
    pub fn from_fields(fields: Vec<Option<String>>, column_count: usize) -> EtlResult<Self> {
        if fields.len() != META_COLUMNS.len() + column_count {
            bail!(
                ErrorKind::InvalidData,
                "Change-log row has an unexpected number of fields",
                format!(
                    "expected {}, got {}",
                    META_COLUMNS.len() + column_count,
                    fields.len()
                )
            );
        }

        let mut fields = fields.into_iter();
        let mut meta = || {
            fields.next().flatten().ok_or_else(|| {
                etl_error!(
                    ErrorKind::InvalidData,
                    "Change-log row has an empty metadata field"
                )
            })
        };

        let flag: ChangeFlag = meta()?.parse()?;
        let table = meta()?;
        let schema = meta()?;
        let commit_ts: u64 = meta()?.parse()?;

        Ok(Self {
            flag,
            table,
            schema,
            commit_ts,
            values: fields.collect(),
        })
    }

    /// Encodes the row the way the capture service writes it.
    pub fn to_csv_line(&self) -> String {
        let mut fields = vec![
            quote(self.flag.as_str()),
            quote(&self.table),
            quote(&self.schema),
            self.commit_ts.to_string(),
        ];
        fields.extend(self.values.iter().map(|value| match value {
            Some(value) => quote(value),
            None => NULL_MARKER.to_owned(),
        }));

        fields.join(",")
    }
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

/// Splits one CSV line into fields.
///
/// Quoted fields may contain the delimiter and doubled quotes. An unquoted `\N` is `NULL`.
pub fn split_csv_line(line: &str) -> EtlResult<Vec<Option<String>>> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    current.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            }
            '"' if current.is_empty() && !quoted => {
                in_quotes = true;
                quoted = true;
            }
            ',' if !in_quotes => {
                fields.push(finish_field(&mut current, quoted));
                quoted = false;
            }
            ch => current.push(ch),
        }
    }

    if in_quotes {
        bail!(
            ErrorKind::InvalidData,
            "Change-log row has an unterminated quoted field",
            line
        );
    }
    fields.push(finish_field(&mut current, quoted));

    Ok(fields)
}

fn finish_field(current: &mut String, quoted: bool) -> Option<String> {
    let value = std::mem::take(current);
    if !quoted && value == NULL_MARKER {
        None
    } else {
        Some(value)
    }
}

/// Parses a whole change-log data file for a table with `column_count` columns.
pub fn parse_change_log(contents: &[u8], column_count: usize) -> EtlResult<Vec<ChangeLogRow>> {
    let contents = std::str::from_utf8(contents)?;

    contents
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.is_empty())
        .map(|line| ChangeLogRow::from_fields(split_csv_line(line)?, column_count))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_quoted_fields_and_nulls() {
        let fields = split_csv_line(r#""U","orders","sales",446144580390125569,"1","a, ""b""",\N"#)
            .unwrap();

        assert_eq!(
            fields,
            vec![
                Some("U".to_owned()),
                Some("orders".to_owned()),
                Some("sales".to_owned()),
                Some("446144580390125569".to_owned()),
                Some("1".to_owned()),
                Some(r#"a, "b""#.to_owned()),
                None,
            ]
        );
    }

    #[test]
    fn encodes_rows_the_way_they_are_parsed() {
        let row = ChangeLogRow {
            flag: ChangeFlag::Delete,
            table: "orders".to_owned(),
            schema: "sales".to_owned(),
            commit_ts: 7,
            values: vec![Some("1".to_owned()), Some("x,\"y\"".to_owned()), None],
        };

        let parsed = parse_change_log(format!("{}\n", row.to_csv_line()).as_bytes(), 3).unwrap();

        assert_eq!(parsed, vec![row]);
    }

    #[test]
    fn rejects_rows_with_the_wrong_width() {
        let err = parse_change_log(br#""I","orders","sales",1,"1""#, 2).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }

    #[test]
    fn rejects_unknown_flags() {
        let err = parse_change_log(br#""X","orders","sales",1,"1""#, 1).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }
}
