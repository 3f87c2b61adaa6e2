//! Parser for the text `sapcontrol` prints.
//!
//! ```text
//!
//! 05.03.2024 10:00:00
//! GetProcessList
//! OK
//! name, description, dispstatus, textstatus, starttime, elapsedtime, pid
//! disp+work, Dispatcher, GREEN, Running, 2024 03 05 09:00:00, 1:00:00, 1234
//! ```
//!
//! A failing call prints `FAIL: <message>` instead of `OK` and no table.

use crate::error::{ControlError, ControlResult};

/// Body of a successful call: every non-empty line after `OK`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    pub lines: Vec<String>,
}

impl Reply {
    pub fn table(&self) -> Table {
        Table::parse(&self.lines)
    }
}

/// Map a `FAIL:` message to an error.
pub fn classify_failure(function: &str, message: &str) -> ControlError {
    let message = message.trim().to_string();
    let function = function.to_string();
    if message.contains("Invalid Credentials") || message.contains("Permission denied") {
        ControlError::InvalidCredentials { function, message }
    } else if message.starts_with("NIE") || message.contains("NIECONN") {
        ControlError::Unreachable { function, message }
    } else {
        ControlError::Failed { function, message }
    }
}

/// Parse the full stdout of one `sapcontrol -function <function>` call.
pub fn parse_reply(function: &str, stdout: &str) -> ControlResult<Reply> {
    let lines: Vec<&str> = stdout.lines().map(|l| l.trim_end_matches('\r')).collect();

    let start = lines
        .iter()
        .position(|l| l.trim().eq_ignore_ascii_case(function))
        .map(|i| i + 1)
        .unwrap_or(0);

    let mut rest = lines[start..].iter().filter(|l| !l.trim().is_empty());
    while let Some(line) = rest.next() {
        let t = line.trim();
        if t == "OK" {
            let body = rest.by_ref().map(|l| l.to_string()).collect();
            return Ok(Reply { lines: body });
        }
        if let Some(msg) = t.strip_prefix("FAIL:") {
            return Err(classify_failure(function, msg));
        }
        if t == "FAIL" {
            return Err(classify_failure(function, ""));
        }
    }

    Err(ControlError::Parse {
        function: function.to_string(),
        message: "no OK or FAIL line in output".to_string(),
    })
}

/// Comma separated table following `OK`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// The first line is the header. Rows are split into at most as many
    /// columns as the header has, so the last column may contain `, `.
    pub fn parse(lines: &[String]) -> Self {
        let mut iter = lines.iter().filter(|l| !l.trim().is_empty());
        let Some(header_line) = iter.next() else {
            return Self::default();
        };
        let header: Vec<String> = split_fields(header_line, usize::MAX)
            .into_iter()
            .filter(|h| !h.is_empty())
            .collect();
        let width = header.len().max(1);
        let rows = iter
            .map(|l| {
                let mut row = split_fields(l, width);
                row.resize(width, String::new());
                row
            })
            .collect();
        Self { header, rows }
    }

    fn column(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|h| h.eq_ignore_ascii_case(name))
    }

    pub fn records(&self) -> impl Iterator<Item = Record<'_>> {
        self.rows.iter().map(move |row| Record { table: self, row })
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn split_fields(line: &str, max: usize) -> Vec<String> {
    let line = line.trim_end().trim_end_matches(',');
    line.splitn(max, ", ")
        .map(|f| f.trim().to_string())
        .collect()
}

/// One row, addressed by column name (case-insensitive).
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    table: &'a Table,
    row: &'a [String],
}

impl<'a> Record<'a> {
    pub fn get(&self, column: &str) -> Option<&'a str> {
        self.table
            .column(column)
            .and_then(|i| self.row.get(i))
            .map(String::as_str)
    }

    /// Column value or the empty string.
    pub fn text(&self, column: &str) -> String {
        self.get(column).unwrap_or_default().to_string()
    }

    pub fn parsed<T: std::str::FromStr>(&self, column: &str) -> Option<T> {
        self.get(column).and_then(|v| v.trim().parse().ok())
    }
}
