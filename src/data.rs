//! Tabular model shared by every pipeline stage.
//!
//! A decoded file becomes a [`Frame`]: normalized headers plus rows of
//! [`Cell`]s. A cell is `None` when the source field was empty or held one of
//! the conventional missing-value tokens, so the write layer only ever sees a
//! single null representation.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One field of a decoded row. `None` is the only null marker in the crate.
pub type Cell = Option<String>;

/// A decoded, header-mapped row prior to sanitization.
pub type RawRecord = Vec<Cell>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub headers: Vec<String>,
    pub rows: Vec<RawRecord>,
}

impl Frame {
    pub fn new(headers: Vec<String>, rows: Vec<RawRecord>) -> Self {
        Self { headers, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Builds a frame from raw header strings and text fields, applying header
    /// normalization and missing-value detection.
    pub fn from_text<H, R>(headers: H, rows: R) -> Self
    where
        H: IntoIterator,
        H::Item: AsRef<str>,
        R: IntoIterator<Item = Vec<String>>,
    {
        let headers = headers
            .into_iter()
            .map(|h| normalize_column_name(h.as_ref()))
            .collect();
        let rows = rows
            .into_iter()
            .map(|row| row.into_iter().map(cell_from_field).collect())
            .collect();
        Self { headers, rows }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} row(s) x {} column(s)",
            self.rows.len(),
            self.headers.len()
        )
    }
}

/// Canonical header form: surrounding whitespace trimmed, spaces and hyphens
/// replaced with underscores, lowercased. Already canonical names pass through.
pub fn normalize_column_name(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| match c {
            ' ' | '-' => '_',
            other => other,
        })
        .collect::<String>()
        .to_lowercase()
}

pub fn cell_from_field(field: String) -> Cell {
    if is_missing_token(&field) {
        None
    } else {
        Some(field)
    }
}

/// True for empty fields and the usual spreadsheet/dataframe null spellings.
pub fn is_missing_token(value: &str) -> bool {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return true;
    }
    let lowered = trimmed.to_ascii_lowercase();
    matches!(
        lowered.as_str(),
        "nan" | "-nan" | "null" | "none" | "na" | "n/a" | "#n/a" | "<na>"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_column_name_produces_snake_case() {
        assert_eq!(normalize_column_name("On_Date"), "on_date");
        assert_eq!(normalize_column_name(" Account RK"), "account_rk");
        assert_eq!(normalize_column_name("Code-ISO-Char "), "code_iso_char");
        assert_eq!(normalize_column_name("balance_out"), "balance_out");
    }

    #[test]
    fn missing_tokens_become_none() {
        assert_eq!(cell_from_field(String::new()), None);
        assert_eq!(cell_from_field("NaN".into()), None);
        assert_eq!(cell_from_field(" none ".into()), None);
        assert_eq!(cell_from_field("#N/A".into()), None);
        assert_eq!(cell_from_field("0".into()), Some("0".into()));
        assert_eq!(cell_from_field("nano".into()), Some("nano".into()));
    }

    #[test]
    fn from_text_normalizes_headers() {
        let frame = Frame::from_text(
            ["On_Date", " Account RK"],
            vec![vec!["01.03.2021".to_string(), "".to_string()]],
        );
        assert_eq!(frame.headers, vec!["on_date", "account_rk"]);
        assert_eq!(frame.rows[0], vec![Some("01.03.2021".to_string()), None]);
        assert_eq!(frame.column_index("account_rk"), Some(1));
    }
}
