use crate::error::{AppError, AppResult};

/// How many leading rows may hold titles before the header row.
pub const HEADER_SCAN_ROWS: usize = 10;

#[derive(Debug)]
pub struct FieldSpec {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
}

/// Lowercases and collapses every run of non-alphanumerics to one space, so
/// `"Emp. ID#"` and `"emp id"` compare equal.
pub fn normalize_header(raw: &str) -> String {
    raw.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// True when the words of `alias` appear contiguously in `header`.
fn contains_words(header: &str, alias: &str) -> bool {
    let header: Vec<&str> = header.split(' ').collect();
    let alias: Vec<&str> = alias.split(' ').collect();
    !alias.is_empty()
        && header.len() >= alias.len()
        && header.windows(alias.len()).any(|w| w == alias.as_slice())
}

/// Field index in `specs` → column index in the sheet.
#[derive(Debug, Default, Clone)]
pub struct ColumnMap {
    columns: Vec<Option<usize>>,
}

impl ColumnMap {
    /// Exact alias matches are taken for every field before any partial
    /// match, so a generic alias like "name" cannot steal "employee name"
    /// from a field that lists it exactly.
    pub fn resolve(headers: &[String], specs: &[FieldSpec]) -> Self {
        let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();
        let mut taken = vec![false; normalized.len()];
        let mut columns = vec![None; specs.len()];

        for (field, spec) in specs.iter().enumerate() {
            'aliases: for alias in spec.aliases {
                for (col, header) in normalized.iter().enumerate() {
                    if !taken[col] && header == alias {
                        columns[field] = Some(col);
                        taken[col] = true;
                        break 'aliases;
                    }
                }
            }
        }

        for (field, spec) in specs.iter().enumerate() {
            if columns[field].is_some() {
                continue;
            }
            'partial: for alias in spec.aliases {
                for (col, header) in normalized.iter().enumerate() {
                    if !taken[col] && contains_words(header, alias) {
                        columns[field] = Some(col);
                        taken[col] = true;
                        break 'partial;
                    }
                }
            }
        }

        Self { columns }
    }

    pub fn column(&self, field: usize) -> Option<usize> {
        self.columns.get(field).copied().flatten()
    }

    pub fn matched(&self) -> usize {
        self.columns.iter().filter(|c| c.is_some()).count()
    }

    /// Cell text for `field` in `row`, empty when unmapped or short.
    pub fn value<'a>(&self, row: &'a [String], field: usize) -> &'a str {
        self.column(field)
            .and_then(|col| row.get(col))
            .map(|s| s.trim())
            .unwrap_or("")
    }
}

/// Picks the header row: the scanned row matching the most fields. It must
/// map the identifier field.
pub fn detect_header(
    rows: &[Vec<String>],
    specs: &[FieldSpec],
    identifier: usize,
) -> AppResult<(usize, ColumnMap)> {
    let mut best: Option<(usize, ColumnMap)> = None;

    for (index, row) in rows.iter().take(HEADER_SCAN_ROWS).enumerate() {
        let map = ColumnMap::resolve(row, specs);
        if map.column(identifier).is_none() {
            continue;
        }
        let better = match &best {
            Some((_, current)) => map.matched() > current.matched(),
            None => true,
        };
        if better {
            best = Some((index, map));
        }
    }

    best.ok_or_else(|| {
        AppError::BadRequest(format!(
            "Could not find a header row with a '{}' column in the first {} rows",
            specs[identifier].name, HEADER_SCAN_ROWS
        ))
    })
}
