//! Whitespace-delimited text tables and `.npy` arrays.
//!
//! Tables follow the NumPy `savetxt`/`loadtxt` conventions the downstream
//! notebooks expect: a `# `-prefixed header naming the columns, one row per
//! bin, numbers in `%.18e`.

use crate::domain::{PipelineError, PipelineResult};
use ndarray::Array2;
use std::fs;
use std::path::Path;

/// Writes `content`, creating parent directories.
pub fn write_text_artifact(path: &Path, content: &str) -> PipelineResult<()> {
    ensure_parent_dir(path)?;
    fs::write(path, content).map_err(|source| {
        PipelineError::io_system(
            "IO.TEXT_WRITE",
            format!("failed to write '{}': {}", path.display(), source),
        )
    })
}

pub fn ensure_parent_dir(path: &Path) -> PipelineResult<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|source| {
                PipelineError::io_system(
                    "IO.OUTPUT_DIRECTORY",
                    format!(
                        "failed to create output directory '{}': {}",
                        parent.display(),
                        source
                    ),
                )
            })
        }
        _ => Ok(()),
    }
}

/// Formats like C's `%.18e`: 18 fractional digits and a signed, at least
/// two-digit exponent (`1.500000000000000000e+00`).
pub fn format_scientific(value: f64) -> String {
    if !value.is_finite() {
        return if value.is_nan() {
            "nan".to_string()
        } else if value > 0.0 {
            "inf".to_string()
        } else {
            "-inf".to_string()
        };
    }
    let raw = format!("{value:.18e}");
    let Some((mantissa, exponent)) = raw.split_once('e') else {
        return raw;
    };
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let sign = if exponent < 0 { '-' } else { '+' };
    format!("{mantissa}e{sign}{:02}", exponent.abs())
}

/// Writes equal-length columns as a table with a `# ` header line.
pub fn write_table(path: &Path, header: &[&str], columns: &[&[f64]]) -> PipelineResult<()> {
    if header.len() != columns.len() {
        return Err(PipelineError::internal(
            "SYS.TABLE_SHAPE",
            format!(
                "table '{}' has {} header names for {} columns",
                path.display(),
                header.len(),
                columns.len()
            ),
        ));
    }
    let row_count = columns.first().map_or(0, |column| column.len());
    if let Some((index, column)) = columns
        .iter()
        .enumerate()
        .find(|(_, column)| column.len() != row_count)
    {
        return Err(PipelineError::computation(
            "RUN.TABLE_SHAPE",
            format!(
                "column '{}' of '{}' has {} rows, expected {}",
                header[index],
                path.display(),
                column.len(),
                row_count
            ),
        ));
    }

    let mut content = format!("# {}\n", header.join(" "));
    for row in 0..row_count {
        let line = columns
            .iter()
            .map(|column| format_scientific(column[row]))
            .collect::<Vec<_>>()
            .join(" ");
        content.push_str(&line);
        content.push('\n');
    }
    write_text_artifact(path, &content)
}

/// Numeric rows of a text table; `#` comment lines and blank lines are
/// skipped wherever they appear.
pub fn read_numeric_rows(path: &Path) -> PipelineResult<Vec<Vec<f64>>> {
    let content = fs::read_to_string(path).map_err(|source| {
        PipelineError::io_system(
            "IO.TABLE_READ",
            format!("failed to read '{}': {}", path.display(), source),
        )
    })?;
    parse_numeric_rows(&content, path)
}

fn parse_numeric_rows(content: &str, path: &Path) -> PipelineResult<Vec<Vec<f64>>> {
    let mut rows = Vec::new();
    for (line_index, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let row = trimmed
            .split_whitespace()
            .map(|token| {
                token.parse::<f64>().map_err(|_| {
                    PipelineError::configuration(
                        "INPUT.TABLE_PARSE",
                        format!(
                            "invalid number '{}' at line {} of '{}'",
                            token,
                            line_index + 1,
                            path.display()
                        ),
                    )
                })
            })
            .collect::<PipelineResult<Vec<_>>>()?;
        rows.push(row);
    }
    Ok(rows)
}

/// Selected columns of a numeric table, in the order requested.
pub fn read_columns(path: &Path, columns: &[usize]) -> PipelineResult<Vec<Vec<f64>>> {
    let rows = read_numeric_rows(path)?;
    let mut selected = vec![Vec::with_capacity(rows.len()); columns.len()];
    for (row_index, row) in rows.iter().enumerate() {
        for (slot, column) in columns.iter().enumerate() {
            let value = row.get(*column).ok_or_else(|| {
                PipelineError::configuration(
                    "INPUT.TABLE_COLUMN",
                    format!(
                        "data row {} of '{}' has {} columns, column {} requested",
                        row_index + 1,
                        path.display(),
                        row.len(),
                        column
                    ),
                )
            })?;
            selected[slot].push(*value);
        }
    }
    Ok(selected)
}

/// A table whose columns are addressed by the names in its header line.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedTable {
    names: Vec<String>,
    rows: Vec<Vec<f64>>,
    source: String,
}

impl NamedTable {
    /// The last `#` line before the first data row names the columns.
    pub fn read(path: &Path) -> PipelineResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| {
            PipelineError::io_system(
                "IO.TABLE_READ",
                format!("failed to read '{}': {}", path.display(), source),
            )
        })?;
        let names = content
            .lines()
            .map(str::trim)
            .take_while(|line| line.is_empty() || line.starts_with('#'))
            .filter(|line| line.starts_with('#'))
            .last()
            .map(|line| {
                line.trim_start_matches('#')
                    .split_whitespace()
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        if names.is_empty() {
            return Err(PipelineError::configuration(
                "INPUT.TABLE_HEADER",
                format!("table '{}' has no column header line", path.display()),
            ));
        }
        let rows = parse_numeric_rows(&content, path)?;
        Ok(Self {
            names,
            rows,
            source: path.display().to_string(),
        })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn optional_column(&self, name: &str) -> PipelineResult<Option<Vec<f64>>> {
        let Some(index) = self.names.iter().position(|candidate| candidate == name) else {
            return Ok(None);
        };
        self.rows
            .iter()
            .enumerate()
            .map(|(row_index, row)| {
                row.get(index).copied().ok_or_else(|| {
                    PipelineError::configuration(
                        "INPUT.TABLE_COLUMN",
                        format!(
                            "data row {} of '{}' is missing column '{}'",
                            row_index + 1,
                            self.source,
                            name
                        ),
                    )
                })
            })
            .collect::<PipelineResult<Vec<_>>>()
            .map(Some)
    }

    pub fn column(&self, name: &str) -> PipelineResult<Vec<f64>> {
        self.optional_column(name)?.ok_or_else(|| {
            PipelineError::configuration(
                "INPUT.TABLE_COLUMN",
                format!("table '{}' has no column '{}'", self.source, name),
            )
        })
    }
}

/// Row-major array from the rows read out of `path`. Every row must have the
/// width of the first one.
pub fn rows_to_array(path: &Path, rows: &[Vec<f64>]) -> PipelineResult<Array2<f64>> {
    let ncols = rows.first().map_or(0, Vec::len);
    if let Some((index, row)) = rows.iter().enumerate().find(|(_, row)| row.len() != ncols) {
        return Err(PipelineError::computation(
            "RUN.ARRAY_SHAPE",
            format!(
                "data row {} of '{}' has {} values, expected {}",
                index + 1,
                path.display(),
                row.len(),
                ncols
            ),
        ));
    }
    Ok(Array2::from_shape_fn((rows.len(), ncols), |(row, col)| {
        rows[row][col]
    }))
}

pub fn write_npy_array(path: &Path, array: &Array2<f64>) -> PipelineResult<()> {
    ensure_parent_dir(path)?;
    ndarray_npy::write_npy(path, array).map_err(|source| {
        PipelineError::io_system(
            "IO.NPY_WRITE",
            format!("failed to write array '{}': {}", path.display(), source),
        )
    })
}
