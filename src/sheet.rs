// 📄 Sheet reading - raw grids from .xlsx / .csv
//
// Exports from the registration system and the reference workbook both
// carry a banner row above the real header, so the header is located by
// its column names instead of by position.

use crate::error::{ReconcileError, Result};
use crate::reference::{ReferenceRow, CODE_COLUMN, NAME_COLUMN};
use calamine::{open_workbook_auto, Data, Reader};
use csv::ReaderBuilder;
use std::path::Path;

/// How far down the header row is searched for
pub const HEADER_SCAN_ROWS: usize = 5;

/// A sheet as plain text cells
pub type Grid = Vec<Vec<String>>;

/// Drop a leading UTF-8 byte-order mark
pub fn strip_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes)
}

/// Parse CSV bytes into a grid. Rows may have differing lengths.
pub fn csv_grid(bytes: &[u8]) -> Result<Grid> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(strip_bom(bytes));

    let mut grid = Vec::new();
    for result in reader.records() {
        let record = result?;
        grid.push(record.iter().map(|s| s.to_string()).collect());
    }

    Ok(grid)
}

/// First worksheet of an Excel workbook as a grid
pub fn xlsx_grid(path: &Path) -> Result<Grid> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| ReconcileError::Workbook(format!("{}: {}", path.display(), e)))?;

    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| ReconcileError::Workbook(format!("{}: workbook has no sheets", path.display())))?;

    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| ReconcileError::Workbook(format!("{} [{}]: {}", path.display(), sheet_name, e)))?;

    Ok(range
        .rows()
        .map(|row| row.iter().map(cell_text).collect())
        .collect())
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        // Codes typed as numbers come back as floats
        Data::Float(f) if f.fract() == 0.0 => format!("{}", *f as i64),
        Data::Int(i) => i.to_string(),
        other => other.to_string(),
    }
}

/// Locate the header row and map each required column to its index.
///
/// Returns the header row index and the column indices in `columns` order.
pub fn locate_columns(grid: &Grid, columns: &[&str], source_name: &str) -> Result<(usize, Vec<usize>)> {
    let mut best: Option<(usize, Vec<Option<usize>>)> = None;

    for (row_idx, row) in grid.iter().take(HEADER_SCAN_ROWS).enumerate() {
        let found: Vec<Option<usize>> = columns
            .iter()
            .map(|col| row.iter().position(|cell| cell.trim() == *col))
            .collect();

        if found.iter().all(Option::is_some) {
            return Ok((row_idx, found.into_iter().flatten().collect()));
        }

        let hits = found.iter().filter(|f| f.is_some()).count();
        let best_hits = best
            .as_ref()
            .map(|(_, f)| f.iter().filter(|x| x.is_some()).count())
            .unwrap_or(0);
        if hits > best_hits {
            best = Some((row_idx, found));
        }
    }

    // A partial header means a named column is missing
    match best {
        Some((_, found)) => {
            let missing = columns
                .iter()
                .zip(found.iter())
                .find(|(_, f)| f.is_none())
                .map(|(col, _)| *col)
                .unwrap_or_default();
            Err(ReconcileError::missing_column(source_name, missing))
        }
        None => Err(ReconcileError::MissingHeader {
            source_name: source_name.to_string(),
        }),
    }
}

/// Cell at `col`, `None` when absent or blank
pub fn cell(row: &[String], col: usize) -> Option<&str> {
    row.get(col).map(String::as_str).filter(|s| !s.trim().is_empty())
}

/// Turn a reference grid into raw code/name rows
pub fn reference_rows(grid: &Grid, source_name: &str) -> Result<Vec<ReferenceRow>> {
    let (header_row, cols) = locate_columns(grid, &[CODE_COLUMN, NAME_COLUMN], source_name)?;
    let (code_col, name_col) = (cols[0], cols[1]);

    Ok(grid
        .iter()
        .skip(header_row + 1)
        .map(|row| ReferenceRow {
            code: cell(row, code_col).map(str::to_string),
            name: cell(row, name_col).map(str::to_string),
        })
        .collect())
}

/// Read the reference sheet, `.csv` by extension, anything else as a workbook
pub fn read_reference_rows(path: &Path) -> Result<Vec<ReferenceRow>> {
    let source_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("reference")
        .to_string();

    let is_csv = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("csv"))
        .unwrap_or(false);

    let grid = if is_csv {
        csv_grid(&std::fs::read(path)?)?
    } else {
        xlsx_grid(path)?
    };

    reference_rows(&grid, &source_name)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn grid(rows: &[&[&str]]) -> Grid {
        rows.iter()
            .map(|r| r.iter().map(|s| s.to_string()).collect())
            .collect()
    }

    #[test]
    fn test_strip_bom() {
        assert_eq!(strip_bom(b"\xEF\xBB\xBFabc"), b"abc");
        assert_eq!(strip_bom(b"abc"), b"abc");
    }

    #[test]
    fn test_csv_grid_flexible_rows() {
        let data = "\u{feff}通訊處一覽表\n代碼,單位名稱,備註\nTP838,富宅通訊處,\n".as_bytes();
        let grid = csv_grid(data).unwrap();

        assert_eq!(grid.len(), 3);
        assert_eq!(grid[0], vec!["通訊處一覽表"]);
        assert_eq!(grid[1][0], "代碼");
    }

    #[test]
    fn test_locate_columns_after_banner() {
        let g = grid(&[&["banner"], &["序", "單位", "姓名"], &["1", "x", "y"]]);
        let (row, cols) = locate_columns(&g, &["姓名", "單位"], "t.csv").unwrap();

        assert_eq!(row, 1);
        assert_eq!(cols, vec![2, 1]);
    }

    #[test]
    fn test_locate_columns_reports_missing_field() {
        let g = grid(&[&["banner"], &["序", "單位"]]);
        let err = locate_columns(&g, &["序", "單位", "姓名"], "t.csv").unwrap_err();

        match err {
            ReconcileError::MissingColumn { column, source_name } => {
                assert_eq!(column, "姓名");
                assert_eq!(source_name, "t.csv");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_locate_columns_no_header() {
        let g = grid(&[&["a", "b"], &["c", "d"]]);
        let err = locate_columns(&g, &["序"], "t.csv").unwrap_err();

        assert!(matches!(err, ReconcileError::MissingHeader { .. }));
    }

    #[test]
    fn test_reference_rows_blank_cells_are_none() {
        let g = grid(&[
            &["FB11407F 通訊處"],
            &["代碼", "單位名稱"],
            &["TP838", "富宅通訊處"],
            &["", "資深處"],
            &["AB123"],
        ]);
        let rows = reference_rows(&g, "ref.csv").unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], ReferenceRow::new("TP838", "富宅通訊處"));
        assert_eq!(rows[1].code, None);
        assert_eq!(rows[2].name, None);
    }

    #[test]
    fn test_read_reference_rows_from_csv_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ref.csv");
        std::fs::write(&path, "banner\n代碼,單位名稱\nTP838,富宅\n").unwrap();

        let rows = read_reference_rows(&path).unwrap();
        assert_eq!(rows, vec![ReferenceRow::new("TP838", "富宅")]);
    }

    #[test]
    fn test_read_reference_rows_missing_file() {
        let dir = TempDir::new().unwrap();
        let result = read_reference_rows(&dir.path().join("absent.xlsx"));

        assert!(matches!(result, Err(ReconcileError::Workbook(_))));
    }
}
