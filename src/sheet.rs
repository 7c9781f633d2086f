use std::io::Read;
use std::path::Path;

use chrono::NaiveDate;

use crate::error::SheetError;
use crate::models::{Cell, Grid};

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%d-%m-%Y", "%d/%m/%Y", "%Y/%m/%d"];

pub fn read_grid(path: &Path) -> Result<Grid, SheetError> {
    let reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|source| SheetError::Open {
            path: path.to_path_buf(),
            source,
        })?;
    collect_rows(reader, path)
}

pub fn read_grid_from<R: Read>(input: R) -> Result<Grid, SheetError> {
    let reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(input);
    collect_rows(reader, Path::new("<reader>"))
}

fn collect_rows<R: Read>(mut reader: csv::Reader<R>, path: &Path) -> Result<Grid, SheetError> {
    let mut grid = Grid::new();
    for (row, record) in reader.records().enumerate() {
        let record = record.map_err(|source| SheetError::Row {
            path: path.to_path_buf(),
            row,
            source,
        })?;
        grid.push(record.iter().map(parse_cell).collect());
    }
    Ok(grid)
}

/// Digits with a significant leading zero, such as `007`. These are codes,
/// not quantities, and must keep their spelling.
fn has_leading_zero(value: &str) -> bool {
    let digits = value.trim_start_matches(['+', '-']).as_bytes();
    digits.len() > 1 && digits[0] == b'0' && digits[1].is_ascii_digit()
}

pub fn parse_cell(raw: &str) -> Cell {
    let value = raw.trim().trim_start_matches('\u{feff}');
    if value.is_empty() {
        return Cell::Empty;
    }
    if let Ok(number) = value.parse::<f64>() {
        if has_leading_zero(value) {
            return Cell::text(value);
        }
        if number.is_finite() {
            return Cell::Number(number);
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return Cell::Date(date);
        }
    }
    Cell::Text(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn cells_are_typed() {
        assert_eq!(parse_cell(""), Cell::Empty);
        assert_eq!(parse_cell(" 7.5 "), Cell::Number(7.5));
        assert_eq!(
            parse_cell("12-12-2013"),
            Cell::Date(NaiveDate::from_ymd_opt(2013, 12, 12).unwrap())
        );
        assert_eq!(parse_cell("القراءة"), Cell::text("القراءة"));
        assert_eq!(parse_cell("NaN"), Cell::text("NaN"));
    }

    #[test]
    fn leading_zero_codes_stay_text() {
        assert_eq!(parse_cell("007"), Cell::text("007"));
        assert_eq!(parse_cell("0012"), Cell::text("0012"));
        assert_eq!(parse_cell("0012").as_text().as_deref(), Some("0012"));
        assert_eq!(parse_cell("05").as_number(), Some(5.0));
        assert_eq!(parse_cell("0"), Cell::Number(0.0));
        assert_eq!(parse_cell("0.5"), Cell::Number(0.5));
        assert_eq!(
            parse_cell("01-02-2013"),
            Cell::Date(NaiveDate::from_ymd_opt(2013, 2, 1).unwrap())
        );
    }

    #[test]
    fn ragged_rows_are_kept() {
        let grid = read_grid_from("a,b,c\n1\n,,,4\n".as_bytes()).unwrap();
        assert_eq!(grid.len(), 3);
        assert_eq!(grid[1], vec![Cell::Number(1.0)]);
        assert_eq!(grid[2][3], Cell::Number(4.0));
    }

    #[test]
    fn reads_grid_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, ",ID,Student number,Name").unwrap();
        writeln!(file, ",14801803,R193014063,Avery Lee").unwrap();
        let grid = read_grid(file.path()).unwrap();
        assert_eq!(grid[0][1], Cell::text("ID"));
        assert_eq!(grid[1][1], Cell::Number(14801803.0));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = read_grid(Path::new("/nonexistent/exam1.csv")).unwrap_err();
        assert!(err.to_string().contains("exam1.csv"));
    }
}
