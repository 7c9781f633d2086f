use tracing::{debug, info, warn};

use crate::models::{
    cell_at, subject_key, Cell, Grid, RawExamRecord, Sitting, SubjectScores, MAX_SCORE,
};

pub const ID_COLUMN: usize = 1;
pub const STUDENT_NUMBER_COLUMN: usize = 2;
pub const NAME_COLUMN: usize = 3;
pub const DEFAULT_BIRTH_DATE_COLUMN: usize = 4;
pub const SUBJECT_SCAN_START: usize = 4;

/// Rows between the header and the first student row.
const FIRST_ROW_OFFSET: usize = 2;

const HEADER_SENTINELS: [&str; 3] = ["id", "المعرف", "الرقم التعريفي"];

/// Subject columns used when the header row names none: F, H, J, L, N and P.
pub const DEFAULT_SUBJECTS: [(usize, &str); 6] = [
    (5, "التعبير الكتابي"),
    (7, "القراءة"),
    (9, "الإملاء"),
    (11, "الخط"),
    (13, "الاستماع والتحدث"),
    (15, "تمارين كتابية"),
];

/// Where things live in a particular sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetLayout {
    pub header_row: usize,
    pub subjects: Vec<(usize, String)>,
    pub birth_date_column: usize,
    pub default_subjects: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeaderLabel {
    BirthDate,
    Remarks,
    Average,
    Subject,
    Ignored,
}

fn normalize_label(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn is_header_sentinel(cell: &Cell) -> bool {
    match cell {
        Cell::Text(value) => {
            let label = normalize_label(value);
            HEADER_SENTINELS.iter().any(|sentinel| label == *sentinel)
        }
        _ => false,
    }
}

fn classify_header(cell: &Cell) -> HeaderLabel {
    let Cell::Text(raw) = cell else {
        return HeaderLabel::Ignored;
    };
    let label = normalize_label(raw);
    if label.chars().count() < 2 || label.contains('#') {
        return HeaderLabel::Ignored;
    }
    if label.replace(',', ".").parse::<f64>().is_ok() {
        return HeaderLabel::Ignored;
    }
    if label.contains("تاريخ") || label.contains("date") || label == "dob" {
        HeaderLabel::BirthDate
    } else if label.contains("ملاحظ") || label.contains("remark") || label.contains("note") {
        HeaderLabel::Remarks
    } else if label.contains("معدل")
        || label.contains("average")
        || label.contains("moyenne")
        || label == "total"
        || label == "المجموع"
    {
        HeaderLabel::Average
    } else {
        HeaderLabel::Subject
    }
}

pub fn find_header_row(grid: &Grid) -> Option<usize> {
    grid.iter().position(|row| {
        row.get(ID_COLUMN)
            .map(is_header_sentinel)
            .unwrap_or(false)
    })
}

pub fn locate_layout(grid: &Grid) -> Option<SheetLayout> {
    let header_row = find_header_row(grid)?;
    let header = &grid[header_row];

    let mut subjects = Vec::new();
    let mut birth_date_column = None;
    for (col, cell) in header.iter().enumerate().skip(SUBJECT_SCAN_START) {
        match classify_header(cell) {
            HeaderLabel::Subject => {
                if let Some(name) = cell.as_text() {
                    subjects.push((col, subject_key(&name)));
                }
            }
            HeaderLabel::BirthDate => {
                birth_date_column.get_or_insert(col);
            }
            HeaderLabel::Remarks | HeaderLabel::Average | HeaderLabel::Ignored => {}
        }
    }

    let default_subjects = subjects.is_empty();
    if default_subjects {
        subjects = DEFAULT_SUBJECTS
            .iter()
            .map(|(col, name)| (*col, name.to_string()))
            .collect();
    }

    Some(SheetLayout {
        header_row,
        subjects,
        birth_date_column: birth_date_column.unwrap_or(DEFAULT_BIRTH_DATE_COLUMN),
        default_subjects,
    })
}

fn score_from(cell: Option<&Cell>) -> Option<f64> {
    cell.and_then(Cell::as_number)
        .filter(|score| (0.0..=MAX_SCORE).contains(score))
}

pub fn extract_records(grid: &Grid, sitting: Sitting) -> Vec<RawExamRecord> {
    let Some(layout) = locate_layout(grid) else {
        warn!(%sitting, rows = grid.len(), "No header row found; sitting yields no records");
        return Vec::new();
    };
    if layout.default_subjects {
        debug!(%sitting, "No subject headers discovered; using default subject columns");
    }

    let birth_date_is_subject = layout
        .subjects
        .iter()
        .any(|(col, _)| *col == layout.birth_date_column);

    let mut records = Vec::new();
    let mut dropped_cells = 0usize;
    for row in (layout.header_row + FIRST_ROW_OFFSET)..grid.len() {
        let Some(external_id) = cell_at(grid, row, ID_COLUMN).and_then(Cell::as_text) else {
            continue;
        };
        let student_number = cell_at(grid, row, STUDENT_NUMBER_COLUMN).and_then(Cell::as_text);
        let name = cell_at(grid, row, NAME_COLUMN)
            .and_then(Cell::as_text)
            .unwrap_or_default();
        let date_of_birth = if birth_date_is_subject {
            None
        } else {
            cell_at(grid, row, layout.birth_date_column).and_then(Cell::as_text)
        };

        let mut scores = SubjectScores::new();
        for (col, subject) in &layout.subjects {
            let cell = cell_at(grid, row, *col);
            match score_from(cell) {
                Some(score) => {
                    scores.insert(subject.clone(), score);
                }
                None => {
                    if cell.map(|cell| !cell.is_blank()).unwrap_or(false) {
                        dropped_cells += 1;
                    }
                }
            }
        }

        records.push(RawExamRecord::new(
            external_id,
            student_number,
            name,
            date_of_birth,
            scores,
        ));
    }

    if dropped_cells > 0 {
        debug!(%sitting, dropped_cells, "Ignored non-numeric or out-of-range score cells");
    }
    info!(
        %sitting,
        records = records.len(),
        subjects = layout.subjects.len(),
        "Extracted sitting"
    );
    records
}
