use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::models::{RawExamRecord, Sitting, SubjectScores, UnifiedStudent};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reconciliation {
    pub students: Vec<UnifiedStudent>,
    pub matched_by_number: usize,
    pub matched_by_id: usize,
    pub first_only: usize,
    pub second_only: usize,
    /// Records overwritten by a later record with the same key.
    pub collisions: usize,
}

fn record_key(record: &RawExamRecord) -> (String, String) {
    (
        record.student_number.clone().unwrap_or_default(),
        record.external_id.clone(),
    )
}

/// Collapses duplicate keys within one sitting, last record wins.
fn dedupe(records: &[RawExamRecord], sitting: Sitting) -> (Vec<&RawExamRecord>, usize) {
    let mut by_number: HashMap<&str, &RawExamRecord> = HashMap::new();
    let mut by_id: HashMap<&str, &RawExamRecord> = HashMap::new();
    let mut collisions = 0usize;

    for record in records {
        let previous = match record.student_number.as_deref() {
            Some(number) => by_number.insert(number, record),
            None => by_id.insert(record.external_id.as_str(), record),
        };
        if let Some(previous) = previous {
            collisions += 1;
            if previous.external_id != record.external_id || previous.name != record.name {
                warn!(
                    %sitting,
                    student_number = record.student_number.as_deref().unwrap_or(""),
                    kept_id = %record.external_id,
                    dropped_id = %previous.external_id,
                    "Duplicate student key across different identities; keeping the later record"
                );
            } else {
                debug!(%sitting, id = %record.external_id, "Duplicate row for the same student");
            }
        }
    }

    let mut pool: Vec<&RawExamRecord> = by_number.into_values().chain(by_id.into_values()).collect();
    pool.sort_by_key(|record| record_key(record));
    (pool, collisions)
}

fn first_non_empty(preferred: Option<&str>, fallback: Option<&str>) -> Option<String> {
    preferred
        .filter(|value| !value.trim().is_empty())
        .or(fallback.filter(|value| !value.trim().is_empty()))
        .map(str::to_string)
}

fn pick(
    exam1: Option<&RawExamRecord>,
    exam2: Option<&RawExamRecord>,
    field: fn(&RawExamRecord) -> Option<&str>,
) -> Option<String> {
    first_non_empty(exam2.and_then(field), exam1.and_then(field))
}

fn sitting_scores(record: Option<&RawExamRecord>) -> (SubjectScores, f64) {
    record
        .map(|record| (record.subject_scores.clone(), record.average))
        .unwrap_or_else(|| (SubjectScores::new(), 0.0))
}

/// Identity fields prefer the more recent sitting.
fn unify(exam1: Option<&RawExamRecord>, exam2: Option<&RawExamRecord>) -> UnifiedStudent {
    let (exam1_scores, exam1_average) = sitting_scores(exam1);
    let (exam2_scores, exam2_average) = sitting_scores(exam2);

    UnifiedStudent {
        id: pick(exam1, exam2, |r| Some(r.external_id.as_str())).unwrap_or_default(),
        student_number: pick(exam1, exam2, |r| r.student_number.as_deref()),
        name: pick(exam1, exam2, |r| Some(r.name.as_str())).unwrap_or_default(),
        date_of_birth: pick(exam1, exam2, |r| r.date_of_birth.as_deref()),
        exam1_scores,
        exam2_scores,
        exam1_average,
        exam2_average,
    }
}

/// Id matching is refused when both records carry different student numbers.
fn id_compatible(a: &RawExamRecord, b: &RawExamRecord) -> bool {
    match (a.student_number.as_deref(), b.student_number.as_deref()) {
        (Some(x), Some(y)) => x == y,
        _ => true,
    }
}

/// Matches on student number first, then on id among the records the first
/// pass left unused. Unmatched records become single-sitting students.
pub fn reconcile(exam1: &[RawExamRecord], exam2: &[RawExamRecord]) -> Reconciliation {
    let (pool1, collisions1) = dedupe(exam1, Sitting::First);
    let (pool2, collisions2) = dedupe(exam2, Sitting::Second);
    let mut used1 = vec![false; pool1.len()];
    let mut used2 = vec![false; pool2.len()];
    let mut students = Vec::new();

    let number_index: HashMap<&str, usize> = pool2
        .iter()
        .enumerate()
        .filter_map(|(idx, record)| record.student_number.as_deref().map(|number| (number, idx)))
        .collect();

    let mut matched_by_number = 0usize;
    for (idx1, record1) in pool1.iter().enumerate() {
        let Some(number) = record1.student_number.as_deref() else {
            continue;
        };
        if let Some(&idx2) = number_index.get(number) {
            used1[idx1] = true;
            used2[idx2] = true;
            students.push(unify(Some(*record1), Some(pool2[idx2])));
            matched_by_number += 1;
        }
    }

    let mut id_index: HashMap<&str, Vec<usize>> = HashMap::new();
    for (idx2, record2) in pool2.iter().enumerate() {
        if !used2[idx2] {
            id_index
                .entry(record2.external_id.as_str())
                .or_default()
                .push(idx2);
        }
    }
    // Prefer a candidate without a student number, then the smallest one.
    for candidates in id_index.values_mut() {
        candidates.sort_by_key(|&idx| {
            let number = pool2[idx].student_number.as_deref();
            (number.is_some(), number.unwrap_or("").to_string())
        });
    }

    let mut matched_by_id = 0usize;
    for (idx1, record1) in pool1.iter().enumerate() {
        if used1[idx1] {
            continue;
        }
        let Some(candidates) = id_index.get(record1.external_id.as_str()) else {
            continue;
        };
        let found = candidates
            .iter()
            .copied()
            .find(|&idx2| !used2[idx2] && id_compatible(record1, pool2[idx2]));
        if let Some(idx2) = found {
            used1[idx1] = true;
            used2[idx2] = true;
            students.push(unify(Some(*record1), Some(pool2[idx2])));
            matched_by_id += 1;
        }
    }

    let mut first_only = 0usize;
    for (record1, _) in pool1.iter().zip(&used1).filter(|(_, used)| !**used) {
        students.push(unify(Some(*record1), None));
        first_only += 1;
    }
    let mut second_only = 0usize;
    for (record2, _) in pool2.iter().zip(&used2).filter(|(_, used)| !**used) {
        students.push(unify(None, Some(*record2)));
        second_only += 1;
    }

    students.sort_by_key(UnifiedStudent::identity_key);

    info!(
        students = students.len(),
        matched_by_number,
        matched_by_id,
        first_only,
        second_only,
        "Reconciled sittings"
    );

    Reconciliation {
        students,
        matched_by_number,
        matched_by_id,
        first_only,
        second_only,
        collisions: collisions1 + collisions2,
    }
}
