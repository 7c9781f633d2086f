use rand::Rng;
use serde::Serialize;
use tracing::info;

use crate::aggregate::{
    aggregate_students, cohort_statistics, AggregatedStudent, CohortStatistics, StudentMetrics,
};
use crate::analytics::{cohort_analytics, CohortAnalytics};
use crate::config::ScoringConfig;
use crate::extract::extract_records;
use crate::feedback::{self, FeedbackBundle};
use crate::models::{Grid, RawExamRecord, Sitting, UnifiedStudent};
use crate::reconcile::reconcile;
use crate::risk::{predict, PredictionResult};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentAnalysis {
    /// 1-based position by overall average.
    pub rank: usize,
    pub student: UnifiedStudent,
    pub metrics: StudentMetrics,
    pub prediction: PredictionResult,
    pub feedback: FeedbackBundle,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationSummary {
    pub exam1_records: usize,
    pub exam2_records: usize,
    pub matched_by_number: usize,
    pub matched_by_id: usize,
    pub first_only: usize,
    pub second_only: usize,
    pub collisions: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    pub students: Vec<StudentAnalysis>,
    pub statistics: CohortStatistics,
    pub analytics: CohortAnalytics,
    pub reconciliation: ReconciliationSummary,
}

impl AnalysisResult {
    /// True when neither sitting produced a usable record.
    pub fn is_empty(&self) -> bool {
        self.students.is_empty()
    }
}

/// Highest overall average first; equal averages go by id, then student number.
fn rank_order(students: &mut [AggregatedStudent]) {
    students.sort_by(|a, b| {
        b.metrics
            .overall_average
            .total_cmp(&a.metrics.overall_average)
            .then_with(|| a.student.id.cmp(&b.student.id))
            .then_with(|| a.student.student_number.cmp(&b.student.student_number))
    });
}

pub fn analyze_grids<R: Rng + ?Sized>(
    exam1: &Grid,
    exam2: &Grid,
    config: &ScoringConfig,
    rng: &mut R,
) -> AnalysisResult {
    let records1 = extract_records(exam1, Sitting::First);
    let records2 = extract_records(exam2, Sitting::Second);
    analyze_records(&records1, &records2, config, rng)
}

pub fn analyze_records<R: Rng + ?Sized>(
    exam1: &[RawExamRecord],
    exam2: &[RawExamRecord],
    config: &ScoringConfig,
    rng: &mut R,
) -> AnalysisResult {
    let reconciliation = reconcile(exam1, exam2);
    let summary = ReconciliationSummary {
        exam1_records: exam1.len(),
        exam2_records: exam2.len(),
        matched_by_number: reconciliation.matched_by_number,
        matched_by_id: reconciliation.matched_by_id,
        first_only: reconciliation.first_only,
        second_only: reconciliation.second_only,
        collisions: reconciliation.collisions,
    };

    let mut aggregated = aggregate_students(reconciliation.students, &config.aggregate);
    let statistics = cohort_statistics(&aggregated, &config.aggregate);
    rank_order(&mut aggregated);

    // Random draws happen in rank order so a seed reproduces a run exactly.
    let mut students = Vec::with_capacity(aggregated.len());
    for (idx, entry) in aggregated.into_iter().enumerate() {
        let prediction = predict(&entry, &statistics, config, &mut *rng);
        let bundle = feedback::generate(&entry, &prediction, config, &mut *rng);
        students.push(StudentAnalysis {
            rank: idx + 1,
            student: entry.student,
            metrics: entry.metrics,
            prediction,
            feedback: bundle,
        });
    }

    let analytics = cohort_analytics(&students, config);

    info!(
        exam1_records = summary.exam1_records,
        exam2_records = summary.exam2_records,
        students = students.len(),
        high_risk = analytics.high_risk.len(),
        "Analysis complete"
    );

    AnalysisResult {
        students,
        statistics,
        analytics,
        reconciliation: summary,
    }
}
