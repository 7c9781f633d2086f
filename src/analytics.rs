use std::cmp::Ordering;

use indexmap::IndexMap;
use serde::Serialize;

use crate::aggregate::StudentHighlight;
use crate::config::ScoringConfig;
use crate::models::{mean, subject_key, RiskTier, SubjectScores, Trend};
use crate::pipeline::StudentAnalysis;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentSummary {
    pub rank: usize,
    pub id: String,
    pub name: String,
    pub overall_average: f64,
    pub improvement: f64,
    pub success_probability: f64,
    pub risk_tier: RiskTier,
}

impl StudentSummary {
    fn of(analysis: &StudentAnalysis) -> Self {
        Self {
            rank: analysis.rank,
            id: analysis.student.id.clone(),
            name: analysis.student.name.clone(),
            overall_average: analysis.metrics.overall_average,
            improvement: analysis.metrics.improvement,
            success_probability: analysis.prediction.success_probability,
            risk_tier: analysis.prediction.risk_tier,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectDifficulty {
    pub subject: String,
    pub exam1_mean: Option<f64>,
    pub exam2_mean: Option<f64>,
    /// Sitting 2 mean minus sitting 1 mean, when both exist.
    pub delta: Option<f64>,
    pub top_performer: Option<StudentHighlight>,
    pub bottom_performer: Option<StudentHighlight>,
}

impl SubjectDifficulty {
    /// Mean used for ranking: the later sitting when it has the subject.
    pub fn current_mean(&self) -> f64 {
        self.exam2_mean.or(self.exam1_mean).unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PatternCounts {
    pub improving: usize,
    pub stable: usize,
    pub declining: usize,
    pub consistent: usize,
    pub inconsistent: usize,
    pub high_potential: usize,
    pub needs_attention: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CohortAnalytics {
    pub high_risk: Vec<StudentSummary>,
    pub medium_risk: Vec<StudentSummary>,
    pub most_improved: Vec<StudentSummary>,
    pub top_performers: Vec<StudentSummary>,
    /// Hardest subject first.
    pub subject_difficulty: Vec<SubjectDifficulty>,
    pub patterns: PatternCounts,
    pub mean_confidence: f64,
    pub mean_success_probability: f64,
}

fn sitting_means<'a>(
    sittings: impl Iterator<Item = &'a SubjectScores>,
) -> IndexMap<String, f64> {
    let mut totals: IndexMap<String, (f64, usize)> = IndexMap::new();
    for scores in sittings {
        for (subject, score) in scores {
            let slot = totals.entry(subject_key(subject)).or_insert((0.0, 0));
            slot.0 += score;
            slot.1 += 1;
        }
    }
    totals
        .into_iter()
        .map(|(subject, (sum, count))| (subject, sum / count as f64))
        .collect()
}

/// Student whose current score in `subject` is preferred by `wins` over
/// every other; the first such student in rank order on ties.
fn performer(
    students: &[StudentAnalysis],
    subject: &str,
    wins: impl Fn(f64, f64) -> bool,
) -> Option<StudentHighlight> {
    let mut best: Option<(&StudentAnalysis, f64)> = None;
    for analysis in students {
        let score = analysis
            .student
            .current_scores()
            .iter()
            .find(|(name, _)| subject_key(name) == subject)
            .map(|(_, score)| *score);
        let Some(score) = score else {
            continue;
        };
        if best.map(|(_, current)| wins(score, current)).unwrap_or(true) {
            best = Some((analysis, score));
        }
    }
    best.map(|(analysis, value)| StudentHighlight {
        id: analysis.student.id.clone(),
        name: analysis.student.name.clone(),
        value,
    })
}

pub fn subject_difficulty(students: &[StudentAnalysis]) -> Vec<SubjectDifficulty> {
    let exam1 = sitting_means(students.iter().map(|analysis| &analysis.student.exam1_scores));
    let exam2 = sitting_means(students.iter().map(|analysis| &analysis.student.exam2_scores));

    let mut subjects: Vec<&String> = exam1.keys().collect();
    for subject in exam2.keys() {
        if !exam1.contains_key(subject) {
            subjects.push(subject);
        }
    }

    let mut ranking: Vec<SubjectDifficulty> = subjects
        .into_iter()
        .map(|subject| {
            let exam1_mean = exam1.get(subject).copied();
            let exam2_mean = exam2.get(subject).copied();
            SubjectDifficulty {
                subject: subject.clone(),
                exam1_mean,
                exam2_mean,
                delta: exam1_mean.zip(exam2_mean).map(|(first, second)| second - first),
                top_performer: performer(students, subject, |score, best| score > best),
                bottom_performer: performer(students, subject, |score, worst| score < worst),
            }
        })
        .collect();

    ranking.sort_by(|a, b| {
        a.current_mean()
            .total_cmp(&b.current_mean())
            .then_with(|| a.subject.cmp(&b.subject))
    });
    ranking
}

fn ranked_by(
    students: &[StudentAnalysis],
    keep: impl Fn(&StudentAnalysis) -> bool,
    value: impl Fn(&StudentAnalysis) -> f64,
    limit: usize,
) -> Vec<StudentSummary> {
    let mut picked: Vec<&StudentAnalysis> = students.iter().filter(|analysis| keep(*analysis)).collect();
    picked.sort_by(|a, b| match value(*b).total_cmp(&value(*a)) {
        Ordering::Equal => a.rank.cmp(&b.rank),
        other => other,
    });
    picked.into_iter().take(limit).map(StudentSummary::of).collect()
}

pub fn cohort_analytics(students: &[StudentAnalysis], config: &ScoringConfig) -> CohortAnalytics {
    let list_len = config.feedback.analytics_list_len;

    let by_tier = |tier: RiskTier| -> Vec<StudentSummary> {
        students
            .iter()
            .filter(|analysis| analysis.prediction.risk_tier == tier)
            .map(StudentSummary::of)
            .collect()
    };

    let most_improved = ranked_by(
        students,
        |analysis| {
            analysis.student.has_exam1()
                && analysis.student.has_exam2()
                && analysis.metrics.improvement > 0.0
        },
        |analysis| analysis.metrics.improvement,
        list_len,
    );
    let top_performers = ranked_by(
        students,
        |analysis| analysis.metrics.overall_average > 0.0,
        |analysis| analysis.metrics.overall_average,
        list_len,
    );

    let mut patterns = PatternCounts::default();
    for analysis in students {
        match analysis.metrics.trend {
            Trend::Improving => patterns.improving += 1,
            Trend::Stable => patterns.stable += 1,
            Trend::Declining => patterns.declining += 1,
        }
        if analysis.metrics.consistency < config.feedback.consistent_below {
            patterns.consistent += 1;
        } else if analysis.metrics.consistency > config.risk.consistency_limit {
            patterns.inconsistent += 1;
        }
        if analysis.prediction.success_probability >= config.feedback.high_potential_probability {
            patterns.high_potential += 1;
        }
        if analysis.prediction.needs_attention {
            patterns.needs_attention += 1;
        }
    }

    CohortAnalytics {
        high_risk: by_tier(RiskTier::High),
        medium_risk: by_tier(RiskTier::Medium),
        most_improved,
        top_performers,
        subject_difficulty: subject_difficulty(students),
        patterns,
        mean_confidence: mean(students.iter().map(|analysis| analysis.prediction.confidence)),
        mean_success_probability: mean(
            students
                .iter()
                .map(|analysis| analysis.prediction.success_probability),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RawExamRecord;
    use crate::pipeline::analyze_records;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn record(id: &str, scores: &[(&str, f64)]) -> RawExamRecord {
        RawExamRecord::new(
            id,
            Some(format!("S{id}")),
            format!("Student {id}"),
            None,
            scores
                .iter()
                .map(|(subject, score)| (subject.to_string(), *score))
                .collect(),
        )
    }

    fn analytics_for(exam1: &[RawExamRecord], exam2: &[RawExamRecord]) -> CohortAnalytics {
        let config = ScoringConfig::deterministic();
        let mut rng = StdRng::seed_from_u64(42);
        analyze_records(exam1, exam2, &config, &mut rng).analytics
    }

    #[test]
    fn hardest_subject_comes_first() {
        let exam1 = vec![
            record("1", &[("math", 4.0), ("read", 8.0)]),
            record("2", &[("math", 6.0), ("read", 9.0)]),
        ];
        let exam2 = vec![
            record("1", &[("math", 5.0), ("read", 8.0)]),
            record("2", &[("math", 7.0), ("read", 7.0)]),
        ];
        let ranking = analytics_for(&exam1, &exam2).subject_difficulty;

        assert_eq!(ranking[0].subject, "math");
        assert_eq!(ranking[0].exam1_mean, Some(5.0));
        assert_eq!(ranking[0].exam2_mean, Some(6.0));
        assert_eq!(ranking[0].delta, Some(1.0));
        assert_eq!(ranking[0].top_performer.as_ref().map(|s| s.id.as_str()), Some("2"));
        assert_eq!(ranking[1].subject, "read");
        assert_eq!(ranking[1].top_performer.as_ref().map(|s| s.value), Some(8.0));

        let bottom = ranking[0].bottom_performer.as_ref().unwrap();
        assert_eq!((bottom.id.as_str(), bottom.value), ("1", 5.0));
        let bottom = ranking[1].bottom_performer.as_ref().unwrap();
        assert_eq!((bottom.id.as_str(), bottom.value), ("2", 7.0));
    }

    #[test]
    fn bottom_performer_ties_keep_rank_order() {
        let exam2 = vec![
            record("1", &[("math", 9.0)]),
            record("2", &[("math", 4.0)]),
            record("3", &[("math", 4.0)]),
        ];
        let ranking = analytics_for(&[], &exam2).subject_difficulty;
        assert_eq!(ranking[0].top_performer.as_ref().map(|s| s.id.as_str()), Some("1"));
        assert_eq!(ranking[0].bottom_performer.as_ref().map(|s| s.id.as_str()), Some("2"));
    }

    #[test]
    fn subject_seen_in_one_sitting_has_no_delta() {
        let exam1 = vec![record("1", &[("math", 6.0)])];
        let exam2 = vec![record("1", &[("math", 6.0), ("oral", 9.0)])];
        let ranking = analytics_for(&exam1, &exam2).subject_difficulty;
        let oral = ranking.iter().find(|entry| entry.subject == "oral").unwrap();
        assert_eq!(oral.exam1_mean, None);
        assert_eq!(oral.delta, None);
        assert_eq!(oral.current_mean(), 9.0);
    }

    #[test]
    fn lists_and_patterns() {
        let exam1 = vec![
            record("1", &[("math", 5.0)]),
            record("2", &[("math", 8.0)]),
            record("3", &[("math", 6.0)]),
        ];
        let exam2 = vec![
            record("1", &[("math", 8.0)]),
            record("2", &[("math", 1.0)]),
            record("3", &[("math", 6.0)]),
        ];
        let analytics = analytics_for(&exam1, &exam2);

        assert_eq!(analytics.most_improved.len(), 1);
        assert_eq!(analytics.most_improved[0].id, "1");
        assert_eq!(analytics.top_performers[0].id, "1");
        assert_eq!(analytics.top_performers.len(), 3);
        assert!(analytics.high_risk.iter().any(|summary| summary.id == "2"));
        assert_eq!(analytics.patterns.improving, 1);
        assert_eq!(analytics.patterns.stable, 1);
        assert_eq!(analytics.patterns.declining, 1);
        assert_eq!(analytics.patterns.needs_attention, 1);
    }

    #[test]
    fn empty_cohort_has_empty_analytics() {
        let analytics = analytics_for(&[], &[]);
        assert!(analytics.high_risk.is_empty());
        assert!(analytics.subject_difficulty.is_empty());
        assert_eq!(analytics.patterns, PatternCounts::default());
        assert_eq!(analytics.mean_confidence, 0.0);
    }
}
