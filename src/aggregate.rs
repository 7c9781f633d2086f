use indexmap::IndexMap;
use serde::Serialize;

use crate::config::AggregateConfig;
use crate::models::{mean, subject_key, PerformanceLevel, Sitting, Trend, UnifiedStudent};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentMetrics {
    pub overall_average: f64,
    pub improvement: f64,
    pub improvement_percentage: f64,
    pub trend: Trend,
    /// Coefficient of variation over every observed subject score.
    pub consistency: f64,
    pub performance_level: PerformanceLevel,
    /// Sitting 2 minus sitting 1, for subjects scored in both.
    pub subject_improvements: IndexMap<String, f64>,
}

/// A reconciled student with the aggregator's derived fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedStudent {
    pub student: UnifiedStudent,
    pub metrics: StudentMetrics,
}

/// Population standard deviation over mean; 0 for an empty or zero-mean set.
pub fn coefficient_of_variation(scores: &[f64]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    let avg = mean(scores.iter().copied());
    if avg == 0.0 {
        return 0.0;
    }
    let variance = mean(scores.iter().map(|score| (score - avg).powi(2)));
    variance.sqrt() / avg
}

pub fn classify_trend(improvement: f64, threshold: f64) -> Trend {
    if improvement > threshold {
        Trend::Improving
    } else if improvement < -threshold {
        Trend::Declining
    } else {
        Trend::Stable
    }
}

pub fn student_metrics(student: &UnifiedStudent, config: &AggregateConfig) -> StudentMetrics {
    let both = student.has_exam1() && student.has_exam2();

    let improvement = if both {
        student.exam2_average - student.exam1_average
    } else {
        0.0
    };

    let overall_average = match (student.has_exam1(), student.has_exam2()) {
        (true, true) => {
            config.exam1_weight * student.exam1_average + config.exam2_weight * student.exam2_average
        }
        (true, false) => student.exam1_average,
        (false, true) => student.exam2_average,
        (false, false) => 0.0,
    };

    let improvement_percentage = if !both {
        0.0
    } else if student.exam1_average > 0.0 {
        improvement / student.exam1_average * 100.0
    } else if improvement > 0.0 {
        100.0
    } else {
        0.0
    };

    let observed: Vec<f64> = student
        .exam1_scores
        .values()
        .chain(student.exam2_scores.values())
        .copied()
        .collect();

    let exam1_by_key: IndexMap<String, f64> = student
        .exam1_scores
        .iter()
        .map(|(subject, score)| (subject_key(subject), *score))
        .collect();
    let subject_improvements = student
        .exam2_scores
        .iter()
        .filter_map(|(subject, score2)| {
            let key = subject_key(subject);
            exam1_by_key
                .get(&key)
                .map(|score1| (key.clone(), score2 - score1))
        })
        .collect();

    StudentMetrics {
        overall_average,
        improvement,
        improvement_percentage,
        trend: classify_trend(improvement, config.trend_threshold),
        consistency: coefficient_of_variation(&observed),
        performance_level: PerformanceLevel::from_average(overall_average),
        subject_improvements,
    }
}

pub fn aggregate_students(
    students: Vec<UnifiedStudent>,
    config: &AggregateConfig,
) -> Vec<AggregatedStudent> {
    students
        .into_iter()
        .map(|student| {
            let metrics = student_metrics(&student, config);
            AggregatedStudent { student, metrics }
        })
        .collect()
}

/// Four-band split of the overall average.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PerformanceDistribution {
    pub excellent: usize,
    pub good: usize,
    pub average: usize,
    pub poor: usize,
}

impl PerformanceDistribution {
    pub fn total(&self) -> usize {
        self.excellent + self.good + self.average + self.poor
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentHighlight {
    pub id: String,
    pub name: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CohortStatistics {
    pub total_students: usize,
    /// Students with a non-zero overall average; mean, range and pass rate
    /// are computed over these.
    pub assessed_students: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub pass_count: usize,
    /// Percentage, 0 to 100.
    pub pass_rate: f64,
    pub distribution: PerformanceDistribution,
    pub subject_means: IndexMap<String, f64>,
    pub subject_means_sitting: Sitting,
    pub students_with_exam2: usize,
    pub students_with_both: usize,
    pub top_student: Option<StudentHighlight>,
    pub most_improved: Option<StudentHighlight>,
    /// Share of both-sitting students who improved, 0 to 100.
    pub improvement_rate: f64,
    pub average_improvement: f64,
}

fn highlight(entry: &AggregatedStudent, value: f64) -> StudentHighlight {
    StudentHighlight {
        id: entry.student.id.clone(),
        name: entry.student.name.clone(),
        value,
    }
}

/// First student holding the strictly greatest value.
fn best_by<'a>(
    students: impl Iterator<Item = &'a AggregatedStudent>,
    value: impl Fn(&AggregatedStudent) -> f64,
) -> Option<StudentHighlight> {
    let mut best: Option<(&AggregatedStudent, f64)> = None;
    for entry in students {
        let candidate = value(entry);
        if best.map(|(_, current)| candidate > current).unwrap_or(true) {
            best = Some((entry, candidate));
        }
    }
    best.map(|(entry, value)| highlight(entry, value))
}

pub fn subject_means(students: &[AggregatedStudent]) -> (IndexMap<String, f64>, Sitting) {
    let sitting = if students.iter().any(|entry| entry.student.has_exam2()) {
        Sitting::Second
    } else {
        Sitting::First
    };

    let mut totals: IndexMap<String, (f64, usize)> = IndexMap::new();
    for entry in students {
        let scores = match sitting {
            Sitting::Second => &entry.student.exam2_scores,
            Sitting::First => &entry.student.exam1_scores,
        };
        for (subject, score) in scores {
            let slot = totals.entry(subject.clone()).or_insert((0.0, 0));
            slot.0 += score;
            slot.1 += 1;
        }
    }

    let means = totals
        .into_iter()
        .map(|(subject, (sum, count))| (subject, sum / count as f64))
        .collect();
    (means, sitting)
}

pub fn cohort_statistics(students: &[AggregatedStudent], config: &AggregateConfig) -> CohortStatistics {
    let assessed: Vec<&AggregatedStudent> = students
        .iter()
        .filter(|entry| entry.metrics.overall_average > 0.0)
        .collect();
    let averages: Vec<f64> = assessed
        .iter()
        .map(|entry| entry.metrics.overall_average)
        .collect();

    let pass_count = averages
        .iter()
        .filter(|average| **average >= config.pass_mark)
        .count();
    let pass_rate = if averages.is_empty() {
        0.0
    } else {
        pass_count as f64 / averages.len() as f64 * 100.0
    };

    // Every student lands in a band, unscored students in the lowest one.
    let mut distribution = PerformanceDistribution::default();
    for entry in students {
        let average = entry.metrics.overall_average;
        if average >= config.excellent_band {
            distribution.excellent += 1;
        } else if average >= config.good_band {
            distribution.good += 1;
        } else if average >= config.pass_mark {
            distribution.average += 1;
        } else {
            distribution.poor += 1;
        }
    }

    let both: Vec<&AggregatedStudent> = students
        .iter()
        .filter(|entry| entry.student.has_exam1() && entry.student.has_exam2())
        .collect();
    let improved = both
        .iter()
        .filter(|entry| entry.metrics.improvement > 0.0)
        .count();
    let improvement_rate = if both.is_empty() {
        0.0
    } else {
        improved as f64 / both.len() as f64 * 100.0
    };

    let (subject_means, subject_means_sitting) = subject_means(students);

    CohortStatistics {
        total_students: students.len(),
        assessed_students: assessed.len(),
        mean: mean(averages.iter().copied()),
        min: averages.iter().copied().reduce(f64::min).unwrap_or(0.0),
        max: averages.iter().copied().reduce(f64::max).unwrap_or(0.0),
        pass_count,
        pass_rate,
        distribution,
        subject_means,
        subject_means_sitting,
        students_with_exam2: students.iter().filter(|entry| entry.student.has_exam2()).count(),
        students_with_both: both.len(),
        top_student: best_by(assessed.iter().copied(), |entry| entry.metrics.overall_average),
        most_improved: best_by(both.iter().copied(), |entry| entry.metrics.improvement),
        improvement_rate,
        average_improvement: mean(both.iter().map(|entry| entry.metrics.improvement)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SubjectScores;

    fn scores(pairs: &[(&str, f64)]) -> SubjectScores {
        pairs
            .iter()
            .map(|(subject, score)| (subject.to_string(), *score))
            .collect()
    }

    fn student(id: &str, exam1: &[(&str, f64)], exam2: &[(&str, f64)]) -> UnifiedStudent {
        let exam1_scores = scores(exam1);
        let exam2_scores = scores(exam2);
        UnifiedStudent {
            id: id.to_string(),
            student_number: Some(format!("S{id}")),
            name: format!("Student {id}"),
            date_of_birth: None,
            exam1_average: mean(exam1_scores.values().copied()),
            exam2_average: mean(exam2_scores.values().copied()),
            exam1_scores,
            exam2_scores,
        }
    }

    #[test]
    fn weighted_overall_for_both_sittings() {
        let config = AggregateConfig::default();
        let unified = student("1", &[("math", 6.0), ("read", 8.0)], &[("math", 8.0), ("read", 9.0)]);
        let metrics = student_metrics(&unified, &config);

        assert_eq!(unified.exam1_average, 7.0);
        assert_eq!(unified.exam2_average, 8.5);
        assert!((metrics.improvement - 1.5).abs() < 1e-9);
        assert_eq!(metrics.trend, Trend::Improving);
        assert!((metrics.overall_average - 7.9).abs() < 1e-9);
        assert!((metrics.subject_improvements["math"] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn subject_improvements_match_spelling_variants() {
        let config = AggregateConfig::default();
        let unified = student("1", &[("الاستماع والتحدث", 4.0)], &[("الإستماع  والتحدث", 9.0)]);
        let metrics = student_metrics(&unified, &config);
        assert_eq!(metrics.subject_improvements.len(), 1);
        assert_eq!(metrics.subject_improvements["الاستماع والتحدث"], 5.0);
    }

    #[test]
    fn single_sitting_is_not_diluted() {
        let config = AggregateConfig::default();
        let metrics = student_metrics(&student("1", &[("math", 4.0)], &[]), &config);
        assert_eq!(metrics.overall_average, 4.0);
        assert_eq!(metrics.improvement, 0.0);
        assert_eq!(metrics.trend, Trend::Stable);
        assert_eq!(metrics.performance_level.label_ar(), "ضعيف");

        let metrics = student_metrics(&student("2", &[], &[("math", 6.5)]), &config);
        assert_eq!(metrics.overall_average, 6.5);
    }

    #[test]
    fn trend_uses_half_point_threshold() {
        assert_eq!(classify_trend(0.5, 0.5), Trend::Stable);
        assert_eq!(classify_trend(0.51, 0.5), Trend::Improving);
        assert_eq!(classify_trend(-0.6, 0.5), Trend::Declining);
    }

    #[test]
    fn consistency_is_coefficient_of_variation() {
        assert_eq!(coefficient_of_variation(&[]), 0.0);
        assert_eq!(coefficient_of_variation(&[0.0, 0.0]), 0.0);
        assert_eq!(coefficient_of_variation(&[7.0, 7.0, 7.0]), 0.0);
        // mean 5, population sd 3
        assert!((coefficient_of_variation(&[2.0, 8.0]) - 0.6).abs() < 1e-9);
    }

    #[test]
    fn uniform_cohort_statistics() {
        let config = AggregateConfig::default();
        let students: Vec<UnifiedStudent> = (0..10)
            .map(|i| student(&i.to_string(), &[("math", 7.0), ("read", 7.0)], &[("math", 7.0), ("read", 7.0)]))
            .collect();
        let aggregated = aggregate_students(students, &config);
        let stats = cohort_statistics(&aggregated, &config);

        assert!(aggregated.iter().all(|entry| entry.metrics.consistency == 0.0));
        assert_eq!(stats.distribution.good, 10);
        assert_eq!(stats.distribution.excellent, 0);
        assert_eq!(stats.pass_rate, 100.0);
        assert!((stats.mean - 7.0).abs() < 1e-9);
        assert_eq!(stats.subject_means["math"], 7.0);
        assert_eq!(stats.subject_means_sitting, Sitting::Second);
        assert_eq!(stats.improvement_rate, 0.0);
    }

    #[test]
    fn distribution_covers_every_student() {
        let config = AggregateConfig::default();
        let students = vec![
            student("1", &[("math", 9.0)], &[("math", 9.0)]),
            student("2", &[("math", 5.5)], &[]),
            student("3", &[], &[("math", 3.0)]),
            student("4", &[], &[]),
        ];
        let aggregated = aggregate_students(students, &config);
        let stats = cohort_statistics(&aggregated, &config);

        assert_eq!(stats.distribution.total(), 4);
        assert_eq!(stats.distribution.poor, 2);
        assert_eq!(stats.assessed_students, 3);
        assert_eq!(stats.min, 3.0);
        assert_eq!(stats.max, 9.0);
        assert_eq!(stats.pass_count, 2);
        assert_eq!(stats.top_student.as_ref().map(|s| s.id.as_str()), Some("1"));
    }

    #[test]
    fn subject_means_fall_back_to_first_sitting() {
        let config = AggregateConfig::default();
        let students = vec![
            student("1", &[("math", 4.0)], &[]),
            student("2", &[("math", 6.0), ("read", 9.0)], &[]),
        ];
        let stats = cohort_statistics(&aggregate_students(students, &config), &config);
        assert_eq!(stats.subject_means_sitting, Sitting::First);
        assert_eq!(stats.subject_means["math"], 5.0);
        assert_eq!(stats.subject_means["read"], 9.0);
    }

    #[test]
    fn most_improved_needs_both_sittings() {
        let config = AggregateConfig::default();
        let students = vec![
            student("1", &[("math", 4.0)], &[("math", 7.0)]),
            student("2", &[("math", 6.0)], &[("math", 5.0)]),
            student("3", &[], &[("math", 10.0)]),
        ];
        let stats = cohort_statistics(&aggregate_students(students, &config), &config);
        let most_improved = stats.most_improved.unwrap();
        assert_eq!(most_improved.id, "1");
        assert_eq!(most_improved.value, 3.0);
        assert_eq!(stats.improvement_rate, 50.0);
        assert_eq!(stats.average_improvement, 1.0);
    }

    #[test]
    fn empty_cohort_is_well_defined() {
        let config = AggregateConfig::default();
        let stats = cohort_statistics(&[], &config);
        assert_eq!(stats.total_students, 0);
        assert_eq!(stats.mean, 0.0);
        assert_eq!(stats.pass_rate, 0.0);
        assert_eq!(stats.distribution, PerformanceDistribution::default());
        assert!(stats.subject_means.is_empty());
        assert!(stats.top_student.is_none());
    }

    #[test]
    fn aggregation_is_idempotent() {
        let config = AggregateConfig::default();
        let students = vec![
            student("1", &[("math", 4.0), ("read", 9.0)], &[("math", 7.0)]),
            student("2", &[("math", 6.0)], &[]),
        ];
        let first = aggregate_students(students.clone(), &config);
        let second = aggregate_students(students, &config);
        assert_eq!(first, second);
        assert_eq!(
            cohort_statistics(&first, &config),
            cohort_statistics(&second, &config)
        );
    }
}
