use rand::Rng;
use serde::Serialize;

use crate::aggregate::{AggregatedStudent, CohortStatistics};
use crate::config::{PredictionConfig, RiskConfig, ScoringConfig};
use crate::models::{PerformanceLevel, RiskTier, SubjectScores, MAX_SCORE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskFactor {
    BelowCohortMean,
    SharpDecline,
    ManyWeakSubjects,
    Inconsistent,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    pub predicted_score: f64,
    pub success_probability: f64,
    pub risk_tier: RiskTier,
    pub risk_factors: Vec<RiskFactor>,
    pub next_sitting_prediction: f64,
    pub predicted_grade: PerformanceLevel,
    pub confidence: f64,
    pub needs_attention: bool,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubjectProfile {
    pub total: usize,
    pub strong: usize,
    pub weak: usize,
}

impl SubjectProfile {
    pub fn of(scores: &SubjectScores, config: &PredictionConfig) -> Self {
        Self {
            total: scores.len(),
            strong: scores
                .values()
                .filter(|score| **score >= config.strong_subject_score)
                .count(),
            weak: scores
                .values()
                .filter(|score| **score < config.weak_subject_score)
                .count(),
        }
    }

    fn fraction(count: usize, total: usize) -> f64 {
        if total == 0 {
            0.0
        } else {
            count as f64 / total as f64
        }
    }

    pub fn strong_fraction(&self) -> f64 {
        Self::fraction(self.strong, self.total)
    }

    pub fn weak_fraction(&self) -> f64 {
        Self::fraction(self.weak, self.total)
    }
}

pub fn predicted_score(entry: &AggregatedStudent, config: &PredictionConfig) -> f64 {
    let student = &entry.student;
    let metrics = &entry.metrics;
    let profile = SubjectProfile::of(student.current_scores(), config);

    let base = config.current_weight * student.current_average();
    let improvement_bonus =
        (metrics.improvement.max(0.0) * config.improvement_bonus_factor).min(config.improvement_bonus_cap);
    let consistency_bonus = if profile.total == 0 {
        0.0
    } else {
        config.consistency_bonus_max * (1.0 - metrics.consistency).max(0.0)
    };
    let strong_bonus = config.strong_subject_bonus * profile.strong_fraction();
    let weak_penalty = config.weak_subject_penalty * profile.weak_fraction();

    (base + improvement_bonus + consistency_bonus + strong_bonus - weak_penalty).clamp(0.0, MAX_SCORE)
}

pub fn success_probability(predicted: f64, improvement: f64, config: &PredictionConfig) -> f64 {
    let mut probability = predicted * 10.0;
    if improvement > config.strong_improvement {
        probability += config.strong_improvement_boost;
    } else if improvement < config.strong_decline {
        probability -= config.strong_decline_penalty;
    }
    probability.clamp(0.0, 100.0)
}

pub fn risk_factors(
    entry: &AggregatedStudent,
    stats: &CohortStatistics,
    risk: &RiskConfig,
    prediction: &PredictionConfig,
) -> Vec<RiskFactor> {
    let metrics = &entry.metrics;
    let profile = SubjectProfile::of(entry.student.current_scores(), prediction);
    let mut factors = Vec::new();

    if metrics.overall_average < stats.mean - risk.mean_gap {
        factors.push(RiskFactor::BelowCohortMean);
    }
    if metrics.improvement < risk.decline {
        factors.push(RiskFactor::SharpDecline);
    }
    if profile.weak > risk.weak_subject_limit {
        factors.push(RiskFactor::ManyWeakSubjects);
    }
    if metrics.consistency > risk.consistency_limit {
        factors.push(RiskFactor::Inconsistent);
    }
    factors
}

pub fn classify_risk(factor_count: usize, average: f64, risk: &RiskConfig) -> RiskTier {
    if factor_count >= risk.high_factor_count || average < risk.high_average_floor {
        RiskTier::High
    } else if factor_count >= risk.medium_factor_count || average < risk.medium_average_floor {
        RiskTier::Medium
    } else {
        RiskTier::Low
    }
}

/// Bounds of the random perturbation added to a next-sitting estimate.
/// Weaker students get more upside.
pub fn jitter_range(estimate: f64) -> (f64, f64) {
    if estimate >= 8.0 {
        (-0.1, 0.4)
    } else if estimate >= 6.0 {
        (-0.3, 0.5)
    } else {
        (-0.2, 1.0)
    }
}

pub fn round_to_half(value: f64) -> f64 {
    (value * 2.0).round() / 2.0
}

pub fn next_sitting_prediction<R: Rng + ?Sized>(
    entry: &AggregatedStudent,
    config: &PredictionConfig,
    rng: &mut R,
) -> f64 {
    let student = &entry.student;
    if !student.has_exam1() && !student.has_exam2() {
        return config.no_data_prediction;
    }

    let improvement = entry.metrics.improvement;
    let mut estimate = student.current_average();
    if improvement > 0.0 {
        estimate += improvement * config.upward_extrapolation;
    } else if improvement < 0.0 {
        estimate += improvement * config.downward_extrapolation;
    }

    if config.jitter {
        let (low, high) = jitter_range(estimate);
        estimate += rng.gen_range(low..high);
    }

    round_to_half(estimate.clamp(0.0, MAX_SCORE)).clamp(0.0, MAX_SCORE)
}

pub fn confidence(entry: &AggregatedStudent, config: &PredictionConfig) -> f64 {
    let metrics = &entry.metrics;
    (config.confidence_base + metrics.improvement * config.confidence_improvement_slope
        - metrics.consistency * config.confidence_consistency_slope)
        .clamp(config.confidence_min, config.confidence_max)
}

/// One directive per triggered rule, in a fixed order. Rules are independent.
pub fn recommendations(entry: &AggregatedStudent, config: &ScoringConfig) -> Vec<String> {
    let student = &entry.student;
    let metrics = &entry.metrics;
    let profile = SubjectProfile::of(student.current_scores(), &config.prediction);
    let current = student.current_average();
    let mut directives = Vec::new();

    match profile.weak {
        0 => {}
        1 => directives.push("تمارين إضافية مركزة على المادة الضعيفة".to_string()),
        count => directives.push(format!("برنامج دعم في المواد الضعيفة ({count} مواد)")),
    }

    if metrics.consistency > config.risk.consistency_limit {
        directives.push("متابعة فردية لتقليص التفاوت الكبير بين المواد".to_string());
    } else if metrics.consistency > config.risk.consistency_limit / 2.0 {
        directives.push("توزيع وقت المذاكرة بشكل متوازن بين المواد".to_string());
    }

    if metrics.improvement < -config.aggregate.trend_threshold {
        directives.push("مراجعة طريقة المذاكرة وتحديد أسباب التراجع مع المعلم".to_string());
    } else if metrics.improvement > config.aggregate.trend_threshold {
        directives.push("الاستمرار على النهج الحالي مع تحديد أهداف أعلى".to_string());
    }

    if profile.strong >= 2 {
        directives.push("مواد إثرائية وتحديات إضافية في مواد التميز".to_string());
    }

    if profile.total > 0 {
        if current < config.prediction.weak_subject_score {
            directives.push("دروس تقوية فردية واجتماع مع ولي الأمر".to_string());
        } else if current >= config.prediction.strong_subject_score {
            directives.push("المشاركة في أنشطة الموهوبين والقيادة".to_string());
        }
    }

    if directives.is_empty() {
        directives.push("متابعة منتظمة وتشجيع على التحسن".to_string());
    }
    directives
}

pub fn predict<R: Rng + ?Sized>(
    entry: &AggregatedStudent,
    stats: &CohortStatistics,
    config: &ScoringConfig,
    rng: &mut R,
) -> PredictionResult {
    let metrics = &entry.metrics;
    let predicted = predicted_score(entry, &config.prediction);
    let factors = risk_factors(entry, stats, &config.risk, &config.prediction);
    let current = entry.student.current_average();

    PredictionResult {
        predicted_score: predicted,
        success_probability: success_probability(predicted, metrics.improvement, &config.prediction),
        risk_tier: classify_risk(factors.len(), metrics.overall_average, &config.risk),
        risk_factors: factors,
        next_sitting_prediction: next_sitting_prediction(entry, &config.prediction, rng),
        predicted_grade: PerformanceLevel::from_average(current),
        confidence: confidence(entry, &config.prediction),
        needs_attention: current < config.prediction.weak_subject_score
            || metrics.improvement < config.risk.decline,
        recommendations: recommendations(entry, config),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{aggregate_students, cohort_statistics};
    use crate::models::{mean, UnifiedStudent};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn student(id: &str, exam1: &[f64], exam2: &[f64]) -> UnifiedStudent {
        let to_scores = |values: &[f64]| -> SubjectScores {
            values
                .iter()
                .enumerate()
                .map(|(idx, score)| (format!("subject {idx}"), *score))
                .collect()
        };
        UnifiedStudent {
            id: id.to_string(),
            student_number: None,
            name: format!("Student {id}"),
            date_of_birth: None,
            exam1_scores: to_scores(exam1),
            exam2_scores: to_scores(exam2),
            exam1_average: mean(exam1.iter().copied()),
            exam2_average: mean(exam2.iter().copied()),
        }
    }

    fn aggregated(students: Vec<UnifiedStudent>) -> (Vec<AggregatedStudent>, CohortStatistics) {
        let config = ScoringConfig::default();
        let entries = aggregate_students(students, &config.aggregate);
        let stats = cohort_statistics(&entries, &config.aggregate);
        (entries, stats)
    }

    #[test]
    fn predicted_score_combines_bonuses() {
        let config = PredictionConfig::default();
        let (entries, _) = aggregated(vec![student("1", &[8.0, 8.0], &[9.0, 9.0])]);
        let entry = &entries[0];
        // 0.4*9 + min(1.0, 2.5) + consistency bonus + full strong bonus
        let cv = entry.metrics.consistency;
        let expected = 3.6 + 1.0 + 3.0 * (1.0 - cv) + 1.0;
        assert!((predicted_score(entry, &config) - expected).abs() < 1e-9);
    }

    #[test]
    fn predicted_score_stays_in_range() {
        let config = PredictionConfig::default();
        let (entries, _) = aggregated(vec![
            student("1", &[0.0, 10.0], &[10.0, 10.0]),
            student("2", &[10.0, 10.0], &[0.0, 0.5]),
            student("3", &[], &[]),
        ]);
        for entry in &entries {
            let score = predicted_score(entry, &config);
            assert!((0.0..=10.0).contains(&score));
        }
    }

    #[test]
    fn success_probability_adjusts_for_strong_trends() {
        let config = PredictionConfig::default();
        assert_eq!(success_probability(6.0, 0.0, &config), 60.0);
        assert_eq!(success_probability(6.0, 1.5, &config), 70.0);
        assert_eq!(success_probability(6.0, -1.5, &config), 45.0);
        assert_eq!(success_probability(9.5, 2.0, &config), 100.0);
        assert_eq!(success_probability(1.0, -3.0, &config), 0.0);
    }

    #[test]
    fn risk_tier_thresholds() {
        let risk = RiskConfig::default();
        assert_eq!(classify_risk(0, 7.0, &risk), RiskTier::Low);
        assert_eq!(classify_risk(1, 7.0, &risk), RiskTier::Low);
        assert_eq!(classify_risk(2, 7.0, &risk), RiskTier::Medium);
        assert_eq!(classify_risk(3, 7.0, &risk), RiskTier::High);
        assert_eq!(classify_risk(0, 4.5, &risk), RiskTier::Medium);
        assert_eq!(classify_risk(0, 3.9, &risk), RiskTier::High);
    }

    #[test]
    fn risk_is_relative_to_cohort() {
        let config = ScoringConfig::default();
        let (entries, stats) = aggregated(vec![
            student("1", &[9.0, 9.0, 9.0], &[9.0, 9.0, 9.0]),
            student("2", &[9.5, 9.5, 9.5], &[9.5, 9.5, 9.5]),
            student("3", &[7.0, 7.0, 7.0], &[5.0, 5.5, 6.0]),
        ]);
        let laggard = entries.iter().find(|entry| entry.student.id == "3").unwrap();
        let factors = risk_factors(laggard, &stats, &config.risk, &config.prediction);
        assert_eq!(factors, vec![RiskFactor::BelowCohortMean, RiskFactor::SharpDecline]);
        assert_eq!(classify_risk(factors.len(), laggard.metrics.overall_average, &config.risk), RiskTier::Medium);
    }

    #[test]
    fn next_sitting_extrapolates_asymmetrically() {
        let config = ScoringConfig::deterministic().prediction;
        let mut rng = StdRng::seed_from_u64(7);
        let (entries, _) = aggregated(vec![
            student("1", &[5.0], &[7.0]),
            student("2", &[7.0], &[5.0]),
            student("3", &[], &[]),
        ]);
        // 7 + 2*0.6 = 8.2 -> 8.0
        assert_eq!(next_sitting_prediction(&entries[0], &config, &mut rng), 8.0);
        // 5 - 2*0.3 = 4.4 -> 4.5
        assert_eq!(next_sitting_prediction(&entries[1], &config, &mut rng), 4.5);
        assert_eq!(next_sitting_prediction(&entries[2], &config, &mut rng), 5.0);
    }

    #[test]
    fn jitter_is_bounded_and_seeded() {
        let config = PredictionConfig::default();
        let (entries, _) = aggregated(vec![student("1", &[6.0], &[6.0])]);
        let entry = &entries[0];

        let mut rng = StdRng::seed_from_u64(42);
        let first: Vec<f64> = (0..20)
            .map(|_| next_sitting_prediction(entry, &config, &mut rng))
            .collect();
        let mut rng = StdRng::seed_from_u64(42);
        let second: Vec<f64> = (0..20)
            .map(|_| next_sitting_prediction(entry, &config, &mut rng))
            .collect();

        assert_eq!(first, second);
        assert!(first.iter().all(|value| (5.5..=6.5).contains(value)));
        assert!(first.iter().all(|value| (value * 2.0).fract() == 0.0));
    }

    #[test]
    fn confidence_is_clamped() {
        let config = PredictionConfig::default();
        let (entries, _) = aggregated(vec![
            student("1", &[2.0], &[10.0]),
            student("2", &[10.0, 0.5], &[0.5, 0.5]),
            student("3", &[6.0], &[6.0]),
        ]);
        assert_eq!(confidence(&entries[1], &config), 30.0);
        assert_eq!(confidence(&entries[2], &config), 70.0);

        let steep = PredictionConfig {
            confidence_improvement_slope: 20.0,
            ..PredictionConfig::default()
        };
        assert_eq!(confidence(&entries[0], &steep), 95.0);
    }

    #[test]
    fn recommendations_follow_rule_order() {
        let config = ScoringConfig::default();
        let (entries, _) = aggregated(vec![student("1", &[8.0, 8.0, 8.0], &[3.0, 4.0, 9.5])]);
        let directives = recommendations(&entries[0], &config);
        assert_eq!(directives[0], "برنامج دعم في المواد الضعيفة (2 مواد)");
        assert_eq!(directives.last().unwrap(), "مراجعة طريقة المذاكرة وتحديد أسباب التراجع مع المعلم");
    }

    #[test]
    fn steady_average_student_gets_default_directive() {
        let config = ScoringConfig::default();
        let (entries, _) = aggregated(vec![student("1", &[6.5, 6.5], &[6.5, 6.5])]);
        assert_eq!(
            recommendations(&entries[0], &config),
            vec!["متابعة منتظمة وتشجيع على التحسن".to_string()]
        );
    }

    #[test]
    fn predict_flags_struggling_student() {
        let config = ScoringConfig::deterministic();
        let mut rng = StdRng::seed_from_u64(1);
        let (entries, stats) = aggregated(vec![
            student("1", &[8.0, 8.0], &[8.0, 8.0]),
            student("2", &[6.0, 5.0], &[2.0, 3.0]),
        ]);
        let result = predict(&entries[1], &stats, &config, &mut rng);
        assert_eq!(result.risk_tier, RiskTier::High);
        assert!(result.needs_attention);
        assert_eq!(result.predicted_grade, PerformanceLevel::Weak);

        let result = predict(&entries[0], &stats, &config, &mut rng);
        assert_eq!(result.risk_tier, RiskTier::Low);
        assert!(!result.needs_attention);
    }
}
