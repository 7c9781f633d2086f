use std::fmt::Write;

use crate::aggregate::StudentHighlight;
use crate::pipeline::AnalysisResult;

pub fn build_report(result: &AnalysisResult, limit: usize) -> String {
    let stats = &result.statistics;
    let analytics = &result.analytics;
    let summary = &result.reconciliation;

    let mut output = String::new();

    let _ = writeln!(output, "# Cohort Exam Insights Report");
    let _ = writeln!(
        output,
        "Generated from {} exam 1 records and {} exam 2 records ({} students)",
        summary.exam1_records, summary.exam2_records, stats.total_students
    );
    let _ = writeln!(output);

    if result.is_empty() {
        let _ = writeln!(output, "No usable records in either sitting.");
        return output;
    }

    let _ = writeln!(output, "## Cohort Summary");
    let _ = writeln!(
        output,
        "- Mean {:.2} (min {:.2}, max {:.2}) across {} assessed students",
        stats.mean, stats.min, stats.max, stats.assessed_students
    );
    let _ = writeln!(
        output,
        "- Pass rate {:.1}% ({} students at or above the pass mark)",
        stats.pass_rate, stats.pass_count
    );
    let _ = writeln!(
        output,
        "- {} students sat exam 2, {} sat both",
        stats.students_with_exam2, stats.students_with_both
    );
    if stats.students_with_both > 0 {
        let _ = writeln!(
            output,
            "- {:.1}% improved, average change {:+.2}",
            stats.improvement_rate, stats.average_improvement
        );
    }
    if let Some(top) = &stats.top_student {
        let _ = writeln!(output, "- Top student: {} ({:.2})", top.name, top.value);
    }
    if let Some(best) = &stats.most_improved {
        let _ = writeln!(output, "- Most improved: {} ({:+.2})", best.name, best.value);
    }
    let _ = writeln!(
        output,
        "- Reconciliation: {} by student number, {} by id, {} exam 1 only, {} exam 2 only, {} duplicate rows",
        summary.matched_by_number,
        summary.matched_by_id,
        summary.first_only,
        summary.second_only,
        summary.collisions
    );

    let distribution = &stats.distribution;
    let _ = writeln!(output);
    let _ = writeln!(output, "## Performance Distribution");
    let _ = writeln!(output, "- Excellent (8 and above): {}", distribution.excellent);
    let _ = writeln!(output, "- Good (6 to 8): {}", distribution.good);
    let _ = writeln!(output, "- Average (5 to 6): {}", distribution.average);
    let _ = writeln!(output, "- Poor (below 5): {}", distribution.poor);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Subject Difficulty");
    let _ = writeln!(
        output,
        "Cohort subject means are taken from {}.",
        stats.subject_means_sitting
    );
    if analytics.subject_difficulty.is_empty() {
        let _ = writeln!(output, "No subject scores recorded.");
    } else {
        let _ = writeln!(output);
        let _ = writeln!(output, "| Subject | Exam 1 | Exam 2 | Change | Top performer | Bottom performer |");
        let _ = writeln!(output, "|---|---|---|---|---|---|");
        let fmt = |value: Option<f64>| value.map(|v| format!("{v:.2}")).unwrap_or_else(|| "-".to_string());
        let performer = |highlight: Option<&StudentHighlight>| {
            highlight
                .map(|highlight| format!("{} ({:.1})", highlight.name, highlight.value))
                .unwrap_or_else(|| "-".to_string())
        };
        for subject in &analytics.subject_difficulty {
            let _ = writeln!(
                output,
                "| {} | {} | {} | {} | {} | {} |",
                subject.subject,
                fmt(subject.exam1_mean),
                fmt(subject.exam2_mean),
                subject
                    .delta
                    .map(|delta| format!("{delta:+.2}"))
                    .unwrap_or_else(|| "-".to_string()),
                performer(subject.top_performer.as_ref()),
                performer(subject.bottom_performer.as_ref())
            );
        }
    }

    let patterns = &analytics.patterns;
    let _ = writeln!(output);
    let _ = writeln!(output, "## Patterns");
    let _ = writeln!(
        output,
        "- Improving {}, stable {}, declining {}",
        patterns.improving, patterns.stable, patterns.declining
    );
    let _ = writeln!(
        output,
        "- Consistent {}, inconsistent {}",
        patterns.consistent, patterns.inconsistent
    );
    let _ = writeln!(
        output,
        "- High potential {}, needs attention {}",
        patterns.high_potential, patterns.needs_attention
    );
    let _ = writeln!(
        output,
        "- Mean confidence {:.1}%, mean success probability {:.1}%",
        analytics.mean_confidence, analytics.mean_success_probability
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Highest Risk Students");
    let at_risk: Vec<_> = analytics
        .high_risk
        .iter()
        .chain(analytics.medium_risk.iter())
        .take(limit)
        .collect();
    if at_risk.is_empty() {
        let _ = writeln!(output, "No students flagged at medium or high risk.");
    } else {
        for summary in at_risk {
            let _ = writeln!(
                output,
                "- #{} {} ({}) risk {}, average {:.2}, change {:+.2}, success {:.0}%",
                summary.rank,
                summary.name,
                summary.id,
                summary.risk_tier.label_ar(),
                summary.overall_average,
                summary.improvement,
                summary.success_probability
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Most Improved");
    if analytics.most_improved.is_empty() {
        let _ = writeln!(output, "No student improved between sittings.");
    } else {
        for summary in &analytics.most_improved {
            let _ = writeln!(
                output,
                "- {} ({}) {:+.2}",
                summary.name, summary.id, summary.improvement
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Top Performers");
    for summary in &analytics.top_performers {
        let _ = writeln!(
            output,
            "- #{} {} ({}) average {:.2}",
            summary.rank, summary.name, summary.id, summary.overall_average
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Student Feedback");
    for analysis in result.students.iter().take(limit) {
        let feedback = &analysis.feedback;
        let _ = writeln!(output);
        let _ = writeln!(
            output,
            "### #{} {} ({})",
            analysis.rank, analysis.student.name, analysis.student.id
        );
        let _ = writeln!(
            output,
            "- Level: {} ({:.2}), next sitting estimate {:.1}, confidence {:.0}%",
            feedback.performance_level.label_ar(),
            analysis.metrics.overall_average,
            analysis.prediction.next_sitting_prediction,
            analysis.prediction.confidence
        );
        let _ = writeln!(output, "- {}", feedback.overall_comment);
        let _ = writeln!(output, "- {}", feedback.improvement_advice);
        let _ = writeln!(output, "- Guardian: {}", feedback.guardian_guidance);
        if !feedback.strengths.is_empty() {
            let _ = writeln!(output, "- Strengths: {}", feedback.strengths.join("، "));
        }
        if !feedback.weaknesses.is_empty() {
            let _ = writeln!(output, "- Weaknesses: {}", feedback.weaknesses.join("، "));
        }
        for directive in &analysis.prediction.recommendations {
            let _ = writeln!(output, "- Action: {directive}");
        }
        let _ = writeln!(output, "> {}", feedback.motivational_quote);
    }

    output
}
