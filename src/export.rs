use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use indexmap::IndexSet;

use crate::aggregate::StudentHighlight;
use crate::error::ExportError;
use crate::models::subject_key;
use crate::pipeline::AnalysisResult;

/// Spreadsheet tools need the byte order mark to pick UTF-8 for Arabic text.
const BOM: &str = "\u{feff}";

/// Fixed columns; one column per subject follows them.
pub const HEADERS: [&str; 15] = [
    "الرقم",
    "رقم الطالب",
    "الاسم",
    "تاريخ الميلاد",
    "معدل الفرض 1",
    "معدل الفرض 2",
    "المعدل العام",
    "التحسن",
    "النسبة المئوية للتحسن",
    "المستوى العام",
    "الترتيب",
    "التنبؤ للفرض القادم",
    "مستوى الخطر",
    "التقدير",
    "الملاحظات",
];

pub const STATISTICS_TITLE: &str = "إحصائيات الفصل";

#[derive(Debug, Clone, PartialEq)]
pub struct ExportRow {
    pub id: String,
    pub student_number: String,
    pub name: String,
    pub date_of_birth: String,
    pub exam1_average: String,
    pub exam2_average: String,
    pub overall_average: String,
    pub improvement: String,
    pub improvement_percentage: String,
    pub trend: &'static str,
    pub rank: usize,
    pub next_sitting_prediction: String,
    pub risk_tier: &'static str,
    pub performance_level: &'static str,
    pub comments: String,
    /// Current-sitting score per subject column, blank when not scored.
    pub subject_scores: Vec<String>,
}

impl ExportRow {
    fn record(&self) -> Vec<String> {
        let mut fields = vec![
            self.id.clone(),
            self.student_number.clone(),
            self.name.clone(),
            self.date_of_birth.clone(),
            self.exam1_average.clone(),
            self.exam2_average.clone(),
            self.overall_average.clone(),
            self.improvement.clone(),
            self.improvement_percentage.clone(),
            self.trend.to_string(),
            self.rank.to_string(),
            self.next_sitting_prediction.clone(),
            self.risk_tier.to_string(),
            self.performance_level.to_string(),
            self.comments.clone(),
        ];
        fields.extend(self.subject_scores.iter().cloned());
        fields
    }
}

/// Subject columns in first-seen order over the ranked students.
pub fn subject_columns(result: &AnalysisResult) -> Vec<String> {
    let mut subjects = IndexSet::new();
    for analysis in &result.students {
        for subject in analysis.student.current_scores().keys() {
            subjects.insert(subject_key(subject));
        }
    }
    subjects.into_iter().collect()
}

pub fn export_rows(result: &AnalysisResult) -> Vec<ExportRow> {
    let subjects = subject_columns(result);
    result
        .students
        .iter()
        .map(|analysis| {
            let student = &analysis.student;
            let scores = student.current_scores();
            let subject_scores = subjects
                .iter()
                .map(|subject| {
                    scores
                        .iter()
                        .find(|(name, _)| subject_key(name) == *subject)
                        .map(|(_, score)| format!("{score:.1}"))
                        .unwrap_or_default()
                })
                .collect();
            ExportRow {
                id: student.id.clone(),
                student_number: student.student_number.clone().unwrap_or_default(),
                name: student.name.clone(),
                date_of_birth: student.date_of_birth.clone().unwrap_or_default(),
                exam1_average: format!("{:.2}", student.exam1_average),
                exam2_average: format!("{:.2}", student.exam2_average),
                overall_average: format!("{:.2}", analysis.metrics.overall_average),
                improvement: format!("{:.2}", analysis.metrics.improvement),
                improvement_percentage: format!("{:.1}%", analysis.metrics.improvement_percentage),
                trend: analysis.metrics.trend.label_ar(),
                rank: analysis.rank,
                next_sitting_prediction: format!("{:.2}", analysis.prediction.next_sitting_prediction),
                risk_tier: analysis.prediction.risk_tier.label_ar(),
                performance_level: analysis.metrics.performance_level.label_ar(),
                comments: analysis.feedback.overall_comment.clone(),
                subject_scores,
            }
        })
        .collect()
}

/// Label and value pairs of the class statistics sheet.
pub fn statistics_rows(result: &AnalysisResult) -> Vec<(&'static str, String)> {
    let stats = &result.statistics;
    let name_of = |highlight: Option<&StudentHighlight>| {
        highlight.map_or_else(|| "-".to_string(), |highlight| highlight.name.clone())
    };
    let value_of = |highlight: Option<&StudentHighlight>| {
        highlight.map_or_else(|| "-".to_string(), |highlight| format!("{:.2}", highlight.value))
    };
    vec![
        ("المتوسط العام", format!("{:.2}", stats.mean)),
        ("أعلى طالب", name_of(stats.top_student.as_ref())),
        ("أعلى درجة", value_of(stats.top_student.as_ref())),
        ("أكثر طالب تحسنا", name_of(stats.most_improved.as_ref())),
        ("مقدار التحسن", value_of(stats.most_improved.as_ref())),
        ("عدد الناجحين", stats.pass_count.to_string()),
        ("نسبة النجاح", format!("{:.1}%", stats.pass_rate)),
        ("نسبة التحسن", format!("{:.1}%", stats.improvement_rate)),
        ("إجمالي عدد الطلاب", stats.total_students.to_string()),
    ]
}

pub fn write_csv<W: Write>(result: &AnalysisResult, mut out: W) -> Result<(), csv::Error> {
    out.write_all(BOM.as_bytes())?;
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(out);
    let mut header: Vec<String> = HEADERS.iter().map(|label| label.to_string()).collect();
    header.extend(subject_columns(result));
    writer.write_record(&header)?;
    for row in export_rows(result) {
        writer.write_record(row.record())?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_statistics_csv<W: Write>(result: &AnalysisResult, mut out: W) -> Result<(), csv::Error> {
    out.write_all(BOM.as_bytes())?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_writer(out);
    writer.write_record([STATISTICS_TITLE])?;
    for (label, value) in statistics_rows(result) {
        writer.write_record([label, value.as_str()])?;
    }
    writer.flush()?;
    Ok(())
}

fn write_file(
    path: &Path,
    write: impl FnOnce(BufWriter<File>) -> Result<(), csv::Error>,
) -> Result<(), ExportError> {
    let file = File::create(path).map_err(|source| ExportError::Create {
        path: path.to_path_buf(),
        source,
    })?;
    write(BufWriter::new(file)).map_err(|source| ExportError::Write {
        path: path.to_path_buf(),
        source,
    })
}

pub fn write_csv_file(result: &AnalysisResult, path: &Path) -> Result<usize, ExportError> {
    write_file(path, |out| write_csv(result, out))?;
    Ok(result.students.len())
}

pub fn write_statistics_file(result: &AnalysisResult, path: &Path) -> Result<(), ExportError> {
    write_file(path, |out| write_statistics_csv(result, out))
}
