use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Highest score a subject cell may carry.
pub const MAX_SCORE: f64 = 10.0;

/// Subject name to score, in the column order of the sheet.
pub type SubjectScores = IndexMap<String, f64>;

/// One decoded spreadsheet cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Date(NaiveDate),
}

impl Cell {
    pub fn text(value: impl Into<String>) -> Self {
        Cell::Text(value.into())
    }

    pub fn is_blank(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(value) => value.trim().is_empty(),
            Cell::Number(value) => !value.is_finite(),
            Cell::Date(_) => false,
        }
    }

    /// Trimmed textual form, `None` for blank cells. Whole numbers print
    /// without a fractional part so numeric ids survive the round trip.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Cell::Empty => None,
            Cell::Text(value) => {
                let trimmed = value.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            Cell::Number(value) if !value.is_finite() => None,
            Cell::Number(value) if value.fract() == 0.0 && value.abs() < 1e15 => {
                Some(format!("{}", *value as i64))
            }
            Cell::Number(value) => Some(value.to_string()),
            Cell::Date(date) => Some(date.format("%Y-%m-%d").to_string()),
        }
    }

    /// Numeric reading of the cell. Text accepts a decimal comma.
    pub fn as_number(&self) -> Option<f64> {
        let value = match self {
            Cell::Number(value) => *value,
            Cell::Text(value) => value.trim().replace(',', ".").parse::<f64>().ok()?,
            Cell::Empty | Cell::Date(_) => return None,
        };
        value.is_finite().then_some(value)
    }
}

/// A decoded sheet: rows of cells, 0-indexed.
pub type Grid = Vec<Vec<Cell>>;

pub fn cell_at(grid: &Grid, row: usize, col: usize) -> Option<&Cell> {
    grid.get(row).and_then(|cells| cells.get(col))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Subject {
    WrittenExpression,
    Reading,
    Dictation,
    Handwriting,
    ListeningSpeaking,
    WrittenExercises,
}

impl Subject {
    pub const ALL: [Subject; 6] = [
        Subject::WrittenExpression,
        Subject::Reading,
        Subject::Dictation,
        Subject::Handwriting,
        Subject::ListeningSpeaking,
        Subject::WrittenExercises,
    ];

    pub fn canonical_name(self) -> &'static str {
        match self {
            Subject::WrittenExpression => "التعبير الكتابي",
            Subject::Reading => "القراءة",
            Subject::Dictation => "الإملاء",
            Subject::Handwriting => "الخط",
            Subject::ListeningSpeaking => "الاستماع والتحدث",
            Subject::WrittenExercises => "تمارين كتابية",
        }
    }

    fn aliases(self) -> &'static [&'static str] {
        match self {
            Subject::WrittenExpression => &["written expression", "composition"],
            Subject::Reading => &["reading"],
            Subject::Dictation => &["dictation", "spelling"],
            Subject::Handwriting => &["handwriting", "calligraphy"],
            Subject::ListeningSpeaking => &["listening and speaking"],
            Subject::WrittenExercises => &["written exercises"],
        }
    }

    /// Resolves a sheet header to a canonical subject, tolerating hamza and
    /// spacing variants of the Arabic names and a few English aliases.
    pub fn from_name(name: &str) -> Option<Subject> {
        let wanted = normalize_subject(name);
        Subject::ALL.into_iter().find(|subject| {
            normalize_subject(subject.canonical_name()) == wanted
                || subject.aliases().iter().any(|alias| *alias == wanted)
        })
    }
}

fn collapse_whitespace(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn fold_alef(c: char) -> char {
    match c {
        'إ' | 'أ' | 'آ' => 'ا',
        other => other,
    }
}

fn normalize_subject(name: &str) -> String {
    collapse_whitespace(name)
        .to_lowercase()
        .chars()
        .map(fold_alef)
        .map(|c| if c == 'ة' { 'ه' } else { c })
        .collect()
}

/// Key under which a subject score is stored. Known subjects use their
/// canonical name; anything else keeps its spelling with whitespace collapsed
/// and hamza-carrying alefs folded, so both sittings compare equal.
pub fn subject_key(name: &str) -> String {
    match Subject::from_name(name) {
        Some(subject) => subject.canonical_name().to_string(),
        None => collapse_whitespace(name).chars().map(fold_alef).collect(),
    }
}

/// One student's scores for a single sitting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawExamRecord {
    pub external_id: String,
    pub student_number: Option<String>,
    pub name: String,
    pub date_of_birth: Option<String>,
    pub subject_scores: SubjectScores,
    pub average: f64,
}

impl RawExamRecord {
    pub fn new(
        external_id: impl Into<String>,
        student_number: Option<String>,
        name: impl Into<String>,
        date_of_birth: Option<String>,
        subject_scores: SubjectScores,
    ) -> Self {
        let subject_scores: SubjectScores = subject_scores
            .into_iter()
            .map(|(subject, score)| (subject_key(&subject), score.clamp(0.0, MAX_SCORE)))
            .collect();
        let average = mean(subject_scores.values().copied());
        Self {
            external_id: external_id.into(),
            student_number: student_number.filter(|value| !value.trim().is_empty()),
            name: name.into(),
            date_of_birth: date_of_birth.filter(|value| !value.trim().is_empty()),
            subject_scores,
            average,
        }
    }
}

/// A student reconciled across both sittings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedStudent {
    pub id: String,
    pub student_number: Option<String>,
    pub name: String,
    pub date_of_birth: Option<String>,
    pub exam1_scores: SubjectScores,
    pub exam2_scores: SubjectScores,
    pub exam1_average: f64,
    pub exam2_average: f64,
}

impl UnifiedStudent {
    pub fn has_exam1(&self) -> bool {
        !self.exam1_scores.is_empty()
    }

    pub fn has_exam2(&self) -> bool {
        !self.exam2_scores.is_empty()
    }

    /// Scores of the most recent sitting with data.
    pub fn current_scores(&self) -> &SubjectScores {
        if self.has_exam2() {
            &self.exam2_scores
        } else {
            &self.exam1_scores
        }
    }

    pub fn current_average(&self) -> f64 {
        if self.has_exam2() {
            self.exam2_average
        } else if self.has_exam1() {
            self.exam1_average
        } else {
            0.0
        }
    }

    /// Sort and identity key, stable across input order.
    pub fn identity_key(&self) -> (String, String) {
        (
            self.student_number.clone().unwrap_or_default(),
            self.id.clone(),
        )
    }
}

/// One exam administration for the cohort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sitting {
    First,
    Second,
}

impl std::fmt::Display for Sitting {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sitting::First => write!(f, "exam 1"),
            Sitting::Second => write!(f, "exam 2"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Improving,
    Stable,
    Declining,
}

impl Trend {
    pub fn label_ar(self) -> &'static str {
        match self {
            Trend::Improving => "متقدم",
            Trend::Stable => "مستقر",
            Trend::Declining => "متراجع",
        }
    }
}

/// Six-level grading scale shared by statistics, comments and badges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceLevel {
    Weak,
    Acceptable,
    FairlyGood,
    Good,
    VeryGood,
    Excellent,
}

impl PerformanceLevel {
    pub fn from_average(average: f64) -> Self {
        match average {
            a if a >= 9.0 => PerformanceLevel::Excellent,
            a if a >= 8.0 => PerformanceLevel::VeryGood,
            a if a >= 7.0 => PerformanceLevel::Good,
            a if a >= 6.0 => PerformanceLevel::FairlyGood,
            a if a >= 5.0 => PerformanceLevel::Acceptable,
            _ => PerformanceLevel::Weak,
        }
    }

    pub fn label_ar(self) -> &'static str {
        match self {
            PerformanceLevel::Excellent => "ممتاز",
            PerformanceLevel::VeryGood => "جيد جدا",
            PerformanceLevel::Good => "جيد",
            PerformanceLevel::FairlyGood => "مستحسن",
            PerformanceLevel::Acceptable => "مقبول",
            PerformanceLevel::Weak => "ضعيف",
        }
    }

    /// Position in the band tables, best level first.
    pub fn band_index(self) -> usize {
        match self {
            PerformanceLevel::Excellent => 0,
            PerformanceLevel::VeryGood => 1,
            PerformanceLevel::Good => 2,
            PerformanceLevel::FairlyGood => 3,
            PerformanceLevel::Acceptable => 4,
            PerformanceLevel::Weak => 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl RiskTier {
    pub fn label_ar(self) -> &'static str {
        match self {
            RiskTier::Low => "منخفض",
            RiskTier::Medium => "متوسط",
            RiskTier::High => "عالي",
        }
    }
}

pub fn mean(values: impl IntoIterator<Item = f64>) -> f64 {
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), value| (sum + value, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_ids_print_without_fraction() {
        assert_eq!(Cell::Number(14801803.0).as_text().as_deref(), Some("14801803"));
        assert_eq!(Cell::text("  R193014063 ").as_text().as_deref(), Some("R193014063"));
        assert_eq!(Cell::text("   ").as_text(), None);
    }

    #[test]
    fn text_scores_accept_decimal_comma() {
        assert_eq!(Cell::text("7,5").as_number(), Some(7.5));
        assert_eq!(Cell::text("abs").as_number(), None);
        assert_eq!(Cell::Empty.as_number(), None);
    }

    #[test]
    fn record_average_ignores_missing_subjects() {
        let mut scores = SubjectScores::new();
        scores.insert("math".to_string(), 6.0);
        scores.insert("read".to_string(), 8.0);
        let record = RawExamRecord::new("1", Some(String::new()), "Avery", None, scores);
        assert_eq!(record.average, 7.0);
        assert_eq!(record.student_number, None);
    }

    #[test]
    fn subject_keys_fold_spelling_variants() {
        assert_eq!(subject_key("الإستماع والتحدث"), "الاستماع والتحدث");
        assert_eq!(subject_key(" الاستماع   والتحدث"), "الاستماع والتحدث");
        assert_eq!(subject_key("Reading"), "القراءة");
        assert_eq!(subject_key("  الأنشطة  الفنية "), "الانشطة الفنية");
        assert_eq!(subject_key("math"), "math");
    }

    #[test]
    fn record_scores_are_keyed_by_subject() {
        let scores: SubjectScores = [("الإستماع والتحدث".to_string(), 12.0)].into_iter().collect();
        let record = RawExamRecord::new("1", None, "Avery", None, scores);
        assert_eq!(record.subject_scores.get("الاستماع والتحدث"), Some(&10.0));
    }

    #[test]
    fn levels_follow_six_thresholds() {
        assert_eq!(PerformanceLevel::from_average(9.0), PerformanceLevel::Excellent);
        assert_eq!(PerformanceLevel::from_average(8.2), PerformanceLevel::VeryGood);
        assert_eq!(PerformanceLevel::from_average(7.9), PerformanceLevel::Good);
        assert_eq!(PerformanceLevel::from_average(6.0), PerformanceLevel::FairlyGood);
        assert_eq!(PerformanceLevel::from_average(5.5), PerformanceLevel::Acceptable);
        assert_eq!(PerformanceLevel::from_average(4.0).label_ar(), "ضعيف");
    }

    #[test]
    fn risk_tiers_are_ordered() {
        assert!(RiskTier::Low < RiskTier::Medium);
        assert!(RiskTier::Medium < RiskTier::High);
    }
}
