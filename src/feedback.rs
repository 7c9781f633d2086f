use indexmap::IndexMap;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use tracing::debug;

use crate::aggregate::AggregatedStudent;
use crate::config::ScoringConfig;
use crate::models::{subject_key, PerformanceLevel, RiskTier, Subject};
use crate::risk::PredictionResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Band {
    pub comment: &'static str,
    pub advice: &'static str,
}

const fn band(comment: &'static str, advice: &'static str) -> Band {
    Band { comment, advice }
}

const GENERIC_BANDS: [Band; 6] = [
    band(
        "ممتاز في هذا المجال، مهارات متقدمة وفهم عميق.",
        "المحافظة على المستوى والانتقال إلى أنشطة إثرائية.",
    ),
    band(
        "جيد جدا، إتقان للمهارات الأساسية مع قدرة على التحليل.",
        "مواصلة التدريب لبلوغ مستوى التميز.",
    ),
    band(
        "مستوى جيد، مع هامش واضح للتقدم.",
        "مزيد من التطبيق العملي لترسيخ المكتسبات.",
    ),
    band(
        "مستوى مستحسن، يحتاج للمزيد من التدريب والتطبيق.",
        "تمارين منتظمة قصيرة مع تصحيح الأخطاء المتكررة.",
    ),
    band(
        "مستوى مقبول، يحتاج لتركيز أكثر على الأساسيات.",
        "مراجعة الأساسيات بانتظام مع متابعة من المعلم.",
    ),
    band(
        "يحتاج دعما إضافيا في هذا المجال، مراجعة شاملة للأساسيات مطلوبة.",
        "حصص دعم فردية وخطة علاجية قصيرة المدى.",
    ),
];

const WRITTEN_EXPRESSION_BANDS: [Band; 6] = [
    band(
        "تعبير كتابي متميز، أفكار مترابطة وأسلوب سليم.",
        "المشاركة في مسابقات الكتابة وتنويع أنواع النصوص.",
    ),
    band(
        "تعبير جيد جدا، أفكار واضحة مع بعض الهنات الأسلوبية.",
        "إثراء الرصيد اللغوي بالمطالعة المنتظمة.",
    ),
    band(
        "تعبير جيد، يحتاج إلى مزيد من التنظيم في عرض الأفكار.",
        "التدرب على تخطيط الفقرة قبل الكتابة.",
    ),
    band(
        "تعبير مستحسن، الأفكار حاضرة لكن الصياغة تحتاج صقلا.",
        "كتابة فقرة قصيرة أسبوعيا ومراجعتها مع المعلم.",
    ),
    band(
        "تعبير مقبول، صعوبة في ربط الأفكار.",
        "التدرب على أدوات الربط وبناء الجملة.",
    ),
    band(
        "صعوبات واضحة في التعبير الكتابي.",
        "تمارين موجهة لبناء الجمل البسيطة ثم الفقرة.",
    ),
];

const READING_BANDS: [Band; 6] = [
    band(
        "قراءة متميزة، طلاقة وفهم عميق للنصوص.",
        "تنويع المطالعة بقصص وكتب أعلى مستوى.",
    ),
    band(
        "قراءة جيدة جدا مع فهم سليم.",
        "القراءة الجهرية اليومية لتحسين الأداء التعبيري.",
    ),
    band(
        "قراءة جيدة، بعض التعثر في الكلمات الصعبة.",
        "تخصيص وقت يومي للقراءة بصوت مسموع.",
    ),
    band(
        "قراءة مستحسنة، الفهم جزئي أحيانا.",
        "طرح أسئلة فهم بعد كل نص مقروء.",
    ),
    band(
        "قراءة مقبولة، بطء وتعثر ملحوظ.",
        "قراءة نصوص قصيرة متدرجة الصعوبة مع ولي الأمر.",
    ),
    band(
        "صعوبات في فك الرموز وفهم المقروء.",
        "حصص دعم في القراءة وتمارين على المقاطع والحروف.",
    ),
];

const DICTATION_BANDS: [Band; 6] = [
    band(
        "إملاء متقن، كتابة سليمة خالية من الأخطاء تقريبا.",
        "الحفاظ على الدقة مع إملاءات أطول.",
    ),
    band(
        "إملاء جيد جدا، أخطاء نادرة.",
        "مراجعة القواعد الإملائية الدقيقة كالهمزات.",
    ),
    band(
        "إملاء جيد، بعض الأخطاء المتكررة.",
        "تدوين الأخطاء المتكررة وإعادة كتابتها.",
    ),
    band(
        "إملاء مستحسن، أخطاء في الهمزات والتاء.",
        "إملاءات قصيرة يومية مع تصحيح فوري.",
    ),
    band(
        "إملاء مقبول، أخطاء كثيرة تؤثر على المعنى.",
        "مراجعة القواعد الأساسية مع تمارين النسخ.",
    ),
    band(
        "صعوبات كبيرة في الإملاء.",
        "برنامج علاجي في الإملاء يبدأ بالنسخ ثم الإملاء المنظور.",
    ),
];

const HANDWRITING_BANDS: [Band; 6] = [
    band(
        "خط جميل ومنظم.",
        "الاستمرار في العناية بالخط وتجربة الخطوط الفنية.",
    ),
    band("خط جيد جدا وواضح.", "الانتباه لتناسق أحجام الحروف."),
    band(
        "خط جيد يحتاج مزيدا من التنظيم.",
        "التدرب على الكتابة على السطر باحترام المسافات.",
    ),
    band(
        "خط مستحسن مع بعض عدم الانتظام.",
        "كراسة تدريب على الخط بمعدل صفحة يوميا.",
    ),
    band(
        "خط مقبول يصعب قراءته أحيانا.",
        "التدرب على رسم الحروف منفصلة ثم متصلة.",
    ),
    band(
        "خط غير واضح يحتاج عناية خاصة.",
        "تمارين يومية على مسك القلم ورسم الحروف.",
    ),
];

const LISTENING_SPEAKING_BANDS: [Band; 6] = [
    band(
        "تواصل شفهي متميز وإصغاء جيد.",
        "تكليفه بتقديم عروض شفهية أمام القسم.",
    ),
    band(
        "مهارات استماع وتحدث جيدة جدا.",
        "تشجيعه على المشاركة في النقاشات.",
    ),
    band(
        "مشاركة شفهية جيدة مع بعض التردد.",
        "إتاحة فرص أكثر للتحدث داخل القسم.",
    ),
    band(
        "مستوى مستحسن، مشاركة محدودة.",
        "أنشطة الحوار في مجموعات صغيرة.",
    ),
    band(
        "مستوى مقبول، صعوبة في التعبير الشفهي.",
        "تمارين إعادة الحكي وتلخيص ما يسمعه.",
    ),
    band(
        "ضعف في الاستماع والتحدث.",
        "أنشطة استماع موجهة وتشجيع مستمر على الكلام.",
    ),
];

const WRITTEN_EXERCISES_BANDS: [Band; 6] = [
    band(
        "إنجاز متميز للتمارين الكتابية.",
        "تمارين إضافية ذات طابع تحد.",
    ),
    band(
        "إنجاز جيد جدا ودقيق.",
        "الحرص على المراجعة قبل التسليم.",
    ),
    band(
        "إنجاز جيد مع أخطاء بسيطة.",
        "التدقيق في التعليمات قبل الإجابة.",
    ),
    band(
        "إنجاز مستحسن، بعض التمارين غير مكتملة.",
        "تنظيم وقت إنجاز الواجبات المنزلية.",
    ),
    band(
        "إنجاز مقبول، أخطاء متكررة.",
        "تمارين تطبيقية إضافية مع تصحيح موجه.",
    ),
    band(
        "صعوبات في إنجاز التمارين الكتابية.",
        "مرافقة فردية أثناء إنجاز التمارين.",
    ),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentTable {
    Subject(Subject),
    Generic,
}

impl CommentTable {
    pub fn for_name(name: &str) -> Self {
        match Subject::from_name(name) {
            Some(subject) => CommentTable::Subject(subject),
            None => CommentTable::Generic,
        }
    }

    pub fn bands(self) -> &'static [Band; 6] {
        match self {
            CommentTable::Subject(Subject::WrittenExpression) => &WRITTEN_EXPRESSION_BANDS,
            CommentTable::Subject(Subject::Reading) => &READING_BANDS,
            CommentTable::Subject(Subject::Dictation) => &DICTATION_BANDS,
            CommentTable::Subject(Subject::Handwriting) => &HANDWRITING_BANDS,
            CommentTable::Subject(Subject::ListeningSpeaking) => &LISTENING_SPEAKING_BANDS,
            CommentTable::Subject(Subject::WrittenExercises) => &WRITTEN_EXERCISES_BANDS,
            CommentTable::Generic => &GENERIC_BANDS,
        }
    }

    pub fn band_for(self, score: f64) -> Band {
        self.bands()[PerformanceLevel::from_average(score).band_index()]
    }
}

/// Six-way banding of a score delta between sittings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImprovementBand {
    StrongGain,
    Gain,
    SlightGain,
    Steady,
    Decline,
    SharpDecline,
}

impl ImprovementBand {
    pub fn from_delta(delta: f64) -> Self {
        if delta > 1.5 {
            ImprovementBand::StrongGain
        } else if delta > 0.5 {
            ImprovementBand::Gain
        } else if delta > 0.0 {
            ImprovementBand::SlightGain
        } else if delta > -0.5 {
            ImprovementBand::Steady
        } else if delta > -1.5 {
            ImprovementBand::Decline
        } else {
            ImprovementBand::SharpDecline
        }
    }

    fn subject_clause(self) -> &'static str {
        match self {
            ImprovementBand::StrongGain => "تقدم كبير مقارنة بالفرض الأول",
            ImprovementBand::Gain => "تقدم ملحوظ مقارنة بالفرض الأول",
            ImprovementBand::SlightGain => "تقدم طفيف",
            ImprovementBand::Steady => "مستوى مستقر",
            ImprovementBand::Decline => "تراجع طفيف",
            ImprovementBand::SharpDecline => "تراجع واضح يستدعي الانتباه",
        }
    }

    fn advice(self) -> &'static str {
        match self {
            ImprovementBand::StrongGain => {
                "تحسن ممتاز! استمر في هذا النهج فالتقدم واضح ويجب الحفاظ عليه."
            }
            ImprovementBand::Gain => {
                "هناك تحسن ملحوظ، يمكنك تحقيق أفضل من خلال تنظيم وقت المذاكرة والتركيز على نقاط الضعف."
            }
            ImprovementBand::SlightGain => "تحسن طفيف، واصل العمل بانتظام لتثبيت هذا التقدم.",
            ImprovementBand::Steady => {
                "المستوى ثابت، يمكنك التحسن من خلال التركيز على نقاط الضعف وزيادة ساعات المذاكرة."
            }
            ImprovementBand::Decline => {
                "هناك تراجع بسيط، يجب مراجعة طريقة المذاكرة والتركيز على المواد الضعيفة."
            }
            ImprovementBand::SharpDecline => {
                "تراجع واضح في المستوى، يجب مراجعة شاملة لطريقة الدراسة والاستعانة بدروس تقوية إذا لزم الأمر."
            }
        }
    }

    fn guardian_guidance(self) -> &'static str {
        match self {
            ImprovementBand::StrongGain => {
                "الاستمرار في التشجيع والدعم سيكون له أثر إيجابي كبير على تحصيل التلميذ."
            }
            ImprovementBand::Gain => {
                "المتابعة اليومية وتشجيع التلميذ على المشاركة ستساعد في تحسين النتائج بشكل أكبر."
            }
            ImprovementBand::SlightGain => "تثمين الجهد المبذول ومتابعة الواجبات بانتظام.",
            ImprovementBand::Steady => {
                "التشجيع على المشاركة في القسم وتوفير بيئة مناسبة للدراسة سيساعد في التحسن."
            }
            ImprovementBand::Decline => {
                "يحتاج إلى متابعة أقوى وتحديد أسباب التراجع ومعالجتها مع المعلم."
            }
            ImprovementBand::SharpDecline => {
                "يحتاج إلى برنامج متابعة مكثف ودروس تقوية فردية واجتماع مع المرشد التربوي."
            }
        }
    }
}

const SINGLE_SITTING_ADVICE: &str =
    "لا تتوفر نتائج الفرضين معا للمقارنة، يوصى بالمتابعة المنتظمة حتى الفرض القادم.";
const SINGLE_SITTING_GUIDANCE: &str =
    "متابعة نتائج التلميذ في الفرض القادم لتحديد اتجاه المستوى.";

fn overall_comment(level: PerformanceLevel) -> &'static str {
    match level {
        PerformanceLevel::Excellent => "أداء متميز! تلميذ متفوق يظهر فهما عميقا للمواد.",
        PerformanceLevel::VeryGood => "أداء جيد جدا، تفوق ملحوظ في أغلب المواد.",
        PerformanceLevel::Good => "أداء جيد، مع إمكانية واضحة لبلوغ مستوى أعلى.",
        PerformanceLevel::FairlyGood => "أداء مستحسن، لكن هناك مساحة للتحسين في بعض المواد.",
        PerformanceLevel::Acceptable => "أداء مقبول، يحتاج إلى مزيد من الجهد والمتابعة.",
        PerformanceLevel::Weak => "يحتاج إلى دعم إضافي ومتابعة مستمرة لتحسين المستوى.",
    }
}

fn risk_clause(tier: RiskTier) -> Option<&'static str> {
    match tier {
        RiskTier::High => Some("يوصى بلقاء عاجل مع الأستاذ لوضع خطة دعم."),
        RiskTier::Medium => Some("يوصى بمتابعة أسبوعية للنتائج."),
        RiskTier::Low => None,
    }
}

pub const MOTIVATIONAL_QUOTES: [&str; 7] = [
    "النجاح هو مجموع الجهود الصغيرة المتكررة يوميا.",
    "التعليم هو أقوى سلاح يمكنك استخدامه لتغيير العالم.",
    "لا تتوقع نتائج مختلفة إذا واصلت فعل الأشياء نفسها.",
    "التميز ليس مهارة، بل عادة.",
    "العقل ليس وعاء يجب أن نملأه، بل نار يجب أن نوقظها.",
    "المعرفة قوة، والتعلم هو الوسيلة لاكتساب هذه القوة.",
    "لا تيأس، فعادة ما يكون اليأس هو آخر مفتاح في سلسلة المفاتيح التي تفتح الأبواب.",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectFeedback {
    pub score: f64,
    pub table: CommentTable,
    pub comment: String,
    pub advice: String,
    pub trend: Option<ImprovementBand>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedbackBundle {
    pub performance_level: PerformanceLevel,
    pub overall_comment: String,
    pub improvement_advice: String,
    pub guardian_guidance: String,
    pub subjects: IndexMap<String, SubjectFeedback>,
    /// Subject names that matched no known subject and used the generic table.
    pub generic_subjects: Vec<String>,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub motivational_quote: String,
}

pub fn subject_feedback(name: &str, score: f64, previous: Option<f64>) -> SubjectFeedback {
    let table = CommentTable::for_name(name);
    let band = table.band_for(score);
    let trend = previous.map(|previous| ImprovementBand::from_delta(score - previous));
    let comment = match trend {
        Some(trend) => format!("{} ({})", band.comment, trend.subject_clause()),
        None => band.comment.to_string(),
    };
    SubjectFeedback {
        score,
        table,
        comment,
        advice: band.advice.to_string(),
        trend,
    }
}

pub fn generate<R: Rng + ?Sized>(
    entry: &AggregatedStudent,
    prediction: &PredictionResult,
    config: &ScoringConfig,
    rng: &mut R,
) -> FeedbackBundle {
    let student = &entry.student;
    let metrics = &entry.metrics;
    let both = student.has_exam1() && student.has_exam2();

    let (improvement_advice, mut guardian_guidance) = if both {
        let band = ImprovementBand::from_delta(metrics.improvement);
        (band.advice().to_string(), band.guardian_guidance().to_string())
    } else {
        (
            SINGLE_SITTING_ADVICE.to_string(),
            SINGLE_SITTING_GUIDANCE.to_string(),
        )
    };
    if let Some(clause) = risk_clause(prediction.risk_tier) {
        guardian_guidance.push(' ');
        guardian_guidance.push_str(clause);
    }

    let scores = student.current_scores();
    let exam1_by_key: IndexMap<String, f64> = student
        .exam1_scores
        .iter()
        .map(|(name, score)| (subject_key(name), *score))
        .collect();
    let mut subjects = IndexMap::new();
    let mut generic_subjects = Vec::new();
    for (name, score) in scores {
        let previous = if student.has_exam2() {
            exam1_by_key.get(&subject_key(name)).copied()
        } else {
            None
        };
        let feedback = subject_feedback(name, *score, previous);
        if feedback.table == CommentTable::Generic {
            debug!(subject = %name, "No comment table for subject; using generic table");
            generic_subjects.push(name.clone());
        }
        subjects.insert(name.clone(), feedback);
    }

    let cap = config.feedback.list_cap;
    let strengths = scores
        .iter()
        .filter(|(_, score)| **score >= config.prediction.strong_subject_score)
        .map(|(name, _)| name.clone())
        .take(cap)
        .collect();
    let weaknesses = scores
        .iter()
        .filter(|(_, score)| **score < config.prediction.weak_subject_score)
        .map(|(name, _)| name.clone())
        .take(cap)
        .collect();

    let motivational_quote = MOTIVATIONAL_QUOTES
        .choose(rng)
        .map(|quote| quote.to_string())
        .unwrap_or_default();

    FeedbackBundle {
        performance_level: metrics.performance_level,
        overall_comment: overall_comment(metrics.performance_level).to_string(),
        improvement_advice,
        guardian_guidance,
        subjects,
        generic_subjects,
        strengths,
        weaknesses,
        motivational_quote,
    }
}
