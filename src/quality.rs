use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::corpus::{
    file_sha256, load_corpus, write_json_atomic, StepId, TrainingExample, REQUIRED_STEP_FIELDS,
};
use crate::error::{CorpusError, CorpusResult};
use crate::progress::ConsoleProgress;

/// Domain vocabulary whose presence in questions is counted for coverage.
pub const BI_TERMS: [&str; 37] = [
    "publishers", "advertisers", "bidders", "campaigns", "users", "customers",
    "viewers", "clicks", "revenue", "spend", "cost", "budget", "websites",
    "apps", "channels", "sites", "visitors", "audience", "ads", "creatives",
    "placements", "impressions", "conversions", "requests", "bids", "locations",
    "regions", "markets", "territories", "videos", "content", "activities",
    "events", "managers", "leaders", "operators", "controllers",
];

/// Generic vocabulary that should not survive conversion.
pub const LEGACY_TERMS: [&str; 11] = [
    "departments", "employees", "students", "schools", "companies",
    "customers", "films", "movies", "books", "sports", "games",
];

/// Keyword patterns counted over lower-cased questions. A question can match several.
pub const QUESTION_PATTERNS: &[(&str, &[&str])] = &[
    ("how_many", &["how many"]),
    ("list", &["list"]),
    ("what_are", &["what are"]),
    ("compare", &["compare", "versus", "vs"]),
    ("top", &["top"]),
    ("bottom", &["bottom", "lowest"]),
    ("average", &["average"]),
    ("maximum", &["maximum", "highest"]),
    ("minimum", &["minimum", "lowest"]),
    ("trend", &["trend", "change"]),
    ("percentage", &["percentage", "%"]),
    ("which", &["which"]),
    ("show", &["show"]),
    ("find", &["find"]),
    ("return", &["return"]),
];

const MOST_COMMON_LIMIT: usize = 10;
const STALE_TERM_PROBE: &str = "departments";

#[derive(Clone, Debug, Serialize)]
pub struct AnalysisReport {
    pub total_examples: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corpus_sha256: Option<String>,
    pub complexity_distribution: ComplexityDistribution,
    pub bi_terms_coverage: TermCoverage,
    pub question_patterns: BTreeMap<String, usize>,
    pub output_quality: OutputQuality,
    pub issues: Vec<String>,
    pub quality_score: QualityScore,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct ComplexityDistribution {
    pub simple_questions: usize,
    pub complex_questions: usize,
    pub multi_step_questions: usize,
    pub three_step_questions: usize,
    pub complexity_ratio: f64,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct TermCoverage {
    pub total_bi_terms_used: usize,
    pub most_common_terms: Vec<(String, usize)>,
    pub terms_with_zero_usage: Vec<String>,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct OutputQuality {
    pub valid_outputs: usize,
    pub output_issues: Vec<String>,
    pub validity_rate: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Grade {
    Excellent,
    Good,
    NeedsWork,
}

impl Grade {
    pub fn from_score(score: u32) -> Self {
        if score >= 80 {
            Self::Excellent
        } else if score >= 60 {
            Self::Good
        } else {
            Self::NeedsWork
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Excellent => "EXCELLENT - ready for training",
            Self::Good => "GOOD - minor improvements needed",
            Self::NeedsWork => "NEEDS WORK - significant improvements required",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ScoreComponents {
    pub volume: u32,
    pub complexity: u32,
    pub coverage: u32,
    pub validity: u32,
    pub issues: u32,
}

impl ScoreComponents {
    pub fn total(&self) -> u32 {
        self.volume + self.complexity + self.coverage + self.validity + self.issues
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct QualityScore {
    pub score: u32,
    pub max_score: u32,
    pub grade: Grade,
    pub components: ScoreComponents,
}

/// Bucket table for the 0-100 quality score. Each list is scanned in order and the first
/// matching tier wins.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ScoreThresholds {
    /// `(minimum example count, points)`; below every tier scores 0.
    pub volume_min: Vec<(usize, u32)>,
    /// `(low, high, points)` inclusive ratio bands.
    pub complexity_bands: Vec<(f64, f64, u32)>,
    pub complexity_outside: u32,
    /// `(minimum distinct terms, points)`; below every tier scores 0.
    pub coverage_min: Vec<(usize, u32)>,
    /// `(minimum validity rate, points)`; below every tier scores 0.
    pub validity_min: Vec<(f64, u32)>,
    /// `(maximum issue count, points)`.
    pub issues_max: Vec<(usize, u32)>,
    pub issues_over: u32,
}

impl Default for ScoreThresholds {
    fn default() -> Self {
        Self {
            volume_min: vec![(7000, 20), (5000, 15), (3000, 10)],
            complexity_bands: vec![(0.3, 0.7, 20), (0.2, 0.8, 15)],
            complexity_outside: 10,
            coverage_min: vec![(20, 20), (15, 15), (10, 10)],
            validity_min: vec![(0.95, 20), (0.90, 15), (0.80, 10)],
            issues_max: vec![(0, 20), (10, 15), (50, 10)],
            issues_over: 5,
        }
    }
}

impl ScoreThresholds {
    pub fn score(
        &self,
        total_examples: usize,
        complexity_ratio: f64,
        terms_used: usize,
        validity_rate: f64,
        issue_count: usize,
    ) -> QualityScore {
        let components = ScoreComponents {
            volume: first_at_least(&self.volume_min, total_examples),
            complexity: self
                .complexity_bands
                .iter()
                .find(|(lo, hi, _)| *lo <= complexity_ratio && complexity_ratio <= *hi)
                .map(|(_, _, pts)| *pts)
                .unwrap_or(self.complexity_outside),
            coverage: first_at_least(&self.coverage_min, terms_used),
            validity: self
                .validity_min
                .iter()
                .find(|(min, _)| validity_rate >= *min)
                .map(|(_, pts)| *pts)
                .unwrap_or(0),
            issues: self
                .issues_max
                .iter()
                .find(|(max, _)| issue_count <= *max)
                .map(|(_, pts)| *pts)
                .unwrap_or(self.issues_over),
        };
        let score = components.total();
        QualityScore {
            score,
            max_score: 100,
            grade: Grade::from_score(score),
            components,
        }
    }
}

fn first_at_least(tiers: &[(usize, u32)], value: usize) -> u32 {
    tiers
        .iter()
        .find(|(min, _)| value >= *min)
        .map(|(_, pts)| *pts)
        .unwrap_or(0)
}

/// Read-only statistics over a converted corpus.
#[derive(Clone, Debug)]
pub struct QualityAnalyzer {
    pub bi_terms: Vec<String>,
    pub legacy_terms: Vec<String>,
    pub thresholds: ScoreThresholds,
}

impl Default for QualityAnalyzer {
    fn default() -> Self {
        Self {
            bi_terms: BI_TERMS.iter().map(|s| s.to_string()).collect(),
            legacy_terms: LEGACY_TERMS.iter().map(|s| s.to_string()).collect(),
            thresholds: ScoreThresholds::default(),
        }
    }
}

impl QualityAnalyzer {
    pub fn analyze(&self, examples: &[TrainingExample]) -> CorpusResult<AnalysisReport> {
        let total = examples.len();
        if total == 0 {
            return Err(CorpusError::config(
                "corpus is empty; ratios are undefined for zero examples",
            ));
        }
        let questions: Vec<String> = examples.iter().map(|e| e.input.to_lowercase()).collect();

        let complexity_distribution = complexity_distribution(examples);
        let bi_terms_coverage = self.term_coverage(&questions);
        let question_patterns = pattern_counts(&questions);
        let output_quality = output_quality(examples);
        let issues = self.terminology_issues(examples, &questions);

        let quality_score = self.thresholds.score(
            total,
            complexity_distribution.complexity_ratio,
            bi_terms_coverage.total_bi_terms_used,
            output_quality.validity_rate,
            issues.len(),
        );

        Ok(AnalysisReport {
            total_examples: total,
            corpus_sha256: None,
            complexity_distribution,
            bi_terms_coverage,
            question_patterns,
            output_quality,
            issues,
            quality_score,
        })
    }

    /// Analyze the corpus at `input`, write the JSON report to `report_path` and return it.
    pub fn run(
        &self,
        input: &Path,
        report_path: &Path,
        progress: &ConsoleProgress,
    ) -> anyhow::Result<AnalysisReport> {
        progress.info(format!("Load corpus: {}", input.display()));
        let examples = load_corpus(input)?;
        progress.info(format!("Analyzing {} examples", examples.len()));
        let mut report = self.analyze(&examples)?;
        report.corpus_sha256 = Some(file_sha256(input)?);
        write_json_atomic(report_path, &report)?;
        progress.info(format!("Report written: {}", report_path.display()));
        Ok(report)
    }

    fn term_coverage(&self, questions: &[String]) -> TermCoverage {
        let mut counts: Vec<(String, usize)> = self
            .bi_terms
            .iter()
            .map(|term| {
                let term_lower = term.to_lowercase();
                let n = questions.iter().filter(|q| q.contains(&term_lower)).count();
                (term.clone(), n)
            })
            .collect();
        let total_bi_terms_used = counts.iter().filter(|(_, n)| *n > 0).count();
        let terms_with_zero_usage = counts
            .iter()
            .filter(|(_, n)| *n == 0)
            .map(|(t, _)| t.clone())
            .collect();
        // stable: ties keep term-list order
        counts.sort_by(|a, b| b.1.cmp(&a.1));
        let most_common_terms = counts
            .into_iter()
            .filter(|(_, n)| *n > 0)
            .take(MOST_COMMON_LIMIT)
            .collect();
        TermCoverage {
            total_bi_terms_used,
            most_common_terms,
            terms_with_zero_usage,
        }
    }

    fn terminology_issues(
        &self,
        examples: &[TrainingExample],
        questions: &[String],
    ) -> Vec<String> {
        let mut issues = Vec::new();
        for q in questions {
            if let Some(term) = self
                .legacy_terms
                .iter()
                .find(|t| q.contains(&t.to_lowercase()))
            {
                issues.push(format!("Non-BI term found: '{term}' in question"));
            }
        }
        let serialized = serde_json::to_string(examples)
            .unwrap_or_default()
            .to_lowercase();
        if serialized.contains(STALE_TERM_PROBE) {
            issues.push(format!(
                "Inconsistent terminology: '{STALE_TERM_PROBE}' still present in outputs"
            ));
        }
        issues
    }
}

/// Classify each example by the highest step it reaches.
fn complexity_distribution(examples: &[TrainingExample]) -> ComplexityDistribution {
    let mut dist = ComplexityDistribution::default();
    for ex in examples {
        let deepest = ex
            .output
            .get("discovery_results")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|step| step.get("step_id").and_then(Value::as_str))
            .filter_map(StepId::parse)
            .max();
        match deepest {
            Some(StepId::Step1) => dist.simple_questions += 1,
            Some(StepId::Step2) => dist.multi_step_questions += 1,
            Some(StepId::Step3) => dist.three_step_questions += 1,
            None => {}
        }
    }
    dist.complex_questions = dist.multi_step_questions + dist.three_step_questions;
    dist.complexity_ratio = dist.complex_questions as f64 / examples.len().max(1) as f64;
    dist
}

fn pattern_counts(questions: &[String]) -> BTreeMap<String, usize> {
    QUESTION_PATTERNS
        .iter()
        .map(|(name, keywords)| {
            let n = questions
                .iter()
                .filter(|q| keywords.iter().any(|k| q.contains(k)))
                .count();
            (name.to_string(), n)
        })
        .collect()
}

/// Top-level validity and per-step field issues are independent: an example that has
/// both `intent` and `discovery_results` counts as valid even when its steps are
/// missing fields, and each missing field is still reported.
fn output_quality(examples: &[TrainingExample]) -> OutputQuality {
    let mut output_issues = Vec::new();
    let mut valid_outputs = 0usize;
    for (i, ex) in examples.iter().enumerate() {
        let out = &ex.output;
        if out.get("intent").is_none() {
            output_issues.push(format!("Example {i}: Missing intent field"));
            continue;
        }
        let Some(results) = out.get("discovery_results") else {
            output_issues.push(format!("Example {i}: Missing discovery_results"));
            continue;
        };
        match results.as_array() {
            Some(steps) => {
                for (j, step) in steps.iter().enumerate() {
                    for field in REQUIRED_STEP_FIELDS {
                        if step.get(field).is_none() {
                            output_issues.push(format!("Example {i}, Result {j}: Missing {field}"));
                        }
                    }
                }
            }
            None => output_issues.push(format!("Example {i}: discovery_results is not a list")),
        }
        valid_outputs += 1;
    }
    OutputQuality {
        valid_outputs,
        output_issues,
        validity_rate: valid_outputs as f64 / examples.len().max(1) as f64,
    }
}

/// Human-readable rendering of a report, in the order an operator reads it.
pub fn render_report(report: &AnalysisReport) -> String {
    let total = report.total_examples.max(1) as f64;
    let pct = |x: f64| format!("{:.1}%", x * 100.0);
    let mut out = String::new();
    out.push_str("BI TRAINING DATA ANALYSIS REPORT\n");
    out.push_str(&"=".repeat(64));
    out.push('\n');

    out.push_str("\nOVERALL STATISTICS:\n");
    out.push_str(&format!("  Total examples: {}\n", report.total_examples));
    out.push_str(&format!("  Valid outputs: {}\n", report.output_quality.valid_outputs));
    out.push_str(&format!(
        "  Validity rate: {}\n",
        pct(report.output_quality.validity_rate)
    ));
    if let Some(sha) = report.corpus_sha256.as_deref() {
        out.push_str(&format!("  Corpus sha256: {sha}\n"));
    }

    let c = &report.complexity_distribution;
    out.push_str("\nCOMPLEXITY DISTRIBUTION:\n");
    out.push_str(&format!(
        "  Simple questions: {} ({})\n",
        c.simple_questions,
        pct(c.simple_questions as f64 / total)
    ));
    out.push_str(&format!(
        "  Complex questions: {} ({})\n",
        c.complex_questions,
        pct(c.complex_questions as f64 / total)
    ));
    out.push_str(&format!("  Multi-step questions: {}\n", c.multi_step_questions));
    out.push_str(&format!("  Three-step questions: {}\n", c.three_step_questions));
    out.push_str(&format!("  Complexity ratio: {}\n", pct(c.complexity_ratio)));

    let t = &report.bi_terms_coverage;
    out.push_str("\nBI TERMS COVERAGE:\n");
    out.push_str(&format!("  BI terms used: {}\n", t.total_bi_terms_used));
    out.push_str("  Most common terms:\n");
    for (term, n) in t.most_common_terms.iter().take(5) {
        out.push_str(&format!("    {term}: {n} times\n"));
    }
    if !t.terms_with_zero_usage.is_empty() {
        out.push_str(&format!(
            "  Terms with zero usage: {}\n",
            t.terms_with_zero_usage.len()
        ));
    }

    out.push_str("\nQUESTION PATTERNS:\n");
    let mut patterns: Vec<(&str, usize)> = QUESTION_PATTERNS
        .iter()
        .filter_map(|(name, _)| {
            report
                .question_patterns
                .get(*name)
                .copied()
                .filter(|n| *n > 0)
                .map(|n| (*name, n))
        })
        .collect();
    patterns.sort_by(|a, b| b.1.cmp(&a.1));
    for (name, n) in patterns.iter().take(10) {
        out.push_str(&format!("  {name}: {n} ({})\n", pct(*n as f64 / total)));
    }

    let q = &report.output_quality;
    out.push_str("\nOUTPUT QUALITY:\n");
    out.push_str(&format!("  Valid outputs: {}\n", q.valid_outputs));
    out.push_str(&format!("  Validity rate: {}\n", pct(q.validity_rate)));
    if !q.output_issues.is_empty() {
        out.push_str(&format!("  Issues found: {}\n", q.output_issues.len()));
        for issue in q.output_issues.iter().take(5) {
            out.push_str(&format!("    - {issue}\n"));
        }
        if q.output_issues.len() > 5 {
            out.push_str(&format!("    ... and {} more\n", q.output_issues.len() - 5));
        }
    }

    out.push_str("\nISSUES IDENTIFIED:\n");
    if report.issues.is_empty() {
        out.push_str("  No major issues found\n");
    } else {
        let mut seen: HashSet<&str> = HashSet::new();
        let unique: Vec<&str> = report
            .issues
            .iter()
            .map(String::as_str)
            .filter(|s| seen.insert(s))
            .collect();
        for issue in unique.iter().take(10) {
            out.push_str(&format!("  - {issue}\n"));
        }
        if unique.len() > 10 {
            out.push_str(&format!("  ... and {} more\n", unique.len() - 10));
        }
    }

    let s = &report.quality_score;
    out.push_str("\nQUALITY SCORE:\n");
    out.push_str(&format!(
        "  Overall quality score: {}/{} ({})\n",
        s.score,
        s.max_score,
        pct(s.score as f64 / s.max_score.max(1) as f64)
    ));
    out.push_str(&format!(
        "  volume={} complexity={} coverage={} validity={} issues={}\n",
        s.components.volume,
        s.components.complexity,
        s.components.coverage,
        s.components.validity,
        s.components.issues
    ));
    out.push_str(&format!("  {}\n", s.grade.label()));
    out
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn full_step(step_id: &str) -> Value {
        json!({
            "step_id": step_id,
            "sub_question": "q",
            "measures": [],
            "dimensions": [],
            "timegrain": null,
            "timeframe": null,
            "pattern": null,
            "segments": [],
            "breakdowns": [],
            "unmatched_intents": []
        })
    }

    fn example(question: &str, steps: Vec<Value>) -> TrainingExample {
        TrainingExample::new(
            question,
            json!({"intent": "intents_discovery", "discovery_results": steps}),
        )
    }

    #[test]
    fn empty_corpus_is_a_configuration_error() {
        let err = QualityAnalyzer::default().analyze(&[]).unwrap_err();
        assert!(matches!(err, CorpusError::Configuration(_)));
    }

    #[test]
    fn missing_sub_field_still_counts_as_valid() {
        let mut partial = full_step("step_1");
        partial.as_object_mut().expect("obj").remove("dimensions");
        let corpus = vec![
            example("How many ads?", vec![full_step("step_1")]),
            example("How many users?", vec![partial]),
        ];
        let report = QualityAnalyzer::default().analyze(&corpus).expect("report");
        assert_eq!(report.output_quality.valid_outputs, 2);
        assert_eq!(
            report.output_quality.output_issues,
            vec!["Example 1, Result 0: Missing dimensions".to_string()]
        );
        assert_eq!(report.output_quality.validity_rate, 1.0);
    }

    #[test]
    fn missing_top_level_keys_are_invalid() {
        let corpus = vec![
            TrainingExample::new("q", json!({"discovery_results": []})),
            TrainingExample::new("q", json!({"intent": "x"})),
            TrainingExample::new("q", json!("not an object")),
            example("q", vec![]),
        ];
        let report = QualityAnalyzer::default().analyze(&corpus).expect("report");
        assert_eq!(report.output_quality.valid_outputs, 1);
        assert_eq!(report.output_quality.validity_rate, 0.25);
        assert_eq!(
            report.output_quality.output_issues,
            vec![
                "Example 0: Missing intent field".to_string(),
                "Example 1: Missing discovery_results".to_string(),
                "Example 2: Missing intent field".to_string(),
            ]
        );
    }

    #[test]
    fn half_complex_corpus_lands_in_the_top_band() {
        let corpus = vec![
            example("a", vec![full_step("step_1")]),
            example("b", vec![full_step("step_1")]),
            example("c", vec![full_step("step_1"), full_step("step_2")]),
            example("d", vec![full_step("step_1"), full_step("step_2")]),
        ];
        let report = QualityAnalyzer::default().analyze(&corpus).expect("report");
        let c = &report.complexity_distribution;
        assert_eq!(c.simple_questions, 2);
        assert_eq!(c.multi_step_questions, 2);
        assert_eq!(c.complexity_ratio, 0.5);
        assert_eq!(report.quality_score.components.complexity, 20);
    }

    #[test]
    fn three_step_examples_count_once() {
        let corpus = vec![example(
            "a",
            vec![full_step("step_1"), full_step("step_2"), full_step("step_3")],
        )];
        let c = QualityAnalyzer::default()
            .analyze(&corpus)
            .expect("report")
            .complexity_distribution;
        assert_eq!(c.three_step_questions, 1);
        assert_eq!(c.multi_step_questions, 0);
        assert_eq!(c.complex_questions, 1);
        assert_eq!(c.complexity_ratio, 1.0);
    }

    #[test]
    fn coverage_uses_substring_containment() {
        let corpus = vec![
            example("Which ADS ran on publishers sites?", vec![]),
            example("total spending", vec![]),
        ];
        let cov = QualityAnalyzer::default()
            .analyze(&corpus)
            .expect("report")
            .bi_terms_coverage;
        // "ads", "publishers", "sites", and "spend" inside "spending"
        assert_eq!(cov.total_bi_terms_used, 4);
        assert_eq!(cov.most_common_terms[0], ("publishers".to_string(), 1));
        assert_eq!(cov.terms_with_zero_usage.len(), 33);
    }

    #[test]
    fn patterns_are_not_mutually_exclusive() {
        let corpus = vec![example("Show the lowest revenue vs last year", vec![])];
        let p = QualityAnalyzer::default()
            .analyze(&corpus)
            .expect("report")
            .question_patterns;
        assert_eq!(p["show"], 1);
        assert_eq!(p["bottom"], 1);
        assert_eq!(p["minimum"], 1);
        assert_eq!(p["compare"], 1);
        assert_eq!(p["how_many"], 0);
    }

    #[test]
    fn legacy_terms_report_first_hit_per_question() {
        let corpus = vec![
            example("List departments and employees", vec![]),
            example("List campaigns", vec![]),
        ];
        let issues = QualityAnalyzer::default().analyze(&corpus).expect("report").issues;
        assert_eq!(
            issues,
            vec![
                "Non-BI term found: 'departments' in question".to_string(),
                "Inconsistent terminology: 'departments' still present in outputs".to_string(),
            ]
        );
    }

    #[test]
    fn default_thresholds_match_the_documented_table() {
        let t = ScoreThresholds::default();
        let s = t.score(7000, 0.5, 20, 0.95, 0);
        assert_eq!(s.score, 100);
        assert_eq!(s.grade, Grade::Excellent);

        let s = t.score(5000, 0.25, 15, 0.90, 10);
        assert_eq!(s.components.volume, 15);
        assert_eq!(s.components.complexity, 15);
        assert_eq!(s.components.coverage, 15);
        assert_eq!(s.components.validity, 15);
        assert_eq!(s.components.issues, 15);

        let s = t.score(2999, 0.9, 9, 0.79, 51);
        assert_eq!(
            s.components,
            ScoreComponents {
                volume: 0,
                complexity: 10,
                coverage: 0,
                validity: 0,
                issues: 5,
            }
        );
        assert_eq!(s.score, 15);
        assert_eq!(s.grade, Grade::NeedsWork);
    }

    #[test]
    fn rendered_report_mentions_score_and_grade() {
        let corpus = vec![example("How many ads?", vec![full_step("step_1")])];
        let report = QualityAnalyzer::default().analyze(&corpus).expect("report");
        let text = render_report(&report);
        assert!(text.contains("Total examples: 1"));
        assert!(text.contains(&format!("{}/100", report.quality_score.score)));
        assert!(text.contains(report.quality_score.grade.label()));
    }
}
