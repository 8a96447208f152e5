//! LLM-as-judge scoring and the score summary.
//!
//! Labels map to `correct = 1`, `partial = 0.5`, `wrong = 0`. A record whose
//! label cannot be recovered (or whose prediction failed) keeps
//! `judge_label = null` and stays out of the summary.

use crate::CuebenchError;
use crate::config::ModelConfig;
use crate::runner::{Backend, Prediction, make_backend, map_bounded};
use crate::unify::Category;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JudgeLabel {
    Correct,
    Partial,
    Wrong,
}

impl JudgeLabel {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "correct" => Some(JudgeLabel::Correct),
            "partial" => Some(JudgeLabel::Partial),
            "wrong" => Some(JudgeLabel::Wrong),
            _ => None,
        }
    }

    pub fn score(self) -> f64 {
        match self {
            JudgeLabel::Correct => 1.0,
            JudgeLabel::Partial => 0.5,
            JudgeLabel::Wrong => 0.0,
        }
    }
}

const JSON_INSTRUCTION_FULL: &str = r#"Return your judgment strictly in JSON format:
{"label": "correct"|"partial"|"wrong", "reason": "<short explanation>"}
"#;

const JSON_INSTRUCTION_BINARY: &str = r#"Return your judgment strictly in JSON format:
{"label": "correct"|"wrong", "reason": "<short explanation>"}
"#;

const MULTI_HOP: &str = r#"
You are a Fact-Checking Judge.
Your task: Compare the model's prediction with the reference answer (multi-hop fact QA).

Labels:
- "correct": The answer matches the reference entities (names, places, times) exactly.
- "partial": The answer misses some details or contains minor inaccuracies but gets the main entity right.
- "wrong": The answer is factually incorrect or hallucinates details not in the reference.

Reference Answer:
{gold}

Model Prediction:
{pred}

Relevant Evidence:
{evidence}

"#;

const SINGLE_HOP: &str = r#"
You are a Fact-Checking Judge.
Your task: Compare the model's prediction with the reference answer (single-hop fact QA).

Labels:
- "correct": The answer matches the reference entities exactly.
- "partial": The answer misses some details but gets the main entity right.
- "wrong": The answer is factually incorrect or hallucinates details not in the reference.

Reference Answer:
{gold}

Model Prediction:
{pred}

Relevant Evidence:
{evidence}

"#;

const TEMPORAL: &str = r#"
You are a Temporal Logic Judge.
Your task: Check the calculation, duration, or sequence of events.

Labels:
- "correct": The calculated time, duration, or date matches the reference exactly (semantic equivalents are allowed).
- "wrong": The calculation is incorrect, the sequence is reversed, or the specific time is wrong.

Reference Answer:
{gold}

Model Prediction:
{pred}

Relevant Evidence:
{evidence}

"#;

const COMMON_SENSE: &str = r#"
You are a Knowledge Logic Judge.
Your task: Assess if the prediction applies correct commonsense/world knowledge consistent with the reference.

Labels:
- "correct": The logic and inference are sound and match the reference conclusion.
- "partial": The reasoning is mostly correct but the final conclusion is vague or slightly off.
- "wrong": The reasoning contradicts commonsense or the reference.

Reference Answer:
{gold}

Model Prediction:
{pred}

Relevant Evidence:
{evidence}

"#;

const ADVERSARIAL: &str = r#"
You are a Skeptical Judge evaluating robustness.
The question is inherently misleading (e.g., asks about something not in the conversation).
Your task: Judge whether the model's answer conveys that "this was not mentioned in the conversation" (or equivalent refusal).

Labels:
- "correct": The prediction clearly conveys that the information was not mentioned / cannot be answered from the conversation. Score it.
- "wrong": The prediction does NOT convey that meaning, e.g. it gives a concrete answer or does not refuse. Do not score.


Model Prediction:
{pred}

"#;

const COGNITIVE: &str = r#"
You are a Memory Awareness Judge.
Your task: Judge whether the Model Prediction considers or is linked to the Evidence. If there is a clear connection, the answer is correct (score 1); if not, it is wrong (no score).

Labels:
- "correct": The prediction explicitly or implicitly reflects/uses the evidence (memory or constraint). Give 1 point.
- "wrong": The prediction does not show such a link to the evidence. No point.

Memory/Evidence:
{evidence}

Model Prediction:
{pred}

Return your judgment strictly in JSON format:
{"label": "correct"|"wrong", "reason": "<Does the prediction relate to the evidence?>"}
"#;

const DEFAULT: &str = r#"
You are an expert evaluator.
Your task: Compare the prediction with the reference.

Labels:
- "correct": Factually consistent with the reference.
- "partial": Contains correct info but is incomplete.
- "wrong": Factually incorrect.

Reference Answer:
{gold}

Model Prediction:
{pred}

Relevant Evidence:
{evidence}

"#;

/// Template body and its closing JSON instruction.
fn template_for(category: &Category) -> (&'static str, &'static str) {
    match category {
        Category::MultiHop => (MULTI_HOP, JSON_INSTRUCTION_FULL),
        Category::SingleHop => (SINGLE_HOP, JSON_INSTRUCTION_FULL),
        Category::Temporal => (TEMPORAL, JSON_INSTRUCTION_BINARY),
        Category::CommonSense => (COMMON_SENSE, JSON_INSTRUCTION_FULL),
        Category::Adversarial => (ADVERSARIAL, JSON_INSTRUCTION_BINARY),
        Category::Cognitive => (COGNITIVE, ""),
        Category::Other(_) => (DEFAULT, JSON_INSTRUCTION_FULL),
    }
}

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(gold|pred|evidence)\}").unwrap());

/// Fill the category template. Substitution is single-pass, so braces inside
/// the prediction are left alone.
pub fn judge_prompt(category: &Category, evidence: &str, pred: &str, gold: &str) -> String {
    let (body, instruction) = template_for(category);
    let filled = PLACEHOLDER.replace_all(body, |caps: &regex::Captures| match &caps[1] {
        "gold" => gold.to_string(),
        "pred" => pred.to_string(),
        _ => evidence.to_string(),
    });
    format!("{filled}{instruction}")
}

/// Strip markdown code fences from LLM response.
fn strip_fences(text: &str) -> &str {
    let t = text.trim();
    if let Some(rest) = t.strip_prefix("```") {
        // Skip optional language tag on same line
        let rest = rest.trim_start_matches(|c: char| c != '\n').trim_start_matches('\n');
        if let Some(inner) = rest.strip_suffix("```") {
            return inner.trim();
        }
        return rest.trim();
    }
    t
}

static LABEL_FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""label"\s*:\s*["']([^"']+)["']"#).unwrap());

static REASON_FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""reason"\s*:\s*["']([^"']*)["']"#).unwrap());

static NEGATED_CORRECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(not|isn['’]t|wasn['’]t|aren['’]t|never)\s+(\w+\s+)?correct\b").unwrap()
});

fn from_object(text: &str) -> Option<(JudgeLabel, String)> {
    let obj: serde_json::Value = serde_json::from_str(text).ok()?;
    let label = JudgeLabel::parse(obj.get("label")?.as_str()?)?;
    let reason = obj
        .get("reason")
        .and_then(|r| r.as_str())
        .unwrap_or_default()
        .trim()
        .to_string();
    Some((label, reason))
}

/// Recover `(label, reason)` from a judge response: a JSON object, a JSON
/// object embedded in prose, a `"label": ...` field, then bare keywords.
pub fn parse_judge_response(raw: &str) -> Option<(JudgeLabel, String)> {
    let cleaned = strip_fences(raw);
    if cleaned.is_empty() {
        return None;
    }
    if let Some(parsed) = from_object(cleaned) {
        return Some(parsed);
    }
    if let (Some(start), Some(end)) = (cleaned.find('{'), cleaned.rfind('}'))
        && start < end
        && let Some(parsed) = from_object(&cleaned[start..=end])
    {
        return Some(parsed);
    }
    if let Some(label) = LABEL_FIELD
        .captures(cleaned)
        .and_then(|c| JudgeLabel::parse(&c[1]))
    {
        let reason = REASON_FIELD
            .captures(cleaned)
            .map(|c| c[1].trim().to_string())
            .unwrap_or_default();
        return Some((label, reason));
    }

    let lower = cleaned.to_lowercase();
    // "incorrect" and "not correct" both contain "correct"
    let label = if lower.contains("incorrect")
        || lower.contains("wrong")
        || NEGATED_CORRECT.is_match(&lower)
    {
        JudgeLabel::Wrong
    } else if lower.contains("partial") {
        JudgeLabel::Partial
    } else if lower.contains("correct") {
        JudgeLabel::Correct
    } else {
        return None;
    };
    Some((label, cleaned.chars().take(200).collect()))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgedRecord {
    #[serde(flatten)]
    pub prediction: Prediction,
    pub judge_label: Option<JudgeLabel>,
    #[serde(default)]
    pub judge_reason: String,
    pub judge_score: Option<f64>,
}

fn gold_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn judge_one(pred: &Prediction, backend: &dyn Backend) -> JudgedRecord {
    let unscored = |reason: String| JudgedRecord {
        prediction: pred.clone(),
        judge_label: None,
        judge_reason: reason,
        judge_score: None,
    };

    let Some(answer) = &pred.prediction else {
        let why = pred.error.as_deref().unwrap_or("no prediction");
        return unscored(format!("prediction failed: {why}"));
    };

    let prompt = judge_prompt(
        &pred.category,
        pred.evidence.as_deref().unwrap_or_default(),
        answer,
        &gold_text(&pred.ground_truth),
    );
    let raw = match backend.complete(&prompt) {
        Ok(r) => r,
        Err(e) => {
            log::warn!("judge call for {} failed: {e}", pred.id);
            return unscored(format!("judge call failed: {e}"));
        }
    };
    match parse_judge_response(&raw) {
        Some((label, reason)) => JudgedRecord {
            prediction: pred.clone(),
            judge_label: Some(label),
            judge_reason: reason,
            judge_score: Some(label.score()),
        },
        None => {
            log::warn!("judge response for {} has no label", pred.id);
            unscored(raw.chars().take(200).collect())
        }
    }
}

pub fn judge_all(
    predictions: &[Prediction],
    backend: &dyn Backend,
    concurrency: usize,
) -> Result<Vec<JudgedRecord>, CuebenchError> {
    map_bounded(predictions, concurrency, |p| judge_one(p, backend))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryScore {
    pub score: f64,
    pub count: usize,
    pub avg: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub total_score: f64,
    pub total_samples: usize,
    pub scored_samples: usize,
    pub excluded_samples: usize,
    pub max_possible: usize,
    pub overall_avg: f64,
    pub by_category: BTreeMap<String, CategoryScore>,
}

fn round_to(x: f64, places: i32) -> f64 {
    let m = 10f64.powi(places);
    (x * m).round() / m
}

pub fn summarize(records: &[JudgedRecord]) -> Summary {
    let mut total = 0.0;
    let mut scored = 0;
    let mut by_cat: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    for r in records {
        let Some(score) = r.judge_score else { continue };
        total += score;
        scored += 1;
        let entry = by_cat
            .entry(r.prediction.category.label().to_string())
            .or_insert((0.0, 0));
        entry.0 += score;
        entry.1 += 1;
    }

    let avg = |sum: f64, n: usize| if n == 0 { 0.0 } else { round_to(sum / n as f64, 4) };
    Summary {
        total_score: round_to(total, 2),
        total_samples: records.len(),
        scored_samples: scored,
        excluded_samples: records.len() - scored,
        max_possible: scored,
        overall_avg: avg(total, scored),
        by_category: by_cat
            .into_iter()
            .map(|(cat, (sum, n))| {
                (
                    cat,
                    CategoryScore {
                        score: round_to(sum, 2),
                        count: n,
                        avg: avg(sum, n),
                    },
                )
            })
            .collect(),
    }
}

pub fn format_summary(s: &Summary) -> String {
    let rule = "=".repeat(60);
    let mut out = format!("{rule}\nJudge score summary\n{rule}\n");
    out.push_str(&format!("  Total samples: {}\n", s.total_samples));
    out.push_str(&format!(
        "  Scored:        {} ({} excluded)\n",
        s.scored_samples, s.excluded_samples
    ));
    out.push_str(&format!("  Total score:   {} / {}\n", s.total_score, s.max_possible));
    out.push_str(&format!(
        "  Average:       {} (correct=1, partial=0.5, wrong=0)\n",
        s.overall_avg
    ));
    out.push_str(&format!("{}\n  By category:\n", "-".repeat(60)));
    for (cat, v) in &s.by_category {
        out.push_str(&format!(
            "    {cat}: score {} / {} samples, avg {}\n",
            v.score, v.count, v.avg
        ));
    }
    out.push_str(&rule);
    out
}

fn write_summary(summary: &Summary, summary_out: Option<&Path>) -> Result<(), CuebenchError> {
    println!("{}", format_summary(summary));
    if let Some(path) = summary_out {
        crate::write_json(path, summary)?;
        eprintln!("cuebench: summary written to {}", path.display());
    }
    Ok(())
}

pub fn handle_judge(
    config: &ModelConfig,
    input: &Path,
    out: &Path,
    summary_out: Option<&Path>,
) -> Result<(), CuebenchError> {
    let predictions: Vec<Prediction> = crate::read_json(input)?;
    let backend = make_backend(config)?;
    log::info!("judging {} predictions with {}", predictions.len(), config.model);
    let judged = judge_all(&predictions, backend.as_ref(), config.concurrency)?;
    crate::write_json(out, &judged)?;
    eprintln!("cuebench: wrote {} judged records to {}", judged.len(), out.display());
    write_summary(&summarize(&judged), summary_out)
}

pub fn handle_summarize(input: &Path, summary_out: Option<&Path>) -> Result<(), CuebenchError> {
    let judged: Vec<JudgedRecord> = crate::read_json(input)?;
    write_summary(&summarize(&judged), summary_out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pred(id: &str, category: Category, prediction: Option<&str>) -> Prediction {
        Prediction {
            id: id.into(),
            question_input: "What did Alice adopt?".into(),
            evidence: Some("Alice：I just adopted a dog.".into()),
            category,
            ground_truth: serde_json::json!("a dog"),
            prediction: prediction.map(str::to_owned),
            model: "mock".into(),
            time_gap: None,
            error: None,
        }
    }

    fn judged(category: Category, label: Option<JudgeLabel>) -> JudgedRecord {
        JudgedRecord {
            prediction: pred("x", category, Some("p")),
            judge_label: label,
            judge_reason: String::new(),
            judge_score: label.map(JudgeLabel::score),
        }
    }

    #[test]
    fn mean_of_one_half_zero_is_half() {
        let records = vec![
            judged(Category::SingleHop, Some(JudgeLabel::Correct)),
            judged(Category::SingleHop, Some(JudgeLabel::Partial)),
            judged(Category::SingleHop, Some(JudgeLabel::Wrong)),
        ];
        let s = summarize(&records);
        assert_eq!(s.total_score, 1.5);
        assert_eq!(s.overall_avg, 0.5);
        assert_eq!(s.by_category["single-hop"].avg, 0.5);
        assert_eq!(s.by_category["single-hop"].count, 3);
    }

    #[test]
    fn unlabelled_records_are_excluded() {
        let records = vec![
            judged(Category::Cognitive, Some(JudgeLabel::Correct)),
            judged(Category::Temporal, None),
            judged(Category::Temporal, Some(JudgeLabel::Wrong)),
        ];
        let s = summarize(&records);
        assert_eq!(s.total_samples, 3);
        assert_eq!(s.scored_samples, 2);
        assert_eq!(s.excluded_samples, 1);
        assert_eq!(s.max_possible, 2);
        assert_eq!(s.overall_avg, 0.5);
        let cats: Vec<_> = s.by_category.keys().cloned().collect();
        assert_eq!(cats, ["Cognitive", "temporal"]);
        assert_eq!(s.by_category["temporal"].count, 1);
    }

    #[test]
    fn empty_summary_has_zero_average() {
        let s = summarize(&[]);
        assert_eq!(s.overall_avg, 0.0);
        assert!(s.by_category.is_empty());
    }

    #[test]
    fn averages_round_to_four_places() {
        let records = vec![
            judged(Category::MultiHop, Some(JudgeLabel::Correct)),
            judged(Category::MultiHop, Some(JudgeLabel::Wrong)),
            judged(Category::MultiHop, Some(JudgeLabel::Wrong)),
        ];
        assert_eq!(summarize(&records).overall_avg, 0.3333);
    }

    #[test]
    fn parses_plain_and_fenced_json() {
        let (l, r) = parse_judge_response(r#"{"label": "partial", "reason": "missing breed"}"#).unwrap();
        assert_eq!(l, JudgeLabel::Partial);
        assert_eq!(r, "missing breed");
        let (l, _) = parse_judge_response("```json\n{\"label\": \"Correct\", \"reason\": \"ok\"}\n```").unwrap();
        assert_eq!(l, JudgeLabel::Correct);
    }

    #[test]
    fn parses_embedded_json_and_label_field() {
        let (l, r) = parse_judge_response("Sure. {\"label\": \"wrong\", \"reason\": \"cat\"} Done.").unwrap();
        assert_eq!((l, r.as_str()), (JudgeLabel::Wrong, "cat"));
        let (l, r) = parse_judge_response(r#"Verdict: "label": 'partial', "reason": "breed missing""#).unwrap();
        assert_eq!(l, JudgeLabel::Partial);
        assert_eq!(r, "breed missing");
    }

    #[test]
    fn keyword_fallback_checks_incorrect_first() {
        assert_eq!(parse_judge_response("The answer is incorrect.").unwrap().0, JudgeLabel::Wrong);
        assert_eq!(parse_judge_response("Partially correct").unwrap().0, JudgeLabel::Partial);
        assert_eq!(parse_judge_response("Looks correct to me").unwrap().0, JudgeLabel::Correct);
        for negated in ["The prediction is not correct.", "That isn't correct", "It is not quite correct"] {
            assert_eq!(parse_judge_response(negated).unwrap().0, JudgeLabel::Wrong, "{negated}");
        }
        assert!(parse_judge_response("no idea").is_none());
        assert!(parse_judge_response("   ").is_none());
    }

    #[test]
    fn templates_by_category() {
        let p = judge_prompt(&Category::SingleHop, "EVID", "PRED", "GOLD");
        assert!(p.contains("Reference Answer:\nGOLD"));
        assert!(p.contains("Relevant Evidence:\nEVID"));
        assert!(p.ends_with("{\"label\": \"correct\"|\"partial\"|\"wrong\", \"reason\": \"<short explanation>\"}\n"));

        let adv = judge_prompt(&Category::Adversarial, "EVID", "PRED", "GOLD");
        assert!(!adv.contains("GOLD"));
        assert!(adv.contains("Model Prediction:\nPRED"));

        let cog = judge_prompt(&Category::Cognitive, "EVID", "PRED", "GOLD");
        assert!(!cog.contains("GOLD"));
        assert!(cog.contains("Memory/Evidence:\nEVID"));

        let other = judge_prompt(&Category::Other("category_9".into()), "E", "P", "G");
        assert!(other.contains("You are an expert evaluator."));
    }

    #[test]
    fn prediction_braces_are_not_substituted() {
        let p = judge_prompt(&Category::Temporal, "EVID", "see {evidence}", "GOLD");
        assert!(p.contains("Model Prediction:\nsee {evidence}"));
    }

    #[test]
    fn judge_one_scores_and_skips_failed_predictions() {
        let backend = |prompt: &str| -> Result<String, CuebenchError> {
            assert!(prompt.contains("Reference Answer:\na dog"));
            Ok(r#"{"label": "correct", "reason": "same"}"#.into())
        };
        let r = judge_one(&pred("a", Category::SingleHop, Some("A dog.")), &backend);
        assert_eq!(r.judge_label, Some(JudgeLabel::Correct));
        assert_eq!(r.judge_score, Some(1.0));

        let mut failed = pred("b", Category::SingleHop, None);
        failed.error = Some("backend: timeout".into());
        let r = judge_one(&failed, &backend);
        assert!(r.judge_label.is_none());
        assert!(r.judge_reason.contains("timeout"));
    }

    #[test]
    fn judged_record_json_is_flat() {
        let records = judge_all(
            &[pred("a", Category::SingleHop, Some("dog"))],
            &|_: &str| -> Result<String, CuebenchError> { Ok("no verdict".into()) },
            2,
        )
        .unwrap();
        let json = serde_json::to_value(&records[0]).unwrap();
        assert_eq!(json["id"], "a");
        assert_eq!(json["prediction"], "dog");
        assert!(json["judge_label"].is_null());
        assert!(json["judge_score"].is_null());

        let back: JudgedRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, records[0]);
    }

    #[test]
    fn format_lists_categories() {
        let s = summarize(&[judged(Category::Cognitive, Some(JudgeLabel::Correct))]);
        let text = format_summary(&s);
        assert!(text.contains("Total score:   1 / 1"));
        assert!(text.contains("    Cognitive: score 1 / 1 samples, avg 1"));
    }
}
