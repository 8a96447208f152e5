//! Unified benchmark samples: the five LoCoMo QA categories plus Cognitive.

use crate::render::{
    cue_evidence, evidence_text, parse_evidence_refs, question_prompt, render_conversation,
    render_stitched,
};
use crate::stitch::StitchedContext;
use crate::store::ConversationStore;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Category {
    MultiHop,
    Temporal,
    CommonSense,
    SingleHop,
    Adversarial,
    /// Cue/trigger samples built by stitching.
    Cognitive,
    /// Any other label, e.g. `category_7`.
    Other(String),
}

impl Category {
    /// Map a numeric LoCoMo category id.
    pub fn from_locomo_id(id: Option<i64>) -> Self {
        match id {
            Some(1) => Category::MultiHop,
            Some(2) => Category::Temporal,
            Some(3) => Category::CommonSense,
            Some(4) => Category::SingleHop,
            Some(5) => Category::Adversarial,
            Some(n) => Category::Other(format!("category_{n}")),
            None => Category::Other("category_none".into()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Category::MultiHop => "multi-hop",
            Category::Temporal => "temporal",
            Category::CommonSense => "common-sense",
            Category::SingleHop => "single-hop",
            Category::Adversarial => "adversarial",
            Category::Cognitive => "Cognitive",
            Category::Other(s) => s,
        }
    }
}

impl From<String> for Category {
    fn from(s: String) -> Self {
        match s.as_str() {
            "multi-hop" => Category::MultiHop,
            "temporal" => Category::Temporal,
            "common-sense" => Category::CommonSense,
            "single-hop" => Category::SingleHop,
            "adversarial" => Category::Adversarial,
            "Cognitive" => Category::Cognitive,
            _ => Category::Other(s),
        }
    }
}

impl From<Category> for String {
    fn from(c: Category) -> Self {
        match c {
            Category::Other(s) => s,
            other => other.label().to_string(),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedSample {
    pub id: String,
    pub input_prompt: String,
    pub trigger: String,
    #[serde(default)]
    pub evidence: Option<String>,
    pub category: Category,
    /// Reference answer as found in the source; never set for Cognitive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_gap: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker_a: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker_b: Option<String>,
}

/// One sample per QA annotation, conversations and questions in file order.
pub fn unify_locomo(store: &ConversationStore) -> Vec<UnifiedSample> {
    let mut out = Vec::new();
    for conv in &store.conversations {
        let context = render_conversation(conv);
        for (i, qa) in conv.qa.iter().enumerate() {
            let refs = parse_evidence_refs(&qa.evidence);
            let evidence = (!refs.is_empty()).then(|| evidence_text(conv, &refs));
            out.push(UnifiedSample {
                id: format!("{}:qa_{i}", conv.sample_id),
                input_prompt: question_prompt(&context, &qa.question),
                trigger: qa.question.clone(),
                evidence,
                category: Category::from_locomo_id(qa.category),
                answer: qa.answer.clone().filter(|a| !a.is_null()),
                time_gap: None,
                speaker_a: Some(conv.speaker_a.clone()),
                speaker_b: Some(conv.speaker_b.clone()),
            });
        }
    }
    out
}

pub fn cognitive_sample(ctx: &StitchedContext, truncate_after_query: bool) -> UnifiedSample {
    let trigger = ctx
        .trigger()
        .map(|u| u.text.trim().to_string())
        .unwrap_or_default();
    UnifiedSample {
        id: format!("cognitive:{}", ctx.provenance.record_id),
        input_prompt: render_stitched(ctx, truncate_after_query),
        trigger,
        evidence: Some(cue_evidence(ctx)),
        category: Category::Cognitive,
        answer: None,
        time_gap: Some(ctx.provenance.time_gap.clone()),
        speaker_a: Some(ctx.speaker_a.clone()),
        speaker_b: Some(ctx.speaker_b.clone()),
    }
}

/// LoCoMo samples first, then Cognitive samples in record order.
pub fn unify(
    store: &ConversationStore,
    contexts: &[StitchedContext],
    truncate_after_query: bool,
) -> Vec<UnifiedSample> {
    let mut samples = unify_locomo(store);
    samples.extend(contexts.iter().map(|c| cognitive_sample(c, truncate_after_query)));
    samples
}
