//! Conversation store: LoCoMo-format conversations parsed into an ordered,
//! timestamped session list.
//!
//! The source JSON keys sessions dynamically (`session_1`,
//! `session_1_date_time`, `session_2`, ...). Parsing stops at the first
//! missing `session_N`.

use crate::CuebenchError;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Session timestamp format used by LoCoMo, e.g. `1:56 pm on 8 May, 2023`.
pub const LOCOMO_TIME_FORMAT: &str = "%I:%M %p on %d %B, %Y";

/// Same layout, unpadded, for rendering synthetic sessions.
const LOCOMO_RENDER_FORMAT: &str = "%-I:%M %P on %-d %B, %Y";

pub fn parse_session_time(s: &str) -> Result<NaiveDateTime, CuebenchError> {
    NaiveDateTime::parse_from_str(s.trim(), LOCOMO_TIME_FORMAT)
        .map_err(|e| CuebenchError::Configuration(format!("session time {s:?}: {e}")))
}

pub fn format_session_time(t: &NaiveDateTime) -> String {
    t.format(LOCOMO_RENDER_FORMAT).to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Utterance {
    pub speaker: String,
    pub text: String,
    /// LoCoMo dialogue id, `D<session>:<turn>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dia_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blip_caption: Option<String>,
}

impl Utterance {
    pub fn new(speaker: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            speaker: speaker.into(),
            text: text.into(),
            dia_id: None,
            blip_caption: None,
        }
    }

    /// 1-based turn position within the session, taken from `dia_id`.
    pub fn position(&self) -> Option<u32> {
        self.dia_id
            .as_deref()
            .and_then(|d| d.split_once(':'))
            .and_then(|(_, turn)| turn.trim().parse().ok())
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    /// Session number from the `session_N` key.
    pub index: u32,
    pub timestamp: NaiveDateTime,
    /// Timestamp exactly as written in the source.
    pub date_time: String,
    pub utterances: Vec<Utterance>,
}

/// One QA annotation attached to a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaAnnotation {
    pub question: String,
    /// Strings, numbers, or absent (adversarial questions).
    #[serde(default)]
    pub answer: Option<serde_json::Value>,
    #[serde(default, deserialize_with = "string_or_vec")]
    pub evidence: Vec<String>,
    #[serde(default)]
    pub category: Option<i64>,
    #[serde(default)]
    pub adversarial_answer: Option<String>,
}

/// Evidence is usually a list, occasionally a bare string.
fn string_or_vec<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de;

    struct StringOrVec;
    impl<'de> de::Visitor<'de> for StringOrVec {
        type Value = Vec<String>;

        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            f.write_str("string or array of strings")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            Ok(vec![v.to_owned()])
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }

        fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
            let mut out = Vec::new();
            while let Some(s) = seq.next_element()? {
                out.push(s);
            }
            Ok(out)
        }
    }

    deserializer.deserialize_any(StringOrVec)
}

#[derive(Debug, Clone)]
pub struct Conversation {
    pub sample_id: String,
    pub speaker_a: String,
    pub speaker_b: String,
    pub sessions: Vec<Session>,
    pub qa: Vec<QaAnnotation>,
}

impl Conversation {
    /// Session timestamps in session order.
    pub fn time_axis(&self) -> Vec<NaiveDateTime> {
        self.sessions.iter().map(|s| s.timestamp).collect()
    }

    pub fn span(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        Some((self.sessions.first()?.timestamp, self.sessions.last()?.timestamp))
    }

    /// Look up a turn by session number and 1-based turn number.
    pub fn turn(&self, session: u32, turn: usize) -> Option<&Utterance> {
        let s = self.sessions.iter().find(|s| s.index == session)?;
        turn.checked_sub(1).and_then(|i| s.utterances.get(i))
    }

    /// Check the invariants the stitcher relies on: at least one session,
    /// non-decreasing timestamps, and only the two declared speakers.
    pub fn validate(&self) -> Result<(), CuebenchError> {
        if self.sessions.is_empty() {
            return Err(CuebenchError::Configuration(format!(
                "conversation {} has no sessions",
                self.sample_id
            )));
        }
        for pair in self.sessions.windows(2) {
            if pair[1].timestamp < pair[0].timestamp {
                return Err(CuebenchError::Configuration(format!(
                    "conversation {}: session {} ({}) precedes session {} ({})",
                    self.sample_id,
                    pair[1].index,
                    pair[1].date_time,
                    pair[0].index,
                    pair[0].date_time
                )));
            }
        }
        for session in &self.sessions {
            for u in &session.utterances {
                if u.speaker != self.speaker_a && u.speaker != self.speaker_b {
                    return Err(CuebenchError::Configuration(format!(
                        "conversation {}: unknown speaker {:?} in session {}",
                        self.sample_id, u.speaker, session.index
                    )));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConversationStore {
    pub conversations: Vec<Conversation>,
}

impl ConversationStore {
    pub fn from_file(path: &Path) -> Result<Self, CuebenchError> {
        let value: serde_json::Value = crate::read_json(path)?;
        Self::from_value(&value)
    }

    pub fn from_json_str(json: &str) -> Result<Self, CuebenchError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        Self::from_value(&value)
    }

    fn from_value(value: &serde_json::Value) -> Result<Self, CuebenchError> {
        let items = value.as_array().ok_or_else(|| {
            CuebenchError::Configuration("conversation file must be a JSON array".into())
        })?;
        let conversations = items
            .iter()
            .enumerate()
            .map(|(idx, item)| parse_sample(item, idx))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { conversations })
    }

    /// Conversations usable for stitching. Invalid ones are logged and left out;
    /// they still contribute their QA samples verbatim.
    pub fn stitchable(&self) -> Vec<&Conversation> {
        self.conversations
            .iter()
            .filter(|c| match c.validate() {
                Ok(()) => true,
                Err(e) => {
                    log::warn!("excluding conversation {} from stitching: {e}", c.sample_id);
                    false
                }
            })
            .collect()
    }
}

fn parse_sample(value: &serde_json::Value, fallback_idx: usize) -> Result<Conversation, CuebenchError> {
    let obj = value.as_object().ok_or_else(|| {
        CuebenchError::Configuration(format!("conversation #{fallback_idx} is not an object"))
    })?;

    let sample_id = match obj.get("sample_id") {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) if !other.is_null() => other.to_string(),
        _ => format!("sample_{fallback_idx}"),
    };

    let conversation = obj
        .get("conversation")
        .and_then(|v| v.as_object())
        .ok_or_else(|| {
            CuebenchError::Configuration(format!("{sample_id}: missing 'conversation' object"))
        })?;

    let speaker = |key: &str| -> Result<String, CuebenchError> {
        conversation
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::to_owned)
            .ok_or_else(|| CuebenchError::Configuration(format!("{sample_id}: missing '{key}'")))
    };
    let speaker_a = speaker("speaker_a")?;
    let speaker_b = speaker("speaker_b")?;

    let mut sessions = Vec::new();
    let mut number = 1u32;
    while let Some(turns) = conversation.get(&format!("session_{number}")) {
        let date_time = conversation
            .get(&format!("session_{number}_date_time"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                CuebenchError::Configuration(format!(
                    "{sample_id}: session_{number} has no date_time"
                ))
            })?
            .to_string();
        let timestamp = parse_session_time(&date_time)
            .map_err(|e| CuebenchError::Configuration(format!("{sample_id}: {e}")))?;
        let utterances: Vec<Utterance> = serde_json::from_value(turns.clone()).map_err(|e| {
            CuebenchError::Configuration(format!("{sample_id}: session_{number} turns: {e}"))
        })?;
        sessions.push(Session {
            index: number,
            timestamp,
            date_time,
            utterances,
        });
        number += 1;
    }

    let qa: Vec<QaAnnotation> = match obj.get("qa") {
        Some(v) if !v.is_null() => serde_json::from_value(v.clone())
            .map_err(|e| CuebenchError::Configuration(format!("{sample_id}: qa: {e}")))?,
        _ => Vec::new(),
    };

    Ok(Conversation {
        sample_id,
        speaker_a,
        speaker_b,
        sessions,
        qa,
    })
}
