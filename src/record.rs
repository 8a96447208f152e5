//! Cue/query records produced by the generation stage.
//!
//! Records arrive already filtered and validated by hand; this module only
//! types them. Dialogue may be structured (`[{"role": "A", "text": ...}]`)
//! or the generation stage's text form (`"A: ...\nB: ..."`).

use crate::CuebenchError;
use crate::time_gap::{TimeGap, TimeGapSource};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    A,
    B,
}

impl Role {
    pub fn parse(label: &str) -> Result<Role, CuebenchError> {
        match label.trim() {
            "A" | "a" => Ok(Role::A),
            "B" | "b" => Ok(Role::B),
            other => Err(CuebenchError::SpeakerMapping(format!(
                "role {other:?} is not A or B"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleUtterance {
    pub role: Role,
    pub text: String,
}

/// One turn as written in the input. The role stays a string until
/// validation so a bad role is reported per record, not as a parse failure.
#[derive(Debug, Clone, Deserialize)]
pub struct RawTurn {
    #[serde(alias = "speaker")]
    pub role: String,
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DialogueSource {
    Text(String),
    Turns(Vec<RawTurn>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum QuerySource {
    Text(String),
    Turn(RawTurn),
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawCueQueryRecord {
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    pub cue_dialogue: DialogueSource,
    pub trigger_query: QuerySource,
    pub time_gap: TimeGapSource,
    #[serde(default)]
    pub relation_type: Option<String>,
    #[serde(default)]
    pub model_name: Option<String>,
}

impl RawCueQueryRecord {
    /// Explicit id when present, otherwise the record's position in the file.
    pub fn record_id(&self, position: usize) -> String {
        match &self.id {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(v) if !v.is_null() => v.to_string(),
            _ => position.to_string(),
        }
    }
}

pub fn load_records(path: &Path) -> Result<Vec<RawCueQueryRecord>, CuebenchError> {
    crate::read_json(path)
}

#[derive(Debug, Clone, PartialEq)]
pub struct CueQueryRecord {
    pub id: String,
    pub cue_dialogue: Vec<RoleUtterance>,
    pub trigger_query: RoleUtterance,
    /// Gap as written, carried into outputs.
    pub time_gap: String,
    pub gap: TimeGap,
    pub relation_type: Option<String>,
}

impl CueQueryRecord {
    pub fn from_raw(raw: &RawCueQueryRecord, position: usize) -> Result<Self, CuebenchError> {
        let id = raw.record_id(position);

        let cue_dialogue = match &raw.cue_dialogue {
            DialogueSource::Text(text) => parse_ab_dialogue(text)?,
            DialogueSource::Turns(turns) => turns
                .iter()
                .map(validate_turn)
                .collect::<Result<Vec<_>, _>>()?,
        };
        if cue_dialogue.is_empty() {
            return Err(CuebenchError::MalformedRecord(format!(
                "record {id}: cue dialogue is empty"
            )));
        }

        let trigger_query = match &raw.trigger_query {
            QuerySource::Text(text) => {
                let mut turns = parse_ab_dialogue(text)?;
                if turns.len() != 1 {
                    return Err(CuebenchError::MalformedRecord(format!(
                        "record {id}: trigger query must be one utterance, found {}",
                        turns.len()
                    )));
                }
                turns.remove(0)
            }
            QuerySource::Turn(turn) => validate_turn(turn)?,
        };

        let gap = raw.time_gap.resolve().map_err(|e| match e {
            CuebenchError::TimeGapResolution(msg) => {
                CuebenchError::TimeGapResolution(format!("record {id}: {msg}"))
            }
            other => other,
        })?;

        Ok(Self {
            id,
            cue_dialogue,
            trigger_query,
            time_gap: raw.time_gap.describe(),
            gap,
            relation_type: raw.relation_type.clone(),
        })
    }
}

fn validate_turn(turn: &RawTurn) -> Result<RoleUtterance, CuebenchError> {
    Ok(RoleUtterance {
        role: Role::parse(&turn.role)?,
        text: turn.text.trim().to_string(),
    })
}

/// Parse `A: ...` / `B: ...` lines. Blank lines are skipped; any other line
/// is a role violation.
pub fn parse_ab_dialogue(text: &str) -> Result<Vec<RoleUtterance>, CuebenchError> {
    let mut turns = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (label, rest) = line.split_once(':').ok_or_else(|| {
            CuebenchError::SpeakerMapping(format!("line {line:?} has no role label"))
        })?;
        turns.push(RoleUtterance {
            role: Role::parse(label)?,
            text: rest.trim().to_string(),
        });
    }
    Ok(turns)
}
