//! Temporal stitching: place a cue session and a later query session into an
//! existing conversation timeline.
//!
//! The engine is pure. Every random draw (anchor, jitter, role direction)
//! comes from the caller's RNG, so a fixed seed reproduces the whole build.
//!
//! Placement rules:
//! - the cue lands just after its anchor session, never past the midpoint
//!   to the following session;
//! - the query lands `gap` after the cue, and never later than one
//!   synthetic step past the final session;
//! - new sessions sort after every existing session with an equal timestamp,
//!   and original sessions never reorder.

use crate::CuebenchError;
use crate::config::StitchConfig;
use crate::record::CueQueryRecord;
use crate::remap::{RoleMapping, RoleMappingPolicy};
use crate::store::{Conversation, Utterance, format_session_time};
use crate::time_gap::TimeGap;
use chrono::{Duration, NaiveDateTime};
use rand::Rng;
use serde::{Serialize, Serializer};

const STAMP_FORMAT: &str = "%Y-%m-%d %H:%M";

fn serialize_stamp<S: Serializer>(t: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&t.format(STAMP_FORMAT).to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StitchParams {
    /// How far past the final session a query may land.
    pub synthetic_step: Duration,
    pub jitter_min_minutes: i64,
    pub jitter_max_minutes: i64,
    /// Cue-to-query distance for same-day gaps.
    pub same_day_offset: Duration,
}

impl Default for StitchParams {
    fn default() -> Self {
        Self::from_config(&StitchConfig::default())
    }
}

impl StitchParams {
    pub fn from_config(config: &StitchConfig) -> Self {
        Self {
            synthetic_step: Duration::days(config.synthetic_step_days),
            jitter_min_minutes: config.jitter_min_minutes,
            jitter_max_minutes: config.jitter_max_minutes,
            same_day_offset: Duration::minutes(config.same_day_offset_minutes),
        }
    }
}

/// Where the two new sessions go, relative to the source timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Insertion {
    /// Position (0-based) of the anchor in the source session list.
    pub anchor: usize,
    pub cue_time: NaiveDateTime,
    pub query_time: NaiveDateTime,
}

fn gap_error(msg: String) -> CuebenchError {
    CuebenchError::TimeGapResolution(msg)
}

fn shift(t: NaiveDateTime, d: Duration) -> Result<NaiveDateTime, CuebenchError> {
    t.checked_add_signed(d)
        .ok_or_else(|| gap_error(format!("offset {d} from {t} is out of range")))
}

/// Resolve cue and query times for a given anchor and jitter.
///
/// Fails with `TimeGapResolution` when the query would precede the cue or
/// land more than one synthetic step after the final session.
pub fn resolve_insertion(
    axis: &[NaiveDateTime],
    anchor: usize,
    gap: &TimeGap,
    jitter_minutes: i64,
    params: &StitchParams,
) -> Result<Insertion, CuebenchError> {
    let (Some(&t), Some(&last)) = (axis.get(anchor), axis.last()) else {
        return Err(gap_error(format!(
            "anchor {anchor} outside a timeline of {} sessions",
            axis.len()
        )));
    };
    let limit = shift(last, params.synthetic_step)?;

    let mut jitter = Duration::try_minutes(jitter_minutes.max(0))
        .ok_or_else(|| gap_error(format!("jitter of {jitter_minutes} minutes is out of range")))?;
    if let Some(&next) = axis.get(anchor + 1) {
        jitter = jitter.min((next - t) / 2);
    }

    let (cue_time, query_time) = match *gap {
        TimeGap::SameDay | TimeGap::Days { .. } => {
            let offset = match *gap {
                TimeGap::Days { days } => Duration::try_days(days)
                    .ok_or_else(|| gap_error(format!("{days} days is out of range")))?,
                _ => params.same_day_offset,
            };
            let room = limit - shift(t, offset)?;
            if room >= Duration::zero() {
                jitter = jitter.min(room);
            }
            let cue = shift(t, jitter)?;
            (cue, shift(cue, offset)?)
        }
        TimeGap::Sessions { count } => {
            let target = anchor.saturating_add(count as usize);
            let query = match axis.get(target) {
                Some(&q) => q,
                None if target == axis.len() => limit,
                None => {
                    return Err(gap_error(format!(
                        "session {} after anchor {anchor} does not exist ({} sessions)",
                        count,
                        axis.len()
                    )));
                }
            };
            jitter = jitter.min(query - t).max(Duration::zero());
            (shift(t, jitter)?, query)
        }
    };

    if query_time < cue_time {
        return Err(gap_error(format!(
            "{gap}: query at {query_time} would precede cue at {cue_time}"
        )));
    }
    if query_time > limit {
        return Err(gap_error(format!(
            "{gap}: query at {query_time} falls beyond {limit} (last session {last} + one step)"
        )));
    }

    Ok(Insertion {
        anchor,
        cue_time,
        query_time,
    })
}

/// Anchors from which the gap can be resolved inside the allowed span.
pub fn feasible_anchors(axis: &[NaiveDateTime], gap: &TimeGap, params: &StitchParams) -> Vec<usize> {
    (0..axis.len())
        .filter(|&i| resolve_insertion(axis, i, gap, 0, params).is_ok())
        .collect()
}

/// Pick a feasible anchor uniformly, draw a jitter, and resolve.
pub fn choose_insertion<R: Rng + ?Sized>(
    axis: &[NaiveDateTime],
    gap: &TimeGap,
    params: &StitchParams,
    rng: &mut R,
) -> Result<Insertion, CuebenchError> {
    let anchors = feasible_anchors(axis, gap, params);
    if anchors.is_empty() {
        let span = match (axis.first(), axis.last()) {
            (Some(first), Some(last)) => format!("{first} .. {last}"),
            _ => "empty timeline".into(),
        };
        return Err(gap_error(format!(
            "{gap} cannot be placed in {} sessions ({span})",
            axis.len()
        )));
    }
    let anchor = anchors[rng.gen_range(0..anchors.len())];
    let lo = params.jitter_min_minutes.max(0);
    let hi = params.jitter_max_minutes.max(lo);
    let jitter = rng.gen_range(lo..=hi);
    resolve_insertion(axis, anchor, gap, jitter, params)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    Original,
    Cue,
    Query,
}

#[derive(Debug, Clone, Serialize)]
pub struct StitchedSession {
    /// Position in the stitched timeline, 1-based.
    pub index: u32,
    pub kind: SessionKind,
    /// Session number in the source conversation (original sessions only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_index: Option<u32>,
    #[serde(serialize_with = "serialize_stamp")]
    pub timestamp: NaiveDateTime,
    pub date_time: String,
    pub utterances: Vec<Utterance>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Provenance {
    pub record_id: String,
    pub sample_id: String,
    pub time_gap: String,
    pub resolved_gap: TimeGap,
    #[serde(serialize_with = "serialize_stamp")]
    pub cue_time: NaiveDateTime,
    #[serde(serialize_with = "serialize_stamp")]
    pub query_time: NaiveDateTime,
    /// Source session number of the anchor.
    pub anchor_session: u32,
    /// Last turn of the anchor session, the point the cue follows.
    pub anchor_utterance: Option<Utterance>,
    pub role_mapping: RoleMapping,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relation_type: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StitchedContext {
    pub speaker_a: String,
    pub speaker_b: String,
    pub sessions: Vec<StitchedSession>,
    /// Timeline index of the cue session.
    pub cue_index: u32,
    /// Timeline index of the query session.
    pub query_index: u32,
    pub provenance: Provenance,
}

impl StitchedContext {
    pub fn session(&self, index: u32) -> Option<&StitchedSession> {
        index.checked_sub(1).and_then(|i| self.sessions.get(i as usize))
    }

    pub fn cue_session(&self) -> Option<&StitchedSession> {
        self.session(self.cue_index)
    }

    pub fn query_session(&self) -> Option<&StitchedSession> {
        self.session(self.query_index)
    }

    /// The remapped trigger utterance.
    pub fn trigger(&self) -> Option<&Utterance> {
        self.query_session().and_then(|s| s.utterances.first())
    }

    pub fn is_chronological(&self) -> bool {
        self.sessions.windows(2).all(|w| w[0].timestamp <= w[1].timestamp)
    }
}

/// Build the stitched timeline for a resolved insertion.
pub fn assemble(
    conv: &Conversation,
    record: &CueQueryRecord,
    insertion: &Insertion,
    mapping: RoleMapping,
) -> StitchedContext {
    let mut sessions: Vec<StitchedSession> = conv
        .sessions
        .iter()
        .map(|s| StitchedSession {
            index: 0,
            kind: SessionKind::Original,
            source_index: Some(s.index),
            timestamp: s.timestamp,
            date_time: s.date_time.clone(),
            utterances: s.utterances.clone(),
        })
        .collect();

    let new_session = |kind, timestamp: NaiveDateTime, utterances| StitchedSession {
        index: 0,
        kind,
        source_index: None,
        timestamp,
        date_time: format_session_time(&timestamp),
        utterances,
    };

    let (a, b) = (conv.speaker_a.as_str(), conv.speaker_b.as_str());
    let cue_turns = mapping.apply(&record.cue_dialogue, a, b);
    let query_turns = mapping.apply(std::slice::from_ref(&record.trigger_query), a, b);

    let cue_pos = sessions.partition_point(|s| s.timestamp <= insertion.cue_time);
    sessions.insert(cue_pos, new_session(SessionKind::Cue, insertion.cue_time, cue_turns));
    let query_pos = sessions.partition_point(|s| s.timestamp <= insertion.query_time);
    sessions.insert(query_pos, new_session(SessionKind::Query, insertion.query_time, query_turns));

    for (i, s) in sessions.iter_mut().enumerate() {
        s.index = i as u32 + 1;
    }

    let anchor = &conv.sessions[insertion.anchor];
    StitchedContext {
        speaker_a: conv.speaker_a.clone(),
        speaker_b: conv.speaker_b.clone(),
        sessions,
        cue_index: cue_pos as u32 + 1,
        query_index: query_pos as u32 + 1,
        provenance: Provenance {
            record_id: record.id.clone(),
            sample_id: conv.sample_id.clone(),
            time_gap: record.time_gap.clone(),
            resolved_gap: record.gap,
            cue_time: insertion.cue_time,
            query_time: insertion.query_time,
            anchor_session: anchor.index,
            anchor_utterance: anchor.utterances.last().cloned(),
            role_mapping: mapping,
            relation_type: record.relation_type.clone(),
        },
    }
}

/// Stitch one record into one conversation. Draws the role direction first,
/// then the anchor and jitter.
pub fn stitch<R: Rng + ?Sized>(
    conv: &Conversation,
    record: &CueQueryRecord,
    params: &StitchParams,
    policy: RoleMappingPolicy,
    rng: &mut R,
) -> Result<StitchedContext, CuebenchError> {
    let mapping = RoleMapping::choose(policy, rng);
    let insertion = choose_insertion(&conv.time_axis(), &record.gap, params, rng)?;
    Ok(assemble(conv, record, &insertion, mapping))
}
