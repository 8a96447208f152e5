//! Prompt rendering: `DATE:` / `CONVERSATION:` blocks and evidence text.

use crate::stitch::{SessionKind, StitchedContext};
use crate::store::{Conversation, Utterance};

/// Separator between speaker and text in evidence lines (full-width colon).
pub const EVIDENCE_SEPARATOR: char = '：';

pub fn render_utterance(u: &Utterance) -> String {
    let text = u.text.trim();
    match &u.blip_caption {
        Some(caption) => format!("{} said, \"{text}\" and shared {caption}.", u.speaker),
        None => format!("{} said, \"{text}\"", u.speaker),
    }
}

fn push_session(out: &mut String, date_time: &str, utterances: &[Utterance]) {
    out.push_str("DATE: ");
    out.push_str(date_time);
    out.push_str("\nCONVERSATION:\n");
    for u in utterances {
        out.push_str(&render_utterance(u));
        out.push('\n');
    }
    out.push('\n');
}

/// Every session of the conversation in order, trailing whitespace trimmed.
pub fn render_conversation(conv: &Conversation) -> String {
    let mut out = String::new();
    for s in &conv.sessions {
        push_session(&mut out, &s.date_time, &s.utterances);
    }
    out.truncate(out.trim_end().len());
    out
}

/// Render a stitched timeline as a Cognitive prompt: every session other
/// than the query in chronological order, then the trigger text.
///
/// With `truncate_after_query` the sessions dated after the query are
/// left out.
pub fn render_stitched(ctx: &StitchedContext, truncate_after_query: bool) -> String {
    let mut out = String::new();
    for s in &ctx.sessions {
        if s.kind == SessionKind::Query {
            if truncate_after_query {
                break;
            }
            continue;
        }
        push_session(&mut out, &s.date_time, &s.utterances);
    }
    out.truncate(out.trim_end().len());
    if let Some(trigger) = ctx.trigger() {
        if !out.is_empty() {
            out.push_str("\n\n");
        }
        out.push_str(trigger.text.trim());
    }
    out
}

pub fn question_prompt(context: &str, question: &str) -> String {
    format!("{}\n\nQuestion: {question}", context.trim_end())
}

/// Flatten raw evidence entries into `Dn:k` references. Entries such as
/// `"D8:6; D9:17"` hold several references.
pub fn parse_evidence_refs(raw: &[String]) -> Vec<String> {
    raw.iter()
        .flat_map(|entry| entry.split(';'))
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_owned)
        .collect()
}

fn parse_ref(r: &str) -> Option<(u32, usize)> {
    let (session, turn) = r.split_once(':')?;
    if turn.contains(':') {
        return None;
    }
    let session = session.trim().trim_start_matches('D').parse().ok()?;
    let turn = turn.trim().parse().ok()?;
    Some((session, turn))
}

/// One evidence line per reference: `Speaker：text`, or a bracketed marker
/// when the reference does not resolve.
pub fn evidence_text(conv: &Conversation, refs: &[String]) -> String {
    refs.iter()
        .map(|r| match parse_ref(r) {
            Some((session, turn)) => match conv.turn(session, turn) {
                Some(u) => format!("{}{EVIDENCE_SEPARATOR}{}", u.speaker, u.text),
                None => format!("[{r}] [Missing turn]"),
            },
            None => format!("[{r}] [Parse error]"),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Dialogue as `Speaker：text` lines, skipping empty turns.
pub fn dialogue_evidence(utterances: &[Utterance]) -> String {
    utterances
        .iter()
        .filter(|u| !u.text.trim().is_empty())
        .map(|u| format!("{}{EVIDENCE_SEPARATOR}{}", u.speaker, u.text.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Cue evidence for a stitched context.
pub fn cue_evidence(ctx: &StitchedContext) -> String {
    ctx.sessions
        .iter()
        .filter(|s| s.kind == SessionKind::Cue)
        .map(|s| dialogue_evidence(&s.utterances))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remap::RoleMapping;
    use crate::stitch::tests::{at, conversation, record};
    use crate::stitch::{StitchParams, assemble, resolve_insertion};
    use crate::store::tests::sample_store;
    use crate::time_gap::TimeGap;

    #[test]
    fn renders_locomo_conversation_with_caption() {
        let conv = &sample_store().conversations[0];
        let text = render_conversation(conv);
        assert!(text.starts_with("DATE: 1:56 pm on 1 May, 2023\nCONVERSATION:\nAlice said, \"I just adopted a dog.\"\n"));
        assert!(text.contains("Bob said, \"Congrats!\" and shared a photo of a puppy.\n"));
        assert!(text.contains("\n\nDATE: 10:00 am on 3 May, 2023\n"));
        assert!(text.ends_with("Alice said, \"We went hiking.\""));
    }

    #[test]
    fn question_prompt_appends_question_block() {
        let p = question_prompt("DATE: x\nCONVERSATION:\nA said, \"hi\"\n\n", "Who?");
        assert_eq!(p, "DATE: x\nCONVERSATION:\nA said, \"hi\"\n\nQuestion: Who?");
    }

    #[test]
    fn evidence_refs_split_on_semicolon() {
        let raw = vec!["D8:6; D9:17".to_string(), "D1:3".to_string(), " ; ".to_string()];
        assert_eq!(parse_evidence_refs(&raw), vec!["D8:6", "D9:17", "D1:3"]);
    }

    #[test]
    fn evidence_text_resolves_and_marks_failures() {
        let conv = &sample_store().conversations[0];
        let refs = vec![
            "D1:1".to_string(),
            "D2:2".to_string(),
            "D9:1".to_string(),
            "D1:0".to_string(),
            "D1".to_string(),
            "Dx:1".to_string(),
        ];
        let text = evidence_text(conv, &refs);
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "Alice：I just adopted a dog.");
        assert_eq!(lines[1], "Alice：Chewing everything.");
        assert_eq!(lines[2], "[D9:1] [Missing turn]");
        assert_eq!(lines[3], "[D1:0] [Missing turn]");
        assert_eq!(lines[4], "[D1] [Parse error]");
        assert_eq!(lines[5], "[Dx:1] [Parse error]");
    }

    #[test]
    fn stitched_render_keeps_every_session_and_ends_with_trigger() {
        let conv = conversation(&[at(1, 12), at(3, 12), at(20, 12)]);
        let rec = record(TimeGap::Days { days: 1 });
        let ins = resolve_insertion(&conv.time_axis(), 0, &rec.gap, 60, &StitchParams::default()).unwrap();
        let ctx = assemble(&conv, &rec, &ins, RoleMapping::Direct);

        let full = render_stitched(&ctx, false);
        assert!(full.ends_with("\n\nWant some satay?"));
        assert_eq!(full.matches("Want some satay?").count(), 1);
        for n in 1..=3 {
            assert!(full.contains(&format!("session {n} opener")), "session {n} missing");
        }
        let cue = full.find("I'm allergic to peanuts.").unwrap();
        assert!(full.find("session 1 opener").unwrap() < cue);
        assert!(cue < full.find("session 2 opener").unwrap());

        let truncated = render_stitched(&ctx, true);
        assert!(truncated.ends_with("\n\nWant some satay?"));
        assert!(truncated.contains("Alice said, \"I'm allergic to peanuts.\""));
        assert!(!truncated.contains("DATE: 12:00 pm on 20 May, 2023"));
        assert!(full.contains("DATE: 12:00 pm on 20 May, 2023"));
    }

    #[test]
    fn rendering_is_idempotent() {
        let conv = conversation(&[at(1, 12), at(3, 12), at(5, 12)]);
        let rec = record(TimeGap::Sessions { count: 1 });
        let ins = resolve_insertion(&conv.time_axis(), 1, &rec.gap, 0, &StitchParams::default()).unwrap();
        let ctx = assemble(&conv, &rec, &ins, RoleMapping::Swapped);
        let before = serde_json::to_string(&ctx).unwrap();
        assert_eq!(render_stitched(&ctx, true), render_stitched(&ctx, true));
        assert_eq!(render_conversation(&conv), render_conversation(&conv));
        assert_eq!(serde_json::to_string(&ctx).unwrap(), before);
    }

    #[test]
    fn cue_evidence_uses_remapped_speakers() {
        let conv = conversation(&[at(1, 12), at(3, 12)]);
        let rec = record(TimeGap::SameDay);
        let ins = resolve_insertion(&conv.time_axis(), 0, &rec.gap, 30, &StitchParams::default()).unwrap();
        let ctx = assemble(&conv, &rec, &ins, RoleMapping::Swapped);
        assert_eq!(cue_evidence(&ctx), "Bob：I'm allergic to peanuts.\nAlice：Good to know.");
    }
}
