use assert_cmd::Command;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const CONVERSATIONS: &str = r#"[
  {
    "sample_id": "conv-26",
    "conversation": {
      "speaker_a": "Caroline",
      "speaker_b": "Melanie",
      "session_1_date_time": "1:56 pm on 8 May, 2023",
      "session_1": [
        {"speaker": "Caroline", "dia_id": "D1:1", "text": "Hey Mel! Good to see you!"},
        {"speaker": "Melanie", "dia_id": "D1:2", "text": "Hey Caroline! I painted a lake sunrise.", "blip_caption": "a photo of a painting"}
      ],
      "session_2_date_time": "1:14 pm on 25 May, 2023",
      "session_2": [
        {"speaker": "Caroline", "dia_id": "D2:1", "text": "I went to a support group yesterday."},
        {"speaker": "Melanie", "dia_id": "D2:2", "text": "That sounds powerful."}
      ],
      "session_3_date_time": "7:55 pm on 9 June, 2023",
      "session_3": [
        {"speaker": "Melanie", "dia_id": "D3:1", "text": "We went camping last weekend."}
      ]
    },
    "qa": [
      {"question": "What did Melanie paint?", "answer": "A lake sunrise", "evidence": ["D1:2"], "category": 4},
      {"question": "When did Caroline go to the support group?", "answer": "24 May 2023", "evidence": ["D2:1"], "category": 2},
      {"question": "What did Caroline paint?", "adversarial_answer": "a sunset", "evidence": ["D1:2"], "category": 5}
    ]
  },
  {
    "sample_id": "conv-30",
    "conversation": {
      "speaker_a": "Jon",
      "speaker_b": "Gina",
      "session_1_date_time": "4:04 pm on 20 January, 2023",
      "session_1": [
        {"speaker": "Jon", "dia_id": "D1:1", "text": "I lost my job as a banker."},
        {"speaker": "Gina", "dia_id": "D1:2", "text": "I lost mine too."}
      ],
      "session_2_date_time": "2:32 pm on 29 January, 2023",
      "session_2": [
        {"speaker": "Gina", "dia_id": "D2:1", "text": "I started my clothing store."}
      ]
    },
    "qa": [
      {"question": "What did Jon and Gina both lose?", "answer": "their jobs", "evidence": "D1:1; D1:2", "category": 1}
    ]
  }
]"#;

const RECORDS: &str = r#"[
  {"id": "p0", "relation_type": "state", "cue_dialogue": "A: My doctor told me to cut down on salt.\nB: That's a big change.", "trigger_query": "B: Want to share a bag of chips?", "time_gap": "two weeks later"},
  {"id": "p1", "relation_type": "goal", "cue_dialogue": "A: I'm saving up for a trip to Japan.", "trigger_query": "B: Shall we book that fancy dinner?", "time_gap": "three years later"},
  {"id": "p2", "relation_type": "value", "cue_dialogue": [{"role": "B", "text": "I stopped eating meat."}], "trigger_query": {"role": "A", "text": "Burgers tonight?"}, "time_gap": "next session"}
]"#;

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("locomo10.json"), CONVERSATIONS).unwrap();
        std::fs::write(dir.path().join("locomo_plus.json"), RECORDS).unwrap();
        Workspace { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    #[allow(deprecated)]
    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("cuebench").unwrap();
        cmd.current_dir(self.dir.path());
        cmd.env_remove("CUEBENCH_CONFIG");
        cmd.env_remove("OPENAI_BASE_URL");
        cmd.env("RUST_LOG", "warn");
        cmd
    }

    fn build(&self, sub: &str, seed: u64, out: &str) -> std::process::Output {
        let seed = seed.to_string();
        self.cmd()
            .args(["--seed", seed.as_str(), sub])
            .args(["--conversations", "locomo10.json", "--cue-queries", "locomo_plus.json"])
            .args(["--out", out])
            .output()
            .unwrap()
    }
}

fn read_json(path: &Path) -> serde_json::Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn stitch_writes_chronological_timelines() {
    let ws = Workspace::new();
    let output = ws.build("stitch", 42, "stitched.json");
    assert!(output.status.success());

    let contexts = read_json(&ws.path("stitched.json"));
    let contexts = contexts.as_array().unwrap();
    assert_eq!(contexts.len(), 2);
    for ctx in contexts {
        let sessions = ctx["sessions"].as_array().unwrap();
        let stamps: Vec<&str> = sessions.iter().map(|s| s["timestamp"].as_str().unwrap()).collect();
        let mut sorted = stamps.clone();
        sorted.sort();
        assert_eq!(stamps, sorted);

        let kinds: Vec<&str> = sessions.iter().map(|s| s["kind"].as_str().unwrap()).collect();
        let cue = kinds.iter().position(|k| *k == "cue").unwrap();
        let query = kinds.iter().position(|k| *k == "query").unwrap();
        assert!(cue < query);
        assert_eq!(ctx["cue_index"], cue as u64 + 1);
        assert_eq!(ctx["query_index"], query as u64 + 1);
    }
}

#[test]
fn unresolvable_gap_is_skipped_and_reported() {
    let ws = Workspace::new();
    let output = ws.build("stitch", 42, "stitched.json");
    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("skipping record p1"), "stderr: {stderr}");
    assert!(stderr.contains("stitched 2 of 3 records, 1 skipped"), "stderr: {stderr}");
}

#[test]
fn unify_is_reproducible_for_a_seed() {
    let ws = Workspace::new();
    assert!(ws.build("unify", 9, "a.json").status.success());
    assert!(ws.build("unify", 9, "b.json").status.success());
    let a = std::fs::read(ws.path("a.json")).unwrap();
    let b = std::fs::read(ws.path("b.json")).unwrap();
    assert_eq!(a, b);

    let samples = read_json(&ws.path("a.json"));
    let cats: Vec<&str> = samples
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["category"].as_str().unwrap())
        .collect();
    assert_eq!(cats, ["single-hop", "temporal", "adversarial", "multi-hop", "Cognitive", "Cognitive"]);
    assert_eq!(samples[3]["evidence"], "Jon：I lost my job as a banker.\nGina：I lost mine too.");
    assert!(samples[2].get("answer").is_none());
    assert_eq!(samples[4]["id"], "cognitive:p0");
    assert_eq!(samples[4]["time_gap"], "two weeks later");
    assert!(samples[4].get("answer").is_none());
}

#[test]
fn config_file_controls_inspection_copy() {
    let ws = Workspace::new();
    std::fs::write(
        ws.path("cuebench.toml"),
        r#"
save_inspection_copy = true
inspection_path = "inspect/samples.json"
seed = 3

[data]
conversations = "locomo10.json"
cue_queries = "locomo_plus.json"
sample_limit = 1

[stitch]
pairing = "round_robin"
"#,
    )
    .unwrap();
    let output = ws.cmd().args(["unify", "--out", "unified.json"]).output().unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let inspect = read_json(&ws.path("inspect/samples.json"));
    assert_eq!(inspect, read_json(&ws.path("unified.json")));
    let samples = inspect.as_array().unwrap();
    assert_eq!(samples.len(), 5);
    assert_eq!(samples[4]["speaker_a"], "Caroline");
}

#[test]
fn evaluate_judge_and_summarize_with_echo_backend() {
    let ws = Workspace::new();
    assert!(ws.build("unify", 42, "unified.json").status.success());

    ws.cmd()
        .args(["evaluate", "--input", "unified.json", "--out", "predictions.json", "--concurrency", "3"])
        .assert()
        .success();
    let preds = read_json(&ws.path("predictions.json"));
    let preds = preds.as_array().unwrap();
    assert_eq!(preds.len(), 6);
    assert_eq!(preds[0]["question_input"], "What did Melanie paint?");
    assert_eq!(preds[0]["prediction"], "Question: What did Melanie paint?");
    assert_eq!(preds[0]["model"], "mock");
    assert_eq!(preds[2]["ground_truth"], "");
    assert_eq!(preds[4]["category"], "Cognitive");
    assert_eq!(preds[4]["time_gap"], "two weeks later");

    let output = ws
        .cmd()
        .args(["judge", "--input", "predictions.json", "--out", "judged.json"])
        .args(["--backend", "echo", "--summary-file", "summary.json"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Judge score summary"));

    let judged = read_json(&ws.path("judged.json"));
    assert_eq!(judged.as_array().unwrap().len(), 6);
    assert!(judged[0]["judge_label"].is_string());

    let summary = read_json(&ws.path("summary.json"));
    assert_eq!(summary["total_samples"], 6);
    assert_eq!(summary["scored_samples"], 6);
    assert_eq!(summary["by_category"]["Cognitive"]["count"], 2);

    ws.cmd()
        .args(["summarize", "--input", "judged.json", "--summary-file", "again.json"])
        .assert()
        .success();
    assert_eq!(read_json(&ws.path("again.json")), summary);
}

#[test]
fn missing_input_fails_with_config_error() {
    let ws = Workspace::new();
    let output = ws
        .cmd()
        .args(["stitch", "--conversations", "nope.json", "--out", "s.json"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("cuebench: config: input not found"), "stderr: {stderr}");
}

#[test]
fn invalid_config_is_rejected() {
    let ws = Workspace::new();
    std::fs::write(ws.path("bad.toml"), "[stitch]\nmax_attempts = 0\n").unwrap();
    let output = ws
        .cmd()
        .args(["--config", "bad.toml", "stitch", "--out", "s.json"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("max_attempts"));
}
