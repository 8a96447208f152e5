use crate::config::{BackendKind, CuebenchConfig, ModelConfig};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "cuebench",
    version,
    about = "Stitch cue/trigger sessions into LoCoMo dialogues and score memory benchmarks"
)]
pub struct Cli {
    /// Config file (TOML). Defaults to ./cuebench.toml when present
    #[arg(long, env = "CUEBENCH_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Seed for every random choice in the build
    #[arg(long, global = true)]
    pub seed: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Stitch cue/query records into conversations and write the timelines
    Stitch(StitchArgs),
    /// Build the unified dataset (LoCoMo QA + Cognitive samples)
    Unify(StitchArgs),
    /// Run a model over the unified dataset and write predictions
    Evaluate(EvaluateArgs),
    /// Score predictions with an LLM judge and print the summary
    Judge(JudgeArgs),
    /// Recompute the summary from judged records
    Summarize(SummarizeArgs),
}

#[derive(Args)]
pub struct StitchArgs {
    /// LoCoMo conversations JSON
    #[arg(long)]
    pub conversations: Option<PathBuf>,

    /// Cue/query records JSON
    #[arg(long)]
    pub cue_queries: Option<PathBuf>,

    /// Use only the first N cue/query records
    #[arg(long)]
    pub limit: Option<usize>,

    /// Output path (defaults to the configured data path)
    #[arg(long, short)]
    pub out: Option<PathBuf>,
}

impl StitchArgs {
    pub fn apply(&self, config: &mut CuebenchConfig) {
        if let Some(p) = &self.conversations {
            config.data.conversations = p.clone();
        }
        if let Some(p) = &self.cue_queries {
            config.data.cue_queries = p.clone();
        }
        if self.limit.is_some() {
            config.data.sample_limit = self.limit;
        }
    }
}

#[derive(Args)]
pub struct ModelArgs {
    /// Backend: echo or openai
    #[arg(long)]
    pub backend: Option<BackendKind>,

    /// Model name sent to the backend and recorded in outputs
    #[arg(long)]
    pub model: Option<String>,

    /// Chat completions endpoint
    #[arg(long)]
    pub endpoint: Option<String>,

    #[arg(long)]
    pub temperature: Option<f64>,

    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Concurrent requests
    #[arg(long)]
    pub concurrency: Option<usize>,
}

impl ModelArgs {
    pub fn apply(&self, model: &mut ModelConfig) {
        if let Some(b) = self.backend {
            model.backend = b;
        }
        if let Some(m) = &self.model {
            model.model = m.clone();
        }
        if let Some(e) = &self.endpoint {
            model.endpoint = e.clone();
        }
        if let Some(t) = self.temperature {
            model.temperature = t;
        }
        if let Some(n) = self.max_tokens {
            model.max_tokens = n;
        }
        if let Some(c) = self.concurrency {
            model.concurrency = c;
        }
    }
}

#[derive(Args)]
pub struct EvaluateArgs {
    /// Unified dataset (defaults to the configured data path)
    #[arg(long)]
    pub input: Option<PathBuf>,

    /// Predictions output
    #[arg(long, short)]
    pub out: PathBuf,

    #[command(flatten)]
    pub model: ModelArgs,
}

#[derive(Args)]
pub struct JudgeArgs {
    /// Predictions from `evaluate`
    #[arg(long)]
    pub input: PathBuf,

    /// Judged records output
    #[arg(long, short)]
    pub out: PathBuf,

    /// Also write the summary as JSON
    #[arg(long)]
    pub summary_file: Option<PathBuf>,

    #[command(flatten)]
    pub model: ModelArgs,
}

#[derive(Args)]
pub struct SummarizeArgs {
    /// Judged records from `judge`
    #[arg(long)]
    pub input: PathBuf,

    /// Also write the summary as JSON
    #[arg(long)]
    pub summary_file: Option<PathBuf>,
}
