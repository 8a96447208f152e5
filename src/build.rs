//! Batch build: pair every cue/query record with a conversation, stitch,
//! and flatten everything into the unified dataset.
//!
//! A record that cannot be placed is retried against a fresh draw; once
//! `max_attempts` is spent (or the record is malformed) it is skipped,
//! logged, and counted in the [`BuildReport`]. Only configuration problems
//! abort the batch.

use crate::CuebenchError;
use crate::config::{CuebenchConfig, StitchConfig};
use crate::pairing::Pairer;
use crate::record::{CueQueryRecord, RawCueQueryRecord, load_records};
use crate::stitch::{StitchParams, StitchedContext, stitch};
use crate::store::{Conversation, ConversationStore};
use crate::unify::{UnifiedSample, unify};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RecordFailure {
    pub record_id: String,
    pub error: String,
    /// Pairing attempts made; 0 when the record was rejected before pairing.
    pub attempts: u32,
}

#[derive(Debug, Default)]
pub struct BuildReport {
    pub contexts: Vec<StitchedContext>,
    pub failures: Vec<RecordFailure>,
    pub attempted: usize,
}

impl BuildReport {
    pub fn stitched(&self) -> usize {
        self.contexts.len()
    }

    pub fn skipped(&self) -> usize {
        self.failures.len()
    }
}

/// Stitch every record into a conversation from `pool`, in record order.
pub fn stitch_all<R: Rng + ?Sized>(
    pool: &[&Conversation],
    records: &[RawCueQueryRecord],
    config: &StitchConfig,
    rng: &mut R,
) -> Result<BuildReport, CuebenchError> {
    let mut report = BuildReport {
        attempted: records.len(),
        ..BuildReport::default()
    };
    if records.is_empty() {
        return Ok(report);
    }

    let mut pairer = Pairer::new(config.pairing, pool.len())?;
    let params = StitchParams::from_config(config);

    for (position, raw) in records.iter().enumerate() {
        let record = match CueQueryRecord::from_raw(raw, position) {
            Ok(r) => r,
            Err(e) => {
                let record_id = raw.record_id(position);
                log::warn!("skipping record {record_id}: {e}");
                report.failures.push(RecordFailure {
                    record_id,
                    error: e.to_string(),
                    attempts: 0,
                });
                continue;
            }
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            let conv = pool[pairer.next(rng)];
            match stitch(conv, &record, &params, config.role_mapping, rng) {
                Ok(ctx) => {
                    log::debug!(
                        "record {} -> {} (attempt {attempt})",
                        record.id,
                        conv.sample_id
                    );
                    report.contexts.push(ctx);
                    break;
                }
                Err(e) if e.is_retryable() && attempt < config.max_attempts => {
                    log::debug!("record {} attempt {attempt} on {}: {e}", record.id, conv.sample_id);
                }
                Err(e) => {
                    log::warn!(
                        "skipping record {} after {attempt} attempt(s): {e}",
                        record.id
                    );
                    report.failures.push(RecordFailure {
                        record_id: record.id.clone(),
                        error: e.to_string(),
                        attempts: attempt,
                    });
                    break;
                }
            }
        }
    }

    log::info!(
        "stitched {} of {} records ({} skipped)",
        report.stitched(),
        report.attempted,
        report.skipped()
    );
    Ok(report)
}

fn load_inputs(config: &CuebenchConfig) -> Result<(ConversationStore, Vec<RawCueQueryRecord>), CuebenchError> {
    let store = ConversationStore::from_file(&config.data.conversations)?;
    let mut records = load_records(&config.data.cue_queries)?;
    if let Some(limit) = config.data.sample_limit {
        records.truncate(limit);
    }
    Ok((store, records))
}

/// Load inputs and stitch with an RNG seeded from the config.
pub fn build_contexts(config: &CuebenchConfig) -> Result<(ConversationStore, BuildReport), CuebenchError> {
    let (store, records) = load_inputs(config)?;
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let report = {
        let pool = store.stitchable();
        stitch_all(&pool, &records, &config.stitch, &mut rng)?
    };
    Ok((store, report))
}

/// Full build: stitched contexts plus the unified dataset. Writes the
/// inspection copy when configured.
pub fn build_dataset(config: &CuebenchConfig) -> Result<(Vec<UnifiedSample>, BuildReport), CuebenchError> {
    let (store, report) = build_contexts(config)?;
    let samples = unify(&store, &report.contexts, config.stitch.truncate_after_query);
    if config.save_inspection_copy {
        crate::write_json(&config.inspection_path, &samples)?;
        log::info!(
            "wrote {} samples to {} (inspection)",
            samples.len(),
            config.inspection_path.display()
        );
    }
    Ok((samples, report))
}

fn print_report(report: &BuildReport) {
    eprintln!(
        "cuebench: stitched {} of {} records, {} skipped",
        report.stitched(),
        report.attempted,
        report.skipped()
    );
    for f in &report.failures {
        eprintln!("  {}: {}", f.record_id, f.error);
    }
}

pub fn handle_stitch(config: &CuebenchConfig, out: &Path) -> Result<(), CuebenchError> {
    let (_, report) = build_contexts(config)?;
    crate::write_json(out, &report.contexts)?;
    print_report(&report);
    eprintln!("cuebench: wrote {} stitched contexts to {}", report.stitched(), out.display());
    Ok(())
}

pub fn handle_unify(config: &CuebenchConfig, out: &Path) -> Result<(), CuebenchError> {
    let (samples, report) = build_dataset(config)?;
    crate::write_json(out, &samples)?;
    print_report(&report);
    eprintln!("cuebench: wrote {} samples to {}", samples.len(), out.display());
    Ok(())
}
