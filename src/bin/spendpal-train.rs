//! Training pipeline: rule-based pass, category discovery, fallback training,
//! and a final re-classification, with artifacts written to disk.

use std::path::PathBuf;

use spendpal::classify::{AdaptiveClassifier, TrainOutcome, metrics};
use spendpal::persist;
use spendpal::records::{load_records_jsonl, write_results_jsonl};

fn main() {
    if let Err(err) = spendpal::logging::init() {
        eprintln!("Logging setup failed: {err}");
    }
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let Some(options) = parse_args(std::env::args().skip(1).collect())? else {
        return Ok(());
    };

    let mut engine = AdaptiveClassifier::from_rules_file(&options.rules_path)
        .map_err(|err| err.to_string())?;
    let records = load_records_jsonl(&options.input_path).map_err(|err| err.to_string())?;
    if records.is_empty() {
        return Err("Input file contains no records".to_string());
    }
    tracing::info!(
        total_records = records.len(),
        unknown_threshold = engine.rules().unknown_threshold,
        "Starting training run"
    );

    // Rule-based pass over the full batch.
    let labeled = engine.classify_batch(&records);
    let rule_based_coverage = metrics::coverage(&labeled);
    tracing::info!(rule_based_coverage, "Rule-based pass complete");

    // Discover candidate categories from the Unknown subset.
    let unknown_texts: Vec<String> = labeled
        .iter()
        .filter(|result| result.is_unknown())
        .map(|result| result.narration.clone())
        .collect();
    let discovered = engine.discover_new_categories(&unknown_texts)?;
    tracing::info!(discovered_clusters = discovered.len(), "Discovery complete");
    if let Some(path) = &options.discoveries_out {
        let json = serde_json::to_string_pretty(&discovered).map_err(|err| err.to_string())?;
        std::fs::write(path, json).map_err(|err| err.to_string())?;
    }

    // Train the fallback on rule-labeled rows.
    let outcome = engine.train_fallback(&labeled)?;
    let final_results = match outcome {
        TrainOutcome::Trained { samples, classes } => {
            println!("Fallback model trained on {samples} samples ({classes} classes)");
            // Re-classify with the fallback available.
            engine.classify_batch(&records)
        }
        TrainOutcome::SkippedTooFewSamples { labeled: count } => {
            println!("Not enough labeled data for training ({count} labeled rows)");
            labeled
        }
        TrainOutcome::SkippedSingleClass { labeled: count } => {
            println!("Skipping training: all {count} labeled rows share one category");
            labeled
        }
        TrainOutcome::SkippedEmptyVocabulary { labeled: count } => {
            println!("Skipping training: {count} labeled rows yielded no vocabulary terms");
            labeled
        }
    };

    let final_coverage = metrics::coverage(&final_results);
    let review_count = metrics::review_count(&final_results);
    tracing::info!(final_coverage, review_count, "Final classification complete");
    for (category, count) in metrics::category_distribution(&final_results) {
        println!("{category:<20} {count:>6}");
    }
    let stats = engine.stats();
    println!(
        "classified {} rows: {} rule-based / {} ml-based ({:.1}% rule-based)",
        stats.total_classified,
        stats.rule_based_count,
        stats.ml_based_count,
        stats.rule_based_pct * 100.0
    );

    write_results_jsonl(&options.classified_out, &final_results)
        .map_err(|err| err.to_string())?;
    persist::save_engine(&options.model_out, &engine).map_err(|err| err.to_string())?;
    println!(
        "model bundle written to {}, results to {}",
        options.model_out.display(),
        options.classified_out.display()
    );
    Ok(())
}

#[derive(Debug, Clone)]
struct CliOptions {
    rules_path: PathBuf,
    input_path: PathBuf,
    model_out: PathBuf,
    classified_out: PathBuf,
    discoveries_out: Option<PathBuf>,
}

fn parse_args(args: Vec<String>) -> Result<Option<CliOptions>, String> {
    let mut rules_path = PathBuf::from("assets/keyword_rules.toml");
    let mut input_path: Option<PathBuf> = None;
    let mut model_out = PathBuf::from("model_bundle.json");
    let mut classified_out = PathBuf::from("classified.jsonl");
    let mut discoveries_out: Option<PathBuf> = None;

    let mut idx = 0usize;
    while idx < args.len() {
        match args[idx].as_str() {
            "-h" | "--help" => {
                println!("{}", help_text());
                return Ok(None);
            }
            "--rules" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--rules requires a value".to_string())?;
                rules_path = PathBuf::from(value);
            }
            "--input" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--input requires a value".to_string())?;
                input_path = Some(PathBuf::from(value));
            }
            "--model-out" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--model-out requires a value".to_string())?;
                model_out = PathBuf::from(value);
            }
            "--classified-out" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--classified-out requires a value".to_string())?;
                classified_out = PathBuf::from(value);
            }
            "--discoveries-out" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--discoveries-out requires a value".to_string())?;
                discoveries_out = Some(PathBuf::from(value));
            }
            other => return Err(format!("Unknown argument: {other}")),
        }
        idx += 1;
    }

    let input_path = input_path.ok_or_else(|| "--input is required".to_string())?;
    Ok(Some(CliOptions {
        rules_path,
        input_path,
        model_out,
        classified_out,
        discoveries_out,
    }))
}

fn help_text() -> String {
    [
        "spendpal-train --input <records.jsonl> [options]",
        "",
        "Options:",
        "  --rules <path>            Rules TOML (default: assets/keyword_rules.toml)",
        "  --input <path>            Transaction records, one JSON object per line",
        "  --model-out <path>        Model bundle output (default: model_bundle.json)",
        "  --classified-out <path>   Classified results output (default: classified.jsonl)",
        "  --discoveries-out <path>  Discovered-category report output (optional)",
    ]
    .join("\n")
}
