//! Classify a single narration or a JSONL batch from rules or a saved bundle.

use std::path::PathBuf;

use spendpal::classify::AdaptiveClassifier;
use spendpal::persist;
use spendpal::records::{load_records_jsonl, write_results_jsonl};

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let Some(options) = parse_args(std::env::args().skip(1).collect())? else {
        return Ok(());
    };

    let mut engine = match (&options.bundle_path, &options.rules_path) {
        (Some(path), _) => persist::load_engine(path).map_err(|err| err.to_string())?,
        (None, Some(path)) => {
            AdaptiveClassifier::from_rules_file(path).map_err(|err| err.to_string())?
        }
        (None, None) => return Err("Either --model or --rules is required".to_string()),
    };

    match options.mode {
        Mode::Single { text, amount } => {
            let result = engine.classify_single(&text, amount);
            let json = serde_json::to_string_pretty(&result).map_err(|err| err.to_string())?;
            println!("{json}");
        }
        Mode::Batch { input, out } => {
            let records = load_records_jsonl(&input).map_err(|err| err.to_string())?;
            let results = engine.classify_batch(&records);
            let stats = engine.stats();
            println!(
                "classified {} rows: {} rule-based / {} ml-based",
                stats.total_classified, stats.rule_based_count, stats.ml_based_count
            );
            match out {
                Some(path) => {
                    write_results_jsonl(&path, &results).map_err(|err| err.to_string())?;
                    println!("results written to {}", path.display());
                }
                None => {
                    for result in &results {
                        let line =
                            serde_json::to_string(result).map_err(|err| err.to_string())?;
                        println!("{line}");
                    }
                }
            }
        }
    }
    Ok(())
}

#[derive(Debug, Clone)]
enum Mode {
    Single {
        text: String,
        amount: Option<f64>,
    },
    Batch {
        input: PathBuf,
        out: Option<PathBuf>,
    },
}

#[derive(Debug, Clone)]
struct CliOptions {
    rules_path: Option<PathBuf>,
    bundle_path: Option<PathBuf>,
    mode: Mode,
}

fn parse_args(args: Vec<String>) -> Result<Option<CliOptions>, String> {
    let mut rules_path: Option<PathBuf> = None;
    let mut bundle_path: Option<PathBuf> = None;
    let mut text: Option<String> = None;
    let mut amount: Option<f64> = None;
    let mut input: Option<PathBuf> = None;
    let mut out: Option<PathBuf> = None;

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
                rules_path = Some(PathBuf::from(value));
            }
            "--model" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--model requires a value".to_string())?;
                bundle_path = Some(PathBuf::from(value));
            }
            "--text" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--text requires a value".to_string())?;
                text = Some(value.clone());
            }
            "--amount" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--amount requires a value".to_string())?;
                amount = Some(
                    value
                        .parse::<f64>()
                        .map_err(|_| format!("Invalid --amount value: {value}"))?,
                );
            }
            "--input" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--input requires a value".to_string())?;
                input = Some(PathBuf::from(value));
            }
            "--out" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--out requires a value".to_string())?;
                out = Some(PathBuf::from(value));
            }
            other => return Err(format!("Unknown argument: {other}")),
        }
        idx += 1;
    }

    let mode = match (text, input) {
        (Some(text), None) => Mode::Single { text, amount },
        (None, Some(input)) => Mode::Batch { input, out },
        (Some(_), Some(_)) => {
            return Err("--text and --input are mutually exclusive".to_string());
        }
        (None, None) => return Err("Either --text or --input is required".to_string()),
    };

    Ok(Some(CliOptions {
        rules_path,
        bundle_path,
        mode,
    }))
}

fn help_text() -> String {
    [
        "spendpal-classify (--rules <toml> | --model <bundle.json>) (--text <narration> [--amount <n>] | --input <records.jsonl> [--out <path>])",
        "",
        "Single mode prints one result as JSON; batch mode prints JSONL or",
        "writes it to --out. Batch mode uses the learned fallback when the",
        "bundle carries a trained model.",
    ]
    .join("\n")
}
