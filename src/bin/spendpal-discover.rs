//! Run category discovery over the unmatched narrations of a record file.

use std::path::PathBuf;

use spendpal::classify::AdaptiveClassifier;
use spendpal::records::load_records_jsonl;

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

    let mut engine = AdaptiveClassifier::from_rules_file(&options.rules_path)
        .map_err(|err| err.to_string())?;
    let records = load_records_jsonl(&options.input_path).map_err(|err| err.to_string())?;
    let results = engine.classify_batch(&records);

    let unknown_texts: Vec<String> = results
        .iter()
        .filter(|result| result.is_unknown())
        .map(|result| result.narration.clone())
        .collect();
    println!(
        "{} of {} records unmatched; running discovery",
        unknown_texts.len(),
        records.len()
    );

    let discovered = engine.discover_new_categories(&unknown_texts)?;
    if discovered.is_empty() {
        println!("no candidate categories found");
        return Ok(());
    }

    for (name, category) in &discovered {
        println!(
            "{name}: {} members, keywords: {}",
            category.size,
            category.induced_keywords.join(", ")
        );
        for text in &category.sample_texts {
            println!("    {text}");
        }
    }

    if let Some(path) = &options.report_out {
        let json = serde_json::to_string_pretty(&discovered).map_err(|err| err.to_string())?;
        std::fs::write(path, json).map_err(|err| err.to_string())?;
        println!("report written to {}", path.display());
    }
    Ok(())
}

#[derive(Debug, Clone)]
struct CliOptions {
    rules_path: PathBuf,
    input_path: PathBuf,
    report_out: Option<PathBuf>,
}

fn parse_args(args: Vec<String>) -> Result<Option<CliOptions>, String> {
    let mut rules_path = PathBuf::from("assets/keyword_rules.toml");
    let mut input_path: Option<PathBuf> = None;
    let mut report_out: Option<PathBuf> = None;

    let mut idx = 0usize;
    while idx < args.len() {
        match args[idx].as_str() {
            "-h" | "--help" => {
                println!(
                    "spendpal-discover --input <records.jsonl> [--rules <toml>] [--out <report.json>]"
                );
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
            "--out" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--out requires a value".to_string())?;
                report_out = Some(PathBuf::from(value));
            }
            other => return Err(format!("Unknown argument: {other}")),
        }
        idx += 1;
    }

    let input_path = input_path.ok_or_else(|| "--input is required".to_string())?;
    Ok(Some(CliOptions {
        rules_path,
        input_path,
        report_out,
    }))
}
