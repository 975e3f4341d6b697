use std::env;
use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};

use hsdb_core::config::Config;
use hsdb_core::events::EngineEvent;
use hsdb_core::verdict::{FinalAnswer, Outcome};
use hsdb_dispatch::FrequencyAnalyst;
use hsdb_engine::{Engine, QueryKind, Response};

const USAGE: &str = "Usage: hsdb [--json] <domestic|overseas|manual|fuse|raw|lookup> \"<question>\"";

enum Command {
    Ask(QueryKind),
    Lookup,
}

fn parse_args() -> (bool, Command, String) {
    let mut args: Vec<String> = env::args().skip(1).collect();
    let json = match args.iter().position(|a| a == "--json") {
        Some(i) => { args.remove(i); true }
        None => false,
    };
    if args.len() < 2 { eprintln!("{USAGE}"); std::process::exit(1); }
    let command = match args.remove(0).as_str() {
        "lookup" => Command::Lookup,
        other => Command::Ask(other.parse::<QueryKind>().unwrap_or_else(|e| {
            eprintln!("{e}\n{USAGE}"); std::process::exit(1)
        })),
    };
    (json, command, args.join(" "))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let (json, command, question) = parse_args();
    let config = Config::load().map_err(|e| { eprintln!("Error loading config: {}", e); e })?;
    let engine = Engine::from_config(&config, Arc::new(FrequencyAnalyst))?;

    let kind = match command {
        Command::Ask(kind) => kind,
        Command::Lookup => {
            let hits = engine.lookup_domestic(&question, 10)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&hits)?);
            } else {
                for (i, hit) in hits.iter().enumerate() {
                    let code = hit.document.code().unwrap_or("-");
                    println!("  {}. score={:.4}  id={}  code={}", i + 1, hit.candidate.score, hit.candidate.id, code);
                }
            }
            return Ok(());
        }
    };

    let steps = match kind {
        QueryKind::DomesticCases | QueryKind::OverseasCases => engine.settings().search.group_count as u64,
        QueryKind::ManualWithCodes => 1,
        QueryKind::ManualFusion => 2,
        QueryKind::ManualRaw => 0,
    };
    let pb = ProgressBar::new(steps);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:30.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );
    let mut rx = engine.events().subscribe();
    let progress = {
        let pb = pb.clone();
        tokio::spawn(async move {
            while let Ok(event) = rx.recv().await {
                match event {
                    EngineEvent::GroupCompleted { group, .. } => { pb.set_message(format!("group {group} done")); pb.inc(1) }
                    EngineEvent::GroupFailed { group, reason } => { pb.set_message(format!("group {group}: {reason}")); pb.inc(1) }
                    EngineEvent::PathCompleted { path, .. } => { pb.set_message(format!("{path} path done")); pb.inc(1) }
                    EngineEvent::PathFailed { path, reason } => { pb.set_message(format!("{path} path: {reason}")); pb.inc(1) }
                    EngineEvent::GroupStarted { .. } => {}
                }
            }
        })
    };

    let response = engine.handle(kind, &question).await;
    progress.abort();
    pb.finish_and_clear();
    let response = response?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }
    match response {
        Response::Answer(answer) => print_answer(&answer),
        Response::Comparison(comparison) => {
            for dossier in &comparison.dossiers {
                let name = dossier.tariff.as_ref().map(|t| t.name_ko.as_str()).unwrap_or("-");
                println!("[{}] {}", dossier.code, name);
                if !dossier.excerpt.is_empty() { println!("  {}", dossier.excerpt.replace('\n', "\n  ")); }
            }
            println!();
            print_answer(&comparison.answer);
        }
        Response::Manual(entries) => {
            if entries.is_empty() { println!("No manual entry for the requested codes."); }
            for entry in entries {
                println!("== {} ==\n{}\n", entry.code, entry.text());
            }
        }
    }
    Ok(())
}

fn print_answer(answer: &FinalAnswer) {
    match &answer.outcome {
        Outcome::Answer { code, confidence } => println!("Answer: {code} ({confidence})"),
        Outcome::NoConsensus => println!("No code was supported by the evidence."),
        Outcome::Unavailable => println!("Analysis unavailable: every evidence source failed."),
        Outcome::Empty => println!("No matching evidence."),
    }
    for (i, entry) in answer.ranking.iter().enumerate() {
        println!("  {}. {}  support={}  {}", i + 1, entry.code, entry.support, entry.confidence);
    }
    for verdict in answer.verdicts() {
        let summary = verdict.analysis.as_ref().map(|a| a.summary.as_str()).unwrap_or("");
        println!("  group {} ({} docs, {:?}): {}", verdict.group, verdict.documents, verdict.status, summary);
    }
}
