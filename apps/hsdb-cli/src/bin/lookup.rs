use std::env;
use std::sync::Arc;

use hsdb_core::config::Config;
use hsdb_core::types::{CollectionKind, ATTR_CODE};
use hsdb_dispatch::FrequencyAnalyst;
use hsdb_engine::Engine;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: {} <domestic|overseas> <query> [k]", args[0]);
        eprintln!("Example: {} domestic '폴리우레탄폼 매트리스' 10", args[0]);
        std::process::exit(1);
    }
    let kind = match args[1].as_str() {
        "domestic" => CollectionKind::Domestic,
        "overseas" => CollectionKind::Overseas,
        other => { eprintln!("Unknown collection: {}", other); std::process::exit(1); }
    };
    let query_text = &args[2];
    let k = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(10);

    let config = Config::load()?;
    let engine = Engine::from_config(&config, Arc::new(FrequencyAnalyst))?;
    let hits = engine.lookup_cases(kind, query_text, k)?;
    println!("Found {} {} cases for: \"{}\"", hits.len(), kind, query_text);
    for (i, hit) in hits.iter().enumerate() {
        let code = hit.document.attribute(ATTR_CODE).unwrap_or("-");
        let snippet: String = hit.document.body.chars().take(120).collect();
        println!("\n  {}. score={:.4}  id={}  code={}", i + 1, hit.candidate.score, hit.candidate.id, code);
        println!("     {}", snippet);
    }
    Ok(())
}
