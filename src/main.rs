mod clustering;
mod config;
mod document;
mod error;
mod graph;
mod lexicon;
mod marks;
mod mention;
mod names;
mod scanner;
mod scorer;
mod session;
mod speaker;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{CommandFactory, Parser, Subcommand};
use speaker_types::PipelineOutput;
use tracing_subscriber::EnvFilter;

use config::{AttributionConfig, ResolutionConfig};
use document::Document;
use error::Result;
use lexicon::Lexicon;
use scorer::MlpScorer;
use session::ResolutionSession;

#[derive(Parser)]
#[command(
    name = "novel_speakers",
    about = "Character identity resolution and quote speaker attribution for annotated novels"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve characters and attribute every quote → JSON
    Run {
        /// Annotated corpus (JSON)
        #[arg(long)]
        corpus: PathBuf,
        /// Directory with the language resources
        #[arg(long, default_value = "vocab")]
        vocab: PathBuf,
        /// Edge scoring model (JSON)
        #[arg(long)]
        model: Option<PathBuf>,
        /// Edges at or above this probability are never cut
        #[arg(long)]
        maxprob: Option<f64>,
        /// Components with fewer occurrences are dropped
        #[arg(long)]
        removelimit: Option<usize>,
        /// Known character list; skips identity resolution
        #[arg(long)]
        characters: Option<PathBuf>,
        /// Output file (stdout when omitted)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Write edge feature vectors of every corpus under a path → *.weights
    Weights {
        /// Corpus file or directory to walk
        #[arg(long)]
        path: PathBuf,
        /// Directory with the language resources
        #[arg(long, default_value = "vocab")]
        vocab: PathBuf,
    },
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Some(Command::Run {
            corpus,
            vocab,
            model,
            maxprob,
            removelimit,
            characters,
            out,
        }) => {
            let mut config = ResolutionConfig::default();
            if let Some(p) = maxprob {
                config.edge_maxprob = p;
            }
            if let Some(limit) = removelimit {
                config.character_remove_limit = limit;
            }
            run_pipeline(&RunArgs {
                corpus: &corpus,
                vocab: &vocab,
                model: model.as_deref(),
                characters: characters.as_deref(),
                out: out.as_deref(),
                config,
            })
        }
        Some(Command::Weights { path, vocab }) => run_weights(&path, &vocab),
        None => {
            let _ = Cli::command().print_help();
            return ExitCode::SUCCESS;
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if e.is_configuration() {
                eprintln!("Configuration error: {e}");
            } else {
                eprintln!("Error: {e}");
            }
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

// ═══════════════════════════════════════════════════════════════════════
//  RUN MODE: corpus → characters → speakers
// ═══════════════════════════════════════════════════════════════════════

struct RunArgs<'a> {
    corpus: &'a Path,
    vocab: &'a Path,
    model: Option<&'a Path>,
    characters: Option<&'a Path>,
    out: Option<&'a Path>,
    config: ResolutionConfig,
}

fn run_pipeline(args: &RunArgs<'_>) -> Result<()> {
    let lexicon = Lexicon::load(args.vocab)?;
    let doc = Document::new(scanner::load_corpus(args.corpus)?, &lexicon);
    let mut resolver = ResolutionSession::new(&doc, &lexicon, args.config.clone());

    let resolution = match (args.characters, args.model) {
        (Some(path), _) => resolver.with_characters(session::load_characters(path)?),
        (None, Some(model)) => {
            let scorer = MlpScorer::load(model)?;
            resolver.resolve(&scorer)?
        }
        (None, None) => {
            return Err(error::Error::scorer(
                "<none>",
                "pass --model, or --characters to skip resolution",
            ));
        }
    };

    let output = resolution.attribute(&doc, &lexicon, &AttributionConfig::default());
    print_statistics(&doc, &output);

    let json = serde_json::to_string_pretty(&output)?;
    match args.out {
        Some(path) => {
            std::fs::write(path, &json)?;
            eprintln!("  {} ({} bytes)", path.display(), json.len());
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn print_statistics(doc: &Document, output: &PipelineOutput) {
    eprintln!("\n══════════════════════════════════════════");
    eprintln!("  ATTRIBUTION STATISTICS");
    eprintln!("══════════════════════════════════════════");

    let quoted = output.speakers.len();
    let attributed = output.speakers.iter().filter(|s| s.speaker.is_some()).count();
    eprintln!("Units: {} ({quoted} with quotes)", doc.len());
    eprintln!("Characters: {}", output.characters.len());
    eprintln!("Quotes attributed: {attributed}/{quoted}");

    let mut by_sieve = std::collections::HashMap::new();
    for s in &output.speakers {
        if let Some(sieve) = &s.speaker_sieve {
            *by_sieve.entry(sieve.as_str()).or_insert(0usize) += 1;
        }
    }
    let mut sieve_counts: Vec<_> = by_sieve.into_iter().collect();
    sieve_counts.sort_by_key(|(_, c)| std::cmp::Reverse(*c));
    eprintln!("\nBy speaker sieve:");
    for (sieve, count) in &sieve_counts {
        eprintln!("  {sieve}: {count}");
    }

    let mut characters: Vec<_> = output.characters.iter().collect();
    characters.sort_by_key(|c| std::cmp::Reverse(c.occurrences()));
    eprintln!("\nTop characters:");
    for c in characters.iter().take(10) {
        eprintln!(
            "  #{:<4} {} [{}] ({} mentions, {} variants)",
            c.id,
            c.display_name(),
            c.gender.as_char(),
            c.occurrences(),
            c.variants.len()
        );
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  WEIGHTS MODE: edge feature export for model training
// ═══════════════════════════════════════════════════════════════════════

fn run_weights(root: &Path, vocab: &Path) -> Result<()> {
    let lexicon = Lexicon::load(vocab)?;
    let corpora = scanner::scan_corpora(root);
    eprintln!("Found {} corpus files under {}", corpora.len(), root.display());

    let config = ResolutionConfig::default();
    let mut written = 0;
    for path in &corpora {
        let corpus = match scanner::load_corpus(path) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!("skipping {}: {e}", path.display());
                continue;
            }
        };
        let doc = Document::new(corpus, &lexicon);
        match graph::UnificationGraph::build(&doc, &lexicon, &config) {
            Ok(graph) => {
                let out = scanner::write_weights(path, &graph)?;
                eprintln!("  {} ({} edges)", out.display(), graph.feature_rows().len());
                written += 1;
            }
            Err(e) => tracing::warn!("skipping {}: {e}", path.display()),
        }
    }
    eprintln!("Wrote {written}/{} weight files", corpora.len());
    Ok(())
}
