use std::io::Read;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use categorist::webhook::{handle_new_transactions, handle_updated_transactions, push_categories};
use categorist::{
    english_stop_words, rebuild_snapshot, server, AppState, Categorizer, Classifier, ClassifierBuilder,
    FireflyClient, FlushPolicy, LedgerConfig, PersistenceConfig, SnapshotStore, WebhookPayload,
};
use clap::{Parser, Subcommand, ValueEnum};
use log::{info, warn};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path of the model snapshot (defaults to the platform data directory)
    #[arg(long, global = true)]
    snapshot: Option<PathBuf>,

    /// Laplace smoothing constant
    #[arg(long, global = true, default_value_t = 1.0)]
    alpha: f64,

    /// Ignore tokens shorter than this many characters
    #[arg(long, global = true, default_value_t = 1)]
    min_token_length: usize,

    /// Drop common English connectives such as "the" and "of"
    #[arg(long, global = true)]
    english_stop_words: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the predicted category of a description
    Classify { text: String },
    /// Learn that a description belongs to a category
    Train { text: String, category: String },
    /// Train on every categorized transaction in the ledger (FF_APP, FF_API_KEY)
    Bootstrap {
        /// Retrain from scratch and replace the existing snapshot once done
        #[arg(short, long)]
        force: bool,
    },
    /// Serve the webhooks: POST / classifies, POST /learn trains (FF_APP, FF_API_KEY)
    Serve {
        #[arg(long, default_value = "0.0.0.0:8080")]
        listen: SocketAddr,
        /// Write the snapshot every N seconds instead of after every update
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        flush_interval: Option<u64>,
    },
    /// Show what the model has learned so far
    Info,
    /// Process a webhook body read from a file or stdin
    Webhook {
        #[arg(value_enum)]
        kind: HookKind,
        /// Read the payload from this file instead of stdin
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// Write classified categories back to the ledger
        #[arg(long)]
        push: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum HookKind {
    /// A transaction was stored and needs a category
    New,
    /// A transaction was updated with a confirmed category
    Update,
}

impl Args {
    fn builder(&self) -> anyhow::Result<ClassifierBuilder> {
        let mut builder = Classifier::builder()
            .with_smoothing(self.alpha)?
            .with_min_token_length(self.min_token_length);
        if self.english_stop_words {
            builder = builder.with_stop_words(english_stop_words());
        }
        Ok(builder)
    }

    fn persistence(&self) -> PersistenceConfig {
        match &self.snapshot {
            Some(path) => PersistenceConfig::new(path),
            None => PersistenceConfig::default(),
        }
    }
}

/// Opens the categorizer and bootstraps it from the ledger when there was
/// no usable snapshot. Without ledger credentials the model stays cold.
async fn open_ready(args: &Args) -> anyhow::Result<Categorizer> {
    let categorizer = Categorizer::open(args.builder()?, args.persistence())?;
    if categorizer.needs_bootstrap() {
        match LedgerConfig::from_env() {
            Ok(config) => {
                let client = FireflyClient::new(&config)?;
                categorizer.bootstrap_if_needed(&client, false).await?;
            }
            Err(e) => warn!("Skipping bootstrap: {}", e),
        }
    }
    Ok(categorizer)
}

fn read_payload(file: Option<&PathBuf>) -> anyhow::Result<WebhookPayload> {
    let body = match file {
        Some(path) => std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?,
        None => {
            let mut body = String::new();
            std::io::stdin().read_to_string(&mut body)?;
            body
        }
    };
    WebhookPayload::from_json(&body).context("bad data")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();
    let start_time = Instant::now();

    match &args.command {
        Command::Classify { text } => {
            let categorizer = open_ready(&args).await?;
            let prediction = categorizer.classifier().predict(text);
            println!("Predicted category: {}", prediction.category);
            if let Some(margin) = prediction.margin() {
                println!("  Margin over runner-up: {:.3}", margin);
            }
            println!("  Log-posterior scores:");
            for (label, score) in &prediction.scores {
                println!("    {}: {:.3}", label, score);
            }
        }
        Command::Train { text, category } => {
            let categorizer = open_ready(&args).await?;
            categorizer.on_category_confirmed(text, category)?;
            println!("Learned '{}' as '{}'", text, category.trim());
        }
        Command::Bootstrap { force } => {
            let client = FireflyClient::new(&LedgerConfig::from_env()?)?;
            if *force {
                let store = SnapshotStore::new(&args.persistence().snapshot_path);
                info!("Fresh bootstrap requested, rebuilding {:?}", store.path());
                let report = rebuild_snapshot(args.builder()?, &client, &store).await?;
                println!(
                    "Rebuilt model from {} record(s), skipped {} (took {:.2?})",
                    report.applied,
                    report.skipped,
                    start_time.elapsed()
                );
            } else {
                let categorizer = Categorizer::open(args.builder()?, args.persistence())?;
                match categorizer.bootstrap_if_needed(&client, false).await? {
                    Some(report) => println!(
                        "Bootstrap applied {} record(s), skipped {} (took {:.2?})",
                        report.applied,
                        report.skipped,
                        start_time.elapsed()
                    ),
                    None => println!("Model already trained; use --force to rebuild it"),
                }
            }
        }
        Command::Serve { listen, flush_interval } => {
            let client = Arc::new(FireflyClient::new(&LedgerConfig::from_env()?)?);
            let mut persistence = args.persistence();
            if let Some(secs) = flush_interval {
                persistence = persistence.with_flush_policy(FlushPolicy::Interval(Duration::from_secs(*secs)));
            }
            let categorizer = Arc::new(Categorizer::open(args.builder()?, persistence)?);
            categorizer.bootstrap_if_needed(client.as_ref(), false).await?;
            info!("Learned classes: {:?}", categorizer.classifier().info().class_labels);

            let flusher = categorizer.spawn_flusher();
            let listener = tokio::net::TcpListener::bind(listen)
                .await
                .with_context(|| format!("Failed to bind {}", listen))?;
            server::serve(listener, AppState::new(Arc::clone(&categorizer), Some(client))).await?;
            if let Some(flusher) = flusher {
                flusher.abort();
            }
        }
        Command::Info => {
            let categorizer = Categorizer::open(args.builder()?, args.persistence())?;
            let info = categorizer.classifier().info();
            println!("Snapshot: {:?}", categorizer.snapshot_store().path());
            println!("Documents: {}", info.total_documents);
            println!("Vocabulary: {} token(s)", info.vocabulary_size);
            println!("Classes ({}):", info.num_classes);
            for (label, docs) in &info.doc_counts {
                println!("  {}: {}", label, docs);
            }
        }
        Command::Webhook { kind, file, push } => {
            let payload = read_payload(file.as_ref())?;
            let categorizer = open_ready(&args).await?;
            match kind {
                HookKind::New => {
                    let results = handle_new_transactions(&categorizer, &payload);
                    for (id, category) in &results {
                        println!("{}\t{}", id, category);
                    }
                    if *push {
                        let client = FireflyClient::new(&LedgerConfig::from_env()?)?;
                        let failures = push_categories(&client, &results).await;
                        if !failures.is_empty() {
                            anyhow::bail!("{} of {} update(s) failed", failures.len(), results.len());
                        }
                    }
                }
                HookKind::Update => {
                    let results = handle_updated_transactions(&categorizer, &payload);
                    let failed = results.iter().filter(|(_, result)| result.is_err()).count();
                    for (id, result) in &results {
                        match result {
                            Ok(()) => println!("{}\tlearned", id),
                            Err(e) => println!("{}\t{}", id, e),
                        }
                    }
                    if failed > 0 {
                        anyhow::bail!("{} of {} transaction(s) not learned", failed, results.len());
                    }
                }
            }
        }
    }

    info!("Done in {:.2?}", start_time.elapsed());
    Ok(())
}
