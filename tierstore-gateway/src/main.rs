use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{info, warn};

use tierstore::change_feed::{self, ChangeFeedConsumer};
use tierstore::storage_backends::{FileColdStore, SqliteHotStore, SqliteLocationIndex};
use tierstore::{ChangeEvent, ChangeKind, Lookup, TierStore, TierStoreConfig};

#[derive(Parser)]
#[command(name = "tierstore-gateway")]
#[command(version)]
#[command(about = "Hot/cold record store: retrieval server, archival sweeps and change ingestion")]
struct Cli {
    #[command(flatten)]
    storage: StorageArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct StorageArgs {
    /// TOML config file; `TIERSTORE_*` variables override its values.
    #[arg(long, env = "TIERSTORE_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[arg(long, env = "TIERSTORE_HOT_DB", default_value = "storage/hot.db", global = true)]
    hot_db: PathBuf,

    #[arg(long, env = "TIERSTORE_INDEX_DB", default_value = "storage/index.db", global = true)]
    index_db: PathBuf,

    #[arg(long, env = "TIERSTORE_COLD_DIR", default_value = "storage/cold", global = true)]
    cold_dir: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve `GET /records/{id}` until interrupted.
    Serve(ServeArgs),
    /// Feed JSON-lines change events through the archival pipeline.
    Ingest(IngestArgs),
    /// Run one archival pass over the whole hot tier.
    Sweep,
    /// Look up one record and print it.
    Get(GetArgs),
}

#[derive(Args)]
struct ServeArgs {
    #[arg(long, default_value = "127.0.0.1:8840")]
    bind_addr: String,

    /// Seconds between hot tier sweeps; overrides `sweep.interval_secs`.
    #[arg(long)]
    sweep_interval_secs: Option<u64>,
}

#[derive(Args)]
struct IngestArgs {
    /// JSON-lines file, one document per line. Reads stdin when omitted.
    #[arg(long)]
    input: Option<PathBuf>,

    /// Mark every line as a delete notification.
    #[arg(long)]
    deletes: bool,
}

#[derive(Args)]
struct GetArgs {
    id: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tierstore=info".parse()?)
                .add_directive("tierstore_gateway=info".parse()?),
        )
        .with_ansi(false)
        .init();

    let cli = Cli::parse();
    let store = build_store(&cli.storage)?;

    match cli.command {
        Commands::Serve(args) => serve(store, args).await,
        Commands::Ingest(args) => ingest(store, args).await,
        Commands::Sweep => sweep(store).await,
        Commands::Get(args) => get(store, args).await,
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<TierStoreConfig> {
    let base = match path {
        Some(path) => {
            let path = path.to_string_lossy();
            TierStoreConfig::from_file(&path).with_context(|| format!("loading config {}", path))?
        }
        None => TierStoreConfig::default(),
    };
    Ok(base.overlay_env(|key| std::env::var(key).ok())?)
}

fn ensure_parent(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
    }
    Ok(())
}

fn build_store(args: &StorageArgs) -> anyhow::Result<TierStore> {
    let config = load_config(args.config.as_deref())?;
    ensure_parent(&args.hot_db)?;
    ensure_parent(&args.index_db)?;

    let hot = Arc::new(SqliteHotStore::new(args.hot_db.clone())?);
    let index = Arc::new(SqliteLocationIndex::new(args.index_db.clone())?);
    let cold = Arc::new(FileColdStore::new(&args.cold_dir)?);
    info!(
        hot_db = %args.hot_db.display(),
        index_db = %index.db_path().display(),
        cold_dir = %args.cold_dir.display(),
        threshold_days = config.archival_threshold_days,
        "storage adapters ready"
    );
    Ok(TierStore::new(hot, cold, index, config)?)
}

fn shutdown_on_ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
        }
        let _ = tx.send(true);
    });
    rx
}

async fn serve(store: TierStore, args: ServeArgs) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(&args.bind_addr)
        .await
        .with_context(|| format!("binding {}", args.bind_addr))?;
    let shutdown = shutdown_on_ctrl_c();

    let interval = args
        .sweep_interval_secs
        .or(store.config().sweep.interval_secs)
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs);
    let sweeper = store.sweeper();
    let sweeps = async {
        if let Some(every) = interval {
            info!(interval_secs = every.as_secs(), "periodic sweeps enabled");
            sweeper.run_periodic(every, shutdown.clone()).await;
        }
    };

    let server = tierstore::http::serve(listener, store.router(), shutdown.clone());
    let (served, ()) = tokio::join!(server, sweeps);
    served.context("retrieval server failed")?;
    Ok(())
}

async fn ingest(store: TierStore, args: IngestArgs) -> anyhow::Result<()> {
    let config = store.config().clone();
    let (sender, mut feed) = change_feed::channel(config.pipeline.batch_size * 2);
    let mut consumer: ChangeFeedConsumer = store.consumer();
    let kind = if args.deletes {
        ChangeKind::Delete
    } else {
        ChangeKind::Update
    };

    let produce = async move {
        let reader: Box<dyn AsyncBufRead + Unpin + Send> = match &args.input {
            Some(path) => Box::new(BufReader::new(
                tokio::fs::File::open(path)
                    .await
                    .with_context(|| format!("opening {}", path.display()))?,
            )),
            None => Box::new(BufReader::new(tokio::io::stdin())),
        };
        let mut lines = reader.lines();
        let mut line_no = 0usize;
        let mut published = 0usize;
        while let Some(line) = lines.next_line().await? {
            line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(document) => {
                    sender.publish(ChangeEvent::new(document, kind)).await?;
                    published += 1;
                }
                Err(e) => warn!(line = line_no, error = %e, "skipping malformed input line"),
            }
        }
        info!(published, "input exhausted");
        // dropping the sender closes the feed
        drop(sender);
        anyhow::Ok(())
    };

    let (_never, shutdown) = watch::channel(false);
    let consume = consumer.run(&mut feed, shutdown);
    let (produced, consumed) = tokio::join!(produce, consume);
    produced?;
    let stats = consumed?;

    println!(
        "events={} archived={} kept_hot={} ignored={} invalid={} redelivered={} dead_lettered={}",
        stats.events,
        stats.archived,
        stats.kept_hot,
        stats.ignored,
        stats.invalid,
        stats.redelivered,
        stats.dead_lettered
    );
    for dead in consumer.dead_letters() {
        eprintln!(
            "dead-lettered {}: {}",
            dead.event.document.get("id").unwrap_or(&serde_json::Value::Null),
            dead.error
        );
    }
    Ok(())
}

async fn sweep(store: TierStore) -> anyhow::Result<()> {
    let report = store.sweeper().run_once().await?;
    println!(
        "scanned={} archived={} kept_hot={} invalid={} failed={}",
        report.len(),
        report.archived(),
        report.kept_hot(),
        report.validation_failures(),
        report.failed()
    );
    Ok(())
}

async fn get(store: TierStore, args: GetArgs) -> anyhow::Result<()> {
    match store.get(&args.id).await? {
        Lookup::Found(retrieved) => {
            eprintln!("served from {}", retrieved.served_from.as_str());
            println!("{}", serde_json::to_string_pretty(&retrieved.document)?);
            Ok(())
        }
        Lookup::NotFound => anyhow::bail!("record '{}' not found", args.id),
    }
}
