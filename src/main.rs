//! provmark: command-line front end for the watermarking engine
//!
//! Every command prints pretty JSON on stdout; logs go to stderr and are
//! filtered with `RUST_LOG` (default `provmark=info`).

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use tracing::info;
use walkdir::WalkDir;

use provmark::crawler::DEFAULT_RECENT_LIMIT;
use provmark::verify::DEFAULT_RECENT_DOCUMENTS;
use provmark::{ClientInfo, EmbedContext, Extraction, Fingerprint, WatermarkConfig, WatermarkEngine, WizardSnapshot};

/// Default database file when the config names none.
const DEFAULT_DATABASE: &str = "provmark.db";

/// File extensions considered by `sweep`.
const SWEEP_EXTENSIONS: &[&str] = &["html", "htm", "txt", "md"];

#[derive(Parser)]
#[command(name = "provmark")]
#[command(about = "Watermark generated documents and trace copies back to their origin")]
struct Cli {
    /// Directory searched for `.provmark.toml` / `provmark.toml`
    #[arg(long, default_value = ".")]
    project_root: PathBuf,

    /// SQLite database (overrides the config file)
    #[arg(long, env = "PROVMARK_DB")]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Mint a fingerprint for a JSON answer snapshot without embedding it
    Fingerprint {
        /// JSON file with the wizard answers
        answers: PathBuf,
    },

    /// Watermark a document and record its provenance
    Embed {
        /// Document body to watermark
        body: PathBuf,
        /// JSON file with the wizard answers
        #[arg(long)]
        answers: PathBuf,
        /// Owning user; omit for anonymous generation
        #[arg(long)]
        owner: Option<String>,
        #[arg(long)]
        client_ip: Option<String>,
        #[arg(long)]
        user_agent: Option<String>,
        /// Write the watermarked document here instead of embedding it in the JSON output
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Do not write a tracking record
        #[arg(long)]
        untracked: bool,
        /// Refuse when the owner generated from the same answers within the duplicate window
        #[arg(long)]
        reject_duplicates: bool,
    },

    /// Recover the fingerprint embedded in a document
    Extract { file: PathBuf },

    /// Check a document (or a pasted fingerprint) against the provenance store
    Verify {
        file: Option<PathBuf>,
        /// Verify this fingerprint literal instead of a file
        #[arg(long, conflicts_with = "file")]
        fingerprint: Option<String>,
    },

    /// Compare an original against a suspect copy
    Compare { original: PathBuf, suspect: PathBuf },

    /// Rank every document under a directory against an original
    Sweep {
        original: PathBuf,
        dir: PathBuf,
        /// Only report candidates above the theft threshold
        #[arg(long)]
        theft_only: bool,
    },

    /// Domain verification tokens
    #[command(subcommand)]
    Token(TokenCommand),

    /// External sightings of fingerprinted content
    #[command(subcommand)]
    Crawler(CrawlerCommand),

    /// Aggregate counts, globally or for one owner
    Stats {
        #[arg(long)]
        owner: Option<String>,
    },

    /// Most recently generated documents
    Recent {
        #[arg(long, default_value_t = DEFAULT_RECENT_DOCUMENTS)]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum TokenCommand {
    /// Issue a token allowing `domain` to host `fingerprint`
    Issue { fingerprint: String, domain: String },
    /// Check a presented token value
    Check { token: String },
}

#[derive(Subcommand)]
enum CrawlerCommand {
    /// Record that a document was found at `url`
    Log {
        url: String,
        /// Observed content; its fingerprint is extracted automatically
        file: PathBuf,
    },
    /// List recent sightings
    Recent {
        #[arg(long, default_value_t = DEFAULT_RECENT_LIMIT)]
        limit: usize,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("provmark=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let mut config = WatermarkConfig::from_project_root(&cli.project_root);
    if let Some(database) = cli.database {
        config.database_path = Some(database);
    }
    if config.database_path.is_none() {
        config.database_path = Some(PathBuf::from(DEFAULT_DATABASE));
    }
    if config.secret.is_empty() {
        tracing::warn!(
            "No secret configured; set {} or `secret` in .provmark.toml",
            provmark::config::SECRET_ENV_VAR
        );
    }

    let engine = WatermarkEngine::open(config).context("failed to open provenance store")?;
    run(&engine, cli.command)
}

fn run(engine: &WatermarkEngine, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Fingerprint { answers } => {
            let snapshot = read_snapshot(&answers)?;
            let fingerprint = engine.generator().generate(&snapshot);
            print_json(&json!({
                "fingerprint": fingerprint,
                "snapshot_hash": snapshot.content_hash(),
            }))
        }

        Command::Embed {
            body,
            answers,
            owner,
            client_ip,
            user_agent,
            output,
            untracked,
            reject_duplicates,
        } => {
            let body_text = read_text(&body)?;
            let snapshot = read_snapshot(&answers)?;

            if reject_duplicates {
                if let Some(owner) = owner.as_deref() {
                    if engine.verifier().is_duplicate(owner, &snapshot.content_hash(), None) {
                        bail!(
                            "'{}' already generated a document from these answers within the last {}s",
                            owner,
                            engine.config().duplicate_window_secs
                        );
                    }
                }
            }

            let artifact = if untracked {
                engine.watermark_untracked(&body_text, &snapshot)
            } else {
                let client = ClientInfo::from_headers(client_ip.as_deref(), None, None, user_agent.as_deref());
                let context = EmbedContext::new(owner, snapshot).with_client(client);
                engine.watermark(&body_text, &context)
            };

            match output {
                Some(path) => {
                    std::fs::write(&path, &artifact.content)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    info!("Watermarked document written to {}", path.display());
                    print_json(&json!({
                        "fingerprint": artifact.fingerprint,
                        "provenance": artifact.provenance,
                        "output": path,
                    }))
                }
                None => print_json(&artifact),
            }
        }

        Command::Extract { file } => {
            let content = read_text(&file)?;
            let value = match engine.verifier().extract(&content) {
                Extraction::Found { fingerprint, channel } => json!({
                    "found": true,
                    "fingerprint": fingerprint,
                    "channel": channel,
                }),
                Extraction::Malformed(raw) => json!({
                    "found": false,
                    "malformed": raw,
                }),
                Extraction::NotFound => json!({ "found": false }),
            };
            print_json(&value)
        }

        Command::Verify { file, fingerprint } => {
            let verdict = match (file, fingerprint) {
                (_, Some(literal)) => engine.verifier().verify_fingerprint(&literal),
                (Some(file), None) => engine.verifier().verify(&read_text(&file)?),
                (None, None) => bail!("pass a file or --fingerprint"),
            };
            info!("{}", verdict);
            print_json(&verdict)
        }

        Command::Compare { original, suspect } => {
            let report = engine
                .verifier()
                .similarity(&read_text(&original)?, &read_text(&suspect)?);
            print_json(&json!({
                "report": report,
                "same_provenance": report.same_provenance(),
            }))
        }

        Command::Sweep { original, dir, theft_only } => {
            let original_text = read_text(&original)?;
            let suspects = collect_documents(&dir, &original)?;
            info!("Sweeping {} documents under {}", suspects.len(), dir.display());

            let mut ranked = engine.verifier().rank_candidates(&original_text, &suspects);
            if theft_only {
                ranked.retain(|candidate| candidate.report.is_theft);
            }
            print_json(&ranked)
        }

        Command::Token(TokenCommand::Issue { fingerprint, domain }) => {
            let fingerprint = Fingerprint::parse(fingerprint.trim())?;
            let token = engine.tokens().issue(&fingerprint, &domain)?;
            print_json(&token)
        }

        Command::Token(TokenCommand::Check { token }) => {
            let status = engine.tokens().check(&token)?;
            print_json(&json!({
                "valid": status.is_valid(),
                "status": status,
            }))
        }

        Command::Crawler(CrawlerCommand::Log { url, file }) => {
            let content = read_text(&file)?;
            let Some(fingerprint) = engine.verifier().extract(&content).fingerprint() else {
                bail!("{} carries no fingerprint", file.display());
            };
            let (id, record) = engine.crawler().record(&fingerprint, &url, &content)?;
            print_json(&json!({ "id": id, "detection": record }))
        }

        Command::Crawler(CrawlerCommand::Recent { limit }) => print_json(&engine.crawler().recent(limit)?),

        Command::Stats { owner } => print_json(&engine.verifier().statistics(owner.as_deref())?),

        Command::Recent { limit } => print_json(&engine.verifier().recent_documents(limit)?),
    }
}

fn read_text(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn read_snapshot(path: &Path) -> anyhow::Result<WizardSnapshot> {
    let answers: serde_json::Value = serde_json::from_str(&read_text(path)?)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;
    Ok(WizardSnapshot::new(answers))
}

/// Readable documents under `dir`, labelled by path, skipping `exclude`.
fn collect_documents(dir: &Path, exclude: &Path) -> anyhow::Result<Vec<(String, String)>> {
    if !dir.is_dir() {
        bail!("{} is not a directory", dir.display());
    }
    let exclude = exclude.canonicalize().ok();

    let mut documents = Vec::new();
    for entry in WalkDir::new(dir).follow_links(false).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let wanted = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| SWEEP_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if !wanted || (exclude.is_some() && path.canonicalize().ok() == exclude) {
            continue;
        }
        match std::fs::read_to_string(path) {
            Ok(content) => documents.push((path.display().to_string(), content)),
            Err(e) => tracing::debug!("Skipping {}: {}", path.display(), e),
        }
    }
    Ok(documents)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
