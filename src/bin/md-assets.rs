//! CLI binary for edgequake-md-assets.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `MigrationConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_md_assets::{
    migrate, migrate_to_file, MigrationConfig, MigrationOutput, MigrationProgressCallback,
    ProgressCallback, ReferenceKind, ReferenceStatus, StoreCredentials, VisionBackend,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar, re-sized at the start of each phase,
/// plus a log line per reference.
struct CliProgressCallback {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Resolving collection…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }
}

impl MigrationProgressCallback for CliProgressCallback {
    fn on_migration_start(&self, collection_name: &str) {
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Migrating images into collection '{collection_name}'…"))
        ));
    }

    fn on_phase_start(&self, kind: ReferenceKind, total: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} images  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_style(style);
        self.bar.set_length(total as u64);
        self.bar.set_position(0);
        self.bar.set_prefix(format!("{kind:<6}"));
    }

    fn on_reference_complete(
        &self,
        kind: ReferenceKind,
        index: usize,
        total: usize,
        hosted_url: &str,
    ) {
        self.bar.println(format!(
            "  {} {:<6} {:>3}/{:<3}  {}",
            green("✓"),
            kind,
            index,
            total,
            dim(hosted_url),
        ));
        self.bar.inc(1);
    }

    fn on_reference_error(&self, kind: ReferenceKind, index: usize, total: usize, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);

        let first_line = error.lines().next().unwrap_or_default();
        let msg = if first_line.chars().count() > 80 {
            let head: String = first_line.chars().take(79).collect();
            format!("{head}\u{2026}")
        } else {
            first_line.to_string()
        };

        self.bar.println(format!(
            "  {} {:<6} {:>3}/{:<3}  {}",
            red("✗"),
            kind,
            index,
            total,
            red(&msg),
        ));
        self.bar.inc(1);
    }

    fn on_migration_complete(&self, replaced: usize, failed: usize) {
        self.bar.finish_and_clear();
        if failed == 0 {
            eprintln!(
                "{} {} images migrated",
                green("✔"),
                bold(&replaced.to_string())
            );
        } else {
            eprintln!(
                "{} {} images migrated  ({} left unchanged)",
                if replaced == 0 { red("✘") } else { cyan("⚠") },
                bold(&replaced.to_string()),
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Migrate in place (the document is overwritten)
  md-assets README.md --store-url https://assets.example.com --api-key $TOKEN

  # Write to a new file, into a named collection
  md-assets docs/guide.md -o docs/guide.hosted.md --collection guide

  # Describe images that have no alt text, with an LLM provider
  md-assets notes.md --describe --provider openai --model gpt-4.1-nano

  # ... or with a self-hosted vision endpoint
  md-assets notes.md --describe --backend endpoint \
      --vision-endpoint http://localhost:8000/generate

  # List what would be migrated, without contacting anything
  md-assets notes.md --dry-run

  # Print the structured result instead of writing the document
  md-assets notes.md --json > result.json

ENVIRONMENT VARIABLES:
  MD_ASSETS_STORE_URL        Asset store base URL
  MD_ASSETS_API_KEY          Bearer token for the store
  MD_ASSETS_USERNAME         Basic-auth user (with MD_ASSETS_PASSWORD)
  MD_ASSETS_COLLECTION       Destination collection (default: markdown-images)
  MD_ASSETS_VISION_ENDPOINT  URL of the endpoint vision backend
  OPENAI_API_KEY             OpenAI API key (llm backend)
  ANTHROPIC_API_KEY          Anthropic API key (llm backend)
  EDGEQUAKE_LLM_PROVIDER     Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL            Override model ID
"#;

/// Upload the images of a Markdown document to an asset store and rewrite its links.
#[derive(Parser, Debug)]
#[command(
    name = "md-assets",
    version,
    about = "Upload the images of a Markdown document to an asset store and rewrite its links",
    long_about = "Finds every inline image in a Markdown document (local files, remote URLs and \
base64 data URIs), uploads each one into a collection on an asset store, and rewrites the \
document to use the hosted URLs. Images without meaningful alt text can be described by a \
vision model. A reference that cannot be migrated is left exactly as it was.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Markdown document to migrate.
    input: PathBuf,

    /// Write the result here instead of overwriting the input.
    #[arg(short, long, env = "MD_ASSETS_OUTPUT")]
    output: Option<PathBuf>,

    /// Destination collection, created if it does not exist.
    #[arg(long, env = "MD_ASSETS_COLLECTION", default_value = "markdown-images")]
    collection: String,

    /// Asset store base URL.
    #[arg(long, env = "MD_ASSETS_STORE_URL")]
    store_url: Option<String>,

    /// Bearer token for the asset store.
    #[arg(long, env = "MD_ASSETS_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Basic-auth user name for the asset store.
    #[arg(long, env = "MD_ASSETS_USERNAME", requires = "password")]
    username: Option<String>,

    /// Basic-auth password for the asset store.
    #[arg(long, env = "MD_ASSETS_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Generate alt text for images whose alt text is empty or generic.
    #[arg(long, env = "MD_ASSETS_DESCRIBE")]
    describe: bool,

    /// Vision backend used by --describe.
    #[arg(long, env = "MD_ASSETS_BACKEND", value_enum, default_value = "llm")]
    backend: BackendArg,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// LLM model ID (default: gpt-4.1-nano).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// URL of the endpoint vision backend's generate route.
    #[arg(long, env = "MD_ASSETS_VISION_ENDPOINT")]
    vision_endpoint: Option<String>,

    /// Bearer token for the endpoint vision backend.
    #[arg(long, env = "MD_ASSETS_VISION_API_KEY", hide_env_values = true)]
    vision_api_key: Option<String>,

    /// Path to a text file containing a custom alt-text instruction.
    #[arg(long, env = "MD_ASSETS_INSTRUCTION")]
    instruction: Option<PathBuf>,

    /// Maximum generated alt-text length in characters.
    #[arg(long, env = "MD_ASSETS_MAX_ALT_LEN", default_value_t = 100)]
    max_alt_len: usize,

    /// Retries per description on vision-backend failure.
    #[arg(long, env = "MD_ASSETS_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// HTTP timeout in seconds for every request.
    #[arg(long, env = "MD_ASSETS_TIMEOUT", default_value_t = 30)]
    timeout: u64,

    /// Read every upload back from the store and compare sizes.
    #[arg(long, env = "MD_ASSETS_VERIFY_UPLOADS")]
    verify_uploads: bool,

    /// List the references that would be migrated; contact nothing, write nothing.
    #[arg(long)]
    dry_run: bool,

    /// Print the structured result (MigrationOutput) instead of writing the document.
    #[arg(long, env = "MD_ASSETS_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "MD_ASSETS_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "MD_ASSETS_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "MD_ASSETS_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum BackendArg {
    Llm,
    Endpoint,
}

impl From<BackendArg> for VisionBackend {
    fn from(v: BackendArg) -> Self {
        match v {
            BackendArg::Llm => VisionBackend::Llm,
            BackendArg::Endpoint => VisionBackend::Endpoint,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.dry_run;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn MigrationProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb).await?;

    // ── Dry run ──────────────────────────────────────────────────────────
    if cli.dry_run {
        let output = migrate(&cli.input, &config)
            .await
            .context("Scan failed")?;
        if cli.json {
            print_json(&output)?;
        } else {
            print_references(&output);
        }
        return Ok(());
    }

    // ── Structured output ────────────────────────────────────────────────
    if cli.json {
        let output = migrate(&cli.input, &config)
            .await
            .context("Migration failed")?;
        print_json(&output)?;
        return Ok(());
    }

    // ── Migrate and write ────────────────────────────────────────────────
    let target = cli.output.clone().unwrap_or_else(|| cli.input.clone());
    let stats = migrate_to_file(&cli.input, cli.output.as_deref(), &config)
        .await
        .context("Migration failed")?;

    if !cli.quiet {
        eprintln!(
            "{}  {}/{} images  {} uploads ({} reused)  {}ms  →  {}",
            if stats.failed == 0 { green("✔") } else { cyan("⚠") },
            stats.replaced,
            stats.total_references(),
            stats.uploads,
            stats.reused_uploads,
            stats.total_duration_ms,
            bold(&target.display().to_string()),
        );
        if stats.described > 0 {
            eprintln!(
                "   {} alt texts generated ({} fallback)",
                dim(&stats.described.to_string()),
                dim(&stats.fallback_descriptions.to_string()),
            );
        }
    }

    Ok(())
}

/// Map CLI args to `MigrationConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<MigrationConfig> {
    let instruction = if let Some(ref path) = cli.instruction {
        Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read instruction from {:?}", path))?,
        )
    } else {
        None
    };

    let mut builder = MigrationConfig::builder()
        .collection_name(cli.collection.clone())
        .describe(cli.describe)
        .vision_backend(cli.backend.clone().into())
        .max_alt_len(cli.max_alt_len)
        .max_retries(cli.max_retries)
        .request_timeout_secs(cli.timeout)
        .verify_uploads(cli.verify_uploads)
        .dry_run(cli.dry_run);

    if let Some(ref url) = cli.store_url {
        builder = builder.store_url(url.clone());
    }
    if let Some(credentials) = credentials(cli) {
        builder = builder.credentials(credentials);
    }
    if let Some(ref name) = cli.provider {
        builder = builder.provider_name(name.clone());
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref url) = cli.vision_endpoint {
        builder = builder.vision_endpoint(url.clone());
    }
    if let Some(ref key) = cli.vision_api_key {
        builder = builder.vision_api_key(key.clone());
    }
    if let Some(text) = instruction {
        builder = builder.instruction(text);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Bearer token wins over basic auth when both are given.
fn credentials(cli: &Cli) -> Option<StoreCredentials> {
    if let Some(ref token) = cli.api_key {
        return Some(StoreCredentials::Token(token.clone()));
    }
    match (&cli.username, &cli.password) {
        (Some(username), Some(password)) => Some(StoreCredentials::Basic {
            username: username.clone(),
            password: password.clone(),
        }),
        _ => None,
    }
}

fn print_json(output: &MigrationOutput) -> Result<()> {
    let json = serde_json::to_string_pretty(output).context("Failed to serialise output")?;
    println!("{json}");
    Ok(())
}

fn print_references(output: &MigrationOutput) {
    for r in &output.references {
        let status = match r.status {
            ReferenceStatus::Replaced { .. } => green("replaced"),
            ReferenceStatus::Failed { .. } => red("failed"),
            ReferenceStatus::Skipped => dim("found"),
        };
        println!("{:>5}  {:<6}  {:<8}  {}", r.line, r.kind.to_string(), status, r.locator);
    }
    println!(
        "{} references: {} local, {} remote, {} base64",
        output.stats.total_references(),
        output.stats.local_references,
        output.stats.remote_references,
        output.stats.base64_references,
    );
}
