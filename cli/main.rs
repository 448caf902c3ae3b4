use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use cryptcopy::{
    config::Config,
    copy_engine::{self, CopyReport},
    exclude::Excludes,
    file_ops,
    strategy::{CopyKind, CopyStrategy},
    streaming,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// cryptcopy - copy files and directory trees, encrypting or decrypting on the way
#[derive(Parser)]
#[command(name = "cryptcopy")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (falls back to $CRYPTCOPY_CONFIG, then defaults)
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct ExcludeArgs {
    /// Skip paths containing this string (repeatable)
    #[arg(short, long = "exclude")]
    exclude: Vec<String>,

    /// Skip paths matching this regex (repeatable)
    #[arg(short, long = "pattern")]
    pattern: Vec<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Copy a file or directory as is
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[command(flatten)]
        excludes: ExcludeArgs,
    },

    /// Copy a file or directory, encrypting every file
    Encrypt {
        from: PathBuf,
        to: PathBuf,

        /// Public key (defaults to the configured public_key_path)
        #[arg(short, long)]
        key: Option<PathBuf>,

        #[command(flatten)]
        excludes: ExcludeArgs,
    },

    /// Copy a file or directory, decrypting every file
    Decrypt {
        from: PathBuf,
        to: PathBuf,

        /// Private key (defaults to the configured private_key_path)
        #[arg(short, long)]
        key: Option<PathBuf>,

        #[command(flatten)]
        excludes: ExcludeArgs,
    },

    /// Encrypt a short string into one base64 record
    EncryptString {
        text: String,

        #[arg(short, long)]
        key: Option<PathBuf>,
    },

    /// Decrypt one base64 record
    DecryptString {
        record: String,

        #[arg(short, long)]
        key: Option<PathBuf>,
    },

    /// Rename a file or directory without overwriting
    Rename { from: PathBuf, to: PathBuf },

    /// Remove a file or directory recursively
    Remove {
        path: PathBuf,

        /// Skip confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured logging
    // Use RUST_LOG environment variable to control log level (e.g., RUST_LOG=info,cryptcopy=debug)
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_thread_ids(false)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    info!(command = ?cli.command, "cryptcopy starting");
    let cfg = Config::load_with_env(cli.config.as_deref())?;

    match cli.command {
        Commands::Copy { from, to, excludes } => {
            cmd_copy(&cfg, CopyKind::Simple, from, to, &excludes).await
        }

        Commands::Encrypt {
            from,
            to,
            key,
            excludes,
        } => {
            let key = key.unwrap_or_else(|| cfg.public_key_path.clone().into());
            cmd_copy(&cfg, CopyKind::EncryptOnCopy { key }, from, to, &excludes).await
        }

        Commands::Decrypt {
            from,
            to,
            key,
            excludes,
        } => {
            let key = key.unwrap_or_else(|| cfg.private_key_path.clone().into());
            cmd_copy(&cfg, CopyKind::DecryptOnCopy { key }, from, to, &excludes).await
        }

        Commands::EncryptString { text, key } => {
            let key = key.unwrap_or_else(|| cfg.public_key_path.clone().into());
            let record = streaming::encrypt_string(&key, &text).await?;
            println!("{record}");
            Ok(())
        }

        Commands::DecryptString { record, key } => {
            let key = key.unwrap_or_else(|| cfg.private_key_path.clone().into());
            let text = streaming::decrypt_string(&key, record.trim()).await?;
            println!("{text}");
            Ok(())
        }

        Commands::Rename { from, to } => {
            file_ops::rename(&from, &to).await?;
            println!("Renamed {} -> {}", from.display(), to.display());
            Ok(())
        }

        Commands::Remove { path, yes } => cmd_remove(&path, yes).await,
    }
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    Ok(pb)
}

/// Merge configured and command-line exclusion rules
fn build_excludes(cfg: &Config, args: &ExcludeArgs) -> Result<Excludes> {
    let literals = cfg.excludes.iter().chain(&args.exclude).cloned();
    let patterns = cfg.exclude_patterns.iter().chain(&args.pattern);
    Excludes::from_parts(literals, patterns).context("building exclusion list")
}

async fn cmd_copy(
    cfg: &Config,
    kind: CopyKind,
    from: PathBuf,
    to: PathBuf,
    args: &ExcludeArgs,
) -> Result<()> {
    let excludes = build_excludes(cfg, args)?;
    let strategy = CopyStrategy::new(kind, &from, &to).with_read_size(cfg.read_size);

    let spinner = create_spinner(&format!("Copying {}...", from.display()))?;
    let result = copy_engine::copy(strategy, &excludes)
        .await
        .with_context(|| format!("copying {} to {}", from.display(), to.display()));

    let report: CopyReport = match result {
        Ok(report) => report,
        Err(e) => {
            spinner.finish_and_clear();
            return Err(e);
        }
    };

    spinner.finish_with_message(format!(
        "Copied {} file(s), {} bytes",
        report.files, report.bytes
    ));
    if report.excluded > 0 || report.skipped > 0 {
        println!(
            "  {} excluded, {} skipped (not a file or directory)",
            report.excluded, report.skipped
        );
    }
    println!("  {} -> {}", from.display(), to.display());
    Ok(())
}

async fn cmd_remove(path: &Path, yes: bool) -> Result<()> {
    if !file_ops::exists(path).await {
        anyhow::bail!("'{}' not found", path.display());
    }

    // Confirm deletion unless --yes flag is set
    if !yes {
        print!("Delete '{}'? This cannot be undone. [y/N]: ", path.display());
        io::stdout().flush()?;

        let mut response = String::new();
        io::stdin().read_line(&mut response)?;

        if !response.trim().eq_ignore_ascii_case("y") {
            println!("Cancelled.");
            return Ok(());
        }
    }

    file_ops::unlink(path).await?;
    println!("Deleted '{}'", path.display());
    Ok(())
}
