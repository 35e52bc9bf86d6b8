//! strata-env command-line tool
//!
//! Resolves layered configuration and prints, validates, audits, diffs or
//! exports it. Every failure is reported as one `Error:` line on stderr with
//! exit code 1 (validation and general failures) or 2 (settings, file and
//! source problems).

use anyhow::Context;
use clap::Parser;
use std::io::Write;
use std::path::Path;
use strata_env::cli::crypt::{DecryptArgs, EncryptArgs, select_cipher};
use strata_env::cli::diff::{DiffArgs, DiffFormat};
use strata_env::cli::export::ExportArgs;
use strata_env::cli::{AuditArgs, Cli, Command, DetectArgs, ExplainArgs, GenerateExampleArgs, ShowArgs};
use strata_env::config::{ConfigLoader, Settings};
use strata_env::crypto::Cipher;
use strata_env::detect::Runtime;
use strata_env::diff::{diff, load_baseline};
use strata_env::error::ResolveError;
use strata_env::export::{generate_env_example, render};
use strata_env::format::OutputFormat;
use strata_env::logging::{LogTarget, init_logging};
use strata_env::mask::SecretClassifier;
use strata_env::resolver::{Resolution, Resolver};
use tracing::{debug, warn};

/// A failure at the command boundary.
enum CliError {
    /// Resolution and drift errors keep their own exit code.
    Resolve(ResolveError),
    /// Anything else: output files, unknown keys, external tools.
    Other(anyhow::Error),
}

impl CliError {
    fn exit_code(&self) -> i32 {
        match self {
            CliError::Resolve(e) => e.exit_code(),
            CliError::Other(_) => 1,
        }
    }

    fn message(&self) -> String {
        match self {
            CliError::Resolve(e) => e.to_string(),
            CliError::Other(e) => format!("{:#}", e),
        }
    }
}

impl From<ResolveError> for CliError {
    fn from(err: ResolveError) -> Self {
        CliError::Resolve(err)
    }
}

impl From<anyhow::Error> for CliError {
    fn from(err: anyhow::Error) -> Self {
        CliError::Other(err)
    }
}

type CliResult<T> = Result<T, CliError>;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging(&LogTarget::parse(&cli.log), cli.verbose) {
        eprintln!("Error: cannot initialize logging: {:#}", e);
        std::process::exit(2);
    }

    let code = match run(cli).await {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("Error: {}", err.message());
            err.exit_code()
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> CliResult<()> {
    let settings = load_settings(&cli)?;

    match &cli.command {
        Command::Show(args) => run_show(&settings, args).await,
        Command::Validate => run_validate(&settings).await,
        Command::Audit(args) => run_audit(&settings, args).await,
        Command::Diff(args) => run_diff(&settings, args).await,
        Command::Explain(args) => run_explain(&settings, args).await,
        Command::Export(args) => run_export(&settings, args).await,
        Command::GenerateExample(args) => run_generate_example(&settings, args),
        Command::Encrypt(args) => run_encrypt(args),
        Command::Decrypt(args) => run_decrypt(args),
        Command::Detect(args) => run_detect(args),
    }
}

/// Tiered settings, with the `--config` file replacing the project and user tiers.
fn load_settings(cli: &Cli) -> CliResult<Settings> {
    let loader = match &cli.config {
        Some(path) => ConfigLoader::load_explicit(path, |k| std::env::var(k).ok()),
        None => ConfigLoader::load(),
    }
    .map_err(|e| ResolveError::config(format!("{:#}", e)))?;

    for (tier, path) in loader.loaded_from() {
        debug!(tier = %tier, path = %path.display(), "Using settings file");
    }

    let mut settings = loader.into_settings();
    cli.apply_to(&mut settings);
    Ok(settings)
}

async fn resolve(settings: &Settings) -> CliResult<Resolution> {
    let resolution = Resolver::from_settings(settings)?.resolve().await?;
    for warning in &resolution.warnings {
        eprintln!("Warning: {}", warning);
    }
    Ok(resolution)
}

/// Write to `output`, or stdout when none is given.
fn write_output(output: Option<&Path>, content: &[u8]) -> anyhow::Result<()> {
    match output {
        Some(path) => std::fs::write(path, content)
            .with_context(|| format!("Failed to write {}", path.display())),
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(content)?;
            if !content.ends_with(b"\n") {
                stdout.write_all(b"\n")?;
            }
            Ok(())
        }
    }
}

async fn run_show(settings: &Settings, args: &ShowArgs) -> CliResult<()> {
    let format = OutputFormat::from_str(&args.format).ok_or_else(|| {
        ResolveError::config(format!(
            "Invalid format '{}'. Valid options: pretty, json, yaml",
            args.format
        ))
    })?;
    if args.unmask {
        warn!("Printing secret values unmasked");
    }
    let resolution = resolve(settings).await?;
    let out = resolution.snapshot.export(format, args.unmask)?;
    write_output(None, out.as_bytes())?;
    Ok(())
}

async fn run_validate(settings: &Settings) -> CliResult<()> {
    let resolution = resolve(settings).await?;
    println!(
        "Configuration is valid ({} keys, {} warnings)",
        resolution.snapshot.len(),
        resolution.warnings.len()
    );
    Ok(())
}

async fn run_audit(settings: &Settings, args: &AuditArgs) -> CliResult<()> {
    let resolution = resolve(settings).await?;
    if args.summary {
        print!("{}", resolution.audit.summary());
    } else {
        let json = resolution.audit.to_json().context("Failed to serialize audit trail")?;
        println!("{}", json);
    }
    Ok(())
}

async fn run_diff(settings: &Settings, args: &DiffArgs) -> CliResult<()> {
    let baseline = load_baseline(&args.baseline).map_err(ResolveError::from)?;
    let resolution = resolve(settings).await?;
    let snapshot = &resolution.snapshot;
    let result = diff(&snapshot.to_values(), &baseline, snapshot.classifier());

    let rendered = args.format.render(&result).context("Failed to serialize diff")?;
    match args.format {
        DiffFormat::Text => print!("{}", rendered),
        _ => println!("{}", rendered),
    }

    args.policy().enforce(&result).map_err(ResolveError::from)?;
    Ok(())
}

async fn run_explain(settings: &Settings, args: &ExplainArgs) -> CliResult<()> {
    let resolution = resolve(settings).await?;
    let Some(explanation) = resolution.snapshot.explain(&args.key) else {
        return Err(anyhow::anyhow!("Variable '{}' is not set", args.key).into());
    };
    if args.json {
        let json = serde_json::to_string_pretty(&explanation).context("Failed to serialize explanation")?;
        println!("{}", json);
    } else {
        print!("{}", explanation);
    }
    Ok(())
}

async fn run_export(settings: &Settings, args: &ExportArgs) -> CliResult<()> {
    let format = args.export_format().map_err(ResolveError::config)?;
    if args.unmask {
        warn!("Exporting secret values unmasked");
    }
    let resolution = resolve(settings).await?;
    let out = render(&resolution.snapshot, format, &args.options())?;
    write_output(args.output.as_deref(), out.as_bytes())?;
    if let Some(path) = &args.output {
        eprintln!(
            "Exported {} keys as {} to {}",
            resolution.snapshot.len(),
            format.as_str(),
            path.display()
        );
    }
    Ok(())
}

fn run_generate_example(settings: &Settings, args: &GenerateExampleArgs) -> CliResult<()> {
    let schema = settings
        .load_schema()
        .map_err(|e| ResolveError::config(format!("{:#}", e)))?;
    let classifier = SecretClassifier::new().with_custom(settings.secrets.iter().cloned());
    let text = generate_env_example(&schema, &classifier);
    write_output(args.output.as_deref(), text.as_bytes())?;
    Ok(())
}

fn run_encrypt(args: &EncryptArgs) -> CliResult<()> {
    let cipher = select_cipher(args.tool.as_deref()).map_err(ResolveError::config)?;
    let ciphertext = cipher
        .encrypt(&args.file, &args.recipient)
        .with_context(|| format!("Failed to encrypt {}", args.file.display()))?;
    let output = args.output_path();
    write_output(Some(&output), &ciphertext)?;
    eprintln!("Encrypted {} with {} to {}", args.file.display(), cipher.name(), output.display());
    Ok(())
}

fn run_decrypt(args: &DecryptArgs) -> CliResult<()> {
    let cipher = select_cipher(args.tool.as_deref()).map_err(ResolveError::config)?;
    let plaintext = cipher
        .decrypt(&args.file, args.key.as_deref())
        .with_context(|| format!("Failed to decrypt {}", args.file.display()))?;
    write_output(args.output.as_deref(), &plaintext)?;
    Ok(())
}

fn run_detect(args: &DetectArgs) -> CliResult<()> {
    let runtime = Runtime::detect();
    let recommended = runtime.recommended_providers();
    if args.json {
        let json = serde_json::to_string_pretty(&serde_json::json!({
            "runtime": runtime,
            "recommended_providers": recommended,
        }))
        .context("Failed to serialize runtime")?;
        println!("{}", json);
        return Ok(());
    }

    let platforms: Vec<String> = runtime.platforms().iter().map(ToString::to_string).collect();
    if platforms.is_empty() {
        println!("Platforms: none detected");
    } else {
        println!("Platforms: {}", platforms.join(", "));
    }
    if !recommended.is_empty() {
        println!("Recommended providers: {}", recommended.join(", "));
    }
    Ok(())
}
