//! pagesheet — extract records from web pages into a spreadsheet.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use pagesheet::{GoogleTranslator, Pipeline, Translator, PRESET_NAMES};
use pagesheet_cli::config::{apply_overrides, resolve_job, resolve_translate_key, JobFile};
use pagesheet_cli::render_outcome;

#[derive(Parser)]
#[command(
    name = "pagesheet",
    about = "Extract records from web pages, translate them, and export to .xlsx",
    version
)]
struct Cli {
    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a preset or a job file.
    Run {
        /// Built-in job name.
        #[arg(short, long)]
        preset: Option<String>,

        /// Path to a JSON job file.
        #[arg(short, long)]
        job: Option<PathBuf>,

        /// Page URL to process instead of the job's list (repeatable).
        #[arg(short, long = "url")]
        urls: Vec<String>,

        /// Output .xlsx path.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Translation API key.
        /// Also reads from PAGESHEET_TRANSLATE_KEY or GOOGLE_TRANSLATE_API_KEY.
        #[arg(long)]
        translate_key: Option<String>,

        /// Leave translated columns empty.
        #[arg(long)]
        skip_translation: bool,

        /// Print the collected records as JSON instead of writing a workbook.
        #[arg(long)]
        dry_run: bool,
    },

    /// Print built-in jobs as job-file templates.
    Presets {
        /// Print only this preset.
        name: Option<String>,
    },

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   pagesheet completions bash > ~/.local/share/bash-completion/completions/pagesheet
    ///   pagesheet completions zsh > ~/.zfunc/_pagesheet
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            preset,
            job,
            urls,
            output,
            translate_key,
            skip_translation,
            dry_run,
        } => {
            let file = resolve_job(preset.as_deref(), job.as_deref())?;
            let settings = file.effective_settings();
            let mut job = file.job;
            apply_overrides(&mut job, urls, output);

            let translator: Option<Arc<dyn Translator>> = if skip_translation
                || job.mapping.translations.is_empty()
            {
                None
            } else {
                match resolve_translate_key(translate_key.as_deref()) {
                    Some(key) => Some(Arc::new(GoogleTranslator::new(key))),
                    None => {
                        tracing::warn!(
                            "No translation key found; set PAGESHEET_TRANSLATE_KEY or pass --skip-translation"
                        );
                        None
                    }
                }
            };

            let pipeline = Pipeline::with_chromium(settings, translator);

            if dry_run {
                match pipeline.collect(&job).await {
                    Ok(collected) => {
                        println!("{}", serde_json::to_string_pretty(&collected.records)?);
                        for w in &collected.warnings {
                            eprintln!("  warning: {} ({})", w.reason, w.url);
                        }
                    }
                    Err(failed) => {
                        eprint!("{}", render_outcome(&failed));
                        std::process::exit(1);
                    }
                }
                return Ok(());
            }

            let outcome = pipeline.run(&job).await;
            print!("{}", render_outcome(&outcome));
            if outcome.is_failed() {
                std::process::exit(1);
            }
        }

        Commands::Presets { name } => {
            let names: Vec<&str> = match name.as_deref() {
                Some(n) => vec![n],
                None => PRESET_NAMES.to_vec(),
            };
            let mut templates = Vec::new();
            for n in names {
                let file = resolve_job(Some(n), None)?;
                templates.push(JobFile {
                    job: file.job,
                    settings: Some(pagesheet::PipelineConfig::default()),
                });
            }
            if templates.len() == 1 {
                println!("{}", serde_json::to_string_pretty(&templates[0])?);
            } else {
                println!("{}", serde_json::to_string_pretty(&templates)?);
            }
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "pagesheet", &mut std::io::stdout());
        }
    }

    Ok(())
}
