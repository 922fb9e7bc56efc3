//! cifrador - add chord symbols to scores
//!
//! Subcommands:
//! - `cifrador annotate` - MusicXML in, annotated MusicXML (and PDF) out
//! - `cifrador scan` - PDF in, recognized and annotated PDF out
//! - `cifrador serve` - HTTP upload service
//! - `cifrador config` - show the effective configuration

use std::path::PathBuf;

use anyhow::{Context, Result};
use cifraconf::CifraConfig;
use clap::{Parser, Subcommand};
use partitura::Renderer;
use tracing::info;

use cifrador::{job, serve, telemetry};

#[derive(Parser)]
#[command(name = "cifrador")]
#[command(about = "Add chord symbols above every measure of a score")]
#[command(version)]
struct Cli {
    /// Config file, replacing ./cifra.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Annotate a MusicXML file and print the run summary as JSON
    Annotate {
        /// Input MusicXML
        #[arg(short, long)]
        input: PathBuf,

        /// Where to write the annotated MusicXML
        #[arg(long)]
        out_xml: PathBuf,

        /// Also render a PDF here
        #[arg(long)]
        out_pdf: Option<PathBuf>,

        /// MuseScore executable, overriding the configured renderer
        #[arg(short = 'm', long)]
        musescore: Option<PathBuf>,
    },

    /// Recognize a scanned PDF, annotate it, and render the result
    Scan {
        /// Input PDF
        input: PathBuf,

        /// Where to write the annotated PDF
        #[arg(long)]
        out_pdf: PathBuf,

        /// Also keep the annotated MusicXML here
        #[arg(long)]
        out_xml: Option<PathBuf>,
    },

    /// Run the HTTP service
    Serve {
        /// HTTP port to bind, overriding the configured one
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Print the effective configuration and where it came from
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config, sources) = CifraConfig::load_with_sources_from(cli.config.as_deref())
        .context("Failed to load configuration")?;

    telemetry::init(&config.telemetry.log_level)?;

    match cli.command {
        Commands::Annotate {
            input,
            out_xml,
            out_pdf,
            musescore,
        } => {
            let renderer = match musescore {
                Some(program) => Some(Renderer::new(program).with_timeout(config.renderer.timeout())),
                None if out_pdf.is_some() => config
                    .renderer
                    .resolve()
                    .map(|program| Renderer::new(program).with_timeout(config.renderer.timeout())),
                None => None,
            };

            let summary = cifra::process_musicxml_file(
                &input,
                &out_xml,
                out_pdf.as_deref(),
                renderer.as_ref(),
            )
            .await
            .with_context(|| format!("Failed to annotate {}", input.display()))?;

            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Scan {
            input,
            out_pdf,
            out_xml,
        } => {
            let pdf = tokio::fs::read(&input)
                .await
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let settings = job::JobSettings::from_config(&config);

            let output = job::build_score_from_pdf(&pdf, &settings, out_xml.as_deref())
                .await
                .with_context(|| format!("Failed to process {}", input.display()))?;

            tokio::fs::copy(&output.output_pdf, &out_pdf)
                .await
                .with_context(|| format!("Failed to write {}", out_pdf.display()))?;
            if let Err(e) = tokio::fs::remove_file(&output.output_pdf).await {
                tracing::warn!(error = %e, "failed to remove intermediate PDF");
            }

            info!(pdf = %out_pdf.display(), "scan complete");
            println!("{}", serde_json::to_string_pretty(&output.summary)?);
        }
        Commands::Serve { port } => {
            let mut bind = config.bind.clone();
            if let Some(port) = port {
                bind.http_port = port;
            }
            let settings = job::JobSettings::from_config(&config);
            serve::run(settings, &bind.addr()).await?;
        }
        Commands::Config => {
            print!("{}", config.to_toml());
            println!();
            if sources.files.is_empty() {
                println!("# sources: defaults only");
            } else {
                for file in &sources.files {
                    println!("# file: {}", file.display());
                }
            }
            for var in &sources.env_overrides {
                println!("# env: {}", var);
            }
        }
    }

    Ok(())
}
