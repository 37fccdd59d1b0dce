//! Blood-gas CLI
//!
//! ## Commands
//!
//! - `bloodgas extract --image <path>` - Read the 18 indicators from a report image
//! - `bloodgas analyze --panel <json|@file>` - Produce an analysis result
//!
//! Results are printed to stdout as JSON. Failures print an error report as
//! JSON to stderr and exit non-zero. Logs go to stderr, filtered by `RUST_LOG`.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bloodgas_core::{BloodGasError, ErrorKind, ErrorReport, TransfusionTarget, Weight};
use bloodgas_llm::{
    AnalysisMode, AnalysisOrchestrator, AnalysisRequest, GeminiClient, RecognitionGateway,
    ServiceConfig,
};

mod input;

/// Perioperative blood-gas extraction and analysis
#[derive(Parser)]
#[command(name = "bloodgas")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Recognise the 18 indicators in a blood-gas report image
    Extract {
        /// Report image
        #[arg(long)]
        image: PathBuf,

        /// MIME type (inferred from the extension when omitted)
        #[arg(long)]
        mime: Option<String>,

        /// Patient weight in kg, carried through to the output
        #[arg(long)]
        weight: Option<String>,
    },

    /// Analyse a panel
    Analyze {
        /// Panel JSON, inline or `@file`; the output of `extract` is accepted
        #[arg(long)]
        panel: String,

        /// Vital signs JSON, inline or `@file`
        #[arg(long)]
        vitals: Option<String>,

        /// Anesthesia parameters JSON, inline or `@file`
        #[arg(long)]
        anesthesia: Option<String>,

        /// Patient weight in kg
        #[arg(long)]
        weight: Option<String>,

        /// Skip the model; deterministic rules only (no API key needed)
        #[arg(long)]
        rules_only: bool,

        /// THbc target in g/L for higher surgical risk (70-100)
        #[arg(long)]
        transfusion_target: Option<f64>,

        /// Comma-separated indicators the report did not show legibly
        #[arg(long)]
        missing_fields: Option<String>,
    },
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose {
        "bloodgas_core=debug,bloodgas_llm=debug,bloodgas=debug"
    } else {
        "bloodgas_core=info,bloodgas_llm=info,bloodgas=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

async fn extract(
    image: PathBuf,
    mime: Option<String>,
    weight: Option<String>,
) -> anyhow::Result<String> {
    let weight = Weight::parse(weight.as_deref()).map_err(BloodGasError::from)?;
    let config = ServiceConfig::from_env()?;
    let client = GeminiClient::new(&config)?;

    let bytes = tokio::fs::read(&image).await.map_err(|e| {
        BloodGasError::from(bloodgas_core::ValidationError::Malformed {
            field: "image".into(),
            reason: format!("cannot read '{}': {e}", image.display()),
        })
    })?;
    let mime = mime.unwrap_or_else(|| input::infer_mime(&image).to_string());

    let extraction = RecognitionGateway::new(&client, &config)
        .extract(&bytes, &mime, weight)
        .await?;
    Ok(extraction.to_json()?)
}

#[allow(clippy::too_many_arguments)]
async fn analyze(
    panel: String,
    vitals: Option<String>,
    anesthesia: Option<String>,
    weight: Option<String>,
    rules_only: bool,
    transfusion_target: Option<f64>,
    missing_fields: Option<String>,
) -> anyhow::Result<String> {
    let loaded = input::load_panel(&panel)?;
    let weight = match weight.as_deref() {
        Some(raw) => Weight::parse(Some(raw)).map_err(BloodGasError::from)?,
        None => loaded.weight,
    };
    let missing_fields = match missing_fields.as_deref() {
        Some(raw) => input::parse_missing_fields(raw)?,
        None => loaded.missing_fields,
    };

    let mut request = AnalysisRequest::new(loaded.panel)
        .with_vitals(input::load_vitals(vitals.as_deref())?)
        .with_anesthesia(input::load_anesthesia(anesthesia.as_deref())?)
        .with_weight(weight)
        .with_missing_fields(missing_fields);
    if let Some(confidence) = loaded.confidence {
        request = request.with_confidence(confidence);
    }

    let mut config = if rules_only {
        ServiceConfig::from_env_offline()?
    } else {
        ServiceConfig::from_env()?
    };
    if let Some(g_l) = transfusion_target {
        let target = TransfusionTarget::for_surgical_risk(g_l).map_err(BloodGasError::from)?;
        config = config.with_transfusion_target(target);
    }

    let client = if rules_only {
        None
    } else {
        Some(GeminiClient::new(&config)?)
    };
    let (orchestrator, mode) = match &client {
        Some(client) => (AnalysisOrchestrator::new(client, &config), AnalysisMode::Model),
        None => (AnalysisOrchestrator::rules_only(&config), AnalysisMode::RulesOnly),
    };

    let result = orchestrator.analyze(&request, mode).await?;
    Ok(result.to_json()?)
}

/// Structured report for any failure reaching the binary boundary.
fn failure_report(err: &anyhow::Error) -> ErrorReport {
    match err.downcast_ref::<BloodGasError>() {
        Some(e) => e.report(),
        None => ErrorReport {
            kind: ErrorKind::Internal,
            detail: format!("{err:#}"),
            retryable: false,
        },
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Extract { image, mime, weight } => extract(image, mime, weight).await,
        Commands::Analyze {
            panel,
            vitals,
            anesthesia,
            weight,
            rules_only,
            transfusion_target,
            missing_fields,
        } => {
            analyze(
                panel,
                vitals,
                anesthesia,
                weight,
                rules_only,
                transfusion_target,
                missing_fields,
            )
            .await
        }
    };

    match result {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            let report = failure_report(&err);
            tracing::debug!(kind = ?report.kind, "Command failed");
            match serde_json::to_string_pretty(&report) {
                Ok(rendered) => eprintln!("{rendered}"),
                Err(_) => eprintln!("{:?}: {}", report.kind, report.detail),
            }
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_analyze() {
        let cli = Cli::try_parse_from([
            "bloodgas",
            "analyze",
            "--panel",
            r#"{"ph": 7.2}"#,
            "--weight",
            "70",
            "--rules-only",
            "--transfusion-target",
            "80",
        ])
        .unwrap();
        match cli.command {
            Commands::Analyze {
                rules_only,
                transfusion_target,
                weight,
                ..
            } => {
                assert!(rules_only);
                assert_eq!(transfusion_target, Some(80.0));
                assert_eq!(weight.as_deref(), Some("70"));
            }
            Commands::Extract { .. } => panic!("expected analyze"),
        }
    }

    #[test]
    fn test_failure_report_for_typed_error() {
        let err = anyhow::Error::new(BloodGasError::Timeout { budget_ms: 120_000 });
        let report = failure_report(&err);
        assert_eq!(report.kind, ErrorKind::Timeout);
        assert!(report.retryable);
    }

    #[test]
    fn test_failure_report_for_untyped_error() {
        let err = anyhow::anyhow!("boom");
        let report = failure_report(&err);
        assert_eq!(report.kind, ErrorKind::Internal);
        assert!(!report.retryable);
    }
}
