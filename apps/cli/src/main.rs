use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use client_core::{HttpBackend, ProgressDelivery, WizardController, WorkflowEvent};
use shared::domain::ArtifactFormat;
use tracing::warn;

#[derive(Parser, Debug)]
#[command(about = "Classifies survey feedback through a running backend")]
struct Args {
    #[arg(long)]
    server_url: String,
    /// Excel or CSV file with the survey responses.
    file: PathBuf,
    /// Verbatim column to use when automatic detection is not confident.
    #[arg(long)]
    column: Option<String>,
    #[arg(long, value_enum, default_value_t = Delivery::Stream)]
    delivery: Delivery,
    /// Where to save the classified output; nothing is downloaded if unset.
    #[arg(long)]
    output: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = Format::Csv)]
    format: Format,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Delivery {
    Poll,
    Stream,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Format {
    Csv,
    Pdf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();
    let args = Args::parse();

    let filename = args
        .file
        .file_name()
        .and_then(|name| name.to_str())
        .context("file path has no usable name")?
        .to_string();
    let bytes = tokio::fs::read(&args.file)
        .await
        .with_context(|| format!("reading {}", args.file.display()))?;

    let backend = Arc::new(HttpBackend::new(&args.server_url)?);
    let wizard = WizardController::new(backend);

    let upload = wizard.upload(&filename, bytes).await?;
    println!(
        "Uploaded {} ({} rows, {} columns)",
        upload.filename,
        upload.total_rows,
        upload.columns.len()
    );

    if upload.detection_confident {
        if let Some(column) = &upload.detected_verbatim_column {
            println!("Detected verbatim column: {column}");
        }
    } else {
        let column = match &args.column {
            Some(column) => column.clone(),
            None => {
                let detected = upload.detected_verbatim_column.as_deref().unwrap_or("none");
                bail!(
                    "could not confidently detect the verbatim column (best guess: {detected}); \
                     pass --column with one of: {}",
                    upload.columns.join(", ")
                );
            }
        };
        wizard.confirm_column(&column).await?;
        println!("Using verbatim column: {column}");
    }

    let suggested = wizard.generate_categories().await?;
    let coverage = suggested.sample_size as f64 / suggested.total_comments.max(1) as f64 * 100.0;
    println!(
        "Generated {} categories from {} of {} comments ({coverage:.1}% sample):",
        suggested.categories.len(),
        suggested.sample_size,
        suggested.total_comments
    );
    for (index, category) in suggested.categories.iter().enumerate() {
        println!("  {}. {} - {}", index + 1, category.title, category.description);
    }

    wizard.confirm_categories().await?;

    let delivery = match args.delivery {
        Delivery::Poll => ProgressDelivery::Poll,
        Delivery::Stream => ProgressDelivery::Stream,
    };
    let mut events = wizard.subscribe_events();
    wizard.classify(delivery).await?;

    let results = loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("dropped {skipped} progress updates");
                continue;
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                bail!("workflow event channel closed before the run finished");
            }
        };
        match event {
            WorkflowEvent::JobProgress(job) => {
                let eta = job
                    .estimated_seconds_remaining
                    .map(|secs| format!(", ~{secs:.0}s left"))
                    .unwrap_or_default();
                println!(
                    "[{:>5.1}%] {} ({}/{}{eta})",
                    job.progress, job.current_step, job.processed, job.total
                );
            }
            WorkflowEvent::JobDeliveryDegraded { reason } => {
                warn!("progress stream lost, continuing over polling: {reason}");
            }
            WorkflowEvent::ClassificationCompleted(results) => break results,
            WorkflowEvent::ClassificationFailed(message) => bail!("classification failed: {message}"),
            _ => {}
        }
    };

    println!("Classified {} rows:", results.total_rows);
    let mut counts: Vec<_> = results.category_counts.iter().collect();
    counts.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    for (title, count) in counts {
        let share = *count as f64 / results.total_rows.max(1) as f64 * 100.0;
        println!("  {title}: {count} ({share:.1}%)");
    }

    if let Some(output) = &args.output {
        let format = match args.format {
            Format::Csv => ArtifactFormat::Csv,
            Format::Pdf => ArtifactFormat::Pdf,
        };
        let bytes = wizard.download(format, None).await?;
        tokio::fs::write(output, bytes)
            .await
            .with_context(|| format!("writing {}", output.display()))?;
        println!("Saved {} to {}", format.as_str(), output.display());
    }

    Ok(())
}
