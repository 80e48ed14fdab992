use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use testimonial_scan::classifier::process::ProcessClassifier;
use testimonial_scan::config::ScanConfig;
use testimonial_scan::error::Error;
use testimonial_scan::mailbox::{
    AccessToken, GmailProvider, MailboxProvider, OutlookProvider, RetryPolicy, ScanQuery,
};
use testimonial_scan::pipeline::processor::{Interrupt, ScanPipeline, on_interrupt};
use testimonial_scan::pipeline::rules::SenderRules;
use testimonial_scan::pipeline::types::Source;
use testimonial_scan::report::{self, ReportWriter};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    match run().await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "Scan failed");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<ExitCode, Error> {
    let config = ScanConfig::from_env()?;

    eprintln!("📬 testimonial-scan v{}", env!("CARGO_PKG_VERSION"));
    eprintln!(
        "   Providers: {}",
        config
            .providers
            .iter()
            .map(Source::label)
            .collect::<Vec<_>>()
            .join(", ")
    );
    eprintln!(
        "   Classifier: {} run {}",
        config.classifier.program, config.classifier.model
    );
    eprintln!("   Reference: {}", config.reference_name);
    eprintln!("   Report: {}\n", config.report_path.display());

    // Credentials are checked up front so nothing is touched on a bad token.
    let retry = RetryPolicy::new(config.max_retries);
    let mut providers: Vec<Box<dyn MailboxProvider>> = Vec::with_capacity(config.providers.len());
    for source in &config.providers {
        let provider: Box<dyn MailboxProvider> = match source {
            Source::Gmail => {
                let token = AccessToken::load(Source::Gmail, &config.gmail_token)?;
                Box::new(GmailProvider::new(token).with_retry(retry))
            }
            Source::Outlook => {
                let token = AccessToken::load(Source::Outlook, &config.outlook_token)?;
                Box::new(OutlookProvider::new(token).with_retry(retry))
            }
        };
        providers.push(provider);
    }

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = Arc::clone(&cancel);
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                match on_interrupt(&cancel) {
                    Interrupt::Cancel => warn!(
                        "Interrupted, finishing current message and writing partial report (Ctrl-C again to abort)"
                    ),
                    Interrupt::Abort => {
                        eprintln!("Interrupted again, exiting without a report");
                        std::process::exit(130);
                    }
                }
            }
        });
    }

    let classifier = Arc::new(ProcessClassifier::new(&config.classifier));
    let pipeline = ScanPipeline::new(
        classifier,
        SenderRules::default_rules(),
        config.reference_name.clone(),
        config.only_with_replies,
    )
    .with_cancel_flag(cancel);

    let query = ScanQuery::new(config.keywords());
    let span = info_span!("run", run_id = %Uuid::new_v4());
    let results = pipeline.run(&providers, &query).instrument(span).await;

    let records = results.records();
    let writer = ReportWriter::new(&config.report_path);
    if let Err(e) = writer.write(&records).await {
        // Keep the results reachable even when the file can't be written.
        if let Ok(json) = report::to_json(&records) {
            println!("{json}");
        }
        return Err(e.into());
    }

    if results.cancelled() {
        warn!(count = records.len(), "Scan was interrupted; report is partial");
    }
    info!(count = records.len(), path = %writer.path().display(), "Saved testimonials");
    eprintln!(
        "✅ Saved {} testimonials to {}",
        records.len(),
        writer.path().display()
    );

    for (source, e) in &results.failures {
        eprintln!("⚠️  {source} scan aborted: {e}");
    }

    if results.failures.is_empty() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
