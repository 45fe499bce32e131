//! `agentbus workflow`: plan and build a mobile app step by step.

use agentbus_providers::build_from_config;
use agentbus_workflow::{LlmStepExecutor, WorkflowEvent, WorkflowRunner, mobile_app_blueprint};
use std::io::Write as _;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;

pub async fn run(
    config_override: Option<&Path>,
    app_name: &str,
    platform: &str,
    verbose: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_override)?;
    config
        .validate()
        .map_err(|e| format!("Invalid config: {e}"))?;

    let provider = Arc::new(build_from_config(&config));
    let executor = LlmStepExecutor::from_config(provider, &config);
    let mut workflow = mobile_app_blueprint(app_name, platform);
    let total = workflow.steps.len();

    println!("📱 {}", workflow.name);
    println!("   {} steps via {} / {}\n", total, config.default_provider, config.default_model);

    let (tx, rx) = mpsc::channel(256);
    let printer = tokio::spawn(print_events(rx, total, verbose));

    let report = WorkflowRunner::new()
        .with_events(tx)
        .run(&mut workflow, &executor)
        .await;
    // The runner drops its sender on return, which ends the printer.
    let _ = printer.await;

    if !verbose {
        for result in &report.results {
            println!("\n## {}\n{}", result.name, result.output.trim_end());
        }
    }

    println!();
    match &report.failure {
        None => {
            println!("🎉 Workflow complete: {}/{} steps", report.completed, total);
            Ok(())
        }
        Some((step, error)) => {
            println!(
                "❌ Workflow stopped at '{step}' ({}/{} done, {} skipped)",
                report.completed, total, report.skipped
            );
            Err(format!("Step '{step}' failed: {error}").into())
        }
    }
}

async fn print_events(mut rx: mpsc::Receiver<WorkflowEvent>, total: usize, verbose: bool) {
    let mut position = 0;
    while let Some(event) = rx.recv().await {
        match event {
            WorkflowEvent::StepStarted { name, .. } => {
                position += 1;
                println!("▶ [{position}/{total}] {name}");
            }
            WorkflowEvent::StepOutput { chunk, .. } if verbose => {
                print!("{chunk}");
                let _ = std::io::stdout().flush();
            }
            WorkflowEvent::StepOutput { .. } => {}
            WorkflowEvent::StepCompleted { step_id } => {
                if verbose {
                    println!();
                }
                println!("  ✅ {step_id}");
            }
            WorkflowEvent::StepFailed { step_id, error } => {
                println!("  ❌ {step_id}: {error}");
            }
            WorkflowEvent::StepSkipped { step_id } => {
                position += 1;
                println!("  ⏭  {step_id}");
            }
            WorkflowEvent::Finished { .. } => break,
        }
    }
}
