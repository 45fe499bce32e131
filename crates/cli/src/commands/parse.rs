//! `agentbus parse`: dry-run the action parser over saved model output.

use agentbus_actions::parse_report;
use std::path::Path;
use tokio::io::AsyncReadExt;

pub async fn run(file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let text = if file == Path::new("-") {
        let mut buf = String::new();
        tokio::io::stdin().read_to_string(&mut buf).await?;
        buf
    } else {
        tokio::fs::read_to_string(file)
            .await
            .map_err(|e| format!("Failed to read {}: {e}", file.display()))?
    };

    let report = parse_report(&text);

    println!("🔎 {} action(s)", report.actions.len());
    for (i, action) in report.actions.iter().enumerate() {
        let marker = if action.is_side_effecting() { "✏️ " } else { "  " };
        println!("  {:>2}. {marker}{:<16} {}", i + 1, action.verb(), action.describe());
    }

    if !report.skipped.is_empty() {
        println!("\n⚠️  {} block(s) skipped", report.skipped.len());
        for block in &report.skipped {
            println!("  @{:<6} {:<16} {}", block.offset, block.verb, block.reason);
        }
    }

    Ok(())
}
