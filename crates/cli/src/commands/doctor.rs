//! `agentbus doctor`: diagnose configuration and workspace.

use agentbus_providers::build_from_config;
use agentbus_tools::WorkspaceFs;
use std::path::Path;

pub async fn run(config_override: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 AgentBus Doctor");
    println!("==================\n");

    let mut issues = 0;

    let config_path = super::config_file(config_override);
    if !config_path.exists() {
        println!("  ⚠️  No config file at {} (using defaults)", config_path.display());
        println!("     Run `agentbus onboard` to create one.");
        issues += 1;
    }

    let config = match super::load_config(config_override) {
        Ok(config) => {
            println!("  ✅ Config loaded");
            config
        }
        Err(e) => {
            println!("  ❌ {e}");
            println!("\n  ⚠️  1 blocking issue found. Fix the config and re-run.");
            return Ok(());
        }
    };

    match config.validate() {
        Ok(()) => println!("  ✅ Config valid"),
        Err(e) => {
            println!("  ❌ Config invalid: {e}");
            issues += 1;
        }
    }

    let router = build_from_config(&config);
    match router.resolve(&config.default_provider) {
        Ok(provider) => println!(
            "  ✅ Provider '{}' ready (model {})",
            provider.name(),
            config.default_model
        ),
        Err(e) => {
            println!("  ❌ Provider '{}': {e}", config.default_provider);
            println!("     Available: {}", router.list().join(", "));
            issues += 1;
        }
    }

    match &config.workspace.root {
        Some(root) => {
            let fs = WorkspaceFs::from_config(&config.workspace);
            match fs.open(root).await {
                Ok(path) => println!("  ✅ Workspace opens at {}", path.display()),
                Err(e) => {
                    println!("  ❌ Workspace {}: {e}", root.display());
                    issues += 1;
                }
            }
        }
        None => println!("  ℹ️  No workspace.root set; `agentbus run` uses the current directory"),
    }
    if !config.workspace.forbidden_paths.is_empty() {
        println!(
            "  🔒 Forbidden paths: {}",
            config.workspace.forbidden_paths.join(", ")
        );
    }

    if config.approval.require_approval {
        println!("  ✅ Writes, deletes and commands require approval");
    } else {
        println!("  ⚠️  Approval disabled: actions run without asking");
    }

    if config.terminal.allowed_commands.is_empty() {
        println!("  ⚠️  Terminal allowlist empty: any command may run");
    } else {
        println!(
            "  ✅ Terminal allowlist: {}",
            config.terminal.allowed_commands.join(", ")
        );
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
