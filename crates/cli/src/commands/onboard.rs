//! `agentbus onboard`: first-time setup.

use agentbus_config::AppConfig;
use std::path::Path;

pub async fn run(config_override: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = super::config_file(config_override);
    let workspace_dir = AppConfig::workspace_dir();

    println!("🚌 AgentBus First-Time Setup");
    println!("==============================\n");

    if let Some(config_dir) = config_path.parent()
        && !config_dir.as_os_str().is_empty()
    {
        if config_dir.exists() {
            println!("  Config directory exists: {}", config_dir.display());
        } else {
            std::fs::create_dir_all(config_dir)?;
            println!("✅ Created config directory: {}", config_dir.display());
        }
    }

    if !workspace_dir.exists() {
        std::fs::create_dir_all(&workspace_dir)?;
        println!("✅ Created workspace directory: {}", workspace_dir.display());
    }

    if config_path.exists() {
        println!("\n⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete and re-run onboard.\n");
    } else {
        std::fs::write(&config_path, AppConfig::default_toml())?;
        println!("✅ Created config.toml at: {}", config_path.display());
        println!("\n📝 Next steps:");
        println!("   1. Pick a provider and model in {}", config_path.display());
        println!("   2. Set workspace.root, or pass --workspace to `agentbus run`");
        println!("   3. Run: agentbus run \"add a login form\"\n");
    }

    println!("🎉 Setup complete! The mock provider works without an API key.\n");

    Ok(())
}
