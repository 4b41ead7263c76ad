use anyhow::Context;

use crate::config::Config;
use crate::deps;
use crate::prompt::{Prompt, UserDeclined};
use crate::repo;

/// True when the repository clone or any dependency is missing.
pub fn needs_setup(config: &Config) -> bool {
    !repo::is_installed(&config.repo_path) || !deps::are_installed(config)
}

/// Make sure the repository and dependencies are in place before a command runs.
///
/// Fast path: nothing missing, nothing printed. Otherwise asks once (default
/// yes) and runs the guided setup.
pub fn ensure_environment(config: &Config, prompt: &mut dyn Prompt) -> anyhow::Result<()> {
    if !needs_setup(config) {
        return Ok(());
    }

    println!("CNGT CLI - First Time Setup");
    println!("This tool requires the CNGT repository and Python dependencies.");
    println!();
    if !prompt.confirm("Would you like to install everything now?", true)? {
        println!("Setup cancelled. You can run 'cngt-cli setup' anytime to install.");
        return Err(UserDeclined("setup required but cancelled by user".to_string()).into());
    }

    interactive_setup(config, prompt)
}

/// Clone the repository if absent, then check and install dependencies.
pub fn interactive_setup(config: &Config, prompt: &mut dyn Prompt) -> anyhow::Result<()> {
    println!("Starting CNGT CLI Setup...");
    println!();

    if repo::is_installed(&config.repo_path) {
        println!("\u{2713} CNGT repository already installed");
    } else {
        println!("Installing CNGT repository...");
        println!("   Repository: {}", repo::REPO_URL);
        println!("   Location: {}", config.repo_path.display());
        println!();
        repo::install(&config.repo_path).context("failed to install CNGT repository")?;
        println!("\u{2713} CNGT repository installed successfully");
    }
    println!();

    if deps::are_installed(config) {
        println!("\u{2713} Python dependencies already installed");
    } else {
        let packages: Vec<String> = deps::REQUIRED.iter().map(ToString::to_string).collect();
        println!("Checking Python dependencies...");
        println!("   Required packages: {}", packages.join(", "));
        println!();
        deps::check_interactive(config, prompt).context("failed to install dependencies")?;
    }
    println!();
    Ok(())
}
