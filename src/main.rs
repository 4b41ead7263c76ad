// main.rs: arg parsing and orchestration only.
// All I/O lives in the modules below.
mod config;
mod deps;
mod exec;
mod net;
mod prompt;
mod python;
mod repo;
mod setup;
mod status;
mod update;

use std::ffi::OsString;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use config::{Config, ConfigError};
use prompt::{AssumeYes, Prompt, Terminal, UserDeclined};

#[derive(Parser, Debug)]
#[command(
    name = "cngt-cli",
    version,
    about = "CLI tool for Custom Nothing Glyph Tools",
    long_about = "A cross-platform CLI tool that wraps the custom-nothing-glyph-tools repository,\n\
                  providing easy installation, dependency management, and usage from any directory."
)]
struct Cli {
    /// Answer yes to every prompt
    #[arg(short, long)]
    yes: bool,

    /// Enable debug logging (RUST_LOG is honoured otherwise)
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run GlyphMigrate.py with the given arguments
    #[command(disable_help_flag = true)]
    Migrate {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<OsString>,
    },
    /// Run GlyphModder.py with the given arguments
    #[command(disable_help_flag = true)]
    Modder {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<OsString>,
    },
    /// Run GlyphTranslator.py with the given arguments
    #[command(disable_help_flag = true)]
    Translator {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<OsString>,
    },
    /// Update the CNGT repository to the latest version
    Update,
    /// Update the cngt-cli tool itself
    #[command(alias = "self-update")]
    Upgrade,
    /// Show status of CNGT installation and dependencies
    Status,
    /// Interactive setup of CNGT repository and dependencies
    Setup,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match config::load() {
        Ok(config) => config,
        // status still reports, and succeeds, without a usable data directory.
        Err(e) if matches!(cli.command, Commands::Status) => {
            tracing::debug!("config unavailable: {e}");
            print!("{}", status_report(Err(&e)));
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            eprintln!("[cngt] error: {e}");
            return ExitCode::FAILURE;
        }
    };
    tracing::debug!("data directory: {}", config.data_dir.display());

    // Passive check: advisory only, never blocks or fails the command.
    if !matches!(cli.command, Commands::Upgrade) {
        update::spawn_background_check(&config);
    }

    let mut prompt: Box<dyn Prompt> = if cli.yes {
        Box::new(AssumeYes)
    } else {
        Box::new(Terminal)
    };

    match run(cli.command, &config, prompt.as_mut()) {
        Ok(code) => exit_with(code),
        Err(e) => {
            if let Some(declined) = e.downcast_ref::<UserDeclined>() {
                eprintln!("[cngt] {declined}");
            } else {
                eprintln!("[cngt] error: {e:#}");
            }
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("cngt_cli=debug,warn")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Execute one command; the returned code becomes the process exit code.
fn run(command: Commands, config: &Config, prompt: &mut dyn Prompt) -> anyhow::Result<i32> {
    match command {
        Commands::Migrate { args } => dispatch(config, prompt, exec::MIGRATE_SCRIPT, &args),
        Commands::Modder { args } => dispatch(config, prompt, exec::MODDER_SCRIPT, &args),
        Commands::Translator { args } => dispatch(config, prompt, exec::TRANSLATOR_SCRIPT, &args),
        Commands::Update => {
            setup::ensure_environment(config, prompt).context("setup error")?;
            let outcome = repo::update(&config.repo_path).context("error updating CNGT")?;
            if let repo::PullOutcome::FastForwarded(commit) = &outcome {
                println!("Now at commit {commit}");
            }
            println!("CNGT repository updated successfully");
            Ok(0)
        }
        Commands::Upgrade => {
            update::self_update(prompt).context("error updating CLI")?;
            Ok(0)
        }
        Commands::Status => {
            print!("{}", status_report(Ok(config)));
            Ok(0)
        }
        Commands::Setup => {
            setup::interactive_setup(config, prompt).context("setup failed")?;
            println!("\u{2713} Setup completed successfully!");
            println!("You can now use cngt-cli commands like 'cngt-cli migrate --help'");
            Ok(0)
        }
    }
}

fn status_report(config: Result<&Config, &ConfigError>) -> String {
    let status = match config {
        Ok(config) => status::collect(config),
        Err(e) => status::unavailable(e),
    };
    status::render(&status, &status::full_version())
}

fn dispatch(
    config: &Config,
    prompt: &mut dyn Prompt,
    script: &str,
    args: &[OsString],
) -> anyhow::Result<i32> {
    setup::ensure_environment(config, prompt).context("setup error")?;
    let code = exec::run_script(config, script, args)
        .with_context(|| format!("error running {script}"))?;
    Ok(code)
}

fn exit_with(code: i32) -> ExitCode {
    match u8::try_from(code) {
        Ok(code) => ExitCode::from(code),
        // Codes outside 0..=255 (e.g. Windows NTSTATUS values) go out unchanged.
        Err(_) => std::process::exit(code),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn script_args_pass_through_including_flags() {
        let cli = Cli::try_parse_from(["cngt-cli", "migrate", "--help", "-v", "file.ogg"]).unwrap();
        assert!(!cli.verbose);
        let Commands::Migrate { args } = cli.command else {
            panic!("expected migrate");
        };
        assert_eq!(args, ["--help", "-v", "file.ogg"]);
    }

    #[test]
    fn global_flags_before_subcommand() {
        let cli = Cli::try_parse_from(["cngt-cli", "-y", "-v", "translator", "a", "b"]).unwrap();
        assert!(cli.yes);
        assert!(cli.verbose);
        let Commands::Translator { args } = cli.command else {
            panic!("expected translator");
        };
        assert_eq!(args, ["a", "b"]);
    }

    #[test]
    fn self_update_is_an_alias_of_upgrade() {
        let cli = Cli::try_parse_from(["cngt-cli", "self-update"]).unwrap();
        assert!(matches!(cli.command, Commands::Upgrade));
    }

    #[test]
    fn status_report_survives_config_failure() {
        let err = ConfigError::CreateDir {
            path: "/dev/null/x".into(),
            source: std::io::Error::other("Not a directory"),
        };
        let text = status_report(Err(&err));
        assert!(text.contains("CNGT CLI Version: "));
        assert!(text.contains("error loading config: failed to create data directory /dev/null/x"));
        assert!(text.contains("Python: Unknown"));
        assert!(text.contains("Dependencies: Unknown"));
    }

    #[test]
    fn status_report_for_empty_data_dir_suggests_setup() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::at(dir.path().to_path_buf(), true);
        let text = status_report(Ok(&config));
        assert!(text.contains("CNGT Repository: Not installed"));
        assert!(text.contains("cngt-cli setup"));
    }

    #[test]
    fn status_takes_no_arguments() {
        assert!(Cli::try_parse_from(["cngt-cli", "status", "extra"]).is_err());
    }
}
