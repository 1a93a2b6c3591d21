use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::context::Context;
use crate::host::HostValue;
use crate::value::Value;

#[derive(Parser)]
#[command(name = "hostbridge")]
#[command(about = "hostbridge - run scripts against host-provided globals", long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default search)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a script file and print its completion value as JSON
    Run {
        /// Script file to execute
        file: PathBuf,

        /// Bind a global before running (NAME=JSON, repeatable)
        #[arg(short = 'b', long = "bind", value_name = "NAME=JSON")]
        bind: Vec<String>,
    },

    /// Evaluate script source given on the command line
    Eval {
        /// Script source
        source: String,

        /// Bind a global before running (NAME=JSON, repeatable)
        #[arg(short = 'b', long = "bind", value_name = "NAME=JSON")]
        bind: Vec<String>,
    },

    /// Print the effective configuration as TOML
    Config,
}

/// Run the CLI by parsing process arguments
pub fn run_cli() -> Result<()> {
    run_cli_with_args(Cli::parse())
}

/// Run the CLI with explicit arguments (the first one is the program name)
pub fn run_cli_from_args(args: Vec<String>) -> Result<()> {
    run_cli_with_args(Cli::parse_from(args))
}

fn run_cli_with_args(cli: Cli) -> Result<()> {
    // Load configuration before anything else so errors surface first
    let config = Config::builder()
        .config_path(cli.config.clone())
        .build()
        .context("Failed to load configuration")?;

    init_tracing(&config.logging.filter);

    match cli.command {
        Commands::Run { file, bind } => {
            let source = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let output = evaluate(&config, &source, &bind)?;
            println!("{}", output);
        }

        Commands::Eval { source, bind } => {
            let output = evaluate(&config, &source, &bind)?;
            println!("{}", output);
        }

        Commands::Config => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

/// RUST_LOG wins over the configured filter; output goes to stderr
fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    // a subscriber may already be installed when embedded
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Execute `source` in a fresh context and render the result as JSON
pub fn evaluate(config: &Config, source: &str, bindings: &[String]) -> Result<String> {
    let ctx = Context::with_options(config.context_options())?;
    for binding in bindings {
        let (name, value) = parse_binding(binding)?;
        debug!(name = %name, "binding from command line");
        ctx.bind(&name, value)
            .with_context(|| format!("Failed to bind {}", name))?;
    }

    let value = ctx.execute(source)?;
    render(&ctx, &value)
}

fn parse_binding(binding: &str) -> Result<(String, HostValue)> {
    let (name, json) = binding
        .split_once('=')
        .with_context(|| format!("Invalid binding '{}': expected NAME=JSON", binding))?;
    let name = name.trim();
    if name.is_empty() {
        anyhow::bail!("Invalid binding '{}': empty name", binding);
    }
    let json: serde_json::Value = serde_json::from_str(json)
        .with_context(|| format!("Invalid JSON for binding '{}'", name))?;
    Ok((name.to_string(), HostValue::from_json(json)))
}

fn render(ctx: &Context, value: &Value) -> Result<String> {
    if let Value::Function(handle) = value {
        return Ok(format!("[Function: {}]", handle.name()));
    }
    let host = ctx.export_dynamic(value)?;
    let json = host.to_json("$")?;
    Ok(serde_json::to_string_pretty(&json)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_binding() {
        let (name, value) = parse_binding("who={\"Name\":\"Lemmy\"}").unwrap();
        assert_eq!(name, "who");
        assert_eq!(value.field("Name"), Some(&HostValue::from("Lemmy")));
    }

    #[test]
    fn test_parse_binding_errors() {
        assert!(parse_binding("novalue").is_err());
        assert!(parse_binding("=1").is_err());
        assert!(parse_binding("x={oops").is_err());
    }

    #[test]
    fn test_evaluate_with_bindings() {
        let config = Config::default();
        let out = evaluate(
            &config,
            "people.map(p => p.Name).join(', ')",
            &["people=[{\"Name\":\"Lemmy\"},{\"Name\":\"Ozzy\"}]".to_string()],
        )
        .unwrap();
        assert_eq!(out, "\"Lemmy, Ozzy\"");
    }

    #[test]
    fn test_evaluate_renders_objects() {
        let out = evaluate(&Config::default(), "({ a: 1, b: [true, null] })", &[]).unwrap();
        let json: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(json, serde_json::json!({ "a": 1, "b": [true, null] }));
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["hostbridge", "eval", "1 + 1", "--bind", "x=1"]).unwrap();
        match cli.command {
            Commands::Eval { source, bind } => {
                assert_eq!(source, "1 + 1");
                assert_eq!(bind, vec!["x=1".to_string()]);
            }
            _ => panic!("expected eval"),
        }
    }
}
