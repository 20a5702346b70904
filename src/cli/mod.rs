//! Command-line interface for fnbridge.
//!
//! Every setting can come from its environment variable or from a flag;
//! flags win. Settings not known to the CLI (those of built-in extensions)
//! are read straight from the environment.

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use crate::adapters::BUILTIN_EXTENSIONS;
use crate::config::{
    self, ConfigSource, PoolConfig, FUNCTION_COMMAND, MAX_EXEC_MILLIS, MAX_FUNCTION_COUNT,
    MAX_WAIT_MILLIS, SINK_PLUGIN_PATH, SINK_PLUGIN_SYMBOL, SOURCE_PLUGIN_PATH,
    SOURCE_PLUGIN_SYMBOL,
};
use crate::core::Orchestrator;

/// fnbridge - run external functions for each event of a source
#[derive(Parser, Debug)]
#[command(name = "fnbridge")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub settings: Settings,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Run the pipeline until the event source finishes (default)
    Run,

    /// List built-in extension modules
    Extensions,

    /// Show resolved configuration without running anything
    Config,
}

/// Bridge settings, each backed by an environment variable.
///
/// Numeric policies are kept as strings: an unparsable value must fall back
/// to its default instead of being rejected by argument parsing.
#[derive(Args, Debug, Clone, Default)]
pub struct Settings {
    /// Module path of the event source
    #[arg(long, env = "SOURCE_PLUGIN_PATH", global = true)]
    pub source_path: Option<String>,

    /// Symbol of the event source within its module
    #[arg(long, env = "SOURCE_PLUGIN_SYMBOL", global = true)]
    pub source_symbol: Option<String>,

    /// Module path of the event sink (optional)
    #[arg(long, env = "SINK_PLUGIN_PATH", global = true)]
    pub sink_path: Option<String>,

    /// Symbol of the event sink (required with --sink-path)
    #[arg(long, env = "SINK_PLUGIN_SYMBOL", global = true)]
    pub sink_symbol: Option<String>,

    /// Command run for each invocation
    #[arg(long = "function-command", env = "FUNCTION_COMMAND", global = true)]
    pub function_command: Option<String>,

    /// Maximum concurrent invocations [default: 8]
    #[arg(long, env = "MAX_FUNCTION_COUNT", global = true)]
    pub max_function_count: Option<String>,

    /// Maximum wait for a free invoker, in milliseconds [default: 500]
    #[arg(long, env = "MAX_WAIT_MILLIS", global = true)]
    pub max_wait_millis: Option<String>,

    /// Maximum execution time per invocation, in milliseconds [default: 30000]
    #[arg(long, env = "MAX_EXEC_MILLIS", global = true)]
    pub max_exec_millis: Option<String>,
}

impl ConfigSource for Settings {
    fn get(&self, key: &str) -> Option<String> {
        let field = match key {
            SOURCE_PLUGIN_PATH => &self.source_path,
            SOURCE_PLUGIN_SYMBOL => &self.source_symbol,
            SINK_PLUGIN_PATH => &self.sink_path,
            SINK_PLUGIN_SYMBOL => &self.sink_symbol,
            FUNCTION_COMMAND => &self.function_command,
            MAX_FUNCTION_COUNT => &self.max_function_count,
            MAX_WAIT_MILLIS => &self.max_wait_millis,
            MAX_EXEC_MILLIS => &self.max_exec_millis,
            _ => return config::EnvSource.get(key),
        };
        field.clone()
    }

    fn vars(&self) -> Vec<(String, String)> {
        config::EnvSource.vars()
    }
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command.unwrap_or(Commands::Run) {
            Commands::Run => {
                Orchestrator::default().run(&self.settings).await?;
                Ok(())
            }
            Commands::Extensions => {
                list_extensions();
                Ok(())
            }
            Commands::Config => {
                show_config(&self.settings);
                Ok(())
            }
        }
    }
}

fn list_extensions() {
    println!("Built-in extensions:");
    for ext in BUILTIN_EXTENSIONS {
        println!();
        println!("  {}  {} ({})", ext.module_path, ext.symbol, ext.shape);
        println!("    {}", ext.summary);
        if !ext.settings.is_empty() {
            println!("    Settings: {}", ext.settings.join(", "));
        }
    }
}

fn show_config(settings: &Settings) {
    println!("Invoker pool:");
    match PoolConfig::from_source(settings) {
        Ok(pool) => {
            println!("  Command:          {}", pool.command);
            println!("  Max invokers:     {}", pool.max_concurrent_invokers);
            println!("  Max queue wait:   {}ms", pool.max_queue_wait.as_millis());
            println!("  Max exec time:    {}ms", pool.max_execution_time.as_millis());
            println!("  Inherited vars:   {}", pool.inherited_env.len());
        }
        Err(e) => println!("  (invalid: {})", e),
    }
    println!();

    println!("Extensions:");
    match Orchestrator::source_reference(settings) {
        Ok(source) => println!("  Source: {}", source),
        Err(e) => println!("  Source: (invalid: {})", e),
    }
    match Orchestrator::sink_reference(settings) {
        Ok(Some(sink)) => println!("  Sink:   {}", sink),
        Ok(None) => println!("  Sink:   (none)"),
        Err(e) => println!("  Sink:   (invalid: {})", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_parse() {
        let cli = Cli::try_parse_from([
            "fnbridge",
            "--source-path",
            "builtin/lines",
            "--source-symbol",
            "LineSource",
            "--function-command",
            "cat -n",
            "--max-exec-millis",
            "soon",
            "config",
        ])
        .unwrap();

        assert_eq!(cli.command, Some(Commands::Config));
        assert_eq!(cli.settings.get(SOURCE_PLUGIN_PATH).as_deref(), Some("builtin/lines"));
        assert_eq!(cli.settings.get(FUNCTION_COMMAND).as_deref(), Some("cat -n"));

        let pool = PoolConfig::from_source(&cli.settings).unwrap();
        assert_eq!(pool.max_execution_time.as_millis(), 30_000);
    }

    #[test]
    fn test_unknown_keys_fall_through_to_environment() {
        let settings = Settings::default();
        assert_eq!(
            settings.get("FNBRIDGE_SURELY_UNSET_VARIABLE"),
            None
        );
        assert!(!settings.vars().is_empty());
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
