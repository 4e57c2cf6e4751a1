//! Command-line interface definitions.

use clap::{ColorChoice, Parser, Subcommand};

use crate::core::CompilationMode;

/// Watch-mode build orchestrator for Elm with hot reload
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Control colored output (auto, always, never)
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Enable verbose output for debugging
    #[arg(short = 'V', long, global = true)]
    pub verbose: bool,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Compile all (or the selected) targets once and exit
    #[command(visible_alias = "m")]
    Make {
        #[command(flatten)]
        args: MakeArgs,
    },

    /// Watch, recompile on change, and hot reload connected programs
    #[command(visible_alias = "h")]
    Hot {
        /// Only targets whose name contains one of these substrings
        #[arg(value_name = "TARGET")]
        targets: Vec<String>,
    },
}

/// `make` command arguments.
#[derive(clap::Args, Debug, Clone)]
pub struct MakeArgs {
    /// Build with the time-travelling debugger
    #[arg(long, conflicts_with = "optimize")]
    pub debug: bool,

    /// Build with `--optimize`
    #[arg(long)]
    pub optimize: bool,

    /// Only targets whose name contains one of these substrings
    #[arg(value_name = "TARGET")]
    pub targets: Vec<String>,
}

impl MakeArgs {
    pub fn mode(&self) -> CompilationMode {
        if self.debug {
            CompilationMode::Debug
        } else if self.optimize {
            CompilationMode::Optimize
        } else {
            CompilationMode::Standard
        }
    }
}

impl Cli {
    /// Target name filters for either command.
    pub fn target_filters(&self) -> &[String] {
        match &self.command {
            Commands::Make { args } => &args.targets,
            Commands::Hot { targets } => targets,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_make_optimize() {
        let cli = Cli::try_parse_from(["elm-watch", "make", "--optimize", "main"]).unwrap();
        let Commands::Make { args } = &cli.command else {
            panic!("expected make");
        };
        assert_eq!(args.mode(), CompilationMode::Optimize);
        assert_eq!(cli.target_filters(), ["main".to_string()]);
    }

    #[test]
    fn test_debug_conflicts_with_optimize() {
        assert!(Cli::try_parse_from(["elm-watch", "make", "--debug", "--optimize"]).is_err());
    }

    #[test]
    fn test_parse_hot_verbose() {
        let cli = Cli::try_parse_from(["elm-watch", "hot", "-V", "admin", "app"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Hot { .. }));
        assert_eq!(cli.target_filters().len(), 2);
    }
}
