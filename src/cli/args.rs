//! CLI argument definitions using clap

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueHint};

/// Edit and compile hierarchical YAML configuration: a default tree plus
/// per-environment overrides with inheritance, anchors and variables
#[derive(Parser, Debug)]
#[command(name = "yamlenv")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase log verbosity (-d info, -dd debug, -ddd trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub debug: u8,

    /// Project directory (default: cwd)
    #[arg(short = 'C', long, global = true, value_hint = ValueHint::DirPath)]
    pub project_dir: Option<PathBuf>,

    /// Configuration file (default: `default_file` setting)
    #[arg(short, long, global = true, env = "YAMLENV_FILE", value_hint = ValueHint::FilePath)]
    pub file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the compiled YAML of an environment
    Compile {
        /// Environment name (interactive selection if omitted)
        #[arg(short, long)]
        env: Option<String>,
    },

    /// Serialize the configuration and compile every environment
    Validate,

    /// Show the default and environments trees
    Tree,

    /// Show the YAML of a single node, e.g. `default.db`
    Preview {
        /// Node path
        path: String,
    },

    /// List the keys that may be added under a node
    Keys {
        /// Node path
        path: String,
    },

    /// Add a property under a node
    Add {
        /// Parent node path, e.g. `environments.prod.db`
        parent: String,
        /// Property key (omit for array elements)
        key: Option<String>,
        #[command(flatten)]
        property: PropertyArgs,
    },

    /// Edit a property
    Edit {
        /// Node path
        path: String,
        /// New key
        #[arg(short, long)]
        key: Option<String>,
        #[command(flatten)]
        property: PropertyArgs,
    },

    /// Delete a property or environment
    Delete {
        /// Node path
        path: String,
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// List configuration files below a directory
    List {
        /// Directory to search (default: project directory)
        #[arg(value_hint = ValueHint::DirPath)]
        dir: Option<PathBuf>,
    },

    /// Manage settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Generate shell completions
    Completion {
        /// Shell type
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Editable fields of a property. Unset fields keep their current value.
#[derive(Args, Debug, Clone, Default)]
pub struct PropertyArgs {
    /// Value type: string, boolean, number, object, array
    #[arg(short = 't', long = "type")]
    pub value_type: Option<String>,

    /// Scalar value
    #[arg(short, long, allow_hyphen_values = true)]
    pub value: Option<String>,

    /// Anchor name exported by the node
    #[arg(long, conflicts_with = "no_anchor")]
    pub anchor: Option<String>,

    /// Remove the node's anchor
    #[arg(long)]
    pub no_anchor: bool,

    /// Anchor aliased by the node (repeatable, replaces existing aliases)
    #[arg(long = "alias", conflicts_with = "no_aliases")]
    pub aliases: Vec<String>,

    /// Remove all aliases
    #[arg(long)]
    pub no_aliases: bool,

    /// Comment (empty string removes it)
    #[arg(long)]
    pub comment: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show merged config
    Show,

    /// Create config template
    Init {
        /// Create global config
        #[arg(short, long)]
        global: bool,
    },

    /// Show config paths
    Path,
}
