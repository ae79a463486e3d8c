//! CLI argument definitions for optlayer.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// `--version` output with the commit and build time baked in by build.rs.
const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("OPTLAYER_GIT_COMMIT"),
    ", built ",
    env!("OPTLAYER_BUILD_TIMESTAMP"),
    ")"
);

/// optlayer - a layered option resolver.
///
/// Values resolve through request overrides, entity overrides, mode and
/// parent-mode values, site-wide values and finally computed defaults.
#[derive(Parser, Debug)]
#[command(name = "optlayer")]
#[command(author, version, long_version = LONG_VERSION, about = "Resolve and save layered site options", long_about = None)]
pub struct Cli {
    /// Output in human-readable format instead of JSON
    #[arg(short = 'H', long = "human", global = true)]
    pub human_readable: bool,

    /// Run as if optlayer was started in <path> instead of the current directory.
    /// Can also be set via OPTLAYER_SITE environment variable.
    #[arg(short = 'C', long = "site", global = true, env = "OPTLAYER_SITE")]
    pub site_path: Option<PathBuf>,

    /// Option schema file (overrides the `schema` config key)
    #[arg(long, global = true)]
    pub schema: Option<PathBuf>,

    /// Treat unregistered option names as errors (overrides the `strict` config key)
    #[arg(long, global = true, conflicts_with = "lenient")]
    pub strict: bool,

    /// Return a fallback for unregistered option names
    #[arg(long, global = true)]
    pub lenient: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create storage and a nonce secret for the site
    Init,

    /// Resolve an option value
    Get {
        /// Option name
        name: String,

        /// Rendering mode (e.g. post, page, courses_single)
        #[arg(short, long)]
        mode: Option<String>,

        /// Entity whose overrides apply
        #[arg(short, long)]
        entity: Option<u64>,

        /// Request overrides as a query string (e.g. "sidebar=left&excerpt_length_post=30")
        #[arg(short, long)]
        query: Option<String>,

        /// Value returned when nothing matches (implies lenient resolution)
        #[arg(long)]
        fallback: Option<String>,
    },

    /// Show every precedence layer consulted for an option
    Explain {
        /// Option name
        name: String,

        #[arg(short, long)]
        mode: Option<String>,

        #[arg(short, long)]
        entity: Option<u64>,

        #[arg(short, long)]
        query: Option<String>,
    },

    /// Save option values (site-wide, or one entity's overrides)
    Save {
        /// Entity to save overrides for (site-wide when omitted)
        #[arg(short, long, requires = "mode")]
        entity: Option<u64>,

        /// Mode of the entity being edited
        #[arg(short, long)]
        mode: Option<String>,

        /// Authenticity token from `optlayer nonce`
        #[arg(long)]
        token: String,

        /// Role of the acting user
        #[arg(long, default_value = "administrator")]
        role: String,

        /// Acting user name (defaults to $USER)
        #[arg(long)]
        user: Option<String>,

        /// Submitted value, as name=value (repeatable)
        #[arg(long = "set", value_name = "NAME=VALUE")]
        set: Vec<String>,

        /// Submit `inherit` for an option (repeatable)
        #[arg(long = "inherit", value_name = "NAME")]
        inherit: Vec<String>,
    },

    /// Remove every stored site-wide value
    Reset {
        #[arg(long)]
        token: String,

        #[arg(long, default_value = "administrator")]
        role: String,

        #[arg(long)]
        user: Option<String>,
    },

    /// Issue an authenticity token for a save
    Nonce {
        /// Issue for one entity's overrides instead of site-wide options
        #[arg(short, long)]
        entity: Option<u64>,
    },

    /// List form fields with their values, inherit state and visibility
    Form {
        /// Entity being edited (site-wide form when omitted)
        #[arg(short, long, requires = "mode")]
        entity: Option<u64>,

        #[arg(short, long)]
        mode: Option<String>,

        #[arg(short, long)]
        query: Option<String>,
    },

    /// Inspect the option schema
    Schema {
        #[command(subcommand)]
        command: SchemaCommands,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

/// Schema subcommands
#[derive(Subcommand, Debug)]
pub enum SchemaCommands {
    /// List option definitions
    Show {
        /// Only options in this section
        #[arg(long)]
        section: Option<String>,
    },

    /// List option dependencies
    Deps,
}

/// Configuration subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Get a configuration value
    Get {
        /// Configuration key
        key: String,
    },

    /// Set a configuration value
    Set {
        /// Configuration key
        key: String,
        /// Configuration value
        value: String,

        /// Write to the system config instead of the site's
        #[arg(long)]
        system: bool,
    },

    /// List all configuration values with their sources
    List,
}
