use clap::{Parser, Subcommand};
use strongbox_core::SecurityLevel;

/// CLI surface definition.
#[derive(Parser, Debug)]
#[command(
    name = "strongbox",
    about = "Encrypted credential store with pluggable cipher backends",
    version,
    propagate_version = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Encrypt and store a value (read from stdin when omitted).
    Set {
        service: String,
        key: String,
        value: Option<String>,
        /// Minimum security level the backend must guarantee.
        #[arg(long, default_value = "any")]
        level: SecurityLevel,
    },
    /// Decrypt and print a stored value.
    Get {
        service: String,
        key: String,
        /// Print the value and achieved level as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Delete a stored entry (backend keys are kept).
    Remove { service: String, key: String },
    /// Exit successfully when an entry exists.
    Has { service: String, key: String },
    /// Delete every entry stored for a service, then drop its key material.
    Reset { service: String },
    /// Drop backend key material for a service. Shared-key backends keep theirs.
    Forget { service: String },
    /// Print the strongest level available on this host.
    SecurityLevel,
    /// List cipher backends in preference order.
    Backends {
        #[arg(long)]
        json: bool,
    },
    /// Round-trip a probe value through the store.
    Health,
    /// Print version and exit.
    Version,
    /// Manage CLI configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Create a default config file if one does not exist.
    Init,
}
