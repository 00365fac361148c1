use std::path::PathBuf;

use clap::{Parser, Subcommand};

use cadence_core::{InstanceState, OrgId, RuleKey};

/// Administer alert definitions in the local cadence store.
///
/// Rules are addressed as `ORG_ID/UID`. Every command prints JSON.
#[derive(Parser, Debug)]
#[command(name = "cadence", version, about)]
pub struct CliArgs {
    /// JSON file backing the store (defaults to CADENCE_DATA_PATH)
    #[arg(long, global = true)]
    pub data_path: Option<PathBuf>,

    /// Config profile; keys are looked up as {PROFILE}_{KEY} first
    #[arg(long, env = "CADENCE_PROFILE", default_value = "", global = true)]
    pub profile: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create an alert definition
    Create {
        #[arg(long)]
        org: OrgId,
        #[arg(long)]
        title: String,
        /// Ref id of the query that decides the state
        #[arg(long)]
        condition: String,
        /// Queries as JSON, or @path to read them from a file
        #[arg(long, value_parser = parse_data)]
        data: serde_json::Value,
        /// Evaluation interval in seconds (store default when omitted)
        #[arg(long)]
        interval: Option<u64>,
        /// Explicit UID (generated when omitted)
        #[arg(long)]
        uid: Option<String>,
    },
    /// Update fields of an alert definition; omitted fields are kept
    Update {
        key: RuleKey,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        condition: Option<String>,
        #[arg(long, value_parser = parse_data)]
        data: Option<serde_json::Value>,
        #[arg(long)]
        interval: Option<u64>,
    },
    /// Show one alert definition
    Get { key: RuleKey },
    /// List definitions: scheduling summaries, or full definitions of one org
    List {
        #[arg(long)]
        org: Option<OrgId>,
    },
    /// Delete a definition with its versions and instances
    Delete { key: RuleKey },
    /// Pause definitions of an organization
    Pause {
        #[arg(long)]
        org: OrgId,
        #[arg(required = true)]
        uids: Vec<String>,
    },
    /// Resume paused definitions of an organization
    Unpause {
        #[arg(long)]
        org: OrgId,
        #[arg(required = true)]
        uids: Vec<String>,
    },
    /// Show the version history of a definition
    Versions { key: RuleKey },
    /// List alert instances of an organization
    Instances {
        #[arg(long)]
        org: OrgId,
        #[arg(long)]
        uid: Option<String>,
        /// normal, alerting, pending, no_data, or error
        #[arg(long)]
        state: Option<InstanceState>,
    },
}

/// Parse inline JSON, or `@path` to read it from a file.
fn parse_data(raw: &str) -> Result<serde_json::Value, String> {
    let text = match raw.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read {path}: {e}"))?,
        None => raw.to_string(),
    };
    serde_json::from_str(&text).map_err(|e| format!("invalid JSON: {e}"))
}
