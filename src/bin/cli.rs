use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};

use iomctl::cli::{init_logging, interrupt_token, write_starter_config, ConnectionArgs};
use iomctl::error::IomError;
use iomctl::ops::rules::{self, ResourceIdQuery, RuleUpdate};
use iomctl::ops::{Environment, Session};
use iomctl::output::console;
use iomctl::rules::validate::load_and_validate;
use iomctl::rules::{CloudProvider, Severity};
use iomctl::workflow::FailurePolicy;

/// Resource ids printed by `get-resource-ids`.
const RESOURCE_ID_PREVIEW: usize = 5;

#[derive(Parser)]
#[command(
    name = "iomctl",
    about = "Manage custom IOM rules on the CrowdStrike CSPM backend",
    version,
    author
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(flatten)]
    connection: ConnectionArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate one rule file (no network)
    Validate {
        /// Rule file
        #[arg(long, short = 'c')]
        config: PathBuf,
    },

    /// Validate every rule file in a directory (no network)
    ValidateAll {
        #[arg(long, default_value = "rules")]
        rules_dir: PathBuf,

        /// Keep going after an invalid file
        #[arg(long)]
        continue_on_error: bool,
    },

    /// Evaluate a rule's logic against sample resources
    Test {
        #[arg(long, short = 'c')]
        config: PathBuf,

        #[arg(long, value_enum, default_value_t = Environment::Staging)]
        environment: Environment,
    },

    /// Create one rule
    Create {
        #[arg(long, short = 'c')]
        config: PathBuf,

        #[arg(long, value_enum, default_value_t = Environment::Production)]
        environment: Environment,
    },

    /// Create every rule in a directory without checking existing rules
    CreateAll {
        #[arg(long, default_value = "rules")]
        rules_dir: PathBuf,

        #[arg(long, value_enum, default_value_t = Environment::Production)]
        environment: Environment,

        #[arg(long)]
        continue_on_error: bool,
    },

    /// Create or update every rule in a directory
    DeployAll {
        #[arg(long, default_value = "rules")]
        rules_dir: PathBuf,

        #[arg(long, value_enum, default_value_t = Environment::Production)]
        environment: Environment,

        #[arg(long)]
        continue_on_error: bool,
    },

    /// List custom rule ids
    List {
        /// FQL filter
        #[arg(long)]
        filter: Option<String>,

        #[arg(long, default_value_t = 100)]
        limit: usize,
    },

    /// Show rule details
    Details {
        #[arg(long, required = true, num_args = 1..)]
        rule_ids: Vec<String>,
    },

    /// Change fields of one rule
    Update {
        #[arg(long)]
        rule_id: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        description: Option<String>,

        /// 0 critical, 1 high, 2 medium, 3 informational
        #[arg(long, value_parser = parse_severity)]
        severity: Option<Severity>,

        #[arg(long)]
        alert_info: Option<String>,
    },

    /// Delete rules
    Delete {
        #[arg(long, required = true, num_args = 1..)]
        rule_ids: Vec<String>,

        /// Skip the confirmation prompt
        #[arg(long)]
        confirm: bool,
    },

    /// Fetch the input schema for a rule's resource type
    Schema {
        #[arg(long, short = 'c')]
        config: PathBuf,
    },

    /// Find resource ids to use as test fixtures
    GetResourceIds {
        /// Cloud provider (aws, azure, gcp, oci)
        #[arg(long)]
        provider: Option<CloudProvider>,

        #[arg(long)]
        resource_type: Option<String>,

        /// Extra FQL filter
        #[arg(long)]
        filter: Option<String>,

        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Export backend rules as rule files
    ExportAll {
        #[arg(long, default_value = "exported-rules")]
        output_dir: PathBuf,

        #[arg(long)]
        filter: Option<String>,

        #[arg(long, default_value_t = 5000)]
        limit: usize,
    },

    /// Generate a starter .iomctl.toml config file
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
}

fn parse_severity(s: &str) -> Result<Severity, String> {
    let level: u8 = s
        .parse()
        .map_err(|_| format!("'{s}' is not a severity level (0-3)"))?;
    Severity::try_from(level)
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Validate { config } => cmd_validate(config),
        Commands::ValidateAll {
            rules_dir,
            continue_on_error,
        } => cmd_validate_all(rules_dir, continue_on_error),
        Commands::Init { force } => write_starter_config(&cli.connection.config_file, force),
        command => run_online(&cli.connection, command),
    };

    match result {
        Ok(exit_code) => process::exit(exit_code),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(e.exit_code());
        }
    }
}

/// Commands that talk to the backend share one client and one interrupt flag.
fn run_online(connection: &ConnectionArgs, command: Commands) -> Result<i32, IomError> {
    let config = connection.config()?;
    let client = connection.connect(&config)?;
    let session = Session::new(&client, &config).with_cancel(interrupt_token());

    match command {
        Commands::Test {
            config: path,
            environment,
        } => cmd_test(&session, path, environment),
        Commands::Create {
            config: path,
            environment,
        } => cmd_create(&session, path, environment),
        Commands::CreateAll {
            rules_dir,
            environment,
            continue_on_error,
        } => cmd_reconcile(&session, rules_dir, environment, continue_on_error, false),
        Commands::DeployAll {
            rules_dir,
            environment,
            continue_on_error,
        } => cmd_reconcile(&session, rules_dir, environment, continue_on_error, true),
        Commands::List { filter, limit } => cmd_list(&session, filter, limit),
        Commands::Details { rule_ids } => cmd_details(&session, rule_ids),
        Commands::Update {
            rule_id,
            name,
            description,
            severity,
            alert_info,
        } => cmd_update(
            &session,
            rule_id,
            RuleUpdate {
                name,
                description,
                severity,
                alert_info,
            },
        ),
        Commands::Delete { rule_ids, confirm } => cmd_delete(&session, rule_ids, confirm),
        Commands::Schema { config: path } => cmd_schema(&session, path),
        Commands::GetResourceIds {
            provider,
            resource_type,
            filter,
            limit,
        } => cmd_resource_ids(
            &session,
            ResourceIdQuery {
                provider,
                resource_type,
                filter,
                limit,
            },
        ),
        Commands::ExportAll {
            output_dir,
            filter,
            limit,
        } => cmd_export_all(&session, output_dir, filter, limit),
        Commands::Validate { .. } | Commands::ValidateAll { .. } | Commands::Init { .. } => {
            Err(IomError::Internal("offline command routed online".into()))
        }
    }
}

fn saved(path: &Path) {
    println!("  Saved to {}", path.display());
}

fn cmd_validate(path: PathBuf) -> Result<i32, IomError> {
    let valid = load_and_validate(&path)?;
    print!("{}", console::validated_rule(&valid));
    Ok(0)
}

fn cmd_validate_all(rules_dir: PathBuf, continue_on_error: bool) -> Result<i32, IomError> {
    let summary = rules::validate_all(
        &rules_dir,
        Path::new("."),
        FailurePolicy::from_flag(continue_on_error),
    )?;
    print!("{}", console::validation_summary(&summary.value));
    saved(&summary.path);

    // Invalid rule files are validation failures
    Ok(if summary.value.is_clean() { 0 } else { 2 })
}

fn cmd_test(
    session: &Session<'_>,
    path: PathBuf,
    environment: Environment,
) -> Result<i32, IomError> {
    tracing::info!(%environment, config = %path.display(), "testing rule");
    let report = rules::test_rule(session, &path)?;
    print!("{}", console::rule_test(&report.value));
    saved(&report.path);
    Ok(0)
}

fn cmd_create(
    session: &Session<'_>,
    path: PathBuf,
    environment: Environment,
) -> Result<i32, IomError> {
    tracing::info!(%environment, config = %path.display(), "creating rule");
    let created = rules::create_rule(session, &path)?;
    let ids: Vec<String> = created
        .value
        .iter()
        .filter_map(|r| r.get("uuid").and_then(|v| v.as_str()).map(str::to_string))
        .collect();
    print!("{}", console::id_list("created rule(s)", &ids, ids.len()));
    saved(&created.path);
    Ok(0)
}

fn cmd_reconcile(
    session: &Session<'_>,
    rules_dir: PathBuf,
    environment: Environment,
    continue_on_error: bool,
    against_existing: bool,
) -> Result<i32, IomError> {
    let policy = FailurePolicy::from_flag(continue_on_error);
    let report = if against_existing {
        rules::deploy_all(session, &rules_dir, environment, policy)?
    } else {
        rules::create_all(session, &rules_dir, environment, policy)?
    };
    print!("{}", console::reconcile_summary(&report.value));
    saved(&report.path);

    if session.cancel.is_cancelled() {
        return Err(IomError::Cancelled);
    }
    Ok(if report.value.is_clean() { 0 } else { 1 })
}

fn cmd_list(session: &Session<'_>, filter: Option<String>, limit: usize) -> Result<i32, IomError> {
    let ids = rules::list_rules(session, filter.as_deref(), limit)?;
    print!(
        "{}",
        console::id_list("custom rule(s)", &ids.value, ids.value.len())
    );
    saved(&ids.path);
    Ok(0)
}

fn cmd_details(session: &Session<'_>, rule_ids: Vec<String>) -> Result<i32, IomError> {
    let details = rules::rule_details(session, &rule_ids)?;
    print!("{}", console::rule_details(&details.value));
    saved(&details.path);
    Ok(0)
}

fn cmd_update(session: &Session<'_>, rule_id: String, update: RuleUpdate) -> Result<i32, IomError> {
    let updated = rules::update_rule(session, &rule_id, update)?;
    println!("\n  Updated rule {}", rule_id);
    saved(&updated.path);
    Ok(0)
}

fn cmd_delete(
    session: &Session<'_>,
    rule_ids: Vec<String>,
    confirm: bool,
) -> Result<i32, IomError> {
    if !confirm && !confirm_delete(&rule_ids)? {
        println!("Deletion cancelled.");
        return Ok(1);
    }
    let deleted = rules::delete_rules(session, &rule_ids)?;
    print!("{}", console::delete_result(&deleted.value));
    saved(&deleted.path);
    Ok(if deleted.value.is_clean() { 0 } else { 1 })
}

fn confirm_delete(rule_ids: &[String]) -> Result<bool, IomError> {
    print!(
        "{}",
        console::id_list("rule(s) to delete", rule_ids, rule_ids.len())
    );
    print!("Type 'yes' to continue: ");
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "yes" | "y"))
}

fn cmd_schema(session: &Session<'_>, path: PathBuf) -> Result<i32, IomError> {
    let schema = rules::rule_schema(session, &path)?;
    println!(
        "\n  Input schema with {} entr{}",
        schema.value.len(),
        if schema.value.len() == 1 { "y" } else { "ies" }
    );
    saved(&schema.path);
    Ok(0)
}

fn cmd_resource_ids(session: &Session<'_>, query: ResourceIdQuery) -> Result<i32, IomError> {
    let found = rules::resource_ids(session, &query)?;
    print!(
        "{}",
        console::id_list("resource id(s)", &found.ids.value, RESOURCE_ID_PREVIEW)
    );
    saved(&found.ids.path);
    if let Some(sample) = &found.sample {
        saved(&sample.path);
    }
    Ok(0)
}

fn cmd_export_all(
    session: &Session<'_>,
    output_dir: PathBuf,
    filter: Option<String>,
    limit: usize,
) -> Result<i32, IomError> {
    let summary = rules::export_all(session, &output_dir, filter.as_deref(), limit)?;
    print!("{}", console::export_summary(&summary.value));
    saved(&summary.path);
    Ok(if summary.value.failed == 0 { 0 } else { 1 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn severity_flag_accepts_levels_zero_to_three() {
        assert_eq!(parse_severity("0").unwrap(), Severity::Critical);
        assert_eq!(parse_severity("3").unwrap(), Severity::Informational);
        assert!(parse_severity("4").is_err());
        assert!(parse_severity("high").is_err());
    }

    #[test]
    fn delete_requires_rule_ids() {
        assert!(Cli::try_parse_from(["iomctl", "delete"]).is_err());
        let cli = Cli::try_parse_from(["iomctl", "delete", "--rule-ids", "a", "b", "--confirm"])
            .unwrap();
        match cli.command {
            Commands::Delete { rule_ids, confirm } => {
                assert_eq!(rule_ids, vec!["a", "b"]);
                assert!(confirm);
            }
            _ => panic!("expected delete"),
        }
    }
}
