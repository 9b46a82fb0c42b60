use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use iomctl::cli::{init_logging, interrupt_token, ConnectionArgs};
use iomctl::error::IomError;
use iomctl::ops::schemas::{self, SupportOptions};
use iomctl::ops::Session;
use iomctl::output::{console, DocFormat};
use iomctl::progress::{CliProgress, ProgressTracker};
use iomctl::rules::CloudProvider;

#[derive(Parser)]
#[command(
    name = "iom-schemas",
    about = "Probe CSPM resource-type support and manage input schemas",
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
    /// Probe every catalog resource type of a provider
    TestSupport {
        /// Cloud provider (aws, azure, gcp, oci)
        #[arg(long)]
        provider: CloudProvider,

        #[arg(long, default_value = ".")]
        output_dir: PathBuf,

        /// Concurrent probes (overrides `[probe] workers`)
        #[arg(long)]
        workers: Option<usize>,

        /// Resource type list (default all-resource-types-<provider>.txt)
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Keep non-Microsoft Azure resource types
        #[arg(long)]
        include_third_party: bool,
    },

    /// Fetch schemas for every resource type seen in assets and rules
    GenerateAll {
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,

        /// Maximum rules scanned for resource types
        #[arg(long, default_value_t = 1000)]
        limit: usize,
    },

    /// Fetch one schema
    GetSchema {
        #[arg(long)]
        provider: CloudProvider,

        #[arg(long)]
        resource_type: String,

        #[arg(long)]
        output_file: Option<PathBuf>,
    },

    /// Check the structure of saved schema files
    ValidateSchemas {
        #[arg(long, default_value = ".")]
        schemas_dir: PathBuf,
    },

    /// Diff two schema directories
    CompareSchemas {
        #[arg(long)]
        old_dir: PathBuf,

        #[arg(long)]
        new_dir: PathBuf,

        #[arg(long, default_value = "schema-comparison.json")]
        output_file: PathBuf,
    },

    /// Render documentation for saved schemas
    GenerateDocs {
        #[arg(long, default_value = ".")]
        schemas_dir: PathBuf,

        #[arg(long, default_value = "docs")]
        output_dir: PathBuf,

        #[arg(long, value_enum, default_value_t = DocFormat::Markdown)]
        format: DocFormat,
    },

    /// List saved schemas by provider
    ListSchemas {
        #[arg(long, default_value = ".")]
        schemas_dir: PathBuf,

        #[arg(long)]
        provider: Option<CloudProvider>,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::ValidateSchemas { schemas_dir } => cmd_validate_schemas(schemas_dir),
        Commands::CompareSchemas {
            old_dir,
            new_dir,
            output_file,
        } => cmd_compare_schemas(old_dir, new_dir, output_file),
        Commands::GenerateDocs {
            schemas_dir,
            output_dir,
            format,
        } => cmd_generate_docs(schemas_dir, output_dir, format),
        Commands::ListSchemas {
            schemas_dir,
            provider,
        } => cmd_list_schemas(schemas_dir, provider),
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

fn run_online(connection: &ConnectionArgs, command: Commands) -> Result<i32, IomError> {
    let config = connection.config()?;
    let client = connection.connect(&config)?;
    let session = Session::new(&client, &config).with_cancel(interrupt_token());

    match command {
        Commands::TestSupport {
            provider,
            output_dir,
            workers,
            catalog,
            include_third_party,
        } => cmd_test_support(
            &session,
            SupportOptions {
                output_dir,
                workers,
                catalog,
                include_third_party,
                ..SupportOptions::new(provider)
            },
        ),
        Commands::GenerateAll { output_dir, limit } => {
            cmd_generate_all(&session, output_dir, limit)
        }
        Commands::GetSchema {
            provider,
            resource_type,
            output_file,
        } => cmd_get_schema(&session, provider, resource_type, output_file),
        _ => Err(IomError::Internal("offline command routed online".into())),
    }
}

fn cmd_test_support(session: &Session<'_>, options: SupportOptions) -> Result<i32, IomError> {
    let progress = CliProgress::new(&format!("Probing {} resource types", options.provider), 0);
    let output = schemas::test_support(session, &options, &progress)?;
    progress.finish_with_message("done");

    let report = &output.report.value;
    print!("{}", console::support_summary(report));
    println!("  Saved to {}", output.report.path.display());
    println!("  Saved to {}", output.markdown.display());

    if report.cancelled {
        return Err(IomError::Cancelled);
    }
    Ok(if report.has_errors() { 1 } else { 0 })
}

fn cmd_generate_all(
    session: &Session<'_>,
    output_dir: PathBuf,
    limit: usize,
) -> Result<i32, IomError> {
    let progress = CliProgress::new("Fetching schemas", 0);
    let index = schemas::generate_all(session, &output_dir, limit, &progress)?;
    progress.finish_with_message("done");

    print!("{}", console::resource_type_index(&index.value));
    println!("  Saved to {}", index.path.display());

    if index.value.cancelled {
        return Err(IomError::Cancelled);
    }
    Ok(0)
}

fn cmd_get_schema(
    session: &Session<'_>,
    provider: CloudProvider,
    resource_type: String,
    output_file: Option<PathBuf>,
) -> Result<i32, IomError> {
    let schema = schemas::get_schema(session, &provider, &resource_type, output_file)?;
    print!("{}", console::schema_summary(&schema.value));
    println!("  Saved to {}", schema.path.display());
    Ok(0)
}

fn cmd_validate_schemas(schemas_dir: PathBuf) -> Result<i32, IomError> {
    let report = schemas::validate_schemas(&schemas_dir)?;
    print!("{}", console::schema_validation(&report.value));
    println!("  Saved to {}", report.path.display());
    Ok(if report.value.is_clean() { 0 } else { 1 })
}

fn cmd_compare_schemas(
    old_dir: PathBuf,
    new_dir: PathBuf,
    output_file: PathBuf,
) -> Result<i32, IomError> {
    let comparison = schemas::compare_schemas(&old_dir, &new_dir, &output_file)?;
    print!("{}", console::comparison(&comparison.value));
    println!("  Saved to {}", comparison.path.display());
    Ok(0)
}

fn cmd_generate_docs(
    schemas_dir: PathBuf,
    output_dir: PathBuf,
    format: DocFormat,
) -> Result<i32, IomError> {
    let docs = schemas::generate_docs(&schemas_dir, &output_dir, format)?;
    println!(
        "\n  Documented {} schema(s) in {} file(s) under {}\n",
        docs.schemas,
        docs.files.len(),
        output_dir.display()
    );
    Ok(0)
}

fn cmd_list_schemas(
    schemas_dir: PathBuf,
    provider: Option<CloudProvider>,
) -> Result<i32, IomError> {
    let listing = schemas::list_schemas(&schemas_dir, provider.as_ref())?;
    print!("{}", console::schema_listing(&listing));
    Ok(0)
}
