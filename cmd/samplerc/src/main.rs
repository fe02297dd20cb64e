//! samplerc - sampling action compiler CLI.
//!
//! Commands:
//! - `samplerc compile` - Compile manifests into processor documents
//! - `samplerc migrate` - Show or emit unified actions for legacy samplers
//! - `samplerc explain` - Generate a markdown report
//! - `samplerc watch` - Recompile whenever the manifests change
//! - `samplerc schema` - Print JSON schemas of the input kinds
//! - `samplerc init` - Scaffold an example manifests directory

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "samplerc")]
#[command(about = "Compiles trace sampling actions into collector processors")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text or json)
    #[arg(long, global = true, default_value = "text")]
    log_format: String,

    /// Path to a compiler configuration file (YAML or JSON)
    #[arg(short, long, global = true, env = "SAMPLERC_CONFIG")]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile manifests into processor documents
    Compile {
        /// Manifest file or directory
        #[arg(short, long, env = "SAMPLERC_MANIFESTS", default_value = "manifests")]
        manifests: String,

        /// Only compile this namespace
        #[arg(short, long)]
        namespace: Option<String>,

        /// Output directory (stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,

        /// Output format (yaml or json)
        #[arg(short, long, default_value = "yaml")]
        format: String,

        /// Fail if any resource has an invalid configuration
        #[arg(long)]
        strict: bool,
    },

    /// Show or emit the unified actions synthesized from legacy samplers
    Migrate {
        /// Manifest file or directory
        #[arg(short, long, env = "SAMPLERC_MANIFESTS", default_value = "manifests")]
        manifests: String,

        /// Only migrate this namespace
        #[arg(short, long)]
        namespace: Option<String>,

        /// Write the actions instead of listing them
        #[arg(long)]
        emit: bool,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,

        /// Output format (yaml or json)
        #[arg(short, long, default_value = "yaml")]
        format: String,
    },

    /// Generate a report explaining what each namespace compiles into
    Explain {
        /// Manifest file or directory
        #[arg(short, long, env = "SAMPLERC_MANIFESTS", default_value = "manifests")]
        manifests: String,

        /// Only explain this namespace
        #[arg(short, long)]
        namespace: Option<String>,

        /// Output path for the report (stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Recompile changed namespaces until interrupted
    Watch {
        /// Manifest file or directory
        #[arg(short, long, env = "SAMPLERC_MANIFESTS", default_value = "manifests")]
        manifests: String,

        /// Only watch this namespace
        #[arg(short, long)]
        namespace: Option<String>,

        /// Output directory for processor documents
        #[arg(short, long, default_value = "processors")]
        output: String,

        /// Output format (yaml or json)
        #[arg(short, long, default_value = "yaml")]
        format: String,

        /// Poll interval in seconds
        #[arg(long, default_value = "5")]
        interval: u64,
    },

    /// Print the JSON schema of the input resource kinds
    Schema {
        /// Only print this kind
        #[arg(short, long)]
        kind: Option<String>,
    },

    /// Initialize an example manifests directory
    Init {
        /// Project directory
        #[arg(default_value = ".")]
        path: String,
    },
}

fn init_tracing(verbose: bool, log_format: &str) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match log_format.to_lowercase().as_str() {
        "json" => builder.json().init(),
        "text" => builder.init(),
        other => anyhow::bail!("Unknown log format: {other}. Use 'text' or 'json'."),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, &cli.log_format)?;
    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Compile {
            manifests,
            namespace,
            output,
            format,
            strict,
        } => commands::compile::run(
            &config,
            &manifests,
            namespace.as_deref(),
            output.as_deref(),
            &format,
            strict,
        ),
        Commands::Migrate {
            manifests,
            namespace,
            emit,
            output,
            format,
        } => commands::migrate::run(
            &manifests,
            namespace.as_deref(),
            emit,
            output.as_deref(),
            &format,
        ),
        Commands::Explain {
            manifests,
            namespace,
            output,
        } => commands::explain::run(&config, &manifests, namespace.as_deref(), output.as_deref()),
        Commands::Watch {
            manifests,
            namespace,
            output,
            format,
            interval,
        } => commands::watch::run(config, &manifests, namespace, &output, &format, interval).await,
        Commands::Schema { kind } => commands::schema::run(kind.as_deref()),
        Commands::Init { path } => commands::init::run(&path),
    }
}
