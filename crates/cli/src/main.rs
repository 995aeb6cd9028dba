mod commands;
mod config;

use std::path::PathBuf;

use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// VisaNet visa application workflow client.
#[derive(Parser)]
#[command(
    name = "visanet",
    version,
    about = "VisaNet visa application workflow client"
)]
struct Cli {
    /// Config file (default: $VISANET_CONFIG, then ./visanet.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Identity from the config to invoke as
    #[arg(long, global = true)]
    identity: Option<String>,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Arguments shared by every post-submission transition.
#[derive(Args, Debug, Clone)]
pub(crate) struct TransitionArgs {
    /// Submitting agency (first key part)
    submitter: String,
    /// Application number (second key part)
    application_number: String,
    /// Organization the caller acts for; must be the identity's own MSP
    approving_org: String,
    /// Organization currently holding the application
    previous_org: String,
    /// Date/time recorded on the application
    date_time: String,
}

impl TransitionArgs {
    fn into_args(self) -> Vec<String> {
        vec![
            self.submitter,
            self.application_number,
            self.approving_org,
            self.previous_org,
            self.date_time,
        ]
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create an empty ledger file
    Init {
        /// Overwrite an existing ledger file
        #[arg(long)]
        force: bool,
    },

    /// Submit a new visa application
    Submit {
        submitter: String,
        application_number: String,
        /// Submission date/time
        submission_date_time: String,
    },

    /// Record the document check verdict
    #[command(group(ArgGroup::new("verdict").required(true).args(["pass", "fail"])))]
    DocCheck {
        #[arg(long)]
        pass: bool,
        #[arg(long)]
        fail: bool,
        #[command(flatten)]
        target: TransitionArgs,
    },

    /// Record the history check verdict
    #[command(group(ArgGroup::new("verdict").required(true).args(["pass", "fail"])))]
    HistoryCheck {
        #[arg(long)]
        pass: bool,
        #[arg(long)]
        fail: bool,
        #[command(flatten)]
        target: TransitionArgs,
    },

    /// Approve an application whose history check passed
    Approve {
        #[command(flatten)]
        target: TransitionArgs,
    },

    /// Decline an application
    Decline {
        #[command(flatten)]
        target: TransitionArgs,
    },

    /// Show every recorded version of an application
    History {
        submitter: String,
        application_number: String,
    },

    /// Query applications
    Query {
        #[command(subcommand)]
        command: QueryCommands,
    },

    /// Invoke a contract function by name with string arguments
    Invoke {
        /// Function name, e.g. appsubmit or queryNamed
        function: String,
        /// Function arguments
        #[arg(allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

#[derive(Subcommand)]
enum QueryCommands {
    /// Applications whose owner equals OWNER
    Owner { owner: String },
    /// Applications whose submitter equals PREFIX
    Prefix { prefix: String },
    /// Run a raw rich query, e.g. '{"selector":{"ownerMSP":"Org1MSP"}}'
    Adhoc { query: String },
    /// Run a named query (new, docschkpassed, docschkfailed, historychkpassed,
    /// historychkfailed, approved, declined)
    Named { name: String },
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("VISANET_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    let session = commands::Session {
        config: cli.config,
        identity: cli.identity,
        output: cli.output,
        quiet: cli.quiet,
    };

    let (function, args) = match cli.command {
        Commands::Init { force } => {
            commands::cmd_init(&session, force).await;
            return;
        }
        Commands::Submit {
            submitter,
            application_number,
            submission_date_time,
        } => (
            "appsubmit".to_string(),
            vec![submitter, application_number, submission_date_time],
        ),
        Commands::DocCheck { pass, target, .. } => {
            let function = if pass {
                "documentcheckpass"
            } else {
                "documentcheckfail"
            };
            (function.to_string(), target.into_args())
        }
        Commands::HistoryCheck { pass, target, .. } => {
            let function = if pass {
                "historycheckpass"
            } else {
                "historycheckfail"
            };
            (function.to_string(), target.into_args())
        }
        Commands::Approve { target } => ("approve".to_string(), target.into_args()),
        Commands::Decline { target } => ("decline".to_string(), target.into_args()),
        Commands::History {
            submitter,
            application_number,
        } => (
            "queryHistory".to_string(),
            vec![submitter, application_number],
        ),
        Commands::Query { command } => match command {
            QueryCommands::Owner { owner } => ("queryOwner".to_string(), vec![owner]),
            QueryCommands::Prefix { prefix } => ("queryPartial".to_string(), vec![prefix]),
            QueryCommands::Adhoc { query } => ("queryAdhoc".to_string(), vec![query]),
            QueryCommands::Named { name } => ("queryNamed".to_string(), vec![name]),
        },
        Commands::Invoke { function, args } => (function, args),
    };

    commands::cmd_invoke(&session, &function, &args).await;
}

pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        }
    }
}
