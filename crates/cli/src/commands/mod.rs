mod render;

use std::path::PathBuf;
use std::process;

use visanet_contract::{Invocation, VisaApplicationContract};
use visanet_ledger::{CallerIdentity, InMemoryLedger};

use crate::config::{read_config, resolve_config_path, Config};
use crate::{report_error, OutputFormat};

/// Global options every command runs with.
pub(crate) struct Session {
    pub config: Option<PathBuf>,
    pub identity: Option<String>,
    pub output: OutputFormat,
    pub quiet: bool,
}

impl Session {
    fn fail(&self, msg: &str) -> ! {
        report_error(msg, self.output, self.quiet);
        process::exit(1);
    }

    fn load_config(&self) -> Config {
        let path = resolve_config_path(self.config.as_deref());
        match read_config(&path) {
            Ok(config) => config,
            Err(e) => self.fail(&format!("error: {}", e)),
        }
    }

    fn caller(&self, config: &Config) -> CallerIdentity {
        let name = match self.identity.as_deref() {
            Some(name) => name,
            None => self.fail("error: --identity is required for this command"),
        };
        match config.identity(name) {
            Ok(caller) => caller,
            Err(e) => self.fail(&format!("error: {}", e)),
        }
    }
}

/// Write an empty ledger file at the configured location.
pub(crate) async fn cmd_init(session: &Session, force: bool) {
    let config = session.load_config();
    let path = config.ledger_path();
    if path.exists() && !force {
        session.fail(&format!(
            "error: ledger '{}' already exists (use --force to overwrite)",
            path.display()
        ));
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = std::fs::create_dir_all(parent) {
            session.fail(&format!(
                "error: could not create '{}': {}",
                parent.display(),
                e
            ));
        }
    }

    let ledger = InMemoryLedger::new();
    if let Err(e) = ledger.save(&path).await {
        session.fail(&format!("error: {}", e));
    }
    VisaApplicationContract::new().instantiate();
    if !session.quiet {
        match session.output {
            OutputFormat::Text => println!("initialized ledger {}", path.display()),
            OutputFormat::Json => println!(
                "{}",
                serde_json::json!({ "ledger": path.display().to_string() })
            ),
        }
    }
}

/// Parse and run one contract function, persisting the ledger if it changed.
pub(crate) async fn cmd_invoke(session: &Session, function: &str, args: &[String]) {
    let invocation = match Invocation::parse(function, args) {
        Ok(invocation) => invocation,
        Err(e) => session.fail(&format!("error: {}", e)),
    };

    let config = session.load_config();
    let caller = session.caller(&config);
    let path = config.ledger_path();
    let ledger = match InMemoryLedger::load(&path).await {
        Ok(ledger) => ledger,
        Err(e) => session.fail(&format!(
            "error: {} (run `visanet init` to create the ledger)",
            e
        )),
    };

    let read_only = invocation.is_read_only();
    let contract = VisaApplicationContract::new();
    let result = match contract.invoke(&ledger, &caller, invocation).await {
        Ok(result) => result,
        Err(e) => session.fail(&format!("error: {}", e)),
    };

    if !read_only {
        if let Err(e) = ledger.save(&path).await {
            session.fail(&format!("error: {}", e));
        }
    }

    if session.quiet {
        return;
    }
    match session.output {
        OutputFormat::Json => match serde_json::to_string_pretty(&result) {
            Ok(s) => println!("{}", s),
            Err(e) => session.fail(&format!("error: {}", e)),
        },
        OutputFormat::Text => print!("{}", render::render_text(&result)),
    }
}
