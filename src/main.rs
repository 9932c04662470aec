use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use regwizard::api::{self, ErrorResponse, RegistrationRequest, RegistrationResponse};
use regwizard::app::{App, AppServices};
use regwizard::availability::{AvailabilityStatus, CheckedField};
use regwizard::config::Config;
use regwizard::draft::DraftStore;
use regwizard::form::{FormData, StepKind};
use regwizard::location::{self, LocationCache};
use regwizard::logging;
use regwizard::store::{FileStore, KeyValueStore};
use regwizard::validation;

#[derive(Parser)]
#[command(name = "regwizard")]
#[command(about = "Multi-step account registration wizard")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file path
    #[arg(short, long)]
    config: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List countries, using the local cache when fresh
    Countries {
        /// Only show countries whose name or code contains this text
        #[arg(short, long)]
        query: Option<String>,

        /// Ignore the cache and fetch again
        #[arg(long)]
        refresh: bool,
    },

    /// List states or provinces of a country
    States {
        /// Country code, e.g. US
        code: String,

        #[arg(long)]
        refresh: bool,
    },

    /// Check whether a username is still free
    CheckUsername { username: String },

    /// Check whether an email address is already registered
    CheckEmail { email: String },

    /// Validate a JSON file of form data
    Validate {
        file: PathBuf,

        /// Only run the rules for one step
        #[arg(short, long, value_enum)]
        step: Option<StepArg>,
    },

    /// Manage the location cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Inspect or discard the saved draft
    Draft {
        #[command(subcommand)]
        action: DraftAction,
    },

    /// Show or write the effective configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Print the JSON Schema of the registration payloads
    Schema,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the merged configuration as TOML
    Show,
    /// Write the merged configuration to .regwizard/config.toml
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Remove all cached countries and regions
    Clear,
}

#[derive(Subcommand)]
enum DraftAction {
    Show,
    Clear,
}

#[derive(Clone, Copy, ValueEnum)]
enum StepArg {
    Personal,
    Address,
    Account,
}

impl From<StepArg> for StepKind {
    fn from(step: StepArg) -> Self {
        match step {
            StepArg::Personal => StepKind::Personal,
            StepArg::Address => StepKind::Address,
            StepArg::Account => StepKind::Account,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;
    let interactive = cli.command.is_none();
    let logging_handle = logging::init_logging(&config, interactive, cli.debug)?;

    match cli.command {
        Some(Commands::Countries { query, refresh }) => {
            cmd_countries(&config, query, refresh).await?;
        }
        Some(Commands::States { code, refresh }) => {
            cmd_states(&config, &code, refresh).await?;
        }
        Some(Commands::CheckUsername { username }) => {
            cmd_check(&config, CheckedField::Username, &username).await?;
        }
        Some(Commands::CheckEmail { email }) => {
            cmd_check(&config, CheckedField::Email, &email).await?;
        }
        Some(Commands::Validate { file, step }) => {
            cmd_validate(&config, &file, step.map(StepKind::from)).await?;
        }
        Some(Commands::Cache {
            action: CacheAction::Clear,
        }) => {
            cmd_cache_clear(&config)?;
        }
        Some(Commands::Draft { action }) => {
            cmd_draft(&config, action)?;
        }
        Some(Commands::Config { action }) => {
            cmd_config(&config, action)?;
        }
        Some(Commands::Schema) => {
            cmd_schema()?;
        }
        None => {
            run_tui(config, logging_handle.log_file_path).await?;
        }
    }

    Ok(())
}

fn open_store(config: &Config) -> Result<Arc<dyn KeyValueStore>> {
    let dir = config.state_path();
    let store = FileStore::open(&dir)
        .with_context(|| format!("failed to open state store in {}", dir.display()))?;
    Ok(Arc::new(store))
}

fn location_cache(config: &Config, store: Arc<dyn KeyValueStore>) -> Result<Arc<LocationCache>> {
    let provider = location::provider_from_config(&config.location)?;
    Ok(Arc::new(LocationCache::new(
        provider,
        store,
        config.location.cache_ttl(),
    )))
}

async fn run_tui(config: Config, log_file_path: Option<PathBuf>) -> Result<()> {
    let store = open_store(&config)?;
    let services = AppServices {
        api: api::registration_api(&config.api)?,
        location: location_cache(&config, Arc::clone(&store))?,
        drafts: config
            .draft
            .enabled
            .then(|| DraftStore::new(Arc::clone(&store))),
    };

    let mut app = App::new(config, services);
    let result = app.run().await;

    if let Some(log_path) = log_file_path {
        if log_path.metadata().is_ok_and(|m| m.len() > 0) {
            eprintln!("Session log: {}", log_path.display());
        }
    }

    result
}

async fn cmd_countries(config: &Config, query: Option<String>, refresh: bool) -> Result<()> {
    let cache = location_cache(config, open_store(config)?)?;
    let lookup = match query {
        Some(q) if !refresh => cache.search_countries(&q).await?,
        Some(q) => {
            cache.refresh_countries().await?;
            cache.search_countries(&q).await?
        }
        None => cache.get_countries(refresh).await?,
    };

    if let Some(err) = &lookup.error {
        eprintln!("Warning: {} (showing {} data)", err.user_message(), lookup.source.as_str());
    }
    if lookup.items.is_empty() {
        println!("No countries found");
        return Ok(());
    }

    println!("Countries ({})", lookup.items.len());
    println!("{}", "─".repeat(60));
    for country in &lookup.items {
        let flag = country.flag.as_deref().unwrap_or("  ");
        let tlds = country.tlds.join(" ");
        println!("{} {:<4} {:<36} {}", flag, country.code, country.name, tlds);
    }
    Ok(())
}

async fn cmd_states(config: &Config, code: &str, refresh: bool) -> Result<()> {
    let cache = location_cache(config, open_store(config)?)?;
    let lookup = cache.get_states(&code.to_uppercase(), refresh).await;

    if let Some(err) = &lookup.error {
        eprintln!("Warning: {} (showing {} data)", err.user_message(), lookup.source.as_str());
    }
    if lookup.items.is_empty() {
        println!("No states or provinces found for {}", code.to_uppercase());
        return Ok(());
    }

    println!("States of {} ({})", code.to_uppercase(), lookup.items.len());
    println!("{}", "─".repeat(60));
    for region in &lookup.items {
        println!("{:<6} {}", region.code, region.name);
    }
    Ok(())
}

async fn cmd_check(config: &Config, field: CheckedField, value: &str) -> Result<()> {
    let api = api::registration_api(&config.api)?;
    let (checker, _rx) =
        regwizard::availability::AvailabilityChecker::new(api, &config.availability);
    let update = checker.check_now(field, value).await;

    match update.status {
        AvailabilityStatus::Available => println!("✓ {value} is available"),
        AvailabilityStatus::Taken => {
            println!("✗ {}", update.message.unwrap_or_default());
            std::process::exit(1);
        }
        AvailabilityStatus::Unknown | AvailabilityStatus::Checking => {
            eprintln!("{}", update.message.unwrap_or_default());
            if let Some(err) = update.error {
                eprintln!("  {err}");
            }
            std::process::exit(2);
        }
    }
    Ok(())
}

async fn cmd_validate(config: &Config, file: &Path, step: Option<StepKind>) -> Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let form: FormData = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not valid form data", file.display()))?;

    let result = match step {
        Some(step) => validation::validate_step(step, &form),
        None => {
            let countries = if config.validation.email_domain_check {
                let cache = location_cache(config, open_store(config)?)?;
                Some(cache.get_countries(false).await?.items)
            } else {
                None
            };
            validation::validate_all(&form, countries.as_deref())
        }
    };

    if result.is_valid() {
        println!("✓ Form data is valid");
        return Ok(());
    }

    println!("{} problem(s) found", result.errors.len());
    println!("{}", "─".repeat(60));
    for error in &result.errors {
        match error.field {
            Some(field) => println!("  {:<18} {}", field.key(), error.message),
            None => println!("  {}", error.message),
        }
    }
    std::process::exit(1);
}

fn cmd_cache_clear(config: &Config) -> Result<()> {
    let cache = location_cache(config, open_store(config)?)?;
    let removed = cache.clear_cache()?;
    println!("Removed {removed} cached location entries");
    Ok(())
}

fn cmd_draft(config: &Config, action: DraftAction) -> Result<()> {
    let drafts = DraftStore::new(open_store(config)?);
    match action {
        DraftAction::Show => match drafts.load()? {
            Some(draft) => {
                println!("Saved {} on step {}", draft.saved_at.to_rfc3339(), draft.current_step);
                println!("{}", serde_json::to_string_pretty(&draft.data)?);
            }
            None => println!("No saved draft"),
        },
        DraftAction::Clear => {
            drafts.clear()?;
            println!("Draft discarded");
        }
    }
    Ok(())
}

fn cmd_config(config: &Config, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let rendered =
                toml::to_string_pretty(config).context("Failed to serialize config to TOML")?;
            print!("{rendered}");
        }
        ConfigAction::Init { force } => {
            let path = Config::local_config_path();
            if path.exists() && !force {
                anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
            }
            config.save()?;
            println!("Wrote {}", path.display());
        }
    }
    Ok(())
}

fn cmd_schema() -> Result<()> {
    let schemas = serde_json::json!({
        "FormData": schemars::schema_for!(FormData),
        "RegistrationRequest": schemars::schema_for!(RegistrationRequest),
        "RegistrationResponse": schemars::schema_for!(RegistrationResponse),
        "ErrorResponse": schemars::schema_for!(ErrorResponse),
    });
    println!("{}", serde_json::to_string_pretty(&schemas)?);
    Ok(())
}
