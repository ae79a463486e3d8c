//! optlayer CLI - resolve and save layered site options.

use clap::Parser;
use optlayer::action_log;
use optlayer::cli::{Cli, Commands, ConfigCommands, SchemaCommands};
use optlayer::commands::{self, Output};
use optlayer::config::{ConfigOverrides, OutputFormat, resolve_config_without_storage};
use optlayer::storage::Storage;
use std::env;
use std::path::{Path, PathBuf};
use std::process;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter (e.g. `optlayer=debug`).
const LOG_ENV: &str = "OPTLAYER_LOG";

fn main() {
    install_tracing();

    let cli = Cli::parse();
    let site_path = resolve_site_path(cli.site_path.clone(), cli.human_readable);
    let overrides = config_overrides(&cli);
    let human = wants_human(&site_path, &overrides);

    let (cmd_name, args_json) = serialize_command(&cli.command);
    let start = Instant::now();

    let result = run_command(cli.command, &site_path, &overrides, human);

    let duration = start.elapsed().as_millis() as u64;
    let (success, error) = match &result {
        Ok(_) => (true, None),
        Err(e) => (false, Some(e.to_string())),
    };
    action_log::log_action(&site_path, &cmd_name, args_json, success, error, duration);

    if let Err(e) = result {
        if human {
            eprintln!("Error: {}", e);
        } else {
            eprintln!("{}", serde_json::json!({ "error": e.to_string() }));
        }
        process::exit(1);
    }
}

/// Log to stderr so JSON on stdout stays parseable.
fn install_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Resolve the site path: --site flag > OPTLAYER_SITE env > current directory.
fn resolve_site_path(explicit_path: Option<PathBuf>, human: bool) -> PathBuf {
    match explicit_path {
        Some(path) => {
            if !path.exists() {
                let message = format!("Specified site path does not exist: {}", path.display());
                if human {
                    eprintln!("Error: {}", message);
                } else {
                    eprintln!("{}", serde_json::json!({ "error": message }));
                }
                process::exit(1);
            }
            path
        }
        None => env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

fn config_overrides(cli: &Cli) -> ConfigOverrides {
    let mut overrides = ConfigOverrides::new();
    if cli.human_readable {
        overrides = overrides.with_output_format(OutputFormat::Human);
    }
    if cli.strict {
        overrides = overrides.with_strict(true);
    } else if cli.lenient {
        overrides = overrides.with_strict(false);
    }
    if let Some(schema) = &cli.schema {
        overrides = overrides.with_schema(schema.clone());
    }
    overrides
}

/// Human output when -H is given or `output-format "human"` is configured.
fn wants_human(site_path: &Path, overrides: &ConfigOverrides) -> bool {
    let config = match Storage::open(site_path) {
        Ok(storage) => optlayer::config::resolve_config(&storage, overrides),
        Err(_) => resolve_config_without_storage(overrides),
    };
    config
        .map(|c| *c.output_format() == OutputFormat::Human)
        .unwrap_or(overrides.output_format == Some(OutputFormat::Human))
}

fn run_command(
    command: Commands,
    site_path: &Path,
    overrides: &ConfigOverrides,
    human: bool,
) -> Result<(), optlayer::Error> {
    match command {
        Commands::Init => output(&commands::init(site_path)?, human),

        Commands::Get {
            name,
            mode,
            entity,
            query,
            fallback,
        } => output(
            &commands::get(
                site_path,
                overrides,
                &name,
                mode.as_deref(),
                entity,
                query.as_deref(),
                fallback.as_deref(),
            )?,
            human,
        ),

        Commands::Explain {
            name,
            mode,
            entity,
            query,
        } => output(
            &commands::explain(
                site_path,
                overrides,
                &name,
                mode.as_deref(),
                entity,
                query.as_deref(),
            )?,
            human,
        ),

        Commands::Save {
            entity,
            mode,
            token,
            role,
            user,
            set,
            inherit,
        } => output(
            &commands::save(
                site_path,
                overrides,
                entity,
                mode.as_deref(),
                &token,
                &role,
                user.as_deref(),
                &set,
                &inherit,
            )?,
            human,
        ),

        Commands::Reset { token, role, user } => output(
            &commands::reset(site_path, overrides, &token, &role, user.as_deref())?,
            human,
        ),

        Commands::Nonce { entity } => output(&commands::nonce(site_path, entity)?, human),

        Commands::Form {
            entity,
            mode,
            query,
        } => output(
            &commands::form(site_path, overrides, entity, mode.as_deref(), query.as_deref())?,
            human,
        ),

        Commands::Schema { command } => match command {
            SchemaCommands::Show { section } => output(
                &commands::schema_show(site_path, overrides, section.as_deref())?,
                human,
            ),
            SchemaCommands::Deps => output(&commands::schema_deps(site_path, overrides)?, human),
        },

        Commands::Config { command } => match command {
            ConfigCommands::Get { key } => output(&commands::config_get(site_path, &key)?, human),
            ConfigCommands::Set { key, value, system } => output(
                &commands::config_set(site_path, &key, &value, system)?,
                human,
            ),
            ConfigCommands::List => output(&commands::config_list(site_path)?, human),
        },
    }

    Ok(())
}

/// Print output in JSON or human-readable format.
fn output<T: Output>(result: &T, human: bool) {
    if human {
        println!("{}", result.to_human());
    } else {
        println!("{}", result.to_json());
    }
}

/// Command name and arguments for the action log.
fn serialize_command(command: &Commands) -> (String, serde_json::Value) {
    match command {
        Commands::Init => ("init".to_string(), serde_json::json!({})),

        Commands::Get {
            name,
            mode,
            entity,
            query,
            fallback,
        } => (
            "get".to_string(),
            serde_json::json!({ "name": name, "mode": mode, "entity": entity, "query": query, "fallback": fallback }),
        ),

        Commands::Explain {
            name,
            mode,
            entity,
            query,
        } => (
            "explain".to_string(),
            serde_json::json!({ "name": name, "mode": mode, "entity": entity, "query": query }),
        ),

        Commands::Save {
            entity,
            mode,
            token,
            role,
            user,
            set,
            inherit,
        } => (
            "save".to_string(),
            serde_json::json!({
                "entity": entity,
                "mode": mode,
                "token": token,
                "role": role,
                "user": user,
                "set": set,
                "inherit": inherit,
            }),
        ),

        Commands::Reset { token, role, user } => (
            "reset".to_string(),
            serde_json::json!({ "token": token, "role": role, "user": user }),
        ),

        Commands::Nonce { entity } => (
            "nonce".to_string(),
            serde_json::json!({ "entity": entity }),
        ),

        Commands::Form {
            entity,
            mode,
            query,
        } => (
            "form".to_string(),
            serde_json::json!({ "entity": entity, "mode": mode, "query": query }),
        ),

        Commands::Schema { command } => match command {
            SchemaCommands::Show { section } => (
                "schema show".to_string(),
                serde_json::json!({ "section": section }),
            ),
            SchemaCommands::Deps => ("schema deps".to_string(), serde_json::json!({})),
        },

        Commands::Config { command } => match command {
            ConfigCommands::Get { key } => {
                ("config get".to_string(), serde_json::json!({ "setting": key }))
            }
            ConfigCommands::Set { key, value, system } => (
                "config set".to_string(),
                serde_json::json!({ "setting": key, "value": value, "system": system }),
            ),
            ConfigCommands::List => ("config list".to_string(), serde_json::json!({})),
        },
    }
}
