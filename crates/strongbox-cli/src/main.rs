mod cli;
mod config;
mod storage;

use std::io::BufRead;

use clap::Parser;
use color_eyre::Result;
use strongbox_core::{raw_store::RawStore, store::EntryStore, SecurityLevel};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cli::{Command, ConfigCommand};

const PROBE_SERVICE: &str = "strongbox-health";
const PROBE_KEY: &str = "probe";

fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = cli::Cli::parse();
    let config = config::load()?;
    match cli.command {
        Command::Version => print_version(),
        Command::Config(ConfigCommand::Init) => init_config(&config)?,
        command => {
            let store = storage::store_from_config(&config)?;
            run(&store, command)?;
        }
    }

    Ok(())
}

fn init_tracing() {
    // Respect user-provided filters, default to info to avoid noisy stdout.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn print_version() {
    println!("strongbox {}", env!("CARGO_PKG_VERSION"));
}

fn init_config(config: &config::Config) -> Result<()> {
    let path = config::write_default_if_missing(config)?;
    println!("Config initialized at {}", path.display());
    Ok(())
}

/// Execute a store-backed command.
fn run<R: RawStore>(store: &EntryStore<R>, command: Command) -> Result<()> {
    match command {
        Command::Set {
            service,
            key,
            value,
            level,
        } => {
            let value = match value {
                Some(value) => value,
                None => read_value_from_stdin()?,
            };
            store.set(&service, &key, &value, level)?;
            println!("Stored {service}/{key}");
        }
        Command::Get { service, key, json } => {
            let result = store
                .get(&service, &key)?
                .ok_or_else(|| color_eyre::eyre::eyre!("no entry for {service}/{key}"))?;
            if json {
                let body = serde_json::json!({
                    "service": service,
                    "key": result.key,
                    "value": result.value,
                    "security_level": result.security_level,
                });
                println!("{body}");
            } else {
                println!("{}", result.value);
            }
        }
        Command::Remove { service, key } => {
            store.remove(&service, &key)?;
            println!("Removed {service}/{key}");
        }
        Command::Has { service, key } => {
            if !store.contains(&service, &key)? {
                color_eyre::eyre::bail!("no entry for {service}/{key}");
            }
            println!("yes");
        }
        Command::Reset { service } => {
            let removed = store.reset_service(&service)?;
            println!("Removed {removed} entries for {service}");
        }
        Command::Forget { service } => {
            store.registry().remove_keys(&service)?;
            println!("Forgot keys for {service}");
        }
        Command::SecurityLevel => match store.registry().best_security_level() {
            Some(level) => println!("{level}"),
            None => color_eyre::eyre::bail!("no cipher storage available"),
        },
        Command::Backends { json } => print_backends(store, json)?,
        Command::Health => {
            run_store_health(store)?;
            println!("Storage: ok");
        }
        Command::Version | Command::Config(_) => {}
    }
    Ok(())
}

fn read_value_from_stdin() -> Result<String> {
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    let value = line.trim_end_matches(['\r', '\n']).to_string();
    if value.is_empty() {
        color_eyre::eyre::bail!("refusing to store an empty value");
    }
    Ok(value)
}

fn print_backends<R: RawStore>(store: &EntryStore<R>, json: bool) -> Result<()> {
    if json {
        println!("{}", backends_json(store)?);
        return Ok(());
    }
    let rows = store.registry().describe();
    for row in rows {
        let mut flags = Vec::new();
        if !row.available {
            flags.push("unavailable");
        }
        if row.deprecated {
            flags.push("deprecated");
        }
        if row.supports_secure_hardware {
            flags.push("hardware");
        }
        println!(
            "{:<18} {:<16} min-platform {:<3} {:<11} {}",
            row.name,
            row.security_level,
            row.min_platform_version,
            row.key_scope,
            flags.join(",")
        );
    }
    Ok(())
}

fn backends_json<R: RawStore>(store: &EntryStore<R>) -> Result<String> {
    Ok(serde_json::to_string_pretty(&store.registry().describe())?)
}

/// Round-trips a probe entry through encryption and the raw store.
fn run_store_health<R: RawStore>(store: &EntryStore<R>) -> Result<()> {
    let payload = "ok";
    store.set(PROBE_SERVICE, PROBE_KEY, payload, SecurityLevel::Any)?;
    let round_trip = store.get(PROBE_SERVICE, PROBE_KEY)?;
    store.remove(PROBE_SERVICE, PROBE_KEY)?;

    match round_trip {
        Some(result) if result.value == payload => Ok(()),
        _ => color_eyre::eyre::bail!("storage round-trip failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{Config, PlatformConfig},
        storage,
    };

    #[test]
    fn health_check_with_test_store_succeeds() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = storage::test_store(&Config::default(), dir.path());
        run_store_health(&store).expect("health check should succeed");
        assert!(!store.contains(PROBE_SERVICE, PROBE_KEY).expect("contains"));
    }

    #[test]
    fn set_get_remove_commands_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = storage::test_store(&Config::default(), dir.path());

        run(
            &store,
            Command::Set {
                service: "github".into(),
                key: "token".into(),
                value: Some("token-abc".into()),
                level: SecurityLevel::SecureSoftware,
            },
        )
        .expect("set");
        let stored = store.get("github", "token").expect("get").expect("present");
        assert_eq!(stored.value, "token-abc");

        run(
            &store,
            Command::Remove {
                service: "github".into(),
                key: "token".into(),
            },
        )
        .expect("remove");
        assert!(run(
            &store,
            Command::Has {
                service: "github".into(),
                key: "token".into(),
            }
        )
        .is_err());
    }

    #[test]
    fn set_rejects_hardware_level_on_desktop() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = storage::test_store(&Config::default(), dir.path());
        let err = run(
            &store,
            Command::Set {
                service: "github".into(),
                key: "token".into(),
                value: Some("token-abc".into()),
                level: SecurityLevel::SecureHardware,
            },
        )
        .expect_err("no hardware backend");
        assert!(err.to_string().contains("no cipher storage satisfies"));
    }

    #[test]
    fn get_missing_entry_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = storage::test_store(&Config::default(), dir.path());
        let err = run(
            &store,
            Command::Get {
                service: "nope".into(),
                key: "k".into(),
                json: false,
            },
        )
        .expect_err("missing");
        assert!(err.to_string().contains("no entry"));
    }
    fn set_command(service: &str, key: &str, value: &str) -> Command {
        Command::Set {
            service: service.into(),
            key: key.into(),
            value: Some(value.into()),
            level: SecurityLevel::Any,
        }
    }

    #[test]
    fn forget_drops_per_service_keys() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = storage::test_store(&Config::default(), dir.path());
        run(&store, set_command("github", "token", "token-abc")).expect("set");
        run(&store, set_command("gitlab", "token", "token-xyz")).expect("set");

        run(
            &store,
            Command::Forget {
                service: "github".into(),
            },
        )
        .expect("forget");

        // the entry row survives but its key is gone
        assert!(store.contains("github", "token").expect("contains"));
        assert!(store.get("github", "token").is_err());
        assert_eq!(
            store.get("gitlab", "token").expect("get").expect("present").value,
            "token-xyz"
        );
    }

    #[test]
    fn reset_removes_entries_for_service() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = storage::test_store(&Config::default(), dir.path());
        run(&store, set_command("https://a.com", "alice", "one")).expect("set");
        run(&store, set_command("https://a.com", "bob", "two")).expect("set");
        run(&store, set_command("https://b.com", "alice", "three")).expect("set");

        run(
            &store,
            Command::Reset {
                service: "https://a.com".into(),
            },
        )
        .expect("reset");

        assert!(!store.contains("https://a.com", "alice").expect("contains"));
        assert!(!store.contains("https://a.com", "bob").expect("contains"));
        assert_eq!(
            store
                .get("https://b.com", "alice")
                .expect("get")
                .expect("present")
                .value,
            "three"
        );
    }

    #[test]
    fn security_level_reports_best_available() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = storage::test_store(&Config::default(), dir.path());
        run(&store, Command::SecurityLevel).expect("level available");
        assert_eq!(
            store.registry().best_security_level(),
            Some(SecurityLevel::SecureSoftware)
        );
    }

    #[test]
    fn security_level_fails_when_nothing_is_available() {
        let config = Config {
            platform: Some(PlatformConfig {
                api_level: Some(10),
            }),
            ..Config::default()
        };
        let dir = tempfile::tempdir().expect("tempdir");
        let store = storage::test_store(&config, dir.path());
        let err = run(&store, Command::SecurityLevel).expect_err("no backend");
        assert!(err.to_string().contains("no cipher storage available"));
    }

    #[test]
    fn backends_json_lists_rows_in_preference_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = storage::test_store(&Config::default(), dir.path());
        run(&store, Command::Backends { json: true }).expect("backends");

        let body: serde_json::Value =
            serde_json::from_str(&backends_json(&store).expect("json")).expect("valid json");
        let rows = body.as_array().expect("array");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["name"], "KeystoreAESGCM");
        assert_eq!(rows[0]["security_level"], "secure_software");
        assert_eq!(rows[0]["available"], true);
        assert_eq!(rows[1]["name"], "FacebookConceal");
        assert_eq!(rows[1]["key_scope"], "shared");
    }
}
