//! LedgerKV command-line tool
//!
//! Opens a log file, runs one command against it, and closes it again.
//! Useful for inspecting or patching a store's log by hand.

use anyhow::{bail, Context};
use chrono::TimeDelta;
use ledgerkv::{FlushPolicy, Store, StoreConfig};
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// The command to run against the log
#[derive(Debug, PartialEq)]
enum Command {
    Set {
        key: String,
        value: Value,
        ttl_secs: Option<i64>,
    },
    Get {
        key: String,
    },
    Del {
        key: String,
    },
    Dump,
    Stats,
}

/// Tool configuration
#[derive(Debug)]
struct Config {
    /// Path of the log file
    log_path: PathBuf,
    /// Flush policy used while the command runs
    policy: FlushPolicy,
    command: Command,
}

impl Config {
    /// Parse configuration from command-line arguments
    fn from_args(args: &[String]) -> anyhow::Result<Self> {
        let mut log_path = PathBuf::from("ledgerkv.wal");
        let mut policy = FlushPolicy::Immediate;

        let mut i = 0;
        while i < args.len() {
            match args[i].as_str() {
                "--log" | "-l" => {
                    let value = args.get(i + 1).context("--log requires a value")?;
                    log_path = PathBuf::from(value);
                    i += 2;
                }
                "--policy" | "-p" => {
                    let value = args.get(i + 1).context("--policy requires a value")?;
                    policy = value.parse()?;
                    i += 2;
                }
                "--help" | "-h" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("ledgerkv version {}", ledgerkv::VERSION);
                    std::process::exit(0);
                }
                _ => break,
            }
        }

        let command = parse_command(&args[i..])?;
        Ok(Self {
            log_path,
            policy,
            command,
        })
    }
}

fn parse_command(args: &[String]) -> anyhow::Result<Command> {
    let Some(name) = args.first() else {
        bail!("missing command (try --help)");
    };
    let rest = &args[1..];

    let command = match (name.as_str(), rest) {
        ("set", [key, raw, tail @ ..]) => {
            // Anything that is not valid JSON is stored as a plain string.
            let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone()));
            let ttl_secs = match tail {
                [] => None,
                [flag, secs] if flag == "--ttl-secs" => Some(
                    secs.parse::<i64>()
                        .with_context(|| format!("invalid ttl {secs:?}"))?,
                ),
                _ => bail!("usage: set <key> <value> [--ttl-secs N]"),
            };
            Command::Set {
                key: key.clone(),
                value,
                ttl_secs,
            }
        }
        ("get", [key]) => Command::Get { key: key.clone() },
        ("del", [key]) => Command::Del { key: key.clone() },
        ("dump", []) => Command::Dump,
        ("stats", []) => Command::Stats,
        (other, _) => bail!("unknown command or wrong arguments: {other}"),
    };
    Ok(command)
}

fn print_help() {
    println!(
        r#"
LedgerKV - A Durable, Expiring Key-Value Store

USAGE:
    ledgerkv [OPTIONS] <COMMAND>

OPTIONS:
    -l, --log <PATH>         Log file to open (default: ledgerkv.wal)
    -p, --policy <POLICY>    immediate | manual | periodic | periodic:<ms>
                             (default: immediate)
    -v, --version            Print version information
    -h, --help               Print this help message

COMMANDS:
    set <key> <value> [--ttl-secs N]   Store a JSON value (or plain string)
    get <key>                          Print the value, or (nil)
    del <key>                          Delete a key
    dump                               Print every live entry as a JSON line
    stats                              Print store statistics

LOGGING:
    Set RUST_LOG (e.g. RUST_LOG=debug) to see recovery and flush events.
"#
    );
}

fn run(config: Config) -> anyhow::Result<()> {
    let store: Store = Store::open_with_config(
        StoreConfig::new(&config.log_path).with_flush_policy(config.policy),
    )
    .with_context(|| format!("failed to open {}", config.log_path.display()))?;

    match config.command {
        Command::Set {
            key,
            value,
            ttl_secs,
        } => {
            match ttl_secs {
                Some(secs) => {
                    let ttl = TimeDelta::try_seconds(secs).context("ttl out of range")?;
                    store.set_with_ttl(key, value, ttl)?
                }
                None => store.set(key, value)?,
            }
            println!("OK");
        }
        Command::Get { key } => match store.get(&key)? {
            Some(value) => println!("{value}"),
            None => println!("(nil)"),
        },
        Command::Del { key } => {
            store.delete(&key)?;
            println!("OK");
        }
        Command::Dump => {
            for (key, entry) in store.live_entries()? {
                let line = match entry.expires_at {
                    Some(at) => json!({"key": key, "value": entry.value, "expiresAt": at}),
                    None => json!({"key": key, "value": entry.value}),
                };
                println!("{line}");
            }
        }
        Command::Stats => {
            let stats = store.stats();
            println!("keys:             {}", stats.keys);
            println!("live keys:        {}", store.len()?);
            println!("records replayed: {}", stats.records_replayed);
            println!("torn tail:        {}", stats.torn_tail_discarded);
        }
    }

    store.close().context("failed to close store")?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    // Set up logging
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = Config::from_args(&args)?;
    run(config)
}
