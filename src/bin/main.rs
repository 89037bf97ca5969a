//! Atlas CLI - attendance gate
//!
//!   atlas run                                  → start the pipeline on simulated drivers
//!   atlas list                                 → print the registration table
//!   atlas register <card> <label> <name> <beacon>
//!   atlas clear --yes                          → erase every record
//!
//! While `run` is active, console lines drive the simulations:
//!   TAP 04 A1 B2 C3         present a card
//!   BEACON <id> <rssi>      put a beacon in range
//!   BEACON CLEAR            remove every beacon
//!   PUB <topic> <payload>   publish as the remote authority (e.g. PUB mode register)
//!   QUIT                    stop
//! Anything else is an administrative command (REGISTER, LIST, CLEAR, SET_MODE(...)).
//!
//! Configuration comes from `.env`, then `ATLAS_*` variables, then flags.

use anyhow::{bail, Context};
use async_trait::async_trait;
use atlas::coordinator::{open_store, LineSource, StdinLines};
use atlas::core::render_table;
use atlas::logging::init_logging;
use atlas::transport::TransportMessage;
use atlas::{
    install_signal_handlers, Advertisement, Coordinator, Drivers, IdentityRecord, InMemoryBroker, NodeConfig,
    Outcome, PipelineEvent, RawToken, Shutdown, SimulatedRadio, SimulatedReader, SystemClock, TapHandle,
};
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::info;

fn main() {
    init_logging();

    let args: Vec<String> = env::args().collect();
    let opts = ParsedArgs::parse(&args[1..]);

    if opts.help {
        print_usage();
        return;
    }

    if opts.version {
        println!("atlas {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    let result = match opts.command.as_deref() {
        Some("run") => cmd_run(&opts),
        Some("list") | Some("table") => cmd_list(&opts),
        Some("register") => cmd_register(&opts),
        Some("clear") => cmd_clear(&opts),
        Some(cmd) => Err(anyhow::anyhow!("Unknown command: {}", cmd)),
        None => {
            print_usage();
            return;
        }
    };

    if let Err(e) = result {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

#[derive(Default)]
struct ParsedArgs {
    command: Option<String>,
    args: Vec<String>,
    yes: bool,
    help: bool,
    version: bool,
}

impl ParsedArgs {
    fn parse(args: &[String]) -> Self {
        // Load .env file if present
        if let Ok(contents) = std::fs::read_to_string(".env") {
            for line in contents.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                if let Some((key, value)) = line.split_once('=') {
                    let value = value.trim().trim_matches('"');
                    if !value.is_empty() && env::var(key.trim()).is_err() {
                        env::set_var(key.trim(), value);
                    }
                }
            }
        }

        let mut opts = ParsedArgs::default();
        let mut positional = Vec::new();
        let mut i = 0;

        while i < args.len() {
            let arg = &args[i];
            // flags with a value become ATLAS_* overrides, highest priority
            let override_var = match arg.as_str() {
                "--app" | "-a" => Some("ATLAS_APP"),
                "--variant" => Some("ATLAS_VARIANT"),
                "--root" | "-d" => Some("ATLAS_ROOT"),
                "--threshold" => Some("ATLAS_RSSI_THRESHOLD"),
                "--window-ms" => Some("ATLAS_SCAN_WINDOW_MS"),
                "--match" => Some("ATLAS_MATCH"),
                "--prefix" => Some("ATLAS_TOPIC_PREFIX"),
                _ => None,
            };
            match arg.as_str() {
                "--help" | "-h" => opts.help = true,
                "--version" | "-V" => opts.version = true,
                "--yes" | "-y" => opts.yes = true,
                _ if override_var.is_some() => {
                    if let (Some(var), Some(value)) = (override_var, args.get(i + 1)) {
                        env::set_var(var, value);
                        i += 1;
                    }
                }
                _ if !arg.starts_with('-') => positional.push(arg.clone()),
                _ => {} // Ignore unknown flags
            }
            i += 1;
        }

        // First positional is command, the rest are its arguments
        if !positional.is_empty() {
            opts.command = Some(positional.remove(0));
        }
        opts.args = positional;
        opts
    }
}

fn load_config() -> anyhow::Result<NodeConfig> {
    NodeConfig::from_env().context("invalid configuration")
}

fn cmd_list(_opts: &ParsedArgs) -> anyhow::Result<()> {
    let config = load_config()?;
    let store = open_store(&config)?;
    print!("{}", render_table(&store.records()?));
    Ok(())
}

fn cmd_register(opts: &ParsedArgs) -> anyhow::Result<()> {
    let [card, label, name, beacon] = opts.args.as_slice() else {
        bail!("usage: atlas register <card> <label> <name> <beacon>");
    };
    let Some(token) = RawToken::from_hex(card) else {
        bail!("card must be hex, e.g. \"04 A1 B2 C3\"");
    };
    let config = load_config()?;
    let mut store = open_store(&config)?;
    let record = IdentityRecord::new(&token.key(), label.as_str(), name.as_str(), beacon.as_str());
    let starting_count = store.starting_count(&record.owner_label)?;
    let record = record.with_scan_count(starting_count);
    store.put(&record)?;
    println!("Registered {} as {} ({}), beacon {}", record.display_id, record.owner_label, record.owner_name, record.expected_beacon_id);
    Ok(())
}

fn cmd_clear(opts: &ParsedArgs) -> anyhow::Result<()> {
    if !opts.yes {
        bail!("refusing to erase every record without --yes");
    }
    let config = load_config()?;
    let mut store = open_store(&config)?;
    let before = store.len()?;
    store.clear()?;
    println!("Cleared {} record(s)", before);
    Ok(())
}

fn cmd_run(_opts: &ParsedArgs) -> anyhow::Result<()> {
    let config = load_config()?;
    let rt = tokio::runtime::Runtime::new().context("failed to create runtime")?;

    let result = rt.block_on(async move {
        let shutdown = install_signal_handlers();
        let store = open_store(&config)?;

        let (reader, taps) = SimulatedReader::new();
        let radio = SimulatedRadio::new();
        let broker = Arc::new(InMemoryBroker::new());
        let console = SimulatorConsole {
            inner: StdinLines::new(),
            taps,
            radio: radio.clone(),
            broker: broker.clone(),
            prefix: config.topic_prefix.clone(),
            shutdown: shutdown.clone(),
        };

        let mut drivers = Drivers::new(Box::new(reader), Arc::new(radio))
            .with_console(Box::new(console))
            .with_clock(Arc::new(SystemClock::new(config.utc_offset_secs)));
        if config.remote_sync {
            drivers = drivers.with_transport(Box::new(broker.client()));
            tokio::spawn(print_upstream(broker.monitor(), config.topic_prefix.clone()));
        }

        let pipeline = Coordinator::start(config, store, drivers, &shutdown)?;
        let printer = tokio::spawn(print_events(pipeline.subscribe()));
        println!("Ready. Type HELP for console commands.");

        let mut shutdown_rx = shutdown.subscribe();
        if !shutdown.is_triggered().await {
            let _ = shutdown_rx.recv().await;
        }
        info!("Shutdown signal received, stopping pipeline...");

        let stats = pipeline.stats();
        pipeline.shutdown().await;
        printer.abort();
        println!(
            "Dropped: {} token(s), {} command(s), {} observation(s); {} publish(es) skipped",
            stats.tokens_dropped, stats.commands_dropped, stats.observations_dropped, stats.publishes_skipped
        );
        Ok::<(), anyhow::Error>(())
    });
    // stdin reads cannot be cancelled; don't wait on them
    rt.shutdown_timeout(Duration::from_millis(200));
    result
}

/// Stdin wrapper that drives the simulated reader, radio and authority
struct SimulatorConsole {
    inner: StdinLines,
    taps: TapHandle,
    radio: SimulatedRadio,
    broker: Arc<InMemoryBroker>,
    prefix: String,
    shutdown: Shutdown,
}

#[async_trait]
impl LineSource for SimulatorConsole {
    async fn next_line(&mut self) -> Option<String> {
        loop {
            let line = self.inner.next_line().await?;
            let mut words = line.split_whitespace();
            let head = words.next().unwrap_or("").to_ascii_uppercase();
            let rest: Vec<&str> = words.collect();

            match (head.as_str(), rest.as_slice()) {
                ("TAP", hex) if !hex.is_empty() => match RawToken::from_hex(&hex.join("")) {
                    Some(token) => {
                        self.taps.tap(token);
                    }
                    None => println!("TAP needs a hex card id"),
                },
                ("BEACON", [clear]) if clear.eq_ignore_ascii_case("clear") => {
                    self.radio.clear().await;
                    println!("No beacons in range");
                }
                ("BEACON", [id, rssi]) => match rssi.parse::<i32>() {
                    Ok(rssi) => {
                        self.radio.add(Advertisement::service(*id, rssi)).await;
                        println!("Beacon {} in range at {} dBm", id, rssi);
                    }
                    Err(_) => println!("BEACON <id> <rssi>"),
                },
                ("PUB", [suffix, payload @ ..]) => {
                    let topic = format!("{}/{}", self.prefix.trim_end_matches('/'), suffix);
                    self.broker.publish(&topic, &payload.join(" "));
                }
                ("QUIT" | "EXIT", []) => {
                    self.shutdown.trigger().await;
                    return None;
                }
                ("HELP", []) => print_console_help(),
                _ => return Some(line),
            }
        }
    }
}

async fn print_events(mut events: broadcast::Receiver<PipelineEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => print_event(&event),
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => break,
        }
    }
}

fn print_event(event: &PipelineEvent) {
    match event {
        PipelineEvent::Validated { display_id, outcome, record, .. } => match outcome {
            Outcome::Accepted { scan_count, status, signal_strength } => {
                let label = record.as_ref().map_or("", |r| r.owner_label.as_str());
                println!("ACCEPTED     {}  {}  {}  scan #{}  {} dBm", display_id, label, status.as_str(), scan_count, signal_strength);
            }
            rejected => {
                if let Some(reason) = rejected.rejection(display_id) {
                    println!("REJECTED     {}", reason);
                }
            }
        },
        PipelineEvent::Forwarded { key, delivered } => {
            println!("FORWARDED    {}{}", key, if *delivered { "" } else { "  (authority offline)" })
        }
        PipelineEvent::Registered { record, origin } => {
            println!("REGISTERED   {}  {}  beacon {}  ({:?})", record.display_id, record.owner_label, record.expected_beacon_id, origin)
        }
        PipelineEvent::Listing { table, .. } => print!("{}", table),
        PipelineEvent::Cleared { .. } => println!("Store cleared"),
        PipelineEvent::ClearCancelled => println!("Clear cancelled"),
        PipelineEvent::ModeChanged(mode) => println!("Mode: {}", mode.as_str()),
        PipelineEvent::Prompt(prompt) => println!("> {}", prompt),
        PipelineEvent::RegistrationAbandoned { reason } => println!("Registration abandoned: {}", reason),
        PipelineEvent::Skipped { reason } => println!("Skipped: {}", reason),
    }
}

/// Authority's view of what the node publishes
async fn print_upstream(mut monitor: broadcast::Receiver<TransportMessage>, prefix: String) {
    let prefix = format!("{}/", prefix.trim_end_matches('/'));
    loop {
        match monitor.recv().await {
            Ok(msg) => {
                if let Some(suffix) = msg.topic.strip_prefix(&prefix) {
                    if suffix == "card" || suffix == "attendance" {
                        println!("  [{}] {}", msg.topic, msg.payload);
                    }
                }
            }
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => break,
        }
    }
}

fn print_console_help() {
    println!(
        r#"Simulation:
    TAP <hex>               Present a card
    BEACON <id> <rssi>      Put a beacon in range
    BEACON CLEAR            Remove every beacon
    PUB <topic> <payload>   Publish as the authority (mode | register | command)
    QUIT                    Stop

Administration:
    REGISTER                Register the next card interactively
    LIST | TABLE            Show registered cards
    CLEAR                   Erase every record (asks for Y/YES)
    SET_MODE(REGISTER)      Forward cards upstream instead of validating
    SET_MODE(NORMAL)        Validate cards locally"#
    );
}

fn print_usage() {
    println!(
        r#"atlas - dual-factor attendance gate

USAGE:
    atlas <command> [args] [options]

COMMANDS:
    run                                      Start the pipeline on simulated drivers
    list                                     Print registered cards
    register <card> <label> <name> <beacon>  Register or overwrite a card
    clear --yes                              Erase every record

OPTIONS:
    --app, -a <name>        Application name (env: ATLAS_APP)
    --variant <v>           standalone|distributed (env: ATLAS_VARIANT)
    --root, -d <path>       Store root directory (env: ATLAS_ROOT)
    --threshold <dbm>       Minimum beacon signal (env: ATLAS_RSSI_THRESHOLD)
    --window-ms <ms>        Scan window (env: ATLAS_SCAN_WINDOW_MS)
    --match <policy>        strict|label (env: ATLAS_MATCH)
    --prefix <topic>        Topic prefix (env: ATLAS_TOPIC_PREFIX)
    --yes, -y               Confirm destructive commands
    --version, -V           Print version
    --help, -h              Print this help

ENVIRONMENT:
    ATLAS_UTC_OFFSET        Seconds east of UTC for attendance stamps
    ATLAS_LOG_JSON=1        JSON logs on stderr
    RUST_LOG                Log filter (default: info)"#
    );
}
