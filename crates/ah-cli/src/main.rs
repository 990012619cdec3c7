//! AdHush CLI
//!
//! Offline tools for the detection engine: evaluate page fixtures, replay
//! scripted ad breaks, and print the default configuration.

use std::fs;
use std::path::Path;

use clap::{Parser, Subcommand};
use log::LevelFilter;

use ah_core::fixture::{FakeMedia, FakePlayer, PageFixture, StaticPage};
use ah_core::player::{Acquisition, PlayerHandle};
use ah_core::probe::evaluate;
use ah_core::EngineConfig;

#[cfg(feature = "e2e")]
mod e2e;
mod simulate;

#[derive(Parser)]
#[command(name = "ah-cli")]
#[command(about = "AdHush ad detection and audio suppression tools")]
struct Cli {
    /// Log engine decisions (repeat for more detail)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate the ad indicators of a page fixture
    Probe {
        /// Page fixture (JSON)
        #[arg(short, long)]
        page: String,

        /// Configuration override (JSON)
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Replay a scripted sequence of page states through the engine
    Simulate {
        /// Scenario file (JSON)
        #[arg(short, long)]
        scenario: String,

        /// Configuration override (JSON)
        #[arg(short, long)]
        config: Option<String>,

        /// Print the step reports as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration
    Config {
        /// Configuration override (JSON)
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Run the browser smoke test against the unpacked extension
    #[cfg(feature = "e2e")]
    E2e {
        /// Chromedriver URL
        #[arg(long, default_value = "http://localhost:9515")]
        chromedriver: String,

        /// Unpacked extension directory
        #[arg(short, long, default_value = "extension")]
        extension: String,

        /// Watch page to test against
        #[arg(long, default_value = "https://www.youtube.com/watch?v=jNQXAC9IVRw")]
        url: String,

        /// Run Chrome headless
        #[arg(long)]
        headless: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    let result = match cli.command {
        Commands::Probe { page, config } => cmd_probe(&page, config.as_deref()),
        Commands::Simulate {
            scenario,
            config,
            json,
        } => cmd_simulate(&scenario, config.as_deref(), json),
        Commands::Config { config } => cmd_config(config.as_deref()),
        #[cfg(feature = "e2e")]
        Commands::E2e {
            chromedriver,
            extension,
            url,
            headless,
        } => e2e::run_e2e(e2e::E2eOptions {
            chromedriver_url: chromedriver,
            extension_path: extension,
            watch_url: url,
            headless,
        }),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn load_config(path: Option<&str>) -> Result<EngineConfig, String> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let text = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read '{}': {}", path, e))?;
    EngineConfig::from_json(&text).map_err(|e| format!("Invalid config '{}': {}", path, e))
}

fn cmd_probe(page_path: &str, config_path: Option<&str>) -> Result<(), String> {
    let config = load_config(config_path)?;

    let text = fs::read_to_string(page_path)
        .map_err(|e| format!("Failed to read '{}': {}", page_path, e))?;
    let fixture: PageFixture = serde_json::from_str(&text)
        .map_err(|e| format!("Invalid page fixture '{}': {}", page_path, e))?;
    let page = StaticPage::from_fixture(&fixture);

    let mut handle: PlayerHandle<FakeMedia, FakePlayer> = PlayerHandle::new(config.player.clone());
    let acquired = !matches!(handle.acquire(&page, 0), Acquisition::NotReady);
    let probe = evaluate(&page, handle.target(), &config.probe);

    println!("Page:       {}", fixture.location);
    println!("Media:      {}", if acquired { "acquired" } else { "not found" });
    println!(
        "Player API: {}",
        if handle.target().is_some_and(|t| t.player.is_some()) { "yes" } else { "no" }
    );
    println!("State:      {}", probe.state.as_str());
    println!();
    println!("Indicators:");
    for (name, found) in probe.indicators.results() {
        println!("  {:<16} {}", name, if found { "yes" } else { "-" });
    }

    Ok(())
}

fn cmd_simulate(scenario_path: &str, config_path: Option<&str>, json: bool) -> Result<(), String> {
    let config = load_config(config_path)?;
    let scenario = simulate::load_scenario(Path::new(scenario_path))?;
    let reports = simulate::run_scenario(&scenario, config)?;

    if json {
        let out = serde_json::to_string_pretty(&reports)
            .map_err(|e| format!("Failed to serialize reports: {}", e))?;
        println!("{out}");
    } else {
        simulate::print_reports(&reports);
    }

    Ok(())
}

fn cmd_config(config_path: Option<&str>) -> Result<(), String> {
    let config = load_config(config_path)?;
    println!("{}", config.to_json_pretty());
    Ok(())
}
