use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use reloadr::{DataLoader, LoadSession, LoadUnit, Loaded, LoaderConfig, MountProps, ResourceState};
use serde_json::{Value, json};
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

mod cli;
mod config;

use cli::Cli;
use cli::commands::Commands;
use config::{Config, DemoConfig};

type PageState = ResourceState<String, Value>;

fn setup_logging(level: Option<&str>) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("reloadr")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("reloadr.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    let mut builder = env_logger::Builder::from_default_env();
    if let Some(level) = level.filter(|_| std::env::var_os("RUST_LOG").is_none()) {
        builder.parse_filters(level);
    }
    builder.target(env_logger::Target::Pipe(target)).init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        None => run_demo(&config.demo, config, false),
        Some(Commands::Demo {
            pages,
            fail,
            controlled,
        }) => {
            let mut demo = config.demo.clone();
            if let Some(pages) = pages {
                demo.pages = *pages;
            }
            if fail.is_some() {
                demo.fail_page = *fail;
            }
            run_demo(&demo, config, *controlled)
        }
        Some(Commands::Config) => handle_config_command(config),
    }
}

fn handle_config_command(config: &Config) -> Result<()> {
    info!("Printing resolved config");
    print!("{}", config.to_yaml()?);
    Ok(())
}

fn run_demo(demo: &DemoConfig, config: &Config, controlled: bool) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build runtime")?;
    runtime.block_on(drive_pages(demo, config, controlled))
}

fn page_of(options: &Value) -> u32 {
    options["page"].as_u64().and_then(|p| u32::try_from(p).ok()).unwrap_or(0)
}

fn page_loader(demo: &DemoConfig, config: &Config) -> DataLoader<String, Value> {
    let demo = demo.clone();
    DataLoader::new(
        move |session: LoadSession<String, Value>| {
            let page = page_of(session.options());
            let latency = demo.latency_for(page);
            let failing = demo.fail_page == Some(page);
            let iteration = session.iteration();
            LoadUnit::new(move || {
                Loaded::future(async move {
                    tokio::time::sleep(latency).await;
                    if failing {
                        return Err(eyre::eyre!("page {} is unavailable", page));
                    }
                    Ok(format!("page {} contents", page))
                })
            })
            .with_cleanup(move || {
                log::debug!("Retired unit for page {} (iteration {})", page, iteration);
            })
        },
        LoaderConfig::default().display_name(config.display_name.clone()),
    )
}

fn print_transition(state: &PageState) {
    let page = page_of(&state.options);
    if state.loading {
        println!("  {} page {}", "loading".yellow(), page);
    } else if let Some(error) = &state.error {
        println!("  {} page {}: {}", "failed ".red(), page, error);
    } else {
        let data = state.data.as_deref().unwrap_or("-");
        println!("  {} page {}: {}", "loaded ".green(), page, data);
    }
}

async fn drive_pages(demo: &DemoConfig, config: &Config, controlled: bool) -> Result<()> {
    let loader = page_loader(demo, config);
    info!("Running demo with {} pages (controlled: {})", demo.pages, controlled);
    println!(
        "{} {} pages, changing every {}ms",
        format!("{}:", loader.display_name()).cyan(),
        demo.pages,
        demo.change_interval_ms
    );

    let transitions = Arc::new(Mutex::new(0usize));
    let mut props = MountProps::new(json!({"page": 0}))
        .with_config(config.mount.clone())
        .empty_options(json!({}));
    let counter = transitions.clone();
    if controlled {
        let store: Arc<Mutex<Option<PageState>>> = Arc::new(Mutex::new(None));
        let reader = store.clone();
        props = props
            .state_reader(move || reader.lock().ok().and_then(|s| s.clone()))
            .on_state_update(move |state: PageState| {
                print_transition(&state);
                if let Ok(mut count) = counter.lock() {
                    *count += 1;
                }
                if let Ok(mut slot) = store.lock() {
                    *slot = Some(state);
                }
            });
    } else {
        props = props.on_state_update(move |state: PageState| {
            print_transition(&state);
            if let Ok(mut count) = counter.lock() {
                *count += 1;
            }
        });
    }

    let coordinator = loader.mount(props);
    for page in 1..demo.pages {
        tokio::time::sleep(demo.change_interval()).await;
        coordinator.on_options_changed(json!({"page": page}));
    }
    coordinator.settled().await;

    let state = coordinator.state();
    let published = transitions.lock().map(|count| *count).unwrap_or(0);
    println!(
        "{} {} iterations, {} transitions published, {} in flight",
        "Settled:".cyan(),
        coordinator.iteration(),
        published,
        coordinator.in_flight()
    );
    match (&state.data, &state.error) {
        (_, Some(error)) => println!("{} {}", "Final error:".red(), error),
        (Some(data), None) => println!("{} {}", "Final data:".green(), data),
        (None, None) => println!("{}", "No data loaded".yellow()),
    }

    coordinator.teardown();
    coordinator.settled().await;
    Ok(())
}

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    // Setup logging once the configured level is known
    setup_logging(config.log_level.as_deref()).context("Failed to setup logging")?;

    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    run_application(&cli, &config).context("Application failed")?;

    Ok(())
}
