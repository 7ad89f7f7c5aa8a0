extern crate trafficlight_lib;

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};
use trafficlight_lib::{ControllerConfig, Phase, PhaseController, RandomCycle};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of vehicles approaching the light
    #[arg(short, long, default_value_t = 4)]
    vehicles: usize,
    /// Shortest phase, e.g. "4s"
    #[arg(long, value_parser = humantime::parse_duration)]
    min_cycle: Option<Duration>,
    /// Longest phase, e.g. "6s"
    #[arg(long, value_parser = humantime::parse_duration)]
    max_cycle: Option<Duration>,
    /// Toggler polling interval, e.g. "1ms"
    #[arg(long, value_parser = humantime::parse_duration)]
    poll: Option<Duration>,
    /// Seed for reproducible cycle lengths
    #[arg(long)]
    seed: Option<u64>,
    /// JSON config file; command-line durations override it
    #[arg(long)]
    config: Option<PathBuf>,
    /// Let vehicles compete for transitions on the shared queue instead of subscribing
    #[arg(long)]
    shared: bool,
}

fn report(vehicle: usize, phase: Phase, what: &str) {
    let mut stdout = StandardStream::stdout(ColorChoice::Auto);
    let color = match phase {
        Phase::Red => Color::Red,
        Phase::Green => Color::Green,
    };
    stdout
        .set_color(ColorSpec::new().set_fg(Some(color)).set_bold(true))
        .unwrap();
    write!(&mut stdout, "[{:>5}]", phase).unwrap();
    stdout.reset().unwrap();
    writeln!(&mut stdout, " vehicle #{} {}", vehicle, what).unwrap();
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => {
            let json = std::fs::read_to_string(path).expect("Failed to read config");
            ControllerConfig::from_json_str(&json).expect("Invalid config")
        }
        None => ControllerConfig::default(),
    };
    config.min_cycle = args.min_cycle.unwrap_or(config.min_cycle);
    config.max_cycle = args.max_cycle.unwrap_or(config.max_cycle);
    config.poll_interval = args.poll.unwrap_or(config.poll_interval);

    let policy = match args.seed {
        Some(seed) => RandomCycle::seeded(config.min_cycle, config.max_cycle, seed),
        None => config.random_policy(),
    };
    let controller = Arc::new(PhaseController::with_policy(config, policy).expect("Invalid config"));
    controller.start().unwrap();

    let mut handles = Vec::new();
    for vehicle in 0..args.vehicles {
        let controller = Arc::clone(&controller);
        let subscription = (!args.shared).then(|| controller.subscribe());
        handles.push(thread::spawn(move || {
            thread::sleep(Duration::from_millis(500 * vehicle as u64));
            report(vehicle, controller.current_phase(), "arrives at the light");
            let result = match &subscription {
                Some(subscription) => subscription.wait_for_green(),
                None => controller.wait_for_green(),
            };
            match result {
                Ok(()) => report(vehicle, controller.current_phase(), "crosses"),
                Err(err) => report(vehicle, controller.current_phase(), &err.to_string()),
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
    controller.shutdown();
}
