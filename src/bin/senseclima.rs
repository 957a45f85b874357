use clap::{App, Arg, ArgMatches};
use colored::*;
use senseclima::config::SimulationConfig;
use senseclima::curve::DiurnalCurve;
use senseclima::device::roster;
use senseclima::protocol::Topics;
use senseclima::scheduler::TelemetryScheduler;
use senseclima::transport::{BrokerSettings, ControlHandler, MqttTransport, Publisher};
use senseclima::VirtualClock;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{error, info, warn};

fn cli() -> App<'static, 'static> {
    App::new("senseclima")
        .version("0.1.0")
        .author("HANA Systems Engineering Team")
        .about("🌡️  SenseClima simulator - diurnal temperature/humidity telemetry over MQTT")
        .arg(
            Arg::with_name("environment")
                .short("e")
                .long("environment")
                .alias("ambiente")
                .value_name("NAME")
                .help("Monitored environment name (e.g. lab1, classroom)")
                .takes_value(true)
                .required(true),
        )
        .arg(
            Arg::with_name("devices")
                .short("d")
                .long("devices")
                .alias("boards")
                .value_name("ID")
                .help("One or more device ids to simulate (e.g. sensor01 sensor02)")
                .takes_value(true)
                .multiple(true)
                .min_values(1)
                .required(true),
        )
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .help("JSON configuration file")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("host")
                .long("host")
                .value_name("HOST")
                .help("MQTT broker host")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("port")
                .long("port")
                .value_name("PORT")
                .help("MQTT broker port")
                .takes_value(true)
                .validator(|v| match v.parse::<u16>() {
                    Ok(_) => Ok(()),
                    Err(_) => Err("Port must be a number between 0 and 65535".into()),
                }),
        )
        .arg(
            Arg::with_name("interval")
                .short("i")
                .long("interval")
                .value_name("SECONDS")
                .help("Default publish interval in real seconds")
                .takes_value(true)
                .validator(|v| match v.parse::<u64>() {
                    Ok(n) if n > 0 => Ok(()),
                    _ => Err("Interval must be a positive number of seconds".into()),
                }),
        )
        .arg(
            Arg::with_name("speed")
                .short("s")
                .long("speed")
                .value_name("FACTOR")
                .help("Simulation speed factor (3600 = one simulated hour per second)")
                .takes_value(true)
                .validator(|v| match v.parse::<f64>() {
                    Ok(f) if f.is_finite() && f > 0.0 => Ok(()),
                    _ => Err("Speed factor must be a positive number".into()),
                }),
        )
}

fn load_config(matches: &ArgMatches) -> Result<SimulationConfig, Box<dyn std::error::Error>> {
    let mut config = match matches.value_of("config") {
        Some(path) => SimulationConfig::from_json_file(path)?,
        None => SimulationConfig::default(),
    };

    if let Some(host) = matches.value_of("host") {
        config.broker_host = host.to_string();
    }
    if let Some(port) = matches.value_of("port") {
        config.broker_port = port.parse()?;
    }
    if let Some(interval) = matches.value_of("interval") {
        config.default_interval_secs = interval.parse()?;
    }
    if let Some(speed) = matches.value_of("speed") {
        config.speed_factor = speed.parse()?;
    }

    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let matches = cli().get_matches();
    let config = load_config(&matches)?;

    let environment = matches.value_of("environment").unwrap_or_default().trim().to_lowercase();
    let devices = roster(matches.values_of("devices").into_iter().flatten())?;
    let topics = Topics::new(&environment)?;

    let settings = BrokerSettings {
        host: config.broker_host.clone(),
        port: config.broker_port,
        client_id: config.client_id(&environment),
        keep_alive: config.keep_alive(),
    };

    let (transport, events) = match MqttTransport::connect(&settings, topics.clone(), &devices).await {
        Ok(connected) => connected,
        Err(e) => {
            error!("Could not connect to broker {}: {}", settings.address(), e);
            eprintln!("{} {}", "❌".red(), format!("Broker unreachable: {}", e).bright_red());
            return Err(e.into());
        }
    };

    let clock = VirtualClock::starting_today(config.speed_factor, config.start_hour, config.start_minute)?;
    let publisher: Arc<dyn Publisher> = Arc::new(transport.clone());
    let scheduler = Arc::new(TelemetryScheduler::new(
        clock,
        DiurnalCurve::default(),
        topics,
        publisher,
        &devices,
        config.default_interval()?,
        config.poll_interval(),
        Instant::now(),
    ));

    let handler: Arc<dyn ControlHandler> = scheduler.clone();
    let events = events.spawn(handler);

    println!("{}", "🌡️  SenseClima - Dynamic Simulation".bright_blue().bold());
    println!("{} {}", "Environment:".bright_white(), environment.bright_cyan());
    let names: Vec<&str> = devices.iter().map(|d| d.as_str()).collect();
    println!("{} {}", "Devices:".bright_white(), names.join(", ").bright_cyan());
    println!("{} {}x", "Speed:".bright_white(), config.speed_factor);
    println!("{}", "Press Ctrl+C to stop.".dimmed());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let tasks = scheduler.spawn(shutdown_rx);

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    println!("\n{}", "🛑 Stopping simulation...".yellow());

    let _ = shutdown_tx.send(true);
    for task in tasks {
        if let Err(e) = task.await {
            warn!("Device task ended abnormally: {}", e);
        }
    }

    if let Err(e) = transport.disconnect(events).await {
        warn!("{}", e);
    }
    info!("Client disconnected");

    for status in scheduler.snapshot() {
        println!(
            "  {} interval={}s published={} failed={} interval_changes={} rejected={}",
            status.device.as_str().bright_cyan(),
            status.interval_seconds,
            status.stats.published,
            status.stats.publish_failures,
            status.stats.interval_changes,
            status.stats.rejected_commands,
        );
    }

    Ok(())
}
