use clap::{App, Arg};
use pcbdbg::config::BenchConfig;
use pcbdbg::server::{self, SharedProcessor};
use pcbdbg::BatchProcessor;
use tokio::net::TcpListener;
use tracing::{info, Level};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = App::new("pcbdbg-server")
        .version("0.1.0")
        .about("PCB debugger bench server - runs command batches against the bench instruments")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .help("JSON bench configuration file")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("listen")
                .short("l")
                .long("listen")
                .value_name("ADDR")
                .help("Address to listen on (host:port)")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("power-supply")
                .long("power-supply")
                .value_name("ADDR")
                .help("Power supply SCPI socket (host:port)")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("multimeter")
                .long("multimeter")
                .value_name("ADDR")
                .help("Multimeter SCPI socket (host:port)")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("timeout")
                .short("t")
                .long("timeout")
                .value_name("MS")
                .help("Instrument I/O timeout in milliseconds")
                .takes_value(true)
                .validator(|v| match v.parse::<u64>() {
                    Ok(ms) if ms > 0 => Ok(()),
                    _ => Err("Timeout must be a positive number of milliseconds".into()),
                }),
        )
        .arg(
            Arg::with_name("simulate")
                .short("s")
                .long("simulate")
                .help("Serve a simulated bench instead of real instruments"),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .help("Log every instrument command"),
        )
        .get_matches();

    let level = if matches.is_present("verbose") { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).init();

    let mut config = match matches.value_of("config") {
        Some(path) => BenchConfig::load(path)?,
        None => BenchConfig::default(),
    };
    if let Some(listen) = matches.value_of("listen") {
        config.listen = listen.to_string();
    }
    if let Some(address) = matches.value_of("power-supply") {
        config.power_supply = address.to_string();
    }
    if let Some(address) = matches.value_of("multimeter") {
        config.multimeter = address.to_string();
    }
    if let Some(timeout) = matches.value_of("timeout") {
        config.io_timeout_ms = timeout.parse()?;
    }
    if matches.is_present("simulate") {
        config.simulate = true;
    }
    config.validate()?;

    if config.simulate {
        info!("🧪 Using simulated bench");
    } else {
        info!("🔌 Power supply at {}, multimeter at {}", config.power_supply, config.multimeter);
    }

    let processor: SharedProcessor = server::shared(BatchProcessor::new(config.connector()));
    let listener = TcpListener::bind(&config.listen).await?;
    info!("🌐 Batch server listening on {}", config.listen);

    tokio::select! {
        result = server::serve(listener, processor) => result?,
        _ = tokio::signal::ctrl_c() => info!("🛑 Shutting down"),
    }

    Ok(())
}
