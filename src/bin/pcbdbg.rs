use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use colored::*;
use pcbdbg::protocol::{BatchRequest, BatchResponse, ErrorResponse};
use std::process::Command;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: &str = "8080";
const REQUEST_TIMEOUT_SECS: u64 = 30;
const ERROR_PREFIX: &str = "Error processing";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let channel_arg = || {
        Arg::with_name("channel")
            .help("Power supply channel (1-3)")
            .required(true)
            .possible_values(&["1", "2", "3"])
    };
    let number_arg = |name: &'static str, help: &'static str| {
        Arg::with_name(name)
            .help(help)
            .required(true)
            .allow_hyphen_values(true)
            .validator(|v| match v.parse::<f64>() {
                Ok(value) if value.is_finite() => Ok(()),
                _ => Err("Value must be a finite number".into()),
            })
    };

    let matches = App::new("pcbdbg")
        .version("0.1.0")
        .author("PCB Debugger Team")
        .about("🔬 PCB Debugger - drive the bench power supply and multimeter")
        .setting(AppSettings::VersionlessSubcommands)
        .arg(
            Arg::with_name("host")
                .short("h")
                .long("host")
                .value_name("HOST")
                .help("Bench server host address")
                .takes_value(true)
                .default_value(DEFAULT_HOST)
                .global(true),
        )
        .arg(
            Arg::with_name("port")
                .short("p")
                .long("port")
                .value_name("PORT")
                .help("Bench server port")
                .takes_value(true)
                .default_value(DEFAULT_PORT)
                .global(true),
        )
        .arg(
            Arg::with_name("format")
                .short("f")
                .long("format")
                .value_name("FORMAT")
                .help("Output format")
                .takes_value(true)
                .possible_values(&["json", "table", "compact"])
                .default_value("table")
                .global(true),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .help("Enable verbose output")
                .global(true),
        )
        .subcommand(
            SubCommand::with_name("run")
                .about("▶️  Run raw bench commands as one batch")
                .long_about("Sends each argument as one command line, e.g. pcbdbg run \"SETV 1,3.3\" GETV1 TSTR")
                .arg(
                    Arg::with_name("commands")
                        .help("Command lines")
                        .required(true)
                        .multiple(true),
                ),
        )
        .subcommand(
            SubCommand::with_name("script")
                .about("📜 Run a command file as one batch")
                .long_about("Reads one command per line; blank lines and lines starting with '#' are skipped")
                .arg(Arg::with_name("file").help("Command file").required(true)),
        )
        .subcommand(
            SubCommand::with_name("supply")
                .about("🔋 Power supply control")
                .subcommand(
                    SubCommand::with_name("set-voltage")
                        .about("Set channel voltage and enable its output")
                        .arg(channel_arg())
                        .arg(number_arg("volts", "Voltage setpoint in volts")),
                )
                .subcommand(
                    SubCommand::with_name("set-current")
                        .about("Set channel current and enable its output")
                        .arg(channel_arg())
                        .arg(number_arg("amps", "Current setpoint in amps")),
                )
                .subcommand(
                    SubCommand::with_name("voltage")
                        .about("Read channel voltage")
                        .arg(channel_arg()),
                )
                .subcommand(
                    SubCommand::with_name("current")
                        .about("Read channel current")
                        .arg(channel_arg()),
                ),
        )
        .subcommand(
            SubCommand::with_name("measure")
                .about("📏 Multimeter measurement")
                .arg(
                    Arg::with_name("quantity")
                        .help("What to measure")
                        .required(true)
                        .possible_values(&["voltage", "current", "continuity", "resistance"]),
                ),
        )
        .subcommand(
            SubCommand::with_name("probe")
                .about("🪡 Probe request")
                .arg(
                    Arg::with_name("quantity")
                        .help("What to probe")
                        .required(true)
                        .possible_values(&["voltage", "current"]),
                ),
        )
        .subcommand(
            SubCommand::with_name("server")
                .about("🚀 Start the bench server")
                .arg(
                    Arg::with_name("background")
                        .short("b")
                        .long("background")
                        .help("Run server in background"),
                )
                .arg(
                    Arg::with_name("simulate")
                        .short("s")
                        .long("simulate")
                        .help("Serve a simulated bench"),
                ),
        )
        .get_matches();

    let host = matches.value_of("host").unwrap_or(DEFAULT_HOST);
    let port = matches.value_of("port").unwrap_or(DEFAULT_PORT).parse::<u16>()?;
    let format = matches.value_of("format").unwrap_or("table");
    let verbose = matches.is_present("verbose");

    if verbose {
        println!("{}", "🔬 pcbdbg - PCB Debugger".bright_blue().bold());
        println!("{} {}:{}", "Connecting to".dimmed(), host, port);
    }

    let commands: Vec<String> = match matches.subcommand() {
        ("run", Some(sub_matches)) => sub_matches
            .values_of("commands")
            .map(|values| values.map(str::to_string).collect())
            .unwrap_or_default(),
        ("script", Some(sub_matches)) => {
            let path = sub_matches.value_of("file").unwrap_or_default();
            read_script(&std::fs::read_to_string(path)?)
        }
        ("supply", Some(sub_matches)) => match supply_command(sub_matches) {
            Some(command) => vec![command],
            None => {
                println!("{}", "Supply subcommand required. Use 'pcbdbg supply --help' for options.".yellow());
                return Ok(());
            }
        },
        ("measure", Some(sub_matches)) => {
            let keyword = match sub_matches.value_of("quantity") {
                Some("voltage") => "TSTV",
                Some("current") => "TSTC",
                Some("continuity") => "TSCO",
                _ => "TSTR",
            };
            vec![keyword.to_string()]
        }
        ("probe", Some(sub_matches)) => {
            let keyword = if sub_matches.value_of("quantity") == Some("current") { "PRBC" } else { "PRBV" };
            vec![keyword.to_string()]
        }
        ("server", Some(sub_matches)) => {
            return handle_server(sub_matches, port);
        }
        _ => {
            println!("{}", "No command specified. Use --help for usage information.".yellow());
            println!("{}", "Quick start:".bright_green());
            println!("  {} Start a simulated bench server", "pcbdbg server --simulate".bright_cyan());
            println!("  {} Set channel 1 to 3.3 V", "pcbdbg run \"SETV 1,3.3\"".bright_cyan());
            println!("  {} Measure resistance", "pcbdbg measure resistance".bright_cyan());
            return Ok(());
        }
    };

    if commands.is_empty() {
        println!("{}", "Nothing to send.".yellow());
        return Ok(());
    }

    let response = send_batch(host, port, &commands).await?;
    print_batch_result(&commands, &response, format);

    Ok(())
}

fn supply_command(matches: &ArgMatches<'_>) -> Option<String> {
    let (name, sub_matches) = match matches.subcommand() {
        (name, Some(sub_matches)) => (name, sub_matches),
        _ => return None,
    };
    let channel = sub_matches.value_of("channel")?;

    match name {
        "set-voltage" => Some(format!("SETV {},{}", channel, sub_matches.value_of("volts")?)),
        "set-current" => Some(format!("SETC {},{}", channel, sub_matches.value_of("amps")?)),
        "voltage" => Some(format!("GETV{}", channel)),
        "current" => Some(format!("GETC{}", channel)),
        _ => None,
    }
}

fn read_script(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty() && !line.trim_start().starts_with('#'))
        .map(str::to_string)
        .collect()
}

fn handle_server(matches: &ArgMatches<'_>, port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let background = matches.is_present("background");

    println!("{}", "🚀 Starting bench server...".bright_green().bold());

    let mut cmd = Command::new("cargo");
    cmd.args(["run", "--bin", "pcbdbg-server", "--"]);
    cmd.args(["--listen", &format!("127.0.0.1:{}", port)]);
    if matches.is_present("simulate") {
        cmd.arg("--simulate");
    }

    if background {
        cmd.spawn()?;
        println!("{} Server started in background on port {}", "✅".green(), port);
    } else {
        println!("{} Server starting on port {} (Press Ctrl+C to stop)", "🌐".bright_blue(), port);
        cmd.status()?;
    }

    Ok(())
}

fn print_batch_result(commands: &[String], response: &str, format: &str) {
    if format == "json" {
        println!("{}", response);
        return;
    }

    if let Ok(error) = serde_json::from_str::<ErrorResponse>(response) {
        println!("{} {}", "❌ Request rejected:".red(), error.error.bright_red());
        return;
    }

    let responses = match serde_json::from_str::<BatchResponse>(response) {
        Ok(parsed) => parsed.responses,
        Err(_) => {
            println!("{} {}", "❓ Unexpected reply:".blue(), response);
            return;
        }
    };

    for (command, result) in commands.iter().zip(&responses) {
        let failed = result.starts_with(ERROR_PREFIX);
        match format {
            "compact" => println!("{}", result),
            _ => {
                if failed {
                    println!("{} {:<14} {}", "❌".red(), command.bright_white(), result.bright_red());
                } else {
                    println!("{} {:<14} {}", "✅".green(), command.bright_white(), result.bright_cyan());
                }
            }
        }
    }
}

async fn send_batch(host: &str, port: u16, commands: &[String]) -> Result<String, Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", host, port);
    let stream = match TcpStream::connect(&addr).await {
        Ok(stream) => stream,
        Err(e) => {
            eprintln!("{} Failed to connect to bench server at {}", "❌".red(), addr.bright_white());

            if e.kind() == std::io::ErrorKind::ConnectionRefused {
                eprintln!("{} Server is not running. Start it with:", "💡".yellow());
                eprintln!("   {}", "pcbdbg server --simulate".bright_cyan());
                eprintln!("   or");
                eprintln!("   {}", "cargo run --bin pcbdbg-server -- --simulate".bright_cyan());
            } else {
                eprintln!("{} Network error: {}", "🔌".yellow(), e.to_string().bright_red());
            }

            return Err(e.into());
        }
    };

    let request = serde_json::to_string(&BatchRequest {
        commands: commands.to_vec(),
    })?;

    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    // Instrument I/O can be slow; bound the whole exchange
    match tokio::time::timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS), async {
        writer.write_all(request.as_bytes()).await?;
        writer.write_all(b"\n").await?;

        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "Server closed connection",
            ));
        }
        Ok(line.trim_end().to_string())
    })
    .await
    {
        Ok(result) => Ok(result?),
        Err(_) => {
            eprintln!("{} Batch timed out after {} seconds", "⏰".yellow(), REQUEST_TIMEOUT_SECS);
            Err("Batch timeout".into())
        }
    }
}
