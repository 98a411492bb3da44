use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use midi_replay::{
    DEFAULT_TICK_INTERVAL_SECS, DispatchError, Dispatcher, MidiOutSink, MonotonicClock,
    ReplayConfig, source,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

struct Args {
    file: PathBuf,
    interval: Option<f64>,
    port: Option<String>,
    config: Option<PathBuf>,
    no_report: bool,
}

fn print_usage(program: &str) {
    println!("Usage: {program} -f <file.mid> [options]");
    println!();
    println!("Options:");
    println!("  -f, --file <PATH>        MIDI file to play (required)");
    println!(
        "  -i, --interval <SECS>    Polling interval in seconds (default {DEFAULT_TICK_INTERVAL_SECS})"
    );
    println!("  -p, --port <NAME>        Use the first output port whose name contains NAME");
    println!("  -c, --config <PATH>      Read settings from a RON file");
    println!("      --no-report          Do not print the send log after playback");
    println!("  -h, --help               Show this message");
}

/// `Ok(None)` means help was requested.
fn parse_args(args: &[String]) -> Result<Option<Args>, String> {
    let mut file = None;
    let mut interval = None;
    let mut port = None;
    let mut config = None;
    let mut no_report = false;

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        let mut value = |name: &str| {
            iter.next()
                .cloned()
                .ok_or_else(|| format!("Missing value for {name}"))
        };
        match arg.as_str() {
            "--file" | "-f" => file = Some(PathBuf::from(value(arg.as_str())?)),
            "--interval" | "-i" => {
                let raw = value(arg.as_str())?;
                let secs: f64 = raw
                    .parse()
                    .map_err(|_| format!("Invalid interval '{raw}'"))?;
                interval = Some(secs);
            }
            "--port" | "-p" => port = Some(value(arg.as_str())?),
            "--config" | "-c" => config = Some(PathBuf::from(value(arg.as_str())?)),
            "--no-report" => no_report = true,
            "--help" | "-h" => return Ok(None),
            other => return Err(format!("Unknown argument '{other}'")),
        }
    }

    let file = file.ok_or("Missing --file argument")?;
    Ok(Some(Args {
        file,
        interval,
        port,
        config,
        no_report,
    }))
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    if !args.file.exists() {
        return Err(format!("{} does not exist.", args.file.display()).into());
    }

    let mut config = match &args.config {
        Some(path) => ReplayConfig::load(path)?,
        None => ReplayConfig::default(),
    };
    if let Some(secs) = args.interval {
        config.tick_interval_secs = secs;
    }
    if args.port.is_some() {
        config.port_name = args.port;
    }
    if args.no_report {
        config.report = false;
    }
    let tick_interval = config.tick_interval()?;

    let timeline = source::load(&args.file)?;
    let sink = MidiOutSink::open(&config.client_name, config.port_name.as_deref())?;
    info!(
        file = %args.file.display(),
        port = %sink.port_name(),
        "replaying"
    );

    let mut dispatcher = Dispatcher::new(timeline, tick_interval)?;
    match dispatcher.run(sink, &mut MonotonicClock::new()) {
        Ok(log) => {
            if config.report {
                print!("{}", log.render());
            }
            info!(sent = log.len(), "done");
            Ok(())
        }
        Err(DispatchError::Send {
            index,
            source,
            partial,
        }) => {
            if config.report {
                print!("{}", partial.render());
            }
            Err(DispatchError::Send {
                index,
                source,
                partial,
            }
            .into())
        }
        Err(e) => Err(e.into()),
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    let program = args.first().map_or("midi_replay", String::as_str);

    let args = match parse_args(&args) {
        Ok(Some(args)) => args,
        Ok(None) => {
            print_usage(program);
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            eprintln!("{e}");
            print_usage(program);
            return ExitCode::from(2);
        }
    };

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
