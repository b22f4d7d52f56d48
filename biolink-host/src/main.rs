//! Operator console for the biolink host node.

use std::io::Write as _;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use biolink_host::{
    router, serial, timesync, AlertEngine, CommandLog, Credentials, Dispatcher, LogNotifier,
    MarkerFilePin, Notifier, Router, SysfsGpioPin, TelegramNotifier, WakeController, WakePin,
    DEFAULT_ACK_TIMEOUT,
};
use biolink_protocol::{AckOutcome, Command, FramedLink};

#[derive(Parser, Debug)]
#[command(name = "biolink-host", about = "Supervisor console for a biolink field node")]
struct Args {
    /// Serial device connected to the field node.
    #[arg(long, default_value = "/dev/ttyACM0")]
    port: String,

    /// Serial baud rate.
    #[arg(long, default_value_t = 9600)]
    baud: u32,

    /// Initial CO2 alert threshold in ppm.
    #[arg(long, default_value_t = 480.0)]
    threshold: f32,

    /// Path of the command history CSV.
    #[arg(long, default_value = "commands_log.csv")]
    command_log: PathBuf,

    /// GPIO number driving the wake line.
    #[arg(long, default_value_t = 17)]
    wake_gpio: u32,

    /// Marker file standing in for the wake line (simulator runs).
    #[arg(long)]
    wake_file: Option<PathBuf>,

    /// Seconds to wait for a command acknowledgement.
    #[arg(long, default_value_t = DEFAULT_ACK_TIMEOUT.as_secs())]
    ack_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let (link_tx, link_rx) = serial::open(&args.port, args.baud)
        .with_context(|| format!("opening serial port {}", args.port))?;
    let command_log = CommandLog::open(&args.command_log)
        .with_context(|| format!("opening command log {}", args.command_log.display()))?;
    log::info!("command history at {}", command_log.path().display());
    let dispatcher = Dispatcher::new(
        Box::new(link_tx),
        command_log,
        Duration::from_secs(args.ack_timeout_secs),
    );

    let alerts = Arc::new(Mutex::new(AlertEngine::new(args.threshold)));
    let notifier: Arc<dyn Notifier> = match Credentials::from_env() {
        Ok(credentials) => Arc::new(TelegramNotifier::new(credentials)),
        Err(e) => {
            log::warn!("{e}; alerts will be logged locally only");
            Arc::new(LogNotifier)
        }
    };

    let frames = router::spawn_reader(FramedLink::new(link_rx));
    tokio::spawn(Router::new(dispatcher.clone(), alerts.clone(), notifier).run(frames));
    tokio::spawn(timesync::run(dispatcher.clone()));

    let wake_pin: Box<dyn WakePin> = match args.wake_file {
        Some(path) => Box::new(MarkerFilePin::new(path)),
        None => Box::new(
            SysfsGpioPin::open(args.wake_gpio)
                .with_context(|| format!("opening wake GPIO {}", args.wake_gpio))?,
        ),
    };

    prompt_loop(dispatcher, alerts, WakeController::new(wake_pin)).await
}

type InputLines = Lines<BufReader<Stdin>>;

async fn prompt_loop(
    dispatcher: Dispatcher,
    alerts: Arc<Mutex<AlertEngine>>,
    mut wake: WakeController,
) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    print_menu();

    loop {
        prompt("> ")?;
        let Some(line) = lines.next_line().await? else {
            return Ok(());
        };
        match line.trim() {
            "" => {}
            "h" | "?" => print_menu(),
            "e" => return Ok(()),
            "w" => {
                println!("pulsing wake line");
                match wake.wake().await {
                    // The node's boot frame confirms it, but unblock
                    // the prompt optimistically.
                    Ok(()) => dispatcher.mark_awake(),
                    Err(e) => println!("wake failed: {e}"),
                }
            }
            "f" => {
                if let Some(grams) = read_value(&mut lines, "feed amount (g)").await? {
                    issue(&dispatcher, Command::Feed { grams }).await;
                }
            }
            "c" => {
                if let Some(ppm) = read_value(&mut lines, "reference CO2 (ppm)").await? {
                    issue(&dispatcher, Command::Calibrate { ppm }).await;
                }
            }
            "t" => {
                if let Some(ppm) = read_value(&mut lines, "alert threshold (ppm)").await? {
                    if issue(&dispatcher, Command::SetThreshold { ppm }).await {
                        alerts
                            .lock()
                            .unwrap_or_else(|poisoned| poisoned.into_inner())
                            .set_threshold(ppm);
                    }
                }
            }
            "a" => {
                if let Some(meters) = read_value(&mut lines, "site altitude (m)").await? {
                    issue(&dispatcher, Command::SetAltitude { meters }).await;
                }
            }
            "p" => {
                if let Some(hpa) = read_value(&mut lines, "sea-level pressure (hPa)").await? {
                    issue(&dispatcher, Command::SetPressureRef { hpa }).await;
                }
            }
            "i" => {
                if let Some(seconds) = read_value(&mut lines, "measurement interval (s)").await? {
                    issue(&dispatcher, Command::SetInterval { seconds }).await;
                }
            }
            "y" => {
                if let Some(seconds) = read_value(&mut lines, "sampling cycle (s)").await? {
                    issue(&dispatcher, Command::SetCycle { seconds }).await;
                }
            }
            "s" => timesync::sync_once(&dispatcher).await,
            "d" => {
                issue(&dispatcher, Command::QueryData).await;
            }
            "q" => {
                issue(&dispatcher, Command::QueryTime).await;
            }
            "r" => {
                issue(&dispatcher, Command::Reset).await;
            }
            "x" => {
                issue(&dispatcher, Command::Shutdown).await;
            }
            other => println!("unknown command {other:?}, h for help"),
        }
    }
}

/// Issue a command and print its outcome; true when it executed.
async fn issue(dispatcher: &Dispatcher, command: Command) -> bool {
    match dispatcher.issue(command).await {
        Ok(Some(ack)) => match ack.outcome {
            AckOutcome::Ok => {
                println!("ok");
                true
            }
            AckOutcome::OkValue(value) => {
                println!("ok: {value}");
                true
            }
            AckOutcome::Error(reason) => {
                println!("field node reported: {}", reason.token());
                false
            }
        },
        Ok(None) => {
            println!("sent; field node is going to sleep, use w to wake it");
            true
        }
        Err(e) => {
            println!("{e}");
            false
        }
    }
}

async fn read_value<T: std::str::FromStr>(
    lines: &mut InputLines,
    label: &str,
) -> anyhow::Result<Option<T>> {
    prompt(&format!("{label}> "))?;
    let Some(line) = lines.next_line().await? else {
        return Ok(None);
    };
    match line.trim().parse() {
        Ok(value) => Ok(Some(value)),
        Err(_) => {
            println!("not a number: {:?}", line.trim());
            Ok(None)
        }
    }
}

fn prompt(text: &str) -> std::io::Result<()> {
    print!("{text}");
    std::io::stdout().flush()
}

fn print_menu() {
    println!("commands:");
    println!("  f  feed            c  calibrate       t  set threshold");
    println!("  a  set altitude    p  set pressure    i  set interval");
    println!("  y  set cycle       s  sync time       d  query data");
    println!("  q  query time      r  reset node      x  shutdown node");
    println!("  w  wake node       h  help            e  exit");
}
