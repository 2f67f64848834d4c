use clap::{Args, Parser, Subcommand};
use rotation_controller::config::{Config, ConfigFile, ServoSettings};
use rotation_controller::driver::{PigpioDriver, PulseDriver, SimulatedDriver};
use rotation_controller::error::{ConfigError, ServoError, SourceError};
use rotation_controller::source::LineSource;
use rotation_controller::{Angle, Direction, Dispatcher, ServoCalibration, ServoController};
use std::path::PathBuf;
use strum::IntoEnumIterator;
use tokio::io::BufReader;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "rotation_controller")]
#[command(version)]
#[command(
    about = "Open-loop angle control for a continuous-rotation servo",
    long_about = None
)]
struct Cli {
    /// TOML file with [servo], [pigpio] and [ble] tables
    #[arg(short, long, env = "ROTATION_CONFIG")]
    config: Option<PathBuf>,

    /// Record pulses in memory instead of talking to pigpiod
    #[arg(long, default_value_t = false)]
    simulate: bool,

    /// pigpio daemon address
    #[arg(long, env = "PIGPIO_ADDR")]
    pigpio: Option<String>,

    #[command(flatten)]
    servo: ServoArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct ServoArgs {
    /// GPIO channel driving the servo signal
    #[arg(long)]
    channel: Option<u32>,

    #[arg(long)]
    min_pulse_us: Option<u32>,

    #[arg(long)]
    max_pulse_us: Option<u32>,

    #[arg(long)]
    neutral_pulse_us: Option<u32>,

    /// Measured time for this servo to turn 60 degrees
    #[arg(long, env = "SERVO_SECONDS_PER_60")]
    seconds_per_60_degrees: Option<f64>,

    /// Angle the servo is assumed to start at
    #[arg(long, allow_hyphen_values = true)]
    initial_angle: Option<i32>,
}

impl From<ServoArgs> for ServoSettings {
    fn from(args: ServoArgs) -> Self {
        ServoSettings {
            channel: args.channel,
            min_pulse_us: args.min_pulse_us,
            max_pulse_us: args.max_pulse_us,
            neutral_pulse_us: args.neutral_pulse_us,
            seconds_per_60_degrees: args.seconds_per_60_degrees,
            initial_angle: args.initial_angle,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Accept target angles until the command source closes
    Serve(ServeArgs),
    /// Move once to an absolute angle and exit
    Spin {
        #[arg(long, allow_hyphen_values = true)]
        to: i32,
    },
    /// Compute seconds-per-60° from timed runs
    Fit {
        /// DEGREES:SECONDS of one timed run, repeatable
        #[arg(long = "sample", required = true, value_parser = parse_sample)]
        samples: Vec<(f64, f64)>,
    },
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct ServeArgs {
    /// Newline-delimited commands on stdin; `?` prints the last value
    #[arg(long)]
    stdin: bool,

    /// Serve line-oriented TCP clients one at a time
    #[arg(long, value_name = "ADDR")]
    listen: Option<String>,

    /// Subscribe to the command characteristic of a BLE peripheral
    #[arg(long)]
    ble: bool,
}

fn parse_sample(s: &str) -> Result<(f64, f64), String> {
    let (degrees, seconds) = s
        .split_once(':')
        .ok_or_else(|| format!("expected DEGREES:SECONDS, got {:?}", s))?;
    let degrees = degrees.trim().parse::<f64>().map_err(|e| e.to_string())?;
    let seconds = seconds.trim().parse::<f64>().map_err(|e| e.to_string())?;
    Ok((degrees, seconds))
}

async fn connect_driver(
    simulate: bool,
    address: String,
) -> Result<Box<dyn PulseDriver>, ServoError> {
    if simulate {
        info!("using simulated pulse driver");
        return Ok(Box::new(SimulatedDriver::new()));
    }
    let driver = tokio::task::spawn_blocking(move || PigpioDriver::connect(&address)).await??;
    Ok(Box::new(driver))
}

async fn serve(
    args: ServeArgs,
    config: &Config,
    controller: ServoController<Box<dyn PulseDriver>>,
) -> Result<(), ServoError> {
    let (dispatcher, worker) = Dispatcher::start(controller.into_shared());

    if args.stdin {
        let stdin = BufReader::new(tokio::io::stdin());
        let mut source = LineSource::new(stdin, tokio::io::stdout());
        dispatcher.serve(&mut source).await?;
    } else if let Some(address) = args.listen {
        let listener = TcpListener::bind(&address)
            .await
            .map_err(SourceError::from)?;
        dispatcher.serve_listener(listener).await?;
    } else if args.ble {
        serve_ble(&dispatcher, config).await?;
    }

    dispatcher.settled().await;
    drop(dispatcher);
    worker.join().await
}

#[cfg(feature = "ble")]
async fn serve_ble(dispatcher: &Dispatcher, config: &Config) -> Result<(), ServoError> {
    let mut source = rotation_controller::ble::BleSource::connect(&config.ble).await?;
    dispatcher.serve(&mut source).await?;
    Ok(())
}

#[cfg(not(feature = "ble"))]
async fn serve_ble(_dispatcher: &Dispatcher, _config: &Config) -> Result<(), ServoError> {
    Err(ConfigError::Invalid("built without the `ble` feature".into()).into())
}

async fn run(cli: Cli) -> Result<(), ServoError> {
    if let Command::Fit { samples } = &cli.command {
        let fitted = ServoCalibration::fit_seconds_per_60(samples)
            .ok_or_else(|| ConfigError::Invalid("no usable samples".into()))?;
        println!("seconds_per_60_degrees = {:.4}", fitted);
        return Ok(());
    }

    let file = match &cli.config {
        Some(path) => ConfigFile::load(path)?,
        None => ConfigFile::default(),
    };
    let config = Config::resolve(file, cli.servo.into(), cli.pigpio)?;
    info!(
        channel = config.calibration.channel,
        seconds_per_60_degrees = config.calibration.seconds_per_60_degrees,
        initial_angle = config.initial_angle.degrees(),
        "configuration loaded"
    );
    for direction in Direction::iter() {
        info!(
            %direction,
            pulse_us = config.calibration.pulse_for(direction),
            "drive pulse"
        );
    }

    let driver = connect_driver(cli.simulate, config.pigpio_address.clone()).await?;
    let mut controller =
        ServoController::new(driver, config.calibration.clone(), config.initial_angle);
    controller.stop()?;

    match cli.command {
        Command::Serve(args) => serve(args, &config, controller).await,
        Command::Spin { to } => {
            let outcome =
                tokio::task::spawn_blocking(move || controller.move_to(Angle::new(to))).await??;
            info!(
                from = outcome.from.degrees(),
                to = outcome.to.degrees(),
                delta = outcome.rotation.delta,
                direction = %outcome.rotation.direction,
                duration = ?outcome.duration,
                "spin complete"
            );
            Ok(())
        }
        Command::Fit { .. } => Ok(()),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), ServoError> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rotation_controller=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        error!("{}", e);
        return Err(e);
    }
    Ok(())
}
