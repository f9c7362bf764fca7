//! c6probe - probe and configure ESP32-C6 boards over their serial console.

use std::path::PathBuf;
use std::process::ExitCode;

use c6probe_device::OrderingPolicy;
use c6probe_runner::{
    init_logging, list_keys, list_serial_ports, run_probe, OutputFormat, RunConfig, RunnerError,
    EXIT_FATAL, EXIT_OK,
};
use clap::{ArgAction, Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "c6probe")]
#[command(
    about = "Probe and configure ESP32-C6 boards over their serial console",
    long_about = None
)]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Probe which keys the board supports and optionally apply changes
    Probe(ProbeArgs),

    /// List the candidate configuration keys
    Keys {
        /// Catalog file replacing the built-in key set
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// List serial ports
    Ports {
        /// Only show Espressif USB consoles
        #[arg(long)]
        espressif: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

#[derive(Args, Debug)]
struct ProbeArgs {
    /// Serial port (e.g. /dev/ttyACM0, COM4)
    #[arg(short, long)]
    port: Option<String>,

    /// Baud rate [default: 115200]
    #[arg(short, long)]
    baud: Option<u32>,

    /// Keys to probe, comma separated [default: whole catalog]
    #[arg(short, long, value_delimiter = ',')]
    keys: Option<Vec<String>>,

    /// Value to apply, as KEY=VALUE (repeatable)
    #[arg(short, long = "set", value_name = "KEY=VALUE")]
    set: Vec<String>,

    /// Per-command timeout in milliseconds [default: 2000]
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Overall deadline for the run in milliseconds
    #[arg(long)]
    deadline_ms: Option<u64>,

    /// Retries for reads that time out [default: 1]
    #[arg(long)]
    read_retries: Option<u32>,

    /// Write ordering: dependencies or request-order [default: dependencies]
    #[arg(long)]
    ordering: Option<OrderingPolicy>,

    /// Output format [default: text]
    #[arg(short, long, value_enum)]
    format: Option<OutputFormat>,

    /// Run configuration file (YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Catalog file replacing the built-in key set
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Talk to a simulated board instead of a serial port
    #[arg(long)]
    simulate: bool,
}

impl ProbeArgs {
    fn run_config(&self) -> Result<RunConfig, RunnerError> {
        let file = match &self.config {
            Some(path) => RunConfig::from_file(path)?,
            None => RunConfig::default(),
        };
        let flags = RunConfig {
            port: self.port.clone(),
            baud: self.baud,
            timeout_ms: self.timeout_ms,
            deadline_ms: self.deadline_ms,
            read_retries: self.read_retries,
            keys: self.keys.clone(),
            ordering: self.ordering,
            format: self.format,
            catalog: self.catalog.clone(),
            simulate: self.simulate,
            ..RunConfig::default()
        };
        Ok(file.overlay(flags))
    }
}

fn run(command: Commands) -> Result<u8, RunnerError> {
    match command {
        Commands::Probe(args) => {
            let config = args.run_config()?;
            let run = run_probe(&config, &args.set)?;
            print!("{}", run.output);
            Ok(run.exit_code())
        }
        Commands::Keys { catalog, format } => {
            print!("{}", list_keys(catalog.as_deref(), format)?);
            Ok(EXIT_OK)
        }
        Commands::Ports { espressif, format } => {
            print!("{}", list_serial_ports(espressif, format)?);
            Ok(EXIT_OK)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli.command) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(EXIT_FATAL)
        }
    }
}
