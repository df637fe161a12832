use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use pumprf_rs::{init_logger, Amount, Pump, Rate};

#[derive(Parser)]
#[command(name = "pumprf-cli")]
#[command(about = "Remote control for a combo-capable insulin pump over a radio bridge")]
struct Cli {
    /// Radio bridge to talk through, as <tty|usb>:<path>
    #[arg(long, default_value = "usb:/dev/ttyACM0")]
    radio: String,

    /// Log pump frames as they are sent and received
    #[arg(long)]
    trace_frames: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Query and print pump status
    Stat,
    /// Cancel the running combo bolus
    Cancelcombo,
    /// Converge the effective delivery rate onto a target (U/hr)
    Setrate { rate: f64 },
    /// Clear the active warning
    Clearwarn,
    /// Deliver a bolus; a non-zero duration programs a combo
    Bolus {
        /// Units to deliver
        units: f64,
        /// Delivery duration in minutes, a multiple of 6; 0 is immediate
        #[arg(default_value_t = 0)]
        minutes: u64,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logger();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("pumprf-cli: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> pumprf_rs::Result<()> {
    let mut pump = Pump::dial(&cli.radio)?.with_frame_trace(cli.trace_frames);

    match cli.command {
        Commands::Stat => {
            let stat = pump.stat().await?;
            println!("time        {}", stat.now);
            println!("reservoir   {}", stat.reservoir);
            println!("basal       {}", stat.basal);
            println!("last bolus  {}", stat.last_bolus);
            println!("IOB         {}", stat.iob);
            println!("daily basal {}", stat.daily_basal);
            println!("daily bolus {}", stat.daily_bolus);
            if let (Some(begin), Some(end)) = (stat.temp_begin, stat.temp_end) {
                println!("temp        {}% {begin}-{end}", stat.temp);
            }
            if stat.combo_active {
                println!(
                    "combo       {}/{} {}-{}",
                    stat.combo_delivered, stat.combo_total, stat.combo_begin, stat.combo_end
                );
            }
            if stat.warn {
                println!("WARNING ACTIVE");
            }
        }
        Commands::Cancelcombo => {
            pump.cancel_combo().await?;
        }
        Commands::Setrate { rate } => {
            let target = Rate::milliunits_per_hour((rate * 1000.0) as i64);
            while !pump.set_rate(target).await? {}
        }
        Commands::Clearwarn => {
            pump.clear_warn().await?;
        }
        Commands::Bolus { units, minutes } => {
            let amount = Amount::milliunits((units * 1000.0) as i64);
            pump.bolus(amount, Duration::from_secs(minutes * 60)).await?;
        }
    }

    Ok(())
}
