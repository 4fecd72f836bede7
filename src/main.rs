use clap::Parser;
use log::{error, info, warn};
use psw_bench::pipeline::{Dirs, Pipeline};
use psw_bench::scheduler::{default_worker_count, Job, JobScheduler};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Benchmarks the hexmc model counter on random CNF instances over an
/// (n variables, m clauses) grid.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Grid bound: n sweeps [start-n, SIZE], m sweeps [1, SIZE]
    size: u32,

    /// First n of the sweep
    #[arg(long, default_value_t = 2)]
    start_n: u32,

    /// First m of the first row; also restores sequence numbers from
    /// the output directory before submitting anything
    #[arg(long)]
    start_m: Option<u32>,

    /// Path to the solver binary
    #[arg(short, long, default_value = "./hexmc")]
    solver: PathBuf,

    /// Output directory root
    #[arg(short, long, default_value = "benchmarks")]
    output: PathBuf,

    /// Instances generated per (n, m) pair
    #[arg(short, long, default_value_t = 5)]
    runs: usize,

    /// Worker thread count [default: available parallelism + 4]
    #[arg(short, long)]
    jobs: Option<usize>,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();
    match run(args) {
        Ok(code) => code,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let dirs = Dirs::create(&args.output)?;
    let pipeline = Arc::new(Pipeline::new(dirs.clone(), args.solver.clone(), args.runs));

    if let Some(start_m) = args.start_m {
        info!("continuing from n = {}, m = {start_m}", args.start_n);
        pipeline.progress.restore(&dirs.instances)?;
    }

    let workers = args.jobs.unwrap_or_else(default_worker_count);
    let handler = Arc::clone(&pipeline);
    let scheduler = JobScheduler::spawn(workers, move |job| handler.run_job(job));

    // Ctrl-C stops submissions and abandons queued jobs; rows already
    // completed by then have been flushed by the aggregator.
    let cancelled = scheduler.cancel_flag();
    ctrlc::set_handler(move || cancelled.store(true, Ordering::SeqCst))?;

    'grid: for n in args.start_n..=args.size {
        let first_m = if n == args.start_n {
            args.start_m.unwrap_or(1)
        } else {
            1
        };
        for m in first_m..=args.size {
            for i in 0..args.runs {
                let accepted = scheduler.submit(Job {
                    num_vars: n,
                    num_clauses: m,
                    run_index: i,
                });
                if !accepted {
                    break 'grid;
                }
            }
        }
    }

    let interrupted = scheduler.cancel_flag();
    scheduler.drain();

    if interrupted.load(Ordering::SeqCst) {
        warn!(
            "interrupted; {} rows left incomplete",
            pipeline.aggregator.pending_rows()
        );
        return Ok(ExitCode::FAILURE);
    }

    pipeline.remove_temp_dir();
    info!("done");
    Ok(ExitCode::SUCCESS)
}
