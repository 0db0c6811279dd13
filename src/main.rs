use clap::{Args, Parser, Subcommand};
use env_logger::Env;

mod config;
mod convert;
mod derived;
mod plot;
mod record;
mod report;
mod spans;
mod stats;
mod table;

pub type Result<T> = anyhow::Result<T>;

#[derive(Parser)]
#[command(name = "slp-profiler")]
#[command(about = "Viewer performance log analyzer", long_about = None)]
struct Cli {
    /// Enable verbose (debug) logging.
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze an arctan-format performance log (or a previously exported csv).
    Analyze(AnalyzeArgs),

    /// Convert a classic (non-arctan) performance log into a csv file.
    Convert {
        /// Performance log to read.
        #[arg(default_value = "performance.slp")]
        infile: String,

        /// Csv file to create.
        #[arg(default_value = "performance.csv")]
        outfile: String,
    },
}

#[derive(Args)]
struct AnalyzeArgs {
    /// Performance log or csv file to read.
    #[arg(default_value = "performance.slp")]
    infile: String,

    /// Show a summary of retained spans on stdout.
    #[arg(long)]
    summarize: bool,

    /// Restrict to the requested fields when reading csv files too.
    #[arg(long)]
    filter_csv: bool,

    /// Export collected frame data to the given csv file ("auto" derives a name).
    #[arg(long, default_value = "auto")]
    export: String,

    /// Break results down based on active outfit.
    #[arg(long)]
    by_outfit: bool,

    /// Plot the given fields by frame.
    #[arg(long, num_args = 1..)]
    plot_time_series: Vec<String>,

    /// Compare infile against the given file.
    #[arg(long)]
    compare: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();

    match cli.cmd {
        Commands::Analyze(args) => run_analyze(args, cli.verbose),
        Commands::Convert { infile, outfile } => convert::convert_log(&infile, &outfile),
    }
}

fn run_analyze(args: AnalyzeArgs, verbose: bool) -> Result<()> {
    let cfg = config::AnalyzeConfig {
        verbose,
        filter_csv: args.filter_csv,
    };
    let fields = config::default_fields();

    // 1) Collect the frame table and apply the fill policy.
    let mut data = table::collect_frame_data(&args.infile, &fields, &cfg)?;
    table::fill_blanks(&mut data);

    // 2) Optional two-table comparison.
    if let Some(compare_file) = &args.compare {
        let mut other = table::collect_frame_data(compare_file, &fields, &cfg)?;
        report::compare_frames(&mut data, &mut other, "compare.csv")?;
    }

    // 3) Export, then re-collect from the exported csv so downstream analysis
    // sees exactly what a later run reading that file would see. A skipped
    // export keeps the in-memory table.
    if let Some(export_file) = table::export(&args.export, &data)? {
        data = table::collect_frame_data(&export_file.to_string_lossy(), &fields, &cfg)?;
    }

    // 4) Outfit breakdown and plots.
    if args.by_outfit {
        report::process_by_outfit(&data, &cfg, args.summarize)?;
    } else if args.summarize {
        let spans = spans::get_outfit_spans(&data, spans::SpanThresholds::default())?;
        report::print_summary(&spans);
    }

    if !args.plot_time_series.is_empty() {
        plot::plot_time_series(&data, &args.plot_time_series)?;
    }

    println!("done");
    Ok(())
}
