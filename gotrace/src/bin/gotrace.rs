use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use eyre::{Context, Result};

use gotrace::stdlib::StdlibIndex;
use gotrace::{anonymize, breakdown, flamescope, print, profile, strings, stw};

#[derive(Parser)]
#[command(name = "gotrace")]
#[command(about = "toolkit for go runtime execution traces", version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Anonymize a trace by obfuscating non-stdlib file paths and symbols
    Anonymize { input: PathBuf, output: PathBuf },

    /// Break down the contents of a trace by event type
    Breakdown {
        #[command(subcommand)]
        view: BreakdownView,
    },

    /// Extract CPU samples into a format FlameScope can visualize
    Flamescope { input: PathBuf, output: PathBuf },

    /// Convert a trace to a sampled wall-clock profile in pprof format
    Pprof { input: PathBuf, output: PathBuf },

    /// Print trace data as plain text
    Print {
        #[command(subcommand)]
        view: PrintView,
    },

    /// Print all strings contained in a trace
    Strings { input: PathBuf },

    /// List the stop-the-world pauses in a trace
    Stw {
        #[command(subcommand)]
        view: StwView,
    },
}

#[derive(Subcommand)]
enum BreakdownView {
    /// Event type, count and bytes as csv
    Csv { input: PathBuf },
    /// Event types by size, largest first
    Bytes { input: PathBuf },
    /// Event types by count, most frequent first
    Count { input: PathBuf },
}

#[derive(Subcommand)]
enum StwView {
    /// Pauses in ascending start order as csv
    Csv { input: PathBuf },
    /// Pauses in descending duration order
    Top { input: PathBuf },
}

#[derive(Subcommand)]
enum PrintView {
    /// Print events contained in the trace
    Events {
        /// Only events concerning this goroutine, -1 means all
        #[arg(short, long, default_value_t = -1)]
        g: i64,

        /// Only events from this proc, -1 means all
        #[arg(short, long, default_value_t = -1)]
        p: i64,

        /// Only events with a timestamp >= this value in nanoseconds
        #[arg(long, default_value_t = 0)]
        min_ts: i64,

        /// Only events with a timestamp <= this value, -1 means no limit
        #[arg(long, default_value_t = -1)]
        max_ts: i64,

        /// Print stack traces after each event
        #[arg(short, long)]
        verbose: bool,

        input: PathBuf,
    },
    /// Print stacks contained in the trace
    Stacks {
        /// Only stacks with these comma separated ids
        #[arg(long, value_delimiter = ',')]
        ids: Vec<u32>,

        input: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    match args.command {
        Command::Anonymize { input, output } => {
            let reader = open_input(&input)?;
            let mut writer = create_output(&output)?;
            let index = StdlibIndex::new();
            anonymize::anonymize_trace(reader, &mut writer, &index)
                .wrap_err("failed to anonymize trace")?;
            writer.flush()?;
        }

        Command::Breakdown { view } => {
            let input = match &view {
                BreakdownView::Csv { input }
                | BreakdownView::Bytes { input }
                | BreakdownView::Count { input } => input.clone(),
            };
            let summary = breakdown::by_event_type(open_input(&input)?)
                .wrap_err("failed to break down trace")?;
            with_stdout(|stdout| match view {
                BreakdownView::Csv { .. } => breakdown::write_csv(&summary, stdout),
                BreakdownView::Bytes { .. } => breakdown::write_bytes_table(&summary, stdout),
                BreakdownView::Count { .. } => breakdown::write_count_table(&summary, stdout),
            })?;
        }

        Command::Flamescope { input, output } => {
            let reader = open_input(&input)?;
            let mut writer = create_output(&output)?;
            flamescope::export(reader, &mut writer).wrap_err("failed to export cpu samples")?;
            writer.flush()?;
        }

        Command::Pprof { input, output } => {
            let reader = open_input(&input)?;
            let mut writer = create_output(&output)?;
            profile::convert(reader, &mut writer).wrap_err("failed to build profile")?;
            writer.flush()?;
        }

        Command::Print { view } => match view {
            PrintView::Events {
                g,
                p,
                min_ts,
                max_ts,
                verbose,
                input,
            } => {
                let filter = print::EventFilter {
                    min_ts,
                    max_ts,
                    p,
                    g,
                    verbose,
                    stack_ids: Vec::new(),
                };
                let reader = open_input(&input)?;
                with_stdout(|stdout| print::events(reader, stdout, &filter))?;
            }
            PrintView::Stacks { ids, input } => {
                let filter = print::StackFilter { stack_ids: ids };
                let reader = open_input(&input)?;
                with_stdout(|stdout| print::stacks(reader, stdout, &filter))?;
            }
        },

        Command::Strings { input } => {
            let reader = open_input(&input)?;
            with_stdout(|stdout| strings::dump(reader, stdout))?;
        }

        Command::Stw { view } => {
            let input = match &view {
                StwView::Csv { input } | StwView::Top { input } => input.clone(),
            };
            let events =
                stw::events(open_input(&input)?).wrap_err("failed to extract stw events")?;
            with_stdout(|stdout| match view {
                StwView::Csv { .. } => stw::write_csv(&events, stdout),
                StwView::Top { .. } => stw::write_top(&events, stdout),
            })?;
        }
    }
    Ok(())
}

fn open_input(path: &Path) -> Result<BufReader<File>> {
    let file =
        File::open(path).wrap_err_with(|| format!("failed to open input file {}", path.display()))?;
    Ok(BufReader::new(file))
}

fn create_output(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path)
        .wrap_err_with(|| format!("failed to open output file {}", path.display()))?;
    Ok(BufWriter::new(file))
}

fn with_stdout<E, F>(f: F) -> Result<()>
where
    E: Into<eyre::Report>,
    F: FnOnce(&mut BufWriter<io::StdoutLock<'static>>) -> Result<(), E>,
{
    let mut stdout = BufWriter::new(io::stdout().lock());
    f(&mut stdout).map_err(Into::into)?;
    stdout.flush()?;
    Ok(())
}
