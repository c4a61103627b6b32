use std::path::PathBuf;

use clap::Parser;
use hecon::{Analysis, Format, execute, init_logging};

#[derive(Parser, Debug)]
#[command(name = "hecon")]
#[command(about = "Health-economic modeling: cohort models, decision trees, PSA and VOI")]
struct Args {
    /// Analysis to run
    #[arg(value_enum)]
    analysis: Analysis,

    /// Request file (.yaml, .yml or .json)
    request: PathBuf,

    /// Write the response here instead of stdout; the extension picks the format
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Single-line JSON output
    #[arg(long)]
    compact: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn")]
    log_level: String,

    /// Write logs to this file instead of stderr (earlier runs kept as .1-.3)
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    init_logging(&args.log_level, args.log_file.as_deref())?;

    let format = match &args.output {
        Some(path) => Format::from_path(path)?,
        None => Format::Json,
    };
    let rendered = execute(args.analysis, &args.request, format, args.compact)?;

    match &args.output {
        Some(path) => {
            hecon::io::atomic_write(path, &rendered)?;
            tracing::info!(output = %path.display(), "response written");
        }
        None => print!("{rendered}"),
    }
    Ok(())
}
