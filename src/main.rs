use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;

use defgen::config::Config;
use defgen::log::{Level, Logger};
use defgen::{Context, driver, writer};

#[derive(Parser)]
#[command(
    name = "defgen",
    about = "Generate a module-definition export manifest from COFF object files"
)]
struct Cli {
    /// Library name emitted after LIBRARY
    #[arg(long)]
    lib: String,

    /// Input directory, scanned recursively for .obj files
    #[arg(long = "i")]
    input: PathBuf,

    /// Output .def path
    #[arg(long = "o")]
    output: PathBuf,

    /// Space-separated regexes; symbols in a matching namespace are exported
    #[arg(long = "y")]
    include: Option<String>,

    /// Space-separated regexes; symbols in a matching namespace are not exported
    #[arg(long = "n")]
    exclude: Option<String>,

    /// Space-separated regexes matched against the full demangled name;
    /// matches are exported regardless of namespace rules
    #[arg(long = "yo")]
    force_include: Option<String>,

    /// Space-separated regexes matched against the full demangled name;
    /// matches are never exported by namespace rules
    #[arg(long = "no")]
    force_exclude: Option<String>,

    /// Path to a filter plugin library exporting keep_symbol
    #[arg(long = "fn")]
    plugin: Option<PathBuf>,

    /// Keep per-unit decision caches (.objcache) next to the object files
    #[arg(long)]
    cache: bool,

    /// Emit dense @N NONAME ordinals
    #[arg(long)]
    ordinal: bool,

    /// Worker count (default: hardware concurrency)
    #[arg(long = "j")]
    jobs: Option<NonZeroUsize>,

    /// Log filter resolution details
    #[arg(long)]
    verbose: bool,

    /// Log per-symbol decisions
    #[arg(long)]
    trace: bool,
}

impl Cli {
    fn log_level(&self) -> Level {
        if self.trace {
            Level::Trace
        } else if self.verbose {
            Level::Verbose
        } else {
            Level::Normal
        }
    }

    fn into_config(self) -> Config {
        let concurrency = self.jobs.map_or_else(
            || std::thread::available_parallelism().map_or(1, NonZeroUsize::get),
            NonZeroUsize::get,
        );
        Config {
            library_name: self.lib,
            input_dir: self.input,
            output_path: self.output,
            include: self.include,
            exclude: self.exclude,
            force_include: self.force_include,
            force_exclude: self.force_exclude,
            plugin_path: self.plugin,
            concurrency,
            use_cache: self.cache,
            emit_ordinals: self.ordinal,
        }
    }
}

fn run(config: Config, log: &Logger) -> anyhow::Result<()> {
    let start = Instant::now();

    log.normal(format!(
        "Symbols will be filtered according to the following settings: {}",
        config.describe_rules()
    ));
    if config.plugin_path.is_some() && config.use_cache {
        log.warning(
            "Plugin decisions are cached; a changed plugin with an unchanged \
             path reuses stale cache entries.",
        );
    }

    let ctx = Context::new(config, log.clone())?;
    let paths = driver::find_object_files(&ctx.config.input_dir)?;
    log.verbose(format!("Found {} object files.", paths.len()));

    let symbols = driver::run(&ctx, &paths)?;
    let count = writer::write_def(
        &ctx.config.output_path,
        &ctx.config.library_name,
        symbols.into_iter().collect(),
        ctx.config.emit_ordinals,
    )?;

    log.verbose(format!(
        "Processing took {} ms.",
        start.elapsed().as_millis()
    ));
    log.normal(format!(
        "Generated {} with {count} symbols.",
        ctx.config.output_path.display()
    ));
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    let log = Logger::new(cli.log_level());

    if let Err(error) = run(cli.into_config(), &log) {
        log.error(format!("{error:#}"));
        std::process::exit(1);
    }
}
