use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use env_logger::Env;
use log::{debug, info};

use pyprune::config::Config;
use pyprune::refactor::Refactor;
use pyprune::report::Report;
use pyprune::resolver::SearchPaths;
use pyprune::sources;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Files and directories to clean
    paths: Vec<PathBuf>,

    /// Regex matching file and directory names to include on recursive searches
    #[arg(short, long)]
    include: Option<String>,

    /// Regex matching file and directory names to exclude on recursive searches
    #[arg(short, long)]
    exclude: Option<String>,

    /// Remove all unused imports, regardless of inferred side effects
    #[arg(short, long)]
    all: bool,

    /// Don't write files back, just return the status
    #[arg(short, long)]
    check: bool,

    /// Don't write files back, just output a diff for each file on stdout
    #[arg(short, long)]
    diff: bool,

    /// Increase verbosity (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Don't emit non-error messages
    #[arg(short, long)]
    quiet: bool,

    /// Silence both stdout and stderr
    #[arg(short, long)]
    silence: bool,

    /// Expand wildcard star imports into the names they provide
    #[arg(long)]
    expand_star_imports: bool,

    /// Comma-separated module name prefixes whose imports are never removed
    #[arg(long, value_delimiter = ',')]
    skip_imports: Vec<String>,

    /// Rewrite __init__.py files even when they declare no __all__
    #[arg(long)]
    disable_all_dunder_policy: bool,

    /// Ignore `.gitignore` patterns
    #[arg(long)]
    no_gitignore: bool,

    /// Configuration file path
    #[arg(long)]
    config: Option<PathBuf>,

    /// Target Python version (e.g., py38, py39, py310, py311, py312, py313)
    #[arg(long, alias = "python-version")]
    target_version: Option<String>,
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    let mut config = Config::load(cli.config.as_deref())?;

    if !cli.paths.is_empty() {
        config.paths = cli.paths;
    }
    if let Some(include) = cli.include {
        config.include = include;
    }
    if let Some(exclude) = cli.exclude {
        config.exclude = exclude;
    }
    if let Some(target_version) = cli.target_version {
        config.set_target_version(target_version)?;
    }
    config.all |= cli.all;
    config.check |= cli.check;
    config.diff |= cli.diff;
    config.verbose |= cli.verbose > 0;
    config.quiet |= cli.quiet;
    config.silence |= cli.silence;
    config.expand_star_imports |= cli.expand_star_imports;
    config.disable_all_dunder_policy |= cli.disable_all_dunder_policy;
    config.no_gitignore |= cli.no_gitignore;
    config.skip_imports.extend(cli.skip_imports);

    if config.paths.is_empty() {
        anyhow::bail!("no paths provided, nothing to do");
    }

    debug!("Configuration: {config:?}");
    info!(
        "Target Python version: {} (resolved to Python 3.{})",
        config.target_version,
        config.python_version().unwrap_or(10)
    );

    let include = config.include_regex()?;
    let exclude = config.exclude_regex()?;
    let search_paths = SearchPaths::discover(&config);

    let mut reporter = Report::new(&config);
    let mut session = Refactor::new(&config, &search_paths);

    for target in config.paths.clone() {
        if target.is_file() {
            session.process_file(&target, &mut reporter);
        } else if target.is_dir() {
            let gitignore = (!config.no_gitignore).then(|| sources::gitignore_matcher(&target));
            let files = sources::yield_sources(
                &target,
                &include,
                &exclude,
                gitignore.as_ref(),
                &mut reporter,
            );
            for file in files {
                session.process_file(&file, &mut reporter);
            }
        } else {
            reporter.failure(
                &format!("{}: no such file or directory", target.display()),
                None,
            );
        }
    }

    if !config.silence {
        println!("{reporter}");
    }
    Ok(ExitCode::from(reporter.exit_code()))
}
