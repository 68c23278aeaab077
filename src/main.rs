//! qbe - Formula inference by example for CSV data

use anyhow::{Context, bail};
use directories::ProjectDirs;
use qbe_core::storage::{load_rows, parse_csv_field, write_csv_rows};
use qbe_core::{Calculation, Config, QbeError, Row, Suggester, SuggestionRequest, load_config};
use qbe_engine::engine::{Language, Locale};
use qbe_engine::{Fallible, Job};
use std::env;
use std::path::PathBuf;
use std::sync::{Arc, mpsc};
use tracing_subscriber::EnvFilter;

fn print_usage() {
    eprintln!("Usage: qbe [OPTIONS] FILE");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  FILE                      CSV file with a header line");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --column <NAME>           Column to suggest a formula for");
    eprintln!("  --target <VALUE>          Desired value of the column");
    eprintln!("  --row <N>                 Data row holding the target (1-based, default 1)");
    eprintln!("  --example <ROW=VALUE>     Another row and its desired value (can be repeated)");
    eprintln!("  --apply <NAME=FORMULA>    Evaluate a formula into a column, print CSV (can be repeated)");
    eprintln!("  --level <N>               Search depth");
    eprintln!("  --locale <en|nl>          Formula language");
    eprintln!("  --config <FILE>           Load settings from TOML file");
    eprintln!("  --no-config               Ignore the user's config file");
    eprintln!("  -v, --verbose             Debug logging");
    eprintln!("  -h, --help                Print help");
}

#[derive(Debug, Default)]
struct Options {
    file: Option<PathBuf>,
    column: Option<String>,
    target: Option<String>,
    row: usize,
    examples: Vec<(usize, String)>,
    apply: Vec<(String, String)>,
    level: Option<usize>,
    locale: Option<Language>,
    config: Option<PathBuf>,
    no_config: bool,
    verbose: bool,
}

enum Parsed {
    Run(Options),
    Help,
}

fn next_value<'a>(args: &'a [String], i: &mut usize, flag: &str, what: &str) -> anyhow::Result<&'a str> {
    *i += 1;
    match args.get(*i) {
        Some(value) => Ok(value.as_str()),
        None => bail!("{flag} requires {what}"),
    }
}

fn split_pair<'a>(text: &'a str, flag: &str) -> anyhow::Result<(&'a str, &'a str)> {
    text.split_once('=')
        .with_context(|| format!("{flag} expects NAME=VALUE, got '{text}'"))
}

fn parse_row_number(text: &str) -> anyhow::Result<usize> {
    match text.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => bail!("row numbers start at 1, got '{text}'"),
    }
}

fn parse_args(args: &[String]) -> anyhow::Result<Parsed> {
    let mut options = Options {
        row: 1,
        ..Options::default()
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => return Ok(Parsed::Help),
            "-v" | "--verbose" => options.verbose = true,
            "--no-config" => options.no_config = true,
            "--column" => options.column = Some(next_value(args, &mut i, "--column", "a name")?.to_string()),
            "--target" => options.target = Some(next_value(args, &mut i, "--target", "a value")?.to_string()),
            "--row" => options.row = parse_row_number(next_value(args, &mut i, "--row", "a number")?)?,
            "--example" => {
                let (row, value) = split_pair(next_value(args, &mut i, "--example", "ROW=VALUE")?, "--example")?;
                options.examples.push((parse_row_number(row)?, value.to_string()));
            }
            "--apply" => {
                let (name, formula) = split_pair(next_value(args, &mut i, "--apply", "NAME=FORMULA")?, "--apply")?;
                options.apply.push((name.trim().to_string(), formula.to_string()));
            }
            "--level" => {
                let text = next_value(args, &mut i, "--level", "a number")?;
                options.level = Some(text.parse::<usize>().with_context(|| format!("invalid level '{text}'"))?);
            }
            "--locale" => {
                let code = next_value(args, &mut i, "--locale", "a language code")?;
                let locale = Locale::from_code(code).with_context(|| format!("unknown locale '{code}'"))?;
                options.locale = Some(locale.language);
            }
            "--config" => options.config = Some(PathBuf::from(next_value(args, &mut i, "--config", "a file path")?)),
            arg if arg.starts_with('-') => bail!("Unknown option: {arg}"),
            arg => {
                if options.file.is_some() {
                    bail!("Unexpected argument: {arg}");
                }
                options.file = Some(PathBuf::from(arg));
            }
        }
        i += 1;
    }
    Ok(Parsed::Run(options))
}

fn user_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "qbe").map(|dirs| dirs.config_dir().join("config.toml"))
}

fn config_for(options: &Options) -> Config {
    let path = if options.no_config {
        None
    } else {
        options.config.clone().or_else(user_config_path)
    };
    if let Some(path) = options.config.as_ref().filter(|p| !p.exists()) {
        eprintln!("Warning: Config file not found: {}", path.display());
    }

    let (mut config, warnings) = load_config(path.as_deref());
    for warning in warnings {
        eprintln!("Warning: {}", warning);
    }
    if let Some(level) = options.level {
        config.level = level;
    }
    if let Some(language) = options.locale {
        config.locale = language;
    }
    for warning in config.normalize() {
        eprintln!("Warning: {}", warning);
    }
    config
}

fn load(path: PathBuf, job: &Job) -> anyhow::Result<Vec<Row>> {
    let (tx, rx) = mpsc::channel();
    load_rows(path.clone()).get(Some(job), move |rows: Fallible<Vec<Row>>| {
        let _ = tx.send(rows);
    });
    let rows = rx.recv().context("loading was cancelled")?;
    rows.into_result()
        .map_err(anyhow::Error::msg)
        .with_context(|| format!("failed to load {}", path.display()))
}

fn data_row(rows: &[Row], number: usize) -> anyhow::Result<Row> {
    rows.get(number - 1)
        .cloned()
        .with_context(|| format!("row {number} does not exist ({} data rows)", rows.len()))
}

fn run_apply(options: &Options, config: &Config, rows: Vec<Row>, job: &Job) -> anyhow::Result<()> {
    let calculation = Calculation::parse(options.apply.iter().cloned(), &config.locale())?;
    let (tx, rx) = mpsc::channel();
    calculation
        .apply_all(Arc::new(rows))
        .get(Some(job), move |rows: Fallible<Vec<Row>>| {
            let _ = tx.send(rows);
        });
    let rows = rx
        .recv()
        .context("calculation was cancelled")?
        .into_result()
        .map_err(anyhow::Error::msg)?;
    print!("{}", write_csv_rows(&rows));
    Ok(())
}

fn run_suggest(options: &Options, config: Config, rows: Vec<Row>, job: &Job) -> anyhow::Result<()> {
    let (Some(column), Some(target)) = (options.column.as_ref(), options.target.as_ref()) else {
        bail!("--column and --target are required (or use --apply)");
    };
    let row = data_row(&rows, options.row)?;
    if row.get(column.as_str()).is_none() {
        return Err(QbeError::UnknownColumn(column.clone()).into());
    }

    let mut request = SuggestionRequest::new(row, column.as_str(), parse_csv_field(target));
    for (number, value) in &options.examples {
        request = request.with_example(data_row(&rows, *number)?, parse_csv_field(value));
    }

    let suggester = Suggester::new(config);
    let (tx, rx) = mpsc::channel();
    suggester.suggest(request).get(Some(job), move |suggestions| {
        let _ = tx.send(suggestions);
    });
    let suggestions = rx.recv().context("suggestion search was cancelled")?;

    if suggestions.is_empty() {
        println!("No formula found for '{}' in {}", target, column);
        return Ok(());
    }
    for suggestion in suggestions {
        println!("{}", suggestion.formula);
        println!("    {}", suggestion.explanation);
    }
    Ok(())
}

fn run(options: Options) -> anyhow::Result<()> {
    let config = config_for(&options);
    let Some(file) = options.file.clone() else {
        bail!("no input file given");
    };

    let job = Job::new(config.qos);
    let rows = load(file, &job)?;
    tracing::debug!(rows = rows.len(), "loaded");

    if options.apply.is_empty() {
        run_suggest(&options, config, rows, &job)
    } else {
        run_apply(&options, &config, rows, &job)
    }
}

fn main() {
    let args: Vec<String> = env::args().collect();
    let options = match parse_args(&args) {
        Ok(Parsed::Run(options)) => options,
        Ok(Parsed::Help) => {
            print_usage();
            return;
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            print_usage();
            std::process::exit(1);
        }
    };

    let default_filter = if options.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(options) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
