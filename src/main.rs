use clap::{Parser, Subcommand, ValueEnum};
use cmdcheck::executor::{Shell, ShellExecutor};
use cmdcheck::loader::{self, DEFAULT_DEFINITIONS_FILE};
use cmdcheck::report::{self, ConsoleProgress, DEFAULT_REPORT_DIR};
use cmdcheck::runner::{self, NoProgress, RunObserver, RunOptions};
use cmdcheck::schema::{self, DEFAULT_TIMEOUT_SECS};
use cmdcheck::{Error, ReportError, Result};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Clone, Copy, Default, ValueEnum)]
enum OutputFormat {
    /// Human-readable progress and summary
    #[default]
    Human,
    /// Machine-readable JSON output
    Json,
    /// JUnit XML output for CI systems
    Junit,
}

#[derive(Parser)]
#[command(name = "cmdcheck")]
#[command(about = "Run shell commands and validate their output against expectations")]
#[command(version)]
struct Cli {
    /// Show debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Execute test cases
    Run {
        /// Definition file (.json, .yaml, .yml or .toml)
        #[arg(long, default_value = DEFAULT_DEFINITIONS_FILE)]
        tests_file: PathBuf,
        /// Directory to save HTML reports
        #[arg(long, default_value = DEFAULT_REPORT_DIR)]
        report_dir: PathBuf,
        /// Don't write an HTML report
        #[arg(long)]
        no_report: bool,
        /// Output format
        #[arg(short, long, default_value = "human")]
        output: OutputFormat,
        /// Only run test cases whose name contains this substring
        #[arg(short, long)]
        filter: Option<String>,
        /// Number of test cases to run at once (1 runs strictly in order)
        #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..))]
        jobs: u16,
        /// Shell used to interpret commands [default: sh, or cmd on Windows]
        #[arg(long)]
        shell: Option<String>,
        /// Flag passed to the shell before the command line [default: -c, or /C on Windows]
        #[arg(long, allow_hyphen_values = true)]
        shell_flag: Option<String>,
    },
    /// Validate a definition file without running it
    Validate {
        /// Definition file (.json, .yaml, .yml or .toml)
        #[arg(default_value = DEFAULT_DEFINITIONS_FILE)]
        path: PathBuf,
    },
    /// Scaffold a new definition file
    Init {
        /// Output path for the new definition file
        #[arg(default_value = DEFAULT_DEFINITIONS_FILE)]
        path: PathBuf,
    },
    /// Output the definition file schema
    Schema,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Command::Run {
            tests_file,
            report_dir,
            no_report,
            output,
            filter,
            jobs,
            shell,
            shell_flag,
        } => {
            let report_dir = (!no_report).then_some(report_dir);
            run_command(RunArgs {
                tests_file: &tests_file,
                report_dir: report_dir.as_deref(),
                output,
                filter: filter.as_deref(),
                jobs: usize::from(jobs),
                shell: shell_from_args(shell, shell_flag),
                verbose: cli.verbose,
            })
        }
        Command::Validate { path } => validate_command(&path),
        Command::Init { path } => init_command(&path),
        Command::Schema => schema_command(),
    };

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

/// Platform shell, with either part overridden from the command line.
fn shell_from_args(program: Option<String>, flag: Option<String>) -> Shell {
    let default = Shell::default();
    Shell::new(
        program.unwrap_or(default.program),
        flag.unwrap_or(default.flag),
    )
}

/// Log to stderr so stdout stays parseable. `RUST_LOG` overrides the level.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

struct RunArgs<'a> {
    tests_file: &'a Path,
    report_dir: Option<&'a Path>,
    output: OutputFormat,
    filter: Option<&'a str>,
    jobs: usize,
    shell: Shell,
    verbose: bool,
}

/// Returns whether every test case passed.
fn run_command(args: RunArgs<'_>) -> Result<bool> {
    let human = matches!(args.output, OutputFormat::Human);
    if human {
        println!("Loading test cases from: {}", args.tests_file.display());
    }
    let definitions = loader::load_definitions(args.tests_file)?;

    let cases: Vec<_> = match args.filter {
        Some(f) => definitions
            .cases
            .into_iter()
            .filter(|case| case.display_name().contains(f))
            .collect(),
        None => definitions.cases,
    };
    if cases.is_empty() {
        return Err(Error::NoTestCases);
    }

    let options = RunOptions {
        jobs: args.jobs,
        default_timeout: definitions.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS),
    };
    let executor = ShellExecutor::new(args.shell);
    let console = ConsoleProgress {
        verbose: args.verbose,
    };
    let observer: &dyn RunObserver = if human { &console } else { &NoProgress };

    if human {
        println!("Starting test execution...\n");
    }
    let summary = runner::run(&cases, &executor, &options, observer);

    let report_path = match args.report_dir {
        Some(dir) => Some(report::write_html_report(
            &summary,
            dir,
            chrono::Local::now(),
        )?),
        None => None,
    };

    match args.output {
        OutputFormat::Human => {
            println!("{}", report::format_summary(&summary, report_path.as_deref()));
        }
        OutputFormat::Json => {
            println!("{}", report::format_json(&summary)?);
        }
        OutputFormat::Junit => {
            let suite = args.tests_file.display().to_string();
            print!("{}", report::format_junit_xml(&summary, &suite));
        }
    }

    Ok(summary.all_passed())
}

fn validate_command(path: &Path) -> Result<bool> {
    let definitions = loader::load_definitions(path)?;
    let missing: Vec<_> = definitions
        .cases
        .iter()
        .enumerate()
        .filter(|(_, case)| case.command().is_none())
        .map(|(i, case)| format!("#{} {}", i + 1, case.display_name()))
        .collect();

    if definitions.cases.is_empty() {
        eprintln!("✗ {}: no test cases", path.display());
        return Ok(false);
    }
    if !missing.is_empty() {
        for case in &missing {
            eprintln!("✗ {}: test case {case} has no command", path.display());
        }
        return Ok(false);
    }

    println!(
        "✓ {} ({} test cases)",
        path.display(),
        definitions.cases.len()
    );
    Ok(true)
}

const INIT_TEMPLATE: &str = r#"{
  "timeout": 60,
  "test_cases": [
    {
      "name": "echo prints greeting",
      "command": "echo hello world",
      "expected_stdout": "hello",
      "stdout_mode": "contains",
      "expected_returncode": 0
    },
    {
      "name": "exit code is checked",
      "command": "exit 3",
      "expected_returncode": 3
    },
    {
      "name": "stderr matches a pattern",
      "command": "echo 'error: code 42' >&2",
      "expected_stderr": "code \\d+",
      "stderr_mode": "regex",
      "stdout_mode": "ignore",
      "timeout": 5
    }
  ]
}
"#;

fn init_command(path: &Path) -> Result<bool> {
    if path.exists() {
        eprintln!("Error: file already exists: {}", path.display());
        return Ok(false);
    }
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
        && let Err(e) = fs::create_dir_all(parent)
    {
        eprintln!("Error creating directory: {e}");
        return Ok(false);
    }
    if let Err(e) = fs::write(path, INIT_TEMPLATE) {
        eprintln!("Error writing file: {e}");
        return Ok(false);
    }
    println!("Created: {}", path.display());
    Ok(true)
}

fn schema_command() -> Result<bool> {
    let schema = schema::generate_schema();
    let json = serde_json::to_string_pretty(&schema).map_err(ReportError::from)?;
    println!("{json}");
    Ok(true)
}
