use clap::Parser;
use eoka_pilot::parser::InstructionParser;
use eoka_pilot::{Config, ParserMode, Report, SiteDirectory, Workflow};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "eoka-pilot")]
#[command(about = "Natural-language browser testing")]
#[command(version)]
struct Cli {
    /// Instructions to run (each runs as its own workflow)
    instructions: Vec<String>,

    /// Read instructions from a file, one per line
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run in headless mode (overrides config)
    #[arg(long)]
    headless: bool,

    /// Parser to use: auto, rules or model (overrides config)
    #[arg(long, value_name = "MODE", value_parser = parse_mode)]
    parser: Option<ParserMode>,

    /// Total attempts per instruction (overrides config)
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Parse only and print the actions
    #[arg(long)]
    dry_run: bool,

    /// Write the parsed actions as an eoka-runner config (numbered
    /// `NAME_1.yaml`, `NAME_2.yaml`, ... when there are several instructions)
    #[arg(long, value_name = "PATH")]
    script: Option<PathBuf>,

    /// Print reports as JSON
    #[arg(long)]
    json: bool,

    /// Verbose output (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (only errors)
    #[arg(short, long)]
    quiet: bool,
}

fn parse_mode(s: &str) -> Result<ParserMode, String> {
    s.parse().map_err(|e: eoka_pilot::Error| e.to_string())
}

fn init_logging(cli: &Cli) {
    let builder = FmtSubscriber::builder()
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact();

    if std::env::var_os("RUST_LOG").is_some() {
        builder.with_env_filter(EnvFilter::from_default_env()).init();
        return;
    }

    let level = if cli.quiet {
        Level::ERROR
    } else {
        match cli.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            _ => Level::DEBUG,
        }
    };
    builder.with_max_level(level).init();
}

fn load_instructions(cli: &Cli) -> eoka_pilot::Result<Vec<String>> {
    let mut instructions = cli.instructions.clone();
    if let Some(ref path) = cli.file {
        let content = std::fs::read_to_string(path)?;
        instructions.extend(
            content
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#'))
                .map(str::to_string),
        );
    }
    Ok(instructions)
}

#[tokio::main]
async fn main() -> eoka_pilot::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    let mut config = match cli.config {
        Some(ref path) => Config::load(path)?,
        None => Config::default(),
    };
    if cli.headless {
        config.browser.headless = true;
    }
    if let Some(mode) = cli.parser {
        config.parser.mode = mode;
    }
    if let Some(n) = cli.max_attempts {
        config.workflow.max_attempts = n;
    }

    let instructions = load_instructions(&cli)?;
    if instructions.is_empty() {
        eprintln!("No instructions given. Pass them as arguments or with --file.");
        std::process::exit(2);
    }

    let workflow = Workflow::from_config(&config)?;

    if cli.dry_run || cli.script.is_some() {
        let sites = SiteDirectory::new(&config.sites, config.test_page.as_deref());
        let mut failed = false;
        for (n, instruction) in instructions.iter().enumerate() {
            let actions = workflow.parser().parse(instruction).await;
            failed |= actions.iter().any(|a| a.is_error());
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&actions)?);
            } else {
                println!("{}", instruction);
                for (i, action) in actions.iter().enumerate() {
                    println!("  {}. {}", i + 1, action);
                }
            }
            if let Some(ref base) = cli.script {
                let path = eoka_pilot::script::script_path(base, n, instructions.len());
                let yaml = eoka_pilot::script::render(instruction, &actions, &sites)?;
                std::fs::write(&path, yaml)?;
                println!("Script written to {}", path.display());
            }
        }
        if failed {
            std::process::exit(1);
        }
        return Ok(());
    }

    let reports: Vec<Report> = workflow.run_all(&instructions).await;

    if cli.json {
        let out = if reports.len() == 1 {
            serde_json::to_string_pretty(&reports[0])?
        } else {
            serde_json::to_string_pretty(&reports)?
        };
        println!("{}", out);
    } else {
        for report in &reports {
            println!("{}\n", report);
        }
    }

    if reports.iter().any(|r| !r.passed()) {
        std::process::exit(1);
    }
    Ok(())
}
