use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sqlscope_core::{Config, DialectConfig, DialectRules};
use sqlscope_sql::{
    analyze_at, split_statements, tokenize, ConnectionContext, DataContext, QueryFilter, StatementRewriter, Token,
    TokenKind,
};

/// sqlscope - SQL tokenizing, scope resolution and filter injection
#[derive(Parser)]
#[command(name = "sqlscope")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: sqlscope.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the configured dialect
    #[arg(short, long, global = true, value_enum)]
    dialect: Option<DialectArg>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the token stream of a file
    Tokenize {
        /// SQL file, or - for stdin
        file: PathBuf,

        /// Emit tokens as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print each statement of a script on its own
    Split {
        /// SQL file, or - for stdin
        file: PathBuf,
    },

    /// Show the scope, item and symbol origin at a byte offset
    Resolve {
        /// SQL file, or - for stdin
        file: PathBuf,

        /// Byte offset of the cursor
        #[arg(short, long)]
        offset: usize,

        /// Emit the resolution as JSON
        #[arg(long)]
        json: bool,
    },

    /// Add WHERE conditions and ORDER BY columns to a SELECT
    Inject {
        /// SQL file, or - for stdin
        file: PathBuf,

        /// JSON filter description
        #[arg(short, long)]
        filter: PathBuf,

        /// Print the whole statement re-rendered instead of splicing
        #[arg(long)]
        canonical: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum DialectArg {
    Ansi,
    Postgres,
    Mysql,
    Bigquery,
    Snowflake,
    Mssql,
}

impl From<DialectArg> for DialectConfig {
    fn from(arg: DialectArg) -> Self {
        match arg {
            DialectArg::Ansi => DialectConfig::Ansi,
            DialectArg::Postgres => DialectConfig::Postgres,
            DialectArg::Mysql => DialectConfig::MySql,
            DialectArg::Bigquery => DialectConfig::BigQuery,
            DialectArg::Snowflake => DialectConfig::Snowflake,
            DialectArg::Mssql => DialectConfig::MsSql,
        }
    }
}

// The parse pool owns its runtime, so main stays synchronous.
fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    let mut config = if let Some(config_path) = &cli.config {
        Config::from_file(config_path)?
    } else if Path::new("sqlscope.toml").exists() {
        Config::from_file(Path::new("sqlscope.toml"))?
    } else {
        if cli.verbose {
            eprintln!("{}", "No config file found, using defaults".yellow());
        }
        Config::default()
    };

    if let Some(dialect) = cli.dialect {
        config.dialect = dialect.into();
    }

    if cli.verbose {
        eprintln!("{} dialect: {}", "Using".cyan(), config.dialect);
    }

    match cli.command {
        Commands::Tokenize { file, json } => tokenize_command(&config, &file, json),
        Commands::Split { file } => split_command(&config, &file),
        Commands::Resolve { file, offset, json } => resolve_command(&config, &file, offset, json),
        Commands::Inject {
            file,
            filter,
            canonical,
        } => inject_command(&config, &file, &filter, canonical),
    }
}

fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read stdin")?;
        return Ok(text);
    }

    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn tokenize_command(config: &Config, file: &Path, json: bool) -> Result<()> {
    let text = read_input(file)?;
    let tokens = tokenize(&text, &config.dialect_rules());

    if json {
        println!("{}", serde_json::to_string_pretty(&tokens)?);
        return Ok(());
    }

    for token in tokens.iter().filter(|t| t.kind != TokenKind::Space) {
        println!("{:>6}  {:<8}  {}", token.start, format!("{:?}", token.kind), paint(token));
    }

    Ok(())
}

fn paint(token: &Token) -> colored::ColoredString {
    let text = format!("{:?}", token.text);
    match token.kind {
        TokenKind::Keyword => text.blue().bold(),
        TokenKind::Name => text.green(),
        TokenKind::Value => text.yellow(),
        TokenKind::Comment => text.dimmed(),
        TokenKind::Command => text.magenta(),
        TokenKind::Unknown => text.red(),
        _ => text.normal(),
    }
}

fn split_command(config: &Config, file: &Path) -> Result<()> {
    let text = read_input(file)?;
    let tokens = tokenize(&text, &config.dialect_rules());
    let statements = split_statements(&tokens);

    for (index, interval) in statements.iter().enumerate() {
        println!("{}", format!("-- statement {} {}", index + 1, interval).bright_blue());
        println!("{}", interval.slice(&text));
    }

    if statements.is_empty() {
        eprintln!("{}", "No statements found".yellow());
    }

    Ok(())
}

fn resolve_command(config: &Config, file: &Path, offset: usize, json: bool) -> Result<()> {
    let text = read_input(file)?;
    let rules: DialectRules = config.dialect_rules();
    let query = analyze_at(&text, offset, &rules, &DataContext::empty(), ConnectionContext::default());
    let summary = query.resolve(offset).summary();

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("{} {}", "Offset:".bold(), offset);
    println!("{} {}", "Node:".bold(), summary.node.0);

    match &summary.scope {
        Some(scope) => println!("{} {:?} {}", "Scope:".bold(), scope.kind, scope.interval),
        None => println!("{} {}", "Scope:".bold(), "none".dimmed()),
    }

    match &summary.item {
        Some(item) => println!(
            "{} {} ({:?}) {}",
            "Item:".bold(),
            item.name.green(),
            item.role,
            item.interval
        ),
        None => println!("{} {}", "Item:".bold(), "none".dimmed()),
    }

    match &summary.origin {
        Some(origin) => {
            println!("{} {:?}", "Origin:".bold(), origin.kind);
            if !origin.qualifier.is_empty() {
                println!("  {} {}", "qualifier:".cyan(), origin.qualifier.join("."));
            }
            if let Some(rowset) = &origin.rowset {
                println!("  {} {}", "rowset:".cyan(), rowset);
            }
            if !origin.context.ctes.is_empty() {
                println!("  {} {}", "ctes:".cyan(), origin.context.ctes.join(", "));
            }
            if !origin.context.sources.is_empty() {
                println!("  {} {}", "sources:".cyan(), origin.context.sources.join(", "));
            }
        }
        None => println!("{} {}", "Origin:".bold(), "none".dimmed()),
    }

    if !summary.nearest_result.result_columns.is_empty() {
        println!(
            "{} {}",
            "Result columns:".bold(),
            summary.nearest_result.result_columns.join(", ")
        );
    }

    Ok(())
}

fn inject_command(config: &Config, file: &Path, filter_path: &Path, canonical: bool) -> Result<()> {
    let sql = read_input(file)?;
    let filter_json = std::fs::read_to_string(filter_path)
        .with_context(|| format!("Failed to read filter {}", filter_path.display()))?;
    let filter: QueryFilter = serde_json::from_str(&filter_json).context("Invalid filter JSON")?;

    if filter.is_empty() {
        eprintln!("{}", "Filter is empty, statement left unchanged".yellow());
    }

    let mut rewriter_config = config.rewriter.clone();
    if canonical {
        rewriter_config.preserve_formatting = false;
    }

    let rewriter = StatementRewriter::new(config.dialect_rules(), &rewriter_config)?;
    let rewritten = rewriter
        .inject_filter(&sql, &filter)
        .map_err(|e| anyhow::anyhow!("Failed to inject filter: {}", e))?;

    println!("{rewritten}");
    Ok(())
}
