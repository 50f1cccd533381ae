use clap::{ArgGroup, Parser as ClapParser, Subcommand};
use odata_expr::cli::{self, CheckOptions, CheckResult, CliError, Expression};
use odata_expr::output::{to_json, to_json_pretty};
use std::io::{self, Read};
use tracing_subscriber::EnvFilter;

#[derive(ClapParser)]
#[command(name = "odata-expr")]
#[command(about = "odata-expr - Compile OData $filter, $search and $compute expressions")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check an expression against a schema and print what it compiles to
    #[command(group(ArgGroup::new("expression").required(true).args(["filter", "search", "compute"])))]
    Check {
        /// A $filter expression
        #[arg(long)]
        filter: Option<String>,

        /// A $search expression
        #[arg(long)]
        search: Option<String>,

        /// A $compute expression
        #[arg(long)]
        compute: Option<String>,

        /// Path of the JSON schema file
        #[arg(short, long)]
        schema: String,

        /// Target backend: sqlite, postgres, document or memory
        #[arg(short, long, default_value = "sqlite")]
        backend: String,

        /// Comma-separated allow-listed properties (all when omitted)
        #[arg(short, long, value_delimiter = ',')]
        allow: Option<Vec<String>>,

        /// JSON records for the memory backend (reads from stdin if not provided)
        #[arg(short, long)]
        input: Option<String>,

        /// Pretty-print the output
        #[arg(short, long)]
        pretty: bool,

        /// Render Int64 and Decimal values as strings
        #[arg(long)]
        ieee754_compatible: bool,

        /// Only parse and type-check, don't compile
        #[arg(long)]
        syntax_only: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Check {
            filter,
            search,
            compute,
            schema,
            backend,
            allow,
            input,
            pretty,
            ieee754_compatible,
            syntax_only,
        } => {
            let expression = match (filter, search, compute) {
                (Some(text), _, _) => Expression::Filter(text),
                (_, Some(text), _) => Expression::Search(text),
                (_, _, Some(text)) => Expression::Compute(text),
                // clap requires one of the three
                (None, None, None) => Expression::Filter(String::new()),
            };
            run_check(
                expression,
                schema,
                backend,
                allow,
                input,
                pretty,
                ieee754_compatible,
                syntax_only,
            )
        }
    };

    if let Err(e) = result {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

#[allow(clippy::too_many_arguments)]
fn run_check(
    expression: Expression,
    schema_path: String,
    backend: String,
    allow: Option<Vec<String>>,
    input: Option<String>,
    pretty: bool,
    ieee754_compatible: bool,
    syntax_only: bool,
) -> Result<(), CliError> {
    let schema = std::fs::read_to_string(&schema_path)?;

    let input = match input {
        Some(s) => Some(s),
        None if backend == "memory" && !atty::is(atty::Stream::Stdin) => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer).map_err(CliError::Io)?;
            Some(buffer)
        }
        None => None,
    };

    let options = CheckOptions {
        expression,
        schema,
        backend,
        allow,
        input,
        ieee754_compatible,
        syntax_only,
    };

    match cli::execute_check(&options)? {
        CheckResult::SyntaxValid => println!("Syntax is valid"),
        CheckResult::Success(output) => {
            let json = if pretty { to_json_pretty(&output) } else { to_json(&output) };
            println!("{}", json);
        }
    }
    Ok(())
}
