use std::io::Read;

use tracing::Level;

use eel::cli::{self, CliArgs, ConfigFile, Template};
use eel::{BoxError, Context, Expression, SymbolsTable};

#[tokio::main]
async fn main() {
    let args = match cli::parse_args() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("eel: {e}");
            eprintln!("{}", cli::USAGE);
            std::process::exit(1);
        }
    };

    // ── Logging ───────────────────────────────────────────────────────────────
    let level = if args.debug { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match run(args).await {
        Ok(text) => println!("{text}"),
        Err(e) => {
            eprintln!("eel: {e}");
            std::process::exit(1);
        }
    }
}

async fn run(args: CliArgs) -> Result<String, BoxError> {
    let context = context(&args)?;

    let expression = match &args.template {
        Template::Arg(text) => Expression::compile(&args.source(text), &context)?,
        Template::Stdin => {
            let stdin = std::io::stdin().lock();
            if args.expression {
                let wrapped = "$(".as_bytes().chain(stdin).chain(")".as_bytes());
                Expression::compile_reader(wrapped, &context)?
            } else {
                Expression::compile_reader(stdin, &context)?
            }
        }
    };

    // ── Symbols: -D definitions first, then the environment ──────────────────
    let symbols = SymbolsTable::builder()
        .map(args.defines)
        .environment()
        .build();

    let value = expression.evaluate_async(&symbols).await?;
    Ok(value.as_text().to_owned())
}

/// Settings file first, then command-line overrides.
fn context(args: &CliArgs) -> Result<Context, BoxError> {
    let mut builder = Context::builder();

    let path = match &args.config {
        ConfigFile::Skip => None,
        ConfigFile::Explicit(path) => Some(path.clone()),
        ConfigFile::Search => cli::find_user_config(),
    };
    if let Some(path) = path {
        let (loaded, errors) = builder
            .load_file(&path)
            .map_err(|e| format!("{}: {e}", path.display()))?;
        for e in errors {
            eprintln!("eel: {}: {e}", path.display());
        }
        builder = loaded;
    }

    if let Some(t) = args.timeout {
        builder = builder.timeout(t);
    }
    if let Some(p) = args.precision {
        builder = builder.precision(p);
    }
    Ok(builder.build())
}
