//! CLI command implementations

use std::path::{Path, PathBuf};

use anyhow::Context;
use grove_core::{CancellationFlag, ParseOptions, SafeResult};
use serde::Serialize;

use crate::ParseArgs;

/// `grove.toml` from the repository, then the command-line flags on top.
fn merge_options(repo: &Path, args: ParseArgs) -> anyhow::Result<ParseOptions> {
    let mut options = ParseOptions::load(repo)?;

    options.include_node_modules |= args.include_node_modules;
    options.include_tests |= args.include_tests;
    options.include_type_imports |= args.include_type_imports;
    options.exclude_patterns.extend(args.exclude);
    if args.max_depth.is_some() {
        options.max_depth = args.max_depth;
    }
    if args.language.is_some() {
        options.language = args.language;
    }
    if args.jobs.is_some() {
        options.jobs = args.jobs;
    }
    if args.timeout.is_some() {
        options.timeout_secs = args.timeout;
    }
    if args.php_bin.is_some() {
        options.php_binary = args.php_bin;
    }
    if args.ruby_bin.is_some() {
        options.ruby_binary = args.ruby_bin;
    }
    if args.php_autoload.is_some() {
        options.php_parser_autoload = args.php_autoload;
    }

    Ok(options)
}

fn emit<T: Serialize>(value: &T, pretty: bool, output: Option<&Path>) -> anyhow::Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };

    match output {
        Some(path) => {
            std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
            tracing::info!("Wrote graph to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

pub async fn parse(
    root: PathBuf,
    args: ParseArgs,
    safe: bool,
    pretty: bool,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let options = match merge_options(&root, args) {
        Ok(options) => options,
        Err(e) if safe => {
            return emit(&SafeResult::<()>::failure(e.to_string()), pretty, output.as_deref());
        }
        Err(e) => return Err(e),
    };

    let cancel = CancellationFlag::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling parse");
            on_interrupt.cancel();
        }
    });

    tracing::info!("Parsing repository: {}", root.display());
    let result = grove_indexer::parse_code_graph_async(root, options, cancel).await;

    if safe {
        return emit(&SafeResult::from(result), pretty, output.as_deref());
    }
    let schema = result?;
    emit(&schema, pretty, output.as_deref())
}

pub fn detect(root: PathBuf, safe: bool) -> anyhow::Result<()> {
    if safe {
        return emit(&grove_indexer::detect_language_safe(&root), false, None);
    }

    let language = grove_indexer::detect_language(&root)?;
    println!("{language}");
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProbeReport {
    php: bool,
    php_parser: bool,
    ruby: bool,
    ruby_parser_gem: bool,
}

pub fn probe() -> anyhow::Result<()> {
    let report = ProbeReport {
        php: grove_indexer::is_php_available(),
        php_parser: grove_indexer::has_php_parser(),
        ruby: grove_indexer::is_ruby_available(),
        ruby_parser_gem: grove_indexer::has_parser_gem(),
    };
    emit(&report, true, None)
}
