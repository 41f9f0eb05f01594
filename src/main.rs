use clap::Parser;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use yamlenv::cli::args::Cli;
use yamlenv::cli::commands::execute_command;
use yamlenv::cli::output;

fn main() {
    let cli = Cli::parse();

    setup_logging(cli.debug);

    if let Err(e) = execute_command(&cli) {
        // alerts already reached the terminal
        if !e.is_reported() {
            output::error(&e);
        }
        std::process::exit(e.exit_code());
    }
}

/// `-d` flags pick the level; without them `RUST_LOG` applies, defaulting to warnings.
fn setup_logging(verbosity: u8) {
    let level = match verbosity {
        0 => None,
        1 => Some(LevelFilter::INFO),
        2 => Some(LevelFilter::DEBUG),
        3 => Some(LevelFilter::TRACE),
        _ => {
            eprintln!("Don't be crazy, max is -d -d -d");
            Some(LevelFilter::TRACE)
        }
    };
    let env_filter = match level {
        Some(level) => EnvFilter::default().add_directive(level.into()),
        None => EnvFilter::builder()
            .with_default_directive(LevelFilter::WARN.into())
            .from_env_lossy(),
    };

    // the selector UI logs every redraw
    let noisy_modules = ["skim", "tuikit"];
    let module_filter = filter_fn(move |metadata| {
        !noisy_modules
            .iter()
            .any(|name| metadata.target().starts_with(name))
    });

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_filter(env_filter)
        .with_filter(module_filter);

    tracing_subscriber::registry().with(fmt_layer).init();

    if let Some(level) = level {
        tracing::debug!("yamlenv logging at {}", level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use yamlenv::util::testing;

    #[test]
    fn given_cli_definition_when_asserting_then_is_consistent() {
        testing::init_test_setup();
        Cli::command().debug_assert();
    }
}
