//! Process-level setup and error reporting.

/// Route panics through the log before the default report.
pub fn init_panic_handling() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        tracing::error!("panic: {}", info);
        default_hook(info);
    }));
}

/// Print a failed run's error chain to stderr and exit with code 1.
pub fn handle_error(error: anyhow::Error) {
    tracing::error!("{:#}", error);
    eprintln!();
    eprintln!("Error running pssgfont:");
    eprintln!("{error}");
    for cause in error.chain().skip(1) {
        eprintln!("  caused by: {cause}");
    }
    eprintln!();
    eprintln!("Try running with --help for usage information.");
    std::process::exit(1);
}

/// Parse command line arguments, exiting with usage on failure.
pub fn get_cli_args() -> crate::core::cli::CliArgs {
    use clap::Parser;
    crate::core::cli::CliArgs::parse()
}
