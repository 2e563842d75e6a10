use clap::Parser;
use miette::Result;
use qcheck::cli::{Cli, Commands};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() -> Result<()> {
    // Reset SIGPIPE to default behavior so piping to `head` exits quietly
    #[cfg(unix)]
    {
        unsafe {
            libc::signal(libc::SIGPIPE, libc::SIG_DFL);
        }
    }
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .tab_width(4)
                .build(),
        )
    }))?;

    let cli = Cli::parse();
    let global = cli.global;

    let default_level = if global.verbose { "qcheck=debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_env("QCHECK_LOG").unwrap_or_else(|_| default_level.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Eval(args) => qcheck::cli::commands::eval::run(args, &global),
        Commands::Check(args) => qcheck::cli::commands::check::run(args, &global),
        Commands::Tol(args) => qcheck::cli::commands::tol::run(args, &global),
        Commands::Validate(args) => qcheck::cli::commands::validate::run(args, &global),
        Commands::Completions(args) => qcheck::cli::commands::completions::run(args),
    }
}
