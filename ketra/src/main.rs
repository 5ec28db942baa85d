use clap::Parser;
use ketra::Cli;

fn main() {
    let cli = Cli::parse();
    ketra_rt::logging::init_tracing(if cli.verbose { "ketra=debug" } else { "ketra=warn" });

    if let Err(err) = ketra::run(cli) {
        eprintln!("ketra: {err:#}");
        std::process::exit(1);
    }
}
