use clap::Parser;
use ketra_drv::Cli;

fn main() {
    let cli = Cli::parse();
    ketra_rt::logging::init_tracing(if cli.verbose { "ketra=debug" } else { "ketra=warn" });

    if let Err(err) = ketra_drv::run(cli) {
        eprintln!("ketrac: {err}");
        std::process::exit(1);
    }
}
