use clap::Parser;
use mcproc::cli::{output, Cli};

fn main() {
    let cli = Cli::parse();
    if let Err(e) = cli.run() {
        output::print_error(&e.to_string());
        std::process::exit(1);
    }
}
