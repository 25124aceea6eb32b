use clap::Parser;
use figspec::cli::{error_exit_code, Cli};

fn main() {
    let cli = Cli::parse();
    cli.init_logging();

    let code = match cli.execute() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            error_exit_code(&err)
        }
    };
    std::process::exit(code);
}
