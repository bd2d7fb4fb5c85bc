// src/main.rs

use gantry::{cli, logging};

#[tokio::main]
async fn main() {
    let args = cli::parse();

    if let Err(err) = logging::init_logging(args.log_level) {
        eprintln!("gantry: failed to initialise logging: {err}");
        std::process::exit(2);
    }

    match gantry::run(args).await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("gantry: {err}");
            std::process::exit(2);
        }
    }
}
