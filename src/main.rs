//! kubei CLI: highly available Kubernetes clusters over SSH.

fn main() {
    let cli = kubei::cli::parse();
    if let Err(e) = kubei::logging::init(&cli.log_format, &cli.log_level) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
    if let Err(e) = kubei::cli::dispatch(cli.command) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
