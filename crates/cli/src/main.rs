fn main() {
    if let Err(e) = portico_cli::run() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
