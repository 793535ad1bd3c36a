fn main() {
    if let Err(e) = hallway_ingest::run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
