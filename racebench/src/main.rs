fn main() {
    if let Err(e) = racebench::run() {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}
