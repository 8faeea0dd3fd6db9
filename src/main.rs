fn main() {
    if let Err(err) = onboard::cli::main() {
        eprintln!("❌ Error: {err}");
        std::process::exit(1);
    }
}
