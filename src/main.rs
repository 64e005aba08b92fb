fn main() {
    if let Err(err) = koala_diff::run() {
        // Alternate form prints the whole context chain.
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
