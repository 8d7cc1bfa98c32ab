fn main() {
    if let Err(err) = pos_cleaner::run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
