fn main() {
    if let Err(err) = rulecast::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
