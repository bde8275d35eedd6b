use kanbus::cli::run_from_env;

fn main() {
    if let Err(error) = run_from_env() {
        eprintln!("{}: {error}", error.kind());
        std::process::exit(1);
    }
}
