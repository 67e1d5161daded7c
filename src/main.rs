use std::path::PathBuf;

fn main() {
    // Pick up BANK_STORE_* overrides from a local .env during development.
    dotenvy::dotenv().ok();
    bank_store::logging::init();

    let config_file = std::env::args_os().nth(1).map(PathBuf::from);

    if let Err(e) = bank_store::run(config_file.as_deref()) {
        tracing::error!(error = %e, "Failed to open store");
        std::process::exit(1);
    }
}
