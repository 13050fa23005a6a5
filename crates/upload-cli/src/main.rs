//! Binary entrypoint; all behavior lives in the library crate.

#[tokio::main]
async fn main() {
    std::process::exit(upload_cli::run().await);
}
