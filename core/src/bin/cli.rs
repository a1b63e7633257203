/// CLI for querying a running ChatFlow service
fn main() -> anyhow::Result<()> {
    chatflow_core::cli_app::run(std::env::args().collect())
}
