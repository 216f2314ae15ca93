fn main() -> anyhow::Result<()> {
    starroute::cli::run_cli()
}
