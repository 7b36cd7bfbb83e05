fn main() -> anyhow::Result<()> {
    pt_cli::run()
}
