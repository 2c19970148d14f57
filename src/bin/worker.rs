#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = stutrack_grader::run_worker().await {
        eprintln!("stutrack-grader fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
