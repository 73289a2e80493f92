use clap::Parser;

fn main() -> anyhow::Result<()> {
    let cfg = keyfob::config::Config::parse();
    if cfg.wipe {
        keyfob::wipe(&cfg)?;
        return Ok(());
    }
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(keyfob::run(cfg))?;
    Ok(())
}
