//! palank-chatbot CLI 진입점

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use palank_chatbot::config::Settings;

fn main() -> Result<()> {
    let cli = palank_chatbot::cli::Cli::parse();
    let settings = Settings::from_env()?.with_debug(cli.debug);

    // 로깅 초기화 (--debug 또는 PALANK_DEBUG면 DEBUG, RUST_LOG가 우선)
    let filter = EnvFilter::builder()
        .with_default_directive(settings.log_level().into())
        .from_env_lossy();
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(palank_chatbot::cli::run(cli, settings))
}
