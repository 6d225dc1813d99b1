use anyhow::{bail, Context, Result};
use proxy_toggler_lib::core::config::loader;
use proxy_toggler_lib::core::sysproxy::ProxySession;
use proxy_toggler_lib::events::{set_global_event_bus, TracingEventBus};
use proxy_toggler_lib::logging;
use std::path::PathBuf;
use std::sync::Arc;

/// `proxy-toggler [--config-dir <dir>] [port]`
#[derive(Debug, Default, PartialEq)]
struct CliArgs {
    config_dir: Option<PathBuf>,
    port: Option<u16>,
}

impl CliArgs {
    fn parse<I: IntoIterator<Item = String>>(args: I) -> Result<Self> {
        let mut out = Self::default();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            if arg == "--config-dir" {
                let dir = args.next().context("--config-dir needs a directory")?;
                out.config_dir = Some(PathBuf::from(dir));
            } else if out.port.is_none() {
                let port = arg
                    .parse::<u16>()
                    .with_context(|| format!("invalid port: {arg}"))?;
                out.port = Some(port);
            } else {
                bail!("unexpected argument: {arg}");
            }
        }
        Ok(out)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = CliArgs::parse(std::env::args().skip(1))?;
    let cfg = match &args.config_dir {
        Some(dir) => loader::load_or_init_at(dir),
        None => loader::load_or_init(),
    }
    .context("load config")?;
    logging::init_logging(&cfg.logging.log_level);
    if let Err(e) = set_global_event_bus(Arc::new(TracingEventBus)) {
        tracing::warn!("{}", e);
    }

    let port = args.port.unwrap_or(cfg.toggler.port);
    let mut session = ProxySession::for_current_platform(&cfg)?;
    session
        .activate(port)
        .with_context(|| format!("apply local proxy on port {port}"))?;
    tracing::info!(port, "settings redirected, press Ctrl-C to restore");

    let waited = tokio::signal::ctrl_c().await;
    let restored = session.deactivate().context("restore proxy settings");
    waited.context("wait for Ctrl-C")?;
    restored
}
