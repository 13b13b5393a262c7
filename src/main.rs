/*!
Here we go!
*/
use std::sync::Arc;

use simplelog::{ColorChoice, TerminalMode, TermLogger};
use tokio::sync::RwLock;

use tcm::{config, inter};

const DEFAULT_CONFIG: &str = "tcm.toml";

/// How often expired sessions get swept out.
const PURGE_INTERVAL: std::time::Duration = std::time::Duration::from_secs(60 * 60);

async fn run() -> Result<(), String> {
    let cfg_path = std::env::args().nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG.to_owned());
    let (cfg, glob) = config::load_configuration(&cfg_path)?;

    inter::init(&cfg.templates_dir)?;
    log::info!("Templates loaded from {}.", cfg.templates_dir.display());

    let glob = Arc::new(RwLock::new(glob));

    let sweeper = glob.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            interval.tick().await;
            let n = sweeper.write().await.sessions.purge(time::OffsetDateTime::now_utc());
            if n > 0 {
                log::debug!("Purged {} expired sessions.", n);
            }
        }
    });

    let app = inter::router(glob, &cfg.static_dir);

    log::info!("Listening on {}", &cfg.addr);
    axum::Server::try_bind(&cfg.addr)
        .map_err(|e| format!("Unable to bind {}: {}", &cfg.addr, &e))?
        .serve(app.into_make_service())
        .await
        .map_err(|e| format!("Server error: {}", &e))
}

#[tokio::main]
async fn main() {
    let log_cfg = simplelog::ConfigBuilder::new()
        .add_filter_allow_str("tcm")
        .build();
    if let Err(e) = TermLogger::init(
        tcm::log_level_from_env(),
        log_cfg,
        TerminalMode::Stdout,
        ColorChoice::Auto
    ) {
        eprintln!("Unable to start logging: {}", &e);
    }
    log::info!("Logging started.");

    if let Err(e) = run().await {
        log::error!("{}", &e);
        eprintln!("{}", &e);
        std::process::exit(1);
    }
}
