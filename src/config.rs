/*!
Structs to hold configuration data and global variables.
*/
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use time::Duration;

use crate::{
    session::SessionStore,
    store::{Backend, memory::MemoryBackend, rest::RestBackend},
};

/// Ten years.
const MAX_SESSION_DAYS: i64 = 3650;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    Rest,
    Memory,
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rest" => Ok(BackendKind::Rest),
            "memory" => Ok(BackendKind::Memory),
            _ => Err(format!("{:?} is not a backend kind (expected \"rest\" or \"memory\").", s)),
        }
    }
}

#[derive(Deserialize)]
struct ConfigFile {
    backend: Option<String>,
    backend_url: Option<String>,
    login_path: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    templates: Option<String>,
    static_dir: Option<String>,
    dev_bypass: Option<bool>,
    session_days: Option<i64>,
}

#[derive(Debug)]
pub struct Cfg {
    pub backend: BackendKind,
    pub backend_url: String,
    pub login_path: String,
    pub addr: SocketAddr,
    pub templates_dir: PathBuf,
    pub static_dir: PathBuf,
    /// Accept `admin`/`admin` without asking the backend.
    pub dev_bypass: bool,
    pub session_lifetime: Duration,
}

impl std::default::Default for Cfg {
    fn default() -> Self {
        Self {
            backend: BackendKind::Rest,
            backend_url: "http://localhost:8080".to_owned(),
            login_path: "/api/utilisateur/login".to_owned(),
            addr: SocketAddr::from(([0, 0, 0, 0], 8001)),
            templates_dir: PathBuf::from("templates/"),
            static_dir: PathBuf::from("static/"),
            dev_bypass: cfg!(debug_assertions),
            session_lifetime: Duration::days(7),
        }
    }
}

impl Cfg {
    pub fn from_toml(text: &str) -> Result<Self, String> {
        let cf: ConfigFile = toml::from_str(text)
            .map_err(|e| format!("Unable to deserialize config file: {}", &e))?;

        let mut c = Self::default();

        if let Some(s) = cf.backend {
            c.backend = s.parse()?;
        }
        if let Some(s) = cf.backend_url {
            c.backend_url = s;
        }
        if let Some(s) = cf.login_path {
            if !s.starts_with('/') {
                return Err(format!("login_path {:?} must start with '/'.", &s));
            }
            c.login_path = s;
        }
        if let Some(s) = cf.host {
            c.addr.set_ip(
                s.parse().map_err(|e| format!(
                    "Error parsing {:?} as IP address: {}",
                    &s, &e
                ))?
            );
        }
        if let Some(n) = cf.port {
            c.addr.set_port(n);
        }
        if let Some(s) = cf.templates {
            c.templates_dir = PathBuf::from(s);
        }
        if let Some(s) = cf.static_dir {
            c.static_dir = PathBuf::from(s);
        }
        if let Some(b) = cf.dev_bypass {
            c.dev_bypass = b;
        }
        if let Some(n) = cf.session_days {
            if !(1..=MAX_SESSION_DAYS).contains(&n) {
                return Err(format!(
                    "session_days must be between 1 and {} (got {}).",
                    MAX_SESSION_DAYS, n
                ));
            }
            c.session_lifetime = Duration::days(n);
        }

        Ok(c)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let path = path.as_ref();
        let file_contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Unable to read config file: {}", &e))?;
        Cfg::from_toml(&file_contents)
    }
}

/**
This guy will haul around some global variables and be passed in an
`axum::Extension` to the handlers who need him.
*/
#[derive(Debug)]
pub struct Glob {
    backend: Arc<dyn Backend>,
    pub sessions: SessionStore,
    pub dev_bypass: bool,
    pub addr: SocketAddr,
}

impl Glob {
    pub fn new(backend: Arc<dyn Backend>, cfg: &Cfg) -> Self {
        Self {
            backend,
            sessions: SessionStore::new(cfg.session_lifetime),
            dev_bypass: cfg.dev_bypass,
            addr: cfg.addr,
        }
    }

    /// A handle on the backend that outlives the lock on `self`.
    pub fn backend(&self) -> Arc<dyn Backend> { self.backend.clone() }
}

/// Build the backend `cfg` asks for.
pub fn make_backend(cfg: &Cfg) -> Arc<dyn Backend> {
    match cfg.backend {
        BackendKind::Rest => Arc::new(RestBackend::new(&cfg.backend_url, &cfg.login_path)),
        BackendKind::Memory => Arc::new(MemoryBackend::seeded(&cfg.login_path)),
    }
}

/// Reads the configuration file (if there is one) and sets up global state.
pub fn load_configuration<P: AsRef<Path>>(path: P) -> Result<(Cfg, Glob), String> {
    let path = path.as_ref();

    let cfg = if path.exists() {
        Cfg::from_file(path)?
    } else {
        log::warn!("No config file at {}; using defaults.", path.display());
        Cfg::default()
    };
    log::info!("Configuration:\n{:#?}", &cfg);

    if cfg.dev_bypass {
        log::warn!("Development login bypass is enabled.");
    }

    let glob = Glob::new(make_backend(&cfg), &cfg);
    Ok((cfg, glob))
}
