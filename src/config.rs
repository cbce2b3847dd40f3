use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Server options; every flag can also be set through its environment variable.
#[derive(Parser, Debug, Clone)]
#[command(name = "filebox", about = "Multi-user file storage server")]
pub struct ServerConfig {
    #[arg(long, env = "FILEBOX_BIND", default_value = "0.0.0.0", help = "Bind address")]
    pub bind: String,

    #[arg(short, long, env = "PORT", default_value_t = 3000, help = "HTTP port")]
    pub port: u16,

    #[arg(
        long,
        env = "FILEBOX_DATA_DIR",
        default_value = "data",
        help = "Directory holding users.json and files.json"
    )]
    pub data_dir: PathBuf,

    #[arg(
        long,
        env = "FILEBOX_UPLOAD_DIR",
        default_value = "uploads",
        help = "Directory uploaded files are stored in"
    )]
    pub upload_dir: PathBuf,

    #[arg(
        long,
        env = "FILEBOX_SESSION_TTL_SECS",
        default_value_t = 24 * 60 * 60,
        help = "Session lifetime in seconds"
    )]
    pub session_ttl_secs: u64,

    #[arg(
        long,
        env = "FILEBOX_SESSION_PRUNE_SECS",
        default_value_t = 300,
        help = "Interval between expired-session sweeps"
    )]
    pub session_prune_secs: u64,

    #[arg(
        long,
        env = "FILEBOX_MAX_UPLOAD_BYTES",
        default_value_t = 100 * 1024 * 1024,
        help = "Maximum request body size for uploads"
    )]
    pub max_upload_bytes: usize,

    #[arg(
        long,
        env = "FILEBOX_BCRYPT_COST",
        default_value_t = bcrypt::DEFAULT_COST,
        help = "bcrypt work factor for password hashes"
    )]
    pub bcrypt_cost: u32,
}

impl ServerConfig {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn session_prune_interval(&self) -> Duration {
        Duration::from_secs(self.session_prune_secs.max(1))
    }
}
