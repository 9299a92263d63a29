use clap::Parser;
use std::path::PathBuf;

use crate::codec::DEFAULT_MAX_FRAME_SIZE;

pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 6379;
pub const DEFAULT_AOF_PATH: &str = "appendonly.aof";

#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "aofkv", version, about)]
pub struct Config {
    /// The address to listen on
    #[arg(short, long, env = "AOFKV_BIND", default_value = DEFAULT_BIND)]
    pub bind: String,

    /// The port to listen on
    #[arg(short, long, env = "AOFKV_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// The append-only file, replayed on startup and appended to on every write
    #[arg(long, env = "AOFKV_AOF_PATH", default_value = DEFAULT_AOF_PATH)]
    pub aof_path: PathBuf,

    /// The largest request frame accepted, in bytes
    #[arg(long, env = "AOFKV_MAX_FRAME_SIZE", default_value_t = DEFAULT_MAX_FRAME_SIZE)]
    pub max_frame_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind: DEFAULT_BIND.to_string(),
            port: DEFAULT_PORT,
            aof_path: PathBuf::from(DEFAULT_AOF_PATH),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags() {
        let config = Config::try_parse_from([
            "aofkv",
            "--port",
            "7000",
            "--aof-path",
            "/tmp/data.aof",
            "--max-frame-size",
            "1024",
        ])
        .unwrap();

        assert_eq!(config.port, 7000);
        assert_eq!(config.aof_path, PathBuf::from("/tmp/data.aof"));
        assert_eq!(config.max_frame_size, 1024);
    }

    #[test]
    fn invalid_port() {
        assert!(Config::try_parse_from(["aofkv", "--port", "not-a-port"]).is_err());
    }
}
