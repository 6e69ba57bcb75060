//! CLI arguments and server configuration defaults.

use clap::{Parser, Subcommand};
use shadow_rs::formatcp;
use std::path::PathBuf;

use crate::build;

const VERSION_INFO: &str = formatcp!(
    r#"{}\ncommit_hash: {}\nbuild_time: {}\nbuild_env: {},{}"#,
    build::PKG_VERSION,
    build::SHORT_COMMIT,
    build::BUILD_TIME,
    build::RUST_VERSION,
    build::RUST_CHANNEL
);

pub const DEFAULT_STORAGE_DIR: &str = ".shelf/storage";
pub const DEFAULT_HTTP_PORT: u16 = 5005;
/// Base64 inflates payloads by roughly a third, so the JSON body limit has
/// to stay well above the largest raw file the deployment expects.
pub const DEFAULT_BODY_LIMIT: usize = 1024 * 1024 * 1024;
pub const DEFAULT_LOCK_WAIT_TIMEOUT_SECS: u64 = 30;
pub const STAGED_SWEEP_INTERVAL_SECS: u64 = 900;
pub const DEFAULT_STAGED_TTL_SECS: u64 = 24 * 60 * 60;
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:5005";

/// CLI arguments and environment configuration.
#[derive(Parser, Debug)]
#[command(
    name = "media-shelf",
    version = VERSION_INFO,
    about = "MediaShelf storage server and upload client"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the storage gateway server
    Serve(ServeArgs),
    /// Upload one file through a running server
    Upload(UploadArgs),
}

#[derive(clap::Args, Debug)]
pub struct ServeArgs {
    #[arg(
        short = 's',
        long,
        env = "SHELF_STORAGE_DIR",
        default_value = DEFAULT_STORAGE_DIR,
        help = "Storage directory for uploaded media"
    )]
    pub storage_dir: String,
    #[arg(
        short = 'b',
        long,
        env = "SHELF_BIND",
        default_value = "0.0.0.0",
        help = "Bind address for HTTP"
    )]
    pub host: String,
    #[arg(
        short = 'p',
        long,
        env = "SHELF_HTTP_PORT",
        default_value_t = DEFAULT_HTTP_PORT,
        help = "HTTP port"
    )]
    pub http_port: u16,
    #[arg(
        long,
        env = "SHELF_PUBLIC_BASE",
        help = "Public base URL used when issuing object URLs"
    )]
    pub public_base: Option<String>,
    #[arg(long, env = "SHELF_CORS_ORIGINS", help = "Comma separated CORS origins")]
    pub cors_origins: Option<String>,
    #[arg(
        long,
        env = "SHELF_BODY_LIMIT",
        default_value_t = DEFAULT_BODY_LIMIT,
        help = "Request body limit in bytes (base64 payloads run ~33% over raw size)"
    )]
    pub body_limit: usize,
    #[arg(
        long,
        env = "SHELF_STAGED_TTL_SECS",
        default_value_t = DEFAULT_STAGED_TTL_SECS,
        help = "Stale staged-file cleanup threshold in seconds (0 to disable)"
    )]
    pub staged_ttl_secs: u64,
}

#[derive(clap::Args, Debug)]
pub struct UploadArgs {
    #[arg(help = "File to upload")]
    pub file: PathBuf,
    #[arg(
        short = 't',
        long,
        help = "Target category (images, videos, audio, documents)"
    )]
    pub category: String,
    #[arg(
        long,
        env = "SHELF_SERVER",
        default_value = DEFAULT_SERVER_URL,
        help = "Base URL of the server"
    )]
    pub server: String,
    #[arg(long, help = "Stored name (defaults to the file name)")]
    pub name: Option<String>,
    #[arg(
        long,
        value_enum,
        help = "Resolve a duplicate name without prompting"
    )]
    pub on_conflict: Option<ConflictPolicy>,
}

/// Non-interactive answer to the duplicate-name prompt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum ConflictPolicy {
    Rename,
    Replace,
    Cancel,
}
