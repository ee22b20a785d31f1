//! CLI parser
use clap::{Args, Parser};
use std::num::NonZeroU16;
use std::time::Duration;

use crate::constants::{
    DEFAULT_IMAGE_TO_IMAGE_MODEL, DEFAULT_REQUEST_TIMEOUT, DEFAULT_TEXT_TO_IMAGE_MODEL,
    DEFAULT_WORKERS_AI_BASE,
};

#[derive(Parser, Debug)]
/// CLI Options
pub struct CliOptions {
    #[clap(long, help = "Enable debug logging", env = "DELTAIMAGE_DEBUG")]
    /// Enable debug logging. Env: DELTAIMAGE_DEBUG
    pub debug: bool,
    #[clap(long, short, default_value = "8787", env = "DELTAIMAGE_PORT")]
    /// http listener, defaults to `8787`.
    /// Env: DELTAIMAGE_PORT
    pub port: NonZeroU16,
    #[clap(
        long,
        short,
        default_value = "127.0.0.1",
        env = "DELTAIMAGE_LISTEN_ADDRESS"
    )]
    /// Listen address, defaults to `127.0.0.1`.
    /// Env: DELTAIMAGE_LISTEN_ADDRESS
    pub listen_address: String,

    #[clap(
        long,
        short,
        default_value = "deltaimage.sqlite",
        env = "DELTAIMAGE_DATABASE_PATH"
    )]
    /// Path to the database file holding the latest image, eg `/data/deltaimage.sqlite`.
    /// Env: DELTAIMAGE_DATABASE_PATH
    pub database_path: String,

    #[clap(long, env = "DELTAIMAGE_MEMORY_STORE")]
    /// Keep the latest image in memory only, it's lost on restart.
    /// Env: DELTAIMAGE_MEMORY_STORE
    pub memory_store: bool,

    #[clap(flatten)]
    /// Workers AI connection settings
    pub workers_ai: WorkersAiOptions,
}

/// Options for talking to Cloudflare Workers AI, shared with the render tool.
#[derive(Args, Debug, Clone)]
pub struct WorkersAiOptions {
    /// Cloudflare account id. Env: CLOUDFLARE_ACCOUNT_ID
    #[arg(long, env = "CLOUDFLARE_ACCOUNT_ID")]
    pub account_id: String,

    /// Workers AI API token. Env: CLOUDFLARE_API_TOKEN
    #[arg(long, env = "CLOUDFLARE_API_TOKEN", hide_env_values = true)]
    pub api_token: String,

    /// REST API base URL. Env: DELTAIMAGE_API_BASE
    #[arg(long, default_value = DEFAULT_WORKERS_AI_BASE, env = "DELTAIMAGE_API_BASE")]
    pub api_base: String,

    /// Text-to-image model. Env: DELTAIMAGE_TEXT_MODEL
    #[arg(long, default_value = DEFAULT_TEXT_TO_IMAGE_MODEL, env = "DELTAIMAGE_TEXT_MODEL")]
    pub text_model: String,

    /// Image-to-image model. Env: DELTAIMAGE_IMG2IMG_MODEL
    #[arg(long, default_value = DEFAULT_IMAGE_TO_IMAGE_MODEL, env = "DELTAIMAGE_IMG2IMG_MODEL")]
    pub img2img_model: String,

    /// Timeout for a single model call, in seconds. Env: DELTAIMAGE_REQUEST_TIMEOUT
    #[arg(
        long,
        default_value_t = DEFAULT_REQUEST_TIMEOUT.as_secs(),
        env = "DELTAIMAGE_REQUEST_TIMEOUT"
    )]
    pub request_timeout: u64,
}

impl WorkersAiOptions {
    /// Model call timeout as a [Duration]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }
}
