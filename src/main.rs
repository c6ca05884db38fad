//! WAF Audit
//!
//! Checks that every watched load balancer is associated with a WAF Regional
//! web ACL and alerts Slack when some are not. One invocation, one audit run.
//!
//! # Usage
//! ```bash
//! # KMS-encrypted config from S3 (pre-signed URL)
//! CONFIG_FILE=https://bucket.s3.amazonaws.com/waf-audit.enc waf-audit
//!
//! # Plaintext local config, named profile
//! waf-audit --config-file ./config.json --decryption none --aws-profile audit
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

use waf_audit::orchestrator::{handler, DecryptionMode, Settings};

// ============================================================
// CLI Definition
// ============================================================

#[derive(Parser, Debug)]
#[command(name = "waf-audit")]
#[command(about = "Audit load balancers for missing WAF associations", long_about = None)]
#[command(version)]
struct Cli {
    /// Config location: http(s)/ftp URL or filesystem path
    #[arg(long, env = "CONFIG_FILE")]
    config_file: Option<String>,

    /// How the config file is decrypted
    #[arg(long, value_enum, default_value = "kms", env = "CONFIG_DECRYPTION")]
    decryption: DecryptionMode,

    /// Named AWS profile (overrides the config file)
    #[arg(long, env = "AWS_PROFILE")]
    aws_profile: Option<String>,

    /// AWS region (overrides the config file)
    #[arg(long, env = "AWS_REGION")]
    aws_region: Option<String>,

    /// Invocation event as JSON
    #[arg(long, default_value = "{}")]
    event: String,

    /// Emit JSON log lines
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

// ============================================================
// Main Entry Point
// ============================================================

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    if cli.log_json {
        builder.json().init();
    } else {
        builder.init();
    }

    let event: serde_json::Value =
        serde_json::from_str(&cli.event).context("--event is not valid JSON")?;

    let settings = Settings {
        config_file: cli.config_file,
        decryption: cli.decryption,
        aws_profile: cli.aws_profile,
        aws_region: cli.aws_region,
    };

    info!("WAF audit starting...");
    let result = handler(event, serde_json::json!({}), &settings).await;

    println!("{}", serde_json::to_string(&result)?);

    if result.is_error() {
        std::process::exit(1);
    }
    Ok(())
}
