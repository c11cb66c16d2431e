//! beacon-registry-admin CLI - Cluster onboarding
//!
//! Registers a cluster's signing key with a running registry. The key file
//! is the DER SubjectPublicKeyInfo produced by the cluster operator's key
//! ceremony; the registry binds it to the cluster id first-writer-wins.

use anyhow::{Context, bail};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "beacon-registry-admin")]
#[command(about = "Beacon Registry Administration CLI")]
struct Cli {
    /// Registry base URL
    #[arg(long, default_value = "http://localhost:8080")]
    registry_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a cluster's public signing key (first writer wins)
    RegisterCluster {
        /// Cluster id (UUID)
        #[arg(long)]
        cluster_id: String,
        /// Path to the DER-encoded P-256 SubjectPublicKeyInfo
        #[arg(long)]
        public_key: PathBuf,
    },
    /// Check service health
    Health,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::RegisterCluster {
            cluster_id,
            public_key,
        } => {
            let der = std::fs::read(&public_key)
                .with_context(|| format!("reading key file {}", public_key.display()))?;
            if !beacon::crypto::validate_public_key(&der) {
                bail!(
                    "{} is not a DER-encoded P-256 SubjectPublicKeyInfo",
                    public_key.display()
                );
            }

            let response = client
                .post(format!("{}/clusters", cli.registry_url))
                .json(&serde_json::json!({
                    "clusterId": cluster_id,
                    "publicKey": BASE64.encode(&der),
                }))
                .send()
                .await
                .context("sending registration request")?;

            match response.status().as_u16() {
                201 => println!("Created cluster {}", cluster_id),
                200 => println!("Cluster {} already registered with this key", cluster_id),
                status => {
                    let body = response.text().await.unwrap_or_default();
                    bail!("registration failed ({}): {}", status, body);
                }
            }
        }
        Commands::Health => {
            let response = client
                .get(format!("{}/health", cli.registry_url))
                .send()
                .await
                .context("sending health request")?;
            if response.status().is_success() {
                println!("healthy");
            } else {
                bail!("unhealthy: {}", response.status());
            }
        }
    }

    Ok(())
}
