use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use authgate::auth::{JwkCache, JwkCacheConfig, ParserRegistry};
use authgate::config::{Settings, TrustDomainFile};
use authgate::ProtectionGate;
use clap::{Parser, Subcommand};

/// Authgate - JWT verification and route authorization toolkit
#[derive(Parser, Debug)]
#[command(name = "authgate")]
#[command(version, about, long_about = None)]
struct Args {
    /// Additional trust domains declared in a YAML file
    #[arg(short, long, global = true)]
    trust_domains: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate settings from the environment and list the trust domains
    Check,
    /// Decode a token and print its normalized claims as JSON
    Decode {
        token: String,
        /// Skip signature and claim verification
        #[arg(long)]
        unverified: bool,
    },
}

fn build_gate(args: &Args) -> anyhow::Result<ProtectionGate> {
    let settings = Settings::from_env().context("Failed to load settings")?;
    let jwk_cache = Arc::new(JwkCache::new(JwkCacheConfig {
        timeout_secs: settings.jwks_timeout_secs,
    }));
    let mut registry = ParserRegistry::from_settings(&settings, Arc::clone(&jwk_cache))?;

    if let Some(path) = &args.trust_domains {
        let file = TrustDomainFile::from_file(path)
            .with_context(|| format!("Failed to load trust domains from {}", path.display()))?;
        registry.extend_from_file(&file, &jwk_cache)?;
    }

    tracing::info!(
        environment = %settings.environment,
        trust_domains = ?registry.names(),
        ignore_jwt_validation = settings.ignore_validation_active(),
        "Settings loaded successfully"
    );

    Ok(ProtectionGate::new(settings, registry))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    authgate::logging::init_subscriber()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging subsystem: {}", e))?;

    let args = Args::parse();
    let gate = build_gate(&args)?;

    match &args.command {
        Command::Check => {
            for domain in gate.registry().domains() {
                println!("{}\t{}", domain.name, domain.parser);
            }
        }
        Command::Decode { token, unverified } => {
            let token_data = if *unverified {
                gate.unverified_token_data(token)?
            } else {
                gate.verify_token(token).await?
            };
            let output = serde_json::json!({
                "scopes": token_data.scopes(),
                "claims": token_data.claims(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}
