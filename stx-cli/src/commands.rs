//! CLI command implementations

use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;
use stx_auth::{Client, GatewayConfig, KeyResolutionMethod, TokenExchangeRequest};
use tracing::{debug, info};

/// Arguments of the `exchange` command
pub struct ExchangeArgs {
    pub config: PathBuf,
    pub domain: String,
    pub client: String,
    pub subject_token: String,
    pub subject_token_type: String,
    pub requested_token_type: Option<String>,
}

/// Run one exchange and print the result or the OAuth2 error body
///
/// Returns `false` when the exchange was rejected.
pub async fn execute_exchange(args: ExchangeArgs) -> Result<bool> {
    let config = GatewayConfig::load(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;
    let gateway = config.build().await?;

    let domain = gateway
        .domain(&args.domain)
        .ok_or_else(|| anyhow!("Unknown domain: {}", args.domain))?;

    let mut request = TokenExchangeRequest::new(args.subject_token, args.subject_token_type);
    request.requested_token_type = args.requested_token_type;

    debug!(domain = %domain.id, client_id = %args.client, "Running exchange");

    match gateway
        .exchange(&request, &Client::new(args.client), &domain.id)
        .await
    {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(true)
        }
        Err(e) => {
            println!("{}", serde_json::to_string_pretty(&e.to_response())?);
            Ok(false)
        }
    }
}

/// Validate configuration and pre-build PEM verification engines
///
/// JWKS issuers are only checked for shape; no network calls are made.
/// Returns `false` when any trusted issuer fails to load.
pub async fn execute_check_config(path: PathBuf) -> Result<bool> {
    let config = GatewayConfig::load(&path)
        .with_context(|| format!("Failed to load {}", path.display()))?;
    let gateway = config.build().await?;

    let mut healthy = true;
    for domain in gateway.domains() {
        let Some(settings) = &domain.token_exchange else {
            println!("✓ {}: token exchange not configured", domain.id);
            continue;
        };

        println!(
            "✓ {}: enabled={}, subject token types={}",
            domain.id,
            settings.enabled,
            settings.allowed_subject_token_types.len()
        );

        for trusted_issuer in &settings.trusted_issuers {
            if trusted_issuer.key_resolution_method != KeyResolutionMethod::Pem {
                println!(
                    "  - {} ({}): not fetched",
                    trusted_issuer.issuer, trusted_issuer.key_resolution_method
                );
                continue;
            }

            match gateway.resolver.engine_for(trusted_issuer).await {
                Ok(engine) => println!(
                    "  ✓ {} (PEM): {} key(s)",
                    engine.issuer(),
                    engine.key_count()
                ),
                Err(e) => {
                    healthy = false;
                    println!("  ✗ {} (PEM): {}", trusted_issuer.issuer, e);
                }
            }
        }
    }

    info!(path = %path.display(), healthy, "Configuration checked");
    Ok(healthy)
}
