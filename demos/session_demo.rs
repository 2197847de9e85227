//! Session lifecycle example
//!
//! Usage:
//!   TRAVELCOMPANION_USERNAME=ada TRAVELCOMPANION_PASSWORD=secret \
//!     cargo run --example session_demo

use std::sync::Arc;
use travelcompanion_rs_client::{ApiClient, AuthClientConfig, AuthClientHttp, FileStorage, TokenStore};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AuthClientConfig::from_env()?;
    let session_file = FileStorage::default_path()?;

    println!("=== TravelCompanion Client Example ===");
    println!("API: {}", config.base_url);
    println!("Session file: {}", session_file.display());
    println!();

    // Restore whatever session the last run left behind
    let store = Arc::new(TokenStore::hydrate(Arc::new(FileStorage::open(&session_file)?)));
    let auth = AuthClientHttp::new(config.clone(), Arc::clone(&store))?;

    if store.is_authenticated() {
        println!("✓ Restored session from disk");
    } else {
        let username = std::env::var("TRAVELCOMPANION_USERNAME").unwrap_or_default();
        let password = std::env::var("TRAVELCOMPANION_PASSWORD").unwrap_or_default();
        println!("Logging in as {username:?}...");
        auth.login(&username, &password).await?;
        println!("✓ Logged in");
    }
    println!(
        "  Access token expires within 60s: {}",
        store.token_will_expire_soon(60)
    );
    println!();

    let api = ApiClient::new(config, auth)?;

    // Requests refresh the access token inline when it is about to expire
    match api
        .execute::<serde_json::Value>(api.get("itineraries/"))
        .await
    {
        Ok(itineraries) => println!("✓ Itineraries: {itineraries}"),
        Err(e) => println!("! Failed to list itineraries: {e}"),
    }

    if std::env::var("TRAVELCOMPANION_LOGOUT").is_ok() {
        api.auth().logout();
        println!("✓ Logged out, session file cleared");
    }

    Ok(())
}
