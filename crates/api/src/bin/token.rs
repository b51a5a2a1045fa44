//! Mint a bearer token for the Herald API.
//!
//! ```bash
//! JWT_SECRET=... cargo run --bin herald-token -- billing-service
//! ```
//!
//! The subject defaults to `herald-cli`. Expiry follows `JWT_EXPIRY_HOURS`.

use herald_api::middleware::auth::encode_jwt;

const DEFAULT_SUBJECT: &str = "herald-cli";

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let secret = std::env::var("JWT_SECRET")
        .map_err(|_| anyhow::anyhow!("JWT_SECRET environment variable is required"))?;
    let expiry_hours: u64 = std::env::var("JWT_EXPIRY_HOURS")
        .unwrap_or_else(|_| "24".to_string())
        .parse()
        .map_err(|_| anyhow::anyhow!("JWT_EXPIRY_HOURS must be a valid u64"))?;
    let subject = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_SUBJECT.to_string());

    let token = encode_jwt(&subject, &secret, expiry_hours)?;
    println!("{token}");
    Ok(())
}
