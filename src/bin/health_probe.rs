//! Health probe for container health checks.
//!
//! Sends a single `GET /health` and exits 0 when the server answers 200.
//! With `REQUIRE_MODERATION_PROVIDER=true` it also exits 1 while no
//! moderation provider is enabled, so deployments that must never run in
//! degraded mode can gate on it.
//!
//! Environment variables (optional):
//!   HTTP_PORT_API                default 8081
//!   HOST                         default localhost
//!   HEALTH_PATH                  default /health
//!   REQUIRE_MODERATION_PROVIDER  default false

use ::std::{env, process::exit, time::Duration};

#[derive(::serde::Deserialize)]
struct Health {
    #[serde(default)]
    moderation_providers: usize,
}

#[tokio::main]
async fn main() {
    let port = env::var("HTTP_PORT_API").unwrap_or_else(|_| "8081".into());
    let host = env::var("HOST").unwrap_or_else(|_| "localhost".into());
    let path = env::var("HEALTH_PATH").unwrap_or_else(|_| "/health".into());
    let require_provider = env::var("REQUIRE_MODERATION_PROVIDER")
        .map(|value| value.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    let url = format!("http://{host}:{port}{path}");

    let client = match ::reqwest::Client::builder()
        .timeout(Duration::from_secs(3))
        .build()
    {
        Ok(client) => client,
        Err(err) => {
            eprintln!("Failed to build client: {err}");
            exit(1);
        }
    };

    let response = match client.get(&url).send().await {
        Ok(response) => response,
        Err(err) => {
            eprintln!("Request error: {err}");
            exit(1);
        }
    };

    if response.status() != 200 {
        eprintln!("Unhealthy: {}", response.status());
        exit(1);
    }

    if require_provider {
        let body = response.text().await.unwrap_or_default();
        match ::serde_json::from_str::<Health>(&body) {
            Ok(health) if health.moderation_providers > 0 => {}
            Ok(_) => {
                eprintln!("Unhealthy: no moderation provider enabled");
                exit(1);
            }
            Err(err) => {
                eprintln!("Unreadable health body: {err}");
                exit(1);
            }
        }
    }

    println!("Health OK");
    exit(0);
}
