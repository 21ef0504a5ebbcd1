/// CETI Health Check Client
///
/// Queries the running adjudication node's API to check liveness and the
/// invariant attestation. Lightweight CLI probe suitable for systemd
/// watchdogs, Kubernetes liveness probes, and operator scripts.
///
/// Usage:
///   ceti-healthcheck                       # default: http://127.0.0.1:8080
///   ceti-healthcheck http://10.0.0.1:8080  # custom node address
///   CETI_API_URL=http://10.0.0.1:8080 ceti-healthcheck

use std::process;

#[tokio::main]
async fn main() {
    let default_url = "http://127.0.0.1:8080".to_string();
    let base_url = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("CETI_API_URL").ok())
        .unwrap_or(default_url);

    println!("CETI Health Check");
    println!("   Node API: {}", base_url);
    println!();

    let health_url = format!("{}/health", base_url);
    let status_url = format!("{}/", base_url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(5))
        .build()
        .unwrap_or_else(|e| {
            eprintln!("Failed to create HTTP client: {}", e);
            process::exit(1);
        });

    // Liveness: can we reach the node at all?
    match client.get(&health_url).send().await {
        Ok(resp) if resp.status().is_success() => {
            println!("Liveness: ALIVE ({})", health_url);
        }
        Ok(resp) => {
            eprintln!("Liveness: DEGRADED (HTTP {})", resp.status());
        }
        Err(e) => {
            eprintln!("Liveness: UNREACHABLE - {}", e);
            eprintln!("   Is the ceti node running? Check with: ps aux | grep ceti");
            process::exit(1);
        }
    }

    // Status: invariant attestation and version.
    match client.get(&status_url).send().await {
        Ok(resp) if resp.status().is_success() => {
            match resp.json::<serde_json::Value>().await {
                Ok(status) => {
                    println!("Status: CONNECTED");
                    if let Some(version) = status.get("version").and_then(|v| v.as_str()) {
                        println!("   Version: {}", version);
                    }
                    match status.get("invariants_enforced").and_then(|v| v.as_bool()) {
                        Some(true) => println!("   Invariants: ENFORCED"),
                        _ => {
                            eprintln!("   Invariants: NOT ATTESTED");
                            process::exit(1);
                        }
                    }
                    println!();
                    println!("Node is healthy");
                }
                Err(e) => {
                    eprintln!("Status: Response parse error - {}", e);
                    process::exit(1);
                }
            }
        }
        Ok(resp) => {
            eprintln!("Status: HTTP {}", resp.status());
            process::exit(1);
        }
        Err(e) => {
            eprintln!("Status: Failed - {}", e);
            process::exit(1);
        }
    }
}
