use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Operator CLI for the resilient gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8000")]
    url: String,

    /// Print raw JSON instead of a table.
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the gateway is up
    Status,
    /// Show every upstream's circuit breaker
    Health,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Status => {
            let res = client.get(format!("{}/status", cli.url)).send().await?;
            if let Some(json) = read_json(res).await? {
                println!("{}", serde_json::to_string_pretty(&json)?);
            }
        }
        Commands::Health => {
            let res = client.get(format!("{}/health", cli.url)).send().await?;
            if let Some(json) = read_json(res).await? {
                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&json)?);
                } else {
                    print_circuits(&json);
                }
            }
        }
    }

    Ok(())
}

async fn read_json(res: reqwest::Response) -> Result<Option<Value>, Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: gateway returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(None);
    }
    Ok(Some(res.json().await?))
}

fn print_circuits(health: &Value) {
    println!("{}", health["status"].as_str().unwrap_or("unknown"));

    let Some(circuits) = health["circuits"].as_object() else {
        println!("no circuits reported");
        return;
    };

    println!(
        "{:<12} {:<9} {:>8} {:>8} {:>8} {:>8} {:>8}",
        "UPSTREAM", "STATE", "OK", "FAIL", "TIMEOUT", "REJECT", "FAIL%"
    );
    for (name, circuit) in circuits {
        let stats = &circuit["stats"];
        let count = |field: &str| stats[field].as_u64().unwrap_or(0);
        println!(
            "{:<12} {:<9} {:>8} {:>8} {:>8} {:>8} {:>7.1}%",
            name,
            circuit["status"].as_str().unwrap_or("?"),
            count("successes"),
            count("failures"),
            count("timeouts"),
            count("rejects"),
            circuit["failurePercentage"].as_f64().unwrap_or(0.0),
        );
    }
}
