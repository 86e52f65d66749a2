use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "random-cli")]
#[command(about = "Client for the random number gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    #[arg(short, long, default_value = "http://localhost:9090")]
    metrics_url: String,

    /// Sent as x-request-id so the call can be found in the service logs
    #[arg(short, long)]
    request_id: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask the gateway for a random number
    Random {
        #[arg(short, long)]
        seed: i64,
    },
    /// Dump the Prometheus exposition
    Metrics,
    /// Check gateway and exposition liveness
    Health,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    if let Some(id) = &cli.request_id {
        headers.insert("x-request-id", HeaderValue::from_str(id)?);
    }

    match cli.command {
        Commands::Random { seed } => {
            let res = client
                .get(format!("{}/random", cli.url))
                .query(&[("seed", seed)])
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Metrics => {
            let res = client.get(format!("{}/metrics", cli.metrics_url)).send().await?;
            print_response(res).await?;
        }
        Commands::Health => {
            for base in [&cli.url, &cli.metrics_url] {
                let target = format!("{base}/healthz");
                match client.get(&target).headers(headers.clone()).send().await {
                    Ok(res) => println!("{target}: {}", res.status()),
                    Err(e) => println!("{target}: unreachable ({e})"),
                }
            }
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    if !status.is_success() {
        eprintln!("Error: server returned status {}", status);
        eprintln!("Response: {}", text.trim());
        return Ok(());
    }

    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => print!("{text}"),
    }
    Ok(())
}
