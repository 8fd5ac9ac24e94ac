use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "gatekeeper-cli")]
#[command(about = "Management CLI for the gatekeeper API", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:4456")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect loaded access rules
    Rules {
        #[command(subcommand)]
        command: RulesCommand,
    },
    /// Check liveness or readiness
    Health {
        #[command(subcommand)]
        command: HealthCommand,
    },
    /// Show the server version
    Version,
}

#[derive(Subcommand)]
enum RulesCommand {
    /// List rules
    List {
        #[arg(long, default_value_t = 50)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
    /// Show one rule
    Get { id: String },
}

#[derive(Subcommand)]
enum HealthCommand {
    /// Is the process up
    Alive,
    /// Are the access rules loaded
    Ready,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Rules {
            command: RulesCommand::List { limit, offset },
        } => {
            let res = client
                .get(format!("{}/rules", cli.url))
                .query(&[("limit", limit), ("offset", offset)])
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Rules {
            command: RulesCommand::Get { id },
        } => {
            let res = client.get(format!("{}/rules/{}", cli.url, id)).send().await?;
            print_response(res).await?;
        }
        Commands::Health { command } => {
            let path = match command {
                HealthCommand::Alive => "/health/alive",
                HealthCommand::Ready => "/health/ready",
            };
            let res = client.get(format!("{}{}", cli.url, path)).send().await?;
            print_response(res).await?;
        }
        Commands::Version => {
            let res = client.get(format!("{}/version", cli.url)).send().await?;
            print_response(res).await?;
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
