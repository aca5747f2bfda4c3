pub mod client;
pub mod commands;
pub mod utils;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

#[derive(Parser)]
#[command(name = "resultsctl")]
#[command(about = "Command-line client for the School Results API")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in human-readable text format")]
    pub text: bool,

    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[arg(
        long,
        global = true,
        env = "RESULTS_SERVER",
        default_value = "http://localhost:3000",
        help = "Base URL of a running results server"
    )]
    pub server: String,

    #[arg(long, global = true, env = "RESULTS_TOKEN", help = "Bearer token for protected endpoints")]
    pub token: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Mint a signed token for a user with the locally configured secret")]
    Token(commands::token::TokenArgs),

    #[command(about = "Show academic standings for a year")]
    Rankings(commands::rankings::RankingsArgs),

    #[command(about = "List a page of exam results")]
    Results(commands::results::ResultsArgs),

    #[command(about = "Check that the server and its database are reachable")]
    Health,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);

    match cli.command {
        Commands::Token(args) => commands::token::handle(args, output_format),
        Commands::Rankings(args) => {
            let client = client::ApiClient::new(&cli.server, cli.token)?;
            commands::rankings::handle(&client, args, output_format).await
        }
        Commands::Results(args) => {
            let client = client::ApiClient::new(&cli.server, cli.token)?;
            commands::results::handle(&client, args, output_format).await
        }
        Commands::Health => {
            let client = client::ApiClient::new(&cli.server, cli.token)?;
            let data = client.health().await?;
            utils::output_success(&output_format, &format!("Server {} is healthy", cli.server), Some(data))
        }
    }
}
