use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use modelgate::http::server::run_server;
use reqwest::Client;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "modelgate", version)]
#[command(about = "Run or interact with a ModelGate batching gateway", long_about = None)]
struct Cli {
    /// Base URL of the ModelGate HTTP server
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    host: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP gateway server
    Serve {
        /// Address to bind the HTTP server to
        #[arg(long, default_value = "127.0.0.1:8080")]
        addr: String,
        /// Model repository directory (defaults to MODELGATE_MODEL_REPOSITORY or ./models)
        #[arg(long)]
        model_repository: Option<String>,
    },
    /// Send one inference request and print the response
    Infer {
        /// Target model name
        #[arg(long)]
        model: String,
        /// Explicit model version (defaults to the latest ready version)
        #[arg(long)]
        version: Option<u64>,
        /// Request body as inline JSON
        #[arg(long, conflicts_with = "file")]
        data: Option<String>,
        /// Path to a JSON file holding the request body
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Query request status by id
    Status {
        /// Request identifier returned by a previous infer call
        #[arg(long)]
        request_id: u32,
    },
    /// Cancel a pending or in-flight request
    Cancel {
        /// Request identifier to cancel
        #[arg(long)]
        request_id: u32,
    },
    /// List registered models and their versions
    Models,
    /// Fetch the gateway health document
    Health,
}

async fn print_response(response: reqwest::Response) -> anyhow::Result<()> {
    let status = response.status();
    let body: serde_json::Value = response
        .json()
        .await
        .context("response was not valid JSON")?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    if !status.is_success() {
        bail!("server returned {}", status);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let client = Client::new();

    match cli.command {
        Commands::Serve {
            addr,
            model_repository,
        } => {
            run_server(&addr, model_repository.as_deref()).await?;
        }
        Commands::Infer {
            model,
            version,
            data,
            file,
        } => {
            let body = match (data, file) {
                (Some(data), None) => data,
                (None, Some(path)) => std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read {}", path.display()))?,
                _ => bail!("provide the request body via --data or --file"),
            };
            let body: serde_json::Value =
                serde_json::from_str(&body).context("request body is not valid JSON")?;

            let url = match version {
                Some(v) => format!("{}/v2/models/{}/versions/{}/infer", cli.host, model, v),
                None => format!("{}/v2/models/{}/infer", cli.host, model),
            };
            let response = client.post(url).json(&body).send().await?;
            print_response(response).await?;
        }
        Commands::Status { request_id } => {
            let url = format!("{}/status/{}", cli.host, request_id);
            let response = client.get(url).send().await?;
            print_response(response).await?;
        }
        Commands::Cancel { request_id } => {
            let url = format!("{}/cancel/{}", cli.host, request_id);
            let response = client.post(url).send().await?;
            print_response(response).await?;
        }
        Commands::Models => {
            let url = format!("{}/v2/models", cli.host);
            let response = client.get(url).send().await?;
            print_response(response).await?;
        }
        Commands::Health => {
            let url = format!("{}/health", cli.host);
            let response = client.get(url).send().await?;
            print_response(response).await?;
        }
    }

    Ok(())
}
