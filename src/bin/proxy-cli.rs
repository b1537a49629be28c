use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde_json::Value;

use stealth_proxy::security::auth::API_KEY_HEADER;
use stealth_proxy::target::resolve;

#[derive(Parser)]
#[command(name = "proxy-cli")]
#[command(about = "Management CLI for the stealth proxy", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// API key sent as `x-api-key`
    #[arg(short, long, env = "PROXY_API_KEY", hide_env_values = true)]
    key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the proxy health endpoint
    Health,
    /// Fetch a target through the proxy and print the response
    Fetch {
        /// Target URL; the scheme defaults to https
        target: String,

        /// Print response headers before the body
        #[arg(long)]
        headers: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()?;
    let base = cli.url.trim_end_matches('/');

    let mut headers = HeaderMap::new();
    if let Some(key) = &cli.key {
        headers.insert(API_KEY_HEADER, HeaderValue::from_str(key)?);
    }

    match cli.command {
        Commands::Health => {
            let res = client.get(format!("{}/health", base)).send().await?;
            print_response(res, false).await?;
        }
        Commands::Fetch { target, headers: show_headers } => {
            let target = resolve(&target)?;
            let res = client
                .get(format!("{}{}", base, target.proxied()))
                .headers(headers)
                .send()
                .await?;
            print_response(res, show_headers).await?;
        }
    }

    Ok(())
}

async fn print_response(
    res: reqwest::Response,
    show_headers: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if show_headers {
        println!("{}", status);
        for (name, value) in res.headers() {
            println!("{}: {}", name, value.to_str().unwrap_or("<binary>"));
        }
        println!();
    }

    let is_json = res
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.contains("json"));

    if !status.is_success() {
        eprintln!("Error: proxy returned status {}", status);
    }

    if is_json {
        let json: Value = res.json().await?;
        println!("{}", serde_json::to_string_pretty(&json)?);
    } else {
        println!("{}", res.text().await?);
    }
    Ok(())
}
