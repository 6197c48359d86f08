use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use rust_tweet_client::{Client, ClientConfig, Tweet, tweet_id_from_url};

/// Query the X/Twitter web API with a logged-in browser session.
#[derive(Parser)]
#[command(name = "rust-tweet-client")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Cookie file exported from a logged-in browser session
    #[arg(long, default_value = "cookies.json")]
    cookies: PathBuf,

    /// Optional TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Locale sent with every request (overrides the config file)
    #[arg(long)]
    locale: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the account the cookies belong to
    Whoami,

    /// Show "about this account" data for a user
    About { screen_name: String },

    /// Fetch a single tweet
    Tweet {
        /// Tweet id or status URL
        tweet: String,
    },

    /// List tweets quoting a tweet
    Quotes {
        /// Tweet id or status URL
        tweet: String,

        /// Page size requested from the service
        #[arg(long, default_value_t = 20)]
        count: usize,

        /// Walk further pages until this many quotes are collected
        #[arg(long)]
        max: Option<usize>,
    },
}

#[derive(Serialize)]
struct QuotesOutput {
    tweet_id: String,
    quotes: Vec<Tweet>,
    next_cursor: Option<String>,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_tweet_id(input: &str) -> Result<String> {
    tweet_id_from_url(input).with_context(|| format!("not a tweet id or status URL: {input}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays clean JSON
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ClientConfig::from_toml_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => ClientConfig::default(),
    };
    if let Some(locale) = cli.locale {
        config.locale = locale;
    }

    let client = Client::new(config).context("invalid client configuration")?;
    client
        .load_cookies(&cli.cookies)
        .with_context(|| format!("failed to load cookies from {}", cli.cookies.display()))?;

    match cli.command {
        Commands::Whoami => {
            let user = client.user().await?;
            print_json(&user)?;
        }
        Commands::About { screen_name } => {
            let about = client.get_user_about(&screen_name).await?;
            print_json(&about)?;
        }
        Commands::Tweet { tweet } => {
            let id = parse_tweet_id(&tweet)?;
            let tweet = client.get_tweet_by_id(&id).await?;
            print_json(&tweet)?;
        }
        Commands::Quotes { tweet, count, max } => {
            let id = parse_tweet_id(&tweet)?;
            let page = client.get_tweet_quotes(&id, count).await?;

            if !page.decode_errors().is_empty() {
                log::warn!("{} entries could not be decoded", page.decode_errors().len());
            }

            let output = match max {
                Some(max) => QuotesOutput {
                    tweet_id: id,
                    quotes: page.collect_up_to(max).await?,
                    next_cursor: None,
                },
                None => QuotesOutput {
                    tweet_id: id,
                    next_cursor: page.next_cursor().map(|c| c.as_str().to_string()),
                    quotes: page.into_items(),
                },
            };

            log::info!("Fetched {} quotes", output.quotes.len());
            print_json(&output)?;
        }
    }

    Ok(())
}
