mod config;
mod render;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use wave_client::{ClientEvent, WaveClient};
use wave_rpc::{RpcTransport, RpcWallet, WavePortalRpc};
use wave_types::SessionState;

use crate::config::Settings;

type Client = WaveClient<RpcWallet, WavePortalRpc>;

#[derive(Parser, Debug)]
#[command(name = "wave", version, about = "Wave at the portal and read everyone's waves")]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Restore the session and print the page.
    Status {
        /// Print the raw view as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Ask the wallet for an account.
    Connect,
    /// Send a wave and wait for it to be mined.
    Wave { message: String },
    /// Print every wave recorded by the contract.
    List,
    /// Print the list, then follow new waves and account switches.
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = cli.settings.client_config()?;
    let poll_interval = cli.settings.poll_interval();

    let transport = Arc::new(RpcTransport::new(cli.settings.rpc_url.clone()));
    info!("using node at {}", transport.endpoint());

    let wallet = Arc::new(RpcWallet::new(Arc::clone(&transport), poll_interval));
    let contract = WavePortalRpc::new(transport, cli.settings.contract_address(), poll_interval)
        .context("invalid contract address")?;
    let client = WaveClient::new(wallet, Arc::new(contract), config);

    match cli.command {
        Command::Status { json } => status(&client, json).await,
        Command::Connect => connect(&client).await,
        Command::Wave { message } => wave(&client, message).await,
        Command::List => list(&client).await,
        Command::Watch => watch(&client).await,
    }
}

/// Page-load sequence: adopt an authorized account, then load the list.
async fn load(client: &Client) -> Result<()> {
    let session = client.detect_and_restore_session().await?;
    if session == SessionState::Connected {
        client.fetch_all_submissions().await?;
    }
    Ok(())
}

async fn status(client: &Client, json: bool) -> Result<()> {
    if let Err(err) = load(client).await {
        warn!("page load incomplete: {}", err);
    }

    let view = client.view();
    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        println!("{}", render::page(&view));
    }
    Ok(())
}

async fn connect(client: &Client) -> Result<()> {
    let account = client.connect().await.context("could not connect")?;
    println!("Connected: {account}");
    Ok(())
}

async fn wave(client: &Client, message: String) -> Result<()> {
    load(client).await?;
    client.set_draft(message);

    let mut events = client.events();
    let progress = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(ClientEvent::Operation(operation)) => {
                    if let Some(text) = render::progress(operation) {
                        println!("{text}");
                    }
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            }
        }
    });

    let result = client.submit_draft().await;
    progress.abort();

    match result {
        Ok(receipt) => {
            println!("Mined {}", receipt.tx_hash);
            println!("{}", render::page(&client.view()));
            Ok(())
        }
        Err(err) => {
            println!("{}", render::header(&client.view()));
            Err(err).context("wave failed")
        }
    }
}

async fn list(client: &Client) -> Result<()> {
    load(client).await?;
    if client.view().session != SessionState::Connected {
        client.fetch_all_submissions().await?;
    }
    println!("{}", render::page(&client.view()));
    Ok(())
}

async fn watch(client: &Client) -> Result<()> {
    load(client).await?;
    println!("{}", render::page(&client.view()));

    let mut events = client.events();
    let _accounts = client.watch_accounts().await?;
    let _waves = client
        .subscribe_to_new_submissions()
        .await
        .context("connect a wallet before watching")?;
    info!("watching for new waves; press Ctrl-C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(ClientEvent::SubmissionAppended(submission)) => {
                    println!("\n{}", render::submission(&submission));
                }
                Ok(ClientEvent::Account(Some(account))) => println!("Switched to {account}"),
                Ok(ClientEvent::Account(None)) => println!("Wallet disconnected."),
                Ok(ClientEvent::TotalCount(total)) => info!("total waves: {}", total),
                Ok(_) => {}
                Err(RecvError::Lagged(missed)) => warn!("missed {} client events", missed),
                Err(RecvError::Closed) => break,
            },
        }
    }
    Ok(())
}
