use std::{error::Error, path::PathBuf, sync::Arc};

use clap::{Parser, Subcommand};
use env_logger::Env;
use log::{error, info};
use rconwatch::{
    client,
    config::Config,
    poller::Poller,
    server::Server,
    store::{TargetRegistry, TargetStore},
};
use tokio::{signal, sync::watch};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll every target in the targets file
    Poll {
        /// JSON array of targets
        #[clap(short, long)]
        targets: Option<PathBuf>,
        /// Seconds between cycle starts
        #[clap(short, long)]
        interval: Option<u64>,
        /// Targets polled at the same time
        #[clap(short, long)]
        concurrency: Option<usize>,
        /// Run a single cycle and print the results
        #[clap(long)]
        once: bool,
    },
    /// Run one rcon command and print the answer
    Exec {
        #[clap(short = 'H', long)]
        host: String,
        #[clap(short, long, default_value = "27015")]
        port: u16,
        #[clap(short = 'P', long)]
        password: String,
        #[clap(required = true)]
        command: Vec<String>,
    },
    /// Run a local rcon responder to test against
    Serve {
        #[clap(short, long, default_value = "127.0.0.1:27015")]
        bind: String,
        #[clap(short = 'P', long)]
        password: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init_from_env(Env::default().default_filter_or("info"));

    let args = Args::parse();
    let mut config = Config::from_env();

    match args.command {
        Command::Poll {
            targets,
            interval,
            concurrency,
            once,
        } => {
            if let Some(targets) = targets {
                config.targets_file = targets;
            }
            if let Some(interval) = interval {
                config.poll_interval_secs = interval;
            }
            if let Some(concurrency) = concurrency {
                config.max_concurrent_polls = concurrency;
            }
            poll(config, once).await?;
        }
        Command::Exec {
            host,
            port,
            password,
            command,
        } => {
            let command = command.join(" ");
            let body =
                client::execute(&host, port, &password, &command, config.session_options()).await?;
            println!("{}", body);
        }
        Command::Serve { bind, password } => {
            let server = Server::start(&bind, &password, demo_response).await?;
            info!("listening on {}, ctrl-c to stop", server.local_addr());
            signal::ctrl_c().await?;
        }
    }

    info!("bye");
    Ok(())
}

async fn poll(config: Config, once: bool) -> Result<(), Box<dyn Error>> {
    let registry = Arc::new(TargetRegistry::load_json(&config.targets_file)?);
    let store = Arc::new(TargetStore::new());
    info!(
        "{} targets loaded from {}",
        registry.len(),
        config.targets_file.display()
    );

    let poller = Arc::new(Poller::new(registry, Arc::clone(&store), config));

    if once {
        poller.poll_cycle().await;
        println!("{}", serde_json::to_string_pretty(&store.snapshot())?);
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = {
        let poller = Arc::clone(&poller);
        tokio::spawn(async move { poller.run(shutdown_rx).await })
    };

    signal::ctrl_c().await?;
    info!("shutting down, waiting for the current cycle");
    let _ = shutdown_tx.send(true);

    if let Err(e) = handle.await {
        error!("poller task failed: {}", e);
    }
    Ok(())
}

fn demo_response(command: &str) -> String {
    match command.split_whitespace().next() {
        Some("status") => "hostname: rconwatch demo\n\
                           map     : gm_construct\n\
                           players : 3 3/16 (16 max)\n"
            .to_owned(),
        Some("changelevel") => "Usage: changelevel <map>\nCurrent map: gm_construct\n".to_owned(),
        _ => command.to_owned(),
    }
}
