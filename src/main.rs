use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use elephant_core::config::{config_dir, Settings};
use elephant_core::ProviderUpdates;
use elephant_server::{Dispatcher, PluginLoader, ProviderRegistry, ServerState, SuppressionPolicy};

mod client;

#[derive(Parser)]
#[command(name = "elephant", about = "Data provider and executor")]
struct Args {
    /// Config folder location.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Query providers: `providers;query;maxresults[;exact]`.
    Query {
        content: String,
        /// Keep the connection open for asynchronous item updates.
        #[arg(long)]
        r#async: bool,
        /// Print items as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Show a provider's state and provider-level actions.
    State {
        provider: String,
        #[arg(long)]
        json: bool,
    },
    /// Activate an item: `provider;identifier[;action]`.
    Activate { content: String },
    /// Open a named menu.
    Menu { name: String },
    /// List all installed providers.
    Listproviders,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    match args.command {
        None => run_daemon(args.config.as_deref(), args.debug).await,
        Some(command) => {
            // client commands log nothing unless RUST_LOG says otherwise
            tracing_subscriber::fmt()
                .with_env_filter(EnvFilter::from_default_env())
                .with_writer(std::io::stderr)
                .init();
            run_client(command, args.config.as_deref()).await;
        }
    }
}

async fn run_daemon(config: Option<&std::path::Path>, debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let start = Instant::now();

    let dir = config_dir(config);
    let settings = Settings::load(&dir);
    let updates = ProviderUpdates::new();
    let (_menus, providers) = elephant_providers::builtins(&settings, &dir, updates.clone());

    let mut registry = ProviderRegistry::with_providers(providers);
    // user-installed providers live next to the config as shared objects;
    // their libraries must stay mapped for the daemon's lifetime
    let mut plugins = PluginLoader::new();
    unsafe { plugins.load_dir(&mut registry, &dir.join("providers")) };
    let _plugins = plugins;

    let registry = Arc::new(registry);
    let policy = SuppressionPolicy::from_settings(&settings);
    let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&registry), policy));
    let state = ServerState::new(registry, dispatcher, updates);

    let socket = elephant_server::socket_path();
    spawn_signal_handler(socket.clone());

    tracing::info!(startup = ?start.elapsed(), "Elephant started");

    if let Err(e) = elephant_server::listen(&socket, state).await {
        tracing::error!(error = %e, "Server failed");
        std::process::exit(1);
    }
}

/// Remove the socket and exit cleanly on any termination signal.
fn spawn_signal_handler(socket: PathBuf) {
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};

        let mut hangup = signal(SignalKind::hangup()).expect("install SIGHUP handler");
        let mut interrupt = signal(SignalKind::interrupt()).expect("install SIGINT handler");
        let mut terminate = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        let mut quit = signal(SignalKind::quit()).expect("install SIGQUIT handler");
        let mut usr1 = signal(SignalKind::user_defined1()).expect("install SIGUSR1 handler");

        tokio::select! {
            _ = hangup.recv() => {},
            _ = interrupt.recv() => {},
            _ = terminate.recv() => {},
            _ = quit.recv() => {},
            _ = usr1.recv() => {},
        }

        let _ = std::fs::remove_file(&socket);
        std::process::exit(0);
    });
}

async fn run_client(command: Command, config: Option<&std::path::Path>) {
    let result = match command {
        Command::Query {
            content,
            r#async,
            json,
        } => client::query(&content, r#async, json).await,
        Command::State { provider, json } => client::provider_state(&provider, json).await,
        Command::Activate { content } => client::activate(&content).await,
        Command::Menu { name } => client::menu(&name).await,
        Command::Listproviders => {
            list_providers(config);
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("{e}");
        std::process::exit(e.exit_code());
    }
}

/// Offline listing: builds the provider set locally instead of asking the
/// daemon, so it works before the service is up.
fn list_providers(config: Option<&std::path::Path>) {
    let dir = config_dir(config);
    let settings = Settings::load(&dir);
    let (menus, providers) = elephant_providers::builtins(&settings, &dir, ProviderUpdates::new());

    for (name, pretty, hidden) in menus.menu_list() {
        if !hidden {
            println!("{pretty};menus:{name}");
        }
    }
    for provider in providers {
        if provider.name() == "menus" || provider.hidden_from_list() || !provider.available() {
            continue;
        }
        println!("{};{}", provider.pretty_name(), provider.name());
    }
}
