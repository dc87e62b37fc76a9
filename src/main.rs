use clap::Parser;
use dotenv::dotenv;
use resilience_core::checks::{CheckContext, HealthRegistry, UrlCheck};
use resilience_core::cli::{Cli, Commands, ServerCommands};
use resilience_core::client::HealthClient;
use resilience_core::config::Config;
use resilience_core::logging::{self, Logger};
use resilience_core::responder::HealthResponder;
use resilience_core::server::{stop_hook, Server};
use resilience_core::shutdown::{hook_fn, OsSignals, ShutdownManager};
use std::process::exit;
use std::sync::Arc;
use tokio::sync::Mutex;

#[tokio::main]
async fn main() {
    dotenv().ok();

    // Parse the CLI arguments first so --help and usage errors never depend on the environment.
    let args = Cli::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            exit(2);
        }
    };
    let logger = match logging::init(&config.logging, &config.service) {
        Ok(logger) => logger,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            exit(2);
        }
    };

    logger.debug(format_args!("Config: {:?}", config));
    logger.debug(format_args!("Parsed args: {:?}", args));

    match args.command {
        Some(Commands::Server { command }) => match command {
            Some(ServerCommands::Start) => start_server(config, logger.clone()).await,
            Some(ServerCommands::Status) => {
                let client = HealthClient::new(&config.server, logger.clone());
                if client.is_running().await {
                    println!("running");
                } else {
                    println!("not running");
                }
            }
            Some(ServerCommands::Report) => {
                let client = HealthClient::new(&config.server, logger.clone());
                match client.get_report().await {
                    Ok(report) => println!("{}", report.summary()),
                    Err(e) => {
                        logger.error(format_args!("Failed to retrieve health report: {}", e));
                        logger.flush();
                        exit(1);
                    }
                }
            }
            None => {}
        },
        Some(Commands::Check) => check(config, logger.clone()).await,
        None => {}
    }

    logger.debug("Exiting.");
}

/// Runs the server until a termination signal arrives, then exits the process.
async fn start_server(config: Config, logger: Logger) {
    // Installed before the server announces itself so an early signal is not lost.
    let signals = match OsSignals::new() {
        Ok(signals) => signals,
        Err(e) => {
            logger.error(format_args!("Failed to install signal handlers: {}", e));
            exit(1);
        }
    };

    let responder = HealthResponder::new(
        build_registry(&config, &logger),
        config.health.readiness_timeout,
        config.health.diagnostic_timeout,
        logger.clone(),
    );
    let server = Arc::new(Mutex::new(Server::new(
        config.server.clone(),
        responder,
        logger.clone(),
    )));
    if server.lock().await.start().await.is_err() {
        logger.flush();
        exit(1);
    }

    // Hooks run last-registered first: the server stops before the logger is flushed.
    let shutdown = ShutdownManager::new(config.shutdown.timeout, logger.clone());
    let flush_logger = logger.clone();
    let registered = shutdown
        .add_hook(hook_fn("logger", move |_| {
            let logger = flush_logger.clone();
            async move {
                logger.flush();
                Ok(())
            }
        }))
        .and_then(|_| shutdown.add_hook(stop_hook(server.clone())));
    if let Err(e) = registered {
        logger.error(format_args!("Failed to register shutdown hooks: {}", e));
    }

    shutdown.wait_for_shutdown_with(signals).await;
}

/// Runs one health pass in-process and exits with 0 if every check is healthy.
async fn check(config: Config, logger: Logger) {
    let registry = build_registry(&config, &logger);
    let report = registry
        .run_all(&CheckContext::with_timeout(config.health.diagnostic_timeout))
        .await;

    println!("{}", report.summary());
    logger.flush();
    exit(if report.is_healthy() { 0 } else { 1 });
}

fn build_registry(config: &Config, logger: &Logger) -> HealthRegistry {
    let registry = HealthRegistry::new(&config.service.name, &config.service.version, logger.clone());

    for remote in &config.health.remote_services {
        let check = match UrlCheck::new(&remote.url, config.health.remote_timeout, logger.clone()) {
            Ok(check) => check,
            Err(e) => {
                logger.error(format_args!("Failed to create HTTP client for {}: {}", remote.url, e));
                continue;
            }
        };
        if let Err(e) = registry.register(&remote.name, check) {
            logger.warn(format_args!("Skipping remote service {}: {}", remote.url, e));
        }
    }
    register_database(&registry, config, logger);
    register_cache(&registry, config, logger);

    registry
}

#[cfg(feature = "postgres")]
fn register_database(registry: &HealthRegistry, config: &Config, logger: &Logger) {
    use resilience_core::checks::DatabaseCheck;
    use sqlx::postgres::PgPoolOptions;

    let Some(url) = &config.health.database_url else {
        return;
    };
    match PgPoolOptions::new().max_connections(5).connect_lazy(url) {
        Ok(pool) => {
            let check = DatabaseCheck::new(Arc::new(pool), logger.clone());
            if let Err(e) = registry.register("database", check) {
                logger.warn(format_args!("Skipping database check: {}", e));
            }
        }
        Err(e) => logger.error(format_args!("Invalid database URL: {}", e)),
    }
}

#[cfg(not(feature = "postgres"))]
fn register_database(_registry: &HealthRegistry, config: &Config, logger: &Logger) {
    if config.health.database_url.is_some() {
        logger.warn("RESILIENCE_DATABASE_URL is set but the postgres feature is not enabled");
    }
}

#[cfg(feature = "redis")]
fn register_cache(registry: &HealthRegistry, config: &Config, logger: &Logger) {
    use resilience_core::checks::CacheCheck;

    let Some(url) = &config.health.cache_url else {
        return;
    };
    match redis::Client::open(url.as_str()) {
        Ok(client) => {
            let check = CacheCheck::new(Arc::new(client), logger.clone());
            if let Err(e) = registry.register("cache", check) {
                logger.warn(format_args!("Skipping cache check: {}", e));
            }
        }
        Err(e) => logger.error(format_args!("Invalid cache URL: {}", e)),
    }
}

#[cfg(not(feature = "redis"))]
fn register_cache(_registry: &HealthRegistry, config: &Config, logger: &Logger) {
    if config.health.cache_url.is_some() {
        logger.warn("RESILIENCE_CACHE_URL is set but the redis feature is not enabled");
    }
}
