use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use common::cli::{CommonArgs, CommonCommands, utils};
use registry::{FactoryRegistry, RegistryAdapter, Service};

mod args;

use args::ServiceArgs;

#[derive(Parser)]
#[command(name = "registrator")]
#[command(about = "Publishes running services into etcd and keeps them alive")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[arg(long, global = true, help = "Registry URI, overrides configuration")]
    uri: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Publish every key of a service once
    Register(ServiceArgs),
    /// Remove a service and all of its keys
    Deregister(ServiceArgs),
    /// Rewrite every key of a service, renewing its TTL
    Refresh(ServiceArgs),
    /// Check that every store endpoint answers
    Ping,
    /// List registered services
    Services,
    /// Register, refresh periodically and deregister on Ctrl-C
    Run {
        #[command(flatten)]
        service: ServiceArgs,

        #[arg(long, value_parser = humantime::parse_duration, help = "Refresh interval, defaults to half the TTL")]
        interval: Option<Duration>,
    },
    #[command(flatten)]
    Common(CommonCommands),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    utils::init_logging(&cli.common);

    let mut config = utils::load_config(cli.common.config.as_ref())?;
    if let Some(uri) = cli.uri {
        config.registry.uri = uri;
    }

    if let Command::Common(ref common_cmd) = cli.command {
        return utils::handle_common_command(common_cmd, &config);
    }
    utils::validate_config(&config)?;

    let adapter = FactoryRegistry::with_defaults()
        .create(&config.registry.uri, &config.registry.adapter_settings())
        .await
        .with_context(|| format!("Failed to create registry for {}", config.registry.uri))?;

    match cli.command {
        Command::Register(service) => {
            let service = service.into_service()?;
            adapter
                .register(&service)
                .await
                .with_context(|| format!("Failed to register {}", service.name))?;
            log::info!("Registered {} ({})", service.name, service.id);
        }
        Command::Deregister(service) => {
            let service = service.into_service()?;
            adapter
                .deregister(&service)
                .await
                .with_context(|| format!("Failed to deregister {}", service.name))?;
            log::info!("Deregistered {} ({})", service.name, service.id);
        }
        Command::Refresh(service) => {
            let service = service.into_service()?;
            adapter
                .refresh(&service)
                .await
                .with_context(|| format!("Failed to refresh {}", service.name))?;
            log::info!("Refreshed {} ({})", service.name, service.id);
        }
        Command::Ping => {
            adapter.ping().await.context("Registry is not healthy")?;
            println!("ok");
        }
        Command::Services => {
            for service in adapter.services().await? {
                println!("{}\t{}\t{}", service.name, service.id, service.address());
            }
        }
        Command::Run { service, interval } => {
            let service = service.into_service()?;
            run(adapter.as_ref(), &service, interval).await?;
        }
        Command::Common(_) => {}
    }

    Ok(())
}

fn refresh_interval(service: &Service, interval: Option<Duration>) -> Option<Duration> {
    interval
        .or_else(|| (!service.ttl.is_zero()).then(|| service.ttl / 2))
        .filter(|interval| !interval.is_zero())
}

async fn run(
    adapter: &dyn RegistryAdapter,
    service: &Service,
    interval: Option<Duration>,
) -> Result<()> {
    adapter
        .register(service)
        .await
        .with_context(|| format!("Failed to register {}", service.name))?;
    log::info!("Registered {} ({}), waiting for Ctrl-C", service.name, service.id);

    match refresh_interval(service, interval) {
        Some(interval) => {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = adapter.refresh(service).await {
                            log::error!("Refresh of {} failed: {e}", service.name);
                        }
                    }
                }
            }
        }
        None => {
            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl-C")?;
        }
    }

    log::info!("Shutting down, deregistering {}", service.name);
    adapter
        .deregister(service)
        .await
        .with_context(|| format!("Failed to deregister {}", service.name))?;
    Ok(())
}
