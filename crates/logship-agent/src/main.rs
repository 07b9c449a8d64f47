// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::process;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use logship::{
    config::{Config, DEFAULT_LOG_LEVEL},
    decoder::Decoder,
    listener::{Listener, DEFAULT_LISTEN_ADDR},
    queue::{self, DEFAULT_CAPACITY},
    shipper::{HttpShipper, DEFAULT_BACKEND_ADDR},
    worker::DeliveryWorker,
};

/// Ships UDP log datagrams to Elasticsearch.
///
/// Every setting can also be given through the environment; a non-empty
/// variable takes precedence over the flag.
#[derive(Debug, Parser)]
#[command(name = "logship-agent", version)]
struct Args {
    /// hostname:port of listen address [env: LISTEN_ADDR]
    #[arg(long, default_value = DEFAULT_LISTEN_ADDR)]
    listen: String,

    /// hostname:port of elasticsearch [env: ELASTICSEARCH_ADDR]
    #[arg(long, default_value = DEFAULT_BACKEND_ADDR)]
    elasticsearch: String,

    /// Events buffered between the listener and the backend [env: QUEUE_SIZE]
    #[arg(long, default_value_t = DEFAULT_CAPACITY)]
    queue_size: usize,

    /// Seconds before a backend request is abandoned; waits forever when unset
    /// [env: REQUEST_TIMEOUT_SECS]
    #[arg(long)]
    request_timeout: Option<u64>,

    /// One of trace, debug, info, warn, error [env: LOG_LEVEL]
    #[arg(long, default_value = DEFAULT_LOG_LEVEL)]
    log_level: String,
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Config {
            listen_addr: args.listen,
            backend_addr: args.elasticsearch,
            queue_capacity: args.queue_size,
            request_timeout: args.request_timeout.map(Duration::from_secs),
            log_level: args.log_level.to_lowercase(),
        }
    }
}

fn resolve_config(args: Args) -> Result<Config, logship::errors::ConfigError> {
    let mut config = Config::from(args);
    config.apply_process_env()?;
    config.validate()?;
    Ok(config)
}

fn init_logging(log_level: &str) {
    let env_filter = format!("h2=off,hyper=off,rustls=off,{log_level}");

    let filter = EnvFilter::try_new(env_filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("setting default subscriber failed: {e}");
    }
}

#[tokio::main]
pub async fn main() {
    let config = match resolve_config(Args::parse()) {
        Ok(config) => config,
        Err(e) => {
            init_logging(DEFAULT_LOG_LEVEL);
            error!("invalid configuration: {e}");
            process::exit(1);
        }
    };

    init_logging(&config.log_level);
    debug!("Logging subsystem enabled");
    debug!("{:?}", config);

    // Validated above, so the capacity is non-zero
    let (queue_handle, queue_receiver) = match queue::channel(config.queue_capacity) {
        Ok(queue) => queue,
        Err(e) => {
            error!("unable to create event queue: {e}");
            process::exit(1);
        }
    };

    let cancel_token = CancellationToken::new();

    let listener = match Listener::bind(
        &config.listen_addr,
        Decoder::new(queue_handle),
        cancel_token.clone(),
    )
    .await
    {
        Ok(listener) => listener,
        Err(e) => {
            error!("{e}");
            process::exit(1);
        }
    };

    let shipper = match HttpShipper::new(&config.backend_addr, config.request_timeout) {
        Ok(shipper) => shipper,
        Err(e) => {
            error!("{e}");
            process::exit(1);
        }
    };
    let worker = DeliveryWorker::new(shipper, queue_receiver, cancel_token.clone());

    info!(
        "listening on udp {}, shipping to http://{}",
        config.listen_addr, config.backend_addr
    );

    let mut listener_task = tokio::spawn(listener.spin());
    let mut worker_task = tokio::spawn(worker.spin());

    tokio::select! {
        signal = tokio::signal::ctrl_c() => match signal {
            Ok(()) => info!("received interrupt, shutting down"),
            Err(e) => error!("unable to listen for shutdown signal: {e}"),
        },
        _ = &mut listener_task => error!("listener stopped unexpectedly"),
        _ = &mut worker_task => error!("delivery worker stopped unexpectedly"),
    }

    // Queued events are not drained
    cancel_token.cancel();
}
