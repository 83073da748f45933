// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::prelude::*;

use k8sync::cli::{Args, ClusterCommand, Command, DeleteArgs, QueryArgs, SortOrderArg};
use k8sync::config::{self, Config};
use k8sync::kubernetes::discovery::resolve_offline;
use k8sync::kubernetes::{ClusterVersion, ConnectionRegistry, KubeBackendFactory, Propagation};
use k8sync::output::{self, QueryResult};
use k8sync::query::{self, PageRequest, ResourceQuery, SortOrder};
use k8sync::reconcile::{ClusterLocks, NodeInventoryJob, Scheduler, WorkloadJob};
use k8sync::store::{ClusterRecord, FileStore, Store};

/// Initialize logging with file output and optional stderr
fn init_logging(verbose: bool, to_stderr: bool) {
    use tracing_rolling_file::{RollingConditionBase, RollingFileAppenderBase};
    use tracing_subscriber::fmt::format::FmtSpan;

    let log_dir = config::base_dir()
        .map(|p| p.join("log"))
        .unwrap_or_else(|_| std::path::PathBuf::from("."));

    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        eprintln!("Warning: Could not create log directory: {}", e);
        return;
    }

    // Rotate daily or at 10MB, keep 5 files
    let log_path = log_dir.join("k8sync.log");
    let condition = RollingConditionBase::new()
        .daily()
        .max_size(10 * 1024 * 1024);

    let file_appender = match RollingFileAppenderBase::new(log_path, condition, 5) {
        Ok(appender) => appender,
        Err(e) => {
            eprintln!("Warning: Could not create log file: {}", e);
            return;
        }
    };

    let (non_blocking, guard) = file_appender.get_non_blocking_appender();
    // Keep the background writer alive for the whole process
    std::mem::forget(guard);

    let filter = if verbose { "k8sync=debug" } else { "k8sync=info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_span_events(FmtSpan::NONE);

    if to_stderr {
        let stderr_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_span_events(FmtSpan::NONE);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .with(stderr_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .init();
    }
}

/// Shared services every cluster-facing subcommand needs
struct Runtime {
    config: Config,
    store: Arc<dyn Store>,
    registry: Arc<ConnectionRegistry>,
}

impl Runtime {
    fn new(config: Config) -> Result<Self> {
        let store: Arc<dyn Store> = Arc::new(
            FileStore::open(&config.state_file)
                .with_context(|| format!("Failed to open state file: {}", config.state_file.display()))?,
        );
        let registry = Arc::new(ConnectionRegistry::new(
            store.clone(),
            Arc::new(KubeBackendFactory),
            config.registry_options()?,
        ));
        Ok(Self {
            config,
            store,
            registry,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Install rustls crypto provider (aws-lc-rs)
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    let args = Args::parse();

    // Always log to file (~/.k8sync/log/k8sync.log); daemon mode and -v also log to stderr
    let is_daemon = matches!(args.command, Command::Daemon);
    init_logging(args.verbose, is_daemon || args.verbose);

    let config = Config::load(args.config.as_deref())?;

    match &args.command {
        Command::Daemon => run_daemon(Runtime::new(config)?).await,
        Command::Query(query) => run_query(&args, Runtime::new(config)?, query).await,
        Command::Delete(delete) => run_delete(&args, Runtime::new(config)?, delete).await,
        Command::Resolve {
            resource_type,
            cluster_version,
            api_version,
        } => {
            let version = match cluster_version {
                Some(raw) => ClusterVersion::parse(raw)
                    .with_context(|| format!("Invalid cluster version: {}", raw))?,
                None => config.baseline()?,
            };
            let schema = resolve_offline(resource_type, version, api_version.as_deref())?;
            let table = QueryResult::from_schema(&schema);
            println!("{}", output::render(&schema, &table, args.output, args.no_headers)?);
            Ok(())
        }
        Command::Cluster(cmd) => run_cluster(&args, Runtime::new(config)?, cmd).await,
    }
}

async fn run_daemon(runtime: Runtime) -> Result<()> {
    let locks = Arc::new(ClusterLocks::new());
    let workload_job = Arc::new(WorkloadJob::new(
        runtime.registry.clone(),
        runtime.store.clone(),
        locks.clone(),
        runtime.config.workload_settings(),
    ));
    let inventory_job = Arc::new(NodeInventoryJob::new(
        runtime.registry.clone(),
        runtime.store.clone(),
        locks,
        runtime.config.inventory_settings(),
    ));

    let mut scheduler = Scheduler::new();
    let workload_stats = scheduler.add_job(workload_job, runtime.config.workload_schedule());
    let inventory_stats = scheduler.add_job(inventory_job, runtime.config.node_schedule());

    scheduler.start();
    info!(
        state_file = %runtime.config.state_file.display(),
        "k8sync daemon running, press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Shutdown requested");
    scheduler.stop().await;

    info!(
        workload = ?workload_stats.snapshot(),
        inventory = ?inventory_stats.snapshot(),
        "Final job statistics"
    );
    Ok(())
}

async fn run_query(args: &Args, runtime: Runtime, q: &QueryArgs) -> Result<()> {
    let query = ResourceQuery {
        resource_type: q.resource_type.clone(),
        api_version: q.api_version.clone(),
        namespace: q.namespace.clone(),
        all_namespaces: q.all_namespaces,
        name: q.name.clone(),
        label_selector: q.selector.clone(),
        field_selector: q.field_selector.clone(),
        search: q.search.clone(),
        page: PageRequest::new(q.page, q.page_size),
        sort_by: q.sort_by.clone(),
        sort_order: match q.sort_order {
            SortOrderArg::Asc => SortOrder::Asc,
            SortOrderArg::Desc => SortOrder::Desc,
        },
        limit: q.limit,
        continue_token: q.continue_token.clone(),
    };

    let response = query::execute(&runtime.registry, &q.cluster_id, &query).await?;
    let table = QueryResult::from_response(&response);
    println!("{}", output::render(&response, &table, args.output, args.no_headers)?);
    Ok(())
}

async fn run_delete(args: &Args, runtime: Runtime, d: &DeleteArgs) -> Result<()> {
    let propagation = Propagation::parse(&d.propagation)
        .with_context(|| format!("Unknown propagation policy: {}", d.propagation))?;

    let connection = runtime.registry.connect(&d.cluster_id).await?;
    let client = connection
        .resources(&d.resource_type, d.api_version.as_deref())
        .await?;
    let report = client
        .delete_many(&d.names, d.namespace.as_deref(), Some(propagation), d.dry_run)
        .await?;

    let table = QueryResult::from_delete_report(&report);
    println!("{}", output::render(&report, &table, args.output, args.no_headers)?);
    if !report.success {
        std::process::exit(1);
    }
    Ok(())
}

async fn run_cluster(args: &Args, runtime: Runtime, cmd: &ClusterCommand) -> Result<()> {
    match cmd {
        ClusterCommand::Add {
            id,
            name,
            kubeconfig,
            kubeconfig_content,
            context,
            status,
        } => {
            let mut record = ClusterRecord::new(id, name.as_deref().unwrap_or(id), *status);
            if let Some(path) = kubeconfig {
                let path = std::fs::canonicalize(path)
                    .with_context(|| format!("Kubeconfig not found: {}", path.display()))?;
                record.kubeconfig_path = Some(path.display().to_string());
            }
            if let Some(path) = kubeconfig_content {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read kubeconfig: {}", path.display()))?;
                record.kubeconfig_content = Some(content);
            }
            record.context_name = context.clone();

            runtime.store.put_cluster(record).await?;
            // Credentials may have changed
            runtime.registry.invalidate(id).await;
            info!(cluster_id = %id, "Cluster registered");
            println!("Cluster '{}' registered", id);
        }
        ClusterCommand::List => {
            let clusters = runtime.store.list_clusters().await?;
            let table = QueryResult::from_clusters(&clusters);
            println!("{}", output::render(&clusters, &table, args.output, args.no_headers)?);
        }
        ClusterCommand::Remove { id } => {
            if runtime.store.remove_cluster(id).await? {
                runtime.registry.invalidate(id).await;
                let credential = runtime.registry.credential_path(id);
                if credential.exists() {
                    std::fs::remove_file(&credential).with_context(|| {
                        format!("Failed to remove credential file: {}", credential.display())
                    })?;
                }
                println!("Cluster '{}' removed", id);
            } else {
                anyhow::bail!("Cluster '{}' is not registered", id);
            }
        }
    }
    Ok(())
}
