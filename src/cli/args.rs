// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::store::ClusterStatus;

#[derive(Parser, Debug)]
#[command(name = "k8sync")]
#[command(author, version, about = "Query Kubernetes resources and reconcile workload and node inventory")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Config file (default ~/.k8sync/config.json)
    #[arg(long, global = true, env = "K8SYNC_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value = "table")]
    pub output: OutputFormat,

    /// Omit column headers in table output
    #[arg(long, global = true)]
    pub no_headers: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the reconciliation jobs until interrupted
    Daemon,

    /// List or fetch resources of one type on a registered cluster
    Query(QueryArgs),

    /// Delete named resources, reporting the ones already gone
    Delete(DeleteArgs),

    /// Print the schema a resource type resolves to, without contacting a cluster
    Resolve {
        /// Resource type: plural, singular, kind or short name
        resource_type: String,

        /// Cluster version to resolve against (e.g. 1.22)
        #[arg(long, value_name = "X.Y")]
        cluster_version: Option<String>,

        /// Override the group/version
        #[arg(long, value_name = "GROUP/VERSION")]
        api_version: Option<String>,
    },

    /// Manage registered clusters
    #[command(subcommand)]
    Cluster(ClusterCommand),
}

#[derive(ClapArgs, Debug)]
pub struct QueryArgs {
    pub cluster_id: String,

    /// Resource type: plural, singular, kind or short name
    pub resource_type: String,

    #[arg(short, long)]
    pub namespace: Option<String>,

    /// List across all namespaces
    #[arg(short = 'A', long)]
    pub all_namespaces: bool,

    /// Fetch a single object by name
    #[arg(long)]
    pub name: Option<String>,

    /// Label selector, e.g. app=web
    #[arg(short = 'l', long)]
    pub selector: Option<String>,

    #[arg(long)]
    pub field_selector: Option<String>,

    /// Client-side filter, e.g. "name=web,label.tier=frontend,status=running"
    #[arg(short, long)]
    pub search: Option<String>,

    #[arg(long, default_value_t = 1)]
    pub page: i64,

    #[arg(long, default_value_t = 10)]
    pub page_size: i64,

    /// Dotted field path, e.g. metadata.creationTimestamp
    #[arg(long)]
    pub sort_by: Option<String>,

    #[arg(long, value_enum, default_value = "asc")]
    pub sort_order: SortOrderArg,

    /// Fetch a single server page of this size
    #[arg(long)]
    pub limit: Option<u32>,

    /// Continue token from a previous limited query
    #[arg(long = "continue", value_name = "TOKEN")]
    pub continue_token: Option<String>,

    /// Override the group/version
    #[arg(long, value_name = "GROUP/VERSION")]
    pub api_version: Option<String>,
}

#[derive(ClapArgs, Debug)]
pub struct DeleteArgs {
    pub cluster_id: String,

    pub resource_type: String,

    #[arg(required = true)]
    pub names: Vec<String>,

    #[arg(short, long)]
    pub namespace: Option<String>,

    /// background, foreground or orphan
    #[arg(long, default_value = "background")]
    pub propagation: String,

    #[arg(long)]
    pub dry_run: bool,

    #[arg(long, value_name = "GROUP/VERSION")]
    pub api_version: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum ClusterCommand {
    /// Register or replace a cluster record
    Add {
        id: String,

        /// Display name (defaults to the id)
        #[arg(long)]
        name: Option<String>,

        /// Kubeconfig file to read credentials from
        #[arg(long, conflicts_with = "kubeconfig_content")]
        kubeconfig: Option<PathBuf>,

        /// Store this file's content inline instead of its path
        #[arg(long, value_name = "PATH")]
        kubeconfig_content: Option<PathBuf>,

        /// Context to use; glob patterns allowed
        #[arg(short, long)]
        context: Option<String>,

        #[arg(long, value_enum, default_value = "ready")]
        status: ClusterStatus,
    },

    /// List registered clusters
    List,

    /// Remove a cluster with its workload and node records
    Remove { id: String },
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Yaml,
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortOrderArg {
    #[default]
    Asc,
    Desc,
}
