// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kubicle::{
	validate_cluster_name, ClusterProvisioner, ImagePublisher, RegistryIdentity, Settings, Teardown,
};
use kubicle_config::{load_config_with_cli, CliOverrides, KubicleConfig, LogFormat, LogLevel};
use kubicle_runtime::DockerRuntime;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Kubicle - local kind clusters with their own image registry
#[derive(Parser, Debug)]
#[command(name = "kubicle", version, about, long_about = None)]
struct Args {
	/// Path to custom configuration file
	#[arg(short, long, global = true)]
	config: Option<PathBuf>,

	/// Log level (overrides config)
	#[arg(short, long, global = true)]
	log_level: Option<String>,

	/// Log format: pretty, compact or json (overrides config)
	#[arg(long, global = true)]
	log_format: Option<String>,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Create a cluster and its registry, or reuse an existing one
	Up {
		name: String,

		/// Seconds to wait for the control plane (overrides config)
		#[arg(long)]
		timeout: Option<u64>,

		/// Write the cluster kubeconfig to this path
		#[arg(long)]
		kubeconfig_out: Option<PathBuf>,
	},

	/// Build a directory into an image and push it to a cluster registry
	Publish {
		cluster: String,
		image: String,
		dir: PathBuf,
	},

	/// Print the name pods use for an image in a cluster registry
	ImageName { cluster: String, image: String },

	/// Remove a cluster and its registry
	Down { cluster: String },
}

impl From<&Args> for CliOverrides {
	fn from(args: &Args) -> Self {
		let ready_timeout_secs = match &args.command {
			Command::Up { timeout, .. } => *timeout,
			_ => None,
		};
		CliOverrides {
			log_level: args.log_level.clone(),
			log_format: args.log_format.clone(),
			ready_timeout_secs,
			config_file: args.config.clone(),
		}
	}
}

fn log_level_to_tracing(level: LogLevel) -> tracing::Level {
	match level {
		LogLevel::Trace => tracing::Level::TRACE,
		LogLevel::Debug => tracing::Level::DEBUG,
		LogLevel::Info => tracing::Level::INFO,
		LogLevel::Warn => tracing::Level::WARN,
		LogLevel::Error => tracing::Level::ERROR,
	}
}

fn init_tracing(logging: &kubicle_config::LoggingConfig) {
	let level = log_level_to_tracing(logging.level);
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
		EnvFilter::new(format!(
			"kubicle={level},kubicle_cli={level},kubicle_kind={level},kubicle_runtime={level}"
		))
	});

	match logging.format {
		LogFormat::Json => {
			tracing_subscriber::registry()
				.with(filter)
				.with(fmt::layer().json().with_writer(std::io::stderr))
				.init();
		}
		LogFormat::Compact => {
			tracing_subscriber::registry()
				.with(filter)
				.with(fmt::layer().compact().with_writer(std::io::stderr))
				.init();
		}
		LogFormat::Pretty => {
			tracing_subscriber::registry()
				.with(filter)
				.with(fmt::layer().with_writer(std::io::stderr))
				.init();
		}
	}
}

async fn run_up(config: &KubicleConfig, name: &str, kubeconfig_out: Option<PathBuf>) -> Result<()> {
	let provisioner = ClusterProvisioner::from_settings(Settings::from_config(config));
	let cluster = provisioner
		.provision(name, config.cluster.ready_timeout)
		.await
		.with_context(|| format!("failed to bring up cluster {name}"))?;

	if let Some(path) = kubeconfig_out {
		cluster.write_kubeconfig(&path).await?;
		info!(path = %path.display(), "Kubeconfig written");
	}

	let nodes = cluster
		.node_names()
		.await
		.context("cluster is up but its API server did not answer")?;

	println!("cluster:  {}", cluster.name());
	println!("registry: {}", cluster.registry_name());
	println!("nodes:    {}", nodes.join(", "));
	Ok(())
}

async fn run_publish(
	config: &KubicleConfig,
	cluster: &str,
	image: &str,
	dir: PathBuf,
) -> Result<()> {
	validate_cluster_name(cluster)?;
	let publisher = ImagePublisher::new(Arc::new(DockerRuntime::new()), config.registry.host_port);
	publisher
		.publish(image, &dir)
		.await
		.with_context(|| format!("failed to publish {image} from {}", dir.display()))?;

	println!("{}", RegistryIdentity::for_cluster(cluster).image_name(image));
	Ok(())
}

async fn run_down(config: &KubicleConfig, cluster: &str) -> Result<()> {
	validate_cluster_name(cluster)?;
	let settings = Settings::from_config(config);
	let teardown = Teardown::new(
		cluster,
		Arc::new(DockerRuntime::new()),
		Arc::new(settings.kind_engine()),
	);
	teardown
		.run()
		.await
		.with_context(|| format!("failed to tear down cluster {cluster}"))?;

	println!("deleted {cluster}");
	Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
	let args = Args::parse();

	let cli_overrides = CliOverrides::from(&args);
	let config = load_config_with_cli(cli_overrides).context("failed to load configuration")?;

	init_tracing(&config.logging);

	match args.command {
		Command::Up {
			name,
			kubeconfig_out,
			..
		} => run_up(&config, &name, kubeconfig_out).await,
		Command::Publish {
			cluster,
			image,
			dir,
		} => run_publish(&config, &cluster, &image, dir).await,
		Command::ImageName { cluster, image } => {
			validate_cluster_name(&cluster)?;
			println!("{}", RegistryIdentity::for_cluster(&cluster).image_name(&image));
			Ok(())
		}
		Command::Down { cluster } => run_down(&config, &cluster).await,
	}
}
