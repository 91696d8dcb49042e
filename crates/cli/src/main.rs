use std::sync::Arc;

use anyhow::{Context, Result};
use bridge::TabSource;
use bridge_cli::cli::{Cli, Commands};
use bridge_cli::config::BridgeConfig;
use bridge_cli::discovery::HttpTabSource;
use bridge_cli::{logging, proxy, server};
use clap::Parser;

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	if let Err(err) = run(cli).await {
		eprintln!("error: {err:#}");
		std::process::exit(1);
	}
}

async fn run(cli: Cli) -> Result<()> {
	let mut config = BridgeConfig::load(cli.config.as_deref())?;

	match cli.command {
		Commands::Serve { listen, port, target } => {
			if let Some(listen) = listen {
				config.listen = listen;
			}
			if let Some(port) = port {
				config.port = port;
			}
			config.apply_target(&target);

			let listener = server::bind(&config.listen, config.port).await?;
			tracing::info!(
				target = "bridge",
				listen = %config.listen,
				port = config.port,
				debug_target = %config.target_url(),
				"serving front-end connections"
			);
			let source: Arc<dyn TabSource> = Arc::new(HttpTabSource::new(config.target_url()));
			server::serve(listener, source, config.bridge_options()).await
		}
		Commands::Proxy { listen, port, backend } => {
			if let Some(listen) = listen {
				config.proxy.listen = listen;
			}
			if let Some(port) = port {
				config.proxy.port = port;
			}
			if let Some(backend) = backend {
				config.proxy.backend = backend;
			}
			proxy::run_proxy(&config.proxy).await
		}
		Commands::Tabs { target } => {
			config.apply_target(&target);
			let source = HttpTabSource::new(config.target_url());
			let targets = source
				.list()
				.await
				.with_context(|| format!("Failed to list targets at {}", source.listing_url()))?;
			for target in targets {
				let attachable = if target.web_socket_debugger_url.is_some() { "" } else { " (in use)" };
				println!("{}\t{}\t{}{}", target.id, target.title, target.url, attachable);
			}
			Ok(())
		}
	}
}
