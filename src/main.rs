//! sharefs CLI - Main entry point.

use sharefs::cli::{server_config, Cli, Commands};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse_args();

    match cli.command {
        Commands::Server {
            root_dir,
            bind_address,
            port,
            config,
        } => {
            let config = server_config(
                config.as_deref(),
                &root_dir,
                bind_address.as_deref(),
                port,
                cli.log_level.as_deref(),
            )?;

            sharefs::observability::init(&config.observability)?;

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            runtime.block_on(sharefs::run(config))?;
        }

        #[cfg(feature = "fuse")]
        Commands::Mount {
            mount_point,
            server_url,
            verbose,
        } => {
            let log_level = match (verbose, cli.log_level) {
                (true, _) => "debug".to_string(),
                (false, Some(level)) => level,
                (false, None) => "info".to_string(),
            };
            sharefs::observability::init(&sharefs::config::ObservabilityConfig {
                log_level,
                ..Default::default()
            })?;

            if !mount_point.exists() {
                tracing::info!(mount_point = %mount_point.display(), "Mount point does not exist, creating it");
                std::fs::create_dir_all(&mount_point)?;
            }

            let mut config = sharefs::config::ClientConfig::default();
            config.server_url = server_url;
            sharefs::fuse::mount(&mount_point, &config)?;
        }

        Commands::Version => {
            println!("sharefs {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
