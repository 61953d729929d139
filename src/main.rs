use anyhow::Result;
use serenity::{http::Http, model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info};

use tapedeck::audio::{SongbirdGate, SongbirdOutput};
use tapedeck::bot::{ChannelNotifier, Handler};
use tapedeck::sources::{CommandDownloader, SymphoniaTagReader, YtDlpResolver};
use tapedeck::{Collaborators, Config, PipelineCoordinator};

fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tapedeck=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Tapedeck v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Config::load()?;
    info!("{}", config.summary());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.worker_threads)
        .enable_all()
        .build()?;

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return runtime.block_on(health_check(&config));
    }

    runtime.block_on(run(config))
}

async fn run(config: Config) -> Result<()> {
    let songbird = Songbird::serenity();
    let http = Arc::new(Http::new(&config.discord_token));

    let collaborators = Collaborators {
        resolver: Arc::new(YtDlpResolver::new(config.ytdlp_path.clone())),
        downloader: Arc::new(CommandDownloader::new(config.download_command.clone())),
        tag_reader: Arc::new(SymphoniaTagReader::new()),
        output: Arc::new(SongbirdOutput::new(songbird.clone())),
        gate: Arc::new(SongbirdGate::new(songbird.clone())),
        notifier: Arc::new(ChannelNotifier::new(http)),
    };
    let coordinator = Arc::new(PipelineCoordinator::start(&config, collaborators).await);

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(Handler::new(coordinator.clone(), config.command_prefix.clone()))
        .register_songbird_with(songbird)
        .await?;

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    let pipeline = coordinator.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        pipeline.shutdown().await;
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

async fn health_check(config: &Config) -> Result<()> {
    // Verificar dependencias críticas
    let yt_dlp = async_process::Command::new(&config.ytdlp_path)
        .arg("--version")
        .output()
        .await?;

    let ffmpeg = async_process::Command::new("ffmpeg")
        .arg("-version")
        .output()
        .await?;

    if yt_dlp.status.success() && ffmpeg.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("Dependencias faltantes");
    }
}
