use std::env;

use guild_warden::moderation::SweepRequest;
use guild_warden::{BotConfig, Data, Error, commands, data, handlers, logging};
use poise::serenity_prelude::{self as serenity};
use serenity::GatewayIntents;
use tracing::{error, info};

/// Main function to run the bot
async fn async_main() -> Result<(), Error> {
    // A missing .env is fine, the variables may come from the environment
    let _ = dotenvy::dotenv();
    logging::init()?;

    let token = env::var("DISCORD_TOKEN").map_err(|_| "DISCORD_TOKEN must be set")?;
    let config = BotConfig::from_env().await?;
    let (sweep_tx, sweep_rx) = data::sweep_channel();

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: commands::all(),
            pre_command: |ctx| {
                Box::pin(async move {
                    logging::log_command_start(ctx).await;
                })
            },
            post_command: |ctx| {
                Box::pin(async move {
                    logging::log_command_end(ctx).await;
                })
            },
            on_error: |error| {
                Box::pin(async move {
                    logging::log_command_error(&error);
                })
            },
            ..Default::default()
        })
        .setup(move |ctx, _ready, framework| {
            Box::pin(async move {
                logging::log_console("Registering commands globally");
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                Ok(Data::build(config, ctx.http.clone(), sweep_rx).await)
            })
        })
        .build();

    let intents = GatewayIntents::non_privileged();
    let mut client = serenity::ClientBuilder::new(token, intents)
        .event_handler(handlers::Handler::new(sweep_tx.clone()))
        .framework(framework)
        .await?;

    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {e}");
            return;
        }
        info!("Shutting down...");
        if let Err(e) = sweep_tx.send(SweepRequest::Shutdown).await {
            error!("Failed to stop disclosure sweep: {e}");
        }
        shard_manager.shutdown_all().await;
    });

    info!("Starting bot...");
    client.start().await?;
    Ok(())
}

fn main() {
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Failed to start runtime: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = runtime.block_on(async_main()) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}
