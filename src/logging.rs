use crate::{COMMAND_TARGET, CONSOLE_TARGET, Context, Data, ERROR_TARGET, Error};
use poise::FrameworkError;
use std::path::Path;
use std::time::Instant;
use tracing::{error, info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Log directory name
pub const LOG_DIR: &str = "logs";
/// Command log file name
pub const COMMAND_LOG_FILE: &str = "commands";

/// Initialize the logging system with console and file outputs
pub fn init() -> Result<(), Error> {
    if !Path::new(LOG_DIR).exists() {
        std::fs::create_dir_all(LOG_DIR)?;
    }

    let command_file = RollingFileAppender::new(Rotation::DAILY, LOG_DIR, COMMAND_LOG_FILE);

    // Human-readable console output
    let console_layer = fmt::layer()
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_ansi(true);

    // JSON command log, one file per day
    let command_layer = fmt::layer()
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_ansi(false)
        .json()
        .with_writer(command_file);

    // RUST_LOG wins; otherwise info, with serenity heartbeat noise filtered out
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new("info").add_directive("serenity=error".parse()?),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(command_layer)
        .try_init()?;

    info!("Logging system initialized");
    Ok(())
}

fn guild_label(ctx: Context<'_>) -> String {
    ctx.guild_id()
        .map_or_else(|| "DM".to_string(), |id| id.get().to_string())
}

/// Log the start of a command execution (pre-command hook)
pub async fn log_command_start(ctx: Context<'_>) {
    ctx.set_invocation_data(Instant::now()).await;

    let args = if ctx.command().parameters.is_empty() {
        String::new()
    } else {
        format!("{:?}", ctx.invocation_string())
    };

    info!(
        target: COMMAND_TARGET,
        command = %ctx.command().qualified_name,
        guild_id = %guild_label(ctx),
        user_id = ctx.author().id.get(),
        arguments = %args,
        event = "start",
        "Command execution started"
    );
}

/// Log the end of a command execution (post-command hook)
pub async fn log_command_end(ctx: Context<'_>) {
    let elapsed = ctx
        .invocation_data::<Instant>()
        .await
        .map(|start| start.elapsed());
    let duration_ms = elapsed.map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX));

    info!(
        target: COMMAND_TARGET,
        command = %ctx.command().qualified_name,
        guild_id = %guild_label(ctx),
        user_id = ctx.author().id.get(),
        duration_ms,
        event = "end",
        "Command execution completed"
    );
}

/// Log errors that occur during command execution
pub fn log_command_error(error: &FrameworkError<'_, Data, Error>) {
    match error {
        FrameworkError::Command { error, ctx, .. } => {
            error!(
                target: ERROR_TARGET,
                command = %ctx.command().qualified_name,
                guild_id = %guild_label(*ctx),
                user_id = ctx.author().id.get(),
                error = %error,
                "Command error"
            );
        }
        FrameworkError::CommandCheckFailed { error, ctx, .. } => {
            let error_msg = error
                .as_ref()
                .map_or_else(|| "Check failed".to_string(), ToString::to_string);
            error!(
                target: ERROR_TARGET,
                command = %ctx.command().qualified_name,
                guild_id = %guild_label(*ctx),
                user_id = ctx.author().id.get(),
                error = %error_msg,
                "Command check failed"
            );
        }
        FrameworkError::GuildOnly { ctx, .. } => {
            warn!(
                target: ERROR_TARGET,
                command = %ctx.command().qualified_name,
                user_id = ctx.author().id.get(),
                "Guild-only command used outside a guild"
            );
        }
        err => {
            error!(
                target: ERROR_TARGET,
                error = ?err,
                "Other framework error"
            );
        }
    }
}

pub fn log_console(message: &str) {
    info!(
        target: CONSOLE_TARGET,
        message = %message,
        event = "console",
    );
}
