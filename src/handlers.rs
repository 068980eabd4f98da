use crate::EVENT_TARGET;
use crate::moderation::SweepRequest;
use poise::serenity_prelude::{self as serenity, Context, EventHandler, GuildId, Ready};
use tokio::sync::mpsc::Sender;
use tracing::{info, warn};

pub struct Handler {
    sweep_tx: Sender<SweepRequest>,
}

impl Handler {
    pub fn new(sweep_tx: Sender<SweepRequest>) -> Self {
        Self { sweep_tx }
    }
}

#[serenity::async_trait]
impl EventHandler for Handler {
    /// Called when the bot is ready, but the cache may not be fully populated yet.
    async fn ready(&self, ctx: Context, ready: Ready) {
        let user_name = ready.user.name.clone();
        let shard_id = ctx.shard_id;
        info!(target: EVENT_TARGET, "Connected as {user_name}, shard {shard_id}");

        // Disclose anything that came due while the bot was offline.
        if let Err(e) = self.sweep_tx.send(SweepRequest::CheckNow).await {
            warn!(target: EVENT_TARGET, "Failed to request startup disclosure sweep: {e}");
        }
    }

    /// Called when the cache is fully populated.
    async fn cache_ready(&self, ctx: Context, guilds: Vec<GuildId>) {
        let guild_count_cache = ctx.cache.guild_count();
        let guild_count = guilds.len();
        if guild_count != guild_count_cache {
            warn!(
                target: EVENT_TARGET,
                "Cache guild count mismatch: {guild_count_cache} (cache) vs {guild_count} (actual)"
            );
        }
        info!(target: EVENT_TARGET, "Cache ready! The bot is in {guild_count} guild(s)");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_implements_event_handler() {
        fn assert_impl<T: EventHandler>() {}
        assert_impl::<Handler>();
    }

    #[tokio::test]
    async fn test_handler_keeps_sweep_sender() {
        let (tx, mut rx) = crate::data::sweep_channel();
        let handler = Handler::new(tx);

        handler
            .sweep_tx
            .send(SweepRequest::CheckNow)
            .await
            .expect("send");
        assert_eq!(rx.recv().await, Some(SweepRequest::CheckNow));
    }
}
