use std::{ops::Deref, sync::Arc};

use crate::config::BotConfig;
use crate::ledger::{CaseExporter, FolderCaseExporter, Ledgers};
use crate::moderation::{ActionDispatcher, DisclosureSweep, DiscordGateway, SweepRequest};
use crate::storage::JsonStore;
use poise::serenity_prelude::{Http, prelude::TypeMapKey};
use tokio::sync::mpsc::{self, Receiver, Sender};
use tracing::{info, warn};

/// Capacity of the sweep request channel
pub const SWEEP_CHANNEL_CAPACITY: usize = 16;

/// Shared state handed to every command.
#[derive(Clone)]
pub struct Data(pub Arc<DataInner>);

pub struct DataInner {
    pub config: Arc<BotConfig>,
    pub dispatcher: ActionDispatcher,
}

impl TypeMapKey for Data {
    type Value = Data;
}

impl std::fmt::Debug for Data {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Data")
            .field("config", &self.config)
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

impl Deref for Data {
    type Target = DataInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Channel pair used to drive the disclosure sweep
#[must_use]
pub fn sweep_channel() -> (Sender<SweepRequest>, Receiver<SweepRequest>) {
    mpsc::channel(SWEEP_CHANNEL_CAPACITY)
}

impl Data {
    /// Wire the ledgers, the Discord gateway, the dispatcher and the sweep
    /// from `config`, export the cases once and start the sweep task.
    pub async fn build(
        config: BotConfig,
        http: Arc<Http>,
        sweep_rx: Receiver<SweepRequest>,
    ) -> Self {
        let config = Arc::new(config);
        let store = JsonStore::new(&config.data_dir);
        let exporter = config.case_export_dir.as_ref().map(|dir| {
            Arc::new(FolderCaseExporter::new(dir)) as Arc<dyn CaseExporter>
        });
        let ledgers = Ledgers::open(&store, exporter);
        let resolver = Arc::new(config.resolver());
        let gateway = Arc::new(DiscordGateway::new(http));

        let dispatcher = ActionDispatcher::new(
            Arc::clone(&resolver),
            ledgers.clone(),
            gateway.clone(),
            gateway.clone(),
            config.dispatch_settings(),
        );

        if let Err(e) = ledgers.cases.export_now().await {
            warn!("Startup case export failed: {e}");
        }

        DisclosureSweep::new(ledgers.codes.clone(), resolver, gateway.clone(), gateway)
            .with_code_channel(config.code_channel_id)
            .with_home_guild(config.home_guild_id)
            .with_delay(config.disclosure_delay())
            .spawn(config.sweep_interval(), sweep_rx);
        info!(data_dir = %config.data_dir.display(), "Moderation state ready");

        Self(Arc::new(DataInner { config, dispatcher }))
    }
}
