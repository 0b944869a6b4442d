use std::time::Duration;

use {
    secrecy::ExposeSecret,
    teloxide::{
        ApiError, RequestError,
        payloads::GetUpdatesSetters,
        prelude::*,
        types::{AllowedUpdate, BotCommand},
    },
    tokio::{sync::mpsc, task::JoinHandle},
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use {tunegrab_config::TelegramConfig, tunegrab_routing::InboundEvent};

use crate::{
    error::{Error, Result},
    inbound,
};

/// Delay before polling again after a failed `getUpdates`.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

/// A verified bot handle.
#[derive(Clone)]
pub struct Connection {
    pub bot: Bot,
    pub username: Option<String>,
}

// `Bot`'s own `Debug` prints the token, so leave it out.
impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Build the bot, verify the token, and prepare it for long polling.
pub async fn connect(config: &TelegramConfig) -> Result<Connection> {
    // The HTTP timeout must outlast the long-polling timeout, or the client
    // aborts requests Telegram is still holding open.
    let client = teloxide::net::default_reqwest_settings()
        .timeout(Duration::from_secs(u64::from(config.poll_timeout_secs) + 15))
        .build()
        .map_err(|e| Error::external("failed to build HTTP client", e))?;
    let mut bot = Bot::with_client(config.token.expose_secret(), client);
    if let Some(api_url) = &config.api_url {
        let url = reqwest::Url::parse(api_url)
            .map_err(|e| Error::external(format!("invalid telegram.api_url {api_url:?}"), e))?;
        bot = bot.set_api_url(url);
    }

    let me = bot
        .get_me()
        .await
        .map_err(|e| Error::external("failed to verify telegram token", e))?;
    let username = me.username.clone();

    bot.delete_webhook().send().await?;

    let commands = vec![BotCommand::new("start", "How to use the bot")];
    if let Err(e) = bot.set_my_commands(commands).await {
        warn!("failed to register bot commands: {e}");
    }

    info!(username = ?username, "telegram bot connected (webhook cleared)");
    Ok(Connection { bot, username })
}

/// Spawn the long-polling loop. Every update the bot acts on is pushed into
/// `events` in arrival order.
///
/// The loop ends when `cancel` fires, the receiver goes away, or another
/// instance starts polling with the same token. In the last case `cancel`
/// is fired so the rest of the process shuts down too.
pub fn spawn_polling(
    connection: Connection,
    poll_timeout_secs: u32,
    events: mpsc::Sender<InboundEvent>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let Connection { bot, username } = connection;
        info!("starting telegram polling loop");
        let mut offset: i32 = 0;

        loop {
            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    info!("telegram polling stopped");
                    break;
                },
                result = bot
                    .get_updates()
                    .offset(offset)
                    .timeout(poll_timeout_secs)
                    .allowed_updates(vec![AllowedUpdate::Message, AllowedUpdate::CallbackQuery])
                    .send() => result,
            };

            match result {
                Ok(updates) => {
                    debug!(count = updates.len(), "got telegram updates");
                    for update in updates {
                        offset = update.id.as_offset();
                        let Some(event) = inbound::event_from_update(update, username.as_deref())
                        else {
                            continue;
                        };
                        if events.send(event).await.is_err() {
                            info!("event receiver closed, telegram polling stopped");
                            return;
                        }
                    }
                },
                Err(e) => {
                    if matches!(&e, RequestError::Api(ApiError::TerminatedByOtherGetUpdates)) {
                        warn!("telegram polling disabled: another instance is already running with this token");
                        cancel.cancel();
                        break;
                    }

                    warn!(error = %e, "telegram getUpdates failed");
                    tokio::select! {
                        () = cancel.cancelled() => {},
                        () = tokio::time::sleep(POLL_RETRY_DELAY) => {},
                    }
                },
            }
        }
    })
}
