//! Wires the bot together and runs it until Ctrl-C or a polling conflict.

use std::sync::Arc;

use {
    anyhow::bail,
    tokio::sync::mpsc,
    tokio_stream::wrappers::ReceiverStream,
    tokio_util::sync::CancellationToken,
    tracing::{error, info, warn},
};

use {
    tunegrab_config::{Severity, TunegrabConfig, validate},
    tunegrab_media::YtDlp,
    tunegrab_routing::{ChoiceCoordinator, IngressRouter, Notifier},
    tunegrab_sessions::{Reaper, SessionRegistry},
    tunegrab_telegram::{ConversationHandler, ExpiryNotice, TelegramNotifier},
};

/// Capacity of the channel between the poller and the router.
const EVENT_BUFFER: usize = 256;

pub async fn run(config: TunegrabConfig) -> anyhow::Result<()> {
    let result = validate(&config);
    for d in &result.diagnostics {
        match d.severity {
            Severity::Error => error!(path = d.path, "{}", d.message),
            Severity::Warning => warn!(path = d.path, "{}", d.message),
        }
    }
    if result.has_errors() {
        bail!(
            "invalid configuration ({} error(s)); run `tunegrab check-config` for details",
            result.count(Severity::Error)
        );
    }

    let connection = tunegrab_telegram::connect(&config.telegram).await?;
    let cancel = CancellationToken::new();

    let registry = Arc::new(SessionRegistry::new(config.sessions.callback_buffer));
    let notifier: Arc<dyn Notifier> = Arc::new(TelegramNotifier::new(connection.bot.clone()));
    let source = Arc::new(
        YtDlp::new(&config.download.binary, &config.download.output_dir)
            .with_audio_format(&config.download.audio_format),
    );
    let coordinator = Arc::new(ChoiceCoordinator::new(
        Arc::clone(&registry),
        Arc::clone(&notifier),
    ));
    let handler = ConversationHandler::new(
        Arc::clone(&notifier),
        source,
        coordinator,
        config.messages.clone(),
    )
    .with_choice_wait(config.choice.wait())
    .with_download_timeout(config.download.timeout())
    .with_max_duration(config.download.max_duration())
    .with_cancel(cancel.clone());

    let mut router = IngressRouter::new(Arc::clone(&registry), Arc::new(handler));
    if let Some(limit) = config.sessions.max_concurrent_handlers {
        router = router.with_max_in_flight(limit);
    }

    let mut reaper = Reaper::new(Arc::clone(&registry))
        .with_interval(config.sessions.sweep_interval())
        .with_idle_timeout(config.sessions.idle_timeout());
    if let Some(notice) = ExpiryNotice::from_messages(Arc::clone(&notifier), &config.messages) {
        reaper = reaper.with_listener(Arc::new(notice));
    }
    let reaper = reaper.spawn(cancel.clone());

    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    let polling = tunegrab_telegram::spawn_polling(
        connection,
        config.telegram.poll_timeout_secs,
        tx,
        cancel.clone(),
    );

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!(error = %e, "failed to listen for ctrl-c");
                }
                info!("shutdown requested");
                shutdown.cancel();
            },
            () = shutdown.cancelled() => {},
        }
    });

    let handled = router.run(ReceiverStream::new(rx), cancel.clone()).await;
    cancel.cancel();

    if let Err(e) = polling.await {
        warn!(error = %e, "polling task ended abnormally");
    }
    if let Err(e) = reaper.await {
        warn!(error = %e, "reaper task ended abnormally");
    }

    info!(events = handled, "tunegrab stopped");
    Ok(())
}
