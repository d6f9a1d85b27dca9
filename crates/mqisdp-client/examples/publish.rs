//! Publish example - one message at each QoS level, then disconnect.
//!
//! Run with: cargo run -p mqisdp-client --example publish
//!
//! Settings come from `mqisdp.toml` if present, overridden by `MQISDP__*`
//! environment variables (e.g. `MQISDP__HOST=broker.local`).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use mqisdp_client::{AsyncClient, Callback, ClientConfig, Completion, Event, PublishOptions, QoS};

const TOPIC: &str = "example/mqisdp";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ClientConfig::load("mqisdp.toml")?;
    let (client, mut eventloop) = AsyncClient::new(config, 10)?;

    let remaining = Arc::new(AtomicUsize::new(2));

    while let Ok(event) = eventloop.poll().await {
        match event {
            Event::Connected => {
                log::info!("connected, publishing to {}", TOPIC);
                let client = client.clone();
                let remaining = remaining.clone();
                tokio::spawn(async move {
                    for qos in [QoS::AtMostOnce, QoS::AtLeastOnce, QoS::ExactlyOnce] {
                        let callback = (qos != QoS::AtMostOnce).then(|| done(&client, &remaining));
                        let payload = format!("hello at {:?}", qos);
                        match client
                            .publish(TOPIC, payload, PublishOptions::new().qos(qos), callback)
                            .await
                        {
                            Ok(id) => log::info!("queued {:?} publish, message id {:?}", qos, id),
                            Err(e) => log::error!("publish failed: {}", e),
                        }
                    }
                });
            }
            Event::Disconnected => log::info!("disconnected"),
            Event::Error(e) => log::warn!("{}", e),
            other => log::debug!("{:?}", other),
        }
    }

    Ok(())
}

/// Completion callback that disconnects after the last acknowledgement.
fn done(client: &AsyncClient, remaining: &Arc<AtomicUsize>) -> Callback {
    let client = client.clone();
    let remaining = remaining.clone();
    Box::new(move |completion: Completion| {
        log::info!("{:?}", completion);
        if remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
            tokio::spawn(async move { client.disconnect(None).await });
        }
    })
}
