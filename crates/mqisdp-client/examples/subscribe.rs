//! Subscribe example - print every message on a topic filter.
//!
//! Run with: cargo run -p mqisdp-client --example subscribe -- "sensors/#"

use mqisdp_client::{AsyncClient, Callback, ClientConfig, Completion, Event, QoS};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let filter = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "example/#".to_string());

    let config = ClientConfig::load("mqisdp.toml")?;
    let (client, mut eventloop) = AsyncClient::new(config, 10)?;

    loop {
        let event = match eventloop.poll().await {
            Ok(event) => event,
            Err(e) => {
                log::info!("event loop finished: {}", e);
                break;
            }
        };

        match event {
            Event::Connected => {
                let client = client.clone();
                let filter = filter.clone();
                tokio::spawn(async move {
                    let callback: Callback = Box::new(|completion: Completion| {
                        if let Completion::Subscribed { topic, granted_qos, .. } = completion {
                            log::info!(
                                "subscribed to {} with QoS {}",
                                String::from_utf8_lossy(&topic),
                                granted_qos
                            );
                        }
                    });
                    if let Err(e) = client
                        .subscribe(filter, QoS::AtLeastOnce, Some(callback))
                        .await
                    {
                        log::error!("subscribe failed: {}", e);
                    }
                });
            }
            Event::Publish {
                topic,
                payload,
                qos,
                retain,
                ..
            } => {
                println!(
                    "{} -> {} (QoS={:?}, retain={})",
                    String::from_utf8_lossy(&topic),
                    String::from_utf8_lossy(&payload),
                    qos,
                    retain
                );
            }
            Event::Timeout => log::warn!("broker did not answer PINGREQ"),
            Event::Error(e) => log::warn!("{}", e),
            Event::Disconnected => log::info!("disconnected"),
            Event::Ping => {}
        }
    }

    Ok(())
}
