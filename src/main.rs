use std::{sync::Arc, time::Duration};

use hagrid::{
    init_logging, Hagrid, HagridConfig, InMemoryBroker, Listener, StringSerdes, TopicProperties,
};
use tracing::info;

/// Пинг-понг поверх брокера в памяти: один сервис отвечает на `ping`,
/// другой отправляет запрос и ждёт ответ.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = HagridConfig::load()?;
    let logging = init_logging(config.logging.clone())?;

    let broker = InMemoryBroker::new();

    let responder = Hagrid::new(config.clone(), broker.transport("responder"))?;
    responder.register_topic("ping", Arc::new(StringSerdes), TopicProperties::default())?;
    responder.register_listener(Listener::builder("ping").downstream().handle::<String, _>(
        |ping, delivery, response| {
            if delivery.packet().is_reply() {
                return Ok(());
            }
            info!(packet = delivery.packet().id(), ping = ?ping, "Ping received");
            response.set_payload("pong".to_string());
            Ok(())
        },
    ))?;
    responder.connect().await?;

    let requester = Hagrid::new(config, broker.transport("requester"))?;
    requester.register_topic("ping", Arc::new(StringSerdes), TopicProperties::default())?;
    requester.connect().await?;
    // Подписки потребителей открываются асинхронно.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let reply = requester
        .wizard("ping")
        .payload("ping".to_string())
        .timeout(Duration::from_secs(5))
        .send_and_wait()
        .await?;

    info!(
        status = %reply.status(),
        payload = reply.payload_as::<String>().map(String::as_str).unwrap_or(""),
        "Reply received"
    );

    requester.disconnect().await;
    responder.disconnect().await;
    logging.shutdown();
    Ok(())
}
