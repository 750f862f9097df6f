use std::env;

use cosa_thermostat::login::validate_login;
use cosa_thermostat::{Coordinator, CoordinatorConfig, CosaClient, Error, MessageLogMode};

#[tokio::main]
async fn main() -> cosa_thermostat::Result<()> {
    tracing_subscriber::fmt::init();

    let mut builder = CosaClient::builder();
    if let Ok(path) = env::var("COSA_MESSAGE_LOG") {
        builder = builder.message_log(MessageLogMode::Diffed, path);
    }
    let mut client = builder.build()?;

    match env::var("COSA_TOKEN") {
        Ok(token) => client.set_auth_token(token),
        Err(_) => {
            let email = env::var("COSA_EMAIL").map_err(|_| Error::MissingField("COSA_EMAIL"))?;
            let password =
                env::var("COSA_PASSWORD").map_err(|_| Error::MissingField("COSA_PASSWORD"))?;
            match validate_login(&mut client, &email, &password).await {
                Ok(creds) => println!("Logged in to {}. Token: {}", creds.title, creds.auth_token),
                Err(failure) => {
                    eprintln!("Login failed: {failure}");
                    return Err(Error::InvalidAuth);
                }
            }
        }
    }

    let mut coordinator = Coordinator::new(client, CoordinatorConfig::default());
    let mut updates = coordinator.subscribe();
    let poller = tokio::spawn(async move { coordinator.run().await });

    println!("Polling for updates...");
    while updates.changed().await.is_ok() {
        let snapshot = updates.borrow_and_update().clone();
        for endpoint in snapshot.iter() {
            let temperature = endpoint
                .temperature
                .map(|t| t.to_string())
                .unwrap_or_else(|| "--".to_string());
            let target = endpoint
                .target_temperature
                .map(|t| t.to_string())
                .unwrap_or_else(|| "--".to_string());
            println!(
                "[{}] {temperature} -> {target} | {} / {}{}",
                endpoint.name,
                endpoint.mode.as_cosa_str(),
                endpoint.option.as_cosa_str(),
                if endpoint.is_heating() { " | HEATING" } else { "" },
            );
        }
    }

    // The sender lives in the coordinator, so the loop ends only when `run` returned.
    match poller.await {
        Ok(e) => Err(e),
        Err(_) => Err(Error::Stopped),
    }
}
