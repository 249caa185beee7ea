use std::env;
use std::time::Duration;

use neohub::{Event, NeoHub};

#[tokio::main]
async fn main() -> neohub::Result<()> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();
    let ip = args.get(1).expect("usage: monitor <ip> [interval-secs]");
    let interval = args
        .get(2)
        .and_then(|s| s.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(Duration::from_secs(30));

    let hub = NeoHub::builder(ip)
        .cache_duration(interval)
        .on_event(|event| match event {
            Event::FieldChanged { device, field, old, new } => {
                println!("[{device}] {field}: {old} -> {new}");
            }
            other => println!("{other:?}"),
        })
        .build()?;

    println!("Connecting to {ip}...");
    hub.setup().await?;
    if let Some(unit) = hub.temperature_unit() {
        println!("Temperatures in {unit}");
    }
    for stat in hub.thermostats() {
        println!("{stat}");
    }
    for plug in hub.relay_plugs() {
        println!("{plug}");
    }
    println!("Watching for changes...");

    loop {
        tokio::time::sleep(interval).await;
        if let Err(e) = hub.refresh(false).await {
            eprintln!("Refresh error: {e}");
            tokio::time::sleep(Duration::from_secs(5)).await;
            println!("Reconnecting...");
            hub.connect().await?;
        }
    }
}
