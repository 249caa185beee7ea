use std::env;
use std::process::ExitCode;

use neohub::{HubConfig, NeoHubBuilder};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: neocli <command> [args]

commands:
  list | list-stats | list-plugs
  stat <device>
  call '<json>'
  frost_on <device> | frost_off <device>
  switch_on <plug> | switch_off <plug>
  rename_zone <old> <new>
  remove_zone <name>";

fn ok(accepted: bool) -> ExitCode {
    if accepted {
        ExitCode::SUCCESS
    } else {
        println!("hub rejected the command");
        ExitCode::FAILURE
    }
}

fn arg(args: &[String], i: usize) -> neohub::Result<&str> {
    args.get(i)
        .map(String::as_str)
        .ok_or_else(|| neohub::Error::Config(format!("missing argument {}\n{USAGE}", i + 1)))
}

#[tokio::main]
async fn main() -> neohub::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match HubConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            eprintln!("eg: NEOHUB_IP=\"192.168.0.123\" neocli list");
            return Ok(ExitCode::FAILURE);
        }
    };

    let argv: Vec<String> = env::args().skip(1).collect();
    let Some((cmd, args)) = argv.split_first() else {
        eprintln!("{USAGE}");
        return Ok(ExitCode::FAILURE);
    };

    let hub = NeoHubBuilder::from_config(config).build()?;
    hub.setup().await?;

    let code = match cmd.as_str() {
        "list" => {
            hub.thermostats().iter().for_each(|t| println!("{t}"));
            println!();
            hub.relay_plugs().iter().for_each(|p| println!("{p}"));
            ExitCode::SUCCESS
        }
        "list-stats" => {
            hub.thermostats().iter().for_each(|t| println!("{t}"));
            ExitCode::SUCCESS
        }
        "list-plugs" => {
            hub.relay_plugs().iter().for_each(|p| println!("{p}"));
            ExitCode::SUCCESS
        }
        "stat" => {
            let name = arg(args, 0)?;
            let snapshot = hub.refresh(false).await?;
            match snapshot.get(name) {
                Some(record) => {
                    println!("{}", serde_json::to_string_pretty(record)?);
                    ExitCode::SUCCESS
                }
                None => {
                    eprintln!("no device named {name:?}");
                    ExitCode::FAILURE
                }
            }
        }
        "call" => {
            let payload = serde_json::from_str(arg(args, 0)?)?;
            let reply = hub.call(payload).await?;
            println!("{}", serde_json::to_string_pretty(&reply)?);
            ExitCode::SUCCESS
        }
        "frost_on" => ok(hub.frost_on(arg(args, 0)?).await?),
        "frost_off" => ok(hub.frost_off(arg(args, 0)?).await?),
        "switch_on" | "switch_off" => {
            let name = arg(args, 0)?;
            let Some(plug) = hub.relay_plug(name) else {
                eprintln!("no plug named {name:?}");
                return Ok(ExitCode::FAILURE);
            };
            let accepted = if cmd == "switch_on" {
                plug.switch_on().await?
            } else {
                plug.switch_off().await?
            };
            println!("{plug}");
            ok(accepted)
        }
        "rename_zone" => ok(hub.zone_title(arg(args, 0)?, arg(args, 1)?).await?),
        "remove_zone" => ok(hub.remove_zone(arg(args, 0)?).await?),
        other => {
            eprintln!("unknown command {other:?}\n{USAGE}");
            ExitCode::FAILURE
        }
    };

    hub.disconnect().await;
    Ok(code)
}
