#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use neohub::codec::{FrameDecoder, decode_stream};
use neohub::{NeoHub, NeoHubBuilder};
use serde_json::{Value, json};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

pub enum Reply {
    Json(Value),
    Raw(Vec<u8>),
    /// Answer only after the delay has passed.
    Delayed(Duration, Value),
    /// Write these bytes, then drop the connection.
    Truncated(Vec<u8>),
    /// Drop the connection without answering.
    Close,
}

type Responder = Arc<dyn Fn(&str, &Value) -> Reply + Send + Sync>;

/// In-process stand-in for a hub: answers each NUL-framed request via the
/// responder and records what it received.
pub struct FakeHub {
    port: u16,
    requests: Arc<Mutex<Vec<Value>>>,
    connections: Arc<AtomicUsize>,
}

impl FakeHub {
    pub async fn start(responder: impl Fn(&str, &Value) -> Reply + Send + Sync + 'static) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));
        let responder: Responder = Arc::new(responder);

        let (reqs, conns) = (requests.clone(), connections.clone());
        tokio::spawn(async move {
            while let Ok((mut sock, _)) = listener.accept().await {
                conns.fetch_add(1, Ordering::SeqCst);
                let (responder, reqs) = (responder.clone(), reqs.clone());
                tokio::spawn(async move {
                    let mut decoder = FrameDecoder::new();
                    while let Ok(request) = decode_stream(&mut sock, &mut decoder).await {
                        let name = command_name(&request);
                        reqs.lock().unwrap().push(request.clone());
                        let bytes = match responder(&name, &request) {
                            Reply::Json(value) => {
                                let mut bytes = value.to_string().into_bytes();
                                bytes.push(0);
                                bytes
                            }
                            Reply::Raw(bytes) => bytes,
                            Reply::Delayed(delay, value) => {
                                tokio::time::sleep(delay).await;
                                let mut bytes = value.to_string().into_bytes();
                                bytes.push(0);
                                bytes
                            }
                            Reply::Truncated(bytes) => {
                                let _ = sock.write_all(&bytes).await;
                                break;
                            }
                            Reply::Close => break,
                        };
                        if sock.write_all(&bytes).await.is_err() {
                            break;
                        }
                    }
                });
            }
        });

        Self {
            port,
            requests,
            connections,
        }
    }

    /// A hub with two thermostats, one plug and one unsupported device.
    pub async fn standard() -> Self {
        Self::start(|name, _| Reply::Json(standard_reply(name))).await
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn builder(&self) -> NeoHubBuilder {
        NeoHub::builder("127.0.0.1").port(self.port)
    }

    pub fn client(&self) -> NeoHub {
        self.builder().build().expect("client should build")
    }

    pub fn requests(&self) -> Vec<Value> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> Value {
        self.requests().pop().expect("no requests received")
    }

    pub fn count(&self, name: &str) -> usize {
        self.requests().iter().filter(|r| command_name(r) == name).count()
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

pub fn command_name(request: &Value) -> String {
    request
        .as_object()
        .and_then(|m| m.keys().next())
        .cloned()
        .unwrap_or_default()
}

pub fn info_reply() -> Value {
    json!({"devices": [
        {
            "device": "Kitchen",
            "DEVICE_TYPE": 1,
            "CURRENT_TEMPERATURE": "21.5",
            "CURRENT_SET_TEMPERATURE": "20.0",
            "HEATING": true,
            "STANDBY": false,
            "TEMP_HOLD": false,
            "HOLD_TEMPERATURE": 20
        },
        {
            "device": "Lounge",
            "DEVICE_TYPE": 1,
            "CURRENT_TEMPERATURE": "19.0",
            "CURRENT_SET_TEMPERATURE": "21.0",
            "HEATING": false,
            "STANDBY": true,
            "TEMP_HOLD": true,
            "HOLD_TEMPERATURE": 23
        },
        {
            "device": "Hall Plug",
            "DEVICE_TYPE": 6,
            "TIME_CLOCK_OVERIDE_BIT": true,
            "TIMER": false
        },
        {
            "device": "Mystery",
            "DEVICE_TYPE": 3
        }
    ]})
}

pub fn engineers_reply() -> Value {
    json!({
        "Kitchen": {"DEVICE_TYPE": 1, "FROST TEMPERATURE": 12},
        "Lounge": {"DEVICE_TYPE": 1, "FROST TEMPERATURE": 8},
        "Hall Plug": {"DEVICE_TYPE": 6},
        "Mystery": {"DEVICE_TYPE": 3}
    })
}

pub fn standard_reply(name: &str) -> Value {
    let result = match name {
        "GET_ZONES" => return json!({"Kitchen": 1, "Lounge": 2, "Hall Plug": 3, "Mystery": 4}),
        "READ_DCB" => return json!({"CORF": "C", "NEOSTAT_COUNT": 2}),
        "INFO" => return info_reply(),
        "ENGINEERS_DATA" => return engineers_reply(),
        "FIRMWARE" => return json!({"firmware version": "2134"}),
        "GET_TEMPLOG" => return json!({"today": {"1": [20.5, 21.0]}}),
        "AWAY_ON" => "away on",
        "AWAY_OFF" => "away off",
        "BOOST_ON" => "boost on",
        "BOOST_OFF" => "boost off",
        "FROST_ON" => "frost on",
        "FROST_OFF" => "frost off",
        "SET_FROST" | "SET_TEMP" => "temperature was set",
        "SET_PREHEAT" => "max preheat was set",
        "CREATE_GROUP" => "group created",
        "DELETE_GROUP" => "group removed",
        "ZONE_TITLE" => "zone renamed",
        "REMOVE_ZONE" => "zone removed",
        "TIMER_ON" => "time clock overide on",
        "TIMER_OFF" => "timers off",
        other => return json!({"error": format!("Unknown command {other}")}),
    };
    json!({"result": result})
}

/// A standard hub that answers `command` with an error instead.
pub async fn rejecting(command: &'static str) -> FakeHub {
    FakeHub::start(move |name, _| {
        if name == command {
            Reply::Json(json!({"error": format!("Could not complete {}", name.to_lowercase())}))
        } else {
            Reply::Json(standard_reply(name))
        }
    })
    .await
}
