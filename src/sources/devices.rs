// src/sources/devices.rs
//! IoT device registry: a watcher that reports devices worth a look, and a
//! controller that switches devices off once they have been on for too long.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::record::Record;
use crate::source::{CycleContext, FetchOrder, Source};

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Device {
    #[serde(rename = "deviceid")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub online: bool,
    #[serde(default)]
    pub params: DeviceParams,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct DeviceParams {
    pub battery: Option<Value>,
    pub switch: Option<String>,
    #[serde(rename = "lastUpdateTime")]
    pub last_update_time: Option<String>,
}

impl Device {
    pub fn to_record(&self) -> Record {
        Record::new(self.id.as_str())
            .with("name", self.name.as_str())
            .with("battery", self.params.battery.clone().unwrap_or(Value::Null))
            .with(
                "switchStatus",
                self.params.switch.clone().map(Value::String).unwrap_or(Value::Null),
            )
            .with("online", self.online)
            .with(
                "lastUpdate",
                self.params
                    .last_update_time
                    .clone()
                    .map(Value::String)
                    .unwrap_or(Value::Null),
            )
    }
}

/// Remote device registry.
#[async_trait]
pub trait DeviceApi: Send + Sync {
    async fn list_devices(&self) -> Result<Vec<Device>>;
    async fn set_power(&self, device_id: &str, on: bool) -> Result<()>;
}

/// JSON-over-HTTP registry: `GET {base}/devices`, `POST {base}/devices/{id}/power`.
pub struct HttpDeviceApi {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl HttpDeviceApi {
    pub fn new(base_url: &str, token_env: Option<&str>, client: reqwest::Client) -> Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(anyhow!("device registry base_url must not be empty"));
        }
        Ok(Self {
            base_url,
            token: super::token_from_env(token_env)?,
            client,
        })
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(t) => req.bearer_auth(t),
            None => req,
        }
    }
}

#[async_trait]
impl DeviceApi for HttpDeviceApi {
    async fn list_devices(&self) -> Result<Vec<Device>> {
        let url = format!("{}/devices", self.base_url);
        let resp = self
            .authed(self.client.get(&url))
            .send()
            .await
            .context("device registry get()")?;
        let status = resp.status();
        let body = resp.text().await.context("device registry .text()")?;
        if !status.is_success() {
            return Err(anyhow!("device registry returned ({status}) {}", body.trim()));
        }
        serde_json::from_str(&body).context("parsing device list")
    }

    async fn set_power(&self, device_id: &str, on: bool) -> Result<()> {
        let url = format!("{}/devices/{device_id}/power", self.base_url);
        let body = serde_json::json!({ "switch": if on { "on" } else { "off" } });
        let resp = self
            .authed(self.client.post(&url))
            .json(&body)
            .send()
            .await
            .context("device power post()")?
            .error_for_status()
            .context("device power non-2xx")?;
        // Some registries answer 200 with an error status in the body.
        let reply: Value = resp.json().await.unwrap_or(Value::Null);
        match reply.get("status").and_then(Value::as_str) {
            Some(s) if s != "ok" => Err(anyhow!("changing power of {device_id} failed: {reply}")),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DeviceWatcherSpec {
    pub base_url: String,
    pub token_env: Option<String>,
    /// Devices with a battery level above this are not reported.
    pub battery_threshold: Option<f64>,
    #[serde(default)]
    pub always_report_if_on: bool,
    #[serde(default)]
    pub always_report_if_not_online: bool,
}

pub struct DeviceWatcher<A> {
    api: A,
    spec: DeviceWatcherSpec,
}

impl<A: DeviceApi> DeviceWatcher<A> {
    pub fn new(api: A, spec: DeviceWatcherSpec) -> Self {
        Self { api, spec }
    }
}

#[async_trait]
impl<A: DeviceApi> Source for DeviceWatcher<A> {
    fn name(&self) -> &'static str {
        "devices"
    }

    fn order(&self) -> FetchOrder {
        FetchOrder::Unordered
    }

    async fn fetch_raw(&self, ctx: &CycleContext<'_>) -> Result<Vec<Record>> {
        info!(target: "trawl", source = %ctx.source_id, "getting devices");
        let devices = self.api.list_devices().await?;
        Ok(devices.iter().map(Device::to_record).collect())
    }

    async fn custom_filter(&self, r: &Record, ctx: &CycleContext<'_>) -> Result<bool> {
        debug!(target: "trawl", source = %ctx.source_id, id = %r.id, "custom filtering device");
        if self.spec.always_report_if_on && r.get_str("switchStatus") == Some("on") {
            return Ok(true);
        }
        let online = r.get("online").and_then(Value::as_bool).unwrap_or(false);
        if self.spec.always_report_if_not_online && !online {
            return Ok(true);
        }
        if let (Some(threshold), Some(battery)) = (
            self.spec.battery_threshold,
            r.get("battery").and_then(battery_level),
        ) {
            if battery > threshold {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn render(&self, results: &[Record]) -> String {
        results
            .iter()
            .map(|r| {
                let online = r.get("online").and_then(Value::as_bool).unwrap_or(false);
                format!(
                    "{}: Battery {}, Switch {}, {}",
                    r.display_field("name"),
                    r.display_field("battery"),
                    r.display_field("switchStatus"),
                    if online { "online" } else { "offline" }
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Registries report battery as a number or a numeric string.
fn battery_level(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DeviceControllerSpec {
    pub base_url: String,
    pub token_env: Option<String>,
    /// Switch a device off once it has been on this long. `None` only records state.
    pub turn_off_after_ms: Option<i64>,
}

/// Keeps a snapshot of every matched device (saved `results`) stamped with
/// `lastUpdateTime`, the time its switch was last seen changing.
pub struct DeviceController<A> {
    api: A,
    spec: DeviceControllerSpec,
    switched_off: Mutex<HashSet<String>>,
    clock: fn() -> i64,
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl<A: DeviceApi> DeviceController<A> {
    pub fn new(api: A, spec: DeviceControllerSpec) -> Self {
        Self {
            api,
            spec,
            switched_off: Mutex::new(HashSet::new()),
            clock: now_ms,
        }
    }

    pub fn with_clock(mut self, clock: fn() -> i64) -> Self {
        self.clock = clock;
        self
    }

    fn switched(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.switched_off.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl<A: DeviceApi> Source for DeviceController<A> {
    fn name(&self) -> &'static str {
        "device_controller"
    }

    fn order(&self) -> FetchOrder {
        FetchOrder::Unordered
    }

    async fn fetch_raw(&self, ctx: &CycleContext<'_>) -> Result<Vec<Record>> {
        // Left over from a cycle cut short between filter and transform.
        self.switched().clear();
        info!(target: "trawl", source = %ctx.source_id, "getting devices");
        let devices = self.api.list_devices().await?;
        Ok(devices.iter().map(Device::to_record).collect())
    }

    async fn custom_filter(&self, r: &Record, ctx: &CycleContext<'_>) -> Result<bool> {
        let Some(limit) = self.spec.turn_off_after_ms else {
            return Ok(true);
        };
        if r.get_str("switchStatus") != Some("on") {
            return Ok(true);
        }
        let name = r.get_str("name").unwrap_or_default();
        let on_since = ctx
            .prior
            .find_result("name", name)
            .filter(|prev| prev.get_str("switchStatus") == Some("on"))
            .and_then(|prev| prev.get("lastUpdateTime").and_then(Value::as_i64));
        let Some(on_since) = on_since else {
            // First time seen on: the transformation starts its clock.
            return Ok(true);
        };
        if (self.clock)() - on_since < limit {
            return Ok(true);
        }

        info!(target: "trawl", source = %ctx.source_id, device = %name, on_since, "turning device off");
        let device_id = r.id.to_string();
        match self.api.set_power(&device_id, false).await {
            Ok(()) => {
                self.switched().insert(device_id);
            }
            Err(e) => {
                // Keep the old timestamp so the next cycle tries again.
                warn!(target: "trawl", source = %ctx.source_id, device = %name, error = %format!("{e:#}"), "could not turn device off");
            }
        }
        Ok(true)
    }

    async fn transform(&self, mut r: Record, ctx: &CycleContext<'_>) -> Result<Record> {
        let device_id = r.id.to_string();
        if self.switched().remove(&device_id) {
            r.set("switchStatus", "off");
            r.set("switchedOff", true);
        }
        let status = r.get_str("switchStatus").map(str::to_string);
        let name = r.get_str("name").unwrap_or_default().to_string();
        let stamp = ctx
            .prior
            .find_result("name", &name)
            .filter(|prev| prev.get_str("switchStatus") == status.as_deref())
            .and_then(|prev| prev.get("lastUpdateTime").and_then(Value::as_i64))
            .unwrap_or_else(self.clock);
        r.set("lastUpdateTime", stamp);
        Ok(r)
    }

    fn render(&self, results: &[Record]) -> String {
        results
            .iter()
            .filter(|r| r.get("switchedOff").and_then(Value::as_bool).unwrap_or(false))
            .map(|r| format!("{}: switched off", r.display_field("name")))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
