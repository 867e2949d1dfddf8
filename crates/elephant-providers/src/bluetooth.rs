//! Device control through `bluetoothctl`. Slow actions (pair, connect, ...)
//! acknowledge immediately; a background task watches the adapter until the
//! state settles and then pushes a refreshed item to the client as an
//! asynchronous update.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use elephant_core::config::SectionSettings;
use elephant_core::{
    ActivateContext, FuzzyInfo, Item, Provider, ProviderError, ProviderStateResponse,
    ProviderUpdates, QueryContext, UpdateSink,
};

use crate::exec::binary_on_path;
use crate::fuzzy;

pub const ACTION_PAIR: &str = "pair";
pub const ACTION_CONNECT: &str = "connect";
pub const ACTION_DISCONNECT: &str = "disconnect";
pub const ACTION_TRUST: &str = "trust";
pub const ACTION_UNTRUST: &str = "untrust";
pub const ACTION_REMOVE: &str = "remove";
pub const ACTION_FIND: &str = "find";

/// How long a settle watcher polls before giving up.
const SETTLE_ATTEMPTS: u32 = 30;
const SETTLE_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Device {
    pub name: String,
    pub mac: String,
    pub icon: String,
    pub paired: bool,
    pub trusted: bool,
    pub connected: bool,
}

pub struct BluetoothProvider {
    cfg: SectionSettings,
    updates: ProviderUpdates,
    /// Set by the `find` provider action; the next query scans for unpaired
    /// devices instead of listing paired ones.
    find: AtomicBool,
}

impl BluetoothProvider {
    pub fn new(cfg: SectionSettings, updates: ProviderUpdates) -> Self {
        Self {
            cfg,
            updates,
            find: AtomicBool::new(false),
        }
    }

    fn icon_for(&self, device: &Device) -> String {
        if !device.icon.is_empty() {
            return device.icon.clone();
        }
        self.cfg
            .icon
            .clone()
            .unwrap_or_else(|| "bluetooth-symbolic".into())
    }

    /// Turn adapter devices into scored items.
    fn device_items(&self, devices: &[Device], query: &str, exact: bool) -> Vec<Item> {
        let mut items = Vec::new();
        for (idx, device) in devices.iter().enumerate() {
            let mut item = Item {
                identifier: device.mac.clone(),
                text: device.name.clone(),
                subtext: device.mac.clone(),
                icon: self.icon_for(device),
                provider: "bluetooth".into(),
                score: 1000 - idx as i32,
                state: device_state(device),
                actions: device_actions(device),
                ..Default::default()
            };

            if !query.is_empty() {
                match fuzzy::score(query, &device.name, exact) {
                    Some(m) => {
                        item.score = m.score;
                        item.fuzzy_info = Some(FuzzyInfo::text(m.positions, m.start));
                    }
                    None => item.score = 0,
                }
                if item.score <= self.cfg.min_score {
                    continue;
                }
            }

            items.push(item);
        }
        items
    }

    async fn devices(&self) -> Vec<Device> {
        if self.find.swap(false, Ordering::SeqCst) {
            return scan_devices().await;
        }
        paired_devices().await
    }
}

fn device_state(device: &Device) -> Vec<String> {
    let mut state = Vec::new();
    if device.paired {
        state.push("paired".into());
        if !device.connected {
            state.push("disconnected".into());
        }
    } else {
        state.push("unpaired".into());
    }
    state
}

fn device_actions(device: &Device) -> Vec<String> {
    if !device.paired {
        return vec![ACTION_PAIR.into()];
    }
    let mut actions = vec![
        if device.connected {
            ACTION_DISCONNECT
        } else {
            ACTION_CONNECT
        }
        .to_string(),
    ];
    actions.push(if device.trusted { ACTION_UNTRUST } else { ACTION_TRUST }.into());
    actions.push(ACTION_REMOVE.into());
    actions
}

#[async_trait]
impl Provider for BluetoothProvider {
    fn name(&self) -> &'static str {
        "bluetooth"
    }

    fn pretty_name(&self) -> &str {
        "Bluetooth"
    }

    fn icon(&self) -> &str {
        self.cfg.icon.as_deref().unwrap_or("bluetooth-symbolic")
    }

    fn available(&self) -> bool {
        if !binary_on_path("bluetoothctl") {
            tracing::info!("bluetoothctl not found, disabling bluetooth provider");
            return false;
        }
        true
    }

    fn hidden_from_list(&self) -> bool {
        self.cfg.hide_from_providerlist
    }

    async fn query(&self, ctx: QueryContext) -> Vec<Item> {
        let devices = self.devices().await;
        if ctx.cancel.is_cancelled() {
            return Vec::new();
        }
        self.device_items(&devices, &ctx.query, ctx.exact)
    }

    async fn activate(&self, ctx: ActivateContext) -> Result<(), ProviderError> {
        let action = ctx.action.as_str();
        match action {
            ACTION_FIND => {
                self.find.store(true, Ordering::SeqCst);
                self.updates.publish("bluetooth:find");
                return Ok(());
            }
            ACTION_PAIR | ACTION_CONNECT | ACTION_DISCONNECT | ACTION_TRUST | ACTION_UNTRUST
            | ACTION_REMOVE => {
                self.updates.publish(&format!("bluetooth:{action}"));
                run_ctl(action, &ctx.identifier).await?;
            }
            other => return Err(ProviderError::UnknownAction(other.into())),
        }

        // pairing and (dis)connecting settle slowly; watch and report back
        if matches!(
            action,
            ACTION_PAIR | ACTION_REMOVE | ACTION_CONNECT | ACTION_DISCONNECT
        ) {
            let expect = match action {
                ACTION_PAIR => Settled::Paired,
                ACTION_REMOVE => Settled::Gone,
                ACTION_CONNECT => Settled::Connected,
                _ => Settled::Disconnected,
            };
            let mac = ctx.identifier.clone();
            let query = ctx.query.clone();
            let sink = Arc::clone(&ctx.sink);
            let fallback_icon = self.icon().to_string();
            tokio::spawn(watch_settled(mac, query, sink, fallback_icon, expect));
        }

        Ok(())
    }

    fn state(&self) -> ProviderStateResponse {
        if !self.find.load(Ordering::SeqCst) {
            return ProviderStateResponse {
                states: Vec::new(),
                actions: vec![ACTION_FIND.into()],
                provider: String::new(),
            };
        }
        ProviderStateResponse::default()
    }
}

/// Feed one verb to `bluetoothctl` over stdin.
async fn run_ctl(verb: &str, mac: &str) -> Result<(), ProviderError> {
    let mut child = Command::new("bluetoothctl")
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(format!("power on\n{verb} {mac}\nquit\n").as_bytes())
            .await?;
    }

    let status = child.wait().await?;
    if !status.success() {
        return Err(ProviderError::CommandFailed(format!(
            "bluetoothctl {verb} {mac} exited with {status}"
        )));
    }
    Ok(())
}

/// Target state a slow action is expected to reach.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Settled {
    Gone,
    Paired,
    Connected,
    Disconnected,
}

impl Settled {
    fn reached(self, device: Option<&Device>) -> bool {
        match (self, device) {
            (Self::Gone, None) => true,
            (Self::Paired, Some(d)) => d.paired,
            (Self::Connected, Some(d)) => d.connected,
            (Self::Disconnected, Some(d)) => !d.connected,
            _ => false,
        }
    }
}

/// Poll until the device reaches the expected state, then push the fresh
/// item to the client connection. Removed devices settle silently.
async fn watch_settled(
    mac: String,
    query: String,
    sink: Arc<dyn UpdateSink>,
    fallback_icon: String,
    expect: Settled,
) {
    for _ in 0..SETTLE_ATTEMPTS {
        tokio::time::sleep(SETTLE_INTERVAL).await;

        let device = device_info(&mac).await;
        if !expect.reached(device.as_ref()) {
            continue;
        }
        match device {
            None => {
                tracing::debug!(mac = %mac, "Device removed");
                return;
            }
            Some(d) => {
                let item = Item {
                    identifier: d.mac.clone(),
                    text: d.name.clone(),
                    subtext: d.mac.clone(),
                    icon: if d.icon.is_empty() {
                        fallback_icon.clone()
                    } else {
                        d.icon.clone()
                    },
                    provider: "bluetooth".into(),
                    score: 1000,
                    state: device_state(&d),
                    actions: device_actions(&d),
                    ..Default::default()
                };
                sink.push_item(&query, item).await;
                return;
            }
        }
    }
    tracing::warn!(mac = %mac, "Device state did not settle");
}

async fn paired_devices() -> Vec<Device> {
    let Some(out) = ctl_output(&["devices", "Paired"]).await else {
        return Vec::new();
    };

    let mut devices = Vec::new();
    for line in out.lines() {
        let Some(mut device) = parse_device_line(line) else {
            continue;
        };
        if let Some(info) = device_info(&device.mac).await {
            device.icon = info.icon;
            device.paired = info.paired;
            device.trusted = info.trusted;
            device.connected = info.connected;
        }
        if device.paired {
            devices.push(device);
        }
    }
    devices
}

/// Scan for five seconds and report everything seen, paired or not.
async fn scan_devices() -> Vec<Device> {
    let Some(out) = ctl_output(&["--timeout", "5", "scan", "on"]).await else {
        return Vec::new();
    };
    let _ = ctl_output(&["scan", "off"]).await;
    parse_scan_output(&out)
}

async fn device_info(mac: &str) -> Option<Device> {
    let out = ctl_output(&["info", mac]).await?;
    parse_info(mac, &out)
}

async fn ctl_output(args: &[&str]) -> Option<String> {
    match Command::new("bluetoothctl").args(args).output().await {
        Ok(out) => Some(String::from_utf8_lossy(&out.stdout).into_owned()),
        Err(e) => {
            tracing::error!(error = %e, "bluetoothctl invocation failed");
            None
        }
    }
}

/// `Device AA:BB:CC:DD:EE:FF Some Name` — the name may contain spaces.
fn parse_device_line(line: &str) -> Option<Device> {
    let rest = line.trim_start();
    let rest = rest.strip_prefix("Device ")?;
    let (mac, name) = rest.split_once(' ')?;
    Some(Device {
        name: name.trim().to_string(),
        mac: mac.to_string(),
        ..Default::default()
    })
}

/// Scan output interleaves discovery chatter; device lines carry a
/// `Device <mac> <name>` tail.
fn parse_scan_output(out: &str) -> Vec<Device> {
    let mut devices = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for line in out.lines() {
        let Some(pos) = line.find("Device ") else {
            continue;
        };
        if let Some(device) = parse_device_line(&line[pos..]) {
            if seen.insert(device.mac.clone()) {
                devices.push(device);
            }
        }
    }
    devices
}

fn parse_info(mac: &str, out: &str) -> Option<Device> {
    let mut device = Device {
        mac: mac.to_string(),
        ..Default::default()
    };
    let mut found = false;
    for line in out.lines() {
        let line = line.trim();
        if let Some(name) = line.strip_prefix("Name: ") {
            device.name = name.to_string();
            found = true;
        } else if let Some(icon) = line.strip_prefix("Icon: ") {
            device.icon = icon.to_string();
        } else if let Some(v) = line.strip_prefix("Paired: ") {
            device.paired = v.contains("yes");
        } else if let Some(v) = line.strip_prefix("Trusted: ") {
            device.trusted = v.contains("yes");
        } else if let Some(v) = line.strip_prefix("Connected: ") {
            device.connected = v.contains("yes");
        }
    }
    found.then_some(device)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> BluetoothProvider {
        BluetoothProvider::new(SectionSettings::default(), ProviderUpdates::new())
    }

    fn headphones() -> Device {
        Device {
            name: "WH-1000XM4".into(),
            mac: "AA:BB:CC:DD:EE:FF".into(),
            icon: "audio-headset".into(),
            paired: true,
            trusted: true,
            connected: false,
        }
    }

    #[test]
    fn parses_paired_device_line() {
        let d = parse_device_line("Device AA:BB:CC:DD:EE:FF Living Room Speaker").unwrap();
        assert_eq!(d.mac, "AA:BB:CC:DD:EE:FF");
        assert_eq!(d.name, "Living Room Speaker");
    }

    #[test]
    fn ignores_non_device_lines() {
        assert!(parse_device_line("Agent registered").is_none());
    }

    #[test]
    fn parses_scan_output_with_chatter() {
        let out = "Discovery started\n\
                   [NEW] Device 11:22:33:44:55:66 Keyboard\n\
                   [CHG] Controller 00:00:00:00:00:00 Discovering: yes\n\
                   [NEW] Device AA:BB:CC:DD:EE:FF WH-1000XM4\n\
                   [NEW] Device 11:22:33:44:55:66 Keyboard\n";
        let devices = parse_scan_output(out);
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].name, "Keyboard");
        assert_eq!(devices[1].mac, "AA:BB:CC:DD:EE:FF");
    }

    #[test]
    fn parses_info_block() {
        let out = "Device AA:BB:CC:DD:EE:FF (public)\n\
                   \tName: WH-1000XM4\n\
                   \tIcon: audio-headset\n\
                   \tPaired: yes\n\
                   \tTrusted: no\n\
                   \tConnected: yes\n";
        let d = parse_info("AA:BB:CC:DD:EE:FF", out).unwrap();
        assert!(d.paired);
        assert!(!d.trusted);
        assert!(d.connected);
        assert_eq!(d.icon, "audio-headset");
    }

    #[test]
    fn info_without_name_is_no_device() {
        assert!(parse_info("AA:BB:CC:DD:EE:FF", "Device not available").is_none());
    }

    #[test]
    fn paired_disconnected_device_offers_connect() {
        let items = provider().device_items(&[headphones()], "", false);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].state, vec!["paired", "disconnected"]);
        assert!(items[0].actions.contains(&ACTION_CONNECT.to_string()));
        assert!(items[0].actions.contains(&ACTION_UNTRUST.to_string()));
        assert!(!items[0].actions.contains(&ACTION_PAIR.to_string()));
    }

    #[test]
    fn unpaired_device_offers_pair_only() {
        let mut d = headphones();
        d.paired = false;
        let items = provider().device_items(&[d], "", false);
        assert_eq!(items[0].state, vec!["unpaired"]);
        assert_eq!(items[0].actions, vec![ACTION_PAIR.to_string()]);
    }

    #[test]
    fn query_filters_by_fuzzy_score() {
        let items = provider().device_items(&[headphones()], "xm4", false);
        assert_eq!(items.len(), 1);
        assert!(items[0].fuzzy_info.is_some());

        let items = provider().device_items(&[headphones()], "zzz", false);
        assert!(items.is_empty());
    }

    #[test]
    fn state_offers_find_until_scan_requested() {
        let p = provider();
        assert_eq!(p.state().actions, vec![ACTION_FIND.to_string()]);

        p.find.store(true, Ordering::SeqCst);
        assert!(p.state().actions.is_empty());
    }

    #[tokio::test]
    async fn find_action_arms_scan_and_publishes() {
        let p = provider();
        let mut rx = p.updates.subscribe();

        struct NullSink;
        #[async_trait]
        impl UpdateSink for NullSink {
            async fn push_item(&self, _query: &str, _item: Item) {}
        }

        p.activate(ActivateContext {
            identifier: String::new(),
            action: ACTION_FIND.into(),
            query: String::new(),
            arguments: String::new(),
            sink: Arc::new(NullSink),
        })
        .await
        .unwrap();

        assert!(p.find.load(Ordering::SeqCst));
        assert_eq!(rx.try_recv().unwrap(), "bluetooth:find");
    }
}
