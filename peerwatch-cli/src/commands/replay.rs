//! Replay an activity script against a device registry.
//!
//! Every event the trackers emit is printed as one JSON object per line:
//!
//! ```text
//! {"type":"DeviceStateChanged","device":"laptop","data":{"from":"idle","id":"...","to":"syncing"}}
//! ```

use anyhow::{bail, Context, Result};
use peerwatch_core::{
    ChannelSink, Config, DeviceEvent, DeviceStateRegistry, DevicesConfig, EventReceiver,
};
use peerwatch_types::{ConnectionInfo, DeviceId};
use serde_json::json;
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tokio::runtime::Handle;

use super::device_id;
use crate::script::{self, ScriptLine, Step};

const CLIENT_NAME: &str = "peerwatch";
const CONNECTION_TYPE: &str = "replay";

/// Run the replay command.
pub async fn run(config: Option<&Path>, script_path: &Path) -> Result<()> {
    let devices = match config {
        Some(path) => {
            Config::from_file(path)
                .with_context(|| format!("Failed to load {}", path.display()))?
                .devices
        }
        None => DevicesConfig::default(),
    };

    let source = tokio::fs::read_to_string(script_path)
        .await
        .with_context(|| format!("Failed to read script {}", script_path.display()))?;
    let steps = script::parse(&source)
        .with_context(|| format!("Invalid script {}", script_path.display()))?;

    tracing::info!(
        steps = steps.len(),
        idle_timeout_secs = devices.idle_timeout_secs,
        "Replaying activity script"
    );

    let mut out = std::io::stdout();
    replay(&devices, &steps, &mut out).await
}

/// Feed `steps` through a fresh registry, writing events to `out`.
pub async fn replay<W: Write>(
    devices: &DevicesConfig,
    steps: &[ScriptLine],
    out: &mut W,
) -> Result<()> {
    let (sink, rx) = ChannelSink::new();
    let registry =
        DeviceStateRegistry::new(devices.idle_timeout(), Arc::new(sink), Handle::current());
    let mut session = Session {
        registry,
        rx,
        names: HashMap::new(),
    };

    for line in steps {
        session
            .step(&line.step, out)
            .await
            .with_context(|| format!("line {}", line.line))?;
    }

    tokio::task::yield_now().await;
    session.flush(out)
}

struct Session {
    registry: DeviceStateRegistry,
    rx: EventReceiver,
    names: HashMap<DeviceId, String>,
}

impl Session {
    fn device(&mut self, name: &str) -> DeviceId {
        let id = device_id::for_name(name);
        self.names.entry(id).or_insert_with(|| name.to_string());
        id
    }

    async fn step<W: Write>(&mut self, step: &Step, out: &mut W) -> Result<()> {
        match step {
            Step::Connect { device, addr } => {
                let id = self.device(device);
                let mut info = ConnectionInfo::new(
                    device.as_str(),
                    CLIENT_NAME,
                    env!("CARGO_PKG_VERSION"),
                    CONNECTION_TYPE,
                );
                if let Some(addr) = addr {
                    info = info.with_addr(*addr);
                }
                self.registry.get(&id).record_connected(&info);
            }
            Step::Disconnect { device, cause } => {
                let id = self.device(device);
                self.registry.get(&id).record_disconnected(cause);
            }
            Step::Activity { device } => {
                let id = self.device(device);
                self.registry.get(&id).record_request_activity();
            }
            Step::Prepare { device } => {
                let id = self.device(device);
                self.registry.get(&id).begin_preparing_index();
            }
            Step::Send { device } => {
                let id = self.device(device);
                let tracker = self.registry.get(&id);
                // Scripts are input, not code: refuse instead of tripping
                // the tracker's contract panic.
                if tracker.snapshot().preparing_index == 0 {
                    bail!("'send {}' without a pending 'prepare'", device);
                }
                tracker.begin_sending_index();
            }
            Step::Done { device } => {
                let id = self.device(device);
                let tracker = self.registry.get(&id);
                if tracker.snapshot().sending_index == 0 {
                    bail!("'done {}' without a pending 'send'", device);
                }
                tracker.end_sending_index();
            }
            Step::Remove { device } => {
                let id = self.device(device);
                if !self.registry.remove(&id) {
                    tracing::warn!(%device, "Remove of a device that was never seen");
                }
            }
            Step::Sleep(duration) => {
                tokio::time::sleep(*duration).await;
                // An idle deadline that falls on the wake-up instant may not
                // have been served by its timer task yet.
                tokio::task::yield_now().await;
                self.registry.refresh_all();
            }
            Step::Status => {
                self.flush(out)?;
                let devices: Vec<_> = self
                    .registry
                    .snapshot()
                    .into_iter()
                    .map(|snap| json!({ "device": self.name(&snap.id), "snapshot": snap }))
                    .collect();
                writeln!(out, "{}", json!({ "type": "status", "devices": devices }))?;
            }
        }

        self.flush(out)
    }

    fn name(&self, id: &DeviceId) -> String {
        self.names
            .get(id)
            .cloned()
            .unwrap_or_else(|| id.short())
    }

    /// Write out everything emitted so far.
    fn flush<W: Write>(&mut self, out: &mut W) -> Result<()> {
        while let Ok(event) = self.rx.try_recv() {
            writeln!(out, "{}", self.render(&event))?;
        }
        Ok(())
    }

    fn render(&self, event: &DeviceEvent) -> serde_json::Value {
        json!({
            "type": event.kind().as_str(),
            "device": self.name(&event.device_id()),
            "data": event.fields(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use std::time::Duration;

    fn devices(idle_timeout_secs: u64) -> DevicesConfig {
        DevicesConfig { idle_timeout_secs }
    }

    async fn replay_lines(source: &str, idle_timeout_secs: u64) -> Result<Vec<Value>> {
        let steps = script::parse(source)?;
        let mut out = Vec::new();
        replay(&devices(idle_timeout_secs), &steps, &mut out).await?;
        Ok(String::from_utf8(out)?
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect())
    }

    fn transitions(lines: &[Value]) -> Vec<(String, String)> {
        lines
            .iter()
            .filter(|l| l["type"] == "DeviceStateChanged")
            .map(|l| {
                (
                    l["data"]["from"].as_str().unwrap().to_string(),
                    l["data"]["to"].as_str().unwrap().to_string(),
                )
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn full_session_prints_every_event() {
        let lines = replay_lines(
            r#"
connect laptop 10.0.0.7:22000
activity laptop
prepare laptop
send laptop
done laptop
sleep 31000
disconnect laptop read timeout
"#,
            30,
        )
        .await
        .unwrap();

        assert_eq!(lines[0]["type"], "DeviceConnected");
        assert_eq!(lines[0]["device"], "laptop");
        assert_eq!(lines[0]["data"]["deviceName"], "laptop");
        assert_eq!(lines[0]["data"]["addr"], "10.0.0.7:22000");
        assert_eq!(lines[0]["data"]["type"], "replay");
        assert_eq!(
            lines[0]["data"]["id"],
            device_id::for_name("laptop").to_string()
        );

        let expected = [
            ("disconnected", "idle"),
            ("idle", "syncing"),
            ("syncing", "preparingIndex"),
            ("preparingIndex", "sendingIndex"),
            ("sendingIndex", "syncing"),
            ("syncing", "idle"),
            ("idle", "disconnected"),
        ];
        let expected: Vec<(String, String)> = expected
            .iter()
            .map(|(a, b)| (a.to_string(), b.to_string()))
            .collect();
        assert_eq!(transitions(&lines), expected);

        let last = lines.last().unwrap();
        assert_eq!(last["type"], "DeviceStateChanged");
        let disconnected = &lines[lines.len() - 2];
        assert_eq!(disconnected["type"], "DeviceDisconnected");
        assert_eq!(disconnected["data"]["error"], "read timeout");
    }

    #[tokio::test(start_paused = true)]
    async fn status_reports_snapshots() {
        let lines = replay_lines(
            "connect a\nconnect b\nprepare b\nactivity a\nsleep 1500\nstatus\n",
            30,
        )
        .await
        .unwrap();

        let status = lines.last().unwrap();
        assert_eq!(status["type"], "status");
        let devices = status["devices"].as_array().unwrap();
        assert_eq!(devices.len(), 2);

        let by_name = |name: &str| {
            devices
                .iter()
                .find(|d| d["device"] == name)
                .unwrap()
                .clone()
        };
        let a = by_name("a");
        assert_eq!(a["snapshot"]["state"], "syncing");
        assert!(a["snapshot"]["lastActivityMsAgo"].as_u64().unwrap() >= 1500);
        let b = by_name("b");
        assert_eq!(b["snapshot"]["state"], "preparingIndex");
        assert_eq!(b["snapshot"]["preparingIndex"], 1);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_window_comes_from_config() {
        let lines = replay_lines("connect a\nactivity a\nsleep 6000\n", 5)
            .await
            .unwrap();
        let last = transitions(&lines).pop().unwrap();
        assert_eq!(last, ("syncing".to_string(), "idle".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_ending_on_idle_deadline_prints_idle_edge() {
        let lines = replay_lines("connect a\nactivity a\nsleep 5000\n", 5)
            .await
            .unwrap();
        assert_eq!(
            transitions(&lines),
            vec![
                ("disconnected".to_string(), "idle".to_string()),
                ("idle".to_string(), "syncing".to_string()),
                ("syncing".to_string(), "idle".to_string()),
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn sleep_ending_on_idle_deadline_multi_thread() {
        let lines = replay_lines("connect a\nactivity a\nsleep 1000\n", 1)
            .await
            .unwrap();
        let last = transitions(&lines).pop().unwrap();
        assert_eq!(last, ("syncing".to_string(), "idle".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn unmatched_send_is_a_script_error() {
        let err = replay_lines("connect a\nsend a\n", 30).await.unwrap_err();
        let msg = format!("{:#}", err);
        assert!(msg.contains("line 2"), "{}", msg);
        assert!(msg.contains("without a pending 'prepare'"), "{}", msg);
    }

    #[tokio::test(start_paused = true)]
    async fn unmatched_done_is_a_script_error() {
        let err = replay_lines("prepare a\nsend a\ndone a\ndone a\n", 30)
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("line 4"));
    }

    #[tokio::test(start_paused = true)]
    async fn remove_starts_device_over() {
        let lines = replay_lines("connect a\nremove a\nstatus\nactivity a\nstatus\n", 30)
            .await
            .unwrap();

        let statuses: Vec<&Value> = lines.iter().filter(|l| l["type"] == "status").collect();
        assert_eq!(statuses[0]["devices"].as_array().unwrap().len(), 0);

        let devices = statuses[1]["devices"].as_array().unwrap();
        assert_eq!(devices.len(), 1);
        // Fresh tracker: activity alone, never connected.
        assert_eq!(devices[0]["snapshot"]["connected"], false);
        assert_eq!(devices[0]["snapshot"]["state"], "syncing");
    }

    #[tokio::test(start_paused = true)]
    async fn run_reads_script_and_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("peerwatch.toml");
        let script = dir.path().join("session.txt");
        std::fs::write(&config, "[devices]\nidle_timeout_secs = 1\n").unwrap();
        std::fs::write(&script, "connect a\nactivity a\nsleep 10\n").unwrap();

        run(Some(&config), &script).await.unwrap();

        let missing = dir.path().join("missing.txt");
        let err = run(None, &missing).await.unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to read script"));
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_advances_time() {
        let start = tokio::time::Instant::now();
        replay_lines("sleep 2500\n", 30).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(2500));
    }
}
