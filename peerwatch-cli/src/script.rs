//! Activity script parsing for the `replay` command.
//!
//! One step per line. A `#` opening a line or standing alone as a word
//! starts a comment:
//!
//! ```text
//! connect laptop 10.0.0.7:22000
//! activity laptop
//! prepare laptop
//! send laptop
//! done laptop
//! sleep 31000
//! disconnect laptop read timeout
//! status
//! ```

use anyhow::{bail, Context, Result};
use std::net::SocketAddr;
use std::time::Duration;

/// One replayed action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Device connected, optionally from an address.
    Connect {
        /// Device name.
        device: String,
        /// Remote address.
        addr: Option<SocketAddr>,
    },
    /// Device disconnected.
    Disconnect {
        /// Device name.
        device: String,
        /// Free-form cause.
        cause: String,
    },
    /// A data request was served.
    Activity {
        /// Device name.
        device: String,
    },
    /// Index preparation started.
    Prepare {
        /// Device name.
        device: String,
    },
    /// Index transmission started.
    Send {
        /// Device name.
        device: String,
    },
    /// Index transmission finished.
    Done {
        /// Device name.
        device: String,
    },
    /// Device removed from configuration.
    Remove {
        /// Device name.
        device: String,
    },
    /// Let time pass.
    Sleep(Duration),
    /// Print a snapshot of all devices.
    Status,
}

/// A step with the line it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptLine {
    /// 1-based line number.
    pub line: usize,
    /// The parsed step.
    pub step: Step,
}

/// Parse a whole script.
pub fn parse(source: &str) -> Result<Vec<ScriptLine>> {
    let mut steps = Vec::new();

    for (idx, raw) in source.lines().enumerate() {
        let line = idx + 1;
        let text = strip_comment(raw).trim();
        if text.is_empty() {
            continue;
        }

        let step = parse_step(text).with_context(|| format!("line {}: {}", line, raw.trim()))?;
        steps.push(ScriptLine { line, step });
    }

    Ok(steps)
}

/// Cut a comment: `#` opening the line, or a standalone `#` word. A `#`
/// inside a word (`error #42` keeps `#42`) is text.
fn strip_comment(raw: &str) -> &str {
    if raw.trim_start().starts_with('#') {
        return "";
    }

    let bytes = raw.as_bytes();
    for (idx, _) in raw.match_indices('#') {
        let after = bytes.get(idx + 1).copied();
        let standalone = idx > 0
            && bytes[idx - 1].is_ascii_whitespace()
            && after.map_or(true, |b| b.is_ascii_whitespace());
        if standalone {
            return &raw[..idx];
        }
    }
    raw
}

fn parse_step(text: &str) -> Result<Step> {
    let mut words = text.split_whitespace();
    let verb = words.next().unwrap_or_default();
    let mut device = || -> Result<String> {
        words
            .next()
            .map(str::to_string)
            .with_context(|| format!("'{}' needs a device name", verb))
    };

    let step = match verb {
        "connect" => {
            let device = device()?;
            let addr = match words.next() {
                Some(addr) => Some(
                    addr.parse::<SocketAddr>()
                        .with_context(|| format!("invalid address '{}'", addr))?,
                ),
                None => None,
            };
            Step::Connect { device, addr }
        }
        "disconnect" => {
            let device = device()?;
            let cause = words.collect::<Vec<_>>().join(" ");
            let cause = if cause.is_empty() {
                "connection closed".to_string()
            } else {
                cause
            };
            Step::Disconnect { device, cause }
        }
        "activity" => Step::Activity { device: device()? },
        "prepare" => Step::Prepare { device: device()? },
        "send" => Step::Send { device: device()? },
        "done" => Step::Done { device: device()? },
        "remove" => Step::Remove { device: device()? },
        "sleep" => {
            let ms = words.next().context("'sleep' needs milliseconds")?;
            let ms: u64 = ms
                .parse()
                .with_context(|| format!("invalid milliseconds '{}'", ms))?;
            Step::Sleep(Duration::from_millis(ms))
        }
        "status" => Step::Status,
        other => bail!("unknown step '{}'", other),
    };

    Ok(step)
}
