//! Derive a device id from a name.

use anyhow::Result;
use peerwatch_types::DeviceId;

/// Id a replay script assigns to `name`.
pub fn for_name(name: &str) -> DeviceId {
    DeviceId::from_certificate(name.as_bytes())
}

/// Run the device-id command.
pub async fn run(name: &str) -> Result<()> {
    let id = for_name(name);
    println!("{}", id);
    tracing::debug!(%name, short = %id.short(), "Derived device id");
    Ok(())
}
