//! Serial port listing.

use {
    anyhow::Result,
    aq3link::{NativePortEnumerator, PortEnumerator},
    console::style,
};

/// List ports command implementation.
pub(crate) fn cmd_list_ports(json: bool) -> Result<()> {
    let ports = NativePortEnumerator::list_ports()?;

    if json {
        let ports: Vec<serde_json::Value> = ports
            .iter()
            .map(|p| {
                serde_json::json!({
                    "name": p.name,
                    "vid": p.vid,
                    "pid": p.pid,
                    "manufacturer": p.manufacturer,
                    "product": p.product,
                })
            })
            .collect();
        let output = serde_json::json!({
            "ok": true,
            "data": {
                "ports": ports,
            }
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    eprintln!(
        "{}",
        style("Available serial ports:")
            .bold()
            .underlined()
    );

    if ports.is_empty() {
        eprintln!("  {}", style("No serial ports found").dim());
    } else {
        for port in &ports {
            let product = port
                .product
                .as_deref()
                .unwrap_or("");
            let vid_pid = if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
                format!(" ({vid:04X}:{pid:04X})")
            } else {
                String::new()
            };
            eprintln!(
                "  {} {}{}",
                style(&port.name).green(),
                style(product).dim(),
                style(vid_pid).dim()
            );
        }
    }

    Ok(())
}
