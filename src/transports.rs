//! Transport registration and dispatch
//!
//! Transports are selected with a string of the form `name` or
//! `name:key=value,key=value`. Which ones exist depends on the enabled
//! features.

use std::collections::HashMap;
use std::sync::Arc;

use hubflash_lwp3::Transport;

/// Information about a transport
pub struct TransportInfo {
    /// Name used on the command line
    pub name: &'static str,
    /// Short description
    pub description: &'static str,
}

/// All transports enabled at compile time
#[allow(unused_mut, clippy::vec_init_then_push)]
pub fn available_transports() -> Vec<TransportInfo> {
    let mut transports = Vec::new();

    #[cfg(feature = "ble")]
    transports.push(TransportInfo {
        name: "ble",
        description: "Bluetooth Low Energy (scan=<seconds>)",
    });

    #[cfg(feature = "dummy")]
    transports.push(TransportInfo {
        name: "dummy",
        description: "Emulated hub bootloader (hub=move|city|technic|<id>,fault=<name>+<name>)",
    });

    transports
}

/// Comma separated transport names for CLI help
pub fn transport_names_short() -> String {
    let names: Vec<&str> = available_transports().iter().map(|t| t.name).collect();
    names.join(", ")
}

/// Help text listing all transports
pub fn transport_help() -> String {
    let transports = available_transports();
    if transports.is_empty() {
        return "No transports available (recompile with transport features enabled)".to_string();
    }

    let mut help = String::from("Available transports:\n");
    for t in &transports {
        help.push_str(&format!("  {:8} - {}\n", t.name, t.description));
    }
    help
}

/// Parsed transport string
#[derive(Debug, PartialEq, Eq)]
pub struct TransportParams {
    /// Transport name
    pub name: String,
    /// Key-value parameters
    pub params: HashMap<String, String>,
}

/// Parse `name` or `name:key1=value1,key2=value2`
pub fn parse_transport_params(s: &str) -> Result<TransportParams, Box<dyn std::error::Error>> {
    let (name, opts_str) = s.split_once(':').unwrap_or((s, ""));

    let mut params = HashMap::new();
    if !opts_str.is_empty() {
        for opt in opts_str.split(',') {
            if let Some((key, value)) = opt.split_once('=') {
                params.insert(key.to_string(), value.to_string());
            } else {
                return Err(
                    format!("Invalid parameter format: '{}' (expected key=value)", opt).into(),
                );
            }
        }
    }

    Ok(TransportParams {
        name: name.to_string(),
        params,
    })
}

/// Open the transport named by `spec`
pub fn open_transport(spec: &str) -> Result<Arc<dyn Transport>, Box<dyn std::error::Error>> {
    let params = parse_transport_params(spec)?;

    match params.name.as_str() {
        #[cfg(feature = "ble")]
        "ble" => open_ble(&params),

        #[cfg(feature = "dummy")]
        "dummy" => open_dummy(&params),

        name => Err(unknown_transport_error(name)),
    }
}

#[cfg(feature = "ble")]
fn open_ble(params: &TransportParams) -> Result<Arc<dyn Transport>, Box<dyn std::error::Error>> {
    use hubflash_lwp3::BleTransport;
    use std::time::Duration;

    let transport = match params.params.get("scan") {
        Some(secs) => {
            let secs: u64 = secs
                .parse()
                .map_err(|e| format!("Invalid scan time '{}': {}", secs, e))?;
            BleTransport::with_scan_time(Duration::from_secs(secs))
        }
        None => BleTransport::new(),
    };
    Ok(Arc::new(transport))
}

#[cfg(feature = "dummy")]
fn open_dummy(params: &TransportParams) -> Result<Arc<dyn Transport>, Box<dyn std::error::Error>> {
    use hubflash_core::HubType;
    use hubflash_dummy::{DummyConfig, DummyHub, Faults};

    let hub_type = match params.params.get("hub").map(String::as_str) {
        None | Some("move") => HubType::MoveHub,
        Some("city") => HubType::CityHub,
        Some("technic") => HubType::TechnicHub,
        Some(other) => HubType::from_id(parse_u8(other)?),
    };

    let mut config = DummyConfig::for_hub(hub_type);
    if let Some(faults) = params.params.get("fault") {
        for name in faults.split('+') {
            let fault = Faults::parse(name).ok_or_else(|| format!("Unknown fault '{}'", name))?;
            config.faults |= fault;
        }
    }

    log::info!("Using emulated {} bootloader", hub_type);
    Ok(Arc::new(DummyHub::new(config)))
}

#[cfg(feature = "dummy")]
fn parse_u8(s: &str) -> Result<u8, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u8::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u8>().map_err(|e| format!("Invalid number: {}", e))
    }
}

fn unknown_transport_error(name: &str) -> Box<dyn std::error::Error> {
    let mut msg = format!("Unknown transport: {}\n\n", name);
    msg.push_str(&transport_help());
    msg.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_params() {
        let params = parse_transport_params("dummy:hub=city,fault=fail-init").unwrap();
        assert_eq!(params.name, "dummy");
        assert_eq!(params.params.get("hub").map(String::as_str), Some("city"));
        assert_eq!(
            params.params.get("fault").map(String::as_str),
            Some("fail-init")
        );

        let params = parse_transport_params("ble").unwrap();
        assert!(params.params.is_empty());

        assert!(parse_transport_params("ble:scan").is_err());
    }

    #[test]
    fn test_unknown_transport() {
        assert!(open_transport("usb").is_err());
    }

    #[cfg(feature = "dummy")]
    #[test]
    fn test_dummy_options() {
        assert!(open_transport("dummy:hub=technic,fault=drop-erase-reply+fail-send").is_ok());
        assert!(open_transport("dummy:hub=0x12").is_ok());
        assert!(open_transport("dummy:fault=melt").is_err());
        assert!(open_transport("dummy:hub=huge").is_err());
    }
}
