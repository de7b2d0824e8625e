//! hubflash-dummy - Emulated hub bootloader for testing
//!
//! This crate provides a transport that behaves like a hub in bootloader
//! mode, with its flash kept in memory. It's useful for testing and
//! development without a real hub. Individual misbehaviours of real hubs
//! can be switched on through [`Faults`].

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use bitflags::bitflags;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use hubflash_core::checksum::RunningXor;
use hubflash_core::protocol::{BootloaderInfo, ProtectionLevel, Request, Response, ResultCode};
use hubflash_core::HubType;
use hubflash_lwp3::{ConnectFailure, LinkEvent, SendFailure, Transport};

bitflags! {
    /// Misbehaviour to emulate
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Faults: u32 {
        /// Never deliver the Erase reply
        const DROP_ERASE_REPLY = 1 << 0;
        /// Answer GetInfo with the generic error reply
        const REJECT_GET_INFO  = 1 << 1;
        /// Report failure for Erase
        const FAIL_ERASE       = 1 << 2;
        /// Report failure for Init
        const FAIL_INIT        = 1 << 3;
        /// Report wrong checksums
        const CORRUPT_CHECKSUM = 1 << 4;
        /// Report one byte fewer in the final Program reply
        const SHORT_COUNT      = 1 << 5;
        /// Fail every write
        const FAIL_SEND        = 1 << 6;
        /// Answer GetFlashState with the generic error reply
        const NO_FLASH_STATE   = 1 << 7;
        /// Never send the final Program reply
        const SILENT_PROGRAM   = 1 << 8;
    }
}

impl Faults {
    /// Parse a fault name such as `drop-erase-reply`
    pub fn parse(name: &str) -> Option<Self> {
        Self::from_name(&name.trim().to_uppercase().replace('-', "_"))
    }
}

/// Configuration for the emulated hub
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// Hub type reported by GetInfo
    pub hub_type: HubType,
    /// Bootloader version reported by GetInfo
    pub version: u32,
    /// First flash address
    pub start_address: u32,
    /// Last flash address
    pub end_address: u32,
    /// Reported flash protection
    pub protection: ProtectionLevel,
    /// Misbehaviour to emulate
    pub faults: Faults,
    /// Make every connect attempt fail
    pub connect_failure: Option<ConnectFailure>,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            hub_type: HubType::MoveHub,
            version: 0x0100_0000,
            start_address: 0x0800_5000,
            end_address: 0x0801_F800,
            protection: ProtectionLevel::None,
            faults: Faults::empty(),
            connect_failure: None,
        }
    }
}

impl DummyConfig {
    /// Default configuration for another hub type
    pub fn for_hub(hub_type: HubType) -> Self {
        Self {
            hub_type,
            ..Self::default()
        }
    }
}

#[derive(Default)]
struct HubState {
    events: Option<UnboundedSender<LinkEvent>>,
    flash: Vec<u8>,
    firmware_size: Option<u32>,
    count: u32,
    checksum: RunningXor,
    requests: Vec<Request>,
    acked: Vec<bool>,
    connects: usize,
    disconnects: usize,
    rebooted: bool,
}

/// Emulated hub bootloader
///
/// Implements [`Transport`], so it can stand in for a BLE link. Clones share
/// the same hub.
#[derive(Clone)]
pub struct DummyHub {
    config: DummyConfig,
    state: Arc<Mutex<HubState>>,
}

impl DummyHub {
    /// Create a new emulated hub
    pub fn new(config: DummyConfig) -> Self {
        let size = config.end_address.saturating_sub(config.start_address) as usize;
        let state = HubState {
            flash: vec![0xFF; size],
            ..Default::default()
        };
        Self {
            config,
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Create an emulated Move Hub
    pub fn new_default() -> Self {
        Self::new(DummyConfig::default())
    }

    /// Get the configuration
    pub fn config(&self) -> &DummyConfig {
        &self.config
    }

    fn state(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Every request received so far
    pub fn requests(&self) -> Vec<Request> {
        self.state().requests.clone()
    }

    /// Ack mode of every request received so far
    pub fn ack_modes(&self) -> Vec<bool> {
        self.state().acked.clone()
    }

    /// Flash contents
    pub fn flash(&self) -> Vec<u8> {
        self.state().flash.clone()
    }

    /// Number of successful connects
    pub fn connect_count(&self) -> usize {
        self.state().connects
    }

    /// Number of times the host closed the link
    pub fn disconnect_count(&self) -> usize {
        self.state().disconnects
    }

    /// Returns true if the hub was told to start the application
    pub fn rebooted(&self) -> bool {
        self.state().rebooted
    }

    fn handle(&self, state: &mut HubState, request: &Request) -> Option<Response> {
        let faults = self.config.faults;
        match request {
            Request::Erase => {
                state.flash.fill(0xFF);
                state.count = 0;
                state.checksum = RunningXor::new();
                if faults.contains(Faults::DROP_ERASE_REPLY) {
                    log::debug!("dummy: swallowing erase reply");
                    return None;
                }
                let result = if faults.contains(Faults::FAIL_ERASE) {
                    ResultCode::Failed(0xFF)
                } else {
                    ResultCode::Ok
                };
                Some(Response::Erase(result))
            }
            Request::Init { firmware_size } => {
                if faults.contains(Faults::FAIL_INIT) {
                    return Some(Response::Init(ResultCode::Failed(0xFF)));
                }
                state.firmware_size = Some(*firmware_size);
                state.count = 0;
                state.checksum = RunningXor::new();
                Some(Response::Init(ResultCode::Ok))
            }
            Request::Program { address, payload } => {
                let offset = address.wrapping_sub(self.config.start_address) as usize;
                let range = offset..offset.saturating_add(payload.len());
                match state.flash.get_mut(range) {
                    Some(dest) => dest.copy_from_slice(payload),
                    None => log::warn!("dummy: program at 0x{:08X} out of range", address),
                }
                state.count += payload.len() as u32;
                state.checksum.update(payload);

                let done = state.firmware_size.is_some_and(|size| state.count >= size);
                if !done || faults.contains(Faults::SILENT_PROGRAM) {
                    return None;
                }
                let mut count = state.count;
                if faults.contains(Faults::SHORT_COUNT) {
                    count = count.saturating_sub(1);
                }
                Some(Response::Program {
                    checksum: self.reported_checksum(state),
                    count,
                })
            }
            Request::GetChecksum => Some(Response::Checksum(self.reported_checksum(state))),
            Request::GetInfo => {
                if faults.contains(Faults::REJECT_GET_INFO) {
                    return Some(Response::Error(request.command()));
                }
                Some(Response::Info(BootloaderInfo {
                    version: self.config.version,
                    start_address: self.config.start_address,
                    end_address: self.config.end_address,
                    hub_type: self.config.hub_type,
                }))
            }
            Request::GetFlashState => {
                if faults.contains(Faults::NO_FLASH_STATE) {
                    return Some(Response::Error(request.command()));
                }
                Some(Response::FlashState(self.config.protection))
            }
            Request::Reboot | Request::Disconnect => {
                if matches!(request, Request::Reboot) {
                    state.rebooted = true;
                }
                // The hub drops the link right away
                if let Some(events) = state.events.take() {
                    let _ = events.send(LinkEvent::Dropped);
                }
                None
            }
        }
    }

    fn reported_checksum(&self, state: &HubState) -> u8 {
        let value = state.checksum.value();
        if self.config.faults.contains(Faults::CORRUPT_CHECKSUM) {
            !value
        } else {
            value
        }
    }
}

impl Default for DummyHub {
    fn default() -> Self {
        Self::new_default()
    }
}

#[async_trait]
impl Transport for DummyHub {
    async fn connect(&self) -> Result<UnboundedReceiver<LinkEvent>, ConnectFailure> {
        if let Some(failure) = &self.config.connect_failure {
            return Err(failure.clone());
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state();
        state.events = Some(tx);
        state.connects += 1;
        log::debug!("dummy: connected as {}", self.config.hub_type);
        Ok(rx)
    }

    async fn send(&self, frame: &[u8], require_ack: bool) -> Result<(), SendFailure> {
        if self.config.faults.contains(Faults::FAIL_SEND) {
            return Err(SendFailure::Failed("injected write failure".to_string()));
        }

        let mut state = self.state();
        if state.events.is_none() {
            return Err(SendFailure::NotConnected);
        }

        let request = match Request::decode(frame) {
            Ok(request) => request,
            Err(e) => {
                log::warn!("dummy: ignoring bad frame {:02X?}: {}", frame, e);
                return Ok(());
            }
        };
        log::trace!("dummy: {:?} (ack: {})", request, require_ack);

        let reply = self.handle(&mut state, &request);
        state.requests.push(request);
        state.acked.push(require_ack);

        if let (Some(reply), Some(events)) = (reply, state.events.as_ref()) {
            let _ = events.send(LinkEvent::Notification(reply.encode()));
        }
        Ok(())
    }

    async fn disconnect(&self) {
        let mut state = self.state();
        state.disconnects += 1;
        if let Some(events) = state.events.take() {
            let _ = events.send(LinkEvent::Dropped);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn next_response(rx: &mut UnboundedReceiver<LinkEvent>) -> Response {
        match rx.recv().await {
            Some(LinkEvent::Notification(frame)) => Response::decode(&frame).unwrap(),
            other => panic!("expected notification, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_info() {
        let hub = DummyHub::new(DummyConfig::for_hub(HubType::CityHub));
        let mut rx = hub.connect().await.unwrap();
        hub.send(&Request::GetInfo.encode(), true).await.unwrap();

        match next_response(&mut rx).await {
            Response::Info(info) => {
                assert_eq!(info.hub_type, HubType::CityHub);
                assert_eq!(info.start_address, 0x0800_5000);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_program_reply_after_last_packet() {
        let hub = DummyHub::new_default();
        let mut rx = hub.connect().await.unwrap();

        hub.send(&Request::Init { firmware_size: 6 }.encode(), true)
            .await
            .unwrap();
        assert_eq!(next_response(&mut rx).await, Response::Init(ResultCode::Ok));

        let first = Request::Program {
            address: 0x0800_5000,
            payload: vec![1, 2, 3, 4],
        };
        hub.send(&first.encode(), false).await.unwrap();
        assert!(rx.try_recv().is_err());

        let last = Request::Program {
            address: 0x0800_5004,
            payload: vec![5, 6],
        };
        hub.send(&last.encode(), false).await.unwrap();
        assert_eq!(
            next_response(&mut rx).await,
            Response::Program {
                checksum: 0xFF ^ 1 ^ 2 ^ 3 ^ 4 ^ 5 ^ 6,
                count: 6
            }
        );
        assert_eq!(&hub.flash()[..6], &[1, 2, 3, 4, 5, 6]);
    }

    #[tokio::test]
    async fn test_reject_get_info() {
        let config = DummyConfig {
            faults: Faults::REJECT_GET_INFO,
            ..Default::default()
        };
        let hub = DummyHub::new(config);
        let mut rx = hub.connect().await.unwrap();
        hub.send(&Request::GetInfo.encode(), true).await.unwrap();
        assert_eq!(
            next_response(&mut rx).await,
            Response::Error(hubflash_core::protocol::Command::GetInfo)
        );
    }

    #[tokio::test]
    async fn test_reboot_drops_link() {
        let hub = DummyHub::new_default();
        let mut rx = hub.connect().await.unwrap();
        hub.send(&Request::Reboot.encode(), false).await.unwrap();
        assert_eq!(rx.recv().await, Some(LinkEvent::Dropped));
        assert!(hub.rebooted());
        assert_eq!(
            hub.send(&Request::GetInfo.encode(), true).await,
            Err(SendFailure::NotConnected)
        );
    }

    #[test]
    fn test_parse_faults() {
        assert_eq!(Faults::parse("drop-erase-reply"), Some(Faults::DROP_ERASE_REPLY));
        assert_eq!(Faults::parse("FAIL_SEND"), Some(Faults::FAIL_SEND));
        assert_eq!(Faults::parse("nope"), None);
    }
}
