//! Flashing orchestration
//!
//! One run goes Connecting, Identifying, ResolvingFirmware, Erasing,
//! Initializing, Programming, Verifying, Rebooting. Every step can end the
//! run; all failures share one cleanup path that stops the correlator,
//! closes the link if it is still up and then reports the failure once.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;

use hubflash_core::checksum::RunningXor;
use hubflash_core::firmware::{build_image, Compiler, FirmwareImage, FirmwarePackage};
use hubflash_core::protocol::{
    BootloaderInfo, Command, ProtectionLevel, Request, Response, ResultCode,
};
use hubflash_core::{FlashConfig, HubProfile};
use hubflash_lwp3::Connection;

use crate::correlator::Correlator;
use crate::error::{FailReason, HubError};
use crate::events::{FlashEvent, FlashObserver};
use crate::ids::MessageIds;
use crate::mpy::MpyCross;
use crate::plan::PacketPlan;
use crate::source::FirmwareSource;

/// What to flash
#[derive(Debug, Clone, Default)]
pub struct FlashRequest {
    /// Firmware package, or `None` to use the bundled firmware for the hub
    pub package: Option<FirmwarePackage>,
    /// User program replacing the package's `main.py`
    pub program: Option<String>,
    /// Custom hub name
    pub hub_name: Option<String>,
}

/// Identity of a hub in bootloader mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubIdentity {
    /// Bootloader info
    pub info: BootloaderInfo,
    /// Flash protection, `None` if the bootloader does not report it
    pub protection: Option<ProtectionLevel>,
}

/// Drives flashing runs over one connection
///
/// Runs must not overlap on the same connection.
pub struct Flasher {
    connection: Connection,
    config: FlashConfig,
    ids: MessageIds,
    source: Option<Arc<dyn FirmwareSource>>,
    compiler: Arc<dyn Compiler + Send + Sync>,
}

impl Flasher {
    /// Create a flasher with the built-in hub profiles
    pub fn new(connection: Connection) -> Self {
        Self {
            connection,
            config: FlashConfig::default(),
            ids: MessageIds::new(),
            source: None,
            compiler: Arc::new(MpyCross::default()),
        }
    }

    /// Use a different configuration
    pub fn with_config(mut self, config: FlashConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a shared id counter
    pub fn with_ids(mut self, ids: MessageIds) -> Self {
        self.ids = ids;
        self
    }

    /// Look up firmware here when a request has no package
    pub fn with_source(mut self, source: impl FirmwareSource + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Compile user programs with `compiler`
    pub fn with_compiler(mut self, compiler: impl Compiler + Send + Sync + 'static) -> Self {
        self.compiler = Arc::new(compiler);
        self
    }

    /// Flash a hub
    ///
    /// Reports progress to `observer` and ends with exactly one
    /// [`FlashEvent::Finished`] or [`FlashEvent::Failed`].
    pub async fn flash(
        &self,
        request: FlashRequest,
        observer: &dyn FlashObserver,
    ) -> Result<(), FailReason> {
        let mut slot = None;
        let result = AssertUnwindSafe(self.run(&request, &mut slot, observer))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(FailReason::Unknown(panic_message(&*panic))));

        self.teardown(slot).await;
        match result {
            Ok(()) => {
                log::info!("Flashing finished");
                observer.on_event(&FlashEvent::Finished);
                Ok(())
            }
            Err(reason) => {
                log::error!("Flashing failed: {}", reason);
                observer.on_event(&FlashEvent::Failed(reason.clone()));
                Err(reason)
            }
        }
    }

    /// Query a hub without changing it
    ///
    /// Connects, reads the bootloader info and flash protection, then tells
    /// the bootloader to disconnect.
    pub async fn identify(&self) -> Result<HubIdentity, FailReason> {
        let subscription = self
            .connection
            .connect()
            .await
            .map_err(FailReason::FailedToConnect)?;
        let correlator = Correlator::start(self.connection.clone(), subscription, self.ids.clone());

        let result = self.query(&correlator).await;
        if result.is_ok() {
            let id = correlator.send(Request::Disconnect);
            if correlator.wait_for_did_request(id).await.is_ok() {
                correlator
                    .wait_for_link_drop(self.config.timeouts.response)
                    .await;
            }
        }

        self.teardown(Some(correlator)).await;
        result
    }

    async fn query(&self, correlator: &Correlator) -> Result<HubIdentity, FailReason> {
        let info = self.get_info(correlator).await?;
        let protection = match exchange(
            correlator,
            Request::GetFlashState,
            self.config.timeouts.response,
        )
        .await
        {
            Ok(Response::FlashState(level)) => Some(level),
            Ok(other) => return Err(unexpected(&other)),
            Err(FailReason::HubError(HubError::UnknownCommand)) => {
                log::info!("Bootloader does not report flash protection");
                None
            }
            Err(e) => return Err(e),
        };
        Ok(HubIdentity { info, protection })
    }

    async fn teardown(&self, correlator: Option<Correlator>) {
        if let Some(correlator) = correlator {
            correlator.shutdown();
        }
        if self.connection.is_connected() {
            self.connection.disconnect().await;
        }
    }

    async fn run(
        &self,
        request: &FlashRequest,
        slot: &mut Option<Correlator>,
        observer: &dyn FlashObserver,
    ) -> Result<(), FailReason> {
        let prebuilt = match &request.package {
            Some(package) => Some(self.build(package, request)?),
            None => None,
        };

        log::debug!("Connecting");
        let subscription = self
            .connection
            .connect()
            .await
            .map_err(FailReason::FailedToConnect)?;
        let correlator = &*slot.insert(Correlator::start(
            self.connection.clone(),
            subscription,
            self.ids.clone(),
        ));

        log::debug!("Identifying");
        let info = self.get_info(correlator).await?;
        let profile = self.config.profile(info.hub_type);

        let image = match prebuilt {
            Some(image) => image,
            None => self.resolve(&profile, request)?,
        };
        if image.device_id() != info.hub_type {
            return Err(FailReason::DeviceMismatch {
                expected: image.device_id(),
                actual: info.hub_type,
            });
        }

        observer.on_event(&FlashEvent::Started);

        log::debug!("Erasing");
        let erase = correlator.request(Request::Erase, profile.erase_ack());
        let (_, reply) = futures::try_join!(
            correlator.wait_for_did_request(erase),
            correlator.wait_for_response(Command::EraseFlash, self.config.timeouts.erase),
        )?;
        match reply {
            Response::Erase(code) if code.is_ok() => {}
            Response::Erase(code) => {
                log::error!("Erase failed with {:?}", code);
                return Err(HubError::EraseFailed.into());
            }
            other => return Err(unexpected(&other)),
        }

        log::debug!("Initializing for {} bytes", image.len());
        let init = Request::Init {
            firmware_size: image.len() as u32,
        };
        match exchange(correlator, init, self.config.timeouts.response).await? {
            Response::Init(ResultCode::Ok) => {}
            Response::Init(code) => {
                log::error!("Init failed with {:?}", code);
                return Err(HubError::InitFailed.into());
            }
            other => return Err(unexpected(&other)),
        }

        let checksum = self
            .program(correlator, &profile, &info, &image, observer)
            .await?;

        log::debug!("Verifying");
        let reply = correlator
            .wait_for_response(
                Command::ProgramFlash,
                self.config.timeouts.program,
            )
            .await?;
        match reply {
            Response::Program { checksum: actual, count } => {
                let expected = image.len() as u32;
                if count != expected {
                    return Err(HubError::CountMismatch {
                        expected,
                        actual: count,
                    }
                    .into());
                }
                if actual != checksum {
                    return Err(HubError::ChecksumMismatch {
                        expected: checksum,
                        actual,
                    }
                    .into());
                }
            }
            other => return Err(unexpected(&other)),
        }
        observer.on_event(&FlashEvent::Progress(1.0));

        log::debug!("Rebooting");
        let reboot = correlator.send(Request::Reboot);
        correlator.wait_for_did_request(reboot).await?;
        if !correlator
            .wait_for_link_drop(self.config.timeouts.response)
            .await
        {
            log::debug!("Hub did not drop the link after reboot");
        }
        Ok(())
    }

    /// Send the image and return the running checksum after the last packet
    async fn program(
        &self,
        correlator: &Correlator,
        profile: &HubProfile,
        info: &BootloaderInfo,
        image: &FirmwareImage,
        observer: &dyn FlashObserver,
    ) -> Result<u8, FailReason> {
        log::debug!(
            "Programming {} bytes at 0x{:08X} in {} byte packets",
            image.len(),
            info.start_address,
            profile.max_program_size
        );
        let mut checksum = RunningXor::new();
        let plan = PacketPlan::new(
            image.data(),
            info.start_address,
            profile.max_program_size,
            profile.checksum_interval,
        );

        for packet in plan {
            checksum.update(packet.payload);
            let id = correlator.request(
                Request::Program {
                    address: packet.address,
                    payload: packet.payload.to_vec(),
                },
                false,
            );
            correlator.wait_for_did_request(id).await?;
            observer.on_event(&FlashEvent::Progress(
                packet.start as f32 / image.len() as f32,
            ));

            if packet.poll_checksum {
                let reply =
                    exchange(correlator, Request::GetChecksum, self.config.timeouts.checksum)
                        .await?;
                match reply {
                    Response::Checksum(actual) if actual == checksum.value() => {
                        log::trace!("Checksum ok after packet {}", packet.number);
                    }
                    Response::Checksum(actual) => {
                        return Err(HubError::ChecksumMismatch {
                            expected: checksum.value(),
                            actual,
                        }
                        .into());
                    }
                    other => return Err(unexpected(&other)),
                }
            }
        }
        Ok(checksum.value())
    }

    async fn get_info(&self, correlator: &Correlator) -> Result<BootloaderInfo, FailReason> {
        match exchange(correlator, Request::GetInfo, self.config.timeouts.response).await? {
            Response::Info(info) => {
                log::info!(
                    "Connected to {} (bootloader v{}.{}.{}, flash 0x{:08X}..0x{:08X})",
                    info.hub_type,
                    info.version >> 24,
                    (info.version >> 16) & 0xFF,
                    info.version & 0xFFFF,
                    info.start_address,
                    info.end_address
                );
                Ok(info)
            }
            other => Err(unexpected(&other)),
        }
    }

    fn resolve(
        &self,
        profile: &HubProfile,
        request: &FlashRequest,
    ) -> Result<FirmwareImage, FailReason> {
        let source = self.source.as_ref().ok_or(FailReason::NoFirmware)?;
        let location = source.locate(profile).ok_or(FailReason::NoFirmware)?;
        log::debug!("Fetching firmware for {} from {}", profile.name, location.display());
        let package = source.fetch(&location)?;
        self.build(&package, request)
    }

    fn build(
        &self,
        package: &FirmwarePackage,
        request: &FlashRequest,
    ) -> Result<FirmwareImage, FailReason> {
        let image = build_image(
            package,
            request.program.as_deref(),
            request.hub_name.as_deref(),
            &*self.compiler,
        )?;
        Ok(image)
    }
}

/// Queue a request with its usual ack mode and wait for the write and the reply
async fn exchange(
    correlator: &Correlator,
    request: Request,
    timeout: Duration,
) -> Result<Response, FailReason> {
    let command = request.command();
    let id = correlator.send(request);
    let (_, response) = futures::try_join!(
        correlator.wait_for_did_request(id),
        correlator.wait_for_response(command, timeout),
    )?;
    Ok(response)
}

fn unexpected(response: &Response) -> FailReason {
    FailReason::Unknown(format!("unexpected reply {:?}", response))
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;

    use hubflash_core::firmware::{FIRMWARE_BASE, METADATA_JSON};
    use hubflash_core::HubType;
    use hubflash_dummy::{DummyConfig, DummyHub, Faults};
    use hubflash_lwp3::ConnectFailure;

    use crate::source::BundledFirmware;

    struct FixedCompiler;

    impl Compiler for FixedCompiler {
        fn compile(&self, _: &str, _: u32, _: &[String]) -> Result<Vec<u8>, Vec<String>> {
            Ok(vec![0xAB; 32])
        }
    }

    struct PanickingCompiler;

    impl Compiler for PanickingCompiler {
        fn compile(&self, _: &str, _: u32, _: &[String]) -> Result<Vec<u8>, Vec<String>> {
            panic!("compiler crashed")
        }
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<FlashEvent>>);

    impl Recorder {
        fn events(&self) -> Vec<FlashEvent> {
            self.0.lock().unwrap().clone()
        }

        fn failures(&self) -> Vec<FailReason> {
            self.events()
                .into_iter()
                .filter_map(|e| match e {
                    FlashEvent::Failed(reason) => Some(reason),
                    _ => None,
                })
                .collect()
        }
    }

    impl FlashObserver for Recorder {
        fn on_event(&self, event: &FlashEvent) {
            self.0.lock().unwrap().push(event.clone());
        }
    }

    fn v1_metadata(checksum: &str) -> String {
        format!(
            r#"{{
                "metadata-version": "1.1.0",
                "device-id": 64,
                "checksum-type": "{checksum}",
                "firmware-version": "1.2.3",
                "max-firmware-size": 1024,
                "mpy-abi-version": 5,
                "mpy-cross-options": [],
                "user-mpy-offset": 100,
                "hub-name-offset": 54,
                "max-hub-name-size": 10
            }}"#
        )
    }

    const V2_CITY_METADATA: &str = r#"{
        "metadata-version": "2.0.0",
        "device-id": 65,
        "firmware-version": "3.0.0",
        "checksum-type": "crc32",
        "checksum-size": 1024,
        "hub-name-offset": 54,
        "hub-name-size": 10
    }"#;

    fn move_package() -> FirmwarePackage {
        FirmwarePackage::from_parts(
            vec![0x5A; 64],
            v1_metadata("sum"),
            Some("print('hi')".to_string()),
        )
    }

    fn flasher(hub: &Arc<DummyHub>) -> Flasher {
        Flasher::new(Connection::new(hub.clone())).with_compiler(FixedCompiler)
    }

    fn with_package(package: FirmwarePackage) -> FlashRequest {
        FlashRequest {
            package: Some(package),
            ..Default::default()
        }
    }

    fn hub_with(faults: Faults) -> Arc<DummyHub> {
        Arc::new(DummyHub::new(DummyConfig {
            faults,
            ..Default::default()
        }))
    }

    #[tokio::test]
    async fn test_flash_move_hub() {
        let hub = Arc::new(DummyHub::new_default());
        let recorder = Recorder::default();
        let package = move_package();
        let expected = build_image(&package, None, None, &FixedCompiler).unwrap();

        flasher(&hub)
            .flash(with_package(package), &recorder)
            .await
            .unwrap();

        let requests = hub.requests();
        assert_eq!(requests[0], Request::GetInfo);
        assert_eq!(requests[1], Request::Erase);
        assert_eq!(requests[2], Request::Init { firmware_size: 140 });
        // 10 packets of 14 bytes with a checksum poll after the 8th
        assert!(requests[3..11]
            .iter()
            .all(|r| matches!(r, Request::Program { .. })));
        assert_eq!(requests[11], Request::GetChecksum);
        assert!(requests[12..14]
            .iter()
            .all(|r| matches!(r, Request::Program { .. })));
        assert_eq!(requests[14], Request::Reboot);
        assert_eq!(requests.len(), 15);

        assert_eq!(
            requests[3],
            Request::Program {
                address: 0x0800_5000,
                payload: expected.data()[..14].to_vec(),
            }
        );
        assert_eq!(&hub.flash()[..140], expected.data());
        assert!(hub.rebooted());
        assert_eq!(hub.disconnect_count(), 0);

        // Each packet reports its start offset, 1.0 only comes after verification
        let mut expected_events = vec![FlashEvent::Started];
        expected_events.extend((0..10).map(|k| FlashEvent::Progress(k as f32 / 10.0)));
        expected_events.push(FlashEvent::Progress(1.0));
        expected_events.push(FlashEvent::Finished);
        assert_eq!(recorder.events(), expected_events);
    }

    #[tokio::test]
    async fn test_flash_bundled_city_firmware() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("cityhub");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join(FIRMWARE_BASE), [0x11u8; 64]).unwrap();
        fs::write(dir.join(METADATA_JSON), V2_CITY_METADATA).unwrap();

        let hub = Arc::new(DummyHub::new(DummyConfig::for_hub(HubType::CityHub)));
        let recorder = Recorder::default();
        let request = FlashRequest {
            hub_name: Some("my hub".to_string()),
            ..Default::default()
        };

        flasher(&hub)
            .with_source(BundledFirmware::new(root.path()))
            .flash(request, &recorder)
            .await
            .unwrap();

        let requests = hub.requests();
        assert_eq!(requests[1], Request::Erase);
        assert_eq!(hub.ack_modes()[1], !cfg!(windows));
        assert_eq!(requests[2], Request::Init { firmware_size: 68 });
        // 68 bytes in 32 byte packets, too few for a checksum poll
        let programs = requests
            .iter()
            .filter(|r| matches!(r, Request::Program { .. }))
            .count();
        assert_eq!(programs, 3);
        assert!(!requests.contains(&Request::GetChecksum));
        assert_eq!(&hub.flash()[54..60], b"my hub");
        assert_eq!(recorder.events().last(), Some(&FlashEvent::Finished));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_erase_reply_is_tolerated() {
        let hub = hub_with(Faults::DROP_ERASE_REPLY);
        let recorder = Recorder::default();
        flasher(&hub)
            .flash(with_package(move_package()), &recorder)
            .await
            .unwrap();
        assert!(hub.rebooted());
        assert!(recorder.failures().is_empty());
    }

    #[tokio::test]
    async fn test_device_mismatch_disconnects() {
        let hub = Arc::new(DummyHub::new(DummyConfig::for_hub(HubType::CityHub)));
        let recorder = Recorder::default();
        let err = flasher(&hub)
            .flash(with_package(move_package()), &recorder)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            FailReason::DeviceMismatch {
                expected: HubType::MoveHub,
                actual: HubType::CityHub,
            }
        );
        assert_eq!(hub.requests(), [Request::GetInfo]);
        assert_eq!(hub.disconnect_count(), 1);
        assert_eq!(recorder.events(), [FlashEvent::Failed(err)]);
    }

    #[tokio::test]
    async fn test_rejected_get_info() {
        let hub = hub_with(Faults::REJECT_GET_INFO);
        let recorder = Recorder::default();
        let err = flasher(&hub)
            .flash(with_package(move_package()), &recorder)
            .await
            .unwrap_err();

        assert_eq!(err, FailReason::HubError(HubError::UnknownCommand));
        assert_eq!(hub.disconnect_count(), 1);
        assert_eq!(recorder.failures(), [err]);
    }

    #[tokio::test]
    async fn test_bad_metadata_before_connecting() {
        let hub = Arc::new(DummyHub::new_default());
        let recorder = Recorder::default();
        let package = FirmwarePackage::from_parts(vec![0; 64], v1_metadata("unknown-algo"), None);
        let err = flasher(&hub)
            .flash(with_package(package), &recorder)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            FailReason::BadMetadata {
                property: "checksum-type",
                ..
            }
        ));
        assert_eq!(hub.connect_count(), 0);
        assert_eq!(recorder.failures(), [err]);
    }

    #[tokio::test]
    async fn test_bad_bundled_metadata_after_get_info() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("movehub");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join(FIRMWARE_BASE), [0u8; 64]).unwrap();
        fs::write(dir.join(METADATA_JSON), v1_metadata("unknown-algo")).unwrap();

        let hub = Arc::new(DummyHub::new_default());
        let recorder = Recorder::default();
        let err = flasher(&hub)
            .with_source(BundledFirmware::new(root.path()))
            .flash(FlashRequest::default(), &recorder)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            FailReason::BadMetadata {
                property: "checksum-type",
                ..
            }
        ));
        assert_eq!(hub.requests(), [Request::GetInfo]);
        assert_eq!(hub.disconnect_count(), 1);
        assert_eq!(recorder.failures(), [err]);
    }

    #[tokio::test]
    async fn test_erase_and_init_failures() {
        for (faults, expected) in [
            (Faults::FAIL_ERASE, HubError::EraseFailed),
            (Faults::FAIL_INIT, HubError::InitFailed),
        ] {
            let hub = hub_with(faults);
            let err = flasher(&hub)
                .flash(with_package(move_package()), &Recorder::default())
                .await
                .unwrap_err();
            assert_eq!(err, FailReason::HubError(expected));
            assert_eq!(hub.disconnect_count(), 1);
        }
    }

    #[tokio::test]
    async fn test_checksum_poll_mismatch() {
        let hub = hub_with(Faults::CORRUPT_CHECKSUM);
        let err = flasher(&hub)
            .flash(with_package(move_package()), &Recorder::default())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            FailReason::HubError(HubError::ChecksumMismatch { .. })
        ));
        // Stopped at the poll after the 8th packet
        assert_eq!(hub.requests().last(), Some(&Request::GetChecksum));
        assert!(!hub.rebooted());
    }

    #[tokio::test]
    async fn test_count_mismatch() {
        let hub = hub_with(Faults::SHORT_COUNT);
        let err = flasher(&hub)
            .flash(with_package(move_package()), &Recorder::default())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            FailReason::HubError(HubError::CountMismatch {
                expected: 140,
                actual: 139,
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_program_reply_times_out() {
        let hub = hub_with(Faults::SILENT_PROGRAM);
        let err = flasher(&hub)
            .flash(with_package(move_package()), &Recorder::default())
            .await
            .unwrap_err();
        assert_eq!(err, FailReason::TimedOut);
        assert!(!hub.rebooted());
        assert_eq!(hub.disconnect_count(), 1);
    }

    #[tokio::test]
    async fn test_send_failure() {
        let hub = hub_with(Faults::FAIL_SEND);
        let err = flasher(&hub)
            .flash(with_package(move_package()), &Recorder::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FailReason::BleError(_)));
        assert_eq!(hub.disconnect_count(), 1);
    }

    #[tokio::test]
    async fn test_connect_failure() {
        let hub = Arc::new(DummyHub::new(DummyConfig {
            connect_failure: Some(ConnectFailure::NoBluetooth),
            ..Default::default()
        }));
        let recorder = Recorder::default();
        let err = flasher(&hub)
            .flash(with_package(move_package()), &recorder)
            .await
            .unwrap_err();
        assert_eq!(err, FailReason::FailedToConnect(ConnectFailure::NoBluetooth));
        assert_eq!(hub.disconnect_count(), 0);
        assert_eq!(recorder.events(), [FlashEvent::Failed(err)]);
    }

    #[tokio::test]
    async fn test_no_bundled_firmware() {
        let hub = Arc::new(DummyHub::new(DummyConfig::for_hub(HubType::Other(0x12))));
        let root = tempfile::tempdir().unwrap();
        let err = flasher(&hub)
            .with_source(BundledFirmware::new(root.path()))
            .flash(FlashRequest::default(), &Recorder::default())
            .await
            .unwrap_err();
        assert_eq!(err, FailReason::NoFirmware);
        assert_eq!(hub.disconnect_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_bundled_package() {
        let hub = Arc::new(DummyHub::new_default());
        let root = tempfile::tempdir().unwrap();
        let err = flasher(&hub)
            .with_source(BundledFirmware::new(root.path()))
            .flash(FlashRequest::default(), &Recorder::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FailReason::FailedToFetch(_)));
    }

    #[tokio::test]
    async fn test_panic_reported_as_unknown() {
        let hub = Arc::new(DummyHub::new_default());
        let recorder = Recorder::default();
        let err = Flasher::new(Connection::new(hub.clone()))
            .with_compiler(PanickingCompiler)
            .flash(with_package(move_package()), &recorder)
            .await
            .unwrap_err();
        assert_eq!(err, FailReason::Unknown("compiler crashed".to_string()));
        assert_eq!(hub.connect_count(), 0);
        assert_eq!(recorder.failures(), [err]);
    }

    #[tokio::test]
    async fn test_identify() {
        let hub = Arc::new(DummyHub::new_default());
        let identity = flasher(&hub).identify().await.unwrap();

        assert_eq!(identity.info.hub_type, HubType::MoveHub);
        assert_eq!(identity.info.start_address, 0x0800_5000);
        assert_eq!(identity.protection, Some(ProtectionLevel::None));
        assert_eq!(
            hub.requests(),
            [Request::GetInfo, Request::GetFlashState, Request::Disconnect]
        );
        assert!(!hub.rebooted());
    }

    #[tokio::test]
    async fn test_identify_without_flash_state() {
        let hub = hub_with(Faults::NO_FLASH_STATE);
        let identity = flasher(&hub).identify().await.unwrap();
        assert_eq!(identity.protection, None);
    }

    #[tokio::test]
    async fn test_runs_share_message_ids() {
        let hub = Arc::new(DummyHub::new_default());
        let ids = MessageIds::new();
        let flasher = flasher(&hub).with_ids(ids.clone());
        flasher.identify().await.unwrap();
        // GetInfo, GetFlashState, Disconnect
        assert_eq!(ids.next(), 3);
    }
}
