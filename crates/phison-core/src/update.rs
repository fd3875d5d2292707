//! Image execution and firmware update orchestration.
//!
//! The update is a fixed linear sequence. Every step that resets the
//! controller is followed by [`SETTLE_DELAY`]; any rejection aborts the
//! whole sequence and leaves the device wherever it stopped.

use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{info, instrument};

use crate::device::PhisonDevice;
use crate::error::{PhisonError, Result};
use crate::events::{LogLevel, PhisonEvent, PhisonObserver, TracingObserver, UpdatePhase};
use crate::mode::DeviceMode;
use crate::protocol::constants::{
    DEFAULT_BODY_SELECTOR, DEFAULT_HEADER_SELECTOR, FIRMWARE_BODY_SELECTOR,
    FIRMWARE_HEADER_SELECTOR, SETTLE_DELAY,
};
use crate::transport::ScsiTransport;

/// Source of the settle waits.
pub trait Clock: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Real wall-clock sleeps.
pub struct ThreadClock;

impl Clock for ThreadClock {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Firmware-update control selector pairs, in issue order after each stage.
const COMMIT_AFTER_FIRST_STAGE: (u8, u8) = (0x01, 0x00);
const COMMIT_AFTER_SECOND_STAGE: (u8, u8) = (0x01, 0x01);
const COMMIT_FINAL: [(u8, u8); 2] = [(0x00, 0x00), (0x00, 0x01)];

/// Drives a device through image execution and firmware updates.
pub struct FirmwareUpdater<'a, T: ScsiTransport, O: PhisonObserver, C: Clock> {
    device: &'a mut PhisonDevice<T>,
    observer: Arc<O>,
    clock: C,
    phase: UpdatePhase,
}

impl<'a, T: ScsiTransport> FirmwareUpdater<'a, T, TracingObserver, ThreadClock> {
    /// Updater with tracing output and real sleeps.
    pub fn new(device: &'a mut PhisonDevice<T>) -> Self {
        Self::with_parts(device, Arc::new(TracingObserver), ThreadClock)
    }
}

impl<'a, T: ScsiTransport, O: PhisonObserver, C: Clock> FirmwareUpdater<'a, T, O, C> {
    pub fn with_parts(device: &'a mut PhisonDevice<T>, observer: Arc<O>, clock: C) -> Self {
        Self {
            device,
            observer,
            clock,
            phase: UpdatePhase::Idle,
        }
    }

    pub fn phase(&self) -> UpdatePhase {
        self.phase
    }

    fn emit(&self, event: PhisonEvent) {
        self.observer.on_event(&event);
    }

    fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.emit(PhisonEvent::Log {
            level,
            message: message.into(),
        });
    }

    fn enter(&mut self, phase: UpdatePhase) {
        self.emit(PhisonEvent::PhaseChanged {
            from: self.phase,
            to: phase,
        });
        self.phase = phase;
    }

    fn settle(&self) {
        self.clock.sleep(SETTLE_DELAY);
    }

    fn transfer(&mut self, image: &[u8], header: u8, body: u8, operation: &str) -> Result<()> {
        let observer = Arc::clone(&self.observer);
        let result = self
            .device
            .transfer_data_with_progress(image, header, body, |sent, total| {
                observer.on_event(&PhisonEvent::Progress {
                    operation: operation.to_string(),
                    current: sent as u64,
                    total: total as u64,
                });
            });
        if let Err(e @ (PhisonError::HeaderRejected { .. } | PhisonError::BodyRejected { .. })) =
            &result
        {
            self.log(LogLevel::Warn, format!("{}: {}", operation, e));
        }
        result
    }

    fn control(&mut self, (first, second): (u8, u8)) -> Result<()> {
        self.log(
            LogLevel::Debug,
            format!("Firmware update control {:02X}/{:02X}", first, second),
        );
        self.device.firmware_update_control(first, second)?;
        self.settle();
        Ok(())
    }

    /// Load an image into PRAM and jump to it.
    #[instrument(skip(self, image), fields(len = image.len()))]
    pub fn execute_image(&mut self, image: &[u8]) -> Result<()> {
        self.transfer(image, DEFAULT_HEADER_SELECTOR, DEFAULT_BODY_SELECTOR, "Image")?;
        self.device.jump_to_pram()?;
        self.settle();
        Ok(())
    }

    /// Flash `firmware`, first starting `burner` if the device is not
    /// already running a burner image. Returns the mode after the update.
    #[instrument(skip_all, fields(len = firmware.len(), burner = burner.is_some()))]
    pub fn send_firmware(&mut self, firmware: &[u8], burner: Option<&[u8]>) -> Result<DeviceMode> {
        let mode = self.device.get_run_mode()?;
        self.emit(PhisonEvent::ModeDetected { mode });

        if mode != DeviceMode::Burner {
            let burner = burner.ok_or(PhisonError::BurnerImageRequired { mode })?;
            if mode != DeviceMode::BootMode {
                self.enter(UpdatePhase::SwitchToBootMode);
                self.log(LogLevel::Info, "Switching to boot mode...");
                self.device.jump_to_bootmode()?;
                self.settle();
            }
            self.enter(UpdatePhase::LoadBurner);
            self.log(LogLevel::Info, "Loading burner image...");
            self.execute_image(burner)?;
        }

        self.run_firmware(firmware)
    }

    /// The install sequence proper; expects a running burner.
    pub fn run_firmware(&mut self, firmware: &[u8]) -> Result<DeviceMode> {
        self.enter(UpdatePhase::Reboot);
        self.log(LogLevel::Info, "Rebooting...");
        self.device.jump_to_bootmode()?;
        self.settle();

        self.enter(UpdatePhase::FirstStage);
        self.log(LogLevel::Info, "Sending firmware...");
        self.transfer(
            firmware,
            FIRMWARE_HEADER_SELECTOR,
            FIRMWARE_BODY_SELECTOR,
            "Firmware (1/2)",
        )?;
        self.control(COMMIT_AFTER_FIRST_STAGE)?;

        self.enter(UpdatePhase::SecondStage);
        self.transfer(
            firmware,
            DEFAULT_HEADER_SELECTOR,
            DEFAULT_BODY_SELECTOR,
            "Firmware (2/2)",
        )?;
        self.control(COMMIT_AFTER_SECOND_STAGE)?;

        self.enter(UpdatePhase::Commit);
        for pair in COMMIT_FINAL {
            self.control(pair)?;
        }

        self.enter(UpdatePhase::Execute);
        self.log(LogLevel::Info, "Executing...");
        self.device.jump_to_pram()?;
        self.settle();

        let mode = self.device.get_run_mode()?;
        info!(mode = %mode, "Firmware update finished");
        self.emit(PhisonEvent::ModeDetected { mode });
        self.enter(UpdatePhase::Complete);
        self.emit(PhisonEvent::Complete);
        Ok(mode)
    }

    /// [`execute_image`](Self::execute_image) with the image read from disk.
    pub fn execute_image_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let image = read_image(path.as_ref())?;
        self.execute_image(&image)
    }

    /// [`send_firmware`](Self::send_firmware) with images read from disk.
    pub fn send_firmware_files<P: AsRef<Path>>(
        &mut self,
        firmware: P,
        burner: Option<P>,
    ) -> Result<DeviceMode> {
        let firmware = read_image(firmware.as_ref())?;
        let burner = burner.map(|p| read_image(p.as_ref())).transpose()?;
        self.send_firmware(&firmware, burner.as_deref())
    }
}

fn read_image(path: &Path) -> Result<Vec<u8>> {
    info!(path = %path.display(), "Loading image");
    Ok(std::fs::read(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NullObserver;
    use crate::mode::tests::vendor_info_bytes;
    use crate::transport::{MockTransport, ScsiCall};
    use std::sync::Mutex;

    const VENDOR_INFO_PREFIX: &[u8] = &[0x06, 0x05, 0x00];
    const STATUS_PREFIX: &[u8] = &[0x06, 0xB0];

    /// Records sleeps instead of sleeping.
    #[derive(Default, Clone)]
    struct RecordingClock {
        sleeps: Arc<Mutex<Vec<Duration>>>,
    }

    impl Clock for RecordingClock {
        fn sleep(&self, duration: Duration) {
            self.sleeps.lock().unwrap().push(duration);
        }
    }

    /// Collects emitted events.
    #[derive(Default)]
    struct CollectingObserver {
        events: Mutex<Vec<PhisonEvent>>,
    }

    impl PhisonObserver for CollectingObserver {
        fn on_event(&self, event: &PhisonEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    fn vendor_info(tag: &[u8; 8]) -> Vec<u8> {
        vendor_info_bytes(true, tag, [1, 0, 0])
    }

    fn image(len: usize) -> Vec<u8> {
        (0..len).map(|i| i as u8).collect()
    }

    /// Short name of each call, for sequence checks.
    fn op(call: &ScsiCall) -> String {
        match (call.command[0], call.command[1]) {
            (0x06, 0x05) => "info".into(),
            (0x06, 0xBF) => "boot".into(),
            (0x06, 0xB3) => "pram".into(),
            (0x06, 0xB0) => "status".into(),
            (0x06, 0xB1) => format!("load{:02X}", call.command[2]),
            (0x06, 0xEE) => format!("fw{:02X}{:02X}", call.command[2], call.command[3]),
            (a, b) => format!("{:02X}{:02X}", a, b),
        }
    }

    fn ops(mock: &MockTransport) -> Vec<String> {
        mock.calls().iter().map(op).collect()
    }

    /// Status script for `n` single-chunk transfers.
    fn statuses(n: usize) -> Vec<Vec<u8>> {
        let mut v = Vec::new();
        for _ in 0..n {
            v.push(vec![0x55; 8]);
            v.push(vec![0xA5; 8]);
        }
        // Anything past the script is a rejection
        v.push(vec![0x00; 8]);
        v
    }

    fn scripted(modes: Vec<Vec<u8>>, transfers: usize) -> MockTransport {
        let mock = MockTransport::strict();
        mock.respond_seq(VENDOR_INFO_PREFIX, modes);
        mock.respond_seq(STATUS_PREFIX, statuses(transfers));
        mock.respond_to(&[0x06, 0xEE], &[0u8; 72]);
        mock
    }

    #[test]
    fn test_execute_image() {
        let mock = scripted(vec![vendor_info(b" PRAM   ")], 1);
        let mut dev = PhisonDevice::new(&mock);
        let clock = RecordingClock::default();
        let mut updater =
            FirmwareUpdater::with_parts(&mut dev, Arc::new(NullObserver), clock.clone());

        updater.execute_image(&image(1024 + 0x400)).unwrap();

        assert_eq!(ops(&mock), vec!["load03", "status", "load02", "status", "pram"]);
        assert_eq!(*clock.sleeps.lock().unwrap(), vec![SETTLE_DELAY]);
    }

    #[test]
    fn test_send_firmware_from_burner() {
        let mock = scripted(
            vec![vendor_info(b" FW BURN"), vendor_info(b"FIRMWARE")],
            2,
        );
        let mut dev = PhisonDevice::new(&mock);
        let clock = RecordingClock::default();
        let observer = Arc::new(CollectingObserver::default());
        let mut updater = FirmwareUpdater::with_parts(&mut dev, observer.clone(), clock.clone());

        let mode = updater.send_firmware(&image(1024 + 0x200), None).unwrap();
        assert_eq!(mode, DeviceMode::Firmware);
        assert_eq!(updater.phase(), UpdatePhase::Complete);

        assert_eq!(
            ops(&mock),
            vec![
                "info", "boot", "load01", "status", "load00", "status", "fw0100", "load03",
                "status", "load02", "status", "fw0101", "fw0000", "fw0001", "pram", "info",
            ]
        );
        assert_eq!(clock.sleeps.lock().unwrap().len(), 6);
        assert!(clock.sleeps.lock().unwrap().iter().all(|d| *d == SETTLE_DELAY));

        let events = observer.events.lock().unwrap();
        assert!(matches!(events.last(), Some(PhisonEvent::Complete)));
        assert!(events.iter().any(|e| matches!(
            e,
            PhisonEvent::Progress { operation, current: 0x200, total: 0x200 }
                if operation == "Firmware (2/2)"
        )));
    }

    #[test]
    fn test_send_firmware_from_boot_mode_loads_burner() {
        let mock = scripted(
            vec![vendor_info(b" PRAM   "), vendor_info(b"FIRMWARE")],
            3,
        );
        let mut dev = PhisonDevice::new(&mock);
        let clock = RecordingClock::default();
        let mut updater =
            FirmwareUpdater::with_parts(&mut dev, Arc::new(NullObserver), clock.clone());

        updater
            .send_firmware(&image(1024 + 0x200), Some(&image(1024 + 0x200)))
            .unwrap();

        let seq = ops(&mock);
        // Already in boot mode: no jump before the burner
        assert_eq!(&seq[..6], &["info", "load03", "status", "load02", "status", "pram"]);
        assert_eq!(seq[6], "boot");
        assert_eq!(clock.sleeps.lock().unwrap().len(), 7);
    }

    #[test]
    fn test_send_firmware_from_firmware_switches_first() {
        let mock = scripted(
            vec![vendor_info(b"FIRMWARE"), vendor_info(b"FIRMWARE")],
            3,
        );
        let mut dev = PhisonDevice::new(&mock);
        let clock = RecordingClock::default();
        let mut updater =
            FirmwareUpdater::with_parts(&mut dev, Arc::new(NullObserver), clock.clone());

        updater
            .send_firmware(&image(1024 + 0x200), Some(&image(1024 + 0x200)))
            .unwrap();

        let seq = ops(&mock);
        assert_eq!(&seq[..3], &["info", "boot", "load03"]);
        assert_eq!(clock.sleeps.lock().unwrap().len(), 8);
    }

    #[test]
    fn test_send_firmware_requires_burner() {
        let mock = scripted(vec![vendor_info(b" PRAM   ")], 0);
        let mut dev = PhisonDevice::new(&mock);
        let mut updater =
            FirmwareUpdater::with_parts(&mut dev, Arc::new(NullObserver), RecordingClock::default());

        let err = updater.send_firmware(&image(2048), None).unwrap_err();
        assert!(matches!(
            err,
            PhisonError::BurnerImageRequired {
                mode: DeviceMode::BootMode
            }
        ));
        assert_eq!(ops(&mock), vec!["info"]);
    }

    #[test]
    fn test_unmarked_device_needs_burner() {
        let mock = MockTransport::strict();
        mock.respond_to(
            VENDOR_INFO_PREFIX,
            &vendor_info_bytes(false, b" FW BURN", [1, 0, 0]),
        );
        let mut dev = PhisonDevice::new(&mock);
        let mut updater =
            FirmwareUpdater::with_parts(&mut dev, Arc::new(NullObserver), RecordingClock::default());

        assert!(matches!(
            updater.send_firmware(&image(2048), None),
            Err(PhisonError::BurnerImageRequired {
                mode: DeviceMode::Firmware
            })
        ));
    }

    #[test]
    fn test_rejection_aborts_sequence() {
        // Only the first transfer is accepted
        let mock = scripted(vec![vendor_info(b" FW BURN")], 1);
        let mut dev = PhisonDevice::new(&mock);
        let clock = RecordingClock::default();
        let observer = Arc::new(CollectingObserver::default());
        let mut updater = FirmwareUpdater::with_parts(&mut dev, observer.clone(), clock.clone());

        let err = updater.send_firmware(&image(1024 + 0x200), None).unwrap_err();
        assert!(matches!(err, PhisonError::HeaderRejected { status: 0x00 }));
        assert_eq!(updater.phase(), UpdatePhase::SecondStage);

        let seq = ops(&mock);
        assert_eq!(seq.last().map(String::as_str), Some("status"));
        assert!(!seq.iter().any(|s| s == "fw0101" || s == "pram"));
        assert_eq!(clock.sleeps.lock().unwrap().len(), 2);

        let events = observer.events.lock().unwrap();
        assert!(events.iter().any(|e| matches!(
            e,
            PhisonEvent::Log { level: LogLevel::Warn, message }
                if message.starts_with("Firmware (2/2)")
        )));
    }

    #[test]
    fn test_send_firmware_files() {
        let mock = scripted(
            vec![vendor_info(b" FW BURN"), vendor_info(b"FIRMWARE")],
            2,
        );
        let dir = std::env::temp_dir();
        let fw_path = dir.join(format!("phison-fw-{}.bin", std::process::id()));
        std::fs::write(&fw_path, image(1024 + 0x200)).unwrap();

        let mut dev = PhisonDevice::new(&mock);
        let mut updater =
            FirmwareUpdater::with_parts(&mut dev, Arc::new(NullObserver), RecordingClock::default());
        let result = updater.send_firmware_files(&fw_path, None);
        std::fs::remove_file(&fw_path).unwrap();

        assert_eq!(result.unwrap(), DeviceMode::Firmware);
        let loads = mock.calls_matching(&[0x06, 0xB1]);
        assert_eq!(loads.len(), 4);
    }

    #[test]
    fn test_missing_image_file() {
        let mock = MockTransport::strict();
        let mut dev = PhisonDevice::new(&mock);
        let mut updater =
            FirmwareUpdater::with_parts(&mut dev, Arc::new(NullObserver), RecordingClock::default());
        assert!(matches!(
            updater.execute_image_file("/nonexistent/phison/burner.bin"),
            Err(PhisonError::Io(_))
        ));
        assert_eq!(mock.call_count(), 0);
    }
}
