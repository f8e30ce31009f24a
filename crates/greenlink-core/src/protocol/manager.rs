//! Serial manager
//!
//! Composes the port, the outbound command queue, the background reader and
//! the reading log into the engine the presentation shell drives. One
//! [`SerialManager::update`] call is one tick; the shell invokes it from a
//! periodic timer, nominally every 100 ms.

use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};

use crate::config::{SerialConfig, CONFIG_FILE};
use crate::datalog::DataLogger;
use crate::task::TaskSlot;

use super::codec::{decode, Command, InboundEvent};
use super::reader::{spawn_read_cycle, ReaderResult};
use super::serial::{open_port, SerialLink};
use super::PortError;

/// Scheduler delays, in ticks of the caller's update period.
///
/// Tuned empirically against the greenhouse firmware. Draining the command
/// backlog gets the longest pause so the controller can act between writes;
/// polling an idle line gets the shortest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerTiming {
    /// Ticks to wait after writing a queued command
    pub write_delay: u32,
    /// Ticks to wait after starting a read cycle
    pub read_delay: u32,
    /// Ticks to wait while a read cycle is still outstanding
    pub idle_delay: u32,
}

impl Default for SchedulerTiming {
    fn default() -> Self {
        Self {
            write_delay: 5,
            read_delay: 2,
            idle_delay: 1,
        }
    }
}

/// Receiver for parsed readings.
///
/// The presentation shell implements this; the manager calls it from
/// [`SerialManager::update`] with every valid reply, already parsed and
/// kind-tagged. Invalid replies never reach the sink.
pub trait EventSink {
    /// Handle one parsed reading
    fn on_reading(&mut self, event: &InboundEvent);
}

/// A pre-formatted wire command waiting in the outbound queue
#[derive(Debug, Clone, PartialEq, Eq)]
struct OutboundCommand(String);

/// The serial command/response engine.
///
/// Owns the configuration, the port handle, the strict-FIFO outbound queue
/// and the single read worker slot. All user-visible state changes happen
/// on the caller's context inside [`SerialManager::update`]; the worker
/// threads only touch the mutex-guarded shared fields.
pub struct SerialManager {
    config: SerialConfig,
    port: Option<Arc<Mutex<Box<dyn SerialLink>>>>,
    queue: VecDeque<OutboundCommand>,
    timer: u32,
    timing: SchedulerTiming,
    reader: TaskSlot,
    reader_result: Arc<Mutex<ReaderResult>>,
    completion_tx: Sender<()>,
    completion_rx: Receiver<()>,
    sink: Option<Box<dyn EventSink>>,
    logger: Option<DataLogger>,
}

impl SerialManager {
    /// Create a disconnected manager with default scheduler timing
    pub fn new() -> Self {
        Self::with_timing(SchedulerTiming::default())
    }

    /// Create a disconnected manager with explicit scheduler timing
    pub fn with_timing(timing: SchedulerTiming) -> Self {
        let (completion_tx, completion_rx) = mpsc::channel();
        Self {
            config: SerialConfig::default(),
            port: None,
            queue: VecDeque::new(),
            timer: timing.idle_delay,
            timing,
            reader: TaskSlot::default(),
            reader_result: Arc::new(Mutex::new(ReaderResult::default())),
            completion_tx,
            completion_rx,
            sink: None,
            logger: None,
        }
    }

    /// Register the presentation callback
    pub fn attach_sink(&mut self, sink: Box<dyn EventSink>) {
        self.sink = Some(sink);
    }

    /// Attach a reading log; every valid reply is recorded into it
    pub fn attach_logger(&mut self, logger: DataLogger) {
        self.logger = Some(logger);
    }

    /// Access the attached logger, e.g. to trigger a flush
    pub fn logger_mut(&mut self) -> Option<&mut DataLogger> {
        self.logger.as_mut()
    }

    /// Use an already-open link instead of opening a device from the
    /// configuration. Tests and alternative transports enter here.
    pub fn attach_link(&mut self, link: Box<dyn SerialLink>) {
        self.port = Some(Arc::new(Mutex::new(link)));
    }

    /// Read `serial.cfg` from the working directory.
    ///
    /// A no-op success when the configuration is already loaded; `false`
    /// without raising when the file cannot be opened.
    pub fn read_config_file(&mut self) -> bool {
        if self.config.configured {
            return true;
        }
        self.config.load(CONFIG_FILE)
    }

    /// Current configuration
    pub fn config(&self) -> &SerialConfig {
        &self.config
    }

    /// Open the configured device.
    ///
    /// Loads the configuration first if needed. Every failure cause is
    /// logged and the manager stays disconnected; there is no automatic
    /// retry.
    pub fn open_connection(&mut self) -> bool {
        if !self.read_config_file() {
            return false;
        }

        match open_port(&self.config) {
            Ok(port) => {
                tracing::info!(
                    "serial connection open, device {} at {} baud",
                    self.config.device_name,
                    self.config.baud_rate
                );
                self.port = Some(Arc::new(Mutex::new(Box::new(port))));
                true
            }
            Err(err) => {
                self.log_open_error(&err);
                false
            }
        }
    }

    fn log_open_error(&self, err: &PortError) {
        match err {
            PortError::DeviceNotFound(device) => {
                tracing::error!("failed to open serial connection: device {device} was not found");
            }
            PortError::OpenFailed(device) => {
                tracing::error!(
                    "failed to open serial connection: error while opening the device {device}"
                );
                #[cfg(target_os = "linux")]
                tracing::error!(
                    "on linux this can also mean the device is missing, \
                     or that serial.cfg was saved with CRLF line endings"
                );
            }
            PortError::PortConfigFailed(cause) => {
                tracing::error!("failed to open serial connection: {cause}");
            }
            PortError::UnsupportedBaudRate(rate) => {
                tracing::error!("failed to open serial connection: baud rate {rate} not recognized");
            }
            PortError::TimeoutConfigFailed(cause) => {
                tracing::error!(
                    "failed to open serial connection: could not apply timeout parameters: {cause}"
                );
            }
            PortError::Unknown(cause) => {
                tracing::error!("failed to open serial connection: {cause}");
            }
        }
    }

    /// True while a device or link is attached
    pub fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    /// True when at least one byte is waiting in the receive buffer
    pub fn is_available(&self) -> bool {
        match self.port.as_ref() {
            Some(port) => port.lock().expect("port poisoned").bytes_available() > 0,
            None => false,
        }
    }

    /// Close any open connection, drop the loaded configuration and read
    /// `serial.cfg` again.
    pub fn reload_config(&mut self) -> bool {
        if self.is_connected() {
            self.close();
        }
        self.config.configured = false;
        self.read_config_file()
    }

    /// Drop the port handle.
    ///
    /// An outstanding read cycle finishes against the still-shared handle
    /// and is reclaimed on a later `update` or at drop.
    pub fn close(&mut self) {
        self.port = None;
    }

    /// Encode `command` and append it to the outbound queue.
    ///
    /// Encodings shorter than two characters are dropped, which covers the
    /// empty string an invalid setpoint encodes to.
    pub fn send_command(&mut self, command: Command) {
        let encoded = command.encode();
        if encoded.len() < 2 {
            tracing::debug!("dropping command with encoding {:?}", encoded);
            return;
        }

        tracing::debug!("command queued: {:?}", encoded);
        self.queue.push_back(OutboundCommand(encoded));
    }

    /// Number of commands waiting to be written
    pub fn pending_commands(&self) -> usize {
        self.queue.len()
    }

    /// One engine tick.
    ///
    /// Collects finished background work first (read completions, log
    /// flushes), then runs the scheduler. The scheduler does nothing while
    /// disconnected.
    pub fn update(&mut self) {
        self.collect_finished_read();
        if let Some(logger) = self.logger.as_mut() {
            logger.poll();
        }

        if !self.is_connected() {
            return;
        }

        if self.timer > 0 {
            self.timer -= 1;
        } else {
            self.on_timer_low();
        }
    }

    /// Scheduler step: writes win over reads, reads are skipped while one
    /// is outstanding.
    fn on_timer_low(&mut self) {
        if let Some(command) = self.queue.pop_front() {
            self.timer = self.timing.write_delay;
            self.write_command(&command);
        } else if !self.reader.is_running() {
            self.timer = self.timing.read_delay;
            self.start_read_cycle();
        } else {
            self.timer = self.timing.idle_delay;
        }
    }

    fn write_command(&mut self, command: &OutboundCommand) {
        let Some(port) = self.port.as_ref() else {
            return;
        };

        let mut port = port.lock().expect("port poisoned");
        match port.write_str(&command.0) {
            Ok(()) => tracing::debug!("command written to serial: {:?}", command.0),
            Err(err) => tracing::error!("failed to write {:?}: {err}", command.0),
        }
    }

    fn start_read_cycle(&mut self) {
        let Some(port) = self.port.as_ref() else {
            return;
        };

        {
            let mut guard = port.lock().expect("port poisoned");
            if guard.bytes_available() == 0 {
                tracing::debug!("no serial data available");
                return;
            }
        }

        let handle = spawn_read_cycle(
            Arc::clone(port),
            Arc::clone(&self.reader_result),
            self.completion_tx.clone(),
        );
        self.reader.launch(handle);
    }

    /// Drain reader completion notifications, reclaim the worker and
    /// dispatch the reply. Runs on the caller's context only.
    fn collect_finished_read(&mut self) {
        while self.completion_rx.try_recv().is_ok() {
            if !self.reader.is_running() {
                continue;
            }
            if !self.reader_result.lock().expect("reader result poisoned").done {
                continue;
            }

            let message = {
                let result = self.reader_result.lock().expect("reader result poisoned");
                result.message.clone()
            };
            self.reader.reclaim();

            tracing::debug!("received reply from reader: {:?}", message);
            self.process_reply(&message);
        }
    }

    fn process_reply(&mut self, message: &str) {
        let event = decode(message);
        if !event.is_valid() {
            return;
        }

        if let Some(logger) = self.logger.as_mut() {
            logger.log(&event.setpoint, &event.sensor, &event.pwm);
        }
        if let Some(sink) = self.sink.as_mut() {
            sink.on_reading(&event);
        }
    }
}

impl Default for SerialManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SerialManager {
    fn drop(&mut self) {
        // join an outstanding read cycle before the shared port handle goes
        self.reader.reclaim();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::SetpointKind;
    use pretty_assertions::assert_eq;
    use std::io;
    use std::time::Duration;

    /// Scripted link: pops one canned reply per read cycle and records
    /// every write.
    #[derive(Default)]
    struct LinkState {
        replies: VecDeque<String>,
        written: Vec<String>,
    }

    struct ScriptedLink {
        state: Arc<Mutex<LinkState>>,
    }

    impl SerialLink for ScriptedLink {
        fn bytes_available(&mut self) -> usize {
            self.state
                .lock()
                .unwrap()
                .replies
                .front()
                .map(|r| r.len())
                .unwrap_or(0)
        }

        fn read_until(
            &mut self,
            _delimiter: u8,
            _max_len: usize,
            _timeout: Duration,
        ) -> io::Result<String> {
            Ok(self
                .state
                .lock()
                .unwrap()
                .replies
                .pop_front()
                .unwrap_or_default())
        }

        fn write_str(&mut self, s: &str) -> io::Result<()> {
            self.state.lock().unwrap().written.push(s.to_string());
            Ok(())
        }
    }

    struct Collector(Arc<Mutex<Vec<InboundEvent>>>);

    impl EventSink for Collector {
        fn on_reading(&mut self, event: &InboundEvent) {
            self.0.lock().unwrap().push(event.clone());
        }
    }

    fn immediate_timing() -> SchedulerTiming {
        SchedulerTiming {
            write_delay: 0,
            read_delay: 0,
            idle_delay: 0,
        }
    }

    fn manager_with_link(timing: SchedulerTiming) -> (SerialManager, Arc<Mutex<LinkState>>) {
        let state = Arc::new(Mutex::new(LinkState::default()));
        let mut manager = SerialManager::with_timing(timing);
        manager.attach_link(Box::new(ScriptedLink {
            state: Arc::clone(&state),
        }));
        (manager, state)
    }

    /// Tick until the scripted reply has made it through the worker and the
    /// sink, or the attempt budget runs out.
    fn tick_until<F: Fn() -> bool>(manager: &mut SerialManager, done: F) {
        for _ in 0..500 {
            manager.update();
            if done() {
                return;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn queue_drains_in_fifo_order() {
        let (mut manager, state) = manager_with_link(immediate_timing());

        manager.send_command(Command::PowerOn);
        manager.send_command(Command::Setpoint {
            kind: SetpointKind::Temperature,
            value: 24.0,
        });
        manager.send_command(Command::PowerOff);
        assert_eq!(manager.pending_commands(), 3);

        for _ in 0..3 {
            manager.update();
        }

        assert_eq!(
            state.lock().unwrap().written,
            vec!["con?", "cspt_24.00?", "coff?"]
        );
        assert_eq!(manager.pending_commands(), 0);
    }

    #[test]
    fn write_delay_throttles_the_drain() {
        let timing = SchedulerTiming {
            write_delay: 2,
            read_delay: 0,
            idle_delay: 0,
        };
        let (mut manager, state) = manager_with_link(timing);

        manager.send_command(Command::PowerOn);
        manager.send_command(Command::PowerOff);

        manager.update(); // writes con?, timer = 2
        manager.update(); // timer 2 -> 1
        manager.update(); // timer 1 -> 0
        assert_eq!(state.lock().unwrap().written, vec!["con?"]);

        manager.update(); // writes coff?
        assert_eq!(state.lock().unwrap().written, vec!["con?", "coff?"]);
    }

    #[test]
    fn pending_writes_block_read_cycles() {
        let (mut manager, state) = manager_with_link(immediate_timing());
        state
            .lock()
            .unwrap()
            .replies
            .push_back("sdt_1_2_3?".to_string());

        manager.send_command(Command::PowerOn);
        manager.send_command(Command::PowerOff);

        manager.update();
        manager.update();

        // both writes happened before any read was launched
        let written = state.lock().unwrap().written.clone();
        assert_eq!(written, vec!["con?", "coff?"]);
        assert_eq!(state.lock().unwrap().replies.len(), 1);
    }

    #[test]
    fn valid_reply_reaches_the_sink() {
        let (mut manager, state) = manager_with_link(immediate_timing());
        let events = Arc::new(Mutex::new(Vec::new()));
        manager.attach_sink(Box::new(Collector(Arc::clone(&events))));

        state
            .lock()
            .unwrap()
            .replies
            .push_back("sdt_24.00_19.83_255.00?\r\n".to_string());

        tick_until(&mut manager, || !events.lock().unwrap().is_empty());

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, SetpointKind::Temperature);
        assert_eq!(events[0].setpoint, "24.00");
        assert_eq!(events[0].sensor, "19.83");
        assert_eq!(events[0].pwm, "255.00");
    }

    #[test]
    fn invalid_reply_never_reaches_the_sink() {
        let (mut manager, state) = manager_with_link(immediate_timing());
        let events = Arc::new(Mutex::new(Vec::new()));
        manager.attach_sink(Box::new(Collector(Arc::clone(&events))));

        state.lock().unwrap().replies.push_back("garbage".to_string());
        // a valid reply behind it shows the engine keeps cycling
        state
            .lock()
            .unwrap()
            .replies
            .push_back("sdl_50.00_48.20_128.00?".to_string());

        tick_until(&mut manager, || !events.lock().unwrap().is_empty());

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, SetpointKind::Led);
    }

    #[test]
    fn short_encodings_are_dropped_before_the_queue() {
        let (mut manager, _state) = manager_with_link(immediate_timing());

        manager.send_command(Command::Setpoint {
            kind: SetpointKind::Invalid,
            value: 24.0,
        });
        assert_eq!(manager.pending_commands(), 0);
    }

    #[test]
    fn update_is_a_noop_while_disconnected() {
        let mut manager = SerialManager::with_timing(immediate_timing());
        manager.send_command(Command::PowerOn);

        for _ in 0..5 {
            manager.update();
        }

        assert_eq!(manager.pending_commands(), 1);
        assert!(!manager.is_connected());
        assert!(!manager.is_available());
    }

    #[test]
    fn reload_config_closes_the_connection() {
        let (mut manager, _state) = manager_with_link(immediate_timing());
        assert!(manager.is_connected());

        // no serial.cfg in the test environment, so the reload reports
        // failure, but the connection must be closed and the flag cleared
        manager.reload_config();
        assert!(!manager.is_connected());
        assert!(!manager.config().configured);
    }

    #[test]
    fn valid_replies_are_recorded_into_the_attached_logger() {
        let dir = tempfile::tempdir().unwrap();
        let (mut manager, state) = manager_with_link(immediate_timing());
        manager.attach_logger(DataLogger::with_dir(dir.path(), "temperature"));

        state
            .lock()
            .unwrap()
            .replies
            .push_back("sdt_24.00_19.83_255.00?".to_string());

        for _ in 0..500 {
            manager.update();
            if manager.logger_mut().unwrap().buffered() > 0 {
                break;
            }
            std::thread::sleep(Duration::from_millis(2));
        }

        assert_eq!(manager.logger_mut().unwrap().buffered(), 1);
    }
}
