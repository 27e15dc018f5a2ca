//! IO task types and implementation.
//!
//! One IO task per open session owns the transport exclusively. It reads
//! and decodes the byte stream, keeps the latest device configuration,
//! publishes sweep records, and executes requests from the session: raw
//! commands, the open handshake, and sweep configuration with its
//! acknowledgement wait.
//!
//! The IO task is the only writer of the session state while a link is
//! open. The session itself writes `Connecting` before the task exists and
//! `Disconnected` after it has been cancelled.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use rfe_core::error::{Error, Result};
use rfe_core::events::DeviceEvent;
use rfe_core::transport::Transport;
use rfe_core::{DeviceInfo, SessionState, SweepConfig, SweepRecord};

use crate::commands;
use crate::error::ParseError;
use crate::frame::FrameDecoder;
use crate::messages::{parse_message, DeviceConfig, Message, SetupInfo};
use crate::modes::{DspMode, InputStage, TrackingStatus};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Capacity of the sweep broadcast channel.
const SWEEP_CAPACITY: usize = 16;

/// Bytes requested per transport read.
const READ_CHUNK: usize = 4096;

/// Extra time a caller waits for a reply beyond the IO-side deadline.
const REPLY_GRACE: Duration = Duration::from_millis(500);

/// A published sweep, tagged with the configuration sequence number it was
/// produced under.
pub(crate) type SweepEvent = (u64, Arc<SweepRecord>);

/// What the IO task hands to a registered callback dispatcher.
#[derive(Debug)]
pub(crate) enum Delivery {
    /// A sweep record.
    Sweep(Arc<SweepRecord>),
    /// The session faulted. Always the last delivery.
    Fault(Error),
}

/// State and channels shared between a session and its IO task.
///
/// Outlives individual links so subscribers keep working across
/// close and reopen.
pub(crate) struct Shared {
    pub state: watch::Sender<SessionState>,
    pub config: watch::Sender<Option<DeviceConfig>>,
    pub info: watch::Sender<Option<DeviceInfo>>,
    pub serial: watch::Sender<Option<String>>,
    pub dsp_mode: watch::Sender<Option<DspMode>>,
    pub tracking: watch::Sender<Option<TrackingStatus>>,
    pub input_stage: watch::Sender<Option<InputStage>>,
    pub sweeps: broadcast::Sender<SweepEvent>,
    pub events: broadcast::Sender<DeviceEvent>,
}

impl Shared {
    pub fn new(event_capacity: usize) -> Self {
        let (state, _) = watch::channel(SessionState::Disconnected);
        let (config, _) = watch::channel(None);
        let (info, _) = watch::channel(None);
        let (serial, _) = watch::channel(None);
        let (dsp_mode, _) = watch::channel(None);
        let (tracking, _) = watch::channel(None);
        let (input_stage, _) = watch::channel(None);
        let (sweeps, _) = broadcast::channel(SWEEP_CAPACITY);
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Shared {
            state,
            config,
            info,
            serial,
            dsp_mode,
            tracking,
            input_stage,
            sweeps,
            events,
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Move to `next`, emitting [`DeviceEvent::StateChanged`] if it differs.
    pub fn set_state(&self, next: SessionState) {
        let changed = self.state.send_if_modified(|state| {
            if *state == next {
                false
            } else {
                *state = next;
                true
            }
        });
        if changed {
            debug!(state = %next, "session state changed");
            let _ = self.events.send(DeviceEvent::StateChanged(next));
        }
    }

    /// Forget everything learned from the previous link.
    pub fn reset(&self) {
        self.config.send_replace(None);
        self.info.send_replace(None);
        self.serial.send_replace(None);
        self.dsp_mode.send_replace(None);
        self.tracking.send_replace(None);
        self.input_stage.send_replace(None);
    }
}

/// Configuration for the IO task.
pub(crate) struct IoConfig {
    /// How long one idle read waits before the loop re-checks for requests
    /// and cancellation.
    pub poll_interval: Duration,
}

impl Default for IoConfig {
    fn default() -> Self {
        IoConfig {
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// A request sent from the session to the IO task.
pub(crate) enum Request {
    /// Send a command the device does not acknowledge.
    Send {
        cmd_bytes: Vec<u8>,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Stop sweeping; the session returns to `Idle`.
    Hold { reply: oneshot::Sender<Result<()>> },
    /// Request setup and configuration, then wait until both have arrived.
    Handshake {
        timeout: Duration,
        reply: oneshot::Sender<Result<DeviceInfo>>,
    },
    /// Send sweep commands, then wait for a configuration matching `target`.
    /// Replies with the configuration sequence number. A `sink`, if given,
    /// receives every sweep parsed after the acknowledgement.
    Configure {
        commands: Vec<Vec<u8>>,
        target: SweepConfig,
        timeout: Duration,
        sink: Option<mpsc::UnboundedSender<Delivery>>,
        reply: oneshot::Sender<Result<u64>>,
    },
    /// Stop forwarding sweeps.
    Unregister,
}

/// Handle to the IO task. Stored inside the session's link.
pub(crate) struct AnalyzerIo {
    /// Request channel.
    pub cmd_tx: mpsc::Sender<Request>,
    /// Cancellation token for shutdown.
    pub cancel: CancellationToken,
    /// Join handle for the IO task, taken on shutdown.
    task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl AnalyzerIo {
    async fn call<T>(
        &self,
        request: Request,
        reply_rx: oneshot::Receiver<Result<T>>,
        timeout: Duration,
    ) -> Result<T> {
        self.cmd_tx
            .send(request)
            .await
            .map_err(|_| Error::Closed)?;

        // Safety net: the IO task enforces the real deadline.
        match tokio::time::timeout(timeout + REPLY_GRACE, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::Closed),
            Err(_) => Err(Error::Timeout),
        }
    }

    /// Send a command the device does not acknowledge.
    pub async fn send(&self, cmd: Vec<u8>, timeout: Duration) -> Result<()> {
        let (reply, reply_rx) = oneshot::channel();
        let request = Request::Send {
            cmd_bytes: cmd,
            reply,
        };
        self.call(request, reply_rx, timeout).await
    }

    /// Stop sweeping.
    pub async fn hold(&self, timeout: Duration) -> Result<()> {
        let (reply, reply_rx) = oneshot::channel();
        self.call(Request::Hold { reply }, reply_rx, timeout).await
    }

    /// Run the open handshake.
    pub async fn handshake(&self, timeout: Duration) -> Result<DeviceInfo> {
        let (reply, reply_rx) = oneshot::channel();
        self.call(Request::Handshake { timeout, reply }, reply_rx, timeout)
            .await
    }

    /// Send sweep commands and wait for the device to acknowledge them.
    pub async fn configure(
        &self,
        commands: Vec<Vec<u8>>,
        target: SweepConfig,
        timeout: Duration,
        sink: Option<mpsc::UnboundedSender<Delivery>>,
    ) -> Result<u64> {
        let (reply, reply_rx) = oneshot::channel();
        let request = Request::Configure {
            commands,
            target,
            timeout,
            sink,
            reply,
        };
        self.call(request, reply_rx, timeout).await
    }

    /// Stop forwarding sweeps. Does not wait; usable from any thread.
    pub fn unregister(&self) {
        if self.cmd_tx.try_send(Request::Unregister).is_err() {
            debug!("IO task busy or gone; sink will be dropped on next delivery");
        }
    }

    /// Cancel the IO task and wait up to `grace` for it to close the
    /// transport.
    pub async fn shutdown(&self, grace: Duration) {
        self.cancel.cancel();
        let task = self
            .task
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        if let Some(mut task) = task {
            if tokio::time::timeout(grace, &mut task).await.is_err() {
                warn!("IO task did not stop in time, aborting");
                task.abort();
            }
        }
    }

    /// Cancel and abort the IO task without waiting.
    pub fn abort(&self) {
        self.cancel.cancel();
        if let Some(task) = self
            .task
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .as_ref()
        {
            task.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Spawn
// ---------------------------------------------------------------------------

/// Spawn the IO task. Returns the handle for sending requests.
pub(crate) fn spawn_io_task(
    transport: Box<dyn Transport>,
    config: IoConfig,
    shared: Arc<Shared>,
) -> AnalyzerIo {
    let (cmd_tx, cmd_rx) = mpsc::channel::<Request>(32);
    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();

    let state = IoState::new(shared);
    let task = tokio::spawn(io_loop(transport, config, state, cmd_rx, cancel_clone));

    AnalyzerIo {
        cmd_tx,
        cancel,
        task: std::sync::Mutex::new(Some(task)),
    }
}

// ---------------------------------------------------------------------------
// IO loop
// ---------------------------------------------------------------------------

/// The main IO loop. Runs as a spawned Tokio task.
///
/// Uses `tokio::select! { biased; }` to prioritize:
/// 1. Cancellation
/// 2. Requests from the session
/// 3. Expiry of a pending handshake or configuration
/// 4. Reading the device stream
async fn io_loop(
    mut transport: Box<dyn Transport>,
    config: IoConfig,
    mut state: IoState,
    mut cmd_rx: mpsc::Receiver<Request>,
    cancel: CancellationToken,
) {
    let mut buf = vec![0u8; READ_CHUNK];

    loop {
        let deadline = state.pending_deadline();

        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("IO task cancelled");
                break;
            }

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(request) => {
                        if let Err(e) = state.handle_request(&mut *transport, request).await {
                            state.fault(e);
                            break;
                        }
                    }
                    None => {
                        debug!("all request senders dropped, exiting IO task");
                        break;
                    }
                }
            }

            _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                if state.expire_pending() {
                    break;
                }
            }

            result = transport.receive(&mut buf, config.poll_interval) => {
                match result {
                    Ok(n) => state.ingest(&buf[..n]),
                    Err(Error::Timeout) => {}
                    Err(e) if e.is_fatal() => {
                        state.fault(e);
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "transport read failed");
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        }
    }

    if let Err(e) = transport.close().await {
        warn!(error = %e, "failed to close transport");
    }
}

/// A request waiting for device messages.
enum Pending {
    Info {
        deadline: Instant,
        reply: oneshot::Sender<Result<DeviceInfo>>,
    },
    Configure {
        target: SweepConfig,
        deadline: Instant,
        prior: SessionState,
        sink: Option<mpsc::UnboundedSender<Delivery>>,
        reply: oneshot::Sender<Result<u64>>,
    },
}

/// Everything the IO task knows about the device.
struct IoState {
    shared: Arc<Shared>,
    decoder: FrameDecoder,
    setup: Option<SetupInfo>,
    config: Option<DeviceConfig>,
    /// The last acknowledged sweep request.
    target: Option<SweepConfig>,
    /// Incremented on every configuration message.
    seq: u64,
    sink: Option<mpsc::UnboundedSender<Delivery>>,
    pending: Option<Pending>,
}

impl IoState {
    fn new(shared: Arc<Shared>) -> Self {
        IoState {
            shared,
            decoder: FrameDecoder::new(),
            setup: None,
            config: None,
            target: None,
            seq: 0,
            sink: None,
            pending: None,
        }
    }

    fn pending_deadline(&self) -> Option<Instant> {
        match &self.pending {
            Some(Pending::Info { deadline, .. }) | Some(Pending::Configure { deadline, .. }) => {
                Some(*deadline)
            }
            None => None,
        }
    }

    /// Execute one request. An `Err` is a fatal transport error; the
    /// caller faults the session.
    async fn handle_request(&mut self, transport: &mut dyn Transport, request: Request) -> Result<()> {
        match request {
            Request::Send { cmd_bytes, reply } => match transport.send(&cmd_bytes).await {
                Ok(()) => {
                    let _ = reply.send(Ok(()));
                }
                Err(e) if e.is_fatal() => {
                    let _ = reply.send(Err(Error::Faulted));
                    return Err(e);
                }
                Err(e) => {
                    let _ = reply.send(Err(e));
                }
            },

            Request::Hold { reply } => match transport.send(&commands::cmd_hold()).await {
                Ok(()) => {
                    self.target = None;
                    self.shared.set_state(SessionState::Idle);
                    let _ = reply.send(Ok(()));
                }
                Err(e) if e.is_fatal() => {
                    let _ = reply.send(Err(Error::Faulted));
                    return Err(e);
                }
                Err(e) => {
                    let _ = reply.send(Err(e));
                }
            },

            Request::Handshake { timeout, reply } => {
                if self.pending.is_some() {
                    let _ = reply.send(Err(busy()));
                    return Ok(());
                }
                self.shared.set_state(SessionState::Configuring);
                if let Err(e) = transport.send(&commands::cmd_request_config()).await {
                    let _ = reply.send(Err(Error::Faulted));
                    return Err(e);
                }
                match self.device_info() {
                    Some(info) => {
                        self.shared.set_state(SessionState::Idle);
                        let _ = reply.send(Ok(info));
                    }
                    None => {
                        self.pending = Some(Pending::Info {
                            deadline: Instant::now() + timeout,
                            reply,
                        });
                    }
                }
            }

            Request::Configure {
                commands,
                target,
                timeout,
                sink,
                reply,
            } => {
                if self.pending.is_some() {
                    let _ = reply.send(Err(busy()));
                    return Ok(());
                }
                let prior = self.shared.state();
                self.shared.set_state(SessionState::Configuring);

                for cmd in &commands {
                    match transport.send(cmd).await {
                        Ok(()) => {}
                        Err(e) if e.is_fatal() => {
                            let _ = reply.send(Err(Error::Faulted));
                            return Err(e);
                        }
                        Err(e) => {
                            self.shared.set_state(prior);
                            let _ = reply.send(Err(e));
                            return Ok(());
                        }
                    }
                }

                if self.config.as_ref().is_some_and(|c| c.matches(&target)) {
                    debug!("device already in requested configuration");
                    self.acknowledge(target, sink, reply);
                } else {
                    self.pending = Some(Pending::Configure {
                        target,
                        deadline: Instant::now() + timeout,
                        prior,
                        sink,
                        reply,
                    });
                }
            }

            Request::Unregister => {
                debug!("sweep callback sink removed");
                self.sink = None;
            }
        }
        Ok(())
    }

    /// A pending request ran out of time. Returns `true` if the IO task
    /// should exit.
    fn expire_pending(&mut self) -> bool {
        match self.pending.take() {
            Some(Pending::Info { reply, .. }) => {
                warn!("device did not report its setup before the deadline");
                self.shared.set_state(SessionState::Faulted);
                let _ = self.shared.events.send(DeviceEvent::Disconnected);
                let _ = reply.send(Err(Error::Timeout));
                true
            }
            Some(Pending::Configure { prior, reply, .. }) => {
                warn!("device did not acknowledge the sweep configuration");
                self.shared.set_state(prior);
                let _ = reply.send(Err(Error::Timeout));
                false
            }
            None => false,
        }
    }

    /// A fatal transport error occurred.
    fn fault(&mut self, error: Error) {
        tracing::error!(error = %error, "transport failed, session faulted");
        self.shared.set_state(SessionState::Faulted);
        let _ = self.shared.events.send(DeviceEvent::Disconnected);

        match self.pending.take() {
            Some(Pending::Info { reply, .. }) => {
                let _ = reply.send(Err(Error::Faulted));
            }
            Some(Pending::Configure { reply, .. }) => {
                let _ = reply.send(Err(Error::Faulted));
            }
            None => {}
        }

        if let Some(sink) = self.sink.take() {
            let _ = sink.send(Delivery::Fault(error));
        }
    }

    fn acknowledge(
        &mut self,
        target: SweepConfig,
        sink: Option<mpsc::UnboundedSender<Delivery>>,
        reply: oneshot::Sender<Result<u64>>,
    ) {
        debug!(
            start_hz = target.start_hz,
            stop_hz = target.stop_hz,
            seq = self.seq,
            "sweep configuration acknowledged"
        );
        self.target = Some(target);
        if sink.is_some() {
            debug!("sweep callback sink installed");
            self.sink = sink;
        }
        self.shared.set_state(SessionState::Sweeping);
        let _ = reply.send(Ok(self.seq));
    }

    fn device_info(&self) -> Option<DeviceInfo> {
        Some(self.setup.as_ref()?.device_info(self.config.as_ref()?))
    }

    // -----------------------------------------------------------------------
    // Incoming data
    // -----------------------------------------------------------------------

    /// Feed bytes from the transport through the decoder and parser.
    fn ingest(&mut self, data: &[u8]) {
        self.decoder.push(data);

        while let Some(item) = self.decoder.next() {
            match item.and_then(|frame| parse_message(&frame)) {
                Ok(message) => self.handle_message(message),
                Err(ParseError::UnknownMessage) => {
                    debug!("ignoring unrecognized message");
                }
                Err(error) => self.discard(error),
            }
        }
    }

    fn discard(&self, error: ParseError) {
        warn!(error = %error, "discarding malformed frame");
        let _ = self.shared.events.send(DeviceEvent::FrameDiscarded {
            reason: error.to_string(),
        });
    }

    fn handle_message(&mut self, message: Message) {
        match message {
            Message::Config(config) => self.on_config(config),
            Message::SetupInfo(setup) => {
                debug!(
                    model = %setup.main_model,
                    expansion = ?setup.expansion_model,
                    firmware = %setup.firmware_version,
                    "setup info"
                );
                self.setup = Some(setup);
                self.publish_info();
            }
            Message::Sweep(amplitudes) => self.on_sweep(amplitudes),
            Message::SerialNumber(serial) => {
                debug!(serial = %serial, "serial number");
                self.shared.serial.send_replace(Some(serial));
            }
            Message::DspMode(mode) => {
                debug!(?mode, "DSP mode");
                self.shared.dsp_mode.send_replace(Some(mode));
            }
            Message::TrackingStatus(status) => {
                debug!(?status, "tracking status");
                self.shared.tracking.send_replace(Some(status));
            }
            Message::InputStage(stage) => {
                debug!(?stage, "input stage");
                self.shared.input_stage.send_replace(Some(stage));
            }
            Message::ScreenData(data) => trace!(bytes = data.len(), "screen data"),
        }
    }

    fn on_config(&mut self, config: DeviceConfig) {
        self.seq += 1;
        debug!(
            start_hz = config.start_hz,
            stop_hz = config.stop_hz,
            points = config.sweep_points,
            seq = self.seq,
            "device configuration"
        );

        if self.config.as_ref() != Some(&config) {
            let _ = self.shared.events.send(DeviceEvent::ConfigChanged {
                start_hz: config.start_hz,
                stop_hz: config.stop_hz,
                sweep_points: config.sweep_points,
            });
        }

        let acknowledged = match &self.pending {
            Some(Pending::Configure { target, .. }) => config.matches(target),
            _ => false,
        };

        // Info first: a config watcher may read it as soon as it wakes.
        self.config = Some(config.clone());
        self.publish_info();
        self.shared.config.send_replace(Some(config));

        if acknowledged {
            if let Some(Pending::Configure {
                target,
                sink,
                reply,
                ..
            }) = self.pending.take()
            {
                self.acknowledge(target, sink, reply);
            }
        }
    }

    /// Publish device info once both setup and configuration are known, and
    /// complete a pending handshake.
    fn publish_info(&mut self) {
        let Some(info) = self.device_info() else {
            return;
        };

        self.shared.info.send_if_modified(|current| {
            if current.as_ref() == Some(&info) {
                false
            } else {
                *current = Some(info.clone());
                true
            }
        });

        if matches!(self.pending, Some(Pending::Info { .. })) {
            if let Some(Pending::Info { reply, .. }) = self.pending.take() {
                self.shared.set_state(SessionState::Idle);
                let _ = reply.send(Ok(info));
            }
        }
    }

    fn on_sweep(&mut self, amplitudes: Vec<f32>) {
        let Some(config) = &self.config else {
            debug!("sweep before configuration, dropping");
            return;
        };

        let points = amplitudes.len();
        let (start_hz, stop_hz) = match &self.target {
            Some(target)
                if config.matches(target) && points == usize::from(target.effective_points()) =>
            {
                (target.start_hz, target.stop_hz)
            }
            _ => {
                let stop_hz = config
                    .step_hz
                    .checked_mul((points as u64).saturating_sub(1))
                    .and_then(|width| config.start_hz.checked_add(width));
                match stop_hz {
                    Some(stop_hz) => (config.start_hz, stop_hz),
                    None => {
                        self.discard(ParseError::Invalid(format!(
                            "{points} points at {} Hz steps overflow the frequency axis",
                            config.step_hz
                        )));
                        return;
                    }
                }
            }
        };

        let record = Arc::new(SweepRecord {
            start_hz,
            stop_hz,
            amplitudes_dbm: amplitudes,
            timestamp: Utc::now(),
        });
        trace!(points, seq = self.seq, "sweep");

        let _ = self.shared.events.send(DeviceEvent::SweepReceived { points });
        let _ = self.shared.sweeps.send((self.seq, Arc::clone(&record)));

        if let Some(sink) = &self.sink {
            if sink.send(Delivery::Sweep(record)).is_err() {
                debug!("callback dispatcher gone, dropping sink");
                self.sink = None;
            }
        }
    }
}

impl Drop for IoState {
    fn drop(&mut self) {
        // Unwinding out of the loop: nobody reads the port any more.
        if std::thread::panicking() {
            self.fault(Error::Protocol("IO task panicked".into()));
        }
    }
}

fn busy() -> Error {
    Error::Protocol("another configuration request is pending".into())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
