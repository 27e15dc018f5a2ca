//! Session -- the public handle for one RF Explorer analyzer.
//!
//! A [`Session`] owns the connector for one device and, while open, a
//! background IO task that owns the transport. All methods take `&self`,
//! so a session can be shared across tasks (typically behind an `Arc`) and
//! closed from one task while another waits for a sweep.
//!
//! ```text
//! Disconnected -> Connecting -> Configuring -> Idle <-> Configuring -> Sweeping
//!                     |              |                                  |
//!                     +--------------+------------> Faulted <-----------+
//! ```
//!
//! `close()` returns any state to `Disconnected`. `Faulted` is left only
//! through `close()` followed by `open()`.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use rfe_core::error::{Error, Result};
use rfe_core::events::DeviceEvent;
use rfe_core::transport::Connector;
use rfe_core::{DeviceInfo, SessionState, SweepConfig, SweepRecord, MIN_SWEEP_POINTS};

use crate::callback::{CallbackSlot, SweepHandler};
use crate::commands;
use crate::io::{spawn_io_task, AnalyzerIo, IoConfig, Shared};
use crate::messages::DeviceConfig;
use crate::models::Model;
use crate::modes::{CalcMode, DspMode, InputStage, RadioModule, TrackingStatus};

/// How long `close()` waits for the IO task to release the transport.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Timeouts and channel sizes for a session.
#[derive(Debug, Clone)]
pub(crate) struct SessionSettings {
    pub command_timeout: Duration,
    pub sweep_timeout: Duration,
    pub info_timeout: Duration,
    pub event_capacity: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        SessionSettings {
            command_timeout: Duration::from_secs(2),
            sweep_timeout: Duration::from_secs(2),
            info_timeout: Duration::from_secs(2),
            event_capacity: 64,
        }
    }
}

/// A connection to one RF Explorer spectrum analyzer.
///
/// Construct with [`SessionBuilder`](crate::builder::SessionBuilder).
pub struct Session {
    connector: Box<dyn Connector>,
    settings: SessionSettings,
    shared: Arc<Shared>,
    link: Mutex<Option<Arc<AnalyzerIo>>>,
    callback: Mutex<Option<CallbackSlot>>,
    config_task: Mutex<Option<JoinHandle<()>>>,
    /// Serializes open and sweep configuration.
    op_lock: tokio::sync::Mutex<()>,
}

impl Session {
    pub(crate) fn new(connector: Box<dyn Connector>, settings: SessionSettings) -> Self {
        let shared = Arc::new(Shared::new(settings.event_capacity));
        Session {
            connector,
            settings,
            shared,
            link: Mutex::new(None),
            callback: Mutex::new(None),
            config_task: Mutex::new(None),
            op_lock: tokio::sync::Mutex::new(()),
        }
    }

    // -----------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------

    /// Open the transport and identify the analyzer.
    ///
    /// Sends a configuration request and waits up to the info timeout for
    /// both the setup and configuration replies. On success the session is
    /// `Idle`; on any failure it is `Faulted` and must be closed before it
    /// can be opened again.
    pub async fn open(&self) -> Result<()> {
        let _op = self.op_lock.lock().await;
        if self.lock_link().is_some() || self.shared.state() != SessionState::Disconnected {
            return Err(Error::AlreadyOpen);
        }

        let port = self.connector.describe();
        self.shared.reset();
        self.shared.set_state(SessionState::Connecting);
        info!(port = %port, "opening analyzer session");

        let transport = match self.connector.connect().await {
            Ok(transport) => transport,
            Err(e) => {
                warn!(port = %port, error = %e, "failed to open transport");
                self.shared.set_state(SessionState::Faulted);
                return Err(e);
            }
        };

        let io = Arc::new(spawn_io_task(
            transport,
            IoConfig::default(),
            Arc::clone(&self.shared),
        ));
        *self.lock_link() = Some(Arc::clone(&io));

        let info = self
            .guard(&io, io.handshake(self.settings.info_timeout))
            .await?;
        info!(
            port = %port,
            model = %info.model_name,
            firmware = %info.firmware_version,
            "analyzer connected"
        );
        let _ = self.shared.events.send(DeviceEvent::Connected);
        Ok(())
    }

    /// Close the session. Idempotent.
    ///
    /// Pending calls fail with [`Error::Closed`]. A registered callback is
    /// revoked before this returns, and waits for an invocation already in
    /// progress unless called from inside the callback.
    pub async fn close(&self) {
        let io = self.lock_link().take();
        if let Some(slot) = self.take_callback() {
            slot.revoke();
        }

        if let Some(io) = io {
            io.shutdown(CLOSE_GRACE).await;
            if self.shared.state() != SessionState::Faulted {
                let _ = self.shared.events.send(DeviceEvent::Disconnected);
            }
            info!(port = %self.connector.describe(), "analyzer session closed");
        }
        self.shared.set_state(SessionState::Disconnected);
    }

    // -----------------------------------------------------------------
    // Device information
    // -----------------------------------------------------------------

    /// Identity and frequency limits of the connected analyzer.
    ///
    /// Returns the information read during `open()`. If it is somehow
    /// missing, asks the device again and waits up to the info timeout.
    pub async fn request_info(&self) -> Result<DeviceInfo> {
        let io = self.link()?;
        let cached = self.shared.info.borrow().clone();
        if let Some(info) = cached {
            return Ok(info);
        }

        let mut info_rx = self.shared.info.subscribe();
        self.guard(
            &io,
            io.send(commands::cmd_request_config(), self.settings.command_timeout),
        )
        .await?;
        self.guard(&io, wait_some(&mut info_rx, self.settings.info_timeout))
            .await
    }

    /// The device serial number. Requested once, then cached for the
    /// lifetime of the link.
    pub async fn serial_number(&self) -> Result<String> {
        let io = self.link()?;
        let cached = self.shared.serial.borrow().clone();
        if let Some(serial) = cached {
            return Ok(serial);
        }

        let mut serial_rx = self.shared.serial.subscribe();
        self.guard(
            &io,
            io.send(
                commands::cmd_request_serial_number(),
                self.settings.command_timeout,
            ),
        )
        .await?;
        self.guard(&io, wait_some(&mut serial_rx, self.settings.info_timeout))
            .await
    }

    /// The last configuration the analyzer reported, if any.
    pub fn config(&self) -> Option<DeviceConfig> {
        self.shared.config.borrow().clone()
    }

    /// The device information read during `open()`, if any.
    pub fn info(&self) -> Option<DeviceInfo> {
        self.shared.info.borrow().clone()
    }

    // -----------------------------------------------------------------
    // Sweeping
    // -----------------------------------------------------------------

    /// Configure a sweep and return the first complete record produced
    /// under it.
    ///
    /// Waits up to the command timeout for the analyzer to acknowledge the
    /// configuration, then up to the sweep timeout for a record. The
    /// record's frequency axis spans exactly `config.start_hz` to
    /// `config.stop_hz` with `config.effective_points()` samples.
    pub async fn sweep_blocking(&self, config: SweepConfig) -> Result<SweepRecord> {
        let _op = self.op_lock.lock().await;
        let io = self.link()?;
        let commands = self.sweep_commands(&config)?;

        let mut sweeps = self.shared.sweeps.subscribe();
        let seq = self
            .guard(
                &io,
                io.configure(commands, config, self.settings.command_timeout, None),
            )
            .await?;

        let timeout = self.settings.sweep_timeout;
        let record = self
            .guard(&io, async move {
                let next = async {
                    loop {
                        match sweeps.recv().await {
                            Ok((record_seq, record)) if record_seq >= seq => return Ok(record),
                            Ok(_) => continue,
                            Err(RecvError::Lagged(skipped)) => {
                                debug!(skipped, "sweep subscriber lagged");
                            }
                            Err(RecvError::Closed) => return Err(Error::Closed),
                        }
                    }
                };
                tokio::time::timeout(timeout, next)
                    .await
                    .map_err(|_| Error::Timeout)?
            })
            .await?;

        Ok(SweepRecord::clone(&record))
    }

    /// Configure a sweep and deliver every subsequent record to `handler`.
    ///
    /// Returns once the analyzer has acknowledged the configuration. The
    /// handler runs on a dedicated thread, in arrival order, until
    /// [`unregister`](Self::unregister) or [`close`](Self::close). Only one
    /// handler may be registered at a time.
    pub async fn sweep_with_callback<H>(&self, config: SweepConfig, handler: H) -> Result<()>
    where
        H: SweepHandler,
    {
        let _op = self.op_lock.lock().await;
        let io = self.link()?;
        if self.lock_callback().is_some() {
            return Err(Error::AlreadyRegistered);
        }
        let commands = self.sweep_commands(&config)?;

        let (sink, deliveries) = mpsc::unbounded_channel();
        let slot = CallbackSlot::spawn(Box::new(handler), deliveries)?;

        match self
            .guard(
                &io,
                io.configure(commands, config, self.settings.command_timeout, Some(sink)),
            )
            .await
        {
            Ok(_) => self.install_callback(&io, slot),
            Err(e) => {
                slot.revoke();
                Err(e)
            }
        }
    }

    /// Store `slot` as the registered callback, provided `io` is still the
    /// open link. A `close()` that ran while the sweep was being configured
    /// has already cleared the slot and must not find a new one afterwards.
    fn install_callback(&self, io: &Arc<AnalyzerIo>, slot: CallbackSlot) -> Result<()> {
        let mut callback = self.lock_callback();
        let live = self
            .lock_link()
            .as_ref()
            .is_some_and(|link| Arc::ptr_eq(link, io));
        if !live {
            drop(callback);
            slot.revoke();
            debug!("session closed while registering sweep callback");
            return Err(Error::Closed);
        }
        *callback = Some(slot);
        debug!("sweep callback registered");
        Ok(())
    }

    /// Stop delivering sweeps to the registered handler.
    ///
    /// After this returns the handler is not invoked again. Safe to call
    /// from inside the handler. Does nothing if no handler is registered.
    pub fn unregister(&self) {
        let Some(slot) = self.take_callback() else {
            return;
        };
        if let Some(io) = self.lock_link().clone() {
            io.unregister();
        }
        slot.revoke();
    }

    /// Stop sweeping. The analyzer holds its last trace.
    pub async fn hold(&self) -> Result<()> {
        let io = self.link()?;
        self.guard(&io, io.hold(self.settings.command_timeout)).await
    }

    /// Apply a sweep configuration and wait for the analyzer to
    /// acknowledge it, without waiting for a record.
    ///
    /// Records produced under it reach subscribers and any registered
    /// callback.
    pub async fn configure(&self, config: SweepConfig) -> Result<()> {
        let _op = self.op_lock.lock().await;
        let io = self.link()?;
        let commands = self.sweep_commands(&config)?;
        self.guard(
            &io,
            io.configure(commands, config, self.settings.command_timeout, None),
        )
        .await?;
        Ok(())
    }

    /// Sweep `start_hz..=stop_hz`, keeping the current point count and
    /// amplitude range.
    pub async fn set_start_stop(&self, start_hz: u64, stop_hz: u64) -> Result<()> {
        let points = self.current_points();
        self.configure(SweepConfig::new(start_hz, stop_hz, points))
            .await
    }

    /// Sweep `span_hz` around `center_hz`, keeping the current point count
    /// and amplitude range.
    pub async fn set_center_span(&self, center_hz: u64, span_hz: u64) -> Result<()> {
        let points = self.current_points();
        self.configure(SweepConfig::from_center_span(center_hz, span_hz, points))
            .await
    }

    /// Sweep `span_hz` around `center_hz` with `sweep_points` points.
    pub async fn set_center_span_sweep_points(
        &self,
        center_hz: u64,
        span_hz: u64,
        sweep_points: u16,
    ) -> Result<()> {
        self.configure(SweepConfig::from_center_span(center_hz, span_hz, sweep_points))
            .await
    }

    // -----------------------------------------------------------------
    // Settings
    // -----------------------------------------------------------------

    /// Select how the analyzer combines successive sweeps.
    pub async fn set_calc_mode(&self, mode: CalcMode) -> Result<()> {
        self.send_command(commands::cmd_set_calc_mode(mode)).await
    }

    /// Select the DSP mode and wait for the analyzer to report it.
    ///
    /// Sends nothing if the analyzer already reported `mode`.
    pub async fn set_dsp_mode(&self, mode: DspMode) -> Result<()> {
        let io = self.link()?;
        if self.dsp_mode() == Some(mode) {
            return Ok(());
        }

        let mut dsp_rx = self.shared.dsp_mode.subscribe();
        let timeout = self.settings.command_timeout;
        self.guard(&io, io.send(commands::cmd_set_dsp_mode(mode), timeout))
            .await?;
        self.guard(
            &io,
            wait_until(&mut dsp_rx, timeout, |reported| *reported == Some(mode)),
        )
        .await
    }

    /// Add a fixed offset, in dB, to reported amplitudes.
    pub async fn set_offset_db(&self, offset_db: i8) -> Result<()> {
        self.send_command(commands::cmd_set_offset_db(offset_db)).await
    }

    /// Select the RF input stage.
    pub async fn set_input_stage(&self, stage: InputStage) -> Result<()> {
        self.send_command(commands::cmd_set_input_stage(stage)).await
    }

    /// The DSP mode last reported by the analyzer.
    pub fn dsp_mode(&self) -> Option<DspMode> {
        *self.shared.dsp_mode.borrow()
    }

    /// The tracking generator status last reported by the analyzer.
    pub fn tracking_status(&self) -> Option<TrackingStatus> {
        *self.shared.tracking.borrow()
    }

    /// The input stage last reported by the analyzer.
    pub fn input_stage(&self) -> Option<InputStage> {
        *self.shared.input_stage.borrow()
    }

    // -----------------------------------------------------------------
    // Device control
    // -----------------------------------------------------------------

    /// Make the main radio module the active one.
    ///
    /// Waits for the analyzer to report a configuration for the main
    /// module. Fails with [`Error::InvalidParameter`] if it is already
    /// active.
    pub async fn activate_main_radio_module(&self) -> Result<()> {
        self.activate_module(RadioModule::Main).await
    }

    /// Make the expansion radio module the active one.
    ///
    /// Fails with [`Error::Unsupported`] if none is fitted and with
    /// [`Error::InvalidParameter`] if it is already active.
    pub async fn activate_expansion_radio_module(&self) -> Result<()> {
        self.activate_module(RadioModule::Expansion).await
    }

    /// The radio module currently in use.
    pub fn active_radio_module(&self) -> Option<RadioModule> {
        let info = self.info()?;
        Some(if info.expansion_active {
            RadioModule::Expansion
        } else {
            RadioModule::Main
        })
    }

    pub async fn lcd_on(&self) -> Result<()> {
        self.send_command(commands::cmd_lcd_on()).await
    }

    /// Blank the analyzer's display. Sweeps keep streaming.
    pub async fn lcd_off(&self) -> Result<()> {
        self.send_command(commands::cmd_lcd_off()).await
    }

    /// Restart the analyzer and close the session. Call
    /// [`open`](Self::open) again once the device is back.
    pub async fn reboot(&self) -> Result<()> {
        self.send_command(commands::cmd_reboot()).await?;
        self.close().await;
        Ok(())
    }

    /// Switch the analyzer off and close the session.
    pub async fn power_off(&self) -> Result<()> {
        self.send_command(commands::cmd_power_off()).await?;
        self.close().await;
        Ok(())
    }

    // -----------------------------------------------------------------
    // Observation
    // -----------------------------------------------------------------

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Watch state transitions.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.shared.state.subscribe()
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.shared.events.subscribe()
    }

    /// Watch the configuration the analyzer reports. `None` until the
    /// first report after `open()`.
    pub fn watch_config(&self) -> watch::Receiver<Option<DeviceConfig>> {
        self.shared.config.subscribe()
    }

    /// Call `handler` with each configuration the analyzer reports,
    /// replacing any previous handler. The handler survives close and
    /// reopen.
    ///
    /// The handler runs on a Tokio task and sees the latest report only;
    /// reports that arrive while it is running are coalesced. Fails with
    /// [`Error::Unsupported`] outside a Tokio runtime.
    pub fn set_config_callback<F>(&self, mut handler: F) -> Result<()>
    where
        F: FnMut(&DeviceConfig) + Send + 'static,
    {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| Error::Unsupported("config callback needs a Tokio runtime".into()))?;
        let mut config_rx = self.shared.config.subscribe();
        let task = runtime.spawn(async move {
            while config_rx.changed().await.is_ok() {
                let config = config_rx.borrow_and_update().clone();
                if let Some(config) = config {
                    handler(&config);
                }
            }
        });
        if let Some(previous) = self.lock_config_task().replace(task) {
            previous.abort();
        }
        Ok(())
    }

    /// Remove the configuration handler, if any.
    pub fn clear_config_callback(&self) {
        if let Some(task) = self.lock_config_task().take() {
            task.abort();
        }
    }

    /// The port this session connects to.
    pub fn port_name(&self) -> String {
        self.connector.describe()
    }

    // -----------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------

    fn lock_link(&self) -> MutexGuard<'_, Option<Arc<AnalyzerIo>>> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_callback(&self) -> MutexGuard<'_, Option<CallbackSlot>> {
        self.callback.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take_callback(&self) -> Option<CallbackSlot> {
        self.lock_callback().take()
    }

    fn lock_config_task(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.config_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Point count of the analyzer's current configuration.
    fn current_points(&self) -> u16 {
        self.config()
            .map_or(MIN_SWEEP_POINTS, |config| config.sweep_points)
    }

    async fn activate_module(&self, module: RadioModule) -> Result<()> {
        let _op = self.op_lock.lock().await;
        let io = self.link()?;
        let info = self.info().ok_or(Error::NotConnected)?;

        let expansion = module == RadioModule::Expansion;
        if expansion && info.expansion_model_id.is_none() {
            return Err(Error::Unsupported("no expansion radio module fitted".into()));
        }
        if info.expansion_active == expansion {
            return Err(Error::InvalidParameter(format!(
                "{module:?} radio module is already active"
            )));
        }

        let mut config_rx = self.shared.config.subscribe();
        let timeout = self.settings.command_timeout;
        self.guard(&io, io.send(commands::cmd_switch_module(module), timeout))
            .await?;
        self.guard(
            &io,
            wait_until(&mut config_rx, timeout, |config| {
                config
                    .as_ref()
                    .is_some_and(|config| config.expansion_active == expansion)
            }),
        )
        .await?;
        info!(module = ?module, "radio module activated");
        Ok(())
    }

    /// The open link, or why there is none.
    fn link(&self) -> Result<Arc<AnalyzerIo>> {
        if self.shared.state() == SessionState::Faulted {
            return Err(Error::Faulted);
        }
        self.lock_link().clone().ok_or(Error::NotConnected)
    }

    /// Run `fut`, failing early with [`Error::Closed`] if the link is
    /// cancelled or [`Error::Faulted`] if the session faults.
    async fn guard<T>(&self, io: &AnalyzerIo, fut: impl Future<Output = Result<T>>) -> Result<T> {
        let mut state_rx = self.shared.state.subscribe();
        tokio::select! {
            biased;
            _ = io.cancel.cancelled() => Err(Error::Closed),
            result = fut => result,
            _ = state_rx.wait_for(|s| *s == SessionState::Faulted) => Err(Error::Faulted),
        }
    }

    async fn send_command(&self, cmd: Vec<u8>) -> Result<()> {
        let io = self.link()?;
        self.guard(&io, io.send(cmd, self.settings.command_timeout))
            .await
    }

    /// Validate `config` against the connected analyzer and build the
    /// commands that apply it.
    fn sweep_commands(&self, config: &SweepConfig) -> Result<Vec<Vec<u8>>> {
        let info = self.info().ok_or(Error::NotConnected)?;
        let model = active_model(&info);
        validate_sweep(config, &info, model)?;

        let (min_amp, max_amp) = match config.amp_range_dbm {
            Some(range) => range,
            None => self
                .config()
                .map(|c| (c.min_amp_dbm, c.max_amp_dbm))
                .ok_or(Error::NotConnected)?,
        };

        let mut commands = Vec::with_capacity(2);
        if model.is_some_and(Model::is_plus) {
            commands.push(commands::cmd_set_sweep_points(config.effective_points()));
        }
        commands.push(commands::cmd_set_config(
            config.start_hz,
            config.stop_hz,
            min_amp,
            max_amp,
        ));
        Ok(commands)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let slot = self
            .callback
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(slot) = slot {
            slot.revoke();
        }
        let io = self
            .link
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(io) = io {
            io.abort();
        }
        let task = self
            .config_task
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
        }
    }
}

/// Wait until a watched value is present.
async fn wait_some<T: Clone>(rx: &mut watch::Receiver<Option<T>>, timeout: Duration) -> Result<T> {
    match tokio::time::timeout(timeout, rx.wait_for(Option::is_some)).await {
        Ok(Ok(value)) => value.clone().ok_or(Error::NotConnected),
        Ok(Err(_)) => Err(Error::Closed),
        Err(_) => Err(Error::Timeout),
    }
}

/// Wait until a watched value satisfies `ready`.
async fn wait_until<T>(
    rx: &mut watch::Receiver<T>,
    timeout: Duration,
    ready: impl FnMut(&T) -> bool,
) -> Result<()> {
    match tokio::time::timeout(timeout, rx.wait_for(ready)).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(_)) => Err(Error::Closed),
        Err(_) => Err(Error::Timeout),
    }
}

/// The radio module currently in use.
fn active_model(info: &DeviceInfo) -> Option<Model> {
    let code = match (info.expansion_active, info.expansion_model_id) {
        (true, Some(expansion)) => expansion,
        _ => info.model_id,
    };
    Model::from_code(code)
}

/// Check a sweep request against the analyzer's limits.
fn validate_sweep(config: &SweepConfig, info: &DeviceInfo, model: Option<Model>) -> Result<()> {
    if config.start_hz >= config.stop_hz {
        return Err(Error::InvalidParameter(format!(
            "start {} Hz must be below stop {} Hz",
            config.start_hz, config.stop_hz
        )));
    }

    let range = info.min_freq_hz..=info.max_freq_hz;
    if !range.contains(&config.start_hz) || !range.contains(&config.stop_hz) {
        return Err(Error::InvalidParameter(format!(
            "{}..{} Hz outside analyzer range {}..{} Hz",
            config.start_hz, config.stop_hz, info.min_freq_hz, info.max_freq_hz
        )));
    }

    let span = config.span_hz();
    if span < info.min_span_hz || span > info.max_span_hz {
        return Err(Error::InvalidParameter(format!(
            "span {} Hz outside {}..{} Hz",
            span, info.min_span_hz, info.max_span_hz
        )));
    }

    if let Some((min, max)) = config.amp_range_dbm {
        if !commands::AMP_RANGE_DBM.contains(&min)
            || !commands::AMP_RANGE_DBM.contains(&max)
            || min >= max
        {
            return Err(Error::InvalidParameter(format!(
                "amplitude range {min}..{max} dBm"
            )));
        }
    }

    if config.sweep_points < 2 {
        return Err(Error::InvalidParameter(format!(
            "sweep points {} below 2",
            config.sweep_points
        )));
    }

    let points = config.effective_points();
    if span < u64::from(points - 1) {
        return Err(Error::InvalidParameter(format!(
            "span {span} Hz too narrow for {points} points"
        )));
    }

    if points != rfe_core::MIN_SWEEP_POINTS && !model.is_some_and(Model::is_plus) {
        return Err(Error::Unsupported(format!(
            "{points} sweep points requires a Plus model"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::SessionBuilder;
    use crate::test_support::*;
    use rfe_test_harness::{MockConnector, MockTransport};

    fn session_with(connector: MockConnector) -> Session {
        SessionBuilder::new()
            .command_timeout(Duration::from_millis(300))
            .sweep_timeout(Duration::from_millis(300))
            .info_timeout(Duration::from_millis(300))
            .build_with_connector(Box::new(connector))
    }

    async fn open_session(mock: MockTransport) -> Session {
        let session = session_with(MockConnector::with_transport(mock));
        session.open().await.unwrap();
        session
    }

    /// A WSUB1G+ that acknowledges 100-200 MHz at `points` and then sends
    /// `sweeps` sweeps.
    fn plus_sweeping(points: u16, sweeps: usize) -> MockTransport {
        let mut mock = mock_with_handshake();
        mock.expect(&commands::cmd_set_sweep_points(points), b"");
        let mut response = config_100_200_mhz(points);
        for i in 0..sweeps {
            response.extend(sweep_msg(usize::from(points), 100 + i as u8));
        }
        mock.expect(
            &commands::cmd_set_config(100_000_000, 200_000_000, -120, -10),
            &response,
        );
        mock
    }

    fn info_for(model: Model) -> DeviceInfo {
        DeviceInfo {
            model_id: model.code(),
            model_name: model.name().to_string(),
            expansion_model_id: None,
            expansion_model_name: None,
            firmware_version: "01.12".into(),
            expansion_active: false,
            min_freq_hz: model.min_freq_hz(),
            max_freq_hz: model.max_freq_hz(),
            min_span_hz: model.min_span_hz(),
            max_span_hz: model.max_span_hz(),
        }
    }

    // =================================================================
    // Open / close
    // =================================================================

    #[tokio::test]
    async fn open_reads_device_info() {
        let session = open_session(mock_with_handshake()).await;

        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.port_name(), "mock");

        let info = session.request_info().await.unwrap();
        assert_eq!(info.model_name, "WSUB1G+");
        assert_eq!(info.expansion_model_id, None);
        assert_eq!(info.firmware_version, "01.12");
        assert!(session.config().is_some());

        session.close().await;
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn open_twice_is_rejected() {
        let session = open_session(mock_with_handshake()).await;
        assert!(matches!(session.open().await, Err(Error::AlreadyOpen)));
        session.close().await;
    }

    #[tokio::test]
    async fn open_failure_faults_until_closed() {
        let connector = MockConnector::new();
        connector.push_failure(Error::NotFound("/dev/ttyUSB9".into()));
        connector.push(mock_with_handshake());
        let session = session_with(connector);

        assert!(matches!(session.open().await, Err(Error::NotFound(_))));
        assert_eq!(session.state(), SessionState::Faulted);
        assert!(matches!(session.open().await, Err(Error::AlreadyOpen)));

        session.close().await;
        session.open().await.unwrap();
        assert_eq!(session.state(), SessionState::Idle);
        session.close().await;
    }

    #[tokio::test]
    async fn silent_device_times_out_on_open() {
        let mut mock = MockTransport::new();
        mock.expect(&commands::cmd_request_config(), b"");
        let session = session_with(MockConnector::with_transport(mock));

        assert!(matches!(session.open().await, Err(Error::Timeout)));
        assert_eq!(session.state(), SessionState::Faulted);
        session.close().await;
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn calls_before_open_are_not_connected() {
        let session = session_with(MockConnector::new());
        let config = SweepConfig::new(100_000_000, 200_000_000, 112);

        assert!(matches!(session.request_info().await, Err(Error::NotConnected)));
        assert!(matches!(
            session.sweep_blocking(config).await,
            Err(Error::NotConnected)
        ));
        assert!(matches!(
            session.sweep_with_callback(config, |_: &SweepRecord| {}).await,
            Err(Error::NotConnected)
        ));
        assert!(matches!(session.hold().await, Err(Error::NotConnected)));
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let session = open_session(mock_with_handshake()).await;
        session.close().await;
        session.close().await;
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn reopen_uses_fresh_transport() {
        let connector = MockConnector::new();
        connector.push(mock_with_handshake());
        connector.push(plus_sweeping(112, 1));
        let session = session_with(connector);

        session.open().await.unwrap();
        session.close().await;
        session.open().await.unwrap();

        let record = session
            .sweep_blocking(SweepConfig::new(100_000_000, 200_000_000, 112))
            .await
            .unwrap();
        assert_eq!(record.len(), 112);
        session.close().await;
    }

    #[tokio::test]
    async fn open_emits_events() {
        let session = session_with(MockConnector::with_transport(mock_with_handshake()));
        let mut events = session.subscribe();
        session.open().await.unwrap();

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert_eq!(
            seen.first(),
            Some(&DeviceEvent::StateChanged(SessionState::Connecting))
        );
        assert!(seen.contains(&DeviceEvent::StateChanged(SessionState::Configuring)));
        assert!(seen.contains(&DeviceEvent::StateChanged(SessionState::Idle)));
        assert_eq!(seen.last(), Some(&DeviceEvent::Connected));
        session.close().await;
    }

    // =================================================================
    // Blocking sweeps
    // =================================================================

    #[tokio::test]
    async fn sweep_blocking_returns_configured_axis() {
        let mock = plus_sweeping(112, 1);
        let handle = mock.handle();
        let session = open_session(mock).await;

        let record = session
            .sweep_blocking(SweepConfig::new(100_000_000, 200_000_000, 112))
            .await
            .unwrap();

        assert_eq!(record.len(), 112);
        assert_eq!(record.start_hz, 100_000_000);
        assert_eq!(record.stop_hz, 200_000_000);
        assert_eq!(record.frequency_hz(111), 200_000_000);
        assert_eq!(record.amplitudes_dbm[0], -50.0);
        assert_eq!(session.state(), SessionState::Sweeping);
        assert_eq!(handle.remaining_expectations(), 0);

        session.close().await;
    }

    #[tokio::test]
    async fn sweep_points_round_up_to_minimum() {
        let session = open_session(plus_sweeping(112, 1)).await;

        let record = session
            .sweep_blocking(SweepConfig::new(100_000_000, 200_000_000, 100))
            .await
            .unwrap();
        assert_eq!(record.len(), 112);
        assert_eq!(record.start_hz, 100_000_000);
        assert_eq!(record.stop_hz, 200_000_000);

        session.close().await;
    }

    #[tokio::test]
    async fn sweep_points_round_down_to_step() {
        let session = open_session(plus_sweeping(4096, 1)).await;

        let record = session
            .sweep_blocking(SweepConfig::new(100_000_000, 200_000_000, 4100))
            .await
            .unwrap();
        assert_eq!(record.len(), 4096);
        assert_eq!(record.frequency_hz(4095), 200_000_000);

        session.close().await;
    }

    #[tokio::test]
    async fn explicit_amp_range_is_sent() {
        let mut mock = mock_with_handshake();
        mock.expect(&commands::cmd_set_sweep_points(112), b"");
        let mut response = config_msg(100_000, 900_900, 112, -20, -100);
        response.extend(sweep_msg(112, 100));
        mock.expect(
            &commands::cmd_set_config(100_000_000, 200_000_000, -100, -20),
            &response,
        );
        let session = open_session(mock).await;

        let config = SweepConfig::new(100_000_000, 200_000_000, 112).with_amp_range(-100, -20);
        let record = session.sweep_blocking(config).await.unwrap();
        assert_eq!(record.len(), 112);
        assert_eq!(session.config().unwrap().min_amp_dbm, -100);

        session.close().await;
    }

    #[tokio::test]
    async fn sweep_timeout_when_device_stops_streaming() {
        let session = open_session(plus_sweeping(112, 0)).await;

        let result = session
            .sweep_blocking(SweepConfig::new(100_000_000, 200_000_000, 112))
            .await;
        assert!(matches!(result, Err(Error::Timeout)));
        assert_eq!(session.state(), SessionState::Sweeping);

        session.close().await;
    }

    #[tokio::test]
    async fn unacknowledged_config_times_out() {
        let mut mock = mock_with_handshake();
        mock.expect(&commands::cmd_set_sweep_points(112), b"");
        mock.expect(
            &commands::cmd_set_config(100_000_000, 200_000_000, -120, -10),
            b"",
        );
        let session = open_session(mock).await;

        let result = session
            .sweep_blocking(SweepConfig::new(100_000_000, 200_000_000, 112))
            .await;
        assert!(matches!(result, Err(Error::Timeout)));
        assert_eq!(session.state(), SessionState::Idle);

        session.close().await;
    }

    #[tokio::test]
    async fn disconnect_during_sweep_faults() {
        let mock = plus_sweeping(112, 0);
        let handle = mock.handle();
        let session = open_session(mock).await;

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            handle.inject_disconnect();
        });

        let result = session
            .sweep_blocking(SweepConfig::new(100_000_000, 200_000_000, 112))
            .await;
        assert!(matches!(result, Err(Error::Faulted)));
        assert_eq!(session.state(), SessionState::Faulted);

        // Every call now reports the fault until close.
        assert!(matches!(session.request_info().await, Err(Error::Faulted)));
        session.close().await;
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn close_interrupts_pending_sweep() {
        let session = Arc::new(open_session(plus_sweeping(112, 0)).await);

        let waiter = {
            let session = Arc::clone(&session);
            tokio::spawn(async move {
                session
                    .sweep_blocking(SweepConfig::new(100_000_000, 200_000_000, 112))
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        session.close().await;

        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(Error::Closed)));
    }

    // =================================================================
    // Validation
    // =================================================================

    #[test]
    fn validate_rejects_inverted_range() {
        let info = info_for(Model::RfeWSub1GPlus);
        let config = SweepConfig::new(200_000_000, 100_000_000, 112);
        assert!(matches!(
            validate_sweep(&config, &info, Some(Model::RfeWSub1GPlus)),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn validate_rejects_out_of_range_frequency() {
        let info = info_for(Model::RfeWSub1GPlus);
        let config = SweepConfig::new(900_000_000, 1_200_000_000, 112);
        assert!(matches!(
            validate_sweep(&config, &info, Some(Model::RfeWSub1GPlus)),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn validate_rejects_bad_amp_range() {
        let info = info_for(Model::RfeWSub1GPlus);
        let base = SweepConfig::new(100_000_000, 200_000_000, 112);
        for (min, max) in [(-130, -10), (-100, 40), (-10, -100), (-50, -50)] {
            let config = base.with_amp_range(min, max);
            assert!(
                matches!(
                    validate_sweep(&config, &info, Some(Model::RfeWSub1GPlus)),
                    Err(Error::InvalidParameter(_))
                ),
                "{min}..{max} accepted"
            );
        }
    }

    #[test]
    fn validate_rejects_degenerate_points() {
        let info = info_for(Model::RfeWSub1GPlus);
        let config = SweepConfig::new(100_000_000, 200_000_000, 1);
        assert!(matches!(
            validate_sweep(&config, &info, Some(Model::RfeWSub1GPlus)),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn validate_rejects_span_below_minimum() {
        let info = info_for(Model::RfeWSub1GPlus);
        let config = SweepConfig::new(100_000_000, 100_050_000, 112);
        assert!(matches!(
            validate_sweep(&config, &info, Some(Model::RfeWSub1GPlus)),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn validate_points_need_plus_model() {
        let info = info_for(Model::RfeWSub1G);
        let config = SweepConfig::new(100_000_000, 200_000_000, 1024);
        assert!(matches!(
            validate_sweep(&config, &info, Some(Model::RfeWSub1G)),
            Err(Error::Unsupported(_))
        ));

        let config = SweepConfig::new(100_000_000, 200_000_000, 112);
        assert!(validate_sweep(&config, &info, Some(Model::RfeWSub1G)).is_ok());
    }

    #[test]
    fn active_model_follows_expansion() {
        let mut info = info_for(Model::RfeWSub1G);
        info.expansion_model_id = Some(Model::Rfe24G.code());
        assert_eq!(active_model(&info), Some(Model::RfeWSub1G));
        info.expansion_active = true;
        assert_eq!(active_model(&info), Some(Model::Rfe24G));
    }

    #[tokio::test]
    async fn invalid_sweep_sends_nothing() {
        let mock = mock_with_handshake();
        let handle = mock.handle();
        let session = open_session(mock).await;
        let sent_before = handle.sent_data().len();

        let result = session
            .sweep_blocking(SweepConfig::new(100_000_000, 200_000_000, 112).with_amp_range(0, -10))
            .await;
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
        assert_eq!(handle.sent_data().len(), sent_before);
        assert_eq!(session.state(), SessionState::Idle);

        session.close().await;
    }

    // =================================================================
    // Callback sweeps
    // =================================================================

    #[tokio::test]
    async fn callback_receives_records_in_order() {
        let session = open_session(plus_sweeping(112, 3)).await;
        let (tx, mut rx) = mpsc::unbounded_channel();

        session
            .sweep_with_callback(
                SweepConfig::new(100_000_000, 200_000_000, 112),
                move |record: &SweepRecord| {
                    let _ = tx.send(record.amplitudes_dbm[0]);
                },
            )
            .await
            .unwrap();

        assert_eq!(rx.recv().await, Some(-50.0));
        assert_eq!(rx.recv().await, Some(-50.5));
        assert_eq!(rx.recv().await, Some(-51.0));

        session.close().await;
        // Handler dropped on close.
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn second_callback_is_rejected() {
        let session = open_session(plus_sweeping(112, 0)).await;
        let config = SweepConfig::new(100_000_000, 200_000_000, 112);

        session
            .sweep_with_callback(config, |_: &SweepRecord| {})
            .await
            .unwrap();
        assert!(matches!(
            session.sweep_with_callback(config, |_: &SweepRecord| {}).await,
            Err(Error::AlreadyRegistered)
        ));

        session.unregister();
        session.close().await;
    }

    #[tokio::test]
    async fn unregister_stops_callback() {
        let mock = plus_sweeping(112, 1);
        let handle = mock.handle();
        let session = open_session(mock).await;
        let (tx, mut rx) = mpsc::unbounded_channel();

        session
            .sweep_with_callback(
                SweepConfig::new(100_000_000, 200_000_000, 112),
                move |record: &SweepRecord| {
                    let _ = tx.send(record.len());
                },
            )
            .await
            .unwrap();
        assert_eq!(rx.recv().await, Some(112));

        session.unregister();
        handle.push(&sweep_msg(112, 100));
        assert_eq!(rx.recv().await, None);

        session.close().await;
    }

    #[tokio::test]
    async fn callback_learns_of_fault() {
        struct Watcher(mpsc::UnboundedSender<Option<String>>);

        impl SweepHandler for Watcher {
            fn on_sweep(&mut self, _record: &SweepRecord) {
                let _ = self.0.send(None);
            }

            fn on_fault(&mut self, error: &Error) {
                let _ = self.0.send(Some(error.to_string()));
            }
        }

        let mock = plus_sweeping(112, 1);
        let handle = mock.handle();
        let session = open_session(mock).await;
        let (tx, mut rx) = mpsc::unbounded_channel();

        session
            .sweep_with_callback(SweepConfig::new(100_000_000, 200_000_000, 112), Watcher(tx))
            .await
            .unwrap();
        assert_eq!(rx.recv().await, Some(None));

        handle.inject_disconnect();
        assert_eq!(rx.recv().await, Some(Some("connection lost".to_string())));

        let mut state = session.watch_state();
        state
            .wait_for(|s| *s == SessionState::Faulted)
            .await
            .unwrap();
        session.close().await;
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn blocking_sweep_alongside_callback() {
        let mut mock = plus_sweeping(112, 1);
        // Second request for the same range is already satisfied; only the
        // commands are sent and the next streamed sweep is returned.
        mock.expect(&commands::cmd_set_sweep_points(112), b"");
        mock.expect(
            &commands::cmd_set_config(100_000_000, 200_000_000, -120, -10),
            &sweep_msg(112, 120),
        );
        let session = open_session(mock).await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let config = SweepConfig::new(100_000_000, 200_000_000, 112);

        session
            .sweep_with_callback(config, move |record: &SweepRecord| {
                let _ = tx.send(record.amplitudes_dbm[0]);
            })
            .await
            .unwrap();
        assert_eq!(rx.recv().await, Some(-50.0));

        let record = session.sweep_blocking(config).await.unwrap();
        assert_eq!(record.amplitudes_dbm[0], -60.0);
        assert_eq!(rx.recv().await, Some(-60.0));

        session.close().await;
    }

    #[tokio::test]
    async fn callback_is_not_installed_on_closed_link() {
        let connector = MockConnector::new();
        connector.push(mock_with_handshake());
        connector.push(plus_sweeping(112, 0));
        let session = session_with(connector);

        session.open().await.unwrap();
        let stale = session.link().unwrap();
        session.close().await;

        // Configuration finished just as close() ran.
        let (_sink, deliveries) = mpsc::unbounded_channel();
        let slot = CallbackSlot::spawn(Box::new(|_: &SweepRecord| {}), deliveries).unwrap();
        assert!(matches!(
            session.install_callback(&stale, slot),
            Err(Error::Closed)
        ));
        assert!(session.lock_callback().is_none());

        session.open().await.unwrap();
        session
            .sweep_with_callback(
                SweepConfig::new(100_000_000, 200_000_000, 112),
                |_: &SweepRecord| {},
            )
            .await
            .unwrap();
        session.unregister();
        session.close().await;
    }

    // =================================================================
    // Configuration without a record
    // =================================================================

    #[tokio::test]
    async fn center_span_configures_without_a_record() {
        let mut mock = plus_sweeping(112, 0);
        // The second request matches the acknowledged configuration.
        mock.expect(&commands::cmd_set_sweep_points(112), b"");
        mock.expect(
            &commands::cmd_set_config(100_000_000, 200_000_000, -120, -10),
            b"",
        );
        let handle = mock.handle();
        let session = open_session(mock).await;

        session
            .set_center_span_sweep_points(150_000_000, 100_000_000, 112)
            .await
            .unwrap();
        assert_eq!(session.state(), SessionState::Sweeping);
        assert_eq!(session.config().unwrap().start_hz, 100_000_000);

        session
            .set_center_span(150_000_000, 100_000_000)
            .await
            .unwrap();
        assert_eq!(handle.remaining_expectations(), 0);

        session.close().await;
    }

    #[tokio::test]
    async fn set_start_stop_validates_range() {
        let session = open_session(mock_with_handshake()).await;
        assert!(matches!(
            session.set_start_stop(900_000_000, 1_200_000_000).await,
            Err(Error::InvalidParameter(_))
        ));
        assert_eq!(session.state(), SessionState::Idle);
        session.close().await;
    }

    #[tokio::test]
    async fn config_callback_sees_new_configuration() {
        let session = session_with(MockConnector::with_transport(plus_sweeping(112, 0)));
        let (tx, mut rx) = mpsc::unbounded_channel();
        session
            .set_config_callback(move |config: &DeviceConfig| {
                let _ = tx.send(config.start_hz);
            })
            .unwrap();

        session.open().await.unwrap();
        session
            .configure(SweepConfig::new(100_000_000, 200_000_000, 112))
            .await
            .unwrap();

        let seen = tokio::time::timeout(Duration::from_secs(1), async {
            while let Some(start_hz) = rx.recv().await {
                if start_hz == 100_000_000 {
                    return true;
                }
            }
            false
        })
        .await
        .unwrap();
        assert!(seen);

        session.clear_config_callback();
        // Aborting the task drops the handler and its sender.
        assert_eq!(rx.recv().await, None);
        session.close().await;
    }

    #[test]
    fn config_callback_needs_runtime() {
        let session = session_with(MockConnector::new());
        assert!(matches!(
            session.set_config_callback(|_: &DeviceConfig| {}),
            Err(Error::Unsupported(_))
        ));
    }

    // =================================================================
    // Device control
    // =================================================================

    /// A WSUB1G with a 2.4G expansion module, main module active.
    fn mock_with_expansion() -> MockTransport {
        let mut response = b"#C2-M:003,004,01.15\r\n".to_vec();
        response.extend_from_slice(
            b"#C2-F:0240000,0642857,-010,-120,0112,0,000,0240000,0960000,0720000\r\n",
        );
        let mut mock = MockTransport::new();
        mock.expect(&commands::cmd_request_config(), &response);
        mock
    }

    #[tokio::test]
    async fn radio_modules_switch_and_report() {
        let mut mock = mock_with_expansion();
        mock.expect(
            &commands::cmd_switch_module(RadioModule::Expansion),
            b"#C2-F:2400000,0892857,-010,-120,0112,1,000,2350000,2550000,0200000\r\n",
        );
        mock.expect(
            &commands::cmd_switch_module(RadioModule::Main),
            b"#C2-F:0240000,0642857,-010,-120,0112,0,000,0240000,0960000,0720000\r\n",
        );
        let session = open_session(mock).await;
        assert_eq!(session.active_radio_module(), Some(RadioModule::Main));

        session.activate_expansion_radio_module().await.unwrap();
        assert_eq!(session.active_radio_module(), Some(RadioModule::Expansion));
        let info = session.info().unwrap();
        assert_eq!(info.min_freq_hz, 2_350_000_000);
        assert_eq!(info.max_freq_hz, 2_550_000_000);

        assert!(matches!(
            session.activate_expansion_radio_module().await,
            Err(Error::InvalidParameter(_))
        ));

        session.activate_main_radio_module().await.unwrap();
        assert_eq!(session.active_radio_module(), Some(RadioModule::Main));
        session.close().await;
    }

    #[tokio::test]
    async fn missing_expansion_module_is_unsupported() {
        let mock = mock_with_handshake();
        let handle = mock.handle();
        let session = open_session(mock).await;
        let sent_before = handle.sent_data().len();

        assert!(matches!(
            session.activate_expansion_radio_module().await,
            Err(Error::Unsupported(_))
        ));
        assert!(matches!(
            session.activate_main_radio_module().await,
            Err(Error::InvalidParameter(_))
        ));
        assert_eq!(handle.sent_data().len(), sent_before);
        session.close().await;
    }

    #[tokio::test]
    async fn unanswered_module_switch_times_out() {
        let mut mock = mock_with_expansion();
        mock.expect(&commands::cmd_switch_module(RadioModule::Expansion), b"");
        let session = open_session(mock).await;

        assert!(matches!(
            session.activate_expansion_radio_module().await,
            Err(Error::Timeout)
        ));
        assert_eq!(session.active_radio_module(), Some(RadioModule::Main));
        session.close().await;
    }

    #[tokio::test]
    async fn reboot_sends_command_and_closes() {
        let mut mock = mock_with_handshake();
        mock.expect(&commands::cmd_lcd_off(), b"");
        mock.expect(&commands::cmd_lcd_on(), b"");
        mock.expect(&commands::cmd_reboot(), b"");
        let handle = mock.handle();
        let session = open_session(mock).await;

        session.lcd_off().await.unwrap();
        session.lcd_on().await.unwrap();
        session.reboot().await.unwrap();

        assert_eq!(session.state(), SessionState::Disconnected);
        assert_eq!(handle.remaining_expectations(), 0);
        assert!(handle.is_closed());
    }

    #[tokio::test]
    async fn power_off_closes_and_allows_reopen() {
        let connector = MockConnector::new();
        let mut mock = mock_with_handshake();
        mock.expect(&commands::cmd_power_off(), b"");
        connector.push(mock);
        connector.push(mock_with_handshake());
        let session = session_with(connector);

        session.open().await.unwrap();
        session.power_off().await.unwrap();
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(matches!(session.lcd_on().await, Err(Error::NotConnected)));

        session.open().await.unwrap();
        assert_eq!(session.state(), SessionState::Idle);
        session.close().await;
    }

    // =================================================================
    // Settings
    // =================================================================

    #[tokio::test]
    async fn settings_commands_are_sent() {
        let mut mock = mock_with_handshake();
        mock.expect(&commands::cmd_set_calc_mode(CalcMode::MaxHold), b"");
        mock.expect(&commands::cmd_set_dsp_mode(DspMode::Fast), b"DSP:2\r\n");
        mock.expect(&commands::cmd_set_offset_db(-10), b"");
        mock.expect(&commands::cmd_set_input_stage(InputStage::Lna25dB), b"");
        mock.expect(&commands::cmd_hold(), b"");
        let handle = mock.handle();
        let session = open_session(mock).await;

        session.set_calc_mode(CalcMode::MaxHold).await.unwrap();
        session.set_dsp_mode(DspMode::Fast).await.unwrap();
        session.set_offset_db(-10).await.unwrap();
        session.set_input_stage(InputStage::Lna25dB).await.unwrap();
        session.hold().await.unwrap();

        assert_eq!(handle.remaining_expectations(), 0);
        assert_eq!(session.state(), SessionState::Idle);
        session.close().await;
    }

    #[tokio::test]
    async fn dsp_mode_waits_for_report() {
        let mut mock = mock_with_handshake();
        mock.expect(
            &commands::cmd_set_dsp_mode(DspMode::Fast),
            b"DSP:2\r\n#K0\r\n#a1\r\n",
        );
        let handle = mock.handle();
        let session = open_session(mock).await;
        assert_eq!(session.dsp_mode(), None);

        session.set_dsp_mode(DspMode::Fast).await.unwrap();
        assert_eq!(session.dsp_mode(), Some(DspMode::Fast));
        // Already reported: nothing is sent, so no expectation is needed.
        session.set_dsp_mode(DspMode::Fast).await.unwrap();
        assert_eq!(handle.remaining_expectations(), 0);

        let mut stage = session.shared.input_stage.subscribe();
        stage.wait_for(Option::is_some).await.unwrap();
        assert_eq!(session.tracking_status(), Some(TrackingStatus::Disabled));
        assert_eq!(session.input_stage(), Some(InputStage::Attenuator30dB));

        session.close().await;
    }

    #[tokio::test]
    async fn unreported_dsp_mode_times_out() {
        let mut mock = mock_with_handshake();
        mock.expect(&commands::cmd_set_dsp_mode(DspMode::Filter), b"");
        let session = open_session(mock).await;

        assert!(matches!(
            session.set_dsp_mode(DspMode::Filter).await,
            Err(Error::Timeout)
        ));
        assert_eq!(session.dsp_mode(), None);
        assert_eq!(session.state(), SessionState::Idle);

        session.close().await;
    }

    #[tokio::test]
    async fn serial_number_is_cached() {
        let mut mock = mock_with_handshake();
        mock.expect(
            &commands::cmd_request_serial_number(),
            b"#Sn0123456789ABCDEF\r\n",
        );
        let session = open_session(mock).await;

        assert_eq!(session.serial_number().await.unwrap(), "0123456789ABCDEF");
        // No second expectation queued: a second request would fail.
        assert_eq!(session.serial_number().await.unwrap(), "0123456789ABCDEF");
        session.close().await;
    }
}
