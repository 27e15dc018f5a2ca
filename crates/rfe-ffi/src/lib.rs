//! C ABI for the RF Explorer driver.
//!
//! Host programs hold an opaque [`RfeSession`] pointer returned by
//! [`rfe_open`] and release it with [`rfe_close`]. Each session owns a
//! small multi-thread tokio runtime; every call blocks the calling thread
//! on that runtime until the operation completes, so the C side never sees
//! async code.
//!
//! All functions report failure through [`RfeStatus`] and never unwind
//! into the caller. The header `include/rfe.h` is generated from this file
//! by `build.rs`.
//!
//! ```c
//! RfeStatus status;
//! RfeSession *rfe = rfe_open("/dev/ttyUSB0", 0, &status);
//! if (rfe == NULL) return status;
//!
//! RfeSweepConfig cfg = { 430000000, 440000000, 112 };
//! RfeSweep sweep;
//! if (rfe_sweep(rfe, &cfg, &sweep) == RFE_STATUS_OK) {
//!     printf("%zu points\n", sweep.len);
//!     rfe_sweep_free(&sweep);
//! }
//! rfe_close(rfe);
//! ```
//!
//! # Linking
//!
//! The shared library is self-contained. The static library needs the
//! platform's port enumeration libraries at link time: `libudev` on Linux,
//! `SetupAPI` and `Advapi32` on Windows, `CoreFoundation` and `IOKit` on
//! macOS.

use std::ffi::{c_char, c_void, CStr, CString};
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::ptr;
use std::sync::Arc;

use tokio::runtime::Runtime;
use tracing::{debug, error, warn};

use rfe_analyzer::{Session, SessionBuilder, SweepHandler};
use rfe_core::error::Error;
use rfe_core::{DeviceInfo, SessionState, SweepConfig, SweepRecord};

/// `expansion_model_id` when no expansion module is fitted.
pub const RFE_NO_EXPANSION: u8 = 255;

/// Result of every fallible call.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RfeStatus {
    Ok = 0,
    /// No link: the port is missing, busy, or the session is not open.
    NotConnected = 1,
    /// The analyzer did not answer in time.
    Timeout = 2,
    /// A null pointer, invalid UTF-8, or a value the analyzer cannot use.
    InvalidArgument = 3,
    /// The link failed. Close and reopen the session.
    DeviceFault = 4,
    /// A sweep callback is already registered.
    AlreadyRegistered = 5,
    /// The session was closed while the call was pending.
    Closed = 6,
}

impl From<&Error> for RfeStatus {
    fn from(error: &Error) -> Self {
        match error {
            Error::Timeout => RfeStatus::Timeout,
            Error::NotConnected
            | Error::NotFound(_)
            | Error::PermissionDenied(_)
            | Error::AlreadyOpen => RfeStatus::NotConnected,
            Error::InvalidParameter(_) | Error::Unsupported(_) => RfeStatus::InvalidArgument,
            Error::AlreadyRegistered => RfeStatus::AlreadyRegistered,
            Error::Closed => RfeStatus::Closed,
            Error::Faulted
            | Error::ConnectionLost
            | Error::Transport(_)
            | Error::Protocol(_)
            | Error::Io(_) => RfeStatus::DeviceFault,
        }
    }
}

/// Session lifecycle state, as reported by [`rfe_state`].
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RfeSessionState {
    Disconnected = 0,
    Connecting = 1,
    Configuring = 2,
    Idle = 3,
    Sweeping = 4,
    Faulted = 5,
}

impl From<SessionState> for RfeSessionState {
    fn from(state: SessionState) -> Self {
        match state {
            SessionState::Disconnected => RfeSessionState::Disconnected,
            SessionState::Connecting => RfeSessionState::Connecting,
            SessionState::Configuring => RfeSessionState::Configuring,
            SessionState::Idle => RfeSessionState::Idle,
            SessionState::Sweeping => RfeSessionState::Sweeping,
            SessionState::Faulted => RfeSessionState::Faulted,
        }
    }
}

/// Identity and frequency limits of the connected analyzer.
///
/// Strings are NUL-terminated and truncated to fit.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RfeDeviceInfo {
    pub model_id: u8,
    /// [`RFE_NO_EXPANSION`] when absent.
    pub expansion_model_id: u8,
    /// Whether the frequency limits below belong to the expansion module.
    pub expansion_active: bool,
    pub model_name: [c_char; 32],
    pub firmware_version: [c_char; 16],
    pub min_freq_hz: u64,
    pub max_freq_hz: u64,
    pub min_span_hz: u64,
    pub max_span_hz: u64,
}

impl From<&DeviceInfo> for RfeDeviceInfo {
    fn from(info: &DeviceInfo) -> Self {
        let mut out = RfeDeviceInfo {
            model_id: info.model_id,
            expansion_model_id: info.expansion_model_id.unwrap_or(RFE_NO_EXPANSION),
            expansion_active: info.expansion_active,
            model_name: [0; 32],
            firmware_version: [0; 16],
            min_freq_hz: info.min_freq_hz,
            max_freq_hz: info.max_freq_hz,
            min_span_hz: info.min_span_hz,
            max_span_hz: info.max_span_hz,
        };
        copy_cstr(&info.model_name, &mut out.model_name);
        copy_cstr(&info.firmware_version, &mut out.firmware_version);
        out
    }
}

/// Requested sweep. The amplitude range is left as the analyzer has it.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RfeSweepConfig {
    pub start_hz: u64,
    pub stop_hz: u64,
    pub sweep_points: u16,
}

impl From<&RfeSweepConfig> for SweepConfig {
    fn from(config: &RfeSweepConfig) -> Self {
        SweepConfig::new(config.start_hz, config.stop_hz, config.sweep_points)
    }
}

/// One sweep. Point `i` is at `start_hz + i * (stop_hz - start_hz) / (len - 1)`.
///
/// Filled by [`rfe_sweep`], the buffer belongs to the caller until
/// [`rfe_sweep_free`]. Passed to a callback, it is borrowed for the
/// duration of the call only.
#[repr(C)]
#[derive(Debug)]
pub struct RfeSweep {
    pub amplitudes_dbm: *mut f32,
    pub len: usize,
    pub start_hz: u64,
    pub stop_hz: u64,
    /// Host receive time, milliseconds since the Unix epoch.
    pub timestamp_ms: i64,
}

impl RfeSweep {
    fn owned(record: SweepRecord) -> Self {
        let timestamp_ms = record.timestamp.timestamp_millis();
        let amplitudes = record.amplitudes_dbm.into_boxed_slice();
        let len = amplitudes.len();
        RfeSweep {
            amplitudes_dbm: Box::into_raw(amplitudes) as *mut f32,
            len,
            start_hz: record.start_hz,
            stop_hz: record.stop_hz,
            timestamp_ms,
        }
    }

    fn borrowed(record: &SweepRecord) -> Self {
        RfeSweep {
            amplitudes_dbm: record.amplitudes_dbm.as_ptr() as *mut f32,
            len: record.amplitudes_dbm.len(),
            start_hz: record.start_hz,
            stop_hz: record.stop_hz,
            timestamp_ms: record.timestamp.timestamp_millis(),
        }
    }
}

/// Receives every sweep with `RFE_STATUS_OK`, then at most one
/// `RFE_STATUS_DEVICE_FAULT` with a null sweep if the link fails.
///
/// Runs on a driver thread. The sweep must not be retained after return.
pub type RfeSweepCallback =
    Option<extern "C" fn(sweep: *const RfeSweep, status: RfeStatus, user_data: *mut c_void)>;

/// Opaque session handle.
pub struct RfeSession {
    // Dropped before the runtime its IO task runs on.
    session: Session,
    runtime: Runtime,
}

impl RfeSession {
    fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }
}

struct ForeignHandler {
    callback: extern "C" fn(*const RfeSweep, RfeStatus, *mut c_void),
    user_data: *mut c_void,
}

// SAFETY: the caller of `rfe_sweep_with_callback` promises that
// `user_data` may be used from the driver's callback thread.
unsafe impl Send for ForeignHandler {}

impl SweepHandler for ForeignHandler {
    fn on_sweep(&mut self, record: &SweepRecord) {
        let view = RfeSweep::borrowed(record);
        (self.callback)(&view, RfeStatus::Ok, self.user_data);
    }

    fn on_fault(&mut self, error: &Error) {
        debug!(error = %error, "notifying C callback of fault");
        (self.callback)(ptr::null(), RfeStatus::DeviceFault, self.user_data);
    }
}

/// Run `f`, turning a panic into `fallback`.
fn guarded<T>(fallback: T, f: impl FnOnce() -> T) -> T {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|_| {
        error!("panic inside rfe call");
        fallback
    })
}

/// Take a new reference to the session behind `handle`.
///
/// The reference keeps the session alive even if another thread calls
/// `rfe_close` concurrently.
unsafe fn acquire(handle: *const RfeSession) -> Option<Arc<RfeSession>> {
    if handle.is_null() {
        return None;
    }
    Arc::increment_strong_count(handle);
    Some(Arc::from_raw(handle))
}

fn into_handle(session: RfeSession) -> *mut RfeSession {
    Arc::into_raw(Arc::new(session)) as *mut RfeSession
}

fn new_runtime() -> Result<Runtime, RfeStatus> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("rfe-io")
        .enable_all()
        .build()
        .map_err(|e| {
            error!(error = %e, "failed to start runtime");
            RfeStatus::DeviceFault
        })
}

fn builder_for(baud: u32) -> SessionBuilder {
    let builder = SessionBuilder::new();
    if baud == 0 {
        builder
    } else {
        builder.baud_rate(baud)
    }
}

/// Give `session` a runtime and open it.
fn start(session: Session) -> Result<RfeSession, RfeStatus> {
    let runtime = new_runtime()?;
    if let Err(e) = runtime.block_on(session.open()) {
        warn!(port = %session.port_name(), error = %e, "open failed");
        return Err(RfeStatus::from(&e));
    }
    Ok(RfeSession { session, runtime })
}

unsafe fn open_serial(port: *const c_char, baud: u32) -> Result<RfeSession, RfeStatus> {
    if port.is_null() {
        return Err(RfeStatus::InvalidArgument);
    }
    let port = CStr::from_ptr(port)
        .to_str()
        .map_err(|_| RfeStatus::InvalidArgument)?;
    let session = builder_for(baud)
        .serial_port(port)
        .build()
        .map_err(|e| RfeStatus::from(&e))?;
    start(session)
}

fn open_detected(baud: u32) -> Result<RfeSession, RfeStatus> {
    let runtime = new_runtime()?;
    match runtime.block_on(builder_for(baud).connect_any()) {
        Ok(session) => Ok(RfeSession { session, runtime }),
        Err(e) => {
            warn!(error = %e, "no analyzer detected");
            Err(RfeStatus::from(&e))
        }
    }
}

fn status(result: rfe_core::Result<()>) -> RfeStatus {
    match result {
        Ok(()) => RfeStatus::Ok,
        Err(e) => RfeStatus::from(&e),
    }
}

/// Turn an open result into a handle, reporting through `status` if it is
/// not null.
unsafe fn finish_open(
    result: Result<RfeSession, RfeStatus>,
    status: *mut RfeStatus,
) -> *mut RfeSession {
    let (handle, code) = match result {
        Ok(session) => (into_handle(session), RfeStatus::Ok),
        Err(code) => (ptr::null_mut(), code),
    };
    if !status.is_null() {
        *status = code;
    }
    handle
}

fn copy_cstr(src: &str, dst: &mut [c_char]) {
    let Some(room) = dst.len().checked_sub(1) else {
        return;
    };
    let n = src.len().min(room);
    for (d, s) in dst.iter_mut().zip(&src.as_bytes()[..n]) {
        *d = *s as c_char;
    }
    dst[n] = 0;
}

/// Open the analyzer on `port` (e.g. `/dev/ttyUSB0`, `COM3`).
///
/// `baud` of 0 selects the default 500 000. Returns null on failure with
/// `*status` set; `status` may be null.
///
/// # Safety
///
/// `port` must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn rfe_open(
    port: *const c_char,
    baud: u32,
    status: *mut RfeStatus,
) -> *mut RfeSession {
    let result = guarded(Err(RfeStatus::DeviceFault), || open_serial(port, baud));
    finish_open(result, status)
}

/// Open the first analyzer found on any serial port.
///
/// Ports are tried in the order the OS lists them. Fails with
/// `RFE_STATUS_NOT_CONNECTED` if none answers. `baud` and `status` as for
/// [`rfe_open`].
///
/// # Safety
///
/// `status` must be null or writable.
#[no_mangle]
pub unsafe extern "C" fn rfe_open_any(baud: u32, status: *mut RfeStatus) -> *mut RfeSession {
    let result = guarded(Err(RfeStatus::DeviceFault), || open_detected(baud));
    finish_open(result, status)
}

/// Close the session and release the caller's handle. Null is ignored.
///
/// Calls blocked on other threads return `RFE_STATUS_CLOSED`.
///
/// # Safety
///
/// `handle` must come from `rfe_open` and must not be used afterwards.
#[no_mangle]
pub unsafe extern "C" fn rfe_close(handle: *mut RfeSession) {
    if handle.is_null() {
        return;
    }
    let owned = Arc::from_raw(handle as *const RfeSession);
    guarded((), || owned.block_on(owned.session.close()));
}

/// Close and open the session again. The way out of `FAULTED`.
///
/// # Safety
///
/// `handle` must be null or a live handle from `rfe_open`.
#[no_mangle]
pub unsafe extern "C" fn rfe_reopen(handle: *const RfeSession) -> RfeStatus {
    let Some(rfe) = acquire(handle) else {
        return RfeStatus::InvalidArgument;
    };
    guarded(RfeStatus::DeviceFault, || {
        rfe.block_on(async {
            rfe.session.close().await;
            match rfe.session.open().await {
                Ok(()) => RfeStatus::Ok,
                Err(e) => RfeStatus::from(&e),
            }
        })
    })
}

/// Fill `*out` with the analyzer's identity.
///
/// # Safety
///
/// `handle` must be null or a live handle; `out` must be null or writable.
#[no_mangle]
pub unsafe extern "C" fn rfe_get_info(
    handle: *const RfeSession,
    out: *mut RfeDeviceInfo,
) -> RfeStatus {
    if out.is_null() {
        return RfeStatus::InvalidArgument;
    }
    let Some(rfe) = acquire(handle) else {
        return RfeStatus::InvalidArgument;
    };
    guarded(RfeStatus::DeviceFault, || {
        match rfe.block_on(rfe.session.request_info()) {
            Ok(info) => {
                *out = RfeDeviceInfo::from(&info);
                RfeStatus::Ok
            }
            Err(e) => RfeStatus::from(&e),
        }
    })
}

/// Copy the device serial number into `buf` as a NUL-terminated string.
///
/// Returns `RFE_STATUS_INVALID_ARGUMENT` if it does not fit in `len` bytes.
///
/// # Safety
///
/// `handle` must be null or a live handle; `buf` must be null or point to
/// `len` writable bytes.
#[no_mangle]
pub unsafe extern "C" fn rfe_serial_number(
    handle: *const RfeSession,
    buf: *mut c_char,
    len: usize,
) -> RfeStatus {
    if buf.is_null() || len == 0 {
        return RfeStatus::InvalidArgument;
    }
    let Some(rfe) = acquire(handle) else {
        return RfeStatus::InvalidArgument;
    };
    guarded(RfeStatus::DeviceFault, || {
        match rfe.block_on(rfe.session.serial_number()) {
            Ok(serial) if serial.len() < len => {
                copy_cstr(&serial, std::slice::from_raw_parts_mut(buf, len));
                RfeStatus::Ok
            }
            Ok(_) => RfeStatus::InvalidArgument,
            Err(e) => RfeStatus::from(&e),
        }
    })
}

/// Configure a sweep and wait for the first record taken with it.
///
/// On success `*out` owns its amplitude buffer; release it with
/// [`rfe_sweep_free`].
///
/// # Safety
///
/// `handle` must be null or a live handle; `config` must be null or
/// readable; `out` must be null or writable.
#[no_mangle]
pub unsafe extern "C" fn rfe_sweep(
    handle: *const RfeSession,
    config: *const RfeSweepConfig,
    out: *mut RfeSweep,
) -> RfeStatus {
    if config.is_null() || out.is_null() {
        return RfeStatus::InvalidArgument;
    }
    let Some(rfe) = acquire(handle) else {
        return RfeStatus::InvalidArgument;
    };
    let config = SweepConfig::from(&*config);
    guarded(RfeStatus::DeviceFault, || {
        match rfe.block_on(rfe.session.sweep_blocking(config)) {
            Ok(record) => {
                *out = RfeSweep::owned(record);
                RfeStatus::Ok
            }
            Err(e) => RfeStatus::from(&e),
        }
    })
}

/// Release the buffer of a sweep filled by [`rfe_sweep`]. Safe to call
/// twice; null is ignored.
///
/// # Safety
///
/// `sweep` must be null or a sweep filled by `rfe_sweep`, not one passed to
/// a callback.
#[no_mangle]
pub unsafe extern "C" fn rfe_sweep_free(sweep: *mut RfeSweep) {
    if sweep.is_null() {
        return;
    }
    let sweep = &mut *sweep;
    if !sweep.amplitudes_dbm.is_null() {
        drop(Box::from_raw(ptr::slice_from_raw_parts_mut(
            sweep.amplitudes_dbm,
            sweep.len,
        )));
    }
    sweep.amplitudes_dbm = ptr::null_mut();
    sweep.len = 0;
}

/// Configure a sweep and stream every following record to `callback`.
///
/// Returns once the analyzer acknowledges the configuration. Only one
/// callback may be registered at a time.
///
/// # Safety
///
/// `handle` must be null or a live handle; `config` must be null or
/// readable. `user_data` is passed back untouched from another thread and
/// must stay valid until `rfe_unregister` or `rfe_close` returns.
#[no_mangle]
pub unsafe extern "C" fn rfe_sweep_with_callback(
    handle: *const RfeSession,
    config: *const RfeSweepConfig,
    callback: RfeSweepCallback,
    user_data: *mut c_void,
) -> RfeStatus {
    let Some(callback) = callback else {
        return RfeStatus::InvalidArgument;
    };
    if config.is_null() {
        return RfeStatus::InvalidArgument;
    }
    let Some(rfe) = acquire(handle) else {
        return RfeStatus::InvalidArgument;
    };
    let config = SweepConfig::from(&*config);
    let handler = ForeignHandler {
        callback,
        user_data,
    };
    guarded(RfeStatus::DeviceFault, || {
        match rfe.block_on(rfe.session.sweep_with_callback(config, handler)) {
            Ok(()) => RfeStatus::Ok,
            Err(e) => RfeStatus::from(&e),
        }
    })
}

/// Stop callback deliveries. No invocation starts after this returns,
/// except when called from inside the callback itself. Idempotent.
///
/// # Safety
///
/// `handle` must be null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn rfe_unregister(handle: *const RfeSession) -> RfeStatus {
    let Some(rfe) = acquire(handle) else {
        return RfeStatus::InvalidArgument;
    };
    guarded(RfeStatus::DeviceFault, || {
        rfe.session.unregister();
        RfeStatus::Ok
    })
}

/// Current lifecycle state. A null handle reads as disconnected.
///
/// # Safety
///
/// `handle` must be null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn rfe_state(handle: *const RfeSession) -> RfeSessionState {
    match acquire(handle) {
        Some(rfe) => RfeSessionState::from(rfe.session.state()),
        None => RfeSessionState::Disconnected,
    }
}

/// Sweep `span_hz` around `center_hz` without waiting for a record.
///
/// `sweep_points` of 0 keeps the current point count.
///
/// # Safety
///
/// `handle` must be null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn rfe_set_center_span(
    handle: *const RfeSession,
    center_hz: u64,
    span_hz: u64,
    sweep_points: u16,
) -> RfeStatus {
    let Some(rfe) = acquire(handle) else {
        return RfeStatus::InvalidArgument;
    };
    guarded(RfeStatus::DeviceFault, || {
        let result = if sweep_points == 0 {
            rfe.block_on(rfe.session.set_center_span(center_hz, span_hz))
        } else {
            rfe.block_on(
                rfe.session
                    .set_center_span_sweep_points(center_hz, span_hz, sweep_points),
            )
        };
        status(result)
    })
}

/// Make the main radio module active.
///
/// Returns `RFE_STATUS_INVALID_ARGUMENT` if it already is.
///
/// # Safety
///
/// `handle` must be null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn rfe_activate_main_module(handle: *const RfeSession) -> RfeStatus {
    let Some(rfe) = acquire(handle) else {
        return RfeStatus::InvalidArgument;
    };
    guarded(RfeStatus::DeviceFault, || {
        status(rfe.block_on(rfe.session.activate_main_radio_module()))
    })
}

/// Make the expansion radio module active.
///
/// Returns `RFE_STATUS_INVALID_ARGUMENT` if none is fitted or it already
/// is active.
///
/// # Safety
///
/// `handle` must be null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn rfe_activate_expansion_module(handle: *const RfeSession) -> RfeStatus {
    let Some(rfe) = acquire(handle) else {
        return RfeStatus::InvalidArgument;
    };
    guarded(RfeStatus::DeviceFault, || {
        status(rfe.block_on(rfe.session.activate_expansion_radio_module()))
    })
}

/// Turn the analyzer's display on.
///
/// # Safety
///
/// `handle` must be null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn rfe_lcd_on(handle: *const RfeSession) -> RfeStatus {
    let Some(rfe) = acquire(handle) else {
        return RfeStatus::InvalidArgument;
    };
    guarded(RfeStatus::DeviceFault, || {
        status(rfe.block_on(rfe.session.lcd_on()))
    })
}

/// Blank the analyzer's display. Sweeps keep streaming.
///
/// # Safety
///
/// `handle` must be null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn rfe_lcd_off(handle: *const RfeSession) -> RfeStatus {
    let Some(rfe) = acquire(handle) else {
        return RfeStatus::InvalidArgument;
    };
    guarded(RfeStatus::DeviceFault, || {
        status(rfe.block_on(rfe.session.lcd_off()))
    })
}

/// Restart the analyzer. The session is left disconnected; call
/// [`rfe_reopen`] once the device is back.
///
/// # Safety
///
/// `handle` must be null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn rfe_reboot(handle: *const RfeSession) -> RfeStatus {
    let Some(rfe) = acquire(handle) else {
        return RfeStatus::InvalidArgument;
    };
    guarded(RfeStatus::DeviceFault, || {
        status(rfe.block_on(rfe.session.reboot()))
    })
}

/// Switch the analyzer off. The session is left disconnected.
///
/// # Safety
///
/// `handle` must be null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn rfe_power_off(handle: *const RfeSession) -> RfeStatus {
    let Some(rfe) = acquire(handle) else {
        return RfeStatus::InvalidArgument;
    };
    guarded(RfeStatus::DeviceFault, || {
        status(rfe.block_on(rfe.session.power_off()))
    })
}

/// Names of the serial ports on this machine. Returns null when there
/// are none; release with [`rfe_port_names_free`].
///
/// # Safety
///
/// `len` must be null or writable.
#[no_mangle]
pub unsafe extern "C" fn rfe_port_names(len: *mut usize) -> *mut *mut c_char {
    if len.is_null() {
        return ptr::null_mut();
    }
    *len = 0;
    let ports = match guarded(Ok(Vec::new()), rfe_transport::list_ports) {
        Ok(ports) => ports,
        Err(e) => {
            warn!(error = %e, "port enumeration failed");
            return ptr::null_mut();
        }
    };
    let names: Box<[*mut c_char]> = ports
        .into_iter()
        .filter_map(|port| CString::new(port.name).ok())
        .map(CString::into_raw)
        .collect();
    if names.is_empty() {
        return ptr::null_mut();
    }
    *len = names.len();
    Box::into_raw(names) as *mut *mut c_char
}

/// Release a list returned by [`rfe_port_names`]. Null is ignored.
///
/// # Safety
///
/// `names` and `len` must be exactly what `rfe_port_names` returned.
#[no_mangle]
pub unsafe extern "C" fn rfe_port_names_free(names: *mut *mut c_char, len: usize) {
    if names.is_null() {
        return;
    }
    let names = Box::from_raw(ptr::slice_from_raw_parts_mut(names, len));
    for &name in names.iter() {
        if !name.is_null() {
            drop(CString::from_raw(name));
        }
    }
}
