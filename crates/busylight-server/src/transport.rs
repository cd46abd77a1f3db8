//! Hardware transport for the light.
//!
//! The device takes single-byte commands over a serial line. Anything that
//! accepts writes can stand in for it: when the opened file is not a tty the
//! line setup is skipped.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use busylight_core::Light;
use regex::Regex;
use tracing::{debug, info, trace};

use crate::config::DeviceConfig;
use crate::error::{ServerError, ServerResult};

/// Baud rates the serial line can be configured for.
pub const SUPPORTED_BAUD_RATES: &[u32] = &[1200, 2400, 4800, 9600, 19200, 38400, 57600, 115200];

/// Byte channel to the light.
pub trait IndicatorTransport: Send {
    /// Opens the device described by `device`, closing any previous one.
    fn open(&mut self, device: &DeviceConfig) -> ServerResult<()>;

    fn close(&mut self);

    fn is_open(&self) -> bool;

    /// Sends one frame. A closed transport discards it.
    fn write(&mut self, frame: &[u8]) -> ServerResult<()>;

    /// Path or label of the open device.
    fn device_name(&self) -> Option<String>;
}

/// Plays a light sequence, holding each light for its duration.
pub async fn play_pattern(
    transport: &mut dyn IndicatorTransport,
    pattern: &[(Light, Duration)],
) -> ServerResult<()> {
    for (light, hold) in pattern {
        transport.write(&[light.code()])?;
        if !hold.is_zero() {
            tokio::time::sleep(*hold).await;
        }
    }
    Ok(())
}

/// Serial port transport.
#[derive(Debug, Default)]
pub struct SerialTransport {
    port: Option<(PathBuf, File)>,
}

impl SerialTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IndicatorTransport for SerialTransport {
    fn open(&mut self, device: &DeviceConfig) -> ServerResult<()> {
        self.close();

        let candidates = candidates(device)?;
        let mut last_error = None;
        for path in candidates {
            match open_port(&path, device.baud_rate) {
                Ok(file) => {
                    info!(device = %path.display(), baud = device.baud_rate, "Opened light");
                    self.port = Some((path, file));
                    return Ok(());
                }
                Err(e) => {
                    debug!(device = %path.display(), error = %e, "Could not open candidate");
                    last_error = Some(format!("{}: {e}", path.display()));
                }
            }
        }

        Err(ServerError::device(match last_error {
            Some(e) => format!("no usable device ({e})"),
            None => "no device matches the configuration".to_string(),
        }))
    }

    fn close(&mut self) {
        if let Some((path, _)) = self.port.take() {
            info!(device = %path.display(), "Closed light");
        }
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn write(&mut self, frame: &[u8]) -> ServerResult<()> {
        let Some((path, file)) = self.port.as_mut() else {
            trace!("Light closed, dropping frame");
            return Ok(());
        };
        file.write_all(frame)?;
        file.flush()?;
        trace!(device = %path.display(), frame = %String::from_utf8_lossy(frame), "Wrote frame");
        Ok(())
    }

    fn device_name(&self) -> Option<String> {
        self.port
            .as_ref()
            .map(|(path, _)| path.display().to_string())
    }
}

/// Lists device paths to try, in order.
fn candidates(device: &DeviceConfig) -> ServerResult<Vec<PathBuf>> {
    if let Some(ref path) = device.path {
        return Ok(vec![path.clone()]);
    }

    let (Some(dir), Some(pattern)) = (&device.dir, &device.pattern) else {
        return Err(ServerError::device(
            "device needs either 'path' or both 'dir' and 'pattern'",
        ));
    };
    let regex = Regex::new(pattern)
        .map_err(|e| ServerError::device(format!("invalid device pattern: {e}")))?;

    let mut matches: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(Result::ok)
        .filter(|entry| regex.is_match(&entry.file_name().to_string_lossy()))
        .map(|entry| entry.path())
        .collect();
    matches.sort();
    Ok(matches)
}

fn open_port(path: &Path, baud_rate: u32) -> ServerResult<File> {
    let mut options = OpenOptions::new();
    options.write(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.custom_flags(libc::O_NOCTTY);
    }
    let file = options.open(path)?;
    configure_line(&file, baud_rate)?;
    Ok(file)
}

#[cfg(unix)]
fn configure_line(file: &File, baud_rate: u32) -> ServerResult<()> {
    use std::os::fd::AsRawFd;

    let fd = file.as_raw_fd();
    if unsafe { libc::isatty(fd) } == 0 {
        debug!("Device is not a tty, skipping line setup");
        return Ok(());
    }

    let speed = baud_constant(baud_rate)
        .ok_or_else(|| ServerError::device(format!("unsupported baud rate {baud_rate}")))?;

    let mut tio: libc::termios = unsafe { std::mem::zeroed() };
    if unsafe { libc::tcgetattr(fd, &mut tio) } != 0 {
        return Err(std::io::Error::last_os_error().into());
    }
    unsafe {
        libc::cfmakeraw(&mut tio);
        libc::cfsetispeed(&mut tio, speed);
        libc::cfsetospeed(&mut tio, speed);
    }
    if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &tio) } != 0 {
        return Err(std::io::Error::last_os_error().into());
    }
    Ok(())
}

#[cfg(not(unix))]
fn configure_line(_file: &File, _baud_rate: u32) -> ServerResult<()> {
    Ok(())
}

#[cfg(unix)]
fn baud_constant(baud_rate: u32) -> Option<libc::speed_t> {
    Some(match baud_rate {
        1200 => libc::B1200,
        2400 => libc::B2400,
        4800 => libc::B4800,
        9600 => libc::B9600,
        19200 => libc::B19200,
        38400 => libc::B38400,
        57600 => libc::B57600,
        115200 => libc::B115200,
        _ => return None,
    })
}
