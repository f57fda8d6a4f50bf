//! Serial line setup for the modem's AT port.
//!
//! The port is put in raw mode with carriage returns discarded on input,
//! so the core only ever sees line-feed terminated records.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::Path;

use cellup_core::Error;

/// Opens `path` and programs the line discipline. The returned file is
/// used for both directions.
pub fn open(path: &Path, baud: u32) -> Result<File, Error> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_NOCTTY | libc::O_NONBLOCK | libc::O_SYNC)
        .open(path)
        .map_err(|source| Error::TransportOpen {
            path: path.to_path_buf(),
            source,
        })?;
    let fd = file.as_raw_fd();

    // SAFETY: `fd` is owned by `file`, which outlives every call below.
    if unsafe { libc::isatty(fd) } == 0 {
        return Err(Error::TransportOpen {
            path: path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "not a UART device"),
        });
    }

    // SAFETY: as above; TIOCEXCL takes no argument.
    if unsafe { libc::ioctl(fd, libc::TIOCEXCL) } < 0 {
        tracing::warn!(
            path = %path.display(),
            error = %io::Error::last_os_error(),
            "could not gain exclusive access"
        );
    }

    configure(fd, baud)
        .and_then(|()| set_blocking(fd))
        .map_err(|reason| Error::TransportConfigure {
            path: path.to_path_buf(),
            reason,
        })?;

    tracing::info!(path = %path.display(), baud, "serial port ready");
    Ok(file)
}

fn configure(fd: libc::c_int, baud: u32) -> Result<(), String> {
    let speed = speed_for(baud).ok_or_else(|| format!("unsupported baud rate {baud}"))?;

    // SAFETY: termios is plain data; tcgetattr fills it before it is read.
    let mut tio: libc::termios = unsafe { std::mem::zeroed() };
    if unsafe { libc::tcgetattr(fd, &mut tio) } < 0 {
        return Err(format!("tcgetattr: {}", io::Error::last_os_error()));
    }

    unsafe { libc::cfmakeraw(&mut tio) };
    tio.c_cflag |= libc::CLOCAL | libc::CREAD;
    tio.c_iflag |= libc::IGNCR;
    // Block until at least one byte is available.
    tio.c_cc[libc::VMIN] = 1;
    tio.c_cc[libc::VTIME] = 0;

    if unsafe { libc::cfsetispeed(&mut tio, speed) } < 0
        || unsafe { libc::cfsetospeed(&mut tio, speed) } < 0
    {
        return Err(format!("cfsetspeed: {}", io::Error::last_os_error()));
    }

    if unsafe { libc::tcsetattr(fd, libc::TCSAFLUSH, &tio) } < 0 {
        return Err(format!("tcsetattr: {}", io::Error::last_os_error()));
    }
    Ok(())
}

/// Clears `O_NONBLOCK` once `CLOCAL` is in effect, so reads wait for
/// `VMIN` bytes.
fn set_blocking(fd: libc::c_int) -> Result<(), String> {
    // SAFETY: `fd` is a valid open descriptor for the duration of the call.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(format!("fcntl(F_GETFL): {}", io::Error::last_os_error()));
    }
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags & !libc::O_NONBLOCK) } < 0 {
        return Err(format!("fcntl(F_SETFL): {}", io::Error::last_os_error()));
    }
    Ok(())
}

/// termios speed constant for a baud rate.
pub fn speed_for(baud: u32) -> Option<libc::speed_t> {
    let speed = match baud {
        9_600 => libc::B9600,
        19_200 => libc::B19200,
        38_400 => libc::B38400,
        57_600 => libc::B57600,
        115_200 => libc::B115200,
        230_400 => libc::B230400,
        #[cfg(target_os = "linux")]
        460_800 => libc::B460800,
        #[cfg(target_os = "linux")]
        921_600 => libc::B921600,
        _ => return None,
    };
    Some(speed)
}
