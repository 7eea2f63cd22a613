//! Scoped redirection of the process's stdout/stderr descriptors to
//! `/dev/null`, for estimators that print from native code.

use crate::domain::{PipelineError, PipelineResult};

/// Runs `f` with both output descriptors silenced. They are restored when
/// `f` returns, errors or panics.
pub fn silenced<T>(f: impl FnOnce() -> PipelineResult<T>) -> PipelineResult<T> {
    let _guard = OutputSilencer::engage()?;
    f()
}

/// Serializes tests that swap or inspect the process descriptors.
#[cfg(test)]
pub(crate) fn descriptor_test_lock() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
    LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[cfg(unix)]
pub use unix::OutputSilencer;

#[cfg(not(unix))]
pub use fallback::OutputSilencer;

#[cfg(unix)]
mod unix {
    use super::{PipelineError, PipelineResult};
    use std::fs::OpenOptions;
    use std::io::{self, Write};
    use std::os::fd::{AsRawFd, RawFd};
    use std::sync::{Mutex, MutexGuard, PoisonError};

    // Descriptor swaps are process-wide; only one guard may be live.
    static REDIRECT_LOCK: Mutex<()> = Mutex::new(());

    #[derive(Debug)]
    pub struct OutputSilencer {
        saved_stdout: RawFd,
        saved_stderr: RawFd,
        _lock: MutexGuard<'static, ()>,
    }

    impl OutputSilencer {
        pub fn engage() -> PipelineResult<Self> {
            let lock = REDIRECT_LOCK
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            flush_std_streams();

            let devnull = OpenOptions::new()
                .write(true)
                .open("/dev/null")
                .map_err(|source| redirect_error("open /dev/null", source))?;

            let saved_stdout = duplicate(libc::STDOUT_FILENO)?;
            let saved_stderr = match duplicate(libc::STDERR_FILENO) {
                Ok(fd) => fd,
                Err(error) => {
                    close(saved_stdout);
                    return Err(error);
                }
            };
            let silencer = Self {
                saved_stdout,
                saved_stderr,
                _lock: lock,
            };

            // On failure the partially built guard restores whatever was swapped.
            redirect(devnull.as_raw_fd(), libc::STDOUT_FILENO)?;
            redirect(devnull.as_raw_fd(), libc::STDERR_FILENO)?;
            Ok(silencer)
        }
    }

    impl Drop for OutputSilencer {
        fn drop(&mut self) {
            flush_std_streams();
            unsafe {
                libc::dup2(self.saved_stdout, libc::STDOUT_FILENO);
                libc::dup2(self.saved_stderr, libc::STDERR_FILENO);
            }
            close(self.saved_stdout);
            close(self.saved_stderr);
        }
    }

    fn flush_std_streams() {
        let _ = io::stdout().flush();
        let _ = io::stderr().flush();
    }

    fn duplicate(fd: RawFd) -> PipelineResult<RawFd> {
        let copy = unsafe { libc::dup(fd) };
        if copy < 0 {
            return Err(redirect_error("dup", io::Error::last_os_error()));
        }
        Ok(copy)
    }

    fn redirect(from: RawFd, to: RawFd) -> PipelineResult<()> {
        if unsafe { libc::dup2(from, to) } < 0 {
            return Err(redirect_error("dup2", io::Error::last_os_error()));
        }
        Ok(())
    }

    fn close(fd: RawFd) {
        unsafe {
            libc::close(fd);
        }
    }

    fn redirect_error(step: &str, source: io::Error) -> PipelineError {
        PipelineError::io_system(
            "IO.OUTPUT_REDIRECT",
            format!("failed to silence estimator output ({}): {}", step, source),
        )
    }
}

#[cfg(not(unix))]
mod fallback {
    use super::PipelineResult;

    /// No descriptor redirection on this platform.
    #[derive(Debug)]
    pub struct OutputSilencer;

    impl OutputSilencer {
        pub fn engage() -> PipelineResult<Self> {
            Ok(Self)
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::{OutputSilencer, descriptor_test_lock, silenced};
    use crate::domain::PipelineError;
    use std::os::fd::AsRawFd;

    fn identity(fd: i32) -> (u64, u64) {
        let mut stat: libc::stat = unsafe { std::mem::zeroed() };
        let status = unsafe { libc::fstat(fd, &mut stat) };
        assert_eq!(status, 0, "fstat should succeed");
        (stat.st_dev as u64, stat.st_ino as u64)
    }

    fn devnull_identity() -> (u64, u64) {
        let devnull = std::fs::File::open("/dev/null").expect("/dev/null should open");
        identity(devnull.as_raw_fd())
    }

    #[test]
    fn descriptors_point_at_devnull_while_engaged() {
        let _serial = descriptor_test_lock();
        let before = identity(libc::STDOUT_FILENO);
        {
            let _guard = OutputSilencer::engage().expect("silencer should engage");
            assert_eq!(identity(libc::STDOUT_FILENO), devnull_identity());
            assert_eq!(identity(libc::STDERR_FILENO), devnull_identity());
        }
        assert_eq!(identity(libc::STDOUT_FILENO), before);
    }

    #[test]
    fn descriptors_are_restored_after_an_error() {
        let _serial = descriptor_test_lock();
        let stdout_before = identity(libc::STDOUT_FILENO);
        let stderr_before = identity(libc::STDERR_FILENO);

        let result: Result<(), PipelineError> = silenced(|| {
            println!("swallowed");
            Err(PipelineError::computation("RUN.TEST", "estimator failed"))
        });

        assert!(result.is_err());
        assert_eq!(identity(libc::STDOUT_FILENO), stdout_before);
        assert_eq!(identity(libc::STDERR_FILENO), stderr_before);
    }

    #[test]
    fn descriptors_are_restored_after_a_panic() {
        let _serial = descriptor_test_lock();
        let before = identity(libc::STDERR_FILENO);
        let outcome = std::panic::catch_unwind(|| {
            let _ = silenced::<()>(|| panic!("estimator aborted"));
        });
        assert!(outcome.is_err());
        assert_eq!(identity(libc::STDERR_FILENO), before);
    }
}
