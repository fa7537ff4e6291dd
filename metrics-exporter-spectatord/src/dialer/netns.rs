//! Scoped network namespace membership for the current thread.

#[cfg(target_os = "linux")]
mod imp {
    use std::{fs::File, io, os::fd::AsRawFd as _, path::Path};

    use tracing::error;

    use crate::Error;

    const CURRENT_THREAD_NAMESPACE: &str = "/proc/thread-self/ns/net";

    /// Holds the current thread inside another network namespace until restored or dropped.
    ///
    /// The guard must be restored on the same thread that created it.
    pub(crate) struct NamespaceGuard {
        original: Option<File>,
    }

    impl NamespaceGuard {
        /// Saves the current thread's namespace and switches the thread into the namespace at `path`.
        pub fn enter(path: &Path) -> Result<Self, Error> {
            let original = File::open(CURRENT_THREAD_NAMESPACE)
                .map_err(|source| Error::NamespaceSwitch { action: "save", source })?;
            let target = File::open(path).map_err(|source| Error::NamespaceSwitch { action: "open", source })?;

            set_namespace(&target).map_err(|source| Error::NamespaceSwitch { action: "enter", source })?;

            Ok(Self { original: Some(original) })
        }

        /// Switches the thread back into the namespace it was in when the guard was created.
        pub fn restore(mut self) -> Result<(), Error> {
            self.restore_inner()
        }

        fn restore_inner(&mut self) -> Result<(), Error> {
            match self.original.take() {
                Some(original) => {
                    set_namespace(&original).map_err(|source| Error::NamespaceSwitch { action: "restore", source })
                }
                None => Ok(()),
            }
        }
    }

    impl Drop for NamespaceGuard {
        fn drop(&mut self) {
            if let Err(e) = self.restore_inner() {
                error!(error = %e, "Failed to restore network namespace.");
            }
        }
    }

    fn set_namespace(file: &File) -> io::Result<()> {
        // SAFETY: `file` is an open handle for the lifetime of the call, and `setns` does not retain it.
        let rc = unsafe { libc::setns(file.as_raw_fd(), libc::CLONE_NEWNET) };
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }
}

#[cfg(not(target_os = "linux"))]
mod imp {
    use std::path::Path;

    use crate::Error;

    pub(crate) struct NamespaceGuard;

    impl NamespaceGuard {
        pub fn enter(_path: &Path) -> Result<Self, Error> {
            Err(Error::Unsupported)
        }

        pub fn restore(self) -> Result<(), Error> {
            Ok(())
        }
    }
}

pub(crate) use self::imp::NamespaceGuard;
