use std::io;

/// Which side of the fork this process is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fork {
    Parent(libc::pid_t),
    Child,
}

/// Fork once so the child keeps running in the background.
///
/// Must be called before any other thread exists (in particular before the
/// interrupt handler thread is spawned): only the calling thread survives
/// in the child.
pub fn daemonize() -> io::Result<Fork> {
    // SAFETY: called from the single-threaded start of main; the child only
    // continues running ordinary Rust code.
    let pid = unsafe { libc::fork() };
    match pid {
        -1 => Err(io::Error::last_os_error()),
        0 => Ok(Fork::Child),
        pid => Ok(Fork::Parent(pid)),
    }
}
