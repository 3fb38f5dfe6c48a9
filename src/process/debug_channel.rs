//! Capture of `OutputDebugString` messages on Windows.
//!
//! Debuggers receive these messages through a well-known shared memory
//! section (`DBWIN_BUFFER`) guarded by two named events. A listener signals
//! `DBWIN_BUFFER_READY`, waits for `DBWIN_DATA_READY`, reads the writer's
//! process id from the first four bytes of the section and the
//! NUL-terminated message from the rest.
//!
//! The listener is started before the child is spawned, so messages the
//! child writes while starting up are not missed. Until
//! [`DebugListener::attach`] names the child, every message is kept along
//! with its writer's process id; afterwards only the child's messages are.
//! Dropping the listener after the child has exited stops its thread and
//! releases every handle, including during unwinding. On other platforms
//! [`DebugChannel::open`] returns `None`.

use super::Encoding;
use std::sync::atomic::{AtomicU32, Ordering};

#[cfg(windows)]
pub use windows_impl::{DebugChannel, DebugListener};

#[cfg(not(windows))]
pub use fallback::{DebugChannel, DebugListener};

/// A debug message and the process id of its writer.
pub type DebugMessage = (u32, Vec<u8>);

/// Process whose messages are kept; 0 while the child is not spawned yet.
#[derive(Debug, Default)]
pub struct PidFilter(AtomicU32);

impl PidFilter {
    pub fn attach(&self, pid: u32) {
        self.0.store(pid, Ordering::Release);
    }

    pub fn accepts(&self, writer: u32) -> bool {
        let target = self.0.load(Ordering::Acquire);
        target == 0 || target == writer
    }
}

/// Splits a raw debug message into trimmed, non-empty lines.
pub fn message_lines(message: &[u8], encoding: Encoding) -> Vec<String> {
    encoding
        .decode(message)
        .lines()
        .map(|line| line.trim_end_matches('\r').to_string())
        .filter(|line| !line.is_empty())
        .collect()
}

#[cfg(not(windows))]
mod fallback {
    use super::DebugMessage;
    use std::sync::mpsc::{channel, Receiver};

    /// Placeholder; the debug channel only exists on Windows.
    #[derive(Debug)]
    pub struct DebugChannel {
        _private: (),
    }

    impl DebugChannel {
        pub fn open() -> Option<Self> {
            None
        }

        pub fn listen(self) -> (DebugListener, Receiver<DebugMessage>) {
            let (_sender, receiver) = channel();
            (DebugListener { _private: () }, receiver)
        }
    }

    #[derive(Debug)]
    pub struct DebugListener {
        _private: (),
    }

    impl DebugListener {
        pub fn attach(&self, _pid: u32) {}
    }
}

#[cfg(windows)]
mod windows_impl {
    use super::{DebugMessage, PidFilter};
    use std::sync::mpsc::{channel, Receiver, Sender};
    use std::sync::Arc;
    use std::thread::JoinHandle;
    use std::time::Duration;
    use windows_sys::Win32::Foundation::{CloseHandle, HANDLE, INVALID_HANDLE_VALUE, WAIT_OBJECT_0};
    use windows_sys::Win32::System::Diagnostics::Debug::{
        SetErrorMode, SEM_FAILCRITICALERRORS, SEM_NOGPFAULTERRORBOX, SEM_NOOPENFILEERRORBOX,
    };
    use windows_sys::Win32::System::Memory::{
        CreateFileMappingW, MapViewOfFile, UnmapViewOfFile, FILE_MAP_READ,
        MEMORY_MAPPED_VIEW_ADDRESS, PAGE_READWRITE,
    };
    use windows_sys::Win32::System::Threading::{
        CreateEventW, SetEvent, WaitForMultipleObjects, INFINITE,
    };

    const BUFFER_SIZE: usize = 4096;
    const PID_LENGTH: usize = 4;

    fn wide(name: &str) -> Vec<u16> {
        name.encode_utf16().chain(std::iter::once(0)).collect()
    }

    /// Handles to the system-wide debug buffer.
    #[derive(Debug)]
    pub struct DebugChannel {
        buffer_ready: HANDLE,
        data_ready: HANDLE,
        stop: HANDLE,
        mapping: HANDLE,
        view: usize,
    }

    impl DebugChannel {
        /// Opens the debug buffer, or `None` if another debugger holds it or
        /// any kernel object cannot be created.
        pub fn open() -> Option<Self> {
            let buffer_name = wide("DBWIN_BUFFER");
            let buffer_ready_name = wide("DBWIN_BUFFER_READY");
            let data_ready_name = wide("DBWIN_DATA_READY");

            // SAFETY: plain Win32 calls with valid NUL-terminated names; every
            // handle is checked and owned by the returned value.
            unsafe {
                SetErrorMode(SEM_FAILCRITICALERRORS | SEM_NOGPFAULTERRORBOX | SEM_NOOPENFILEERRORBOX);

                let mut channel = DebugChannel {
                    buffer_ready: CreateEventW(std::ptr::null(), 0, 0, buffer_ready_name.as_ptr()),
                    data_ready: CreateEventW(std::ptr::null(), 0, 0, data_ready_name.as_ptr()),
                    stop: CreateEventW(std::ptr::null(), 0, 0, std::ptr::null()),
                    mapping: 0,
                    view: 0,
                };
                if channel.buffer_ready == 0 || channel.data_ready == 0 || channel.stop == 0 {
                    log::debug!("Cannot create debug channel events");
                    return None;
                }

                channel.mapping = CreateFileMappingW(
                    INVALID_HANDLE_VALUE,
                    std::ptr::null(),
                    PAGE_READWRITE,
                    0,
                    BUFFER_SIZE as u32,
                    buffer_name.as_ptr(),
                );
                if channel.mapping == 0 {
                    log::debug!("Cannot map the debug buffer");
                    return None;
                }

                let view = MapViewOfFile(channel.mapping, FILE_MAP_READ, 0, 0, BUFFER_SIZE);
                if view.Value.is_null() {
                    log::debug!("Cannot map a view of the debug buffer");
                    return None;
                }
                channel.view = view.Value as usize;
                Some(channel)
            }
        }

        /// Starts reading the buffer; call before spawning the child.
        pub fn listen(self) -> (DebugListener, Receiver<DebugMessage>) {
            let (sender, receiver) = channel();
            let handles = (self.buffer_ready, self.data_ready, self.stop, self.view);
            let filter = Arc::new(PidFilter::default());
            let thread_filter = filter.clone();
            let thread = std::thread::spawn(move || {
                let (buffer_ready, data_ready, stop, view) = handles;
                run_listener(buffer_ready, data_ready, stop, view, &thread_filter, sender)
            });
            (
                DebugListener {
                    channel: self,
                    filter,
                    thread: Some(thread),
                },
                receiver,
            )
        }
    }

    fn run_listener(
        buffer_ready: HANDLE,
        data_ready: HANDLE,
        stop: HANDLE,
        view: usize,
        filter: &PidFilter,
        sender: Sender<DebugMessage>,
    ) {
        let events = [data_ready, stop];
        // SAFETY: the view stays mapped until the owning DebugListener has
        // joined this thread.
        unsafe {
            SetEvent(buffer_ready);
            loop {
                let result = WaitForMultipleObjects(2, events.as_ptr(), 0, INFINITE);
                if result == WAIT_OBJECT_0 {
                    let base = view as *const u8;
                    let header = std::slice::from_raw_parts(base, PID_LENGTH);
                    let writer = u32::from_ne_bytes([header[0], header[1], header[2], header[3]]);
                    let data = std::slice::from_raw_parts(base.add(PID_LENGTH), BUFFER_SIZE - PID_LENGTH);
                    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
                    let message = data[..end].to_vec();
                    SetEvent(buffer_ready);

                    if filter.accepts(writer) && sender.send((writer, message)).is_err() {
                        break;
                    }
                } else if result == WAIT_OBJECT_0 + 1 {
                    break;
                } else {
                    std::thread::sleep(Duration::from_millis(100));
                }
            }
        }
    }

    impl Drop for DebugChannel {
        fn drop(&mut self) {
            // SAFETY: each handle is either 0 or owned by this value.
            unsafe {
                if self.view != 0 {
                    UnmapViewOfFile(MEMORY_MAPPED_VIEW_ADDRESS {
                        Value: self.view as *mut core::ffi::c_void,
                    });
                }
                for handle in [self.mapping, self.stop, self.data_ready, self.buffer_ready] {
                    if handle != 0 {
                        CloseHandle(handle);
                    }
                }
            }
        }
    }

    /// Running listener; stops and releases the channel on drop.
    #[derive(Debug)]
    pub struct DebugListener {
        channel: DebugChannel,
        filter: Arc<PidFilter>,
        thread: Option<JoinHandle<()>>,
    }

    impl DebugListener {
        /// Keeps only the messages of process `pid` from now on.
        pub fn attach(&self, pid: u32) {
            log::debug!("Attached debug channel to process {}", pid);
            self.filter.attach(pid);
        }
    }

    impl Drop for DebugListener {
        fn drop(&mut self) {
            // SAFETY: the stop event is owned by the channel, still open here.
            unsafe {
                SetEvent(self.channel.stop);
            }
            if let Some(thread) = self.thread.take() {
                let _ = thread.join();
            }
        }
    }
}
