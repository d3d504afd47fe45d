//! Thin `perf_event_open(2)` wrapper.
//!
//! Lifted from the `perf_event_open`/`ioctl` pair this crate's lineage
//! wraps directly (`syscall(SYS_perf_event_open, ...)` plus raw `ioctl`),
//! trimmed to the subset both PMC backends need: open one counter, reset
//! it, enable/disable it, and read its accumulated count. No ring-buffer
//! sampling — this engine only ever reads cumulative counts.

use bitflags::bitflags;
use libc::{c_int, c_ulong, pid_t};
use std::io;
use std::mem;
use std::os::unix::io::RawFd;

bitflags! {
    /// Subset of `perf_event_attr`'s bitfield flags this crate uses.
    pub struct AttrFlags: u64 {
        /// Counter starts disabled; must be `PERF_EVENT_IOC_ENABLE`d.
        const DISABLED = 1 << 0;
        /// Don't count events in kernel mode.
        const EXCLUDE_KERNEL = 1 << 5;
        /// Don't count events in hypervisor mode.
        const EXCLUDE_HV = 1 << 6;
    }
}

const PERF_TYPE_HARDWARE: u32 = 0;
const PERF_TYPE_RAW: u32 = 4;

const IOC_MAGIC: u8 = b'$';

fn ioc_no(nr: u8) -> c_ulong {
    // `_IO(PERF_EVENT_IOC_MAGIC, nr)` per linux/perf_event.h.
    ((IOC_MAGIC as c_ulong) << 8) | nr as c_ulong
}

/// Mirrors the kernel's `struct perf_event_attr`, restricted to the fields
/// this crate programs. `size` must be set to `sizeof::<EventAttr>()` so
/// the kernel knows which ABI revision it's looking at.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct EventAttr {
    pub attr_type: u32,
    pub size: u32,
    pub config: u64,
    pub sample_period_or_freq: u64,
    pub sample_type: u64,
    pub read_format: u64,
    pub flags: u64,
    pub wakeup_events_or_watermark: u32,
    pub bp_type: u32,
    pub config1_or_bp_addr: u64,
    pub config2_or_bp_len: u64,
    pub branch_sample_type: u64,
    pub sample_regs_user: u64,
    pub sample_stack_user: u32,
    pub clockid: i32,
    pub sample_regs_intr: u64,
    pub aux_watermark: u32,
    pub sample_max_stack: u16,
    pub __reserved_2: u16,
}

impl Default for EventAttr {
    fn default() -> Self {
        // SAFETY: an all-zero `perf_event_attr` is a valid (if inert) value
        // per the kernel ABI; every field here is a plain integer.
        unsafe { mem::zeroed() }
    }
}

fn new_attr(attr_type: u32, config: u64) -> EventAttr {
    EventAttr {
        attr_type,
        size: mem::size_of::<EventAttr>() as u32,
        config,
        flags: (AttrFlags::DISABLED | AttrFlags::EXCLUDE_KERNEL | AttrFlags::EXCLUDE_HV).bits(),
        ..Default::default()
    }
}

/// Opens a raw-encoded event (the "direct" backend's model-specific
/// register programming, relayed through the kernel's raw PMU type).
pub fn open_raw(encoded_config: u64) -> io::Result<RawFd> {
    open(new_attr(PERF_TYPE_RAW, encoded_config))
}

/// Opens a generic hardware event by the kernel's own enumeration (the
/// "library" backend's portable event set).
pub fn open_hardware(generic_config: u64) -> io::Result<RawFd> {
    open(new_attr(PERF_TYPE_HARDWARE, generic_config))
}

fn open(attr: EventAttr) -> io::Result<RawFd> {
    let pid: pid_t = 0; // calling thread
    let cpu: c_int = -1;
    let group_fd: c_int = -1;
    let flags: c_ulong = 0;

    // SAFETY: `attr` is a fully-initialized, correctly-sized ABI struct;
    // the syscall only reads from it.
    let fd = unsafe {
        libc::syscall(
            libc::SYS_perf_event_open,
            &attr as *const EventAttr,
            pid,
            cpu,
            group_fd,
            flags,
        )
    };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(fd as RawFd)
}

/// `PERF_EVENT_IOC_RESET`: zero the counter.
pub fn reset(fd: RawFd) -> io::Result<()> {
    ioctl(fd, ioc_no(3))
}

/// `PERF_EVENT_IOC_ENABLE`.
pub fn enable(fd: RawFd) -> io::Result<()> {
    ioctl(fd, ioc_no(0))
}

/// `PERF_EVENT_IOC_DISABLE`.
pub fn disable(fd: RawFd) -> io::Result<()> {
    ioctl(fd, ioc_no(1))
}

fn ioctl(fd: RawFd, request: c_ulong) -> io::Result<()> {
    // SAFETY: `fd` is a counter we opened; `request` is one of the three
    // no-argument PERF_EVENT_IOC_* requests above.
    let ret = unsafe { libc::ioctl(fd, request, 0) };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Reads the counter's current cumulative count.
pub fn read_count(fd: RawFd) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    // SAFETY: `buf` is sized for exactly one `u64` as the kernel's simple
    // (non-grouped, no read_format extras) counter read format specifies.
    let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut _, buf.len()) };
    if n < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(u64::from_ne_bytes(buf))
}

pub fn close(fd: RawFd) {
    // SAFETY: `fd` is owned by the caller and not used again after this.
    unsafe {
        libc::close(fd);
    }
}
