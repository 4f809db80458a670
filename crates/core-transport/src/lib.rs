//! Narrow transport layer around the kernel driver: a shared-memory ring of
//! page-aligned frame buffers, a blocking doorbell for buffer readiness, the
//! HID report sink, and startup signal handling. None of this reproduces the
//! driver's actual on-wire struct layout (that is the driver's to define);
//! it only carries the fields the core needs, one buffer per `recv_buffer`
//! call.

mod signals;

pub use signals::SignalFlags;

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;

use core_protocol::{IptsHidReport, StylusReport, TouchReport, MAX_CONTACTS};
use thiserror::Error;

/// Number of page-aligned buffers in the driver's ring (`IPTS_BUFFER_NUM`).
pub const IPTS_BUFFER_NUM: usize = 16;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to open driver channel: {0}")]
    Open(#[source] std::io::Error),
    #[error("failed to map driver buffer ring: {0}")]
    Mmap(#[source] std::io::Error),
    #[error("doorbell read failed: {0}")]
    Doorbell(#[source] std::io::Error),
    #[error("buffer index {index} out of range (ring holds {count})")]
    BufferIndexOutOfRange { index: usize, count: usize },
    #[error("failed to write HID report: {0}")]
    Send(#[source] std::io::Error),
    #[error("failed to install signal handler: {0}")]
    Signal(#[source] std::io::Error),
}

/// One blocking call per frame on each side: a buffer to parse, a report to
/// send. All failures here are transport-fatal (spec §7) — callers
/// terminate the process rather than retry.
pub trait DriverChannel {
    fn recv_buffer(&mut self) -> Result<&[u8], TransportError>;
    fn send_hid_report(&mut self, report: &IptsHidReport) -> Result<(), TransportError>;
}

/// Shared-memory ring consumer. Maps `IPTS_BUFFER_NUM` page-aligned buffers
/// read-only from `data_path`; `recv_buffer` blocks on a 4-byte doorbell read
/// from `doorbell_path` that names the ready buffer's index. HID reports are
/// written whole to `hid_path`.
pub struct MmapChannel {
    ring: memmap2::Mmap,
    buffer_size: usize,
    doorbell: File,
    hid_sink: File,
}

impl MmapChannel {
    pub fn open(
        data_path: &Path,
        doorbell_path: &Path,
        hid_path: &Path,
        buffer_size: usize,
    ) -> Result<Self, TransportError> {
        let data_file = OpenOptions::new()
            .read(true)
            .open(data_path)
            .map_err(TransportError::Open)?;
        let ring = unsafe { memmap2::Mmap::map(&data_file) }.map_err(TransportError::Mmap)?;
        let doorbell = OpenOptions::new()
            .read(true)
            .open(doorbell_path)
            .map_err(TransportError::Open)?;
        let hid_sink = OpenOptions::new()
            .write(true)
            .open(hid_path)
            .map_err(TransportError::Open)?;
        Ok(Self {
            ring,
            buffer_size,
            doorbell,
            hid_sink,
        })
    }
}

impl DriverChannel for MmapChannel {
    fn recv_buffer(&mut self) -> Result<&[u8], TransportError> {
        let mut index_bytes = [0u8; 4];
        self.doorbell
            .read_exact(&mut index_bytes)
            .map_err(TransportError::Doorbell)?;
        let index = u32::from_le_bytes(index_bytes) as usize;
        let count = self.ring.len() / self.buffer_size;
        if index >= count {
            return Err(TransportError::BufferIndexOutOfRange { index, count });
        }
        let start = index * self.buffer_size;
        Ok(&self.ring[start..start + self.buffer_size])
    }

    fn send_hid_report(&mut self, report: &IptsHidReport) -> Result<(), TransportError> {
        let encoded = encode_hid_report(report);
        self.hid_sink.write_all(&encoded).map_err(TransportError::Send)
    }
}

/// Fixed little-endian encoding sufficient for our own sink; the real union
/// layout the driver expects is out of scope (spec §1) and owned by it.
fn encode_hid_report(report: &IptsHidReport) -> Vec<u8> {
    match report {
        IptsHidReport::Touch(touch) => encode_touch_report(touch),
        IptsHidReport::Stylus(stylus) => encode_stylus_report(stylus),
    }
}

fn encode_touch_report(report: &TouchReport) -> Vec<u8> {
    let mut buf = Vec::with_capacity(1 + 1 + MAX_CONTACTS * 6);
    buf.push(0); // report kind: touch
    buf.push(report.contact_num);
    for contact in report.contacts.iter().take(report.contact_num as usize) {
        buf.push(contact.touch as u8);
        buf.push(contact.contact_id);
        buf.extend_from_slice(&contact.x.to_le_bytes());
        buf.extend_from_slice(&contact.y.to_le_bytes());
    }
    buf
}

fn encode_stylus_report(report: &StylusReport) -> Vec<u8> {
    let mut buf = Vec::with_capacity(16);
    buf.push(1); // report kind: stylus
    let flags = report.in_range as u8
        | (report.touch as u8) << 1
        | (report.side_button as u8) << 2
        | (report.eraser as u8) << 3;
    buf.push(flags);
    buf.extend_from_slice(&report.x.to_le_bytes());
    buf.extend_from_slice(&report.y.to_le_bytes());
    buf.extend_from_slice(&report.tip_pressure.to_le_bytes());
    buf.extend_from_slice(&report.x_tilt.to_le_bytes());
    buf.extend_from_slice(&report.y_tilt.to_le_bytes());
    buf.extend_from_slice(&report.scan_time.to_le_bytes());
    buf
}

/// In-memory channel feeding pre-recorded buffers, for integration tests.
/// Not a mock of any business logic — only of the byte source.
#[derive(Default)]
pub struct ChannelStub {
    buffers: Vec<Vec<u8>>,
    cursor: usize,
    pub sent: Vec<IptsHidReport>,
}

impl ChannelStub {
    pub fn new(buffers: Vec<Vec<u8>>) -> Self {
        Self {
            buffers,
            cursor: 0,
            sent: Vec::new(),
        }
    }
}

impl DriverChannel for ChannelStub {
    fn recv_buffer(&mut self) -> Result<&[u8], TransportError> {
        if self.cursor >= self.buffers.len() {
            return Err(TransportError::BufferIndexOutOfRange {
                index: self.cursor,
                count: self.buffers.len(),
            });
        }
        let buf = &self.buffers[self.cursor];
        self.cursor += 1;
        Ok(buf)
    }

    fn send_hid_report(&mut self, report: &IptsHidReport) -> Result<(), TransportError> {
        self.sent.push(*report);
        Ok(())
    }
}
