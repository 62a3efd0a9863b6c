//! Shared fixtures for unit tests.

use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::error::{Result, RtspError};
use crate::transport::{ConnectionWriter, ReceivedPacket, RtpTransport, TransportKind};

/// In-memory connection writer whose bytes can be inspected.
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn writer(&self) -> ConnectionWriter {
        Arc::new(Mutex::new(Box::new(self.clone())))
    }

    pub fn contents(&self) -> Vec<u8> {
        self.0.lock().clone()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Transport that records every packet it is asked to send.
pub struct RecordingTransport {
    kind: TransportKind,
    data: Mutex<Vec<Vec<u8>>>,
    control: Mutex<Vec<Vec<u8>>>,
    inbound: Mutex<Vec<ReceivedPacket>>,
    data_budget: AtomicUsize,
    fail_control: AtomicBool,
    started: AtomicBool,
    stopped: AtomicBool,
}

impl RecordingTransport {
    fn new(kind: TransportKind) -> Arc<Self> {
        Arc::new(Self {
            kind,
            data: Mutex::new(Vec::new()),
            control: Mutex::new(Vec::new()),
            inbound: Mutex::new(Vec::new()),
            data_budget: AtomicUsize::new(usize::MAX),
            fail_control: AtomicBool::new(false),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        })
    }

    pub fn udp() -> Arc<Self> {
        Self::new(TransportKind::Udp)
    }

    pub fn interleaved() -> Arc<Self> {
        Self::new(TransportKind::Interleaved)
    }

    /// Accept `n` more data packets, then fail every write.
    pub fn fail_data_after(&self, n: usize) {
        self.data_budget.store(n, Ordering::SeqCst);
    }

    pub fn fail_control(&self, fail: bool) {
        self.fail_control.store(fail, Ordering::SeqCst);
    }

    pub fn push_inbound(&self, packet: ReceivedPacket) {
        self.inbound.lock().push(packet);
    }

    pub fn data(&self) -> Vec<Vec<u8>> {
        self.data.lock().clone()
    }

    pub fn control(&self) -> Vec<Vec<u8>> {
        self.control.lock().clone()
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl RtpTransport for RecordingTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(RtspError::TransportAlreadyStarted);
        }
        Ok(())
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    fn write_data(&self, packet: &[u8]) -> Result<()> {
        let budget = self.data_budget.load(Ordering::SeqCst);
        if budget == 0 {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "recording transport closed").into());
        }
        self.data_budget.store(budget.saturating_sub(1), Ordering::SeqCst);
        self.data.lock().push(packet.to_vec());
        Ok(())
    }

    fn write_control(&self, packet: &[u8]) -> Result<()> {
        if self.fail_control.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "recording transport closed").into());
        }
        self.control.lock().push(packet.to_vec());
        Ok(())
    }

    fn try_recv(&self) -> Option<ReceivedPacket> {
        let mut inbound = self.inbound.lock();
        if inbound.is_empty() {
            None
        } else {
            Some(inbound.remove(0))
        }
    }
}

/// Baseline JPEG: SOI, APP0, `tables` quantization tables (the first two
/// share one DQT segment), SOF0 640x480, SOS, `scan_len` bytes of 0xAB, EOI.
pub fn jpeg_frame(scan_len: usize, tables: usize) -> Vec<u8> {
    let mut out = vec![0xFF, 0xD8];

    out.extend_from_slice(&[0xFF, 0xE0, 0x00, 0x10]);
    out.extend_from_slice(b"JFIF\0");
    out.extend_from_slice(&[1, 1, 0, 0, 1, 0, 1, 0, 0]);

    let table = |index: usize| {
        let mut t = vec![index as u8];
        t.extend(std::iter::repeat_n(index as u8 + 1, 64));
        t
    };
    let mut first = Vec::new();
    for i in 0..tables.min(2) {
        first.extend(table(i));
    }
    if !first.is_empty() {
        out.extend_from_slice(&[0xFF, 0xDB]);
        out.extend_from_slice(&((first.len() + 2) as u16).to_be_bytes());
        out.extend(first);
    }
    for i in 2..tables {
        let t = table(i);
        out.extend_from_slice(&[0xFF, 0xDB]);
        out.extend_from_slice(&((t.len() + 2) as u16).to_be_bytes());
        out.extend(t);
    }

    out.extend_from_slice(&[0xFF, 0xC0, 0x00, 0x11, 0x08]);
    out.extend_from_slice(&480u16.to_be_bytes());
    out.extend_from_slice(&640u16.to_be_bytes());
    out.extend_from_slice(&[3, 1, 0x22, 0, 2, 0x11, 1, 3, 0x11, 1]);

    out.extend_from_slice(&[0xFF, 0xDA, 0x00, 0x0C, 3, 1, 0x00, 2, 0x11, 3, 0x11, 0, 63, 0]);

    out.extend(std::iter::repeat_n(0xAB, scan_len));
    out.extend_from_slice(&[0xFF, 0xD9]);
    out
}
