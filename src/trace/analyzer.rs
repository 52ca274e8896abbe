//! Passive trace analyzer
//!
//! Reconstructs adapter frames from two parallel byte channels captured off
//! the serial line. Both channels are indexed by the same clock: byte `i` of
//! the console channel was shifted out while byte `i` of the adapter channel
//! was shifted in.

use std::fmt;

use crate::protocol::{
    ack_for, describe_command, try_parse, DeviceLatch, Finding, Frame, ParseOutcome, Side,
    MAGIC_BYTES, SEND_ACK_OK,
};

/// Which channel carries the frame found at an index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    SenderIsConsole,
    SenderIsAdapter,
}

impl Alignment {
    pub fn sender(self) -> Side {
        match self {
            Alignment::SenderIsConsole => Side::Console,
            Alignment::SenderIsAdapter => Side::Adapter,
        }
    }

    pub fn receiver(self) -> Side {
        self.sender().other()
    }

    fn from_sender(side: Side) -> Self {
        match side {
            Side::Console => Alignment::SenderIsConsole,
            Side::Adapter => Alignment::SenderIsAdapter,
        }
    }

    /// Check both channels for the magic marker at `index`
    ///
    /// When both carry it, `initiator` is taken as the sender.
    pub fn detect(console: &[u8], adapter: &[u8], index: usize, initiator: Side) -> Option<Self> {
        let marked = |channel: &[u8]| {
            channel
                .get(index..)
                .map_or(false, |rest| rest.starts_with(&MAGIC_BYTES))
        };
        match (marked(console), marked(adapter)) {
            (true, true) => Some(Self::from_sender(initiator)),
            (true, false) => Some(Alignment::SenderIsConsole),
            (false, true) => Some(Alignment::SenderIsAdapter),
            (false, false) => None,
        }
    }
}

/// One frame recovered from a capture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceRecord {
    /// Index of the magic marker in both channels
    pub offset: usize,
    pub alignment: Alignment,
    pub frame: Frame,
    /// Device byte the receiver answered with
    pub receiver_device: u8,
    /// Acknowledgement the receiver answered with
    pub receiver_ack: u8,
    pub findings: Vec<Finding>,
}

impl TraceRecord {
    pub fn sender(&self) -> Side {
        self.alignment.sender()
    }

    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }
}

impl fmt::Display for TraceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let arrow = match self.alignment {
            Alignment::SenderIsConsole => ">>>",
            Alignment::SenderIsAdapter => "<<<",
        };
        write!(
            f,
            "{} {} ({:02X}), {} byte(s)",
            arrow,
            describe_command(self.frame.command),
            self.frame.command,
            self.frame.payload.len()
        )
    }
}

/// Lock-step scanner over a pair of capture channels
///
/// Yields one [`TraceRecord`] per frame. Findings that concern the capture as
/// a whole are collected separately and are available once the scan ends.
pub struct TraceAnalyzer<'a> {
    console: &'a [u8],
    adapter: &'a [u8],
    initiator: Side,
    index: usize,
    done: bool,
    console_device: DeviceLatch,
    adapter_device: DeviceLatch,
    findings: Vec<Finding>,
}

impl<'a> TraceAnalyzer<'a> {
    pub fn new(console: &'a [u8], adapter: &'a [u8]) -> Self {
        let mut findings = Vec::new();
        let len = console.len().min(adapter.len());
        if console.len() != adapter.len() {
            tracing::warn!(
                "Capture channels differ in length ({} vs {}), scanning {} byte(s)",
                console.len(),
                adapter.len(),
                len
            );
            findings.push(Finding::ChannelLengthMismatch {
                console: console.len(),
                adapter: adapter.len(),
            });
        }

        Self {
            console: &console[..len],
            adapter: &adapter[..len],
            initiator: Side::Console,
            index: 0,
            done: false,
            console_device: DeviceLatch::new(Side::Console),
            adapter_device: DeviceLatch::new(Side::Adapter),
            findings,
        }
    }

    /// Side treated as the sender when both channels carry the marker
    pub fn with_initiator(mut self, initiator: Side) -> Self {
        self.initiator = initiator;
        self
    }

    /// Capture-level findings gathered so far
    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    pub fn console_device(&self) -> Option<u8> {
        self.console_device.learned()
    }

    pub fn adapter_device(&self) -> Option<u8> {
        self.adapter_device.learned()
    }

    fn channel(&self, side: Side) -> &'a [u8] {
        match side {
            Side::Console => self.console,
            Side::Adapter => self.adapter,
        }
    }

    /// Run the scan to completion
    pub fn analyze(mut self) -> TraceReport {
        let records: Vec<TraceRecord> = self.by_ref().collect();
        TraceReport {
            records,
            findings: self.findings,
            console_device: self.console_device.learned(),
            adapter_device: self.adapter_device.learned(),
        }
    }
}

impl Iterator for TraceAnalyzer<'_> {
    type Item = TraceRecord;

    fn next(&mut self) -> Option<TraceRecord> {
        if self.done {
            return None;
        }

        while self.index < self.console.len() {
            let offset = self.index;
            let alignment =
                match Alignment::detect(self.console, self.adapter, offset, self.initiator) {
                    Some(alignment) => alignment,
                    None => {
                        self.index += 1;
                        continue;
                    }
                };

            let sender = self.channel(alignment.sender());
            let receiver = self.channel(alignment.receiver());
            let parsed = match try_parse(sender, offset) {
                ParseOutcome::Parsed(parsed) => parsed,
                ParseOutcome::Incomplete { missing } => {
                    tracing::warn!(
                        "Capture ends inside a frame at offset {} ({} byte(s) missing)",
                        offset,
                        missing
                    );
                    self.findings.push(Finding::Incomplete { offset, missing });
                    break;
                }
                // Only reachable if detection and parsing disagree on the marker
                ParseOutcome::NoMatch => {
                    self.index += 1;
                    continue;
                }
            };

            let end = offset + parsed.consumed;
            let receiver_device = receiver[end - 2];
            let receiver_ack = receiver[end - 1];
            let frame = parsed.frame;
            let mut findings = parsed.findings;

            let (console_device, adapter_device) = match alignment {
                Alignment::SenderIsConsole => (frame.device, receiver_device),
                Alignment::SenderIsAdapter => (receiver_device, frame.device),
            };
            findings.extend(self.console_device.observe(console_device));
            findings.extend(self.adapter_device.observe(adapter_device));

            if frame.ack != SEND_ACK_OK {
                findings.push(Finding::SendAckFailure { ack: frame.ack });
            }
            let expected = ack_for(frame.command);
            if receiver_ack != expected {
                findings.push(Finding::RecvAckFailure {
                    expected,
                    actual: receiver_ack,
                });
            }

            let record = TraceRecord {
                offset,
                alignment,
                frame,
                receiver_device,
                receiver_ack,
                findings,
            };
            tracing::debug!("{} at offset {}", record, offset);
            for finding in &record.findings {
                tracing::warn!("Frame at offset {}: {}", offset, finding);
            }

            self.index = end;
            return Some(record);
        }

        self.done = true;
        None
    }
}

/// Everything recovered from a capture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceReport {
    pub records: Vec<TraceRecord>,
    /// Findings about the capture as a whole
    pub findings: Vec<Finding>,
    pub console_device: Option<u8>,
    pub adapter_device: Option<u8>,
}

impl TraceReport {
    /// True when neither the capture nor any frame produced a finding
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty() && self.records.iter().all(TraceRecord::is_clean)
    }

    /// Every finding, frame-level ones first in scan order
    pub fn all_findings(&self) -> impl Iterator<Item = &Finding> {
        self.records
            .iter()
            .flat_map(|record| record.findings.iter())
            .chain(self.findings.iter())
    }
}

/// Analyze a capture with the console as initiator
pub fn analyze(console: &[u8], adapter: &[u8]) -> TraceReport {
    TraceAnalyzer::new(console, adapter).analyze()
}
