//! End-to-end sessions against a simulated instrument.
//!
//! `SimulatedInstrument` parses the host's byte stream the way the firmware
//! does and answers on its receive queue, so these tests exercise the real
//! framing, transfer and record code together.

use {
    aq3link::{
        AckTimeoutPolicy, BLOCK_SIZE, Block, Error, Instrument, LineTimeouts, ManualClock, Model,
        Port, ProgramStore, TransferOptions, Transport,
        protocol::{ACK, ESC, checksum, verify_checksum},
    },
    std::{
        collections::VecDeque,
        io::{self, Read, Write},
        time::Duration,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Parse {
    Idle,
    Escape,
    Slash,
    Letter(u8),
    Payload,
}

struct SimulatedInstrument {
    store: Vec<Block>,
    rx: VecDeque<u8>,
    state: Parse,
    payload: Vec<u8>,
    upload_cursor: Option<usize>,
    /// Block index whose ACK is never sent.
    drop_ack_for: Option<usize>,
    received: usize,
    ended: bool,
    timeout: Duration,
}

impl SimulatedInstrument {
    fn new(store: Vec<Block>) -> Self {
        Self {
            store,
            rx: VecDeque::new(),
            state: Parse::Idle,
            payload: Vec::new(),
            upload_cursor: None,
            drop_ack_for: None,
            received: 0,
            ended: false,
            timeout: Duration::from_millis(1000),
        }
    }

    fn queue_upload_block(&mut self, index: usize) {
        match self.store.get(index) {
            Some(block) => {
                let block = *block;
                self.rx.extend([ESC, b'/', b'B', b';']);
                self.rx.extend(block);
                self.rx.push_back(checksum(&block));
                self.upload_cursor = Some(index);
            },
            None => {
                self.rx.extend([ESC, b'/', b'Z', b';']);
                self.upload_cursor = None;
            },
        }
    }

    fn command(&mut self, letter: u8) {
        match letter {
            b'C' => self.rx.extend([0x12, 0x10, 0x18]),
            b'D' => {
                self.rx.extend(b"AquaMax DW4 V1.8");
                self.rx.push_back(0);
            },
            b'G' => {
                self.rx.extend(b"000815");
                self.rx.push_back(0);
            },
            b'U' => self.queue_upload_block(0),
            b'R' => {
                self.store.clear();
                self.received = 0;
                self.ended = false;
                self.rx.push_back(ACK);
            },
            b'A' => {
                self.payload.clear();
                self.state = Parse::Payload;
                return;
            },
            b'z' => self.ended = true,
            _ => {},
        }
        self.state = Parse::Idle;
    }

    fn feed(&mut self, byte: u8) {
        self.state = match self.state {
            Parse::Idle if byte == ESC => Parse::Escape,
            Parse::Idle => {
                if byte == ACK {
                    if let Some(index) = self.upload_cursor {
                        self.queue_upload_block(index + 1);
                    }
                }
                Parse::Idle
            },
            Parse::Escape if byte == b'/' => Parse::Slash,
            Parse::Escape => Parse::Idle,
            Parse::Slash => Parse::Letter(byte),
            Parse::Letter(letter) if byte == b';' => {
                self.command(letter);
                return;
            },
            Parse::Letter(_) => Parse::Idle,
            Parse::Payload => {
                self.payload.push(byte);
                if self.payload.len() < BLOCK_SIZE + 1 {
                    return;
                }
                let index = self.received;
                self.received += 1;
                if verify_checksum(&self.payload[..BLOCK_SIZE], self.payload[BLOCK_SIZE]) {
                    let mut block = [0u8; BLOCK_SIZE];
                    block.copy_from_slice(&self.payload[..BLOCK_SIZE]);
                    self.store.push(block);
                }
                if self.drop_ack_for != Some(index) {
                    self.rx.push_back(ACK);
                }
                Parse::Idle
            },
        };
    }
}

impl Read for SimulatedInstrument {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.rx.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "silent"));
        }
        let n = buf.len().min(self.rx.len());
        for (slot, byte) in buf.iter_mut().zip(self.rx.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for SimulatedInstrument {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for &byte in buf {
            self.feed(byte);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Port for SimulatedInstrument {
    fn set_timeout(&mut self, timeout: Duration) -> aq3link::Result<()> {
        self.timeout = timeout;
        Ok(())
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn clear_buffers(&mut self) -> aq3link::Result<()> {
        self.rx.clear();
        Ok(())
    }

    fn name(&self) -> &str {
        "simulated"
    }

    fn close(&mut self) -> aq3link::Result<()> {
        Ok(())
    }
}

fn sample_store() -> Vec<Block> {
    let mut info = [0u8; BLOCK_SIZE];
    info[1..9].copy_from_slice(b"CELLWASH");
    info[34..42].copy_from_slice(b"24121998");

    let mut blocks = vec![info];
    for slot in 1..=3u8 {
        let mut block = [0u8; BLOCK_SIZE];
        block[0] = slot;
        let name = format!("PROGRAM {slot}");
        block[1..1 + name.len()].copy_from_slice(name.as_bytes());
        block[69] = 1;
        block[70..72].copy_from_slice(&1440u16.to_le_bytes());
        // ASP1, DISP1 300.0 µl, SOAK 30 s, END
        block[106..109].copy_from_slice(&[1, 20, 30]);
        block[156..158].copy_from_slice(&0x0A05u16.to_le_bytes());
        block[158..160].copy_from_slice(&3000u16.to_le_bytes());
        block[160..162].copy_from_slice(&30u16.to_le_bytes());
        blocks.push(block);
    }
    blocks
}

fn connect(sim: SimulatedInstrument) -> Instrument<SimulatedInstrument, ManualClock> {
    let _ = env_logger::builder()
        .is_test(true)
        .try_init();
    Instrument::new(Transport::new(sim, LineTimeouts::default())).with_clock(ManualClock::new())
}

#[test]
fn identity_queries() {
    let mut instrument = connect(SimulatedInstrument::new(Vec::new()));
    let identity = instrument
        .identify()
        .unwrap();
    assert_eq!(identity.codes.model(), Model::AquaMaxDw4);
    assert_eq!(identity.codes.firmware_version(), "1.8");
    assert_eq!(identity.firmware, "AquaMax DW4 V1.8");
    assert_eq!(identity.serial_number, "000815");
}

#[test]
fn upload_decodes_program_store() {
    let mut instrument = connect(SimulatedInstrument::new(sample_store()));
    let mut progress = Vec::new();
    let (store, report) = instrument
        .upload_store(&mut |done, _| progress.push(done))
        .unwrap();

    assert_eq!(report.blocks, sample_store());
    assert!(report.checksum_mismatches.is_empty());
    assert_eq!(progress, vec![1, 2, 3, 4]);

    assert_eq!(store.info.file_name.to_trimmed(), "CELLWASH");
    assert_eq!(store.info.display_date(), "24.12.1998");
    assert_eq!(store.programs.len(), 3);
    let first = &store.programs[0];
    assert_eq!(first.name.to_trimmed(), "PROGRAM 1");
    assert_eq!(first.plate_height, 1440);
    assert_eq!(first.commands().len(), 3);
}

#[test]
fn download_then_upload_round_trip() {
    let store = ProgramStore::from_blocks(&sample_store()).unwrap();

    let mut writer = connect(SimulatedInstrument::new(Vec::new()));
    let report = writer
        .download_store(&store, &mut |_, _| {})
        .unwrap();
    assert!(report.is_clean());
    assert!(writer.transport().port().ended);

    let written = writer
        .transport()
        .port()
        .store
        .clone();
    assert_eq!(written, sample_store());

    let mut reader = connect(SimulatedInstrument::new(written));
    let (uploaded, _) = reader
        .upload_store(&mut |_, _| {})
        .unwrap();
    assert_eq!(uploaded, store);
}

#[test]
fn missing_block_ack_stops_download() {
    let mut sim = SimulatedInstrument::new(Vec::new());
    sim.drop_ack_for = Some(1);
    let mut instrument = connect(sim);

    let err = instrument
        .download_programs(&sample_store(), &mut |_, _| {})
        .unwrap_err();

    assert!(matches!(err, Error::BlockAckTimeout { block: 1, written: 1 }));
    assert!(err.is_partial_write());
    let sim = instrument.transport().port();
    assert_eq!(sim.received, 2);
    assert!(!sim.ended);
}

#[test]
fn missing_block_ack_with_continue_policy() {
    let mut sim = SimulatedInstrument::new(Vec::new());
    sim.drop_ack_for = Some(1);
    let mut instrument = connect(sim).with_options(TransferOptions {
        ack_timeout_policy: AckTimeoutPolicy::Continue,
        ..Default::default()
    });

    let report = instrument
        .download_programs(&sample_store(), &mut |_, _| {})
        .unwrap();

    assert_eq!(report.unacknowledged, vec![1]);
    assert_eq!(report.blocks_written, 4);
    assert!(instrument.transport().port().ended);
}

#[test]
fn silent_line_probe_reports_nothing() {
    struct Silent;
    impl Read for Silent {
        fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::TimedOut, "silent"))
        }
    }
    impl Write for Silent {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
    impl Port for Silent {
        fn set_timeout(&mut self, _: Duration) -> aq3link::Result<()> {
            Ok(())
        }
        fn timeout(&self) -> Duration {
            Duration::ZERO
        }
        fn clear_buffers(&mut self) -> aq3link::Result<()> {
            Ok(())
        }
        fn name(&self) -> &str {
            "silent"
        }
        fn close(&mut self) -> aq3link::Result<()> {
            Ok(())
        }
    }

    let mut instrument = Instrument::new(Transport::new(Silent, LineTimeouts::default()));
    assert_eq!(instrument.probe().unwrap(), None);

    let mut instrument = connect(SimulatedInstrument::new(Vec::new()));
    let codes = instrument
        .probe()
        .unwrap()
        .unwrap();
    assert_eq!(codes.model_code, 0x12);
}
