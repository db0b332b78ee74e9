// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fake BMCs for driving the transport on the host.

#![allow(dead_code)]

use std::collections::VecDeque;

use drv_ssif_api::{
    BlockRead, SmbusBlock, SmbusCommand, SsifError, MULTI_PART_END,
    MULTI_PART_START, SMBUS_BLOCK_LEN,
};
use drv_ssif::{RetryPolicy, SsifConfig};
use embedded_hal::blocking::delay::DelayUs;
use num_traits::FromPrimitive;

pub const ADDR: u8 = 0x10;

/// Configuration with short, countable retry budgets.
pub fn config() -> SsifConfig {
    SsifConfig {
        address: ADDR,
        lun: 0,
        pec: true,
        write_retry: RetryPolicy {
            attempts: 3,
            delay_us: 100,
        },
        read_retry: RetryPolicy {
            attempts: 4,
            delay_us: 500,
        },
    }
}

#[derive(Default)]
pub struct FakeDelay {
    pub sleeps: Vec<u32>,
}

impl DelayUs<u32> for FakeDelay {
    fn delay_us(&mut self, us: u32) {
        self.sleeps.push(us);
    }
}

fn write_pec(addr: u8, cmd: u8, data: &[u8]) -> u8 {
    let mut msg = vec![addr << 1, cmd, data.len() as u8];
    msg.extend_from_slice(data);
    smbus_pec::pec(&msg)
}

fn read_pec(addr: u8, cmd: u8, data: &[u8]) -> u8 {
    let mut msg = vec![addr << 1, cmd, (addr << 1) | 1, data.len() as u8];
    msg.extend_from_slice(data);
    smbus_pec::pec(&msg)
}

/// A response frame answering a request of NetFn `net_fn`.
pub fn response_frame(net_fn: u8, cmd: u8, body: &[u8]) -> Vec<u8> {
    let mut frame = vec![(net_fn + 1) << 2, cmd];
    frame.extend_from_slice(body);
    frame
}

/// Splits a response frame into the blocks a BMC would hand out, along with
/// the read command each one answers.
pub fn read_blocks(frame: &[u8]) -> Vec<(SmbusCommand, Vec<u8>)> {
    if frame.len() <= SMBUS_BLOCK_LEN {
        return vec![(SmbusCommand::SinglePartRead, frame.to_vec())];
    }

    let first_len = SMBUS_BLOCK_LEN - MULTI_PART_START.len();
    let mut first = MULTI_PART_START.to_vec();
    first.extend_from_slice(&frame[..first_len]);

    let mut blocks = vec![(SmbusCommand::SinglePartRead, first)];
    let mut rest = &frame[first_len..];
    let mut number = 0u8;

    while rest.len() > SMBUS_BLOCK_LEN - 1 {
        let mut block = vec![number];
        block.extend_from_slice(&rest[..SMBUS_BLOCK_LEN - 1]);
        blocks.push((SmbusCommand::MultiPartReadMiddle, block));
        rest = &rest[SMBUS_BLOCK_LEN - 1..];
        number += 1;
    }

    let mut end = vec![MULTI_PART_END];
    end.extend_from_slice(rest);
    blocks.push((SmbusCommand::MultiPartReadMiddle, end));
    blocks
}

#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    Write {
        cmd: SmbusCommand,
        data: Vec<u8>,
        pec: Option<u8>,
    },
    Read {
        cmd: SmbusCommand,
    },
}

#[derive(Clone, Debug)]
pub enum Reply {
    Data(Vec<u8>),
    BadPec(Vec<u8>),
    Fail(SsifError),
}

/// A BMC that replays a fixed script of block reads and records every
/// transaction. Reading past the end of the script is a test bug.
#[derive(Default)]
pub struct ScriptedBmc {
    pub log: Vec<Event>,
    reads: VecDeque<(SmbusCommand, Reply)>,
    write_faults: Vec<(usize, SsifError)>,
}

impl ScriptedBmc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(mut self, cmd: SmbusCommand, reply: Reply) -> Self {
        self.reads.push_back((cmd, reply));
        self
    }

    /// Queues every block of `frame`.
    pub fn respond(mut self, frame: &[u8]) -> Self {
        for (cmd, block) in read_blocks(frame) {
            self.reads.push_back((cmd, Reply::Data(block)));
        }
        self
    }

    /// Makes the `nth` block write (counting from zero, across the whole
    /// session) fail with `err`. The attempt is still logged.
    pub fn fail_write(mut self, nth: usize, err: SsifError) -> Self {
        self.write_faults.push((nth, err));
        self
    }

    pub fn writes(&self) -> Vec<(SmbusCommand, Vec<u8>)> {
        self.log
            .iter()
            .filter_map(|e| match e {
                Event::Write { cmd, data, .. } => Some((*cmd, data.clone())),
                Event::Read { .. } => None,
            })
            .collect()
    }

    pub fn reads(&self) -> usize {
        self.log
            .iter()
            .filter(|e| matches!(e, Event::Read { .. }))
            .count()
    }

    pub fn unread(&self) -> usize {
        self.reads.len()
    }
}

impl SmbusBlock for ScriptedBmc {
    fn write_block(
        &mut self,
        addr: u8,
        cmd: u8,
        data: &[u8],
        pec: Option<u8>,
    ) -> Result<(), SsifError> {
        assert_eq!(addr, ADDR);
        assert!(!data.is_empty() && data.len() <= SMBUS_BLOCK_LEN);
        if let Some(pec) = pec {
            assert_eq!(pec, write_pec(addr, cmd, data), "bad write PEC");
        }

        let nth = self.writes().len();
        self.log.push(Event::Write {
            cmd: SmbusCommand::from_u8(cmd).expect("unknown write command"),
            data: data.to_vec(),
            pec,
        });

        match self.write_faults.iter().find(|(n, _)| *n == nth) {
            Some(&(_, err)) => Err(err),
            None => Ok(()),
        }
    }

    fn read_block(
        &mut self,
        addr: u8,
        cmd: u8,
        buf: &mut [u8],
        pec: bool,
    ) -> Result<BlockRead, SsifError> {
        assert_eq!(addr, ADDR);
        let cmd = SmbusCommand::from_u8(cmd).expect("unknown read command");
        self.log.push(Event::Read { cmd });

        let (expected, reply) = self
            .reads
            .pop_front()
            .unwrap_or_else(|| panic!("unscripted read {cmd:?}"));
        assert_eq!(cmd, expected);

        let (data, corrupt) = match reply {
            Reply::Data(data) => (data, false),
            Reply::BadPec(data) => (data, true),
            Reply::Fail(err) => return Err(err),
        };

        buf[..data.len()].copy_from_slice(&data);
        let pec = pec.then(|| {
            let pec = read_pec(addr, cmd as u8, &data);
            if corrupt {
                !pec
            } else {
                pec
            }
        });

        Ok(BlockRead {
            len: data.len(),
            pec,
        })
    }
}

/// A BMC that answers every request with completion code 0 followed by the
/// request's own payload, segmenting in both directions as needed. It also
/// answers the capability query with whatever it was built with.
///
/// If a new request starts before the previous response was fully read, the
/// exchanges were interleaved on the bus; that's counted in `interleaved`.
pub struct EchoBmc {
    caps: [u8; 3],
    pending: Vec<u8>,
    outgoing: VecDeque<(SmbusCommand, Vec<u8>)>,
    pub requests: usize,
    pub interleaved: usize,
}

impl EchoBmc {
    /// `support` is the capability byte (transaction support, PEC,
    /// version); `input` and `output` the advertised message sizes.
    pub fn new(support: u8, input: u8, output: u8) -> Self {
        Self {
            caps: [support, input, output],
            pending: vec![],
            outgoing: VecDeque::new(),
            requests: 0,
            interleaved: 0,
        }
    }

    fn complete(&mut self) {
        let request = std::mem::take(&mut self.pending);
        let net_fn = request[0] >> 2;
        let cmd = request[1];
        self.requests += 1;

        let body = if net_fn == 0x06 && cmd == 0x57 {
            vec![0x00, 0x00, self.caps[0], self.caps[1], self.caps[2]]
        } else {
            let mut body = vec![0x00];
            body.extend_from_slice(&request[2..]);
            body
        };

        self.outgoing = read_blocks(&response_frame(net_fn, cmd, &body)).into();
    }
}

impl SmbusBlock for EchoBmc {
    fn write_block(
        &mut self,
        addr: u8,
        cmd: u8,
        data: &[u8],
        pec: Option<u8>,
    ) -> Result<(), SsifError> {
        assert_eq!(addr, ADDR);
        if let Some(pec) = pec {
            assert_eq!(pec, write_pec(addr, cmd, data), "bad write PEC");
        }

        let cmd = SmbusCommand::from_u8(cmd).ok_or(SsifError::DeviceError)?;
        if matches!(
            cmd,
            SmbusCommand::SinglePartWrite | SmbusCommand::MultiPartWriteStart
        ) && !self.outgoing.is_empty()
        {
            self.interleaved += 1;
        }

        match cmd {
            SmbusCommand::SinglePartWrite => {
                self.pending = data.to_vec();
                self.complete();
            }
            SmbusCommand::MultiPartWriteStart => {
                self.pending = data.to_vec();
            }
            SmbusCommand::MultiPartWriteMiddle => {
                self.pending.extend_from_slice(data);
            }
            SmbusCommand::MultiPartWriteEnd => {
                self.pending.extend_from_slice(data);
                self.complete();
            }
            _ => return Err(SsifError::DeviceError),
        }

        Ok(())
    }

    fn read_block(
        &mut self,
        addr: u8,
        cmd: u8,
        buf: &mut [u8],
        pec: bool,
    ) -> Result<BlockRead, SsifError> {
        assert_eq!(addr, ADDR);

        let Some((expected, data)) = self.outgoing.pop_front() else {
            return Ok(BlockRead { len: 0, pec: None });
        };
        assert_eq!(cmd, expected as u8);

        buf[..data.len()].copy_from_slice(&data);
        Ok(BlockRead {
            len: data.len(),
            pec: pec.then(|| read_pec(addr, cmd, &data)),
        })
    }
}
