// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Response reads and multi-part reassembly.
//!
//! The first read of a response always uses the single-part read command. If
//! the BMC has more than one block to send, it fills that first block and
//! starts it with [`MULTI_PART_START`]; the rest of the message then arrives
//! through middle reads, each tagged with an incrementing block number, until
//! a block tagged [`MULTI_PART_END`]. A middle block that arrives out of
//! sequence is re-requested with a retry write carrying the number we
//! expected.

use drv_ssif_api::{
    SmbusBlock, SmbusCommand, SsifError, MULTI_PART_END, MULTI_PART_START,
    SMBUS_BLOCK_LEN,
};

use crate::buf::ReassemblyBuf;
use crate::{block, SsifStats, Trace};
use ringbuf::ringbuf_entry_root;

/// Retransmission requests allowed within one read before giving up.
pub(crate) const SEQUENCE_RETRIES: u8 = 6;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum State {
    AwaitFirst,
    AwaitMiddle {
        /// Block number we expect next.
        expected: u8,
        /// Set until the first middle block is in; its number isn't checked.
        first: bool,
    },
    Done,
}

/// Reads one response from the BMC into `out`. On failure `out` may hold a
/// partial message; callers clear it before the next attempt.
pub(crate) fn read_response<B: SmbusBlock>(
    bus: &mut B,
    addr: u8,
    pec: bool,
    stats: &mut SsifStats,
    out: &mut ReassemblyBuf,
) -> Result<(), SsifError> {
    let mut block = [0u8; SMBUS_BLOCK_LEN];
    let mut retries = 0;
    let mut state = State::AwaitFirst;

    loop {
        state = match state {
            State::AwaitFirst => {
                let len = block::read(
                    bus,
                    addr,
                    pec,
                    SmbusCommand::SinglePartRead,
                    &mut block,
                )?;

                if len == SMBUS_BLOCK_LEN && block[..2] == MULTI_PART_START {
                    ringbuf_entry_root!(Trace::MultiPartRead);
                    out.extend(&block[MULTI_PART_START.len()..len])?;
                    State::AwaitMiddle {
                        expected: 0,
                        first: true,
                    }
                } else {
                    out.extend(&block[..len])?;
                    State::Done
                }
            }

            State::AwaitMiddle { expected, first } => {
                let len = block::read(
                    bus,
                    addr,
                    pec,
                    SmbusCommand::MultiPartReadMiddle,
                    &mut block,
                )?;
                let number = block[0];

                if number == MULTI_PART_END {
                    out.extend(&block[1..len])?;
                    State::Done
                } else if first || number == expected {
                    out.extend(&block[1..len])?;

                    // The end marker shares the block number space, so a
                    // message that hasn't ended by then never will.
                    let next = expected + 1;
                    if next == MULTI_PART_END {
                        ringbuf_entry_root!(Trace::MissingEndBlock);
                        return Err(SsifError::DeviceError);
                    }

                    State::AwaitMiddle {
                        expected: next,
                        first: false,
                    }
                } else {
                    ringbuf_entry_root!(Trace::SequenceMismatch {
                        expected,
                        got: number,
                    });

                    if retries == SEQUENCE_RETRIES {
                        ringbuf_entry_root!(Trace::SequenceRetriesExhausted {
                            expected
                        });
                        return Err(SsifError::DeviceError);
                    }

                    retries += 1;
                    stats.sequence_retries =
                        stats.sequence_retries.wrapping_add(1);

                    block::write(
                        bus,
                        addr,
                        pec,
                        SmbusCommand::MultiPartReadRetry,
                        &[expected],
                    )?;

                    State::AwaitMiddle { expected, first }
                }
            }

            State::Done => return Ok(()),
        };
    }
}
