// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Segmented request writes.

use drv_ssif_api::{
    Capability, SegmentAttribute, SmbusBlock, SsifError, TransactionSupport,
    SMBUS_BLOCK_LEN,
};

use crate::{block, Trace};
use ringbuf::ringbuf_entry_root;

/// Splits a frame into blocks of `block_len`, tagging each with its place in
/// the message. Every block but the last is full; the last holds between 1
/// and `block_len` bytes.
pub(crate) struct Segments<'a> {
    frame: &'a [u8],
    block_len: usize,
    total: usize,
    index: usize,
}

impl<'a> Segments<'a> {
    /// Fails without yielding anything if the frame is empty or needs more
    /// segments than `support` allows.
    pub fn new(
        frame: &'a [u8],
        block_len: usize,
        support: TransactionSupport,
    ) -> Result<Self, SsifError> {
        if frame.is_empty() || block_len == 0 {
            return Err(SsifError::OutOfResources);
        }

        let total = frame.len().div_ceil(block_len);
        let needed = match total {
            1 => TransactionSupport::SinglePartition,
            2 => TransactionSupport::StartEnd,
            _ => TransactionSupport::StartMiddleEnd,
        };

        if needed > support {
            return Err(SsifError::Unsupported);
        }

        Ok(Self {
            frame,
            block_len,
            total,
            index: 0,
        })
    }

    pub fn total(&self) -> usize {
        self.total
    }
}

impl<'a> Iterator for Segments<'a> {
    type Item = (SegmentAttribute, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.index == self.total {
            return None;
        }

        let attr = match self.index {
            _ if self.total == 1 => SegmentAttribute::Single,
            0 => SegmentAttribute::Start,
            i if i + 1 == self.total => SegmentAttribute::End,
            _ => SegmentAttribute::Middle,
        };

        let start = self.index * self.block_len;
        let end = (start + self.block_len).min(self.frame.len());
        self.index += 1;

        Some((attr, &self.frame[start..end]))
    }
}

/// Writes `frame` to the BMC, returning the number of blocks written. The
/// first failed block write ends the attempt.
pub(crate) fn write_request<B: SmbusBlock>(
    bus: &mut B,
    addr: u8,
    caps: &Capability,
    frame: &[u8],
) -> Result<usize, SsifError> {
    if frame.len() > usize::from(caps.max_request_size) {
        ringbuf_entry_root!(Trace::RequestTooLong {
            len: frame.len(),
            max: caps.max_request_size,
        });
        return Err(SsifError::Unsupported);
    }

    let segments =
        Segments::new(frame, SMBUS_BLOCK_LEN, caps.transaction_support)
            .inspect_err(|&err| {
                ringbuf_entry_root!(Trace::CannotSegment {
                    len: frame.len(),
                    err,
                });
            })?;
    let total = segments.total();

    for (attr, data) in segments {
        block::write(bus, addr, caps.pec_enabled, attr.write_command(), data)
            .inspect_err(|&err| {
                ringbuf_entry_root!(Trace::BlockWriteFailed { attr, err });
            })?;
    }

    Ok(total)
}
