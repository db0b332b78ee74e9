// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bounded reassembly buffer for multi-part reads.

use drv_ssif_api::{SsifError, MAX_MESSAGE_LEN};
use heapless::Vec;

/// An append-only buffer with a limit below its storage capacity.
///
/// Any append that would cross the limit empties the buffer and fails with
/// [`SsifError::BufferTooSmall`]; a partially reassembled message is never
/// left behind for the caller to find.
pub(crate) struct ReassemblyBuf {
    data: Vec<u8, MAX_MESSAGE_LEN>,
    limit: usize,
}

impl ReassemblyBuf {
    pub fn new(limit: usize) -> Self {
        Self {
            data: Vec::new(),
            limit: limit.min(MAX_MESSAGE_LEN),
        }
    }

    pub fn extend(&mut self, bytes: &[u8]) -> Result<(), SsifError> {
        let fits = self
            .data
            .len()
            .checked_add(bytes.len())
            .is_some_and(|n| n <= self.limit);

        if !fits || self.data.extend_from_slice(bytes).is_err() {
            self.data.clear();
            return Err(SsifError::BufferTooSmall);
        }

        Ok(())
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }
}
