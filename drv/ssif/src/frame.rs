// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! IPMI request framing and response header checks.

use bitfield::bitfield;
use drv_ssif_api::{SsifError, HEADER_LEN, MAX_MESSAGE_LEN, NET_FN_MAX};
use heapless::Vec;

use crate::Trace;
use ringbuf::ringbuf_entry_root;

bitfield! {
    #[derive(Copy, Clone)]
    pub struct NetFnLun(u8);
    net_fn, set_net_fn: 7, 2;
    _, set_lun: 1, 0;
}

/// A request as it goes out on the wire: NetFn/LUN, command, payload.
pub(crate) struct RequestFrame {
    bytes: Vec<u8, MAX_MESSAGE_LEN>,
}

impl RequestFrame {
    pub fn new(
        net_fn: u8,
        lun: u8,
        cmd: u8,
        payload: &[u8],
    ) -> Result<Self, SsifError> {
        // Requests use even NetFns; the odd one above each is its response.
        if net_fn > NET_FN_MAX || net_fn & 1 != 0 {
            return Err(SsifError::OutOfResources);
        }

        let mut header = NetFnLun(0);
        header.set_net_fn(net_fn);
        header.set_lun(lun & 0x3);

        let mut bytes = Vec::new();
        bytes
            .extend_from_slice(&[header.0, cmd])
            .and_then(|()| bytes.extend_from_slice(payload))
            .map_err(|()| SsifError::Unsupported)?;

        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Checks that a reassembled response carries a header and a completion
/// code, and that it answers a request of NetFn `request_net_fn`.
pub(crate) fn check_response(
    frame: &[u8],
    request_net_fn: u8,
) -> Result<(), SsifError> {
    if frame.len() <= HEADER_LEN {
        return Err(SsifError::MalformedResponse);
    }

    let expected = request_net_fn + 1;
    let got = NetFnLun(frame[0]).net_fn();

    if got != expected {
        ringbuf_entry_root!(Trace::NetFnMismatch { expected, got });
        return Err(SsifError::ResponseMismatch);
    }

    Ok(())
}
