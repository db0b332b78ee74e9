// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Get System Interface Capabilities, SSIF flavor.

use bitfield::bitfield;
use drv_ssif_api::{Capability, SsifError, TransactionSupport, HEADER_LEN};
use num_traits::FromPrimitive;
use static_assertions::const_assert_eq;
use zerocopy::FromBytes;

use crate::Trace;
use ringbuf::ringbuf_entry_root;

/// App NetFn command number.
pub(crate) const GET_SYSTEM_INTERFACE_CAPABILITIES: u8 = 0x57;

/// Request data: which system interface we're asking about.
pub(crate) const SSIF_INTERFACE_TYPE: u8 = 0x00;

/// Room for the response body; some BMCs pad it.
pub(crate) const RESPONSE_BUF_LEN: usize = 16;

#[derive(
    Copy,
    Clone,
    zerocopy_derive::FromBytes,
    zerocopy_derive::KnownLayout,
    zerocopy_derive::Immutable,
    zerocopy_derive::Unaligned,
)]
#[repr(C)]
struct CapabilitiesResponse {
    completion_code: u8,
    _reserved: u8,
    support: u8,
    input_size: u8,
    output_size: u8,
}

const_assert_eq!(core::mem::size_of::<CapabilitiesResponse>(), 5);

bitfield! {
    pub struct SsifSupport(u8);
    transaction_support, _: 7, 6;
    pec_supported, _: 3;
    version, _: 2, 0;
}

/// Parses a capability response body (starting at the completion code).
/// PEC is only enabled if both the BMC supports it and `want_pec` is set.
pub(crate) fn parse(
    body: &[u8],
    want_pec: bool,
) -> Result<Capability, SsifError> {
    let (rsp, _) = CapabilitiesResponse::read_from_prefix(body)
        .map_err(|_| SsifError::MalformedResponse)?;

    if rsp.completion_code != 0 {
        ringbuf_entry_root!(Trace::CapabilityCompletion(rsp.completion_code));
        return Err(SsifError::MalformedResponse);
    }

    let support = SsifSupport(rsp.support);
    let transaction_support =
        TransactionSupport::from_u8(support.transaction_support())
            .ok_or(SsifError::MalformedResponse)?;

    if usize::from(rsp.input_size) < HEADER_LEN {
        return Err(SsifError::MalformedResponse);
    }

    ringbuf_entry_root!(Trace::SsifVersion(support.version()));

    Ok(Capability {
        max_request_size: rsp.input_size,
        max_response_size: rsp.output_size,
        pec_enabled: want_pec && support.pec_supported(),
        transaction_support,
    })
}
