// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! SSIF transport: IPMI requests and responses over SMBus
//!
//! An [`Ssif`] owns the SMBus connection to a BMC (anything implementing
//! [`SmbusBlock`]) and a delay source, and runs one IPMI exchange at a time:
//!
//! 1. The request is framed (`NetFn/LUN`, command, payload) and written as
//!    one block, or as start/middle/end blocks if it's longer than a block
//!    and the BMC allows it.
//! 2. The response is read back, reassembled if the BMC split it, and checked
//!    to be the answer to our request (its NetFn is ours plus one).
//!
//! Each phase is retried on its own under a [`RetryPolicy`]. Errors that
//! retrying can't fix (the message can't be segmented, the caller's buffer is
//! too small) are returned straight away.
//!
//! How much segmentation the BMC supports, and whether it wants PEC bytes, is
//! learned by [`Ssif::negotiate`]. Until that succeeds the transport assumes
//! the least: one block per message and no PEC.
//!
//! The whole exchange runs under a lock. A multi-part transfer spans several
//! bus transactions, and another exchange sneaking in between them would
//! throw off the BMC's block sequencing.

#![cfg_attr(not(test), no_std)]

mod block;
mod buf;
mod caps;
mod frame;
mod read;
mod retry;
mod write;

pub use retry::RetryPolicy;

use drv_ssif_api::{
    Capability, IpmiTransport, NetFn, SegmentAttribute, SmbusBlock, SsifError,
    HEADER_LEN,
};
use embedded_hal::blocking::delay::DelayUs;
use ringbuf::{ringbuf, ringbuf_entry};
use serde::Deserialize;
use spin::Mutex;

use crate::buf::ReassemblyBuf;
use crate::frame::RequestFrame;

#[derive(Copy, Clone, Debug, PartialEq)]
enum Trace {
    None,
    Negotiated(Capability),
    NegotiationFailed(SsifError),
    CapabilityCompletion(u8),
    SsifVersion(u8),
    BadCall,
    Sent {
        net_fn: u8,
        cmd: u8,
        len: usize,
        blocks: usize,
    },
    RequestTooLong {
        len: usize,
        max: u8,
    },
    CannotSegment {
        len: usize,
        err: SsifError,
    },
    BlockWriteFailed {
        attr: SegmentAttribute,
        err: SsifError,
    },
    WriteFailed {
        attempt: u16,
        err: SsifError,
    },
    MultiPartRead,
    SequenceMismatch {
        expected: u8,
        got: u8,
    },
    SequenceRetriesExhausted {
        expected: u8,
    },
    MissingEndBlock,
    PecMismatch {
        cmd: u8,
        expected: u8,
        got: Option<u8>,
    },
    NetFnMismatch {
        expected: u8,
        got: u8,
    },
    ReadFailed {
        attempt: u16,
        err: SsifError,
    },
    Received {
        len: usize,
    },
}

ringbuf!(Trace, 64, Trace::None);

/// Static configuration for one BMC.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields, default)]
pub struct SsifConfig {
    /// 7-bit SMBus address of the BMC's SSIF responder.
    pub address: u8,
    /// LUN to address requests to.
    pub lun: u8,
    /// Use PEC if the BMC supports it.
    pub pec: bool,
    pub write_retry: RetryPolicy,
    pub read_retry: RetryPolicy,
}

impl SsifConfig {
    pub const DEFAULT: Self = Self {
        address: 0x10,
        lun: 0,
        pec: true,
        write_retry: RetryPolicy {
            attempts: 10,
            delay_us: 4_000,
        },
        // A BMC NACKs reads until it has a response ready, which can take
        // a while for some commands.
        read_retry: RetryPolicy {
            attempts: 250,
            delay_us: 4_000,
        },
    };
}

impl Default for SsifConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Transport statistics. All of the counters will wrap around.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct SsifStats {
    /// Requests handed to the transport, capability queries included
    pub requests: u32,
    /// Responses delivered to callers
    pub responses: u32,
    /// Failed write attempts
    pub write_errors: u32,
    /// Failed read attempts, including mismatched responses
    pub read_errors: u32,
    /// Write attempts after the first
    pub write_retries: u32,
    /// Read attempts after the first
    pub read_retries: u32,
    /// Out-of-sequence middle blocks that we asked the BMC to resend
    pub sequence_retries: u32,
    /// Responses whose NetFn didn't answer our request
    pub netfn_mismatches: u32,
    /// Blocks with a bad PEC byte
    pub pec_errors: u32,
}

struct Inner<B, D> {
    bus: B,
    delay: D,
    config: SsifConfig,
    caps: Capability,
    stats: SsifStats,
}

/// An SSIF connection to one BMC.
pub struct Ssif<B, D> {
    inner: Mutex<Inner<B, D>>,
}

impl<B: SmbusBlock, D: DelayUs<u32>> Ssif<B, D> {
    /// Returns a transport using default capabilities. Nothing is sent to
    /// the BMC.
    pub fn new(bus: B, delay: D, config: SsifConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                bus,
                delay,
                config,
                caps: Capability::DEFAULT,
                stats: SsifStats::default(),
            }),
        }
    }

    /// Returns a transport and negotiates capabilities with the BMC. A BMC
    /// that can't be negotiated with is still usable with the defaults.
    pub fn init(bus: B, delay: D, config: SsifConfig) -> Self {
        let ssif = Self::new(bus, delay, config);
        let _ = ssif.negotiate();
        ssif
    }

    /// Asks the BMC for its SSIF capabilities and adopts them. On failure
    /// the defaults are put back in place.
    pub fn negotiate(&self) -> Result<Capability, SsifError> {
        self.inner.lock().negotiate()
    }

    pub fn capability(&self) -> Capability {
        self.inner.lock().caps
    }

    pub fn stats(&self) -> SsifStats {
        self.inner.lock().stats
    }

    pub fn config(&self) -> SsifConfig {
        self.inner.lock().config
    }

    /// Tears the transport down, handing back the bus and delay.
    pub fn release(self) -> (B, D) {
        let inner = self.inner.into_inner();
        (inner.bus, inner.delay)
    }
}

impl<B: SmbusBlock, D: DelayUs<u32>> IpmiTransport for Ssif<B, D> {
    fn submit(
        &self,
        net_fn: u8,
        cmd: u8,
        request: &[u8],
        response: &mut [u8],
    ) -> Result<usize, SsifError> {
        self.inner.lock().exchange(net_fn, cmd, request, response)
    }
}

impl<B: SmbusBlock, D: DelayUs<u32>> Inner<B, D> {
    fn negotiate(&mut self) -> Result<Capability, SsifError> {
        self.caps = Capability::DEFAULT;

        let mut body = [0u8; caps::RESPONSE_BUF_LEN];
        let rval = self
            .exchange(
                NetFn::App.into(),
                caps::GET_SYSTEM_INTERFACE_CAPABILITIES,
                &[caps::SSIF_INTERFACE_TYPE],
                &mut body,
            )
            .and_then(|len| caps::parse(&body[..len], self.config.pec));

        match rval {
            Ok(caps) => {
                ringbuf_entry!(Trace::Negotiated(caps));
                self.caps = caps;
                Ok(caps)
            }
            Err(err) => {
                ringbuf_entry!(Trace::NegotiationFailed(err));
                Err(err)
            }
        }
    }

    fn exchange(
        &mut self,
        net_fn: u8,
        cmd: u8,
        request: &[u8],
        response: &mut [u8],
    ) -> Result<usize, SsifError> {
        // There's no way to throw a response away.
        if response.is_empty() {
            ringbuf_entry!(Trace::BadCall);
            return Err(SsifError::OutOfResources);
        }

        let frame = RequestFrame::new(net_fn, self.config.lun, cmd, request)
            .inspect_err(|_| ringbuf_entry!(Trace::BadCall))?;

        let Inner {
            bus,
            delay,
            config,
            caps,
            stats,
        } = self;
        let addr = config.address;

        stats.requests = stats.requests.wrapping_add(1);

        let blocks = config.write_retry.run(delay, |attempt| {
            if attempt > 1 {
                stats.write_retries = stats.write_retries.wrapping_add(1);
            }

            write::write_request(bus, addr, caps, frame.as_bytes()).inspect_err(
                |&err| {
                    stats.write_errors = stats.write_errors.wrapping_add(1);
                    ringbuf_entry!(Trace::WriteFailed { attempt, err });
                },
            )
        })?;

        ringbuf_entry!(Trace::Sent {
            net_fn,
            cmd,
            len: request.len(),
            blocks,
        });

        let mut rsp = ReassemblyBuf::new(response.len() + HEADER_LEN);

        config.read_retry.run(delay, |attempt| {
            if attempt > 1 {
                stats.read_retries = stats.read_retries.wrapping_add(1);
            }

            rsp.clear();
            read::read_response(bus, addr, caps.pec_enabled, stats, &mut rsp)
                .and_then(|()| frame::check_response(rsp.as_slice(), net_fn))
                .inspect_err(|&err| {
                    stats.read_errors = stats.read_errors.wrapping_add(1);
                    match err {
                        SsifError::PecMismatch => {
                            stats.pec_errors = stats.pec_errors.wrapping_add(1)
                        }
                        SsifError::ResponseMismatch => {
                            stats.netfn_mismatches =
                                stats.netfn_mismatches.wrapping_add(1)
                        }
                        _ => {}
                    }
                    ringbuf_entry!(Trace::ReadFailed { attempt, err });
                })
        })?;

        let body = &rsp.as_slice()[HEADER_LEN..];
        response[..body.len()].copy_from_slice(body);

        stats.responses = stats.responses.wrapping_add(1);
        ringbuf_entry!(Trace::Received { len: rsp.len() });

        Ok(body.len())
    }
}
