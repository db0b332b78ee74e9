// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Types shared by the SSIF (IPMI over SMBus) transport and its clients
//!
//! SSIF carries an IPMI request as a series of SMBus block writes to the BMC
//! and the response as a series of SMBus block reads. Messages that don't fit
//! in a single 32-byte block are split into start, middle and end parts, each
//! with its own SMBus command code.
//!
//! This crate holds the wire constants, the error type, the negotiated
//! capability, and the two traits at the edges of the transport:
//! [`SmbusBlock`] (what the transport needs from the SMBus host controller)
//! and [`IpmiTransport`] (what the transport offers to an IPMI client).
//!
//! It works on both the host and embedded system, so it can be used in
//! host-side tests.

#![cfg_attr(not(test), no_std)]

use num_derive::FromPrimitive;

/// Largest payload of one SMBus block transfer.
pub const SMBUS_BLOCK_LEN: usize = 32;

/// Largest SSIF message in either direction; the capability response
/// advertises sizes in a single byte.
pub const MAX_MESSAGE_LEN: usize = 255;

/// NetFn/LUN byte plus command byte.
pub const HEADER_LEN: usize = 2;

/// Leading bytes of the first block of a multi-part read.
pub const MULTI_PART_START: [u8; 2] = [0x00, 0x01];

/// Block number that marks the last block of a multi-part read.
pub const MULTI_PART_END: u8 = 0xff;

/// SMBus command codes defined by the SSIF binding.
#[derive(Copy, Clone, Debug, Eq, PartialEq, FromPrimitive)]
#[repr(u8)]
pub enum SmbusCommand {
    SinglePartWrite = 0x02,
    /// Also used for the first block of a multi-part read.
    SinglePartRead = 0x03,
    MultiPartWriteStart = 0x06,
    MultiPartWriteMiddle = 0x07,
    MultiPartWriteEnd = 0x08,
    MultiPartReadMiddle = 0x09,
    MultiPartReadRetry = 0x0a,
}

impl From<SmbusCommand> for u8 {
    fn from(cmd: SmbusCommand) -> u8 {
        cmd as u8
    }
}

/// Where a block sits within a segmented message.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SegmentAttribute {
    Single,
    Start,
    Middle,
    End,
}

impl SegmentAttribute {
    /// The SMBus command used to write a block with this attribute.
    pub fn write_command(self) -> SmbusCommand {
        match self {
            SegmentAttribute::Single => SmbusCommand::SinglePartWrite,
            SegmentAttribute::Start => SmbusCommand::MultiPartWriteStart,
            SegmentAttribute::Middle => SmbusCommand::MultiPartWriteMiddle,
            SegmentAttribute::End => SmbusCommand::MultiPartWriteEnd,
        }
    }
}

/// Multi-part support advertised by the BMC, in increasing order of
/// capability. The discriminants are the values of bits 7:6 of the
/// capability response.
#[derive(
    Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, FromPrimitive,
)]
#[repr(u8)]
pub enum TransactionSupport {
    /// Every message must fit in one block.
    SinglePartition = 0,
    /// Messages may span a start and an end block, but no middle blocks.
    StartEnd = 1,
    /// Messages may span any number of blocks.
    StartMiddleEnd = 2,
}

/// Parameters negotiated with the BMC.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Capability {
    pub max_request_size: u8,
    /// Advisory only. The BMC decides how much to send; responses are
    /// bounded by the caller's buffer, not by this.
    pub max_response_size: u8,
    pub pec_enabled: bool,
    pub transaction_support: TransactionSupport,
}

impl Capability {
    /// What we assume until (or unless) the BMC tells us otherwise.
    pub const DEFAULT: Self = Self {
        max_request_size: SMBUS_BLOCK_LEN as u8,
        max_response_size: SMBUS_BLOCK_LEN as u8,
        pec_enabled: false,
        transaction_support: TransactionSupport::SinglePartition,
    };
}

impl Default for Capability {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Standard IPMI request network functions. A response always carries the
/// request's NetFn plus one.
#[derive(Copy, Clone, Debug, Eq, PartialEq, FromPrimitive)]
#[repr(u8)]
pub enum NetFn {
    Chassis = 0x00,
    Bridge = 0x02,
    SensorEvent = 0x04,
    App = 0x06,
    Firmware = 0x08,
    Storage = 0x0a,
    Transport = 0x0c,
}

impl NetFn {
    pub fn response(self) -> u8 {
        self as u8 + 1
    }
}

impl From<NetFn> for u8 {
    fn from(net_fn: NetFn) -> u8 {
        net_fn as u8
    }
}

/// Largest value that fits in the 6-bit NetFn field.
pub const NET_FN_MAX: u8 = 0x3f;

/// Errors from the SSIF transport.
#[derive(Copy, Clone, Debug, Eq, PartialEq, FromPrimitive)]
#[repr(u32)]
pub enum SsifError {
    /// The message needs more segments than the BMC supports.
    Unsupported = 1,
    /// A block read returned no data.
    NoResponse,
    /// The response doesn't fit in the caller's buffer.
    BufferTooSmall,
    /// The SMBus transaction failed (NACK, arbitration loss, ...), or a
    /// multi-part read could not be resynchronized.
    DeviceError,
    /// The SMBus transaction timed out.
    Timeout,
    /// The response's NetFn isn't the one our request asked for.
    ResponseMismatch,
    /// A block's PEC byte didn't match its contents.
    PecMismatch,
    /// The response was too short or its contents didn't parse.
    MalformedResponse,
    /// The call itself was malformed (no room for a response, empty
    /// request frame, NetFn out of range or not a request NetFn).
    OutOfResources,
}

impl SsifError {
    /// Whether trying the same phase again could plausibly succeed.
    pub fn is_recoverable(&self) -> bool {
        match *self {
            SsifError::Unsupported
            | SsifError::BufferTooSmall
            | SsifError::OutOfResources => false,

            SsifError::NoResponse
            | SsifError::DeviceError
            | SsifError::Timeout
            | SsifError::ResponseMismatch
            | SsifError::PecMismatch
            | SsifError::MalformedResponse => true,
        }
    }
}

impl From<SsifError> for u32 {
    fn from(err: SsifError) -> u32 {
        err as u32
    }
}

/// Result of one SMBus block read.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BlockRead {
    /// Number of data bytes placed in the buffer (the SMBus byte count).
    pub len: usize,
    /// The PEC byte that trailed the data, if one was requested.
    pub pec: Option<u8>,
}

/// SMBus block transfers to a device, as provided by the host controller
/// driver.
///
/// `addr` is the 7-bit target address. Implementations return
/// [`SsifError::DeviceError`] or [`SsifError::Timeout`] for bus-level
/// failures; the transport passes those through unchanged.
pub trait SmbusBlock {
    /// Performs an SMBus block write of `data` under command `cmd`,
    /// appending `pec` after the data if present.
    fn write_block(
        &mut self,
        addr: u8,
        cmd: u8,
        data: &[u8],
        pec: Option<u8>,
    ) -> Result<(), SsifError>;

    /// Performs an SMBus block read under command `cmd` into `buf`. If `pec`
    /// is set, one more byte is clocked in after the data and returned in
    /// [`BlockRead::pec`].
    fn read_block(
        &mut self,
        addr: u8,
        cmd: u8,
        buf: &mut [u8],
        pec: bool,
    ) -> Result<BlockRead, SsifError>;
}

/// Submits IPMI commands to a BMC.
pub trait IpmiTransport {
    /// Sends `request` as command `cmd` of network function `net_fn`, and
    /// copies the response body into `response`, starting with the
    /// completion code. Returns the number of bytes written to `response`.
    fn submit(
        &self,
        net_fn: u8,
        cmd: u8,
        request: &[u8],
        response: &mut [u8],
    ) -> Result<usize, SsifError>;
}
