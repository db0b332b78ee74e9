// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Single SMBus block transfers, with PEC generation and checking.

use drv_ssif_api::{SmbusBlock, SmbusCommand, SsifError, SMBUS_BLOCK_LEN};

use crate::Trace;
use ringbuf::ringbuf_entry_root;

/// Address, command, repeated address and byte count, ahead of the data.
const PEC_PREFIX_MAX: usize = 4;

fn pec_over(prefix: &[u8], data: &[u8]) -> u8 {
    let data = &data[..data.len().min(SMBUS_BLOCK_LEN)];
    let mut msg = [0u8; PEC_PREFIX_MAX + SMBUS_BLOCK_LEN];
    let n = prefix.len() + data.len();

    msg[..prefix.len()].copy_from_slice(prefix);
    msg[prefix.len()..n].copy_from_slice(data);
    smbus_pec::pec(&msg[..n])
}

/// PEC for a block write: covers the write address, the command, the byte
/// count and the data.
pub(crate) fn write_pec(addr: u8, cmd: u8, data: &[u8]) -> u8 {
    pec_over(&[addr << 1, cmd, data.len() as u8], data)
}

/// PEC for a block read: covers the write address, the command, the read
/// address (after the repeated start), the byte count and the data.
pub(crate) fn read_pec(addr: u8, cmd: u8, data: &[u8]) -> u8 {
    pec_over(&[addr << 1, cmd, (addr << 1) | 1, data.len() as u8], data)
}

pub(crate) fn write<B: SmbusBlock>(
    bus: &mut B,
    addr: u8,
    pec: bool,
    cmd: SmbusCommand,
    data: &[u8],
) -> Result<(), SsifError> {
    let cmd = u8::from(cmd);
    let pec = pec.then(|| write_pec(addr, cmd, data));
    bus.write_block(addr, cmd, data, pec)
}

/// Reads one block into `buf`, returning the number of data bytes. A read
/// that returns nothing is [`SsifError::NoResponse`].
pub(crate) fn read<B: SmbusBlock>(
    bus: &mut B,
    addr: u8,
    pec: bool,
    cmd: SmbusCommand,
    buf: &mut [u8; SMBUS_BLOCK_LEN],
) -> Result<usize, SsifError> {
    let cmd = u8::from(cmd);
    let rval = bus.read_block(addr, cmd, buf, pec)?;

    if rval.len == 0 {
        return Err(SsifError::NoResponse);
    }

    if rval.len > buf.len() {
        return Err(SsifError::DeviceError);
    }

    if pec {
        let expected = read_pec(addr, cmd, &buf[..rval.len]);
        if rval.pec != Some(expected) {
            ringbuf_entry_root!(Trace::PecMismatch {
                cmd,
                expected,
                got: rval.pec,
            });
            return Err(SsifError::PecMismatch);
        }
    }

    Ok(rval.len)
}
