// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use drv_ssif_api::SsifError;
use embedded_hal::blocking::delay::DelayUs;
use serde::Deserialize;

/// How many times to try one phase of an exchange, and how long to wait in
/// between.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub attempts: u16,
    pub delay_us: u32,
}

impl RetryPolicy {
    /// Runs `op` until it succeeds, fails with an error that isn't
    /// recoverable, or runs out of attempts. `op` is handed the attempt
    /// number, starting at 1. The last error is returned on failure.
    pub fn run<T, D: DelayUs<u32>>(
        &self,
        delay: &mut D,
        mut op: impl FnMut(u16) -> Result<T, SsifError>,
    ) -> Result<T, SsifError> {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;

        loop {
            match op(attempt) {
                Ok(v) => return Ok(v),
                Err(err) if !err.is_recoverable() || attempt >= attempts => {
                    return Err(err);
                }
                Err(_) => {
                    delay.delay_us(self.delay_us);
                    attempt += 1;
                }
            }
        }
    }
}
