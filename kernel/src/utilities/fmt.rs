// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright picofreq Contributors 2025.

//! Formatting into fixed stack buffers.
//!
//! Log and telemetry lines are short; they are formatted into a caller-owned
//! byte array and handed to the sink as `&str`. Output that does not fit is
//! truncated rather than failed, matching the log path's drop-on-pressure
//! error policy.

use core::fmt;
use core::str;

pub struct WriteBuf<'a> {
    buf: &'a mut [u8],
    len: usize,
}

impl<'a> WriteBuf<'a> {
    pub fn new(buf: &'a mut [u8]) -> WriteBuf<'a> {
        WriteBuf { buf, len: 0 }
    }

    /// The formatted prefix written so far.
    pub fn as_str(&self) -> &str {
        str::from_utf8(&self.buf[..self.len]).unwrap_or("")
    }
}

impl fmt::Write for WriteBuf<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let space = self.buf.len() - self.len;
        // Truncate on a char boundary so as_str stays valid UTF-8.
        let take = if s.len() <= space {
            s.len()
        } else {
            let mut end = space;
            while end > 0 && !s.is_char_boundary(end) {
                end -= 1;
            }
            end
        };
        self.buf[self.len..self.len + take].copy_from_slice(&s.as_bytes()[..take]);
        self.len += take;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::fmt::Write;

    #[test]
    fn formats_into_buffer() {
        let mut storage = [0u8; 32];
        let mut w = WriteBuf::new(&mut storage);
        write!(w, "clk={} target={}", 125000, 264000).unwrap();
        assert_eq!(w.as_str(), "clk=125000 target=264000");
    }

    #[test]
    fn truncates_instead_of_failing() {
        let mut storage = [0u8; 8];
        let mut w = WriteBuf::new(&mut storage);
        write!(w, "0123456789abcdef").unwrap();
        assert_eq!(w.as_str(), "01234567");
    }
}
