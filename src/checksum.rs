//! A small, dependency-free rolling checksum used to detect op-log
//! truncation. Adler-32, in the style of zlib: two 16-bit sums threaded
//! through every byte consumed so far (base image and prior op records
//! alike), so a record's declared checksum can be verified without
//! rehashing everything that came before it.

const MOD_ADLER: u32 = 65521;

#[derive(Clone, Debug)]
pub struct Rolling {
    a: u32,
    b: u32,
}

impl Rolling {
    pub fn new() -> Self {
        Rolling { a: 1, b: 0 }
    }

    pub fn write(&mut self, bytes: &[u8]) {
        // NMAX in the reference zlib implementation is 5552 to avoid
        // overflowing `u32` before the modulo reduction; files here are
        // decoded in full in memory, but record payloads are bounded well
        // under that, so a plain per-byte loop is simplest and clearest.
        for &byte in bytes {
            self.a = (self.a + u32::from(byte)) % MOD_ADLER;
            self.b = (self.b + self.a) % MOD_ADLER;
        }
    }

    pub fn finish(&self) -> u32 {
        (self.b << 16) | self.a
    }
}

impl Default for Rolling {
    fn default() -> Self {
        Self::new()
    }
}
