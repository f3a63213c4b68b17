/// Generator polynomial of CRC-8/DVB-S2.
const POLYNOMIAL: u8 = 0xd5;

/// Remainder of every byte value, computed at compile time.
const TABLE: [u8; 256] = {
    let mut table = [0u8; 256];
    let mut byte = 0;
    while byte < table.len() {
        let mut remainder = byte as u8;
        let mut bit = 0;
        while bit < 8 {
            remainder = if remainder & 0x80 == 0 {
                remainder << 1
            } else {
                (remainder << 1) ^ POLYNOMIAL
            };
            bit += 1;
        }
        table[byte] = remainder;
        byte += 1;
    }
    table
};

/// Table driven CRC-8. The digest can be continued across several calls to
/// [`Crc8::update`], which is how a checksum over a sequence of records is
/// built.
#[derive(Debug, Clone, Copy, Default)]
pub struct Crc8 {
    digest: u8,
}

impl Crc8 {
    pub const fn new() -> Self {
        Crc8 { digest: 0 }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.digest = data
            .iter()
            .fold(self.digest, |digest, byte| TABLE[(digest ^ byte) as usize]);
    }

    pub fn checksum(&self) -> u8 {
        self.digest
    }
}
