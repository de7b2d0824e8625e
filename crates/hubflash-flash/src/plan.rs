//! Splitting an image into Program packets

/// One Program packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packet<'a> {
    /// 1-based packet number
    pub number: usize,
    /// Flash address of the first byte
    pub address: u32,
    /// Bytes to write
    pub payload: &'a [u8],
    /// Image offset of the first byte
    pub start: usize,
    /// Poll the hub checksum after sending this packet
    pub poll_checksum: bool,
}

/// Iterator over the Program packets of an image
///
/// A checksum poll is scheduled after every `checksum_interval`th packet,
/// except when fewer than two packets follow it: the hub gets confused if a
/// checksum request arrives around the final packet.
#[derive(Debug, Clone)]
pub struct PacketPlan<'a> {
    data: &'a [u8],
    start_address: u32,
    chunk_size: usize,
    checksum_interval: usize,
    offset: usize,
    number: usize,
}

impl<'a> PacketPlan<'a> {
    /// Plan packets of at most `chunk_size` bytes starting at `start_address`
    pub fn new(data: &'a [u8], start_address: u32, chunk_size: usize, checksum_interval: u32) -> Self {
        Self {
            data,
            start_address,
            chunk_size: chunk_size.max(1),
            checksum_interval: (checksum_interval as usize).max(1),
            offset: 0,
            number: 0,
        }
    }

    /// Total number of packets
    pub fn packet_count(&self) -> usize {
        self.data.len().div_ceil(self.chunk_size)
    }
}

impl<'a> Iterator for PacketPlan<'a> {
    type Item = Packet<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.data.len() {
            return None;
        }

        let start = self.offset;
        let end = (start + self.chunk_size).min(self.data.len());
        self.offset = end;
        self.number += 1;

        let following = self.packet_count() - self.number;
        let poll_checksum = self.number % self.checksum_interval == 0 && following >= 2;

        Some(Packet {
            number: self.number,
            address: self.start_address.wrapping_add(start as u32),
            payload: &self.data[start..end],
            start,
            poll_checksum,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hubflash_core::checksum::{xor8, RunningXor};

    #[test]
    fn test_move_hub_v1_image() {
        let data = vec![0u8; 140];
        let packets: Vec<_> = PacketPlan::new(&data, 0x0800_5000, 14, 8).collect();
        assert_eq!(packets.len(), 10);
        assert_eq!(packets[0].address, 0x0800_5000);
        assert_eq!(packets[9].address, 0x0800_5000 + 126);
        assert!(packets.iter().all(|p| p.payload.len() == 14));

        let polls: Vec<usize> = packets.iter().filter(|p| p.poll_checksum).map(|p| p.number).collect();
        assert_eq!(polls, [8]);
        let starts: Vec<usize> = packets.iter().map(|p| p.start).collect();
        assert_eq!(starts, [0, 14, 28, 42, 56, 70, 84, 98, 112, 126]);
    }

    #[test]
    fn test_short_last_packet() {
        let data = vec![0u8; 68];
        let packets: Vec<_> = PacketPlan::new(&data, 0, 14, 8).collect();
        assert_eq!(packets.len(), 5);
        assert_eq!(packets[4].payload.len(), 12);
        assert_eq!(packets[4].start, 56);
        assert!(packets.iter().all(|p| !p.poll_checksum));
    }

    #[test]
    fn test_no_poll_next_to_final_packet() {
        for len in 1..400usize {
            let data = vec![0u8; len];
            for chunk in [1, 3, 14, 32] {
                for interval in [1u32, 2, 8] {
                    let plan = PacketPlan::new(&data, 0, chunk, interval);
                    let total = plan.packet_count();
                    for p in plan {
                        if p.poll_checksum {
                            assert!(p.number + 1 < total, "len {len} chunk {chunk} interval {interval}");
                            assert_eq!(p.number % interval as usize, 0);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_xor_of_packets_matches_image() {
        let data: Vec<u8> = (0..1000u32).map(|i| (i * 7 + 3) as u8).collect();
        for chunk in [1, 5, 14, 32] {
            for len in [1, 13, 14, 15, 999, 1000] {
                let mut acc = RunningXor::new();
                let mut covered = 0;
                for p in PacketPlan::new(&data[..len], 0, chunk, 8) {
                    acc.update(p.payload);
                    covered += p.payload.len();
                }
                assert_eq!(covered, len);
                assert_eq!(acc.value(), xor8(&data[..len]));
            }
        }
    }
}
