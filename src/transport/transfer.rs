//! Buffer-to-link serialization
//!
//! Each committed 16-bit sample goes on the wire in little-endian byte
//! order. The framing differs per transport: SPI pushes the whole block in
//! one bulk write, UART writes one byte pair per sample, and the two-wire
//! bus writes one byte per transaction. In every case a successful transfer
//! reports exactly `cursor * 2` bytes.

use tracing::{debug, trace};

use crate::node::buffer::SampleBuffer;
use crate::runtime::errors::TransferError;

use super::{Transport, TransportKind};

/// Serialize the buffer's committed prefix onto the link.
///
/// Returns the total byte count written. A link reporting partial
/// completion surfaces [`TransferError::Incomplete`]; no retry happens at
/// this layer.
pub fn transfer(buffer: &SampleBuffer, link: &mut dyn Transport) -> Result<usize, TransferError> {
    let samples = buffer.committed();
    let expected = samples.len() * 2;

    let written = match link.kind() {
        TransportKind::Spi => {
            let mut wire = Vec::with_capacity(expected);
            for sample in samples {
                wire.extend_from_slice(&sample.to_le_bytes());
            }
            link.write_bytes(&wire)?
        }
        TransportKind::Uart => {
            let mut written = 0;
            for sample in samples {
                let n = link.write_bytes(&sample.to_le_bytes())?;
                written += n;
                if n < 2 {
                    break;
                }
            }
            written
        }
        TransportKind::I2c => {
            let mut written = 0;
            'block: for sample in samples {
                for byte in sample.to_le_bytes() {
                    let n = link.write_bytes(&[byte])?;
                    written += n;
                    if n < 1 {
                        break 'block;
                    }
                }
            }
            written
        }
    };

    trace!(kind = %link.kind(), written, expected, "transfer finished");
    if written != expected {
        debug!(written, expected, "link reported partial completion");
        return Err(TransferError::Incomplete { written, expected });
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::errors::TransportError;

    /// Link double that records every write and can cap total throughput.
    struct RecordingLink {
        kind: TransportKind,
        writes: Vec<Vec<u8>>,
        accept_limit: Option<usize>,
        taken: usize,
    }

    impl RecordingLink {
        fn new(kind: TransportKind) -> Self {
            Self {
                kind,
                writes: Vec::new(),
                accept_limit: None,
                taken: 0,
            }
        }

        fn with_limit(kind: TransportKind, limit: usize) -> Self {
            Self {
                accept_limit: Some(limit),
                ..Self::new(kind)
            }
        }

        fn bytes(&self) -> Vec<u8> {
            self.writes.concat()
        }
    }

    impl Transport for RecordingLink {
        fn kind(&self) -> TransportKind {
            self.kind
        }

        fn write_bytes(&mut self, bytes: &[u8]) -> Result<usize, TransportError> {
            let room = self
                .accept_limit
                .map_or(bytes.len(), |limit| limit.saturating_sub(self.taken));
            let n = bytes.len().min(room);
            self.writes.push(bytes[..n].to_vec());
            self.taken += n;
            Ok(n)
        }
    }

    fn filled_buffer(values: &[u16]) -> SampleBuffer {
        let mut buf = SampleBuffer::new(values.len(), false);
        for v in values {
            buf.push(*v, 0);
        }
        buf
    }

    fn regroup_le(bytes: &[u8]) -> Vec<u16> {
        bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect()
    }

    #[test]
    fn spi_is_one_bulk_write_in_little_endian() {
        let buf = filled_buffer(&[0x0A0B, 0x1122]);
        let mut link = RecordingLink::new(TransportKind::Spi);
        assert_eq!(transfer(&buf, &mut link).unwrap(), 4);
        assert_eq!(link.writes.len(), 1);
        assert_eq!(link.bytes(), vec![0x0B, 0x0A, 0x22, 0x11]);
    }

    #[test]
    fn uart_writes_one_byte_pair_per_sample() {
        let buf = filled_buffer(&[1, 2, 3]);
        let mut link = RecordingLink::new(TransportKind::Uart);
        assert_eq!(transfer(&buf, &mut link).unwrap(), 6);
        assert_eq!(link.writes.len(), 3);
        assert_eq!(regroup_le(&link.bytes()), vec![1, 2, 3]);
    }

    #[test]
    fn i2c_writes_one_byte_per_transaction() {
        let buf = filled_buffer(&[0x0102]);
        let mut link = RecordingLink::new(TransportKind::I2c);
        assert_eq!(transfer(&buf, &mut link).unwrap(), 2);
        assert_eq!(link.writes, vec![vec![0x02], vec![0x01]]);
    }

    #[test]
    fn round_trip_recovers_committed_samples() {
        let values = [10u16, 11, 12, 13, 14, 15, 16, 17];
        let buf = filled_buffer(&values);
        for kind in [TransportKind::Spi, TransportKind::Uart, TransportKind::I2c] {
            let mut link = RecordingLink::new(kind);
            let written = transfer(&buf, &mut link).unwrap();
            assert_eq!(written, buf.cursor() * 2);
            assert_eq!(regroup_le(&link.bytes()), values);
        }
    }

    #[test]
    fn partial_completion_surfaces_incomplete() {
        let buf = filled_buffer(&[1, 2, 3, 4]);
        let mut link = RecordingLink::with_limit(TransportKind::Uart, 5);
        let err = transfer(&buf, &mut link).unwrap_err();
        assert!(matches!(
            err,
            TransferError::Incomplete {
                written: 5,
                expected: 8
            }
        ));
    }

    #[test]
    fn empty_committed_prefix_transfers_zero_bytes() {
        let buf = SampleBuffer::new(4, false);
        let mut link = RecordingLink::new(TransportKind::Spi);
        assert_eq!(transfer(&buf, &mut link).unwrap(), 0);
    }
}
