use libc::c_uint;
use rsmpeg::avcodec::AVPacket;

use crate::flags::AvPacketFlags;
use crate::rational::Rational;
use crate::time::Ticks;

/// A compressed unit read from the demuxer, owned by exactly one component
/// queue until it is decoded.
///
/// A packet without native payload is a drain marker: pushing it into a codec
/// switches that codec to draining mode.
#[derive(Debug)]
pub struct Packet {
    inner: Option<AVPacket>,
    time_base: Rational,
    stream_index: usize,
}

impl Packet {
    /// Wrap a packet freshly read from the demuxer.
    pub(crate) fn from_native(inner: AVPacket, time_base: Rational) -> Self {
        let stream_index = inner.stream_index as usize;
        Self {
            inner: Some(inner),
            time_base,
            stream_index,
        }
    }

    /// Create the null packet that asks a codec to drain.
    pub(crate) fn drain(stream_index: usize, time_base: Rational) -> Self {
        Self {
            inner: None,
            time_base,
            stream_index,
        }
    }

    #[inline]
    pub fn is_drain(&self) -> bool {
        self.inner.is_none()
    }

    #[inline]
    pub fn stream_index(&self) -> usize {
        self.stream_index
    }

    #[inline]
    pub fn time_base(&self) -> Rational {
        self.time_base
    }

    /// Payload size in bytes; zero for drain packets.
    pub fn size(&self) -> usize {
        self.inner
            .as_ref()
            .map(|packet| packet.size.max(0) as usize)
            .unwrap_or(0)
    }

    /// Packet duration on the tick scale; zero when the demuxer did not set it.
    pub fn duration(&self) -> Ticks {
        self.inner
            .as_ref()
            .map(|packet| Ticks::from_stream_units(packet.duration, self.time_base))
            .unwrap_or(Ticks::ZERO)
    }

    /// Presentation timestamp on the tick scale, when known.
    pub fn pts(&self) -> Option<Ticks> {
        let packet = self.inner.as_ref()?;
        if packet.pts == rsmpeg::ffi::AV_NOPTS_VALUE {
            None
        } else {
            Some(Ticks::from_stream_units(packet.pts, self.time_base))
        }
    }

    pub fn flags(&self) -> AvPacketFlags {
        self.inner
            .as_ref()
            .map(|packet| AvPacketFlags::from_bits_truncate(packet.flags as c_uint))
            .unwrap_or(AvPacketFlags::empty())
    }

    #[inline]
    pub fn is_key(&self) -> bool {
        self.flags().contains(AvPacketFlags::KEY)
    }

    /// Borrow the native packet for a send call; `None` for drain packets.
    pub(crate) fn as_native(&self) -> Option<&AVPacket> {
        self.inner.as_ref()
    }
}

unsafe impl Send for Packet {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_packet_has_no_payload() {
        let packet = Packet::drain(2, Rational::new(1, 1000));
        assert!(packet.is_drain());
        assert_eq!(packet.stream_index(), 2);
        assert_eq!(packet.size(), 0);
        assert_eq!(packet.duration(), Ticks::ZERO);
        assert!(packet.pts().is_none());
        assert!(packet.as_native().is_none());
    }
}
