use std::collections::VecDeque;

use crate::frame::Frame;
use crate::packet::Packet;
use crate::time::Ticks;

/// FIFO of compressed packets awaiting decode, with running totals so the
/// reader can apply back-pressure without walking the queue.
#[derive(Debug, Default)]
pub struct PacketQueue {
    packets: VecDeque<Packet>,
    buffer_length: usize,
    duration: Ticks,
}

impl PacketQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, packet: Packet) {
        self.buffer_length += packet.size();
        self.duration += packet.duration();
        self.packets.push_back(packet);
    }

    pub fn pop(&mut self) -> Option<Packet> {
        let packet = self.packets.pop_front()?;
        self.buffer_length -= packet.size();
        self.duration -= packet.duration();
        Some(packet)
    }

    pub fn clear(&mut self) {
        self.packets.clear();
        self.buffer_length = 0;
        self.duration = Ticks::ZERO;
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.packets.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Sum of the payload sizes of all queued packets, in bytes.
    #[inline]
    pub fn buffer_length(&self) -> usize {
        self.buffer_length
    }

    /// Sum of the durations of all queued packets.
    #[inline]
    pub fn duration(&self) -> Ticks {
        self.duration
    }
}

/// FIFO of decoded frames between the decoder and the block materialiser.
#[derive(Debug, Default)]
pub struct FrameQueue {
    frames: VecDeque<Frame>,
}

impl FrameQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, frame: Frame) {
        self.frames.push_back(frame);
    }

    pub fn pop(&mut self) -> Option<Frame> {
        self.frames.pop_front()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Start time of the frame at the queue head.
    pub fn peek_start_time(&self) -> Option<Ticks> {
        self.frames.front().map(Frame::start_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rational::Rational;

    fn drain(stream_index: usize) -> Packet {
        Packet::drain(stream_index, Rational::new(1, 1000))
    }

    #[test]
    fn totals_track_contents() {
        let mut queue = PacketQueue::new();
        assert_eq!(queue.buffer_length(), 0);
        assert_eq!(queue.duration(), Ticks::ZERO);

        queue.push(drain(0));
        queue.push(drain(0));
        assert_eq!(queue.len(), 2);
        // Drain packets are weightless but still occupy a slot.
        assert_eq!(queue.buffer_length(), 0);

        queue.pop().unwrap();
        assert_eq!(queue.len(), 1);

        queue.clear();
        assert_eq!(queue.len(), 0);
        assert_eq!(queue.buffer_length(), 0);
        assert_eq!(queue.duration(), Ticks::ZERO);
    }
}
