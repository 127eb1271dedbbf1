use crate::game::types::Point;
use crate::protocol::seq_newer_than;
use std::collections::VecDeque;

pub const COMMAND_BUFFER_CAPACITY: usize = 128;

/// One locally issued steering input, immutable once enqueued. `target_axis`
/// is `None` when the input changed nothing but the boost flag.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictionCommand {
    pub seq: u16,
    pub sent_at: i64,
    pub target_axis: Option<Point>,
    pub boost: bool,
}

/// Bounded FIFO of pending inputs, ordered by enqueue and keyed by wrapping
/// 16-bit sequence numbers. All accessors hand out copies; the replay path
/// never mutates the buffer it reads from.
#[derive(Debug)]
pub struct CommandBuffer {
    commands: VecDeque<PredictionCommand>,
    capacity: usize,
    overflow_dropped: u64,
}

impl CommandBuffer {
    pub fn new() -> Self {
        Self::with_capacity(COMMAND_BUFFER_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            commands: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
            overflow_dropped: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Total commands ever evicted by overflow.
    pub fn overflow_dropped(&self) -> u64 {
        self.overflow_dropped
    }

    /// Appends a command, evicting from the front on overflow. Returns how
    /// many commands this call dropped.
    pub fn enqueue(&mut self, command: PredictionCommand) -> usize {
        self.commands.push_back(command);
        let mut dropped = 0usize;
        while self.commands.len() > self.capacity {
            self.commands.pop_front();
            dropped += 1;
        }
        self.overflow_dropped += dropped as u64;
        dropped
    }

    /// Drops commands at-or-before the server's acknowledged sequence. The
    /// buffer is sequence-ordered, so only the front needs inspecting.
    pub fn prune_acked(&mut self, ack_seq: u16) {
        while let Some(front) = self.commands.front() {
            if seq_newer_than(front.seq, ack_seq) {
                break;
            }
            self.commands.pop_front();
        }
    }

    /// Copies of every command strictly newer than `ack_seq`, in enqueue
    /// order, for replay on top of an acknowledged base.
    pub fn pending_after_ack(&self, ack_seq: u16) -> Vec<PredictionCommand> {
        self.commands
            .iter()
            .copied()
            .filter(|command| seq_newer_than(command.seq, ack_seq))
            .collect()
    }

    /// Copies of every buffered command (nothing acknowledged yet).
    pub fn pending_all(&self) -> Vec<PredictionCommand> {
        self.commands.iter().copied().collect()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
        self.overflow_dropped = 0;
    }
}

impl Default for CommandBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(seq: u16) -> PredictionCommand {
        PredictionCommand {
            seq,
            sent_at: seq as i64 * 50,
            target_axis: None,
            boost: false,
        }
    }

    #[test]
    fn overflow_drops_oldest_and_reports_count() {
        let mut buffer = CommandBuffer::new();
        let mut reported = 0usize;
        for seq in 0..200u16 {
            reported += buffer.enqueue(command(seq));
        }
        assert_eq!(reported, 72);
        assert_eq!(buffer.overflow_dropped(), 72);
        assert_eq!(buffer.len(), COMMAND_BUFFER_CAPACITY);
        let pending = buffer.pending_all();
        assert_eq!(pending.first().map(|c| c.seq), Some(72));
        assert_eq!(pending.last().map(|c| c.seq), Some(199));
    }

    #[test]
    fn pending_after_ack_respects_modular_ordering() {
        let mut buffer = CommandBuffer::new();
        for seq in [0xfffd_u16, 0xfffe, 0xffff, 0, 1, 2] {
            buffer.enqueue(command(seq));
        }
        let pending = buffer.pending_after_ack(0xfffe);
        let seqs: Vec<u16> = pending.iter().map(|c| c.seq).collect();
        assert_eq!(seqs, vec![0xffff, 0, 1, 2]);
    }

    #[test]
    fn prune_acked_removes_from_the_front_only() {
        let mut buffer = CommandBuffer::new();
        for seq in 10..20u16 {
            buffer.enqueue(command(seq));
        }
        buffer.prune_acked(14);
        assert_eq!(buffer.len(), 5);
        assert_eq!(buffer.pending_all().first().map(|c| c.seq), Some(15));
        // Acking something older than everything is a no-op.
        buffer.prune_acked(14);
        assert_eq!(buffer.len(), 5);
        // Acking past the end empties the buffer.
        buffer.prune_acked(30);
        assert!(buffer.is_empty());
    }

    #[test]
    fn accessors_return_copies() {
        let mut buffer = CommandBuffer::new();
        buffer.enqueue(command(1));
        let mut pending = buffer.pending_all();
        pending[0].seq = 99;
        assert_eq!(buffer.pending_all()[0].seq, 1);
    }
}
