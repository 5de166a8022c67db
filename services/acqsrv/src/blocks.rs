//! Contiguous read blocks

/// Registers per request; below the protocol limit of 125 on purpose
pub const MAX_REGISTERS_PER_READ: u16 = 100;

/// A `(start, count)` run of consecutive register addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollBlock {
    pub start: u16,
    pub count: u16,
}

impl PollBlock {
    pub fn new(start: u16, count: u16) -> Self {
        Self { start, count }
    }

    /// Split into requests of at most `max` registers
    pub fn chunks(self, max: u16) -> impl Iterator<Item = PollBlock> {
        let max = max.max(1);
        let end = u32::from(self.start) + u32::from(self.count);
        (u32::from(self.start)..end)
            .step_by(usize::from(max))
            .map(move |s| PollBlock {
                start: s as u16,
                count: (end - s).min(u32::from(max)) as u16,
            })
    }
}

/// Sort, de-duplicate and coalesce addresses into consecutive runs
pub fn build_blocks(addresses: &[u16]) -> Vec<PollBlock> {
    let mut sorted = addresses.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut blocks: Vec<PollBlock> = Vec::new();
    for address in sorted {
        match blocks.last_mut() {
            Some(block)
                if u32::from(block.start) + u32::from(block.count) == u32::from(address)
                    && block.count < u16::MAX =>
            {
                block.count += 1;
            },
            _ => blocks.push(PollBlock::new(address, 1)),
        }
    }
    blocks
}
