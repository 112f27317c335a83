/// One contiguous byte range of a file, uploaded through its own URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Part {
    /// 1-based, contiguous across the plan.
    pub number: u32,
    pub offset: u64,
    pub len: u64,
}

/// Ordered part layout covering exactly `total_bytes`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartPlan {
    parts: Vec<Part>,
    total_bytes: u64,
}

impl PartPlan {
    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// Never true: an empty file still plans one zero-length part.
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn part(&self, number: u32) -> Option<&Part> {
        let idx = (number as usize).checked_sub(1)?;
        self.parts.get(idx)
    }
}

/// Split `size_bytes` into `max(1, ceil(size / part_size))` parts; every part is
/// `part_size` long except the last, which takes the remainder.
///
/// `part_size` must be non-zero; options validation rejects zero before a plan
/// is ever requested.
pub fn plan_parts(size_bytes: u64, part_size: u64) -> PartPlan {
    debug_assert!(part_size > 0, "part size must be positive");
    let part_size = part_size.max(1);
    let count = size_bytes.div_ceil(part_size).max(1);
    let mut parts = Vec::with_capacity(count as usize);
    for i in 0..count {
        let offset = i * part_size;
        let len = if i + 1 == count {
            size_bytes - offset
        } else {
            part_size
        };
        parts.push(Part { number: (i + 1) as u32, offset, len });
    }
    PartPlan { parts, total_bytes: size_bytes }
}
