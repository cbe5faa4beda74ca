//! Tensor arena: one pre-sized allocation, partitioned once.
//!
//! The arena is sub-divided at `initialize` time into named regions
//! with fixed offsets: the int8 input tensor, two ping-pong scratch
//! regions for intermediate layer outputs, and the f32 output vector.
//! `ArenaTooSmall` is raised before any view is handed out, and no
//! region is ever resized or reallocated afterwards. Layer code
//! borrows bounds-checked slices; there is no pointer arithmetic.

use crate::error::WakeError;

/// Named sub-buffers of the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferId {
    Input,
    ScratchA,
    ScratchB,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub offset: usize,
    pub len: usize,
}

/// Byte layout computed from declared tensor shapes before any
/// allocation happens. The int8 regions are laid out contiguously
/// (input, scratch A, scratch B); the f32 output vector is accounted
/// against the same byte budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaPlan {
    input: Region,
    scratch_a: Region,
    scratch_b: Region,
    output_len: usize,
}

impl ArenaPlan {
    #[must_use]
    pub fn new(input_len: usize, scratch_len: usize, output_len: usize) -> Self {
        let input = Region {
            offset: 0,
            len: input_len,
        };
        let scratch_a = Region {
            offset: input_len,
            len: scratch_len,
        };
        let scratch_b = Region {
            offset: input_len + scratch_len,
            len: scratch_len,
        };
        Self {
            input,
            scratch_a,
            scratch_b,
            output_len,
        }
    }

    #[must_use]
    pub fn region(&self, id: BufferId) -> Region {
        match id {
            BufferId::Input => self.input,
            BufferId::ScratchA => self.scratch_a,
            BufferId::ScratchB => self.scratch_b,
        }
    }

    #[must_use]
    pub fn int8_len(&self) -> usize {
        self.input.len + self.scratch_a.len + self.scratch_b.len
    }

    #[must_use]
    pub fn output_len(&self) -> usize {
        self.output_len
    }

    /// Total bytes the arena needs: int8 regions plus the f32 output.
    #[must_use]
    pub fn required_bytes(&self) -> usize {
        self.int8_len() + self.output_len * std::mem::size_of::<f32>()
    }
}

#[derive(Debug)]
pub struct TensorArena {
    data: Vec<i8>,
    output: Vec<f32>,
    plan: ArenaPlan,
}

impl TensorArena {
    /// Allocate and zero the arena. Fails with `ArenaTooSmall` before
    /// anything is allocated if `total_bytes` cannot hold the plan.
    pub fn initialize(total_bytes: usize, plan: ArenaPlan) -> Result<Self, WakeError> {
        let required = plan.required_bytes();
        if required > total_bytes {
            return Err(WakeError::ArenaTooSmall {
                required,
                available: total_bytes,
            });
        }
        Ok(Self {
            data: vec![0i8; plan.int8_len()],
            output: vec![0.0f32; plan.output_len],
            plan,
        })
    }

    #[must_use]
    pub fn plan(&self) -> &ArenaPlan {
        &self.plan
    }

    /// Re-zero every region without reallocating. Idempotent.
    pub fn reset(&mut self) {
        self.data.fill(0);
        self.output.fill(0.0);
    }

    #[must_use]
    pub fn region(&self, id: BufferId) -> &[i8] {
        let r = self.plan.region(id);
        &self.data[r.offset..r.offset + r.len]
    }

    pub fn region_mut(&mut self, id: BufferId) -> &mut [i8] {
        let r = self.plan.region(id);
        &mut self.data[r.offset..r.offset + r.len]
    }

    /// Borrow one region read-only and another mutably for a layer's
    /// input/output pair. Panics if `src == dst`; layers never operate
    /// in place.
    pub fn rw_pair(&mut self, src: BufferId, dst: BufferId) -> (&[i8], &mut [i8]) {
        assert!(src != dst, "layer input and output must be distinct regions");
        let src_r = self.plan.region(src);
        let dst_r = self.plan.region(dst);
        if src_r.offset < dst_r.offset {
            let (left, right) = self.data.split_at_mut(dst_r.offset);
            (
                &left[src_r.offset..src_r.offset + src_r.len],
                &mut right[..dst_r.len],
            )
        } else {
            let (left, right) = self.data.split_at_mut(src_r.offset);
            (
                &right[..src_r.len],
                &mut left[dst_r.offset..dst_r.offset + dst_r.len],
            )
        }
    }

    #[must_use]
    pub fn output(&self) -> &[f32] {
        &self.output
    }

    /// Borrow a scratch region and the f32 output together (dense layer).
    pub fn region_and_output_mut(&mut self, src: BufferId) -> (&[i8], &mut [f32]) {
        let r = self.plan.region(src);
        (&self.data[r.offset..r.offset + r.len], &mut self.output)
    }

    pub fn output_mut(&mut self) -> &mut [f32] {
        &mut self.output
    }
}

#[cfg(test)]
mod tests {
    use super::{ArenaPlan, BufferId, TensorArena};
    use crate::error::WakeError;

    fn plan() -> ArenaPlan {
        ArenaPlan::new(650, 8064, 3)
    }

    #[test]
    fn exact_budget_initializes_one_byte_short_fails() {
        let required = plan().required_bytes();
        assert_eq!(required, 650 + 2 * 8064 + 3 * 4);

        assert!(TensorArena::initialize(required, plan()).is_ok());
        let err = TensorArena::initialize(required - 1, plan()).unwrap_err();
        assert_eq!(
            err,
            WakeError::ArenaTooSmall {
                required,
                available: required - 1
            }
        );
    }

    #[test]
    fn regions_are_zeroed_and_reset_is_idempotent() {
        let mut arena = TensorArena::initialize(plan().required_bytes(), plan()).expect("init");
        assert!(arena.region(BufferId::Input).iter().all(|&v| v == 0));

        arena.region_mut(BufferId::ScratchA)[0] = 7;
        arena.output_mut()[1] = 3.5;
        arena.reset();
        assert_eq!(arena.region(BufferId::ScratchA)[0], 0);
        assert_eq!(arena.output()[1], 0.0);
        arena.reset();
        assert_eq!(arena.region(BufferId::ScratchA)[0], 0);
    }

    #[test]
    fn rw_pair_borrows_disjoint_regions_both_orders() {
        let mut arena = TensorArena::initialize(plan().required_bytes(), plan()).expect("init");
        arena.region_mut(BufferId::Input)[0] = 11;
        {
            let (src, dst) = arena.rw_pair(BufferId::Input, BufferId::ScratchB);
            assert_eq!(src[0], 11);
            dst[0] = 22;
        }
        {
            let (src, dst) = arena.rw_pair(BufferId::ScratchB, BufferId::ScratchA);
            assert_eq!(src[0], 22);
            dst[0] = 33;
        }
        assert_eq!(arena.region(BufferId::ScratchA)[0], 33);
    }

    #[test]
    #[should_panic(expected = "distinct regions")]
    fn rw_pair_rejects_aliasing() {
        let mut arena = TensorArena::initialize(plan().required_bytes(), plan()).expect("init");
        let _ = arena.rw_pair(BufferId::ScratchA, BufferId::ScratchA);
    }
}
