//! Interning pools shared by every worksheet of a workbook
//!
//! Both pools are append-only for the lifetime of a workbook. Entries that
//! no cell references any more are dropped when the package is written.

mod strings;
mod styles;

pub use strings::{SharedStringPool, StringId};
pub use styles::{StyleId, StylePool};

/// Compact renumbering of the handles a workbook actually uses, in pool
/// order. Built on save.
#[derive(Debug, Clone)]
pub(crate) struct Remap {
    slots: Vec<Option<u32>>,
    order: Vec<u32>,
}

impl Remap {
    /// `used` yields pool indices, `keep_first` forces index 0 to be kept
    pub(crate) fn build(len: usize, used: impl IntoIterator<Item = u32>, keep_first: bool) -> Self {
        let mut seen = vec![false; len];
        if keep_first && len > 0 {
            seen[0] = true;
        }
        for index in used {
            if let Some(slot) = seen.get_mut(index as usize) {
                *slot = true;
            }
        }
        let mut slots = vec![None; len];
        let mut order = Vec::new();
        for (index, used) in seen.into_iter().enumerate() {
            if used {
                slots[index] = Some(order.len() as u32);
                order.push(index as u32);
            }
        }
        Self { slots, order }
    }

    pub(crate) fn get(&self, index: u32) -> Option<u32> {
        self.slots.get(index as usize).copied().flatten()
    }

    /// Original pool indices in output order
    pub(crate) fn order(&self) -> &[u32] {
        &self.order
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remap_keeps_pool_order() {
        let remap = Remap::build(6, [4, 2, 4, 5], true);
        assert_eq!(remap.order(), &[0, 2, 4, 5]);
        assert_eq!(remap.get(0), Some(0));
        assert_eq!(remap.get(2), Some(1));
        assert_eq!(remap.get(4), Some(2));
        assert_eq!(remap.get(3), None);
    }
}
