use crate::model::RichText;
use std::collections::HashMap;
use std::sync::Arc;

/// Handle into the [`SharedStringPool`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StringId(pub u32);

/// Value-interned text, shared by every cell holding equal content
#[derive(Debug, Clone, Default)]
pub struct SharedStringPool {
    entries: Vec<Arc<RichText>>,
    index: HashMap<Arc<RichText>, StringId>,
}

impl SharedStringPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the pooled copy of `text`, adding it when absent
    pub fn intern(&mut self, text: RichText) -> (StringId, Arc<RichText>) {
        if let Some(id) = self.index.get(&text) {
            return (*id, Arc::clone(&self.entries[id.0 as usize]));
        }
        self.push(Arc::new(text))
    }

    /// Like [`intern`](Self::intern) but reuses the caller's allocation
    pub fn intern_arc(&mut self, text: Arc<RichText>) -> (StringId, Arc<RichText>) {
        if let Some(id) = self.index.get(text.as_ref()) {
            return (*id, Arc::clone(&self.entries[id.0 as usize]));
        }
        self.push(text)
    }

    fn push(&mut self, text: Arc<RichText>) -> (StringId, Arc<RichText>) {
        let id = StringId(self.entries.len() as u32);
        self.entries.push(Arc::clone(&text));
        self.index.insert(Arc::clone(&text), id);
        (id, text)
    }

    pub fn get(&self, id: StringId) -> Option<&Arc<RichText>> {
        self.entries.get(id.0 as usize)
    }

    pub fn id_of(&self, text: &RichText) -> Option<StringId> {
        self.index.get(text).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (StringId, &Arc<RichText>)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, text)| (StringId(i as u32), text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interning_is_by_value() {
        let mut pool = SharedStringPool::new();
        let (a, first) = pool.intern(RichText::plain("Revenue"));
        let (b, second) = pool.intern(RichText::plain("Revenue"));
        let (c, _) = pool.intern(RichText::plain("Cost"));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.id_of(&RichText::plain("Cost")), Some(c));
    }
}
