use crate::model::Style;
use std::collections::HashMap;
use std::sync::Arc;

/// Handle into the [`StylePool`]; `StyleId::DEFAULT` is the workbook default
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct StyleId(pub u32);

impl StyleId {
    pub const DEFAULT: StyleId = StyleId(0);
}

/// Arena of immutable style records, deduplicated by value
#[derive(Debug, Clone)]
pub struct StylePool {
    entries: Vec<Arc<Style>>,
    index: HashMap<Arc<Style>, StyleId>,
}

impl Default for StylePool {
    fn default() -> Self {
        Self::new(Style::default())
    }
}

impl StylePool {
    /// Pool whose entry 0 is `default`
    pub fn new(default: Style) -> Self {
        let mut pool = Self {
            entries: Vec::new(),
            index: HashMap::new(),
        };
        pool.intern(default);
        pool
    }

    pub fn intern(&mut self, style: Style) -> StyleId {
        if let Some(id) = self.index.get(&style) {
            return *id;
        }
        let id = StyleId(self.entries.len() as u32);
        let style = Arc::new(style);
        self.entries.push(Arc::clone(&style));
        self.index.insert(style, id);
        id
    }

    /// Resolve a handle; unknown handles resolve to the default record
    pub fn get(&self, id: StyleId) -> &Arc<Style> {
        self.entries
            .get(id.0 as usize)
            .unwrap_or(&self.entries[0])
    }

    pub fn default_style(&self) -> &Arc<Style> {
        &self.entries[0]
    }

    /// Copy-on-write edit: the record behind `id` is left untouched
    pub fn derive(&mut self, id: StyleId, edit: impl FnOnce(&mut Style)) -> StyleId {
        let mut style = Style::clone(self.get(id));
        edit(&mut style);
        self.intern(style)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (StyleId, &Arc<Style>)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, style)| (StyleId(i as u32), style))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Font;

    #[test]
    fn test_default_is_entry_zero() {
        let pool = StylePool::default();
        assert_eq!(pool.len(), 1);
        assert_eq!(**pool.get(StyleId::DEFAULT), Style::default());
        assert_eq!(**pool.get(StyleId(99)), Style::default());
    }

    #[test]
    fn test_derive_is_copy_on_write() {
        let mut pool = StylePool::default();
        let bold = pool.derive(StyleId::DEFAULT, |s| s.font.bold = true);
        assert_ne!(bold, StyleId::DEFAULT);
        assert!(!pool.get(StyleId::DEFAULT).font.bold);
        let again = pool.intern(Style::with_font(Font::default().bold()));
        assert_eq!(bold, again);
        assert_eq!(pool.len(), 2);
    }
}
