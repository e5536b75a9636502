//! Label and constant names, referenced by index so that uses may precede definitions.

use rustc_hash::FxHashMap;

use super::AsmError;

/// A handle to a name in a [SymbolTable].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolId(usize);

#[derive(Debug, Default)]
pub struct SymbolTable {
    names: Vec<String>,
    values: Vec<Option<i64>>,
    index: FxHashMap<String, SymbolId>,
    /// Defined symbols, in definition order.
    order: Vec<SymbolId>,
}

impl SymbolTable {
    /// Returns the handle for `name`, creating an undefined entry on first use.
    pub fn intern(&mut self, name: &str) -> SymbolId {
        if let Some(&id) = self.index.get(name) {
            return id;
        }
        let id = SymbolId(self.names.len());
        self.names.push(name.to_owned());
        self.values.push(None);
        self.index.insert(name.to_owned(), id);
        id
    }

    /// Binds `name` to `value`.
    ///
    /// # Errors
    ///
    /// This function will return an error if `name` was already defined.
    pub fn define(&mut self, name: &str, value: i64) -> Result<SymbolId, AsmError> {
        let id = self.intern(name);
        if self.values[id.0].is_some() {
            return Err(AsmError::DuplicateLabel(name.to_owned()));
        }
        self.values[id.0] = Some(value);
        self.order.push(id);
        Ok(id)
    }

    pub fn value(&self, id: SymbolId) -> Option<i64> {
        self.values[id.0]
    }

    pub fn name(&self, id: SymbolId) -> &str {
        &self.names[id.0]
    }

    /// Looks a value up by name, without interning it.
    pub fn get(&self, name: &str) -> Option<i64> {
        self.index.get(name).and_then(|&id| self.value(id))
    }

    /// Every defined symbol with its value, in definition order.
    pub fn defined(&self) -> impl Iterator<Item = (&str, i64)> + '_ {
        self.order
            .iter()
            .filter_map(|&id| Some((self.name(id), self.value(id)?)))
    }
}
