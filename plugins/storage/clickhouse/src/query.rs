/// Value bound to one positional `?` placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    Text(String),
    Blob(Vec<u8>),
}

/// Parameterized backend statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub text: String,
    pub bindings: Vec<Binding>,
}

impl Statement {
    pub fn new(text: impl Into<String>, bindings: Vec<Binding>) -> Self {
        Self {
            text: text.into(),
            bindings,
        }
    }
}

/// Statement shapes of a key/value table. Swapping the builder swaps the
/// schema without touching the store.
///
/// `select` statements must return rows with `key` and `value` columns.
pub trait QueryBuilder: Send + Sync {
    fn select(&self, keys: &[String]) -> Statement;
    fn insert(&self, key: &str, value: &[u8]) -> Statement;
    fn delete(&self, key: &str) -> Statement;
}

/// `"?, ?, ?"` for `n` placeholders.
pub fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_list() {
        assert_eq!(placeholders(0), "");
        assert_eq!(placeholders(1), "?");
        assert_eq!(placeholders(3), "?, ?, ?");
    }
}
