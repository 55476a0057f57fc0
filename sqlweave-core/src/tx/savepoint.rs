//! Savepoint names held by NESTED frames

/// LIFO stack of savepoint identifiers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SavepointStack {
    points: Vec<String>,
}

impl SavepointStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Savepoint name for a frame pushed at `depth`
    pub fn name_for(depth: usize) -> String {
        format!("p{depth}")
    }

    pub fn push(&mut self, name: String) {
        self.points.push(name);
    }

    pub fn pop(&mut self) -> Option<String> {
        self.points.pop()
    }

    pub fn last(&self) -> Option<&str> {
        self.points.last().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifo_order() {
        let mut stack = SavepointStack::new();
        stack.push(SavepointStack::name_for(1));
        stack.push(SavepointStack::name_for(2));
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.last(), Some("p2"));
        assert_eq!(stack.pop().as_deref(), Some("p2"));
        assert_eq!(stack.pop().as_deref(), Some("p1"));
        assert!(stack.pop().is_none());
        assert!(stack.is_empty());
    }
}
