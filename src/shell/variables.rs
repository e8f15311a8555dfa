use parking_lot::Mutex;

use super::ShellError;

/// Fixed-capacity table of shell variables, each holding up to five words
pub struct VariableStore {
    capacity: usize,
    entries: Mutex<Vec<(String, Vec<String>)>>,
}

impl VariableStore {
    pub fn new(capacity: usize) -> Self {
        VariableStore {
            capacity,
            entries: Mutex::new(Vec::with_capacity(capacity)),
        }
    }

    /// Assign `values` to `name`, replacing whatever it held before
    pub fn set(&self, name: &str, values: Vec<String>) -> Result<(), ShellError> {
        let mut entries = self.entries.lock();
        if let Some((_, old)) = entries.iter_mut().find(|(var, _)| var == name) {
            *old = values;
            return Ok(());
        }
        if entries.len() >= self.capacity {
            return Err(ShellError::VariableStoreFull);
        }
        entries.push((name.to_string(), values));
        Ok(())
    }

    /// The variable's words joined by single spaces
    pub fn get(&self, name: &str) -> Option<String> {
        self.entries
            .lock()
            .iter()
            .find(|(var, _)| var == name)
            .map(|(_, values)| values.join(" "))
    }
}
