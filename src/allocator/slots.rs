use std::collections::HashMap;

pub const DEFAULT_MAX_SLOTS: usize = 10;

#[derive(Debug, Clone, Default)]
pub struct SlotPolicy {
    overrides: HashMap<String, usize>,
}

impl SlotPolicy {
    pub fn new(overrides: HashMap<String, usize>) -> Self {
        Self { overrides }
    }

    pub fn from_spec(spec: &str) -> Self {
        let mut overrides = HashMap::new();
        for entry in spec.split(',') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            let Some((category, limit)) = entry.split_once(':') else {
                continue;
            };
            if let Ok(limit) = limit.trim().parse::<usize>() {
                if limit > 0 {
                    overrides.insert(category.trim().to_string(), limit);
                }
            }
        }
        Self { overrides }
    }

    pub fn max_slots(&self, category: &str) -> usize {
        self.overrides
            .get(category)
            .copied()
            .unwrap_or(DEFAULT_MAX_SLOTS)
    }
}
