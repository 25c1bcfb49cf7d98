//! Decode options.

/// Options controlling a decode session.
#[derive(Debug, Clone)]
pub struct DecodeOptions {
    /// Decompile every formula definition cluster when finishing
    pub decompile_formulas: bool,
    /// Upper bound on resolver visits per session
    pub max_work_items: usize,
    /// Hex-dump (trace log) zones visited with no role
    pub dump_unknown_zones: bool,
    /// Attach the flat bytecode listing to formula failure diagnostics
    pub debug_formulas: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            decompile_formulas: true,
            max_work_items: 65_536,
            dump_unknown_zones: false,
            debug_formulas: false,
        }
    }
}

impl DecodeOptions {
    /// Create new options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_decompile_formulas(mut self, enabled: bool) -> Self {
        self.decompile_formulas = enabled;
        self
    }

    pub fn with_max_work_items(mut self, limit: usize) -> Self {
        self.max_work_items = limit;
        self
    }

    pub fn with_dump_unknown_zones(mut self, enabled: bool) -> Self {
        self.dump_unknown_zones = enabled;
        self
    }

    pub fn with_debug_formulas(mut self, enabled: bool) -> Self {
        self.debug_formulas = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let options = DecodeOptions::new().with_max_work_items(8).with_debug_formulas(true);
        assert_eq!(options.max_work_items, 8);
        assert!(options.debug_formulas);
        assert!(options.decompile_formulas);
        assert!(!options.dump_unknown_zones);
    }
}
