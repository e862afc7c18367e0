use smol_str::{SmolStr, format_smolstr};

/// Session-scoped request id counter.
///
/// Ids are `{prefix}{n}` with `n` starting at 1. Each session owns its own
/// generator, so two sessions never share a sequence.
#[derive(Debug, Clone)]
pub struct RequestIdGenerator {
    prefix: SmolStr,
    next: u64,
}

impl RequestIdGenerator {
    pub fn new(prefix: impl Into<SmolStr>) -> Self {
        Self {
            prefix: prefix.into(),
            next: 1,
        }
    }

    /// Mint the next id.
    pub fn next_id(&mut self) -> SmolStr {
        let id = format_smolstr!("{}{}", self.prefix, self.next);
        self.next += 1;
        id
    }
}
