/// Captured value of a surface's generation counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationToken(u64);

impl GenerationToken {
    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Per-surface generation counter. Every reset advances it; an async step
/// whose captured token no longer matches must drop its result untouched.
#[derive(Debug, Default)]
pub struct VersionGuard {
    current: u64,
}

impl VersionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token(&self) -> GenerationToken {
        GenerationToken(self.current)
    }

    /// Invalidate every outstanding token
    pub fn advance(&mut self) -> GenerationToken {
        self.current += 1;
        GenerationToken(self.current)
    }

    pub fn is_current(&self, token: GenerationToken) -> bool {
        token.0 == self.current
    }
}
