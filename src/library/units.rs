//! Em units <-> engine integer units
//!
//! The atlas generator writes em-normalized floats; the engine stores glyph
//! and font metrics as integers scaled by `NEFONTMETRICS@scale`. All
//! conversions in either direction go through [`EngineScale`].

/// Scale used when a template does not declare one
pub const DEFAULT_ENGINE_SCALE: f64 = 1000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineScale(f64);

impl Default for EngineScale {
    fn default() -> Self {
        Self(DEFAULT_ENGINE_SCALE)
    }
}

impl EngineScale {
    /// `None` for non-finite or non-positive scales
    pub fn new(scale: f64) -> Option<Self> {
        (scale.is_finite() && scale > 0.0).then_some(Self(scale))
    }

    pub fn value(self) -> f64 {
        self.0
    }

    /// Em value to engine units, truncated toward zero like the engine's
    /// own exporter
    pub fn to_engine(self, em: f64) -> i64 {
        (em * self.0).trunc() as i64
    }

    pub fn to_em(self, engine: f64) -> f64 {
        engine / self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_engine_truncates_toward_zero() {
        let scale = EngineScale::default();
        assert_eq!(scale.to_engine(0.6), 600);
        assert_eq!(scale.to_engine(0.7119), 711);
        assert_eq!(scale.to_engine(-0.2509), -250);
    }

    #[test]
    fn test_rejects_degenerate_scales() {
        assert!(EngineScale::new(0.0).is_none());
        assert!(EngineScale::new(-1.0).is_none());
        assert!(EngineScale::new(f64::NAN).is_none());
        assert_eq!(EngineScale::new(2048.0).map(|s| s.to_em(1024.0)), Some(0.5));
    }
}
