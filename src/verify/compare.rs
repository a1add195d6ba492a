//! Coordinate comparison
//!
//! The original set is mapped onto the generated set's frame with a
//! rotation-free affine: a vertical translation that lines up the baselines
//! and, optionally, a uniform scale about the baseline that matches the
//! ascender-to-descender extents. Deltas are always `new - transform(old)`.

use super::{CoordinateRecord, CoordinateSet, Origin};
use kurbo::{Affine, Point, Vec2};
use serde::Serialize;
use std::collections::HashSet;

/// Differences at or below this are treated as equal
pub const VERTEX_TOLERANCE: f64 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct AlignmentOptions {
    pub baseline: bool,
    pub scale: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AppliedTransform {
    pub translation: f64,
    pub scale: f64,
    pub affine: [f64; 6],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Presence {
    OnlyInOld,
    OnlyInNew,
    InBoth,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VertexMismatch {
    pub index: usize,
    pub position_delta: f64,
    pub uv_delta: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CharacterDelta {
    pub character: char,
    pub codepoint: u32,
    pub presence: Presence,
    pub position: Option<Vec2>,
    pub uv_min: Option<Vec2>,
    pub uv_max: Option<Vec2>,
    pub advance: Option<f64>,
    /// Old and new vertex counts, when they differ
    pub vertex_counts: Option<(usize, usize)>,
    pub mismatches: Vec<VertexMismatch>,
}

impl CharacterDelta {
    fn unpaired(record: &CoordinateRecord, presence: Presence) -> Self {
        Self {
            character: record.character,
            codepoint: record.character as u32,
            presence,
            position: None,
            uv_min: None,
            uv_max: None,
            advance: None,
            vertex_counts: None,
            mismatches: Vec::new(),
        }
    }

    /// Both sides present and every difference within tolerance
    pub fn matches(&self) -> bool {
        let small = |v: Option<Vec2>| v.map_or(true, |v| v.x.abs() <= VERTEX_TOLERANCE && v.y.abs() <= VERTEX_TOLERANCE);
        self.presence == Presence::InBoth
            && small(self.position)
            && small(self.uv_min)
            && small(self.uv_max)
            && self.advance.map_or(true, |a| a.abs() <= VERTEX_TOLERANCE)
            && self.vertex_counts.is_none()
            && self.mismatches.is_empty()
    }
}

/// A render node whose quad could not be read back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UndecodedGlyph {
    pub origin: Origin,
    pub character: char,
    pub codepoint: u32,
}

impl UndecodedGlyph {
    pub fn new(origin: Origin, character: char) -> Self {
        Self {
            origin,
            character,
            codepoint: character as u32,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonReport {
    pub options: AlignmentOptions,
    pub transform: AppliedTransform,
    pub deltas: Vec<CharacterDelta>,
    /// Characters left out of `deltas` because their geometry did not decode
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub undecoded: Vec<UndecodedGlyph>,
}

impl ComparisonReport {
    pub fn count(&self, presence: Presence) -> usize {
        self.deltas.iter().filter(|d| d.presence == presence).count()
    }

    /// Characters present on both sides whose coordinates differ
    pub fn differing(&self) -> impl Iterator<Item = &CharacterDelta> {
        self.deltas
            .iter()
            .filter(|d| d.presence == Presence::InBoth && !d.matches())
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl std::fmt::Display for ComparisonReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Transform: translate y {:+.6}, scale {:.6}",
            self.transform.translation, self.transform.scale
        )?;
        writeln!(
            f,
            "Characters: {} in both, {} only in original, {} only in generated",
            self.count(Presence::InBoth),
            self.count(Presence::OnlyInOld),
            self.count(Presence::OnlyInNew)
        )?;
        let differing: Vec<&CharacterDelta> = self.differing().collect();
        write!(f, "Differing: {}", differing.len())?;
        for delta in differing {
            write!(f, "\n  U+{:04X} {:?}", delta.codepoint, delta.character)?;
            if let Some(position) = delta.position {
                write!(f, " position ({:+.6}, {:+.6})", position.x, position.y)?;
            }
            if let Some(advance) = delta.advance {
                write!(f, " advance {:+.6}", advance)?;
            }
            if let Some((old, new)) = delta.vertex_counts {
                write!(f, " vertex count {old} vs {new}")?;
            }
            if !delta.mismatches.is_empty() {
                write!(f, " {} vertex mismatch(es)", delta.mismatches.len())?;
            }
        }
        if !self.undecoded.is_empty() {
            write!(f, "\nUndecoded: {}", self.undecoded.len())?;
            for glyph in &self.undecoded {
                write!(f, "\n  U+{:04X} {:?} ({})", glyph.codepoint, glyph.character, glyph.origin)?;
            }
        }
        Ok(())
    }
}

/// Affine mapping the old set onto the new set's frame
fn alignment(old: &CoordinateSet, new: &CoordinateSet, options: AlignmentOptions) -> (Affine, f64) {
    let from = old.frame.baseline();
    let to = if options.baseline {
        new.frame.baseline()
    } else {
        from
    };
    let scale = match (options.scale, old.frame.extent()) {
        (true, extent) if extent > 0.0 => new.frame.extent() / extent,
        _ => 1.0,
    };
    let affine =
        Affine::translate((0.0, to)) * Affine::scale(scale) * Affine::translate((0.0, -from));
    (affine, scale)
}

fn paired(old: &CoordinateRecord, new: &CoordinateRecord, affine: Affine, scale: f64) -> CharacterDelta {
    let mismatches = old
        .vertices
        .iter()
        .zip(&new.vertices)
        .enumerate()
        .filter_map(|(index, (a, b))| {
            let moved = affine * a.position;
            let position_delta = (b.position.x - moved.x).abs() + (b.position.y - moved.y).abs();
            let uv_delta = (b.uv.x - a.uv.x).abs() + (b.uv.y - a.uv.y).abs();
            (position_delta + uv_delta > VERTEX_TOLERANCE).then_some(VertexMismatch {
                index,
                position_delta,
                uv_delta,
            })
        })
        .collect();
    let vertex_counts =
        (old.vertices.len() != new.vertices.len()).then(|| (old.vertices.len(), new.vertices.len()));

    let corner = |rect: kurbo::Rect, max: bool| {
        if max {
            Point::new(rect.x1, rect.y1)
        } else {
            Point::new(rect.x0, rect.y0)
        }
    };

    CharacterDelta {
        character: new.character,
        codepoint: new.character as u32,
        presence: Presence::InBoth,
        position: Some(new.position - affine * old.position),
        uv_min: Some(corner(new.uv, false) - corner(old.uv, false)),
        uv_max: Some(corner(new.uv, true) - corner(old.uv, true)),
        advance: Some(new.advance - old.advance * scale),
        vertex_counts,
        mismatches,
    }
}

/// Compare two coordinate sets: every character of `old` in its order,
/// then characters only `new` has, in its order
pub fn compare(old: &CoordinateSet, new: &CoordinateSet, options: AlignmentOptions) -> ComparisonReport {
    let (affine, scale) = alignment(old, new, options);
    tracing::debug!(
        "Aligning {} onto {}: {:?}",
        old.origin,
        new.origin,
        affine.as_coeffs()
    );

    let mut deltas = Vec::with_capacity(old.records.len().max(new.records.len()));
    let mut seen = HashSet::new();
    for record in &old.records {
        seen.insert(record.character);
        deltas.push(match new.get(record.character) {
            Some(other) => paired(record, other, affine, scale),
            None => CharacterDelta::unpaired(record, Presence::OnlyInOld),
        });
    }
    for record in new.records.iter().filter(|r| !seen.contains(&r.character)) {
        deltas.push(CharacterDelta::unpaired(record, Presence::OnlyInNew));
    }

    let report = ComparisonReport {
        options,
        transform: AppliedTransform {
            translation: affine.as_coeffs()[5],
            scale,
            affine: affine.as_coeffs(),
        },
        deltas,
        undecoded: Vec::new(),
    };
    tracing::info!(
        "Compared {} characters, {} differ",
        report.deltas.len(),
        report.differing().count()
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::synth::QuadVertex;
    use crate::verify::{FontFrame, Origin};
    use kurbo::Rect;

    fn record(character: char, origin: Origin, top: f64, ascender: f64) -> CoordinateRecord {
        let y = top - ascender;
        let vertices = vec![
            QuadVertex {
                position: Point::new(0.1, y),
                uv: Point::new(0.0, 0.3),
            },
            QuadVertex {
                position: Point::new(0.1, y - 0.7),
                uv: Point::new(0.0, 1.0),
            },
            QuadVertex {
                position: Point::new(0.6, y - 0.7),
                uv: Point::new(0.5, 1.0),
            },
            QuadVertex {
                position: Point::new(0.6, y),
                uv: Point::new(0.5, 0.3),
            },
        ];
        CoordinateRecord {
            character,
            origin,
            position: vertices[0].position,
            uv: Rect::new(0.0, 0.3, 0.5, 1.0),
            advance: 0.6,
            bearing: Vec2::new(0.1, top),
            vertices,
        }
    }

    fn set(origin: Origin, ascender: f64, descender: f64, chars: &str) -> CoordinateSet {
        CoordinateSet {
            origin,
            frame: FontFrame {
                scale: 1000.0,
                ascender,
                descender,
            },
            records: chars.chars().map(|c| record(c, origin, 0.7, ascender)).collect(),
        }
    }

    #[test]
    fn test_baseline_alignment_translates_by_baseline_difference() {
        let old = set(Origin::Original, 0.8, -0.2, "A");
        let new = set(Origin::Generated, 0.95, -0.25, "A");
        let report = compare(&old, &new, AlignmentOptions { baseline: true, scale: false });

        let expected = new.frame.baseline() - old.frame.baseline();
        assert!((report.transform.translation - expected).abs() < 1e-12);
        assert_eq!(report.transform.scale, 1.0);
        let delta = &report.deltas[0];
        assert!(delta.matches(), "residual {delta:?}");
    }

    #[test]
    fn test_without_alignment_the_ascender_shift_shows() {
        let old = set(Origin::Original, 0.8, -0.2, "A");
        let new = set(Origin::Generated, 0.95, -0.25, "A");
        let report = compare(&old, &new, AlignmentOptions::default());
        let position = report.deltas[0].position.unwrap();
        assert!((position.y - (-0.15)).abs() < 1e-9);
        assert_eq!(report.differing().count(), 1);
        assert_eq!(report.deltas[0].mismatches.len(), 4);
    }

    #[test]
    fn test_scale_is_applied_about_the_baseline() {
        let old = set(Origin::Original, 0.8, -0.2, "A");
        let new = set(Origin::Generated, 1.6, -0.4, "A");
        let report = compare(&old, &new, AlignmentOptions { baseline: true, scale: true });
        assert!((report.transform.scale - 2.0).abs() < 1e-12);
        // a point on the old baseline lands on the new baseline
        let affine = Affine::new(report.transform.affine);
        let on_baseline = affine * Point::new(0.0, old.frame.baseline());
        assert!((on_baseline.y - new.frame.baseline()).abs() < 1e-12);
        let advance = report.deltas[0].advance.unwrap();
        assert!((advance - (0.6 - 1.2)).abs() < 1e-12);
    }

    #[test]
    fn test_presence_and_ordering() {
        let old = set(Origin::Original, 0.8, -0.2, "CAB");
        let new = set(Origin::Generated, 0.8, -0.2, "BDA");
        let report = compare(&old, &new, AlignmentOptions { baseline: true, scale: false });
        let order: Vec<(char, Presence)> = report
            .deltas
            .iter()
            .map(|d| (d.character, d.presence))
            .collect();
        assert_eq!(
            order,
            vec![
                ('C', Presence::OnlyInOld),
                ('A', Presence::InBoth),
                ('B', Presence::InBoth),
                ('D', Presence::OnlyInNew),
            ]
        );
        assert_eq!(report.count(Presence::InBoth), 2);
        let json = report.to_json().unwrap();
        assert!(json.contains("\"only-in-old\""));
        assert!(report.to_string().contains("1 only in original"));
    }

    #[test]
    fn test_vertex_count_difference_is_not_a_match() {
        let old = set(Origin::Original, 0.8, -0.2, "A");
        let mut new = set(Origin::Generated, 0.8, -0.2, "A");
        new.records[0].vertices.truncate(2);

        let report = compare(&old, &new, AlignmentOptions { baseline: true, scale: false });
        let delta = &report.deltas[0];
        assert!(delta.mismatches.is_empty());
        assert_eq!(delta.vertex_counts, Some((4, 2)));
        assert!(!delta.matches());
        assert_eq!(report.differing().count(), 1);
        assert!(report.to_string().contains("vertex count 4 vs 2"));
    }
}
