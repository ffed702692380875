//! Partitioning quads into batching categories
//!
//! Renderers draw shadows first, then decorations, then contents. The
//! splitter sorts a mixed quad list into those three groups with one counting
//! pass and one copy pass, storing all groups in a single allocation.

use super::{WindowQuad, WindowQuadType};
use log::warn;
use std::ops::Range;

/// Stable partition of a quad list by category
///
/// The three slices returned by [`shadow`](Self::shadow),
/// [`decoration`](Self::decoration) and [`content`](Self::content) are
/// disjoint ranges of the same buffer and borrow from the splitter.
#[derive(Debug, Clone, Default)]
pub struct QuadSplitter {
    quads: Vec<WindowQuad>,
    shadow: Range<usize>,
    decoration: Range<usize>,
    content: Range<usize>,
    dropped: usize,
}

impl QuadSplitter {
    pub fn new(quads: &[WindowQuad]) -> Self {
        let mut shadow_count = 0;
        let mut decoration_count = 0;
        let mut content_count = 0;
        let mut dropped = 0;
        for quad in quads {
            match quad.quad_type() {
                WindowQuadType::Shadow => shadow_count += 1,
                WindowQuadType::Decoration => decoration_count += 1,
                WindowQuadType::Contents => content_count += 1,
                WindowQuadType::Effect(_) => dropped += 1,
            }
        }

        let shadow = 0..shadow_count;
        let decoration = shadow.end..shadow.end + decoration_count;
        let content = decoration.end..decoration.end + content_count;
        let total = content.end;

        let mut buffer = match quads.iter().find(|q| !matches!(q.quad_type(), WindowQuadType::Effect(_))) {
            Some(fill) => vec![*fill; total],
            None => Vec::new(),
        };

        let mut next_shadow = shadow.start;
        let mut next_decoration = decoration.start;
        let mut next_content = content.start;
        for quad in quads {
            let slot = match quad.quad_type() {
                WindowQuadType::Shadow => &mut next_shadow,
                WindowQuadType::Decoration => &mut next_decoration,
                WindowQuadType::Contents => &mut next_content,
                WindowQuadType::Effect(_) => continue,
            };
            buffer[*slot] = *quad;
            *slot += 1;
        }

        if dropped > 0 {
            warn!(
                "⚠️ Dropped {} quad(s) of a type the renderer does not batch",
                dropped
            );
        }

        Self {
            quads: buffer,
            shadow,
            decoration,
            content,
            dropped,
        }
    }

    pub fn shadow(&self) -> &[WindowQuad] {
        &self.quads[self.shadow.clone()]
    }

    pub fn decoration(&self) -> &[WindowQuad] {
        &self.quads[self.decoration.clone()]
    }

    pub fn content(&self) -> &[WindowQuad] {
        &self.quads[self.content.clone()]
    }

    /// Largest category size; enough scratch space for any single pass
    pub fn max_quad_count(&self) -> usize {
        self.shadow
            .len()
            .max(self.decoration.len())
            .max(self.content.len())
    }

    /// Quads of unknown type that were left out
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Number of quads kept across all categories
    pub fn len(&self) -> usize {
        self.quads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quads.is_empty()
    }

    /// Categories in painting order
    pub fn passes(&self) -> [(WindowQuadType, &[WindowQuad]); 3] {
        [
            (WindowQuadType::Shadow, self.shadow()),
            (WindowQuadType::Decoration, self.decoration()),
            (WindowQuadType::Contents, self.content()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::RectF;
    use crate::quads::rect_quad;
    use proptest::prelude::*;

    fn quad(quad_type: WindowQuadType, tag: f64) -> WindowQuad {
        rect_quad(quad_type, RectF::new(tag, 0.0, 1.0, 1.0))
    }

    #[test]
    fn test_interleaved_input() {
        use WindowQuadType::*;
        let input = vec![
            quad(Contents, 0.0),
            quad(Shadow, 1.0),
            quad(Contents, 2.0),
            quad(Decoration, 3.0),
            quad(Shadow, 4.0),
            quad(Contents, 5.0),
        ];
        let splitter = QuadSplitter::new(&input);

        assert_eq!(splitter.content().len(), 3);
        assert_eq!(splitter.decoration().len(), 1);
        assert_eq!(splitter.shadow().len(), 2);
        assert_eq!(splitter.max_quad_count(), 3);

        let lefts: Vec<f64> = splitter.content().iter().map(|q| q.left()).collect();
        assert_eq!(lefts, vec![0.0, 2.0, 5.0]);
        let lefts: Vec<f64> = splitter.shadow().iter().map(|q| q.left()).collect();
        assert_eq!(lefts, vec![1.0, 4.0]);
    }

    #[test]
    fn test_empty_input() {
        let splitter = QuadSplitter::new(&[]);
        assert!(splitter.is_empty());
        assert_eq!(splitter.max_quad_count(), 0);
        assert!(splitter.content().is_empty());
    }

    #[test]
    fn test_unknown_type_dropped() {
        let input = vec![
            quad(WindowQuadType::Effect(7), 0.0),
            quad(WindowQuadType::Contents, 1.0),
        ];
        let splitter = QuadSplitter::new(&input);
        assert_eq!(splitter.len(), 1);
        assert_eq!(splitter.dropped(), 1);
        assert_eq!(splitter.content()[0].left(), 1.0);
    }

    #[test]
    fn test_ranges_are_disjoint() {
        use WindowQuadType::*;
        let input = vec![quad(Decoration, 0.0), quad(Shadow, 1.0), quad(Contents, 2.0)];
        let splitter = QuadSplitter::new(&input);

        let span = |slice: &[WindowQuad]| {
            let start = slice.as_ptr() as usize;
            start..start + std::mem::size_of_val(slice)
        };
        let shadow = span(splitter.shadow());
        let decoration = span(splitter.decoration());
        let content = span(splitter.content());
        assert!(shadow.end <= decoration.start);
        assert!(decoration.end <= content.start);
    }

    fn arb_type() -> impl Strategy<Value = WindowQuadType> {
        prop_oneof![
            Just(WindowQuadType::Shadow),
            Just(WindowQuadType::Decoration),
            Just(WindowQuadType::Contents),
        ]
    }

    proptest! {
        #[test]
        fn prop_split_conserves_and_keeps_order(types in prop::collection::vec(arb_type(), 0..64)) {
            let input: Vec<WindowQuad> = types
                .iter()
                .enumerate()
                .map(|(i, t)| quad(*t, i as f64))
                .collect();
            let splitter = QuadSplitter::new(&input);

            prop_assert_eq!(
                splitter.shadow().len() + splitter.decoration().len() + splitter.content().len(),
                input.len()
            );

            for (quad_type, slice) in splitter.passes() {
                let expected: Vec<f64> = input
                    .iter()
                    .filter(|q| q.quad_type() == quad_type)
                    .map(|q| q.left())
                    .collect();
                let actual: Vec<f64> = slice.iter().map(|q| q.left()).collect();
                prop_assert_eq!(actual, expected);
            }
        }
    }
}
