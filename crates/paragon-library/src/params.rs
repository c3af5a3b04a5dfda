//! Layout parameters.

use paragon_utils::Scaled;

use crate::glue::{GlueSpec, GlueSpecs, SpecRef};

/// One line of a paragraph shape: its indentation and width.
#[derive(Debug, Copy, Clone)]
pub struct ShapeLine {
    pub indent: Scaled,
    pub width: Scaled,
}

/// Everything the paragraph breaker reads from the surrounding engine
/// state. Defaults follow plain TeX.
pub struct Params {
    // Integer parameters.
    pub pretolerance: i32,
    pub tolerance: i32,
    pub looseness: i32,
    pub hyphen_penalty: i32,
    pub ex_hyphen_penalty: i32,
    pub line_penalty: i32,
    pub adj_demerits: i32,
    pub double_hyphen_demerits: i32,
    pub final_hyphen_demerits: i32,
    pub inter_line_penalty: i32,
    pub club_penalty: i32,
    pub widow_penalty: i32,
    pub display_widow_penalty: i32,
    pub broken_penalty: i32,
    /// Nonzero stretches the final line's glue to match the others; 1000
    /// applies the full adjustment.
    pub last_line_fit: i32,
    /// Nonzero permits hyphenating words that start with an uppercase
    /// letter.
    pub uc_hyph: i32,
    /// Nonzero enables eTeX mixed-direction typesetting.
    pub texxet: i32,
    /// 1 protrudes characters into the margins; above 1 the protrusion
    /// also participates in breakpoint feasibility.
    pub protrude_chars: i32,
    /// Nonzero measures re-split native words from glyph outlines.
    pub use_glyph_metrics: i32,
    pub hang_after: i32,
    /// Longest word the hyphenator will consider.
    pub hyphenatable_length: i32,

    // Dimensions.
    pub hsize: Scaled,
    pub hang_indent: Scaled,
    pub emergency_stretch: Scaled,

    // Glue parameters.
    pub left_skip: SpecRef,
    pub right_skip: SpecRef,
    pub par_fill_skip: SpecRef,

    // Local lists.
    pub par_shape: Option<Vec<ShapeLine>>,
    pub inter_line_penalties: Option<Vec<i32>>,
    pub club_penalties: Option<Vec<i32>>,
    pub widow_penalties: Option<Vec<i32>>,
    pub display_widow_penalties: Option<Vec<i32>>,
}

impl Params {
    /// Plain-TeX-flavored defaults. The glue parameters are allocated from
    /// the given pool: zero skips and a `0pt plus 1fil` paragraph filler.
    pub fn new(specs: &mut GlueSpecs) -> Self {
        Self {
            pretolerance: 100,
            tolerance: 200,
            looseness: 0,
            hyphen_penalty: 50,
            ex_hyphen_penalty: 50,
            line_penalty: 10,
            adj_demerits: 10_000,
            double_hyphen_demerits: 10_000,
            final_hyphen_demerits: 5_000,
            inter_line_penalty: 0,
            club_penalty: 150,
            widow_penalty: 150,
            display_widow_penalty: 50,
            broken_penalty: 100,
            last_line_fit: 0,
            uc_hyph: 0,
            texxet: 0,
            protrude_chars: 0,
            use_glyph_metrics: 0,
            hang_after: 1,
            hyphenatable_length: 63,
            hsize: Scaled::pts(6 * 72 + 30), // 6.5in
            hang_indent: Scaled::ZERO,
            emergency_stretch: Scaled::ZERO,
            left_skip: specs.alloc(GlueSpec::ZERO),
            right_skip: specs.alloc(GlueSpec::ZERO),
            par_fill_skip: specs.alloc(GlueSpec::fil(Scaled::ZERO)),
            par_shape: None,
            inter_line_penalties: None,
            club_penalties: None,
            widow_penalties: None,
            display_widow_penalties: None,
        }
    }

    /// The hyphenator's word-length ceiling.
    pub fn max_hyphenatable_length(&self) -> i32 {
        self.hyphenatable_length.clamp(0, 4095)
    }
}

/// Indexes a penalty list the way the engine does: entry `n`, clamped to
/// the last entry. `None` when no list is set (the scalar parameter then
/// applies under its own conditions).
pub fn penalty_list(list: &Option<Vec<i32>>, n: i32) -> Option<i32> {
    let list = list.as_ref().filter(|list| !list.is_empty())?;
    let index = (n.max(1) as usize).min(list.len());
    Some(list[index - 1])
}
