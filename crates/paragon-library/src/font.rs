//! Font metrics and ligature/kern programs.
//!
//! Only the parts of a font the line breaker consumes are modeled:
//! character widths, vertical extents, the packed ligature/kern program in
//! its classic byte encoding, boundary characters, the hyphen character,
//! and protrusion codes. Loading any of this from font files is the
//! embedder's business.

use ecow::EcoString;
use paragon_utils::Scaled;
use rustc_hash::FxHashMap;

use crate::node::TOO_BIG_CHAR;

/// Identifies a font in the engine's font list.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Hash)]
pub struct FontId(pub u32);

impl FontId {
    /// The index into the engine's font list.
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// A skip byte at or above this value ends a ligature/kern program run.
pub const STOP_FLAG: u16 = 128;

/// An op byte at or above this value denotes a kern instead of a ligature.
pub const KERN_FLAG: u16 = 128;

/// One step of a packed ligature/kern program.
///
/// `skip` tells how many steps to jump to the next candidate (≥ 128 stops
/// the walk); `next` is the right-hand character to match; `op` selects a
/// ligature opcode below 128 and a kern above; `rem` is the replacement
/// character or the low byte of the kern index.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct LigKernStep {
    pub skip: u16,
    pub next: u16,
    pub op: u16,
    pub rem: u16,
}

/// A font as the breaker sees it.
#[derive(Debug, Clone)]
pub struct Font {
    pub name: EcoString,
    widths: FxHashMap<i32, Scaled>,
    pub ascent: Scaled,
    pub descent: Scaled,
    lig_kern: Vec<LigKernStep>,
    kerns: Vec<Scaled>,
    lig_programs: FxHashMap<i32, usize>,
    /// Program for ligatures/kerns against the left word boundary.
    pub bchar_label: Option<usize>,
    /// The implicit character at the right word boundary, or
    /// [`TOO_BIG_CHAR`] if the font has none.
    pub bchar: i32,
    /// The character inserted at discretionary breaks; negative disables
    /// hyphenation for this font.
    pub hyphen_char: i32,
    lp_codes: FxHashMap<i32, i32>,
    rp_codes: FxHashMap<i32, i32>,
    /// Measured glyph advances, when they differ from the nominal metrics.
    glyph_widths: FxHashMap<i32, Scaled>,
}

impl Font {
    /// Creates an empty font with a `-` hyphen character.
    pub fn new(name: impl Into<EcoString>) -> Self {
        Self {
            name: name.into(),
            widths: FxHashMap::default(),
            ascent: Scaled::ZERO,
            descent: Scaled::ZERO,
            lig_kern: Vec::new(),
            kerns: Vec::new(),
            lig_programs: FxHashMap::default(),
            bchar_label: None,
            bchar: TOO_BIG_CHAR,
            hyphen_char: '-' as i32,
            lp_codes: FxHashMap::default(),
            rp_codes: FxHashMap::default(),
            glyph_widths: FxHashMap::default(),
        }
    }

    /// Registers a character and its width.
    pub fn define_char(&mut self, chr: char, width: Scaled) -> &mut Self {
        self.widths.insert(chr as i32, width);
        self
    }

    /// Registers a run of characters sharing one width.
    pub fn define_chars(&mut self, chars: &str, width: Scaled) -> &mut Self {
        for chr in chars.chars() {
            self.define_char(chr, width);
        }
        self
    }

    /// Whether the font can typeset `chr`.
    pub fn char_exists(&self, chr: i32) -> bool {
        self.widths.contains_key(&chr)
    }

    /// The advance width of `chr`; zero for missing characters.
    pub fn char_width(&self, chr: i32) -> Scaled {
        self.widths.get(&chr).copied().unwrap_or(Scaled::ZERO)
    }

    /// Records a measured glyph advance for `chr` that differs from the
    /// nominal metric.
    pub fn define_glyph_width(&mut self, chr: char, width: Scaled) -> &mut Self {
        self.glyph_widths.insert(chr as i32, width);
        self
    }

    /// The advance width of `chr` under glyph-level metrics.
    pub fn glyph_width(&self, chr: i32) -> Scaled {
        self.glyph_widths.get(&chr).copied().unwrap_or_else(|| self.char_width(chr))
    }

    /// Appends a ligature/kern program run for the left character `left`.
    ///
    /// The steps are stored packed: every step jumps to its immediate
    /// successor and the final one carries the stop flag.
    pub fn lig_kern_program(&mut self, left: i32, steps: &[LigKernStep]) -> &mut Self {
        let start = self.append_program(steps);
        self.lig_programs.insert(left, start);
        self
    }

    /// Appends the program run that matches against the left word boundary.
    pub fn boundary_program(&mut self, steps: &[LigKernStep]) -> &mut Self {
        let start = self.append_program(steps);
        self.bchar_label = Some(start);
        self
    }

    fn append_program(&mut self, steps: &[LigKernStep]) -> usize {
        assert!(!steps.is_empty(), "empty ligature/kern program");
        let start = self.lig_kern.len();
        for (i, step) in steps.iter().enumerate() {
            let last = i + 1 == steps.len();
            self.lig_kern.push(LigKernStep {
                skip: if last { STOP_FLAG } else { 0 },
                ..*step
            });
        }
        start
    }

    /// Registers a kern amount and returns the `(op, rem)` pair that a
    /// program step must carry to apply it.
    pub fn define_kern(&mut self, width: Scaled) -> (u16, u16) {
        let index = self.kerns.len();
        self.kerns.push(width);
        (KERN_FLAG + (index / 256) as u16, (index % 256) as u16)
    }

    /// Where the ligature/kern program for left character `chr` starts.
    ///
    /// Resolves the two-level encoding: an entry step whose skip byte
    /// exceeds the stop flag redirects to `256 * op + rem`.
    pub fn lig_start(&self, chr: i32) -> Option<usize> {
        let mut k = *self.lig_programs.get(&chr)?;
        let entry = self.lig_kern[k];
        if entry.skip > STOP_FLAG {
            k = 256 * entry.op as usize + entry.rem as usize;
        }
        Some(k)
    }

    /// The program step at index `k`.
    pub fn step(&self, k: usize) -> LigKernStep {
        self.lig_kern[k]
    }

    /// The kern width selected by a kern-flagged program step.
    pub fn kern_for(&self, op: u16, rem: u16) -> Scaled {
        self.kerns[256 * (op - KERN_FLAG) as usize + rem as usize]
    }

    /// Sets the right-boundary character.
    pub fn with_bchar(&mut self, chr: char) -> &mut Self {
        self.bchar = chr as i32;
        self
    }

    /// Sets the protrusion codes of `chr`, in thousandths of its width.
    pub fn set_protrusion(&mut self, chr: char, lp: i32, rp: i32) -> &mut Self {
        self.lp_codes.insert(chr as i32, lp);
        self.rp_codes.insert(chr as i32, rp);
        self
    }

    /// The left protrusion code of `chr`.
    pub fn lp_code(&self, chr: i32) -> i32 {
        self.lp_codes.get(&chr).copied().unwrap_or(0)
    }

    /// The right protrusion code of `chr`.
    pub fn rp_code(&self, chr: i32) -> i32 {
        self.rp_codes.get(&chr).copied().unwrap_or(0)
    }
}
