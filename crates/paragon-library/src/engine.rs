//! The engine context.
//!
//! The original keeps the arena, parameter tables, font arrays, and
//! hyphenation tables in process-wide globals; here they all hang off one
//! [`Engine`] value that is threaded through every routine.

use paragon_utils::Scaled;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::arena::{Arena, NodeRef};
use crate::diag::Sink;
use crate::font::{Font, FontId};
use crate::glue::{GlueSpec, GlueSpecs, SpecRef};
use crate::hyph::HyphTables;
use crate::node::{
    ActiveNode, Body, BreakType, CharNode, DiscNode, FitClass, GlueNode, GluePar,
    KernNode, KernType, LigatureNode, MarginKernNode, MathNode, NativeWordNode,
    PenaltyNode, Side, Whatsit, AWFUL_BAD,
};
use crate::params::Params;

/// Which way the current list grows.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Mode {
    Horizontal,
    Vertical,
}

/// The stack of residual direction contexts, topmost last.
pub type LrStack = SmallVec<[u16; 4]>;

/// One level of the semantic nest: a list under construction.
pub struct ListState {
    pub mode: Mode,
    /// Sentinel node whose link starts the list.
    pub head: NodeRef,
    pub tail: NodeRef,
    /// In vertical mode, the number of lines already contributed. In
    /// horizontal mode, the packed paragraph-language word; see
    /// [`pack_par_language`].
    pub prev_graf: i32,
    /// Source line where this list began, for diagnostics.
    pub mode_line: i32,
    pub prev_depth: Scaled,
    /// Direction contexts left open by previous material.
    pub etex_aux: LrStack,
}

/// Packs a paragraph's starting language and hyphenation limits into the
/// horizontal-mode `prev_graf` word.
pub fn pack_par_language(lang: u16, left_min: i32, right_min: i32) -> i32 {
    (norm_min(left_min) << 22) | (norm_min(right_min) << 16) | lang as i32
}

fn norm_min(h: i32) -> i32 {
    h.clamp(1, 63)
}

/// Holds all state the breaker and its collaborators share.
pub struct Engine {
    pub arena: Arena,
    pub specs: GlueSpecs,
    pub fonts: Vec<Font>,
    pub hyph: HyphTables,
    pub params: Params,
    /// The global lowercase map; nonzero marks a letter.
    pub lc_codes: FxHashMap<i32, i32>,
    pub sink: Sink,
    /// The semantic nest; the last entry is the current list.
    pub nest: Vec<ListState>,
    /// The most recently packed line box.
    pub just_box: NodeRef,
    /// Source line tagged onto box badness reports.
    pub pack_begin_line: i32,
    /// When set, packing migrates post-material here.
    pub adjust_tail: NodeRef,
    /// When set, packing migrates pre-material here.
    pub pre_adjust_tail: NodeRef,

    // Permanent list-head sentinels.
    pub temp_head: NodeRef,
    pub hold_head: NodeRef,
    pub adjust_head: NodeRef,
    pub pre_adjust_head: NodeRef,
    /// Anchor of the circular active list; an active node whose line
    /// number exceeds every real one.
    pub active_head: NodeRef,
}

impl Engine {
    /// Creates an engine with default parameters, no fonts, and empty
    /// hyphenation tables, ready to build a vertical list.
    pub fn new() -> Self {
        let mut arena = Arena::new();
        let temp_head = arena.alloc(Body::Head);
        let hold_head = arena.alloc(Body::Head);
        let adjust_head = arena.alloc(Body::Head);
        let pre_adjust_head = arena.alloc(Body::Head);
        let active_head = arena.alloc(Body::Active(ActiveNode {
            break_type: BreakType::Unhyphenated,
            fitness: FitClass::Decent,
            break_node: NodeRef::NULL,
            line_number: AWFUL_BAD,
            total_demerits: 0,
            shortfall: Scaled::ZERO,
            glue: Scaled::ZERO,
        }));

        let mut specs = GlueSpecs::new();
        let params = Params::new(&mut specs);

        let mut lc_codes = FxHashMap::default();
        for c in 'a'..='z' {
            lc_codes.insert(c as i32, c as i32);
            lc_codes.insert(c.to_ascii_uppercase() as i32, c as i32);
        }

        let mut engine = Self {
            arena,
            specs,
            fonts: Vec::new(),
            hyph: HyphTables::empty(),
            params,
            lc_codes,
            sink: Sink::new(),
            nest: Vec::new(),
            just_box: NodeRef::NULL,
            pack_begin_line: 0,
            adjust_tail: NodeRef::NULL,
            pre_adjust_tail: NodeRef::NULL,
            temp_head,
            hold_head,
            adjust_head,
            pre_adjust_head,
            active_head,
        };
        engine.push_nest(Mode::Vertical, 0);
        engine
    }

    /// Registers a font and returns its identifier.
    pub fn new_font(&mut self, font: Font) -> FontId {
        self.fonts.push(font);
        FontId(self.fonts.len() as u32 - 1)
    }

    /// The font behind an identifier.
    pub fn font(&self, id: FontId) -> &Font {
        &self.fonts[id.index()]
    }

    /// The list currently under construction.
    pub fn cur_list(&self) -> &ListState {
        self.nest.last().expect("semantic nest is empty")
    }

    /// Mutable access to the current list.
    pub fn cur_list_mut(&mut self) -> &mut ListState {
        self.nest.last_mut().expect("semantic nest is empty")
    }

    /// Opens a new list level.
    pub fn push_nest(&mut self, mode: Mode, mode_line: i32) {
        let head = self.arena.alloc(Body::Head);
        self.nest.push(ListState {
            mode,
            head,
            tail: head,
            prev_graf: 0,
            mode_line,
            prev_depth: Scaled::ZERO,
            etex_aux: LrStack::new(),
        });
    }

    /// Closes the current list level, releasing its head sentinel. The
    /// caller must already have detached the list contents.
    pub fn pop_nest(&mut self) -> ListState {
        let list = self.nest.pop().expect("semantic nest is empty");
        self.arena.free(list.head);
        list
    }

    /// Appends a node at the tail of the current list.
    pub fn tail_append(&mut self, p: NodeRef) {
        let tail = self.cur_list().tail;
        self.arena.set_link(tail, p);
        self.cur_list_mut().tail = p;
    }

    /// Appends a box to the current (vertical) list.
    ///
    /// Baseline glue is the page builder's business and not inserted here;
    /// only `prev_depth` is maintained.
    pub fn append_to_vlist(&mut self, b: NodeRef) {
        let depth = self.arena.list_node(b).depth;
        self.tail_append(b);
        self.cur_list_mut().prev_depth = depth;
    }

    /// A fresh penalty node.
    pub fn new_penalty(&mut self, penalty: i32) -> NodeRef {
        self.arena.alloc(Body::Penalty(PenaltyNode { penalty }))
    }

    /// A fresh kern node.
    pub fn new_kern(&mut self, width: Scaled, subtype: KernType) -> NodeRef {
        self.arena.alloc(Body::Kern(KernNode { width, subtype }))
    }

    /// A fresh margin kern.
    pub fn new_margin_kern(&mut self, width: Scaled, side: Side) -> NodeRef {
        self.arena.alloc(Body::MarginKern(MarginKernNode { width, side }))
    }

    /// A glue node referencing an existing spec (takes a reference).
    pub fn new_glue(&mut self, spec: SpecRef) -> NodeRef {
        self.specs.add_ref(spec);
        self.arena.alloc(Body::Glue(GlueNode { spec, leader: NodeRef::NULL, param: None }))
    }

    /// A glue node owning a fresh spec.
    pub fn new_glue_from(&mut self, spec: GlueSpec) -> NodeRef {
        let spec = self.specs.alloc(spec);
        self.arena.alloc(Body::Glue(GlueNode { spec, leader: NodeRef::NULL, param: None }))
    }

    /// A glue node tied to a named glue parameter.
    pub fn new_param_glue(&mut self, param: GluePar) -> NodeRef {
        let spec = self.glue_par(param);
        self.specs.add_ref(spec);
        self.arena.alloc(Body::Glue(GlueNode {
            spec,
            leader: NodeRef::NULL,
            param: Some(param),
        }))
    }

    /// The spec currently bound to a glue parameter.
    pub fn glue_par(&self, param: GluePar) -> SpecRef {
        match param {
            GluePar::LeftSkip => self.params.left_skip,
            GluePar::RightSkip => self.params.right_skip,
            GluePar::ParFillSkip => self.params.par_fill_skip,
        }
    }

    /// An empty discretionary.
    pub fn new_disc(&mut self) -> NodeRef {
        self.arena.alloc(Body::Disc(DiscNode {
            pre: NodeRef::NULL,
            post: NodeRef::NULL,
            replace: 0,
        }))
    }

    /// A math node of the given subtype.
    pub fn new_math(&mut self, width: Scaled, subtype: u16) -> NodeRef {
        self.arena.alloc(Body::Math(MathNode { subtype, width }))
    }

    /// A character node, if the font can typeset the character.
    pub fn new_character(&mut self, font: FontId, chr: i32) -> Option<NodeRef> {
        self.fonts[font.index()]
            .char_exists(chr)
            .then(|| self.arena.alloc(Body::Char(CharNode { font, chr })))
    }

    /// A ligature node over the given original characters.
    pub fn new_ligature(&mut self, font: FontId, chr: i32, lig: NodeRef) -> NodeRef {
        self.arena.alloc(Body::Ligature(LigatureNode { font, chr, lig, hits: 0 }))
    }

    /// A native word node over UTF-16 units, measured immediately.
    pub fn new_native_word(
        &mut self,
        font: FontId,
        text: Vec<u16>,
        actual_text: bool,
    ) -> NodeRef {
        let p = self.arena.alloc(Body::Whatsit(Whatsit::NativeWord(NativeWordNode {
            font,
            text,
            width: Scaled::ZERO,
            actual_text,
        })));
        self.measure_native(p);
        p
    }

    /// Recomputes the width of a native word from its font's metrics,
    /// preferring measured glyph advances when so configured.
    pub fn measure_native(&mut self, p: NodeRef) {
        let glyph_metrics = self.params.use_glyph_metrics > 0;
        let Body::Whatsit(Whatsit::NativeWord(word)) = self.arena.body_mut(p) else {
            panic!("measured a node that is not a native word");
        };
        let font = &self.fonts[word.font.index()];
        let mut width = Scaled::ZERO;
        let mut i = 0;
        while i < word.text.len() {
            let usv = word.usv_at(i);
            width += if glyph_metrics { font.glyph_width(usv) } else { font.char_width(usv) };
            i += word.usv_len(i);
        }
        word.width = width;
    }

    /// The advance width of a character in a font.
    pub fn char_width(&self, font: FontId, chr: i32) -> Scaled {
        self.fonts[font.index()].char_width(chr)
    }

    /// The global lowercase code of a character; zero for non-letters.
    pub fn lc_code(&self, chr: i32) -> i32 {
        self.lc_codes.get(&chr).copied().unwrap_or(0)
    }

    /// The hyphenation code of `chr` under the current language's mapping
    /// base, falling back to the global lowercase map.
    pub fn hyph_lc(&self, hyph_index: i32, chr: i32) -> i32 {
        if hyph_index == 0 || chr > 255 {
            self.lc_code(chr)
        } else if self.hyph.trc(hyph_index + chr) != chr {
            0
        } else {
            self.hyph.tro(hyph_index + chr)
        }
    }

    /// Releases a node and everything it owns.
    pub fn free_node(&mut self, p: NodeRef) {
        let node = self.arena.free(p);
        match node.body {
            Body::Glue(glue) => {
                self.specs.delete_ref(glue.spec);
                self.flush_node_list(glue.leader);
            }
            Body::List(list) => self.flush_node_list(list.list),
            Body::Disc(disc) => {
                self.flush_node_list(disc.pre);
                self.flush_node_list(disc.post);
            }
            Body::Ligature(lig) => self.flush_node_list(lig.lig),
            Body::Ins(ins) => self.flush_node_list(ins.list),
            Body::Adjust(adjust) => self.flush_node_list(adjust.list),
            _ => {}
        }
    }

    /// Releases a whole list of nodes.
    pub fn flush_node_list(&mut self, mut p: NodeRef) {
        while p.exists() {
            let next = self.arena.link(p);
            self.free_node(p);
            p = next;
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_par_language_packing() {
        let packed = pack_par_language(7, 2, 3);
        assert_eq!(packed % 65536, 7);
        assert_eq!(packed / 0x40_0000, 2);
        assert_eq!((packed / 65536) % 64, 3);
        // Out-of-range minima are normalized.
        assert_eq!(pack_par_language(0, 0, 99) / 0x40_0000, 1);
    }

    #[test]
    fn test_flush_releases_glue_refs() {
        let mut engine = Engine::new();
        let baseline = engine.specs.total_refs();
        let g = engine.new_param_glue(GluePar::LeftSkip);
        assert_eq!(engine.specs.total_refs(), baseline + 1);
        engine.flush_node_list(g);
        assert_eq!(engine.specs.total_refs(), baseline);
    }

    #[test]
    fn test_native_word_measure() {
        let mut engine = Engine::new();
        let mut font = Font::new("test");
        font.define_chars("ab", Scaled::pts(5));
        let font = engine.new_font(font);
        let word = engine.new_native_word(font, vec!['a' as u16, 'b' as u16], false);
        match engine.arena.body(word) {
            Body::Whatsit(Whatsit::NativeWord(w)) => assert_eq!(w.width, Scaled::pts(10)),
            _ => panic!("not a native word"),
        }
    }
}
