//! The paragraph driver.
//!
//! Breaking proceeds in up to three passes: the first tries the paragraph
//! without hyphenation under `pretolerance`, the second enables the
//! hyphenator under `tolerance`, and the final pass adds
//! `emergency_stretch` to every line's flexibility so that some set of
//! breaks is always found. Within a pass the driver scans the horizontal
//! list once, reporting every legal breakpoint to the feasibility engine
//! and accumulating node widths into the running totals.

mod active;
mod hyphenate;
mod pack;
mod post;
mod reconstitute;

use ecow::eco_format;
use paragon_library::arena::NodeRef;
use paragon_library::diag::StrResult;
use paragon_library::engine::Engine;
use paragon_library::font::FontId;
use paragon_library::glue::GlueOrder;
use paragon_library::node::{
    ActiveNode, Body, BreakType, FitClass, GluePar, KernType, NodeKind, PenaltyNode,
    Whatsit, AWFUL_BAD, EJECT_PENALTY, INF_PENALTY, L_CODE,
};
use paragon_library::widths::WidthVec;
use paragon_utils::{Scaled, INF_BAD};

use self::reconstitute::LigPiece;

/// Breaks the current paragraph into lines.
///
/// Must be called in horizontal mode with a non-empty list under
/// construction; `d` is true when the paragraph precedes display math. On
/// return the engine is back in the enclosing vertical mode with the lines,
/// penalties, and migrated material appended, and `just_box` points at the
/// final line's box.
pub fn line_break(engine: &mut Engine, d: bool) -> StrResult<()> {
    LineBreaker::new(engine).run(d)
}

fn odd(n: i32) -> bool {
    n % 2 != 0
}

pub(crate) struct LineBreaker<'a> {
    eng: &'a mut Engine,

    // Running width totals.
    background: WidthVec,
    active_width: WidthVec,
    break_width: WidthVec,
    disc_width: Scaled,

    // Pass state.
    threshold: i32,
    second_pass: bool,
    final_pass: bool,
    no_shrink_error_yet: bool,

    // Per-fit-class best candidates at the current breakpoint.
    minimum_demerits: i32,
    minimal_demerits: [i32; 4],
    best_place: [NodeRef; 4],
    best_pl_line: [i32; 4],
    best_pl_short: [Scaled; 4],
    best_pl_glue: [Scaled; 4],

    // Line-shape resolution.
    easy_line: i32,
    last_special_line: i32,
    first_width: Scaled,
    first_indent: Scaled,
    second_width: Scaled,
    second_indent: Scaled,

    // Outcome of a pass.
    best_bet: NodeRef,
    fewest_demerits: i32,
    best_line: i32,
    actual_looseness: i32,

    // Scan state.
    cur_p: NodeRef,
    prev_p: NodeRef,
    global_prev_p: NodeRef,
    first_p: NodeRef,
    auto_breaking: bool,
    passive: NodeRef,

    // Last-line fit.
    do_last_line_fit: bool,
    fill_width: [Scaled; 3],
    last_line_fill: NodeRef,

    // Hyphenation language state.
    cur_lang: u16,
    l_hyf: i32,
    r_hyf: i32,
    init_cur_lang: u16,
    init_l_hyf: i32,
    init_r_hyf: i32,
    hyph_index: i32,

    // Hyphenation workspace.
    hu: Vec<i32>,
    hc: Vec<i32>,
    hyf: Vec<i32>,
    hn: i32,
    ha: NodeRef,
    hb: NodeRef,
    hf: FontId,
    hyf_char: i32,
    hyf_bchar: i32,

    // Reconstitution state.
    init_list: NodeRef,
    init_lig: bool,
    init_lft: bool,
    hyphen_passed: i32,
    cur_l: i32,
    cur_r: i32,
    cur_q: NodeRef,
    lig_stack: smallvec::SmallVec<[LigPiece; 4]>,
    ligature_present: bool,
    lft_hit: bool,
    rt_hit: bool,
}

impl<'a> LineBreaker<'a> {
    fn new(eng: &'a mut Engine) -> Self {
        let cap = eng.params.max_hyphenatable_length() as usize + 4;
        Self {
            eng,
            background: WidthVec::ZERO,
            active_width: WidthVec::ZERO,
            break_width: WidthVec::ZERO,
            disc_width: Scaled::ZERO,
            threshold: 0,
            second_pass: false,
            final_pass: false,
            no_shrink_error_yet: true,
            minimum_demerits: AWFUL_BAD,
            minimal_demerits: [AWFUL_BAD; 4],
            best_place: [NodeRef::NULL; 4],
            best_pl_line: [0; 4],
            best_pl_short: [Scaled::ZERO; 4],
            best_pl_glue: [Scaled::ZERO; 4],
            easy_line: 0,
            last_special_line: 0,
            first_width: Scaled::ZERO,
            first_indent: Scaled::ZERO,
            second_width: Scaled::ZERO,
            second_indent: Scaled::ZERO,
            best_bet: NodeRef::NULL,
            fewest_demerits: 0,
            best_line: 0,
            actual_looseness: 0,
            cur_p: NodeRef::NULL,
            prev_p: NodeRef::NULL,
            global_prev_p: NodeRef::NULL,
            first_p: NodeRef::NULL,
            auto_breaking: true,
            passive: NodeRef::NULL,
            do_last_line_fit: false,
            fill_width: [Scaled::ZERO; 3],
            last_line_fill: NodeRef::NULL,
            cur_lang: 0,
            l_hyf: 0,
            r_hyf: 0,
            init_cur_lang: 0,
            init_l_hyf: 0,
            init_r_hyf: 0,
            hyph_index: 0,
            hu: vec![0; cap],
            hc: vec![0; cap],
            hyf: vec![0; cap],
            hn: 0,
            ha: NodeRef::NULL,
            hb: NodeRef::NULL,
            hf: FontId::default(),
            hyf_char: 0,
            hyf_bchar: 0,
            init_list: NodeRef::NULL,
            init_lig: false,
            init_lft: false,
            hyphen_passed: 0,
            cur_l: 0,
            cur_r: 0,
            cur_q: NodeRef::NULL,
            lig_stack: smallvec::SmallVec::new(),
            ligature_present: false,
            lft_hit: false,
            rt_hit: false,
        }
    }

    // Small arena shorthands.

    fn link(&self, p: NodeRef) -> NodeRef {
        self.eng.arena.link(p)
    }

    fn set_link(&mut self, p: NodeRef, q: NodeRef) {
        self.eng.arena.set_link(p, q);
    }

    fn kind(&self, p: NodeRef) -> NodeKind {
        self.eng.arena.kind(p)
    }

    fn is_char(&self, p: NodeRef) -> bool {
        self.eng.arena.is_char(p)
    }

    fn run(&mut self, d: bool) -> StrResult<()> {
        self.eng.pack_begin_line = self.eng.cur_list().mode_line;

        let head = self.eng.cur_list().head;
        let first = self.link(head);
        let temp_head = self.eng.temp_head;
        self.set_link(temp_head, first);

        // Remove a trailing glue in favor of an unbreakable penalty, then
        // close the paragraph with the filler glue.
        let tail = self.eng.cur_list().tail;
        if let Body::Glue(_) = self.eng.arena.body(tail) {
            let Body::Glue(glue) = std::mem::replace(
                self.eng.arena.body_mut(tail),
                Body::Penalty(PenaltyNode { penalty: INF_PENALTY }),
            ) else {
                unreachable!();
            };
            self.eng.specs.delete_ref(glue.spec);
            self.eng.flush_node_list(glue.leader);
        } else {
            let p = self.eng.new_penalty(INF_PENALTY);
            self.eng.tail_append(p);
        }
        let fill = self.eng.new_param_glue(GluePar::ParFillSkip);
        self.eng.tail_append(fill);
        self.last_line_fill = fill;

        // The paragraph's starting language travels packed in the
        // horizontal list's `prev_graf`.
        let packed = self.eng.cur_list().prev_graf;
        self.init_cur_lang = (packed % 65536) as u16;
        self.init_l_hyf = packed / 0x40_0000;
        self.init_r_hyf = (packed / 65536) % 64;

        self.eng.pop_nest();

        // The margins' contribution to every line.
        if self.skip_has_infinite_shrink(self.eng.params.left_skip) {
            self.eng.params.left_skip = self.finite_shrink(self.eng.params.left_skip);
        }
        if self.skip_has_infinite_shrink(self.eng.params.right_skip) {
            self.eng.params.right_skip = self.finite_shrink(self.eng.params.right_skip);
        }
        self.background = WidthVec::ZERO;
        let left = *self.eng.specs.get(self.eng.params.left_skip);
        let right = *self.eng.specs.get(self.eng.params.right_skip);
        self.background.add_spec(&left);
        self.background.add_spec(&right);

        // Special treatment of the last line, when requested and the filler
        // provides the only infinite stretch.
        self.do_last_line_fit = false;
        if self.eng.params.last_line_fit > 0 {
            let spec = *self.eng.specs.get(self.eng.arena.glue_node(fill).spec);
            if spec.stretch > Scaled::ZERO
                && spec.stretch_order > GlueOrder::Normal
                && !self.background.has_infinite_stretch()
            {
                self.do_last_line_fit = true;
                self.fill_width = [Scaled::ZERO; 3];
                self.fill_width[spec.stretch_order.index() - 1] = spec.stretch;
            }
        }

        self.minimum_demerits = AWFUL_BAD;
        self.minimal_demerits = [AWFUL_BAD; 4];

        self.resolve_line_shape();
        self.easy_line = if self.eng.params.looseness == 0 {
            self.last_special_line
        } else {
            AWFUL_BAD
        };

        self.threshold = self.eng.params.pretolerance;
        if self.threshold >= 0 {
            self.second_pass = false;
            self.final_pass = false;
        } else {
            self.threshold = self.eng.params.tolerance;
            self.second_pass = true;
            self.final_pass = self.eng.params.emergency_stretch <= Scaled::ZERO;
        }

        loop {
            self.threshold = self.threshold.min(INF_BAD);
            if self.second_pass {
                self.cur_lang = self.init_cur_lang;
                self.l_hyf = self.init_l_hyf;
                self.r_hyf = self.init_r_hyf;
                self.hyph_index = self.eng.hyph.hyph_index(self.cur_lang);
            }

            self.seed_active_list();
            self.scan_paragraph()?;

            if self.cur_p.is_null() {
                self.try_break(EJECT_PENALTY, BreakType::Hyphenated)?;
                if self.link(self.eng.active_head) != self.eng.active_head
                    && self.select_best_bet()
                {
                    break;
                }
            }

            self.clear_break_nodes();

            if !self.second_pass {
                self.threshold = self.eng.params.tolerance;
                self.second_pass = true;
                self.final_pass = self.eng.params.emergency_stretch <= Scaled::ZERO;
            } else {
                self.background.stretch[0] += self.eng.params.emergency_stretch;
                self.final_pass = true;
            }
        }

        // Rewrite the filler glue so the chosen last line comes out at the
        // same tightness as the rest.
        if self.do_last_line_fit {
            let best = self.eng.arena.active(self.best_bet).clone();
            if best.shortfall.is_zero() {
                self.do_last_line_fit = false;
            } else {
                let old = self.eng.arena.glue_node(self.last_line_fill).spec;
                let fresh = self.eng.specs.copy(old);
                self.eng.specs.delete_ref(old);
                let spec = self.eng.specs.get_mut(fresh);
                spec.width += best.shortfall - best.glue;
                spec.stretch = Scaled::ZERO;
                self.eng.arena.glue_node_mut(self.last_line_fill).spec = fresh;
            }
        }

        self.post_line_break(d)?;
        self.clear_break_nodes();
        self.eng.pack_begin_line = 0;
        Ok(())
    }

    fn skip_has_infinite_shrink(&self, spec: paragon_library::glue::SpecRef) -> bool {
        let spec = self.eng.specs.get(spec);
        spec.shrink_order != GlueOrder::Normal && !spec.shrink.is_zero()
    }

    /// Replaces a spec whose shrink is infinite by a finite copy, reporting
    /// the problem once per paragraph.
    fn finite_shrink(
        &mut self,
        p: paragon_library::glue::SpecRef,
    ) -> paragon_library::glue::SpecRef {
        if self.no_shrink_error_yet {
            self.no_shrink_error_yet = false;
            self.eng.sink.warn(eco_format!(
                "infinite glue shrinkage found in a paragraph; \
                 the offending shrinkability has been made finite"
            ));
        }
        let q = self.eng.specs.copy(p);
        self.eng.specs.get_mut(q).shrink_order = GlueOrder::Normal;
        self.eng.specs.delete_ref(p);
        q
    }

    /// Resolves `par_shape`/`hang_indent`/`hang_after` into the two-phase
    /// width/indent pairs used everywhere else.
    fn resolve_line_shape(&mut self) {
        let params = &self.eng.params;
        if let Some(shape) = &params.par_shape {
            self.last_special_line = shape.len() as i32 - 1;
            let last = shape[shape.len() - 1];
            self.second_width = last.width;
            self.second_indent = last.indent;
        } else if params.hang_indent.is_zero() {
            self.last_special_line = 0;
            self.second_width = params.hsize;
            self.second_indent = Scaled::ZERO;
        } else {
            self.last_special_line = params.hang_after.abs();
            if params.hang_after < 0 {
                self.first_width = params.hsize - params.hang_indent.abs();
                self.first_indent = params.hang_indent.max(Scaled::ZERO);
                self.second_width = params.hsize;
                self.second_indent = Scaled::ZERO;
            } else {
                self.first_width = params.hsize;
                self.first_indent = Scaled::ZERO;
                self.second_width = params.hsize - params.hang_indent.abs();
                self.second_indent = params.hang_indent.max(Scaled::ZERO);
            }
        }
    }

    /// The target width of line `l`.
    fn line_width_for(&self, l: i32) -> Scaled {
        if l > self.last_special_line {
            self.second_width
        } else if let Some(shape) = &self.eng.params.par_shape {
            shape[(l - 1) as usize].width
        } else {
            self.first_width
        }
    }

    /// Starts a pass with a single active node for the paragraph's head.
    fn seed_active_list(&mut self) {
        let prev_graf = self.eng.cur_list().prev_graf;
        let q = self.eng.arena.alloc(Body::Active(ActiveNode {
            break_type: BreakType::Unhyphenated,
            fitness: FitClass::Decent,
            break_node: NodeRef::NULL,
            line_number: prev_graf + 1,
            total_demerits: 0,
            shortfall: Scaled::ZERO,
            glue: Scaled::ZERO,
        }));
        let active_head = self.eng.active_head;
        self.set_link(q, active_head);
        self.set_link(active_head, q);

        self.active_width = self.background;
        self.passive = NodeRef::NULL;
        self.cur_p = self.link(self.eng.temp_head);
        self.auto_breaking = true;
        self.prev_p = self.cur_p;
        self.global_prev_p = self.cur_p;
        self.first_p = self.cur_p;
    }

    /// One scan over the paragraph, announcing breakpoints as they appear.
    fn scan_paragraph(&mut self) -> StrResult<()> {
        'scan: while self.cur_p.exists()
            && self.link(self.eng.active_head) != self.eng.active_head
        {
            if self.is_char(self.cur_p) {
                self.prev_p = self.cur_p;
                self.global_prev_p = self.cur_p;
                while self.cur_p.exists() && self.is_char(self.cur_p) {
                    let chr = self.eng.arena.char_node(self.cur_p).clone();
                    self.active_width.width += self.eng.char_width(chr.font, chr.chr);
                    self.cur_p = self.link(self.cur_p);
                }
                if self.cur_p.is_null() {
                    continue 'scan;
                }
            }

            match self.kind(self.cur_p) {
                NodeKind::List => {
                    self.active_width.width += self.eng.arena.list_node(self.cur_p).width;
                }
                NodeKind::Rule => {
                    let Body::Rule(rule) = self.eng.arena.body(self.cur_p) else {
                        unreachable!();
                    };
                    self.active_width.width += rule.width;
                }

                NodeKind::Whatsit => {
                    let Body::Whatsit(whatsit) = self.eng.arena.body(self.cur_p) else {
                        unreachable!();
                    };
                    if let Whatsit::Language(language) = whatsit {
                        self.cur_lang = language.lang;
                        self.l_hyf = language.left_hyphen_min;
                        self.r_hyf = language.right_hyphen_min;
                        self.hyph_index = self.eng.hyph.hyph_index(self.cur_lang);
                    } else if let Some(width) = whatsit.width() {
                        self.active_width.width += width;
                    }
                }

                NodeKind::Glue => {
                    if self.auto_breaking {
                        let prev = self.prev_p;
                        let breakable = self.is_char(prev)
                            || !self.eng.arena.body(prev).is_discardable()
                            || matches!(
                                self.eng.arena.body(prev),
                                Body::Kern(kern) if kern.subtype != KernType::Explicit
                            );
                        if breakable {
                            self.try_break(0, BreakType::Unhyphenated)?;
                        }
                    }

                    let mut spec = self.eng.arena.glue_node(self.cur_p).spec;
                    if self.skip_has_infinite_shrink(spec) {
                        spec = self.finite_shrink(spec);
                        self.eng.arena.glue_node_mut(self.cur_p).spec = spec;
                    }
                    let spec = *self.eng.specs.get(spec);
                    self.active_width.add_spec(&spec);

                    if self.second_pass && self.auto_breaking {
                        self.hyphenation_pass();
                    }
                }

                NodeKind::Kern => {
                    let kern = self.eng.arena.kern_node(self.cur_p).clone();
                    if kern.subtype == KernType::Explicit {
                        let next = self.link(self.cur_p);
                        if next.exists()
                            && self.auto_breaking
                            && self.kind(next) == NodeKind::Glue
                        {
                            self.try_break(0, BreakType::Unhyphenated)?;
                        }
                    }
                    self.active_width.width += kern.width;
                }

                NodeKind::Ligature => {
                    let lig = self.eng.arena.ligature(self.cur_p);
                    let (font, chr) = (lig.font, lig.chr);
                    self.active_width.width += self.eng.char_width(font, chr);
                }

                NodeKind::Disc => {
                    // Probe the break: weigh the pre-break text, announce,
                    // then step over the nodes the break would consume.
                    let disc = self.eng.arena.disc(self.cur_p).clone();
                    self.disc_width = Scaled::ZERO;
                    if disc.pre.is_null() {
                        let penalty = self.eng.params.ex_hyphen_penalty;
                        self.try_break(penalty, BreakType::Hyphenated)?;
                    } else {
                        let mut s = disc.pre;
                        while s.exists() {
                            self.disc_width += self.node_break_width(s, "disc3", "disc3a")?;
                            s = self.link(s);
                        }
                        self.active_width.width += self.disc_width;
                        let penalty = self.eng.params.hyphen_penalty;
                        self.try_break(penalty, BreakType::Hyphenated)?;
                        self.active_width.width -= self.disc_width;
                    }
                    let mut s = self.link(self.cur_p);
                    for _ in 0..disc.replace {
                        self.active_width.width += self.node_break_width(s, "disc4", "disc4a")?;
                        s = self.link(s);
                    }
                    self.prev_p = self.cur_p;
                    self.global_prev_p = self.cur_p;
                    self.cur_p = s;
                    continue 'scan;
                }

                NodeKind::Math => {
                    let math = self.eng.arena.math(self.cur_p).clone();
                    if math.subtype < L_CODE {
                        self.auto_breaking = odd(math.subtype as i32);
                    }
                    let next = self.link(self.cur_p);
                    if next.exists()
                        && self.auto_breaking
                        && self.kind(next) == NodeKind::Glue
                    {
                        self.try_break(0, BreakType::Unhyphenated)?;
                    }
                    self.active_width.width += math.width;
                }

                NodeKind::Penalty => {
                    let penalty = self.eng.arena.penalty(self.cur_p).penalty;
                    self.try_break(penalty, BreakType::Unhyphenated)?;
                }

                NodeKind::Mark | NodeKind::Ins | NodeKind::Adjust => {}

                _ => return Err(paragon_library::diag::confusion("paragraph")),
            }

            self.prev_p = self.cur_p;
            self.global_prev_p = self.cur_p;
            self.cur_p = self.link(self.cur_p);
        }
        Ok(())
    }

    /// The width a node contributes to discretionary bookkeeping.
    fn node_break_width(&self, p: NodeRef, tag: &str, whatsit_tag: &str) -> StrResult<Scaled> {
        match self.eng.arena.body(p) {
            Body::Char(chr) => Ok(self.eng.char_width(chr.font, chr.chr)),
            Body::Ligature(lig) => Ok(self.eng.char_width(lig.font, lig.chr)),
            Body::List(list) => Ok(list.width),
            Body::Rule(rule) => Ok(rule.width),
            Body::Kern(kern) => Ok(kern.width),
            Body::Whatsit(whatsit) => whatsit
                .width()
                .ok_or_else(|| paragon_library::diag::confusion(whatsit_tag)),
            _ => Err(paragon_library::diag::confusion(tag)),
        }
    }

    /// Picks the winner among the surviving candidates; with nonzero
    /// looseness, prefers the one that best shifts the line count. Returns
    /// whether the pass's outcome is acceptable.
    fn select_best_bet(&mut self) -> bool {
        let active_head = self.eng.active_head;

        self.fewest_demerits = AWFUL_BAD;
        let mut r = self.link(active_head);
        while r != active_head {
            if self.kind(r) != NodeKind::Delta {
                let active = self.eng.arena.active(r);
                if active.total_demerits < self.fewest_demerits {
                    self.fewest_demerits = active.total_demerits;
                    self.best_bet = r;
                }
            }
            r = self.link(r);
        }
        self.best_line = self.eng.arena.active(self.best_bet).line_number;

        let looseness = self.eng.params.looseness;
        if looseness == 0 {
            return true;
        }

        self.actual_looseness = 0;
        let mut r = self.link(active_head);
        while r != active_head {
            if self.kind(r) != NodeKind::Delta {
                let active = self.eng.arena.active(r);
                let line_diff = active.line_number - self.best_line;
                if (line_diff < self.actual_looseness && looseness <= line_diff)
                    || (line_diff > self.actual_looseness && looseness >= line_diff)
                {
                    self.best_bet = r;
                    self.actual_looseness = line_diff;
                    self.fewest_demerits = active.total_demerits;
                } else if line_diff == self.actual_looseness
                    && active.total_demerits < self.fewest_demerits
                {
                    self.best_bet = r;
                    self.fewest_demerits = active.total_demerits;
                }
            }
            r = self.link(r);
        }
        self.best_line = self.eng.arena.active(self.best_bet).line_number;

        self.actual_looseness == looseness || self.final_pass
    }

    /// Computes the hyphenation weights of a bare word, for tests.
    #[cfg(test)]
    pub(crate) fn annotate_only(
        eng: &'a mut Engine,
        lang: u16,
        word: &str,
        l_hyf: i32,
        r_hyf: i32,
    ) -> Option<Vec<i32>> {
        let mut breaker = Self::new(eng);
        breaker.cur_lang = lang;
        breaker.l_hyf = l_hyf;
        breaker.r_hyf = r_hyf;
        breaker.hyph_index = breaker.eng.hyph.hyph_index(lang);
        breaker.hn = 0;
        for chr in word.chars() {
            let code = chr as i32;
            breaker.hn += 1;
            breaker.hu[breaker.hn as usize] = code;
            breaker.hc[breaker.hn as usize] = breaker.eng.hyph_lc(breaker.hyph_index, code);
        }
        breaker
            .annotate()
            .then(|| breaker.hyf[1..=breaker.hn as usize].to_vec())
    }

    /// Reconstitutes a bare word through a font's program, for tests.
    /// Returns the head sentinel of the produced list.
    #[cfg(test)]
    pub(crate) fn reconstitute_only(
        eng: &'a mut Engine,
        font: FontId,
        word: &str,
        bchar: i32,
    ) -> NodeRef {
        let mut breaker = Self::new(eng);
        breaker.hf = font;
        let mut n = 0;
        for chr in word.chars() {
            n += 1;
            breaker.hu[n as usize] = chr as i32;
        }
        breaker.hn = n;

        let head = breaker.eng.arena.alloc(Body::Head);
        let mut tail = head;
        let mut j = 1;
        while j <= n {
            j = breaker.reconstitute(j, n, bchar, paragon_library::node::TOO_BIG_CHAR) + 1;
            let hold = breaker.link(breaker.eng.hold_head);
            breaker.set_link(breaker.eng.hold_head, NodeRef::NULL);
            breaker.set_link(tail, hold);
            while breaker.link(tail).exists() {
                tail = breaker.link(tail);
            }
        }
        head
    }

    /// Releases all active, delta, and passive nodes of the current pass.
    fn clear_break_nodes(&mut self) {
        let active_head = self.eng.active_head;
        let mut q = self.link(active_head);
        while q != active_head {
            let next = self.link(q);
            self.eng.arena.free(q);
            q = next;
        }
        self.set_link(active_head, active_head);

        let mut q = self.passive;
        while q.exists() {
            let next = self.link(q);
            self.eng.arena.free(q);
            q = next;
        }
        self.passive = NodeRef::NULL;
    }
}
