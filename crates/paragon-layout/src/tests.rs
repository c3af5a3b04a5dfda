use paragon_library::arena::NodeRef;
use paragon_library::engine::{pack_par_language, Engine, Mode};
use paragon_library::font::{Font, FontId, LigKernStep};
use paragon_library::glue::{GlueOrder, GlueSpec};
use paragon_library::hyph::TrieBuilder;
use paragon_library::node::{
    Body, GlueSign, KernType, NodeKind, Whatsit, BEGIN_L_CODE, EJECT_PENALTY,
    END_L_CODE, INF_PENALTY,
};
use paragon_utils::Scaled;

use crate::line_break;
use crate::linebreak::LineBreaker;

fn pts(n: i32) -> Scaled {
    Scaled::pts(n)
}

/// Ten points per character keeps every expected width easy to read off.
fn test_font() -> Font {
    let mut font = Font::new("mono10");
    font.define_chars("abcdefghijklmnopqrstuvwxyz-", pts(10));
    font.ascent = pts(7);
    font.descent = pts(3);
    font
}

/// An interword space: 10pt, plus 5pt, minus 3pt.
fn interword() -> GlueSpec {
    GlueSpec::flexible(pts(10), pts(5), pts(3))
}

/// Builds the horizontal list of one paragraph and runs the breaker.
struct Par {
    eng: Engine,
    font: FontId,
}

impl Par {
    fn new() -> Self {
        let mut eng = Engine::new();
        let font = eng.new_font(test_font());
        eng.push_nest(Mode::Horizontal, 1);
        eng.cur_list_mut().prev_graf = pack_par_language(0, 2, 3);
        Self { eng, font }
    }

    fn hyphen_mins(&mut self, left: i32, right: i32) {
        self.eng.cur_list_mut().prev_graf = pack_par_language(0, left, right);
    }

    fn word(&mut self, word: &str) {
        for chr in word.chars() {
            let p = self
                .eng
                .new_character(self.font, chr as i32)
                .expect("character missing from test font");
            self.eng.tail_append(p);
        }
    }

    fn space(&mut self) {
        let g = self.eng.new_glue_from(interword());
        self.eng.tail_append(g);
    }

    fn glue(&mut self, spec: GlueSpec) {
        let g = self.eng.new_glue_from(spec);
        self.eng.tail_append(g);
    }

    fn text(&mut self, text: &str) {
        for (i, word) in text.split_whitespace().enumerate() {
            if i > 0 {
                self.space();
            }
            self.word(word);
        }
    }

    fn penalty(&mut self, penalty: i32) {
        let p = self.eng.new_penalty(penalty);
        self.eng.tail_append(p);
    }

    fn math(&mut self, subtype: u16) {
        let p = self.eng.new_math(Scaled::ZERO, subtype);
        self.eng.tail_append(p);
    }

    /// A discretionary whose pre-break text is a hyphen character.
    fn hyphen_disc(&mut self) {
        let disc = self.eng.new_disc();
        let pre = self.eng.new_character(self.font, '-' as i32).unwrap();
        self.eng.arena.disc_mut(disc).pre = pre;
        self.eng.tail_append(disc);
    }

    fn empty_disc(&mut self) {
        let disc = self.eng.new_disc();
        self.eng.tail_append(disc);
    }

    fn native(&mut self, word: &str) {
        let text: Vec<u16> = word.chars().map(|c| c as u16).collect();
        let p = self.eng.new_native_word(self.font, text, false);
        self.eng.tail_append(p);
    }

    fn language(&mut self, lang: u16, left: i32, right: i32) {
        let p = self.eng.arena.alloc(Body::Whatsit(Whatsit::Language(
            paragon_library::node::LanguageNode {
                lang,
                left_hyphen_min: left,
                right_hyphen_min: right,
            },
        )));
        self.eng.tail_append(p);
    }

    #[track_caller]
    fn run(&mut self) {
        line_break(&mut self.eng, false).expect("line breaking failed");
    }
}

/// The line boxes appended to the vertical list.
fn boxes(eng: &Engine) -> Vec<NodeRef> {
    let mut out = Vec::new();
    let mut p = eng.arena.link(eng.cur_list().head);
    while p.exists() {
        if eng.arena.kind(p) == NodeKind::List {
            out.push(p);
        }
        p = eng.arena.link(p);
    }
    out
}

/// The penalties interleaved between the line boxes.
fn penalties(eng: &Engine) -> Vec<i32> {
    let mut out = Vec::new();
    let mut p = eng.arena.link(eng.cur_list().head);
    while p.exists() {
        if let Body::Penalty(penalty) = eng.arena.body(p) {
            out.push(penalty.penalty);
        }
        p = eng.arena.link(p);
    }
    out
}

/// The characters a line renders, in order, with native text decoded.
fn line_text(eng: &Engine, b: NodeRef) -> String {
    let mut out = String::new();
    let mut p = eng.arena.list_node(b).list;
    while p.exists() {
        match eng.arena.body(p) {
            Body::Char(chr) => out.push(char::from_u32(chr.chr as u32).unwrap()),
            Body::Ligature(lig) => out.push(char::from_u32(lig.chr as u32).unwrap()),
            Body::Whatsit(Whatsit::NativeWord(word)) => {
                out.extend(char::decode_utf16(word.text.iter().copied()).map(|c| c.unwrap()));
            }
            _ => {}
        }
        p = eng.arena.link(p);
    }
    out
}

/// A structural dump of the vertical list, for determinism comparisons.
fn snapshot(eng: &Engine) -> String {
    use std::fmt::Write;
    let mut out = String::new();
    let mut p = eng.arena.link(eng.cur_list().head);
    while p.exists() {
        match eng.arena.body(p) {
            Body::List(b) => {
                write!(
                    out,
                    "box[w={} sign={:?} ord={:?} set={} shift={}]{{{}}}",
                    b.width,
                    b.glue_sign,
                    b.glue_order,
                    b.glue_set,
                    b.shift,
                    line_text(eng, p),
                )
                .unwrap();
            }
            Body::Penalty(penalty) => write!(out, "pen({})", penalty.penalty).unwrap(),
            other => write!(out, "{:?}", other.kind()).unwrap(),
        }
        out.push(' ');
        p = eng.arena.link(p);
    }
    out
}

/// Checks that a packed line really comes out at its recorded width once
/// the glue set ratio is applied.
#[track_caller]
fn assert_exact_fit(eng: &Engine, b: NodeRef) {
    let boxed = eng.arena.list_node(b);
    let mut natural = Scaled::ZERO;
    let mut stretch = [Scaled::ZERO; 4];
    let mut shrink = [Scaled::ZERO; 4];
    let mut p = boxed.list;
    while p.exists() {
        match eng.arena.body(p) {
            Body::Char(chr) => natural += eng.char_width(chr.font, chr.chr),
            Body::Ligature(lig) => natural += eng.char_width(lig.font, lig.chr),
            Body::Glue(glue) => {
                let spec = eng.specs.get(glue.spec);
                natural += spec.width;
                stretch[spec.stretch_order.index()] += spec.stretch;
                shrink[spec.shrink_order.index()] += spec.shrink;
            }
            Body::Kern(kern) => natural += kern.width,
            Body::MarginKern(kern) => natural += kern.width,
            Body::Math(math) => natural += math.width,
            Body::Whatsit(whatsit) => {
                if let Some(width) = whatsit.width() {
                    natural += width;
                }
            }
            Body::List(inner) => natural += inner.width,
            Body::Rule(rule) => natural += rule.width,
            _ => {}
        }
        p = eng.arena.link(p);
    }

    let adjusted = match boxed.glue_sign {
        GlueSign::Normal => natural.raw() as f64,
        GlueSign::Stretching => {
            natural.raw() as f64
                + boxed.glue_set * stretch[boxed.glue_order.index()].raw() as f64
        }
        GlueSign::Shrinking => {
            natural.raw() as f64
                - boxed.glue_set * shrink[boxed.glue_order.index()].raw() as f64
        }
    };
    let error = (adjusted - boxed.width.raw() as f64).abs();
    assert!(error < 2.0, "box sets to {adjusted} instead of {}", boxed.width.raw());
}

/// Releases the produced vertical list, so leak checks can run.
fn flush_output(eng: &mut Engine) {
    let head = eng.cur_list().head;
    let first = eng.arena.link(head);
    eng.flush_node_list(first);
    eng.arena.set_link(head, NodeRef::NULL);
    eng.cur_list_mut().tail = head;
}

#[test]
fn test_one_word_paragraph() {
    let mut par = Par::new();
    par.eng.params.hsize = pts(100);
    par.eng.params.pretolerance = 10_000;
    par.word("hi");
    par.run();

    let boxes = boxes(&par.eng);
    assert_eq!(boxes.len(), 1);
    assert_eq!(par.eng.cur_list().prev_graf, 1);
    assert_eq!(line_text(&par.eng, boxes[0]), "hi");

    let b = par.eng.arena.list_node(boxes[0]);
    assert_eq!(b.width, pts(100));
    assert_eq!(b.glue_sign, GlueSign::Stretching);
    assert_eq!(b.glue_order, GlueOrder::Fil);
    assert!(par.eng.sink.warnings().is_empty());
    assert_exact_fit(&par.eng, boxes[0]);
}

#[test]
fn test_forced_hyphenation() {
    let mut builder = TrieBuilder::new();
    builder.insert_exception(0, "su-per-cali-fragi-listic-expi-ali-do-cious");

    let mut par = Par::new();
    par.eng.hyph = builder.build();
    par.eng.params.hsize = pts(70);
    par.eng.params.pretolerance = -1;
    par.eng.params.tolerance = 10_000;
    par.word("a");
    par.space();
    par.word("supercalifragilisticexpialidocious");
    par.run();

    let boxes = boxes(&par.eng);
    assert!(boxes.len() >= 3, "got {} lines", boxes.len());
    assert_eq!(par.eng.cur_list().prev_graf, boxes.len() as i32);
    assert!(
        boxes.iter().any(|&b| line_text(&par.eng, b).ends_with('-')),
        "no line ends in a hyphen"
    );
    for &b in &boxes {
        assert_eq!(par.eng.arena.list_node(b).width, pts(70));
    }
}

#[test]
fn test_last_line_fit() {
    let mut par = Par::new();
    par.eng.params.hsize = pts(100);
    par.eng.params.tolerance = 1000;
    par.eng.params.last_line_fit = 1000;
    par.text("abcde fgh ab cd");
    par.run();

    let boxes = boxes(&par.eng);
    assert_eq!(boxes.len(), 2);

    // The filler glue was rewritten to close the last line's shortfall up
    // to the first line's looseness: both lines stretch by the same ratio.
    let first = par.eng.arena.list_node(boxes[0]);
    let last = par.eng.arena.list_node(boxes[1]);
    assert_eq!(first.glue_sign, GlueSign::Stretching);
    assert_eq!(last.glue_sign, GlueSign::Stretching);
    assert_eq!(last.glue_order, GlueOrder::Normal);
    assert!((first.glue_set - 2.0).abs() < 1e-9);
    assert!((last.glue_set - 2.0).abs() < 1e-9);

    let fill = parfill_spec(&par.eng, boxes[1]);
    assert_eq!(fill.width, pts(40));
    assert_eq!(fill.stretch, Scaled::ZERO);
}

#[test]
fn test_last_line_fit_off_leaves_filler_alone() {
    let mut par = Par::new();
    par.eng.params.hsize = pts(100);
    par.eng.params.tolerance = 1000;
    par.text("abcde fgh ab cd");
    par.run();

    let boxes = boxes(&par.eng);
    assert_eq!(boxes.len(), 2);
    let last = par.eng.arena.list_node(boxes[1]);
    assert_eq!(last.glue_order, GlueOrder::Fil);
    let fill = parfill_spec(&par.eng, boxes[1]);
    assert_eq!(fill.width, Scaled::ZERO);
    assert_eq!(fill.stretch_order, GlueOrder::Fil);
}

/// The spec of the paragraph-filler glue inside a line box.
fn parfill_spec(eng: &Engine, b: NodeRef) -> GlueSpec {
    let mut p = eng.arena.list_node(b).list;
    while p.exists() {
        if let Body::Glue(glue) = eng.arena.body(p) {
            if glue.param == Some(paragon_library::node::GluePar::ParFillSkip) {
                return *eng.specs.get(glue.spec);
            }
        }
        p = eng.arena.link(p);
    }
    panic!("no filler glue in line");
}

#[test]
fn test_infinite_shrink_reported_once() {
    let bad = GlueSpec {
        width: pts(10),
        shrink: Scaled::ONE,
        shrink_order: GlueOrder::Fil,
        ..GlueSpec::ZERO
    };

    let mut par = Par::new();
    par.eng.params.hsize = pts(100);
    par.eng.params.pretolerance = 10_000;
    par.word("aa");
    par.glue(bad);
    par.word("bb");
    par.glue(bad);
    par.word("cc");
    par.run();

    let warnings = par.eng.sink.warnings();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("infinite glue shrinkage"));

    // Every glue that survived carries a finite spec.
    for &b in &boxes(&par.eng) {
        let mut p = par.eng.arena.list_node(b).list;
        while p.exists() {
            if let Body::Glue(glue) = par.eng.arena.body(p) {
                assert_eq!(
                    par.eng.specs.get(glue.spec).shrink_order,
                    GlueOrder::Normal
                );
            }
            p = par.eng.arena.link(p);
        }
    }
}

#[test]
fn test_looseness_adds_a_line() {
    let lines_with = |looseness: i32, tolerance: i32| {
        let mut par = Par::new();
        par.eng.params.hsize = pts(100);
        par.eng.params.tolerance = tolerance;
        par.eng.params.looseness = looseness;
        par.text("abc de fgh ij");
        par.run();
        boxes(&par.eng).len()
    };

    assert_eq!(lines_with(0, 200), 2);
    assert_eq!(lines_with(0, 10_000), 2);
    assert_eq!(lines_with(1, 10_000), 3);
}

#[test]
fn test_etex_directional_break() {
    let mut par = Par::new();
    par.eng.params.hsize = pts(100);
    par.eng.params.texxet = 1;
    par.word("abc");
    par.space();
    par.math(BEGIN_L_CODE);
    par.word("de");
    par.space();
    par.word("fgh");
    par.space();
    par.word("ij");
    par.math(END_L_CODE);
    par.run();

    let boxes = boxes(&par.eng);
    assert_eq!(boxes.len(), 2);

    // The first line closes the still-open left-to-right segment at its
    // right end; the next line reopens it.
    let math_subtypes = |b: NodeRef| {
        let mut out = Vec::new();
        let mut p = par.eng.arena.list_node(b).list;
        while p.exists() {
            if let Body::Math(math) = par.eng.arena.body(p) {
                out.push(math.subtype);
            }
            p = par.eng.arena.link(p);
        }
        out
    };
    assert_eq!(math_subtypes(boxes[0]), vec![BEGIN_L_CODE, END_L_CODE]);
    assert_eq!(math_subtypes(boxes[1]), vec![BEGIN_L_CODE, END_L_CODE]);

    let first = par.eng.arena.list_node(boxes[1]).list;
    assert!(matches!(par.eng.arena.body(first), Body::Math(m) if m.subtype == BEGIN_L_CODE));
    assert!(par.eng.cur_list().etex_aux.is_empty());
}

#[test]
fn test_etex_residual_stack() {
    let mut par = Par::new();
    par.eng.params.hsize = pts(100);
    par.eng.params.texxet = 1;
    par.word("abc");
    par.space();
    par.math(BEGIN_L_CODE);
    par.word("de");
    par.space();
    par.word("fgh");
    par.space();
    par.word("ij");
    par.run();

    assert_eq!(par.eng.cur_list().etex_aux.as_slice(), &[END_L_CODE][..]);
}

#[test]
fn test_discretionary_break() {
    let mut par = Par::new();
    par.eng.params.hsize = pts(50);
    par.word("aaaa");
    par.hyphen_disc();
    par.word("bbbb");
    par.run();

    let boxes = boxes(&par.eng);
    assert_eq!(boxes.len(), 2);
    assert_eq!(line_text(&par.eng, boxes[0]), "aaaa-");
    assert_eq!(line_text(&par.eng, boxes[1]), "bbbb");

    // Interline, club, widow, and broken penalties all stack up here.
    assert_eq!(penalties(&par.eng), vec![150 + 150 + 100]);
}

#[test]
fn test_empty_discretionary_break() {
    let mut par = Par::new();
    par.eng.params.hsize = pts(40);
    par.word("aaaa");
    par.empty_disc();
    par.word("bbbb");
    par.run();

    let boxes = boxes(&par.eng);
    assert_eq!(boxes.len(), 2);
    assert_eq!(line_text(&par.eng, boxes[0]), "aaaa");
    assert_eq!(line_text(&par.eng, boxes[1]), "bbbb");
    // Still a hyphenated break: the broken penalty applies.
    assert_eq!(penalties(&par.eng), vec![150 + 150 + 100]);
}

#[test]
fn test_forced_and_forbidden_penalties() {
    let mut par = Par::new();
    par.eng.params.hsize = pts(200);
    par.word("aa");
    par.penalty(EJECT_PENALTY);
    par.word("bb");
    par.run();
    assert_eq!(boxes(&par.eng).len(), 2);

    let mut par = Par::new();
    par.eng.params.hsize = pts(200);
    par.word("aa");
    par.penalty(INF_PENALTY);
    par.space();
    par.word("bb");
    par.run();
    assert_eq!(boxes(&par.eng).len(), 1);
}

#[test]
fn test_three_perfect_lines_and_penalties() {
    let mut par = Par::new();
    par.eng.params.hsize = pts(100);
    par.text("abc de fgh abcde fghi ab");
    par.run();

    let boxes = boxes(&par.eng);
    assert_eq!(boxes.len(), 3);
    assert_eq!(line_text(&par.eng, boxes[0]), "abcdefgh");
    assert_eq!(line_text(&par.eng, boxes[1]), "abcdefghi");
    assert_eq!(line_text(&par.eng, boxes[2]), "ab");
    assert_eq!(penalties(&par.eng), vec![150, 150]);
    for &b in &boxes {
        assert_exact_fit(&par.eng, b);
    }
}

#[test]
fn test_penalty_lists_override_scalars() {
    let mut par = Par::new();
    par.eng.params.hsize = pts(100);
    par.eng.params.inter_line_penalties = Some(vec![5, 7]);
    par.eng.params.club_penalties = Some(vec![40]);
    par.text("abc de fgh abcde fghi ab");
    par.run();

    // Club entries clamp to the last value, so they apply on every line.
    assert_eq!(penalties(&par.eng), vec![5 + 40, 7 + 40 + 150]);
}

#[test]
fn test_par_shape() {
    let mut par = Par::new();
    par.eng.params.tolerance = 10_000;
    par.eng.params.par_shape = Some(vec![
        paragon_library::params::ShapeLine { indent: pts(10), width: pts(50) },
        paragon_library::params::ShapeLine { indent: Scaled::ZERO, width: pts(100) },
    ]);
    par.text("aaaa bbbb aaaa");
    par.run();

    let boxes = boxes(&par.eng);
    assert!(boxes.len() >= 2);
    let first = par.eng.arena.list_node(boxes[0]);
    assert_eq!(first.width, pts(50));
    assert_eq!(first.shift, pts(10));
    for &b in &boxes[1..] {
        let b = par.eng.arena.list_node(b);
        assert_eq!(b.width, pts(100));
        assert_eq!(b.shift, Scaled::ZERO);
    }
}

#[test]
fn test_hanging_indentation() {
    let mut par = Par::new();
    par.eng.params.tolerance = 10_000;
    par.eng.params.hsize = pts(100);
    par.eng.params.hang_indent = pts(20);
    par.eng.params.hang_after = 1;
    par.text("cccc cccc cccc cccc");
    par.run();

    let boxes = boxes(&par.eng);
    assert!(boxes.len() >= 2);
    let first = par.eng.arena.list_node(boxes[0]);
    assert_eq!(first.width, pts(100));
    assert_eq!(first.shift, Scaled::ZERO);
    for &b in &boxes[1..] {
        let b = par.eng.arena.list_node(b);
        assert_eq!(b.width, pts(80));
        assert_eq!(b.shift, pts(20));
    }
}

#[test]
fn test_emergency_pass() {
    // Neither "aaaa" alone nor both words on one line are acceptable, so
    // the breaker escalates. The emergency stretch makes the first line's
    // slack affordable for feasibility, though the packed line still
    // comes out underfull since the stretch is virtual.
    let mut par = Par::new();
    par.eng.params.hsize = pts(50);
    par.eng.params.emergency_stretch = pts(20);
    par.text("aaaa bbbb");
    par.run();

    let boxes = boxes(&par.eng);
    assert_eq!(boxes.len(), 2);
    assert_eq!(par.eng.arena.list_node(boxes[0]).width, pts(50));
    assert!(par.eng.sink.warnings().iter().any(|w| w.contains("underfull")));
}

#[test]
fn test_forced_overfull_without_emergency() {
    let mut par = Par::new();
    par.eng.params.hsize = pts(50);
    par.text("aaaa bbbb");
    par.run();

    // The final pass keeps one artificial candidate alive, so breaking
    // always terminates; the single line comes out overfull.
    let boxes = boxes(&par.eng);
    assert_eq!(boxes.len(), 1);
    assert!(par
        .eng
        .sink
        .warnings()
        .iter()
        .any(|w| w.contains("overfull")));
}

#[test]
fn test_protrusion_margin_kerns() {
    let mut font = test_font();
    font.set_protrusion('a', 0, 500);
    font.set_protrusion('b', 500, 0);

    let mut par = Par::new();
    par.eng.fonts[par.font.index()] = font;
    par.eng.params.hsize = pts(100);
    par.eng.params.protrude_chars = 1;
    par.word("bb");
    par.space();
    par.word("aa");
    par.run();

    let boxes = boxes(&par.eng);
    assert_eq!(boxes.len(), 1);
    let mut kerns = Vec::new();
    let mut p = par.eng.arena.list_node(boxes[0]).list;
    while p.exists() {
        if let Body::MarginKern(kern) = par.eng.arena.body(p) {
            kerns.push((kern.side, kern.width));
        }
        p = par.eng.arena.link(p);
    }
    use paragon_library::node::Side;
    assert_eq!(kerns, vec![(Side::Left, -pts(5)), (Side::Right, -pts(5))]);
}

#[test]
fn test_native_word_hyphenation() {
    let mut builder = TrieBuilder::new();
    builder.insert_exception(0, "xx-yy");

    let mut par = Par::new();
    par.eng.hyph = builder.build();
    par.hyphen_mins(1, 1);
    par.eng.params.hsize = pts(60);
    par.eng.params.pretolerance = -1;
    par.word("aa");
    par.space();
    par.native("xxyy");
    par.space();
    par.word("bb");
    par.run();

    let boxes = boxes(&par.eng);
    assert_eq!(boxes.len(), 2);
    assert_eq!(line_text(&par.eng, boxes[0]), "aaxx-");
    assert_eq!(line_text(&par.eng, boxes[1]), "yybb");
    for &b in &boxes {
        assert_exact_fit(&par.eng, b);
    }
}

#[test]
fn test_language_switch() {
    let mut builder = TrieBuilder::new();
    builder.insert_exception(1, "cc-cc");

    let mut par = Par::new();
    par.eng.hyph = builder.build();
    par.eng.params.hsize = pts(50);
    par.eng.params.pretolerance = -1;
    par.word("a");
    par.space();
    par.language(1, 1, 1);
    par.word("cccc");
    par.run();

    let boxes = boxes(&par.eng);
    assert_eq!(boxes.len(), 2);
    assert_eq!(line_text(&par.eng, boxes[0]), "acc-");
    assert_eq!(line_text(&par.eng, boxes[1]), "cc");
}

#[test]
fn test_adjust_and_mark_migration() {
    use paragon_library::node::{AdjustNode, MarkNode};

    let mut par = Par::new();
    par.eng.params.hsize = pts(100);
    par.word("aa");
    let pre_inner = par.eng.new_kern(pts(2), KernType::Explicit);
    let pre = par
        .eng
        .arena
        .alloc(Body::Adjust(AdjustNode { pre: true, list: pre_inner }));
    par.eng.tail_append(pre);
    let post_inner = par.eng.new_kern(pts(3), KernType::Explicit);
    let post = par
        .eng
        .arena
        .alloc(Body::Adjust(AdjustNode { pre: false, list: post_inner }));
    par.eng.tail_append(post);
    let mark = par.eng.arena.alloc(Body::Mark(MarkNode { class: 7 }));
    par.eng.tail_append(mark);
    par.word("bb");
    par.run();

    // Pre-adjust material lands before its line, the rest after it.
    let mut kinds = Vec::new();
    let mut p = par.eng.arena.link(par.eng.cur_list().head);
    while p.exists() {
        kinds.push(par.eng.arena.kind(p));
        p = par.eng.arena.link(p);
    }
    assert_eq!(
        kinds,
        vec![NodeKind::Kern, NodeKind::List, NodeKind::Kern, NodeKind::Mark]
    );
    // The migrated material does not occupy line width.
    assert_eq!(line_text(&par.eng, boxes(&par.eng)[0]), "aabb");
}

#[test]
fn test_no_leaks_and_refcount_conservation() {
    let mut par = Par::new();
    par.eng.params.hsize = pts(100);
    par.word("aaaa");
    par.hyphen_disc();
    par.word("bb");
    par.space();
    par.text("cc dd ee");
    par.run();

    flush_output(&mut par.eng);
    // Only the five sentinels and the vertical list head stay live, and
    // only the three glue parameters keep their references.
    assert_eq!(par.eng.arena.live(), 6);
    assert_eq!(par.eng.specs.total_refs(), 3);
}

#[test]
fn test_determinism() {
    let run = || {
        let mut builder = TrieBuilder::new();
        builder.insert_pattern(0, "a1b");
        builder.insert_exception(0, "su-per");

        let mut par = Par::new();
        par.eng.hyph = builder.build();
        par.eng.params.hsize = pts(70);
        par.eng.params.pretolerance = -1;
        par.eng.params.tolerance = 10_000;
        par.text("super aab super aab super");
        par.run();
        snapshot(&par.eng)
    };
    assert_eq!(run(), run());
}

#[test]
fn test_reconstitution_round_trip() {
    let mut eng = Engine::new();
    let font = eng.new_font(test_font());

    let head = LineBreaker::reconstitute_only(
        &mut eng,
        font,
        "abc",
        paragon_library::node::TOO_BIG_CHAR,
    );
    let mut chars = Vec::new();
    let mut width = Scaled::ZERO;
    let mut p = eng.arena.link(head);
    while p.exists() {
        match eng.arena.body(p) {
            Body::Char(chr) => {
                chars.push(char::from_u32(chr.chr as u32).unwrap());
                width += eng.char_width(chr.font, chr.chr);
            }
            other => panic!("unexpected {:?} node", other.kind()),
        }
        p = eng.arena.link(p);
    }
    assert_eq!(chars, vec!['a', 'b', 'c']);
    assert_eq!(width, pts(30));
}

#[test]
fn test_reconstitution_ligature() {
    let mut font = test_font();
    font.define_char('F', pts(12));
    font.lig_kern_program(
        'f' as i32,
        &[LigKernStep {
            next: 'i' as u16,
            op: 0,
            rem: 'F' as u16,
            ..Default::default()
        }],
    );

    let mut eng = Engine::new();
    let font = eng.new_font(font);
    let head = LineBreaker::reconstitute_only(
        &mut eng,
        font,
        "fix",
        paragon_library::node::TOO_BIG_CHAR,
    );

    let first = eng.arena.link(head);
    let lig = eng.arena.ligature(first);
    assert_eq!(lig.chr, 'F' as i32);

    // The ligature keeps its original characters for unravelling.
    let mut originals = Vec::new();
    let mut p = lig.lig;
    while p.exists() {
        originals.push(eng.arena.char_node(p).chr);
        p = eng.arena.link(p);
    }
    assert_eq!(originals, vec!['f' as i32, 'i' as i32]);

    let second = eng.arena.link(first);
    assert_eq!(eng.arena.char_node(second).chr, 'x' as i32);
    assert!(eng.arena.link(second).is_null());
}

#[test]
fn test_reconstitution_cascade_without_pending_ligature() {
    // The very first matched rule is a cascade opcode. Nothing is pending,
    // so the already-emitted character must stay a plain character node;
    // only a fresh ligature begins, and the right participant is left in
    // place for rematching.
    let mut font = test_font();
    font.define_char('A', pts(11));
    font.lig_kern_program(
        'f' as i32,
        &[LigKernStep {
            next: 'f' as u16,
            op: 7,
            rem: 'A' as u16,
            ..Default::default()
        }],
    );

    let mut eng = Engine::new();
    let font = eng.new_font(font);
    let head = LineBreaker::reconstitute_only(
        &mut eng,
        font,
        "ffi",
        paragon_library::node::TOO_BIG_CHAR,
    );

    let first = eng.arena.link(head);
    assert_eq!(eng.arena.char_node(first).chr, 'f' as i32);

    let second = eng.arena.link(first);
    let lig = eng.arena.ligature(second);
    assert_eq!(lig.chr, 'A' as i32);
    assert!(lig.lig.is_null());

    let third = eng.arena.link(second);
    assert_eq!(eng.arena.char_node(third).chr, 'f' as i32);
    let fourth = eng.arena.link(third);
    assert_eq!(eng.arena.char_node(fourth).chr, 'i' as i32);
    assert!(eng.arena.link(fourth).is_null());
}

#[test]
fn test_reconstitution_cascade_commits_pending_ligature() {
    // f + f fuses into a pending F; F + i then cascades. The pending
    // ligature is committed with both original characters before the new
    // one begins, and i stays unconsumed.
    let mut font = test_font();
    font.define_char('F', pts(12));
    font.define_char('G', pts(13));
    font.lig_kern_program(
        'f' as i32,
        &[LigKernStep {
            next: 'f' as u16,
            op: 0,
            rem: 'F' as u16,
            ..Default::default()
        }],
    );
    font.lig_kern_program(
        'F' as i32,
        &[LigKernStep {
            next: 'i' as u16,
            op: 7,
            rem: 'G' as u16,
            ..Default::default()
        }],
    );

    let mut eng = Engine::new();
    let font = eng.new_font(font);
    let head = LineBreaker::reconstitute_only(
        &mut eng,
        font,
        "ffi",
        paragon_library::node::TOO_BIG_CHAR,
    );

    let first = eng.arena.link(head);
    let committed = eng.arena.ligature(first);
    assert_eq!(committed.chr, 'F' as i32);
    let mut originals = Vec::new();
    let mut p = committed.lig;
    while p.exists() {
        originals.push(eng.arena.char_node(p).chr);
        p = eng.arena.link(p);
    }
    assert_eq!(originals, vec!['f' as i32, 'f' as i32]);

    let second = eng.arena.link(first);
    let cascade = eng.arena.ligature(second);
    assert_eq!(cascade.chr, 'G' as i32);
    assert!(cascade.lig.is_null());

    let third = eng.arena.link(second);
    assert_eq!(eng.arena.char_node(third).chr, 'i' as i32);
    assert!(eng.arena.link(third).is_null());
}

#[test]
fn test_reconstitution_kern() {
    let mut font = test_font();
    let (op, rem) = font.define_kern(pts(2));
    font.lig_kern_program(
        'a' as i32,
        &[LigKernStep { next: 'b' as u16, op, rem, ..Default::default() }],
    );

    let mut eng = Engine::new();
    let font = eng.new_font(font);
    let head = LineBreaker::reconstitute_only(
        &mut eng,
        font,
        "ab",
        paragon_library::node::TOO_BIG_CHAR,
    );

    let a = eng.arena.link(head);
    assert_eq!(eng.arena.char_node(a).chr, 'a' as i32);
    let kern = eng.arena.link(a);
    assert_eq!(eng.arena.kern_node(kern).width, pts(2));
    assert_eq!(eng.arena.kern_node(kern).subtype, KernType::Normal);
    let b = eng.arena.link(kern);
    assert_eq!(eng.arena.char_node(b).chr, 'b' as i32);
}

#[test]
fn test_pattern_weights() {
    let mut builder = TrieBuilder::new();
    builder.insert_pattern(0, "a1b");
    let mut eng = Engine::new();
    eng.hyph = builder.build();

    let weights = LineBreaker::annotate_only(&mut eng, 0, "aab", 1, 1);
    assert_eq!(weights, Some(vec![0, 1, 0]));

    // No permitted position at all: the word comes back unchanged.
    let weights = LineBreaker::annotate_only(&mut eng, 0, "xyz", 1, 1);
    assert_eq!(weights, None);
}

#[test]
fn test_exception_precedence_over_patterns() {
    let mut builder = TrieBuilder::new();
    builder.insert_pattern(0, "ab3c");
    builder.insert_exception(0, "abcd");
    builder.insert_exception(0, "a-bcd");

    let mut eng = Engine::new();
    eng.hyph = builder.build();

    // "abcd" is listed with no break positions: the pattern would have
    // allowed one, but the exception wins.
    let weights = LineBreaker::annotate_only(&mut eng, 0, "abcd", 1, 1);
    assert_eq!(weights, None);

    // Patterns still apply to words that are not exceptions.
    let weights = LineBreaker::annotate_only(&mut eng, 0, "abcx", 1, 1);
    assert_eq!(weights, Some(vec![0, 3, 0, 0]));
}

#[test]
fn test_hyphenation_masking() {
    let mut builder = TrieBuilder::new();
    builder.insert_exception(0, "a-b-c-d");
    let mut eng = Engine::new();
    eng.hyph = builder.build();

    let weights = LineBreaker::annotate_only(&mut eng, 0, "abcd", 2, 2);
    assert_eq!(weights, Some(vec![0, 1, 0, 0]));
}
