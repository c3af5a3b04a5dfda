//! Packing lines into boxes, and character protrusion.

use ecow::eco_format;
use paragon_library::arena::NodeRef;
use paragon_library::engine::Engine;
use paragon_library::glue::GlueOrder;
use paragon_library::node::{
    Body, GlueSign, ListNode, NodeKind, Side, Whatsit,
};
use paragon_utils::{xn_over_d, Scaled};

use super::LineBreaker;

/// Packs a horizontal list into a box of exactly `target` width.
///
/// The glue in the list is set to stretch or shrink as needed; material
/// that belongs to the enclosing vertical list (inserts, marks,
/// adjustments) migrates out through the engine's armed adjustment tails.
/// Overfull and underfull lines are reported through the sink.
pub(super) fn hpack_exactly(eng: &mut Engine, list: NodeRef, target: Scaled) -> NodeRef {
    let mut head = list;
    let mut natural = Scaled::ZERO;
    let mut height = Scaled::ZERO;
    let mut depth = Scaled::ZERO;
    let mut stretch = [Scaled::ZERO; 4];
    let mut shrink = [Scaled::ZERO; 4];

    let mut prev = NodeRef::NULL;
    let mut p = head;
    while p.exists() {
        let next = eng.arena.link(p);
        let mut migrated = false;

        match eng.arena.kind(p) {
            NodeKind::Char => {
                let chr = eng.arena.char_node(p).clone();
                let font = &eng.fonts[chr.font.index()];
                natural += font.char_width(chr.chr);
                height = height.max(font.ascent);
                depth = depth.max(font.descent);
            }
            NodeKind::Ligature => {
                let lig = eng.arena.ligature(p).clone();
                let font = &eng.fonts[lig.font.index()];
                natural += font.char_width(lig.chr);
                height = height.max(font.ascent);
                depth = depth.max(font.descent);
            }
            NodeKind::List => {
                let inner = eng.arena.list_node(p);
                natural += inner.width;
                height = height.max(inner.height - inner.shift);
                depth = depth.max(inner.depth + inner.shift);
            }
            NodeKind::Rule => {
                if let Body::Rule(rule) = eng.arena.body(p) {
                    natural += rule.width;
                    height = height.max(rule.height);
                    depth = depth.max(rule.depth);
                }
            }
            NodeKind::Glue => {
                let spec = *eng.specs.get(eng.arena.glue_node(p).spec);
                natural += spec.width;
                stretch[spec.stretch_order.index()] += spec.stretch;
                shrink[spec.shrink_order.index()] += spec.shrink;
            }
            NodeKind::Kern => natural += eng.arena.kern_node(p).width,
            NodeKind::MarginKern => {
                if let Body::MarginKern(kern) = eng.arena.body(p) {
                    natural += kern.width;
                }
            }
            NodeKind::Math => natural += eng.arena.math(p).width,
            NodeKind::Whatsit => {
                let (width, extent_font) = match eng.arena.body(p) {
                    Body::Whatsit(whatsit) => {
                        let font = match whatsit {
                            Whatsit::NativeWord(word) => Some(word.font),
                            _ => None,
                        };
                        (whatsit.width(), font)
                    }
                    _ => (None, None),
                };
                if let Some(width) = width {
                    natural += width;
                }
                if let Some(font) = extent_font {
                    let font = &eng.fonts[font.index()];
                    height = height.max(font.ascent);
                    depth = depth.max(font.descent);
                }
            }
            NodeKind::Ins | NodeKind::Mark => {
                if eng.adjust_tail.exists() {
                    // The node itself migrates to the post-line material.
                    unlink(eng, &mut head, prev, next);
                    let tail = eng.adjust_tail;
                    eng.arena.set_link(tail, p);
                    eng.arena.set_link(p, NodeRef::NULL);
                    eng.adjust_tail = p;
                    migrated = true;
                }
            }
            NodeKind::Adjust => {
                if eng.adjust_tail.exists() {
                    // Only the adjustment's contents migrate; the shell is
                    // discarded.
                    let (pre, inner) = match eng.arena.body(p) {
                        Body::Adjust(adjust) => (adjust.pre, adjust.list),
                        _ => unreachable!(),
                    };
                    unlink(eng, &mut head, prev, next);
                    if inner.exists() {
                        let tail =
                            if pre { eng.pre_adjust_tail } else { eng.adjust_tail };
                        eng.arena.set_link(tail, inner);
                        let mut t = inner;
                        while eng.arena.link(t).exists() {
                            t = eng.arena.link(t);
                        }
                        if pre {
                            eng.pre_adjust_tail = t;
                        } else {
                            eng.adjust_tail = t;
                        }
                    }
                    eng.arena.free(p);
                    migrated = true;
                }
            }
            _ => {}
        }

        if !migrated {
            prev = p;
        }
        p = next;
    }

    let mut boxed = ListNode::hbox();
    boxed.width = target;
    boxed.height = height;
    boxed.depth = depth;
    boxed.list = head;

    let excess = target - natural;
    if excess > Scaled::ZERO {
        match highest_order(&stretch) {
            Some(order) => {
                boxed.glue_sign = GlueSign::Stretching;
                boxed.glue_order = order;
                boxed.glue_set =
                    excess.raw() as f64 / stretch[order.index()].raw() as f64;
                if order == GlueOrder::Normal {
                    let b = paragon_utils::badness(excess, stretch[order.index()]);
                    if b > 100 {
                        eng.sink.warn(eco_format!(
                            "underfull box (badness {}) in paragraph at line {}",
                            b,
                            eng.pack_begin_line,
                        ));
                    }
                }
            }
            None => {
                eng.sink.warn(eco_format!(
                    "underfull box ({} too short) in paragraph at line {}",
                    excess,
                    eng.pack_begin_line,
                ));
            }
        }
    } else if excess < Scaled::ZERO {
        match highest_order(&shrink) {
            Some(GlueOrder::Normal) if shrink[0] < -excess => {
                boxed.glue_sign = GlueSign::Shrinking;
                boxed.glue_order = GlueOrder::Normal;
                boxed.glue_set = 1.0;
                eng.sink.warn(eco_format!(
                    "overfull box ({} too wide) in paragraph at line {}",
                    -excess - shrink[0],
                    eng.pack_begin_line,
                ));
            }
            Some(order) => {
                boxed.glue_sign = GlueSign::Shrinking;
                boxed.glue_order = order;
                boxed.glue_set =
                    (-excess).raw() as f64 / shrink[order.index()].raw() as f64;
            }
            None => {
                eng.sink.warn(eco_format!(
                    "overfull box ({} too wide) in paragraph at line {}",
                    -excess,
                    eng.pack_begin_line,
                ));
            }
        }
    }

    eng.arena.alloc(Body::List(boxed))
}

fn unlink(eng: &mut Engine, head: &mut NodeRef, prev: NodeRef, next: NodeRef) {
    if prev.is_null() {
        *head = next;
    } else {
        eng.arena.set_link(prev, next);
    }
}

/// The highest infinity order with any flexibility, if there is any.
fn highest_order(totals: &[Scaled; 4]) -> Option<GlueOrder> {
    [GlueOrder::Filll, GlueOrder::Fill, GlueOrder::Fil, GlueOrder::Normal]
        .into_iter()
        .find(|order| !totals[order.index()].is_zero())
}

impl LineBreaker<'_> {
    /// The protrusion width of the character at `p` on the given side.
    pub(super) fn char_pw(&self, p: NodeRef, side: Side) -> Scaled {
        if p.is_null() {
            return Scaled::ZERO;
        }
        let (font, chr) = match self.eng.arena.body(p) {
            Body::Char(chr) => (chr.font, chr.chr),
            Body::Ligature(lig) => (lig.font, lig.chr),
            Body::Whatsit(Whatsit::NativeWord(word)) if !word.text.is_empty() => {
                let chr = match side {
                    Side::Left => word.usv_at(0),
                    Side::Right => {
                        let mut i = word.text.len() - 1;
                        if i > 0 && (0xDC00..0xE000).contains(&word.text[i]) {
                            i -= 1;
                        }
                        word.usv_at(i)
                    }
                };
                (word.font, chr)
            }
            _ => return Scaled::ZERO,
        };
        let font = self.eng.font(font);
        let code = match side {
            Side::Left => font.lp_code(chr),
            Side::Right => font.rp_code(chr),
        };
        if code == 0 {
            return Scaled::ZERO;
        }
        xn_over_d(font.char_width(chr), code, 1000).unwrap_or(Scaled::ZERO)
    }

    /// The first node of a line that can protrude into the left margin.
    pub(super) fn find_protchar_left(&self, mut p: NodeRef) -> NodeRef {
        while p.exists() && self.protrusion_skippable(p) {
            p = self.link(p);
        }
        p
    }

    /// The last node before `p` that can protrude into the right margin.
    pub(super) fn find_protchar_right(&self, head: NodeRef, mut p: NodeRef) -> NodeRef {
        while p.exists() && self.protrusion_skippable(p) {
            p = self.prev_rightmost(head, p);
        }
        p
    }

    fn protrusion_skippable(&self, p: NodeRef) -> bool {
        match self.eng.arena.body(p) {
            Body::Glue(_) | Body::Penalty(_) | Body::MarginKern(_) => true,
            Body::Kern(kern) => kern.width.is_zero(),
            Body::Math(math) => math.width.is_zero(),
            Body::Whatsit(Whatsit::Language(_)) => true,
            Body::List(list) => list.list.is_null() && list.width.is_zero(),
            _ => false,
        }
    }

    /// The node whose link is `p`, searching from `head`; null if `p`
    /// does not occur after `head`.
    pub(super) fn prev_rightmost(&self, head: NodeRef, p: NodeRef) -> NodeRef {
        if head == p {
            return NodeRef::NULL;
        }
        let mut q = head;
        while q.exists() && self.link(q) != p {
            q = self.link(q);
        }
        q
    }

    /// The total protrusion a line from active node `r` to the current
    /// scan position would have on both margins.
    pub(super) fn total_pw(&self, r: NodeRef) -> Scaled {
        let break_node = self.eng.arena.active(r).break_node;
        let mut l = if break_node.is_null() {
            self.first_p
        } else {
            self.eng.arena.passive(break_node).cur_break
        };

        let p = self.cur_p;
        let breaking_at_disc = p.exists()
            && self.kind(p) == NodeKind::Disc
            && self.eng.arena.disc(p).pre.exists();
        let right = if breaking_at_disc {
            // The line would end with the discretionary's pre-break text.
            let mut t = self.eng.arena.disc(p).pre;
            while self.link(t).exists() {
                t = self.link(t);
            }
            t
        } else {
            let before = self.prev_rightmost(self.global_prev_p, p);
            self.find_protchar_right(l, before)
        };

        // A line starting at a taken discretionary starts with its
        // post-break text, past the replaced span.
        if l.exists() && self.kind(l) == NodeKind::Disc {
            let disc = self.eng.arena.disc(l).clone();
            if disc.post.exists() {
                l = disc.post;
            } else {
                l = self.link(l);
                for _ in 0..disc.replace {
                    l = self.link(l);
                }
            }
        }
        let left = self.find_protchar_left(l);

        self.char_pw(left, Side::Left) + self.char_pw(right, Side::Right)
    }
}
