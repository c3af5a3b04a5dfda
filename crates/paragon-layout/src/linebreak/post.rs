//! Post-break assembly.
//!
//! Once the feasibility engine has picked a chain of breakpoints, the
//! chosen passive nodes are reversed into forward order and the paragraph
//! is cut up: each break node is transformed (glue becomes the right
//! skip, discretionaries splice their texts in, kerns and direction nodes
//! lose their width), margins and protrusion kerns are attached, the line
//! is packed to its exact target width, and inter-line penalties follow
//! it into the vertical list.

use paragon_library::arena::NodeRef;
use paragon_library::diag::{confusion, StrResult};
use paragon_library::engine::LrStack;
use paragon_library::glue::GlueSpec;
use paragon_library::node::{
    end_lr_type, is_lr_end, GluePar, KernType, NodeKind, Side,
};
use paragon_library::params::penalty_list;
use paragon_utils::Scaled;

use super::pack::hpack_exactly;
use super::LineBreaker;

fn track_lr(lr_ptr: &mut LrStack, subtype: u16) {
    if is_lr_end(subtype) {
        if lr_ptr.last() == Some(&end_lr_type(subtype)) {
            lr_ptr.pop();
        }
    } else {
        lr_ptr.push(end_lr_type(subtype));
    }
}

impl LineBreaker<'_> {
    pub(super) fn post_line_break(&mut self, d: bool) -> StrResult<()> {
        let texxet = self.eng.params.texxet > 0;
        let mut lr_ptr: LrStack = std::mem::take(&mut self.eng.cur_list_mut().etex_aux);

        // Turn the chosen chain of passive nodes around: it was recorded
        // back to front.
        let mut q = self.eng.arena.active(self.best_bet).break_node;
        self.cur_p = NodeRef::NULL;
        loop {
            let r = q;
            q = self.eng.arena.passive(q).prev_break;
            self.set_link(r, self.cur_p);
            self.cur_p = r;
            if q.is_null() {
                break;
            }
        }

        let temp_head = self.eng.temp_head;
        let mut cur_line = self.eng.cur_list().prev_graf + 1;

        loop {
            if texxet {
                // Reopen direction contexts that the previous line left
                // hanging, and track the ones this line touches.
                let mut q = self.link(temp_head);
                if !lr_ptr.is_empty() {
                    let mut s = temp_head;
                    for &code in lr_ptr.iter() {
                        let m = self.eng.new_math(Scaled::ZERO, code - 1);
                        self.set_link(s, m);
                        s = m;
                    }
                    self.set_link(s, q);
                }
                let stop = self.eng.arena.passive(self.cur_p).cur_break;
                while q != stop {
                    if !self.is_char(q) && self.kind(q) == NodeKind::Math {
                        let subtype = self.eng.arena.math(q).subtype;
                        track_lr(&mut lr_ptr, subtype);
                    }
                    q = self.link(q);
                }
            }

            // Transform the node at the break.
            let mut q = self.eng.arena.passive(self.cur_p).cur_break;
            let mut disc_break = false;
            let mut post_disc_break = false;
            let mut glue_break = false;

            if q.is_null() {
                q = temp_head;
                while self.link(q).exists() {
                    q = self.link(q);
                }
            } else {
                match self.kind(q) {
                    NodeKind::Glue => {
                        let old = self.eng.arena.glue_node(q).spec;
                        self.eng.specs.delete_ref(old);
                        let right_skip = self.eng.params.right_skip;
                        self.eng.specs.add_ref(right_skip);
                        let glue = self.eng.arena.glue_node_mut(q);
                        glue.spec = right_skip;
                        glue.param = Some(GluePar::RightSkip);
                        glue_break = true;
                    }
                    NodeKind::Disc => {
                        let replace = self.eng.arena.disc(q).replace;
                        let mut r;
                        if replace == 0 {
                            r = self.link(q);
                        } else {
                            // Cut the replaced span out and release it.
                            let mut t = replace;
                            r = q;
                            while t > 1 {
                                r = self.link(r);
                                t -= 1;
                            }
                            let s = self.link(r);
                            r = self.link(s);
                            self.set_link(s, NodeRef::NULL);
                            let span = self.link(q);
                            self.eng.flush_node_list(span);
                            self.eng.arena.disc_mut(q).replace = 0;
                        }
                        let post = self.eng.arena.disc(q).post;
                        if post.exists() {
                            let mut s = post;
                            while self.link(s).exists() {
                                s = self.link(s);
                            }
                            self.set_link(s, r);
                            r = post;
                            self.eng.arena.disc_mut(q).post = NodeRef::NULL;
                            post_disc_break = true;
                        }
                        let pre = self.eng.arena.disc(q).pre;
                        if pre.exists() {
                            self.set_link(q, pre);
                            let mut s = pre;
                            while self.link(s).exists() {
                                s = self.link(s);
                            }
                            self.eng.arena.disc_mut(q).pre = NodeRef::NULL;
                            q = s;
                        }
                        self.set_link(q, r);
                        disc_break = true;
                    }
                    NodeKind::Kern => {
                        self.eng.arena.kern_node_mut(q).width = Scaled::ZERO;
                    }
                    NodeKind::Math => {
                        self.eng.arena.math_mut(q).width = Scaled::ZERO;
                        if texxet {
                            let subtype = self.eng.arena.math(q).subtype;
                            track_lr(&mut lr_ptr, subtype);
                        }
                    }
                    _ => {}
                }
            }

            // Protrude the last character into the right margin.
            if self.eng.params.protrude_chars > 0 {
                let (p, ptmp) = if disc_break
                    && (self.is_char(q) || self.kind(q) != NodeKind::Disc)
                {
                    (q, q)
                } else {
                    let head = self.link(temp_head);
                    let p = self.prev_rightmost(head, q);
                    (self.find_protchar_right(head, p), p)
                };
                let w = self.char_pw(p, Side::Right);
                if !w.is_zero() {
                    let k = self.eng.new_margin_kern(-w, Side::Right);
                    let after = self.link(ptmp);
                    self.set_link(k, after);
                    self.set_link(ptmp, k);
                    if ptmp == q {
                        q = self.link(q);
                    }
                }
            }

            if !glue_break {
                let r = self.eng.new_param_glue(GluePar::RightSkip);
                let after = self.link(q);
                self.set_link(r, after);
                self.set_link(q, r);
                q = r;
            }

            if texxet && !lr_ptr.is_empty() {
                // Close every open context before the line ends.
                let mut s = temp_head;
                while self.link(s) != q {
                    s = self.link(s);
                }
                for &code in lr_ptr.iter().rev() {
                    let m = self.eng.new_math(Scaled::ZERO, code);
                    self.set_link(s, m);
                    s = m;
                }
                self.set_link(s, q);
            }

            // Detach the finished line and attach the left margin.
            let r = self.link(q);
            self.set_link(q, NodeRef::NULL);
            let mut line = self.link(temp_head);
            self.set_link(temp_head, r);

            if self.eng.params.protrude_chars > 0 {
                let p = self.find_protchar_left(line);
                let w = self.char_pw(p, Side::Left);
                if !w.is_zero() {
                    let k = self.eng.new_margin_kern(-w, Side::Left);
                    self.set_link(k, line);
                    line = k;
                }
            }

            if *self.eng.specs.get(self.eng.params.left_skip) != GlueSpec::ZERO {
                let r = self.eng.new_param_glue(GluePar::LeftSkip);
                self.set_link(r, line);
                line = r;
            }

            // Package the line at its target width, with adjustments
            // migrating out around it.
            let (cur_width, cur_indent) = if cur_line > self.last_special_line {
                (self.second_width, self.second_indent)
            } else if let Some(shape) = &self.eng.params.par_shape {
                let entry = shape[(cur_line - 1) as usize];
                (entry.width, entry.indent)
            } else {
                (self.first_width, self.first_indent)
            };

            self.eng.adjust_tail = self.eng.adjust_head;
            self.eng.pre_adjust_tail = self.eng.pre_adjust_head;
            let just_box = hpack_exactly(self.eng, line, cur_width);
            self.eng.arena.list_node_mut(just_box).shift = cur_indent;
            self.eng.just_box = just_box;

            let pre_adjust_head = self.eng.pre_adjust_head;
            if self.eng.pre_adjust_tail != pre_adjust_head {
                let first = self.link(pre_adjust_head);
                let tail = self.eng.cur_list().tail;
                self.set_link(tail, first);
                self.eng.cur_list_mut().tail = self.eng.pre_adjust_tail;
                self.set_link(pre_adjust_head, NodeRef::NULL);
            }
            self.eng.pre_adjust_tail = NodeRef::NULL;

            self.eng.append_to_vlist(just_box);

            let adjust_head = self.eng.adjust_head;
            if self.eng.adjust_tail != adjust_head {
                let first = self.link(adjust_head);
                let tail = self.eng.cur_list().tail;
                self.set_link(tail, first);
                self.eng.cur_list_mut().tail = self.eng.adjust_tail;
                self.set_link(adjust_head, NodeRef::NULL);
            }
            self.eng.adjust_tail = NodeRef::NULL;

            // Penalties between this line and the next.
            if cur_line + 1 != self.best_line {
                let params = &self.eng.params;
                let prev_graf = self.eng.cur_list().prev_graf;

                let mut pen = penalty_list(&params.inter_line_penalties, cur_line)
                    .unwrap_or(params.inter_line_penalty);

                if let Some(club) =
                    penalty_list(&params.club_penalties, cur_line - prev_graf)
                {
                    pen += club;
                } else if cur_line == prev_graf + 1 {
                    pen += params.club_penalty;
                }

                let widow_list = if d {
                    &params.display_widow_penalties
                } else {
                    &params.widow_penalties
                };
                if let Some(widow) =
                    penalty_list(widow_list, self.best_line - cur_line - 1)
                {
                    pen += widow;
                } else if cur_line + 2 == self.best_line {
                    pen +=
                        if d { params.display_widow_penalty } else { params.widow_penalty };
                }

                if disc_break {
                    pen += params.broken_penalty;
                }

                if pen != 0 {
                    let r = self.eng.new_penalty(pen);
                    self.eng.tail_append(r);
                }
            }

            cur_line += 1;
            self.cur_p = self.link(self.cur_p);

            if self.cur_p.exists() && !post_disc_break {
                // Discard glue and other breakable material at the head of
                // the next line, keeping an eye on direction nodes.
                let mut r = temp_head;
                let q = loop {
                    let q = self.link(r);
                    if q == self.eng.arena.passive(self.cur_p).cur_break
                        || self.is_char(q)
                        || !self.eng.arena.body(q).is_discardable()
                    {
                        break q;
                    }
                    if self.kind(q) == NodeKind::Kern {
                        let subtype = self.eng.arena.kern_node(q).subtype;
                        if subtype != KernType::Explicit
                            && subtype != KernType::SpaceAdjustment
                        {
                            break q;
                        }
                    }
                    r = q;
                    if texxet && self.kind(q) == NodeKind::Math {
                        let subtype = self.eng.arena.math(q).subtype;
                        track_lr(&mut lr_ptr, subtype);
                    }
                };
                if r != temp_head {
                    self.set_link(r, NodeRef::NULL);
                    let head = self.link(temp_head);
                    self.eng.flush_node_list(head);
                    self.set_link(temp_head, q);
                }
            }

            if self.cur_p.is_null() {
                break;
            }
        }

        if cur_line != self.best_line || self.link(temp_head).exists() {
            return Err(confusion("line breaking"));
        }
        self.eng.cur_list_mut().prev_graf = self.best_line - 1;
        self.eng.cur_list_mut().etex_aux = lr_ptr;
        Ok(())
    }
}
