//! The feasibility engine.
//!
//! `try_break` is told about every legal breakpoint as the driver reaches
//! it. It walks the circular active list, computing for each surviving
//! candidate how a line from that candidate to here would look, keeps the
//! cheapest chain per fitness class, and drops candidates that can no
//! longer lead anywhere. Delta nodes between active nodes carry the width
//! differences that let one walk maintain the running totals incrementally.

use paragon_library::arena::NodeRef;
use paragon_library::diag::StrResult;
use paragon_library::node::{
    ActiveNode, Body, BreakType, DeltaNode, FitClass, KernType, NodeKind, PassiveNode,
    AWFUL_BAD, EJECT_PENALTY, INF_PENALTY,
};
use paragon_library::widths::WidthVec;
use paragon_utils::{badness, fract, Scaled, INF_BAD};

use super::LineBreaker;

impl LineBreaker<'_> {
    /// Announces that the node just before `cur_p` is a legal break with
    /// penalty `pi`.
    pub(super) fn try_break(&mut self, mut pi: i32, break_type: BreakType) -> StrResult<()> {
        if pi.abs() >= INF_PENALTY {
            if pi > 0 {
                return Ok(());
            }
            pi = EJECT_PENALTY;
        }

        let active_head = self.eng.active_head;
        let mut no_break_yet = true;
        let mut prev_r = active_head;
        let mut prev_prev_r = NodeRef::NULL;
        let mut old_l = 0;
        let mut line_width = Scaled::ZERO;
        let mut cur_active_width = self.active_width;

        loop {
            let r = self.link(prev_r);
            if self.kind(r) == NodeKind::Delta {
                cur_active_width += self.eng.arena.delta(r).widths;
                prev_prev_r = prev_r;
                prev_r = r;
                continue;
            }

            let l = self.eng.arena.active(r).line_number;
            if l > old_l {
                // We have moved on to candidates ending a later line;
                // commit the winners gathered for the previous one.
                if self.minimum_demerits < AWFUL_BAD
                    && (old_l != self.easy_line || r == active_head)
                {
                    if no_break_yet {
                        no_break_yet = false;
                        self.compute_break_width(break_type)?;
                    }

                    // Keep the running-width invariant across the insertion
                    // point: fold the correction into a neighboring delta
                    // or materialize new ones.
                    if self.kind(prev_r) == NodeKind::Delta {
                        let adjust = self.break_width - cur_active_width;
                        self.eng.arena.delta_mut(prev_r).widths += adjust;
                    } else if prev_r == active_head {
                        self.active_width = self.break_width;
                    } else {
                        let q = self.eng.arena.alloc(Body::Delta(DeltaNode {
                            widths: self.break_width - cur_active_width,
                        }));
                        self.set_link(q, r);
                        self.set_link(prev_r, q);
                        prev_prev_r = prev_r;
                        prev_r = q;
                    }

                    let adj = self.eng.params.adj_demerits.abs();
                    if adj >= AWFUL_BAD - self.minimum_demerits {
                        self.minimum_demerits = AWFUL_BAD - 1;
                    } else {
                        self.minimum_demerits += adj;
                    }

                    for fit_class in FitClass::ALL {
                        let c = fit_class.index();
                        if self.minimal_demerits[c] <= self.minimum_demerits {
                            let q = self.eng.arena.alloc(Body::Passive(PassiveNode {
                                cur_break: self.cur_p,
                                prev_break: self.best_place[c],
                            }));
                            self.set_link(q, self.passive);
                            self.passive = q;

                            let node = self.eng.arena.alloc(Body::Active(ActiveNode {
                                break_type,
                                fitness: fit_class,
                                break_node: q,
                                line_number: self.best_pl_line[c] + 1,
                                total_demerits: self.minimal_demerits[c],
                                shortfall: self.best_pl_short[c],
                                glue: self.best_pl_glue[c],
                            }));
                            self.set_link(node, r);
                            self.set_link(prev_r, node);
                            prev_r = node;
                        }
                        self.minimal_demerits[c] = AWFUL_BAD;
                    }
                    self.minimum_demerits = AWFUL_BAD;

                    if r != active_head {
                        let q = self.eng.arena.alloc(Body::Delta(DeltaNode {
                            widths: cur_active_width - self.break_width,
                        }));
                        self.set_link(q, r);
                        self.set_link(prev_r, q);
                        prev_prev_r = prev_r;
                        prev_r = q;
                    }
                }

                if r == active_head {
                    return Ok(());
                }
                if l > self.easy_line {
                    line_width = self.second_width;
                    old_l = AWFUL_BAD - 1;
                } else {
                    old_l = l;
                    line_width = self.line_width_for(l);
                }
            }

            // How would a line from r to here look?
            let mut artificial_demerits = false;
            let mut shortfall = line_width - cur_active_width.width;
            if self.eng.params.protrude_chars > 1 {
                shortfall += self.total_pw(r);
            }

            let mut b = 0;
            let mut fit = FitClass::Decent;
            let mut g = Scaled::ZERO;
            let mut llf_found = false;

            if shortfall > Scaled::ZERO {
                if cur_active_width.has_infinite_stretch() {
                    let mut handled = false;
                    if self.do_last_line_fit && self.cur_p.is_null() {
                        // The special last-line computation: stretch the
                        // final glue just enough to mirror the previous
                        // line's looseness.
                        let (r_short, r_glue) = {
                            let active = self.eng.arena.active(r);
                            (active.shortfall, active.glue)
                        };
                        if !r_short.is_zero()
                            && r_glue > Scaled::ZERO
                            && cur_active_width.stretch[1] == self.fill_width[0]
                            && cur_active_width.stretch[2] == self.fill_width[1]
                            && cur_active_width.stretch[3] == self.fill_width[2]
                        {
                            let base = if r_short > Scaled::ZERO {
                                cur_active_width.stretch[0]
                            } else {
                                cur_active_width.shrink
                            };
                            if base > Scaled::ZERO {
                                let mut adjusted =
                                    fract(base, r_short, r_glue, Scaled::MAX);
                                if self.eng.params.last_line_fit < 1000 {
                                    adjusted = adjusted.and_then(|v| {
                                        fract(
                                            v,
                                            Scaled::new(self.eng.params.last_line_fit),
                                            Scaled::new(1000),
                                            Scaled::MAX,
                                        )
                                    });
                                }
                                let mut gg = adjusted.unwrap_or(if r_short > Scaled::ZERO {
                                    Scaled::MAX
                                } else {
                                    -Scaled::MAX
                                });

                                if gg > Scaled::ZERO {
                                    gg = gg.min(shortfall);
                                    b = badness(gg, cur_active_width.stretch[0]);
                                    fit = classify_stretch(b);
                                    g = gg;
                                    llf_found = true;
                                    handled = true;
                                } else if gg < Scaled::ZERO {
                                    if -gg > cur_active_width.shrink {
                                        gg = -cur_active_width.shrink;
                                    }
                                    b = badness(-gg, cur_active_width.shrink);
                                    fit = if b > 12 { FitClass::Tight } else { FitClass::Decent };
                                    g = gg;
                                    llf_found = true;
                                    handled = true;
                                }
                            }
                        }
                    }
                    if !handled {
                        if self.do_last_line_fit {
                            shortfall = Scaled::ZERO;
                        }
                        b = 0;
                        fit = FitClass::Decent;
                    }
                } else {
                    b = badness(shortfall, cur_active_width.stretch[0]);
                    fit = classify_stretch(b);
                }
            } else {
                b = if -shortfall > cur_active_width.shrink {
                    INF_BAD + 1
                } else {
                    badness(-shortfall, cur_active_width.shrink)
                };
                fit = if b > 12 { FitClass::Tight } else { FitClass::Decent };
            }

            if !llf_found && self.do_last_line_fit {
                if self.cur_p.is_null() {
                    shortfall = Scaled::ZERO;
                }
                g = if shortfall > Scaled::ZERO {
                    cur_active_width.stretch[0]
                } else if shortfall < Scaled::ZERO {
                    cur_active_width.shrink
                } else {
                    Scaled::ZERO
                };
            }

            // Decide whether r survives this breakpoint.
            let node_r_stays_active;
            if b > INF_BAD || pi == EJECT_PENALTY {
                if self.final_pass
                    && self.minimum_demerits == AWFUL_BAD
                    && self.link(r) == active_head
                    && prev_r == active_head
                {
                    // Final pass, no alternative left: force this break.
                    artificial_demerits = true;
                } else if b > self.threshold {
                    self.deactivate(&mut prev_r, &mut prev_prev_r, r, &mut cur_active_width);
                    continue;
                }
                node_r_stays_active = false;
            } else {
                prev_r = r;
                if b > self.threshold {
                    continue;
                }
                node_r_stays_active = true;
            }

            let r_data = self.eng.arena.active(r).clone();
            let mut d;
            if artificial_demerits {
                d = 0;
            } else {
                d = self.eng.params.line_penalty + b;
                d = if d.abs() >= 10_000 { 100_000_000 } else { d * d };
                if pi != 0 {
                    if pi > 0 {
                        d += pi * pi;
                    } else if pi > EJECT_PENALTY {
                        d -= pi * pi;
                    }
                }
                if break_type == BreakType::Hyphenated
                    && r_data.break_type == BreakType::Hyphenated
                {
                    d = d.saturating_add(if self.cur_p.exists() {
                        self.eng.params.double_hyphen_demerits
                    } else {
                        self.eng.params.final_hyphen_demerits
                    });
                }
                if fit.distance(r_data.fitness) > 1 {
                    d = d.saturating_add(self.eng.params.adj_demerits);
                }
            }
            d = d.saturating_add(r_data.total_demerits);

            if d <= self.minimal_demerits[fit.index()] {
                self.minimal_demerits[fit.index()] = d;
                self.best_place[fit.index()] = r_data.break_node;
                self.best_pl_line[fit.index()] = l;
                if self.do_last_line_fit {
                    self.best_pl_short[fit.index()] = shortfall;
                    self.best_pl_glue[fit.index()] = g;
                }
                if d < self.minimum_demerits {
                    self.minimum_demerits = d;
                }
            }

            if node_r_stays_active {
                continue;
            }
            self.deactivate(&mut prev_r, &mut prev_prev_r, r, &mut cur_active_width);
        }
    }

    /// What the rest of the paragraph would weigh were we to break at
    /// `cur_p`: the background, minus discardable material that a break
    /// here drops, adjusted for the discretionary texts when breaking at
    /// one.
    fn compute_break_width(&mut self, break_type: BreakType) -> StrResult<()> {
        self.break_width = self.background;
        let mut s = self.cur_p;

        if break_type == BreakType::Hyphenated && self.cur_p.exists() {
            let disc = self.eng.arena.disc(self.cur_p).clone();
            let mut v = self.cur_p;
            s = disc.post;
            for _ in 0..disc.replace {
                v = self.link(v);
                let w = self.node_break_width(v, "disc1", "disc1a")?;
                self.break_width.width -= w;
            }
            let mut post = disc.post;
            while post.exists() {
                let w = self.node_break_width(post, "disc2", "disc2a")?;
                self.break_width.width += w;
                post = self.link(post);
            }
            self.break_width.width += self.disc_width;
            if disc.post.is_null() {
                s = self.link(v);
            }
        }

        while s.exists() {
            match self.kind(s) {
                NodeKind::Glue => {
                    let spec = *self.eng.specs.get(self.eng.arena.glue_node(s).spec);
                    self.break_width.sub_spec(&spec);
                }
                NodeKind::Penalty => {}
                NodeKind::Math => {
                    self.break_width.width -= self.eng.arena.math(s).width;
                }
                NodeKind::Kern => {
                    let kern = self.eng.arena.kern_node(s).clone();
                    if kern.subtype != KernType::Explicit {
                        break;
                    }
                    self.break_width.width -= kern.width;
                }
                _ => break,
            }
            s = self.link(s);
        }
        Ok(())
    }

    /// Unlinks and frees a dominated candidate, then reclaims or merges
    /// any delta node that became redundant.
    fn deactivate(
        &mut self,
        prev_r: &mut NodeRef,
        prev_prev_r: &mut NodeRef,
        r: NodeRef,
        cur_active_width: &mut WidthVec,
    ) {
        let next = self.link(r);
        self.set_link(*prev_r, next);
        self.eng.arena.free(r);

        let active_head = self.eng.active_head;
        if *prev_r == active_head {
            // The first delta now describes the distance from the scan
            // position itself; fold it into the globals.
            let first = self.link(active_head);
            if self.kind(first) == NodeKind::Delta {
                let widths = self.eng.arena.delta(first).widths;
                self.active_width += widths;
                *cur_active_width = self.active_width;
                let after = self.link(first);
                self.set_link(active_head, after);
                self.eng.arena.free(first);
            }
        } else if self.kind(*prev_r) == NodeKind::Delta {
            let after = self.link(*prev_r);
            if after == active_head {
                let widths = self.eng.arena.delta(*prev_r).widths;
                *cur_active_width -= widths;
                self.set_link(*prev_prev_r, active_head);
                self.eng.arena.free(*prev_r);
                *prev_r = *prev_prev_r;
            } else if self.kind(after) == NodeKind::Delta {
                let widths = self.eng.arena.delta(after).widths;
                *cur_active_width += widths;
                self.eng.arena.delta_mut(*prev_r).widths += widths;
                let tail = self.link(after);
                self.set_link(*prev_r, tail);
                self.eng.arena.free(after);
            }
        }
    }
}

/// The fitness class of a stretched line with badness `b`.
fn classify_stretch(b: i32) -> FitClass {
    if b > 99 {
        FitClass::VeryLoose
    } else if b > 12 {
        FitClass::Loose
    } else {
        FitClass::Decent
    }
}
