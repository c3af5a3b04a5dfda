//! Ligature/kern reconstitution.
//!
//! Given a run of character codes in the hyphenation workspace, rebuild
//! exactly the character, ligature, and kern nodes the font's program
//! would have produced, appending them to the list at `hold_head`. The
//! hyphenator leans on this to re-typeset word fragments on both sides of
//! every break it tries.

use paragon_library::arena::NodeRef;
use paragon_library::font::{KERN_FLAG, STOP_FLAG};
use paragon_library::node::{Body, CharNode, KernType, TOO_BIG_CHAR};
use paragon_utils::Scaled;

use super::{odd, LineBreaker};

/// A pending right-context piece of a cascading ligature.
pub(crate) struct LigPiece {
    pub chr: i32,
    /// The original character this piece replaced, if any.
    pub list: NodeRef,
}

impl LineBreaker<'_> {
    /// Runs `hu[j..]` through the font program up to at most index `n`.
    ///
    /// `bchar` is the character following the word, used to match
    /// end-of-word ligatures; `hchar` is probed as an alternative right
    /// context wherever `hyf` marks an odd weight, and a successful probe
    /// is reported through `hyphen_passed`. Returns the index of the last
    /// consumed code.
    pub(super) fn reconstitute(
        &mut self,
        mut j: i32,
        n: i32,
        mut bchar: i32,
        mut hchar: i32,
    ) -> i32 {
        self.hyphen_passed = 0;
        let hold_head = self.eng.hold_head;
        let mut t = hold_head;
        let mut w = Scaled::ZERO;
        self.set_link(hold_head, NodeRef::NULL);

        self.cur_l = self.hu[j as usize];
        self.cur_q = t;
        if j == 0 {
            self.ligature_present = self.init_lig;
            if self.ligature_present {
                self.lft_hit = self.init_lft;
            }
            let mut p = self.init_list;
            while p.exists() {
                let chr = self.eng.arena.char_node(p).chr;
                let node = self.eng.arena.alloc(Body::Char(CharNode { font: self.hf, chr }));
                self.set_link(t, node);
                t = node;
                p = self.link(p);
            }
        } else if self.cur_l < TOO_BIG_CHAR {
            let node = self
                .eng
                .arena
                .alloc(Body::Char(CharNode { font: self.hf, chr: self.cur_l }));
            self.set_link(t, node);
            t = node;
        }

        self.lig_stack.clear();
        self.cur_r = if j < n { self.hu[(j + 1) as usize] } else { bchar };
        let mut cur_rh =
            if odd(self.hyf[j as usize]) { hchar } else { TOO_BIG_CHAR };

        'restart: loop {
            // Locate the program for the current left participant.
            let font = self.eng.font(self.hf);
            let start = if self.cur_l == TOO_BIG_CHAR {
                font.bchar_label
            } else {
                font.lig_start(self.cur_l)
            };

            if let Some(mut k) = start {
                let mut q = self.eng.font(self.hf).step(k);
                'steps: loop {
                    let test_char = if cur_rh < TOO_BIG_CHAR { cur_rh } else { self.cur_r };
                    if q.next as i32 == test_char && q.skip <= STOP_FLAG {
                        if cur_rh < TOO_BIG_CHAR {
                            // The program would fire against the hyphen:
                            // record the opportunity and retry for real.
                            self.hyphen_passed = j;
                            hchar = TOO_BIG_CHAR;
                            cur_rh = TOO_BIG_CHAR;
                            continue 'restart;
                        }
                        if hchar < TOO_BIG_CHAR && odd(self.hyf[j as usize]) {
                            self.hyphen_passed = j;
                            hchar = TOO_BIG_CHAR;
                        }

                        if q.op < KERN_FLAG {
                            // A ligature opcode.
                            if self.cur_l == TOO_BIG_CHAR {
                                self.lft_hit = true;
                            }
                            if j == n && self.lig_stack.is_empty() {
                                self.rt_hit = true;
                            }
                            match q.op {
                                1 | 5 => {
                                    self.cur_l = q.rem as i32;
                                    self.ligature_present = true;
                                }
                                2 | 6 => {
                                    self.cur_r = q.rem as i32;
                                    if let Some(top) = self.lig_stack.last_mut() {
                                        top.chr = self.cur_r;
                                    } else {
                                        let list = if j == n {
                                            bchar = TOO_BIG_CHAR;
                                            NodeRef::NULL
                                        } else {
                                            self.eng.arena.alloc(Body::Char(CharNode {
                                                font: self.hf,
                                                chr: self.hu[(j + 1) as usize],
                                            }))
                                        };
                                        self.lig_stack
                                            .push(LigPiece { chr: self.cur_r, list });
                                    }
                                }
                                3 => {
                                    self.cur_r = q.rem as i32;
                                    self.lig_stack
                                        .push(LigPiece { chr: self.cur_r, list: NodeRef::NULL });
                                }
                                7 | 11 => {
                                    if self.ligature_present {
                                        self.wrap_ligature(&mut t, false);
                                    }
                                    self.cur_q = t;
                                    self.cur_l = q.rem as i32;
                                    self.ligature_present = true;
                                }
                                _ => {
                                    self.cur_l = q.rem as i32;
                                    self.ligature_present = true;
                                    if !self.lig_stack.is_empty() {
                                        self.pop_lig_piece(
                                            &mut t, &mut j, n, bchar, hchar, &mut cur_rh,
                                        );
                                    } else if j == n {
                                        break 'steps;
                                    } else {
                                        let node = self.eng.arena.alloc(Body::Char(CharNode {
                                            font: self.hf,
                                            chr: self.cur_r,
                                        }));
                                        self.set_link(t, node);
                                        t = node;
                                        j += 1;
                                        self.cur_r = if j < n {
                                            self.hu[(j + 1) as usize]
                                        } else {
                                            bchar
                                        };
                                        cur_rh = if odd(self.hyf[j as usize]) {
                                            hchar
                                        } else {
                                            TOO_BIG_CHAR
                                        };
                                    }
                                }
                            }
                            if q.op > 4 && q.op != 7 {
                                break 'steps;
                            }
                            continue 'restart;
                        }

                        // A kern opcode ends the program.
                        w = self.eng.font(self.hf).kern_for(q.op, q.rem);
                        break 'steps;
                    }

                    if q.skip >= STOP_FLAG {
                        if cur_rh == TOO_BIG_CHAR {
                            break 'steps;
                        }
                        cur_rh = TOO_BIG_CHAR;
                        continue 'restart;
                    }
                    k += q.skip as usize + 1;
                    q = self.eng.font(self.hf).step(k);
                }
            }

            // The program is done; wrap up any pending ligature and kern.
            if self.ligature_present {
                self.wrap_ligature(&mut t, true);
            }
            if !w.is_zero() {
                let node = self.eng.new_kern(w, KernType::Normal);
                self.set_link(t, node);
                t = node;
                w = Scaled::ZERO;
            }
            if let Some(top) = self.lig_stack.last() {
                self.cur_q = t;
                self.cur_l = top.chr;
                self.ligature_present = true;
                self.pop_lig_piece(&mut t, &mut j, n, bchar, hchar, &mut cur_rh);
                continue 'restart;
            }
            return j;
        }
    }

    /// Collapses the characters after `cur_q` into a ligature node.
    fn wrap_ligature(&mut self, t: &mut NodeRef, allow_right_hit: bool) {
        let orig = self.link(self.cur_q);
        let p = self.eng.new_ligature(self.hf, self.cur_l, orig);
        let mut hits = 0;
        if self.lft_hit {
            hits = 2;
            self.lft_hit = false;
        }
        if allow_right_hit && self.rt_hit && self.lig_stack.is_empty() {
            hits += 1;
            self.rt_hit = false;
        }
        self.eng.arena.ligature_mut(p).hits = hits;
        self.set_link(self.cur_q, p);
        *t = p;
        self.ligature_present = false;
    }

    /// Pops the topmost pending piece, reinstating its original character
    /// and refreshing the right-context cursors.
    fn pop_lig_piece(
        &mut self,
        t: &mut NodeRef,
        j: &mut i32,
        n: i32,
        bchar: i32,
        hchar: i32,
        cur_rh: &mut i32,
    ) {
        let piece = self.lig_stack.pop().expect("lig stack is empty");
        if piece.list.exists() {
            self.set_link(*t, piece.list);
            *t = piece.list;
            *j += 1;
        }
        if let Some(top) = self.lig_stack.last() {
            self.cur_r = top.chr;
        } else {
            self.cur_r = if *j < n { self.hu[(*j + 1) as usize] } else { bchar };
            *cur_rh = if odd(self.hyf[*j as usize]) { hchar } else { TOO_BIG_CHAR };
        }
    }
}
