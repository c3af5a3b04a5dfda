//! The hyphenator.
//!
//! During the second pass, every glue in auto-breaking territory triggers a
//! scan for a following word. A collected word is looked up in the
//! exception dictionary and, failing that, annotated by the pattern trie;
//! positions with odd weights then receive discretionary nodes. Native
//! words are re-split directly on their text; font-rendered words are
//! re-typeset fragment by fragment through the reconstitutor so that
//! ligatures and kerns come out right on both sides of every break.

use paragon_library::arena::NodeRef;
use paragon_library::hyph::MIN_TRIE_OP;
use paragon_library::node::{
    Body, DiscNode, KernType, NodeKind, Whatsit, BIGGEST_CHAR, L_CODE, TOO_BIG_CHAR,
};

use super::{odd, LineBreaker};

/// What the search for a word start produced.
enum WordStart {
    /// A letter in a font, reachable for hyphenation.
    Letter,
    /// Nothing hyphenatable before the next hard boundary.
    None,
}

impl LineBreaker<'_> {
    /// Looks for a hyphenatable word after the glue at `cur_p` and, if one
    /// is found, splices discretionary breaks into it.
    pub(super) fn hyphenation_pass(&mut self) {
        let mut prev_s = self.cur_p;
        let mut s = self.link(prev_s);
        if s.is_null() {
            return;
        }

        // Find a character that can start a word, tracking language
        // switches on the way.
        let start = 'search: loop {
            if s.is_null() {
                return;
            }
            let c = match self.kind(s) {
                NodeKind::Char => {
                    let chr = self.eng.arena.char_node(s).clone();
                    self.hf = chr.font;
                    chr.chr
                }
                NodeKind::Ligature => {
                    let lig = self.eng.arena.ligature(s).clone();
                    if lig.lig.is_null() {
                        prev_s = s;
                        s = self.link(prev_s);
                        continue;
                    }
                    let first = self.eng.arena.char_node(lig.lig).clone();
                    self.hf = first.font;
                    first.chr
                }
                NodeKind::Kern
                    if self.eng.arena.kern_node(s).subtype == KernType::Normal =>
                {
                    prev_s = s;
                    s = self.link(prev_s);
                    continue;
                }
                NodeKind::Math if self.eng.arena.math(s).subtype >= L_CODE => {
                    prev_s = s;
                    s = self.link(prev_s);
                    continue;
                }
                NodeKind::Whatsit => {
                    if self.eng.arena.is_native_word(s) {
                        let len = self.eng.arena.native_word(s).text.len();
                        let mut l = 0;
                        while l < len {
                            let word = self.eng.arena.native_word(s);
                            let c = word.usv_at(l);
                            let step = word.usv_len(l);
                            if self.eng.lc_code(c) != 0 {
                                self.hf = word.font;
                                prev_s = s;
                                break 'search WordStart::Letter;
                            }
                            l += step;
                        }
                    }
                    if let Body::Whatsit(Whatsit::Language(language)) =
                        self.eng.arena.body(s)
                    {
                        self.cur_lang = language.lang;
                        self.l_hyf = language.left_hyphen_min;
                        self.r_hyf = language.right_hyphen_min;
                        self.hyph_index = self.eng.hyph.hyph_index(self.cur_lang);
                    }
                    prev_s = s;
                    s = self.link(prev_s);
                    continue;
                }
                _ => break 'search WordStart::None,
            };

            let hc0 = self.eng.hyph_lc(self.hyph_index, c);
            if hc0 != 0 {
                // A word may only start at its own lowercase form unless
                // uppercase hyphenation is switched on.
                if hc0 == c || self.eng.params.uc_hyph > 0 {
                    break 'search WordStart::Letter;
                }
                break 'search WordStart::None;
            }
            prev_s = s;
            s = self.link(prev_s);
        };

        if matches!(start, WordStart::None) {
            return;
        }

        self.hyf_char = self.eng.font(self.hf).hyphen_char;
        if self.hyf_char < 0 || self.hyf_char > BIGGEST_CHAR {
            return;
        }
        self.ha = prev_s;
        if self.l_hyf + self.r_hyf > self.eng.params.max_hyphenatable_length() {
            return;
        }

        if self.eng.arena.is_native_word(self.ha) {
            // Check that nothing after the word forbids hyphenating it.
            s = self.link(self.ha);
            loop {
                if s.is_null() {
                    return;
                }
                if !self.is_char(s) {
                    let stop = match self.kind(s) {
                        NodeKind::Ligature => false,
                        NodeKind::Kern => {
                            self.eng.arena.kern_node(s).subtype != KernType::Normal
                        }
                        NodeKind::Whatsit
                        | NodeKind::Glue
                        | NodeKind::Penalty
                        | NodeKind::Ins
                        | NodeKind::Adjust
                        | NodeKind::Mark => true,
                        _ => return,
                    };
                    if stop {
                        break;
                    }
                }
                s = self.link(s);
            }
            self.collect_native_word();
        } else {
            self.hn = 0;
            s = self.collect_font_word(s);
        }

        if self.hn < self.l_hyf + self.r_hyf {
            return;
        }

        // The material after the collected word must also permit a break.
        loop {
            if s.is_null() {
                return;
            }
            if !self.is_char(s) {
                match self.kind(s) {
                    NodeKind::Ligature => {}
                    NodeKind::Kern => {
                        if self.eng.arena.kern_node(s).subtype != KernType::Normal {
                            break;
                        }
                    }
                    NodeKind::Whatsit
                    | NodeKind::Glue
                    | NodeKind::Penalty
                    | NodeKind::Ins
                    | NodeKind::Adjust
                    | NodeKind::Mark => break,
                    NodeKind::Math => {
                        if self.eng.arena.math(s).subtype >= L_CODE {
                            break;
                        }
                        return;
                    }
                    _ => return,
                }
            }
            s = self.link(s);
        }

        self.hyphenate();
    }

    /// Loads the letters of the native word at `ha` into the workspace,
    /// splitting the node when non-letters interrupt the run.
    fn collect_native_word(&mut self) {
        let limit = self.eng.params.max_hyphenatable_length();
        self.hn = 0;
        'restart: loop {
            let len = self.eng.arena.native_word(self.ha).text.len();
            let mut l = 0;
            while l < len {
                let c = self.eng.arena.native_word(self.ha).usv_at(l);
                let hc0 = self.eng.hyph_lc(self.hyph_index, c);
                if hc0 == 0 {
                    if self.hn > 0 {
                        // The word ends inside the node: split the rest off
                        // so the splicer sees pure letters.
                        self.split_native(self.ha, l);
                        return;
                    }
                } else if self.hn == 0 && l > 0 {
                    // The word starts inside the node: split and continue
                    // in the tail.
                    self.split_native(self.ha, l);
                    self.ha = self.link(self.ha);
                    continue 'restart;
                } else if self.hn == limit {
                    return;
                } else {
                    self.hn += 1;
                    self.hu[self.hn as usize] = c;
                    self.hc[self.hn as usize] = hc0;
                    self.hyf_bchar = TOO_BIG_CHAR;
                }
                l += 1;
            }
            return;
        }
    }

    /// Splits the native word `p` at text position `at`, linking the tail
    /// in right after it. Both halves are re-measured.
    fn split_native(&mut self, p: NodeRef, at: usize) -> NodeRef {
        let (font, tail, actual) = {
            let word = self.eng.arena.native_word(p);
            (word.font, word.text[at..].to_vec(), word.actual_text)
        };
        let q = self.eng.new_native_word(font, tail, actual);
        let after = self.link(p);
        self.set_link(q, after);
        self.set_link(p, q);
        self.eng.arena.native_word_mut(p).text.truncate(at);
        self.eng.measure_native(p);
        q
    }

    /// Collects a run of same-font characters (through ligatures and font
    /// kerns) starting at `s`. Returns the node that ended the run.
    fn collect_font_word(&mut self, mut s: NodeRef) -> NodeRef {
        let limit = self.eng.params.max_hyphenatable_length();
        let max_hyph_char = self.eng.hyph.max_hyph_char;
        loop {
            if s.is_null() {
                return s;
            }
            if self.is_char(s) {
                let chr = self.eng.arena.char_node(s).clone();
                if chr.font != self.hf {
                    return s;
                }
                self.hyf_bchar = chr.chr;
                let hc0 = self.eng.hyph_lc(self.hyph_index, chr.chr);
                if hc0 == 0 || hc0 > max_hyph_char || self.hn == limit {
                    return s;
                }
                self.hb = s;
                self.hn += 1;
                self.hu[self.hn as usize] = chr.chr;
                self.hc[self.hn as usize] = hc0;
                self.hyf_bchar = TOO_BIG_CHAR;
            } else {
                match self.kind(s) {
                    NodeKind::Ligature => {
                        // The ligature's original characters join the word.
                        let lig = self.eng.arena.ligature(s).clone();
                        if lig.font != self.hf {
                            return s;
                        }
                        let mut j = self.hn;
                        let mut q = lig.lig;
                        if q.exists() {
                            self.hyf_bchar = self.eng.arena.char_node(q).chr;
                        }
                        while q.exists() {
                            let chr = self.eng.arena.char_node(q).clone();
                            let hc0 = self.eng.hyph_lc(self.hyph_index, chr.chr);
                            if hc0 == 0 || hc0 > max_hyph_char || j == limit {
                                return s;
                            }
                            j += 1;
                            self.hu[j as usize] = chr.chr;
                            self.hc[j as usize] = hc0;
                            q = self.link(q);
                        }
                        self.hb = s;
                        self.hn = j;
                        self.hyf_bchar = if odd(lig.hits as i32) {
                            self.eng.font(self.hf).bchar
                        } else {
                            TOO_BIG_CHAR
                        };
                    }
                    NodeKind::Kern
                        if self.eng.arena.kern_node(s).subtype == KernType::Normal =>
                    {
                        self.hb = s;
                        self.hyf_bchar = self.eng.font(self.hf).bchar;
                    }
                    _ => return s,
                }
            }
            s = self.link(s);
        }
    }

    /// Annotates `hyf` with break weights for the collected word, then
    /// splices discretionaries where the weights are odd.
    fn hyphenate(&mut self) {
        if !self.annotate() {
            return;
        }
        if self.eng.arena.is_native_word(self.ha) {
            self.splice_native_word();
        } else {
            self.splice_reconstituted();
        }
    }

    /// Fills `hyf` with the word's break weights, from the exception
    /// dictionary or the pattern trie, and masks the protected positions.
    /// Returns whether any permitted position remains.
    pub(super) fn annotate(&mut self) -> bool {
        let hn = self.hn as usize;
        for weight in &mut self.hyf[..=hn] {
            *weight = 0;
        }

        // The exception dictionary takes precedence over the patterns.
        let codes = self.hc[1..=hn].to_vec();
        if let Some(positions) = self.eng.hyph.exception(self.cur_lang, &codes) {
            for &pos in positions {
                if (1..=hn as i32).contains(&pos) {
                    self.hyf[pos as usize] = 1;
                }
            }
        } else {
            if !self.eng.hyph.has_patterns(self.cur_lang) {
                return false;
            }
            self.hc[0] = 0;
            self.hc[hn + 1] = 0;
            self.hc[hn + 2] = self.eng.hyph.max_hyph_char;
            let root = self.eng.hyph.pattern_root(self.cur_lang);
            let op_base = self.eng.hyph.op_start(self.cur_lang);

            for j in 0..=(self.hn - self.r_hyf + 1) {
                let mut z = root + self.hc[j as usize];
                let mut l = j as usize;
                while self.hc[l] == self.eng.hyph.trc(z) {
                    let mut v = self.eng.hyph.tro(z);
                    while v != MIN_TRIE_OP {
                        v += op_base;
                        let i = l as i32 - self.eng.hyph.op_distance(v);
                        if (0..=self.hn).contains(&i) {
                            let num = self.eng.hyph.op_num(v);
                            if num > self.hyf[i as usize] {
                                self.hyf[i as usize] = num;
                            }
                        }
                        v = self.eng.hyph.op_next(v);
                    }
                    l += 1;
                    z = self.eng.hyph.trl(z) + self.hc[l];
                }
            }
        }

        // Positions too close to either end of the word never break.
        for j in 0..self.l_hyf as usize {
            self.hyf[j] = 0;
        }
        for j in 0..self.r_hyf as usize {
            self.hyf[hn - j] = 0;
        }

        let lo = self.l_hyf as usize;
        let hi = hn - self.r_hyf as usize;
        (lo..=hi).any(|j| odd(self.hyf[j]))
    }

    /// Re-splits the native word at `ha` into fragments joined by
    /// discretionaries carrying the hyphen character.
    fn splice_native_word(&mut self) {
        let mut s = self.cur_p;
        while self.link(s) != self.ha {
            s = self.link(s);
        }

        let (font, actual) = {
            let word = self.eng.arena.native_word(self.ha);
            (word.font, word.actual_text)
        };
        let hyf_char = self.hyf_char;

        let mut hyphen_passed = 0usize;
        for j in self.l_hyf as usize..=(self.hn - self.r_hyf) as usize {
            if odd(self.hyf[j]) {
                let segment =
                    self.eng.arena.native_word(self.ha).text[hyphen_passed..j].to_vec();
                let q = self.eng.new_native_word(font, segment, actual);
                self.set_link(s, q);
                s = q;

                let disc = self.eng.new_disc();
                let pre = self.eng.new_native_word(font, utf16(hyf_char), false);
                self.eng.arena.disc_mut(disc).pre = pre;
                self.set_link(s, disc);
                s = disc;
                hyphen_passed = j;
            }
        }

        let len = self.eng.arena.native_word(self.ha).text.len();
        let segment = self.eng.arena.native_word(self.ha).text[hyphen_passed..len].to_vec();
        let q = self.eng.new_native_word(font, segment, actual);
        self.set_link(s, q);
        s = q;

        let after = self.link(self.ha);
        self.set_link(s, after);
        self.set_link(self.ha, NodeRef::NULL);
        self.eng.flush_node_list(self.ha);
    }

    /// Rebuilds the word through the font program, inserting a
    /// discretionary at every permitted position.
    fn splice_reconstituted(&mut self) {
        let hn = self.hn;
        let q = self.link(self.hb);
        self.set_link(self.hb, NodeRef::NULL);
        let r = self.link(self.ha);
        self.set_link(self.ha, NodeRef::NULL);
        let bchar = self.hyf_bchar;

        // Classify the node before the word: it may provide left context
        // for boundary ligatures, stand in as a bare boundary, or keep its
        // place in the list untouched.
        enum Anchor {
            /// The anchor's characters seed the reconstitution.
            Context,
            /// The anchor is unusable; reconstitute against a boundary.
            Boundary,
            /// The anchor stays; the word starts fresh after it.
            Standalone,
        }

        let anchor = if self.is_char(self.ha) {
            let chr = self.eng.arena.char_node(self.ha).clone();
            if chr.font == self.hf {
                self.init_list = self.ha;
                self.init_lig = false;
                self.hu[0] = chr.chr;
                Anchor::Context
            } else {
                Anchor::Boundary
            }
        } else if self.kind(self.ha) == NodeKind::Ligature {
            let lig = self.eng.arena.ligature(self.ha).clone();
            if lig.font == self.hf {
                self.init_list = lig.lig;
                self.init_lig = true;
                self.init_lft = lig.left_hit();
                self.hu[0] = lig.chr;
                if self.init_list.is_null() && self.init_lft {
                    self.hu[0] = self.eng.hyph.max_hyph_char;
                    self.init_lig = false;
                }
                self.eng.arena.free(self.ha);
                Anchor::Context
            } else {
                Anchor::Boundary
            }
        } else if !self.is_char(r)
            && self.kind(r) == NodeKind::Ligature
            && self.eng.arena.ligature(r).hits > 1
        {
            // The word opens with a ligature whose left boundary already
            // fired; it cannot be re-typeset from the word alone.
            Anchor::Boundary
        } else {
            Anchor::Standalone
        };

        let (s, j) = match anchor {
            Anchor::Context => {
                let mut s = self.cur_p;
                while self.link(s) != self.ha {
                    s = self.link(s);
                }
                (s, 0)
            }
            Anchor::Boundary => {
                self.hu[0] = self.eng.hyph.max_hyph_char;
                self.init_lig = false;
                self.init_list = NodeRef::NULL;
                (self.ha, 0)
            }
            Anchor::Standalone => {
                self.init_lig = false;
                self.init_list = NodeRef::NULL;
                (self.ha, 1)
            }
        };

        self.rebuild_word(s, j, hn, bchar, q, r);
    }

    /// The reconstitution loop shared by every anchor classification:
    /// re-typesets `hu[j..=hn]` after `s`, splicing discretionaries, then
    /// reattaches `q` and releases the old word material `r`.
    fn rebuild_word(
        &mut self,
        mut s: NodeRef,
        mut j: i32,
        hn: i32,
        bchar: i32,
        q: NodeRef,
        r: NodeRef,
    ) {
        self.eng.flush_node_list(r);
        let hold_head = self.eng.hold_head;

        loop {
            let mut l = j;
            j = self.reconstitute(j, hn, bchar, self.hyf_char) + 1;
            if self.hyphen_passed == 0 {
                let hold = self.link(hold_head);
                self.set_link(s, hold);
                while self.link(s).exists() {
                    s = self.link(s);
                }
                if odd(self.hyf[(j - 1) as usize]) {
                    l = j;
                    self.hyphen_passed = j - 1;
                    self.set_link(hold_head, NodeRef::NULL);
                }
            }

            if self.hyphen_passed > 0 {
                loop {
                    let disc = self.eng.arena.alloc(Body::Disc(DiscNode {
                        pre: NodeRef::NULL,
                        post: NodeRef::NULL,
                        replace: 0,
                    }));
                    let hold = self.link(hold_head);
                    self.set_link(disc, hold);
                    let mut major_tail = disc;
                    let mut r_count = 0i32;
                    while self.link(major_tail).exists() {
                        major_tail = self.link(major_tail);
                        r_count += 1;
                    }

                    let mut i = self.hyphen_passed;
                    self.hyf[i as usize] = 0;

                    // The pre-break text: the fragment up to the break,
                    // with the hyphen character appended when the font
                    // has one.
                    let mut minor_tail = NodeRef::NULL;
                    let has_hyf_node = self.eng.font(self.hf).char_exists(self.hyf_char);
                    let mut saved = 0;
                    if has_hyf_node {
                        i += 1;
                        saved = self.hu[i as usize];
                        self.hu[i as usize] = self.hyf_char;
                    }
                    while l <= i {
                        let font_bchar = self.eng.font(self.hf).bchar;
                        l = self.reconstitute(l, i, font_bchar, TOO_BIG_CHAR) + 1;
                        let hold = self.link(hold_head);
                        if hold.exists() {
                            if minor_tail.is_null() {
                                self.eng.arena.disc_mut(disc).pre = hold;
                            } else {
                                self.set_link(minor_tail, hold);
                            }
                            minor_tail = hold;
                            while self.link(minor_tail).exists() {
                                minor_tail = self.link(minor_tail);
                            }
                        }
                    }
                    if has_hyf_node {
                        self.hu[i as usize] = saved;
                        l = i;
                        i -= 1;
                    }

                    // The post-break text, re-typeset against the left
                    // word boundary when the font has a boundary program.
                    let mut minor_tail = NodeRef::NULL;
                    let mut c_loc = 0;
                    let mut saved = 0;
                    if self.eng.font(self.hf).bchar_label.is_some() {
                        l -= 1;
                        saved = self.hu[l as usize];
                        c_loc = l;
                        self.hu[l as usize] = self.eng.hyph.max_hyph_char;
                    }
                    while l < j {
                        loop {
                            l = self.reconstitute(l, hn, bchar, TOO_BIG_CHAR) + 1;
                            if c_loc > 0 {
                                self.hu[c_loc as usize] = saved;
                                c_loc = 0;
                            }
                            let hold = self.link(hold_head);
                            if hold.exists() {
                                if minor_tail.is_null() {
                                    self.eng.arena.disc_mut(disc).post = hold;
                                } else {
                                    self.set_link(minor_tail, hold);
                                }
                                minor_tail = hold;
                                while self.link(minor_tail).exists() {
                                    minor_tail = self.link(minor_tail);
                                }
                            }
                            if l >= j {
                                break;
                            }
                        }
                        while l > j {
                            // The probe went past the discretionary's
                            // span; the main line catches up.
                            j = self.reconstitute(j, hn, bchar, TOO_BIG_CHAR) + 1;
                            let hold = self.link(hold_head);
                            self.set_link(major_tail, hold);
                            while self.link(major_tail).exists() {
                                major_tail = self.link(major_tail);
                                r_count += 1;
                            }
                        }
                    }

                    if r_count > 127 {
                        // A replace count beyond the field's range: give
                        // up on this discretionary and keep its material.
                        let after = self.link(disc);
                        self.set_link(s, after);
                        self.set_link(disc, NodeRef::NULL);
                        self.eng.flush_node_list(disc);
                    } else {
                        self.set_link(s, disc);
                        self.eng.arena.disc_mut(disc).replace = r_count as u16;
                    }
                    s = major_tail;
                    self.hyphen_passed = j - 1;
                    self.set_link(hold_head, NodeRef::NULL);

                    if !odd(self.hyf[(j - 1) as usize]) {
                        break;
                    }
                }
            }

            if j > hn {
                break;
            }
        }

        self.set_link(s, q);
        let init_list = self.init_list;
        self.init_list = NodeRef::NULL;
        self.eng.flush_node_list(init_list);
    }
}

/// The UTF-16 encoding of a scalar value.
fn utf16(c: i32) -> Vec<u16> {
    if c >= 0x10000 {
        let c = c - 0x10000;
        vec![0xD800 + (c >> 10) as u16, 0xDC00 + (c & 0x3FF) as u16]
    } else {
        vec![c as u16]
    }
}
