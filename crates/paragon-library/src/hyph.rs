//! Hyphenation tables.
//!
//! Pattern matching runs over a packed trie stored in three parallel
//! arrays. A state is a base index; the transition on code `c` from a state
//! with base `b` is slot `z = b + c`, valid only when `trie_trc[z] == c`.
//! A valid slot carries the base of the next state in `trie_trl[z]` and the
//! head of an operation chain in `trie_tro[z]`. Slot `lang + 1` anchors the
//! pattern root of each language; slot `hyph_start + lang` anchors its
//! hyphenation-code (lowercase) mapping when one exists.
//!
//! Operations are `(distance, weight, next)` records in flat per-language
//! arrays; chains terminate at [`MIN_TRIE_OP`].

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;

/// The terminator of an operation chain, and "no operation" in the trie.
pub const MIN_TRIE_OP: i32 = 0;

/// The packed hyphenation tables.
pub struct HyphTables {
    trie_trl: Vec<i32>,
    trie_trc: Vec<i32>,
    trie_tro: Vec<i32>,
    op_start: Vec<i32>,
    hyf_distance: Vec<i32>,
    hyf_num: Vec<i32>,
    hyf_next: Vec<i32>,
    exceptions: FxHashMap<(u16, Vec<i32>), Vec<i32>>,
    /// Base of the per-language hyphenation-code roots.
    pub hyph_start: i32,
    /// One more than the largest code any pattern mentions; serves as the
    /// never-matching sentinel during pattern walks.
    pub max_hyph_char: i32,
}

impl HyphTables {
    /// Tables without any patterns or exceptions.
    pub fn empty() -> Self {
        Self {
            trie_trl: vec![0],
            trie_trc: vec![-1],
            trie_tro: vec![MIN_TRIE_OP],
            op_start: Vec::new(),
            hyf_distance: vec![0],
            hyf_num: vec![0],
            hyf_next: vec![0],
            exceptions: FxHashMap::default(),
            hyph_start: 0,
            max_hyph_char: 256,
        }
    }

    /// The next-state base stored at slot `z`.
    pub fn trl(&self, z: i32) -> i32 {
        usize::try_from(z).ok().and_then(|z| self.trie_trl.get(z)).copied().unwrap_or(0)
    }

    /// The validation code stored at slot `z`; `-1` for unused slots, which
    /// matches no character code.
    pub fn trc(&self, z: i32) -> i32 {
        usize::try_from(z).ok().and_then(|z| self.trie_trc.get(z)).copied().unwrap_or(-1)
    }

    /// The operation chain head stored at slot `z`.
    pub fn tro(&self, z: i32) -> i32 {
        usize::try_from(z)
            .ok()
            .and_then(|z| self.trie_tro.get(z))
            .copied()
            .unwrap_or(MIN_TRIE_OP)
    }

    /// Whether `lang` has any patterns.
    pub fn has_patterns(&self, lang: u16) -> bool {
        self.trc(lang as i32 + 1) == lang as i32
    }

    /// The pattern-root base of `lang`.
    pub fn pattern_root(&self, lang: u16) -> i32 {
        self.trl(lang as i32 + 1)
    }

    /// The hyphenation-code base of `lang`, or zero when the language has
    /// no codes of its own and the global lowercase table applies.
    pub fn hyph_index(&self, lang: u16) -> i32 {
        let z = self.hyph_start + lang as i32;
        if self.trc(z) != lang as i32 { 0 } else { self.trl(z) }
    }

    /// The per-language base added to local operation indices.
    pub fn op_start(&self, lang: u16) -> i32 {
        self.op_start.get(lang as usize).copied().unwrap_or(0)
    }

    /// The position offset of operation `v` (global index).
    pub fn op_distance(&self, v: i32) -> i32 {
        self.hyf_distance[v as usize]
    }

    /// The weight of operation `v` (global index).
    pub fn op_num(&self, v: i32) -> i32 {
        self.hyf_num[v as usize]
    }

    /// The language-local successor of operation `v` (global index).
    pub fn op_next(&self, v: i32) -> i32 {
        self.hyf_next[v as usize]
    }

    /// Looks up a word in the exception dictionary by its hyphenation
    /// codes. Returns the permitted break positions.
    pub fn exception(&self, lang: u16, codes: &[i32]) -> Option<&[i32]> {
        self.exceptions.get(&(lang, codes.to_vec())).map(Vec::as_slice)
    }
}

struct FlatNode {
    children: BTreeMap<i32, usize>,
    op: i32,
}

struct LangBuild {
    root: usize,
    hyph_codes: BTreeMap<i32, i32>,
    /// Operations, local index `i + 1`.
    ops: Vec<(i32, i32, i32)>,
}

/// Builds [`HyphTables`] from textual patterns and exceptions.
///
/// Patterns use the usual notation: digits carry break weights, `.` matches
/// the word boundary, letters must already be lowercase. The packer is
/// plain first-fit without suffix sharing, which is plenty for embedded
/// tables and keeps the arrays in exactly the layout the walker expects.
pub struct TrieBuilder {
    nodes: Vec<FlatNode>,
    langs: BTreeMap<u16, LangBuild>,
    exceptions: FxHashMap<(u16, Vec<i32>), Vec<i32>>,
    max_code: i32,
}

impl TrieBuilder {
    /// Creates a builder with no languages.
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            langs: BTreeMap::new(),
            exceptions: FxHashMap::default(),
            max_code: 255,
        }
    }

    fn lang_entry(&mut self, lang: u16) -> &mut LangBuild {
        let nodes = &mut self.nodes;
        self.langs.entry(lang).or_insert_with(|| {
            nodes.push(FlatNode { children: BTreeMap::new(), op: MIN_TRIE_OP });
            LangBuild {
                root: nodes.len() - 1,
                hyph_codes: BTreeMap::new(),
                ops: Vec::new(),
            }
        })
    }

    /// Adds one pattern like `".ab3c"` to a language.
    pub fn insert_pattern(&mut self, lang: u16, pattern: &str) {
        let mut codes = Vec::new();
        let mut weights = Vec::new();
        for chr in pattern.chars() {
            if let Some(digit) = chr.to_digit(10) {
                weights.push((codes.len() as i32, digit as i32));
            } else if chr == '.' {
                codes.push(0);
            } else {
                codes.push(chr as i32);
                self.max_code = self.max_code.max(chr as i32);
            }
        }
        assert!(!codes.is_empty(), "pattern without characters: {pattern:?}");

        self.lang_entry(lang);
        let lang_data = self.langs.get_mut(&lang).unwrap();

        // Walk or extend the path for the pattern's codes.
        let mut node = lang_data.root;
        for &code in &codes {
            let existing = self.nodes[node].children.get(&code).copied();
            node = match existing {
                Some(child) => child,
                None => {
                    self.nodes.push(FlatNode {
                        children: BTreeMap::new(),
                        op: MIN_TRIE_OP,
                    });
                    let child = self.nodes.len() - 1;
                    self.nodes[node].children.insert(code, child);
                    child
                }
            };
        }

        // Chain the weights onto the final node's operation list.
        let n = codes.len() as i32;
        let mut head = self.nodes[node].op;
        for (position, weight) in weights {
            lang_data.ops.push((n - position, weight, head));
            head = lang_data.ops.len() as i32;
        }
        self.nodes[node].op = head;
    }

    /// Adds an exception like `"ta-ble"`; letters must be the word's
    /// hyphenation codes (usually its lowercase form).
    pub fn insert_exception(&mut self, lang: u16, word: &str) {
        let mut codes = Vec::new();
        let mut positions = Vec::new();
        for chr in word.chars() {
            if chr == '-' {
                positions.push(codes.len() as i32);
            } else {
                codes.push(chr as i32);
                self.max_code = self.max_code.max(chr as i32);
            }
        }
        self.exceptions.insert((lang, codes), positions);
    }

    /// Gives a language its own hyphenation code for one character.
    pub fn set_hyph_code(&mut self, lang: u16, from: char, to: char) {
        self.lang_entry(lang).hyph_codes.insert(from as i32, to as i32);
        self.max_code = self.max_code.max(to as i32);
    }

    /// Packs everything into the parallel-array tables.
    pub fn build(self) -> HyphTables {
        let max_hyph_char = self.max_code + 1;
        let max_lang = self.langs.keys().max().copied().unwrap_or(0) as i32;
        let hyph_start = max_lang + 2;

        // Slots reserved for the per-language anchors.
        let mut used = vec![false; (hyph_start + max_lang + 1) as usize + 1];
        for lang in 0..=max_lang {
            used[(lang + 1) as usize] = true;
            used[(hyph_start + lang) as usize] = true;
        }

        // First-fit placement of one state's children.
        let place = |used: &mut Vec<bool>, codes: &[i32]| -> i32 {
            if codes.is_empty() {
                return 0;
            }
            let mut base = 1;
            'search: loop {
                for &code in codes {
                    let slot = (base + code) as usize;
                    if slot < used.len() && used[slot] {
                        base += 1;
                        continue 'search;
                    }
                }
                for &code in codes {
                    let slot = (base + code) as usize;
                    if slot >= used.len() {
                        used.resize(slot + 1, false);
                    }
                    used[slot] = true;
                }
                return base;
            }
        };

        // Assign a base to every trie node and every hyphenation-code map.
        let mut bases = vec![0; self.nodes.len()];
        for (index, node) in self.nodes.iter().enumerate() {
            let codes: Vec<i32> = node.children.keys().copied().collect();
            bases[index] = place(&mut used, &codes);
        }
        let mut lc_bases = BTreeMap::new();
        for (&lang, data) in &self.langs {
            if !data.hyph_codes.is_empty() {
                let codes: Vec<i32> = data.hyph_codes.keys().copied().collect();
                lc_bases.insert(lang, place(&mut used, &codes));
            }
        }

        let size = used.len() + max_hyph_char as usize + 2;
        let mut trl = vec![0; size];
        let mut trc = vec![-1; size];
        let mut tro = vec![MIN_TRIE_OP; size];

        // Concatenate the per-language operation arrays, one dummy in front.
        let mut op_start = vec![0; (max_lang + 1) as usize];
        let mut hyf_distance = vec![0];
        let mut hyf_num = vec![0];
        let mut hyf_next = vec![0];
        for (&lang, data) in &self.langs {
            op_start[lang as usize] = hyf_distance.len() as i32 - 1;
            for &(distance, num, next) in &data.ops {
                hyf_distance.push(distance);
                hyf_num.push(num);
                hyf_next.push(next);
            }
        }

        // Write the anchors and the transitions.
        for (&lang, data) in &self.langs {
            let z = (lang as i32 + 1) as usize;
            trc[z] = lang as i32;
            trl[z] = bases[data.root];
            if let Some(&lc_base) = lc_bases.get(&lang) {
                let z = (hyph_start + lang as i32) as usize;
                trc[z] = lang as i32;
                trl[z] = lc_base;
                for (&from, &to) in &data.hyph_codes {
                    let slot = (lc_base + from) as usize;
                    trc[slot] = from;
                    tro[slot] = to;
                }
            }
        }
        for (index, node) in self.nodes.iter().enumerate() {
            for (&code, &child) in &node.children {
                let slot = (bases[index] + code) as usize;
                trc[slot] = code;
                trl[slot] = bases[child];
                tro[slot] = self.nodes[child].op;
            }
        }

        HyphTables {
            trie_trl: trl,
            trie_trc: trc,
            trie_tro: tro,
            op_start,
            hyf_distance,
            hyf_num,
            hyf_next,
            exceptions: self.exceptions,
            hyph_start,
            max_hyph_char,
        }
    }
}

impl Default for TrieBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_tables() {
        let tables = HyphTables::empty();
        assert!(!tables.has_patterns(0));
        assert_eq!(tables.hyph_index(0), 0);
        assert_eq!(tables.exception(0, &['a' as i32]), None);
    }

    #[test]
    fn test_pattern_walk() {
        let mut builder = TrieBuilder::new();
        builder.insert_pattern(0, "ab3c");
        builder.insert_pattern(0, ".x2");
        let tables = builder.build();
        assert!(tables.has_patterns(0));
        assert!(!tables.has_patterns(1));

        // Walk "abc" manually: a, b, c then read the operation.
        let mut z = tables.pattern_root(0) + 'a' as i32;
        assert_eq!(tables.trc(z), 'a' as i32);
        z = tables.trl(z) + 'b' as i32;
        assert_eq!(tables.trc(z), 'b' as i32);
        z = tables.trl(z) + 'c' as i32;
        assert_eq!(tables.trc(z), 'c' as i32);
        let v = tables.tro(z);
        assert_ne!(v, MIN_TRIE_OP);
        let global = v + tables.op_start(0);
        // "ab3c": three characters, the digit after two of them.
        assert_eq!(tables.op_distance(global), 1);
        assert_eq!(tables.op_num(global), 3);
        assert_eq!(tables.op_next(global), MIN_TRIE_OP);

        // The boundary pattern hangs off code zero.
        let z = tables.pattern_root(0);
        assert_eq!(tables.trc(z), 0);
        let z = tables.trl(z) + 'x' as i32;
        assert_eq!(tables.trc(z), 'x' as i32);
        assert_ne!(tables.tro(z), MIN_TRIE_OP);
    }

    #[test]
    fn test_exceptions_and_codes() {
        let mut builder = TrieBuilder::new();
        builder.insert_exception(3, "ta-ble");
        builder.set_hyph_code(3, 'A', 'a');
        let tables = builder.build();

        let codes: Vec<i32> = "table".chars().map(|c| c as i32).collect();
        assert_eq!(tables.exception(3, &codes), Some(&[2][..]));
        assert_eq!(tables.exception(0, &codes), None);

        let index = tables.hyph_index(3);
        assert_ne!(index, 0);
        assert_eq!(tables.trc(index + 'A' as i32), 'A' as i32);
        assert_eq!(tables.tro(index + 'A' as i32), 'a' as i32);
        assert_ne!(tables.trc(index + 'B' as i32), 'B' as i32);
    }
}
