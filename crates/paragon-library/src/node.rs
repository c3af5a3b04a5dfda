//! The typesetting node model.
//!
//! The original engine stores every node as a handful of raw memory words
//! whose halves are reinterpreted per kind. Here each kind is a variant of
//! [`Body`] with a typed payload; the arena facade still exposes the kind
//! and subtype tags the raw layout would.

use paragon_utils::Scaled;

use crate::arena::{Arena, NodeRef};
use crate::font::FontId;
use crate::glue::SpecRef;
use crate::widths::WidthVec;

/// Penalties at or beyond this magnitude are infinite: positive forbids a
/// break, negative forces one.
pub const INF_PENALTY: i32 = 10_000;

/// The penalty for a forced break.
pub const EJECT_PENALTY: i32 = -10_000;

/// Demerits worse than any real alternative.
pub const AWFUL_BAD: i32 = 0x3FFF_FFFF;

/// The largest character code a legacy font can address.
pub const BIGGEST_CHAR: i32 = 0xFFFF;

/// A code that is not a character; used as the "no boundary" marker.
pub const TOO_BIG_CHAR: i32 = 0x1_0000;

/// How well a line matches its target width, from most stretched to most
/// compressed.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[repr(u8)]
pub enum FitClass {
    VeryLoose = 0,
    Loose = 1,
    Decent = 2,
    Tight = 3,
}

impl FitClass {
    /// All classes, for iteration in deactivation order.
    pub const ALL: [FitClass; 4] =
        [FitClass::VeryLoose, FitClass::Loose, FitClass::Decent, FitClass::Tight];

    /// The array index of this class.
    pub const fn index(self) -> usize {
        self as usize
    }

    /// How many steps apart two classes are.
    pub fn distance(self, other: FitClass) -> i32 {
        (self as i32 - other as i32).abs()
    }
}

/// Whether a breakpoint ends its line at ordinary material or inside a word.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BreakType {
    Unhyphenated,
    Hyphenated,
}

/// What produced a kern.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[repr(u16)]
pub enum KernType {
    /// From a font's kerning program; invisible to breaking.
    Normal = 0,
    /// From an explicit `\kern`; a break may follow it.
    Explicit = 1,
    /// Part of an accent construction.
    Accent = 2,
    /// Inter-word spacing adjustment.
    SpaceAdjustment = 3,
}

/// Which margin of a line a protrusion kern sits at.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Side {
    Left,
    Right,
}

/// Math-node subtype for "math off" (resumes automatic breaking).
pub const MATH_AFTER: u16 = 1;
/// Base for the eTeX left-to-right direction subtypes.
pub const L_CODE: u16 = 4;
/// Offset of an "end" direction subtype within its group.
pub const END_M_CODE: u16 = 3;
/// Subtype of a math node opening a left-to-right segment.
pub const BEGIN_L_CODE: u16 = 6;
/// Subtype of a math node closing a left-to-right segment.
pub const END_L_CODE: u16 = 7;
/// Subtype of a math node opening a right-to-left segment.
pub const BEGIN_R_CODE: u16 = 10;
/// Subtype of a math node closing a right-to-left segment.
pub const END_R_CODE: u16 = 11;

/// The "end" subtype matching a direction math node of either polarity.
pub const fn end_lr_type(subtype: u16) -> u16 {
    L_CODE * (subtype / L_CODE) + END_M_CODE
}

/// Whether a direction math node closes its segment.
pub const fn is_lr_end(subtype: u16) -> bool {
    subtype % 2 == 1
}

/// The kind tag of a node, as the arena facade reports it.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum NodeKind {
    Char,
    List,
    Rule,
    Glue,
    Kern,
    Ligature,
    Disc,
    Math,
    Penalty,
    Mark,
    Ins,
    Adjust,
    MarginKern,
    Whatsit,
    Active,
    Passive,
    Delta,
    Head,
}

/// A single character in some font.
#[derive(Debug, Clone)]
pub struct CharNode {
    pub font: FontId,
    pub chr: i32,
}

/// Whether a box stacks its contents horizontally or vertically.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BoxKind {
    Horizontal,
    Vertical,
}

/// How the glue in a box is being set.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum GlueSign {
    #[default]
    Normal,
    Stretching,
    Shrinking,
}

/// A packaged box.
#[derive(Debug, Clone)]
pub struct ListNode {
    pub kind: BoxKind,
    pub width: Scaled,
    pub height: Scaled,
    pub depth: Scaled,
    /// Downward displacement when appended to a vertical list.
    pub shift: Scaled,
    pub glue_set: f64,
    pub glue_sign: GlueSign,
    pub glue_order: crate::glue::GlueOrder,
    pub list: NodeRef,
}

impl ListNode {
    /// An empty horizontal box.
    pub fn hbox() -> Self {
        Self {
            kind: BoxKind::Horizontal,
            width: Scaled::ZERO,
            height: Scaled::ZERO,
            depth: Scaled::ZERO,
            shift: Scaled::ZERO,
            glue_set: 0.0,
            glue_sign: GlueSign::Normal,
            glue_order: crate::glue::GlueOrder::Normal,
            list: NodeRef::NULL,
        }
    }
}

/// A solid rule.
#[derive(Debug, Clone)]
pub struct RuleNode {
    pub width: Scaled,
    pub height: Scaled,
    pub depth: Scaled,
}

/// Identifies which glue parameter a glue node was created from.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum GluePar {
    LeftSkip,
    RightSkip,
    ParFillSkip,
}

/// Stretchable and shrinkable space.
#[derive(Debug, Clone)]
pub struct GlueNode {
    pub spec: SpecRef,
    pub leader: NodeRef,
    /// Set when the glue came from a named parameter.
    pub param: Option<GluePar>,
}

/// Fixed space.
#[derive(Debug, Clone)]
pub struct KernNode {
    pub width: Scaled,
    pub subtype: KernType,
}

/// A character produced by fusing others through the font's ligature
/// program. `lig` holds the original characters; `hits` records whether a
/// word-boundary marker participated on the left (bit 1) or right (bit 0).
#[derive(Debug, Clone)]
pub struct LigatureNode {
    pub font: FontId,
    pub chr: i32,
    pub lig: NodeRef,
    pub hits: u16,
}

impl LigatureNode {
    /// Whether the left word boundary participated in this ligature.
    pub const fn left_hit(&self) -> bool {
        self.hits > 1
    }

    /// Whether the right word boundary participated in this ligature.
    pub const fn right_hit(&self) -> bool {
        self.hits % 2 == 1
    }
}

/// A discretionary break: `pre` ends the line if the break is taken, `post`
/// starts the next one, and `replace` nodes following this one in the main
/// list are consumed by the break.
#[derive(Debug, Clone)]
pub struct DiscNode {
    pub pre: NodeRef,
    pub post: NodeRef,
    pub replace: u16,
}

/// An on/off switch for math mode, doubling as an eTeX direction boundary.
#[derive(Debug, Clone)]
pub struct MathNode {
    pub subtype: u16,
    pub width: Scaled,
}

/// A breakpoint weight.
#[derive(Debug, Clone)]
pub struct PenaltyNode {
    pub penalty: i32,
}

/// A mark to be extracted by the page builder.
#[derive(Debug, Clone)]
pub struct MarkNode {
    pub class: i32,
}

/// Material to be inserted elsewhere on the page.
#[derive(Debug, Clone)]
pub struct InsNode {
    pub list: NodeRef,
}

/// Material migrating to the vertical list before or after its line.
#[derive(Debug, Clone)]
pub struct AdjustNode {
    pub pre: bool,
    pub list: NodeRef,
}

/// A signed kern protruding a character into the margin.
#[derive(Debug, Clone)]
pub struct MarginKernNode {
    pub width: Scaled,
    pub side: Side,
}

/// Switches the hyphenation language and limits mid-list.
#[derive(Debug, Clone)]
pub struct LanguageNode {
    pub lang: u16,
    pub left_hyphen_min: i32,
    pub right_hyphen_min: i32,
}

/// A pre-shaped word carried as UTF-16 code units.
#[derive(Debug, Clone)]
pub struct NativeWordNode {
    pub font: FontId,
    pub text: Vec<u16>,
    pub width: Scaled,
    /// Whether the node carries replacement "actual text" for extraction.
    pub actual_text: bool,
}

impl NativeWordNode {
    /// The Unicode scalar value starting at unit `i`.
    ///
    /// An unpaired surrogate (including a high surrogate in the final unit,
    /// which the original read past the array for) yields U+FFFD.
    pub fn usv_at(&self, i: usize) -> i32 {
        let c = self.text[i];
        if (0xD800..0xDC00).contains(&c) {
            match self.text.get(i + 1) {
                Some(&low) if (0xDC00..0xE000).contains(&low) => {
                    0x10000 + (c as i32 - 0xD800) * 0x400 + (low as i32 - 0xDC00)
                }
                _ => 0xFFFD,
            }
        } else if (0xDC00..0xE000).contains(&c) {
            0xFFFD
        } else {
            c as i32
        }
    }

    /// How many code units the scalar value at unit `i` occupies.
    pub fn usv_len(&self, i: usize) -> usize {
        if self.usv_at(i) >= 0x10000 { 2 } else { 1 }
    }
}

/// A single positioned glyph.
#[derive(Debug, Clone)]
pub struct GlyphNode {
    pub font: FontId,
    pub glyph: u16,
    pub width: Scaled,
}

/// An extension node.
#[derive(Debug, Clone)]
pub enum Whatsit {
    Language(LanguageNode),
    NativeWord(NativeWordNode),
    Glyph(GlyphNode),
    Pic { width: Scaled },
    Pdf { width: Scaled },
}

impl Whatsit {
    /// The width this whatsit contributes to its line, if any.
    pub fn width(&self) -> Option<Scaled> {
        match self {
            Self::Language(_) => None,
            Self::NativeWord(word) => Some(word.width),
            Self::Glyph(glyph) => Some(glyph.width),
            Self::Pic { width } | Self::Pdf { width } => Some(*width),
        }
    }
}

/// A breakpoint candidate still alive in the feasibility engine.
#[derive(Debug, Clone)]
pub struct ActiveNode {
    pub break_type: BreakType,
    pub fitness: FitClass,
    /// The passive node recording this candidate's break, or null for the
    /// start of the paragraph.
    pub break_node: NodeRef,
    /// The number of the line this candidate would end.
    pub line_number: i32,
    pub total_demerits: i32,
    /// Last-line-fit bookkeeping: how much the line falls short.
    pub shortfall: Scaled,
    /// Last-line-fit bookkeeping: the glue adjustment that closes it.
    pub glue: Scaled,
}

/// A committed breakpoint in the dynamic-programming chain.
#[derive(Debug, Clone)]
pub struct PassiveNode {
    /// The node at which the break occurs (null for the final break).
    pub cur_break: NodeRef,
    /// The passive node this one builds on.
    pub prev_break: NodeRef,
}

/// Width adjustments between neighboring entries of the active list.
#[derive(Debug, Clone)]
pub struct DeltaNode {
    pub widths: WidthVec,
}

/// The payload of a node.
#[derive(Debug, Clone)]
pub enum Body {
    Char(CharNode),
    List(ListNode),
    Rule(RuleNode),
    Glue(GlueNode),
    Kern(KernNode),
    Ligature(LigatureNode),
    Disc(DiscNode),
    Math(MathNode),
    Penalty(PenaltyNode),
    Mark(MarkNode),
    Ins(InsNode),
    Adjust(AdjustNode),
    MarginKern(MarginKernNode),
    Whatsit(Whatsit),
    Active(ActiveNode),
    Passive(PassiveNode),
    Delta(DeltaNode),
    /// A list-head sentinel owned by the engine; never part of output.
    Head,
}

impl Body {
    /// The kind tag.
    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Char(_) => NodeKind::Char,
            Self::List(_) => NodeKind::List,
            Self::Rule(_) => NodeKind::Rule,
            Self::Glue(_) => NodeKind::Glue,
            Self::Kern(_) => NodeKind::Kern,
            Self::Ligature(_) => NodeKind::Ligature,
            Self::Disc(_) => NodeKind::Disc,
            Self::Math(_) => NodeKind::Math,
            Self::Penalty(_) => NodeKind::Penalty,
            Self::Mark(_) => NodeKind::Mark,
            Self::Ins(_) => NodeKind::Ins,
            Self::Adjust(_) => NodeKind::Adjust,
            Self::MarginKern(_) => NodeKind::MarginKern,
            Self::Whatsit(_) => NodeKind::Whatsit,
            Self::Active(_) => NodeKind::Active,
            Self::Passive(_) => NodeKind::Passive,
            Self::Delta(_) => NodeKind::Delta,
            Self::Head => NodeKind::Head,
        }
    }

    /// The variant-specific subtype tag.
    pub fn subtype(&self) -> u16 {
        match self {
            Self::Glue(glue) => match glue.param {
                None => 0,
                Some(GluePar::LeftSkip) => 1,
                Some(GluePar::RightSkip) => 2,
                Some(GluePar::ParFillSkip) => 3,
            },
            Self::Kern(kern) => kern.subtype as u16,
            Self::Ligature(lig) => lig.hits,
            Self::Disc(disc) => disc.replace,
            Self::Math(math) => math.subtype,
            Self::MarginKern(kern) => match kern.side {
                Side::Left => 0,
                Side::Right => 1,
            },
            Self::Whatsit(whatsit) => match whatsit {
                Whatsit::Language(_) => 0,
                Whatsit::NativeWord(_) => 1,
                Whatsit::Glyph(_) => 2,
                Whatsit::Pic { .. } => 3,
                Whatsit::Pdf { .. } => 4,
            },
            _ => 0,
        }
    }

    /// Whether a break after a glue node is forbidden when this node
    /// precedes it. Glue, kerns, penalties, and math nodes are discardable
    /// at a break; everything else is not.
    pub fn is_discardable(&self) -> bool {
        matches!(
            self.kind(),
            NodeKind::Glue | NodeKind::Kern | NodeKind::Penalty | NodeKind::Math
        )
    }
}

macro_rules! typed_accessors {
    ($($ref_name:ident, $mut_name:ident => $variant:ident($ty:ty);)*) => {
        impl Arena {
            $(
                #[doc = concat!("The `", stringify!($variant), "` payload of `p`.")]
                #[track_caller]
                pub fn $ref_name(&self, p: NodeRef) -> &$ty {
                    match &self[p].body {
                        Body::$variant(inner) => inner,
                        other => panic!(
                            concat!("expected ", stringify!($variant), " node, found {:?}"),
                            other.kind()
                        ),
                    }
                }

                #[doc = concat!("The mutable `", stringify!($variant), "` payload of `p`.")]
                #[track_caller]
                pub fn $mut_name(&mut self, p: NodeRef) -> &mut $ty {
                    match &mut self[p].body {
                        Body::$variant(inner) => inner,
                        other => panic!(
                            concat!("expected ", stringify!($variant), " node, found {:?}"),
                            other.kind()
                        ),
                    }
                }
            )*
        }
    };
}

typed_accessors! {
    char_node, char_node_mut => Char(CharNode);
    list_node, list_node_mut => List(ListNode);
    glue_node, glue_node_mut => Glue(GlueNode);
    kern_node, kern_node_mut => Kern(KernNode);
    ligature, ligature_mut => Ligature(LigatureNode);
    disc, disc_mut => Disc(DiscNode);
    math, math_mut => Math(MathNode);
    penalty, penalty_mut => Penalty(PenaltyNode);
    active, active_mut => Active(ActiveNode);
    passive, passive_mut => Passive(PassiveNode);
    delta, delta_mut => Delta(DeltaNode);
}

impl Arena {
    /// Whether `p` is a character node.
    pub fn is_char(&self, p: NodeRef) -> bool {
        matches!(self[p].body, Body::Char(_))
    }

    /// Whether `p` is a pre-shaped native word.
    pub fn is_native_word(&self, p: NodeRef) -> bool {
        matches!(self[p].body, Body::Whatsit(Whatsit::NativeWord(_)))
    }

    /// The native-word payload of `p`.
    #[track_caller]
    pub fn native_word(&self, p: NodeRef) -> &NativeWordNode {
        match &self[p].body {
            Body::Whatsit(Whatsit::NativeWord(word)) => word,
            other => panic!("expected native word, found {:?}", other.kind()),
        }
    }

    /// The mutable native-word payload of `p`.
    #[track_caller]
    pub fn native_word_mut(&mut self, p: NodeRef) -> &mut NativeWordNode {
        match &mut self[p].body {
            Body::Whatsit(Whatsit::NativeWord(word)) => word,
            other => panic!("expected native word, found {:?}", other.kind()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usv_bounds() {
        let word = NativeWordNode {
            font: FontId::default(),
            // "a", U+1D11E (surrogate pair), then an unpaired high surrogate.
            text: vec![0x61, 0xD834, 0xDD1E, 0xD834],
            width: Scaled::ZERO,
            actual_text: false,
        };
        assert_eq!(word.usv_at(0), 0x61);
        assert_eq!(word.usv_at(1), 0x1D11E);
        assert_eq!(word.usv_len(1), 2);
        assert_eq!(word.usv_at(3), 0xFFFD);
        assert_eq!(word.usv_len(3), 1);
    }

    #[test]
    fn test_lr_codes() {
        assert_eq!(end_lr_type(BEGIN_L_CODE), END_L_CODE);
        assert_eq!(end_lr_type(END_L_CODE), END_L_CODE);
        assert_eq!(end_lr_type(BEGIN_R_CODE), END_R_CODE);
        assert!(!is_lr_end(BEGIN_R_CODE));
        assert!(is_lr_end(END_R_CODE));
    }
}
