//! Paragon's shared data model: the node arena, glue specifications, fonts
//! with their ligature/kern programs, hyphenation tables, layout parameters,
//! and the [`Engine`](engine::Engine) context that ties them together.

pub mod arena;
pub mod diag;
pub mod engine;
pub mod font;
pub mod glue;
pub mod hyph;
pub mod node;
pub mod params;
pub mod widths;

pub use self::arena::{Arena, NodeRef};
pub use self::engine::{Engine, ListState, Mode};
pub use self::font::{Font, FontId, LigKernStep};
pub use self::glue::{GlueOrder, GlueSpec, GlueSpecs, SpecRef};
pub use self::hyph::{HyphTables, TrieBuilder};
pub use self::params::Params;
pub use self::widths::WidthVec;
