//! Small text helpers shared by the feed import and rendering paths.

mod text;

pub use text::strip_control_chars;
