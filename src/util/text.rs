use std::borrow::Cow;

/// Characters that cannot appear in an XML 1.0 document, plus DEL.
///
/// Tab, newline and carriage return are kept.
fn is_forbidden(c: char) -> bool {
    matches!(c, '\u{0}'..='\u{8}' | '\u{b}' | '\u{c}' | '\u{e}'..='\u{1f}' | '\u{7f}')
        || c == '\u{fffe}'
        || c == '\u{ffff}'
}

/// Removes control characters and ANSI escape sequences from imported text.
///
/// Upstream feeds occasionally carry stray control bytes (often pasted
/// terminal colour codes). They are illegal in the XML we render, so they
/// are dropped before an episode reaches the catalog:
///
/// - CSI sequences: `ESC [` parameters up to and including the final byte
/// - OSC sequences: `ESC ]` up to BEL or `ESC \`
/// - any other forbidden character, including a bare ESC
///
/// Returns `Cow::Borrowed` when there is nothing to strip.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    if !s.chars().any(|c| c == '\u{1b}' || is_forbidden(c)) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\u{1b}' {
            if !is_forbidden(c) {
                out.push(c);
            }
            continue;
        }

        match chars.peek() {
            Some('[') => {
                chars.next();
                // Final byte of a CSI sequence is in 0x40..=0x7e
                for c in chars.by_ref() {
                    if ('\u{40}'..='\u{7e}').contains(&c) {
                        break;
                    }
                }
            }
            Some(']') => {
                chars.next();
                while let Some(c) = chars.next() {
                    if c == '\u{7}' {
                        break;
                    }
                    if c == '\u{1b}' && chars.peek() == Some(&'\\') {
                        chars.next();
                        break;
                    }
                }
            }
            _ => {}
        }
    }

    Cow::Owned(out)
}
