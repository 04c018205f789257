//! MARC-8 (ANSEL) to Unicode conversion
//!
//! Covers the ANSEL extended Latin set and combining diacritics, which is
//! what legacy book records actually use. Escape sequences selecting other
//! graphic sets are consumed and their content passed through as-is.

/// Decode a MARC-8 byte sequence into a String.
///
/// In MARC-8 a combining diacritic precedes its base character; Unicode
/// places it after, so pending diacritics are buffered and re-ordered.
pub fn decode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    let mut pending: Vec<char> = Vec::new();
    let mut iter = bytes.iter().copied().peekable();

    while let Some(b) = iter.next() {
        match b {
            // Escape sequence: intermediates from "(),-$!" then one final.
            0x1b => {
                while matches!(iter.peek(), Some(c) if b"(),-$!".contains(c)) {
                    iter.next();
                }
                iter.next();
            }
            // Non-sorting markers and joiners carry no text.
            0x88 | 0x89 | 0x8d | 0x8e => {}
            // Combining diacritics precede their base in MARC-8.
            0xe0..=0xfe => {
                if let Some(c) = combining_char(b) {
                    pending.push(c);
                }
            }
            _ => {
                let c = if b < 0x80 {
                    b as char
                } else {
                    spacing_char(b).unwrap_or(char::REPLACEMENT_CHARACTER)
                };
                out.push(c);
                for d in pending.drain(..) {
                    out.push(d);
                }
            }
        }
    }
    // Diacritics with no following base character are dropped.
    out
}

/// ANSEL spacing characters (0xA1-0xC8).
fn spacing_char(b: u8) -> Option<char> {
    Some(match b {
        0xa1 => '\u{0141}', // Ł
        0xa2 => '\u{00d8}', // Ø
        0xa3 => '\u{0110}', // Đ
        0xa4 => '\u{00de}', // Þ
        0xa5 => '\u{00c6}', // Æ
        0xa6 => '\u{0152}', // Œ
        0xa7 => '\u{02b9}', // prime
        0xa8 => '\u{00b7}', // middle dot
        0xa9 => '\u{266d}', // flat
        0xaa => '\u{00ae}',
        0xab => '\u{00b1}',
        0xac => '\u{01a0}', // Ơ
        0xad => '\u{01af}', // Ư
        0xae => '\u{02bc}', // alif
        0xb0 => '\u{02bb}', // ayn
        0xb1 => '\u{0142}', // ł
        0xb2 => '\u{00f8}', // ø
        0xb3 => '\u{0111}', // đ
        0xb4 => '\u{00fe}', // þ
        0xb5 => '\u{00e6}', // æ
        0xb6 => '\u{0153}', // œ
        0xb7 => '\u{02ba}', // double prime
        0xb8 => '\u{0131}', // dotless i
        0xb9 => '\u{00a3}', // £
        0xba => '\u{00f0}', // ð
        0xbc => '\u{01a1}', // ơ
        0xbd => '\u{01b0}', // ư
        0xc0 => '\u{00b0}', // degree
        0xc1 => '\u{2113}', // script l
        0xc2 => '\u{2117}', // sound recording copyright
        0xc3 => '\u{00a9}', // ©
        0xc4 => '\u{266f}', // sharp
        0xc5 => '\u{00bf}',
        0xc6 => '\u{00a1}',
        0xc7 => '\u{00df}', // ß
        0xc8 => '\u{20ac}', // €
        _ => return None,
    })
}

/// ANSEL combining diacritics (0xE0-0xFE) mapped to Unicode combining
/// characters.
fn combining_char(b: u8) -> Option<char> {
    Some(match b {
        0xe0 => '\u{0309}', // hook above
        0xe1 => '\u{0300}', // grave
        0xe2 => '\u{0301}', // acute
        0xe3 => '\u{0302}', // circumflex
        0xe4 => '\u{0303}', // tilde
        0xe5 => '\u{0304}', // macron
        0xe6 => '\u{0306}', // breve
        0xe7 => '\u{0307}', // dot above
        0xe8 => '\u{0308}', // umlaut
        0xe9 => '\u{030c}', // caron
        0xea => '\u{030a}', // ring above
        0xeb => '\u{fe20}', // ligature left half
        0xec => '\u{fe21}', // ligature right half
        0xed => '\u{0315}', // comma above right
        0xee => '\u{030b}', // double acute
        0xef => '\u{0310}', // candrabindu
        0xf0 => '\u{0327}', // cedilla
        0xf1 => '\u{0328}', // ogonek
        0xf2 => '\u{0323}', // dot below
        0xf3 => '\u{0324}', // double dot below
        0xf4 => '\u{0325}', // ring below
        0xf5 => '\u{0333}', // double underscore
        0xf6 => '\u{0332}', // underscore
        0xf7 => '\u{0326}', // comma below
        0xf8 => '\u{031c}', // left half ring below
        0xf9 => '\u{032e}', // breve below
        0xfa => '\u{fe22}', // double tilde left half
        0xfb => '\u{fe23}', // double tilde right half
        0xfe => '\u{0313}', // comma above
        _ => return None,
    })
}
