//! Word transforms of the static dictionary (RFC 7932 appendix B).

/// Change applied to the dictionary word between prefix and suffix
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WordTransform {
    Identity,
    /// Drop the last N bytes (1-9)
    OmitLast(u8),
    /// Drop the first N bytes (1-9)
    OmitFirst(u8),
    UppercaseFirst,
    UppercaseAll,
}

use WordTransform::{Identity, OmitFirst, OmitLast, UppercaseAll, UppercaseFirst};

#[derive(Clone, Copy, Debug)]
pub struct Transform {
    pub prefix: &'static [u8],
    pub kind: WordTransform,
    pub suffix: &'static [u8],
}

const fn t(prefix: &'static [u8], kind: WordTransform, suffix: &'static [u8]) -> Transform {
    Transform { prefix, kind, suffix }
}

pub const NUM_TRANSFORMS: usize = 121;

pub static TRANSFORMS: [Transform; NUM_TRANSFORMS] = [
    t(b"", Identity, b""), // 0
    t(b"", Identity, b" "), // 1
    t(b" ", Identity, b" "), // 2
    t(b"", OmitFirst(1), b""), // 3
    t(b"", UppercaseFirst, b" "), // 4
    t(b"", Identity, b" the "), // 5
    t(b" ", Identity, b""), // 6
    t(b"s ", Identity, b" "), // 7
    t(b"", Identity, b" of "), // 8
    t(b"", UppercaseFirst, b""), // 9
    t(b"", Identity, b" and "), // 10
    t(b"", OmitFirst(2), b""), // 11
    t(b"", OmitLast(1), b""), // 12
    t(b", ", Identity, b" "), // 13
    t(b"", Identity, b", "), // 14
    t(b" ", UppercaseFirst, b" "), // 15
    t(b"", Identity, b" in "), // 16
    t(b"", Identity, b" to "), // 17
    t(b"e ", Identity, b" "), // 18
    t(b"", Identity, b"\""), // 19
    t(b"", Identity, b"."), // 20
    t(b"", Identity, b"\">"), // 21
    t(b"", Identity, b"\n"), // 22
    t(b"", OmitLast(3), b""), // 23
    t(b"", Identity, b"]"), // 24
    t(b"", Identity, b" for "), // 25
    t(b"", OmitFirst(3), b""), // 26
    t(b"", OmitLast(2), b""), // 27
    t(b"", Identity, b" a "), // 28
    t(b"", Identity, b" that "), // 29
    t(b" ", UppercaseFirst, b""), // 30
    t(b"", Identity, b". "), // 31
    t(b".", Identity, b""), // 32
    t(b" ", Identity, b", "), // 33
    t(b"", OmitFirst(4), b""), // 34
    t(b"", Identity, b" with "), // 35
    t(b"", Identity, b"'"), // 36
    t(b"", Identity, b" from "), // 37
    t(b"", Identity, b" by "), // 38
    t(b"", OmitFirst(5), b""), // 39
    t(b"", OmitFirst(6), b""), // 40
    t(b" the ", Identity, b""), // 41
    t(b"", OmitLast(4), b""), // 42
    t(b"", Identity, b". The "), // 43
    t(b"", UppercaseAll, b""), // 44
    t(b"", Identity, b" on "), // 45
    t(b"", Identity, b" as "), // 46
    t(b"", Identity, b" is "), // 47
    t(b"", OmitLast(7), b""), // 48
    t(b"", OmitLast(1), b"ing "), // 49
    t(b"", Identity, b"\n\t"), // 50
    t(b"", Identity, b":"), // 51
    t(b" ", Identity, b". "), // 52
    t(b"", Identity, b"ed "), // 53
    t(b"", OmitFirst(9), b""), // 54
    t(b"", OmitFirst(7), b""), // 55
    t(b"", OmitLast(6), b""), // 56
    t(b"", Identity, b"("), // 57
    t(b"", UppercaseFirst, b", "), // 58
    t(b"", OmitLast(8), b""), // 59
    t(b"", Identity, b" at "), // 60
    t(b"", Identity, b"ly "), // 61
    t(b" the ", Identity, b" of "), // 62
    t(b"", OmitLast(5), b""), // 63
    t(b"", OmitLast(9), b""), // 64
    t(b" ", UppercaseFirst, b", "), // 65
    t(b"", UppercaseFirst, b"\""), // 66
    t(b".", Identity, b"("), // 67
    t(b"", UppercaseAll, b" "), // 68
    t(b"", UppercaseFirst, b"\">"), // 69
    t(b"", Identity, b"=\""), // 70
    t(b" ", Identity, b"."), // 71
    t(b".com/", Identity, b""), // 72
    t(b" the ", Identity, b" of the "), // 73
    t(b"", UppercaseFirst, b"'"), // 74
    t(b"", Identity, b". This "), // 75
    t(b"", Identity, b","), // 76
    t(b".", Identity, b" "), // 77
    t(b"", UppercaseFirst, b"("), // 78
    t(b"", UppercaseFirst, b"."), // 79
    t(b"", Identity, b" not "), // 80
    t(b" ", Identity, b"=\""), // 81
    t(b"", Identity, b"er "), // 82
    t(b" ", UppercaseAll, b" "), // 83
    t(b"", Identity, b"al "), // 84
    t(b" ", UppercaseAll, b""), // 85
    t(b"", Identity, b"='"), // 86
    t(b"", UppercaseAll, b"\""), // 87
    t(b"", UppercaseFirst, b". "), // 88
    t(b" ", Identity, b"("), // 89
    t(b"", Identity, b"ful "), // 90
    t(b" ", UppercaseFirst, b". "), // 91
    t(b"", Identity, b"ive "), // 92
    t(b"", Identity, b"less "), // 93
    t(b"", UppercaseAll, b"'"), // 94
    t(b"", Identity, b"est "), // 95
    t(b" ", UppercaseFirst, b"."), // 96
    t(b"", UppercaseAll, b"\">"), // 97
    t(b" ", Identity, b"='"), // 98
    t(b"", UppercaseFirst, b","), // 99
    t(b"", Identity, b"ize "), // 100
    t(b"", UppercaseAll, b"."), // 101
    t(b"\xc2\xa0", Identity, b""), // 102
    t(b" ", Identity, b","), // 103
    t(b"", UppercaseFirst, b"=\""), // 104
    t(b"", UppercaseAll, b"=\""), // 105
    t(b"", Identity, b"ous "), // 106
    t(b"", UppercaseAll, b", "), // 107
    t(b"", UppercaseFirst, b"='"), // 108
    t(b" ", UppercaseFirst, b","), // 109
    t(b" ", UppercaseAll, b"=\""), // 110
    t(b" ", UppercaseAll, b", "), // 111
    t(b"", UppercaseAll, b","), // 112
    t(b"", UppercaseAll, b"("), // 113
    t(b"", UppercaseAll, b". "), // 114
    t(b" ", UppercaseAll, b"."), // 115
    t(b"", UppercaseAll, b"='"), // 116
    t(b" ", UppercaseAll, b". "), // 117
    t(b" ", UppercaseFirst, b"=\""), // 118
    t(b" ", UppercaseAll, b"='"), // 119
    t(b" ", UppercaseFirst, b"='"), // 120
];

/// Transform ids of "omit last N" for N = 0..=9, used for partial matches
pub const CUTOFF_TRANSFORMS: [u8; 10] = [0, 12, 27, 23, 42, 63, 56, 48, 59, 64];

/// Upper-case the character starting at `p[0]`, returning its byte length
///
/// ASCII letters flip case; two-byte sequences flip bit 5 of the second
/// byte and longer sequences xor the third byte with 5, as decoders do.
pub fn to_upper(p: &mut [u8]) -> usize {
    if p[0] < 0xC0 {
        if p[0].is_ascii_lowercase() {
            p[0] ^= 32;
        }
        return 1;
    }
    if p[0] < 0xE0 {
        if p.len() > 1 {
            p[1] ^= 32;
        }
        return 2;
    }
    if p.len() > 2 {
        p[2] ^= 5;
    }
    3
}

/// Apply only the word part of a transform (no prefix or suffix)
pub fn transform_core(word: &[u8], kind: WordTransform, out: &mut Vec<u8>) {
    let start = out.len();
    match kind {
        Identity | UppercaseFirst | UppercaseAll => out.extend_from_slice(word),
        OmitLast(n) => out.extend_from_slice(&word[..word.len().saturating_sub(n as usize)]),
        OmitFirst(n) => out.extend_from_slice(&word[(n as usize).min(word.len())..]),
    }
    let core = &mut out[start..];
    if core.is_empty() {
        return;
    }
    match kind {
        UppercaseFirst => {
            to_upper(core);
        }
        UppercaseAll => {
            let mut i = 0;
            while i < core.len() {
                i += to_upper(&mut core[i..]);
            }
        }
        _ => {}
    }
}

/// Append the full transformed word for `transform_id` to `out`
pub fn transform_word(word: &[u8], transform_id: usize, out: &mut Vec<u8>) {
    let tr = &TRANSFORMS[transform_id];
    out.extend_from_slice(tr.prefix);
    transform_core(word, tr.kind, out);
    out.extend_from_slice(tr.suffix);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cutoff_transforms_are_omit_last() {
        assert_eq!(TRANSFORMS[0].kind, Identity);
        for (n, &id) in CUTOFF_TRANSFORMS.iter().enumerate().skip(1) {
            let tr = &TRANSFORMS[id as usize];
            assert_eq!(tr.kind, OmitLast(n as u8));
            assert!(tr.prefix.is_empty() && tr.suffix.is_empty());
        }
    }

    #[test]
    fn test_common_transforms() {
        let mut out = Vec::new();
        transform_word(b"time", 5, &mut out);
        assert_eq!(out, b"time the ");
        out.clear();
        transform_word(b"time", 44, &mut out);
        assert_eq!(out, b"TIME");
        out.clear();
        transform_word(b"example", 72, &mut out);
        assert_eq!(out, b".com/example");
        out.clear();
        transform_word(b"make", 49, &mut out);
        assert_eq!(out, b"making ");
    }

    #[test]
    fn test_matches_reference_decoder() {
        use brotli_decompressor::transform::TransformDictionaryWord;
        let words: [&[u8]; 5] = [b"time", b"information", b"\xc3\xa9t\xc3\xa9", b"a", b"\xe4\xb8\xad\xe6\x96\x87"];
        for word in words {
            for id in 0..NUM_TRANSFORMS {
                let mut ours = Vec::new();
                transform_word(word, id, &mut ours);
                let mut dst = [0u8; 64];
                let n = TransformDictionaryWord(&mut dst, word, word.len() as i32, id as i32);
                assert_eq!(ours, &dst[..n as usize], "word {:?} transform {}", word, id);
            }
        }
    }

    #[test]
    fn test_to_upper_multibyte() {
        let mut s = *b"\xc3\xa9";
        assert_eq!(to_upper(&mut s), 2);
        assert_eq!(s, *b"\xc3\x89");
    }
}
