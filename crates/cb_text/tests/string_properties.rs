use cb_core::runtime::ObjectRef;
use cb_core::{CharRange, ErrorKind};
use cb_text::string::EMPTY_STRING_HASH;
use cb_text::{CompareOptions, Encoding, InlineBuffer, MutableString, StringRef};
use proptest::prelude::*;

fn s(text: &str) -> StringRef {
    StringRef::with_str(None, text).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]

    #[test]
    fn printable_ascii_round_trips_every_encoding(text in "[ -~]{0,40}") {
        let string = s(&text);
        for encoding in Encoding::ALL {
            let mut out = vec![0u8; text.len() * 4 + 4];
            let done = string.get_bytes(
                CharRange::new(0, string.len()),
                encoding,
                None,
                false,
                Some(&mut out),
            );
            prop_assert_eq!(done.units, string.len());
            let back = StringRef::with_bytes(None, &out[..done.bytes], encoding, false).unwrap();
            prop_assert_eq!(back.to_string(), text.clone());
            prop_assert!(!back.is_wide());

            let external = string.external_representation(encoding, None).unwrap();
            let back = StringRef::from_external_representation(None, &external, encoding).unwrap();
            prop_assert_eq!(back.to_string(), text.clone());
        }
    }

    #[test]
    fn unicode_round_trips_unicode_encodings(text in "\\PC{0,24}") {
        let string = s(&text);
        prop_assert_eq!(string.to_string(), text.clone());
        for encoding in [Encoding::Utf8, Encoding::Utf16, Encoding::Utf16Be, Encoding::Utf16Le,
                         Encoding::Utf32, Encoding::Utf32Be, Encoding::Utf32Le] {
            let external = string.external_representation(encoding, None).unwrap();
            let back = StringRef::from_external_representation(None, &external, encoding).unwrap();
            prop_assert_eq!(&back, &string);
            prop_assert_eq!(back.hash_code(), string.hash_code());
        }
    }

    #[test]
    fn equal_strings_hash_equal_across_representations(text in "\\PC{0,24}") {
        let immutable = s(&text);
        let mutable = MutableString::with_str(None, &text).unwrap();
        let wide: Vec<u16> = text.encode_utf16().collect();
        let from_units = StringRef::with_characters(None, &wide).unwrap();
        prop_assert_eq!(&immutable, mutable.as_string());
        prop_assert_eq!(&immutable, &from_units);
        prop_assert_eq!(immutable.hash_code(), mutable.hash_code());
        prop_assert_eq!(immutable.hash_code(), from_units.hash_code());
    }
}

#[test]
fn hash_matches_the_documented_algorithm() {
    assert_eq!(s("").hash_code(), EMPTY_STRING_HASH);
    assert_eq!(s("abc").hash_code(), (97 * 33 + 98) * 33 + 99);
    let emoji = s("\u{1F600}");
    assert!(emoji.is_wide());
    assert_eq!(emoji.len(), 2);
    assert_eq!(emoji.hash_code(), 0x1F600);
}

#[test]
fn hash_is_memoized() {
    let string = s("memoize me");
    assert_eq!(string.cached_hash(), None);
    let hash = string.hash_code();
    assert_eq!(string.cached_hash(), Some(hash));
    assert_eq!(string.hash_code(), hash);
}

#[test]
fn ascii_prefers_narrow_storage() {
    assert!(!s("plain").is_wide());
    assert!(s("café").is_wide());
    let utf16: Vec<u8> = "abc".encode_utf16().flat_map(u16::to_ne_bytes).collect();
    let decoded = StringRef::with_bytes(None, &utf16, Encoding::Utf16, false).unwrap();
    assert!(!decoded.is_wide());
    assert_eq!(decoded, "abc");
}

#[test]
fn malformed_bytes_fail_construction() {
    let cases: [(&[u8], Encoding); 5] = [
        (&[0x61, 0x80], Encoding::Ascii),
        (&[0xC3], Encoding::Utf8),
        (&[0x00, 0x61, 0x00], Encoding::Utf16Be),
        (&[0x00, 0x11, 0x00, 0x00], Encoding::Utf32Be),
        (&[0x00, 0xD8, 0x00, 0x00], Encoding::Utf32Le),
    ];
    for (bytes, encoding) in cases {
        let err = StringRef::with_bytes(None, bytes, encoding, false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Construction, "{encoding:?}");
    }
}

#[test]
fn latin1_decodes_to_wide() {
    let string = StringRef::with_bytes(None, &[0x63, 0x61, 0x66, 0xE9], Encoding::IsoLatin1, false)
        .unwrap();
    assert!(string.is_wide());
    assert_eq!(string, "café");
}

#[test]
fn external_utf16_honors_byte_order_marks() {
    let be = [0xFE, 0xFF, 0x00, 0x68, 0x00, 0xE9];
    let le = [0xFF, 0xFE, 0x68, 0x00, 0xE9, 0x00];
    let unmarked = [0x00, 0x68, 0x00, 0xE9];
    for bytes in [&be[..], &le[..], &unmarked[..]] {
        let string = StringRef::from_external_representation(None, bytes, Encoding::Utf16).unwrap();
        assert_eq!(string, "hé");
    }
    let utf8_bom = [0xEF, 0xBB, 0xBF, b'o', b'k'];
    let string = StringRef::from_external_representation(None, &utf8_bom, Encoding::Utf8).unwrap();
    assert_eq!(string, "ok");
}

#[test]
fn lossy_encoding_uses_the_loss_byte() {
    let string = s("café!");
    let whole = CharRange::new(0, string.len());
    let mut out = [0u8; 8];
    let done = string.get_bytes(whole, Encoding::Ascii, Some(b'?'), false, Some(&mut out));
    assert_eq!(done.units, 5);
    assert_eq!(&out[..done.bytes], b"caf?!");

    let strict = string.get_bytes(whole, Encoding::Ascii, None, false, Some(&mut out));
    assert_eq!(strict.units, 3);
    assert_eq!(strict.bytes, 3);

    assert!(string.external_representation(Encoding::Ascii, None).is_none());
    let sized = string.get_bytes(whole, Encoding::Utf8, None, false, None);
    assert_eq!(sized.bytes, 6);
}

#[test]
fn encoding_stops_when_the_buffer_is_full() {
    let string = s("hello");
    let mut out = [0u8; 3];
    let done = string.get_bytes(
        CharRange::new(0, 5),
        Encoding::Utf8,
        None,
        false,
        Some(&mut out),
    );
    assert_eq!(done.units, 3);
    assert_eq!(&out, b"hel");
}

#[test]
fn cstring_access() {
    let string = s("hello");
    assert_eq!(string.as_cstr(Encoding::Utf8), Some(c"hello"));
    assert_eq!(string.as_cstr(Encoding::Utf16), None);
    assert!(string.as_characters().is_none());

    let mut buffer = [0xAAu8; 6];
    assert!(string.get_cstring(&mut buffer, Encoding::Ascii));
    assert_eq!(&buffer, b"hello\0");
    let mut small = [0u8; 5];
    assert!(!string.get_cstring(&mut small, Encoding::Ascii));

    let wide = s("héllo");
    assert!(wide.as_cstr(Encoding::Utf8).is_none());
    assert_eq!(wide.as_characters().map(<[u16]>::len), Some(5));
}

#[test]
fn character_access() {
    let string = s("héllo");
    assert_eq!(string.character_at(1), Some(0xE9));
    assert_eq!(string.character_at(5), None);
    let mut buffer = [0u16; 3];
    assert_eq!(string.get_characters(CharRange::new(1, 3), &mut buffer), 3);
    assert_eq!(String::from_utf16_lossy(&buffer), "éll");
}

#[test]
fn copy_of_immutable_with_same_allocator_is_retained() {
    let string = s("shared");
    let copy = string.copy(None).unwrap();
    assert!(ObjectRef::ptr_eq(string.as_object(), copy.as_object()));

    let other = cb_core::Allocator::create("other", cb_core::alloc::SystemAllocator);
    let moved = string.copy(Some(&other)).unwrap();
    assert!(!ObjectRef::ptr_eq(string.as_object(), moved.as_object()));
    assert_eq!(moved, string);
    assert_eq!(moved.allocator(), &other);

    let mutable = MutableString::with_str(None, "shared").unwrap();
    let snapshot = mutable.copy(None).unwrap();
    assert!(!snapshot.is_mutable());
    mutable.append_str("!");
    assert_eq!(snapshot, "shared");
}

#[test]
fn mutable_copy_limits_length() {
    let string = s("abcdef");
    assert_eq!(string.mutable_copy(None, 0).unwrap(), "abcdef");
    assert_eq!(string.mutable_copy(None, 3).unwrap(), "abc");
}

#[test]
fn substrings_and_combining() {
    let string = s("hello world");
    let world = StringRef::with_substring(None, &string, CharRange::new(6, 5)).unwrap();
    assert_eq!(world, "world");
    let err = StringRef::with_substring(None, &string, CharRange::new(8, 5)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OutOfRange);

    let parts = [s("a"), s("b"), s("c")];
    let joined = StringRef::by_combining_strings(None, &parts, &s(", ")).unwrap();
    assert_eq!(joined, "a, b, c");
    assert!(StringRef::by_combining_strings(None, &[], &s(",")).is_err());

    let split = s("a,b,,c").array_by_separating_strings(&s(",")).unwrap();
    let split: Vec<String> = split.iter().map(ToString::to_string).collect();
    assert_eq!(split, ["a", "b", "", "c"]);
    let whole = s("abc").array_by_separating_strings(&s(",")).unwrap();
    assert_eq!(whole.len(), 1);
}

#[test]
fn formatted_construction() {
    let string = StringRef::with_format(None, format_args!("{}+{}={}", 1, 2, 3)).unwrap();
    assert_eq!(string, "1+2=3");
}

#[test]
fn comparing_and_searching() {
    use std::cmp::Ordering;
    assert_eq!(s("abc").compare(&s("abd"), CompareOptions::NONE), Ordering::Less);
    assert_eq!(s("ABC").compare(&s("abc"), CompareOptions::CASE_INSENSITIVE), Ordering::Equal);
    assert_eq!(s("b").compare(&s("abc"), CompareOptions::NONE), Ordering::Greater);

    let text = s("hello hello");
    assert_eq!(text.find(&s("lo"), CompareOptions::NONE), Some(CharRange::new(3, 2)));
    assert_eq!(text.find(&s("lo"), CompareOptions::BACKWARDS), Some(CharRange::new(9, 2)));
    assert_eq!(text.find(&s("he"), CompareOptions::ANCHORED), Some(CharRange::new(0, 2)));
    assert_eq!(text.find(&s("lo"), CompareOptions::ANCHORED), None);
    assert_eq!(text.find(&s("HELLO"), CompareOptions::CASE_INSENSITIVE), Some(CharRange::new(0, 5)));
    assert_eq!(text.find(&s(""), CompareOptions::NONE), None);
    assert_eq!(text.find_all(&s("l"), CompareOptions::NONE).len(), 4);

    assert!(text.has_prefix(&s("hell")));
    assert!(text.has_suffix(&s("llo")));
    assert!(!text.has_suffix(&s("hello hello!")));
}

#[test]
fn runtime_dispatch_sees_strings() {
    let string = s("described");
    assert_eq!(string.as_object().describe(), "described");
    assert_eq!(string.as_object().type_name(), "String");
    let copy = string.as_object().copy(None).unwrap();
    assert!(StringRef::from_object(copy).is_some());
    let null = cb_core::null::null().unwrap();
    assert!(StringRef::from_object(null).is_none());
}

#[test]
fn debug_summary_lists_fields() {
    let summary = s("hello").debug_summary();
    assert!(summary.contains("Length 5"));
    assert!(summary.contains("IsEightBit true"));
    assert!(summary.contains("HasNullByte true"));
    assert!(summary.contains("InlineContents true"));
    assert!(summary.contains("Mutable false"));
    assert!(summary.contains("Contents \"hello\""));
}

#[test]
fn inline_buffer_reads_every_representation() {
    let narrow = s("abcdef");
    let mut buffer = InlineBuffer::new(&narrow, CharRange::new(2, 3));
    assert_eq!(buffer.len(), 3);
    assert_eq!(buffer.get(0), Some(u16::from(b'c')));
    assert_eq!(buffer.get(3), None);

    let text: String = (0..200).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
    let mutable = MutableString::with_str(None, &text).unwrap();
    let mut buffer = InlineBuffer::whole(&mutable);
    let expected: Vec<u16> = text.encode_utf16().collect();
    for i in (0..200).rev() {
        assert_eq!(buffer.get(i), Some(expected[i]));
    }
    let collected: Vec<u16> = buffer.iter().collect();
    assert_eq!(collected, expected);

    let wide = s("héllo");
    let collected: Vec<u16> = InlineBuffer::whole(&wide).iter().collect();
    assert_eq!(collected, "héllo".encode_utf16().collect::<Vec<_>>());
}

#[test]
fn surrogate_helpers() {
    use cb_text::{
        code_point_to_surrogate_pair, is_high_surrogate, is_low_surrogate,
        surrogate_pair_to_code_point,
    };
    assert_eq!(code_point_to_surrogate_pair(0x1F600), Some((0xD83D, 0xDE00)));
    assert_eq!(surrogate_pair_to_code_point(0xD83D, 0xDE00), 0x1F600);
    assert_eq!(code_point_to_surrogate_pair(0xFFFF), None);
    assert!(is_high_surrogate(0xD83D));
    assert!(is_low_surrogate(0xDE00));
    assert!(!is_low_surrogate(0xD83D));
}
