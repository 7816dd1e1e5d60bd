use super::*;

#[test]
fn u32_round_trips() {
    let mut buf = Vec::new();
    42u32.encode_to(&mut buf).unwrap();
    let (value, consumed) = u32::decode_from(&buf).unwrap();
    assert_eq!(value, 42);
    assert_eq!(consumed, 4);
}

#[test]
fn f32_round_trips() {
    let mut buf = Vec::new();
    (-1.5f32).encode_to(&mut buf).unwrap();
    let (value, consumed) = f32::decode_from(&buf).unwrap();
    assert_eq!(value, -1.5);
    assert_eq!(consumed, 4);
}

#[test]
fn decode_from_slice_matches_trait_method() {
    let mut buf = Vec::new();
    7u32.encode_to(&mut buf).unwrap();
    let (value, consumed): (u32, usize) = decode_from_slice(&buf).unwrap();
    assert_eq!(value, 7);
    assert_eq!(consumed, 4);
}

#[test]
fn decode_rejects_truncated_buffer() {
    let err = u32::decode_from(&[1, 2]).unwrap_err();
    assert!(matches!(
        err,
        EncodingError::UnexpectedEof { needed: 4, available: 2 }
    ));
}

#[test]
fn sequential_values_each_consume_their_own_width() {
    let mut buf = Vec::new();
    1u32.encode_to(&mut buf).unwrap();
    2.5f32.encode_to(&mut buf).unwrap();

    let (slot, n) = u32::decode_from(&buf).unwrap();
    assert_eq!((slot, n), (1, 4));
    let (value, n) = f32::decode_from(&buf[n..]).unwrap();
    assert_eq!((value, n), (2.5, 4));
}
