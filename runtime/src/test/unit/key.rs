use crate::hash_combine;

#[test]
fn test_hash_combine_is_order_sensitive() {
    let ab = hash_combine(hash_combine(0, &1u32), &2u32);
    let ba = hash_combine(hash_combine(0, &2u32), &1u32);
    assert_ne!(ab, ba);
}

#[test]
fn test_hash_combine_is_deterministic() {
    assert_eq!(hash_combine(17, "softmax"), hash_combine(17, "softmax"));
    assert_ne!(hash_combine(17, "softmax"), hash_combine(18, "softmax"));
}
